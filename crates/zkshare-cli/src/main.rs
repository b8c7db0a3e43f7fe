//! zkshare: zero-knowledge file encryption CLI
//!
//! Commands:
//!   encrypt <in> <out>         - seal a file client-side (random key or password)
//!   decrypt <in> <out>         - open an envelope with its key or password
//!   protect <in> <out>         - store a file according to the [encryption] policy
//!   serve                      - JSON-lines executor over stdin/stdout
//!   server-encrypt <in> <out>  - seal with the deployment's server-side password
//!   server-decrypt <in> <out>  - open a server-side envelope
//!   config show                - display current configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use zkshare_core::config::{WorkerConfig, ZkConfig};
use zkshare_core::EncryptionResult;
use zkshare_crypto::KeySource;
use zkshare_mirror::ServerCipher;
use zkshare_worker::CryptoClient;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkshare",
    version,
    about = "Zero-knowledge file encryption",
    long_about = "zkshare: encrypt files before they leave the machine, decrypt them after download"
)]
struct Cli {
    /// Path to zkshare config.toml
    #[arg(
        long,
        short = 'c',
        env = "ZKSHARE_CONFIG",
        default_value = "/etc/zkshare/config.toml",
        global = true
    )]
    config: PathBuf,

    /// Log filter (overrides [log].level)
    #[arg(long, env = "ZKSHARE_LOG", global = true)]
    log: Option<String>,

    /// Log output format (overrides [log].format)
    #[arg(long, value_enum, env = "ZKSHARE_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file on this machine
    ///
    /// Without a password a random key is generated and printed once to
    /// stdout. Keep it: the file cannot be decrypted without it.
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Decrypt an envelope produced by `encrypt` or `serve`
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        /// Exported key printed by `encrypt`
        #[arg(
            long,
            env = "ZKSHARE_KEY",
            hide_env_values = true,
            conflicts_with_all = ["password_prompt", "password_env"],
            required_unless_present_any = ["password_prompt", "password_env"]
        )]
        key: Option<String>,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Store a file the way the [encryption] policy asks for
    ///
    /// zero_knowledge = true encrypts locally with a random key; false hands
    /// the file to the server-side mirror; enabled = false copies it as is.
    Protect { input: PathBuf, output: PathBuf },

    /// Serve JSON-lines requests on stdin, responses on stdout
    Serve {
        /// Dump Prometheus metrics to stderr on exit
        #[arg(long)]
        metrics: bool,
    },

    /// Encrypt with the server-held password (not zero-knowledge)
    #[command(name = "server-encrypt")]
    ServerEncrypt {
        input: PathBuf,
        output: PathBuf,
        /// Uploader password, honoured only if [server].allow_user_password
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Decrypt a file sealed by `server-encrypt`
    #[command(name = "server-decrypt")]
    ServerDecrypt {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file + env)
    Show,
}

#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct PasswordArgs {
    /// Prompt for a password on the terminal
    #[arg(long)]
    password_prompt: bool,

    /// Read the password from this environment variable
    #[arg(long, value_name = "VAR")]
    password_env: Option<String>,
}

impl PasswordArgs {
    /// `None` when neither flag was given.
    fn read(&self, confirm: bool) -> Result<Option<SecretString>> {
        if let Some(var) = &self.password_env {
            let value = std::env::var(var)
                .with_context(|| format!("password variable ${var} is not set"))?;
            if value.is_empty() {
                anyhow::bail!("password variable ${var} is empty");
            }
            return Ok(Some(SecretString::from(value)));
        }

        if !self.password_prompt {
            return Ok(None);
        }

        let first = rpassword::prompt_password("Password: ").context("reading password")?;
        if first.is_empty() {
            anyhow::bail!("empty password");
        }
        if confirm {
            let second =
                rpassword::prompt_password("Confirm password: ").context("reading password")?;
            if first != second {
                anyhow::bail!("passwords do not match");
            }
        }
        Ok(Some(SecretString::from(first)))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ZkConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);

    if !cli.config.exists() {
        debug!(config = %cli.config.display(), "no config file; using defaults");
    }

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            password,
        } => cmd_encrypt(&config, &input, &output, &password).await,
        Commands::Decrypt {
            input,
            output,
            key,
            password,
        } => cmd_decrypt(&config, &input, &output, key, &password).await,
        Commands::Protect { input, output } => cmd_protect(&config, &input, &output).await,
        Commands::Serve { metrics } => cmd_serve(&config, metrics).await,
        Commands::ServerEncrypt {
            input,
            output,
            password,
        } => cmd_server_encrypt(&config, &input, &output, &password).await,
        Commands::ServerDecrypt {
            input,
            output,
            password,
        } => cmd_server_decrypt(&config, &input, &output, &password).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

/// Logs always go to stderr; stdout carries keys and protocol responses.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── File helpers ──────────────────────────────────────────────────────────────

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

// ── `zkshare encrypt` / `zkshare decrypt` ─────────────────────────────────────

async fn cmd_encrypt(
    config: &ZkConfig,
    input: &Path,
    output: &Path,
    password: &PasswordArgs,
) -> Result<()> {
    let source = match password.read(true)? {
        Some(pw) => KeySource::password(pw.expose_secret()),
        None => KeySource::RandomKey,
    };
    let plaintext = read_input(input).await?;
    let bytes = plaintext.len();

    let client = CryptoClient::spawn(&config.worker);
    let result = client.encrypt(plaintext, source).await;
    client.shutdown().await;

    let EncryptionResult::Encrypted {
        envelope,
        exported_key,
    } = result?
    else {
        anyhow::bail!("executor answered an encrypt with a decrypt result");
    };
    write_output(output, &envelope).await?;

    info!(
        input = %input.display(),
        output = %output.display(),
        bytes,
        envelope_bytes = envelope.len(),
        "encrypted"
    );
    if let Some(key) = exported_key {
        eprintln!("Decryption key (shown once, store it safely):");
        println!("{}", key.expose_secret());
    }
    Ok(())
}

async fn cmd_decrypt(
    config: &ZkConfig,
    input: &Path,
    output: &Path,
    key: Option<String>,
    password: &PasswordArgs,
) -> Result<()> {
    let source = match (key, password.read(false)?) {
        (_, Some(pw)) => KeySource::password(pw.expose_secret()),
        (Some(key), None) => KeySource::exported_key(key),
        (None, None) => anyhow::bail!("decrypt needs --key, --password-prompt or --password-env"),
    };
    let envelope = read_input(input).await?;

    let client = CryptoClient::spawn(&config.worker);
    let result = client.decrypt(envelope, source).await;
    client.shutdown().await;

    let plaintext = result?;
    write_output(output, &plaintext).await?;
    info!(
        input = %input.display(),
        output = %output.display(),
        bytes = plaintext.len(),
        "decrypted"
    );
    Ok(())
}

// ── `zkshare protect` ─────────────────────────────────────────────────────────

async fn cmd_protect(config: &ZkConfig, input: &Path, output: &Path) -> Result<()> {
    let policy = &config.encryption;
    if !policy.enabled {
        warn!("[encryption].enabled = false: storing file unencrypted");
        let data = read_input(input).await?;
        return write_output(output, &data).await;
    }

    if policy.zero_knowledge {
        cmd_encrypt(config, input, output, &PasswordArgs::default()).await
    } else {
        cmd_server_encrypt(config, input, output, &PasswordArgs::default()).await
    }
}

// ── `zkshare serve` ───────────────────────────────────────────────────────────

async fn cmd_serve(config: &ZkConfig, dump_metrics: bool) -> Result<()> {
    let client = Arc::new(CryptoClient::spawn(&config.worker));
    let (out_tx, mut out_rx) = mpsc::channel::<String>(config.worker.queue_depth.max(1));

    // Single writer so concurrent responses never interleave mid-line
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    info!("serving JSON-lines requests on stdin");
    let input = BufReader::new(tokio::io::stdin());
    let capacity = serve_capacity(&config.worker);
    let stats = serve_lines(client.clone(), input, out_tx, capacity).await?;
    writer
        .await
        .context("stdout writer panicked")?
        .context("writing to stdout")?;

    let client = Arc::try_unwrap(client)
        .map_err(|_| anyhow::anyhow!("crypto client still shared after drain"))?;
    if dump_metrics {
        eprint!("{}", client.metrics().encode());
    }
    client.shutdown().await;
    info!(
        received = stats.received,
        peak_in_flight = stats.peak_in_flight,
        "serve finished"
    );
    Ok(())
}

/// Lines allowed in flight at once: one per queue slot plus one per worker.
fn serve_capacity(worker: &WorkerConfig) -> usize {
    worker
        .queue_depth
        .max(1)
        .saturating_add(worker.effective_concurrency())
}

#[derive(Debug, Default, Clone, Copy)]
struct ServeStats {
    received: u64,
    peak_in_flight: usize,
}

/// Answer every non-blank line of `input`, at most `capacity` at a time.
///
/// No further line is read while `capacity` requests are outstanding, so a
/// fast producer is held back by the executor queue instead of buffering
/// payloads here. Returns once every response has been handed to `out`.
async fn serve_lines<R>(
    client: Arc<CryptoClient>,
    input: R,
    out: mpsc::Sender<String>,
    capacity: usize,
) -> Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
{
    let capacity = capacity.max(1);
    let mut lines = input.lines();
    let mut tasks = JoinSet::new();
    let mut stats = ServeStats::default();

    loop {
        while tasks.try_join_next().is_some() {}
        while tasks.len() >= capacity {
            let _ = tasks.join_next().await;
        }

        let Some(line) = lines.next_line().await.context("reading request line")? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        stats.received += 1;

        let client = client.clone();
        let out = out.clone();
        tasks.spawn(async move {
            let response = client.handle_message(&line).await;
            if out.send(response.to_json()).await.is_err() {
                debug!(id = %response.id(), "output writer gone; dropping response");
            }
        });
        stats.peak_in_flight = stats.peak_in_flight.max(tasks.len());
    }

    debug!(
        received = stats.received,
        "input closed; waiting for in-flight requests"
    );
    while tasks.join_next().await.is_some() {}
    Ok(stats)
}

// ── `zkshare server-encrypt` / `zkshare server-decrypt` ───────────────────────

async fn cmd_server_encrypt(
    config: &ZkConfig,
    input: &Path,
    output: &Path,
    password: &PasswordArgs,
) -> Result<()> {
    let cipher = ServerCipher::from_config(&config.server)?;
    let user = password.read(true)?;
    let plaintext = read_input(input).await?;

    let sealed = cipher.encrypt_async(plaintext, user).await?;
    write_output(output, &sealed.envelope).await?;

    info!(
        input = %input.display(),
        output = %output.display(),
        source = %sealed.source,
        "server-side encrypted"
    );
    Ok(())
}

async fn cmd_server_decrypt(
    config: &ZkConfig,
    input: &Path,
    output: &Path,
    password: &PasswordArgs,
) -> Result<()> {
    let cipher = ServerCipher::from_config(&config.server)?;
    let user = password.read(false)?;
    let envelope = read_input(input).await?;

    let plaintext = cipher.decrypt_async(envelope, user).await?;
    write_output(output, &plaintext).await?;

    info!(
        input = %input.display(),
        output = %output.display(),
        bytes = plaintext.len(),
        "server-side decrypted"
    );
    Ok(())
}

// ── `zkshare config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &ZkConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = config.to_toml().context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_decrypt_requires_a_secret() {
        let parsed = Cli::try_parse_from(["zkshare", "decrypt", "in.enc", "out"]);
        assert!(parsed.is_err());

        let parsed =
            Cli::try_parse_from(["zkshare", "decrypt", "in.enc", "out", "--key", "abc"]).unwrap();
        assert!(matches!(parsed.command, Commands::Decrypt { key: Some(_), .. }));
    }

    #[test]
    fn test_key_and_password_conflict() {
        let parsed = Cli::try_parse_from([
            "zkshare",
            "decrypt",
            "in.enc",
            "out",
            "--key",
            "abc",
            "--password-prompt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_password_flags_are_exclusive() {
        let parsed = Cli::try_parse_from([
            "zkshare",
            "encrypt",
            "a",
            "b",
            "--password-prompt",
            "--password-env",
            "PW",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_password_env_missing_variable() {
        let args = PasswordArgs {
            password_prompt: false,
            password_env: Some("ZKSHARE_TEST_SURELY_UNSET_VARIABLE".into()),
        };
        assert!(args.read(false).is_err());
    }

    #[test]
    fn test_no_password_flags_reads_none() {
        assert!(PasswordArgs::default().read(true).unwrap().is_none());
    }

    #[test]
    fn test_serve_capacity_covers_queue_and_workers() {
        let worker = WorkerConfig {
            concurrency: 3,
            queue_depth: 5,
            ..WorkerConfig::default()
        };
        assert_eq!(serve_capacity(&worker), 8);

        let worker = WorkerConfig {
            concurrency: 2,
            queue_depth: 0,
            ..WorkerConfig::default()
        };
        assert_eq!(serve_capacity(&worker), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serve_lines_bounds_in_flight_requests() {
        let worker = WorkerConfig {
            concurrency: 1,
            queue_depth: 1,
            ..WorkerConfig::default()
        };
        let client = Arc::new(CryptoClient::spawn(&worker));

        let mut input = String::new();
        for i in 0..20 {
            input.push_str(&format!(
                r#"{{"type":"encrypt","id":"line-{i}","data":{{"file":"AAAA"}}}}"#
            ));
            input.push('\n');
            input.push('\n');
        }

        let (out_tx, mut out_rx) = mpsc::channel(64);
        let stats = serve_lines(client.clone(), input.as_bytes(), out_tx, 2)
            .await
            .unwrap();
        assert_eq!(stats.received, 20, "blank lines are not requests");
        assert!(
            stats.peak_in_flight <= 2,
            "peak {} exceeds capacity",
            stats.peak_in_flight
        );

        let mut answered = 0;
        while let Some(line) = out_rx.recv().await {
            assert!(line.contains(r#""type":"success""#), "{line}");
            answered += 1;
        }
        assert_eq!(answered, 20);

        let Ok(client) = Arc::try_unwrap(client) else {
            panic!("client still shared after serve_lines returned");
        };
        assert_eq!(client.in_flight().await, 0);
        client.shutdown().await;
    }
}
