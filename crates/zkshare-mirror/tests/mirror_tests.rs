//! Server-side encryption: password precedence, restart behaviour and
//! interoperability with the client envelope.

use secrecy::SecretString;

use zkshare_core::config::ServerConfig;
use zkshare_crypto::{open, CryptoError, KeySource};
use zkshare_mirror::{MirrorError, PasswordSource, ServerCipher};

fn server(allow_user: bool, default: Option<&str>, require: bool) -> ServerCipher {
    ServerCipher::from_config(&ServerConfig {
        allow_user_password: allow_user,
        default_password: default.map(str::to_string),
        require_configured_password: require,
    })
    .unwrap()
}

#[test]
fn deployment_password_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf.enc");

    let before = server(false, Some("deploy-secret"), false);
    assert!(before.has_configured_password());
    let sealed = before.encrypt(b"quarterly numbers", None).unwrap();
    assert_eq!(sealed.source, PasswordSource::Deployment);
    std::fs::write(&path, &sealed.envelope).unwrap();
    drop(before);

    let after = server(false, Some("deploy-secret"), false);
    let envelope = std::fs::read(&path).unwrap();
    assert_eq!(after.decrypt(&envelope, None).unwrap(), b"quarterly numbers");
}

#[test]
fn ephemeral_password_is_lost_on_restart() {
    let first = server(false, None, false);
    assert!(!first.has_configured_password());
    let sealed = first.encrypt(b"gone after restart", None).unwrap();
    assert_eq!(sealed.source, PasswordSource::Ephemeral);

    // Same process can still read it back
    assert_eq!(
        first.decrypt(&sealed.envelope, None).unwrap(),
        b"gone after restart"
    );

    let restarted = server(false, None, false);
    let err = restarted.decrypt(&sealed.envelope, None).unwrap_err();
    assert!(matches!(
        err,
        MirrorError::Crypto(CryptoError::AuthenticationFailed)
    ));
}

#[test]
fn user_password_only_when_allowed() {
    let user = SecretString::from("uploader-choice");

    let allowing = server(true, Some("deploy"), false);
    let sealed = allowing.encrypt(b"mine", Some(&user)).unwrap();
    assert_eq!(sealed.source, PasswordSource::User);
    // Deployment password does not open a user-password file
    assert!(allowing.decrypt(&sealed.envelope, None).is_err());
    assert_eq!(
        allowing.decrypt(&sealed.envelope, Some(&user)).unwrap(),
        b"mine"
    );

    let refusing = server(false, Some("deploy"), false);
    let sealed = refusing.encrypt(b"theirs", Some(&user)).unwrap();
    assert_eq!(sealed.source, PasswordSource::Deployment);
    assert_eq!(refusing.decrypt(&sealed.envelope, None).unwrap(), b"theirs");
}

#[test]
fn require_configured_password_refuses_fallback() {
    let cipher = server(false, None, true);
    assert!(matches!(
        cipher.encrypt(b"nope", None),
        Err(MirrorError::PasswordNotConfigured)
    ));
    assert!(matches!(
        cipher.decrypt(&[0u8; 64], None),
        Err(MirrorError::PasswordNotConfigured)
    ));
}

#[test]
fn server_envelope_opens_with_client_engine() {
    let cipher = server(false, Some("shared-password"), false);
    let sealed = cipher.encrypt(b"same format both sides", None).unwrap();

    let plaintext = open(&sealed.envelope, &KeySource::password("shared-password")).unwrap();
    assert_eq!(plaintext, b"same format both sides");
}

#[test]
fn malformed_envelope_is_reported_not_panicked() {
    let cipher = server(false, Some("deploy"), false);
    assert!(matches!(
        cipher.decrypt(&[1, 2, 3], None),
        Err(MirrorError::Crypto(CryptoError::MalformedEnvelope(_)))
    ));
}

#[tokio::test]
async fn async_variants_roundtrip() {
    let cipher = server(true, Some("deploy"), false);

    let sealed = cipher
        .encrypt_async(b"off the runtime threads".to_vec(), None)
        .await
        .unwrap();
    assert_eq!(sealed.source, PasswordSource::Deployment);

    let plaintext = cipher.decrypt_async(sealed.envelope, None).await.unwrap();
    assert_eq!(plaintext, b"off the runtime threads");

    let user = SecretString::from("async-user");
    let sealed = cipher
        .encrypt_async(Vec::new(), Some(SecretString::from("async-user")))
        .await
        .unwrap();
    assert_eq!(sealed.source, PasswordSource::User);
    assert!(cipher
        .decrypt_async(sealed.envelope, Some(user))
        .await
        .unwrap()
        .is_empty());
}
