//! Envelope codec: salt, IV and ciphertext as one self-describing blob
//!
//! Binary format (no padding, little-endian length prefixes):
//! ```text
//! [4 bytes: salt_len][salt_len bytes: salt]
//! [4 bytes: iv_len][iv_len bytes: iv]
//! [remaining bytes: ciphertext || authentication tag]
//! ```
//!
//! The codec itself is length-agnostic; the fixed salt/IV sizes are enforced
//! by the layer that opens the envelope.

use crate::error::{CryptoError, CryptoResult};

/// Size of each length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed bytes added by the two length prefixes
pub const HEADER_OVERHEAD: usize = 2 * LENGTH_PREFIX_SIZE;

/// Borrowed view of an unpacked envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeParts<'a> {
    pub salt: &'a [u8],
    pub iv: &'a [u8],
    pub ciphertext: &'a [u8],
}

impl EnvelopeParts<'_> {
    /// Re-encode these parts. Equivalent to [`pack`].
    pub fn to_vec(&self) -> CryptoResult<Vec<u8>> {
        pack(self.salt, self.iv, self.ciphertext)
    }
}

/// Pack `(salt, iv, ciphertext)` into a single envelope.
///
/// Output length is exactly `8 + salt.len() + iv.len() + ciphertext.len()`.
pub fn pack(salt: &[u8], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let salt_len = length_prefix(salt, "salt")?;
    let iv_len = length_prefix(iv, "iv")?;

    let mut out = Vec::with_capacity(HEADER_OVERHEAD + salt.len() + iv.len() + ciphertext.len());
    out.extend_from_slice(&salt_len);
    out.extend_from_slice(salt);
    out.extend_from_slice(&iv_len);
    out.extend_from_slice(iv);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Split an envelope back into its parts without copying.
///
/// Fails with `MalformedEnvelope` when the buffer is shorter than the two
/// length prefixes, when a declared length runs past the end of the buffer,
/// or when no ciphertext remains.
pub fn unpack(envelope: &[u8]) -> CryptoResult<EnvelopeParts<'_>> {
    if envelope.len() < HEADER_OVERHEAD {
        return Err(CryptoError::MalformedEnvelope(format!(
            "envelope too short: {} bytes (minimum {})",
            envelope.len(),
            HEADER_OVERHEAD
        )));
    }

    let (salt, rest) = read_segment(envelope, "salt")?;
    let (iv, ciphertext) = read_segment(rest, "iv")?;

    if ciphertext.is_empty() {
        return Err(CryptoError::MalformedEnvelope(
            "envelope has no ciphertext".into(),
        ));
    }

    Ok(EnvelopeParts {
        salt,
        iv,
        ciphertext,
    })
}

fn length_prefix(segment: &[u8], field: &str) -> CryptoResult<[u8; LENGTH_PREFIX_SIZE]> {
    u32::try_from(segment.len())
        .map(u32::to_le_bytes)
        .map_err(|_| {
            CryptoError::MalformedEnvelope(format!(
                "{field} too long for envelope: {} bytes",
                segment.len()
            ))
        })
}

/// Read one `[u32 len][len bytes]` segment, returning it and the remainder.
fn read_segment<'a>(buf: &'a [u8], field: &str) -> CryptoResult<(&'a [u8], &'a [u8])> {
    let (prefix, rest) = buf
        .split_first_chunk::<LENGTH_PREFIX_SIZE>()
        .ok_or_else(|| {
            CryptoError::MalformedEnvelope(format!("truncated {field} length prefix"))
        })?;

    let declared = u32::from_le_bytes(*prefix) as usize;
    if declared > rest.len() {
        return Err(CryptoError::MalformedEnvelope(format!(
            "{field} length {declared} exceeds remaining {} bytes",
            rest.len()
        )));
    }

    Ok(rest.split_at(declared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pack_layout() {
        let env = pack(&[1, 2], &[3, 4, 5], &[6]).unwrap();
        assert_eq!(
            env,
            vec![2, 0, 0, 0, 1, 2, 3, 0, 0, 0, 3, 4, 5, 6],
            "prefixes must be little-endian u32"
        );
    }

    #[test]
    fn test_pack_length() {
        let env = pack(&[0u8; 16], &[0u8; 12], &[0u8; 100]).unwrap();
        assert_eq!(env.len(), HEADER_OVERHEAD + 16 + 12 + 100);
    }

    #[test]
    fn test_unpack_too_short() {
        for len in 0..HEADER_OVERHEAD {
            let buf = vec![0u8; len];
            let result = unpack(&buf);
            assert!(
                matches!(result, Err(CryptoError::MalformedEnvelope(_))),
                "{len}-byte envelope must be rejected"
            );
        }
    }

    #[test]
    fn test_unpack_salt_length_exceeds_buffer() {
        let mut env = pack(&[7u8; 16], &[9u8; 12], &[1u8; 32]).unwrap();
        env[..4].copy_from_slice(&u32::MAX.to_le_bytes());

        let result = unpack(&env);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_unpack_iv_length_exceeds_buffer() {
        let mut env = pack(&[7u8; 16], &[9u8; 12], &[1u8; 32]).unwrap();
        let iv_prefix = LENGTH_PREFIX_SIZE + 16;
        env[iv_prefix..iv_prefix + 4].copy_from_slice(&1000u32.to_le_bytes());

        let result = unpack(&env);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_unpack_salt_swallows_iv_prefix() {
        // salt_len points exactly at the end: no room left for the IV prefix
        let mut env = vec![0u8; 12];
        env[..4].copy_from_slice(&8u32.to_le_bytes());

        let result = unpack(&env);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_unpack_empty_ciphertext() {
        let env = pack(&[1u8; 16], &[2u8; 12], &[]).unwrap();
        let result = unpack(&env);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_parts_to_vec_matches_input() {
        let env = pack(b"salty", b"iv", b"ct").unwrap();
        let parts = unpack(&env).unwrap();
        assert_eq!(parts.to_vec().unwrap(), env);
    }

    proptest! {
        /// unpack(pack(s, i, c)) == (s, i, c) for non-empty segments
        #[test]
        fn envelope_roundtrip(
            salt in proptest::collection::vec(any::<u8>(), 1..=64),
            iv in proptest::collection::vec(any::<u8>(), 1..=64),
            ct in proptest::collection::vec(any::<u8>(), 1..=4096),
        ) {
            let env = pack(&salt, &iv, &ct).unwrap();
            let parts = unpack(&env).unwrap();
            prop_assert_eq!(parts.salt, salt.as_slice());
            prop_assert_eq!(parts.iv, iv.as_slice());
            prop_assert_eq!(parts.ciphertext, ct.as_slice());
        }

        /// Arbitrary bytes never panic the decoder
        #[test]
        fn unpack_never_panics(data in proptest::collection::vec(any::<u8>(), 0..=256)) {
            let _ = unpack(&data);
        }
    }
}
