//! Authentication functionality for DLMS/COSEM
//!
//! LOW compares a shared password. The HLS mechanisms exchange challenges in
//! the AARQ/AARE and prove key possession afterwards through the
//! `reply_to_HLS_authentication` method of the Association LN object.

use crate::encryption::Aes128Gcm12;
use crate::error::{DlmsError, DlmsResult};
use crate::suite::{AuthenticationMechanism, SecuritySuite};
use crate::xdlms::SystemTitle;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use md5::Md5;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Shortest accepted challenge
pub const MIN_CHALLENGE_LENGTH: usize = 8;
/// Longest accepted challenge
pub const MAX_CHALLENGE_LENGTH: usize = 64;

/// Security control byte prefixed to every GMAC proof
const GMAC_SECURITY_CONTROL: u8 = 0x10;

/// Fresh random challenge of `length` bytes.
pub fn generate_challenge(length: usize) -> DlmsResult<Vec<u8>> {
    validate_challenge_length(length)?;
    let mut challenge = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut challenge);
    Ok(challenge)
}

/// # Errors
/// `AuthenticationFailure` for challenges outside 8..=64 bytes.
pub fn validate_challenge_length(length: usize) -> DlmsResult<()> {
    if !(MIN_CHALLENGE_LENGTH..=MAX_CHALLENGE_LENGTH).contains(&length) {
        return Err(DlmsError::AuthenticationFailure(format!(
            "Challenge length {} outside {}..={}",
            length, MIN_CHALLENGE_LENGTH, MAX_CHALLENGE_LENGTH
        )));
    }
    Ok(())
}

/// GMAC proof over `challenge`: `0x10 || frame counter || tag(12)`.
///
/// The tag is AES-GCM with empty plaintext over
/// `0x10 || authentication key || challenge`, IV = system title || frame counter.
pub fn process_gmac(
    challenge: &[u8],
    suite: &SecuritySuite,
    system_title: &SystemTitle,
    frame_counter: u32,
) -> DlmsResult<Vec<u8>> {
    let cipher = Aes128Gcm12::new_from_slice(suite.require_encryption_key()?)
        .map_err(|_| DlmsError::Security("Invalid AES-128 key length".to_string()))?;
    let authentication_key = suite
        .authentication_key()
        .ok_or_else(|| DlmsError::Security("HLS-GMAC requires an authentication key".to_string()))?;
    let mut aad = Vec::with_capacity(1 + authentication_key.len() + challenge.len());
    aad.push(GMAC_SECURITY_CONTROL);
    aad.extend_from_slice(authentication_key);
    aad.extend_from_slice(challenge);

    let iv = system_title.initialization_vector(frame_counter);
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&iv), &aad, &mut [])
        .map_err(|_| DlmsError::Cipher("GMAC computation failed".to_string()))?;

    let mut out = Vec::with_capacity(5 + tag.len());
    out.push(GMAC_SECURITY_CONTROL);
    out.extend_from_slice(&frame_counter.to_be_bytes());
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Digest proof `H(challenge || authentication key)` for the MD5 and SHA-256 mechanisms.
pub fn process_digest(
    mechanism: AuthenticationMechanism,
    challenge: &[u8],
    suite: &SecuritySuite,
) -> DlmsResult<Vec<u8>> {
    let key = suite.authentication_key_or_empty();
    match mechanism {
        AuthenticationMechanism::HlsMd5 => {
            let mut hasher = Md5::new();
            hasher.update(challenge);
            hasher.update(key);
            Ok(hasher.finalize().to_vec())
        }
        AuthenticationMechanism::HlsSha256 => {
            let mut hasher = Sha256::new();
            hasher.update(challenge);
            hasher.update(key);
            Ok(hasher.finalize().to_vec())
        }
        other => Err(DlmsError::Security(format!("{:?} is not a digest mechanism", other))),
    }
}

/// Proof of key possession over `challenge` for the suite's HLS mechanism.
pub fn process_challenge(
    challenge: &[u8],
    suite: &SecuritySuite,
    system_title: &SystemTitle,
    frame_counter: u32,
) -> DlmsResult<Vec<u8>> {
    match suite.authentication_mechanism() {
        AuthenticationMechanism::HlsGmac => process_gmac(challenge, suite, system_title, frame_counter),
        mechanism @ (AuthenticationMechanism::HlsMd5 | AuthenticationMechanism::HlsSha256) => {
            process_digest(mechanism, challenge, suite)
        }
        other => Err(DlmsError::Security(format!("{:?} has no challenge processing", other))),
    }
}

/// Frame counter embedded in a GMAC proof, `None` for other proof formats.
pub fn gmac_frame_counter(proof: &[u8]) -> Option<u32> {
    match proof {
        [GMAC_SECURITY_CONTROL, a, b, c, d, ..] if proof.len() == 5 + crate::encryption::TAG_LENGTH => {
            Some(u32::from_be_bytes([*a, *b, *c, *d]))
        }
        _ => None,
    }
}

/// Constant-time comparison of a received secret against the expected one.
pub fn verify(expected: &[u8], received: &[u8]) -> bool {
    bool::from(expected.ct_eq(received))
}

/// LOW: the presented authentication value must equal the configured password.
pub fn verify_low(suite: &SecuritySuite, presented: &[u8]) -> DlmsResult<()> {
    let password = suite
        .password()
        .ok_or_else(|| DlmsError::Security("No password configured".to_string()))?;
    if verify(password, presented) {
        Ok(())
    } else {
        Err(DlmsError::AuthenticationFailure("Wrong password".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::EncryptionMechanism;

    fn hls_suite(mechanism: AuthenticationMechanism) -> SecuritySuite {
        SecuritySuite::builder()
            .set_encryption_mechanism(EncryptionMechanism::AesGcm128)
            .set_authentication_mechanism(mechanism)
            .set_global_unicast_encryption_key(hex::decode("000102030405060708090A0B0C0D0E0F").unwrap())
            .set_authentication_key(hex::decode("D0D1D2D3D4D5D6D7D8D9DADBDCDDDEDF").unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_process_gmac_reference_vector() {
        let suite = hls_suite(AuthenticationMechanism::HlsGmac);
        let title = SystemTitle::from_slice(&hex::decode("4D4D4D0000000001").unwrap()).unwrap();
        let challenge = hex::decode("503677524A323146").unwrap();
        let proof = process_gmac(&challenge, &suite, &title, 1).unwrap();
        assert_eq!(hex::encode_upper(&proof), "10000000011A52FE7DD3E72748973C1E28");
        assert_eq!(gmac_frame_counter(&proof), Some(1));
    }

    #[test]
    fn test_digest_mechanisms() {
        let challenge = b"ABCDEFGH";
        let md5 = process_digest(AuthenticationMechanism::HlsMd5, challenge, &hls_suite(AuthenticationMechanism::HlsMd5)).unwrap();
        assert_eq!(md5.len(), 16);
        let sha = process_digest(
            AuthenticationMechanism::HlsSha256,
            challenge,
            &hls_suite(AuthenticationMechanism::HlsSha256),
        )
        .unwrap();
        let mut input = challenge.to_vec();
        input.extend(0xD0u8..=0xDF);
        assert_eq!(sha, Sha256::digest(&input).to_vec());
        assert!(process_digest(AuthenticationMechanism::Low, challenge, &hls_suite(AuthenticationMechanism::HlsMd5)).is_err());
    }

    #[test]
    fn test_challenge_bounds() {
        assert!(generate_challenge(7).is_err());
        assert!(generate_challenge(65).is_err());
        let a = generate_challenge(16).unwrap();
        let b = generate_challenge(16).unwrap();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_low_password() {
        let suite = SecuritySuite::builder().set_password(b"12345678".to_vec()).build().unwrap();
        assert!(verify_low(&suite, b"12345678").is_ok());
        assert!(matches!(verify_low(&suite, b"1234567"), Err(DlmsError::AuthenticationFailure(_))));
        assert!(verify_low(&suite, b"87654321").is_err());
    }

    #[test]
    fn test_verify_compares_length_and_content() {
        assert!(verify(&[1, 2, 3], &[1, 2, 3]));
        assert!(!verify(&[1, 2, 3], &[1, 2, 4]));
        assert!(!verify(&[1, 2, 3], &[1, 2]));
        assert!(!verify(&[], &[0]));
    }
}
