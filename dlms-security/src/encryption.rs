//! APDU ciphering for DLMS/COSEM (security suite 0, AES-GCM-128)
//!
//! Envelope layout:
//!
//! ```text
//! glo-tag | length | security control | frame counter (4, BE) | payload
//! ```
//!
//! The payload is `ciphertext || tag` when authenticated and encrypted,
//! `plaintext || tag` when only authenticated and the bare ciphertext when
//! only encrypted. Tags are 12 bytes.

use crate::error::{DlmsError, DlmsResult};
use crate::suite::{SecurityPolicy, SecuritySuite};
use crate::xdlms::SystemTitle;
use aes::Aes128;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::AesGcm;
use dlms_asn1::LengthEncoding;
use subtle::ConstantTimeEq;

/// AES-128-GCM with 96-bit nonce and 96-bit tag
pub type Aes128Gcm12 = AesGcm<Aes128, U12, U12>;

/// Authentication tag length in bytes
pub const TAG_LENGTH: usize = 12;

/// Security control byte plus frame counter
pub const SECURITY_HEADER_LENGTH: usize = 5;

/// Plaintext xDLMS tag and its glo-ciphered counterpart
const GLO_TAGS: [(u8, u8); 12] = [
    (1, 33),    // initiate-request
    (5, 37),    // read-request
    (6, 38),    // write-request
    (8, 40),    // initiate-response
    (12, 44),   // read-response
    (13, 45),   // write-response
    (192, 200), // get-request
    (193, 201), // set-request
    (195, 203), // action-request
    (196, 204), // get-response
    (197, 205), // set-response
    (199, 207), // action-response
];

/// Glo-ciphered tag for a plaintext xDLMS tag.
pub fn glo_tag(plain_tag: u8) -> Option<u8> {
    GLO_TAGS.iter().find(|(plain, _)| *plain == plain_tag).map(|(_, glo)| *glo)
}

/// Plaintext xDLMS tag for a glo-ciphered tag.
pub fn plain_tag(glo_tag: u8) -> Option<u8> {
    GLO_TAGS.iter().find(|(_, glo)| *glo == glo_tag).map(|(plain, _)| *plain)
}

pub fn is_glo_tag(tag: u8) -> bool {
    plain_tag(tag).is_some()
}

/// Security control byte for DLMS APDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    byte: u8,
}

impl SecurityControl {
    pub fn new(security_suite_id: u8, authenticated: bool, encrypted: bool, key_set: bool) -> Self {
        let mut byte = security_suite_id & 0x0F;
        if authenticated {
            byte |= 0x10;
        }
        if encrypted {
            byte |= 0x20;
        }
        if key_set {
            byte |= 0x40;
        }
        Self { byte }
    }

    /// Security control byte matching the policy of `suite`.
    pub fn for_suite(suite: &SecuritySuite) -> Self {
        let policy = suite.security_policy();
        Self::new(
            suite.encryption_mechanism().suite_id(),
            policy.is_authenticated(),
            policy.is_encrypted(),
            false,
        )
    }

    pub fn from_byte(byte: u8) -> Self {
        Self { byte }
    }

    pub fn to_byte(&self) -> u8 {
        self.byte
    }

    pub fn security_suite_id(&self) -> u8 {
        self.byte & 0x0F
    }

    pub fn is_authenticated(&self) -> bool {
        (self.byte & 0x10) != 0
    }

    pub fn is_encrypted(&self) -> bool {
        (self.byte & 0x20) != 0
    }

    pub fn is_key_set(&self) -> bool {
        (self.byte & 0x40) != 0
    }

    fn policy(&self) -> SecurityPolicy {
        match (self.is_authenticated(), self.is_encrypted()) {
            (true, true) => SecurityPolicy::AuthenticatedAndEncrypted,
            (true, false) => SecurityPolicy::Authenticated,
            (false, true) => SecurityPolicy::Encrypted,
            (false, false) => SecurityPolicy::Nothing,
        }
    }
}

/// Parsed ciphered envelope, payload still protected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipheredApdu {
    pub tag: u8,
    pub security_control: SecurityControl,
    pub frame_counter: u32,
    pub payload: Vec<u8>,
}

impl CipheredApdu {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + SECURITY_HEADER_LENGTH + 4);
        out.push(self.tag);
        LengthEncoding::encode_into(self.payload.len() + SECURITY_HEADER_LENGTH, &mut out);
        out.push(self.security_control.to_byte());
        out.extend_from_slice(&self.frame_counter.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// # Errors
    /// `Cipher` for an unknown tag or a length that does not match the buffer.
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| DlmsError::Cipher("Empty ciphered APDU".to_string()))?;
        if !is_glo_tag(tag) {
            return Err(DlmsError::Cipher(format!("Not a glo-ciphered tag: {}", tag)));
        }
        let (length, consumed) = LengthEncoding::decode(rest)
            .map_err(|e| DlmsError::Cipher(format!("Bad envelope length: {}", e)))?;
        let body = &rest[consumed..];
        if length != body.len() || length < SECURITY_HEADER_LENGTH {
            return Err(DlmsError::Cipher(format!(
                "Envelope length {} does not match {} available byte(s)",
                length,
                body.len()
            )));
        }
        Ok(Self {
            tag,
            security_control: SecurityControl::from_byte(body[0]),
            frame_counter: u32::from_be_bytes([body[1], body[2], body[3], body[4]]),
            payload: body[SECURITY_HEADER_LENGTH..].to_vec(),
        })
    }
}

/// Plaintext recovered from an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedApdu {
    pub tag: u8,
    pub frame_counter: u32,
    pub plaintext: Vec<u8>,
}

fn gcm(suite: &SecuritySuite) -> DlmsResult<Aes128Gcm12> {
    Aes128Gcm12::new_from_slice(suite.require_encryption_key()?)
        .map_err(|_| DlmsError::Security("Invalid AES-128 key length".to_string()))
}

fn associated_data(sc: SecurityControl, suite: &SecuritySuite, plaintext: Option<&[u8]>) -> Vec<u8> {
    let key = suite.authentication_key_or_empty();
    let mut aad = Vec::with_capacity(1 + key.len() + plaintext.map_or(0, <[u8]>::len));
    aad.push(sc.to_byte());
    aad.extend_from_slice(key);
    if let Some(plaintext) = plaintext {
        aad.extend_from_slice(plaintext);
    }
    aad
}

/// Protect `plaintext` under `suite` and wrap it in a glo envelope with tag `tag`.
///
/// # Errors
/// `Security` when the suite's policy is `Nothing` or its keys are missing.
pub fn encrypt(
    plaintext: &[u8],
    system_title: &SystemTitle,
    frame_counter: u32,
    suite: &SecuritySuite,
    tag: u8,
) -> DlmsResult<Vec<u8>> {
    let sc = SecurityControl::for_suite(suite);
    let iv = system_title.initialization_vector(frame_counter);
    let nonce = GenericArray::from_slice(&iv);
    let cipher = gcm(suite)?;
    let payload = match sc.policy() {
        SecurityPolicy::Nothing => {
            return Err(DlmsError::Security(
                "Cannot cipher an APDU under security policy Nothing".to_string(),
            ));
        }
        SecurityPolicy::AuthenticatedAndEncrypted => {
            let mut buffer = plaintext.to_vec();
            let auth_tag = cipher
                .encrypt_in_place_detached(nonce, &associated_data(sc, suite, None), &mut buffer)
                .map_err(|_| DlmsError::Cipher("AES-GCM encryption failed".to_string()))?;
            buffer.extend_from_slice(&auth_tag);
            buffer
        }
        SecurityPolicy::Encrypted => {
            let mut buffer = plaintext.to_vec();
            cipher
                .encrypt_in_place_detached(nonce, &[], &mut buffer)
                .map_err(|_| DlmsError::Cipher("AES-GCM encryption failed".to_string()))?;
            buffer
        }
        SecurityPolicy::Authenticated => {
            let auth_tag = cipher
                .encrypt_in_place_detached(
                    nonce,
                    &associated_data(sc, suite, Some(plaintext)),
                    &mut [],
                )
                .map_err(|_| DlmsError::Cipher("GMAC computation failed".to_string()))?;
            let mut buffer = plaintext.to_vec();
            buffer.extend_from_slice(&auth_tag);
            buffer
        }
    };
    Ok(CipheredApdu {
        tag,
        security_control: sc,
        frame_counter,
        payload,
    }
    .encode())
}

/// Verify and decrypt a glo envelope produced by the peer with `system_title`.
///
/// # Errors
/// `Cipher` for a malformed envelope, a security control byte that does not
/// match the suite's policy, or an authentication tag mismatch.
pub fn decrypt(
    envelope: &[u8],
    system_title: &SystemTitle,
    suite: &SecuritySuite,
) -> DlmsResult<DecryptedApdu> {
    let apdu = CipheredApdu::decode(envelope)?;
    let sc = apdu.security_control;
    if sc.policy() != suite.security_policy() || sc.security_suite_id() != suite.encryption_mechanism().suite_id() {
        return Err(DlmsError::Cipher(format!(
            "Security control 0x{:02X} does not match policy {:?}",
            sc.to_byte(),
            suite.security_policy()
        )));
    }
    let iv = system_title.initialization_vector(apdu.frame_counter);
    let nonce = GenericArray::from_slice(&iv);
    let cipher = gcm(suite)?;
    let mut payload = apdu.payload;
    let plaintext = match sc.policy() {
        SecurityPolicy::Nothing => {
            return Err(DlmsError::Cipher("Envelope is neither authenticated nor encrypted".to_string()));
        }
        SecurityPolicy::AuthenticatedAndEncrypted => {
            let split = payload
                .len()
                .checked_sub(TAG_LENGTH)
                .ok_or_else(|| DlmsError::Cipher("Envelope shorter than its tag".to_string()))?;
            let auth_tag = payload.split_off(split);
            cipher
                .decrypt_in_place_detached(
                    nonce,
                    &associated_data(sc, suite, None),
                    &mut payload,
                    GenericArray::from_slice(&auth_tag),
                )
                .map_err(|_| DlmsError::Cipher("Authentication tag mismatch".to_string()))?;
            payload
        }
        SecurityPolicy::Encrypted => {
            // GCM decryption is the CTR keystream applied again; the tag is not transmitted.
            cipher
                .encrypt_in_place_detached(nonce, &[], &mut payload)
                .map_err(|_| DlmsError::Cipher("AES-GCM decryption failed".to_string()))?;
            payload
        }
        SecurityPolicy::Authenticated => {
            let split = payload
                .len()
                .checked_sub(TAG_LENGTH)
                .ok_or_else(|| DlmsError::Cipher("Envelope shorter than its tag".to_string()))?;
            let auth_tag = payload.split_off(split);
            let expected = cipher
                .encrypt_in_place_detached(
                    nonce,
                    &associated_data(sc, suite, Some(&payload)),
                    &mut [],
                )
                .map_err(|_| DlmsError::Cipher("GMAC computation failed".to_string()))?;
            if !bool::from(expected.as_slice().ct_eq(&auth_tag)) {
                return Err(DlmsError::Cipher("Authentication tag mismatch".to_string()));
            }
            payload
        }
    };
    let tag = plain_tag(apdu.tag)
        .ok_or_else(|| DlmsError::Cipher(format!("Not a glo-ciphered tag: {}", apdu.tag)))?;
    Ok(DecryptedApdu {
        tag,
        frame_counter: apdu.frame_counter,
        plaintext,
    })
}
