//! Security suite configuration for DLMS/COSEM

use crate::error::{DlmsError, DlmsResult};
use std::fmt;

/// Length of every symmetric key of suite 0
pub const KEY_LENGTH: usize = 16;

/// Security policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    /// No encryption and authentication
    Nothing = 0,
    /// All messages to be authenticated
    Authenticated = 1,
    /// All messages to be encrypted
    Encrypted = 2,
    /// All messages to be authenticated and encrypted
    AuthenticatedAndEncrypted = 3,
}

impl SecurityPolicy {
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> DlmsResult<Self> {
        match id {
            0 => Ok(SecurityPolicy::Nothing),
            1 => Ok(SecurityPolicy::Authenticated),
            2 => Ok(SecurityPolicy::Encrypted),
            3 => Ok(SecurityPolicy::AuthenticatedAndEncrypted),
            _ => Err(DlmsError::Security(format!("Invalid security policy ID: {}", id))),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SecurityPolicy::Authenticated | SecurityPolicy::AuthenticatedAndEncrypted)
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, SecurityPolicy::Encrypted | SecurityPolicy::AuthenticatedAndEncrypted)
    }

    pub fn is_ciphered(&self) -> bool {
        *self != SecurityPolicy::Nothing
    }
}

/// Encryption mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMechanism {
    /// Do not encrypt transport
    None,
    /// Use AES-128-GCM (security suite 0)
    AesGcm128,
}

impl EncryptionMechanism {
    /// Security suite id carried in the low bits of the security control byte
    pub fn suite_id(&self) -> u8 {
        0
    }

    pub fn key_length_bytes(&self) -> Option<usize> {
        match self {
            EncryptionMechanism::None => None,
            EncryptionMechanism::AesGcm128 => Some(KEY_LENGTH),
        }
    }

    pub fn validate_key_length(&self, key: &[u8]) -> DlmsResult<()> {
        if let Some(expected_len) = self.key_length_bytes() {
            if key.len() != expected_len {
                return Err(DlmsError::Security(format!(
                    "Invalid key length: expected {} bytes, got {}",
                    expected_len,
                    key.len()
                )));
            }
        }
        Ok(())
    }
}

/// Authentication mechanism, numbered by the last arc of its mechanism-name OID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationMechanism {
    /// No authentication used
    None = 0,
    /// Authentication of the client by sending a shared password as secret
    Low = 1,
    /// HLS with MD5 over challenge and authentication key
    HlsMd5 = 3,
    /// HLS with GMAC over security control, authentication key and challenge
    HlsGmac = 5,
    /// HLS with SHA-256 over challenge and authentication key
    HlsSha256 = 6,
}

impl AuthenticationMechanism {
    pub fn id(&self) -> u32 {
        *self as u32
    }

    pub fn from_id(id: u32) -> DlmsResult<Self> {
        match id {
            0 => Ok(AuthenticationMechanism::None),
            1 => Ok(AuthenticationMechanism::Low),
            3 => Ok(AuthenticationMechanism::HlsMd5),
            5 => Ok(AuthenticationMechanism::HlsGmac),
            6 => Ok(AuthenticationMechanism::HlsSha256),
            _ => Err(DlmsError::Security(format!("Invalid authentication mechanism ID: {}", id))),
        }
    }

    pub fn is_hls_mechanism(&self) -> bool {
        matches!(
            self,
            AuthenticationMechanism::HlsMd5
                | AuthenticationMechanism::HlsGmac
                | AuthenticationMechanism::HlsSha256
        )
    }
}

/// Security suite builder
#[derive(Debug, Clone)]
pub struct SecuritySuiteBuilder {
    encryption_mechanism: EncryptionMechanism,
    authentication_mechanism: AuthenticationMechanism,
    global_unicast_encryption_key: Option<Vec<u8>>,
    authentication_key: Option<Vec<u8>>,
    master_key: Option<Vec<u8>>,
    password: Option<Vec<u8>>,
    security_policy: Option<SecurityPolicy>,
}

impl SecuritySuiteBuilder {
    /// Create a new security suite builder with default config (no authentication and no encryption)
    pub fn new() -> Self {
        Self {
            encryption_mechanism: EncryptionMechanism::None,
            authentication_mechanism: AuthenticationMechanism::None,
            global_unicast_encryption_key: None,
            authentication_key: None,
            master_key: None,
            password: None,
            security_policy: None,
        }
    }

    pub fn set_security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.security_policy = Some(policy);
        self
    }

    pub fn set_encryption_mechanism(mut self, mechanism: EncryptionMechanism) -> Self {
        self.encryption_mechanism = mechanism;
        self
    }

    pub fn set_authentication_mechanism(mut self, mechanism: AuthenticationMechanism) -> Self {
        self.authentication_mechanism = mechanism;
        self
    }

    pub fn set_global_unicast_encryption_key(mut self, key: Vec<u8>) -> Self {
        self.global_unicast_encryption_key = Some(key);
        self
    }

    pub fn set_authentication_key(mut self, key: Vec<u8>) -> Self {
        self.authentication_key = Some(key);
        self
    }

    /// Set the key-encryption key used to unwrap transferred keys
    pub fn set_master_key(mut self, key: Vec<u8>) -> Self {
        self.master_key = Some(key);
        self
    }

    /// Set the password (for LOW authentication)
    pub fn set_password(mut self, password: Vec<u8>) -> Self {
        self.password = Some(password);
        self.authentication_mechanism = AuthenticationMechanism::Low;
        self
    }

    /// Build the security suite
    ///
    /// Without an explicit policy, HLS with a cipher implies authenticated and
    /// encrypted messages, a cipher alone implies encrypted messages.
    pub fn build(self) -> DlmsResult<SecuritySuite> {
        let security_policy = self.security_policy.unwrap_or_else(|| {
            match (
                self.authentication_mechanism.is_hls_mechanism(),
                self.encryption_mechanism != EncryptionMechanism::None,
            ) {
                (true, true) => SecurityPolicy::AuthenticatedAndEncrypted,
                (false, true) => SecurityPolicy::Encrypted,
                _ => SecurityPolicy::Nothing,
            }
        });

        self.validate(&security_policy)?;

        Ok(SecuritySuite {
            global_unicast_encryption_key: self.global_unicast_encryption_key,
            authentication_key: self.authentication_key,
            master_key: self.master_key,
            password: self.password,
            encryption_mechanism: self.encryption_mechanism,
            authentication_mechanism: self.authentication_mechanism,
            security_policy,
        })
    }

    /// Check that the configured keys and password fit the mechanisms.
    pub fn validate(&self, security_policy: &SecurityPolicy) -> DlmsResult<()> {
        if security_policy.is_ciphered() && self.encryption_mechanism == EncryptionMechanism::None {
            return Err(DlmsError::Security(
                "Select a cryptographic algorithm to protect messages".to_string(),
            ));
        }

        if security_policy.is_ciphered() && self.global_unicast_encryption_key.is_none() {
            return Err(DlmsError::Security(
                "Ciphered policy requires a global unicast encryption key".to_string(),
            ));
        }

        if security_policy.is_authenticated() && self.authentication_key.is_none() {
            return Err(DlmsError::Security(
                "Authenticated policy requires an authentication key".to_string(),
            ));
        }

        for key in [&self.global_unicast_encryption_key, &self.authentication_key, &self.master_key]
            .into_iter()
            .flatten()
        {
            if key.len() != KEY_LENGTH {
                return Err(DlmsError::Security(format!(
                    "Invalid key length: expected {} bytes, got {}",
                    KEY_LENGTH,
                    key.len()
                )));
            }
        }

        match self.authentication_mechanism {
            AuthenticationMechanism::HlsGmac => {
                if self.authentication_key.is_none() || self.global_unicast_encryption_key.is_none() {
                    return Err(DlmsError::Security(
                        "HLS-GMAC requires both authentication and encryption keys".to_string(),
                    ));
                }
                if self.encryption_mechanism == EncryptionMechanism::None {
                    return Err(DlmsError::Security(
                        "HLS-GMAC requires the AES-GCM-128 mechanism".to_string(),
                    ));
                }
            }
            AuthenticationMechanism::HlsMd5 | AuthenticationMechanism::HlsSha256 => {
                if self.authentication_key.is_none() {
                    return Err(DlmsError::Security(
                        "HLS digest mechanisms require an authentication key".to_string(),
                    ));
                }
            }
            AuthenticationMechanism::Low => {
                if self.password.is_none() {
                    return Err(DlmsError::Security(
                        "Password is not set for the security level low".to_string(),
                    ));
                }
            }
            AuthenticationMechanism::None => {}
        }

        Ok(())
    }
}

impl Default for SecuritySuiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Security suite
///
/// Immutable once built. A key change produces a new suite through
/// [`SecuritySuite::with_replaced_keys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySuite {
    global_unicast_encryption_key: Option<Vec<u8>>,
    authentication_key: Option<Vec<u8>>,
    master_key: Option<Vec<u8>>,
    password: Option<Vec<u8>>,
    encryption_mechanism: EncryptionMechanism,
    authentication_mechanism: AuthenticationMechanism,
    security_policy: SecurityPolicy,
}

impl SecuritySuite {
    pub fn builder() -> SecuritySuiteBuilder {
        SecuritySuiteBuilder::new()
    }

    pub fn global_unicast_encryption_key(&self) -> Option<&[u8]> {
        self.global_unicast_encryption_key.as_deref()
    }

    pub fn authentication_key(&self) -> Option<&[u8]> {
        self.authentication_key.as_deref()
    }

    pub fn master_key(&self) -> Option<&[u8]> {
        self.master_key.as_deref()
    }

    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    pub fn encryption_mechanism(&self) -> EncryptionMechanism {
        self.encryption_mechanism
    }

    pub fn authentication_mechanism(&self) -> AuthenticationMechanism {
        self.authentication_mechanism
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    /// Encryption key, required by every ciphering operation.
    pub fn require_encryption_key(&self) -> DlmsResult<&[u8]> {
        self.global_unicast_encryption_key()
            .ok_or_else(|| DlmsError::Security("No global unicast encryption key".to_string()))
    }

    /// Authentication key, or the empty slice when none is configured.
    pub fn authentication_key_or_empty(&self) -> &[u8] {
        self.authentication_key().unwrap_or(&[])
    }

    /// Copy of this suite with the given keys replaced.
    pub fn with_replaced_keys(
        &self,
        encryption_key: Option<Vec<u8>>,
        authentication_key: Option<Vec<u8>>,
    ) -> DlmsResult<SecuritySuite> {
        let mut next = self.clone();
        if let Some(key) = encryption_key {
            self.encryption_mechanism.validate_key_length(&key)?;
            next.global_unicast_encryption_key = Some(key);
        }
        if let Some(key) = authentication_key {
            if key.len() != KEY_LENGTH {
                return Err(DlmsError::Security(format!(
                    "Authentication key must be {} bytes, got {}",
                    KEY_LENGTH,
                    key.len()
                )));
            }
            next.authentication_key = Some(key);
        }
        Ok(next)
    }
}

impl Default for SecuritySuite {
    fn default() -> Self {
        Self {
            global_unicast_encryption_key: None,
            authentication_key: None,
            master_key: None,
            password: None,
            encryption_mechanism: EncryptionMechanism::None,
            authentication_mechanism: AuthenticationMechanism::None,
            security_policy: SecurityPolicy::Nothing,
        }
    }
}

impl fmt::Display for SecuritySuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SecuritySuite(encryption={:?}, auth={:?}, policy={:?})",
            self.encryption_mechanism, self.authentication_mechanism, self.security_policy
        )
    }
}
