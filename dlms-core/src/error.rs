use thiserror::Error;

/// Main error type for DLMS/COSEM operations
///
/// The variants follow the failure taxonomy of the association engine:
/// malformed input (`ProtocolDecode`, `FrameInvalid`), ciphering failures
/// (`Cipher`), rejected credentials (`AuthenticationFailure`), per-request
/// access denial (`AccessDenied`), expired waits (`Timeout`) and the
/// peer-initiated `CleanShutdown`, which is not a fault.
#[derive(Error, Debug)]
pub enum DlmsError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Timeout")]
    Timeout,

    #[error("Association shut down by peer")]
    CleanShutdown,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("ASN.1 encoding error: {0}")]
    Asn1Encoding(String),

    #[error("Frame invalid: {0}")]
    FrameInvalid(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),
}

impl DlmsError {
    /// Peer-initiated release or disconnect; callers should not log it as a failure.
    pub fn is_clean_shutdown(&self) -> bool {
        matches!(self, DlmsError::CleanShutdown)
    }

    /// Whether the error must tear down the association it occurred in.
    ///
    /// Only access denial is recoverable at the single-request level.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DlmsError::AccessDenied(_) | DlmsError::CleanShutdown)
    }

    /// Shorthand for an unexpected end of stream.
    pub fn unexpected_eof(context: &str) -> Self {
        DlmsError::Connection(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            context.to_string(),
        ))
    }
}

/// Result type alias for DLMS/COSEM operations
pub type DlmsResult<T> = Result<T, DlmsError>;
