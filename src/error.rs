// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Separates propagated failures from recoverable refusal markers

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Request rejected by {endpoint}: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Refused: {0}")]
    Refused(#[from] Refusal),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 2,
            Error::Network(_) => 3,
            Error::Api { .. } => 4,
            Error::Rejected { .. } => 4,
            Error::Parse(_) => 5,
            Error::Filesystem(_) => 6,
            Error::Config(_) => 7,
            Error::Refused(_) => 8,
        }
    }

    /// True when the service answered but turned this one request down.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Api { .. } | Error::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failure the client reports as data instead of raising.
///
/// None of these involve a failed network exchange: they are decided locally
/// (missing cookie), or from a lookup the service answered successfully
/// (no matching group, no CSRF token, upload limit exceeded).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("session cookie required but not configured")]
    NotAuthorized,

    #[error("no CSRF token found on page")]
    CsrfTokenMissing,

    #[error("no group named {0:?} visible to this session")]
    GroupNotFound(String),

    #[error("attachment of {size} bytes exceeds the upload limit")]
    UploadTooLarge { size: u64 },
}

/// Inner result of an operation that may refuse.
pub type Outcome<T> = std::result::Result<T, Refusal>;
