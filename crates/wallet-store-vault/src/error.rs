use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown wallet: {id}")]
    UnknownWallet { id: Uuid },

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Account already exists: {id}")]
    AlreadyExists { id: Uuid },

    #[error("Identifier {id} is reserved for the wallet header")]
    ReservedId { id: Uuid },

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Prefixes the message with the failing operation, keeping the variant.
    #[must_use]
    pub fn context(self, op: &str) -> Self {
        match self {
            Self::Configuration(msg) => Self::Configuration(format!("{op}: {msg}")),
            Self::Encryption(msg) => Self::Encryption(format!("{op}: {msg}")),
            Self::Decryption(msg) => Self::Decryption(format!("{op}: {msg}")),
            Self::MalformedPayload(msg) => Self::MalformedPayload(format!("{op}: {msg}")),
            Self::Backend(msg) => Self::Backend(format!("{op}: {msg}")),
            other => other,
        }
    }

    /// Whether this error means the entry is simply absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
