/// Errors surfaced by the mailbox engine.
///
/// Transient ingestion failures and terminal ingestion outcomes are not
/// errors; they are recorded in the envelope ledger instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("No local identity configured")]
    NotConfigured,

    #[error("Not found: {id}")]
    NotFound { id: String },

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Invalid label: {label:?}")]
    InvalidLabel { label: String },

    #[error("Unknown recipient: {address}")]
    UnknownRecipient { address: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record {id}: {message}")]
    CorruptRecord { id: String, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Crypto error: {message}")]
    Crypto { message: String },
}

impl CoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound { id: id.into() }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        CoreError::Transport {
            message: err.to_string(),
        }
    }

    pub fn crypto(err: impl std::fmt::Display) -> Self {
        CoreError::Crypto {
            message: err.to_string(),
        }
    }

    /// True for "nothing to do" conditions, as opposed to faults.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
