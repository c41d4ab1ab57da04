use serde::{Deserialize, Serialize};

/// Processing state of an envelope in the ledger.
///
/// The transition `Unprocessed -> Processed` is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Unprocessed,
    Processed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Unprocessed => "unprocessed",
            ProcessingState::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unprocessed" => Some(ProcessingState::Unprocessed),
            "processed" => Some(ProcessingState::Processed),
            _ => None,
        }
    }
}

/// Ledger entry for one observed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    pub id: String,
    pub state: ProcessingState,
    /// Declared recipient (`p` tag) of the envelope, if any
    pub recipient: Option<String>,
    pub first_seen: u64,
}

/// Result of running one envelope through the ingestion state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Already recorded in the ledger; nothing was done
    Duplicate,
    /// Addressed to another local identity; left unprocessed
    NotAddressedToUs,
    /// Decryption failed transiently; left unprocessed for retry
    Deferred,
    /// Signer refused to decrypt; recorded as processed
    Rejected,
    /// Decrypted content is not mail; recorded as processed
    NotMail { kind: u16 },
    /// Decrypted mail without a recipient tag; recorded as processed
    Malformed,
    /// Message stored and envelope marked processed
    Stored(super::Message),
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, IngestOutcome::Stored(_))
    }

    /// Outcomes that permanently exclude the envelope from retry
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestOutcome::Rejected | IngestOutcome::NotMail { .. } | IngestOutcome::Malformed
        )
    }
}
