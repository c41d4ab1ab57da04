use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Presence of `label` on `message_id`, asserted by event `label_event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub message_id: String,
    pub label: String,
    pub label_event_id: String,
}

/// What an upsert did to the label store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelUpsert {
    Inserted,
    /// The pair existed under a different asserting event
    Replaced { previous_event_id: String },
    Unchanged,
    /// The asserting event was retracted earlier; nothing was written
    Retracted,
}

/// Labels are opaque strings; the only rule is that they are non-empty.
pub fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(CoreError::InvalidLabel {
            label: label.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label() {
        assert!(validate_label("folder:archive").is_ok());
        assert!(validate_label("anything goes").is_ok());
        assert!(matches!(
            validate_label(""),
            Err(CoreError::InvalidLabel { .. })
        ));
        assert!(validate_label("   ").is_err());
    }
}
