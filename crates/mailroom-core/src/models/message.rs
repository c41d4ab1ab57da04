use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{kinds, tags};
use crate::models::tag_utils::first_tag_value;

/// A decoded mail message. `id` is the id of the envelope it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body_text: String,
    pub created_at: u64,
    /// Unparsed body, kept for re-deriving alternate representations
    pub raw_body: String,
}

/// Why a decrypted rumor could not become a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RumorError {
    NotMail { kind: u16 },
    MissingRecipient,
}

impl Message {
    /// Build a message from the decrypted rumor of envelope `envelope_id`.
    ///
    /// The true recipient comes from the rumor's own `p` tag, not from the
    /// envelope (the sender's own copy is wrapped for the sender).
    pub fn from_rumor(envelope_id: &str, rumor: &UnsignedEvent) -> Result<Self, RumorError> {
        let kind = rumor.kind.as_u16();
        if kind != kinds::MAIL {
            return Err(RumorError::NotMail { kind });
        }

        let recipient =
            first_tag_value(&rumor.tags, tags::PUBKEY).ok_or(RumorError::MissingRecipient)?;

        Ok(Self {
            id: envelope_id.to_string(),
            sender: rumor.pubkey.to_hex(),
            recipient: recipient.to_string(),
            subject: first_tag_value(&rumor.tags, tags::SUBJECT)
                .unwrap_or_default()
                .to_string(),
            body_text: body_text(&rumor.content),
            created_at: rumor.created_at.as_u64(),
            raw_body: rumor.content.clone(),
        })
    }

    /// First non-empty line of the body, for list views
    pub fn preview(&self) -> &str {
        self.body_text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Plain-text body: normalized line endings, trailing whitespace dropped.
fn body_text(raw: &str) -> String {
    raw.replace("\r\n", "\n").trim_end().to_string()
}
