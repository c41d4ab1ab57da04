use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::kinds;

/// One of the four reconciled event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalQuery {
    /// Gift wraps addressed to us
    Messages,
    /// Our own deletion requests for gift wraps
    MessageDeletions,
    /// Our own label events in the mailbox namespace
    Labels,
    /// Our own deletion requests for label events
    LabelDeletions,
}

impl LogicalQuery {
    pub const ALL: [LogicalQuery; 4] = [
        LogicalQuery::Messages,
        LogicalQuery::MessageDeletions,
        LogicalQuery::Labels,
        LogicalQuery::LabelDeletions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LogicalQuery::Messages => "messages",
            LogicalQuery::MessageDeletions => "message_deletions",
            LogicalQuery::Labels => "labels",
            LogicalQuery::LabelDeletions => "label_deletions",
        }
    }

    /// Base filter for this stream, without any time bounds.
    pub fn filter(&self, me: &PublicKey, namespace: &str) -> Filter {
        match self {
            LogicalQuery::Messages => Filter::new().kind(Kind::GiftWrap).pubkey(*me),
            LogicalQuery::MessageDeletions => deletions_of(me, kinds::GIFT_WRAP),
            LogicalQuery::Labels => Filter::new()
                .kind(Kind::from(kinds::LABEL))
                .author(*me)
                .custom_tag(SingleLetterTag::uppercase(Alphabet::L), namespace.to_string()),
            LogicalQuery::LabelDeletions => deletions_of(me, kinds::LABEL),
        }
    }
}

impl std::fmt::Display for LogicalQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn deletions_of(me: &PublicKey, target_kind: u16) -> Filter {
    Filter::new()
        .kind(Kind::EventDeletion)
        .author(*me)
        .custom_tag(SingleLetterTag::lowercase(Alphabet::K), target_kind.to_string())
}
