//! Local-first reconciliation of NIP-59 gift-wrapped mail into a mailbox.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod nostr;
pub mod runtime;
pub mod stats;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::CoreConfig;
pub use engine::{ChangeFeed, DeliveryOutcome, LabelMutation, MutationState, SyncReport};
pub use error::{CoreError, Result};
pub use events::ChangeEvent;
pub use models::Message;
pub use runtime::{Collaborators, MailroomCore, SentMessage};
