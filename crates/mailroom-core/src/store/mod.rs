pub mod coverage_store;
pub mod db;
pub mod envelope_ledger;
pub mod label_store;
pub mod mailbox_store;

pub use coverage_store::CoverageStore;
pub use db::Database;
pub use envelope_ledger::EnvelopeLedger;
pub use label_store::LabelStore;
pub use mailbox_store::MailboxStore;

use rusqlite::params;

use crate::error::Result;
use crate::models::Message;

/// Persist a decoded message and mark its envelope processed, atomically.
pub fn commit_message(db: &Database, message: &Message) -> Result<()> {
    db.with_transaction(|tx| {
        mailbox_store::upsert_message(tx, message)?;
        envelope_ledger::mark_processed_in(tx, &message.id)?;
        Ok(())
    })
}

/// Remove a message, its ledger entry and all its labels in one transaction.
///
/// Returns whether the message existed.
pub fn purge_message(db: &Database, message_id: &str) -> Result<bool> {
    db.with_transaction(|tx| {
        let removed = tx.execute("DELETE FROM messages WHERE id = ?1", params![message_id])?;
        tx.execute("DELETE FROM envelopes WHERE id = ?1", params![message_id])?;
        tx.execute("DELETE FROM labels WHERE message_id = ?1", params![message_id])?;
        Ok(removed > 0)
    })
}
