use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};

use crate::error::Result;

const DB_FILE: &str = "mailroom.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS envelopes (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    recipient TEXT,
    raw TEXT,
    first_seen INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_envelopes_state ON envelopes(state);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    recipient TEXT NOT NULL,
    subject TEXT NOT NULL,
    body_text TEXT NOT NULL,
    raw_body TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender);
CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient);
CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);

CREATE TABLE IF NOT EXISTS labels (
    message_id TEXT NOT NULL,
    label TEXT NOT NULL,
    label_event_id TEXT NOT NULL,
    PRIMARY KEY (message_id, label)
);
CREATE INDEX IF NOT EXISTS idx_labels_event ON labels(label_event_id);
CREATE INDEX IF NOT EXISTS idx_labels_label ON labels(label);

CREATE TABLE IF NOT EXISTS label_tombstones (
    label_event_id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS coverage (
    filter_key TEXT NOT NULL,
    since INTEGER NOT NULL,
    until INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_coverage_key ON coverage(filter_key);
"#;

/// Shared SQLite handle used by every store.
///
/// All access goes through one connection; each store call is a single
/// statement or an explicit transaction, never held across an await.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database inside `db_dir`
    pub fn new<P: AsRef<Path>>(db_dir: P) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;

        let conn = Connection::open(db_dir.join(DB_FILE))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}
