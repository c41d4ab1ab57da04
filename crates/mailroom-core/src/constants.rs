//! Application-wide constants
//!
//! Centralized location for event kinds, tag names and defaults that are
//! shared by the stores, the sync driver and the mutation paths.

/// Default Nostr relay URL
pub const RELAY_URL: &str = "wss://relay.damus.io";

/// Default NIP-32 namespace for mailbox labels
pub const LABEL_NAMESPACE: &str = "mailroom";

/// Default timeout for bounded historical queries
pub const QUERY_TIMEOUT_SECS: u64 = 10;

/// Default timeout for a single broadcast
pub const BROADCAST_TIMEOUT_SECS: u64 = 5;

/// Capacity of the shared change feed before slow listeners start lagging
pub const FEED_CAPACITY: usize = 1024;

// Nostr event kinds used by the mailbox
pub mod kinds {
    /// NIP-09 deletion request
    pub const DELETION: u16 = 5;
    /// NIP-17 chat message (known non-mail rumor)
    pub const CHAT_MESSAGE: u16 = 14;
    /// NIP-59 gift wrap (the encrypted envelope)
    pub const GIFT_WRAP: u16 = 1059;
    /// Mail rumor carried inside a gift wrap
    pub const MAIL: u16 = 1301;
    /// NIP-32 label assertion
    pub const LABEL: u16 = 1985;
}

// Tag names read from or written to events
pub mod tags {
    pub const SUBJECT: &str = "subject";
    pub const LABEL_NAMESPACE: &str = "L";
    pub const LABEL: &str = "l";
    pub const EVENT: &str = "e";
    pub const PUBKEY: &str = "p";
    pub const KIND: &str = "k";
}

// Well-known label names
pub mod labels {
    /// Prefix for folder labels; a message without any is in the inbox
    pub const FOLDER_PREFIX: &str = "folder:";
    pub const READ: &str = "state:read";
    pub const STARRED: &str = "flag:starred";
    pub const INBOX: &str = "inbox";
    pub const TRASH: &str = "folder:trash";

    /// Label name for a folder, e.g. `folder("archive")` -> `folder:archive`
    pub fn folder(name: &str) -> String {
        format!("{}{}", FOLDER_PREFIX, name)
    }

    pub fn is_folder(label: &str) -> bool {
        label.starts_with(FOLDER_PREFIX)
    }
}
