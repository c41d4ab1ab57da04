//! Contracts for the collaborators the engine talks to, and the nostr-sdk
//! implementations used in production.

pub mod coverage;
pub mod crypto;
pub mod directory;
pub mod queries;
pub mod transport;

pub use coverage::{coverage_key, CoverageTracker};
pub use crypto::{DecryptError, EnvelopeCrypto, KeysCrypto};
pub use directory::{AddressResolver, Nip05Resolver};
pub use queries::LogicalQuery;
pub use transport::{RelayTransport, Subscription, Transport};
