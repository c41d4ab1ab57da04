pub mod driver;
pub mod feed;
pub mod ingest;
pub mod live;
pub mod mutations;
pub mod outbound;
pub mod pending;
pub mod reconcile;

pub use driver::{QueryReport, SyncDriver, SyncReport};
pub use feed::{ChangeEmitter, ChangeFeed};
pub use ingest::{IngestionPipeline, RetryReport};
pub use live::LiveMultiplexer;
pub use mutations::{LabelCoordinator, LabelMutation};
pub use pending::{
    DeliveryOutcome, Dispatcher, MutationState, OperationKind, OperationStatus, PendingDelivery,
    PendingOperation, PendingOperations,
};
pub use reconcile::Reconciler;
