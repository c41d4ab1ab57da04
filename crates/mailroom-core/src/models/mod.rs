pub mod envelope;
pub mod label;
pub mod message;
pub mod parsed_event;
pub mod tag_utils;
pub mod time_range;

pub use envelope::{EnvelopeRecord, IngestOutcome, ProcessingState};
pub use label::{validate_label, LabelRecord, LabelUpsert};
pub use message::{Message, RumorError};
pub use parsed_event::{DeletionRequest, EnvelopeHeader, LabelAssertion, ParsedEvent};
pub use time_range::TimeRange;
