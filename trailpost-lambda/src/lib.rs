//! Lambda side of trailpost: trigger envelopes, S3 log retrieval,
//! AWS-backed collaborators and per-invocation batch processing.

pub mod aws;
pub mod envelope;
pub mod handler;
pub mod logging;
pub mod source;
pub mod startup;

pub use envelope::{ObjectEvent, ObjectEventKind};
pub use handler::{Handler, InvocationSummary};
pub use source::{MemoryObjectSource, ObjectSource};
