//! Domain logic for metrics ingestion
//!
//! - `context` - Deadline-bound request context
//! - `metrics` - Decode, transform and store pipeline
//! - `validate` - Request validation and partition key extraction

pub mod context;
pub mod metrics;
pub mod validate;

pub use context::{DoneReason, RequestContext};
pub use metrics::{IngestError, IngestPipeline, Outcome};
pub use validate::{HeaderValidator, ValidateError, Validated, Validator};
