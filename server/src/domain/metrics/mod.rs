//! Metrics ingestion
//!
//! - `family` - Prometheus client-model types shared by every stage
//! - `decode` - Text and delimited protobuf decoders
//! - `transform` - Filtering and relabeling passes
//! - `syntax` - nom parsers shared by the text decoder and whitelist rules
//! - `pack` - Merging of same-named families before storage
//! - `encode` - Text format rendering for federation
//! - `pipeline` - Decode, transform, pack and store for one request

pub mod decode;
pub mod encode;
pub mod family;
pub mod pack;
pub mod pipeline;
mod syntax;
pub mod transform;

pub use family::{MetricFamily, MetricType};
pub use pipeline::{IngestError, IngestPipeline, Outcome};
