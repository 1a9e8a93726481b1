//! Data layer
//!
//! - `store` - Metric storage backends and the rate-limiting decorator

pub mod store;
