//! Skinner - grouped sums and histograms over tagged datapoints
//!
//! This library provides pivot-table style aggregation with:
//! - Ordered multi-level grouping by dot-delimited field paths
//! - Pluggable bucketizers (linear, power-of-two) for numeric histograms
//! - Batch and streaming (`write` / `end` / `result`) interfaces
//! - Conversion of bucket ordinals into inclusive value ranges

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Grouping engine, bucketizers, and the streaming aggregator
pub mod aggregation;

// Re-export main types
pub use aggregation::{
    aggregate, create_aggregator, make_linear_bucketizer, ordinal_to_bounds, AggregatorConfig,
    Bucketizer, BucketizerMap, GroupKey, Row, StreamingAggregator,
};
pub use config::SkinnerConfig;
pub use error::{Error, Result};
pub use types::{Datapoint, FieldValue, Fields, Scalar};
