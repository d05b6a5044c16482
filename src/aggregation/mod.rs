//! Grouped Sum Aggregation
//!
//! This module computes pivot-table style sums and histograms over tagged
//! datapoints, either in one batch call or incrementally from a stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │            Datapoints               │
//! │   { fields: {...}, value: n }       │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │   pluck + Bucketizer per level      │
//! │   path → scalar → key / ordinal     │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │        AggregationEngine            │
//! │   ordered grouping tree of sums     │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │   Rows  [k1, ..., kn, sum]          │
//! │   (or datapoints via a stream)      │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - **pluck**: dot-delimited lookup into nested field mappings
//! - **Bucketizer**: pluggable quantization (linear, power-of-two)
//! - **AggregationEngine**: grouping tree with first-seen / ordinal ordering
//! - **StreamingAggregator**: `write` / `end` / `result` / `on` wrapper
//!
//! # Example
//!
//! ```rust
//! use skinner::aggregation::{aggregate, make_linear_bucketizer, ordinal_to_bounds, BucketizerMap};
//! use skinner::types::Datapoint;
//!
//! let points: Vec<Datapoint> = [83.0, 13.0, 88.0, 9.0]
//!     .iter()
//!     .map(|&util| Datapoint::new(1.0).with_field("util", util))
//!     .collect();
//!
//! let mut bucketizers = BucketizerMap::new();
//! bucketizers.insert("util".to_string(), make_linear_bucketizer(10).unwrap());
//!
//! let rows = aggregate(&points, &["util"], &bucketizers).unwrap();
//! let histogram = ordinal_to_bounds(bucketizers["util"].as_ref(), &rows).unwrap();
//!
//! assert_eq!(histogram[0].bounds, Some((0, 9)));
//! assert_eq!(histogram[2].bounds, Some((80, 89)));
//! assert_eq!(histogram[2].sum, 2.0);
//! ```

pub mod bucketizer;
pub mod engine;
pub mod pluck;
pub mod stream;

pub use bucketizer::{
    make_linear_bucketizer, make_power_of_two_bucketizer, Bounds, Bucketizer, BucketizerMap,
    BucketizerSpec, LinearBucketizer, Ordinal, PowerOfTwoBucketizer,
};

pub use engine::{
    aggregate, aggregate_with, ordinal_to_bounds, AggregationEngine, BoundedRow, EngineOptions,
    EngineStats, GroupKey, MissingFieldPolicy, Row,
};

pub use pluck::{pluck, Plucked};

pub use stream::{
    create_aggregator, AggregateOutput, AggregatorConfig, StreamEvent, StreamingAggregator,
};
