//! Push-based streaming aggregation
//!
//! A `StreamingAggregator` keeps one `AggregationEngine` alive across many
//! `write` calls, flattens it once at `end`, and hands the result to every
//! registered observer exactly once.
//!
//! # Lifecycle
//!
//! ```text
//!   write* ──► end ──► result*
//!                │
//!                ├──► on(Data) observers (once each)
//!                └──► completion() receivers (once each)
//! ```
//!
//! `write` after `end`, `end` twice, and `result` before `end` fail with
//! `Error::State`. Observers registered after `end` run immediately.
//!
//! # Example
//!
//! ```rust
//! use skinner::aggregation::{create_aggregator, AggregatorConfig, StreamEvent};
//! use skinner::types::Datapoint;
//!
//! let mut stream = create_aggregator(AggregatorConfig::new(&["test"])).unwrap();
//! stream.write(&Datapoint::new(1.0).with_field("test", "basic")).unwrap();
//! stream.write(&Datapoint::new(2.0).with_field("test", "advanced")).unwrap();
//! stream.end().unwrap();
//!
//! let rows = stream.result().unwrap().as_rows().unwrap();
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[1].sum, 2.0);
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use super::bucketizer::{Bucketizer, BucketizerMap};
use super::engine::{
    AggregationEngine, EngineOptions, EngineStats, GroupKey, MissingFieldPolicy, Row,
};
use crate::error::{Error, Result, StateError};
use crate::types::{Datapoint, FieldValue, Fields, Scalar};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a streaming aggregator
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    /// Ordered decomposition field paths
    pub decomps: Vec<String>,

    /// Bucketizers keyed by decomposition field name
    pub bucketizers: BucketizerMap,

    /// Reshape each row into a datapoint at `end`
    pub results_as_points: bool,

    /// Handling of unresolvable fields
    pub missing_fields: MissingFieldPolicy,
}

impl AggregatorConfig {
    /// Config decomposing by the given fields
    pub fn new<S: AsRef<str>>(decomps: &[S]) -> Self {
        Self {
            decomps: decomps.iter().map(|d| d.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    /// Register one bucketizer
    pub fn with_bucketizer(mut self, field: impl Into<String>, b: Arc<dyn Bucketizer>) -> Self {
        self.bucketizers.insert(field.into(), b);
        self
    }

    /// Replace the bucketizer map
    pub fn with_bucketizers(mut self, bucketizers: BucketizerMap) -> Self {
        self.bucketizers = bucketizers;
        self
    }

    /// Emit datapoints instead of rows
    pub fn results_as_points(mut self, enabled: bool) -> Self {
        self.results_as_points = enabled;
        self
    }

    /// Set the missing-field policy
    pub fn with_missing_fields(mut self, policy: MissingFieldPolicy) -> Self {
        self.missing_fields = policy;
        self
    }

    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            decomp_fields: self.decomps.clone(),
            bucketizers: self.bucketizers.clone(),
            missing_fields: self.missing_fields,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Result of a finished stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateOutput {
    /// `[k1, ..., kn, sum]` rows
    Rows(Vec<Row>),
    /// Rows reshaped as `{ fields: { decomp: key, ... }, value: sum }`
    Points(Vec<Datapoint>),
}

impl AggregateOutput {
    /// Rows, if the stream was not configured for points
    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            AggregateOutput::Rows(rows) => Some(rows),
            AggregateOutput::Points(_) => None,
        }
    }

    /// Points, if the stream was configured for points
    pub fn as_points(&self) -> Option<&[Datapoint]> {
        match self {
            AggregateOutput::Points(points) => Some(points),
            AggregateOutput::Rows(_) => None,
        }
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        match self {
            AggregateOutput::Rows(rows) => rows.len(),
            AggregateOutput::Points(points) => points.len(),
        }
    }

    /// True if there are no groups
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reshape a row into a datapoint keyed by the decomposition names
///
/// Names are used verbatim, so `"data.state"` becomes a flat field. Missing
/// keys are left out and ordinals become numbers.
fn row_to_point(decomps: &[String], row: Row) -> Datapoint {
    let mut fields = Fields::new();
    for (name, key) in decomps.iter().zip(row.keys) {
        let value = match key {
            GroupKey::Value(scalar) => scalar,
            GroupKey::Ordinal(o) => Scalar::Number(o as f64),
            GroupKey::Missing => continue,
        };
        fields.insert(name.clone(), FieldValue::Scalar(value));
    }
    Datapoint::from_fields(fields, row.sum)
}

// ============================================================================
// Streaming Aggregator
// ============================================================================

/// Events a streaming aggregator can notify about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The result is ready; fired once, after `end`
    Data,
}

type Observer = Box<dyn FnOnce(&AggregateOutput) + Send>;

/// Incremental front end to an `AggregationEngine`
pub struct StreamingAggregator {
    engine: AggregationEngine,
    decomps: Vec<String>,
    results_as_points: bool,
    ended: bool,
    last_result: Option<AggregateOutput>,
    observers: Vec<Observer>,
    waiters: Vec<oneshot::Sender<AggregateOutput>>,
}

impl fmt::Debug for StreamingAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingAggregator")
            .field("decomps", &self.decomps)
            .field("results_as_points", &self.results_as_points)
            .field("ended", &self.ended)
            .field("observers", &self.observers.len())
            .field("waiters", &self.waiters.len())
            .finish_non_exhaustive()
    }
}

impl StreamingAggregator {
    /// Create a stream; fails on invalid field paths
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        let engine = AggregationEngine::new(config.engine_options())?;
        Ok(Self {
            engine,
            decomps: config.decomps,
            results_as_points: config.results_as_points,
            ended: false,
            last_result: None,
            observers: Vec::new(),
            waiters: Vec::new(),
        })
    }

    /// Accumulate one point
    pub fn write(&mut self, point: &Datapoint) -> Result<()> {
        if self.ended {
            return Err(StateError::WriteAfterEnd.into());
        }
        self.engine.ingest(point)
    }

    /// Accumulate points in order, stopping at the first error
    pub fn write_all<'a>(&mut self, points: impl IntoIterator<Item = &'a Datapoint>) -> Result<()> {
        for point in points {
            self.write(point)?;
        }
        Ok(())
    }

    /// Finish the stream, compute the result and notify observers
    pub fn end(&mut self) -> Result<&AggregateOutput> {
        if self.ended {
            return Err(StateError::AlreadyEnded.into());
        }
        self.ended = true;

        let rows = self.engine.finalize();
        let output = if self.results_as_points {
            AggregateOutput::Points(
                rows.into_iter()
                    .map(|row| row_to_point(&self.decomps, row))
                    .collect(),
            )
        } else {
            AggregateOutput::Rows(rows)
        };

        debug!(
            "Stream ended: {} group(s), {} observer(s), {} waiter(s)",
            output.len(),
            self.observers.len(),
            self.waiters.len()
        );

        let output: &AggregateOutput = self.last_result.insert(output);
        for observer in self.observers.drain(..) {
            observer(output);
        }
        for waiter in self.waiters.drain(..) {
            // receiver may have been dropped
            let _ = waiter.send(output.clone());
        }

        Ok(output)
    }

    /// The result computed by `end`
    pub fn result(&self) -> Result<&AggregateOutput> {
        self.last_result
            .as_ref()
            .ok_or(Error::State(StateError::ResultBeforeEnd))
    }

    /// Register an observer for `event`
    ///
    /// `StreamEvent::Data` handlers run once with the result: during `end`
    /// if registered before it, immediately otherwise.
    pub fn on<F>(&mut self, event: StreamEvent, handler: F)
    where
        F: FnOnce(&AggregateOutput) + Send + 'static,
    {
        match event {
            StreamEvent::Data => match &self.last_result {
                Some(output) => handler(output),
                None => self.observers.push(Box::new(handler)),
            },
        }
    }

    /// One-shot channel resolved with the result at `end`
    pub fn completion(&mut self) -> oneshot::Receiver<AggregateOutput> {
        let (tx, rx) = oneshot::channel();
        match &self.last_result {
            Some(output) => {
                let _ = tx.send(output.clone());
            }
            None => self.waiters.push(tx),
        }
        rx
    }

    /// True once `end` has been called
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Counters of the underlying engine
    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}

/// Create a streaming aggregator
pub fn create_aggregator(config: AggregatorConfig) -> Result<StreamingAggregator> {
    StreamingAggregator::new(config)
}
