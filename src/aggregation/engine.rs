//! Grouping Tree Aggregation Engine
//!
//! Builds an ordered grouping tree from an ordered list of decomposition
//! fields and accumulates the sum of `value` at each leaf.
//!
//! # Architecture
//!
//! ```text
//! Datapoint ──► pluck(path) per level ──► GroupKey per level
//!                                              │
//!                 ┌────────────────────────────┘
//!                 ▼
//! ┌──────────────────────────────────────────────────┐
//! │ root                                             │
//! │  ├── "MA" (first seen #0)                        │
//! │  │     ├── "Springfield" ── sum                  │
//! │  │     └── "Boston"      ── sum                  │
//! │  └── "CA" (first seen #3)                        │
//! │        └── "Fresno"      ── sum                  │
//! └──────────────────────────────────────────────────┘
//!                 │ finalize (depth-first)
//!                 ▼
//! [ "MA", "Springfield", sum ], [ "MA", "Boston", sum ], ...
//! ```
//!
//! # Ordering
//!
//! - **Plain levels** emit children in first-seen order, so the output row
//!   order is a function of the input order.
//! - **Bucketized levels** emit children by ascending ordinal, with the
//!   missing-field group (if any) last.
//!
//! # Example
//!
//! ```rust
//! use skinner::aggregation::{aggregate, BucketizerMap};
//! use skinner::types::Datapoint;
//!
//! let points = vec![
//!     Datapoint::new(153_000.0).with_field("state", "MA"),
//!     Datapoint::new(505_000.0).with_field("state", "CA"),
//!     Datapoint::new(636_000.0).with_field("state", "MA"),
//! ];
//!
//! let rows = aggregate(&points, &["state"], &BucketizerMap::new()).unwrap();
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[0].sum, 789_000.0);
//! ```

use serde::ser::{Serialize, SerializeSeq, SerializeTuple, Serializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::bucketizer::{Bounds, Bucketizer, BucketizerMap, Ordinal};
use super::pluck::{pluck, validate_path, Plucked};
use crate::error::{Error, Result};
use crate::types::{serialize_number, Datapoint, Fields, Scalar};

// ============================================================================
// Group Keys and Rows
// ============================================================================

/// Key value at one level of the grouping tree
///
/// Numbers compare by value with `-0.0 == 0.0` and `NaN == NaN`; strings
/// compare by content. A string never equals a number.
#[derive(Debug, Clone)]
pub enum GroupKey {
    /// Raw field value of a plain level
    Value(Scalar),
    /// Bucket ordinal of a bucketized level
    Ordinal(Ordinal),
    /// The field could not be resolved for this point
    Missing,
}

fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GroupKey::Value(Scalar::Number(a)), GroupKey::Value(Scalar::Number(b))) => {
                canonical_bits(*a) == canonical_bits(*b)
            }
            (GroupKey::Value(Scalar::String(a)), GroupKey::Value(Scalar::String(b))) => a == b,
            (GroupKey::Ordinal(a), GroupKey::Ordinal(b)) => a == b,
            (GroupKey::Missing, GroupKey::Missing) => true,
            _ => false,
        }
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            GroupKey::Value(Scalar::Number(n)) => {
                0u8.hash(state);
                canonical_bits(*n).hash(state);
            }
            GroupKey::Value(Scalar::String(s)) => {
                1u8.hash(state);
                s.hash(state);
            }
            GroupKey::Ordinal(o) => {
                2u8.hash(state);
                o.hash(state);
            }
            GroupKey::Missing => 3u8.hash(state),
        }
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        GroupKey::Value(Scalar::from(s))
    }
}

impl From<f64> for GroupKey {
    fn from(n: f64) -> Self {
        GroupKey::Value(Scalar::Number(n))
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            GroupKey::Value(scalar) => scalar.serialize(serializer),
            GroupKey::Ordinal(o) => serializer.serialize_i64(*o),
            GroupKey::Missing => serializer.serialize_none(),
        }
    }
}

/// One output group: its key path followed by the accumulated sum
///
/// Serializes as a flat array `[k1, ..., kn, sum]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// One key per decomposition field, in decomposition order
    pub keys: Vec<GroupKey>,
    /// Sum of `value` over the group's points
    pub sum: f64,
}

impl Row {
    /// Create a row
    pub fn new(keys: Vec<GroupKey>, sum: f64) -> Self {
        Self { keys, sum }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.keys.len() + 1))?;
        for key in &self.keys {
            seq.serialize_element(key)?;
        }
        seq.serialize_element(&Number(self.sum))?;
        seq.end()
    }
}

/// A histogram row with its ordinal expanded to bounds
///
/// Serializes as `[[low, high], sum]`, or `[null, sum]` for the group of
/// points that lacked the bucketized field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedRow {
    /// Inclusive range covered by the bucket; `None` for the missing-field group
    pub bounds: Option<Bounds>,
    /// Sum of `value` over the bucket's points
    pub sum: f64,
}

impl Serialize for BoundedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.bounds)?;
        tuple.serialize_element(&Number(self.sum))?;
        tuple.end()
    }
}

/// Sum wrapper written with `serialize_number`
struct Number(f64);

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_number(&self.0, serializer)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// What to do with a point whose decomposition field cannot be resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Group the point under a distinct `GroupKey::Missing` key
    #[default]
    Group,
    /// Reject the point with `Error::MissingField`
    Reject,
}

impl std::str::FromStr for MissingFieldPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group" => Ok(MissingFieldPolicy::Group),
            "reject" => Ok(MissingFieldPolicy::Reject),
            other => Err(Error::Configuration(format!(
                "unknown missing field policy '{}' (expected 'group' or 'reject')",
                other
            ))),
        }
    }
}

/// Options for building an `AggregationEngine`
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Ordered decomposition field paths
    pub decomp_fields: Vec<String>,

    /// Bucketizers keyed by decomposition field name
    pub bucketizers: BucketizerMap,

    /// Handling of unresolvable fields
    pub missing_fields: MissingFieldPolicy,
}

impl EngineOptions {
    /// Options decomposing by the given fields
    pub fn new<S: AsRef<str>>(decomp_fields: &[S]) -> Self {
        Self {
            decomp_fields: decomp_fields.iter().map(|f| f.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    /// Replace the bucketizer map
    pub fn with_bucketizers(mut self, bucketizers: BucketizerMap) -> Self {
        self.bucketizers = bucketizers;
        self
    }

    /// Register one bucketizer
    pub fn with_bucketizer(mut self, field: impl Into<String>, b: Arc<dyn Bucketizer>) -> Self {
        self.bucketizers.insert(field.into(), b);
        self
    }

    /// Set the missing-field policy
    pub fn with_missing_fields(mut self, policy: MissingFieldPolicy) -> Self {
        self.missing_fields = policy;
        self
    }
}

// ============================================================================
// Grouping Tree
// ============================================================================

/// How one level derives its key, fixed at construction
#[derive(Debug, Clone)]
enum KeyDescriptor {
    Plain,
    Bucketized(Arc<dyn Bucketizer>),
}

#[derive(Debug, Clone)]
struct Level {
    path: String,
    descriptor: KeyDescriptor,
}

impl Level {
    fn resolve(&self, fields: &Fields, policy: MissingFieldPolicy) -> Result<GroupKey> {
        let raw = match pluck(fields, &self.path) {
            Plucked::Scalar(raw) => raw,
            Plucked::Missing => {
                return match policy {
                    MissingFieldPolicy::Group => Ok(GroupKey::Missing),
                    MissingFieldPolicy::Reject => Err(Error::MissingField {
                        path: self.path.clone(),
                    }),
                }
            }
        };

        match &self.descriptor {
            KeyDescriptor::Plain => Ok(GroupKey::Value(raw.clone())),
            KeyDescriptor::Bucketized(bucketizer) => match raw.as_f64() {
                Some(n) if n.is_finite() => Ok(GroupKey::Ordinal(bucketizer.quantize(n))),
                _ => Err(Error::InvalidBucketValue {
                    path: self.path.clone(),
                    value: raw.to_string(),
                }),
            },
        }
    }
}

#[derive(Debug, Default)]
struct GroupNode {
    sum: f64,
    children: ChildMap,
}

#[derive(Debug)]
struct ChildEntry {
    key: GroupKey,
    /// Ingestion sequence number of the first point with this key; plain levels only
    first_seen: Option<u64>,
    node: GroupNode,
}

/// Insertion-ordered children: entry vector plus a hash index into it
#[derive(Debug, Default)]
struct ChildMap {
    entries: Vec<ChildEntry>,
    index: HashMap<GroupKey, usize>,
}

impl ChildMap {
    /// Returns the child for `key`, creating it if needed, and whether it was created
    fn get_or_insert(&mut self, key: GroupKey, first_seen: Option<u64>) -> (&mut GroupNode, bool) {
        if let Some(&idx) = self.index.get(&key) {
            return (&mut self.entries[idx].node, false);
        }

        let idx = self.entries.len();
        self.index.insert(key.clone(), idx);
        self.entries.push(ChildEntry {
            key,
            first_seen,
            node: GroupNode::default(),
        });
        (&mut self.entries[idx].node, true)
    }

    fn ordered(&self, descriptor: &KeyDescriptor) -> Vec<&ChildEntry> {
        let mut children: Vec<&ChildEntry> = self.entries.iter().collect();
        match descriptor {
            KeyDescriptor::Plain => children.sort_by_key(|c| c.first_seen),
            KeyDescriptor::Bucketized(_) => children.sort_by_key(|c| match c.key {
                GroupKey::Ordinal(o) => (false, o),
                _ => (true, 0),
            }),
        }
        children
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Engine Statistics
// ============================================================================

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Points accumulated into the tree
    pub points_ingested: u64,
    /// Points rejected by `ingest`
    pub points_rejected: u64,
    /// Number of leaf groups (output rows)
    pub groups: u64,
}

// ============================================================================
// Aggregation Engine
// ============================================================================

/// Grouping tree plus its per-level key descriptors
#[derive(Debug)]
pub struct AggregationEngine {
    levels: Vec<Level>,
    missing_fields: MissingFieldPolicy,
    root: GroupNode,
    sequence: u64,
    points_rejected: u64,
    groups: u64,
}

impl AggregationEngine {
    /// Create an engine; fails on invalid field paths
    pub fn new(options: EngineOptions) -> Result<Self> {
        let EngineOptions {
            decomp_fields,
            bucketizers,
            missing_fields,
        } = options;

        for path in &decomp_fields {
            validate_path(path).map_err(Error::Configuration)?;
        }

        for name in bucketizers.keys() {
            if !decomp_fields.contains(name) {
                warn!("Bucketizer for '{}' ignored: not a decomposition field", name);
            }
        }

        let levels: Vec<Level> = decomp_fields
            .into_iter()
            .map(|path| {
                let descriptor = match bucketizers.get(&path) {
                    Some(b) => KeyDescriptor::Bucketized(Arc::clone(b)),
                    None => KeyDescriptor::Plain,
                };
                Level { path, descriptor }
            })
            .collect();

        debug!(
            "Aggregation engine created: {} level(s), {} bucketized, missing fields: {:?}",
            levels.len(),
            levels
                .iter()
                .filter(|l| matches!(l.descriptor, KeyDescriptor::Bucketized(_)))
                .count(),
            missing_fields
        );

        Ok(Self {
            // with no levels the root itself is the single group
            groups: u64::from(levels.is_empty()),
            levels,
            missing_fields,
            root: GroupNode::default(),
            sequence: 0,
            points_rejected: 0,
        })
    }

    /// Add one point to the tree
    ///
    /// Keys for every level are resolved before the tree is touched, so an
    /// error leaves the accumulated state unchanged.
    pub fn ingest(&mut self, point: &Datapoint) -> Result<()> {
        let keys = match self.resolve_keys(point) {
            Ok(keys) => keys,
            Err(e) => {
                self.points_rejected += 1;
                warn!("Datapoint rejected: {}", e);
                return Err(e);
            }
        };

        let sequence = self.sequence;
        self.sequence += 1;

        let depth = self.levels.len();
        let mut node = &mut self.root;
        for (i, (level, key)) in self.levels.iter().zip(keys).enumerate() {
            let first_seen = match level.descriptor {
                KeyDescriptor::Plain => Some(sequence),
                KeyDescriptor::Bucketized(_) => None,
            };
            let (child, created) = node.children.get_or_insert(key, first_seen);
            if created {
                trace!("New group at level '{}' (point #{})", level.path, sequence);
                if i + 1 == depth {
                    self.groups += 1;
                }
            }
            node = child;
        }

        node.sum += point.value;
        Ok(())
    }

    /// Ingest every point in order, stopping at the first error
    pub fn ingest_all<'a>(
        &mut self,
        points: impl IntoIterator<Item = &'a Datapoint>,
    ) -> Result<()> {
        for point in points {
            self.ingest(point)?;
        }
        Ok(())
    }

    fn resolve_keys(&self, point: &Datapoint) -> Result<Vec<GroupKey>> {
        self.levels
            .iter()
            .map(|level| level.resolve(&point.fields, self.missing_fields))
            .collect()
    }

    /// Flatten the tree into ordered rows
    pub fn finalize(&self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.groups as usize);
        let mut prefix = Vec::with_capacity(self.levels.len());
        self.flatten(&self.root, 0, &mut prefix, &mut rows);

        debug!(
            "Finalized {} row(s) from {} point(s)",
            rows.len(),
            self.sequence
        );
        rows
    }

    fn flatten(
        &self,
        node: &GroupNode,
        depth: usize,
        prefix: &mut Vec<GroupKey>,
        rows: &mut Vec<Row>,
    ) {
        let level = match self.levels.get(depth) {
            Some(level) => level,
            None => {
                rows.push(Row::new(prefix.clone(), node.sum));
                return;
            }
        };

        for child in node.children.ordered(&level.descriptor) {
            prefix.push(child.key.clone());
            self.flatten(&child.node, depth + 1, prefix, rows);
            prefix.pop();
        }
    }

    /// Number of distinct keys seen at the first level
    pub fn top_level_groups(&self) -> usize {
        self.root.children.len()
    }

    /// Counter snapshot
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            points_ingested: self.sequence,
            points_rejected: self.points_rejected,
            groups: self.groups,
        }
    }
}

// ============================================================================
// Batch Functions
// ============================================================================

/// Sum `points` grouped by `decomp_fields`
///
/// Row order follows first occurrence in `points` for plain fields and
/// ascending ordinal for bucketized fields. An empty decomposition yields a
/// single row holding the grand total.
pub fn aggregate<S: AsRef<str>>(
    points: &[Datapoint],
    decomp_fields: &[S],
    bucketizers: &BucketizerMap,
) -> Result<Vec<Row>> {
    aggregate_with(
        points,
        &EngineOptions::new(decomp_fields).with_bucketizers(bucketizers.clone()),
    )
}

/// `aggregate` with full engine options
pub fn aggregate_with(points: &[Datapoint], options: &EngineOptions) -> Result<Vec<Row>> {
    let mut engine = AggregationEngine::new(options.clone())?;
    engine.ingest_all(points)?;
    Ok(engine.finalize())
}

/// Expand `(ordinal, sum)` rows into `((low, high), sum)` rows
///
/// Only valid for rows produced from a single field bucketized with
/// `bucketizer`. The missing-field group passes through with no bounds.
pub fn ordinal_to_bounds(bucketizer: &dyn Bucketizer, rows: &[Row]) -> Result<Vec<BoundedRow>> {
    rows.iter()
        .map(|row| match row.keys.as_slice() {
            [GroupKey::Ordinal(o)] => Ok(BoundedRow {
                bounds: Some(bucketizer.bounds_for(*o)),
                sum: row.sum,
            }),
            [GroupKey::Missing] => Ok(BoundedRow {
                bounds: None,
                sum: row.sum,
            }),
            [other] => Err(Error::InvalidRowShape(format!(
                "expected an ordinal key, got {:?}",
                other
            ))),
            keys => Err(Error::InvalidRowShape(format!(
                "expected exactly one key per row, got {}",
                keys.len()
            ))),
        })
        .collect()
}
