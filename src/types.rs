//! Core data types: datapoints and their field values
//!
//! # Key Types
//!
//! - **`Datapoint`**: one measurement, a field mapping plus a numeric value
//! - **`FieldValue`**: either a `Scalar` or a nested `Fields` map
//! - **`Scalar`**: a string or a number
//!
//! Datapoints use the JSON shape `{ "fields": { ... }, "value": <number> }`.
//!
//! # Example
//!
//! ```rust
//! use skinner::types::{Datapoint, Fields, FieldValue};
//!
//! let mut data = Fields::new();
//! data.insert("state".to_string(), FieldValue::from("MA"));
//!
//! let point = Datapoint::new(153_000.0)
//!     .with_field("city", "Springfield")
//!     .with_field("data", data);
//!
//! assert_eq!(point.value, 153_000.0);
//! assert_eq!(point.fields.len(), 2);
//! ```

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Field mapping of a datapoint, keyed by field name
pub type Fields = BTreeMap<String, FieldValue>;

/// Largest magnitude at which every whole `f64` is an exact integer
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Serialize a number, writing whole values as integers
///
/// `972000.0` is written as `972000`; fractional and out-of-range values
/// keep their float form.
pub(crate) fn serialize_number<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        serializer.serialize_i64(*n as i64)
    } else {
        serializer.serialize_f64(*n)
    }
}

/// A leaf field value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Numeric value
    Number(f64),
    /// String value
    String(String),
}

impl Scalar {
    /// Numeric view of this scalar, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::String(_) => None,
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Number(n) => serialize_number(n, serializer),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

/// A field value: a scalar leaf or a nested mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Leaf value
    Scalar(Scalar),
    /// Nested mapping, resolved with dot-delimited paths
    Nested(Fields),
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Scalar(s.into())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Scalar(s.into())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Scalar(n.into())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Scalar(n.into())
    }
}

impl From<Fields> for FieldValue {
    fn from(fields: Fields) -> Self {
        FieldValue::Nested(fields)
    }
}

/// A single measurement to be summed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Named fields, possibly nested
    #[serde(default)]
    pub fields: Fields,

    /// The measurement
    #[serde(serialize_with = "serialize_number")]
    pub value: f64,
}

impl Datapoint {
    /// Create a datapoint with no fields
    pub fn new(value: f64) -> Self {
        Self {
            fields: Fields::new(),
            value,
        }
    }

    /// Create a datapoint from an existing field mapping
    pub fn from_fields(fields: Fields, value: f64) -> Self {
        Self { fields, value }
    }

    /// Add a top-level field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}
