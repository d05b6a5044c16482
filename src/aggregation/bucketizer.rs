//! Quantization of raw numeric values into histogram buckets
//!
//! A `Bucketizer` maps a raw value to an integer ordinal and an ordinal back
//! to the inclusive integer range it covers. Implementations must be pure and
//! `quantize` must be monotonic non-decreasing, so that ascending ordinals
//! correspond to ascending raw values.
//!
//! # Stock Bucketizers
//!
//! - **`LinearBucketizer`**: fixed-width buckets, `floor(x / width)`
//! - **`PowerOfTwoBucketizer`**: buckets doubling in size, symmetric around zero
//!
//! # Example
//!
//! ```rust
//! use skinner::aggregation::bucketizer::{make_linear_bucketizer, Bucketizer};
//!
//! let b = make_linear_bucketizer(10).unwrap();
//! assert_eq!(b.quantize(83.0), 8);
//! assert_eq!(b.bounds_for(8), (80, 89));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Integer bucket index
pub type Ordinal = i64;

/// Inclusive `(low, high)` range covered by an ordinal
pub type Bounds = (i64, i64);

/// Map from decomposition field name to the bucketizer applied to it
pub type BucketizerMap = HashMap<String, Arc<dyn Bucketizer>>;

/// Pluggable quantization
pub trait Bucketizer: fmt::Debug + Send + Sync {
    /// Map a finite raw value to its bucket ordinal
    fn quantize(&self, raw: f64) -> Ordinal;

    /// Inclusive range of integer raw values covered by `ordinal`
    fn bounds_for(&self, ordinal: Ordinal) -> Bounds;
}

// ============================================================================
// Linear Bucketizer
// ============================================================================

/// Fixed-width buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBucketizer {
    width: u64,
}

impl LinearBucketizer {
    /// Create a linear bucketizer; `width` must be positive
    pub fn new(width: u64) -> Result<Self> {
        if width == 0 {
            return Err(Error::Configuration(
                "linear bucketizer width must be a positive integer".to_string(),
            ));
        }
        if width > i64::MAX as u64 {
            return Err(Error::Configuration(format!(
                "linear bucketizer width {} is too large",
                width
            )));
        }
        Ok(Self { width })
    }
}

impl Bucketizer for LinearBucketizer {
    fn quantize(&self, raw: f64) -> Ordinal {
        (raw / self.width as f64).floor() as Ordinal
    }

    fn bounds_for(&self, ordinal: Ordinal) -> Bounds {
        let width = self.width as i64;
        let low = ordinal.saturating_mul(width);
        (low, low.saturating_add(width - 1))
    }
}

// ============================================================================
// Power-of-Two Bucketizer
// ============================================================================

/// Buckets whose size doubles with distance from zero
///
/// Ordinal `0` holds values whose floor is zero. Ordinal `k > 0` covers
/// `[2^(k-1), 2^k - 1]` and ordinal `-k` covers `[-(2^k - 1), -2^(k-1)]`.
/// Values beyond the `i64` range saturate, so ordinal `-64` holds only
/// `i64::MIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerOfTwoBucketizer;

impl PowerOfTwoBucketizer {
    /// Create a power-of-two bucketizer
    pub fn new() -> Self {
        Self
    }
}

/// Number of significant bits in `n`
fn bit_length(n: u64) -> i64 {
    (u64::BITS - n.leading_zeros()) as i64
}

impl Bucketizer for PowerOfTwoBucketizer {
    fn quantize(&self, raw: f64) -> Ordinal {
        let n = raw.floor() as i64;
        match n {
            0 => 0,
            n if n > 0 => bit_length(n as u64),
            n => -bit_length(n.unsigned_abs()),
        }
    }

    fn bounds_for(&self, ordinal: Ordinal) -> Bounds {
        if ordinal == 0 {
            return (0, 0);
        }
        if ordinal <= -64 {
            return (i64::MIN, i64::MIN);
        }
        let k = ordinal.unsigned_abs().min(63) as u32;
        let low = 1i64 << (k - 1);
        let high = if k == 63 { i64::MAX } else { (1i64 << k) - 1 };
        if ordinal > 0 {
            (low, high)
        } else {
            (-high, -low)
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// Shared linear bucketizer of the given width
pub fn make_linear_bucketizer(width: u64) -> Result<Arc<dyn Bucketizer>> {
    Ok(Arc::new(LinearBucketizer::new(width)?))
}

/// Shared power-of-two bucketizer
pub fn make_power_of_two_bucketizer() -> Arc<dyn Bucketizer> {
    Arc::new(PowerOfTwoBucketizer::new())
}

/// Declarative bucketizer description, as found in configuration files
///
/// ```toml
/// [bucketizers.util]
/// kind = "linear"
/// width = 10
///
/// [bucketizers.latency]
/// kind = "power_of_two"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketizerSpec {
    /// Fixed-width buckets
    Linear {
        /// Bucket width; must be a positive integer
        width: f64,
    },
    /// Power-of-two buckets
    PowerOfTwo,
}

impl BucketizerSpec {
    /// Validate parameters and build the bucketizer
    pub fn build(&self) -> Result<Arc<dyn Bucketizer>> {
        match *self {
            BucketizerSpec::Linear { width } => {
                if !width.is_finite() || width.fract() != 0.0 || width <= 0.0 {
                    return Err(Error::Configuration(format!(
                        "linear bucketizer width must be a positive integer, got {}",
                        width
                    )));
                }
                make_linear_bucketizer(width as u64)
            }
            BucketizerSpec::PowerOfTwo => Ok(make_power_of_two_bucketizer()),
        }
    }
}
