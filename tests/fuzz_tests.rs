//! Fuzz Tests for Aggregation
//!
//! Uses property-based testing (proptest) to check the invariants of the
//! grouping engine, the bucketizers, and the streaming front end.

use proptest::prelude::*;

use skinner::aggregation::{
    aggregate, create_aggregator, make_linear_bucketizer, make_power_of_two_bucketizer,
    ordinal_to_bounds, AggregatorConfig, Bucketizer, BucketizerMap, GroupKey,
};
use skinner::types::{Datapoint, FieldValue, Fields};

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Small integer-valued weights, so sums are exact in any order
fn weight() -> impl Strategy<Value = f64> {
    (-1000i32..1000).prop_map(f64::from)
}

/// Datapoints with a low-cardinality host, a cpu tag, and an integer util
fn datapoint() -> impl Strategy<Value = Datapoint> {
    (0u8..4, 0u8..3, -50i64..150, weight()).prop_map(|(host, cpu, util, value)| {
        Datapoint::new(value)
            .with_field("host", format!("host{}", host))
            .with_field("cpu", format!("cpu{}", cpu))
            .with_field("util", util)
    })
}

fn datapoints(max_len: usize) -> impl Strategy<Value = Vec<Datapoint>> {
    prop::collection::vec(datapoint(), 0..max_len)
}

fn total(points: &[Datapoint]) -> f64 {
    points.iter().map(|p| p.value).sum()
}

// =============================================================================
// Grouping Properties
// =============================================================================

mod grouping {
    use super::*;

    proptest! {
        /// Row sums add up to the total of all values
        #[test]
        fn sums_are_conserved(points in datapoints(200)) {
            let rows = aggregate(&points, &["host", "cpu"], &BucketizerMap::new()).unwrap();
            let row_total: f64 = rows.iter().map(|r| r.sum).sum();
            prop_assert_eq!(row_total, total(&points));
        }

        /// Every row has one key per decomposition field and no duplicates
        #[test]
        fn rows_are_unique(points in datapoints(200)) {
            let rows = aggregate(&points, &["host", "cpu"], &BucketizerMap::new()).unwrap();
            for (i, row) in rows.iter().enumerate() {
                prop_assert_eq!(row.keys.len(), 2);
                for other in &rows[i + 1..] {
                    prop_assert_ne!(&row.keys, &other.keys);
                }
            }
        }

        /// Reordering the input only reorders plain-level groups
        #[test]
        fn permutation_preserves_groups(points in datapoints(100)) {
            let forward = aggregate(&points, &["host"], &BucketizerMap::new()).unwrap();
            let mut reversed_points = points.clone();
            reversed_points.reverse();
            let reversed = aggregate(&reversed_points, &["host"], &BucketizerMap::new()).unwrap();

            prop_assert_eq!(forward.len(), reversed.len());
            for row in &forward {
                let twin = reversed.iter().find(|r| r.keys == row.keys);
                prop_assert!(twin.is_some());
                prop_assert_eq!(twin.unwrap().sum, row.sum);
            }
        }

        /// Grouping by a nested path matches grouping by the same flat field
        #[test]
        fn nested_path_matches_flat(points in datapoints(100)) {
            let nested_points: Vec<Datapoint> = points
                .iter()
                .map(|p| {
                    let mut inner = Fields::new();
                    if let Some(host) = p.fields.get("host") {
                        inner.insert("host".to_string(), host.clone());
                    }
                    Datapoint::new(p.value).with_field("data", FieldValue::Nested(inner))
                })
                .collect();

            let flat = aggregate(&points, &["host"], &BucketizerMap::new()).unwrap();
            let nested = aggregate(&nested_points, &["data.host"], &BucketizerMap::new()).unwrap();
            prop_assert_eq!(flat, nested);
        }
    }
}

// =============================================================================
// Bucketizer Properties
// =============================================================================

mod bucketizers {
    use super::*;

    proptest! {
        /// Linear quantization is monotonic and its bounds contain the value
        #[test]
        fn linear_bounds_contain_value(width in 1u64..1000, raw in -1_000_000i64..1_000_000) {
            let b = make_linear_bucketizer(width).unwrap();
            let ordinal = b.quantize(raw as f64);
            let (low, high) = b.bounds_for(ordinal);
            prop_assert!(low <= raw && raw <= high);
            prop_assert_eq!(high - low + 1, width as i64);
            prop_assert!(b.quantize((raw + 1) as f64) >= ordinal);
        }

        /// Power-of-two bounds contain the value
        #[test]
        fn power_of_two_bounds_contain_value(raw in -1_000_000_000i64..1_000_000_000) {
            let b = make_power_of_two_bucketizer();
            let (low, high) = b.bounds_for(b.quantize(raw as f64));
            prop_assert!(low <= raw && raw <= high);
        }

        /// Histogram rows come out in ascending ordinal order
        #[test]
        fn histogram_is_ascending(points in datapoints(200), width in 1u64..50) {
            let mut bucketizers = BucketizerMap::new();
            bucketizers.insert("util".to_string(), make_linear_bucketizer(width).unwrap());

            let rows = aggregate(&points, &["util"], &bucketizers).unwrap();
            let ordinals: Vec<i64> = rows
                .iter()
                .map(|r| match r.keys[0] {
                    GroupKey::Ordinal(o) => o,
                    ref other => panic!("unexpected key {:?}", other),
                })
                .collect();
            prop_assert!(ordinals.windows(2).all(|w| w[0] < w[1]));

            let histogram = ordinal_to_bounds(bucketizers["util"].as_ref(), &rows).unwrap();
            let bounds: Vec<(i64, i64)> = histogram.iter().filter_map(|r| r.bounds).collect();
            prop_assert_eq!(bounds.len(), histogram.len());
            prop_assert!(bounds.windows(2).all(|w| w[0].1 < w[1].0));
        }

        /// Within each host, bucketized children are ascending
        #[test]
        fn nested_histogram_is_ascending(points in datapoints(200)) {
            let mut bucketizers = BucketizerMap::new();
            bucketizers.insert("util".to_string(), make_linear_bucketizer(10).unwrap());

            let rows = aggregate(&points, &["host", "util"], &bucketizers).unwrap();
            for pair in rows.windows(2) {
                if pair[0].keys[0] == pair[1].keys[0] {
                    let (a, b) = match (&pair[0].keys[1], &pair[1].keys[1]) {
                        (GroupKey::Ordinal(a), GroupKey::Ordinal(b)) => (a, b),
                        other => panic!("expected ordinals, got {:?}", other),
                    };
                    prop_assert!(a < b);
                }
            }
        }
    }
}

// =============================================================================
// Streaming Properties
// =============================================================================

mod streaming {
    use super::*;

    proptest! {
        /// Writing points one at a time matches one batch call
        #[test]
        fn stream_equals_batch(points in datapoints(200)) {
            let mut bucketizers = BucketizerMap::new();
            bucketizers.insert("util".to_string(), make_linear_bucketizer(25).unwrap());
            let batch = aggregate(&points, &["cpu", "util"], &bucketizers).unwrap();

            let config = AggregatorConfig::new(&["cpu", "util"]).with_bucketizers(bucketizers);
            let mut stream = create_aggregator(config).unwrap();
            for point in &points {
                stream.write(point).unwrap();
            }
            let output = stream.end().unwrap();
            prop_assert_eq!(output.as_rows().unwrap(), batch.as_slice());
        }
    }
}
