//! Splitting mass-sorted item references into independently clusterable bins.
//!
//! Every policy returns bins in ascending mass order and never loses or
//! duplicates an item: the union of the bins is the input.

pub mod adaptive;
pub mod fixed;

pub use adaptive::AdaptivePartitioner;
pub use fixed::FixedWindowPartitioner;

use crate::errors::ConfigError;
use crate::models::ItemReference;
use serde::{
    Deserialize,
    Serialize,
};

pub trait Partitioner {
    /// `items` must already be sorted by precursor mass.
    fn partition(&self, items: Vec<ItemReference>) -> Vec<Vec<ItemReference>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Everything in one global bin.
    Single,
    Fixed {
        width: f64,
    },
    Adaptive {
        widths: Vec<f64>,
        max_items: usize,
    },
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        PartitionPolicy::Adaptive {
            widths: vec![25.0, 10.0, 4.0],
            max_items: 50_000,
        }
    }
}

impl PartitionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PartitionPolicy::Single => Ok(()),
            PartitionPolicy::Fixed { width } => {
                if !(width.is_finite() && *width > 0.0) {
                    return Err(ConfigError::NonPositive {
                        field: "partitioning.width",
                        value: *width,
                    });
                }
                Ok(())
            }
            PartitionPolicy::Adaptive { widths, max_items } => {
                if widths.is_empty() {
                    return Err(ConfigError::InvalidPartitionWidths {
                        context: "adaptive partitioning needs at least one width".to_string(),
                    });
                }
                if let Some(w) = widths.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
                    return Err(ConfigError::NonPositive {
                        field: "partitioning.widths",
                        value: *w,
                    });
                }
                if widths.windows(2).any(|w| w[1] > w[0]) {
                    return Err(ConfigError::InvalidPartitionWidths {
                        context: format!("widths must not increase: {:?}", widths),
                    });
                }
                if *max_items == 0 {
                    return Err(ConfigError::InvalidPartitionWidths {
                        context: "max_items must be at least 1".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Narrowest nominal window this policy can produce, `None` for a single bin.
    pub fn narrowest_width(&self) -> Option<f64> {
        match self {
            PartitionPolicy::Single => None,
            PartitionPolicy::Fixed { width } => Some(*width),
            PartitionPolicy::Adaptive { widths, .. } => widths.iter().copied().reduce(f64::min),
        }
    }

    /// Windows narrower than twice the merge width cannot be repaired at
    /// their boundaries, so such a configuration is rejected up front.
    pub fn validate_for_merge(&self, merge_width: f64) -> Result<(), ConfigError> {
        match self.narrowest_width() {
            Some(width) if width < 2.0 * merge_width => Err(ConfigError::WindowTooNarrow {
                window: None,
                span: width,
                merge_width,
            }),
            _ => Ok(()),
        }
    }

    /// Bins ready for clustering and boundary merging.
    ///
    /// The boundary merge only sees pairs up to `merge_width` apart when every
    /// window spans at least twice that, so narrow bins are joined with their
    /// upper neighbour. For `Fixed` this means a window is always a run of
    /// whole, consecutive grid bins: two items in the same grid bin are never
    /// written to different windows.
    pub fn partition_for_merge(
        &self,
        items: Vec<ItemReference>,
        merge_width: f64,
    ) -> Vec<Vec<ItemReference>> {
        let bins = self.partition(items);
        if bins.len() > 1 {
            coalesce_narrow_bins(bins, 2.0 * merge_width)
        } else {
            bins
        }
    }
}

impl Partitioner for PartitionPolicy {
    fn partition(&self, items: Vec<ItemReference>) -> Vec<Vec<ItemReference>> {
        match self {
            PartitionPolicy::Single => {
                if items.is_empty() {
                    Vec::new()
                } else {
                    vec![items]
                }
            }
            PartitionPolicy::Fixed { width } => {
                FixedWindowPartitioner::new(*width).partition(items)
            }
            PartitionPolicy::Adaptive { widths, max_items } => {
                AdaptivePartitioner::new(widths.clone(), *max_items).partition(items)
            }
        }
    }
}

fn bin_span(bin: &[ItemReference]) -> f64 {
    match (bin.first(), bin.last()) {
        (Some(first), Some(last)) => last.precursor_mass - first.precursor_mass,
        _ => 0.0,
    }
}

/// Joins bins spanning less than `min_span` with their upper neighbour.
///
/// Sparse mass ranges produce bins holding only a handful of items, whose
/// observed span is far below the nominal width. After coalescing, every bin
/// spans at least `min_span` unless there is only one bin. Empty bins are
/// dropped and the mass order is kept.
pub fn coalesce_narrow_bins(
    bins: Vec<Vec<ItemReference>>,
    min_span: f64,
) -> Vec<Vec<ItemReference>> {
    let mut out: Vec<Vec<ItemReference>> = Vec::with_capacity(bins.len());
    for bin in bins.into_iter().filter(|b| !b.is_empty()) {
        match out.last_mut() {
            Some(last) if bin_span(last) < min_span => last.extend(bin),
            _ => out.push(bin),
        }
    }
    if out.len() > 1 && out.last().is_some_and(|b| bin_span(b) < min_span) {
        if let Some(tail) = out.pop() {
            if let Some(last) = out.last_mut() {
                last.extend(tail);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_narrow_bins() {
        let item = |i: u64, m: f64| ItemReference::new(0, i, m, format!("s{}", i));
        let bins = vec![
            vec![item(0, 100.0), item(1, 101.0)],
            vec![],
            vec![item(2, 104.5), item(3, 110.0)],
            vec![item(4, 120.0), item(5, 126.0)],
            vec![item(6, 131.0)],
        ];
        let out = coalesce_narrow_bins(bins, 4.0);
        let sizes: Vec<usize> = out.iter().map(|b| b.len()).collect();
        // [100, 101] is too narrow and absorbs [104.5, 110]; the lone 131 folds back.
        assert_eq!(sizes, vec![4, 3]);
        assert_eq!(out[1][2].precursor_mass, 131.0);
        assert!(out.iter().all(|b| bin_span(b) >= 4.0));

        let single = coalesce_narrow_bins(vec![vec![item(0, 1.0)]], 4.0);
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_fixed_windows_are_whole_grid_bins() {
        let masses = [100.5, 101.0, 111.0, 139.0, 150.5, 151.0, 159.0, 400.0];
        let items: Vec<ItemReference> = masses
            .iter()
            .enumerate()
            .map(|(i, m)| ItemReference::new(0, i as u64, *m, format!("s{}", i)))
            .collect();
        let policy = PartitionPolicy::Fixed { width: 10.0 };
        let grid = FixedWindowPartitioner::new(10.0);
        let bins = policy.partition_for_merge(items, 2.0);

        let total: usize = bins.iter().map(|b| b.len()).sum();
        assert_eq!(total, masses.len());
        assert!(bins.iter().all(|b| bin_span(b) >= 4.0));
        // No grid bin is split between two windows.
        for pair in bins.windows(2) {
            let last = pair[0].last().map(|x| grid.bin_index(x.precursor_mass));
            let first = pair[1].first().map(|x| grid.bin_index(x.precursor_mass));
            assert!(last < first);
        }
        // [100.5, 101] takes 111, 139 takes the 150s and the lone 400 folds back.
        let sizes: Vec<usize> = bins.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 5]);
    }

    #[test]
    fn test_policy_config_round_trip() {
        let json = r#"{"policy": "fixed", "width": 4.0}"#;
        let policy: PartitionPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, PartitionPolicy::Fixed { width: 4.0 });
        let json = serde_json::to_string(&PartitionPolicy::default()).unwrap();
        let back: PartitionPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PartitionPolicy::default());
    }

    #[test]
    fn test_merge_width_must_fit_twice() {
        let policy = PartitionPolicy::default();
        assert!(policy.validate_for_merge(2.0).is_ok());
        assert!(matches!(
            policy.validate_for_merge(2.5),
            Err(ConfigError::WindowTooNarrow { .. })
        ));
        assert!(PartitionPolicy::Single.validate_for_merge(1000.0).is_ok());
    }

    #[test]
    fn test_invalid_policies() {
        assert!(PartitionPolicy::Fixed { width: 0.0 }.validate().is_err());
        let increasing = PartitionPolicy::Adaptive {
            widths: vec![4.0, 10.0],
            max_items: 10,
        };
        assert!(increasing.validate().is_err());
    }

    #[test]
    fn test_single_policy() {
        let items = vec![
            ItemReference::new(0, 0, 10.0, "a"),
            ItemReference::new(0, 1, 900.0, "b"),
        ];
        let bins = PartitionPolicy::Single.partition(items);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].len(), 2);
    }
}
