use super::Partitioner;
use crate::models::ItemReference;
use std::collections::BTreeMap;

/// Assigns each item to bin `ceil(mass / width)`.
///
/// Only occupied bins are returned, in mass order. Bin boundaries do not
/// depend on the data, so an item always lands with the same neighbours.
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowPartitioner {
    width: f64,
}

impl FixedWindowPartitioner {
    pub fn new(width: f64) -> Self {
        Self { width }
    }

    pub fn bin_index(&self, mass: f64) -> usize {
        let bin = (mass / self.width).ceil();
        if bin.is_finite() && bin > 0.0 {
            bin as usize
        } else {
            0
        }
    }
}

impl Partitioner for FixedWindowPartitioner {
    fn partition(&self, items: Vec<ItemReference>) -> Vec<Vec<ItemReference>> {
        let mut bins: BTreeMap<usize, Vec<ItemReference>> = BTreeMap::new();
        for item in items {
            bins.entry(self.bin_index(item.precursor_mass))
                .or_default()
                .push(item);
        }
        bins.into_values().collect()
    }
}
