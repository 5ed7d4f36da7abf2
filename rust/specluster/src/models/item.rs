use serde::{
    Deserialize,
    Serialize,
};
use std::cmp::Ordering;

/// Lightweight handle to one spectrum in a source file.
///
/// Partitioning works on these handles only; the spectrum itself is loaded
/// when its window file gets written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReference {
    pub source_file_id: u32,
    pub index_in_source: u64,
    pub precursor_mass: f64,
    pub stable_id: String,
}

impl ItemReference {
    pub fn new(
        source_file_id: u32,
        index_in_source: u64,
        precursor_mass: f64,
        stable_id: impl Into<String>,
    ) -> Self {
        Self {
            source_file_id,
            index_in_source,
            precursor_mass,
            stable_id: stable_id.into(),
        }
    }

    pub fn cmp_by_mass(&self, other: &Self) -> Ordering {
        self.precursor_mass.total_cmp(&other.precursor_mass)
    }
}

/// Stable sort by precursor mass, ties keep their source order.
pub fn sort_by_mass(items: &mut [ItemReference]) {
    items.sort_by(|a, b| a.cmp_by_mass(b));
}

pub fn is_sorted_by_mass(items: &[ItemReference]) -> bool {
    items
        .windows(2)
        .all(|w| w[0].cmp_by_mass(&w[1]) != Ordering::Greater)
}
