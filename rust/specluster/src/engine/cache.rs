use crate::models::Cluster;
use std::collections::{
    HashMap,
    HashSet,
};

/// Pairs of spectra that were compared in the first round of a job and
/// scored at or above the lowest threshold of the schedule.
///
/// Entries are keyed by member spectrum ids, so they stay valid while the
/// clusters holding those spectra absorb each other in later rounds.
/// Owned by a single job; later rounds only read it.
#[derive(Debug, Default, Clone)]
pub struct ComparisonCache {
    partners: HashMap<String, HashSet<String>>,
    n_pairs: usize,
}

impl ComparisonCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, existing: &Cluster, candidate: &Cluster) {
        let a = existing.anchor_id();
        let b = candidate.anchor_id();
        if a == b {
            return;
        }
        let inserted = self
            .partners
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.partners
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
        if inserted {
            self.n_pairs += 1;
        }
    }

    /// True when some member of `a` was recorded as matching some member of `b`.
    pub fn is_known_match(&self, a: &Cluster, b: &Cluster) -> bool {
        let (small, large) = if a.member_count() <= b.member_count() {
            (a, b)
        } else {
            (b, a)
        };
        small.member_ids().iter().any(|id| {
            self.partners
                .get(id)
                .is_some_and(|partners| partners.iter().any(|p| large.contains_member(p)))
        })
    }

    pub fn len(&self) -> usize {
        self.n_pairs
    }

    pub fn is_empty(&self) -> bool {
        self.n_pairs == 0
    }
}
