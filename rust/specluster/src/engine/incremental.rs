use super::cache::ComparisonCache;
use super::oracle::SimilarityOracle;
use super::predicates::ComparisonPredicate;
use crate::cancel::CancellationToken;
use crate::errors::{
    ClusteringError,
    OracleError,
};
use crate::models::{
    Cluster,
    ConsensusSettings,
};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No item has been added yet.
    Idle,
    Comparing,
    /// The engine has been drained by [`IncrementalClusteringEngine::finish`].
    Resolved,
}

/// Whether a round writes known matches into the comparison cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheMode {
    /// Record every comparison scoring at least `floor`.
    Record { floor: f64 },
    ReadOnly,
}

#[derive(Debug, Clone)]
pub struct RoundParameters {
    pub threshold: f64,
    /// Clusters further than this below the current item can no longer match.
    pub precursor_tolerance: f64,
    pub predicate: ComparisonPredicate,
    pub cache_mode: CacheMode,
    pub consensus: ConsensusSettings,
}

/// Greedy single-threshold clustering of a mass sorted stream.
///
/// Each added item is compared against the live clusters that pass the
/// round's predicate and merged into the best scoring one when that score
/// reaches the threshold. Live clusters that fall out of the precursor
/// tolerance are handed back to the caller as soon as they can no longer
/// change.
pub struct IncrementalClusteringEngine<'a> {
    oracle: &'a dyn SimilarityOracle,
    cache: &'a mut ComparisonCache,
    cancel: &'a CancellationToken,
    params: RoundParameters,
    live: Vec<Cluster>,
    last_mass: Option<f64>,
    state: EngineState,
    comparisons: usize,
}

impl<'a> IncrementalClusteringEngine<'a> {
    pub fn new(
        oracle: &'a dyn SimilarityOracle,
        cache: &'a mut ComparisonCache,
        params: RoundParameters,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            oracle,
            cache,
            cancel,
            params,
            live: Vec::new(),
            last_mass: None,
            state: EngineState::Idle,
            comparisons: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn comparisons(&self) -> usize {
        self.comparisons
    }

    pub fn live_clusters(&self) -> &[Cluster] {
        &self.live
    }

    /// Adds one item and returns the clusters evicted by it, sorted by mass.
    pub fn add(&mut self, item: Cluster) -> Result<Vec<Cluster>, ClusteringError> {
        self.cancel.check()?;
        let mass = item.precursor_mass();
        let previous = self.last_mass.unwrap_or(f64::NEG_INFINITY);
        if mass.is_nan() || mass < previous {
            return Err(ClusteringError::OrderingViolation {
                previous_mass: previous,
                mass,
                item_id: item.id().to_string(),
            });
        }
        self.last_mass = Some(mass);
        self.state = EngineState::Comparing;

        let evicted = self.evict_below(mass);

        let mut best: Option<(usize, f64)> = None;
        for (idx, existing) in self.live.iter().enumerate() {
            if !self.params.predicate.allows(existing, &item, self.cache) {
                continue;
            }
            let score = self.oracle.score(existing, &item)?;
            self.comparisons += 1;
            if score.is_nan() {
                return Err(OracleError::new(format!(
                    "NaN similarity between {} and {}",
                    existing.id(),
                    item.id()
                ))
                .into());
            }
            if let CacheMode::Record { floor } = self.params.cache_mode {
                if score >= floor {
                    self.cache.record(existing, &item);
                }
            }
            if score < self.params.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_idx, best_score)) => {
                    is_better_candidate(existing, score, &self.live[best_idx], best_score)
                }
            };
            if better {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) => {
                trace!(
                    "Merging {} into {} (score {:.4})",
                    item.id(),
                    self.live[idx].id(),
                    score
                );
                self.live[idx].absorb(item, &self.params.consensus);
            }
            None => self.live.push(item),
        }

        Ok(evicted)
    }

    fn evict_below(&mut self, mass: f64) -> Vec<Cluster> {
        let tolerance = self.params.precursor_tolerance;
        let (keep, mut evicted): (Vec<Cluster>, Vec<Cluster>) = std::mem::take(&mut self.live)
            .into_iter()
            .partition(|c| c.precursor_mass() + tolerance >= mass);
        self.live = keep;
        sort_clusters_by_mass(&mut evicted);
        evicted
    }

    /// Removes and returns every live cluster, sorted by mass.
    pub fn flush(&mut self) -> Vec<Cluster> {
        let mut out = std::mem::take(&mut self.live);
        sort_clusters_by_mass(&mut out);
        out
    }

    pub fn finish(mut self) -> Vec<Cluster> {
        self.state = EngineState::Resolved;
        self.flush()
    }
}

/// Higher score wins, then the larger cluster, then the lower id.
fn is_better_candidate(candidate: &Cluster, score: f64, current: &Cluster, current_score: f64) -> bool {
    if score != current_score {
        return score > current_score;
    }
    if candidate.member_count() != current.member_count() {
        return candidate.member_count() > current.member_count();
    }
    candidate.id() < current.id()
}

pub fn sort_clusters_by_mass(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| {
        a.precursor_mass()
            .total_cmp(&b.precursor_mass())
            .then_with(|| a.id().cmp(b.id()))
    });
}
