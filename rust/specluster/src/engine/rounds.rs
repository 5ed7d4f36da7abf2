use super::cache::ComparisonCache;
use super::incremental::{
    CacheMode,
    IncrementalClusteringEngine,
    RoundParameters,
};
use super::oracle::SimilarityOracle;
use super::predicates::ComparisonPredicate;
use crate::cancel::CancellationToken;
use crate::config::ClusteringConfig;
use crate::errors::ClusteringError;
use crate::filters::ItemFilter;
use crate::models::{
    Cluster,
    MassRange,
};
use serde::Serialize;

/// Everything that changes from one round of a job to the next.
#[derive(Debug, Clone)]
pub struct RoundPlan {
    pub params: RoundParameters,
    /// Items outside this range are written through without clustering.
    pub region: MassRange,
    /// Items rejected by the filter are dropped. Only set for the first round.
    pub filter: Option<ItemFilter>,
}

impl RoundPlan {
    /// The first round gates comparisons on shared major peaks and records
    /// known matches; later rounds only compare known matches.
    pub fn for_round(
        round: usize,
        threshold: f64,
        config: &ClusteringConfig,
        region: MassRange,
        filter: ItemFilter,
    ) -> Self {
        let (predicate, cache_mode) = if round == 0 {
            (
                ComparisonPredicate::SharesMajorPeak {
                    count: config.major_peak_count,
                    tolerance: config.fragment_tolerance,
                },
                CacheMode::Record {
                    floor: config.known_match_floor(),
                },
            )
        } else {
            (ComparisonPredicate::KnownMatch, CacheMode::ReadOnly)
        };
        let predicate = match config.precursor_ppm {
            Some(ppm) => predicate.and(ComparisonPredicate::WithinPpm(ppm)),
            None => predicate,
        };

        Self {
            params: RoundParameters {
                threshold,
                precursor_tolerance: config.precursor_tolerance,
                predicate,
                cache_mode,
                consensus: config.consensus_settings(),
            },
            region,
            filter: (round == 0).then_some(filter),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RoundStats {
    pub input_items: usize,
    pub clustered_items: usize,
    pub passed_through: usize,
    pub filtered_out: usize,
    pub output_clusters: usize,
    pub comparisons: usize,
}

/// Runs one round over a mass sorted stream, handing every output cluster
/// to `emit` in ascending mass order.
pub fn run_round<I, F>(
    input: I,
    plan: &RoundPlan,
    oracle: &dyn SimilarityOracle,
    cache: &mut ComparisonCache,
    cancel: &CancellationToken,
    mut emit: F,
) -> Result<RoundStats, ClusteringError>
where
    I: IntoIterator<Item = Result<Cluster, ClusteringError>>,
    F: FnMut(Cluster) -> Result<(), ClusteringError>,
{
    let mut stats = RoundStats::default();
    let mut engine = IncrementalClusteringEngine::new(oracle, cache, plan.params.clone(), cancel);
    let mut last_mass = f64::NEG_INFINITY;
    let mut past_region = false;

    for item in input {
        let item = item?;
        stats.input_items += 1;

        let mass = item.precursor_mass();
        if mass.is_nan() || mass < last_mass {
            return Err(ClusteringError::OrderingViolation {
                previous_mass: last_mass,
                mass,
                item_id: item.id().to_string(),
            });
        }
        last_mass = mass;

        if let Some(filter) = &plan.filter {
            if !filter.accepts(&item) {
                stats.filtered_out += 1;
                continue;
            }
        }

        if plan.region.is_below(mass) {
            stats.passed_through += 1;
            stats.output_clusters += 1;
            emit(item)?;
            continue;
        }
        if plan.region.is_above(mass) {
            if !past_region {
                // Everything still live sits below this item.
                past_region = true;
                for cluster in engine.flush() {
                    stats.output_clusters += 1;
                    emit(cluster)?;
                }
            }
            cancel.check()?;
            stats.passed_through += 1;
            stats.output_clusters += 1;
            emit(item)?;
            continue;
        }

        stats.clustered_items += 1;
        for cluster in engine.add(item)? {
            stats.output_clusters += 1;
            emit(cluster)?;
        }
    }

    stats.comparisons = engine.comparisons();
    for cluster in engine.finish() {
        stats.output_clusters += 1;
        emit(cluster)?;
    }
    Ok(stats)
}

/// Multi-round clustering of an in-memory, mass sorted list.
///
/// Uses the same round plans as the file based window jobs, so results are
/// identical to clustering the list as one window.
pub fn cluster_rounds(
    items: Vec<Cluster>,
    config: &ClusteringConfig,
    oracle: &dyn SimilarityOracle,
    cancel: &CancellationToken,
) -> Result<Vec<Cluster>, ClusteringError> {
    let region = config.region.unwrap_or_else(MassRange::unbounded);
    let mut cache = ComparisonCache::new();
    let mut current = items;
    for (round, &threshold) in config.thresholds.iter().enumerate() {
        cancel.check()?;
        let plan = RoundPlan::for_round(round, threshold, config, region, config.item_filter);
        let mut next = Vec::with_capacity(current.len());
        run_round(
            current.into_iter().map(Ok),
            &plan,
            oracle,
            &mut cache,
            cancel,
            |c| {
                next.push(c);
                Ok(())
            },
        )?;
        current = next;
    }
    Ok(current)
}
