use crate::errors::ConfigError;
use crate::filters::ItemFilter;
use crate::merging::DuplicateMergeConfig;
use crate::models::{
    ConsensusSettings,
    MassRange,
};
use crate::partitioning::PartitionPolicy;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::warn;

/// Settings shared (read only) by every stage of a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Maximum precursor mass difference for two clusters to be compared.
    pub precursor_tolerance: f64,
    /// Optional additional precursor tolerance in parts per million.
    pub precursor_ppm: Option<f64>,
    pub fragment_tolerance: f64,
    /// One clustering round per threshold, applied in the given order.
    pub thresholds: Vec<f64>,
    pub major_peak_count: usize,
    pub max_consensus_peaks: usize,
    pub store_member_peaks: bool,
    pub partitioning: PartitionPolicy,
    pub merge_width: f64,
    pub workers: usize,
    pub item_filter: ItemFilter,
    pub region: Option<MassRange>,
    pub duplicate_merge: Option<DuplicateMergeConfig>,
    /// Keep window files once the stage consuming them has finished.
    pub keep_intermediate: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            precursor_tolerance: 1.0,
            precursor_ppm: None,
            fragment_tolerance: 0.5,
            thresholds: generate_thresholds(0.999, 0.99, 5),
            major_peak_count: 5,
            max_consensus_peaks: 100,
            store_member_peaks: false,
            partitioning: PartitionPolicy::default(),
            merge_width: 2.0,
            workers: default_workers(),
            item_filter: ItemFilter::All,
            region: None,
            duplicate_merge: None,
            keep_intermediate: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.is_empty() {
            return Err(ConfigError::EmptyThresholds);
        }
        if let Some(t) = self.thresholds.iter().find(|t| !t.is_finite()) {
            return Err(ConfigError::InvalidThreshold { value: *t });
        }
        if self.thresholds.windows(2).any(|w| w[1] > w[0]) {
            warn!(
                "Clustering thresholds are not in descending order: {:?}",
                self.thresholds
            );
        }
        check_positive("precursor_tolerance", self.precursor_tolerance)?;
        check_positive("fragment_tolerance", self.fragment_tolerance)?;
        check_positive("merge_width", self.merge_width)?;
        if let Some(ppm) = self.precursor_ppm {
            check_positive("precursor_ppm", ppm)?;
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if let Some(MassRange { min, max: Some(max) }) = self.region {
            if max <= min {
                return Err(ConfigError::InvalidRegion { min, max });
            }
        }
        if let Some(dup) = &self.duplicate_merge {
            dup.validate()?;
        }
        self.partitioning.validate()?;
        self.partitioning.validate_for_merge(self.merge_width)?;
        if self.merge_width < 2.0 * self.precursor_tolerance {
            warn!(
                "Merge width {} is less than twice the precursor tolerance {}; \
                 some matches across window boundaries can be missed",
                self.merge_width, self.precursor_tolerance
            );
        }
        Ok(())
    }

    /// Lowest threshold of the schedule. Round one records every comparison
    /// scoring at least this much as a known match.
    pub fn known_match_floor(&self) -> f64 {
        self.thresholds
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or(f64::INFINITY)
    }

    pub fn consensus_settings(&self) -> ConsensusSettings {
        ConsensusSettings {
            fragment_tolerance: self.fragment_tolerance,
            max_peaks: self.max_consensus_peaks,
            store_member_peaks: self.store_member_peaks,
        }
    }
}

/// Evenly spaced thresholds from `start` to `end` (both included).
pub fn generate_thresholds(start: f64, end: f64, rounds: usize) -> Vec<f64> {
    match rounds {
        0 => Vec::new(),
        1 => vec![end],
        n => {
            let step = (start - end) / (n - 1) as f64;
            (0..n).map(|i| start - step * i as f64).collect()
        }
    }
}
