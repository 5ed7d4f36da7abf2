#![allow(dead_code)]

use specluster::errors::OracleError;
use specluster::models::ConsensusSettings;
use specluster::stream::create_window_file;
use specluster::{
    Cluster,
    ClusteringConfig,
    Peak,
    SimilarityOracle,
    Spectrum,
    WindowDescriptor,
};
use std::collections::{
    BTreeSet,
    HashMap,
};
use std::path::Path;

/// Scores two clusters by the lowest score between any of their members.
/// Pairs missing from the table score 0.
pub struct TableOracle {
    scores: HashMap<(String, String), f64>,
}

impl TableOracle {
    pub fn new(pairs: &[(&str, &str, f64)]) -> Self {
        let mut scores = HashMap::new();
        for (a, b, s) in pairs {
            scores.insert((a.to_string(), b.to_string()), *s);
            scores.insert((b.to_string(), a.to_string()), *s);
        }
        Self { scores }
    }
}

impl SimilarityOracle for TableOracle {
    fn score(&self, existing: &Cluster, candidate: &Cluster) -> Result<f64, OracleError> {
        let mut lowest = f64::INFINITY;
        for a in existing.member_ids() {
            for b in candidate.member_ids() {
                let key = (a.clone(), b.clone());
                lowest = lowest.min(self.scores.get(&key).copied().unwrap_or(0.0));
            }
        }
        Ok(lowest)
    }
}

pub fn singleton(id: &str, mass: f64) -> Cluster {
    Cluster::singleton(
        &Spectrum::new(id, mass, vec![Peak::new(300.0, 10.0), Peak::new(450.0, 4.0)]),
        &ConsensusSettings::default(),
    )
}

/// Writes singleton clusters, which must be given in mass order.
pub fn write_window(path: &Path, items: &[(&str, f64)]) -> WindowDescriptor {
    let mut writer = create_window_file(path).unwrap();
    for (id, mass) in items {
        writer.append(&singleton(id, *mass)).unwrap();
    }
    writer.finish_file(path).unwrap()
}

pub fn test_config(thresholds: Vec<f64>) -> ClusteringConfig {
    ClusteringConfig {
        precursor_tolerance: 0.5,
        thresholds,
        merge_width: 1.0,
        workers: 2,
        ..Default::default()
    }
}

/// Member sets of the clusters, ignoring ids and order.
pub fn memberships(clusters: &[Cluster]) -> BTreeSet<BTreeSet<String>> {
    clusters.iter().map(|c| c.member_ids().clone()).collect()
}
