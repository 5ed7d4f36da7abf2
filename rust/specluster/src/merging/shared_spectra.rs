//! Optional post-pass merging clusters that share most of their spectra.
//!
//! The same spectrum can end up in two clusters when those were built in
//! different windows or runs. Clusters close in mass whose member sets mostly
//! overlap are folded together; exact duplicates are dropped.

use crate::cancel::CancellationToken;
use crate::engine::sort_clusters_by_mass;
use crate::errors::{
    ClusteringError,
    ConfigError,
    SpecClusterError,
};
use crate::models::{
    Cluster,
    ConsensusSettings,
    WindowDescriptor,
};
use crate::stream::{
    StagedFile,
    create_window_file,
    open_window_file,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateMergeConfig {
    /// Only clusters within this precursor mass distance are compared.
    pub mass_window: f64,
    /// Share of the smaller cluster's spectra that must also be in the larger one.
    pub required_fraction: f64,
}

impl Default for DuplicateMergeConfig {
    fn default() -> Self {
        Self {
            mass_window: 1.0,
            required_fraction: 0.5,
        }
    }
}

impl DuplicateMergeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mass_window.is_finite() && self.mass_window > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "duplicate_merge.mass_window",
                value: self.mass_window,
            });
        }
        if !(self.required_fraction > 0.0 && self.required_fraction <= 1.0) {
            return Err(ConfigError::FractionOutOfRange {
                field: "duplicate_merge.required_fraction",
                value: self.required_fraction,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateMergeStats {
    pub input_clusters: usize,
    pub output_clusters: usize,
    pub merged: usize,
    pub duplicates: usize,
}

/// Fraction of the smaller cluster's members that are also in the other one.
pub fn shared_fraction(a: &Cluster, b: &Cluster) -> f64 {
    let (small, large) = if a.member_count() <= b.member_count() {
        (a, b)
    } else {
        (b, a)
    };
    if small.member_count() == 0 {
        return 0.0;
    }
    let shared = small
        .member_ids()
        .iter()
        .filter(|id| large.contains_member(id))
        .count();
    shared as f64 / small.member_count() as f64
}

/// Streams `input` into `output`, merging clusters that share spectra.
///
/// A cluster is folded into the first earlier cluster within the mass window
/// reaching the required fraction. The merged cluster takes the id of the
/// one with more members.
pub fn merge_shared_spectra(
    input: &Path,
    output: &Path,
    config: &DuplicateMergeConfig,
    consensus: &ConsensusSettings,
    cancel: &CancellationToken,
) -> Result<(WindowDescriptor, DuplicateMergeStats), SpecClusterError> {
    let staged = StagedFile::beside(output);
    let mut writer = create_window_file(staged.path())?;
    let mut stats = DuplicateMergeStats::default();
    let mut active: Vec<Cluster> = Vec::new();
    let mut last_mass = f64::NEG_INFINITY;

    for cluster in open_window_file(input)? {
        let cluster = cluster?;
        cancel.check()?;
        stats.input_clusters += 1;
        let mass = cluster.precursor_mass();
        if mass < last_mass {
            return Err(ClusteringError::OrderingViolation {
                previous_mass: last_mass,
                mass,
                item_id: cluster.id().to_string(),
            }
            .into());
        }
        last_mass = mass;

        let (keep, mut done): (Vec<Cluster>, Vec<Cluster>) = std::mem::take(&mut active)
            .into_iter()
            .partition(|c| c.precursor_mass() + config.mass_window >= mass);
        active = keep;
        sort_clusters_by_mass(&mut done);
        for c in done.iter() {
            writer.append(c)?;
        }

        let target = active.iter().position(|c| {
            (c.precursor_mass() - mass).abs() <= config.mass_window
                && shared_fraction(c, &cluster) >= config.required_fraction
        });
        match target {
            Some(idx) if active[idx].member_ids() == cluster.member_ids() => {
                stats.duplicates += 1;
            }
            Some(idx) => {
                stats.merged += 1;
                let existing = &mut active[idx];
                if cluster.member_count() > existing.member_count() {
                    let smaller = std::mem::replace(existing, cluster);
                    existing.absorb(smaller, consensus);
                } else {
                    existing.absorb(cluster, consensus);
                }
            }
            None => active.push(cluster),
        }
    }

    sort_clusters_by_mass(&mut active);
    for c in active.iter() {
        writer.append(c)?;
    }
    let window = writer.finish_file(staged.path())?;
    staged.persist(output)?;
    let window = WindowDescriptor {
        path: output.to_path_buf(),
        ..window
    };
    stats.output_clusters = window.item_count;
    info!(
        "Duplicate merge: {} clusters in, {} out ({} merged, {} duplicates dropped)",
        stats.input_clusters, stats.output_clusters, stats.merged, stats.duplicates
    );
    Ok((window, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Peak,
        Spectrum,
    };
    use crate::stream::read_window_file;

    fn cluster(ids: &[&str], mass: f64) -> Cluster {
        let settings = ConsensusSettings::default();
        let single = |id: &str| {
            Cluster::singleton(
                &Spectrum::new(id, mass, vec![Peak::new(250.0, 4.0)]),
                &settings,
            )
        };
        let mut out = single(ids[0]);
        for id in &ids[1..] {
            out.absorb(single(id), &settings);
        }
        out
    }

    #[test]
    fn test_shared_fraction_uses_smaller_cluster() {
        let a = cluster(&["s1", "s2", "s3", "s4"], 500.0);
        let b = cluster(&["s4", "s5"], 500.0);
        assert_eq!(shared_fraction(&a, &b), 0.5);
        assert_eq!(shared_fraction(&b, &a), 0.5);
        assert_eq!(shared_fraction(&a, &cluster(&["s9"], 500.0)), 0.0);
    }

    #[test]
    fn test_merges_and_drops_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("final.cls");
        let output = dir.path().join("dedup.cls");
        let mut writer = create_window_file(&input).unwrap();
        for c in [
            cluster(&["s1", "s2", "s3"], 500.0),
            cluster(&["s3", "s4"], 500.2),
            cluster(&["s9"], 500.4),
            cluster(&["s9"], 500.5),
            cluster(&["s5", "s6", "s7", "s8", "s1"], 505.0),
            cluster(&["s10"], 600.0),
            cluster(&["s11", "s10", "s12"], 600.1),
        ] {
            writer.append(&c).unwrap();
        }
        writer.finish_file(&input).unwrap();

        let config = DuplicateMergeConfig::default();
        let (window, stats) = merge_shared_spectra(
            &input,
            &output,
            &config,
            &ConsensusSettings::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(stats.input_clusters, 7);
        assert_eq!(stats.merged, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(window.item_count, 4);

        let clusters = read_window_file(&output).unwrap();
        let ids: Vec<&str> = clusters.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["s1", "s9", "s5", "s11"]);
        assert_eq!(clusters[0].member_count(), 4);
        assert!((clusters[0].precursor_mass() - 500.05).abs() < 1e-9);
        assert_eq!(clusters[3].member_count(), 3);
    }

    #[test]
    fn test_validate() {
        assert!(DuplicateMergeConfig::default().validate().is_ok());
        let bad = DuplicateMergeConfig {
            required_fraction: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::FractionOutOfRange { .. })
        ));
    }
}
