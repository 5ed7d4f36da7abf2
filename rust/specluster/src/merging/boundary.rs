use super::ordered::{
    OrderedWindowEmitter,
    WindowSink,
};
use super::rebin::rebin_with_overlap;
use crate::cancel::CancellationToken;
use crate::clustering::{
    JobOrchestrator,
    WindowJobSpec,
    collect_outputs,
};
use crate::config::ClusteringConfig;
use crate::engine::SimilarityOracle;
use crate::errors::{
    ConfigError,
    SpecClusterError,
};
use crate::models::{
    MassRange,
    WindowDescriptor,
    sort_by_min_mass,
};
use crate::progress::{
    ClusteringStage,
    ProgressListener,
};
use crate::stream::CLUSTER_FILE_EXTENSION;
use serde::Serialize;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    info,
    instrument,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeStats {
    pub input_windows: usize,
    pub rebinned_windows: usize,
    pub merge_jobs: usize,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Repairs matches lost at window boundaries.
///
/// The clustered windows are rebinned so that every window starts with the
/// high-mass tail of its predecessor, then the low-mass end of each window
/// (everything below `min_mass + merge_width`) is clustered again. Content
/// above that region was final after the per-window pass and is copied
/// through untouched. Results reach the sink in ascending mass order.
pub struct BoundaryMergeStage {
    config: Arc<ClusteringConfig>,
    oracle: Arc<dyn SimilarityOracle>,
    work_dir: PathBuf,
    cancel: CancellationToken,
    progress: Vec<Arc<dyn ProgressListener>>,
}

impl BoundaryMergeStage {
    pub fn new(
        config: Arc<ClusteringConfig>,
        oracle: Arc<dyn SimilarityOracle>,
        work_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            oracle,
            work_dir,
            cancel,
            progress: Vec::new(),
        }
    }

    pub fn add_progress_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.progress.push(listener);
    }

    pub fn rebinned_dir(&self) -> PathBuf {
        self.work_dir.join("rebinned")
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.work_dir.join("merged")
    }

    /// Checks the precondition of the merge: windows do not overlap and,
    /// when there is more than one, each spans at least twice the merge width.
    ///
    /// Run this on the windows before they are clustered. Clustering pulls
    /// cluster masses towards the middle of a window, so clustered windows
    /// can be slightly narrower than the windows they came from.
    pub fn validate(&self, windows: &[WindowDescriptor]) -> Result<(), ConfigError> {
        let mut sorted = windows.to_vec();
        sort_by_min_mass(&mut sorted);
        let required = 2.0 * self.config.merge_width;
        if sorted.len() > 1 {
            if let Some(narrow) = sorted.iter().find(|w| w.span() < required) {
                return Err(ConfigError::WindowTooNarrow {
                    window: Some(narrow.path.clone()),
                    span: narrow.span(),
                    merge_width: self.config.merge_width,
                });
            }
        }
        check_disjoint(&sorted)
    }

    #[instrument(skip_all, fields(windows = windows.len()))]
    pub fn run(
        &self,
        windows: Vec<WindowDescriptor>,
        sink: &mut dyn WindowSink,
    ) -> Result<MergeStats, SpecClusterError> {
        let start = Instant::now();
        let mut windows: Vec<WindowDescriptor> =
            windows.into_iter().filter(|w| !w.is_empty()).collect();
        sort_by_min_mass(&mut windows);
        check_disjoint(&windows)?;
        let mut stats = MergeStats {
            input_windows: windows.len(),
            ..Default::default()
        };
        if windows.is_empty() {
            return Ok(stats);
        }

        let rebinned_dir = self.rebinned_dir();
        let merged_dir = self.merged_dir();
        create_dir(&rebinned_dir)?;
        create_dir(&merged_dir)?;

        let rebinned = rebin_with_overlap(
            &windows,
            self.config.merge_width,
            &rebinned_dir,
            &self.cancel,
        )?;
        stats.rebinned_windows = rebinned.len();
        info!(
            "Merging {} window boundaries with merge width {}",
            rebinned.len().saturating_sub(1),
            self.config.merge_width
        );

        let mut emitter = OrderedWindowEmitter::new(sink, 1);
        let mut rebinned = rebinned.into_iter();
        if let Some(first) = rebinned.next() {
            emitter.emit(0, first)?;
        }

        let results = {
            let mut orchestrator = JobOrchestrator::new(
                Arc::clone(&self.config),
                Arc::clone(&self.oracle),
                self.cancel.clone(),
                ClusteringStage::Merging,
            )?;
            for listener in self.progress.iter() {
                orchestrator.add_progress_listener(Arc::clone(listener));
            }
            orchestrator.add_window_listener(&mut emitter);
            for (i, window) in rebinned.enumerate() {
                let region =
                    MassRange::new(window.min_mass, Some(window.min_mass + self.config.merge_width));
                let output = merged_dir.join(format!("merged_{:05}.{}", i + 1, CLUSTER_FILE_EXTENSION));
                orchestrator.submit(
                    WindowJobSpec::new(window, output, merged_dir.clone()).with_region(region),
                );
            }
            stats.merge_jobs = orchestrator.submitted();
            orchestrator.await_all()?
        };
        collect_outputs(results, "merging")?;

        stats.elapsed = start.elapsed();
        info!(
            "Boundary merge emitted {} windows in {:?}",
            emitter.emitted(),
            stats.elapsed
        );
        Ok(stats)
    }
}

/// `windows` must be sorted by mass.
fn check_disjoint(windows: &[WindowDescriptor]) -> Result<(), ConfigError> {
    for pair in windows.windows(2) {
        if pair[1].min_mass < pair[0].max_mass {
            return Err(ConfigError::OverlappingWindows {
                previous: pair[0].path.clone(),
                next: pair[1].path.clone(),
            });
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), SpecClusterError> {
    std::fs::create_dir_all(path).map_err(|e| SpecClusterError::Io {
        source: e,
        path: Some(path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BinnedCosineOracle;
    use std::path::PathBuf;

    fn window(name: &str, min_mass: f64, max_mass: f64) -> WindowDescriptor {
        WindowDescriptor {
            path: PathBuf::from(name),
            min_mass,
            max_mass,
            item_count: 3,
        }
    }

    fn stage(merge_width: f64) -> BoundaryMergeStage {
        let config = ClusteringConfig {
            merge_width,
            workers: 1,
            ..Default::default()
        };
        BoundaryMergeStage::new(
            Arc::new(config),
            Arc::new(BinnedCosineOracle::new(0.5)),
            PathBuf::from("unused"),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_rejects_narrow_windows() {
        let stage = stage(2.0);
        let err = stage
            .validate(&[window("a", 100.0, 110.0), window("b", 110.5, 113.0)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::WindowTooNarrow { .. }));
        // A single window has no boundary to merge.
        assert!(stage.validate(&[window("b", 110.5, 111.0)]).is_ok());
    }

    #[test]
    fn test_rejects_overlapping_windows() {
        let stage = stage(1.0);
        let err = stage
            .validate(&[window("b", 105.0, 115.0), window("a", 100.0, 110.0)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingWindows { .. }));
        assert!(stage
            .validate(&[window("a", 100.0, 110.0), window("b", 110.0, 120.0)])
            .is_ok());
    }
}
