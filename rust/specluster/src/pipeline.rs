//! The whole run, from spectrum files to one mass sorted cluster stream.
//!
//! Layout of the work directory:
//!
//! ```text
//! work_dir/
//!   conversion.json  written once every window of `windows/` is complete
//!   windows/         one singleton window per partition bin
//!   clustered/       the same windows after all clustering rounds
//!   merge/           rebinned and boundary merged windows
//! ```
//!
//! Intermediate directories are removed after a successful run unless
//! `keep_intermediate` is set. After a failure they are left in place so a
//! resumed run can skip the windows that were already clustered. A resumed
//! run only trusts `windows/` when `conversion.json` lists exactly the files
//! found there, and only trusts `clustered/` when the manifest matches the
//! input.

use crate::cancel::CancellationToken;
use crate::clustering::{
    JobOrchestrator,
    JobTimings,
    WindowJobSpec,
    collect_outputs,
};
use crate::config::ClusteringConfig;
use crate::data_sources::{
    SpectrumSource,
    WindowWriter,
};
use crate::engine::SimilarityOracle;
use crate::errors::SpecClusterError;
use crate::filters::ItemFilter;
use crate::merging::{
    BoundaryMergeStage,
    ClusterConcatenator,
    DuplicateMergeStats,
    MergeStats,
    merge_shared_spectra,
};
use crate::models::{
    MassRange,
    WindowDescriptor,
    sort_by_min_mass,
};
use crate::progress::{
    ClusteringStage,
    ProgressEvent,
    ProgressListener,
};
use crate::stream::{
    CLUSTER_FILE_EXTENSION,
    StagedFile,
    scan_window_file,
};
use serde::{
    Deserialize,
    Serialize,
};
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
    debug,
    info,
    instrument,
    warn,
};

const CONVERSION_MANIFEST: &str = "conversion.json";

/// What a completed conversion wrote to `windows/`.
#[derive(Debug, Serialize, Deserialize)]
struct ConversionManifest {
    input_spectra: usize,
    windows: Vec<WindowDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub input_spectra: usize,
    pub windows: usize,
    /// Clustered windows taken over from an earlier run.
    pub reused_windows: usize,
    pub clustering: JobTimings,
    pub merge: MergeStats,
    pub duplicate_merge: Option<DuplicateMergeStats>,
    pub output: Option<WindowDescriptor>,
    pub stage_times: Vec<(ClusteringStage, Duration)>,
}

impl PipelineSummary {
    pub fn output_clusters(&self) -> usize {
        self.output.as_ref().map(|x| x.item_count).unwrap_or(0)
    }
}

impl Serialize for PipelineSummary {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let stage_ms: std::collections::BTreeMap<String, u128> = self
            .stage_times
            .iter()
            .map(|(stage, d)| (stage.to_string(), d.as_millis()))
            .collect();
        let mut state = serializer.serialize_struct("PipelineSummary", 9)?;
        state.serialize_field("input_spectra", &self.input_spectra)?;
        state.serialize_field("windows", &self.windows)?;
        state.serialize_field("reused_windows", &self.reused_windows)?;
        state.serialize_field("output_clusters", &self.output_clusters())?;
        state.serialize_field("output", &self.output.as_ref().map(|x| &x.path))?;
        state.serialize_field("clustering", &self.clustering)?;
        state.serialize_field("merge", &self.merge)?;
        state.serialize_field("duplicate_merge", &self.duplicate_merge)?;
        state.serialize_field("stage_ms", &stage_ms)?;
        state.end()
    }
}

pub struct ClusteringPipeline {
    config: Arc<ClusteringConfig>,
    oracle: Arc<dyn SimilarityOracle>,
    work_dir: PathBuf,
    cancel: CancellationToken,
    resume: bool,
    progress: Vec<Arc<dyn ProgressListener>>,
}

impl ClusteringPipeline {
    /// Fails on an invalid configuration, before anything is read or written.
    pub fn new(
        config: ClusteringConfig,
        oracle: Arc<dyn SimilarityOracle>,
        work_dir: PathBuf,
    ) -> Result<Self, SpecClusterError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            oracle,
            work_dir,
            cancel: CancellationToken::new(),
            resume: false,
            progress: Vec::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reuse windows and clustered windows left behind by an earlier run.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn add_progress_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.progress.push(listener);
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn windows_dir(&self) -> PathBuf {
        self.work_dir.join("windows")
    }

    pub fn clustered_dir(&self) -> PathBuf {
        self.work_dir.join("clustered")
    }

    pub fn merge_dir(&self) -> PathBuf {
        self.work_dir.join("merge")
    }

    fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(CONVERSION_MANIFEST)
    }

    /// Partitions the source, clusters every window and merges the results
    /// into a single stream at `output`.
    #[instrument(skip_all, fields(output = %output.display()))]
    pub fn cluster_source<S: SpectrumSource + ?Sized>(
        &self,
        source: &S,
        output: &Path,
    ) -> Result<PipelineSummary, SpecClusterError> {
        let mut summary = PipelineSummary {
            input_spectra: source.references().len(),
            ..Default::default()
        };

        let st = Instant::now();
        let windows = match self.resumable_windows(summary.input_spectra)? {
            Some(windows) => {
                info!(
                    "Resuming from {} existing windows in {}",
                    windows.len(),
                    self.windows_dir().display()
                );
                windows
            }
            None => self.write_windows(source)?,
        };
        summary.stage_times.push((ClusteringStage::Conversion, st.elapsed()));

        self.cluster_and_merge(windows, output, summary)
    }

    /// Clusters and merges windows that were written before, for example by
    /// an earlier run that was interrupted.
    pub fn cluster_windows(
        &self,
        windows: Vec<WindowDescriptor>,
        output: &Path,
    ) -> Result<PipelineSummary, SpecClusterError> {
        let summary = PipelineSummary {
            input_spectra: windows.iter().map(|w| w.item_count).sum(),
            ..Default::default()
        };
        self.cluster_and_merge(windows, output, summary)
    }

    /// Only the boundary merge, for windows that are already clustered.
    pub fn merge_clustered_windows(
        &self,
        windows: Vec<WindowDescriptor>,
        output: &Path,
    ) -> Result<PipelineSummary, SpecClusterError> {
        self.merge_stage().validate(&windows)?;
        let mut summary = PipelineSummary {
            windows: windows.len(),
            ..Default::default()
        };
        self.merge_into(windows, output, &mut summary)?;
        Ok(summary)
    }

    fn cluster_and_merge(
        &self,
        windows: Vec<WindowDescriptor>,
        output: &Path,
        mut summary: PipelineSummary,
    ) -> Result<PipelineSummary, SpecClusterError> {
        // Checked before any job is scheduled.
        self.merge_stage().validate(&windows)?;
        summary.windows = windows.len();

        let st = Instant::now();
        let (clustered, timings, reused) = self.cluster_all(windows)?;
        summary.clustering = timings;
        summary.reused_windows = reused;
        summary.stage_times.push((ClusteringStage::Clustering, st.elapsed()));
        info!(
            "Clustered {} windows in {:?} ({} comparisons)",
            clustered.len(),
            st.elapsed(),
            summary.clustering.comparisons
        );
        if !self.config.keep_intermediate {
            remove_dir(&self.windows_dir());
        }

        self.merge_into(clustered, output, &mut summary)?;
        if !self.config.keep_intermediate {
            remove_dir(&self.clustered_dir());
            remove_file(&self.manifest_path());
        }
        Ok(summary)
    }

    /// Windows of an earlier conversion of the same input, if they are all
    /// still there. Clustered windows of a different or unknown input are
    /// removed so they cannot be reused.
    fn resumable_windows(
        &self,
        input_spectra: usize,
    ) -> Result<Option<Vec<WindowDescriptor>>, SpecClusterError> {
        if !self.resume {
            return Ok(None);
        }
        let manifest = match read_manifest(&self.manifest_path()) {
            Some(m) if m.input_spectra == input_spectra => m,
            Some(m) => {
                warn!(
                    "Earlier run converted {} spectra, this input has {}; starting over",
                    m.input_spectra, input_spectra
                );
                remove_dir(&self.clustered_dir());
                return Ok(None);
            }
            None => {
                info!("No complete conversion to resume from");
                remove_dir(&self.clustered_dir());
                return Ok(None);
            }
        };

        let mut expected: Vec<PathBuf> = manifest.windows.iter().map(|w| w.path.clone()).collect();
        expected.sort();
        let found = list_window_files(&self.windows_dir())?;
        if found.is_empty() || found != expected {
            debug!(
                "Windows on disk ({}) do not match the conversion manifest ({}), writing them again",
                found.len(),
                expected.len()
            );
            return Ok(None);
        }
        match scan_windows(&found) {
            Ok(windows) => Ok(Some(windows)),
            Err(e) => {
                warn!("Writing windows again, existing windows are unusable: {}", e);
                Ok(None)
            }
        }
    }

    fn write_windows<S: SpectrumSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<Vec<WindowDescriptor>, SpecClusterError> {
        let dir = self.windows_dir();
        remove_file(&self.manifest_path());
        remove_dir(&dir);
        create_dir(&dir)?;
        let bins = self
            .config
            .partitioning
            .partition_for_merge(source.references().to_vec(), self.config.merge_width);
        info!("Partitioned {} spectra into {} bins", source.references().len(), bins.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        let windows = WindowWriter::new(source, dir, self.config.consensus_settings())
            .with_progress_listeners(self.progress.clone())
            .write_bins(bins, &pool, &self.cancel)?;
        write_manifest(
            &self.manifest_path(),
            &ConversionManifest {
                input_spectra: source.references().len(),
                windows: windows.clone(),
            },
        )?;
        Ok(windows)
    }

    fn cluster_all(
        &self,
        mut windows: Vec<WindowDescriptor>,
    ) -> Result<(Vec<WindowDescriptor>, JobTimings, usize), SpecClusterError> {
        let dir = self.clustered_dir();
        create_dir(&dir)?;
        sort_by_min_mass(&mut windows);
        let region = self.config.region.unwrap_or_else(MassRange::unbounded);

        let mut reused = Vec::new();
        let mut orchestrator = JobOrchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.oracle),
            self.cancel.clone(),
            ClusteringStage::Clustering,
        )?;
        for listener in self.progress.iter() {
            orchestrator.add_progress_listener(Arc::clone(listener));
        }
        for (i, window) in windows.into_iter().enumerate() {
            let output = match window.path.file_name() {
                Some(name) => dir.join(name),
                None => dir.join(format!("window_{:05}.{}", i, CLUSTER_FILE_EXTENSION)),
            };
            if self.resume {
                if let Some(done) = reusable_output(&output) {
                    reused.push(done);
                    continue;
                }
            }
            orchestrator.submit(
                WindowJobSpec::new(window, output, dir.clone())
                    .with_region(region)
                    .with_item_filter(self.config.item_filter),
            );
        }
        if !reused.is_empty() {
            info!("Reusing {} clustered windows from an earlier run", reused.len());
        }

        let results = orchestrator.await_all()?;
        let mut timings = JobTimings::default();
        for result in results.iter() {
            timings += result.timings.clone();
        }
        let n_reused = reused.len();
        let mut outputs = collect_outputs(results, "clustering")?;
        outputs.extend(reused);
        sort_by_min_mass(&mut outputs);
        Ok((outputs, timings, n_reused))
    }

    fn merge_stage(&self) -> BoundaryMergeStage {
        let mut stage = BoundaryMergeStage::new(
            Arc::clone(&self.config),
            Arc::clone(&self.oracle),
            self.merge_dir(),
            self.cancel.clone(),
        );
        for listener in self.progress.iter() {
            stage.add_progress_listener(Arc::clone(listener));
        }
        stage
    }

    fn merge_into(
        &self,
        windows: Vec<WindowDescriptor>,
        output: &Path,
        summary: &mut PipelineSummary,
    ) -> Result<(), SpecClusterError> {
        let st = Instant::now();
        let merge_dir = self.merge_dir();
        create_dir(&merge_dir)?;
        let concatenated = match self.config.duplicate_merge {
            Some(_) => merge_dir.join(format!("concatenated.{}", CLUSTER_FILE_EXTENSION)),
            None => output.to_path_buf(),
        };

        let mut concat = ClusterConcatenator::create(&concatenated)?;
        summary.merge = self.merge_stage().run(windows, &mut concat)?;
        let mut final_window = concat.finish()?;
        summary.stage_times.push((ClusteringStage::Merging, st.elapsed()));

        let st = Instant::now();
        if let Some(dup_config) = self.config.duplicate_merge {
            let (window, stats) = merge_shared_spectra(
                &concatenated,
                output,
                &dup_config,
                &self.config.consensus_settings(),
                &self.cancel,
            )?;
            final_window = window;
            summary.duplicate_merge = Some(stats);
        }
        summary.stage_times.push((ClusteringStage::Output, st.elapsed()));

        let event = ProgressEvent {
            stage: ClusteringStage::Output,
            completed: 1,
            total: 1,
            message: format!(
                "Wrote {} clusters to {}",
                final_window.item_count,
                output.display()
            ),
        };
        for listener in self.progress.iter() {
            listener.on_progress(&event);
        }
        summary.output = Some(final_window);

        if !self.config.keep_intermediate {
            remove_dir(&merge_dir);
        }
        Ok(())
    }
}

/// Window files (by extension) directly inside `dir`, sorted by name.
/// A missing directory has no windows.
pub fn list_window_files(dir: &Path) -> Result<Vec<PathBuf>, SpecClusterError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(x) => x,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SpecClusterError::Io {
                source: e,
                path: Some(dir.to_path_buf()),
            });
        }
    };
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| SpecClusterError::Io {
                source: e,
                path: Some(dir.to_path_buf()),
            })?
            .path();
        if path.is_file()
            && path.extension().and_then(|x| x.to_str()) == Some(CLUSTER_FILE_EXTENSION)
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Reads every window once to recover its descriptor.
pub fn scan_windows(paths: &[PathBuf]) -> Result<Vec<WindowDescriptor>, SpecClusterError> {
    let mut windows = Vec::with_capacity(paths.len());
    for path in paths {
        let window = scan_window_file(path, &ItemFilter::All)?;
        if window.is_empty() {
            warn!("Skipping empty window {}", path.display());
            continue;
        }
        windows.push(window);
    }
    sort_by_min_mass(&mut windows);
    Ok(windows)
}

fn reusable_output(path: &Path) -> Option<WindowDescriptor> {
    if !path.is_file() {
        return None;
    }
    match scan_window_file(path, &ItemFilter::All) {
        Ok(window) => Some(window),
        Err(e) => {
            warn!("Clustering {} again, existing output is unusable: {}", path.display(), e);
            None
        }
    }
}

fn read_manifest(path: &Path) -> Option<ConversionManifest> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
            None
        }
    }
}

fn write_manifest(path: &Path, manifest: &ConversionManifest) -> Result<(), SpecClusterError> {
    let staged = StagedFile::beside(path);
    let text = serde_json::to_string_pretty(manifest).map_err(std::io::Error::from)?;
    std::fs::write(staged.path(), text).map_err(|e| SpecClusterError::Io {
        source: e,
        path: Some(path.to_path_buf()),
    })?;
    staged.persist(path)?;
    Ok(())
}

fn remove_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

fn create_dir(path: &Path) -> Result<(), SpecClusterError> {
    std::fs::create_dir_all(path).map_err(|e| SpecClusterError::Io {
        source: e,
        path: Some(path.to_path_buf()),
    })
}

fn remove_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BinnedCosineOracle;

    #[test]
    fn test_invalid_config_fails_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClusteringConfig {
            thresholds: Vec::new(),
            ..Default::default()
        };
        let res = ClusteringPipeline::new(
            config,
            Arc::new(BinnedCosineOracle::new(0.5)),
            dir.path().join("work"),
        );
        assert!(matches!(res, Err(SpecClusterError::Config(_))));
        assert!(!dir.path().join("work").exists());
    }

    #[test]
    fn test_list_window_files_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.cls"), b"").unwrap();
        std::fs::write(dir.path().join("a.cls"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let files = list_window_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.cls"), dir.path().join("b.cls")]);
        assert!(list_window_files(&dir.path().join("missing")).unwrap().is_empty());
    }
}
