use super::timings::JobTimings;
use crate::cancel::CancellationToken;
use crate::config::ClusteringConfig;
use crate::engine::{
    ComparisonCache,
    RoundPlan,
    SimilarityOracle,
    run_round,
};
use crate::errors::ClusteringError;
use crate::filters::ItemFilter;
use crate::models::{
    MassRange,
    WindowDescriptor,
};
use crate::stream::{
    StagedFile,
    create_window_file,
    open_window_file,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{
    debug,
    instrument,
};

/// What one window job reads, where it writes, and which part it clusters.
#[derive(Debug, Clone)]
pub struct WindowJobSpec {
    pub input: WindowDescriptor,
    pub output_path: PathBuf,
    /// Round outputs are staged here before replacing `output_path`.
    /// Must live on the same file system as the output.
    pub temp_dir: PathBuf,
    pub region: MassRange,
    pub item_filter: ItemFilter,
}

impl WindowJobSpec {
    pub fn new(input: WindowDescriptor, output_path: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            input,
            output_path,
            temp_dir,
            region: MassRange::unbounded(),
            item_filter: ItemFilter::All,
        }
    }

    pub fn with_region(mut self, region: MassRange) -> Self {
        self.region = region;
        self
    }

    pub fn with_item_filter(mut self, filter: ItemFilter) -> Self {
        self.item_filter = filter;
        self
    }
}

/// Runs every clustering round over a single window file.
///
/// The first round reads the input window, later rounds read the output of
/// the round before. Rounds are written to temporary files and only the
/// result of the last round is moved to the output path, so a failed or
/// cancelled job never leaves a partial output behind and an existing output
/// is always complete.
pub struct WindowClusteringJob<'a> {
    spec: &'a WindowJobSpec,
    config: &'a ClusteringConfig,
    oracle: &'a dyn SimilarityOracle,
}

impl<'a> WindowClusteringJob<'a> {
    pub fn new(
        spec: &'a WindowJobSpec,
        config: &'a ClusteringConfig,
        oracle: &'a dyn SimilarityOracle,
    ) -> Self {
        Self {
            spec,
            config,
            oracle,
        }
    }

    #[instrument(skip_all, fields(window = %self.spec.input.path.display()))]
    pub fn run(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(WindowDescriptor, JobTimings), ClusteringError> {
        let start = Instant::now();
        let mut timings = JobTimings::default();
        let mut cache = ComparisonCache::new();
        let mut output: Option<WindowDescriptor> = None;
        let mut previous: Option<StagedFile> = None;
        let last_round = self.config.thresholds.len().saturating_sub(1);

        for (round, &threshold) in self.config.thresholds.iter().enumerate() {
            cancel.check()?;
            let round_start = Instant::now();
            let source = match &previous {
                Some(staged) => staged.path(),
                None => self.spec.input.path.as_path(),
            };
            let plan = RoundPlan::for_round(
                round,
                threshold,
                self.config,
                self.spec.region,
                self.spec.item_filter,
            );

            let staged = StagedFile::new(self.temp_path(round));
            let mut writer = create_window_file(staged.path())?;
            let reader = open_window_file(source)?;
            let stats = run_round(
                reader.map(|x| x.map_err(ClusteringError::from)),
                &plan,
                self.oracle,
                &mut cache,
                cancel,
                |cluster| writer.append(&cluster).map_err(ClusteringError::from),
            )?;
            let written = writer.finish_file(staged.path())?;

            if round == 0 {
                timings.input_items = stats.input_items;
            }
            timings.comparisons += stats.comparisons;
            timings.rounds.push(round_start.elapsed());
            debug!(
                "Round {} (threshold {:.4}): {} items in, {} clusters out, {} comparisons, {} known matches",
                round + 1,
                threshold,
                stats.input_items,
                stats.output_clusters,
                stats.comparisons,
                cache.len()
            );

            if round == last_round {
                staged.persist(&self.spec.output_path)?;
                output = Some(WindowDescriptor {
                    path: self.spec.output_path.clone(),
                    ..written
                });
            } else {
                // Replacing drops, and so deletes, the round before.
                previous = Some(staged);
            }
        }

        timings.total = start.elapsed();
        // Thresholds are validated to be non empty before any job runs.
        let output = output.ok_or_else(|| ClusteringError::Io {
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no clustering thresholds configured",
            ),
            context: "Error running window job",
            path: Some(self.spec.input.path.clone()),
        })?;
        Ok((output, timings))
    }

    fn temp_path(&self, round: usize) -> PathBuf {
        let name = self
            .spec
            .output_path
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| "window".to_string());
        self.spec
            .temp_dir
            .join(format!("{}.round{:02}.tmp", name, round))
    }
}
