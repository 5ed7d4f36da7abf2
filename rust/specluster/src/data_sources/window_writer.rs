//! Materializes partition bins as window files.
//!
//! Each bin becomes one mass sorted cluster stream of singleton clusters.
//! Bins are written in parallel, one `SourceReaderCache` per worker thread
//! (created through rayon's `map_init`) so file handles are never shared.

use super::{
    SourceReaderCache,
    SpectrumSource,
};
use crate::cancel::CancellationToken;
use crate::errors::{
    ClusteringError,
    JobFailure,
    SpecClusterError,
};
use crate::models::{
    Cluster,
    ConsensusSettings,
    ItemReference,
    WindowDescriptor,
};
use crate::progress::{
    ClusteringStage,
    ProgressEvent,
    ProgressListener,
};
use crate::stream::{
    CLUSTER_FILE_EXTENSION,
    StagedFile,
    create_window_file,
};
use rayon::prelude::*;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use tracing::{
    debug,
    info,
};

pub struct WindowWriter<'a, S: SpectrumSource + ?Sized> {
    source: &'a S,
    output_dir: PathBuf,
    consensus: ConsensusSettings,
    progress: Vec<Arc<dyn ProgressListener>>,
}

impl<'a, S: SpectrumSource + ?Sized> WindowWriter<'a, S> {
    pub fn new(source: &'a S, output_dir: PathBuf, consensus: ConsensusSettings) -> Self {
        Self {
            source,
            output_dir,
            consensus,
            progress: Vec::new(),
        }
    }

    pub fn with_progress_listeners(mut self, listeners: Vec<Arc<dyn ProgressListener>>) -> Self {
        self.progress = listeners;
        self
    }

    pub fn window_path(&self, bin_index: usize) -> PathBuf {
        self.output_dir
            .join(format!("window_{:05}.{}", bin_index, CLUSTER_FILE_EXTENSION))
    }

    /// Writes every non-empty bin and returns the written windows sorted by
    /// mass. Empty bins, and bins whose spectra all have no peaks, produce
    /// no file.
    pub fn write_bins(
        &self,
        bins: Vec<Vec<ItemReference>>,
        pool: &rayon::ThreadPool,
        cancel: &CancellationToken,
    ) -> Result<Vec<WindowDescriptor>, SpecClusterError> {
        let indexed: Vec<(usize, Vec<ItemReference>)> = bins
            .into_iter()
            .enumerate()
            .filter(|(_, bin)| !bin.is_empty())
            .collect();
        let total = indexed.len();
        let completed = AtomicUsize::new(0);
        info!(
            "Writing {} windows to {}",
            total,
            self.output_dir.display()
        );

        let results: Vec<(PathBuf, Result<Option<WindowDescriptor>, ClusteringError>)> =
            pool.install(|| {
                indexed
                    .into_par_iter()
                    .map_init(SourceReaderCache::default, |cache, (bin_index, bin)| {
                        let path = self.window_path(bin_index);
                        let result = self.write_window(&bin, &path, cache, cancel);
                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        let event = ProgressEvent {
                            stage: ClusteringStage::Conversion,
                            completed: done,
                            total,
                            message: format!("Wrote {}", path.display()),
                        };
                        for listener in self.progress.iter() {
                            listener.on_progress(&event);
                        }
                        (path, result)
                    })
                    .collect()
            });

        let mut windows = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (path, result) in results {
            match result {
                Ok(Some(window)) => windows.push(window),
                Ok(None) => {}
                Err(ClusteringError::Cancelled) => return Err(SpecClusterError::Cancelled),
                Err(error) => failures.push(JobFailure {
                    window: path,
                    error,
                }),
            }
        }
        if !failures.is_empty() {
            return Err(SpecClusterError::FailedJobs {
                stage: "conversion",
                failures,
            });
        }
        crate::models::sort_by_min_mass(&mut windows);
        Ok(windows)
    }

    fn write_window(
        &self,
        bin: &[ItemReference],
        path: &Path,
        cache: &mut SourceReaderCache,
        cancel: &CancellationToken,
    ) -> Result<Option<WindowDescriptor>, ClusteringError> {
        cancel.check()?;
        // A window only appears under its final name once it is complete.
        let staged = StagedFile::for_destination(path, &self.output_dir);
        let mut writer = create_window_file(staged.path())?;
        let mut skipped = 0;
        for reference in bin {
            let spectrum = self.source.load(reference, cache)?;
            if spectrum.peaks.is_empty() {
                skipped += 1;
                continue;
            }
            writer.append(&Cluster::singleton(&spectrum, &self.consensus))?;
        }
        let window = writer.finish_file(staged.path())?;
        if skipped > 0 {
            debug!("Skipped {} spectra without peaks in {}", skipped, path.display());
        }
        if window.is_empty() {
            return Ok(None);
        }
        staged.persist(path)?;
        Ok(Some(WindowDescriptor {
            path: path.to_path_buf(),
            ..window
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sources::NdjsonSpectrumSource;
    use crate::partitioning::{
        FixedWindowPartitioner,
        Partitioner,
    };
    use crate::stream::read_window_file;
    use std::io::Write;

    #[test]
    fn test_writes_sorted_windows_and_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("spectra.ndjson");
        let mut f = std::fs::File::create(&input).unwrap();
        for (id, mz, n_peaks) in [("a", 401.0, 1), ("b", 400.5, 1), ("c", 409.0, 0), ("d", 417.5, 2)] {
            let peaks: Vec<String> = (0..n_peaks).map(|i| format!("[{}.0, 1.0]", 100 + i)).collect();
            writeln!(
                f,
                r#"{{"id": "{}", "precursor_mz": {}, "peaks": [{}]}}"#,
                id,
                mz,
                peaks.join(",")
            )
            .unwrap();
        }
        drop(f);

        let source = NdjsonSpectrumSource::scan(&[input]).unwrap();
        let bins = FixedWindowPartitioner::new(8.0).partition(source.references().to_vec());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let writer = WindowWriter::new(&source, dir.path().to_path_buf(), ConsensusSettings::default());
        let windows = writer
            .write_bins(bins, &pool, &CancellationToken::new())
            .unwrap();

        // "c" has no peaks, which leaves its bin empty.
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].item_count, 2);
        assert_eq!(windows[0].min_mass, 400.5);
        assert_eq!(windows[1].min_mass, 417.5);
        let clusters = read_window_file(&windows[0].path).unwrap();
        let ids: Vec<&str> = clusters.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_failed_window_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.ndjson");
        let bad = dir.path().join("bad.ndjson");
        std::fs::write(&good, "{\"id\": \"a\", \"precursor_mz\": 400.5, \"peaks\": [[100.0, 1.0]]}\n").unwrap();
        std::fs::write(&bad, "{\"id\": \"b\", \"precursor_mz\": 430.0, \"peaks\": [[100.0, 1.0]]}\n").unwrap();
        let source = NdjsonSpectrumSource::scan(&[good, bad.clone()]).unwrap();
        // The file changes after it was indexed.
        std::fs::write(&bad, "not a spectrum\n").unwrap();

        let out_dir = dir.path().join("windows");
        std::fs::create_dir(&out_dir).unwrap();
        let bins = FixedWindowPartitioner::new(8.0).partition(source.references().to_vec());
        assert_eq!(bins.len(), 2);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let writer = WindowWriter::new(&source, out_dir.clone(), ConsensusSettings::default());
        let res = writer.write_bins(bins, &pool, &CancellationToken::new());

        assert!(matches!(
            res,
            Err(SpecClusterError::FailedJobs {
                stage: "conversion",
                ..
            })
        ));
        assert!(writer.window_path(0).exists());
        assert!(!writer.window_path(1).exists());
        let staged: Vec<PathBuf> = std::fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(staged.is_empty(), "left behind {:?}", staged);
    }
}
