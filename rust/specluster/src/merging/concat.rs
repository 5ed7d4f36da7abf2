use super::ordered::WindowSink;
use crate::errors::{
    ClusteringError,
    SpecClusterError,
    StreamError,
};
use crate::models::WindowDescriptor;
use crate::stream::{
    StagedFile,
    WindowFileWriter,
    create_window_file,
    open_window_file,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::debug;

/// Appends whole windows, in the order they arrive, to one cluster stream.
///
/// Every window has to continue the mass order of the windows before it,
/// otherwise the stream would silently stop being sorted.
///
/// The stream is written next to `path` and only replaces it in `finish`.
pub struct ClusterConcatenator {
    path: PathBuf,
    writer: WindowFileWriter,
    staged: StagedFile,
    last_mass: f64,
    windows: usize,
}

impl ClusterConcatenator {
    pub fn create(path: &Path) -> Result<Self, StreamError> {
        let staged = StagedFile::beside(path);
        let writer = create_window_file(staged.path())?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            staged,
            last_mass: f64::NEG_INFINITY,
            windows: 0,
        })
    }

    pub fn windows(&self) -> usize {
        self.windows
    }

    pub fn clusters(&self) -> usize {
        self.writer.stats().count
    }

    pub fn finish(self) -> Result<WindowDescriptor, StreamError> {
        debug!(
            "Wrote {} clusters from {} windows to {}",
            self.writer.stats().count,
            self.windows,
            self.path.display()
        );
        let window = self.writer.finish_file(self.staged.path())?;
        self.staged.persist(&self.path)?;
        Ok(WindowDescriptor {
            path: self.path,
            ..window
        })
    }
}

impl WindowSink for ClusterConcatenator {
    fn accept(&mut self, window: &WindowDescriptor) -> Result<(), SpecClusterError> {
        for cluster in open_window_file(&window.path)? {
            let cluster = cluster?;
            let mass = cluster.precursor_mass();
            if mass < self.last_mass {
                return Err(ClusteringError::OrderingViolation {
                    previous_mass: self.last_mass,
                    mass,
                    item_id: cluster.id().to_string(),
                }
                .into());
            }
            self.last_mass = mass;
            self.writer.append(&cluster)?;
        }
        self.windows += 1;
        Ok(())
    }
}
