use crate::clustering::JobResult;
use crate::errors::SpecClusterError;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringStage {
    Conversion,
    Clustering,
    Merging,
    Output,
}

impl std::fmt::Display for ClusteringStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClusteringStage::Conversion => "conversion",
            ClusteringStage::Clustering => "clustering",
            ClusteringStage::Merging => "merging",
            ClusteringStage::Output => "output",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: ClusteringStage,
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn percent_completed(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Receives progress pushes from the pipeline.
///
/// Window conversion reports from the worker threads, so implementations
/// must be cheap and thread safe.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Writes every progress event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgressListener;

impl ProgressListener for LoggingProgressListener {
    fn on_progress(&self, event: &ProgressEvent) {
        info!(
            "[{}] {}/{} ({:.1}%) {}",
            event.stage,
            event.completed,
            event.total,
            event.percent_completed(),
            event.message
        );
    }
}

/// Receives every finished window job, in completion order.
///
/// An error returned here cancels the remaining jobs of the batch.
pub trait WindowListener {
    fn on_window_completed(&mut self, result: &JobResult) -> Result<(), SpecClusterError>;
}
