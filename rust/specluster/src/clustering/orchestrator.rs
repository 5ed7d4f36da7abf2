use super::job::{
    WindowClusteringJob,
    WindowJobSpec,
};
use super::result::{
    JobOutcome,
    JobResult,
};
use super::timings::JobTimings;
use crate::cancel::CancellationToken;
use crate::config::ClusteringConfig;
use crate::engine::SimilarityOracle;
use crate::errors::{
    ClusteringError,
    SpecClusterError,
};
use crate::progress::{
    ClusteringStage,
    ProgressEvent,
    ProgressListener,
    WindowListener,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{
    Receiver,
    Sender,
    channel,
};
use std::time::Instant;
use tracing::{
    debug,
    error,
    warn,
};

/// Identifies a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_index: usize,
    pub input: PathBuf,
}

/// Runs window jobs on a fixed-size worker pool.
///
/// Jobs share the configuration and the oracle read-only and own everything
/// else. Completions come back over a channel to the thread calling
/// [`JobOrchestrator::await_all`], which is also where listeners are called.
pub struct JobOrchestrator<'l> {
    pool: rayon::ThreadPool,
    config: Arc<ClusteringConfig>,
    oracle: Arc<dyn SimilarityOracle>,
    cancel: CancellationToken,
    stage: ClusteringStage,
    sender: Sender<JobResult>,
    receiver: Receiver<JobResult>,
    submitted: usize,
    window_listeners: Vec<&'l mut dyn WindowListener>,
    progress_listeners: Vec<Arc<dyn ProgressListener>>,
}

impl<'l> JobOrchestrator<'l> {
    pub fn new(
        config: Arc<ClusteringConfig>,
        oracle: Arc<dyn SimilarityOracle>,
        cancel: CancellationToken,
        stage: ClusteringStage,
    ) -> Result<Self, SpecClusterError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("specluster-worker-{}", i))
            .build()?;
        let (sender, receiver) = channel();
        Ok(Self {
            pool,
            config,
            oracle,
            cancel,
            stage,
            sender,
            receiver,
            submitted: 0,
            window_listeners: Vec::new(),
            progress_listeners: Vec::new(),
        })
    }

    pub fn add_window_listener(&mut self, listener: &'l mut dyn WindowListener) {
        self.window_listeners.push(listener);
    }

    pub fn add_progress_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.progress_listeners.push(listener);
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn submit(&mut self, spec: WindowJobSpec) -> JobHandle {
        let job_index = self.submitted;
        self.submitted += 1;
        let handle = JobHandle {
            job_index,
            input: spec.input.path.clone(),
        };

        let config = Arc::clone(&self.config);
        let oracle = Arc::clone(&self.oracle);
        let cancel = self.cancel.clone();
        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = run_job(job_index, spec, &config, oracle.as_ref(), &cancel);
            if sender.send(result).is_err() {
                warn!("Job {} finished after its results were abandoned", job_index);
            }
        });
        handle
    }

    /// Blocks until every submitted job reported back.
    ///
    /// Returns the results in completion order. Failed and cancelled jobs are
    /// part of the results; only a listener error is returned as `Err`.
    pub fn await_all(self) -> Result<Vec<JobResult>, SpecClusterError> {
        let Self {
            pool,
            cancel,
            stage,
            sender,
            receiver,
            submitted,
            mut window_listeners,
            progress_listeners,
            ..
        } = self;
        drop(sender);

        let mut results: Vec<JobResult> = Vec::with_capacity(submitted);
        let mut listener_error: Option<SpecClusterError> = None;
        while results.len() < submitted {
            let result = match receiver.recv() {
                Ok(x) => x,
                Err(_) => {
                    error!(
                        "Lost {} {} job(s) without a result",
                        submitted - results.len(),
                        stage
                    );
                    break;
                }
            };

            if listener_error.is_none() {
                for listener in window_listeners.iter_mut() {
                    if let Err(e) = listener.on_window_completed(&result) {
                        error!("Window listener failed, cancelling remaining jobs: {}", e);
                        cancel.cancel();
                        listener_error = Some(e);
                        break;
                    }
                }
            }

            let event = ProgressEvent {
                stage,
                completed: results.len() + 1,
                total: submitted,
                message: describe(&result),
            };
            for listener in progress_listeners.iter() {
                listener.on_progress(&event);
            }
            results.push(result);
        }
        drop(pool);

        match listener_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

fn run_job(
    job_index: usize,
    spec: WindowJobSpec,
    config: &ClusteringConfig,
    oracle: &dyn SimilarityOracle,
    cancel: &CancellationToken,
) -> JobResult {
    let start = Instant::now();
    let outcome_and_timings = if cancel.is_cancelled() {
        Err(ClusteringError::Cancelled)
    } else {
        WindowClusteringJob::new(&spec, config, oracle).run(cancel)
    };
    let (outcome, timings) = match outcome_and_timings {
        Ok((output, timings)) => (JobOutcome::Completed(output), timings),
        Err(ClusteringError::Cancelled) => {
            debug!("Job {} on {} cancelled", job_index, spec.input.path.display());
            (JobOutcome::Cancelled, partial_timings(start))
        }
        Err(e) => {
            error!(
                "Clustering {} failed: {}",
                spec.input.path.display(),
                e
            );
            (JobOutcome::Failed(e), partial_timings(start))
        }
    };
    JobResult {
        job_index,
        input: spec.input,
        outcome,
        timings,
    }
}

fn partial_timings(start: Instant) -> JobTimings {
    JobTimings {
        total: start.elapsed(),
        ..Default::default()
    }
}

fn describe(result: &JobResult) -> String {
    match &result.outcome {
        JobOutcome::Completed(out) => format!(
            "Completed clustering {} items ({:.2} m/z to {:.2} m/z)",
            result.timings.input_items, out.min_mass, out.max_mass
        ),
        JobOutcome::Failed(e) => format!("Failed {}: {}", result.input.path.display(), e),
        JobOutcome::Cancelled => format!("Cancelled {}", result.input.path.display()),
    }
}
