use super::timings::JobTimings;
use crate::errors::{
    ClusteringError,
    JobFailure,
    SpecClusterError,
};
use crate::models::{
    WindowDescriptor,
    sort_by_min_mass,
};

#[derive(Debug)]
pub enum JobOutcome {
    Completed(WindowDescriptor),
    Failed(ClusteringError),
    /// The job was cancelled before or while running.
    Cancelled,
}

/// Pairs a window job's input with what it produced.
#[derive(Debug)]
pub struct JobResult {
    pub job_index: usize,
    pub input: WindowDescriptor,
    pub outcome: JobOutcome,
    pub timings: JobTimings,
}

impl JobResult {
    pub fn output(&self) -> Option<&WindowDescriptor> {
        match &self.outcome {
            JobOutcome::Completed(x) => Some(x),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Completed(_))
    }
}

/// Outputs of a batch of jobs sorted by mass, or every failure at once.
///
/// Failures take precedence over cancellation so that a retry knows which
/// windows need attention.
pub fn collect_outputs(
    results: Vec<JobResult>,
    stage: &'static str,
) -> Result<Vec<WindowDescriptor>, SpecClusterError> {
    let mut outputs = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    let mut cancelled = false;
    for result in results {
        match result.outcome {
            JobOutcome::Completed(out) => outputs.push(out),
            JobOutcome::Failed(error) => failures.push(JobFailure {
                window: result.input.path,
                error,
            }),
            JobOutcome::Cancelled => cancelled = true,
        }
    }
    if !failures.is_empty() {
        failures.sort_by(|a, b| a.window.cmp(&b.window));
        return Err(SpecClusterError::FailedJobs { stage, failures });
    }
    if cancelled {
        return Err(SpecClusterError::Cancelled);
    }
    sort_by_min_mass(&mut outputs);
    Ok(outputs)
}
