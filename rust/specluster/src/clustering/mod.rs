//! Per-window clustering jobs and the pool that runs them.

pub mod job;
pub mod orchestrator;
pub mod result;
pub mod timings;

pub use job::{
    WindowClusteringJob,
    WindowJobSpec,
};
pub use orchestrator::{
    JobHandle,
    JobOrchestrator,
};
pub use result::{
    JobOutcome,
    JobResult,
    collect_outputs,
};
pub use timings::JobTimings;
