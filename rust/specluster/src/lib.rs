pub mod cancel;
pub mod clustering;
pub mod config;
pub mod data_sources;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod merging;
pub mod models;
pub mod partitioning;
pub mod pipeline;
pub mod progress;
pub mod stream;

pub use cancel::CancellationToken;
pub use clustering::{
    JobOrchestrator,
    JobResult,
    WindowClusteringJob,
    WindowJobSpec,
};
pub use config::{
    ClusteringConfig,
    generate_thresholds,
};
pub use data_sources::{
    NdjsonSpectrumSource,
    SpectrumSource,
};
pub use engine::{
    BinnedCosineOracle,
    IncrementalClusteringEngine,
    SimilarityOracle,
};
pub use errors::{
    Result,
    SpecClusterError,
};
pub use filters::ItemFilter;
pub use merging::{
    BoundaryMergeStage,
    DuplicateMergeConfig,
};
pub use models::{
    Cluster,
    ItemReference,
    MassRange,
    Peak,
    Spectrum,
    WindowDescriptor,
};
pub use partitioning::{
    PartitionPolicy,
    Partitioner,
};
pub use pipeline::{
    ClusteringPipeline,
    PipelineSummary,
};
pub use progress::{
    ClusteringStage,
    LoggingProgressListener,
    ProgressEvent,
    ProgressListener,
};
