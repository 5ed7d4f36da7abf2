//! Greedy, threshold-descending clustering of mass sorted items.

pub mod cache;
pub mod incremental;
pub mod oracle;
pub mod predicates;
pub mod rounds;

pub use cache::ComparisonCache;
pub use incremental::{
    CacheMode,
    EngineState,
    IncrementalClusteringEngine,
    RoundParameters,
    sort_clusters_by_mass,
};
pub use oracle::{
    BinnedCosineOracle,
    SimilarityOracle,
};
pub use predicates::ComparisonPredicate;
pub use rounds::{
    RoundPlan,
    RoundStats,
    cluster_rounds,
    run_round,
};
