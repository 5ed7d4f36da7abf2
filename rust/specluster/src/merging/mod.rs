//! Everything that happens after the per-window clustering pass.

pub mod boundary;
pub mod concat;
pub mod ordered;
pub mod rebin;
pub mod shared_spectra;

pub use boundary::{
    BoundaryMergeStage,
    MergeStats,
};
pub use concat::ClusterConcatenator;
pub use ordered::{
    OrderedWindowEmitter,
    WindowSink,
};
pub use rebin::rebin_with_overlap;
pub use shared_spectra::{
    DuplicateMergeConfig,
    DuplicateMergeStats,
    merge_shared_spectra,
    shared_fraction,
};
