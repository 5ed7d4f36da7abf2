pub mod cluster;
pub mod item;
pub mod spectrum;
pub mod window;

pub use cluster::{
    Cluster,
    ConsensusSettings,
    MemberPeaks,
};
pub use item::{
    ItemReference,
    is_sorted_by_mass,
    sort_by_mass,
};
pub use spectrum::{
    Peak,
    Spectrum,
};
pub use window::{
    MassRange,
    WindowDescriptor,
    sort_by_min_mass,
};
