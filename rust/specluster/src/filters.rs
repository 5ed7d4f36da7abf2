use crate::models::Cluster;
use serde::{
    Deserialize,
    Serialize,
};

/// Decides which items of a window take part in clustering.
///
/// Only applied in the first round of a job; items that are rejected are
/// dropped from the window output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFilter {
    #[default]
    All,
    /// Only clusters with at least one identified member.
    Identified,
    /// Only clusters without any identified member.
    Unidentified,
    MinMembers(usize),
}

impl ItemFilter {
    pub fn accepts(&self, cluster: &Cluster) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Identified => cluster.identified_count() > 0,
            ItemFilter::Unidentified => cluster.identified_count() == 0,
            ItemFilter::MinMembers(n) => cluster.member_count() >= *n,
        }
    }

    pub fn filter(&self, items: Vec<Cluster>) -> Vec<Cluster> {
        match self {
            ItemFilter::All => items,
            _ => items.into_iter().filter(|x| self.accepts(x)).collect(),
        }
    }
}
