use super::cache::ComparisonCache;
use crate::models::Cluster;

/// Gate deciding whether two clusters are worth asking the oracle about.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonPredicate {
    /// Any of the `count` most intense consensus peaks are shared.
    SharesMajorPeak { count: usize, tolerance: f64 },
    /// The pair was recorded as a match in the first round.
    KnownMatch,
    /// Precursor masses agree within this many parts per million.
    WithinPpm(f64),
    All(Vec<ComparisonPredicate>),
}

impl ComparisonPredicate {
    pub fn allows(&self, existing: &Cluster, candidate: &Cluster, cache: &ComparisonCache) -> bool {
        match self {
            ComparisonPredicate::SharesMajorPeak { count, tolerance } => {
                existing.shares_major_peak(candidate, *count, *tolerance)
            }
            ComparisonPredicate::KnownMatch => cache.is_known_match(existing, candidate),
            ComparisonPredicate::WithinPpm(ppm) => {
                let reference = existing.precursor_mass();
                if reference == 0.0 {
                    return candidate.precursor_mass() == 0.0;
                }
                let delta = (candidate.precursor_mass() - reference).abs();
                delta / reference.abs() * 1e6 <= *ppm
            }
            ComparisonPredicate::All(inner) => {
                inner.iter().all(|p| p.allows(existing, candidate, cache))
            }
        }
    }

    pub fn and(self, other: ComparisonPredicate) -> ComparisonPredicate {
        match self {
            ComparisonPredicate::All(mut inner) => {
                inner.push(other);
                ComparisonPredicate::All(inner)
            }
            first => ComparisonPredicate::All(vec![first, other]),
        }
    }
}
