use crate::errors::OracleError;
use crate::models::{
    Cluster,
    Peak,
};

/// Pairwise similarity between an existing cluster and a candidate.
///
/// Implementations must be deterministic and are shared read-only between
/// all workers. Higher scores mean more similar. An error aborts the job that
/// asked for the comparison.
pub trait SimilarityOracle: Send + Sync {
    fn score(&self, existing: &Cluster, candidate: &Cluster) -> Result<f64, OracleError>;
}

/// Normalized dot product of the consensus peaks.
///
/// Peaks are paired greedily in m/z order when they lie within the fragment
/// tolerance; unmatched peaks only contribute to the norms.
#[derive(Debug, Clone, Copy)]
pub struct BinnedCosineOracle {
    pub fragment_tolerance: f64,
}

impl BinnedCosineOracle {
    pub fn new(fragment_tolerance: f64) -> Self {
        Self { fragment_tolerance }
    }
}

fn norm(peaks: &[Peak]) -> f64 {
    peaks
        .iter()
        .map(|p| (p.intensity as f64) * (p.intensity as f64))
        .sum::<f64>()
        .sqrt()
}

impl SimilarityOracle for BinnedCosineOracle {
    fn score(&self, existing: &Cluster, candidate: &Cluster) -> Result<f64, OracleError> {
        let left = existing.consensus();
        let right = candidate.consensus();
        let denom = norm(left) * norm(right);
        if !(denom > 0.0) {
            return Ok(0.0);
        }

        let mut dot = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            let (l, r) = (&left[i], &right[j]);
            if (l.mz - r.mz).abs() <= self.fragment_tolerance {
                dot += l.intensity as f64 * r.intensity as f64;
                i += 1;
                j += 1;
            } else if l.mz < r.mz {
                i += 1;
            } else {
                j += 1;
            }
        }

        let score = dot / denom;
        if score.is_finite() {
            Ok(score.min(1.0))
        } else {
            Err(OracleError::new(format!(
                "non-finite similarity between {} and {}",
                existing.id(),
                candidate.id()
            )))
        }
    }
}
