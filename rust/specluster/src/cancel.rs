use crate::errors::ClusteringError;
use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};

/// Cooperative cancellation shared between the caller and running jobs.
///
/// Jobs check the token before they start, once per round and once per
/// clustered item, so a cancelled run winds down after at most one item.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ClusteringError> {
        if self.is_cancelled() {
            Err(ClusteringError::Cancelled)
        } else {
            Ok(())
        }
    }
}
