use crate::clustering::JobResult;
use crate::errors::SpecClusterError;
use crate::models::WindowDescriptor;
use crate::progress::WindowListener;
use std::collections::BTreeMap;
use tracing::trace;

/// Consumes finished windows in ascending mass order.
pub trait WindowSink {
    fn accept(&mut self, window: &WindowDescriptor) -> Result<(), SpecClusterError>;
}

impl WindowSink for Vec<WindowDescriptor> {
    fn accept(&mut self, window: &WindowDescriptor) -> Result<(), SpecClusterError> {
        self.push(window.clone());
        Ok(())
    }
}

/// Reorders windows that finish in any order.
///
/// A window is forwarded to the sink once every window before it has been
/// forwarded. Jobs finishing early are held back until the gap closes.
pub struct OrderedWindowEmitter<'s> {
    sink: &'s mut dyn WindowSink,
    /// Position of job 0.
    offset: usize,
    next: usize,
    pending: BTreeMap<usize, WindowDescriptor>,
}

impl<'s> OrderedWindowEmitter<'s> {
    pub fn new(sink: &'s mut dyn WindowSink, offset: usize) -> Self {
        Self {
            sink,
            offset,
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn emit(&mut self, position: usize, window: WindowDescriptor) -> Result<(), SpecClusterError> {
        self.pending.insert(position, window);
        while let Some(window) = self.pending.remove(&self.next) {
            trace!("Emitting window {} ({})", self.next, window.path.display());
            self.sink.accept(&window)?;
            self.next += 1;
        }
        Ok(())
    }

    /// Number of windows forwarded so far.
    pub fn emitted(&self) -> usize {
        self.next
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl WindowListener for OrderedWindowEmitter<'_> {
    fn on_window_completed(&mut self, result: &JobResult) -> Result<(), SpecClusterError> {
        match result.output() {
            Some(window) => self.emit(result.job_index + self.offset, window.clone()),
            // Failures are reported by the caller once all jobs are done.
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn window(name: &str, min_mass: f64) -> WindowDescriptor {
        WindowDescriptor {
            path: PathBuf::from(name),
            min_mass,
            max_mass: min_mass + 5.0,
            item_count: 1,
        }
    }

    #[test]
    fn test_emits_contiguous_prefix_only() {
        let mut sink: Vec<WindowDescriptor> = Vec::new();
        {
            let mut emitter = OrderedWindowEmitter::new(&mut sink, 0);
            emitter.emit(2, window("c", 20.0)).unwrap();
            emitter.emit(1, window("b", 10.0)).unwrap();
            assert_eq!(emitter.emitted(), 0);
            assert_eq!(emitter.pending(), 2);
            emitter.emit(0, window("a", 0.0)).unwrap();
            assert_eq!(emitter.emitted(), 3);
            assert_eq!(emitter.pending(), 0);
        }
        let names: Vec<_> = sink.iter().map(|w| w.path.clone()).collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }

    struct FailingSink;

    impl WindowSink for FailingSink {
        fn accept(&mut self, window: &WindowDescriptor) -> Result<(), SpecClusterError> {
            Err(SpecClusterError::Io {
                source: std::io::Error::other("disk full"),
                path: Some(window.path.clone()),
            })
        }
    }

    #[test]
    fn test_sink_error_is_returned() {
        let mut sink = FailingSink;
        let mut emitter = OrderedWindowEmitter::new(&mut sink, 0);
        assert!(emitter.emit(1, window("b", 10.0)).is_ok());
        assert!(emitter.emit(0, window("a", 0.0)).is_err());
    }
}
