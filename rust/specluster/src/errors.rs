use std::path::PathBuf;

/// Errors raised while appending to or replaying a binary cluster stream.
#[derive(Debug)]
pub enum StreamError {
    Io {
        source: std::io::Error,
        context: &'static str,
        path: Option<PathBuf>,
    },
    Encode(rmp_serde::encode::Error),
    Decode(rmp_serde::decode::Error),
    /// The underlying data ended before the end-of-stream record was read.
    MissingEndMarker {
        path: Option<PathBuf>,
        records_read: usize,
    },
}

impl StreamError {
    pub(crate) fn with_path(mut self, path: &std::path::Path) -> Self {
        match &mut self {
            StreamError::Io { path: p, .. } | StreamError::MissingEndMarker { path: p, .. } => {
                if p.is_none() {
                    *p = Some(path.to_path_buf());
                }
            }
            StreamError::Encode(_) | StreamError::Decode(_) => {}
        }
        self
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Io {
                source,
                context,
                path,
            } => match path {
                Some(p) => write!(f, "{} ({}): {}", context, p.display(), source),
                None => write!(f, "{}: {}", context, source),
            },
            StreamError::Encode(e) => write!(f, "Error encoding cluster record: {}", e),
            StreamError::Decode(e) => write!(f, "Error decoding cluster record: {}", e),
            StreamError::MissingEndMarker { path, records_read } => match path {
                Some(p) => write!(
                    f,
                    "Cluster stream {} ended without an end marker after {} records",
                    p.display(),
                    records_read
                ),
                None => write!(
                    f,
                    "Cluster stream ended without an end marker after {} records",
                    records_read
                ),
            },
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Io { source, .. } => Some(source),
            StreamError::Encode(e) => Some(e),
            StreamError::Decode(e) => Some(e),
            StreamError::MissingEndMarker { .. } => None,
        }
    }
}

impl From<rmp_serde::encode::Error> for StreamError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StreamError::Encode(e)
    }
}

impl From<rmp_serde::decode::Error> for StreamError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StreamError::Decode(e)
    }
}

/// Failure reported by a similarity oracle.
#[derive(Debug, Clone)]
pub struct OracleError {
    pub message: String,
}

impl OracleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Similarity oracle failed: {}", self.message)
    }
}

impl std::error::Error for OracleError {}

#[derive(Debug, Clone)]
pub enum ConfigError {
    EmptyThresholds,
    InvalidThreshold {
        value: f64,
    },
    NonPositive {
        field: &'static str,
        value: f64,
    },
    ZeroWorkers,
    InvalidPartitionWidths {
        context: String,
    },
    InvalidRegion {
        min: f64,
        max: f64,
    },
    /// A partition width (nominal or observed) cannot hold twice the merge width.
    WindowTooNarrow {
        window: Option<PathBuf>,
        span: f64,
        merge_width: f64,
    },
    OverlappingWindows {
        previous: PathBuf,
        next: PathBuf,
    },
    FractionOutOfRange {
        field: &'static str,
        value: f64,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyThresholds => write!(f, "At least one clustering threshold is required"),
            ConfigError::InvalidThreshold { value } => {
                write!(f, "Clustering thresholds must be finite, got {}", value)
            }
            ConfigError::NonPositive { field, value } => {
                write!(f, "{} must be a positive finite number, got {}", field, value)
            }
            ConfigError::ZeroWorkers => write!(f, "The worker pool needs at least one worker"),
            ConfigError::InvalidPartitionWidths { context } => {
                write!(f, "Invalid partition widths: {}", context)
            }
            ConfigError::InvalidRegion { min, max } => {
                write!(f, "Region of interest [{}, {}) is empty", min, max)
            }
            ConfigError::WindowTooNarrow {
                window,
                span,
                merge_width,
            } => {
                let name = window
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "partition width".to_string());
                write!(
                    f,
                    "{} spans {:.4} which is less than twice the merge width ({:.4})",
                    name, span, merge_width
                )
            }
            ConfigError::OverlappingWindows { previous, next } => write!(
                f,
                "Windows {} and {} overlap in mass",
                previous.display(),
                next.display()
            ),
            ConfigError::FractionOutOfRange { field, value } => {
                write!(f, "{} must be within (0, 1], got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum SourceError {
    FileReadingError {
        source: std::io::Error,
        context: &'static str,
        path: PathBuf,
    },
    SpectrumParsingError {
        source: serde_json::Error,
        path: PathBuf,
        line: usize,
    },
    InvalidPrecursorMass {
        path: PathBuf,
        line: usize,
        value: f64,
    },
    UnknownItem {
        file_id: u32,
        index: u64,
    },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::FileReadingError {
                source,
                context,
                path,
            } => write!(f, "{} ({}): {}", context, path.display(), source),
            SourceError::SpectrumParsingError { source, path, line } => write!(
                f,
                "Error parsing spectrum at {}:{}: {}",
                path.display(),
                line,
                source
            ),
            SourceError::InvalidPrecursorMass { path, line, value } => write!(
                f,
                "Spectrum at {}:{} has an invalid precursor mass {}",
                path.display(),
                line,
                value
            ),
            SourceError::UnknownItem { file_id, index } => {
                write!(f, "No spectrum {} in source file {}", index, file_id)
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Errors that end a single clustering job.
#[derive(Debug)]
pub enum ClusteringError {
    OrderingViolation {
        previous_mass: f64,
        mass: f64,
        item_id: String,
    },
    Stream(StreamError),
    Oracle(OracleError),
    Source(SourceError),
    Io {
        source: std::io::Error,
        context: &'static str,
        path: Option<PathBuf>,
    },
    Cancelled,
}

impl ClusteringError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClusteringError::Cancelled)
    }
}

impl std::fmt::Display for ClusteringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusteringError::OrderingViolation {
                previous_mass,
                mass,
                item_id,
            } => write!(
                f,
                "Item {} has precursor mass {} after an item with mass {}; input must be sorted by mass",
                item_id, mass, previous_mass
            ),
            ClusteringError::Stream(e) => write!(f, "{}", e),
            ClusteringError::Oracle(e) => write!(f, "{}", e),
            ClusteringError::Source(e) => write!(f, "{}", e),
            ClusteringError::Io {
                source,
                context,
                path,
            } => match path {
                Some(p) => write!(f, "{} ({}): {}", context, p.display(), source),
                None => write!(f, "{}: {}", context, source),
            },
            ClusteringError::Cancelled => write!(f, "Clustering was cancelled"),
        }
    }
}

impl std::error::Error for ClusteringError {}

impl From<StreamError> for ClusteringError {
    fn from(e: StreamError) -> Self {
        ClusteringError::Stream(e)
    }
}

impl From<OracleError> for ClusteringError {
    fn from(e: OracleError) -> Self {
        ClusteringError::Oracle(e)
    }
}

impl From<SourceError> for ClusteringError {
    fn from(e: SourceError) -> Self {
        ClusteringError::Source(e)
    }
}

/// One window that did not produce an output.
#[derive(Debug)]
pub struct JobFailure {
    pub window: PathBuf,
    pub error: ClusteringError,
}

#[derive(Debug)]
pub enum SpecClusterError {
    Config(ConfigError),
    Source(SourceError),
    Stream(StreamError),
    Clustering(ClusteringError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    FailedJobs {
        stage: &'static str,
        failures: Vec<JobFailure>,
    },
    WorkerPool {
        source: rayon::ThreadPoolBuildError,
    },
    Cancelled,
}

impl std::fmt::Display for SpecClusterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecClusterError::Config(e) => write!(f, "Configuration error: {}", e),
            SpecClusterError::Source(e) => write!(f, "{}", e),
            SpecClusterError::Stream(e) => write!(f, "{}", e),
            SpecClusterError::Clustering(e) => write!(f, "{}", e),
            SpecClusterError::Io { source, path } => match path {
                Some(p) => write!(f, "IO error at {}: {}", p.display(), source),
                None => write!(f, "IO error: {}", source),
            },
            SpecClusterError::FailedJobs { stage, failures } => {
                write!(f, "{} window(s) failed during {}:", failures.len(), stage)?;
                for failure in failures {
                    write!(f, "\n  {}: {}", failure.window.display(), failure.error)?;
                }
                Ok(())
            }
            SpecClusterError::WorkerPool { source } => {
                write!(f, "Unable to start the worker pool: {}", source)
            }
            SpecClusterError::Cancelled => write!(f, "Run was cancelled"),
        }
    }
}

impl std::error::Error for SpecClusterError {}

pub type Result<T> = std::result::Result<T, SpecClusterError>;

impl From<ConfigError> for SpecClusterError {
    fn from(e: ConfigError) -> Self {
        SpecClusterError::Config(e)
    }
}

impl From<SourceError> for SpecClusterError {
    fn from(e: SourceError) -> Self {
        SpecClusterError::Source(e)
    }
}

impl From<StreamError> for SpecClusterError {
    fn from(e: StreamError) -> Self {
        SpecClusterError::Stream(e)
    }
}

impl From<ClusteringError> for SpecClusterError {
    fn from(e: ClusteringError) -> Self {
        match e {
            ClusteringError::Cancelled => SpecClusterError::Cancelled,
            other => SpecClusterError::Clustering(other),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for SpecClusterError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        SpecClusterError::WorkerPool { source: e }
    }
}

impl From<std::io::Error> for SpecClusterError {
    fn from(e: std::io::Error) -> Self {
        SpecClusterError::Io {
            source: e,
            path: None,
        }
    }
}
