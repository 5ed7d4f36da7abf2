use specluster::SpecClusterError;
use specluster::errors::StreamError;

#[derive(Debug)]
pub enum CliError {
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Io {
        source: String,
        path: Option<String>,
    },
    Clustering {
        source: SpecClusterError,
    },
    Logging {
        source: String,
    },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing config: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::Clustering { source } => write!(f, "Error clustering spectra: {}", source),
            CliError::Logging { source } => write!(f, "Error setting up logging: {}", source),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    pub fn io(e: std::io::Error, path: &std::path::Path) -> Self {
        CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        }
    }
}

impl From<SpecClusterError> for CliError {
    fn from(e: SpecClusterError) -> Self {
        CliError::Clustering { source: e }
    }
}

impl From<StreamError> for CliError {
    fn from(e: StreamError) -> Self {
        CliError::Clustering {
            source: SpecClusterError::Stream(e),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::ParseError { msg: e.to_string() }
    }
}
