use serde::{
    Deserialize,
    Serialize,
};
use specluster::ClusteringConfig;
use std::path::{
    Path,
    PathBuf,
};

use crate::cli::ClusterArgs;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum InputConfig {
    #[serde(rename = "ndjson")]
    Ndjson { paths: Vec<PathBuf> },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl OutputConfig {
    pub fn clusters_path(&self) -> PathBuf {
        self.directory.join("clusters.cls")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.directory.join("summary.json")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.directory.join("work")
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        let conf = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
        let config: Config = serde_json::from_reader(std::io::BufReader::new(conf))?;
        Ok(config)
    }

    /// Reads the config file if one is given, otherwise starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Command line flags take precedence over the config file.
    pub fn with_cli_args(mut self, args: &ClusterArgs) -> Result<Self, CliError> {
        if !args.input.is_empty() {
            self.input = Some(InputConfig::Ndjson {
                paths: args.input.clone(),
            });
        }
        if let Some(dir) = &args.output_dir {
            self.output = Some(OutputConfig {
                directory: dir.clone(),
            });
        }
        if let Some(workers) = args.workers {
            self.clustering.workers = workers;
        }
        if args.keep_intermediate {
            self.clustering.keep_intermediate = true;
        }

        if self.input.is_none() {
            return Err(CliError::Config {
                source: "No input provided, please provide one in either the config file or with the --input flag".to_string(),
            });
        }
        if self.output.is_none() {
            return Err(CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
        self.clustering
            .validate()
            .map_err(|e| CliError::Config {
                source: e.to_string(),
            })?;
        Ok(self)
    }

    pub fn template() -> Self {
        Self {
            input: Some(InputConfig::Ndjson {
                paths: vec![PathBuf::from("spectra.ndjson")],
            }),
            clustering: ClusteringConfig::default(),
            output: Some(OutputConfig {
                directory: PathBuf::from("specluster_output"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ClusterArgs {
        ClusterArgs {
            config: None,
            input: Vec::new(),
            output_dir: None,
            workers: None,
            resume: false,
            keep_intermediate: false,
            no_progress: true,
        }
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "input": {"type": "ndjson", "paths": ["a.ndjson", "b.ndjson"]},
            "clustering": {"thresholds": [0.9, 0.8], "merge_width": 1.5},
            "output": {"directory": "out"}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.clustering.thresholds, vec![0.9, 0.8]);
        assert_eq!(config.clustering.merge_width, 1.5);
        assert_eq!(config.clustering.precursor_tolerance, 1.0);
        assert_eq!(
            config.input,
            Some(InputConfig::Ndjson {
                paths: vec![PathBuf::from("a.ndjson"), PathBuf::from("b.ndjson")]
            })
        );
        let config = config.with_cli_args(&args()).unwrap();
        assert_eq!(
            config.output.unwrap().clusters_path(),
            PathBuf::from("out").join("clusters.cls")
        );
    }

    #[test]
    fn test_flags_override_the_file() {
        let mut a = args();
        a.input = vec![PathBuf::from("c.ndjson")];
        a.output_dir = Some(PathBuf::from("elsewhere"));
        a.workers = Some(3);
        let config = Config::template().with_cli_args(&a).unwrap();
        assert_eq!(
            config.input,
            Some(InputConfig::Ndjson {
                paths: vec![PathBuf::from("c.ndjson")]
            })
        );
        assert_eq!(config.output.unwrap().directory, PathBuf::from("elsewhere"));
        assert_eq!(config.clustering.workers, 3);
    }

    #[test]
    fn test_missing_input_is_a_config_error() {
        let res = Config::default().with_cli_args(&args());
        assert!(matches!(res, Err(CliError::Config { .. })));
    }

    #[test]
    fn test_invalid_clustering_settings_are_rejected() {
        let mut a = args();
        a.workers = Some(0);
        let res = Config::template().with_cli_args(&a);
        assert!(matches!(res, Err(CliError::Config { .. })));
    }

    #[test]
    fn test_template_round_trips() {
        let text = serde_json::to_string_pretty(&Config::template()).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back.clustering, ClusteringConfig::default());
        assert!(back.with_cli_args(&args()).is_ok());
    }
}
