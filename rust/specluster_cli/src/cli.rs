use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cluster spectra into a single mass sorted cluster stream.
    Cluster(ClusterArgs),
    /// Boundary merge windows that are already clustered.
    Merge(MergeArgs),
    /// Write a cluster stream as newline delimited JSON.
    Export(ExportArgs),
    /// Write a template configuration file.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ClusterArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// NDJSON spectrum files (will over-write the config file)
    #[arg(short, long, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Path to the output directory (will over-write the config file)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads (will over-write the config file)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Reuse the windows left in the work directory by an earlier run
    #[arg(long)]
    pub resume: bool,

    /// Keep the intermediate window files
    #[arg(long)]
    pub keep_intermediate: bool,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct MergeArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the clustered window files
    #[arg(short, long)]
    pub windows_dir: PathBuf,

    /// Path of the merged cluster stream
    #[arg(short, long)]
    pub output_path: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    /// Cluster stream to read
    #[arg(short, long)]
    pub input_path: PathBuf,

    /// Path of the NDJSON output
    #[arg(short, long)]
    pub output_path: PathBuf,

    /// Also write the consensus peaks of every cluster
    #[arg(long)]
    pub with_peaks: bool,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// Path of the configuration template
    #[arg(short, long)]
    pub output_path: PathBuf,
}
