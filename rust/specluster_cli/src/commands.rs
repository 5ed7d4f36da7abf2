use specluster::pipeline::{
    list_window_files,
    scan_windows,
};
use specluster::{
    BinnedCosineOracle,
    ClusteringPipeline,
    LoggingProgressListener,
    NdjsonSpectrumSource,
    PipelineSummary,
    SpecClusterError,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{
    info,
    instrument,
};

use crate::cli::{
    ClusterArgs,
    ExportArgs,
    MergeArgs,
    WriteTemplateArgs,
};
use crate::config::{
    Config,
    InputConfig,
};
use crate::errors::CliError;
use crate::processing::{
    BarProgressListener,
    export_ndjson,
};

/// Main function for the 'cluster' subcommand.
#[instrument(skip_all)]
pub fn main_cluster(args: ClusterArgs) -> Result<(), CliError> {
    let config = Config::load(args.config.as_deref())?.with_cli_args(&args)?;
    info!("Parsed configuration: {:#?}", config);

    let output = match config.output {
        Some(ref x) => x.clone(),
        None => {
            return Err(CliError::Config {
                source: "No output directory specified".to_string(),
            });
        }
    };
    std::fs::create_dir_all(&output.directory).map_err(|e| CliError::io(e, &output.directory))?;

    let source = match config.input {
        Some(InputConfig::Ndjson { ref paths }) => {
            NdjsonSpectrumSource::scan(paths).map_err(SpecClusterError::from)?
        }
        None => {
            return Err(CliError::Config {
                source: "No input specified".to_string(),
            });
        }
    };

    let oracle = Arc::new(BinnedCosineOracle::new(config.clustering.fragment_tolerance));
    let mut pipeline = ClusteringPipeline::new(config.clustering.clone(), oracle, output.work_dir())?
        .with_resume(args.resume);
    let bars = Arc::new(BarProgressListener::new());
    if args.no_progress {
        pipeline.add_progress_listener(Arc::new(LoggingProgressListener));
    } else {
        pipeline.add_progress_listener(bars.clone());
    }

    let res = pipeline.cluster_source(&source, &output.clusters_path());
    bars.finish();
    let summary = res?;
    log_summary(&summary);
    write_summary(&summary, &output.summary_path())?;
    Ok(())
}

/// Main function for the 'merge' subcommand.
#[instrument(skip_all)]
pub fn main_merge(args: MergeArgs) -> Result<(), CliError> {
    let config = Config::load(args.config.as_deref())?;
    let paths = list_window_files(&args.windows_dir)?;
    if paths.is_empty() {
        return Err(CliError::Config {
            source: format!("No cluster files found in {}", args.windows_dir.display()),
        });
    }
    let windows = scan_windows(&paths)?;
    info!(
        "Merging {} clustered windows from {}",
        windows.len(),
        args.windows_dir.display()
    );

    let work_dir = args.output_path.with_extension("work");
    let oracle = Arc::new(BinnedCosineOracle::new(config.clustering.fragment_tolerance));
    let mut pipeline = ClusteringPipeline::new(config.clustering, oracle, work_dir)?;
    pipeline.add_progress_listener(Arc::new(LoggingProgressListener));
    let summary = pipeline.merge_clustered_windows(windows, &args.output_path)?;
    log_summary(&summary);
    Ok(())
}

/// Main function for the 'export' subcommand.
pub fn main_export(args: ExportArgs) -> Result<(), CliError> {
    let n = export_ndjson(&args.input_path, &args.output_path, args.with_peaks)?;
    println!("Wrote {} clusters to {}", n, args.output_path.display());
    Ok(())
}

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(&Config::template())?;
    if let Some(parent) = args.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CliError::io(e, parent))?;
        }
    }
    std::fs::write(&args.output_path, text).map_err(|e| CliError::io(e, &args.output_path))?;
    println!("Wrote config template to: {}", args.output_path.display());
    Ok(())
}

fn log_summary(summary: &PipelineSummary) {
    info!(
        "Clustered {} spectra from {} windows into {} clusters ({} reused windows)",
        summary.input_spectra,
        summary.windows,
        summary.output_clusters(),
        summary.reused_windows
    );
    for (stage, elapsed) in summary.stage_times.iter() {
        info!("Stage {} took {:?}", stage, elapsed);
    }
    if let Some(dup) = &summary.duplicate_merge {
        info!(
            "Duplicate merge: {} merged, {} duplicates dropped",
            dup.merged, dup.duplicates
        );
    }
}

fn write_summary(summary: &PipelineSummary, path: &Path) -> Result<(), CliError> {
    let file = std::fs::File::create(path).map_err(|e| CliError::io(e, path))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), summary)?;
    info!("Wrote run summary to {}", path.display());
    Ok(())
}
