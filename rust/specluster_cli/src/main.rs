mod cli;
mod commands;
mod config;
mod errors;
mod processing;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::subscriber::set_global_default;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

use crate::cli::{
    Args,
    Commands,
};
use crate::commands::{
    main_cluster,
    main_export,
    main_merge,
    main_write_template,
};
use crate::errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<(), CliError> {
    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE));
    set_global_default(subscriber).map_err(|e| CliError::Logging {
        source: e.to_string(),
    })?;

    let args = Args::parse();
    match args.command {
        Some(Commands::Cluster(args)) => main_cluster(args)?,
        Some(Commands::Merge(args)) => main_merge(args)?,
        Some(Commands::Export(args)) => main_export(args)?,
        Some(Commands::WriteTemplate(args)) => main_write_template(args)?,
        None => {
            println!("No command provided");
        }
    }
    Ok(())
}
