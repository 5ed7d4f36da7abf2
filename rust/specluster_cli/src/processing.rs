use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use serde::Serialize;
use specluster::stream::open_window_file;
use specluster::{
    Cluster,
    ClusteringStage,
    Peak,
    ProgressEvent,
    ProgressListener,
};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::errors::CliError;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Draws one progress bar per pipeline stage.
pub struct BarProgressListener {
    style: ProgressStyle,
    current: Mutex<Option<(ClusteringStage, ProgressBar)>>,
}

impl BarProgressListener {
    pub fn new() -> Self {
        let style =
            ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar());
        Self {
            style,
            current: Mutex::new(None),
        }
    }

    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
        }
    }
}

impl Default for BarProgressListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for BarProgressListener {
    fn on_progress(&self, event: &ProgressEvent) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let same_stage = matches!(current.as_ref(), Some((stage, _)) if *stage == event.stage);
        if !same_stage {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            let bar = ProgressBar::new(event.total as u64).with_style(self.style.clone());
            *current = Some((event.stage, bar));
        }
        if let Some((_, bar)) = current.as_ref() {
            bar.set_length(event.total as u64);
            bar.set_position(event.completed as u64);
            bar.set_message(format!("{}: {}", event.stage, event.message));
        }
    }
}

#[derive(Debug, Serialize)]
struct ClusterRecord<'a> {
    id: &'a str,
    precursor_mass: f64,
    member_count: usize,
    identified_count: usize,
    members: &'a BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consensus: Option<&'a [Peak]>,
}

impl<'a> ClusterRecord<'a> {
    fn new(cluster: &'a Cluster, with_peaks: bool) -> Self {
        Self {
            id: cluster.id(),
            precursor_mass: cluster.precursor_mass(),
            member_count: cluster.member_count(),
            identified_count: cluster.identified_count(),
            members: cluster.member_ids(),
            consensus: with_peaks.then(|| cluster.consensus()),
        }
    }
}

/// Writes every cluster of a binary stream as one JSON object per line.
/// Returns the number of clusters written.
pub fn export_ndjson(input: &Path, output: &Path, with_peaks: bool) -> Result<usize, CliError> {
    let st = std::time::Instant::now();
    let reader = open_window_file(input)?;
    let file = File::create(output).map_err(|e| CliError::io(e, output))?;
    let mut writer = BufWriter::new(file);

    let mut n = 0;
    for cluster in reader {
        let cluster = cluster?;
        serde_json::to_writer(&mut writer, &ClusterRecord::new(&cluster, with_peaks))?;
        writer
            .write_all(b"\n")
            .map_err(|e| CliError::io(e, output))?;
        n += 1;
    }
    writer.flush().map_err(|e| CliError::io(e, output))?;
    info!(
        "Exported {} clusters to {} in {:?}",
        n,
        output.display(),
        st.elapsed()
    );
    Ok(n)
}
