use crate::cancel::CancellationToken;
use crate::errors::{
    ClusteringError,
    SpecClusterError,
};
use crate::models::WindowDescriptor;
use crate::stream::{
    CLUSTER_FILE_EXTENSION,
    WindowFileWriter,
    create_window_file,
    open_window_file,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::debug;

/// Moves the high-mass tail of every window into the next one.
///
/// All windows are streamed once, in mass order, into new window files.
/// Output `k` ends at `windows[k].max_mass - merge_width / 2`; anything above
/// goes to output `k + 1`, where it sits right below that window's own items.
/// Every cluster is written to exactly one output. Empty outputs are dropped.
///
/// `windows` must be sorted by mass and must not overlap.
pub fn rebin_with_overlap(
    windows: &[WindowDescriptor],
    merge_width: f64,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<WindowDescriptor>, SpecClusterError> {
    let cuts: Vec<f64> = windows
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i + 1 == windows.len() {
                f64::INFINITY
            } else {
                w.max_mass - merge_width / 2.0
            }
        })
        .collect();

    let mut outputs = Vec::with_capacity(windows.len());
    let mut current: Option<(PathBuf, WindowFileWriter)> = None;
    let mut out_idx = 0;
    let mut last_mass = f64::NEG_INFINITY;

    for window in windows {
        cancel.check()?;
        for cluster in open_window_file(&window.path)? {
            let cluster = cluster?;
            let mass = cluster.precursor_mass();
            if mass < last_mass {
                return Err(ClusteringError::OrderingViolation {
                    previous_mass: last_mass,
                    mass,
                    item_id: cluster.id().to_string(),
                }
                .into());
            }
            last_mass = mass;

            while out_idx + 1 < cuts.len() && mass > cuts[out_idx] {
                if let Some((path, writer)) = current.take() {
                    outputs.push(writer.finish_file(&path)?);
                }
                out_idx += 1;
            }

            if current.is_none() {
                let path = output_dir.join(format!(
                    "rebinned_{:05}.{}",
                    out_idx, CLUSTER_FILE_EXTENSION
                ));
                let writer = create_window_file(&path)?;
                current = Some((path, writer));
            }
            if let Some((_, writer)) = current.as_mut() {
                writer.append(&cluster)?;
            }
        }
    }
    if let Some((path, writer)) = current.take() {
        outputs.push(writer.finish_file(&path)?);
    }

    debug!(
        "Rebinned {} windows into {} windows with merge width {}",
        windows.len(),
        outputs.len(),
        merge_width
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Cluster,
        ConsensusSettings,
        Peak,
        Spectrum,
    };
    use crate::stream::read_window_file;

    fn write(dir: &Path, name: &str, masses: &[f64]) -> WindowDescriptor {
        let path = dir.join(name);
        let mut writer = create_window_file(&path).unwrap();
        for (i, m) in masses.iter().enumerate() {
            let spec = Spectrum::new(format!("{}-{}", name, i), *m, vec![Peak::new(100.0, 1.0)]);
            writer
                .append(&Cluster::singleton(&spec, &ConsensusSettings::default()))
                .unwrap();
        }
        writer.finish_file(&path).unwrap()
    }

    fn masses(window: &WindowDescriptor) -> Vec<f64> {
        read_window_file(&window.path)
            .unwrap()
            .iter()
            .map(|c| c.precursor_mass())
            .collect()
    }

    #[test]
    fn test_tail_moves_to_next_window() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let a = write(dir.path(), "a.cls", &[100.0, 102.0, 103.6, 103.9]);
        let b = write(dir.path(), "b.cls", &[104.2, 106.0, 108.0]);
        let c = write(dir.path(), "c.cls", &[112.0, 115.0]);

        let out = rebin_with_overlap(&[a, b, c], 1.0, &out_dir, &CancellationToken::new()).unwrap();
        assert_eq!(out.len(), 3);
        // cut after 103.9 - 0.5 = 103.4
        assert_eq!(masses(&out[0]), vec![100.0, 102.0]);
        // cut after 108.0 - 0.5 = 107.5
        assert_eq!(masses(&out[1]), vec![103.6, 103.9, 104.2, 106.0]);
        assert_eq!(masses(&out[2]), vec![108.0, 112.0, 115.0]);
        assert_eq!(out[1].min_mass, 103.6);
        let total: usize = out.iter().map(|w| w.item_count).sum();
        assert_eq!(total, 9);
    }
}
