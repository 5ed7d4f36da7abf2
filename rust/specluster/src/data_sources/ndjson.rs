use super::{
    SourceReaderCache,
    SpectrumSource,
};
use crate::errors::SourceError;
use crate::models::{
    ItemReference,
    Spectrum,
    sort_by_mass,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
    Seek,
    SeekFrom,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::info;

/// Only the fields needed to index a spectrum; the peaks are skipped.
#[derive(Debug, Deserialize)]
struct SpectrumHeader {
    id: String,
    precursor_mz: f64,
}

/// Spectra stored as one JSON object per line.
///
/// Scanning records the byte offset of every spectrum, so single spectra can
/// later be loaded without reading the whole file again.
#[derive(Debug, Clone)]
pub struct NdjsonSpectrumSource {
    files: Vec<PathBuf>,
    offsets: Vec<Vec<u64>>,
    references: Vec<ItemReference>,
}

impl NdjsonSpectrumSource {
    pub fn scan(paths: &[PathBuf]) -> Result<Self, SourceError> {
        let st = std::time::Instant::now();
        let mut offsets = Vec::with_capacity(paths.len());
        let mut references = Vec::new();
        for (file_id, path) in paths.iter().enumerate() {
            let file_offsets = scan_file(path, file_id as u32, &mut references)?;
            info!(
                "Indexed {} spectra in {}",
                file_offsets.len(),
                path.display()
            );
            offsets.push(file_offsets);
        }
        sort_by_mass(&mut references);
        info!(
            "Indexed {} spectra from {} file(s) in {:?}",
            references.len(),
            paths.len(),
            st.elapsed()
        );
        Ok(Self {
            files: paths.to_vec(),
            offsets,
            references,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

fn scan_file(
    path: &Path,
    file_id: u32,
    references: &mut Vec<ItemReference>,
) -> Result<Vec<u64>, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::FileReadingError {
        source: e,
        context: "Error opening spectrum file",
        path: path.to_path_buf(),
    })?;
    let mut reader = BufReader::new(file);
    let mut offsets = Vec::new();
    let mut offset: u64 = 0;
    let mut line = String::new();
    let mut line_number = 0;

    loop {
        line.clear();
        let n_read = reader
            .read_line(&mut line)
            .map_err(|e| SourceError::FileReadingError {
                source: e,
                context: "Error reading spectrum file",
                path: path.to_path_buf(),
            })?;
        if n_read == 0 {
            break;
        }
        line_number += 1;
        let line_start = offset;
        offset += n_read as u64;
        if line.trim().is_empty() {
            continue;
        }

        let header: SpectrumHeader =
            serde_json::from_str(&line).map_err(|e| SourceError::SpectrumParsingError {
                source: e,
                path: path.to_path_buf(),
                line: line_number,
            })?;
        if !header.precursor_mz.is_finite() {
            return Err(SourceError::InvalidPrecursorMass {
                path: path.to_path_buf(),
                line: line_number,
                value: header.precursor_mz,
            });
        }
        references.push(ItemReference::new(
            file_id,
            offsets.len() as u64,
            header.precursor_mz,
            header.id,
        ));
        offsets.push(line_start);
    }
    Ok(offsets)
}

impl SpectrumSource for NdjsonSpectrumSource {
    fn references(&self) -> &[ItemReference] {
        &self.references
    }

    fn load(
        &self,
        reference: &ItemReference,
        cache: &mut SourceReaderCache,
    ) -> Result<Spectrum, SourceError> {
        let unknown = || SourceError::UnknownItem {
            file_id: reference.source_file_id,
            index: reference.index_in_source,
        };
        let file_idx = reference.source_file_id as usize;
        let path = self.files.get(file_idx).ok_or_else(unknown)?;
        let offset = *self
            .offsets
            .get(file_idx)
            .and_then(|x| x.get(reference.index_in_source as usize))
            .ok_or_else(unknown)?;

        let reader = cache.reader(reference.source_file_id, path)?;
        let io_err = |e: std::io::Error| SourceError::FileReadingError {
            source: e,
            context: "Error reading spectrum",
            path: path.clone(),
        };
        reader.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        let mut line = String::new();
        reader.read_line(&mut line).map_err(io_err)?;
        serde_json::from_str(&line).map_err(|e| SourceError::SpectrumParsingError {
            source: e,
            path: path.clone(),
            line: reference.index_in_source as usize + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_scan_and_random_access() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "s0", "precursor_mz": 600.5, "peaks": [[100.0, 1.0]]}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"id": "s1", "precursor_mz": 450.25, "peaks": [[200.0, 2.0]], "identification": "PEPTIDEK"}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let source = NdjsonSpectrumSource::scan(&[file.path().to_path_buf()]).unwrap();
        assert_eq!(source.len(), 2);
        // Sorted by mass.
        assert_eq!(source.references()[0].stable_id, "s1");
        assert_eq!(source.references()[0].index_in_source, 1);

        let mut cache = SourceReaderCache::default();
        let spec = source.load(&source.references()[0], &mut cache).unwrap();
        assert_eq!(spec.id, "s1");
        assert_eq!(spec.identification.as_deref(), Some("PEPTIDEK"));
        let spec = source.load(&source.references()[1], &mut cache).unwrap();
        assert_eq!(spec.id, "s0");
        assert_eq!(spec.peaks.len(), 1);

        let missing = ItemReference::new(0, 9, 1.0, "nope");
        assert!(matches!(
            source.load(&missing, &mut cache),
            Err(SourceError::UnknownItem { .. })
        ));
    }

    #[test]
    fn test_bad_line_reports_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "s0", "precursor_mz": 600.5, "peaks": []}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        file.flush().unwrap();
        let err = NdjsonSpectrumSource::scan(&[file.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, SourceError::SpectrumParsingError { line: 2, .. }));
    }
}
