pub mod ndjson;
pub mod window_writer;

pub use ndjson::NdjsonSpectrumSource;
pub use window_writer::WindowWriter;

use crate::errors::SourceError;
use crate::models::{
    ItemReference,
    Spectrum,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Provides item references for partitioning and loads the spectra behind
/// them on demand.
pub trait SpectrumSource: Sync {
    /// All items of the source, sorted by precursor mass.
    fn references(&self) -> &[ItemReference];

    fn load(
        &self,
        reference: &ItemReference,
        cache: &mut SourceReaderCache,
    ) -> Result<Spectrum, SourceError>;
}

/// Open file handles owned by one worker. Never shared between threads.
#[derive(Debug, Default)]
pub struct SourceReaderCache {
    readers: HashMap<u32, BufReader<File>>,
}

impl SourceReaderCache {
    pub fn reader(&mut self, file_id: u32, path: &Path) -> Result<&mut BufReader<File>, SourceError> {
        match self.readers.entry(file_id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let file = File::open(path).map_err(|e| SourceError::FileReadingError {
                    source: e,
                    context: "Error opening spectrum file",
                    path: path.to_path_buf(),
                })?;
                Ok(v.insert(BufReader::new(file)))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}
