use super::StreamRecord;
use super::writer::StreamStats;
use crate::errors::StreamError;
use crate::filters::ItemFilter;
use crate::models::{
    Cluster,
    WindowDescriptor,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{
    BufReader,
    Read,
};
use std::path::{
    Path,
    PathBuf,
};

pub struct ClusterStreamReader<R: Read> {
    deserializer: rmp_serde::Deserializer<rmp_serde::decode::ReadReader<R>>,
    path: Option<PathBuf>,
    records_read: usize,
    done: bool,
}

impl<R: Read> ClusterStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            deserializer: rmp_serde::Deserializer::new(reader),
            path: None,
            records_read: 0,
            done: false,
        }
    }

    fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    fn fail(&mut self, error: StreamError) -> Option<Result<Cluster, StreamError>> {
        self.done = true;
        match &self.path {
            Some(p) => Some(Err(error.with_path(p))),
            None => Some(Err(error)),
        }
    }
}

impl<R: Read> Iterator for ClusterStreamReader<R> {
    type Item = Result<Cluster, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match StreamRecord::deserialize(&mut self.deserializer) {
            Ok(StreamRecord::Cluster(cluster)) => {
                self.records_read += 1;
                Some(Ok(cluster))
            }
            Ok(StreamRecord::End) => {
                self.done = true;
                None
            }
            Err(rmp_serde::decode::Error::InvalidMarkerRead(ref io_err))
            | Err(rmp_serde::decode::Error::InvalidDataRead(ref io_err))
                if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                let records_read = self.records_read;
                self.fail(StreamError::MissingEndMarker {
                    path: None,
                    records_read,
                })
            }
            Err(e) => self.fail(StreamError::Decode(e)),
        }
    }
}

pub type WindowFileReader = ClusterStreamReader<zstd::Decoder<'static, BufReader<File>>>;

pub fn open_window_file(path: &Path) -> Result<WindowFileReader, StreamError> {
    let file = File::open(path).map_err(|e| StreamError::Io {
        source: e,
        context: "Error opening cluster file",
        path: Some(path.to_path_buf()),
    })?;
    let decoder = zstd::Decoder::new(file).map_err(|e| StreamError::Io {
        source: e,
        context: "Error creating zstd decoder",
        path: Some(path.to_path_buf()),
    })?;
    Ok(ClusterStreamReader::new(decoder).with_path(path))
}

pub fn read_window_file(path: &Path) -> Result<Vec<Cluster>, StreamError> {
    open_window_file(path)?.collect()
}

/// Recomputes the descriptor of an existing cluster file, counting only
/// the clusters accepted by `filter`.
pub fn scan_window_file(path: &Path, filter: &ItemFilter) -> Result<WindowDescriptor, StreamError> {
    let mut stats = StreamStats::default();
    for cluster in open_window_file(path)? {
        let cluster = cluster?;
        if filter.accepts(&cluster) {
            stats.observe(cluster.precursor_mass());
        }
    }
    Ok(stats.into_descriptor(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConsensusSettings,
        Peak,
        Spectrum,
    };
    use crate::stream::create_window_file;

    #[test]
    fn test_window_file_round_trip_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("window_0001.cls");
        let settings = ConsensusSettings::default();
        let clusters: Vec<Cluster> = [500.1, 500.4, 501.0]
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let spec = Spectrum::new(format!("s{}", i), m, vec![Peak::new(200.0, 1.0)]);
                let spec = if i == 1 {
                    spec.with_identification("PEPTIDEK")
                } else {
                    spec
                };
                Cluster::singleton(&spec, &settings)
            })
            .collect();

        let mut writer = create_window_file(&path).unwrap();
        for c in &clusters {
            writer.append(c).unwrap();
        }
        let desc = writer.finish_file(&path).unwrap();
        assert_eq!(desc.item_count, 3);
        assert_eq!(desc.min_mass, 500.1);
        assert_eq!(desc.max_mass, 501.0);

        assert_eq!(read_window_file(&path).unwrap(), clusters);

        let scanned = scan_window_file(&path, &ItemFilter::All).unwrap();
        assert_eq!(scanned, desc);
        let scanned = scan_window_file(&path, &ItemFilter::Identified).unwrap();
        assert_eq!(scanned.item_count, 1);
        assert_eq!(scanned.min_mass, 500.4);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = open_window_file(Path::new("/definitely/not/here.cls")).err().unwrap();
        match err {
            StreamError::Io { path, .. } => {
                assert_eq!(path, Some(PathBuf::from("/definitely/not/here.cls")))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
