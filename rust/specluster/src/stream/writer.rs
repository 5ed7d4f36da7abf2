use super::StreamRecordRef;
use crate::errors::StreamError;
use crate::models::{
    Cluster,
    WindowDescriptor,
};
use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

/// Count and mass bounds of everything appended to a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    pub count: usize,
    pub min_mass: f64,
    pub max_mass: f64,
}

impl StreamStats {
    pub fn observe(&mut self, mass: f64) {
        if self.count == 0 {
            self.min_mass = mass;
            self.max_mass = mass;
        } else {
            self.min_mass = self.min_mass.min(mass);
            self.max_mass = self.max_mass.max(mass);
        }
        self.count += 1;
    }

    pub fn into_descriptor(self, path: PathBuf) -> WindowDescriptor {
        WindowDescriptor {
            path,
            min_mass: self.min_mass,
            max_mass: self.max_mass,
            item_count: self.count,
        }
    }
}

pub struct ClusterStreamWriter<W: Write> {
    sink: W,
    stats: StreamStats,
}

impl<W: Write> ClusterStreamWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            stats: StreamStats::default(),
        }
    }

    pub fn append(&mut self, cluster: &Cluster) -> Result<(), StreamError> {
        rmp_serde::encode::write(&mut self.sink, &StreamRecordRef::Cluster(cluster))?;
        self.stats.observe(cluster.precursor_mass());
        Ok(())
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Writes the end record and hands back the sink.
    pub fn finish(mut self) -> Result<(W, StreamStats), StreamError> {
        rmp_serde::encode::write(&mut self.sink, &StreamRecordRef::End)?;
        self.sink.flush().map_err(|e| StreamError::Io {
            source: e,
            context: "Error flushing cluster stream",
            path: None,
        })?;
        Ok((self.sink, self.stats))
    }

    #[cfg(test)]
    pub(crate) fn into_inner_unfinished(self) -> W {
        self.sink
    }
}

pub type WindowFileWriter = ClusterStreamWriter<zstd::stream::write::Encoder<'static, BufWriter<File>>>;

pub fn create_window_file(path: &Path) -> Result<WindowFileWriter, StreamError> {
    let file = File::create(path).map_err(|e| StreamError::Io {
        source: e,
        context: "Error creating cluster file",
        path: Some(path.to_path_buf()),
    })?;
    let encoder =
        zstd::stream::write::Encoder::new(BufWriter::new(file), 3).map_err(|e| StreamError::Io {
            source: e,
            context: "Error creating zstd encoder",
            path: Some(path.to_path_buf()),
        })?;
    Ok(ClusterStreamWriter::new(encoder))
}

impl ClusterStreamWriter<zstd::stream::write::Encoder<'static, BufWriter<File>>> {
    /// Terminates the stream, closes the compression frame and describes the
    /// file that was written.
    pub fn finish_file(self, path: &Path) -> Result<WindowDescriptor, StreamError> {
        let (encoder, stats) = self.finish().map_err(|e| e.with_path(path))?;
        let io_err = |e: std::io::Error| StreamError::Io {
            source: e,
            context: "Error finishing cluster file",
            path: Some(path.to_path_buf()),
        };
        let mut buffered = encoder.finish().map_err(io_err)?;
        buffered.flush().map_err(io_err)?;
        Ok(stats.into_descriptor(path.to_path_buf()))
    }
}
