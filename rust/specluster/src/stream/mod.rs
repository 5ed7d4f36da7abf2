//! Binary cluster streams.
//!
//! A stream is a zstd compressed sequence of MessagePack records: one record
//! per cluster, in append order, followed by a single end record. Streams are
//! only ever read front to back. A stream that ends without the end record
//! was truncated and is reported as an error instead of being read as a
//! shorter, valid stream.

mod reader;
mod staged;
mod writer;

pub use reader::{
    ClusterStreamReader,
    WindowFileReader,
    open_window_file,
    read_window_file,
    scan_window_file,
};
pub use staged::StagedFile;
pub use writer::{
    ClusterStreamWriter,
    StreamStats,
    WindowFileWriter,
    create_window_file,
};

use crate::models::Cluster;
use serde::{
    Deserialize,
    Serialize,
};

/// File extension used for window and final cluster streams.
pub const CLUSTER_FILE_EXTENSION: &str = "cls";

#[derive(Debug, Deserialize)]
enum StreamRecord {
    Cluster(Cluster),
    End,
}

/// Borrowing twin of [`StreamRecord`], encodes to the same bytes.
#[derive(Debug, Serialize)]
#[serde(rename = "StreamRecord")]
enum StreamRecordRef<'a> {
    Cluster(&'a Cluster),
    End,
}
