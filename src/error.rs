use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("data directory {} does not exist", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("key not found")]
    KeyNotFound,

    #[error("key must not be empty")]
    EmptyKey,

    #[error("key of {size} bytes exceeds the {limit} byte limit")]
    LargeKey { size: usize, limit: usize },

    #[error("value of {size} bytes exceeds the {limit} byte limit")]
    LargeValue { size: usize, limit: usize },

    #[error("unable to encode record: {source}")]
    EncodingFailed { source: std::io::Error },

    #[error("unable to decode record: {reason}")]
    DecodingFailed { reason: &'static str },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("read failed on {filename}: {source}")]
    ReadFailed {
        source: std::io::Error,
        filename: String,
    },

    #[error("write failed on {filename}: {source}")]
    WriteFailed {
        source: std::io::Error,
        filename: String,
    },

    #[error("truncated record at the end of {filename}")]
    TruncatedRecord { filename: String },

    #[error("{filename} is not a segment file")]
    InvalidSegmentName { filename: String },

    #[error("I/O error on {filename}: {source}")]
    Io {
        source: std::io::Error,
        filename: String,
    },

    #[error("store poisoned by an earlier write failure")]
    Poisoned,

    #[error("store is closed")]
    Closed,
}
