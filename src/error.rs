use thiserror::Error;

/// Errors raised by content sources and the readers/writers they issue
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Operation invoked on a released source, reader, or writer
    #[error("source disposed: operation invoked after release")]
    Disposed,

    /// Operation aborted by a cancellation request before any I/O was issued
    #[error("operation cancelled")]
    Cancelled,

    /// The source does not implement the requested capability
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A stream source already has a live reader
    #[error("stream source already has an open reader")]
    ReaderInUse,

    /// A requested sub-range does not fit inside the backing data
    #[error("region out of bounds: offset {offset} + length {length} exceeds size {size}")]
    InvalidRegion { offset: u64, length: u64, size: u64 },

    /// Failure reported by the underlying handle or mapping
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

/// Errors raised while decoding or encoding Image File Directories
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// I/O error from the underlying content source
    #[error("I/O error: {0}")]
    Source(#[from] SourceError),

    /// Invalid byte-order magic (not II or MM)
    #[error("invalid magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid version number (not 42 or 43)
    #[error("invalid version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// BigTIFF offset byte size field was not 8
    #[error("invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidOffsetSize(u16),

    /// The source ended in the middle of a directory structure
    #[error("truncated read at offset {offset}: wanted {expected} bytes, got {actual}")]
    Truncated {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// Entry count larger than any plausible directory
    #[error("implausible entry count {count} in directory at offset {offset}")]
    RunawayEntryCount { offset: u64, count: u64 },

    /// Field type enumerant not defined by TIFF 6.0 or BigTIFF
    #[error("unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Tag value inconsistent with its declared type or count
    #[error("invalid value for tag {tag}: {message}")]
    InvalidValue { tag: u16, message: String },

    /// An offset or count does not fit in its classic-layout field
    #[error("value {0} does not fit in a classic layout field")]
    FieldOverflow(u64),
}
