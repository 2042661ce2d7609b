//! File-backed content source.
//!
//! Opens a fresh handle lazily for each reader or writer request; there is no
//! pooling, and release simply drops the handles. The suspendable forms are
//! genuine: positioned I/O is offloaded to the runtime's blocking pool rather
//! than stalling the async scheduler on disk latency.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SourceError;
use crate::region::StreamOffset;
use crate::source::contract::{ContentReader, ContentSource, ContentWriter, SourceGate};

// =============================================================================
// Positioned I/O helpers
// =============================================================================

#[cfg(unix)]
fn read_at_raw(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at_raw(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn write_at_raw(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn write_at_raw(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

/// Read until `buf` is full or end-of-file, returning the count actually read.
fn read_full(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match read_at_raw(file, offset + total as u64, &mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Write all of `buf`, retrying short writes.
fn write_full(file: &File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match write_at_raw(file, offset + written as u64, &buf[written..]) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "positioned write made no progress",
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// =============================================================================
// FileSource
// =============================================================================

/// Content source backed by a file on disk.
pub struct FileSource {
    path: PathBuf,
    len: u64,
    writable: bool,
    gate: Arc<SourceGate>,
}

impl FileSource {
    /// Open an existing file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        debug!(path = %path.display(), len, "opened file source");
        Ok(FileSource {
            path,
            len,
            writable: false,
            gate: SourceGate::new(),
        })
    }

    /// Create (or truncate) a file and open it read-write.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        // Create eagerly so a bad path fails here, not at the first write
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), "created file source");
        Ok(FileSource {
            path,
            len: 0,
            writable: true,
            gate: SourceGate::new(),
        })
    }

    /// Open an existing file read-write.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        Ok(FileSource {
            path,
            len,
            writable: true,
            gate: SourceGate::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContentSource for FileSource {
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError> {
        self.gate.check()?;
        // Lazy handle per reader; length is observed at open so the reader
        // keeps a consistent view even if the file grows afterwards.
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        Ok(Box::new(FileReader {
            file: Arc::new(file),
            len,
            source: Arc::clone(&self.gate),
            gate: SourceGate::new(),
        }))
    }

    fn open_writer(&self) -> Result<Box<dyn ContentWriter>, SourceError> {
        self.gate.check()?;
        if !self.writable {
            return Err(SourceError::Unsupported("file source opened read-only"));
        }
        let file = OpenOptions::new().write(true).open(&self.path)?;
        Ok(Box::new(FileWriter {
            file: Arc::new(file),
            source: Arc::clone(&self.gate),
            gate: SourceGate::new(),
        }))
    }

    fn len(&self) -> u64 {
        // Re-stat so the length tracks writes made through this source
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(self.len)
    }

    fn release(&self) {
        if self.gate.release() {
            debug!(path = %self.path.display(), "released file source");
        }
    }
}

// =============================================================================
// FileReader / FileWriter
// =============================================================================

struct FileReader {
    file: Arc<File>,
    len: u64,
    source: Arc<SourceGate>,
    gate: Arc<SourceGate>,
}

impl FileReader {
    fn clamp(&self, offset: StreamOffset, requested: usize) -> usize {
        let available = self.len.saturating_sub(offset.get());
        requested.min(available as usize)
    }
}

#[async_trait]
impl ContentReader for FileReader {
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.source.check()?;
        self.gate.check()?;
        let want = self.clamp(offset, buf.len());
        if want == 0 {
            return Ok(0);
        }
        Ok(read_full(&self.file, offset.get(), &mut buf[..want])?)
    }

    async fn read_at_async(
        &self,
        offset: StreamOffset,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.source.check()?;
        self.gate.check()?;

        let want = self.clamp(offset, buf.len());
        if want == 0 {
            return Ok(0);
        }

        let file = Arc::clone(&self.file);
        let position = offset.get();
        let chunk = tokio::task::spawn_blocking(move || {
            let mut tmp = vec![0u8; want];
            let n = read_full(&file, position, &mut tmp)?;
            tmp.truncate(n);
            Ok::<Vec<u8>, std::io::Error>(tmp)
        })
        .await
        .map_err(|e| SourceError::Io(e.to_string()))??;

        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn release(&self) {
        self.gate.release();
    }
}

struct FileWriter {
    file: Arc<File>,
    source: Arc<SourceGate>,
    gate: Arc<SourceGate>,
}

#[async_trait]
impl ContentWriter for FileWriter {
    fn write_at(&self, offset: StreamOffset, buf: &[u8]) -> Result<(), SourceError> {
        self.source.check()?;
        self.gate.check()?;
        write_full(&self.file, offset.get(), buf)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SourceError> {
        self.source.check()?;
        self.gate.check()?;
        self.file.sync_data()?;
        Ok(())
    }

    async fn write_at_async(
        &self,
        offset: StreamOffset,
        buf: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.source.check()?;
        self.gate.check()?;

        let file = Arc::clone(&self.file);
        let position = offset.get();
        let data = buf.to_vec();
        tokio::task::spawn_blocking(move || write_full(&file, position, &data))
            .await
            .map_err(|e| SourceError::Io(e.to_string()))??;
        Ok(())
    }

    fn release(&self) {
        self.gate.release();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_file_read_and_truncation() {
        let file = temp_file_with(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 8);

        let reader = source.open_reader().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(StreamOffset::new(2), &mut buf).unwrap(), 4);
        assert_eq!(buf, [3, 4, 5, 6]);

        // Truncating contract at the tail and past the end
        assert_eq!(reader.read_at(StreamOffset::new(6), &mut buf).unwrap(), 2);
        assert_eq!(reader.read_at(StreamOffset::new(8), &mut buf).unwrap(), 0);
        assert_eq!(reader.read_at(StreamOffset::new(100), &mut buf).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_async_read_matches_blocking() {
        let file = temp_file_with(&[10, 20, 30, 40, 50]);
        let source = FileSource::open(file.path()).unwrap();
        let reader = source.open_reader().unwrap();
        let cancel = CancellationToken::new();

        let mut sync_buf = [0u8; 3];
        let mut async_buf = [0u8; 3];
        let n_sync = reader.read_at(StreamOffset::new(1), &mut sync_buf).unwrap();
        let n_async = reader
            .read_at_async(StreamOffset::new(1), &mut async_buf, &cancel)
            .await
            .unwrap();
        assert_eq!(n_sync, n_async);
        assert_eq!(sync_buf, async_buf);
    }

    #[tokio::test]
    async fn test_file_async_read_cancellation() {
        let file = temp_file_with(&[1, 2, 3]);
        let source = FileSource::open(file.path()).unwrap();
        let reader = source.open_reader().unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut buf = [0u8; 2];
        let result = reader
            .read_at_async(StreamOffset::ZERO, &mut buf, &cancel)
            .await;
        assert!(matches!(result, Err(SourceError::Cancelled)));
    }

    #[test]
    fn test_file_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");

        let source = FileSource::create(&path).unwrap();
        let writer = source.open_writer().unwrap();
        writer.write_at(StreamOffset::new(4), &[0xAA, 0xBB]).unwrap();
        writer.write_at(StreamOffset::ZERO, &[1, 2]).unwrap();
        writer.release_flushing().unwrap();

        let reader = source.open_reader().unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(reader.read_at(StreamOffset::ZERO, &mut buf).unwrap(), 6);
        assert_eq!(buf, [1, 2, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_read_only_source_rejects_writer() {
        let file = temp_file_with(&[1]);
        let source = FileSource::open(file.path()).unwrap();
        assert!(matches!(
            source.open_writer().err(),
            Some(SourceError::Unsupported(_))
        ));
    }

    #[test]
    fn test_file_source_release_fails_readers() {
        let file = temp_file_with(&[1, 2, 3]);
        let source = FileSource::open(file.path()).unwrap();
        let reader = source.open_reader().unwrap();

        source.release();
        source.release();

        let mut buf = [0u8; 1];
        assert!(matches!(
            reader.read_at(StreamOffset::ZERO, &mut buf),
            Err(SourceError::Disposed)
        ));
        assert!(source.open_reader().is_err());
    }

    #[test]
    fn test_distinct_readers_are_independent() {
        let file = temp_file_with(&[1, 2, 3, 4]);
        let source = FileSource::open(file.path()).unwrap();
        let first = source.open_reader().unwrap();
        let second = source.open_reader().unwrap();

        first.release();
        let mut buf = [0u8; 1];
        assert_eq!(second.read_at(StreamOffset::new(3), &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
    }
}
