//! Adapter that forces suspendable calls to complete eagerly.
//!
//! Some callers require a strictly blocking contract over an arbitrary
//! source. [`SyncSource`] wraps any capability-compatible source; readers and
//! writers it issues route every suspendable call through the blocking form
//! after the cancellation check, so suspension never actually yields.
//! Wrapping a source that is already strictly blocking returns it unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::region::StreamOffset;
use crate::source::contract::{ContentReader, ContentSource, ContentWriter};

/// Synchronous adapter over an arbitrary content source.
pub struct SyncSource {
    inner: Arc<dyn ContentSource>,
}

impl SyncSource {
    /// Wrap `source`, or return it unchanged when it is already strictly
    /// blocking (idempotent wrapping).
    pub fn wrap(source: Arc<dyn ContentSource>) -> Arc<dyn ContentSource> {
        if source.is_strictly_blocking() {
            source
        } else {
            Arc::new(SyncSource { inner: source })
        }
    }
}

#[async_trait]
impl ContentSource for SyncSource {
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError> {
        Ok(Box::new(SyncReader {
            inner: self.inner.open_reader()?,
        }))
    }

    fn open_writer(&self) -> Result<Box<dyn ContentWriter>, SourceError> {
        Ok(Box::new(SyncWriter {
            inner: self.inner.open_writer()?,
        }))
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn release(&self) {
        self.inner.release();
    }

    async fn release_async(&self) {
        // Eager by construction
        self.inner.release();
    }

    fn is_strictly_blocking(&self) -> bool {
        true
    }
}

struct SyncReader {
    inner: Box<dyn ContentReader>,
}

#[async_trait]
impl ContentReader for SyncReader {
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.inner.read_at(offset, buf)
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
        // Never defer to the wrapped source's async path
        self.inner.read_at(offset, buf)
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn release(&self) {
        self.inner.release();
    }
}

struct SyncWriter {
    inner: Box<dyn ContentWriter>,
}

#[async_trait]
impl ContentWriter for SyncWriter {
    fn write_at(&self, offset: StreamOffset, buf: &[u8]) -> Result<(), SourceError> {
        self.inner.write_at(offset, buf)
    }

    fn flush(&self) -> Result<(), SourceError> {
        self.inner.flush()
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
        self.inner.write_at(offset, buf)
    }

    async fn flush_async(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.inner.flush()
    }

    fn release(&self) {
        self.inner.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
