//! The polymorphic read/write contract every backing store implements.
//!
//! This abstraction lets the directory codec and everything above it work
//! against files, wrapped streams, memory buffers, and memory maps without
//! knowing which one is behind the calls. Each operation exists in a blocking
//! and a suspendable form; the suspendable form defaults to running the
//! blocking form eagerly, which is exactly right for backing stores with no
//! asynchronous primitive of their own (memory, memory maps, adapted
//! sources). Stores with a real async path override it.
//!
//! # Read contract
//!
//! A read never goes past the logical end of the source. Requesting a range
//! that extends beyond end-of-data truncates the returned count; requesting
//! an offset at or past end-of-data returns zero bytes. Neither case is an
//! error.
//!
//! # Lifecycle
//!
//! Every source, reader, and writer exposes an idempotent `release`: the
//! first call releases, later calls are no-ops. After release, all further
//! operations fail with [`SourceError::Disposed`]. Readers hold a liveness
//! handle on the source that issued them, so releasing a source also fails
//! any reader still in flight rather than letting it observe stale bytes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::region::StreamOffset;

// =============================================================================
// ContentReader
// =============================================================================

/// Positioned reads over one backing store.
///
/// Instances are single-owner: callers must serialize calls on one instance,
/// but distinct readers from the same source may run on distinct threads
/// where the source allows it. Within one instance, reads observe the file
/// as of each call's issuance.
#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Blocking positioned read into `buf`, returning the number of bytes
    /// read per the truncating contract.
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Suspendable positioned read. Observably equivalent to [`read_at`]:
    /// the default checks the cancellation token and then completes the
    /// blocking form within the same scheduling turn.
    ///
    /// [`read_at`]: ContentReader::read_at
    async fn read_at_async(
        &self,
        offset: StreamOffset,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<usize, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.read_at(offset, buf)
    }

    /// Logical end of the source's data in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the reader. Idempotent; after the first call every operation
    /// on this instance fails with [`SourceError::Disposed`].
    fn release(&self);
}

// =============================================================================
// ContentWriter
// =============================================================================

/// Positioned writes over one writer-capable backing store.
#[async_trait]
pub trait ContentWriter: Send + Sync {
    /// Blocking positioned write of all of `buf` at `offset`.
    fn write_at(&self, offset: StreamOffset, buf: &[u8]) -> Result<(), SourceError>;

    /// Drain pending writes to the backing store.
    fn flush(&self) -> Result<(), SourceError>;

    /// Suspendable positioned write. Defaults to the blocking form after a
    /// cancellation check, like the read side.
    async fn write_at_async(
        &self,
        offset: StreamOffset,
        buf: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.write_at(offset, buf)
    }

    /// Suspendable flush.
    async fn flush_async(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        self.flush()
    }

    /// Release the writer. Idempotent, like the reader form.
    fn release(&self);

    /// Let pending writes drain, then release. The default flushes
    /// synchronously; stores with nothing buffered inherit it as-is.
    fn release_flushing(&self) -> Result<(), SourceError> {
        self.flush()?;
        self.release();
        Ok(())
    }
}

// =============================================================================
// ContentSource
// =============================================================================

/// A backing store that issues readers and, where capable, writers.
///
/// The source exclusively owns its underlying handle, buffer, or mapping.
/// Readers and writers it issues hold only a borrowed liveness handle and
/// never outlive an explicit release of the source: once the source is
/// released they fail rather than return stale data. Releasing one reader
/// never disturbs its siblings.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open a reader over the source's data.
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError>;

    /// Open a writer. Reader-only sources keep the default.
    fn open_writer(&self) -> Result<Box<dyn ContentWriter>, SourceError> {
        Err(SourceError::Unsupported("source is not writable"))
    }

    /// Logical length of the source's data in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the source and its underlying resource. Idempotent.
    fn release(&self);

    /// Release after letting pending work drain. Sources with nothing to
    /// drain inherit the default.
    async fn release_async(&self) {
        self.release();
    }

    /// Whether every suspendable call on this source's readers and writers
    /// already completes eagerly. The synchronous adapter uses this to make
    /// wrapping idempotent.
    fn is_strictly_blocking(&self) -> bool {
        false
    }
}

// =============================================================================
// SourceGate
// =============================================================================

/// Shared liveness flag between a source and the readers/writers it issued.
///
/// The source flips the flag on release; every instance holding the gate
/// starts failing with [`SourceError::Disposed`] from that point on.
#[derive(Debug, Default)]
pub(crate) struct SourceGate {
    released: AtomicBool,
}

impl SourceGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(SourceGate::default())
    }

    /// Flip to released. Returns `true` only for the call that performed the
    /// transition, making double-release a no-op.
    pub(crate) fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Fail with `Disposed` once released.
    pub(crate) fn check(&self) -> Result<(), SourceError> {
        if self.is_released() {
            Err(SourceError::Disposed)
        } else {
            Ok(())
        }
    }
}

/// Copy out of an in-memory slice per the truncating read contract.
///
/// Shared by the memory and buffer-backed readers: reads at or past
/// `data.len()` return 0, everything else copies the lesser of the remaining
/// data and the requested length.
pub(crate) fn read_from_slice(data: &[u8], offset: StreamOffset, buf: &mut [u8]) -> usize {
    let position = offset.get();
    if position >= data.len() as u64 {
        return 0;
    }
    let start = position as usize;
    let available = data.len() - start;
    let count = buf.len().min(available);
    buf[..count].copy_from_slice(&data[start..start + count]);
    count
}

// =============================================================================
// Tests
// =============================================================================
