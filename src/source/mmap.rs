//! Memory-mapped content source.
//!
//! The mapping is established once and shared by every reader; each read
//! bounds-checks, borrows a view of `[offset, offset + len)` for the minimum
//! necessary duration, and copies out. Distinct readers may serve distinct
//! threads concurrently.
//!
//! A single-slot reader cache keeps at most one recycled reader's parts for
//! reuse: a dropped reader offers its parts back and simply replaces whatever
//! the slot held. The cache is a reuse hint, not a correctness requirement;
//! losing the slot under contention only costs re-creating the parts.

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::SourceError;
use crate::region::StreamOffset;
use crate::source::contract::{ContentReader, ContentSource, SourceGate};

struct MmapShared {
    map: Mmap,
}

/// The recyclable portion of a reader. The liveness gate is deliberately not
/// part of this: every handout gets a fresh gate, so a stale handle to a
/// released reader can never resurrect through the cache.
struct ReaderParts {
    shared: Arc<MmapShared>,
}

type ReaderSlot = Mutex<Option<ReaderParts>>;

/// Content source backed by a memory-mapped file.
pub struct MmapSource {
    shared: Arc<MmapShared>,
    gate: Arc<SourceGate>,
    slot: Arc<ReaderSlot>,
}

impl MmapSource {
    /// Open `path` and map it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref())?;
        let source = Self::from_file(&file)?;
        debug!(path = %path.as_ref().display(), len = source.len(), "mapped file source");
        Ok(source)
    }

    /// Map an already-open file. The caller keeps the handle; the mapping
    /// stays valid independently of it.
    pub fn from_file(file: &File) -> Result<Self, SourceError> {
        // mmap is unsafe because external truncation would invalidate the view
        let map = unsafe { MmapOptions::new().map(file)? };
        Ok(MmapSource {
            shared: Arc::new(MmapShared { map }),
            gate: SourceGate::new(),
            slot: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl ContentSource for MmapSource {
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError> {
        self.gate.check()?;

        // Borrow from the single-slot cache, or build fresh parts
        let parts = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        }
        .unwrap_or_else(|| ReaderParts {
            shared: Arc::clone(&self.shared),
        });

        Ok(Box::new(MmapReader {
            parts: Some(parts),
            pool: Arc::downgrade(&self.slot),
            source: Arc::clone(&self.gate),
            gate: SourceGate::new(),
        }))
    }

    fn len(&self) -> u64 {
        self.shared.map.len() as u64
    }

    fn release(&self) {
        if self.gate.release() {
            // Drop the cached parts along with the source
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            *slot = None;
            debug!("released mmap source");
        }
    }
}

struct MmapReader {
    parts: Option<ReaderParts>,
    pool: Weak<ReaderSlot>,
    source: Arc<SourceGate>,
    gate: Arc<SourceGate>,
}

impl MmapReader {
    fn shared(&self) -> Result<&MmapShared, SourceError> {
        // None only transiently during drop
        self.parts
            .as_ref()
            .map(|p| p.shared.as_ref())
            .ok_or(SourceError::Disposed)
    }
}

#[async_trait]
impl ContentReader for MmapReader {
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.source.check()?;
        self.gate.check()?;
        let shared = self.shared()?;

        let position = offset.get();
        let len = shared.map.len() as u64;
        if position >= len {
            return Ok(0);
        }
        let start = position as usize;
        let count = buf.len().min((len - position) as usize);

        // View borrow held only for the copy
        let view = &shared.map[start..start + count];
        buf[..count].copy_from_slice(view);
        Ok(count)
    }

    fn len(&self) -> u64 {
        self.parts
            .as_ref()
            .map(|p| p.shared.map.len() as u64)
            .unwrap_or(0)
    }

    fn release(&self) {
        self.gate.release();
    }
}

impl Drop for MmapReader {
    fn drop(&mut self) {
        // Offer the parts back to the source's slot: replace, never queue.
        // If the source is gone (or released and cleared the slot after us),
        // the parts just drop here.
        if let (Some(parts), Some(pool)) = (self.parts.take(), self.pool.upgrade()) {
            let mut slot = pool.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(parts);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
