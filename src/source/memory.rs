//! In-memory content sources.
//!
//! [`MemorySource`] wraps an immutable byte region; every read is synchronous
//! and bounds-checked against the region length. [`BufferSource`] is its
//! growable, writer-capable counterpart used to build container images in
//! memory (positioned writes extend the buffer on demand, zero-filling any
//! gap).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SourceError;
use crate::region::{StreamOffset, StreamRegion};
use crate::source::contract::{
    read_from_slice, ContentReader, ContentSource, ContentWriter, SourceGate,
};

// =============================================================================
// MemorySource
// =============================================================================

/// Content source over an immutable in-memory byte region.
///
/// Cloning the underlying [`Bytes`] is cheap, so each reader carries its own
/// handle on the data and release is nothing more than dropping references.
pub struct MemorySource {
    data: Bytes,
    gate: Arc<SourceGate>,
}

impl MemorySource {
    /// Wrap an entire buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        MemorySource {
            data: data.into(),
            gate: SourceGate::new(),
        }
    }

    /// Wrap a sub-range of a buffer.
    ///
    /// Fails with [`SourceError::InvalidRegion`] if the region does not fit
    /// inside `data`.
    pub fn with_region(data: Bytes, region: StreamRegion) -> Result<Self, SourceError> {
        if region.end() > data.len() as u64 {
            return Err(SourceError::InvalidRegion {
                offset: region.offset().get(),
                length: region.length(),
                size: data.len() as u64,
            });
        }
        let start = region.offset().get() as usize;
        let end = region.end() as usize;
        Ok(MemorySource {
            data: data.slice(start..end),
            gate: SourceGate::new(),
        })
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError> {
        self.gate.check()?;
        Ok(Box::new(MemoryReader {
            data: self.data.clone(),
            source: Arc::clone(&self.gate),
            gate: SourceGate::new(),
        }))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn release(&self) {
        self.gate.release();
    }
}

/// Reader over an immutable memory region.
struct MemoryReader {
    data: Bytes,
    source: Arc<SourceGate>,
    gate: Arc<SourceGate>,
}

#[async_trait]
impl ContentReader for MemoryReader {
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.source.check()?;
        self.gate.check()?;
        Ok(read_from_slice(&self.data, offset, buf))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn release(&self) {
        self.gate.release();
    }
}

// =============================================================================
// BufferSource
// =============================================================================

/// Growable in-memory source supporting positioned writes.
///
/// Readers and writers share the same buffer, so a reader opened before a
/// write observes the written bytes on its next call. This is the natural
/// sink for serializing directory chains in memory.
pub struct BufferSource {
    buf: Arc<Mutex<Vec<u8>>>,
    gate: Arc<SourceGate>,
}

impl BufferSource {
    /// Create an empty buffer source.
    pub fn new() -> Self {
        BufferSource {
            buf: Arc::new(Mutex::new(Vec::new())),
            gate: SourceGate::new(),
        }
    }

    /// Create a buffer source seeded with existing content.
    pub fn from_vec(data: Vec<u8>) -> Self {
        BufferSource {
            buf: Arc::new(Mutex::new(data)),
            gate: SourceGate::new(),
        }
    }

    /// Copy of the current buffer contents.
    pub fn snapshot(&self) -> Bytes {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        Bytes::copy_from_slice(&buf)
    }
}

impl Default for BufferSource {
    fn default() -> Self {
        BufferSource::new()
    }
}

#[async_trait]
impl ContentSource for BufferSource {
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError> {
        self.gate.check()?;
        Ok(Box::new(BufferReader {
            buf: Arc::clone(&self.buf),
            source: Arc::clone(&self.gate),
            gate: SourceGate::new(),
        }))
    }

    fn open_writer(&self) -> Result<Box<dyn ContentWriter>, SourceError> {
        self.gate.check()?;
        Ok(Box::new(BufferWriter {
            buf: Arc::clone(&self.buf),
            source: Arc::clone(&self.gate),
            gate: SourceGate::new(),
        }))
    }

    fn len(&self) -> u64 {
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.len() as u64
    }

    fn release(&self) {
        self.gate.release();
    }
}

struct BufferReader {
    buf: Arc<Mutex<Vec<u8>>>,
    source: Arc<SourceGate>,
    gate: Arc<SourceGate>,
}

#[async_trait]
impl ContentReader for BufferReader {
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.source.check()?;
        self.gate.check()?;
        let data = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        Ok(read_from_slice(&data, offset, buf))
    }

    fn len(&self) -> u64 {
        let data = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        data.len() as u64
    }

    fn release(&self) {
        self.gate.release();
    }
}

struct BufferWriter {
    buf: Arc<Mutex<Vec<u8>>>,
    source: Arc<SourceGate>,
    gate: Arc<SourceGate>,
}

#[async_trait]
impl ContentWriter for BufferWriter {
    fn write_at(&self, offset: StreamOffset, buf: &[u8]) -> Result<(), SourceError> {
        self.source.check()?;
        self.gate.check()?;

        let position = offset.get();
        let end = position
            .checked_add(buf.len() as u64)
            .ok_or(SourceError::InvalidRegion {
                offset: position,
                length: buf.len() as u64,
                size: u64::MAX,
            })?;

        let mut data = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        if end > data.len() as u64 {
            data.resize(end as usize, 0);
        }
        let start = position as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> Result<(), SourceError> {
        self.source.check()?;
        self.gate.check()?;
        Ok(())
    }

    fn release(&self) {
        self.gate.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
