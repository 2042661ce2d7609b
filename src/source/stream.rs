//! Content source wrapping a pre-existing byte stream.
//!
//! The stream source owns exactly one seekable stream and permits exactly one
//! live reader at a time; positioned reads are implemented as seek-then-read
//! under an interior lock, so there is no internal concurrency and callers
//! must serialize access. The ownership flag decides whether releasing the
//! source also closes (drops) the wrapped stream or leaves it recoverable via
//! [`StreamSource::into_inner`].

use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::SourceError;
use crate::region::StreamOffset;
use crate::source::contract::{ContentReader, ContentSource, SourceGate};

/// Capability bound for streams a [`StreamSource`] can wrap.
pub trait ByteStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteStream for T {}

struct StreamState {
    stream: Mutex<Option<Box<dyn ByteStream>>>,
    gate: Arc<SourceGate>,
    reader_live: AtomicBool,
}

/// Content source over one wrapped byte stream.
pub struct StreamSource {
    state: Arc<StreamState>,
    len: u64,
    owns_stream: bool,
}

impl StreamSource {
    /// Wrap a stream. The stream is seeked to its end once to learn the
    /// length, then rewound.
    ///
    /// With `owns_stream`, releasing the source drops the stream; otherwise
    /// the stream stays recoverable through [`into_inner`].
    ///
    /// [`into_inner`]: StreamSource::into_inner
    pub fn new(mut stream: Box<dyn ByteStream>, owns_stream: bool) -> Result<Self, SourceError> {
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(StreamSource {
            state: Arc::new(StreamState {
                stream: Mutex::new(Some(stream)),
                gate: SourceGate::new(),
                reader_live: AtomicBool::new(false),
            }),
            len,
            owns_stream,
        })
    }

    /// Take the wrapped stream back out, releasing the source.
    ///
    /// Fails with [`SourceError::Disposed`] if the source was already
    /// released with ownership (the stream is gone).
    pub fn into_inner(self) -> Result<Box<dyn ByteStream>, SourceError> {
        self.state.gate.release();
        let mut slot = self.state.stream.lock().unwrap_or_else(|e| e.into_inner());
        slot.take().ok_or(SourceError::Disposed)
    }
}

#[async_trait]
impl ContentSource for StreamSource {
    fn open_reader(&self) -> Result<Box<dyn ContentReader>, SourceError> {
        self.state.gate.check()?;
        // Exactly one reader at a time; the slot frees up when it releases
        if self.state.reader_live.swap(true, Ordering::AcqRel) {
            return Err(SourceError::ReaderInUse);
        }
        Ok(Box::new(StreamReader {
            state: Arc::clone(&self.state),
            len: self.len,
            gate: SourceGate::new(),
        }))
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn release(&self) {
        if self.state.gate.release() {
            if self.owns_stream {
                let mut slot = self.state.stream.lock().unwrap_or_else(|e| e.into_inner());
                *slot = None;
            }
            debug!(owns_stream = self.owns_stream, "released stream source");
        }
    }
}

struct StreamReader {
    state: Arc<StreamState>,
    len: u64,
    gate: Arc<SourceGate>,
}

#[async_trait]
impl ContentReader for StreamReader {
    fn read_at(&self, offset: StreamOffset, buf: &mut [u8]) -> Result<usize, SourceError> {
        self.state.gate.check()?;
        self.gate.check()?;

        let available = self.len.saturating_sub(offset.get());
        let want = buf.len().min(available as usize);
        if want == 0 {
            return Ok(0);
        }

        let mut slot = self.state.stream.lock().unwrap_or_else(|e| e.into_inner());
        let stream = slot.as_mut().ok_or(SourceError::Disposed)?;
        stream.seek(SeekFrom::Start(offset.get()))?;

        let mut total = 0;
        while total < want {
            match stream.read(&mut buf[total..want]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn release(&self) {
        if self.gate.release() {
            self.state.reader_live.store(false, Ordering::Release);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
