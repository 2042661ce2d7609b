//! Content sources and the positioned read/write contract.
//!
//! A [`ContentSource`] is a backing store for one logical file: a file on
//! disk, a wrapped byte stream, an immutable or growable memory buffer, or a
//! memory-mapped region. Sources issue [`ContentReader`]s and, where capable,
//! [`ContentWriter`]s that share one truncating, positioned I/O contract in
//! both blocking and suspendable forms.

mod contract;
mod file;
mod memory;
mod mmap;
mod stream;
mod sync_adapter;

pub use contract::{ContentReader, ContentSource, ContentWriter};
pub use file::FileSource;
pub use memory::{BufferSource, MemorySource};
pub use mmap::MmapSource;
pub use stream::{ByteStream, StreamSource};
pub use sync_adapter::SyncSource;
