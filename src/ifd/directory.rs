//! Directory decoding.
//!
//! A directory on disk is a count field, `count` fixed-width entries laid out
//! contiguously, and a trailing next-directory offset. Decoding reads the
//! count first, then the rest of the directory in a single positioned read,
//! the cheapest shape for sources where every read has latency.
//!
//! Decoded directories are immutable results, not live cursors. Entry values
//! are not resolved here; that is [`ValueReader`]'s job, on demand.
//!
//! [`ValueReader`]: crate::ifd::values::ValueReader

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DirectoryError;
use crate::ifd::context::OperationContext;
use crate::ifd::entry::DirectoryEntry;
use crate::region::StreamOffset;
use crate::source::ContentReader;

/// Safety limit on directories followed along one chain.
pub const MAX_DIRECTORIES: usize = 100;

/// Entry counts above this are treated as malformed rather than allocated.
pub const MAX_ENTRIES: u64 = 65_536;

/// Read exactly `len` bytes or fail with [`DirectoryError::Truncated`].
///
/// The content-reader contract truncates reads at end-of-data; inside
/// directory structures a short read means the file is malformed, so the
/// truncation is promoted to an error here.
pub(crate) async fn read_exact_at(
    reader: &dyn ContentReader,
    offset: StreamOffset,
    len: usize,
    cancel: &CancellationToken,
) -> Result<Bytes, DirectoryError> {
    let mut buf = vec![0u8; len];
    let actual = reader.read_at_async(offset, &mut buf, cancel).await?;
    if actual < len {
        return Err(DirectoryError::Truncated {
            offset: offset.get(),
            expected: len as u64,
            actual: actual as u64,
        });
    }
    Ok(Bytes::from(buf))
}

// =============================================================================
// ImageFileDirectory
// =============================================================================

/// One decoded directory: an ordered, fixed-size sequence of entries plus the
/// raw next-directory offset. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFileDirectory {
    offset: StreamOffset,
    entries: Vec<DirectoryEntry>,
    next_offset: StreamOffset,
}

impl ImageFileDirectory {
    /// Decode the directory at `offset`.
    ///
    /// Fails fast on truncated structures and implausible entry counts;
    /// partial directories are never returned.
    pub async fn read(
        reader: &dyn ContentReader,
        offset: StreamOffset,
        context: &OperationContext,
        cancel: &CancellationToken,
    ) -> Result<Self, DirectoryError> {
        if offset.is_chain_end() {
            return Err(DirectoryError::InvalidValue {
                tag: 0,
                message: "offset zero is the chain terminator, not a directory".to_string(),
            });
        }

        let count_width = context.count_field_width;
        let count_bytes = read_exact_at(reader, offset, count_width, cancel).await?;
        let entry_count = context.read_directory_count(&count_bytes);

        if entry_count > MAX_ENTRIES {
            return Err(DirectoryError::RunawayEntryCount {
                offset: offset.get(),
                count: entry_count,
            });
        }

        // Entries plus the trailing next-offset field in one read
        let entry_size = context.entry_size();
        let entries_len = entry_count as usize * entry_size;
        let body_len = entries_len + context.offset_field_width();
        let body_offset = StreamOffset::new(offset.get() + count_width as u64);
        let body = read_exact_at(reader, body_offset, body_len, cancel).await?;

        let mut entries = Vec::with_capacity(entry_count as usize);
        for index in 0..entry_count as usize {
            let at = index * entry_size;
            entries.push(DirectoryEntry::parse(&body[at..at + entry_size], context)?);
        }

        let next_offset = StreamOffset::new(context.read_offset(&body[entries_len..]));

        debug!(
            offset = offset.get(),
            entries = entries.len(),
            next = next_offset.get(),
            "decoded directory"
        );

        Ok(ImageFileDirectory {
            offset,
            entries,
            next_offset,
        })
    }

    /// Decode the whole chain starting at `first`, following next-offsets to
    /// the zero sentinel.
    pub async fn read_chain(
        reader: &dyn ContentReader,
        first: StreamOffset,
        context: &OperationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Self>, DirectoryError> {
        let mut directories = Vec::new();
        let mut offset = first;

        while !offset.is_chain_end() {
            if directories.len() >= MAX_DIRECTORIES {
                warn!(
                    limit = MAX_DIRECTORIES,
                    "directory chain truncated at safety limit"
                );
                break;
            }
            let directory = Self::read(reader, offset, context, cancel).await?;
            offset = directory.next_offset;
            directories.push(directory);
        }

        Ok(directories)
    }

    /// Offset this directory was decoded from.
    #[inline]
    pub fn offset(&self) -> StreamOffset {
        self.offset
    }

    /// Raw next-directory offset; zero terminates the chain.
    #[inline]
    pub fn next_offset(&self) -> StreamOffset {
        self.next_offset
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in on-disk order.
    #[inline]
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    /// Look up an entry by tag. Directories hold tens of entries, so a
    /// linear scan beats any index.
    pub fn find(&self, tag: u16) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }
}

impl std::ops::Index<usize> for ImageFileDirectory {
    type Output = DirectoryEntry;

    fn index(&self, index: usize) -> &DirectoryEntry {
        &self.entries[index]
    }
}

// =============================================================================
// Tests
// =============================================================================
