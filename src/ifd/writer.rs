//! Directory encoding.
//!
//! A [`DirectoryWriter`] accumulates entries as fields are appended. Values
//! that fit the entry's value/offset field are held inline; larger values are
//! written immediately to an auxiliary value area at the writer's cursor and
//! the entry records their offset instead. Flushing aligns the cursor,
//! stable-sorts the entries ascending by tag (the on-disk ordering rule),
//! serializes the directory, and links it into the chain by patching the
//! predecessor's pointer field in place. The container header's
//! first-directory pointer is just another [`DirectoryLink`], so starting a
//! chain and extending one are the same operation.
//!
//! Directories are thus built strictly by appending; the only backward write
//! is the fixed-width pointer patch into the immediately preceding link.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DirectoryError;
use crate::ifd::context::{ByteOrder, OperationContext};
use crate::ifd::entry::FieldType;
use crate::ifd::header::{
    ContainerHeader, BYTE_ORDER_BIG_ENDIAN, BYTE_ORDER_LITTLE_ENDIAN, VERSION_BIG_TIFF,
    VERSION_CLASSIC,
};
use crate::region::StreamOffset;
use crate::source::ContentWriter;

// =============================================================================
// DirectoryLink
// =============================================================================

/// A patchable pointer field: the location of a next-directory offset (or the
/// header's first-directory offset) that a later flush may aim at itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryLink {
    position: u64,
}

impl DirectoryLink {
    pub(crate) fn new(position: u64) -> Self {
        DirectoryLink { position }
    }

    /// Byte position of the pointer field.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Result of flushing a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushedDirectory {
    /// Where the directory was written
    pub offset: StreamOffset,

    /// The directory's own next-offset field, for chaining a successor
    pub link: DirectoryLink,

    /// First byte past the directory; a successor writer starts here
    pub end: StreamOffset,
}

// =============================================================================
// Header writing
// =============================================================================

/// Write a container header with a zeroed first-directory pointer.
///
/// Returns the header's pointer field as a [`DirectoryLink`]; pass it as the
/// `previous` of the first flushed directory to register that directory as
/// the file's first.
pub async fn write_container_header(
    writer: &dyn ContentWriter,
    context: &OperationContext,
    cancel: &CancellationToken,
) -> Result<DirectoryLink, DirectoryError> {
    let order = context.byte_order;
    let magic = match order {
        ByteOrder::LittleEndian => BYTE_ORDER_LITTLE_ENDIAN,
        ByteOrder::BigEndian => BYTE_ORDER_BIG_ENDIAN,
    };

    let mut header = Vec::with_capacity(ContainerHeader::size(context));
    // The magic is a fixed byte pattern independent of the declared order
    header.extend_from_slice(&magic.to_le_bytes());
    if context.is_big_tiff() {
        header.extend_from_slice(&order.encode_u16(VERSION_BIG_TIFF));
        header.extend_from_slice(&order.encode_u16(8));
        header.extend_from_slice(&order.encode_u16(0));
        header.extend_from_slice(&order.encode_u64(0));
    } else {
        header.extend_from_slice(&order.encode_u16(VERSION_CLASSIC));
        header.extend_from_slice(&order.encode_u32(0));
    }

    writer
        .write_at_async(StreamOffset::ZERO, &header, cancel)
        .await?;
    Ok(DirectoryLink::new(ContainerHeader::pointer_position(
        context,
    )))
}

/// Start-of-data position for a writer building on a fresh header.
pub const fn first_cursor(context: &OperationContext) -> StreamOffset {
    StreamOffset::new(ContainerHeader::size(context) as u64)
}

// =============================================================================
// DirectoryWriter
// =============================================================================

struct PendingEntry {
    tag: u16,
    field_type: u16,
    count: u64,
    value_field: [u8; 8],
}

/// Accumulates entries for one directory and serializes them on flush.
///
/// The writer owns an append cursor into the output sink: out-of-line values
/// advance it as fields are appended, and the directory itself lands at the
/// aligned cursor on flush. Consumed exactly once by [`flush`].
///
/// Duplicate tags are not rejected; they are sorted stably and serialized
/// as-is, which a reader will accept as two entries for the same tag. Keeping
/// tags unique is the caller's responsibility.
///
/// [`flush`]: DirectoryWriter::flush
pub struct DirectoryWriter<'a> {
    writer: &'a dyn ContentWriter,
    context: &'a OperationContext,
    cursor: u64,
    entries: Vec<PendingEntry>,
}

impl<'a> DirectoryWriter<'a> {
    /// Writer whose value area and directory start at `cursor`.
    pub fn new(
        writer: &'a dyn ContentWriter,
        context: &'a OperationContext,
        cursor: StreamOffset,
    ) -> Self {
        DirectoryWriter {
            writer,
            context,
            cursor: cursor.get(),
            entries: Vec::new(),
        }
    }

    /// Number of entries appended so far.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Current append cursor.
    pub fn cursor(&self) -> StreamOffset {
        StreamOffset::new(self.cursor)
    }

    /// Append a field from pre-encoded value bytes.
    ///
    /// `data` must already honor the context's byte order and hold exactly
    /// `count` elements of `field_type`. Values too large to inline are
    /// written to the value area immediately.
    pub async fn append_raw(
        &mut self,
        tag: u16,
        field_type: FieldType,
        count: u64,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), DirectoryError> {
        let expected = (field_type.size_in_bytes() as u64).saturating_mul(count);
        if data.len() as u64 != expected {
            return Err(DirectoryError::InvalidValue {
                tag,
                message: format!(
                    "{count} values of {field_type:?} take {expected} bytes, got {}",
                    data.len()
                ),
            });
        }
        if !self.context.is_big_tiff() && count > u64::from(u32::MAX) {
            return Err(DirectoryError::FieldOverflow(count));
        }

        let mut value_field = [0u8; 8];
        if data.len() <= self.context.value_field_width {
            value_field[..data.len()].copy_from_slice(data);
        } else {
            // Spill to the value area at a word-aligned cursor. Encode the
            // offset first so an unrepresentable position fails before any
            // bytes land.
            let offset = align_up(self.cursor, 2);
            let encoded = self.encode_offset(offset)?;
            self.writer
                .write_at_async(StreamOffset::new(offset), data, cancel)
                .await?;
            self.cursor = offset + data.len() as u64;
            value_field[..self.context.value_field_width].copy_from_slice(&encoded);
        }

        self.entries.push(PendingEntry {
            tag,
            field_type: field_type.as_u16(),
            count,
            value_field,
        });
        Ok(())
    }

    /// Append SHORT values.
    pub async fn append_shorts(
        &mut self,
        tag: u16,
        values: &[u16],
        cancel: &CancellationToken,
    ) -> Result<(), DirectoryError> {
        let order = self.context.byte_order;
        let mut data = Vec::with_capacity(values.len() * 2);
        for &value in values {
            data.extend_from_slice(&order.encode_u16(value));
        }
        self.append_raw(tag, FieldType::Short, values.len() as u64, &data, cancel)
            .await
    }

    /// Append LONG values.
    pub async fn append_longs(
        &mut self,
        tag: u16,
        values: &[u32],
        cancel: &CancellationToken,
    ) -> Result<(), DirectoryError> {
        let order = self.context.byte_order;
        let mut data = Vec::with_capacity(values.len() * 4);
        for &value in values {
            data.extend_from_slice(&order.encode_u32(value));
        }
        self.append_raw(tag, FieldType::Long, values.len() as u64, &data, cancel)
            .await
    }

    /// Append LONG8 values.
    pub async fn append_long8s(
        &mut self,
        tag: u16,
        values: &[u64],
        cancel: &CancellationToken,
    ) -> Result<(), DirectoryError> {
        let order = self.context.byte_order;
        let mut data = Vec::with_capacity(values.len() * 8);
        for &value in values {
            data.extend_from_slice(&order.encode_u64(value));
        }
        self.append_raw(tag, FieldType::Long8, values.len() as u64, &data, cancel)
            .await
    }

    /// Append an ASCII value with its NUL terminator.
    pub async fn append_ascii(
        &mut self,
        tag: u16,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DirectoryError> {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        self.append_raw(tag, FieldType::Ascii, data.len() as u64, &data, cancel)
            .await
    }

    /// Append opaque UNDEFINED bytes.
    pub async fn append_undefined(
        &mut self,
        tag: u16,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), DirectoryError> {
        self.append_raw(tag, FieldType::Undefined, data.len() as u64, data, cancel)
            .await
    }

    /// Serialize the directory and link it into the chain.
    ///
    /// With `previous`, that link's pointer field is patched in place to this
    /// directory's offset; pass the link returned by
    /// [`write_container_header`] to register the file's first directory.
    /// With `None` the directory is written unlinked and the caller keeps the
    /// returned offset.
    pub async fn flush(
        mut self,
        previous: Option<&DirectoryLink>,
        cancel: &CancellationToken,
    ) -> Result<FlushedDirectory, DirectoryError> {
        let context = self.context;

        if !context.is_big_tiff() && self.entries.len() > usize::from(u16::MAX) {
            return Err(DirectoryError::FieldOverflow(self.entries.len() as u64));
        }

        let directory_offset = align_up(self.cursor, context.alignment());

        // On-disk ordering rule: ascending tag, stable for duplicates
        self.entries.sort_by_key(|entry| entry.tag);

        let order = context.byte_order;
        let entry_size = context.entry_size();
        let body_len =
            context.count_field_width + self.entries.len() * entry_size + context.offset_field_width();
        let mut body = Vec::with_capacity(body_len);

        if context.is_big_tiff() {
            body.extend_from_slice(&order.encode_u64(self.entries.len() as u64));
        } else {
            body.extend_from_slice(&order.encode_u16(self.entries.len() as u16));
        }

        for entry in &self.entries {
            body.extend_from_slice(&order.encode_u16(entry.tag));
            body.extend_from_slice(&order.encode_u16(entry.field_type));
            if context.is_big_tiff() {
                body.extend_from_slice(&order.encode_u64(entry.count));
            } else {
                body.extend_from_slice(&order.encode_u32(entry.count as u32));
            }
            body.extend_from_slice(&entry.value_field[..context.value_field_width]);
        }

        // Zero next-offset placeholder: this directory ends the chain until a
        // successor patches it
        body.resize(body_len, 0);

        self.writer
            .write_at_async(StreamOffset::new(directory_offset), &body, cancel)
            .await?;

        let next_field_position = directory_offset
            + context.count_field_width as u64
            + (self.entries.len() * entry_size) as u64;

        if let Some(link) = previous {
            let encoded = self.encode_offset(directory_offset)?;
            self.writer
                .write_at_async(StreamOffset::new(link.position()), &encoded, cancel)
                .await?;
        }

        debug!(
            offset = directory_offset,
            entries = self.entries.len(),
            linked = previous.is_some(),
            "flushed directory"
        );

        Ok(FlushedDirectory {
            offset: StreamOffset::new(directory_offset),
            link: DirectoryLink::new(next_field_position),
            end: StreamOffset::new(directory_offset + body_len as u64),
        })
    }

    /// Encode an offset at the context's offset width, checking the classic
    /// 32-bit ceiling.
    fn encode_offset(&self, offset: u64) -> Result<Vec<u8>, DirectoryError> {
        let order = self.context.byte_order;
        if self.context.is_big_tiff() {
            Ok(order.encode_u64(offset).to_vec())
        } else {
            let narrow =
                u32::try_from(offset).map_err(|_| DirectoryError::FieldOverflow(offset))?;
            Ok(order.encode_u32(narrow).to_vec())
        }
    }
}

#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

// =============================================================================
// Tests
// =============================================================================
