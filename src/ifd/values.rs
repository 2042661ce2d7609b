//! Tag value containers and typed value resolution.
//!
//! Tags overwhelmingly carry zero or one value, so [`ValueCollection`] is
//! shaped to make those cases allocation-free: a single value is stored
//! inline and only genuine arrays get a backing vector. [`ValueBuilder`] is
//! the mutable accumulation form used during decode; freezing it produces
//! the immutable collection.
//!
//! [`ValueReader`] resolves an entry's values lazily: only when asked does it
//! decide inline-vs-indirect and, for indirect values, issue the second
//! positioned read at the recorded offset.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::DirectoryError;
use crate::ifd::context::OperationContext;
use crate::ifd::directory::read_exact_at;
use crate::ifd::entry::{DirectoryEntry, FieldType};
use crate::source::ContentReader;

// =============================================================================
// ValueCollection
// =============================================================================

/// An ordered sequence of 0, 1, or N values of one tag.
///
/// `Empty` and `Single` carry no backing array; `Many` always does, with
/// exactly `len()` elements. Equality is value-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueCollection<T> {
    Empty,
    Single(T),
    Many(Vec<T>),
}

impl<T> ValueCollection<T> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            ValueCollection::Empty => 0,
            ValueCollection::Single(_) => 1,
            ValueCollection::Many(values) => values.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, ValueCollection::Empty)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    /// View the values as a slice, whatever the storage form.
    pub fn as_slice(&self) -> &[T] {
        match self {
            ValueCollection::Empty => &[],
            ValueCollection::Single(value) => std::slice::from_ref(value),
            ValueCollection::Many(values) => values,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T> Default for ValueCollection<T> {
    fn default() -> Self {
        ValueCollection::Empty
    }
}

impl<T> From<T> for ValueCollection<T> {
    fn from(value: T) -> Self {
        ValueCollection::Single(value)
    }
}

impl<T> From<Vec<T>> for ValueCollection<T> {
    /// Normalizing: short vectors collapse into the allocation-free forms.
    fn from(mut values: Vec<T>) -> Self {
        match values.len() {
            0 => ValueCollection::Empty,
            1 => match values.pop() {
                Some(value) => ValueCollection::Single(value),
                None => ValueCollection::Empty,
            },
            _ => ValueCollection::Many(values),
        }
    }
}

impl<T> FromIterator<T> for ValueCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut builder = ValueBuilder::new();
        for value in iter {
            builder.push(value);
        }
        builder.freeze()
    }
}

impl<T> std::ops::Index<usize> for ValueCollection<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<'a, T> IntoIterator for &'a ValueCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// ValueBuilder
// =============================================================================

/// Mutable accumulation form of a [`ValueCollection`].
///
/// The first value of a count-at-most-one builder lands in a dedicated slot;
/// a backing vector is pre-sized only when the expected count is above one.
/// Either `first` or `backing` is populated, never both.
#[derive(Debug)]
pub struct ValueBuilder<T> {
    first: Option<T>,
    backing: Vec<T>,
}

impl<T> ValueBuilder<T> {
    /// Builder with no expected count.
    pub fn new() -> Self {
        ValueBuilder {
            first: None,
            backing: Vec::new(),
        }
    }

    /// Builder pre-sized for `expected` values. No allocation happens unless
    /// `expected > 1`.
    pub fn with_count(expected: usize) -> Self {
        ValueBuilder {
            first: None,
            backing: if expected > 1 {
                Vec::with_capacity(expected)
            } else {
                Vec::new()
            },
        }
    }

    /// Append the next value.
    pub fn push(&mut self, value: T) {
        if self.backing.is_empty() {
            match self.first.take() {
                // Second value arriving: spill the slot into the vector
                Some(existing) => {
                    self.backing.push(existing);
                    self.backing.push(value);
                }
                None if self.backing.capacity() > 0 => self.backing.push(value),
                None => self.first = Some(value),
            }
        } else {
            self.backing.push(value);
        }
    }

    pub fn len(&self) -> usize {
        if self.first.is_some() {
            1
        } else {
            self.backing.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.backing.is_empty()
    }

    /// Freeze into the immutable form.
    pub fn freeze(self) -> ValueCollection<T> {
        match (self.first, self.backing) {
            (Some(value), _) => ValueCollection::Single(value),
            (None, values) => ValueCollection::from(values),
        }
    }
}

impl<T> Default for ValueBuilder<T> {
    fn default() -> Self {
        ValueBuilder::new()
    }
}

// =============================================================================
// ValueReader
// =============================================================================

/// Resolves directory entry values through a content reader.
///
/// Combines the reader with the session context so every decode honors the
/// file's byte order and layout widths.
pub struct ValueReader<'a> {
    reader: &'a dyn ContentReader,
    context: &'a OperationContext,
}

impl<'a> ValueReader<'a> {
    pub fn new(reader: &'a dyn ContentReader, context: &'a OperationContext) -> Self {
        ValueReader { reader, context }
    }

    /// Raw value bytes for an entry.
    ///
    /// Inline values come straight from the entry; indirect values cost one
    /// positioned read at the recorded offset.
    pub async fn read_raw(
        &self,
        entry: &DirectoryEntry,
        cancel: &CancellationToken,
    ) -> Result<Bytes, DirectoryError> {
        let size = entry
            .value_byte_size()
            .ok_or(DirectoryError::UnknownFieldType(entry.field_type_raw))?;

        match entry.inline_bytes() {
            Some(bytes) => Ok(Bytes::copy_from_slice(bytes)),
            None => {
                let offset = entry.value_offset(self.context);
                read_exact_at(self.reader, offset, size as usize, cancel).await
            }
        }
    }

    /// Decode SHORT values.
    pub async fn read_u16s(
        &self,
        entry: &DirectoryEntry,
        cancel: &CancellationToken,
    ) -> Result<ValueCollection<u16>, DirectoryError> {
        let field_type = self.known_type(entry)?;
        if field_type != FieldType::Short {
            return Err(type_mismatch(entry, "Short", field_type));
        }

        let bytes = self.read_raw(entry, cancel).await?;
        let mut builder = ValueBuilder::with_count(entry.count as usize);
        for chunk in 0..entry.count as usize {
            builder.push(self.context.byte_order.read_u16(&bytes[chunk * 2..]));
        }
        Ok(builder.freeze())
    }

    /// Decode SHORT or LONG values, widening to u32.
    pub async fn read_u32s(
        &self,
        entry: &DirectoryEntry,
        cancel: &CancellationToken,
    ) -> Result<ValueCollection<u32>, DirectoryError> {
        let field_type = self.known_type(entry)?;
        let bytes = self.read_raw(entry, cancel).await?;
        let order = self.context.byte_order;

        let mut builder = ValueBuilder::with_count(entry.count as usize);
        for index in 0..entry.count as usize {
            let value = match field_type {
                FieldType::Short => u32::from(order.read_u16(&bytes[index * 2..])),
                FieldType::Long | FieldType::Ifd => order.read_u32(&bytes[index * 4..]),
                other => return Err(type_mismatch(entry, "Short or Long", other)),
            };
            builder.push(value);
        }
        Ok(builder.freeze())
    }

    /// Decode SHORT, LONG, or LONG8 values, widening to u64.
    ///
    /// This is the workhorse for offset and byte-count arrays.
    pub async fn read_u64s(
        &self,
        entry: &DirectoryEntry,
        cancel: &CancellationToken,
    ) -> Result<ValueCollection<u64>, DirectoryError> {
        let field_type = self.known_type(entry)?;
        let bytes = self.read_raw(entry, cancel).await?;
        let order = self.context.byte_order;

        let mut builder = ValueBuilder::with_count(entry.count as usize);
        for index in 0..entry.count as usize {
            let value = match field_type {
                FieldType::Short => u64::from(order.read_u16(&bytes[index * 2..])),
                FieldType::Long | FieldType::Ifd => u64::from(order.read_u32(&bytes[index * 4..])),
                FieldType::Long8 | FieldType::Ifd8 => order.read_u64(&bytes[index * 8..]),
                other => return Err(type_mismatch(entry, "Short, Long, or Long8", other)),
            };
            builder.push(value);
        }
        Ok(builder.freeze())
    }

    /// Decode an ASCII value, stripping the NUL terminator.
    pub async fn read_ascii(
        &self,
        entry: &DirectoryEntry,
        cancel: &CancellationToken,
    ) -> Result<String, DirectoryError> {
        let field_type = self.known_type(entry)?;
        if field_type != FieldType::Ascii {
            return Err(type_mismatch(entry, "Ascii", field_type));
        }

        let bytes = self.read_raw(entry, cancel).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn known_type(&self, entry: &DirectoryEntry) -> Result<FieldType, DirectoryError> {
        entry
            .field_type
            .ok_or(DirectoryError::UnknownFieldType(entry.field_type_raw))
    }
}

fn type_mismatch(entry: &DirectoryEntry, expected: &str, got: FieldType) -> DirectoryError {
    DirectoryError::InvalidValue {
        tag: entry.tag,
        message: format!("expected {expected}, got {got:?}"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::context::ByteOrder;
    use crate::region::StreamOffset;
    use crate::source::{ContentSource, MemorySource};

    // -------------------------------------------------------------------------
    // ValueCollection invariants
    // -------------------------------------------------------------------------

    #[test]
    fn test_collection_empty() {
        let collection: ValueCollection<u32> = ValueCollection::Empty;
        assert_eq!(collection.len(), 0);
        assert!(collection.is_empty());
        assert_eq!(collection.first(), None);
        assert_eq!(collection.as_slice(), &[] as &[u32]);
    }

    #[test]
    fn test_collection_single_has_no_backing_array() {
        let collection = ValueCollection::from(42u16);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection[0], 42);
        assert!(matches!(collection, ValueCollection::Single(42)));
    }

    #[test]
    fn test_collection_many_exact_length() {
        let collection = ValueCollection::<u32>::from(vec![1u32, 2, 3]);
        assert_eq!(collection.len(), 3);
        assert_eq!(collection.as_slice(), &[1, 2, 3]);
        match &collection {
            ValueCollection::Many(values) => assert_eq!(values.len(), 3),
            other => panic!("expected Many, got {other:?}"),
        }
    }

    #[test]
    fn test_collection_from_vec_normalizes() {
        assert!(matches!(
            ValueCollection::<u8>::from(Vec::new()),
            ValueCollection::Empty
        ));
        assert!(matches!(
            ValueCollection::from(vec![7u8]),
            ValueCollection::Single(7)
        ));
    }

    #[test]
    fn test_collection_value_equality() {
        let a = ValueCollection::<u32>::from(vec![1u32, 2]);
        let b = ValueCollection::<u32>::from(vec![1u32, 2]);
        assert_eq!(a, b);
        assert_ne!(a, ValueCollection::<u32>::from(vec![1u32, 3]));
        assert_ne!(
            ValueCollection::<u32>::Empty,
            ValueCollection::Single(0u32)
        );
    }

    #[test]
    fn test_collection_from_iterator() {
        let collection: ValueCollection<u32> = (0..4).collect();
        assert_eq!(collection.as_slice(), &[0, 1, 2, 3]);

        let single: ValueCollection<u32> = std::iter::once(9).collect();
        assert!(matches!(single, ValueCollection::Single(9)));
    }

    #[test]
    #[should_panic]
    fn test_collection_index_out_of_range_panics() {
        let collection = ValueCollection::from(5u8);
        let _ = collection[1];
    }

    // -------------------------------------------------------------------------
    // ValueBuilder
    // -------------------------------------------------------------------------

    #[test]
    fn test_builder_single_value_stays_in_slot() {
        let mut builder = ValueBuilder::with_count(1);
        builder.push(42u16);
        assert_eq!(builder.len(), 1);
        let frozen = builder.freeze();
        assert!(matches!(frozen, ValueCollection::Single(42)));
    }

    #[test]
    fn test_builder_empty_freezes_empty() {
        let builder: ValueBuilder<u32> = ValueBuilder::with_count(0);
        assert!(builder.is_empty());
        assert!(matches!(builder.freeze(), ValueCollection::Empty));
    }

    #[test]
    fn test_builder_spills_slot_on_second_value() {
        // No expected count: first value lands in the slot, the second
        // forces the spill
        let mut builder = ValueBuilder::new();
        builder.push(1u8);
        builder.push(2u8);
        builder.push(3u8);
        assert_eq!(builder.len(), 3);
        assert_eq!(builder.freeze().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_builder_presized_fills_backing() {
        let mut builder = ValueBuilder::with_count(3);
        for value in [10u64, 20, 30] {
            builder.push(value);
        }
        match builder.freeze() {
            ValueCollection::Many(values) => assert_eq!(values, vec![10, 20, 30]),
            other => panic!("expected Many, got {other:?}"),
        }
    }

    // -------------------------------------------------------------------------
    // ValueReader
    // -------------------------------------------------------------------------

    fn classic_le() -> OperationContext {
        OperationContext::classic(ByteOrder::LittleEndian)
    }

    fn inline_entry(tag: u16, field_type: FieldType, count: u64, value: [u8; 8]) -> DirectoryEntry {
        DirectoryEntry {
            tag,
            field_type_raw: field_type.as_u16(),
            field_type: Some(field_type),
            count,
            value_field: value,
            is_inline: true,
        }
    }

    fn offset_entry(tag: u16, field_type: FieldType, count: u64, offset: u32) -> DirectoryEntry {
        let mut value_field = [0u8; 8];
        value_field[..4].copy_from_slice(&offset.to_le_bytes());
        DirectoryEntry {
            tag,
            field_type_raw: field_type.as_u16(),
            field_type: Some(field_type),
            count,
            value_field,
            is_inline: false,
        }
    }

    #[tokio::test]
    async fn test_read_raw_inline() {
        let source = MemorySource::new(vec![0u8; 64]);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        let entry = inline_entry(256, FieldType::Short, 1, [0x2A, 0, 0, 0, 0, 0, 0, 0]);
        let bytes = values.read_raw(&entry, &cancel).await.unwrap();
        assert_eq!(&bytes[..], &[0x2A, 0x00]);
    }

    #[tokio::test]
    async fn test_read_raw_indirect() {
        let mut data = vec![0u8; 64];
        data[40..44].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let source = MemorySource::new(data);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        // Marked not-inline, so the value field is an offset into the file
        let entry = offset_entry(324, FieldType::Long, 1, 40);
        let bytes = values.read_raw(&entry, &cancel).await.unwrap();
        assert_eq!(&bytes[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[tokio::test]
    async fn test_read_u16_single_no_allocation_form() {
        let source = MemorySource::new(vec![0u8; 16]);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        let entry = inline_entry(256, FieldType::Short, 1, [0x2A, 0, 0, 0, 0, 0, 0, 0]);
        let collection = values.read_u16s(&entry, &cancel).await.unwrap();
        assert_eq!(collection.len(), 1);
        assert!(matches!(collection, ValueCollection::Single(42)));
    }

    #[tokio::test]
    async fn test_read_u64s_widens_from_long_array() {
        // 5 LONG values at offset 20
        let mut data = vec![0u8; 64];
        for (index, value) in [1000u32, 2000, 3000, 4000, 5000].iter().enumerate() {
            let at = 20 + index * 4;
            data[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        let source = MemorySource::new(data);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        let entry = offset_entry(324, FieldType::Long, 5, 20);
        let collection = values.read_u64s(&entry, &cancel).await.unwrap();
        assert_eq!(collection.as_slice(), &[1000, 2000, 3000, 4000, 5000]);
    }

    #[tokio::test]
    async fn test_read_ascii_strips_terminator() {
        let mut data = vec![0u8; 64];
        let text = b"tiled scan\0";
        data[10..10 + text.len()].copy_from_slice(text);
        let source = MemorySource::new(data);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        let entry = offset_entry(270, FieldType::Ascii, text.len() as u64, 10);
        let decoded = values.read_ascii(&entry, &cancel).await.unwrap();
        assert_eq!(decoded, "tiled scan");
    }

    #[tokio::test]
    async fn test_unknown_type_blocks_typed_decode() {
        let source = MemorySource::new(vec![0u8; 16]);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        let entry = DirectoryEntry {
            tag: 256,
            field_type_raw: 99,
            field_type: None,
            count: 1,
            value_field: [0; 8],
            is_inline: false,
        };
        assert!(matches!(
            values.read_raw(&entry, &cancel).await,
            Err(DirectoryError::UnknownFieldType(99))
        ));
        assert!(matches!(
            values.read_u64s(&entry, &cancel).await,
            Err(DirectoryError::UnknownFieldType(99))
        ));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_invalid_value() {
        let source = MemorySource::new(vec![0u8; 16]);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);
        let cancel = CancellationToken::new();

        let entry = inline_entry(270, FieldType::Ascii, 2, *b"a\0\0\0\0\0\0\0");
        assert!(matches!(
            values.read_u16s(&entry, &cancel).await,
            Err(DirectoryError::InvalidValue { tag: 270, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_before_value_read() {
        let source = MemorySource::new(vec![0u8; 16]);
        let reader = source.open_reader().unwrap();
        let ctx = classic_le();
        let values = ValueReader::new(reader.as_ref(), &ctx);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let entry = offset_entry(324, FieldType::Long, 2, 8);
        let result = values.read_u64s(&entry, &cancel).await;
        assert!(matches!(
            result,
            Err(DirectoryError::Source(crate::error::SourceError::Cancelled))
        ));
    }
}
