//! Directory entries and their field types.
//!
//! An entry is the decoded, read-only view of one on-disk directory slot:
//! tag, field type, value count, and the raw value/offset field bytes. The
//! raw bytes are kept verbatim so that unknown tags and unknown types survive
//! a decode round untouched; an unknown type only blocks typed value
//! resolution, never directory traversal.

use crate::error::DirectoryError;
use crate::ifd::context::OperationContext;
use crate::region::StreamOffset;

// =============================================================================
// FieldType
// =============================================================================

/// Field types defined by TIFF 6.0 and the BigTIFF extension.
///
/// The element size decides whether a value fits inline in the entry's
/// value/offset field and how arrays are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit NUL-terminated character data
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two u32s: numerator, denominator
    Rational = 5,
    /// Signed 8-bit integer
    SByte = 6,
    /// Opaque byte data
    Undefined = 7,
    /// Signed 16-bit integer
    SShort = 8,
    /// Signed 32-bit integer
    SLong = 9,
    /// Two i32s: numerator, denominator
    SRational = 10,
    /// IEEE 32-bit float
    Float = 11,
    /// IEEE 64-bit float
    Double = 12,
    /// u32 directory offset
    Ifd = 13,
    /// Unsigned 64-bit integer (BigTIFF)
    Long8 = 16,
    /// Signed 64-bit integer (BigTIFF)
    SLong8 = 17,
    /// u64 directory offset (BigTIFF)
    Ifd8 = 18,
}

impl FieldType {
    /// Size of a single element of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8
            | FieldType::Ifd8 => 8,
        }
    }

    /// Create a field type from its numeric enumerant.
    ///
    /// Returns `None` for unknown values; unknown types are preserved raw by
    /// the decoder, not rejected.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            13 => Some(FieldType::Ifd),
            16 => Some(FieldType::Long8),
            17 => Some(FieldType::SLong8),
            18 => Some(FieldType::Ifd8),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether `count` values of this type fit inline in the value/offset
    /// field under the given context.
    #[inline]
    pub fn fits_inline(self, count: u64, context: &OperationContext) -> bool {
        (self.size_in_bytes() as u64).saturating_mul(count) <= context.value_field_width as u64
    }
}

// =============================================================================
// DirectoryEntry
// =============================================================================

/// One decoded directory entry.
///
/// `value_field` holds the entry's raw value/offset bytes; only the first
/// `context.value_field_width` of them are meaningful. Whether they carry the
/// value itself or a pointer to it is recorded in `is_inline` at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// 16-bit tag code
    pub tag: u16,

    /// Field type enumerant exactly as read from disk
    pub field_type_raw: u16,

    /// Decoded field type; `None` when the enumerant is unknown
    pub field_type: Option<FieldType>,

    /// Number of values of the field type
    pub count: u64,

    /// Raw value/offset field bytes
    pub value_field: [u8; 8],

    /// Whether `value_field` holds the value inline rather than an offset
    pub is_inline: bool,
}

impl DirectoryEntry {
    /// Decode one entry from exactly `context.entry_size()` bytes.
    pub(crate) fn parse(bytes: &[u8], context: &OperationContext) -> Result<Self, DirectoryError> {
        let entry_size = context.entry_size();
        if bytes.len() < entry_size {
            return Err(DirectoryError::Truncated {
                offset: 0,
                expected: entry_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let order = context.byte_order;
        let tag = order.read_u16(&bytes[0..2]);
        let field_type_raw = order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let count_width = context.entry_count_width();
        let count = context.read_entry_count(&bytes[4..4 + count_width]);

        let value_width = context.value_field_width;
        let mut value_field = [0u8; 8];
        value_field[..value_width]
            .copy_from_slice(&bytes[4 + count_width..4 + count_width + value_width]);

        let is_inline = match field_type {
            Some(ft) => ft.fits_inline(count, context),
            // Unknown element size; typed decode is blocked anyway
            None => false,
        };

        Ok(DirectoryEntry {
            tag,
            field_type_raw,
            field_type,
            count,
            value_field,
            is_inline,
        })
    }

    /// Total byte size of this entry's values, or `None` for unknown types.
    pub fn value_byte_size(&self) -> Option<u64> {
        self.field_type
            .map(|ft| (ft.size_in_bytes() as u64).saturating_mul(self.count))
    }

    /// The value/offset field interpreted as an offset into the file.
    ///
    /// Only meaningful when the entry is not inline.
    pub fn value_offset(&self, context: &OperationContext) -> StreamOffset {
        StreamOffset::new(context.read_offset(&self.value_field))
    }

    /// The inline value bytes, when the value is stored inline.
    pub fn inline_bytes(&self) -> Option<&[u8]> {
        if !self.is_inline {
            return None;
        }
        let size = self.value_byte_size()? as usize;
        Some(&self.value_field[..size])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::context::ByteOrder;

    #[test]
    fn test_field_type_sizes() {
        assert_eq!(FieldType::Byte.size_in_bytes(), 1);
        assert_eq!(FieldType::Ascii.size_in_bytes(), 1);
        assert_eq!(FieldType::Short.size_in_bytes(), 2);
        assert_eq!(FieldType::Long.size_in_bytes(), 4);
        assert_eq!(FieldType::Rational.size_in_bytes(), 8);
        assert_eq!(FieldType::Float.size_in_bytes(), 4);
        assert_eq!(FieldType::Double.size_in_bytes(), 8);
        assert_eq!(FieldType::Long8.size_in_bytes(), 8);
        assert_eq!(FieldType::Ifd8.size_in_bytes(), 8);
    }

    #[test]
    fn test_field_type_round_trip() {
        for raw in 1..=18u16 {
            if let Some(ft) = FieldType::from_u16(raw) {
                assert_eq!(ft.as_u16(), raw);
            }
        }
        assert_eq!(FieldType::from_u16(0), None);
        assert_eq!(FieldType::from_u16(14), None);
        assert_eq!(FieldType::from_u16(15), None);
        assert_eq!(FieldType::from_u16(99), None);
    }

    #[test]
    fn test_fits_inline_classic() {
        let ctx = OperationContext::classic(ByteOrder::LittleEndian);
        assert!(FieldType::Byte.fits_inline(4, &ctx));
        assert!(FieldType::Short.fits_inline(2, &ctx));
        assert!(FieldType::Long.fits_inline(1, &ctx));

        assert!(!FieldType::Byte.fits_inline(5, &ctx));
        assert!(!FieldType::Short.fits_inline(3, &ctx));
        assert!(!FieldType::Long.fits_inline(2, &ctx));
        assert!(!FieldType::Long8.fits_inline(1, &ctx));
    }

    #[test]
    fn test_fits_inline_big_tiff() {
        let ctx = OperationContext::big_tiff(ByteOrder::LittleEndian);
        assert!(FieldType::Byte.fits_inline(8, &ctx));
        assert!(FieldType::Long8.fits_inline(1, &ctx));
        assert!(!FieldType::Byte.fits_inline(9, &ctx));
        assert!(!FieldType::Long8.fits_inline(2, &ctx));
    }

    #[test]
    fn test_parse_classic_inline_entry() {
        let ctx = OperationContext::classic(ByteOrder::LittleEndian);
        // tag 256, SHORT, count 1, value 42
        let bytes = [
            0x00, 0x01, // tag 256
            0x03, 0x00, // type 3 (SHORT)
            0x01, 0x00, 0x00, 0x00, // count 1
            0x2A, 0x00, 0x00, 0x00, // value 42
        ];

        let entry = DirectoryEntry::parse(&bytes, &ctx).unwrap();
        assert_eq!(entry.tag, 256);
        assert_eq!(entry.field_type, Some(FieldType::Short));
        assert_eq!(entry.count, 1);
        assert!(entry.is_inline);
        assert_eq!(entry.inline_bytes(), Some(&[0x2A, 0x00][..]));
        assert_eq!(entry.value_byte_size(), Some(2));
    }

    #[test]
    fn test_parse_classic_offset_entry() {
        let ctx = OperationContext::classic(ByteOrder::LittleEndian);
        // tag 324, LONG, count 5: 20 bytes never fit in a 4-byte field
        let bytes = [
            0x44, 0x01, // tag 324
            0x04, 0x00, // type 4 (LONG)
            0x05, 0x00, 0x00, 0x00, // count 5
            0x64, 0x00, 0x00, 0x00, // offset 100
        ];

        let entry = DirectoryEntry::parse(&bytes, &ctx).unwrap();
        assert!(!entry.is_inline);
        assert_eq!(entry.inline_bytes(), None);
        assert_eq!(entry.value_offset(&ctx), StreamOffset::new(100));
        assert_eq!(entry.value_byte_size(), Some(20));
    }

    #[test]
    fn test_parse_big_tiff_entry() {
        let ctx = OperationContext::big_tiff(ByteOrder::LittleEndian);
        // tag 257, LONG8, count 1, inline value
        let bytes = [
            0x01, 0x01, // tag 257
            0x10, 0x00, // type 16 (LONG8)
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // count 1
            0xD2, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // value 1234
        ];

        let entry = DirectoryEntry::parse(&bytes, &ctx).unwrap();
        assert_eq!(entry.tag, 257);
        assert_eq!(entry.field_type, Some(FieldType::Long8));
        assert!(entry.is_inline);
        assert_eq!(ctx.byte_order.read_u64(entry.inline_bytes().unwrap()), 1234);
    }

    #[test]
    fn test_parse_unknown_type_preserved() {
        let ctx = OperationContext::classic(ByteOrder::LittleEndian);
        let bytes = [
            0x0F, 0x27, // tag 9999
            0x63, 0x00, // type 99 (unknown)
            0x01, 0x00, 0x00, 0x00, // count 1
            0xAB, 0xCD, 0xEF, 0x01, // raw value field
        ];

        let entry = DirectoryEntry::parse(&bytes, &ctx).unwrap();
        assert_eq!(entry.tag, 9999);
        assert_eq!(entry.field_type, None);
        assert_eq!(entry.field_type_raw, 99);
        assert!(!entry.is_inline);
        assert_eq!(entry.value_byte_size(), None);
        // Raw bytes survive untouched
        assert_eq!(&entry.value_field[..4], &[0xAB, 0xCD, 0xEF, 0x01]);
    }

    #[test]
    fn test_parse_truncated_entry() {
        let ctx = OperationContext::classic(ByteOrder::LittleEndian);
        let bytes = [0x00, 0x01, 0x03, 0x00, 0x01];
        assert!(matches!(
            DirectoryEntry::parse(&bytes, &ctx),
            Err(DirectoryError::Truncated { .. })
        ));
    }

    #[test]
    fn test_parse_big_endian_entry() {
        let ctx = OperationContext::classic(ByteOrder::BigEndian);
        let bytes = [
            0x01, 0x00, // tag 256
            0x00, 0x03, // type 3
            0x00, 0x00, 0x00, 0x01, // count 1
            0x00, 0x2A, 0x00, 0x00, // value 42 (first two bytes)
        ];

        let entry = DirectoryEntry::parse(&bytes, &ctx).unwrap();
        assert_eq!(entry.tag, 256);
        assert_eq!(entry.count, 1);
        assert!(entry.is_inline);
        assert_eq!(ctx.byte_order.read_u16(entry.inline_bytes().unwrap()), 42);
    }
}
