//! Byte order and layout context for a read or write session.
//!
//! Every multi-byte field in a container honors one byte order, declared in
//! the header and fixed for the whole file. The layout variant (classic
//! 32-bit TIFF vs 64-bit BigTIFF) fixes the widths of the directory count
//! field and the per-entry value/offset field. Both choices are captured in
//! an [`OperationContext`], selected once at file-open time and shared by
//! reference through every subsequent call in the session.

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// The host's native byte order.
    pub const NATIVE: ByteOrder = if cfg!(target_endian = "little") {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    };

    /// Read a u16 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 2 bytes.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([bytes[0], bytes[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 4 bytes.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    /// Read a u64 from a byte slice using this byte order.
    ///
    /// # Panics
    /// Panics if the slice has fewer than 8 bytes.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let raw = [
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ];
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }

    /// Encode a u16 under this byte order.
    #[inline]
    pub fn encode_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    /// Encode a u32 under this byte order.
    #[inline]
    pub fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    /// Encode a u64 under this byte order.
    #[inline]
    pub fn encode_u64(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

// =============================================================================
// OperationContext
// =============================================================================

/// Immutable configuration for one container session: byte order plus the
/// two layout-dependent field widths.
///
/// Never mutated after construction. The canonical instances [`CLASSIC`] and
/// [`BIG_TIFF`] cover the two layouts under native byte order; header parsing
/// builds the file-specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    /// Byte order for all multi-byte fields in the file
    pub byte_order: ByteOrder,
    /// Width of the directory entry-count field: 2 (classic) or 8 (BigTIFF)
    pub count_field_width: usize,
    /// Width of the per-entry value/offset field: 4 (classic) or 8 (BigTIFF)
    pub value_field_width: usize,
}

/// Classic 32-bit layout under native byte order.
pub const CLASSIC: OperationContext = OperationContext::classic(ByteOrder::NATIVE);

/// 64-bit BigTIFF layout under native byte order.
pub const BIG_TIFF: OperationContext = OperationContext::big_tiff(ByteOrder::NATIVE);

impl OperationContext {
    /// Classic TIFF layout: 2-byte entry count, 4-byte value/offset fields.
    pub const fn classic(byte_order: ByteOrder) -> Self {
        OperationContext {
            byte_order,
            count_field_width: 2,
            value_field_width: 4,
        }
    }

    /// BigTIFF layout: 8-byte entry count, 8-byte value/offset fields.
    pub const fn big_tiff(byte_order: ByteOrder) -> Self {
        OperationContext {
            byte_order,
            count_field_width: 8,
            value_field_width: 8,
        }
    }

    #[inline]
    pub const fn is_big_tiff(&self) -> bool {
        self.value_field_width == 8
    }

    /// Size of one directory entry: 12 (classic) or 20 (BigTIFF) bytes.
    ///
    /// Tag and type are always 2 bytes each; the count field inside an entry
    /// shares the value/offset width's layout rule (4 or 8 bytes).
    #[inline]
    pub const fn entry_size(&self) -> usize {
        if self.is_big_tiff() {
            20
        } else {
            12
        }
    }

    /// Width of an entry's count field: 4 (classic) or 8 (BigTIFF).
    #[inline]
    pub const fn entry_count_width(&self) -> usize {
        if self.is_big_tiff() {
            8
        } else {
            4
        }
    }

    /// Width of offset fields (value/offset and next-directory).
    #[inline]
    pub const fn offset_field_width(&self) -> usize {
        self.value_field_width
    }

    /// Alignment the write cursor must honor before a directory starts.
    #[inline]
    pub const fn alignment(&self) -> u64 {
        if self.is_big_tiff() {
            8
        } else {
            2
        }
    }

    /// Decode a directory entry-count field (width per this context).
    pub fn read_directory_count(&self, bytes: &[u8]) -> u64 {
        if self.is_big_tiff() {
            self.byte_order.read_u64(bytes)
        } else {
            u64::from(self.byte_order.read_u16(bytes))
        }
    }

    /// Decode an entry's count field (width per this context).
    pub fn read_entry_count(&self, bytes: &[u8]) -> u64 {
        if self.is_big_tiff() {
            self.byte_order.read_u64(bytes)
        } else {
            u64::from(self.byte_order.read_u32(bytes))
        }
    }

    /// Decode an offset field (value/offset or next-directory).
    pub fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_big_tiff() {
            self.byte_order.read_u64(bytes)
        } else {
            u64::from(self.byte_order.read_u32(bytes))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
