//! Container header parsing.
//!
//! The header is the only place the layout variant and byte order are
//! declared, so parsing it is what selects the [`OperationContext`] for the
//! whole session.
//!
//! # Header structure
//!
//! ## Classic (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first directory (4 bytes)
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order
//! Bytes 2-3: Version (43 = 0x002B)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved (must be 0)
//! Bytes 8-15: Offset to first directory (8 bytes)
//! ```

use tokio_util::sync::CancellationToken;

use crate::error::DirectoryError;
use crate::ifd::context::{ByteOrder, OperationContext};
use crate::ifd::directory::read_exact_at;
use crate::region::StreamOffset;
use crate::source::ContentReader;

/// Magic bytes indicating little-endian byte order ("II" for Intel)
pub(crate) const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM" for Motorola)
pub(crate) const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for the classic layout
pub(crate) const VERSION_CLASSIC: u16 = 42;

/// Version number for BigTIFF
pub(crate) const VERSION_BIG_TIFF: u16 = 43;

/// Size of a classic header in bytes
pub const CLASSIC_HEADER_SIZE: usize = 8;

/// Size of a BigTIFF header in bytes
pub const BIG_TIFF_HEADER_SIZE: usize = 16;

/// Parsed container header: the session's context plus the location of the
/// first directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Context selected from the header's magic and version fields
    pub context: OperationContext,

    /// Offset of the first directory in the file
    pub first_directory: StreamOffset,
}

impl ContainerHeader {
    /// Parse a container header from raw bytes.
    ///
    /// `source_len` is the total length of the source, used to validate the
    /// first-directory offset.
    ///
    /// # Errors
    /// - `InvalidMagic` if the byte-order bytes are not II or MM
    /// - `InvalidVersion` if the version is not 42 or 43
    /// - `InvalidOffsetSize` if a BigTIFF offset size is not 8
    /// - `Truncated` if there are not enough bytes for the header
    /// - `InvalidValue` if the first-directory offset lies outside the file
    pub fn parse(bytes: &[u8], source_len: u64) -> Result<Self, DirectoryError> {
        if bytes.len() < CLASSIC_HEADER_SIZE {
            return Err(DirectoryError::Truncated {
                offset: 0,
                expected: CLASSIC_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        // The magic is a fixed byte pattern, so the read order is arbitrary
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(DirectoryError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        match version {
            VERSION_CLASSIC => {
                let first = u64::from(byte_order.read_u32(&bytes[4..8]));
                Self::validate_first_offset(first, source_len)?;
                Ok(ContainerHeader {
                    context: OperationContext::classic(byte_order),
                    first_directory: StreamOffset::new(first),
                })
            }
            VERSION_BIG_TIFF => {
                if bytes.len() < BIG_TIFF_HEADER_SIZE {
                    return Err(DirectoryError::Truncated {
                        offset: 0,
                        expected: BIG_TIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }

                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(DirectoryError::InvalidOffsetSize(offset_size));
                }

                let first = byte_order.read_u64(&bytes[8..16]);
                Self::validate_first_offset(first, source_len)?;
                Ok(ContainerHeader {
                    context: OperationContext::big_tiff(byte_order),
                    first_directory: StreamOffset::new(first),
                })
            }
            _ => Err(DirectoryError::InvalidVersion(version)),
        }
    }

    fn validate_first_offset(offset: u64, source_len: u64) -> Result<(), DirectoryError> {
        // Zero (no directories yet) is legal; anything else must lie inside
        // the file
        if offset != 0 && offset >= source_len {
            return Err(DirectoryError::InvalidValue {
                tag: 0,
                message: format!(
                    "first directory offset {offset} outside source of {source_len} bytes"
                ),
            });
        }
        Ok(())
    }

    /// Read and parse the header through a content reader.
    pub async fn read_from(
        reader: &dyn ContentReader,
        cancel: &CancellationToken,
    ) -> Result<Self, DirectoryError> {
        let len = reader.len();
        let want = BIG_TIFF_HEADER_SIZE.min(len as usize);
        let bytes = read_exact_at(reader, StreamOffset::ZERO, want, cancel).await?;
        Self::parse(&bytes, len)
    }

    /// Position of the first-directory pointer field inside the header.
    #[inline]
    pub const fn pointer_position(context: &OperationContext) -> u64 {
        if context.is_big_tiff() {
            8
        } else {
            4
        }
    }

    /// Total header size for the given context.
    #[inline]
    pub const fn size(context: &OperationContext) -> usize {
        if context.is_big_tiff() {
            BIG_TIFF_HEADER_SIZE
        } else {
            CLASSIC_HEADER_SIZE
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
