//! # tiff-container
//!
//! Byte-addressable access to TIFF-family container files and a binary codec
//! for the Image File Directory (IFD) structures that describe their content.
//!
//! The crate has two tightly coupled halves:
//!
//! - **Content sources** ([`source`]): one positioned read/write contract over
//!   heterogeneous backing stores (plain files, wrapped byte streams,
//!   in-memory buffers, memory-mapped regions, and a synchronous adapter),
//!   each operation available in a blocking and a suspendable form with
//!   cooperative cancellation and idempotent resource release.
//! - **Directory codec** ([`ifd`]): encode and decode of IFD entries under
//!   both on-disk layouts (classic 32-bit TIFF and 64-bit BigTIFF) and either
//!   byte order, including chaining directories together on write by
//!   back-patching forward offsets.
//!
//! Pixel decoding, compression codecs, and color handling are out of scope;
//! this crate is the byte-level substrate such layers build on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiff_container::{
//!     ContainerHeader, ContentSource, FileSource, ImageFileDirectory, ValueReader,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = FileSource::open("slide.tif")?;
//!     let reader = source.open_reader()?;
//!     let cancel = CancellationToken::new();
//!
//!     let header = ContainerHeader::read_from(reader.as_ref(), &cancel).await?;
//!     let directories = ImageFileDirectory::read_chain(
//!         reader.as_ref(),
//!         header.first_directory,
//!         &header.context,
//!         &cancel,
//!     )
//!     .await?;
//!
//!     if let Some(entry) = directories[0].find(256) {
//!         let values = ValueReader::new(reader.as_ref(), &header.context);
//!         let width = values.read_u32s(entry, &cancel).await?;
//!         println!("image width: {:?}", width.first());
//!     }
//!
//!     source.release();
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ifd;
pub mod region;
pub mod source;

// Re-export commonly used types
pub use error::{DirectoryError, SourceError};
pub use ifd::{
    first_cursor, write_container_header, ByteOrder, ContainerHeader, DirectoryEntry,
    DirectoryLink, DirectoryWriter, FieldType, FlushedDirectory, ImageFileDirectory,
    OperationContext, ValueBuilder, ValueCollection, ValueReader, BIG_TIFF,
    BIG_TIFF_HEADER_SIZE, CLASSIC, CLASSIC_HEADER_SIZE, MAX_DIRECTORIES, MAX_ENTRIES,
};
pub use region::{StreamOffset, StreamRegion};
pub use source::{
    BufferSource, ByteStream, ContentReader, ContentSource, ContentWriter, FileSource,
    MemorySource, MmapSource, StreamSource, SyncSource,
};
