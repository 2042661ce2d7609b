//! Image File Directory codec.
//!
//! Everything needed to decode and encode the directory structures that
//! describe content inside a TIFF-family container:
//!
//! - **Context selection**: the header declares byte order and the layout
//!   variant (classic vs BigTIFF); parsing it yields the [`OperationContext`]
//!   shared by every call in the session.
//! - **Decode**: [`ImageFileDirectory`] reads a directory's fixed-width
//!   entries and next-offset; [`ValueReader`] resolves entry values lazily,
//!   inline or through a second positioned read.
//! - **Encode**: [`DirectoryWriter`] accumulates fields, spills large values
//!   to an auxiliary area, and chains flushed directories by patching the
//!   predecessor's pointer field.

mod context;
mod directory;
mod entry;
mod header;
mod values;
mod writer;

pub use context::{ByteOrder, OperationContext, BIG_TIFF, CLASSIC};
pub use directory::{ImageFileDirectory, MAX_DIRECTORIES, MAX_ENTRIES};
pub use entry::{DirectoryEntry, FieldType};
pub use header::{ContainerHeader, BIG_TIFF_HEADER_SIZE, CLASSIC_HEADER_SIZE};
pub use values::{ValueBuilder, ValueCollection, ValueReader};
pub use writer::{
    first_cursor, write_container_header, DirectoryLink, DirectoryWriter, FlushedDirectory,
};
