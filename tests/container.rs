//! End-to-end container tests over real backing stores.
//!
//! These tests build complete container images through the directory writer,
//! then re-read them through every reader-capable source family to check that
//! the backends are interchangeable behind the contract.

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use tiff_container::{
    first_cursor, write_container_header, ByteOrder, ContainerHeader, ContentSource,
    DirectoryWriter, FileSource, ImageFileDirectory, MemorySource, MmapSource, OperationContext,
    StreamSource, SyncSource, ValueCollection, ValueReader,
};

/// Build a classic little-endian file with two chained directories:
/// directory 0 carries tag 256 (SHORT 42) and a five-element LONG array in
/// tag 324; directory 1 carries tag 257 (SHORT 7).
async fn write_fixture(source: &dyn ContentSource) {
    let ctx = OperationContext::classic(ByteOrder::LittleEndian);
    let cancel = CancellationToken::new();
    let sink = source.open_writer().unwrap();

    let header_link = write_container_header(sink.as_ref(), &ctx, &cancel)
        .await
        .unwrap();

    let mut first = DirectoryWriter::new(sink.as_ref(), &ctx, first_cursor(&ctx));
    first.append_shorts(256, &[42], &cancel).await.unwrap();
    first
        .append_longs(324, &[1000, 2000, 3000, 4000, 5000], &cancel)
        .await
        .unwrap();
    let first = first.flush(Some(&header_link), &cancel).await.unwrap();

    let mut second = DirectoryWriter::new(sink.as_ref(), &ctx, first.end);
    second.append_shorts(257, &[7], &cancel).await.unwrap();
    second.flush(Some(&first.link), &cancel).await.unwrap();

    sink.release_flushing().unwrap();
}

/// Decode the fixture through any reader-capable source and verify it.
async fn verify_fixture(source: &dyn ContentSource) {
    let cancel = CancellationToken::new();
    let reader = source.open_reader().unwrap();

    let header = ContainerHeader::read_from(reader.as_ref(), &cancel)
        .await
        .unwrap();
    assert_eq!(header.context.byte_order, ByteOrder::LittleEndian);
    assert!(!header.context.is_big_tiff());

    let chain = ImageFileDirectory::read_chain(
        reader.as_ref(),
        header.first_directory,
        &header.context,
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(chain.len(), 2);

    // Directory 0: tags in ascending order, values intact
    let directory = &chain[0];
    assert_eq!(directory.len(), 2);
    assert_eq!(directory[0].tag, 256);
    assert_eq!(directory[1].tag, 324);

    let values = ValueReader::new(reader.as_ref(), &header.context);
    assert_eq!(
        values.read_u16s(&directory[0], &cancel).await.unwrap(),
        ValueCollection::Single(42)
    );
    assert_eq!(
        values
            .read_u64s(&directory[1], &cancel)
            .await
            .unwrap()
            .as_slice(),
        &[1000, 2000, 3000, 4000, 5000]
    );

    // Directory 1 terminates the chain
    assert_eq!(chain[1][0].tag, 257);
    assert!(chain[1].next_offset().is_chain_end());

    reader.release();
}

#[tokio::test]
async fn file_source_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fixture.tif");

    let source = FileSource::create(&path).unwrap();
    write_fixture(&source).await;
    verify_fixture(&source).await;
    source.release();

    // A fresh read-only source sees the same bytes
    let reopened = FileSource::open(&path).unwrap();
    verify_fixture(&reopened).await;
    reopened.release();
    reopened.release();
}

#[tokio::test]
async fn mmap_source_reads_file_fixture() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fixture.tif");

    let source = FileSource::create(&path).unwrap();
    write_fixture(&source).await;
    source.release();

    let mapped = MmapSource::open(&path).unwrap();
    verify_fixture(&mapped).await;

    // Reader recycling through the single-slot cache stays correct
    verify_fixture(&mapped).await;
    mapped.release();
}

#[tokio::test]
async fn stream_source_reads_fixture_bytes() {
    let buffer = tiff_container::BufferSource::new();
    write_fixture(&buffer).await;
    let image = buffer.snapshot();
    buffer.release();

    let cursor = std::io::Cursor::new(image.to_vec());
    let source = StreamSource::new(Box::new(cursor), true).unwrap();
    verify_fixture(&source).await;
    source.release();
}

#[tokio::test]
async fn memory_source_reads_fixture_bytes() {
    let buffer = tiff_container::BufferSource::new();
    write_fixture(&buffer).await;
    let image = buffer.snapshot();

    let source = MemorySource::new(image);
    verify_fixture(&source).await;
    source.release();
}

#[tokio::test]
async fn sync_adapter_over_file_source() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fixture.tif");

    let source = FileSource::create(&path).unwrap();
    write_fixture(&source).await;
    source.release();

    let inner: std::sync::Arc<dyn ContentSource> =
        std::sync::Arc::new(FileSource::open(&path).unwrap());
    let adapted = SyncSource::wrap(inner);
    verify_fixture(adapted.as_ref()).await;
    adapted.release();
}

#[tokio::test]
async fn released_source_fails_all_families() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fixture.tif");
    let source = FileSource::create(&path).unwrap();
    write_fixture(&source).await;

    let file = FileSource::open(&path).unwrap();
    let mapped = MmapSource::open(&path).unwrap();

    let file_reader = file.open_reader().unwrap();
    let mapped_reader = mapped.open_reader().unwrap();

    file.release();
    mapped.release();

    let mut buf = [0u8; 4];
    assert!(file_reader
        .read_at(tiff_container::StreamOffset::ZERO, &mut buf)
        .is_err());
    assert!(mapped_reader
        .read_at(tiff_container::StreamOffset::ZERO, &mut buf)
        .is_err());
}
