//! Views over real files through the operating system backend.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};

use mmap_view::utils::allocation_granularity;
use mmap_view::{MemoryMappedFile, MmapAccess, MmapViewError};
use tempfile::tempdir;

const CAPACITY: u64 = 1 << 20;

/// An offset that is never granularity-aligned.
fn unaligned_offset() -> u64 {
    allocation_granularity() + 4_464
}

#[test]
fn accessor_writes_land_at_the_requested_file_offset() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("accessor.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");
    let offset = unaligned_offset();

    let accessor = mmap
        .create_view_accessor(offset, 100, MmapAccess::ReadWrite)
        .expect("accessor");
    assert_eq!(accessor.capacity(), 100);
    assert_eq!(accessor.pointer_offset().expect("offset"), offset % allocation_granularity());

    accessor.write(0, b"first").expect("write");
    accessor.write(95, b"last!").expect("write");
    accessor.flush().expect("flush");
    drop(accessor);

    let bytes = fs::read(&path).expect("read file");
    let start = offset as usize;
    assert_eq!(&bytes[start..start + 5], b"first");
    assert_eq!(&bytes[start + 95..start + 100], b"last!");
    assert_eq!(bytes[start - 1], 0);
    assert_eq!(bytes[start + 100], 0);
}

#[test]
fn stream_and_accessor_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("round_trip.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");
    let offset = unaligned_offset();
    let payload: Vec<u8> = (0..=255u8).cycle().take(1_000).collect();

    let mut stream = mmap
        .create_view_stream(offset, 1_000, MmapAccess::ReadWrite)
        .expect("stream");
    stream.write_all(&payload).expect("write");
    assert_eq!(stream.position(), 1_000);
    stream.flush().expect("flush");

    let accessor = mmap
        .create_view_accessor(offset, 1_000, MmapAccess::Read)
        .expect("accessor");
    for k in [0u64, 1, 499, 999] {
        assert_eq!(accessor.read_byte(k).expect("byte"), payload[k as usize]);
    }

    accessor.dispose();
    let accessor = mmap
        .create_view_accessor(offset, 1_000, MmapAccess::ReadWrite)
        .expect("accessor");
    accessor.write(10, b"patched").expect("patch");

    stream.seek(SeekFrom::Start(10)).expect("seek");
    let mut buf = [0u8; 7];
    stream.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, b"patched");
}

#[test]
fn default_size_maps_to_the_end_of_the_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("to_end.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");
    let offset = unaligned_offset();

    let stream = mmap
        .create_view_stream(offset, 0, MmapAccess::Read)
        .expect("stream");
    assert!(stream.len() >= CAPACITY - offset);
    if cfg!(unix) {
        assert_eq!(stream.len(), CAPACITY - offset);
    }
}

#[test]
fn set_len_is_never_supported() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("set_len.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");

    let mut stream = mmap
        .create_view_stream(0, 4_096, MmapAccess::ReadWrite)
        .expect("stream");
    for len in [0, 4_096, CAPACITY] {
        assert!(matches!(stream.set_len(len), Err(MmapViewError::NotSupported(_))));
    }
    stream.dispose();
    assert!(matches!(stream.set_len(1), Err(MmapViewError::NotSupported(_))));
}

#[test]
fn stream_is_fixed_length() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fixed.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");

    let mut stream = mmap
        .create_view_stream(unaligned_offset(), 8, MmapAccess::ReadWrite)
        .expect("stream");
    assert_eq!(stream.write(b"0123456789").expect("partial write"), 8);
    assert_eq!(stream.write(b"x").expect("full"), 0);
    let err = stream.write_all(b"more").expect_err("no room");
    assert_eq!(err.kind(), io::ErrorKind::WriteZero);

    // Past the end: allowed to seek, nothing to read.
    stream.seek(SeekFrom::End(10)).expect("seek past end");
    let mut buf = [0u8; 4];
    assert_eq!(stream.read(&mut buf).expect("read"), 0);

    let err = stream.seek(SeekFrom::End(-9)).expect_err("before start");
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn disposed_wrappers_reject_use() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("disposed.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");

    let accessor = mmap
        .create_view_accessor(0, 16, MmapAccess::ReadWrite)
        .expect("accessor");
    accessor.write(0, b"kept").expect("write");
    accessor.dispose();
    accessor.dispose();
    assert!(accessor.is_disposed());
    assert!(matches!(accessor.pointer_offset(), Err(MmapViewError::Disposed(_))));
    assert!(matches!(accessor.flush(), Err(MmapViewError::Disposed(_))));

    let mut stream = mmap
        .create_view_stream(0, 16, MmapAccess::ReadWrite)
        .expect("stream");
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).expect("read");
    assert_eq!(&buf, b"kept");
    stream.dispose();
    stream.dispose();
    assert!(stream.seek(SeekFrom::Start(0)).is_err());
    assert!(stream.write(b"x").is_err());
}

#[test]
fn access_must_be_permitted_by_the_mapping() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("access.bin");
    drop(MemoryMappedFile::create_rw(&path, CAPACITY).expect("create"));

    let ro = MemoryMappedFile::open_ro(&path).expect("open ro");
    assert_eq!(ro.access(), MmapAccess::Read);
    assert_eq!(ro.capacity(), CAPACITY);
    assert!(matches!(
        ro.create_view_accessor(0, 10, MmapAccess::ReadWrite),
        Err(MmapViewError::InvalidAccess(_))
    ));

    let accessor = ro
        .create_view_accessor(0, 10, MmapAccess::Read)
        .expect("read view");
    assert!(!accessor.can_write());
    assert!(matches!(accessor.write(0, b"x"), Err(MmapViewError::InvalidAccess(_))));

    assert!(matches!(
        MemoryMappedFile::open(&path, MmapAccess::Write),
        Err(MmapViewError::InvalidAccess(_))
    ));
}

#[test]
fn copy_on_write_views_leave_the_file_untouched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cow.bin");
    drop(MemoryMappedFile::create_rw(&path, CAPACITY).expect("create"));

    let mmap = MemoryMappedFile::open(&path, MmapAccess::CopyOnWrite).expect("open cow");
    let accessor = mmap
        .create_view_accessor(unaligned_offset(), 32, MmapAccess::CopyOnWrite)
        .expect("cow view");
    accessor.write(0, b"private").expect("write");
    let mut buf = [0u8; 7];
    accessor.read(0, &mut buf).expect("read");
    assert_eq!(&buf, b"private");
    accessor.dispose();

    let bytes = fs::read(&path).expect("read file");
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn requests_outside_the_mapping_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bounds.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");

    assert!(matches!(
        mmap.create_view_accessor(CAPACITY - 10, 11, MmapAccess::Read),
        Err(MmapViewError::OutOfBounds { .. })
    ));
    assert!(matches!(
        mmap.create_view_stream(CAPACITY, 0, MmapAccess::Read),
        Err(MmapViewError::ArgumentOutOfRange { name: "offset", .. })
    ));
    let last = mmap
        .create_view_accessor(CAPACITY - 1, 1, MmapAccess::ReadWrite)
        .expect("last byte");
    last.write_byte(0, 0xAB).expect("write");
    assert_eq!(last.read_byte(0).expect("read"), 0xAB);
}

#[test]
fn empty_mappings_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("empty.bin");

    assert!(matches!(
        MemoryMappedFile::create_rw(&path, 0),
        Err(MmapViewError::ArgumentOutOfRange { name: "capacity", .. })
    ));
    fs::write(&path, b"").expect("empty file");
    assert!(matches!(
        MemoryMappedFile::open_rw(&path),
        Err(MmapViewError::ArgumentOutOfRange { name: "capacity", .. })
    ));
}

#[test]
fn views_outlive_clones_of_the_mapping() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("clones.bin");
    let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");
    let clone = mmap.clone();
    assert_eq!(clone.path(), path.as_path());

    let accessor = clone
        .create_view_accessor(3, 5, MmapAccess::ReadWrite)
        .expect("accessor");
    drop(clone);
    drop(mmap);

    accessor.write(0, b"alive").expect("write after mapping dropped");
    accessor.flush().expect("flush");
    drop(accessor);
    assert_eq!(&fs::read(&path).expect("read")[3..8], b"alive");
}

#[test]
fn executable_views_map_through_the_system_backend() {
    // The target directory is not mounted noexec, unlike some temp dirs.
    let dir = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).expect("tempdir");
    let path = dir.path().join("exec.bin");
    let offset = unaligned_offset();
    {
        let mmap = MemoryMappedFile::create_rw(&path, CAPACITY).expect("create");
        let accessor = mmap
            .create_view_accessor(offset, 4, MmapAccess::ReadWrite)
            .expect("accessor");
        accessor.write(0, &[0xC3, 0x90, 0x90, 0x90]).expect("write");
    }

    let rwx = MemoryMappedFile::open(&path, MmapAccess::ReadWriteExecute).expect("open rwx");
    let accessor = rwx
        .create_view_accessor(offset, 4, MmapAccess::ReadWriteExecute)
        .expect("rwx view");
    assert!(accessor.can_read());
    assert!(accessor.can_write());
    assert_eq!(accessor.read_byte(0).expect("read"), 0xC3);
    accessor.write_byte(3, 0xCC).expect("write");
    accessor.dispose();
    drop(rwx);

    let rx = MemoryMappedFile::open(&path, MmapAccess::ReadExecute).expect("open rx");
    let accessor = rx
        .create_view_accessor(offset, 4, MmapAccess::ReadExecute)
        .expect("rx view");
    assert!(accessor.can_read());
    assert!(!accessor.can_write());
    assert_eq!(accessor.pointer_offset().expect("offset"), offset % allocation_granularity());
    assert_eq!(accessor.read_byte(3).expect("read"), 0xCC);
    assert!(matches!(accessor.write(0, b"x"), Err(MmapViewError::InvalidAccess(_))));
    assert!(matches!(
        rx.create_view_stream(offset, 4, MmapAccess::ReadWriteExecute),
        Err(MmapViewError::InvalidAccess(_))
    ));
}
