//! File-backed mapping object that hands out views.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::access::MmapAccess;
use crate::accessor::ViewAccessor;
use crate::builder::{ViewBuilder, TO_END};
use crate::errors::{MmapViewError, Result};
use crate::native::MappingHandle;
use crate::stream::ViewStream;
use crate::utils::ensure_in_bounds;
use crate::view::View;

// Error message constants
const ERR_ZERO_SIZE: &str = "capacity must be greater than zero";
const ERR_ZERO_LENGTH_FILE: &str = "cannot map a zero-length file";

struct Inner {
    path: PathBuf,
    // Views on Windows go through the section, which keeps its own file reference.
    #[cfg_attr(windows, allow(dead_code))]
    file: File,
    access: MmapAccess,
    capacity: u64,
    #[cfg(windows)]
    section: crate::native::Section,
    builder: ViewBuilder,
}

/// Executable sections need a file handle opened with execute rights.
#[cfg(windows)]
fn request_execute(options: &mut OpenOptions, access: MmapAccess, writable: bool) {
    use std::os::windows::fs::OpenOptionsExt;
    const GENERIC_READ: u32 = 0x8000_0000;
    const GENERIC_WRITE: u32 = 0x4000_0000;
    const GENERIC_EXECUTE: u32 = 0x2000_0000;
    if access.is_executable() {
        let write = if writable { GENERIC_WRITE } else { 0 };
        options.access_mode(GENERIC_READ | write | GENERIC_EXECUTE);
    }
}

#[cfg(not(windows))]
fn request_execute(_options: &mut OpenOptions, _access: MmapAccess, _writable: bool) {}

/// A file opened as a mapping object, from which any number of views can be created.
///
/// # Examples
///
/// ```no_run
/// use std::io::{Read, Seek, SeekFrom, Write};
/// use mmap_view::{MemoryMappedFile, MmapAccess};
///
/// let mmap = MemoryMappedFile::create_rw("data.bin", 1 << 20)?;
///
/// let mut stream = mmap.create_view_stream(4_000, 0, MmapAccess::ReadWrite)?;
/// stream.write_all(b"Hello, view!")?;
/// stream.seek(SeekFrom::Start(0))?;
/// let mut buf = [0u8; 12];
/// stream.read_exact(&mut buf)?;
/// assert_eq!(&buf, b"Hello, view!");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Cloning this struct is cheap; it clones an Arc to the inner state.
#[derive(Clone)]
pub struct MemoryMappedFile {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryMappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMappedFile")
            .field("path", &self.inner.path)
            .field("access", &self.inner.access)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl MemoryMappedFile {
    /// Create a new file (truncating if it exists) of `capacity` bytes, mapped read-write.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::ArgumentOutOfRange` if capacity is zero.
    /// Returns `MmapViewError::Io` if file creation or sizing fails.
    pub fn create_rw<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(MmapViewError::ArgumentOutOfRange {
                name: "capacity",
                value: capacity,
                reason: ERR_ZERO_SIZE,
            });
        }
        let path_ref = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(path_ref)?;
        file.set_len(capacity)?;
        Self::from_parts(path_ref, file, MmapAccess::ReadWrite, capacity)
    }

    /// Open an existing file as a mapping object with `access`.
    /// Its current length becomes the capacity.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::InvalidAccess` for `MmapAccess::Write`.
    /// Returns `MmapViewError::ArgumentOutOfRange` if the file is empty.
    /// Returns `MmapViewError::Io` if opening fails.
    pub fn open<P: AsRef<Path>>(path: P, access: MmapAccess) -> Result<Self> {
        let writable = match access {
            MmapAccess::Write => {
                return Err(MmapViewError::InvalidAccess(
                    "a mapping object cannot be write-only",
                ))
            }
            MmapAccess::ReadWrite | MmapAccess::ReadWriteExecute => true,
            MmapAccess::Read | MmapAccess::CopyOnWrite | MmapAccess::ReadExecute => false,
        };
        let path_ref = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true).write(writable);
        request_execute(&mut options, access, writable);
        let file = options.open(path_ref)?;
        let capacity = file.metadata()?.len();
        if capacity == 0 {
            return Err(MmapViewError::ArgumentOutOfRange {
                name: "capacity",
                value: capacity,
                reason: ERR_ZERO_LENGTH_FILE,
            });
        }
        Self::from_parts(path_ref, file, access, capacity)
    }

    /// Open an existing file read-only.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_ro<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, MmapAccess::Read)
    }

    /// Open an existing file read-write.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_rw<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(path, MmapAccess::ReadWrite)
    }

    fn from_parts(path: &Path, file: File, access: MmapAccess, capacity: u64) -> Result<Self> {
        #[cfg(windows)]
        let section = crate::native::Section::create(&file, access, capacity)?;
        let inner = Inner {
            path: path.to_path_buf(),
            file,
            access,
            capacity,
            #[cfg(windows)]
            section,
            builder: ViewBuilder::new(),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Access the mapping object was opened with.
    #[must_use]
    pub fn access(&self) -> MmapAccess {
        self.inner.access
    }

    /// Size of the mapping object in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.inner.capacity
    }

    /// Path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Borrow the native mapping handle.
    #[must_use]
    pub fn handle(&self) -> MappingHandle<'_> {
        cfg_if::cfg_if! {
            if #[cfg(windows)] {
                // SAFETY: the section lives as long as `self.inner`.
                unsafe { MappingHandle::from_raw(self.inner.section.raw(), self.inner.access) }
            } else {
                MappingHandle::from_file(&self.inner.file, self.inner.access)
            }
        }
    }

    /// Create a random-access view of `size` bytes at `offset` (`size` 0 maps to the end).
    ///
    /// # Errors
    ///
    /// Returns `InvalidAccess` if this mapping does not permit `access`,
    /// `OutOfBounds` if the range exceeds the capacity, and any error of
    /// [`ViewBuilder::create_view`].
    pub fn create_view_accessor(&self, offset: u64, size: u64, access: MmapAccess) -> Result<ViewAccessor> {
        self.create_view(offset, size, access).map(ViewAccessor::new)
    }

    /// Create a stream view of `size` bytes at `offset` (`size` 0 maps to the end).
    ///
    /// # Errors
    ///
    /// Same as [`create_view_accessor`](Self::create_view_accessor).
    pub fn create_view_stream(&self, offset: u64, size: u64, access: MmapAccess) -> Result<ViewStream> {
        self.create_view(offset, size, access).map(ViewStream::new)
    }

    fn create_view(&self, offset: u64, size: u64, access: MmapAccess) -> Result<View> {
        if !self.inner.access.permits(access) {
            return Err(MmapViewError::InvalidAccess(
                "view access is not permitted by the mapping access",
            ));
        }
        let total = self.inner.capacity;
        ensure_in_bounds(offset, size, total)?;
        if size == TO_END && offset == total {
            return Err(MmapViewError::ArgumentOutOfRange {
                name: "offset",
                value: offset,
                reason: "no bytes left between offset and the end of the mapping",
            });
        }
        self.inner
            .builder
            .create_view(&self.handle(), access, offset, size)
    }
}
