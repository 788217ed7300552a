//! Native mapping primitives the view algorithm is built on.
//!
//! The [`Backend`] trait is the four-call contract (map, query, commit, flush)
//! plus the two system queries the algorithm needs. [`SystemBackend`] talks to
//! the OS; tests and embedders may supply their own implementation.

use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::access::MmapAccess;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        mod windows;
        /// Raw OS handle of a mapping object (a section handle).
        pub type RawMapping = std::os::windows::io::RawHandle;
    } else if #[cfg(unix)] {
        mod unix;
        /// Raw OS handle of a mapping object (a file descriptor).
        pub type RawMapping = std::os::unix::io::RawFd;
    } else {
        compile_error!("mmap-view supports unix and windows targets only");
    }
}

/// Borrowed handle to a mapping object plus the access it was created with.
///
/// The handle is never closed by this crate; its owner must keep it open for
/// the lifetime `'a`. Views made from it stay valid after the borrow ends.
#[derive(Debug, Clone, Copy)]
pub struct MappingHandle<'a> {
    raw: RawMapping,
    access: MmapAccess,
    _owner: PhantomData<&'a ()>,
}

impl<'a> MappingHandle<'a> {
    /// Borrow the descriptor of an open file as a mapping handle.
    #[cfg(unix)]
    #[must_use]
    pub fn from_file(file: &'a std::fs::File, access: MmapAccess) -> Self {
        use std::os::unix::io::AsRawFd;
        Self {
            raw: file.as_raw_fd(),
            access,
            _owner: PhantomData,
        }
    }

    /// Wrap a raw mapping handle.
    ///
    /// # Safety
    ///
    /// `raw` must stay a valid mapping object, opened with at least `access`,
    /// for `'a`, unless it is only ever passed to a custom [`Backend`] that
    /// does not interpret it.
    #[must_use]
    pub unsafe fn from_raw(raw: RawMapping, access: MmapAccess) -> Self {
        Self {
            raw,
            access,
            _owner: PhantomData,
        }
    }

    /// The raw OS handle.
    #[must_use]
    pub fn raw(&self) -> RawMapping {
        self.raw
    }

    /// Access the mapping object was created with.
    #[must_use]
    pub fn access(&self) -> MmapAccess {
        self.access
    }
}

/// One native mapped region as returned by [`Backend::map_view`].
///
/// Not `Clone`: [`Backend::unmap_view`] consumes it, so a region is released
/// at most once.
#[derive(Debug)]
pub struct RawView {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: RawView is an address range; synchronizing access to the bytes is
// the job of the types that own it.
unsafe impl Send for RawView {}
// SAFETY: see above.
unsafe impl Sync for RawView {}

impl RawView {
    /// Describe a mapped region starting at `base`.
    ///
    /// `len` is the length the backend mapped, or 0 when the backend only
    /// learns it through [`Backend::query_region`].
    #[must_use]
    pub fn new(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    /// Start of the region, aligned to the allocation granularity.
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Raw pointer to the start of the region.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Length recorded at map time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no length was recorded at map time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Allocation state of the pages at the start of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Address space reserved, pages not yet backed.
    Reserved,
    /// Pages committed and accessible.
    Committed,
    /// Not mapped.
    Free,
}

/// Result of [`Backend::query_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    /// Size of the uniformly-attributed run of pages starting at the region base.
    pub size: usize,
    /// State of that run.
    pub state: RegionState,
}

/// Native primitives needed to build and flush views.
///
/// # Safety
///
/// A [`RawView`] returned by `map_view` must point to at least as many
/// readable bytes as `query_region` later reports (writable too when the
/// access allows it), and must stay valid until passed to `unmap_view`.
pub unsafe trait Backend: Send + Sync + fmt::Debug {
    /// Page size used to align flushes.
    fn page_size(&self) -> usize;

    /// Granularity that native view offsets must be a multiple of.
    fn allocation_granularity(&self) -> u64;

    /// Total virtual address space of the process.
    fn total_virtual_bytes(&self) -> u64;

    /// Map `size` bytes of `mapping` starting at the granularity-aligned `offset`.
    /// A `size` of 0 maps to the end of the object.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the map call.
    fn map_view(
        &self,
        mapping: &MappingHandle<'_>,
        access: MmapAccess,
        offset: u64,
        size: usize,
    ) -> io::Result<RawView>;

    /// Report size and state of the pages at the start of `view`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the query call.
    fn query_region(&self, view: &RawView) -> io::Result<RegionInfo>;

    /// Commit the first `size` bytes of `view` with the protection of `access`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the commit call.
    fn commit_pages(&self, view: &RawView, size: usize, access: MmapAccess) -> io::Result<()>;

    /// Write back `len` bytes of `view` starting at the page-aligned `offset`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the flush call; lock violations are retried by the caller.
    fn flush_region(&self, view: &RawView, offset: usize, len: usize) -> io::Result<()>;

    /// Release `view`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the unmap call.
    fn unmap_view(&self, view: RawView) -> io::Result<()>;
}

/// Backend that calls the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBackend;

// SAFETY: regions come straight from the OS map call and are released only by
// unmap_view.
unsafe impl Backend for SystemBackend {
    fn page_size(&self) -> usize {
        crate::utils::page_size()
    }

    fn allocation_granularity(&self) -> u64 {
        crate::utils::allocation_granularity()
    }

    fn total_virtual_bytes(&self) -> u64 {
        crate::utils::total_virtual_bytes()
    }

    fn map_view(
        &self,
        mapping: &MappingHandle<'_>,
        access: MmapAccess,
        offset: u64,
        size: usize,
    ) -> io::Result<RawView> {
        imp::map_view(mapping, access, offset, size)
    }

    fn query_region(&self, view: &RawView) -> io::Result<RegionInfo> {
        imp::query_region(view)
    }

    fn commit_pages(&self, view: &RawView, size: usize, access: MmapAccess) -> io::Result<()> {
        imp::commit_pages(view, size, access)
    }

    fn flush_region(&self, view: &RawView, offset: usize, len: usize) -> io::Result<()> {
        imp::flush_region(view, offset, len)
    }

    fn unmap_view(&self, view: RawView) -> io::Result<()> {
        imp::unmap_view(view)
    }
}

#[cfg(windows)]
use self::windows as imp;
#[cfg(unix)]
use self::unix as imp;

#[cfg(windows)]
pub(crate) use self::windows::Section;
