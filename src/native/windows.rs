//! Win32 implementation of the native view primitives.

use std::ffi::c_void;
use std::io;
use std::mem::{size_of, MaybeUninit};
use std::os::windows::io::RawHandle;
use std::ptr::{self, NonNull};

use super::{MappingHandle, RawView, RegionInfo, RegionState};
use crate::access::MmapAccess;

const FILE_MAP_COPY: u32 = 0x0001;
const FILE_MAP_WRITE: u32 = 0x0002;
const FILE_MAP_READ: u32 = 0x0004;
const FILE_MAP_EXECUTE: u32 = 0x0020;

const PAGE_READONLY: u32 = 0x02;
const PAGE_READWRITE: u32 = 0x04;
const PAGE_WRITECOPY: u32 = 0x08;
const PAGE_EXECUTE_READ: u32 = 0x20;
const PAGE_EXECUTE_READWRITE: u32 = 0x40;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;

#[allow(non_snake_case)]
#[repr(C)]
struct MEMORY_BASIC_INFORMATION {
    BaseAddress: *mut c_void,
    AllocationBase: *mut c_void,
    AllocationProtect: u32,
    #[cfg(target_pointer_width = "64")]
    PartitionId: u16,
    RegionSize: usize,
    State: u32,
    Protect: u32,
    Type: u32,
}

extern "system" {
    fn MapViewOfFile(
        hFileMappingObject: RawHandle,
        dwDesiredAccess: u32,
        dwFileOffsetHigh: u32,
        dwFileOffsetLow: u32,
        dwNumberOfBytesToMap: usize,
    ) -> *mut c_void;
    fn UnmapViewOfFile(lpBaseAddress: *const c_void) -> i32;
    fn FlushViewOfFile(lpBaseAddress: *const c_void, dwNumberOfBytesToFlush: usize) -> i32;
    fn VirtualQuery(
        lpAddress: *const c_void,
        lpBuffer: *mut MEMORY_BASIC_INFORMATION,
        dwLength: usize,
    ) -> usize;
    fn VirtualAlloc(
        lpAddress: *mut c_void,
        dwSize: usize,
        flAllocationType: u32,
        flProtect: u32,
    ) -> *mut c_void;
    fn CreateFileMappingW(
        hFile: RawHandle,
        lpFileMappingAttributes: *mut c_void,
        flProtect: u32,
        dwMaximumSizeHigh: u32,
        dwMaximumSizeLow: u32,
        lpName: *const u16,
    ) -> RawHandle;
    fn CloseHandle(hObject: RawHandle) -> i32;
}

fn file_map_access(access: MmapAccess) -> u32 {
    match access {
        MmapAccess::Read => FILE_MAP_READ,
        MmapAccess::Write => FILE_MAP_WRITE,
        MmapAccess::ReadWrite => FILE_MAP_READ | FILE_MAP_WRITE,
        MmapAccess::CopyOnWrite => FILE_MAP_COPY,
        MmapAccess::ReadExecute => FILE_MAP_READ | FILE_MAP_EXECUTE,
        MmapAccess::ReadWriteExecute => FILE_MAP_READ | FILE_MAP_WRITE | FILE_MAP_EXECUTE,
    }
}

pub(crate) fn page_protection(access: MmapAccess) -> u32 {
    match access {
        MmapAccess::Read => PAGE_READONLY,
        MmapAccess::Write | MmapAccess::ReadWrite => PAGE_READWRITE,
        MmapAccess::CopyOnWrite => PAGE_WRITECOPY,
        MmapAccess::ReadExecute => PAGE_EXECUTE_READ,
        MmapAccess::ReadWriteExecute => PAGE_EXECUTE_READWRITE,
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(super) fn map_view(
    mapping: &MappingHandle<'_>,
    access: MmapAccess,
    offset: u64,
    size: usize,
) -> io::Result<RawView> {
    // SAFETY: the handle is a live section for the duration of the borrow.
    let ptr = unsafe {
        MapViewOfFile(
            mapping.raw(),
            file_map_access(access),
            (offset >> 32) as u32,
            offset as u32,
            size,
        )
    };
    let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;
    Ok(RawView::new(base, size))
}

pub(super) fn query_region(view: &RawView) -> io::Result<RegionInfo> {
    let mut info = MaybeUninit::<MEMORY_BASIC_INFORMATION>::uninit();
    // SAFETY: VirtualQuery fills the buffer when it returns non-zero.
    let info = unsafe {
        if VirtualQuery(
            view.as_ptr().cast(),
            info.as_mut_ptr(),
            size_of::<MEMORY_BASIC_INFORMATION>(),
        ) == 0
        {
            return Err(io::Error::last_os_error());
        }
        info.assume_init()
    };
    let state = if info.State & MEM_COMMIT != 0 {
        RegionState::Committed
    } else if info.State & MEM_RESERVE != 0 {
        RegionState::Reserved
    } else {
        RegionState::Free
    };
    Ok(RegionInfo {
        size: info.RegionSize,
        state,
    })
}

pub(super) fn commit_pages(view: &RawView, size: usize, access: MmapAccess) -> io::Result<()> {
    // SAFETY: committing pages inside a view this process mapped.
    let ptr = unsafe { VirtualAlloc(view.as_ptr().cast(), size, MEM_COMMIT, page_protection(access)) };
    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(super) fn flush_region(view: &RawView, offset: usize, len: usize) -> io::Result<()> {
    // SAFETY: the range starts inside the mapped view.
    let ok = unsafe { FlushViewOfFile(view.as_ptr().add(offset).cast(), len) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(super) fn unmap_view(view: RawView) -> io::Result<()> {
    // SAFETY: `view` is consumed, so the view is released exactly once.
    let ok = unsafe { UnmapViewOfFile(view.as_ptr().cast()) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Owned section (file mapping object) handle, closed on drop.
#[derive(Debug)]
pub(crate) struct Section(RawHandle);

// SAFETY: section handles may be used from any thread.
unsafe impl Send for Section {}
// SAFETY: see above.
unsafe impl Sync for Section {}

impl Section {
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn create(file: &std::fs::File, access: MmapAccess, capacity: u64) -> io::Result<Self> {
        use std::os::windows::io::AsRawHandle;
        // SAFETY: the file handle is valid for the call; the section keeps
        // its own reference to the file.
        let handle = unsafe {
            CreateFileMappingW(
                file.as_raw_handle(),
                ptr::null_mut(),
                page_protection(access),
                (capacity >> 32) as u32,
                capacity as u32,
                ptr::null(),
            )
        };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self(handle))
    }

    pub(crate) fn raw(&self) -> RawHandle {
        self.0
    }
}

impl Drop for Section {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and closed once.
        if unsafe { CloseHandle(self.0) } == 0 {
            log::warn!("closing section handle failed: {}", io::Error::last_os_error());
        }
    }
}
