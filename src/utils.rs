//! Utility helpers for page size, allocation granularity, alignment, and safe range calculations.

use crate::errors::{MmapViewError, Result};

/// Get the system page size in bytes.
#[must_use]
pub fn page_size() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "windows")] {
            windows::system_info().page_size
        } else {
            unix_page_size()
        }
    }
}

/// Get the granularity at which a native view may start, in bytes.
///
/// Windows reports this separately from the page size (typically 64 KiB);
/// POSIX `mmap` offsets only need page alignment.
#[must_use]
pub fn allocation_granularity() -> u64 {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "windows")] {
            windows::system_info().allocation_granularity
        } else {
            unix_page_size() as u64
        }
    }
}

/// Total virtual address space available to the process, in bytes.
#[must_use]
pub fn total_virtual_bytes() -> u64 {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "windows")] {
            windows::total_virtual_bytes()
        } else {
            unix_total_virtual_bytes()
        }
    }
}

#[cfg(target_os = "windows")]
pub(crate) mod windows {
    use std::mem::MaybeUninit;

    pub(crate) struct SystemInfo {
        pub(crate) page_size: usize,
        pub(crate) allocation_granularity: u64,
    }

    #[allow(non_snake_case)]
    #[repr(C)]
    struct SYSTEM_INFO {
        wProcessorArchitecture: u16,
        wReserved: u16,
        dwPageSize: u32,
        lpMinimumApplicationAddress: *mut core::ffi::c_void,
        lpMaximumApplicationAddress: *mut core::ffi::c_void,
        dwActiveProcessorMask: usize,
        dwNumberOfProcessors: u32,
        dwProcessorType: u32,
        dwAllocationGranularity: u32,
        wProcessorLevel: u16,
        wProcessorRevision: u16,
    }

    #[allow(non_snake_case)]
    #[repr(C)]
    struct MEMORYSTATUSEX {
        dwLength: u32,
        dwMemoryLoad: u32,
        ullTotalPhys: u64,
        ullAvailPhys: u64,
        ullTotalPageFile: u64,
        ullAvailPageFile: u64,
        ullTotalVirtual: u64,
        ullAvailVirtual: u64,
        ullAvailExtendedVirtual: u64,
    }

    extern "system" {
        fn GetSystemInfo(lpSystemInfo: *mut SYSTEM_INFO);
        fn GlobalMemoryStatusEx(lpBuffer: *mut MEMORYSTATUSEX) -> i32;
    }

    pub(crate) fn system_info() -> SystemInfo {
        let mut sysinfo = MaybeUninit::<SYSTEM_INFO>::uninit();
        // SAFETY: GetSystemInfo always fills the structure.
        unsafe {
            GetSystemInfo(sysinfo.as_mut_ptr());
            let s = sysinfo.assume_init();
            SystemInfo {
                page_size: s.dwPageSize as usize,
                allocation_granularity: u64::from(s.dwAllocationGranularity),
            }
        }
    }

    pub(crate) fn total_virtual_bytes() -> u64 {
        let mut status = MaybeUninit::<MEMORYSTATUSEX>::zeroed();
        // SAFETY: dwLength is set before the call as the API requires; the
        // structure is only read when the call reports success.
        unsafe {
            (*status.as_mut_ptr()).dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
            if GlobalMemoryStatusEx(status.as_mut_ptr()) == 0 {
                return usize::MAX as u64;
            }
            status.assume_init().ullTotalVirtual
        }
    }
}

#[cfg(not(target_os = "windows"))]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unix_page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE is safe to call.
    unsafe {
        let page_size = libc::sysconf(libc::_SC_PAGESIZE);
        // Page size should always be positive and fit in usize
        page_size.max(0) as usize
    }
}

#[cfg(not(target_os = "windows"))]
#[allow(clippy::unnecessary_cast)]
fn unix_total_virtual_bytes() -> u64 {
    // User address space without an rlimit: 128 TiB on 64-bit targets, the
    // whole pointer range on 32-bit ones.
    let arch_limit: u64 = if cfg!(target_pointer_width = "64") {
        1 << 47
    } else {
        usize::MAX as u64
    };
    let mut limit = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes the structure on success; it is only read then.
    let soft = unsafe {
        if libc::getrlimit(libc::RLIMIT_AS, limit.as_mut_ptr()) != 0 {
            return arch_limit;
        }
        limit.assume_init().rlim_cur
    };
    if soft == libc::RLIM_INFINITY {
        arch_limit
    } else {
        (soft as u64).min(arch_limit)
    }
}

/// Align a value down to the nearest multiple of `alignment`.
#[must_use]
pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value - value % alignment
}

/// Ensure the requested [offset, offset+len) range is within [0, total).
/// Returns `Ok(())` if valid; otherwise an `OutOfBounds` error.
///
/// # Errors
///
/// Returns `MmapViewError::OutOfBounds` if the range exceeds bounds.
pub fn ensure_in_bounds(offset: u64, len: u64, total: u64) -> Result<()> {
    if offset > total {
        return Err(MmapViewError::OutOfBounds { offset, len, total });
    }
    let end = offset.saturating_add(len);
    if end > total {
        return Err(MmapViewError::OutOfBounds { offset, len, total });
    }
    Ok(())
}

/// Compute a safe byte slice range for a given total length, returning start..end as usize tuple.
///
/// # Errors
///
/// Returns `MmapViewError::OutOfBounds` if the requested range exceeds the total length.
#[allow(clippy::cast_possible_truncation)]
pub fn slice_range(offset: u64, len: u64, total: u64) -> Result<(usize, usize)> {
    ensure_in_bounds(offset, len, total)?;
    // Bounded by total, which describes memory that is already mapped.
    let start = offset as usize;
    let end = (offset + len) as usize;
    Ok((start, end))
}
