//! POSIX implementation of the native view primitives.
//!
//! `mmap` commits pages eagerly, so the query always reports the mapped length
//! as committed and the commit step only re-applies the protection.

use std::io;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use super::{MappingHandle, RawView, RegionInfo, RegionState};
use crate::access::MmapAccess;

fn protection(access: MmapAccess) -> libc::c_int {
    match access {
        MmapAccess::Read => libc::PROT_READ,
        // Write-only pages are not portable; writable views are also readable.
        MmapAccess::Write | MmapAccess::ReadWrite | MmapAccess::CopyOnWrite => {
            libc::PROT_READ | libc::PROT_WRITE
        }
        MmapAccess::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
        MmapAccess::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
    }
}

fn flags(access: MmapAccess) -> libc::c_int {
    if access == MmapAccess::CopyOnWrite {
        libc::MAP_PRIVATE
    } else {
        libc::MAP_SHARED
    }
}

#[allow(clippy::cast_sign_loss)]
fn object_len(mapping: &MappingHandle<'_>) -> io::Result<u64> {
    let mut stat = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: fstat only writes the stat buffer; it is read only on success.
    unsafe {
        if libc::fstat(mapping.raw(), stat.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(stat.assume_init().st_size.max(0) as u64)
    }
}

fn invalid() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

pub(super) fn map_view(
    mapping: &MappingHandle<'_>,
    access: MmapAccess,
    offset: u64,
    size: usize,
) -> io::Result<RawView> {
    let total = object_len(mapping)?;
    if offset >= total {
        return Err(invalid());
    }
    let len = if size == 0 {
        usize::try_from(total - offset).map_err(|_| io::Error::from_raw_os_error(libc::ENOMEM))?
    } else {
        // Pages past the end of the file would fault on first touch.
        if offset.saturating_add(size as u64) > total {
            return Err(invalid());
        }
        size
    };
    let file_offset = libc::off_t::try_from(offset).map_err(|_| invalid())?;

    // SAFETY: a fresh mapping chosen by the kernel; nothing else aliases it yet.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            protection(access),
            flags(access),
            mapping.raw(),
            file_offset,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(invalid)?;
    Ok(RawView::new(base, len))
}

pub(super) fn query_region(view: &RawView) -> io::Result<RegionInfo> {
    Ok(RegionInfo {
        size: view.len(),
        state: RegionState::Committed,
    })
}

pub(super) fn commit_pages(view: &RawView, size: usize, access: MmapAccess) -> io::Result<()> {
    if size > view.len() {
        return Err(io::Error::from_raw_os_error(libc::ENOMEM));
    }
    // SAFETY: the range lies inside the mapping owned by `view`.
    let rc = unsafe { libc::mprotect(view.as_ptr().cast(), size, protection(access)) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(super) fn flush_region(view: &RawView, offset: usize, len: usize) -> io::Result<()> {
    if offset.saturating_add(len) > view.len() {
        return Err(invalid());
    }
    // SAFETY: offset is page-aligned and the range lies inside the mapping.
    let rc = unsafe { libc::msync(view.as_ptr().add(offset).cast(), len, libc::MS_SYNC) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(super) fn unmap_view(view: RawView) -> io::Result<()> {
    // SAFETY: `view` is consumed, so this mapping is released exactly once.
    let rc = unsafe { libc::munmap(view.as_ptr().cast(), view.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
