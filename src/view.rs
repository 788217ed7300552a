//! A single mapped view and the window of it callers may touch.

use std::fmt;
use std::sync::Arc;

use crate::access::MmapAccess;
use crate::errors::{MmapViewError, Result};
use crate::flush::FlushRetry;
use crate::native::{Backend, RawView};
use crate::utils::{align_down, ensure_in_bounds, slice_range};

/// An owned native view whose first `pointer_offset` bytes are alignment padding.
///
/// Only the `len` bytes after the padding are visible. The region is unmapped
/// exactly once, by [`dispose`](Self::dispose) or on drop.
pub struct View {
    backend: Arc<dyn Backend>,
    raw: Option<RawView>,
    padding: usize,
    len: usize,
    access: MmapAccess,
    flush_retry: FlushRetry,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("pointer_offset", &self.padding)
            .field("len", &self.len)
            .field("access", &self.access)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl View {
    /// Take ownership of a freshly mapped region. The window is empty until
    /// [`set_window`](Self::set_window) is called, but dropping the view
    /// already releases the region.
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        raw: RawView,
        access: MmapAccess,
        flush_retry: FlushRetry,
    ) -> Self {
        Self {
            backend,
            raw: Some(raw),
            padding: 0,
            len: 0,
            access,
            flush_retry,
        }
    }

    pub(crate) fn set_window(&mut self, padding: usize, len: usize) {
        self.padding = padding;
        self.len = len;
    }

    pub(crate) fn raw(&self) -> Result<&RawView> {
        self.raw.as_ref().ok_or(MmapViewError::Disposed("view"))
    }

    /// Bytes of alignment padding between the raw region start and visible byte 0.
    #[must_use]
    pub fn pointer_offset(&self) -> u64 {
        self.padding as u64
    }

    /// Visible size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the visible window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Access the view was mapped with.
    #[must_use]
    pub fn access(&self) -> MmapAccess {
        self.access
    }

    /// Retry policy used by [`flush`](Self::flush).
    #[must_use]
    pub fn flush_retry(&self) -> FlushRetry {
        self.flush_retry
    }

    /// Whether the region has been released.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.raw.is_none()
    }

    /// Pointer to visible byte 0.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Disposed` after the view has been released.
    pub fn as_ptr(&self) -> Result<*const u8> {
        self.as_mut_ptr().map(<*mut u8>::cast_const)
    }

    /// Mutable pointer to visible byte 0. Writing through it is only sound for
    /// writable views and must stay within [`len`](Self::len) bytes.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Disposed` after the view has been released.
    pub fn as_mut_ptr(&self) -> Result<*mut u8> {
        let raw = self.raw()?;
        // SAFETY: padding lies inside the mapped region.
        Ok(unsafe { raw.as_ptr().add(self.padding) })
    }

    /// Copy visible bytes `[position, position + buf.len())` into `buf`.
    pub(crate) fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        let src = self.checked_ptr(position, buf.len())?;
        // SAFETY: the range was bounds-checked against the visible window.
        unsafe { std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    /// Copy `data` into visible bytes starting at `position`. The caller holds
    /// exclusive access to this view.
    pub(crate) fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        if !self.access.can_write() {
            return Err(MmapViewError::InvalidAccess("view is not writable"));
        }
        let dst = self.checked_ptr(position, data.len())?;
        // SAFETY: bounds-checked, and the pages are mapped writable.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    fn checked_ptr(&self, position: u64, len: usize) -> Result<*mut u8> {
        let (start, _end) = slice_range(position, len as u64, self.len as u64)?;
        let base = self.as_mut_ptr()?;
        // SAFETY: start + len <= self.len, checked by slice_range.
        Ok(unsafe { base.add(start) })
    }

    /// Page-aligned start (relative to the raw region) and byte count covering
    /// the first `capacity` visible bytes.
    fn flush_span(&self, capacity: usize) -> Result<(usize, usize)> {
        ensure_in_bounds(0, capacity as u64, self.len as u64)?;
        let page = self.backend.page_size() as u64;
        #[allow(clippy::cast_possible_truncation)]
        let first_page = align_down(self.padding as u64, page) as usize;
        Ok((first_page, capacity + (self.padding - first_page)))
    }

    /// Write modified pages of the first `capacity` visible bytes back to the
    /// backing object, retrying transient lock violations per the view's
    /// [`FlushRetry`]. Blocks while waiting between retry rounds.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Disposed` after release, `OutOfBounds` if
    /// `capacity` exceeds the view, `Native` for a failed flush call, and
    /// `FlushFailed` when lock violations outlast the retry budget.
    pub fn flush(&self, capacity: usize) -> Result<()> {
        let raw = self.raw()?;
        if capacity == 0 {
            return Ok(());
        }
        let (offset, len) = self.flush_span(capacity)?;
        self.flush_retry
            .run(|| self.backend.flush_region(raw, offset, len))
    }

    /// Like [`flush`](Self::flush), but sleeps asynchronously between retry rounds.
    ///
    /// # Errors
    ///
    /// Same as [`flush`](Self::flush).
    #[cfg(feature = "async")]
    pub async fn flush_async(&self, capacity: usize) -> Result<()> {
        let raw = self.raw()?;
        if capacity == 0 {
            return Ok(());
        }
        let (offset, len) = self.flush_span(capacity)?;
        self.flush_retry
            .run_async(|| self.backend.flush_region(raw, offset, len))
            .await
    }

    /// Release the native region. Calling it again is a no-op.
    pub fn dispose(&mut self) {
        if let Some(raw) = self.raw.take() {
            if let Err(e) = self.backend.unmap_view(raw) {
                log::warn!("unmapping view failed: {e}");
            }
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.dispose();
    }
}
