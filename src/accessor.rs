//! Random-access reads and writes over a view.

use parking_lot::RwLock;

use crate::access::MmapAccess;
use crate::errors::{MmapViewError, Result};
use crate::view::View;

/// Random-access window over the visible bytes of one [`View`].
///
/// Positions are relative to the requested offset of the view; the alignment
/// padding in front of it cannot be reached. Reads share the view, writes and
/// [`dispose`](Self::dispose) take it exclusively.
///
/// # Examples
///
/// ```no_run
/// use mmap_view::{MemoryMappedFile, MmapAccess};
///
/// let mmap = MemoryMappedFile::create_rw("data.bin", 1 << 20)?;
/// let accessor = mmap.create_view_accessor(70_000, 100, MmapAccess::ReadWrite)?;
///
/// accessor.write(0, b"hello")?;
/// let mut buf = [0u8; 5];
/// accessor.read(0, &mut buf)?;
/// assert_eq!(&buf, b"hello");
/// accessor.flush()?;
/// # Ok::<(), mmap_view::MmapViewError>(())
/// ```
#[derive(Debug)]
pub struct ViewAccessor {
    view: RwLock<Option<View>>,
    capacity: u64,
    access: MmapAccess,
}

impl ViewAccessor {
    /// Take ownership of `view`.
    #[must_use]
    pub fn new(view: View) -> Self {
        Self {
            capacity: view.len() as u64,
            access: view.access(),
            view: RwLock::new(Some(view)),
        }
    }

    /// Number of addressable bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Whether reads are allowed.
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.access.can_read() && !self.is_disposed()
    }

    /// Whether writes are allowed.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.access.can_write() && !self.is_disposed()
    }

    /// Whether the accessor has released its view.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.view.read().is_none()
    }

    /// Bytes of alignment padding in front of position 0 in the raw region.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Disposed` once the view is gone.
    pub fn pointer_offset(&self) -> Result<u64> {
        let guard = self.view.read();
        guard
            .as_ref()
            .map(View::pointer_offset)
            .ok_or(MmapViewError::Disposed("view accessor"))
    }

    /// Fill `buf` from `[position, position + buf.len())`.
    ///
    /// # Errors
    ///
    /// Returns `Disposed`, `InvalidAccess` for write-only views, or
    /// `OutOfBounds` if the range leaves the view.
    pub fn read(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        if !self.access.can_read() {
            return Err(MmapViewError::InvalidAccess("view accessor is not readable"));
        }
        let guard = self.view.read();
        let view = guard.as_ref().ok_or(MmapViewError::Disposed("view accessor"))?;
        view.read_at(position, buf)
    }

    /// Copy `data` into the view starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns `Disposed`, `InvalidAccess` for read-only views, or
    /// `OutOfBounds` if the range leaves the view.
    pub fn write(&self, position: u64, data: &[u8]) -> Result<()> {
        let guard = self.view.write();
        let view = guard.as_ref().ok_or(MmapViewError::Disposed("view accessor"))?;
        view.write_at(position, data)
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    pub fn read_byte(&self, position: u64) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(position, &mut byte)?;
        Ok(byte[0])
    }

    /// Write one byte.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub fn write_byte(&self, position: u64, value: u8) -> Result<()> {
        self.write(position, &[value])
    }

    /// Flush the whole view to the backing object.
    ///
    /// # Errors
    ///
    /// Returns `Disposed`, or the flush errors of [`View::flush`].
    pub fn flush(&self) -> Result<()> {
        let guard = self.view.read();
        let view = guard.as_ref().ok_or(MmapViewError::Disposed("view accessor"))?;
        view.flush(view.len())
    }

    /// Flush pending writes (best effort) and release the view. Idempotent.
    pub fn dispose(&self) {
        let mut guard = self.view.write();
        if let Some(mut view) = guard.take() {
            if view.access().can_write() {
                if let Err(e) = view.flush(view.len()) {
                    log::warn!("flush while disposing view accessor failed: {e}");
                }
            }
            view.dispose();
        }
    }
}

impl Drop for ViewAccessor {
    fn drop(&mut self) {
        self.dispose();
    }
}
