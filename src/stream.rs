//! Seekable fixed-length byte stream over a view.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::access::MmapAccess;
use crate::errors::{MmapViewError, Result};
use crate::view::View;

/// `Read + Write + Seek` over the visible bytes of one [`View`].
///
/// The length is fixed when the view is created. Writes stop at the end of the
/// view (`Ok(0)` once full), reads past it return 0, and
/// [`set_len`](Self::set_len) always fails.
#[derive(Debug)]
pub struct ViewStream {
    view: Option<View>,
    position: u64,
    len: u64,
    access: MmapAccess,
}

impl ViewStream {
    /// Take ownership of `view`.
    #[must_use]
    pub fn new(view: View) -> Self {
        Self {
            len: view.len() as u64,
            access: view.access(),
            view: Some(view),
            position: 0,
        }
    }

    fn view(&self) -> Result<&View> {
        self.view.as_ref().ok_or(MmapViewError::Disposed("view stream"))
    }

    /// Length of the stream in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move to `position`; may lie past the end.
    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    /// Whether reads are allowed.
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.access.can_read() && self.view.is_some()
    }

    /// Whether writes are allowed.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.access.can_write() && self.view.is_some()
    }

    /// Whether the stream has released its view.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.view.is_none()
    }

    /// Views have a fixed length; resizing always fails.
    ///
    /// # Errors
    ///
    /// Always returns `MmapViewError::NotSupported`.
    pub fn set_len(&mut self, _len: u64) -> Result<()> {
        Err(MmapViewError::NotSupported(
            "view streams have a fixed length; resize the mapping instead",
        ))
    }

    /// Bytes of alignment padding in front of position 0 in the raw region.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Disposed` once the view is gone.
    pub fn pointer_offset(&self) -> Result<u64> {
        self.view().map(View::pointer_offset)
    }

    /// Flush the whole view to the backing object.
    ///
    /// # Errors
    ///
    /// Returns `Disposed`, or the flush errors of [`View::flush`].
    pub fn flush_view(&self) -> Result<()> {
        let view = self.view()?;
        view.flush(view.len())
    }

    /// Flush the whole view, sleeping asynchronously between retry rounds.
    ///
    /// # Errors
    ///
    /// Same as [`flush_view`](Self::flush_view).
    #[cfg(feature = "async")]
    pub async fn flush_async(&self) -> Result<()> {
        let view = self.view()?;
        view.flush_async(view.len()).await
    }

    /// Flush pending writes (best effort) and release the view. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(mut view) = self.view.take() {
            if view.access().can_write() {
                if let Err(e) = view.flush(view.len()) {
                    log::warn!("flush while disposing view stream failed: {e}");
                }
            }
            view.dispose();
        }
    }

    /// Bytes left between the position and the end, capped at `want`.
    #[allow(clippy::cast_possible_truncation)]
    fn remaining(&self, want: usize) -> usize {
        let left = self.len.saturating_sub(self.position);
        (want as u64).min(left) as usize
    }
}

impl Read for ViewStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let view = self.view()?;
        if !self.access.can_read() {
            return Err(MmapViewError::InvalidAccess("view stream is not readable").into());
        }
        let n = self.remaining(buf.len());
        if n == 0 {
            return Ok(0);
        }
        view.read_at(self.position, &mut buf[..n])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for ViewStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let view = self.view()?;
        if !self.access.can_write() {
            return Err(MmapViewError::InvalidAccess("view stream is not writable").into());
        }
        let n = self.remaining(data.len());
        if n == 0 {
            return Ok(0);
        }
        view.write_at(self.position, &data[..n])?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_view().map_err(io::Error::from)
    }
}

impl Seek for ViewStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.view()?;
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl Drop for ViewStream {
    fn drop(&mut self) {
        self.dispose();
    }
}
