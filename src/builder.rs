//! Turning an arbitrary (offset, size) request into an aligned native view.
//!
//! Native views must start on an allocation-granularity boundary, so a request
//! at offset `o` maps from `o - o % granularity` and hides the leading
//! `o % granularity` bytes. A size of 0 means "to the end of the object".

use std::sync::Arc;

use crate::access::MmapAccess;
use crate::errors::{MmapViewError, Result};
use crate::flush::FlushRetry;
use crate::native::{Backend, MappingHandle, RegionState, SystemBackend};
use crate::view::View;

/// Requested size meaning "from the offset to the end of the mapping object".
pub const TO_END: u64 = 0;

/// Aligned native request derived from a caller's (offset, size).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewLayout {
    /// Bytes between the native start and the requested offset.
    pub padding: u64,
    /// Granularity-aligned offset passed to the map call.
    pub native_offset: u64,
    /// Bytes passed to the map call; 0 lets the OS map to the end.
    pub native_size: u64,
}

impl ViewLayout {
    /// Compute the layout for a request.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::ArgumentOutOfRange` if the padded size or the
    /// end of the requested range overflows `u64`.
    pub fn new(offset: u64, size: u64, granularity: u64) -> Result<Self> {
        let granularity = granularity.max(1);
        let padding = offset % granularity;
        if offset.checked_add(size).is_none() {
            return Err(MmapViewError::ArgumentOutOfRange {
                name: "size",
                value: size,
                reason: "offset + size overflows",
            });
        }
        let native_size = if size == TO_END {
            0
        } else {
            size.checked_add(padding)
                .ok_or(MmapViewError::ArgumentOutOfRange {
                    name: "size",
                    value: size,
                    reason: "size plus alignment padding overflows",
                })?
        };
        Ok(Self {
            padding,
            native_offset: offset - padding,
            native_size,
        })
    }
}

/// Creates [`View`]s from mapping handles.
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use mmap_view::{MappingHandle, MmapAccess, ViewBuilder};
///
/// let file = File::options().read(true).write(true).open("data.bin")?;
/// let handle = MappingHandle::from_file(&file, MmapAccess::ReadWrite);
///
/// // 100 bytes starting at an unaligned offset.
/// let view = ViewBuilder::new().create_view(&handle, MmapAccess::ReadWrite, 70_000, 100)?;
/// assert_eq!(view.len(), 100);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct ViewBuilder {
    backend: Arc<dyn Backend>,
    flush_retry: FlushRetry,
}

impl Default for ViewBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewBuilder {
    /// Builder over the operating system backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(SystemBackend))
    }

    /// Builder over a custom backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            flush_retry: FlushRetry::default(),
        }
    }

    /// Retry policy given to the views this builder creates.
    #[must_use]
    pub fn flush_retry(mut self, flush_retry: FlushRetry) -> Self {
        self.flush_retry = flush_retry;
        self
    }

    /// Map `size` bytes of `mapping` starting at `offset` (`size` [`TO_END`]
    /// maps to the end of the object).
    ///
    /// The returned view is fully committed and exposes exactly the requested
    /// range; the alignment padding before it is reported by
    /// [`View::pointer_offset`] but never reachable.
    ///
    /// # Errors
    ///
    /// * `ArgumentOutOfRange` if `size` does not fit the platform pointer width,
    ///   `offset + size` overflows, or the view would be empty.
    /// * `AddressSpaceExhausted` if the padded size exceeds the process address space.
    /// * `Native` if the map, query, or commit call fails, or if the committed
    ///   region ends up shorter than requested. Nothing stays mapped on error.
    pub fn create_view(
        &self,
        mapping: &MappingHandle<'_>,
        access: MmapAccess,
        offset: u64,
        size: u64,
    ) -> Result<View> {
        if usize::try_from(size).is_err() {
            return Err(MmapViewError::ArgumentOutOfRange {
                name: "size",
                value: size,
                reason: "exceeds the addressable range of this platform",
            });
        }
        let granularity = self.backend.allocation_granularity();
        let layout = ViewLayout::new(offset, size, granularity)?;

        if layout.native_size > 0 {
            let available = self.backend.total_virtual_bytes();
            if layout.native_size > available {
                return Err(MmapViewError::AddressSpaceExhausted {
                    requested: layout.native_size,
                    available,
                });
            }
        }
        let native_size =
            usize::try_from(layout.native_size).map_err(|_| MmapViewError::AddressSpaceExhausted {
                requested: layout.native_size,
                available: usize::MAX as u64,
            })?;

        let raw = self
            .backend
            .map_view(mapping, access, layout.native_offset, native_size)
            .map_err(|source| MmapViewError::Native {
                operation: "map view",
                source,
            })?;
        // From here on, an early return drops `view`, which unmaps the region.
        let mut view = View::new(Arc::clone(&self.backend), raw, access, self.flush_retry);

        let region = self.query(&view)?;
        // The query describes only the uniformly-attributed prefix, so a short
        // committed prefix still needs the commit over the whole request.
        if region.state != RegionState::Committed || region.size < native_size {
            let commit = if native_size != 0 { native_size } else { region.size };
            log::trace!(
                "committing {commit} bytes (region {:?}, {} bytes)",
                region.state,
                region.size
            );
            self.backend
                .commit_pages(view.raw()?, commit, access)
                .map_err(|source| MmapViewError::Native {
                    operation: "commit view",
                    source,
                })?;
        }
        let region = self.query(&view)?;

        #[allow(clippy::cast_possible_truncation)]
        let padding = layout.padding as usize;
        let len = if size == TO_END {
            region.size.saturating_sub(padding)
        } else {
            if region.size < native_size {
                return Err(MmapViewError::Native {
                    operation: "commit view",
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("committed {} of {native_size} bytes", region.size),
                    ),
                });
            }
            native_size - padding
        };
        if len == 0 {
            return Err(MmapViewError::ArgumentOutOfRange {
                name: "size",
                value: size,
                reason: "view would be empty",
            });
        }
        view.set_window(padding, len);

        log::debug!(
            "mapped view offset={offset} size={size}: padding={padding} native_offset={} native_size={native_size} len={len}",
            layout.native_offset
        );
        Ok(view)
    }

    fn query(&self, view: &View) -> Result<crate::native::RegionInfo> {
        self.backend
            .query_region(view.raw()?)
            .map_err(|source| MmapViewError::Native {
                operation: "query view",
                source,
            })
    }
}
