//! # mmap-view: arbitrarily-offset views over memory-mapped files
//!
//! Native mapping calls only start views on allocation-granularity boundaries.
//! This crate accepts any byte offset and size, over-maps to the aligned start,
//! hides the padding, commits reserved pages, and exposes exactly the requested
//! bytes through a random-access [`ViewAccessor`] or a seekable [`ViewStream`].
//!
//! ## Features
//!
//! - **Unaligned views**: any `(offset, size)`; padding is reported by `pointer_offset` but unreachable
//! - **Map to end**: a size of 0 maps from the offset to the end of the mapping object
//! - **Retrying flush**: transient lock violations are retried with a bounded backoff
//! - **RAII**: every native view is released exactly once, including on construction failure
//! - **Pluggable backend**: the OS calls sit behind the [`Backend`] trait
//! - **Async support**: optional Tokio-based flush that does not block the executor
//!
//! ## Quick Start
//!
//! ```no_run
//! use mmap_view::{MemoryMappedFile, MmapAccess};
//!
//! // Create a 1MB file-backed mapping object
//! let mmap = MemoryMappedFile::create_rw("data.bin", 1024 * 1024)?;
//!
//! // 100 bytes at an offset that is not granularity-aligned
//! let view = mmap.create_view_accessor(70_000, 100, MmapAccess::ReadWrite)?;
//! view.write(0, b"Hello, view!")?;
//!
//! // Ensure data reaches the file
//! view.flush()?;
//! # Ok::<(), mmap_view::MmapViewError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error types for all view operations
//! - [`access`]: Access modes for mappings and views
//! - [`utils`]: Page size, allocation granularity, alignment, and bounds checking
//! - [`native`]: The native mapping primitives and the OS backend
//! - [`flush`]: Lock-violation retry policy
//! - [`builder`]: The view alignment and commit algorithm
//! - [`view`]: The owned native view
//! - [`accessor`] / [`stream`]: Wrappers over a view
//! - [`mmap`]: File-backed mapping objects
//!
//! ## Feature Flags
//!
//! - `async`: Enables Tokio-based `flush_async`

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/mmap-view")]

pub mod errors;
pub mod access;
pub mod utils;
pub mod native;
pub mod flush;
pub mod view;
pub mod builder;
pub mod accessor;
pub mod stream;
pub mod mmap;

pub use errors::MmapViewError;
pub use access::MmapAccess;
pub use native::{Backend, MappingHandle, RawView, RegionInfo, RegionState, SystemBackend};
pub use flush::FlushRetry;
pub use view::View;
pub use builder::{ViewBuilder, ViewLayout, TO_END};
pub use accessor::ViewAccessor;
pub use stream::ViewStream;
pub use mmap::MemoryMappedFile;
