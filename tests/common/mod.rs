//! In-memory backend that behaves like a mapping object with 64 KiB granularity.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use mmap_view::flush::LOCK_VIOLATION;
use mmap_view::{
    Backend, FlushRetry, MappingHandle, MmapAccess, RawView, RegionInfo, RegionState, ViewBuilder,
};
use parking_lot::Mutex;

pub const GRANULARITY: u64 = 65_536;
pub const PAGE: usize = 4_096;
/// OS code the fake reports for bad map requests.
pub const EINVAL: i32 = 22;

/// How the first query after a map describes the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Fully committed right away.
    Eager,
    /// Only reserved until committed.
    Reserved,
    /// Reported as not mapped at full size until committed.
    Unbacked,
    /// A one-page committed prefix until committed.
    ShortPrefix,
    /// A one-page committed prefix even after committing.
    StuckShort,
}

#[derive(Debug, Default)]
pub struct Calls {
    pub maps: Vec<(u64, usize)>,
    pub commits: Vec<usize>,
    pub flushes: Vec<(usize, usize)>,
    pub unmaps: usize,
}

#[derive(Debug, Default)]
struct State {
    calls: Calls,
    committed: HashMap<usize, bool>,
    flush_script: VecDeque<i32>,
    flush_always: Option<i32>,
}

#[derive(Debug)]
pub struct FakeBackend {
    object: NonNull<u8>,
    object_len: usize,
    mode: CommitMode,
    total_virtual: u64,
    commit_error: Option<i32>,
    state: Mutex<State>,
}

// SAFETY: the object buffer is only touched through views or while holding no
// other references in single-threaded tests.
unsafe impl Send for FakeBackend {}
// SAFETY: see above.
unsafe impl Sync for FakeBackend {}

impl FakeBackend {
    /// Object of `object_len` bytes filled with a position-dependent pattern.
    pub fn new(object_len: usize) -> Self {
        let bytes: Box<[u8]> = (0..object_len).map(pattern).collect();
        let object = NonNull::new(Box::into_raw(bytes).cast::<u8>()).expect("non-null box");
        Self {
            object,
            object_len,
            mode: CommitMode::Eager,
            total_virtual: 1 << 47,
            commit_error: None,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_mode(mut self, mode: CommitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_total_virtual(mut self, bytes: u64) -> Self {
        self.total_virtual = bytes;
        self
    }

    pub fn with_commit_error(mut self, code: i32) -> Self {
        self.commit_error = Some(code);
        self
    }

    /// Fail the next `n` flushes with `code`.
    pub fn fail_flushes(&self, n: usize, code: i32) {
        let mut state = self.state.lock();
        state.flush_script.extend(std::iter::repeat(code).take(n));
    }

    /// Fail every flush with `code`.
    pub fn fail_all_flushes(&self, code: i32) {
        self.state.lock().flush_always = Some(code);
    }

    pub fn maps(&self) -> Vec<(u64, usize)> {
        self.state.lock().calls.maps.clone()
    }

    pub fn commits(&self) -> Vec<usize> {
        self.state.lock().calls.commits.clone()
    }

    pub fn flushes(&self) -> Vec<(usize, usize)> {
        self.state.lock().calls.flushes.clone()
    }

    pub fn unmaps(&self) -> usize {
        self.state.lock().calls.unmaps
    }

    pub fn object_ptr(&self) -> *const u8 {
        self.object.as_ptr()
    }

    /// Snapshot of the backing object.
    pub fn object_bytes(&self) -> Vec<u8> {
        // SAFETY: the buffer lives as long as self; tests read it between view operations.
        unsafe { std::slice::from_raw_parts(self.object.as_ptr(), self.object_len).to_vec() }
    }

    fn first_query(&self, mapped: usize) -> RegionInfo {
        match self.mode {
            CommitMode::Eager => RegionInfo { size: mapped, state: RegionState::Committed },
            CommitMode::Reserved => RegionInfo { size: mapped, state: RegionState::Reserved },
            CommitMode::Unbacked => RegionInfo { size: mapped, state: RegionState::Free },
            CommitMode::ShortPrefix | CommitMode::StuckShort => RegionInfo {
                size: PAGE.min(mapped),
                state: RegionState::Committed,
            },
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        // SAFETY: reconstructs the box leaked in `new`.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.object.as_ptr(),
                self.object_len,
            )));
        }
    }
}

/// Byte stored at `position` of a fresh fake object. Never zero.
pub fn pattern(position: usize) -> u8 {
    (position % 251) as u8 + 1
}

// SAFETY: every view points into the object buffer, which outlives the views
// because each view holds an Arc to this backend.
unsafe impl Backend for FakeBackend {
    fn page_size(&self) -> usize {
        PAGE
    }

    fn allocation_granularity(&self) -> u64 {
        GRANULARITY
    }

    fn total_virtual_bytes(&self) -> u64 {
        self.total_virtual
    }

    fn map_view(
        &self,
        _mapping: &MappingHandle<'_>,
        _access: MmapAccess,
        offset: u64,
        size: usize,
    ) -> io::Result<RawView> {
        assert_eq!(offset % GRANULARITY, 0, "native offset must be aligned");
        let offset = offset as usize;
        if offset >= self.object_len || offset + size > self.object_len {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        let available = self.object_len - offset;
        let mapped = if size == 0 {
            available
        } else {
            size.div_ceil(PAGE).saturating_mul(PAGE).min(available)
        };
        let mut state = self.state.lock();
        state.calls.maps.push((offset as u64, size));
        state.committed.insert(offset, false);
        // SAFETY: offset < object_len.
        let base = unsafe { NonNull::new_unchecked(self.object.as_ptr().add(offset)) };
        Ok(RawView::new(base, mapped))
    }

    fn query_region(&self, view: &RawView) -> io::Result<RegionInfo> {
        let key = view.as_ptr() as usize - self.object.as_ptr() as usize;
        let committed = self.state.lock().committed.get(&key).copied().unwrap_or(false);
        if committed && self.mode != CommitMode::StuckShort {
            return Ok(RegionInfo { size: view.len(), state: RegionState::Committed });
        }
        Ok(self.first_query(view.len()))
    }

    fn commit_pages(&self, view: &RawView, size: usize, _access: MmapAccess) -> io::Result<()> {
        if let Some(code) = self.commit_error {
            return Err(io::Error::from_raw_os_error(code));
        }
        assert!(size <= view.len(), "commit beyond the mapped view");
        let key = view.as_ptr() as usize - self.object.as_ptr() as usize;
        let mut state = self.state.lock();
        state.calls.commits.push(size);
        state.committed.insert(key, true);
        Ok(())
    }

    fn flush_region(&self, view: &RawView, offset: usize, len: usize) -> io::Result<()> {
        assert_eq!(offset % PAGE, 0, "flush must start on a page");
        assert!(offset + len <= view.len(), "flush beyond the mapped view");
        let mut state = self.state.lock();
        state.calls.flushes.push((offset, len));
        if let Some(code) = state.flush_always {
            return Err(io::Error::from_raw_os_error(code));
        }
        match state.flush_script.pop_front() {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }

    fn unmap_view(&self, _view: RawView) -> io::Result<()> {
        self.state.lock().calls.unmaps += 1;
        Ok(())
    }
}

/// Handle that only the fake backend sees.
pub fn detached_handle(access: MmapAccess) -> MappingHandle<'static> {
    #[cfg(unix)]
    let raw = -1;
    #[cfg(windows)]
    let raw = std::ptr::null_mut();
    // SAFETY: the fake backend never interprets the raw handle.
    unsafe { MappingHandle::from_raw(raw, access) }
}

/// Retry policy with the default budget but microsecond sleeps.
pub fn fast_retry() -> FlushRetry {
    FlushRetry {
        base_delay: Duration::from_micros(1),
        ..FlushRetry::default()
    }
}

pub fn builder(fake: &Arc<FakeBackend>) -> ViewBuilder {
    ViewBuilder::with_backend(fake.clone()).flush_retry(fast_retry())
}

pub fn lock_violation_code() -> i32 {
    LOCK_VIOLATION
}
