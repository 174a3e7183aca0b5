//! Heap-growth primitives.
//!
//! The allocator never owns memory directly: it asks a [`HeapSource`] for more
//! bytes at the current end of the heap, the way a C allocator calls `sbrk(2)`.
//!
//! ```text
//!   base                                   brk           limit
//!   ┌──────────────────────────────────────┬─────────────┐
//!   │   memory() / memory_mut()             │  grow(n) →  │
//!   └──────────────────────────────────────┴─────────────┘
//! ```
//!
//! Two sources ship with the crate:
//!
//! - [`MmapHeap`]: a bounded region reserved up front with `mmap(2)`. Pages are
//!   zeroed and page-aligned, and growth past the reservation fails cleanly.
//! - [`SbrkHeap`]: moves the real program break.

use std::{io, ptr::NonNull, slice};

use libc::{
  MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, intptr_t,
  mmap, munmap, sbrk,
};
use log::{debug, warn};

use crate::error::GrowError;

/// Alignment of the first byte of an [`SbrkHeap`].
const BASE_ALIGNMENT: usize = 16;

/// Default reservation of an [`MmapHeap`]: 20 MiB.
pub const DEFAULT_HEAP_LIMIT: usize = 20 * (1 << 20);

/// A linear, grow-only region of memory.
///
/// # Contract
///
/// - `grow(n)` either hands back exactly `n` new bytes directly after the previous
///   end, or fails and leaves the heap untouched.
/// - `memory()` covers every byte granted and not given back, starting at the
///   heap base. The base never moves while the heap is non-empty.
pub trait HeapSource {
  /// Extends the heap by `increment` bytes, returning the start of the new region.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError>;

  /// Bytes granted so far.
  fn memory(&self) -> &[u8];

  fn memory_mut(&mut self) -> &mut [u8];

  /// Gives back every byte past `len`.
  fn truncate(
    &mut self,
    len: usize,
  ) -> Result<(), GrowError>;

  /// Gives back every granted byte, so the heap can be laid out afresh.
  fn reset(&mut self) -> Result<(), GrowError> {
    self.truncate(0)
  }

  /// Current heap size in bytes.
  fn len(&self) -> usize {
    self.memory().len()
  }

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A heap carved out of a fixed `mmap(2)` reservation.
///
/// The whole reservation is mapped `MAP_NORESERVE`, so untouched pages cost
/// nothing; `grow` just moves the break inside it.
pub struct MmapHeap {
  base: NonNull<u8>,
  brk: usize,
  limit: usize,
}

impl MmapHeap {
  /// Reserves a heap of at most `limit` bytes (rounded up to whole pages).
  pub fn with_limit(limit: usize) -> Result<Self, GrowError> {
    let limit = crate::align_to!(limit.max(1), page_size());
    // SAFETY: anonymous private mapping at a kernel-chosen address; no existing
    // memory is affected.
    let ptr = unsafe {
      mmap(
        std::ptr::null_mut(),
        limit,
        PROT_READ | PROT_WRITE,
        MAP_NORESERVE | MAP_ANONYMOUS | MAP_PRIVATE,
        -1,
        0,
      )
    };
    if ptr == MAP_FAILED {
      return Err(GrowError::Os(io::Error::last_os_error()));
    }
    let base = NonNull::new(ptr as *mut u8).ok_or(GrowError::Discontiguous)?;
    debug!("reserved {limit} byte heap at {base:?}");
    Ok(Self {
      base,
      brk: 0,
      limit,
    })
  }

  /// Reserves [`DEFAULT_HEAP_LIMIT`] bytes.
  pub fn new() -> Result<Self, GrowError> {
    Self::with_limit(DEFAULT_HEAP_LIMIT)
  }

  /// Upper bound the heap can grow to.
  pub fn limit(&self) -> usize {
    self.limit
  }
}

impl HeapSource for MmapHeap {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let available = self.limit - self.brk;
    if increment > available {
      warn!("heap exhausted: requested {increment}, {available} available");
      return Err(GrowError::Exhausted {
        requested: increment,
        available,
      });
    }
    // SAFETY: `brk <= limit`, so the result stays inside the reservation.
    let region = unsafe { self.base.add(self.brk) };
    self.brk += increment;
    Ok(region)
  }

  fn memory(&self) -> &[u8] {
    // SAFETY: `[base, base + brk)` is mapped read/write for as long as `self`
    // lives and is only reachable through `self`.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.brk) }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    // SAFETY: as in `memory`, and `&mut self` makes the borrow unique.
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
  }

  fn truncate(
    &mut self,
    len: usize,
  ) -> Result<(), GrowError> {
    let len = len.min(self.brk);
    self.memory_mut()[len..].fill(0);
    self.brk = len;
    Ok(())
  }
}

impl Drop for MmapHeap {
  fn drop(&mut self) {
    // SAFETY: unmaps exactly the reservation made in `with_limit`; no slice
    // into it can outlive `self`.
    unsafe {
      munmap(self.base.as_ptr() as *mut c_void, self.limit);
    }
  }
}

/// A heap that moves the process's program break with `sbrk(2)`.
///
/// Growth fails with [`GrowError::Discontiguous`] if something else moved the
/// break since the last call, since the new bytes would not extend this heap.
pub struct SbrkHeap {
  base: Option<NonNull<u8>>,
  len: usize,
}

impl SbrkHeap {
  pub const fn new() -> Self {
    Self { base: None, len: 0 }
  }

  fn program_break() -> *mut u8 {
    // SAFETY: `sbrk(0)` only queries the current break.
    unsafe { sbrk(0) as *mut u8 }
  }
}

impl Default for SbrkHeap {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapSource for SbrkHeap {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let delta = intptr_t::try_from(increment).map_err(|_| GrowError::Exhausted {
      requested: increment,
      available: intptr_t::MAX as usize,
    })?;

    let expected = match self.base {
      Some(base) => {
        // SAFETY: one-past-the-end of the region we own.
        let end = unsafe { base.as_ptr().add(self.len) };
        if Self::program_break() != end {
          warn!("program break moved under the heap");
          return Err(GrowError::Discontiguous);
        }
        Some(end)
      }
      None => {
        // the heap base must be aligned for payloads to be
        let brk = Self::program_break() as usize;
        let pad = crate::align_to!(brk, BASE_ALIGNMENT) - brk;
        // SAFETY: as below; the padding bytes are simply never used.
        if pad > 0 && unsafe { sbrk(pad as intptr_t) } == usize::MAX as *mut c_void {
          return Err(GrowError::Os(io::Error::last_os_error()));
        }
        None
      }
    };

    // SAFETY: grows the data segment; nothing else in this process is assumed
    // to own the bytes past the current break.
    let address = unsafe { sbrk(delta) };
    if address == usize::MAX as *mut c_void {
      return Err(GrowError::Os(io::Error::last_os_error()));
    }
    let address = address as *mut u8;
    let misplaced = match expected {
      Some(end) => address != end,
      None => address as usize % BASE_ALIGNMENT != 0,
    };
    if misplaced {
      warn!("program break moved while growing the heap");
      // SAFETY: gives back exactly the bytes this call just obtained.
      unsafe { sbrk(-delta) };
      return Err(GrowError::Discontiguous);
    }
    let region = NonNull::new(address).ok_or(GrowError::Discontiguous)?;

    if self.base.is_none() {
      self.base = Some(region);
    }
    self.len += increment;
    Ok(region)
  }

  fn memory(&self) -> &[u8] {
    match self.base {
      // SAFETY: `[base, base + len)` was granted by `sbrk` and is never given back
      // while `self` is alive, except through `truncate(&mut self)`.
      Some(base) => unsafe { slice::from_raw_parts(base.as_ptr(), self.len) },
      None => &[],
    }
  }

  fn memory_mut(&mut self) -> &mut [u8] {
    match self.base {
      // SAFETY: as in `memory`, and `&mut self` makes the borrow unique.
      Some(base) => unsafe { slice::from_raw_parts_mut(base.as_ptr(), self.len) },
      None => &mut [],
    }
  }

  fn truncate(
    &mut self,
    len: usize,
  ) -> Result<(), GrowError> {
    let Some(base) = self.base else {
      return Ok(());
    };
    if len >= self.len {
      return Ok(());
    }
    // SAFETY: one-past-the-end of the region we own.
    let end = unsafe { base.as_ptr().add(self.len) };
    if Self::program_break() != end {
      return Err(GrowError::Discontiguous);
    }
    let delta = -((self.len - len) as intptr_t);
    // SAFETY: we are the topmost user of the break, so shrinking releases only
    // our own bytes.
    let address = unsafe { sbrk(delta) };
    if address == usize::MAX as *mut c_void {
      return Err(GrowError::Os(io::Error::last_os_error()));
    }
    self.len = len;
    if len == 0 {
      self.base = None;
    }
    Ok(())
  }
}

fn page_size() -> usize {
  // SAFETY: `sysconf` has no preconditions.
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  usize::try_from(size).ok().filter(|s| s.is_power_of_two()).unwrap_or(4096)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mmap_heap_grows_contiguously() {
    let mut heap = MmapHeap::with_limit(64 * 1024).unwrap();
    assert!(heap.is_empty());

    let first = heap.grow(8).unwrap();
    let second = heap.grow(4096).unwrap();
    assert_eq!(unsafe { first.add(8) }, second);
    assert_eq!(heap.len(), 4104);
    assert!(heap.memory().iter().all(|&b| b == 0));
  }

  #[test]
  fn mmap_heap_is_page_aligned() {
    let mut heap = MmapHeap::with_limit(1).unwrap();
    let region = heap.grow(16).unwrap();
    assert_eq!(region.as_ptr() as usize % page_size(), 0);
    assert_eq!(heap.limit(), page_size());
  }

  #[test]
  fn mmap_heap_refuses_to_overgrow() {
    let mut heap = MmapHeap::with_limit(4096).unwrap();
    let granted = heap.limit() - 96;
    heap.grow(granted).unwrap();
    let err = heap.grow(200).unwrap_err();
    assert!(matches!(
      err,
      GrowError::Exhausted {
        requested: 200,
        available: 96
      }
    ));
    assert_eq!(heap.len(), granted);
  }

  #[test]
  fn mmap_heap_reset_zeroes_and_rewinds() {
    let mut heap = MmapHeap::with_limit(4096).unwrap();
    heap.grow(64).unwrap();
    heap.memory_mut()[10] = 0xAB;
    heap.reset().unwrap();
    assert!(heap.is_empty());
    heap.grow(64).unwrap();
    assert_eq!(heap.memory()[10], 0);
  }

  #[test]
  fn mmap_heap_truncate_gives_back_the_tail() {
    let mut heap = MmapHeap::with_limit(4096).unwrap();
    heap.grow(64).unwrap();
    heap.memory_mut()[40] = 0xAB;
    heap.truncate(32).unwrap();
    assert_eq!(heap.len(), 32);

    let region = heap.grow(32).unwrap();
    assert_eq!(region.as_ptr() as usize, heap.memory().as_ptr() as usize + 32);
    assert_eq!(heap.memory()[40], 0);
    heap.truncate(1000).unwrap();
    assert_eq!(heap.len(), 64);
  }

  #[test]
  fn sbrk_heap_starts_empty() {
    let heap = SbrkHeap::new();
    assert!(heap.is_empty());
    assert!(heap.memory().is_empty());
  }
}
