//! Heap extension.
//!
//! ```text
//!   before:  ... [ last block ][end]
//!                               ▲ old break - WSIZE
//!   after:   ... [ last block ][        new free block        ][end]
//!                               ▲ header overwrites the old end sentinel
//! ```
//!
//! The new block takes over the old end sentinel's word as its header, so the
//! sentinel's `prev_alloc` bit carries over and a free last block is merged
//! straight away.

use log::{debug, warn};

use crate::{
  block::{Tag, WSIZE},
  coalesce::coalesce,
  error::{AllocError, GrowError},
  free_list::FreeLists,
  heap::{BlockMemory, MAX_HEAP_SIZE},
  source::HeapSource,
};

/// Grows the heap by at least `min_bytes`, in whole multiples of `chunk`.
///
/// Returns the header offset of the resulting free block, already coalesced and
/// on its free list. On failure the heap and the lists are untouched.
pub fn extend<S: HeapSource>(
  source: &mut S,
  lists: &mut FreeLists,
  min_bytes: usize,
  chunk: usize,
) -> Result<usize, AllocError> {
  let old_len = source.len();
  debug_assert!(old_len >= 2 * WSIZE, "heap has no sentinels");
  let available = MAX_HEAP_SIZE.saturating_sub(old_len);

  let bytes = min_bytes
    .div_ceil(chunk)
    .max(1)
    .checked_mul(chunk)
    .filter(|&bytes| bytes <= available)
    .ok_or(GrowError::Exhausted {
      requested: min_bytes,
      available,
    })?;

  let region = source.grow(bytes)?;
  if region.as_ptr() as usize != source.memory().as_ptr() as usize + old_len {
    warn!("heap source skipped bytes; giving back {} bytes", source.len() - old_len);
    source.truncate(old_len)?;
    return Err(GrowError::Discontiguous.into());
  }

  let mem = source.memory_mut();
  let hdr = old_len - WSIZE;
  let prev_alloc = mem.tag(hdr).prev_alloc;
  mem.write_free(hdr, bytes, prev_alloc);
  mem.set_tag(hdr + bytes, Tag::sentinel(false));

  let merged = coalesce(mem, lists, hdr);
  lists.insert(mem, merged);
  debug!(
    "extended heap by {bytes} bytes to {}, free block {merged:#x} size {}",
    mem.len(),
    mem.tag(merged).size
  );
  Ok(merged)
}
