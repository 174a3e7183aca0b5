//! Boundary-tag coalescing.
//!
//! ```text
//!   case 1: [A][B][A]  ->  [A][B][A]       nothing to merge
//!   case 2: [F][B][A]  ->  [F  +  B][A]    predecessor absorbs B
//!   case 3: [A][B][F]  ->  [A][B  +  F]    B absorbs successor
//!   case 4: [F][B][F]  ->  [F + B + F]     predecessor absorbs both
//! ```
//!
//! The predecessor is found through its footer, which only free blocks carry;
//! the `prev_alloc` bit in `B`'s own header says whether that footer exists.

use log::trace;

use crate::{free_list::FreeLists, heap::BlockMemory};

/// Merges the free block at `hdr` with its free physical neighbors.
///
/// `hdr` must already be marked free (header and footer) and must not be on a
/// free list. Absorbed neighbors are taken off their lists. Returns the header
/// offset of the merged block, which the caller has to insert.
pub fn coalesce(
  mem: &mut [u8],
  lists: &mut FreeLists,
  hdr: usize,
) -> usize {
  let tag = mem.tag(hdr);
  debug_assert!(!tag.alloc, "coalescing allocated block {hdr:#x}");

  let next = hdr + tag.size;
  let next_tag = mem.tag(next);

  match (tag.prev_alloc, next_tag.alloc) {
    (true, true) => hdr,
    (false, true) => {
      let prev = mem.prev_block(hdr);
      let prev_tag = mem.tag(prev);
      lists.remove(mem, prev);
      mem.write_free(prev, prev_tag.size + tag.size, prev_tag.prev_alloc);
      trace!("coalesce {prev:#x} <- {hdr:#x}");
      prev
    }
    (true, false) => {
      lists.remove(mem, next);
      mem.write_free(hdr, tag.size + next_tag.size, tag.prev_alloc);
      trace!("coalesce {hdr:#x} <- {next:#x}");
      hdr
    }
    (false, false) => {
      let prev = mem.prev_block(hdr);
      let prev_tag = mem.tag(prev);
      lists.remove(mem, prev);
      lists.remove(mem, next);
      mem.write_free(
        prev,
        prev_tag.size + tag.size + next_tag.size,
        prev_tag.prev_alloc,
      );
      trace!("coalesce {prev:#x} <- {hdr:#x} <- {next:#x}");
      prev
    }
  }
}
