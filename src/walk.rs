//! Heap walk and integrity checking.
//!
//! None of this is needed to allocate; it observes the heap so tests (and
//! curious humans) can verify the block invariants:
//!
//! - every free block's footer equals its header
//! - every block's `prev_alloc` bit matches its predecessor
//! - no two free blocks are adjacent
//! - every free block sits on exactly the list of its size class, and nothing
//!   else does

use std::collections::BTreeSet;

use crate::{
  allocator::Allocator,
  block::{ALIGNMENT, MIN_BLOCK_SIZE, Tag, WSIZE},
  config::ListOrder,
  error::HeapError,
  heap::{BlockMemory, FIRST_BLOCK, START_SENTINEL},
  size_class::{NUM_CLASSES, classify},
  source::HeapSource,
};

/// One block as seen by the heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the heap base.
  pub offset: usize,
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
}

/// Summary of the heap's occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the heap source, sentinels included.
  pub heap_size: usize,
  pub free_bytes: usize,
  pub free_blocks: usize,
  pub allocated_bytes: usize,
  pub allocated_blocks: usize,
  pub largest_free: usize,
}

/// Iterator over every block between the two sentinels, in address order.
pub struct Blocks<'a> {
  mem: &'a [u8],
  hdr: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.hdr + WSIZE > self.mem.len() {
      return None;
    }
    let tag = self.mem.tag(self.hdr);
    if tag.is_sentinel() {
      return None;
    }
    let info = BlockInfo {
      offset: self.hdr,
      size: tag.size,
      allocated: tag.alloc,
      prev_allocated: tag.prev_alloc,
    };
    self.hdr += tag.size;
    Some(info)
  }
}

impl<S: HeapSource> Allocator<S> {
  /// Walks the heap from the start sentinel to the end sentinel.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      mem: self.source.memory(),
      hdr: FIRST_BLOCK,
    }
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(
      HeapStats {
        heap_size: self.source.len(),
        ..HeapStats::default()
      },
      |mut stats, block| {
        if block.allocated {
          stats.allocated_bytes += block.size;
          stats.allocated_blocks += 1;
        } else {
          stats.free_bytes += block.size;
          stats.free_blocks += 1;
          stats.largest_free = stats.largest_free.max(block.size);
        }
        stats
      },
    )
  }

  /// Verifies every block and free-list invariant, reporting the first
  /// violation found.
  pub fn check(&self) -> Result<(), HeapError> {
    let mem = self.source.memory();
    if mem.len() < 2 * WSIZE || mem.tag(START_SENTINEL) != Tag::sentinel(true) {
      return Err(HeapError::BadStartSentinel);
    }

    let free = check_blocks(mem)?;
    self.check_lists(mem, &free)
  }

  fn check_lists(
    &self,
    mem: &[u8],
    free: &BTreeSet<usize>,
  ) -> Result<(), HeapError> {
    let mut listed = BTreeSet::new();
    for class in 0..NUM_CLASSES {
      let mut prev = None;
      for hdr in self.lists.iter(mem, class) {
        if !free.contains(&hdr) || classify(mem.tag(hdr).size) != class || !listed.insert(hdr) {
          return Err(HeapError::Misfiled { class, offset: hdr });
        }
        if mem.links(hdr).prev != prev {
          return Err(HeapError::BrokenLink { class, offset: hdr });
        }
        if self.lists.order() == ListOrder::AddressOrdered && prev.is_some_and(|prev| prev > hdr) {
          return Err(HeapError::OutOfOrder { class, offset: hdr });
        }
        prev = Some(hdr);
      }
    }

    match free.difference(&listed).next() {
      Some(&offset) => Err(HeapError::NotListed { offset }),
      None => Ok(()),
    }
  }
}

/// Walks the blocks checking the per-block invariants; returns the offsets of
/// the free blocks.
fn check_blocks(mem: &[u8]) -> Result<BTreeSet<usize>, HeapError> {
  let end = mem.len() - WSIZE;
  let mut free = BTreeSet::new();
  let mut prev: Option<(usize, Tag)> = None;
  let mut hdr = FIRST_BLOCK;

  loop {
    let tag = mem.tag(hdr);
    let expected_prev_alloc = prev.is_none_or(|(_, prev)| prev.alloc);

    if tag.is_sentinel() {
      if hdr != end || !tag.alloc {
        return Err(HeapError::BadEndSentinel { offset: hdr });
      }
      if tag.prev_alloc != expected_prev_alloc {
        return Err(HeapError::StalePrevAlloc { offset: hdr });
      }
      return Ok(free);
    }

    if tag.size < MIN_BLOCK_SIZE || tag.size % ALIGNMENT != 0 {
      return Err(HeapError::BadSize {
        offset: hdr,
        size: tag.size,
      });
    }
    if hdr + tag.size > end {
      return Err(HeapError::Overrun { offset: hdr });
    }
    if tag.prev_alloc != expected_prev_alloc {
      return Err(HeapError::StalePrevAlloc { offset: hdr });
    }
    if !tag.alloc {
      if mem.word(mem.footer(hdr)) != mem.word(hdr) {
        return Err(HeapError::FooterMismatch { offset: hdr });
      }
      if let Some((first, _)) = prev.filter(|(_, prev)| !prev.alloc) {
        return Err(HeapError::UncoalescedNeighbors { first, second: hdr });
      }
      free.insert(hdr);
    }

    prev = Some((hdr, tag));
    hdr += tag.size;
  }
}
