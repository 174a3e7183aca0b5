//! Word-level view of the heap bytes.
//!
//! Blocks are named by the byte offset of their header from the heap base, so a
//! block keeps its name when the heap grows. Everything here is plain slice
//! indexing: an out-of-range offset is a broken invariant and panics.
//!
//! ```text
//!   offset 0     4                                                  brk-4
//!   ┌──────┬───────────────────┬──────────────────────────────┬──────┐
//!   │ 0/A  │ hdr │ payload ... │ hdr │ prev │ next │ ... │ ftr │ 0/A  │
//!   └──────┴───────────────────┴──────────────────────────────┴──────┘
//!   start      allocated block          free block               end
//!   sentinel                                                     sentinel
//! ```

use crate::block::{MAX_BLOCK_SIZE, Tag, WSIZE};

/// Offset of the start sentinel's header.
pub const START_SENTINEL: usize = 0;

/// Offset of the first real block's header.
pub const FIRST_BLOCK: usize = WSIZE;

/// Upper bound on the heap size, so every offset and block size fits a word.
pub const MAX_HEAP_SIZE: usize = MAX_BLOCK_SIZE;

/// Free-list neighbors of a free block, stored in its first two payload words.
///
/// Offset 0 is the start sentinel, which is never free, so it encodes "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Links {
  pub prev: Option<usize>,
  pub next: Option<usize>,
}

fn encode_link(link: Option<usize>) -> u32 {
  link.map_or(0, |offset| offset as u32)
}

fn decode_link(word: u32) -> Option<usize> {
  (word != 0).then_some(word as usize)
}

/// Block navigation over the raw heap bytes.
pub trait BlockMemory {
  fn word(
    &self,
    at: usize,
  ) -> u32;

  fn set_word(
    &mut self,
    at: usize,
    word: u32,
  );

  fn tag(
    &self,
    hdr: usize,
  ) -> Tag {
    Tag::unpack(self.word(hdr))
  }

  fn set_tag(
    &mut self,
    hdr: usize,
    tag: Tag,
  ) {
    self.set_word(hdr, tag.pack());
  }

  /// Offset of the last word of the block, where a free block keeps its footer.
  fn footer(
    &self,
    hdr: usize,
  ) -> usize {
    hdr + self.tag(hdr).size - WSIZE
  }

  /// Writes a free block's header and its matching footer.
  fn write_free(
    &mut self,
    hdr: usize,
    size: usize,
    prev_alloc: bool,
  ) {
    let word = Tag::free(size, prev_alloc).pack();
    self.set_word(hdr, word);
    self.set_word(self.footer(hdr), word);
  }

  /// Physically following block (the end sentinel maps to itself).
  fn next_block(
    &self,
    hdr: usize,
  ) -> usize {
    hdr + self.tag(hdr).size
  }

  /// Physically preceding block, found through its footer.
  ///
  /// Only meaningful when the predecessor is free.
  fn prev_block(
    &self,
    hdr: usize,
  ) -> usize {
    debug_assert!(!self.tag(hdr).prev_alloc, "predecessor of {hdr:#x} has no footer");
    hdr - Tag::unpack(self.word(hdr - WSIZE)).size
  }

  /// Updates the `prev_alloc` bit, keeping a free block's footer in step.
  fn set_prev_alloc(
    &mut self,
    hdr: usize,
    prev_alloc: bool,
  ) {
    let tag = Tag {
      prev_alloc,
      ..self.tag(hdr)
    };
    self.set_tag(hdr, tag);
    if !tag.alloc {
      self.set_tag(self.footer(hdr), tag);
    }
  }

  fn links(
    &self,
    hdr: usize,
  ) -> Links {
    Links {
      prev: decode_link(self.word(hdr + WSIZE)),
      next: decode_link(self.word(hdr + 2 * WSIZE)),
    }
  }

  fn set_prev_free(
    &mut self,
    hdr: usize,
    prev: Option<usize>,
  ) {
    self.set_word(hdr + WSIZE, encode_link(prev));
  }

  fn set_next_free(
    &mut self,
    hdr: usize,
    next: Option<usize>,
  ) {
    self.set_word(hdr + 2 * WSIZE, encode_link(next));
  }
}

impl BlockMemory for [u8] {
  fn word(
    &self,
    at: usize,
  ) -> u32 {
    let mut bytes = [0; WSIZE];
    bytes.copy_from_slice(&self[at..at + WSIZE]);
    u32::from_ne_bytes(bytes)
  }

  fn set_word(
    &mut self,
    at: usize,
    word: u32,
  ) {
    self[at..at + WSIZE].copy_from_slice(&word.to_ne_bytes());
  }
}

/// Payload offset of the block whose header is at `hdr`.
pub fn payload_of(hdr: usize) -> usize {
  hdr + WSIZE
}

/// Header offset of the block whose payload starts at `payload`.
pub fn header_of(payload: usize) -> usize {
  payload - WSIZE
}
