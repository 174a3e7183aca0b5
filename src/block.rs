//! Block metadata codec.
//!
//! Every block starts with a one-word header; free blocks carry a byte-identical
//! copy of it (the footer, or boundary tag) in their last word.
//!
//! ```text
//!   Header word (u32):
//!
//!   31                                   3   2   1   0
//!   ┌───────────────────────────────────┬───┬───┬───┐
//!   │          size (multiple of 8)     │ - │ P │ A │
//!   └───────────────────────────────────┴───┴───┴───┘
//!                                             │   └── alloc: block is handed out
//!                                             └────── prev_alloc: predecessor is allocated
//! ```
//!
//! The rest of the crate only ever sees the decoded [`Tag`]; the bit layout lives
//! here and nowhere else.

/// Bytes in one metadata word (header, footer, or free-list link).
pub const WSIZE: usize = 4;

/// Alignment granularity of block sizes and payloads.
pub const ALIGNMENT: usize = 8;

/// Smallest block that can be free: header, two links and a footer.
pub const MIN_BLOCK_SIZE: usize = 4 * WSIZE;

/// Largest size the header's size field can represent.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX & SIZE_MASK) as usize;

const ALLOC_BIT: u32 = 0b001;
const PREV_ALLOC_BIT: u32 = 0b010;
const SIZE_MASK: u32 = !0b111;

/// Packs a size and both status bits into a header word.
///
/// `size` must be a multiple of [`ALIGNMENT`] no larger than [`MAX_BLOCK_SIZE`].
pub fn pack(
  size: usize,
  alloc: bool,
  prev_alloc: bool,
) -> u32 {
  debug_assert!(size <= MAX_BLOCK_SIZE, "block size {size} is not representable");
  debug_assert_eq!(size % ALIGNMENT, 0, "block size {size} is misaligned");

  let mut word = size as u32 & SIZE_MASK;
  if alloc {
    word |= ALLOC_BIT;
  }
  if prev_alloc {
    word |= PREV_ALLOC_BIT;
  }
  word
}

pub fn size_of(word: u32) -> usize {
  (word & SIZE_MASK) as usize
}

pub fn is_alloc(word: u32) -> bool {
  word & ALLOC_BIT != 0
}

pub fn is_prev_alloc(word: u32) -> bool {
  word & PREV_ALLOC_BIT != 0
}

/// Decoded header (or footer) of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
  /// Total block size, metadata and padding included.
  pub size: usize,
  /// The block is currently handed to a client.
  pub alloc: bool,
  /// The physically preceding block is allocated.
  pub prev_alloc: bool,
}

impl Tag {
  pub fn new(
    size: usize,
    alloc: bool,
    prev_alloc: bool,
  ) -> Self {
    Self {
      size,
      alloc,
      prev_alloc,
    }
  }

  /// A free block of `size` bytes.
  pub fn free(
    size: usize,
    prev_alloc: bool,
  ) -> Self {
    Self::new(size, false, prev_alloc)
  }

  /// An allocated block of `size` bytes.
  pub fn used(
    size: usize,
    prev_alloc: bool,
  ) -> Self {
    Self::new(size, true, prev_alloc)
  }

  /// The zero-size, always allocated marker at either end of the heap.
  pub fn sentinel(prev_alloc: bool) -> Self {
    Self::new(0, true, prev_alloc)
  }

  pub fn is_sentinel(self) -> bool {
    self.size == 0
  }

  pub fn pack(self) -> u32 {
    pack(self.size, self.alloc, self.prev_alloc)
  }

  pub fn unpack(word: u32) -> Self {
    Self::new(size_of(word), is_alloc(word), is_prev_alloc(word))
  }
}

/// Block size needed to serve a payload of `payload` bytes.
///
/// One header word of overhead, rounded up to [`ALIGNMENT`] and to at least
/// [`MIN_BLOCK_SIZE`]. `None` when the result is not representable.
pub fn required_size(payload: usize) -> Option<usize> {
  if payload > MAX_BLOCK_SIZE - WSIZE {
    return None;
  }
  Some(crate::align!(payload + WSIZE).max(MIN_BLOCK_SIZE))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pack_places_flags_in_low_bits() {
    assert_eq!(pack(16, false, false), 16);
    assert_eq!(pack(16, true, false), 17);
    assert_eq!(pack(16, false, true), 18);
    assert_eq!(pack(4096, true, true), 4099);
  }

  #[test]
  fn unpack_reverses_pack() {
    let word = pack(48, true, false);
    assert_eq!(size_of(word), 48);
    assert!(is_alloc(word));
    assert!(!is_prev_alloc(word));
    assert_eq!(Tag::unpack(word), Tag::used(48, false));
  }

  #[test]
  fn max_block_size_fits_the_size_field() {
    let word = pack(MAX_BLOCK_SIZE, true, true);
    assert_eq!(size_of(word), MAX_BLOCK_SIZE);
    assert_eq!(MAX_BLOCK_SIZE % ALIGNMENT, 0);
  }

  #[test]
  fn sentinel_is_zero_sized_and_allocated() {
    let tag = Tag::unpack(Tag::sentinel(false).pack());
    assert!(tag.is_sentinel());
    assert!(tag.alloc);
    assert!(!tag.prev_alloc);
  }

  #[test]
  fn required_size_rounds_and_clamps() {
    assert_eq!(required_size(1), Some(MIN_BLOCK_SIZE));
    assert_eq!(required_size(12), Some(16));
    assert_eq!(required_size(13), Some(24));
    assert_eq!(required_size(20), Some(24));
    assert_eq!(required_size(21), Some(32));
  }

  #[test]
  fn required_size_rejects_unrepresentable() {
    assert_eq!(required_size(MAX_BLOCK_SIZE - WSIZE), Some(MAX_BLOCK_SIZE));
    assert_eq!(required_size(MAX_BLOCK_SIZE - WSIZE + 1), None);
    assert_eq!(required_size(MAX_BLOCK_SIZE), None);
    assert_eq!(required_size(usize::MAX), None);
  }
}
