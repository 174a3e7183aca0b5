//! Power-of-two size classes.
//!
//! Class `k` holds blocks whose size lies in `[16 << k, 16 << (k + 1))`. The last
//! class starts at 2^31 and runs up to the largest representable block size.

use crate::block::MIN_BLOCK_SIZE;

/// Number of size classes (and of free lists).
pub const NUM_CLASSES: usize = 28;

/// Lower bound of every class, monotonically increasing.
pub const CLASS_BOUNDS: [usize; NUM_CLASSES] = {
  let mut bounds = [0; NUM_CLASSES];
  let mut i = 0;
  while i < NUM_CLASSES {
    bounds[i] = MIN_BLOCK_SIZE << i;
    i += 1;
  }
  bounds
};

/// Index of the class whose lower bound is the greatest bound `<= size`.
///
/// Binary search over [`CLASS_BOUNDS`]. `size` must be at least the smallest
/// bound; every block is, so a smaller value means a corrupted header.
pub fn classify(size: usize) -> usize {
  debug_assert!(
    size >= CLASS_BOUNDS[0],
    "size {size} is below the smallest size class"
  );

  // first bound strictly greater than `size`, then step back one
  let (mut low, mut high) = (0, NUM_CLASSES);
  while low < high {
    let mid = (low + high) / 2;
    if size < CLASS_BOUNDS[mid] {
      high = mid;
    } else {
      low = mid + 1;
    }
  }
  low.saturating_sub(1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::MAX_BLOCK_SIZE;

  #[test]
  fn bounds_span_16_to_2_pow_31() {
    assert_eq!(CLASS_BOUNDS[0], 16);
    assert_eq!(CLASS_BOUNDS[NUM_CLASSES - 1], 1 << 31);
  }

  #[test]
  fn bounds_are_monotonic() {
    for i in 1..NUM_CLASSES {
      assert!(
        CLASS_BOUNDS[i] > CLASS_BOUNDS[i - 1],
        "class {} ({}) must be > class {} ({})",
        i,
        CLASS_BOUNDS[i],
        i - 1,
        CLASS_BOUNDS[i - 1]
      );
    }
  }

  #[test]
  fn class_boundary_31_32() {
    assert_eq!(classify(31), 0);
    assert_eq!(classify(32), 1);
    assert_eq!(classify(32), classify(31) + 1);
  }

  #[test]
  fn exact_bounds_map_to_their_own_class() {
    for (i, &bound) in CLASS_BOUNDS.iter().enumerate() {
      assert_eq!(classify(bound), i);
      if i > 0 {
        assert_eq!(classify(bound - 8), i - 1);
      }
    }
  }

  #[test]
  fn largest_sizes_land_in_last_class() {
    assert_eq!(classify(MAX_BLOCK_SIZE), NUM_CLASSES - 1);
    assert_eq!(classify((1 << 31) + 8), NUM_CLASSES - 1);
  }
}
