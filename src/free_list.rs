//! Segregated free lists.
//!
//! One doubly-linked list per size class, threaded through the free blocks
//! themselves:
//!
//! ```text
//!   heads[k] ──► ┌─────┬──────┬──────┬───┬─────┐     ┌─────┬──────┬──────┬───┬─────┐
//!                │ hdr │ prev │ next ├───┼─────┼────►│ hdr │ prev │ next │...│ ftr │
//!                └─────┴──────┴──────┴───┴─────┘     └─────┴──┬───┴──────┴───┴─────┘
//!                   ▲                                         │
//!                   └─────────────────────────────────────────┘
//! ```
//!
//! A block's class is never stored: it is recomputed from the block's size on
//! both insertion and removal, so a block must be removed before its size
//! changes.

use log::trace;

use crate::{
  config::{FitPolicy, ListOrder},
  heap::BlockMemory,
  size_class::{NUM_CLASSES, classify},
};

pub struct FreeLists {
  heads: [Option<usize>; NUM_CLASSES],
  order: ListOrder,
}

impl FreeLists {
  pub fn new(order: ListOrder) -> Self {
    Self {
      heads: [None; NUM_CLASSES],
      order,
    }
  }

  /// Forgets every list.
  pub fn clear(&mut self) {
    self.heads = [None; NUM_CLASSES];
  }

  pub fn order(&self) -> ListOrder {
    self.order
  }

  pub fn head(
    &self,
    class: usize,
  ) -> Option<usize> {
    self.heads[class]
  }

  /// Adds the free block at `hdr` to the list of its size class.
  pub fn insert(
    &mut self,
    mem: &mut [u8],
    hdr: usize,
  ) {
    let tag = mem.tag(hdr);
    debug_assert!(!tag.alloc, "inserting allocated block {hdr:#x}");
    let class = classify(tag.size);

    let (prev, next) = match self.order {
      ListOrder::Lifo => (None, self.heads[class]),
      ListOrder::AddressOrdered => {
        let mut prev = None;
        let mut cursor = self.heads[class];
        while let Some(node) = cursor {
          if node > hdr {
            break;
          }
          debug_assert_ne!(node, hdr, "block {hdr:#x} is already listed");
          prev = Some(node);
          cursor = mem.links(node).next;
        }
        (prev, cursor)
      }
    };

    mem.set_prev_free(hdr, prev);
    mem.set_next_free(hdr, next);
    match prev {
      Some(prev) => mem.set_next_free(prev, Some(hdr)),
      None => self.heads[class] = Some(hdr),
    }
    if let Some(next) = next {
      mem.set_prev_free(next, Some(hdr));
    }
    trace!("insert {hdr:#x} size {} into class {class}", tag.size);
  }

  /// Detaches the free block at `hdr` from whichever list holds it.
  pub fn remove(
    &mut self,
    mem: &mut [u8],
    hdr: usize,
  ) {
    let class = classify(mem.tag(hdr).size);
    let links = mem.links(hdr);

    match links.prev {
      Some(prev) => mem.set_next_free(prev, links.next),
      None => {
        debug_assert_eq!(self.heads[class], Some(hdr), "block {hdr:#x} is not listed");
        self.heads[class] = links.next;
      }
    }
    if let Some(next) = links.next {
      mem.set_prev_free(next, links.prev);
    }
    mem.set_prev_free(hdr, None);
    mem.set_next_free(hdr, None);
    trace!("remove {hdr:#x} from class {class}");
  }

  /// Walks the list of `class` from its head.
  pub fn iter<'a>(
    &self,
    mem: &'a [u8],
    class: usize,
  ) -> ListIter<'a> {
    ListIter {
      mem,
      cursor: self.head(class),
    }
  }

  /// Finds a free block of at least `required` bytes without detaching it.
  ///
  /// Only the lists from the class of `required` upward are searched.
  pub fn find_fit(
    &self,
    mem: &[u8],
    required: usize,
    policy: FitPolicy,
  ) -> Option<usize> {
    let fits = |hdr: &usize| mem.tag(*hdr).size >= required;
    (classify(required)..NUM_CLASSES).find_map(|class| {
      let mut candidates = self.iter(mem, class).filter(fits);
      match policy {
        FitPolicy::FirstFit => candidates.next(),
        FitPolicy::BestFit => candidates.min_by_key(|&hdr| mem.tag(hdr).size),
      }
    })
  }
}

/// Iterator over the block offsets of one class list.
pub struct ListIter<'a> {
  mem: &'a [u8],
  cursor: Option<usize>,
}

impl Iterator for ListIter<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.cursor?;
    self.cursor = self.mem.links(current).next;
    Some(current)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// A 256-byte scratch heap with free blocks written at the given offsets.
  fn scratch(blocks: &[(usize, usize)]) -> Vec<u8> {
    let mut mem = vec![0u8; 256];
    for &(hdr, size) in blocks {
      mem.write_free(hdr, size, true);
    }
    mem
  }

  fn listed(
    lists: &FreeLists,
    mem: &[u8],
    class: usize,
  ) -> Vec<usize> {
    lists.iter(mem, class).collect()
  }

  #[test]
  fn insert_into_empty_list() {
    let mut mem = scratch(&[(4, 16)]);
    let mut lists = FreeLists::new(ListOrder::AddressOrdered);
    lists.insert(&mut mem, 4);
    assert_eq!(lists.head(0), Some(4));
    assert_eq!(mem.links(4).prev, None);
    assert_eq!(mem.links(4).next, None);
  }

  #[test]
  fn address_order_sorts_within_class() {
    let mut mem = scratch(&[(4, 16), (40, 16), (100, 24)]);
    let mut lists = FreeLists::new(ListOrder::AddressOrdered);
    lists.insert(&mut mem, 100);
    lists.insert(&mut mem, 4);
    lists.insert(&mut mem, 40);
    assert_eq!(listed(&lists, &mem, 0), vec![4, 40, 100]);
    assert_eq!(mem.links(40).prev, Some(4));
    assert_eq!(mem.links(100).prev, Some(40));
  }

  #[test]
  fn lifo_pushes_at_head() {
    let mut mem = scratch(&[(4, 16), (40, 16), (100, 24)]);
    let mut lists = FreeLists::new(ListOrder::Lifo);
    lists.insert(&mut mem, 40);
    lists.insert(&mut mem, 4);
    lists.insert(&mut mem, 100);
    assert_eq!(listed(&lists, &mem, 0), vec![100, 4, 40]);
  }

  #[test]
  fn classes_are_separate() {
    let mut mem = scratch(&[(4, 16), (40, 32), (100, 64)]);
    let mut lists = FreeLists::new(ListOrder::AddressOrdered);
    for hdr in [4, 40, 100] {
      lists.insert(&mut mem, hdr);
    }
    assert_eq!(listed(&lists, &mem, 0), vec![4]);
    assert_eq!(listed(&lists, &mem, 1), vec![40]);
    assert_eq!(listed(&lists, &mem, 2), vec![100]);
  }

  #[test]
  fn remove_head_middle_tail_and_last() {
    let mut mem = scratch(&[(4, 16), (40, 16), (100, 16), (140, 16)]);
    let mut lists = FreeLists::new(ListOrder::AddressOrdered);
    for hdr in [4, 40, 100, 140] {
      lists.insert(&mut mem, hdr);
    }

    lists.remove(&mut mem, 40);
    assert_eq!(listed(&lists, &mem, 0), vec![4, 100, 140]);
    assert_eq!(mem.links(100).prev, Some(4));

    lists.remove(&mut mem, 4);
    assert_eq!(listed(&lists, &mem, 0), vec![100, 140]);
    assert_eq!(mem.links(100).prev, None);

    lists.remove(&mut mem, 140);
    assert_eq!(listed(&lists, &mem, 0), vec![100]);
    assert_eq!(mem.links(100).next, None);

    lists.remove(&mut mem, 100);
    assert_eq!(lists.head(0), None);
  }

  #[test]
  fn first_fit_takes_list_order() {
    let mut mem = scratch(&[(4, 24), (40, 16), (100, 24)]);
    let mut lists = FreeLists::new(ListOrder::AddressOrdered);
    for hdr in [4, 40, 100] {
      lists.insert(&mut mem, hdr);
    }
    assert_eq!(lists.find_fit(&mem, 24, FitPolicy::FirstFit), Some(4));
    assert_eq!(lists.find_fit(&mem, 16, FitPolicy::FirstFit), Some(4));
  }

  #[test]
  fn best_fit_takes_smallest_then_list_order() {
    let mut mem = scratch(&[(4, 24), (40, 16), (100, 24)]);
    let mut lists = FreeLists::new(ListOrder::AddressOrdered);
    for hdr in [4, 40, 100] {
      lists.insert(&mut mem, hdr);
    }
    assert_eq!(lists.find_fit(&mem, 16, FitPolicy::BestFit), Some(40));
    assert_eq!(lists.find_fit(&mem, 24, FitPolicy::BestFit), Some(4));
  }

  #[test]
  fn fit_moves_to_higher_classes() {
    let mut mem = scratch(&[(4, 16), (40, 64)]);
    let mut lists = FreeLists::new(ListOrder::Lifo);
    lists.insert(&mut mem, 4);
    lists.insert(&mut mem, 40);
    assert_eq!(lists.find_fit(&mem, 24, FitPolicy::FirstFit), Some(40));
    assert_eq!(lists.find_fit(&mem, 24, FitPolicy::BestFit), Some(40));
    assert_eq!(lists.find_fit(&mem, 72, FitPolicy::FirstFit), None);
  }
}
