//! Error taxonomy.

use thiserror::Error;

/// Failure of a heap-growth primitive. All-or-nothing: the heap is unchanged.
#[derive(Debug, Error)]
pub enum GrowError {
  #[error("heap exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("heap growth returned a region that does not follow the previous end")]
  Discontiguous,
  #[error("os: {0}")]
  Os(#[from] std::io::Error),
}

/// Failure of an allocator operation.
#[derive(Debug, Error)]
pub enum AllocError {
  /// The required block size exceeds what a header can encode.
  #[error("request of {requested} bytes exceeds the maximum block size")]
  Oversized { requested: usize },
  /// The heap could not be extended.
  #[error("out of memory: {0}")]
  OutOfMemory(#[from] GrowError),
  /// The handle does not name a currently allocated block.
  #[error("invalid free of payload offset {offset:#x}")]
  InvalidFree { offset: usize },
  #[error("allocator used before init()")]
  Uninitialized,
}

/// Inconsistency found by [`Allocator::check`](crate::Allocator::check).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("bad start sentinel")]
  BadStartSentinel,
  #[error("bad end sentinel at {offset:#x}")]
  BadEndSentinel { offset: usize },
  #[error("block at {offset:#x} has invalid size {size}")]
  BadSize { offset: usize, size: usize },
  #[error("block at {offset:#x} runs past the end of the heap")]
  Overrun { offset: usize },
  #[error("free block at {offset:#x} has a footer that differs from its header")]
  FooterMismatch { offset: usize },
  #[error("block at {offset:#x} has a stale prev_alloc bit")]
  StalePrevAlloc { offset: usize },
  #[error("free blocks at {first:#x} and {second:#x} are adjacent")]
  UncoalescedNeighbors { first: usize, second: usize },
  #[error("free block at {offset:#x} is not on its class list")]
  NotListed { offset: usize },
  #[error("list {class} holds block at {offset:#x} which is not a free block of that class")]
  Misfiled { class: usize, offset: usize },
  #[error("list {class} has a broken back link at {offset:#x}")]
  BrokenLink { class: usize, offset: usize },
  #[error("list {class} is not sorted by address at {offset:#x}")]
  OutOfOrder { class: usize, offset: usize },
}
