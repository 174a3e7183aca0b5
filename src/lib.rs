//! # segalloc - A Segregated Free-List Heap Allocator
//!
//! This crate provides a **segregated free-list allocator** with boundary-tag
//! coalescing, managing a single linear heap that only ever grows, `sbrk`-style.
//!
//! ## Overview
//!
//! Free blocks are kept in one doubly-linked list per power-of-two size class.
//! A request only looks at the lists that can possibly satisfy it:
//!
//! ```text
//!   Segregated Free Lists:
//!
//!   class  range            list
//!   ┌────┬────────────────┬──────────────────────────────────────────┐
//!   │  0 │ [16, 32)       │ ──► [24] ──► [16] ──► ∅                  │
//!   │  1 │ [32, 64)       │ ∅                                        │
//!   │  2 │ [64, 128)      │ ──► [96] ──► ∅                           │
//!   │ .. │ ..             │                                          │
//!   │ 27 │ [2^31, 2^32)   │ ∅                                        │
//!   └────┴────────────────┴──────────────────────────────────────────┘
//!
//!   allocate(n): search from class(n) upward, first fit (or best fit).
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align       - Alignment macros (align!, align_to!)
//!   ├── block       - Header word codec (size, alloc, prev_alloc)
//!   ├── size_class  - Power-of-two size classes
//!   ├── heap        - Word-level view of the heap bytes (internal)
//!   ├── free_list   - Per-class doubly-linked free lists (internal)
//!   ├── extend      - Heap extension (internal)
//!   ├── coalesce    - Boundary-tag coalescing (internal)
//!   ├── allocator   - Allocator: allocate / free / resize
//!   ├── walk        - Heap walk, statistics, integrity check
//!   ├── source      - Heap-growth primitives (mmap region, sbrk)
//!   ├── config      - Policy configuration
//!   └── error       - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Allocator, MmapHeap};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut allocator = Allocator::new(MmapHeap::new()?);
//!     allocator.init()?;
//!
//!     // Allocate 8 bytes and use them
//!     let payload = allocator.allocate(8)?.expect("non-zero request");
//!     allocator.payload_mut(payload).unwrap()[..8].copy_from_slice(&42u64.to_ne_bytes());
//!
//!     // Grow it; the contents come along
//!     let payload = allocator.resize(payload, 64)?.expect("non-zero request");
//!     assert_eq!(allocator.payload(payload).unwrap()[..8], 42u64.to_ne_bytes());
//!
//!     allocator.free(payload)?;
//!     allocator.check()?;
//!     Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block starts with a one-word header holding its size and two flags.
//! Allocated blocks carry nothing else; free blocks also store their list links
//! and a footer, a copy of the header at their very end:
//!
//! ```text
//!   Allocated block:                     Free block:
//!   ┌────────┬──────────────────────┐    ┌────────┬──────┬──────┬─────┬────────┐
//!   │ header │ payload (+ padding)  │    │ header │ prev │ next │ ... │ footer │
//!   └────────┴──────────────────────┘    └────────┴──────┴──────┴─────┴────────┘
//!            ▲
//!            └── Payload handed to the user
//! ```
//!
//! Because each header also records whether the *previous* block is allocated,
//! a block being freed knows whether a footer sits right before it. If so, it
//! reads the predecessor's size there and merges with it; the successor is found
//! by adding its own size. No two free blocks are ever left side by side.
//!
//! When no list can satisfy a request, the heap grows by a whole chunk:
//!
//! ```text
//!   ┌──────┬─────────────────────────────────┬──────┐
//!   │start │ blocks ...                      │ end  │  ← before
//!   └──────┴─────────────────────────────────┴──────┘
//!   ┌──────┬─────────────────────────────────┬─────────────────┬──────┐
//!   │start │ blocks ...                      │ new free block  │ end  │  ← after
//!   └──────┴─────────────────────────────────┴─────────────────┴──────┘
//! ```
//!
//! ## Features
//!
//! - **Segregated fits**: search cost bounded by the length of a few class lists
//! - **Immediate coalescing**: boundary tags, footers only on free blocks
//! - **Two list orders**: address-ordered or LIFO, chosen at startup
//! - **Two fit policies**: first fit or best fit
//! - **In-place resize**: shrinks split, growth absorbs free neighbors
//! - **Pluggable heap source**: bounded `mmap` region or the real `sbrk`
//!
//! ## Limitations
//!
//! - **Single-threaded only**: every operation takes `&mut self`
//! - **Grow-only heap**: memory is never returned to the OS
//! - **32-bit metadata**: blocks and the heap are capped just under 4 GiB
//!
//! ## Safety
//!
//! The allocator itself is safe code over a byte slice; blocks are named by
//! offsets, not pointers. Only the heap sources touch raw memory.

pub mod align;
mod allocator;
pub mod block;
mod coalesce;
pub mod config;
pub mod error;
mod extend;
mod free_list;
mod heap;
pub mod size_class;
pub mod source;
mod walk;

pub use allocator::{Allocator, Payload};
pub use config::{Config, FitPolicy, ListOrder};
pub use error::{AllocError, GrowError, HeapError};
pub use source::{HeapSource, MmapHeap, SbrkHeap};
pub use walk::{BlockInfo, Blocks, HeapStats};
