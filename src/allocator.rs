use log::{debug, warn};

use crate::{
  block::{self, ALIGNMENT, MIN_BLOCK_SIZE, Tag, WSIZE},
  coalesce::coalesce,
  config::Config,
  error::AllocError,
  extend::extend,
  free_list::FreeLists,
  heap::{BlockMemory, FIRST_BLOCK, START_SENTINEL, header_of, payload_of},
  source::HeapSource,
};

/// Handle to an allocated payload: its byte offset from the heap base.
///
/// Offsets survive heap growth; turn one into a raw pointer with
/// [`Allocator::as_mut_ptr`] when needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(pub(crate) usize);

impl Payload {
  pub fn offset(self) -> usize {
    self.0
  }
}

/// Segregated free-list allocator over a grow-only heap.
pub struct Allocator<S: HeapSource> {
  pub(crate) source: S,
  pub(crate) lists: FreeLists,
  pub(crate) config: Config,
  initialized: bool,
}

impl<S: HeapSource> Allocator<S> {
  pub fn new(source: S) -> Self {
    Self::with_config(source, Config::default())
  }

  pub fn with_config(
    source: S,
    config: Config,
  ) -> Self {
    Self {
      source,
      lists: FreeLists::new(config.order()),
      config,
      initialized: false,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Lays out an empty heap: both sentinels plus one chunk of free space.
  ///
  /// Calling it again discards every block handed out so far.
  pub fn init(&mut self) -> Result<(), AllocError> {
    self.initialized = false;
    if !self.source.is_empty() {
      self.source.reset()?;
    }
    self.lists.clear();

    self.source.grow(2 * WSIZE)?;
    let mem = self.source.memory_mut();
    mem.set_tag(START_SENTINEL, Tag::sentinel(true));
    mem.set_tag(FIRST_BLOCK, Tag::sentinel(true));
    self.initialized = true;

    let chunk = self.config.chunk();
    extend(&mut self.source, &mut self.lists, chunk, chunk)?;
    debug!("initialized heap of {} bytes", self.source.len());
    Ok(())
  }

  /// Allocates a block with at least `size` usable bytes.
  ///
  /// `Ok(None)` for a zero-sized request, which leaves the heap alone.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<Payload>, AllocError> {
    self.ensure_init()?;
    if size == 0 {
      return Ok(None);
    }
    let required = block::required_size(size).ok_or(AllocError::Oversized { requested: size })?;
    let hdr = self.allocate_block(required)?;
    debug!("allocate({size}) -> block {hdr:#x} of {required} bytes");
    Ok(Some(Payload(payload_of(hdr))))
  }

  /// Returns an allocated block to the free lists.
  pub fn free(
    &mut self,
    payload: Payload,
  ) -> Result<(), AllocError> {
    self.ensure_init()?;
    let hdr = self.validate(payload)?;
    release(self.source.memory_mut(), &mut self.lists, hdr);
    debug!("free({:#x})", payload.0);
    Ok(())
  }

  /// Changes the usable size of an allocation, moving it only when it cannot
  /// grow where it is.
  ///
  /// A `size` of zero frees the block and returns `Ok(None)`. On failure the
  /// original allocation is left intact.
  pub fn resize(
    &mut self,
    payload: Payload,
    size: usize,
  ) -> Result<Option<Payload>, AllocError> {
    self.ensure_init()?;
    if size == 0 {
      self.free(payload)?;
      return Ok(None);
    }
    let hdr = self.validate(payload)?;
    let required = block::required_size(size).ok_or(AllocError::Oversized { requested: size })?;

    if let Some(hdr) = resize_in_place(self.source.memory_mut(), &mut self.lists, hdr, required, size)
    {
      debug!("resize({:#x}, {size}) in place -> {hdr:#x}", payload.0);
      return Ok(Some(Payload(payload_of(hdr))));
    }

    let moved = self.allocate_block(required)?;
    let mem = self.source.memory_mut();
    let kept = (mem.tag(hdr).size - WSIZE).min(size);
    let from = payload_of(hdr);
    mem.copy_within(from..from + kept, payload_of(moved));
    release(mem, &mut self.lists, hdr);
    debug!("resize({:#x}, {size}) moved to {moved:#x}", payload.0);
    Ok(Some(Payload(payload_of(moved))))
  }

  /// Usable bytes of an allocation, or `None` if the handle is not allocated.
  pub fn usable_size(
    &self,
    payload: Payload,
  ) -> Option<usize> {
    let hdr = self.validate(payload).ok()?;
    Some(self.source.memory().tag(hdr).size - WSIZE)
  }

  pub fn payload(
    &self,
    payload: Payload,
  ) -> Option<&[u8]> {
    let len = self.usable_size(payload)?;
    Some(&self.source.memory()[payload.0..payload.0 + len])
  }

  pub fn payload_mut(
    &mut self,
    payload: Payload,
  ) -> Option<&mut [u8]> {
    let len = self.usable_size(payload)?;
    Some(&mut self.source.memory_mut()[payload.0..payload.0 + len])
  }

  /// Raw pointer to the payload, valid until the block is freed or the
  /// allocator is dropped. `None` if the handle is not allocated.
  pub fn as_mut_ptr(
    &mut self,
    payload: Payload,
  ) -> Option<*mut u8> {
    self.validate(payload).ok()?;
    Some(self.source.memory_mut()[payload.0..].as_mut_ptr())
  }

  /// Turns a pointer obtained from [`as_mut_ptr`](Self::as_mut_ptr) back into a
  /// handle. `None` if it does not point into this heap.
  pub fn payload_from_ptr(
    &self,
    ptr: *const u8,
  ) -> Option<Payload> {
    let base = self.source.memory().as_ptr() as usize;
    let offset = (ptr as usize).checked_sub(base)?;
    (offset < self.source.len()).then_some(Payload(offset))
  }

  fn ensure_init(&self) -> Result<(), AllocError> {
    if self.initialized {
      Ok(())
    } else {
      Err(AllocError::Uninitialized)
    }
  }

  /// Finds (or makes room for) a free block of `required` bytes and hands it out.
  fn allocate_block(
    &mut self,
    required: usize,
  ) -> Result<usize, AllocError> {
    let found = self
      .lists
      .find_fit(self.source.memory(), required, self.config.policy());
    let hdr = match found {
      Some(hdr) => hdr,
      None => extend(&mut self.source, &mut self.lists, required, self.config.chunk())?,
    };

    let mem = self.source.memory_mut();
    self.lists.remove(mem, hdr);
    place(mem, &mut self.lists, hdr, required);
    Ok(hdr)
  }

  /// Header offset of the allocated block behind `payload`, if its metadata
  /// checks out.
  fn validate(
    &self,
    payload: Payload,
  ) -> Result<usize, AllocError> {
    let mem = self.source.memory();
    let end = mem.len().saturating_sub(WSIZE);
    let offset = payload.0;
    let invalid = AllocError::InvalidFree { offset };

    if offset % ALIGNMENT != 0 || offset < payload_of(FIRST_BLOCK) || offset >= end {
      warn!("rejected payload {offset:#x}: outside the heap");
      return Err(invalid);
    }
    let hdr = header_of(offset);
    let tag = mem.tag(hdr);
    if !tag.alloc || tag.size < MIN_BLOCK_SIZE || tag.size % ALIGNMENT != 0 || hdr + tag.size > end
    {
      warn!("rejected payload {offset:#x}: not an allocated block ({tag:?})");
      return Err(invalid);
    }
    Ok(hdr)
  }
}

/// Marks the detached free block at `hdr` allocated and splits off what it does
/// not need.
fn place(
  mem: &mut [u8],
  lists: &mut FreeLists,
  hdr: usize,
  required: usize,
) {
  let tag = mem.tag(hdr);
  debug_assert!(tag.size >= required, "block {hdr:#x} too small for {required}");
  mem.set_tag(hdr, Tag::used(tag.size, tag.prev_alloc));
  mem.set_prev_alloc(hdr + tag.size, true);
  shrink(mem, lists, hdr, required);
}

/// Cuts the allocated block at `hdr` down to `required` bytes when the tail is
/// big enough to stand alone as a free block.
fn shrink(
  mem: &mut [u8],
  lists: &mut FreeLists,
  hdr: usize,
  required: usize,
) {
  let tag = mem.tag(hdr);
  let remainder = tag.size - required;
  if remainder < MIN_BLOCK_SIZE {
    return;
  }

  mem.set_tag(hdr, Tag::used(required, tag.prev_alloc));
  let rest = hdr + required;
  mem.write_free(rest, remainder, true);
  let merged = coalesce(mem, lists, rest);
  let next = mem.next_block(merged);
  mem.set_prev_alloc(next, false);
  lists.insert(mem, merged);
  debug!("split {hdr:#x}: kept {required}, freed {}", mem.tag(merged).size);
}

/// Frees the allocated block at `hdr`, merging it with free neighbors.
fn release(
  mem: &mut [u8],
  lists: &mut FreeLists,
  hdr: usize,
) {
  let tag = mem.tag(hdr);
  mem.write_free(hdr, tag.size, tag.prev_alloc);
  let merged = coalesce(mem, lists, hdr);
  let next = mem.next_block(merged);
  mem.set_prev_alloc(next, false);
  lists.insert(mem, merged);
}

/// Tries to satisfy a resize without leaving the block's neighborhood: shrink,
/// absorb a free successor, or slide down into a free predecessor. Returns the
/// (possibly moved) header offset.
fn resize_in_place(
  mem: &mut [u8],
  lists: &mut FreeLists,
  hdr: usize,
  required: usize,
  size: usize,
) -> Option<usize> {
  let tag = mem.tag(hdr);
  if required <= tag.size {
    shrink(mem, lists, hdr, required);
    return Some(hdr);
  }

  let next = hdr + tag.size;
  let next_tag = mem.tag(next);
  let next_free = if next_tag.alloc { 0 } else { next_tag.size };

  if next_free > 0 && tag.size + next_free >= required {
    lists.remove(mem, next);
    let size = tag.size + next_free;
    mem.set_tag(hdr, Tag::used(size, tag.prev_alloc));
    mem.set_prev_alloc(hdr + size, true);
    shrink(mem, lists, hdr, required);
    return Some(hdr);
  }

  if tag.prev_alloc {
    return None;
  }
  let prev = mem.prev_block(hdr);
  let prev_tag = mem.tag(prev);
  let total = prev_tag.size + tag.size + next_free;
  if total < required {
    return None;
  }

  lists.remove(mem, prev);
  if next_free > 0 {
    lists.remove(mem, next);
  }
  let kept = (tag.size - WSIZE).min(size);
  let from = payload_of(hdr);
  mem.copy_within(from..from + kept, payload_of(prev));
  mem.set_tag(prev, Tag::used(total, prev_tag.prev_alloc));
  mem.set_prev_alloc(prev + total, true);
  shrink(mem, lists, prev, required);
  Some(prev)
}
