use std::io::Read;

use libc::sbrk;
use segalloc::{Allocator, Config, HeapSource, Payload, SbrkHeap};

/// Waits until the user presses ENTER.
/// Handy for inspecting the process with `pmap` or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    // SAFETY: sbrk(0) only queries the break.
    unsafe { sbrk(0) },
  );
}

/// Prints every block between the sentinels.
fn print_heap(allocator: &Allocator<SbrkHeap>) {
  let stats = allocator.stats();
  println!(
    "    heap: {} bytes, {} used in {} blocks, {} free in {} blocks",
    stats.heap_size,
    stats.allocated_bytes,
    stats.allocated_blocks,
    stats.free_bytes,
    stats.free_blocks,
  );
  for block in allocator.blocks() {
    println!(
      "    {:#08x} {:>6} {} {}",
      block.offset,
      block.size,
      if block.allocated { "used" } else { "free" },
      if block.prev_allocated { "" } else { "(prev free)" },
    );
  }
  if let Err(err) = allocator.check() {
    println!("    !! heap check failed: {err}");
  }
}

fn print_alloc(
  allocator: &mut Allocator<SbrkHeap>,
  size: usize,
  payload: Payload,
) {
  let usable = allocator.usable_size(payload).unwrap_or(0);
  let ptr = allocator.as_mut_ptr(payload).unwrap_or(std::ptr::null_mut());
  println!("    asked {size} bytes -> {ptr:?} (offset {:#x}, {usable} usable)", payload.offset());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  env_logger::init();

  // Policies come from SEGALLOC_LIST_ORDER / SEGALLOC_FIT_POLICY / SEGALLOC_CHUNK_SIZE.
  let mut allocator = Allocator::with_config(SbrkHeap::new(), Config::from_env());
  println!("config: {:?}", allocator.config());

  print_program_break("start");
  allocator.init()?;
  println!("\n[0] Initialized, heap at {:?}", allocator.source().memory().as_ptr());
  print_program_break("after init");
  print_heap(&allocator);
  block_until_enter_pressed();

  // 1) Three neighbors of the same size.
  let mut blocks = Vec::new();
  for size in [40, 40, 40] {
    let payload = allocator.allocate(size)?.ok_or("zero-sized request")?;
    blocks.push(payload);
  }
  println!("\n[1] Allocate A, B, C of 40 bytes each");
  for &payload in &blocks {
    print_alloc(&mut allocator, 40, payload);
  }
  print_heap(&allocator);
  block_until_enter_pressed();

  // 2) Free the middle one; it sits alone between two used blocks.
  let (a, b, c) = (blocks[0], blocks[1], blocks[2]);
  allocator.free(b)?;
  println!("\n[2] Free B");
  print_heap(&allocator);
  block_until_enter_pressed();

  // 3) Freeing A merges it with B.
  allocator.free(a)?;
  println!("\n[3] Free A, which coalesces with B");
  print_heap(&allocator);
  block_until_enter_pressed();

  // 4) A request larger than B alone lands in the merged block.
  let d = allocator.allocate(80)?.ok_or("zero-sized request")?;
  println!("\n[4] Allocate 80 bytes");
  print_alloc(&mut allocator, 80, d);
  println!(
    "    reused A+B? {}",
    if d == a { "Yes" } else { "No, it went somewhere else" }
  );
  print_heap(&allocator);
  block_until_enter_pressed();

  // 5) Grow C; the free tail after it is absorbed in place.
  let c = allocator.resize(c, 400)?.ok_or("zero-sized request")?;
  println!("\n[5] Resize C to 400 bytes");
  print_alloc(&mut allocator, 400, c);
  print_heap(&allocator);
  block_until_enter_pressed();

  // 6) A request past the end forces the heap to grow.
  print_program_break("before large alloc");
  let big = allocator.allocate(64 * 1024)?.ok_or("zero-sized request")?;
  println!("\n[6] Allocate 64 KiB");
  print_alloc(&mut allocator, 64 * 1024, big);
  print_program_break("after large alloc");
  print_heap(&allocator);
  block_until_enter_pressed();

  // 7) Free everything; the heap collapses into one free block.
  for payload in [d, c, big] {
    allocator.free(payload)?;
  }
  println!("\n[7] Free everything");
  print_heap(&allocator);

  println!("\n[8] End of example. Process will exit and the OS will reclaim all memory.");
  Ok(())
}
