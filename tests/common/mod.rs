#![allow(dead_code)]

use segalloc::{Allocator, Config, FitPolicy, ListOrder, MmapHeap};

/// Every list order / fit policy combination.
pub fn configs() -> Vec<Config> {
  let mut configs = Vec::new();
  for order in [ListOrder::AddressOrdered, ListOrder::Lifo] {
    for policy in [FitPolicy::FirstFit, FitPolicy::BestFit] {
      configs.push(Config::default().list_order(order).fit_policy(policy));
    }
  }
  configs
}

pub fn allocator_with(config: Config) -> Allocator<MmapHeap> {
  let mut allocator = Allocator::with_config(MmapHeap::new().unwrap(), config);
  allocator.init().unwrap();
  allocator
}

pub fn allocator() -> Allocator<MmapHeap> {
  allocator_with(Config::default())
}
