//! Allocator policy configuration.
//!
//! Policies are chosen at startup, either directly through [`Config`] or from the
//! environment with [`Config::from_env`]:
//! - `SEGALLOC_LIST_ORDER`: `address` (default) or `lifo`.
//! - `SEGALLOC_FIT_POLICY`: `first` (default) or `best`.
//! - `SEGALLOC_CHUNK_SIZE`: minimum heap growth in bytes (default 4096).
//!
//! Unknown values fall back to the defaults.

use std::env;

use crate::block::MIN_BLOCK_SIZE;

/// Default minimum number of bytes requested from the heap source per extension.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

pub const LIST_ORDER_ENV: &str = "SEGALLOC_LIST_ORDER";
pub const FIT_POLICY_ENV: &str = "SEGALLOC_FIT_POLICY";
pub const CHUNK_SIZE_ENV: &str = "SEGALLOC_CHUNK_SIZE";

/// How blocks are ordered inside one size-class list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOrder {
  /// Sorted by heap address. Insertion walks the list: O(class length).
  #[default]
  AddressOrdered,
  /// Most recently freed first. Insertion pushes at the head: O(1).
  Lifo,
}

impl ListOrder {
  /// Parse from string (case-insensitive).
  #[must_use]
  pub fn from_str_loose(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "lifo" | "stack" | "recent" => Self::Lifo,
      _ => Self::AddressOrdered,
    }
  }
}

/// Which free block of a class satisfies a request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitPolicy {
  /// The first block in list order that is large enough.
  #[default]
  FirstFit,
  /// The smallest block that is large enough; ties go to list order.
  BestFit,
}

impl FitPolicy {
  /// Parse from string (case-insensitive).
  #[must_use]
  pub fn from_str_loose(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "best" | "best-fit" | "best_fit" | "bestfit" => Self::BestFit,
      _ => Self::FirstFit,
    }
  }
}

/// Startup configuration of an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  chunk_size: usize,
  list_order: ListOrder,
  fit_policy: FitPolicy,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      list_order: ListOrder::default(),
      fit_policy: FitPolicy::default(),
    }
  }
}

impl Config {
  /// Reads the policies from the environment.
  #[must_use]
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Ok(raw) = env::var(LIST_ORDER_ENV) {
      config = config.list_order(ListOrder::from_str_loose(&raw));
    }
    if let Ok(raw) = env::var(FIT_POLICY_ENV) {
      config = config.fit_policy(FitPolicy::from_str_loose(&raw));
    }
    if let Some(chunk) = env::var(CHUNK_SIZE_ENV).ok().and_then(|raw| raw.trim().parse().ok()) {
      config = config.chunk_size(chunk);
    }
    config
  }

  /// Sets the heap growth granularity, clamped to `[MIN_BLOCK_SIZE, 1 GiB]` and
  /// rounded up to the alignment.
  #[must_use]
  pub fn chunk_size(
    mut self,
    bytes: usize,
  ) -> Self {
    self.chunk_size = crate::align!(bytes.clamp(MIN_BLOCK_SIZE, 1 << 30));
    self
  }

  #[must_use]
  pub fn list_order(
    mut self,
    order: ListOrder,
  ) -> Self {
    self.list_order = order;
    self
  }

  #[must_use]
  pub fn fit_policy(
    mut self,
    policy: FitPolicy,
  ) -> Self {
    self.fit_policy = policy;
    self
  }

  pub fn chunk(&self) -> usize {
    self.chunk_size
  }

  pub fn order(&self) -> ListOrder {
    self.list_order
  }

  pub fn policy(&self) -> FitPolicy {
    self.fit_policy
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_address_order_first_fit() {
    let config = Config::default();
    assert_eq!(config.chunk(), 4096);
    assert_eq!(config.order(), ListOrder::AddressOrdered);
    assert_eq!(config.policy(), FitPolicy::FirstFit);
  }

  #[test]
  fn parse_loose() {
    assert_eq!(ListOrder::from_str_loose("LIFO"), ListOrder::Lifo);
    assert_eq!(ListOrder::from_str_loose("address"), ListOrder::AddressOrdered);
    assert_eq!(ListOrder::from_str_loose("garbage"), ListOrder::AddressOrdered);
    assert_eq!(FitPolicy::from_str_loose("Best-Fit"), FitPolicy::BestFit);
    assert_eq!(FitPolicy::from_str_loose("first"), FitPolicy::FirstFit);
  }

  #[test]
  fn chunk_size_is_aligned_and_clamped() {
    assert_eq!(Config::default().chunk_size(1).chunk(), MIN_BLOCK_SIZE);
    assert_eq!(Config::default().chunk_size(4097).chunk(), 4104);
    assert_eq!(Config::default().chunk_size(usize::MAX).chunk(), 1 << 30);
  }
}
