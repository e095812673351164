//! Cache-aside storage and the advices that put it in front of calls.
//!
//! [`Cache`] is a named in-process store with write- or access-based expiry
//! and an optional size bound. [`CacheManager`] hands caches out by name.
//! [`CacheableAdvice`] and [`CacheEvictAdvice`] apply a cache to any woven
//! call site without the call itself knowing.

mod advice;
mod manager;
mod store;

pub use advice::{CacheEvictAdvice, CacheableAdvice, KeySpec};
pub use manager::CacheManager;
pub use store::{Cache, CacheSettings, CacheStats, TtlPolicy};
