//! Ordering values shared by filters, interceptors and aspects.
//!
//! Lower runs earlier (outer). Units with equal values keep their
//! registration order: every chain sorts with a stable sort.

/// Runs before everything else.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Runs after everything else. Cache advice defaults to this so that any
/// other aspect matching the same call wraps the cache, not the other way
/// around.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// The value a unit gets when nobody sets one.
pub const DEFAULT_ORDER: i32 = 0;
