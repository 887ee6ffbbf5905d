//! Issue cache: one canonical entry per structured key.
//!
//! This module provides:
//! - Structured keys (scope + normalized parameters), hashed internally
//! - Immediate local writes and background revalidation
//! - Cache-first loads with offline fallback
//! - Change events for subscribers

mod key;
mod layer;
mod traits;
mod value;

pub use key::{CacheKey, QueryParams, Scope};
pub use layer::{CachedValue, IssueCache, Revalidation, RevalidationHandle};
pub use traits::{CacheEvent, CacheResult, CacheSource};
pub use value::CacheValue;
