//! Result and event types shared by cache consumers.

use chrono::{DateTime, Utc};

use super::key::CacheKey;

/// Result from a cache load, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
    }
  }

  /// Stale data served because the remote read failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, marked stale with a refetch pending
  CacheStale,
  /// Network unavailable, serving cached data
  Offline,
}

impl CacheSource {
  pub fn label(self) -> &'static str {
    match self {
      CacheSource::Network => "network",
      CacheSource::CacheFresh => "cache",
      CacheSource::CacheStale => "cache (stale)",
      CacheSource::Offline => "offline",
    }
  }
}

/// Change notification broadcast to cache subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
  /// A local write replaced the entry's value.
  Written { key: CacheKey, version: u64 },
  /// The entry was marked stale and a refetch started.
  Invalidated { key: CacheKey },
  /// A refetch landed and replaced the value.
  Revalidated { key: CacheKey, version: u64 },
  /// A refetch failed; the previous value is kept.
  RevalidationFailed { key: CacheKey, error: String },
}

impl CacheEvent {
  pub fn key(&self) -> &CacheKey {
    match self {
      CacheEvent::Written { key, .. }
      | CacheEvent::Invalidated { key }
      | CacheEvent::Revalidated { key, .. }
      | CacheEvent::RevalidationFailed { key, .. } => key,
    }
  }
}
