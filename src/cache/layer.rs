//! Process-wide issue cache.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::key::{CacheKey, Scope};
use super::traits::{CacheEvent, CacheResult};
use super::value::CacheValue;
use crate::api::IssueReader;
use crate::error::{CacheError, RemoteError};
use crate::view::group_issues;

const EVENT_CAPACITY: usize = 256;

/// Snapshot of a loaded entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
  pub value: CacheValue,
  pub cached_at: DateTime<Utc>,
  /// Bumped on every write and every applied refetch.
  pub version: u64,
  /// Set by `invalidate` until a refetch lands.
  pub stale: bool,
}

#[derive(Debug)]
struct Entry {
  key: CacheKey,
  value: Option<CacheValue>,
  cached_at: Option<DateTime<Utc>>,
  version: u64,
  stale: bool,
  /// Sequence of the most recently started refetch. Only that one may land.
  fetch_seq: u64,
}

impl Entry {
  fn new(key: CacheKey) -> Self {
    Self {
      key,
      value: None,
      cached_at: None,
      version: 0,
      stale: false,
      fetch_seq: 0,
    }
  }
}

struct Inner {
  entries: Mutex<HashMap<CacheKey, Entry>>,
  reader: Arc<dyn IssueReader>,
  events: broadcast::Sender<CacheEvent>,
  stale_time: Duration,
}

/// Keyed store of issue collections.
///
/// Every view reads through a [`CacheKey`]; nobody holds a private mutable
/// copy. Writes to one key are applied in call order. There is no
/// transaction across keys.
///
/// `invalidate` spawns its refetch on the current Tokio runtime.
#[derive(Clone)]
pub struct IssueCache {
  inner: Arc<Inner>,
}

/// How a refetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
  /// The fetched value replaced the entry.
  Applied { version: u64 },
  /// A newer refetch started meanwhile; this result was dropped.
  Superseded,
}

/// A refetch running in the background.
#[derive(Debug)]
pub struct RevalidationHandle {
  key: CacheKey,
  handle: JoinHandle<Result<Revalidation, RemoteError>>,
}

impl RevalidationHandle {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Wait for the refetch to land.
  pub async fn wait(self) -> Result<Revalidation, RemoteError> {
    self
      .handle
      .await
      .map_err(|e| RemoteError::new("join", e.to_string()))?
  }
}

impl IssueCache {
  pub fn new(reader: Arc<dyn IssueReader>) -> Self {
    Self::with_stale_time(reader, Duration::minutes(5))
  }

  /// Create a cache whose loaded data counts as fresh for `stale_time`.
  pub fn with_stale_time(reader: Arc<dyn IssueReader>, stale_time: Duration) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        reader,
        events,
        stale_time,
      }),
    }
  }

  pub fn stale_time(&self) -> Duration {
    self.inner.stale_time
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
    self
      .inner
      .entries
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine
    let _ = self.inner.events.send(event);
  }

  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.inner.stale_time
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  /// Current value, or `None` if the key was never loaded. A loaded empty
  /// collection is `Some`.
  pub fn read(&self, key: &CacheKey) -> Option<CachedValue> {
    let entries = self.lock();
    let entry = entries.get(key)?;
    Some(CachedValue {
      value: entry.value.clone()?,
      cached_at: entry.cached_at.unwrap_or_else(Utc::now),
      version: entry.version,
      stale: entry.stale,
    })
  }

  pub fn contains(&self, key: &CacheKey) -> bool {
    self
      .lock()
      .get(key)
      .is_some_and(|entry| entry.value.is_some())
  }

  /// Keys holding a value.
  pub fn loaded_keys(&self) -> Vec<CacheKey> {
    self
      .lock()
      .values()
      .filter(|entry| entry.value.is_some())
      .map(|entry| entry.key.clone())
      .collect()
  }

  /// Replace the value with `updater(current)` immediately.
  ///
  /// The updater sees `None` when nothing is loaded and returns `None` to
  /// leave the entry untouched. With `revalidate` a refetch is started in
  /// the background afterwards. Returns the new version if a write happened.
  pub fn write<F>(&self, key: &CacheKey, updater: F, revalidate: bool) -> Option<u64>
  where
    F: FnOnce(Option<&CacheValue>) -> Option<CacheValue>,
  {
    let version = {
      let mut entries = self.lock();
      let entry = entries
        .entry(key.clone())
        .or_insert_with(|| Entry::new(key.clone()));
      updater(entry.value.as_ref()).map(|value| {
        entry.value = Some(value);
        entry.cached_at.get_or_insert_with(Utc::now);
        entry.version += 1;
        entry.version
      })
    };

    if let Some(version) = version {
      debug!("cache write {} (v{})", key, version);
      self.emit(CacheEvent::Written {
        key: key.clone(),
        version,
      });
    }
    if revalidate {
      let _ = self.invalidate(key);
    }
    version
  }

  /// Edit a loaded value in place. `f` returns whether it changed anything;
  /// nothing is written otherwise.
  pub fn modify<F>(&self, key: &CacheKey, f: F) -> bool
  where
    F: FnOnce(&mut CacheValue) -> bool,
  {
    self
      .write(
        key,
        |current| {
          let mut value = current?.clone();
          f(&mut value).then_some(value)
        },
        false,
      )
      .is_some()
  }

  /// Mark the entry stale and refetch it in the background. Readers keep
  /// seeing the last value until the refetch lands.
  pub fn invalidate(&self, key: &CacheKey) -> RevalidationHandle {
    let seq = {
      let mut entries = self.lock();
      let entry = entries
        .entry(key.clone())
        .or_insert_with(|| Entry::new(key.clone()));
      entry.stale = true;
      entry.fetch_seq += 1;
      entry.fetch_seq
    };
    debug!("cache invalidate {} (fetch #{})", key, seq);
    self.emit(CacheEvent::Invalidated { key: key.clone() });

    let cache = self.clone();
    let task_key = key.clone();
    let handle = tokio::spawn(async move { cache.refetch(&task_key, seq).await });
    RevalidationHandle {
      key: key.clone(),
      handle,
    }
  }

  /// Invalidate and wait for the refetch.
  pub async fn revalidate(&self, key: &CacheKey) -> Result<Revalidation, RemoteError> {
    self.invalidate(key).wait().await
  }

  async fn refetch(&self, key: &CacheKey, seq: u64) -> Result<Revalidation, RemoteError> {
    let fetched = self.fetch(key).await;

    let mut entries = self.lock();
    let entry = entries
      .entry(key.clone())
      .or_insert_with(|| Entry::new(key.clone()));
    if entry.fetch_seq != seq {
      debug!("dropping superseded fetch #{} of {}", seq, key);
      return Ok(Revalidation::Superseded);
    }

    match fetched {
      Ok(value) => {
        entry.value = Some(value);
        entry.cached_at = Some(Utc::now());
        entry.stale = false;
        entry.version += 1;
        let version = entry.version;
        drop(entries);

        debug!("cache revalidated {} (v{})", key, version);
        self.emit(CacheEvent::Revalidated {
          key: key.clone(),
          version,
        });
        Ok(Revalidation::Applied { version })
      }
      Err(err) => {
        drop(entries);
        warn!("revalidation of {} failed: {}", key, err);
        self.emit(CacheEvent::RevalidationFailed {
          key: key.clone(),
          error: err.to_string(),
        });
        Err(err)
      }
    }
  }

  async fn fetch(&self, key: &CacheKey) -> Result<CacheValue, RemoteError> {
    let reader = &self.inner.reader;
    match &key.scope {
      Scope::SubIssues {
        project_id,
        parent_id,
      } => reader
        .sub_issues(project_id, parent_id)
        .await
        .map(CacheValue::SubIssues),
      Scope::IssueDetails {
        project_id,
        issue_id,
      } => reader
        .issue(project_id, issue_id)
        .await
        .map(|issue| CacheValue::Issue(Box::new(issue))),
      Scope::IssueActivity {
        project_id,
        issue_id,
      } => reader
        .activity(project_id, issue_id)
        .await
        .map(CacheValue::Activity),
      scope => {
        let issues = reader.list_issues(scope, &key.params).await?;
        Ok(match key.params.group_by() {
          Some(group_by) => CacheValue::Grouped(group_issues(
            &issues,
            Some(group_by),
            key.params.order_by().unwrap_or_default(),
          )),
          None => CacheValue::Issues(issues),
        })
      }
    }
  }

  /// Cache-first read.
  ///
  /// 1. Fresh entry: returned as is
  /// 2. Missing, stale or invalidated: refetched
  /// 3. Refetch failed: the old value is served as offline data
  pub async fn load(&self, key: &CacheKey) -> Result<CacheResult<CacheValue>, CacheError> {
    key.validate()?;

    let cached = self.read(key);
    if let Some(cached) = &cached {
      if !cached.stale && !self.is_stale(cached.cached_at) {
        return Ok(CacheResult::from_cache(
          cached.value.clone(),
          cached.cached_at,
          false,
        ));
      }
    }

    match self.revalidate(key).await {
      Ok(Revalidation::Applied { .. }) => {
        let fresh = self.read(key).ok_or_else(|| RemoteError::not_found(key))?;
        info!("loaded {} from network", key);
        Ok(CacheResult::from_network(fresh.value))
      }
      Ok(Revalidation::Superseded) => {
        let current = self.read(key).ok_or_else(|| RemoteError::not_found(key))?;
        Ok(CacheResult::from_cache(
          current.value,
          current.cached_at,
          current.stale,
        ))
      }
      Err(err) => match cached {
        Some(cached) => {
          warn!("serving {} offline: {}", key, err);
          Ok(CacheResult::offline(cached.value, cached.cached_at))
        }
        None => Err(err.into()),
      },
    }
  }
}
