//! Derived, render-ready collections.
//!
//! A `DerivedView` runs the grouping engine over a cache entry and memoises
//! the result until the entry's version or the view's grouping options
//! change. It never writes to the cache.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::grouping::{bucket_by_target_date, group_issues, GroupBy, GroupedIssues, OrderBy};
use super::state::ViewState;
use crate::cache::{CacheKey, CacheValue, IssueCache};
use crate::model::Issue;

/// The state of a derived view
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedState {
  /// The backing key has not been loaded yet
  NotLoaded,
  /// Grouped, ordered issues ready to render
  Ready {
    grouped: Arc<GroupedIssues>,
    /// A refetch of the backing entry is pending
    stale: bool,
  },
}

impl DerivedState {
  pub fn is_loaded(&self) -> bool {
    matches!(self, DerivedState::Ready { .. })
  }

  pub fn grouped(&self) -> Option<&GroupedIssues> {
    match self {
      DerivedState::Ready { grouped, .. } => Some(grouped.as_ref()),
      DerivedState::NotLoaded => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
struct Inputs {
  key_hash: String,
  version: u64,
  group_by: Option<GroupBy>,
  order_by: OrderBy,
  show_empty_groups: bool,
}

/// Memoised grouping of one cache entry.
#[derive(Debug, Default)]
pub struct DerivedView {
  memo: Option<(Inputs, Arc<GroupedIssues>)>,
  computed: usize,
}

impl DerivedView {
  pub fn new() -> Self {
    Self::default()
  }

  /// How many times the engine actually ran.
  pub fn computations(&self) -> usize {
    self.computed
  }

  /// Derive the grouped collection for `key` under the view's options.
  pub fn derive(&mut self, cache: &IssueCache, key: &CacheKey, view: &ViewState) -> DerivedState {
    let Some(cached) = cache.read(key) else {
      return DerivedState::NotLoaded;
    };

    let inputs = Inputs {
      key_hash: key.hash(),
      version: cached.version,
      group_by: view.effective_group_by(),
      order_by: view.order_by(),
      show_empty_groups: view.show_empty_groups(),
    };

    if let Some((memo_inputs, grouped)) = &self.memo {
      if *memo_inputs == inputs {
        return DerivedState::Ready {
          grouped: grouped.clone(),
          stale: cached.stale,
        };
      }
    }

    let grouped = Arc::new(compute(&cached.value, &inputs));
    self.computed += 1;
    self.memo = Some((inputs, grouped.clone()));
    DerivedState::Ready {
      grouped,
      stale: cached.stale,
    }
  }
}

fn compute(value: &CacheValue, inputs: &Inputs) -> GroupedIssues {
  let mut grouped = match value {
    CacheValue::Grouped(grouped)
      if grouped.group_by() == inputs.group_by && grouped.order_by() == inputs.order_by =>
    {
      grouped.clone()
    }
    CacheValue::Grouped(grouped) => grouped.regroup(inputs.group_by, inputs.order_by),
    other => group_issues(&other.issues(), inputs.group_by, inputs.order_by),
  };

  match (inputs.show_empty_groups, inputs.group_by) {
    (true, Some(field)) => grouped.insert_empty_groups(field.known_keys()),
    (true, None) => {}
    (false, _) => grouped.remove_empty_groups(),
  }
  grouped
}

/// Calendar buckets for a loaded entry, keyed by target date.
pub fn calendar_days(
  cache: &IssueCache,
  key: &CacheKey,
  order_by: OrderBy,
) -> Option<BTreeMap<NaiveDate, Vec<Issue>>> {
  let cached = cache.read(key)?;
  Some(bucket_by_target_date(&cached.value.issues(), order_by))
}
