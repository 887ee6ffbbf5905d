//! Drag-and-drop between groups.
//!
//! A cross-group drop rewrites the field the collection is grouped by to the
//! destination key. Only fields with a writable counterpart can be dragged.

use super::Pending;
use crate::error::MutationError;
use crate::model::{Issue, IssuePatch, KnownDetails, LabelLite, Priority};
use crate::view::{GroupBy, GroupKey, GroupedIssues};

/// Where an issue was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
  /// A bucket of the same grouped collection, at a position.
  Group { key: GroupKey, index: usize },
  /// The delete area.
  Discard,
}

/// A drag gesture on a grouped collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragMove {
  pub source: GroupKey,
  pub source_index: usize,
  pub destination: DropTarget,
}

impl DragMove {
  pub fn to_group(source: GroupKey, source_index: usize, key: GroupKey, index: usize) -> Self {
    Self {
      source,
      source_index,
      destination: DropTarget::Group { key, index },
    }
  }

  pub fn discard(source: GroupKey, source_index: usize) -> Self {
    Self {
      source,
      source_index,
      destination: DropTarget::Discard,
    }
  }
}

/// What a drop turned into.
#[derive(Debug)]
pub enum MoveOutcome {
  /// Dropped where it came from; nothing written, nothing sent.
  Noop,
  Moved(Pending<Issue>),
  Deleted(Pending<()>),
}

impl MoveOutcome {
  pub fn is_noop(&self) -> bool {
    matches!(self, MoveOutcome::Noop)
  }
}

/// Patch that moves `issue` from `source` to `destination` under `group_by`.
///
/// `known` is extended with any snapshot the destination needs. The flag is
/// set when no real snapshot was available and a placeholder will be shown
/// until the next refetch.
pub(crate) fn field_patch(
  group_by: GroupBy,
  issue: &Issue,
  source: &GroupKey,
  destination: &GroupKey,
  grouped: &GroupedIssues,
  known: &mut KnownDetails,
) -> Result<(IssuePatch, bool), MutationError> {
  match group_by {
    GroupBy::Priority => {
      let priority: Priority = destination.as_str().parse()?;
      let patch = IssuePatch {
        priority: Some(priority),
        ..Default::default()
      };
      Ok((patch, false))
    }
    GroupBy::State => {
      if destination.is_none() {
        return Err(MutationError::validation("an issue must have a state"));
      }
      let state_id = destination.as_str().to_string();
      let detail = grouped
        .get(destination)
        .into_iter()
        .flatten()
        .find_map(|i| i.state_detail.clone().filter(|d| d.id == state_id))
        .or_else(|| known.state(&state_id));
      let placeholder = detail.is_none();
      if let Some(detail) = detail {
        if known.state(&state_id).is_none() {
          known.states.push(detail);
        }
      }
      let patch = IssuePatch {
        state: Some(state_id),
        ..Default::default()
      };
      Ok((patch, placeholder))
    }
    GroupBy::Labels => {
      let mut labels: Vec<String> = issue.labels.clone();
      if !source.is_none() {
        labels.retain(|l| l != source.as_str());
      }
      let mut placeholder = false;
      if !destination.is_none() {
        let label_id = destination.as_str();
        if !labels.iter().any(|l| l == label_id) {
          labels.push(label_id.to_string());
        }
        let detail = grouped
          .get(destination)
          .into_iter()
          .flatten()
          .flat_map(|i| i.label_details.iter())
          .chain(known.labels.iter())
          .find(|l| l.id == label_id)
          .cloned();
        match detail {
          Some(detail) => {
            if !known.labels.iter().any(|l| l.id == detail.id) {
              known.labels.push(detail);
            }
          }
          None => {
            placeholder = true;
            known.labels.push(LabelLite::placeholder(label_id));
          }
        }
      }
      let patch = IssuePatch {
        labels: Some(labels),
        ..Default::default()
      };
      Ok((patch, placeholder))
    }
    other => Err(MutationError::validation(format!(
      "issues grouped by {} cannot be dragged",
      other
    ))),
  }
}

/// Sort order that lands an issue at `index` of a manually ordered bucket.
///
/// Dropped first or last it goes one step past the neighbour; between two
/// issues it takes the midpoint. In a descending bucket the step points up.
pub(crate) fn sort_order_at(
  bucket: &[Issue],
  index: usize,
  moving_id: &str,
  descending: bool,
) -> Option<f64> {
  const STEP: f64 = 10000.0;
  let step = if descending { -STEP } else { STEP };

  let others: Vec<&Issue> = bucket.iter().filter(|i| i.id != moving_id).collect();
  let index = index.min(others.len());
  let before = index.checked_sub(1).and_then(|i| others.get(i));
  let after = others.get(index);
  match (before, after) {
    (None, None) => None,
    (Some(prev), None) => Some(prev.sort_order + step),
    (None, Some(next)) => Some(next.sort_order - step),
    (Some(prev), Some(next)) => Some((prev.sort_order + next.sort_order) / 2.0),
  }
}
