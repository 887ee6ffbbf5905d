use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::drag::{field_patch, sort_order_at, DragMove, DropTarget, MoveOutcome};
use super::Pending;
use crate::api::IssueWriter;
use crate::cache::{CacheKey, CacheValue, IssueCache, RevalidationHandle, Scope};
use crate::error::{MutationError, RemoteError};
use crate::model::{Issue, IssueDraft, IssuePatch, KnownDetails};
use crate::notify::{Notification, Notifier};
use crate::view::OrderField;

/// What happens to the cache once the remote write went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnSuccess {
  /// Keep the optimistic value.
  Accept,
  /// Refetch every touched key; the server decides the final placement.
  Refetch,
}

/// Applies mutations to every loaded key that holds the issue, then sends
/// them to the write service.
#[derive(Clone)]
pub struct MutationCoordinator {
  cache: IssueCache,
  writer: Arc<dyn IssueWriter>,
  notifier: Arc<dyn Notifier>,
  placeholders: Arc<AtomicU64>,
}

impl MutationCoordinator {
  pub fn new(cache: IssueCache, writer: Arc<dyn IssueWriter>, notifier: Arc<dyn Notifier>) -> Self {
    Self {
      cache,
      writer,
      notifier,
      placeholders: Arc::new(AtomicU64::new(0)),
    }
  }

  pub fn cache(&self) -> &IssueCache {
    &self.cache
  }

  /// Update an issue.
  ///
  /// `targets` are the collections the caller is looking at. The parent's
  /// sub-issue list and the issue's detail entry are added when loaded.
  pub fn patch(
    &self,
    issue: &Issue,
    targets: &[CacheKey],
    patch: IssuePatch,
  ) -> Result<Pending<Issue>, MutationError> {
    if patch.is_empty() {
      return Err(MutationError::validation("nothing to update"));
    }
    Scope::details(issue.project.clone(), issue.id.clone()).validate()?;
    for key in targets {
      key.validate()?;
    }

    let keys = self.affected_keys(issue, targets);
    let known = self.known_details(&keys);
    for key in &keys {
      self
        .cache
        .modify(key, |value| value.patch_issue(&issue.id, &patch, &known));
    }

    let on_success = if patch.sort_order.is_some() {
      OnSuccess::Refetch
    } else {
      OnSuccess::Accept
    };
    Ok(self.dispatch_patch(issue, patch, keys, on_success))
  }

  /// Create an issue in `target`.
  ///
  /// A placeholder shows up immediately and is swapped for the server record
  /// once the create succeeds.
  pub fn create(
    &self,
    project_id: &str,
    target: &CacheKey,
    draft: IssueDraft,
  ) -> Result<Pending<Issue>, MutationError> {
    if draft.name.trim().is_empty() {
      return Err(MutationError::validation("an issue needs a name"));
    }
    Scope::project(project_id).validate()?;
    target.validate()?;

    let placeholder_id = format!(
      "pending-{}",
      self.placeholders.fetch_add(1, Ordering::SeqCst) + 1
    );
    let mut keys = vec![target.clone()];
    if let Some(parent) = &draft.parent {
      keys.push(CacheKey::bare(Scope::sub_issues(project_id, parent.clone())));
    }
    keys.retain(|k| self.cache.contains(k));

    let known = self.known_details(&keys);
    let placeholder = draft.to_issue(&placeholder_id, project_id, Utc::now(), &known);
    for key in &keys {
      let order_by = key.params.order_by().unwrap_or_default();
      self
        .cache
        .modify(key, |value| value.insert_issue(placeholder.clone(), order_by));
    }
    info!("creating issue '{}' in {}", draft.name, project_id);

    let this = self.clone();
    let project_id = project_id.to_string();
    Ok(Pending::new(tokio::spawn(async move {
      match this.writer.create_issue(&project_id, &draft).await {
        Ok(issue) => {
          debug!("issue {} replaces {}", issue.id, placeholder_id);
          for key in &keys {
            this
              .cache
              .modify(key, |value| value.replace_issue(&placeholder_id, issue.clone()));
          }
          this
            .notifier
            .notify(Notification::success("Success!", "Issue created successfully"));
          Ok(issue)
        }
        Err(err) => Err(this.fail("Issue could not be created", err, &keys).await),
      }
    })))
  }

  /// Delete an issue, removing it from every loaded collection first.
  pub fn delete(&self, issue: &Issue, targets: &[CacheKey]) -> Result<Pending<()>, MutationError> {
    Scope::details(issue.project.clone(), issue.id.clone()).validate()?;
    for key in targets {
      key.validate()?;
    }

    let keys = self.affected_keys(issue, targets);
    for key in &keys {
      self.cache.modify(key, |value| value.remove_issue(&issue.id));
    }
    info!("deleting issue {}", issue.id);

    let this = self.clone();
    let project_id = issue.project.clone();
    let issue_id = issue.id.clone();
    Ok(Pending::new(tokio::spawn(async move {
      match this.writer.delete_issue(&project_id, &issue_id).await {
        Ok(()) => {
          this
            .notifier
            .notify(Notification::success("Success!", "Issue deleted successfully"));
          Ok(())
        }
        Err(err) => Err(this.fail("Issue could not be deleted", err, &keys).await),
      }
    })))
  }

  /// Apply a drag gesture on the grouped collection stored at `key`.
  pub fn move_issue(&self, key: &CacheKey, drag: DragMove) -> Result<MoveOutcome, MutationError> {
    key.validate()?;
    let cached = self
      .cache
      .read(key)
      .ok_or_else(|| MutationError::validation(format!("{} is not loaded", key)))?;
    let CacheValue::Grouped(grouped) = &cached.value else {
      return Err(MutationError::validation(format!("{} is not grouped", key)));
    };
    let group_by = grouped
      .group_by()
      .ok_or_else(|| MutationError::validation(format!("{} is not grouped", key)))?;
    let issue = grouped
      .get(&drag.source)
      .and_then(|issues| issues.get(drag.source_index))
      .cloned()
      .ok_or_else(|| {
        MutationError::validation(format!("no issue at {}[{}]", drag.source, drag.source_index))
      })?;

    let (destination, index) = match drag.destination {
      DropTarget::Discard => {
        return Ok(MoveOutcome::Deleted(self.delete(&issue, slice::from_ref(key))?));
      }
      DropTarget::Group { key: destination, index } => (destination, index),
    };
    if destination == drag.source {
      debug!("issue {} dropped back into {}", issue.id, destination);
      return Ok(MoveOutcome::Noop);
    }

    let keys = self.affected_keys(&issue, slice::from_ref(key));
    let mut known = self.known_details(&keys);
    let (mut patch, placeholder) =
      field_patch(group_by, &issue, &drag.source, &destination, grouped, &mut known)?;
    let order_by = grouped.order_by();
    if order_by.field == OrderField::SortOrder {
      let bucket = grouped.get(&destination).unwrap_or_default();
      patch.sort_order = sort_order_at(bucket, index, &issue.id, order_by.descending);
    }

    let mut moved = issue.clone();
    patch.apply_to(&mut moved, &known);
    let source = drag.source.clone();
    let source_index = drag.source_index;
    self.cache.modify(key, |value| {
      let CacheValue::Grouped(grouped) = value else {
        return false;
      };
      match grouped.take(&source, source_index) {
        Some(taken) if taken.id == moved.id => {}
        _ => return false,
      }
      let already_there = grouped
        .get(&destination)
        .is_some_and(|issues| issues.iter().any(|i| i.id == moved.id));
      if !already_there && group_by.keys_for(&moved).contains(&destination) {
        grouped.insert_at(destination.clone(), index, moved.clone());
      }
      grouped.update_copies(&moved);
      true
    });
    for other in keys.iter().filter(|k| *k != key) {
      self
        .cache
        .modify(other, |value| value.patch_issue(&issue.id, &patch, &known));
    }

    let on_success = if placeholder || patch.sort_order.is_some() {
      OnSuccess::Refetch
    } else {
      OnSuccess::Accept
    };
    Ok(MoveOutcome::Moved(self.dispatch_patch(&issue, patch, keys, on_success)))
  }

  /// Calendar drop: move an issue to another target date.
  pub fn move_to_date(
    &self,
    key: &CacheKey,
    issue_id: &str,
    date: NaiveDate,
  ) -> Result<MoveOutcome, MutationError> {
    let cached = self
      .cache
      .read(key)
      .ok_or_else(|| MutationError::validation(format!("{} is not loaded", key)))?;
    let issue = cached
      .value
      .find_issue(issue_id)
      .cloned()
      .ok_or_else(|| MutationError::validation(format!("issue {} is not in {}", issue_id, key)))?;
    if issue.target_date == Some(date) {
      return Ok(MoveOutcome::Noop);
    }

    let patch = IssuePatch {
      target_date: Some(Some(date)),
      ..Default::default()
    };
    Ok(MoveOutcome::Moved(self.patch(&issue, slice::from_ref(key), patch)?))
  }

  fn dispatch_patch(
    &self,
    issue: &Issue,
    patch: IssuePatch,
    keys: Vec<CacheKey>,
    on_success: OnSuccess,
  ) -> Pending<Issue> {
    info!("updating issue {} ({})", issue.id, patch.fields().join(", "));
    let this = self.clone();
    let project_id = issue.project.clone();
    let issue_id = issue.id.clone();
    Pending::new(tokio::spawn(async move {
      match this.writer.patch_issue(&project_id, &issue_id, &patch).await {
        Ok(updated) => {
          if on_success == OnSuccess::Refetch {
            this.refetch(&keys).await;
          }
          this.invalidate_activity(&project_id, &issue_id);
          Ok(updated)
        }
        Err(err) => Err(this.fail("Issue could not be updated", err, &keys).await),
      }
    }))
  }

  /// Report a failed write and roll the touched keys back to server state.
  async fn fail(&self, what: &str, err: RemoteError, keys: &[CacheKey]) -> MutationError {
    warn!("{}: {}", what, err);
    self
      .notifier
      .notify(Notification::error("Error!", format!("{}: {}", what, err.message)));
    self.refetch(keys).await;
    MutationError::Remote(err)
  }

  async fn refetch(&self, keys: &[CacheKey]) {
    let handles: Vec<RevalidationHandle> = keys.iter().map(|k| self.cache.invalidate(k)).collect();
    for result in join_all(handles.into_iter().map(RevalidationHandle::wait)).await {
      if let Err(err) = result {
        warn!("refetch after mutation failed: {}", err);
      }
    }
  }

  fn invalidate_activity(&self, project_id: &str, issue_id: &str) {
    let key = CacheKey::bare(Scope::activity(project_id, issue_id));
    if self.cache.contains(&key) {
      let _ = self.cache.invalidate(&key);
    }
  }

  /// Loaded keys holding a copy of `issue`, deduplicated.
  fn affected_keys(&self, issue: &Issue, targets: &[CacheKey]) -> Vec<CacheKey> {
    let mut keys = targets.to_vec();
    if let Some(parent) = &issue.parent {
      keys.push(CacheKey::bare(Scope::sub_issues(
        issue.project.clone(),
        parent.clone(),
      )));
    }
    keys.push(CacheKey::bare(Scope::details(
      issue.project.clone(),
      issue.id.clone(),
    )));

    let mut seen = HashSet::new();
    keys.retain(|k| seen.insert(k.clone()) && self.cache.contains(k));
    keys
  }

  fn known_details(&self, keys: &[CacheKey]) -> KnownDetails {
    let issues: Vec<Issue> = keys
      .iter()
      .filter_map(|k| self.cache.read(k))
      .flat_map(|cached| cached.value.issues())
      .collect();
    KnownDetails::from_issues(&issues)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::MemoryIssueService;
  use crate::cache::{CacheEvent, QueryParams};
  use crate::model::{test_issue, LabelLite, Priority, StateDetail, StateGroup};
  use crate::notify::{ChannelNotifier, NotificationKind};
  use crate::view::GroupKey;
  use tokio::sync::broadcast;
  use tokio::sync::mpsc::UnboundedReceiver;

  struct Harness {
    service: Arc<MemoryIssueService>,
    cache: IssueCache,
    coordinator: MutationCoordinator,
    notes: UnboundedReceiver<Notification>,
  }

  fn harness(issues: Vec<Issue>) -> Harness {
    let service = Arc::new(MemoryIssueService::new(issues));
    let cache = IssueCache::new(service.clone());
    let (notifier, notes) = ChannelNotifier::new();
    let coordinator = MutationCoordinator::new(cache.clone(), service.clone(), Arc::new(notifier));
    Harness {
      service,
      cache,
      coordinator,
      notes,
    }
  }

  fn flat_key() -> CacheKey {
    CacheKey::bare(Scope::project("proj"))
  }

  fn grouped_key(group_by: &str) -> CacheKey {
    CacheKey::new(
      Scope::project("proj"),
      QueryParams::new().with("group_by", group_by),
    )
  }

  fn cached_issue(cache: &IssueCache, key: &CacheKey, id: &str) -> Option<Issue> {
    cache.read(key)?.value.find_issue(id).cloned()
  }

  fn drain(events: &mut broadcast::Receiver<CacheEvent>) -> Vec<CacheEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
      seen.push(event);
    }
    seen
  }

  fn with_priority(id: &str, priority: Priority) -> Issue {
    let mut issue = test_issue(id);
    issue.priority = priority;
    issue
  }

  fn with_state(id: &str, state: &str, name: &str) -> Issue {
    let mut issue = test_issue(id);
    issue.set_state(
      state,
      Some(StateDetail {
        id: state.to_string(),
        name: name.to_string(),
        group: StateGroup::Unstarted,
        color: String::new(),
      }),
    );
    issue
  }

  fn with_labels(id: &str, labels: &[&str]) -> Issue {
    let mut issue = test_issue(id);
    let details: Vec<LabelLite> = labels
      .iter()
      .map(|l| LabelLite {
        id: l.to_string(),
        name: l.to_uppercase(),
        color: String::new(),
      })
      .collect();
    issue.set_labels(labels.iter().map(|l| l.to_string()).collect(), &details);
    issue
  }

  fn high() -> IssuePatch {
    IssuePatch {
      priority: Some(Priority::High),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_patch_visible_before_remote_and_rolled_back_on_failure() {
    let issue = with_priority("1", Priority::Low);
    let mut h = harness(vec![issue.clone()]);
    let key = flat_key();
    h.cache.load(&key).await.unwrap();
    h.service.hold_writes();
    h.service.fail_writes(true);

    let pending = h.coordinator.patch(&issue, &[key.clone()], high()).unwrap();
    assert_eq!(
      cached_issue(&h.cache, &key, "1").unwrap().priority,
      Priority::High
    );

    h.service.release_writes();
    let err = pending.settle().await.unwrap_err();
    assert!(matches!(err, MutationError::Remote(_)));
    assert_eq!(
      cached_issue(&h.cache, &key, "1").unwrap().priority,
      Priority::Low
    );

    let note = h.notes.try_recv().unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
    assert!(note.message.contains("Something went wrong"));
  }

  #[tokio::test]
  async fn test_patch_success_keeps_optimistic_value() {
    let issue = with_priority("1", Priority::Low);
    let h = harness(vec![issue.clone()]);
    let key = flat_key();
    h.cache.load(&key).await.unwrap();

    let updated = h
      .coordinator
      .patch(&issue, &[key.clone()], high())
      .unwrap()
      .settle()
      .await
      .unwrap();
    assert_eq!(updated.priority, Priority::High);
    assert_eq!(
      cached_issue(&h.cache, &key, "1").unwrap().priority,
      Priority::High
    );
    assert_eq!(h.service.stored("1").unwrap().priority, Priority::High);
  }

  #[tokio::test]
  async fn test_empty_patch_is_rejected() {
    let issue = test_issue("1");
    let h = harness(vec![issue.clone()]);
    let err = h
      .coordinator
      .patch(&issue, &[flat_key()], IssuePatch::default())
      .unwrap_err();
    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(h.service.write_calls(), 0);
  }

  #[tokio::test]
  async fn test_patch_reaches_parent_sub_issues() {
    let mut child = with_priority("c", Priority::Low);
    child.parent = Some("p".to_string());
    let h = harness(vec![test_issue("p"), child.clone()]);
    let list = flat_key();
    let subs = CacheKey::bare(Scope::sub_issues("proj", "p"));
    h.cache.load(&list).await.unwrap();
    h.cache.load(&subs).await.unwrap();

    h.service.hold_writes();
    let pending = h.coordinator.patch(&child, &[list.clone()], high()).unwrap();
    assert_eq!(
      cached_issue(&h.cache, &subs, "c").unwrap().priority,
      Priority::High
    );
    h.service.release_writes();
    pending.settle().await.unwrap();
  }

  #[tokio::test]
  async fn test_activity_refetched_after_success() {
    let issue = test_issue("1");
    let h = harness(vec![issue.clone()]);
    let list = flat_key();
    let activity = CacheKey::bare(Scope::activity("proj", "1"));
    h.cache.load(&list).await.unwrap();
    h.cache.load(&activity).await.unwrap();
    let mut events = h.cache.subscribe();

    h.coordinator
      .patch(&issue, &[list], high())
      .unwrap()
      .settle()
      .await
      .unwrap();
    let invalidated = drain(&mut events)
      .into_iter()
      .any(|e| matches!(e, CacheEvent::Invalidated { key } if key == activity));
    assert!(invalidated);
  }

  #[tokio::test]
  async fn test_sort_order_change_is_refetched() {
    let issue = test_issue("1");
    let h = harness(vec![issue.clone()]);
    let key = flat_key();
    h.cache.load(&key).await.unwrap();
    let mut events = h.cache.subscribe();

    let patch = IssuePatch {
      sort_order: Some(12.5),
      ..Default::default()
    };
    h.coordinator
      .patch(&issue, &[key.clone()], patch)
      .unwrap()
      .settle()
      .await
      .unwrap();
    let revalidated = drain(&mut events)
      .into_iter()
      .any(|e| matches!(e, CacheEvent::Revalidated { key: k, .. } if k == key));
    assert!(revalidated);
  }

  #[tokio::test]
  async fn test_drop_in_same_group_is_noop() {
    let h = harness(vec![test_issue("1")]);
    let key = grouped_key("priority");
    h.cache.load(&key).await.unwrap();
    let version = h.cache.read(&key).unwrap().version;
    let mut events = h.cache.subscribe();

    let outcome = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::none(), 0, GroupKey::none(), 0),
      )
      .unwrap();
    assert!(outcome.is_noop());
    assert_eq!(h.service.write_calls(), 0);
    assert_eq!(h.cache.read(&key).unwrap().version, version);
    assert!(events.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_priority_drag_moves_issue_and_sends_field() {
    let h = harness(vec![test_issue("1"), with_priority("2", Priority::High)]);
    let key = grouped_key("priority");
    h.cache.load(&key).await.unwrap();
    h.service.hold_writes();

    let outcome = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::none(), 0, GroupKey::new("high"), 0),
      )
      .unwrap();

    let cached = h.cache.read(&key).unwrap();
    let CacheValue::Grouped(grouped) = &cached.value else {
      panic!("expected grouped value");
    };
    let high_ids: Vec<&str> = grouped
      .get(&GroupKey::new("high"))
      .unwrap()
      .iter()
      .map(|i| i.id.as_str())
      .collect();
    assert!(high_ids.contains(&"1"));
    assert!(grouped.get(&GroupKey::none()).unwrap_or_default().is_empty());

    h.service.release_writes();
    let MoveOutcome::Moved(pending) = outcome else {
      panic!("expected a move");
    };
    pending.settle().await.unwrap();
    assert_eq!(h.service.patches(), vec![("1".to_string(), high())]);
  }

  #[tokio::test]
  async fn test_state_drag_carries_destination_detail() {
    let h = harness(vec![
      with_state("1", "todo", "Todo"),
      with_state("2", "done", "Done"),
    ]);
    let key = grouped_key("state");
    h.cache.load(&key).await.unwrap();

    let outcome = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::new("todo"), 0, GroupKey::new("done"), 0),
      )
      .unwrap();
    let moved = cached_issue(&h.cache, &key, "1").unwrap();
    assert_eq!(moved.state, "done");
    assert_eq!(moved.state_detail.unwrap().name, "Done");

    let MoveOutcome::Moved(pending) = outcome else {
      panic!("expected a move");
    };
    assert_eq!(pending.settle().await.unwrap().state, "done");
  }

  #[tokio::test]
  async fn test_label_drag_swaps_label_and_keeps_other_copies() {
    let h = harness(vec![
      with_labels("1", &["bug", "ui"]),
      with_labels("2", &["docs"]),
    ]);
    let key = grouped_key("labels");
    h.cache.load(&key).await.unwrap();

    let outcome = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::new("bug"), 0, GroupKey::new("docs"), 0),
      )
      .unwrap();

    let cached = h.cache.read(&key).unwrap();
    let CacheValue::Grouped(grouped) = &cached.value else {
      panic!("expected grouped value");
    };
    let holds = |label: &str| {
      grouped
        .get(&GroupKey::new(label))
        .unwrap_or_default()
        .iter()
        .any(|i| i.id == "1")
    };
    assert!(!holds("bug"));
    assert!(holds("docs"));
    assert!(holds("ui"));
    let copy = grouped.find("1").unwrap();
    assert_eq!(copy.labels, vec!["ui".to_string(), "docs".to_string()]);
    assert!(copy.details_in_lockstep());

    let MoveOutcome::Moved(pending) = outcome else {
      panic!("expected a move");
    };
    pending.settle().await.unwrap();
  }

  #[tokio::test]
  async fn test_manual_order_drop_between_neighbours() {
    let mut a = test_issue("a");
    a.sort_order = 100.0;
    let mut b = with_priority("b", Priority::High);
    b.sort_order = 200.0;
    let mut c = with_priority("c", Priority::High);
    c.sort_order = 300.0;
    let h = harness(vec![a, b, c]);
    let key = CacheKey::new(
      Scope::project("proj"),
      QueryParams::new()
        .with("group_by", "priority")
        .with("order_by", "sort_order"),
    );
    h.cache.load(&key).await.unwrap();

    let outcome = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::none(), 0, GroupKey::new("high"), 1),
      )
      .unwrap();
    let MoveOutcome::Moved(pending) = outcome else {
      panic!("expected a move");
    };
    pending.settle().await.unwrap();

    let patches = h.service.patches();
    assert_eq!(patches[0].1.sort_order, Some(250.0));
    let cached = h.cache.read(&key).unwrap();
    let CacheValue::Grouped(grouped) = &cached.value else {
      panic!("expected grouped value");
    };
    let order: Vec<&str> = grouped
      .get(&GroupKey::new("high"))
      .unwrap()
      .iter()
      .map(|i| i.id.as_str())
      .collect();
    assert_eq!(order, vec!["b", "a", "c"]);
  }

  async fn drop_into_descending_high(index: usize) -> (Option<f64>, Vec<String>) {
    let a = test_issue("a");
    let mut b = with_priority("b", Priority::High);
    b.sort_order = 300.0;
    let mut c = with_priority("c", Priority::High);
    c.sort_order = 200.0;
    let h = harness(vec![a, b, c]);
    let key = CacheKey::new(
      Scope::project("proj"),
      QueryParams::new()
        .with("group_by", "priority")
        .with("order_by", "-sort_order"),
    );
    h.cache.load(&key).await.unwrap();
    h.service.hold_writes();

    let outcome = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::none(), 0, GroupKey::new("high"), index),
      )
      .unwrap();
    let cached = h.cache.read(&key).unwrap();
    let CacheValue::Grouped(grouped) = &cached.value else {
      panic!("expected grouped value");
    };
    let order: Vec<String> = grouped
      .get(&GroupKey::new("high"))
      .unwrap()
      .iter()
      .map(|i| i.id.clone())
      .collect();

    h.service.release_writes();
    let MoveOutcome::Moved(pending) = outcome else {
      panic!("expected a move");
    };
    pending.settle().await.unwrap();
    (h.service.patches()[0].1.sort_order, order)
  }

  #[tokio::test]
  async fn test_descending_manual_order_drop_lands_at_index() {
    let (sort_order, order) = drop_into_descending_high(0).await;
    assert_eq!(sort_order, Some(10300.0));
    assert_eq!(order, vec!["a", "b", "c"]);

    let (sort_order, order) = drop_into_descending_high(1).await;
    assert_eq!(sort_order, Some(250.0));
    assert_eq!(order, vec!["b", "a", "c"]);

    let (sort_order, order) = drop_into_descending_high(2).await;
    assert_eq!(sort_order, Some(-9800.0));
    assert_eq!(order, vec!["b", "c", "a"]);
  }

  #[tokio::test]
  async fn test_discard_deletes() {
    let mut h = harness(vec![test_issue("1")]);
    let key = grouped_key("priority");
    h.cache.load(&key).await.unwrap();

    let outcome = h
      .coordinator
      .move_issue(&key, DragMove::discard(GroupKey::none(), 0))
      .unwrap();
    assert!(!h.cache.read(&key).unwrap().value.contains_issue("1"));

    let MoveOutcome::Deleted(pending) = outcome else {
      panic!("expected a delete");
    };
    pending.settle().await.unwrap();
    assert!(h.service.stored("1").is_none());
    assert_eq!(h.notes.try_recv().unwrap().message, "Issue deleted successfully");
  }

  #[tokio::test]
  async fn test_undraggable_grouping_is_rejected() {
    let mut issue = test_issue("1");
    issue.created_by = Some("u1".to_string());
    let h = harness(vec![issue]);
    let key = grouped_key("created_by");
    h.cache.load(&key).await.unwrap();

    let err = h
      .coordinator
      .move_issue(
        &key,
        DragMove::to_group(GroupKey::new("u1"), 0, GroupKey::new("u2"), 0),
      )
      .unwrap_err();
    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(h.service.write_calls(), 0);
  }

  #[tokio::test]
  async fn test_create_swaps_placeholder_for_server_record() {
    let mut h = harness(vec![]);
    let key = flat_key();
    h.cache.load(&key).await.unwrap();
    h.service.hold_writes();

    let pending = h
      .coordinator
      .create("proj", &key, IssueDraft::new("Write docs"))
      .unwrap();
    assert!(h.cache.read(&key).unwrap().value.contains_issue("pending-1"));

    h.service.release_writes();
    let created = pending.settle().await.unwrap();
    let value = h.cache.read(&key).unwrap().value;
    assert!(value.contains_issue(&created.id));
    assert!(!value.contains_issue("pending-1"));
    assert_eq!(h.notes.try_recv().unwrap().kind, NotificationKind::Success);
  }

  #[tokio::test]
  async fn test_failed_create_removes_placeholder() {
    let h = harness(vec![]);
    let key = flat_key();
    h.cache.load(&key).await.unwrap();
    h.service.fail_writes(true);

    let pending = h
      .coordinator
      .create("proj", &key, IssueDraft::new("Write docs"))
      .unwrap();
    assert_eq!(h.cache.read(&key).unwrap().value.len(), 1);

    assert!(pending.settle().await.is_err());
    assert!(h.cache.read(&key).unwrap().value.is_empty());
  }

  #[tokio::test]
  async fn test_create_needs_a_name() {
    let h = harness(vec![]);
    let err = h
      .coordinator
      .create("proj", &flat_key(), IssueDraft::new("  "))
      .unwrap_err();
    assert!(matches!(err, MutationError::Validation(_)));
  }

  #[tokio::test]
  async fn test_move_to_date() {
    let mut issue = test_issue("1");
    issue.target_date = NaiveDate::from_ymd_opt(2024, 3, 1);
    let h = harness(vec![issue]);
    let key = flat_key();
    h.cache.load(&key).await.unwrap();

    let same = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    assert!(h.coordinator.move_to_date(&key, "1", same).unwrap().is_noop());

    let next = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    let MoveOutcome::Moved(pending) = h.coordinator.move_to_date(&key, "1", next).unwrap() else {
      panic!("expected a move");
    };
    assert_eq!(
      cached_issue(&h.cache, &key, "1").unwrap().target_date,
      Some(next)
    );
    pending.settle().await.unwrap();
    assert_eq!(h.service.patches()[0].1.target_date, Some(Some(next)));
  }
}
