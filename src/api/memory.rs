use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

use super::{IssueReader, IssueWriter};
use crate::cache::{QueryParams, Scope};
use crate::error::RemoteError;
use crate::model::{
  Issue, IssueActivity, IssueDraft, IssuePatch, KnownDetails, StateDistribution, SubIssueResponse,
};
use crate::view::IssueFilters;

/// On-disk fixture format for `--fixture`.
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
  #[serde(default)]
  pub workspace: String,
  #[serde(default)]
  pub current_user: Option<String>,
  #[serde(default)]
  pub issues: Vec<Issue>,
  #[serde(default)]
  pub activity: Vec<IssueActivity>,
}

/// In-process issue service backed by a vector.
///
/// Filters and orders like the server would. Reads and writes can be made to
/// fail, and writes can be held in flight until released.
#[derive(Debug, Default)]
pub struct MemoryIssueService {
  workspace: String,
  current_user: Option<String>,
  issues: Mutex<Vec<Issue>>,
  activity: Mutex<Vec<IssueActivity>>,
  next_id: AtomicU64,

  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
  writes_held: AtomicBool,
  write_gate: Notify,

  read_calls: AtomicUsize,
  write_calls: AtomicUsize,
  patches: Mutex<Vec<(String, IssuePatch)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryIssueService {
  pub fn new(issues: Vec<Issue>) -> Self {
    Self {
      issues: Mutex::new(issues),
      next_id: AtomicU64::new(1),
      ..Self::default()
    }
  }

  pub fn from_fixture(fixture: Fixture) -> Self {
    Self {
      workspace: fixture.workspace,
      current_user: fixture.current_user,
      activity: Mutex::new(fixture.activity),
      ..Self::new(fixture.issues)
    }
  }

  /// Load a JSON fixture file.
  pub fn from_file(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read fixture {}: {}", path.display(), e))?;
    let fixture: Fixture = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse fixture {}: {}", path.display(), e))?;
    Ok(Self::from_fixture(fixture))
  }

  pub fn with_current_user(mut self, user_id: impl Into<String>) -> Self {
    self.current_user = Some(user_id.into());
    self
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Park every write until [`release_writes`](Self::release_writes).
  pub fn hold_writes(&self) {
    self.writes_held.store(true, Ordering::SeqCst);
  }

  pub fn release_writes(&self) {
    self.writes_held.store(false, Ordering::SeqCst);
    self.write_gate.notify_waiters();
  }

  pub fn read_calls(&self) -> usize {
    self.read_calls.load(Ordering::SeqCst)
  }

  pub fn write_calls(&self) -> usize {
    self.write_calls.load(Ordering::SeqCst)
  }

  /// Patches received, in arrival order.
  pub fn patches(&self) -> Vec<(String, IssuePatch)> {
    lock(&self.patches).clone()
  }

  /// Server-side copy of an issue.
  pub fn stored(&self, issue_id: &str) -> Option<Issue> {
    lock(&self.issues).iter().find(|i| i.id == issue_id).cloned()
  }

  /// Change the server copy directly, bypassing the write path.
  pub fn update_stored(&self, issue_id: &str, f: impl FnOnce(&mut Issue)) {
    if let Some(issue) = lock(&self.issues).iter_mut().find(|i| i.id == issue_id) {
      f(issue);
    }
  }

  fn begin_read(&self) -> Result<(), RemoteError> {
    self.read_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(RemoteError::network("connection refused"));
    }
    Ok(())
  }

  async fn begin_write(&self) -> Result<(), RemoteError> {
    self.write_calls.fetch_add(1, Ordering::SeqCst);
    loop {
      let released = self.write_gate.notified();
      if !self.writes_held.load(Ordering::SeqCst) {
        break;
      }
      released.await;
    }
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(RemoteError::new("500", "Something went wrong. Please try again."));
    }
    Ok(())
  }

  fn in_scope(&self, issue: &Issue, scope: &Scope) -> bool {
    match scope {
      Scope::ProjectIssues { project_id } | Scope::ViewIssues { project_id, .. } => {
        issue.project == *project_id
      }
      Scope::CycleIssues {
        project_id,
        cycle_id,
      } => issue.project == *project_id && issue.cycle.as_deref() == Some(cycle_id),
      Scope::ModuleIssues {
        project_id,
        module_id,
      } => issue.project == *project_id && issue.module.as_deref() == Some(module_id),
      Scope::UserIssues { workspace, user_id } => {
        let same_workspace = issue.workspace.is_empty() || issue.workspace == *workspace;
        match user_id.as_ref().or(self.current_user.as_ref()) {
          Some(user) => same_workspace && issue.assignees.contains(user),
          None => same_workspace,
        }
      }
      Scope::SubIssues { .. } | Scope::IssueDetails { .. } | Scope::IssueActivity { .. } => false,
    }
  }

  fn record(&self, issue_id: &str, verb: &str, field: Option<&str>, new_value: Option<String>) {
    let mut activity = lock(&self.activity);
    let id = format!("activity-{}", activity.len() + 1);
    activity.push(IssueActivity {
      id,
      issue: issue_id.to_string(),
      verb: verb.to_string(),
      field: field.map(str::to_string),
      old_value: None,
      new_value,
      actor: self.current_user.clone(),
      comment: String::new(),
      created_at: Utc::now(),
    });
  }
}

#[async_trait]
impl IssueReader for MemoryIssueService {
  async fn list_issues(&self, scope: &Scope, params: &QueryParams) -> Result<Vec<Issue>, RemoteError> {
    self.begin_read()?;
    if !scope.is_list() {
      return Err(RemoteError::new(
        "400",
        format!("{} scope does not list issues", scope.kind()),
      ));
    }

    let filters = IssueFilters::from_params(params);
    let top_level_only = params.get("sub_issue") == Some("false");
    let mut issues: Vec<Issue> = lock(&self.issues)
      .iter()
      .filter(|i| self.in_scope(i, scope))
      .filter(|i| filters.matches(i))
      .filter(|i| !top_level_only || i.parent.is_none())
      .cloned()
      .collect();
    params.order_by().unwrap_or_default().sort(&mut issues);

    debug!("memory: {} issues for {}", issues.len(), scope.kind());
    Ok(issues)
  }

  async fn sub_issues(&self, project_id: &str, parent_id: &str) -> Result<SubIssueResponse, RemoteError> {
    self.begin_read()?;
    let sub_issues: Vec<Issue> = lock(&self.issues)
      .iter()
      .filter(|i| i.project == project_id && i.parent.as_deref() == Some(parent_id))
      .cloned()
      .collect();
    Ok(SubIssueResponse {
      state_distribution: StateDistribution::from_issues(&sub_issues),
      sub_issues,
    })
  }

  async fn issue(&self, project_id: &str, issue_id: &str) -> Result<Issue, RemoteError> {
    self.begin_read()?;
    lock(&self.issues)
      .iter()
      .find(|i| i.project == project_id && i.id == issue_id)
      .cloned()
      .ok_or_else(|| RemoteError::not_found(format!("issue {}", issue_id)))
  }

  async fn activity(&self, _project_id: &str, issue_id: &str) -> Result<Vec<IssueActivity>, RemoteError> {
    self.begin_read()?;
    Ok(
      lock(&self.activity)
        .iter()
        .filter(|a| a.issue == issue_id)
        .cloned()
        .collect(),
    )
  }
}

#[async_trait]
impl IssueWriter for MemoryIssueService {
  async fn create_issue(&self, project_id: &str, draft: &IssueDraft) -> Result<Issue, RemoteError> {
    self.begin_write().await?;
    let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
    let issue = {
      let mut issues = lock(&self.issues);
      let known = KnownDetails::from_issues(issues.iter());
      let mut issue = draft.to_issue(&format!("issue-{}", seq), project_id, Utc::now(), &known);
      issue.sequence_id = seq;
      issue.workspace = self.workspace.clone();
      issues.push(issue.clone());
      issue
    };
    self.record(&issue.id, "created", None, Some(issue.name.clone()));
    Ok(issue)
  }

  async fn patch_issue(
    &self,
    project_id: &str,
    issue_id: &str,
    patch: &IssuePatch,
  ) -> Result<Issue, RemoteError> {
    self.begin_write().await?;
    lock(&self.patches).push((issue_id.to_string(), patch.clone()));

    let updated = {
      let mut issues = lock(&self.issues);
      let known = KnownDetails::from_issues(issues.iter());
      let issue = issues
        .iter_mut()
        .find(|i| i.project == project_id && i.id == issue_id)
        .ok_or_else(|| RemoteError::not_found(format!("issue {}", issue_id)))?;
      patch.apply_to(issue, &known);
      issue.updated_at = Utc::now();
      issue.clone()
    };
    for field in patch.fields() {
      self.record(issue_id, "updated", Some(field), None);
    }
    Ok(updated)
  }

  async fn delete_issue(&self, project_id: &str, issue_id: &str) -> Result<(), RemoteError> {
    self.begin_write().await?;
    let removed = {
      let mut issues = lock(&self.issues);
      let before = issues.len();
      issues.retain(|i| !(i.project == project_id && i.id == issue_id));
      issues.len() != before
    };
    if !removed {
      return Err(RemoteError::not_found(format!("issue {}", issue_id)));
    }
    self.record(issue_id, "deleted", None, None);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{test_issue, Priority};
  use std::io::Write;
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_list_filters_and_orders() {
    let mut a = test_issue("a");
    a.priority = Priority::Low;
    let mut b = test_issue("b");
    b.priority = Priority::Urgent;
    let mut c = test_issue("c");
    c.priority = Priority::High;
    c.project = "other".to_string();
    let service = MemoryIssueService::new(vec![a, b, c]);

    let params = QueryParams::new().with("order_by", "priority");
    let ids: Vec<String> = service
      .list_issues(&Scope::project("proj"), &params)
      .await
      .unwrap()
      .into_iter()
      .map(|i| i.id)
      .collect();
    assert_eq!(ids, vec!["b", "a"]);

    let params = params.with("priority", "low");
    let filtered = service
      .list_issues(&Scope::project("proj"), &params)
      .await
      .unwrap();
    assert_eq!(filtered.len(), 1);
  }

  #[tokio::test]
  async fn test_patch_records_and_applies() {
    let service = MemoryIssueService::new(vec![test_issue("1")]);
    let patch = IssuePatch {
      priority: Some(Priority::High),
      ..Default::default()
    };
    let updated = service.patch_issue("proj", "1", &patch).await.unwrap();

    assert_eq!(updated.priority, Priority::High);
    assert_eq!(service.write_calls(), 1);
    assert_eq!(service.patches(), vec![("1".to_string(), patch)]);
    assert_eq!(service.activity("proj", "1").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_injected_failures() {
    let service = MemoryIssueService::new(vec![test_issue("1")]);
    service.fail_writes(true);
    let err = service.delete_issue("proj", "1").await.unwrap_err();
    assert_eq!(err.code, "500");
    assert!(service.stored("1").is_some());

    service.fail_reads(true);
    let err = service.issue("proj", "1").await.unwrap_err();
    assert_eq!(err.code, "network");
  }

  #[tokio::test]
  async fn test_held_write_waits_for_release() {
    let service = Arc::new(MemoryIssueService::new(vec![test_issue("1")]));
    service.hold_writes();

    let task = {
      let service = service.clone();
      tokio::spawn(async move { service.delete_issue("proj", "1").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());
    assert!(service.stored("1").is_some());

    service.release_writes();
    task.await.unwrap().unwrap();
    assert!(service.stored("1").is_none());
  }

  #[tokio::test]
  async fn test_sub_issues_and_user_scope() {
    let mut child = test_issue("child");
    child.parent = Some("parent".to_string());
    child.assignees = vec!["u1".to_string()];
    let service = MemoryIssueService::new(vec![test_issue("parent"), child]);

    let subs = service.sub_issues("proj", "parent").await.unwrap();
    assert_eq!(subs.sub_issues.len(), 1);

    let mine = Scope::UserIssues {
      workspace: "acme".to_string(),
      user_id: Some("u1".to_string()),
    };
    let issues = service.list_issues(&mine, &QueryParams::new()).await.unwrap();
    assert_eq!(issues.len(), 1);

    let top = QueryParams::new().with("sub_issue", "false");
    let issues = service.list_issues(&Scope::project("proj"), &top).await.unwrap();
    assert_eq!(issues.len(), 1);
  }

  #[test]
  fn test_loads_fixture_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"workspace": "acme", "issues": [{{"id": "1", "priority": "high",
        "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"}}]}}"#
    )
    .unwrap();

    let service = MemoryIssueService::from_file(file.path()).unwrap();
    assert_eq!(service.stored("1").unwrap().priority, Priority::High);
  }
}
