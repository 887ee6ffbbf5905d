use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::issue::{Issue, LabelLite, Priority, StateDetail, UserLite};

/// Partial update sent to the write service and applied to cached copies.
///
/// Unset fields are left out of the request body. Nullable fields use a
/// double option so `Some(None)` serializes as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuePatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignees: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub labels: Option<Vec<String>>,
  #[serde(
    default,
    deserialize_with = "double_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub target_date: Option<Option<NaiveDate>>,
  #[serde(
    default,
    deserialize_with = "double_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub estimate_point: Option<Option<i32>>,
  #[serde(
    default,
    deserialize_with = "double_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub parent: Option<Option<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sort_order: Option<f64>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

/// Detail snapshots the caller already holds, used to keep the id and detail
/// lists in lock-step when a patch changes relationships.
#[derive(Debug, Clone, Default)]
pub struct KnownDetails {
  pub users: Vec<UserLite>,
  pub labels: Vec<LabelLite>,
  pub states: Vec<StateDetail>,
}

impl KnownDetails {
  /// Collect every snapshot carried by a set of issues.
  pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
    let mut known = Self::default();
    for issue in issues {
      for user in &issue.assignee_details {
        if !known.users.iter().any(|u| u.id == user.id) {
          known.users.push(user.clone());
        }
      }
      for label in &issue.label_details {
        if !known.labels.iter().any(|l| l.id == label.id) {
          known.labels.push(label.clone());
        }
      }
      if let Some(state) = &issue.state_detail {
        if !known.states.iter().any(|s| s.id == state.id) {
          known.states.push(state.clone());
        }
      }
    }
    known
  }

  pub fn state(&self, id: &str) -> Option<StateDetail> {
    self.states.iter().find(|s| s.id == id).cloned()
  }
}

impl IssuePatch {
  pub fn is_empty(&self) -> bool {
    self == &IssuePatch::default()
  }

  /// Names of the fields this patch touches, for logs and activity entries.
  pub fn fields(&self) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if self.name.is_some() {
      fields.push("name");
    }
    if self.priority.is_some() {
      fields.push("priority");
    }
    if self.state.is_some() {
      fields.push("state");
    }
    if self.assignees.is_some() {
      fields.push("assignees");
    }
    if self.labels.is_some() {
      fields.push("labels");
    }
    if self.target_date.is_some() {
      fields.push("target_date");
    }
    if self.estimate_point.is_some() {
      fields.push("estimate_point");
    }
    if self.parent.is_some() {
      fields.push("parent");
    }
    if self.sort_order.is_some() {
      fields.push("sort_order");
    }
    fields
  }

  /// Apply the patch to a local copy of an issue.
  ///
  /// Relationship changes keep their detail lists in lock-step using the
  /// supplied snapshots; server-maintained counters are never touched.
  pub fn apply_to(&self, issue: &mut Issue, known: &KnownDetails) {
    if let Some(name) = &self.name {
      issue.name = name.clone();
    }
    if let Some(priority) = self.priority {
      issue.priority = priority;
    }
    if let Some(state) = &self.state {
      if issue.state != *state {
        issue.set_state(state, known.state(state));
      }
    }
    if let Some(assignees) = &self.assignees {
      issue.set_assignees(assignees.clone(), &known.users);
    }
    if let Some(labels) = &self.labels {
      issue.set_labels(labels.clone(), &known.labels);
    }
    if let Some(target_date) = self.target_date {
      issue.target_date = target_date;
    }
    if let Some(estimate) = self.estimate_point {
      issue.estimate_point = estimate;
    }
    if let Some(parent) = &self.parent {
      if issue.parent != *parent {
        issue.parent_detail = None;
      }
      issue.parent = parent.clone();
    }
    if let Some(sort_order) = self.sort_order {
      issue.sort_order = sort_order;
    }
  }
}

/// Fields for a new issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueDraft {
  pub name: String,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub assignees: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub labels: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_date: Option<NaiveDate>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cycle: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub module: Option<String>,
}

impl IssueDraft {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  /// Build a local issue from the draft, used both for optimistic
  /// placeholders and by the in-memory service.
  pub fn to_issue(&self, id: &str, project: &str, now: DateTime<Utc>, known: &KnownDetails) -> Issue {
    let mut issue = Issue {
      id: id.to_string(),
      name: self.name.clone(),
      sequence_id: 0,
      priority: self.priority,
      state: String::new(),
      state_detail: None,
      project: project.to_string(),
      workspace: String::new(),
      created_by: None,
      created_at: now,
      updated_at: now,
      start_date: None,
      target_date: self.target_date,
      estimate_point: None,
      sort_order: 65535.0,
      assignees: Vec::new(),
      assignee_details: Vec::new(),
      labels: Vec::new(),
      label_details: Vec::new(),
      parent: self.parent.clone(),
      parent_detail: None,
      cycle: self.cycle.clone(),
      module: self.module.clone(),
      sub_issues_count: 0,
      link_count: 0,
      attachment_count: 0,
    };
    if let Some(state) = &self.state {
      issue.set_state(state, known.state(state));
    }
    issue.set_assignees(self.assignees.clone(), &known.users);
    issue.set_labels(self.labels.clone(), &known.labels);
    issue
  }
}
