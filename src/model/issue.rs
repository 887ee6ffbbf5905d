use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Issue priority. `None` covers both the literal "none" and a null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
  Urgent,
  High,
  Medium,
  Low,
  #[default]
  None,
}

impl Priority {
  pub const ALL: [Priority; 5] = [
    Priority::Urgent,
    Priority::High,
    Priority::Medium,
    Priority::Low,
    Priority::None,
  ];

  /// Fixed rank used by priority ordering (urgent first).
  pub fn rank(self) -> u8 {
    match self {
      Priority::Urgent => 0,
      Priority::High => 1,
      Priority::Medium => 2,
      Priority::Low => 3,
      Priority::None => 4,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Priority::Urgent => "urgent",
      Priority::High => "high",
      Priority::Medium => "medium",
      Priority::Low => "low",
      Priority::None => "none",
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Priority {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "urgent" => Ok(Priority::Urgent),
      "high" => Ok(Priority::High),
      "medium" => Ok(Priority::Medium),
      "low" => Ok(Priority::Low),
      "none" | "null" | "" => Ok(Priority::None),
      _ => Err(ParseError::new("priority", s)),
    }
  }
}

// The API speaks `null` for "no priority", so `None` goes out as null.
impl Serialize for Priority {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Priority::None => serializer.serialize_none(),
      other => serializer.serialize_str(other.as_str()),
    }
  }
}

impl<'de> Deserialize<'de> for Priority {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
      None => Ok(Priority::None),
      Some(s) => s.parse().map_err(serde::de::Error::custom),
    }
  }
}

/// Workflow category a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateGroup {
  Backlog,
  Unstarted,
  Started,
  Completed,
  Cancelled,
}

impl StateGroup {
  pub const ALL: [StateGroup; 5] = [
    StateGroup::Backlog,
    StateGroup::Unstarted,
    StateGroup::Started,
    StateGroup::Completed,
    StateGroup::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      StateGroup::Backlog => "backlog",
      StateGroup::Unstarted => "unstarted",
      StateGroup::Started => "started",
      StateGroup::Completed => "completed",
      StateGroup::Cancelled => "cancelled",
    }
  }

  pub fn rank(self) -> u8 {
    self as u8
  }
}

impl fmt::Display for StateGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StateGroup {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    StateGroup::ALL
      .into_iter()
      .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| ParseError::new("state group", s))
  }
}

/// Snapshot of the state an issue points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDetail {
  pub id: String,
  pub name: String,
  pub group: StateGroup,
  #[serde(default)]
  pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLite {
  pub id: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub avatar: Option<String>,
}

impl UserLite {
  /// Stand-in detail for an id we have no snapshot for yet.
  pub fn placeholder(id: &str) -> Self {
    Self {
      id: id.to_string(),
      display_name: id.to_string(),
      first_name: String::new(),
      last_name: String::new(),
      avatar: None,
    }
  }

  /// Name shown to users: full name if known, else the display name.
  pub fn name(&self) -> String {
    if self.first_name.is_empty() {
      self.display_name.clone()
    } else {
      format!("{} {}", self.first_name, self.last_name)
        .trim()
        .to_string()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelLite {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub color: String,
}

impl LabelLite {
  pub fn placeholder(id: &str) -> Self {
    Self {
      id: id.to_string(),
      name: id.to_string(),
      color: String::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentDetail {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub sequence_id: u64,
}

/// An issue record as served by the API.
///
/// Relationship fields come in pairs: an id list (`assignees`, `labels`) and a
/// detail snapshot list (`assignee_details`, `label_details`). The two must
/// hold the same set of ids; lookups go by id, not position. The counters at
/// the bottom are maintained by the server and never written locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub sequence_id: u64,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default)]
  pub state: String,
  #[serde(default)]
  pub state_detail: Option<StateDetail>,
  #[serde(default)]
  pub project: String,
  #[serde(default)]
  pub workspace: String,
  #[serde(default)]
  pub created_by: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default)]
  pub start_date: Option<NaiveDate>,
  #[serde(default)]
  pub target_date: Option<NaiveDate>,
  #[serde(default)]
  pub estimate_point: Option<i32>,
  #[serde(default)]
  pub sort_order: f64,
  #[serde(default)]
  pub assignees: Vec<String>,
  #[serde(default)]
  pub assignee_details: Vec<UserLite>,
  #[serde(default)]
  pub labels: Vec<String>,
  #[serde(default)]
  pub label_details: Vec<LabelLite>,
  #[serde(default)]
  pub parent: Option<String>,
  #[serde(default)]
  pub parent_detail: Option<ParentDetail>,
  #[serde(default)]
  pub cycle: Option<String>,
  #[serde(default)]
  pub module: Option<String>,

  #[serde(default)]
  pub sub_issues_count: u32,
  #[serde(default)]
  pub link_count: u32,
  #[serde(default)]
  pub attachment_count: u32,
}

impl Issue {
  /// Replace the assignee ids, keeping `assignee_details` in lock-step.
  ///
  /// Known details are kept; ids without a snapshot get a placeholder until
  /// the next revalidation brings the real one.
  pub fn set_assignees(&mut self, ids: Vec<String>, known: &[UserLite]) {
    self.assignee_details = ids
      .iter()
      .map(|id| {
        self
          .assignee_details
          .iter()
          .chain(known)
          .find(|u| &u.id == id)
          .cloned()
          .unwrap_or_else(|| UserLite::placeholder(id))
      })
      .collect();
    self.assignees = ids;
  }

  /// Replace the label ids, keeping `label_details` in lock-step.
  pub fn set_labels(&mut self, ids: Vec<String>, known: &[LabelLite]) {
    self.label_details = ids
      .iter()
      .map(|id| {
        self
          .label_details
          .iter()
          .chain(known)
          .find(|l| &l.id == id)
          .cloned()
          .unwrap_or_else(|| LabelLite::placeholder(id))
      })
      .collect();
    self.labels = ids;
  }

  /// Point the issue at another state. The detail snapshot is dropped unless
  /// one for the new state is supplied.
  pub fn set_state(&mut self, state_id: &str, detail: Option<StateDetail>) {
    self.state = state_id.to_string();
    self.state_detail = detail.filter(|d| d.id == state_id);
  }

  /// Whether every id list matches its detail list.
  pub fn details_in_lockstep(&self) -> bool {
    fn same<'a>(ids: &'a [String], detail_ids: impl Iterator<Item = &'a String>) -> bool {
      let mut a: Vec<&String> = ids.iter().collect();
      let mut b: Vec<&String> = detail_ids.collect();
      a.sort();
      b.sort();
      a == b
    }

    same(&self.assignees, self.assignee_details.iter().map(|u| &u.id))
      && same(&self.labels, self.label_details.iter().map(|l| &l.id))
  }

  pub fn state_group(&self) -> Option<StateGroup> {
    self.state_detail.as_ref().map(|s| s.group)
  }

  /// Alphabetically first assignee name, used by `assignees__name` ordering.
  pub fn first_assignee_name(&self) -> Option<String> {
    self
      .assignee_details
      .iter()
      .map(|u| u.name().to_lowercase())
      .min()
  }

  /// Alphabetically first label name, used by `labels__name` ordering.
  pub fn first_label_name(&self) -> Option<String> {
    self
      .label_details
      .iter()
      .map(|l| l.name.to_lowercase())
      .min()
  }
}

/// Count of sub-issues per state category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDistribution {
  #[serde(default)]
  pub backlog: u32,
  #[serde(default)]
  pub unstarted: u32,
  #[serde(default)]
  pub started: u32,
  #[serde(default)]
  pub completed: u32,
  #[serde(default)]
  pub cancelled: u32,
}

impl StateDistribution {
  /// Tally sub-issues by the group of their state snapshot.
  pub fn from_issues(issues: &[Issue]) -> Self {
    let mut dist = Self::default();
    for group in issues.iter().filter_map(Issue::state_group) {
      match group {
        StateGroup::Backlog => dist.backlog += 1,
        StateGroup::Unstarted => dist.unstarted += 1,
        StateGroup::Started => dist.started += 1,
        StateGroup::Completed => dist.completed += 1,
        StateGroup::Cancelled => dist.cancelled += 1,
      }
    }
    dist
  }
}

/// Response of the sub-issues endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubIssueResponse {
  #[serde(default)]
  pub state_distribution: StateDistribution,
  #[serde(default)]
  pub sub_issues: Vec<Issue>,
}

/// One entry of an issue's activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueActivity {
  pub id: String,
  #[serde(default)]
  pub issue: String,
  #[serde(default)]
  pub verb: String,
  #[serde(default)]
  pub field: Option<String>,
  #[serde(default)]
  pub old_value: Option<String>,
  #[serde(default)]
  pub new_value: Option<String>,
  #[serde(default)]
  pub actor: Option<String>,
  #[serde(default)]
  pub comment: String,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::test_issue;

  #[test]
  fn test_priority_rank_order() {
    let ranks: Vec<u8> = Priority::ALL.iter().map(|p| p.rank()).collect();
    assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn test_priority_null_round_trip() {
    let p: Priority = serde_json::from_str("null").unwrap();
    assert_eq!(p, Priority::None);
    assert_eq!(serde_json::to_string(&Priority::None).unwrap(), "null");
    assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
  }

  #[test]
  fn test_priority_parse_rejects_unknown() {
    assert!("blocker".parse::<Priority>().is_err());
    assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
  }

  #[test]
  fn test_issue_deserialize_minimal() {
    let json = r#"{
      "id": "1",
      "name": "Fix login",
      "priority": null,
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-02T00:00:00Z"
    }"#;
    let issue: Issue = serde_json::from_str(json).unwrap();
    assert_eq!(issue.priority, Priority::None);
    assert!(issue.labels.is_empty());
    assert_eq!(issue.sort_order, 0.0);
  }

  #[test]
  fn test_set_labels_keeps_lockstep() {
    let mut issue = test_issue("1");
    issue.set_labels(
      vec!["bug".to_string()],
      &[LabelLite {
        id: "bug".to_string(),
        name: "Bug".to_string(),
        color: "#f00".to_string(),
      }],
    );
    issue.set_labels(vec!["bug".to_string(), "ui".to_string()], &[]);

    assert!(issue.details_in_lockstep());
    assert_eq!(issue.label_details[0].name, "Bug");
    assert_eq!(issue.label_details[1].name, "ui");
  }

  #[test]
  fn test_set_assignees_drops_removed_details() {
    let mut issue = test_issue("1");
    issue.set_assignees(vec!["u1".to_string(), "u2".to_string()], &[]);
    issue.set_assignees(vec!["u2".to_string()], &[]);

    assert_eq!(issue.assignee_details.len(), 1);
    assert_eq!(issue.assignee_details[0].id, "u2");
    assert!(issue.details_in_lockstep());
  }

  #[test]
  fn test_set_state_drops_mismatched_detail() {
    let mut issue = test_issue("1");
    issue.set_state(
      "s2",
      Some(StateDetail {
        id: "s1".to_string(),
        name: "Todo".to_string(),
        group: StateGroup::Unstarted,
        color: String::new(),
      }),
    );
    assert_eq!(issue.state, "s2");
    assert!(issue.state_detail.is_none());
  }

  #[test]
  fn test_state_distribution_counts_groups() {
    let mut a = test_issue("a");
    a.state_detail = Some(StateDetail {
      id: "s".to_string(),
      name: "Doing".to_string(),
      group: StateGroup::Started,
      color: String::new(),
    });
    let b = test_issue("b");
    let dist = StateDistribution::from_issues(&[a, b]);
    assert_eq!(dist.started, 1);
    assert_eq!(dist.backlog, 0);
  }
}
