//! Serde types matching the REST API's response envelopes.
//!
//! Domain records deserialize directly; these wrappers only cover the
//! different shapes the list endpoints hand back.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use crate::model::{Issue, IssueActivity};

// ============================================================================
// List endpoints
// ============================================================================

/// Issue list payload. Depending on the endpoint and query the server sends a
/// bare array, a paginated object or a map of group key to issues.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiIssueList {
  Flat(Vec<Issue>),
  Paged { results: Vec<Issue> },
  Grouped(BTreeMap<String, Vec<Issue>>),
}

impl ApiIssueList {
  /// Flatten to a list, keeping each issue once in first-seen order.
  pub fn into_issues(self) -> Vec<Issue> {
    match self {
      ApiIssueList::Flat(issues) | ApiIssueList::Paged { results: issues } => issues,
      ApiIssueList::Grouped(groups) => {
        let mut seen = HashSet::new();
        groups
          .into_values()
          .flatten()
          .filter(|issue| seen.insert(issue.id.clone()))
          .collect()
      }
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiActivityList {
  Flat(Vec<IssueActivity>),
  Paged { results: Vec<IssueActivity> },
}

impl ApiActivityList {
  pub fn into_activity(self) -> Vec<IssueActivity> {
    match self {
      ApiActivityList::Flat(items) | ApiActivityList::Paged { results: items } => items,
    }
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error body. The API uses either `detail` or `error` for the message.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub detail: Option<String>,
  pub error: Option<String>,
}

impl ApiErrorBody {
  pub fn message(self) -> Option<String> {
    self.detail.or(self.error)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn issue_json(id: &str) -> serde_json::Value {
    json!({
      "id": id,
      "name": format!("Issue {}", id),
      "priority": null,
      "created_at": "2024-01-01T00:00:00Z",
      "updated_at": "2024-01-01T00:00:00Z"
    })
  }

  #[test]
  fn test_parses_flat_list() {
    let list: ApiIssueList = serde_json::from_value(json!([issue_json("1")])).unwrap();
    assert_eq!(list.into_issues().len(), 1);
  }

  #[test]
  fn test_parses_paged_list() {
    let list: ApiIssueList =
      serde_json::from_value(json!({"results": [issue_json("1"), issue_json("2")]})).unwrap();
    assert_eq!(list.into_issues().len(), 2);
  }

  #[test]
  fn test_grouped_list_dedupes_fan_out() {
    let list: ApiIssueList = serde_json::from_value(json!({
      "bug": [issue_json("1")],
      "ui": [issue_json("1"), issue_json("2")]
    }))
    .unwrap();
    let ids: Vec<String> = list.into_issues().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["1", "2"]);
  }

  #[test]
  fn test_error_message_prefers_detail() {
    let body: ApiErrorBody =
      serde_json::from_value(json!({"detail": "Not found.", "error": "x"})).unwrap();
    assert_eq!(body.message().as_deref(), Some("Not found."));
  }
}
