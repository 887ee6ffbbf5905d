//! Issue records and the partial updates applied to them.

mod issue;
mod patch;

pub use issue::{
  Issue, IssueActivity, LabelLite, ParentDetail, Priority, StateDetail, StateDistribution,
  StateGroup, SubIssueResponse, UserLite,
};
pub use patch::{IssueDraft, IssuePatch, KnownDetails};

/// Bare issue for tests: fixed timestamps, no relationships.
#[cfg(test)]
pub(crate) fn test_issue(id: &str) -> Issue {
  use chrono::TimeZone;

  let at = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  Issue {
    id: id.to_string(),
    name: format!("Issue {}", id),
    sequence_id: 0,
    priority: Priority::None,
    state: String::new(),
    state_detail: None,
    project: "proj".to_string(),
    workspace: "acme".to_string(),
    created_by: None,
    created_at: at,
    updated_at: at,
    start_date: None,
    target_date: None,
    estimate_point: None,
    sort_order: 65535.0,
    assignees: Vec::new(),
    assignee_details: Vec::new(),
    labels: Vec::new(),
    label_details: Vec::new(),
    parent: None,
    parent_detail: None,
    cycle: None,
    module: None,
    sub_issues_count: 0,
    link_count: 0,
    attachment_count: 0,
  }
}
