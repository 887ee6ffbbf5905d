use crate::model::{Issue, IssueActivity, IssuePatch, KnownDetails, StateDistribution, SubIssueResponse};
use crate::view::{GroupedIssues, OrderBy};

/// Payload of a cache entry. The shape depends on the scope: flat lists for
/// ungrouped list scopes, grouped collections when the key carries a
/// group-by, and dedicated shapes for sub-issues, details and activity.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
  Issues(Vec<Issue>),
  Grouped(GroupedIssues),
  SubIssues(SubIssueResponse),
  Issue(Box<Issue>),
  Activity(Vec<IssueActivity>),
}

impl CacheValue {
  pub fn kind(&self) -> &'static str {
    match self {
      CacheValue::Issues(_) => "issues",
      CacheValue::Grouped(_) => "grouped",
      CacheValue::SubIssues(_) => "sub_issues",
      CacheValue::Issue(_) => "issue",
      CacheValue::Activity(_) => "activity",
    }
  }

  /// Every distinct issue held, in stored order.
  pub fn issues(&self) -> Vec<Issue> {
    match self {
      CacheValue::Issues(issues) => issues.clone(),
      CacheValue::Grouped(grouped) => grouped.unique_issues(),
      CacheValue::SubIssues(response) => response.sub_issues.clone(),
      CacheValue::Issue(issue) => vec![issue.as_ref().clone()],
      CacheValue::Activity(_) => Vec::new(),
    }
  }

  pub fn find_issue(&self, issue_id: &str) -> Option<&Issue> {
    match self {
      CacheValue::Issues(issues) => issues.iter().find(|i| i.id == issue_id),
      CacheValue::Grouped(grouped) => grouped.find(issue_id),
      CacheValue::SubIssues(response) => response.sub_issues.iter().find(|i| i.id == issue_id),
      CacheValue::Issue(issue) => (issue.id == issue_id).then_some(issue.as_ref()),
      CacheValue::Activity(_) => None,
    }
  }

  pub fn contains_issue(&self, issue_id: &str) -> bool {
    self.find_issue(issue_id).is_some()
  }

  /// Apply a patch to every copy of the issue. Returns whether anything changed.
  pub fn patch_issue(&mut self, issue_id: &str, patch: &IssuePatch, known: &KnownDetails) -> bool {
    match self {
      CacheValue::Issues(issues) => {
        let mut changed = false;
        for issue in issues.iter_mut().filter(|i| i.id == issue_id) {
          patch.apply_to(issue, known);
          changed = true;
        }
        changed
      }
      CacheValue::Grouped(grouped) => grouped.patch_issue(issue_id, patch, known),
      CacheValue::SubIssues(response) => {
        let mut changed = false;
        for issue in response.sub_issues.iter_mut().filter(|i| i.id == issue_id) {
          patch.apply_to(issue, known);
          changed = true;
        }
        if changed && patch.state.is_some() {
          response.state_distribution = StateDistribution::from_issues(&response.sub_issues);
        }
        changed
      }
      CacheValue::Issue(issue) if issue.id == issue_id => {
        patch.apply_to(issue, known);
        true
      }
      CacheValue::Issue(_) | CacheValue::Activity(_) => false,
    }
  }

  /// Drop every copy of the issue. A details entry cannot drop its own issue.
  pub fn remove_issue(&mut self, issue_id: &str) -> bool {
    match self {
      CacheValue::Issues(issues) => {
        let before = issues.len();
        issues.retain(|i| i.id != issue_id);
        issues.len() != before
      }
      CacheValue::Grouped(grouped) => grouped.remove_issue(issue_id),
      CacheValue::SubIssues(response) => {
        let before = response.sub_issues.len();
        response.sub_issues.retain(|i| i.id != issue_id);
        let removed = response.sub_issues.len() != before;
        if removed {
          response.state_distribution = StateDistribution::from_issues(&response.sub_issues);
        }
        removed
      }
      CacheValue::Issue(_) | CacheValue::Activity(_) => false,
    }
  }

  /// Add a new issue to a collection, keeping the given order.
  pub fn insert_issue(&mut self, issue: Issue, order_by: OrderBy) -> bool {
    match self {
      CacheValue::Issues(issues) => {
        issues.push(issue);
        order_by.sort(issues);
        true
      }
      CacheValue::Grouped(grouped) => {
        grouped.insert_issue(issue);
        true
      }
      CacheValue::SubIssues(response) => {
        response.sub_issues.push(issue);
        response.state_distribution = StateDistribution::from_issues(&response.sub_issues);
        true
      }
      CacheValue::Issue(_) | CacheValue::Activity(_) => false,
    }
  }

  /// Swap an issue, possibly held under a placeholder id, for a new record.
  pub fn replace_issue(&mut self, issue_id: &str, issue: Issue) -> bool {
    match self {
      CacheValue::Issues(issues) => match issues.iter_mut().find(|i| i.id == issue_id) {
        Some(slot) => {
          *slot = issue;
          true
        }
        None => false,
      },
      CacheValue::Grouped(grouped) => grouped.replace_issue(issue_id, issue),
      CacheValue::SubIssues(response) => {
        match response.sub_issues.iter_mut().find(|i| i.id == issue_id) {
          Some(slot) => {
            *slot = issue;
            response.state_distribution = StateDistribution::from_issues(&response.sub_issues);
            true
          }
          None => false,
        }
      }
      CacheValue::Issue(current) if current.id == issue_id => {
        **current = issue;
        true
      }
      CacheValue::Issue(_) | CacheValue::Activity(_) => false,
    }
  }

  /// Number of records held.
  pub fn len(&self) -> usize {
    match self {
      CacheValue::Issues(issues) => issues.len(),
      CacheValue::Grouped(grouped) => grouped.placement_count(),
      CacheValue::SubIssues(response) => response.sub_issues.len(),
      CacheValue::Issue(_) => 1,
      CacheValue::Activity(activity) => activity.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
