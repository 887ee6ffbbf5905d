use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::cache::QueryParams;
use crate::error::ParseError;
use crate::model::{Issue, Priority, StateGroup};

/// Dimension a view can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDimension {
  Type,
  Assignees,
  TargetDate,
  State,
  StateGroup,
  Labels,
  Priority,
  CreatedBy,
}

impl FilterDimension {
  pub const ALL: [FilterDimension; 8] = [
    FilterDimension::Type,
    FilterDimension::Assignees,
    FilterDimension::TargetDate,
    FilterDimension::State,
    FilterDimension::StateGroup,
    FilterDimension::Labels,
    FilterDimension::Priority,
    FilterDimension::CreatedBy,
  ];

  /// Query parameter name.
  pub fn as_str(self) -> &'static str {
    match self {
      FilterDimension::Type => "type",
      FilterDimension::Assignees => "assignees",
      FilterDimension::TargetDate => "target_date",
      FilterDimension::State => "state",
      FilterDimension::StateGroup => "state_group",
      FilterDimension::Labels => "labels",
      FilterDimension::Priority => "priority",
      FilterDimension::CreatedBy => "created_by",
    }
  }

  /// Human-readable label for filter chips.
  pub fn label(self) -> &'static str {
    match self {
      FilterDimension::Type => "Issue type",
      FilterDimension::Assignees => "Assignees",
      FilterDimension::TargetDate => "Due date",
      FilterDimension::State => "State",
      FilterDimension::StateGroup => "State group",
      FilterDimension::Labels => "Labels",
      FilterDimension::Priority => "Priority",
      FilterDimension::CreatedBy => "Created by",
    }
  }
}

impl FromStr for FilterDimension {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    FilterDimension::ALL
      .into_iter()
      .find(|d| d.as_str() == s.trim())
      .ok_or_else(|| ParseError::new("filter", s))
  }
}

/// Coarse issue type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueTypeFilter {
  /// Issues in an unstarted or started state.
  Active,
  /// Issues in a backlog state.
  Backlog,
}

impl IssueTypeFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      IssueTypeFilter::Active => "active",
      IssueTypeFilter::Backlog => "backlog",
    }
  }

  fn matches(self, issue: &Issue) -> bool {
    match (self, issue.state_group()) {
      (IssueTypeFilter::Active, Some(StateGroup::Started | StateGroup::Unstarted)) => true,
      (IssueTypeFilter::Backlog, Some(StateGroup::Backlog)) => true,
      _ => false,
    }
  }
}

impl FromStr for IssueTypeFilter {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "active" => Ok(IssueTypeFilter::Active),
      "backlog" => Ok(IssueTypeFilter::Backlog),
      _ => Err(ParseError::new("issue type", s)),
    }
  }
}

/// Three-way update for a single filter dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Patch<T> {
  /// Leave the dimension as it is.
  #[default]
  Keep,
  /// Deactivate the dimension.
  Clear,
  /// Replace the dimension's values.
  Set(T),
}

/// Partial filter update. Dimensions left at `Keep` are untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPatch {
  pub issue_type: Patch<IssueTypeFilter>,
  pub assignees: Patch<Vec<String>>,
  pub target_date: Patch<Vec<String>>,
  pub state: Patch<Vec<String>>,
  pub state_group: Patch<Vec<StateGroup>>,
  pub labels: Patch<Vec<String>>,
  pub priority: Patch<Vec<Priority>>,
  pub created_by: Patch<Vec<String>>,
}

impl FilterPatch {
  pub fn labels(mut self, values: Vec<String>) -> Self {
    self.labels = Patch::Set(values);
    self
  }

  pub fn assignees(mut self, values: Vec<String>) -> Self {
    self.assignees = Patch::Set(values);
    self
  }

  pub fn priority(mut self, values: Vec<Priority>) -> Self {
    self.priority = Patch::Set(values);
    self
  }

  pub fn state_group(mut self, values: Vec<StateGroup>) -> Self {
    self.state_group = Patch::Set(values);
    self
  }

  pub fn issue_type(mut self, value: Option<IssueTypeFilter>) -> Self {
    self.issue_type = match value {
      Some(v) => Patch::Set(v),
      None => Patch::Clear,
    };
    self
  }

  /// Clear one dimension.
  pub fn clear(mut self, dimension: FilterDimension) -> Self {
    match dimension {
      FilterDimension::Type => self.issue_type = Patch::Clear,
      FilterDimension::Assignees => self.assignees = Patch::Clear,
      FilterDimension::TargetDate => self.target_date = Patch::Clear,
      FilterDimension::State => self.state = Patch::Clear,
      FilterDimension::StateGroup => self.state_group = Patch::Clear,
      FilterDimension::Labels => self.labels = Patch::Clear,
      FilterDimension::Priority => self.priority = Patch::Clear,
      FilterDimension::CreatedBy => self.created_by = Patch::Clear,
    }
    self
  }

  /// Set a dimension from its raw string values, e.g. from the command line.
  pub fn set_raw(mut self, dimension: FilterDimension, values: &[String]) -> Result<Self, ParseError> {
    let values: Vec<String> = values
      .iter()
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
      .collect();
    match dimension {
      FilterDimension::Type => {
        self.issue_type = match values.first() {
          Some(v) => Patch::Set(v.parse()?),
          None => Patch::Clear,
        }
      }
      FilterDimension::Assignees => self.assignees = Patch::Set(values),
      FilterDimension::TargetDate => self.target_date = Patch::Set(values),
      FilterDimension::State => self.state = Patch::Set(values),
      FilterDimension::StateGroup => {
        self.state_group = Patch::Set(parse_all(&values)?);
      }
      FilterDimension::Labels => self.labels = Patch::Set(values),
      FilterDimension::Priority => self.priority = Patch::Set(parse_all(&values)?),
      FilterDimension::CreatedBy => self.created_by = Patch::Set(values),
    }
    Ok(self)
  }
}

fn parse_all<T: FromStr<Err = ParseError>>(values: &[String]) -> Result<Vec<T>, ParseError> {
  values.iter().map(|v| v.parse()).collect()
}

/// Active filters of a view. `None` means the dimension is inactive; an
/// active dimension always holds at least one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilters {
  pub issue_type: Option<IssueTypeFilter>,
  pub assignees: Option<Vec<String>>,
  pub target_date: Option<Vec<String>>,
  pub state: Option<Vec<String>>,
  pub state_group: Option<Vec<StateGroup>>,
  pub labels: Option<Vec<String>>,
  pub priority: Option<Vec<Priority>>,
  pub created_by: Option<Vec<String>>,
}

fn merge<T>(slot: &mut Option<Vec<T>>, patch: Patch<Vec<T>>) {
  match patch {
    Patch::Keep => {}
    Patch::Clear => *slot = None,
    Patch::Set(values) if values.is_empty() => *slot = None,
    Patch::Set(values) => *slot = Some(values),
  }
}

fn any_of<T: PartialEq>(filter: &Option<Vec<T>>, value: &T) -> bool {
  filter.as_ref().map_or(true, |values| values.contains(value))
}

fn any_overlap(filter: &Option<Vec<String>>, values: &[String]) -> bool {
  filter
    .as_ref()
    .map_or(true, |wanted| values.iter().any(|v| wanted.contains(v)))
}

impl IssueFilters {
  /// Merge a partial update. Empty value lists deactivate their dimension.
  pub fn apply(&mut self, patch: FilterPatch) {
    match patch.issue_type {
      Patch::Keep => {}
      Patch::Clear => self.issue_type = None,
      Patch::Set(t) => self.issue_type = Some(t),
    }
    merge(&mut self.assignees, patch.assignees);
    merge(&mut self.target_date, patch.target_date);
    merge(&mut self.state, patch.state);
    merge(&mut self.state_group, patch.state_group);
    merge(&mut self.labels, patch.labels);
    merge(&mut self.priority, patch.priority);
    merge(&mut self.created_by, patch.created_by);
  }

  pub fn clear_all(&mut self) {
    *self = Self::default();
  }

  pub fn is_active(&self) -> bool {
    !self.active_dimensions().is_empty()
  }

  pub fn active_dimensions(&self) -> Vec<FilterDimension> {
    FilterDimension::ALL
      .into_iter()
      .filter(|d| !self.values(*d).is_empty())
      .collect()
  }

  /// Current values of a dimension as strings; empty when inactive.
  pub fn values(&self, dimension: FilterDimension) -> Vec<String> {
    fn strings<T: ToString>(values: &Option<Vec<T>>) -> Vec<String> {
      values
        .iter()
        .flatten()
        .map(ToString::to_string)
        .collect()
    }

    match dimension {
      FilterDimension::Type => self
        .issue_type
        .map(|t| vec![t.as_str().to_string()])
        .unwrap_or_default(),
      FilterDimension::Assignees => strings(&self.assignees),
      FilterDimension::TargetDate => strings(&self.target_date),
      FilterDimension::State => strings(&self.state),
      FilterDimension::StateGroup => strings(&self.state_group),
      FilterDimension::Labels => strings(&self.labels),
      FilterDimension::Priority => strings(&self.priority),
      FilterDimension::CreatedBy => strings(&self.created_by),
    }
  }

  /// Add the value if absent, remove it if present. `target_date` values are
  /// range bounds and toggle as a whole.
  pub fn toggle(&mut self, dimension: FilterDimension, value: &str) -> Result<(), ParseError> {
    fn flip<T: PartialEq>(slot: &mut Option<Vec<T>>, value: T) {
      let mut values = slot.take().unwrap_or_default();
      if let Some(pos) = values.iter().position(|v| *v == value) {
        values.remove(pos);
      } else {
        values.push(value);
      }
      merge(slot, Patch::Set(values));
    }

    match dimension {
      FilterDimension::Type => {
        let value: IssueTypeFilter = value.parse()?;
        self.issue_type = if self.issue_type == Some(value) {
          None
        } else {
          Some(value)
        };
      }
      FilterDimension::TargetDate => {
        let bounds: Vec<String> = value.split(',').map(|v| v.trim().to_string()).collect();
        let patch = if self.target_date.as_ref() == Some(&bounds) {
          Patch::Clear
        } else {
          Patch::Set(bounds)
        };
        merge(&mut self.target_date, patch);
      }
      FilterDimension::Assignees => flip(&mut self.assignees, value.to_string()),
      FilterDimension::State => flip(&mut self.state, value.to_string()),
      FilterDimension::StateGroup => flip(&mut self.state_group, value.parse()?),
      FilterDimension::Labels => flip(&mut self.labels, value.to_string()),
      FilterDimension::Priority => flip(&mut self.priority, value.parse()?),
      FilterDimension::CreatedBy => flip(&mut self.created_by, value.to_string()),
    }
    Ok(())
  }

  /// Client-side predicate: every active dimension must match, any value
  /// within a dimension suffices.
  pub fn matches(&self, issue: &Issue) -> bool {
    self.issue_type.map_or(true, |t| t.matches(issue))
      && any_overlap(&self.assignees, &issue.assignees)
      && any_overlap(&self.labels, &issue.labels)
      && any_of(&self.state, &issue.state)
      && self
        .state_group
        .as_ref()
        .map_or(true, |groups| issue.state_group().is_some_and(|g| groups.contains(&g)))
      && any_of(&self.priority, &issue.priority)
      && self.created_by.as_ref().map_or(true, |users| {
        issue
          .created_by
          .as_ref()
          .is_some_and(|u| users.contains(u))
      })
      && self.target_date_matches(issue)
  }

  fn target_date_matches(&self, issue: &Issue) -> bool {
    let Some(bounds) = &self.target_date else {
      return true;
    };
    let Some(date) = issue.target_date else {
      return false;
    };
    bounds.iter().all(|raw| match DateBound::parse(raw) {
      Some(bound) => bound.admits(date),
      None => {
        warn!(value = %raw, "ignoring malformed target date filter");
        true
      }
    })
  }

  /// Write active dimensions into query parameters.
  pub fn write_params(&self, params: &mut QueryParams) {
    for dimension in FilterDimension::ALL {
      params.insert_list(dimension.as_str(), &self.values(dimension));
    }
  }

  /// Rebuild filters from query parameters, skipping values that don't parse.
  pub fn from_params(params: &QueryParams) -> Self {
    let mut patch = FilterPatch::default();
    for dimension in FilterDimension::ALL {
      let values = params.get_list(dimension.as_str());
      if values.is_empty() {
        continue;
      }
      match patch.clone().set_raw(dimension, &values) {
        Ok(next) => patch = next,
        Err(err) => warn!(error = %err, "dropping unparseable filter parameter"),
      }
    }
    let mut filters = Self::default();
    filters.apply(patch);
    filters
  }
}

/// One `YYYY-MM-DD;after|before` bound of a target date filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateBound {
  After(NaiveDate),
  Before(NaiveDate),
}

impl DateBound {
  fn parse(raw: &str) -> Option<Self> {
    let (date, direction) = raw.split_once(';')?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    match direction.trim() {
      "after" => Some(DateBound::After(date)),
      "before" => Some(DateBound::Before(date)),
      _ => None,
    }
  }

  fn admits(self, date: NaiveDate) -> bool {
    match self {
      DateBound::After(bound) => date >= bound,
      DateBound::Before(bound) => date <= bound,
    }
  }
}

impl fmt::Display for IssueFilters {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let chips: Vec<String> = self
      .active_dimensions()
      .into_iter()
      .map(|d| format!("{}: {}", d.label(), self.values(d).join(", ")))
      .collect();
    if chips.is_empty() {
      f.write_str("no filters")
    } else {
      f.write_str(&chips.join(" | "))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{test_issue, StateDetail};

  fn started(id: &str) -> Issue {
    let mut issue = test_issue(id);
    issue.state = "s1".to_string();
    issue.state_detail = Some(StateDetail {
      id: "s1".to_string(),
      name: "In Progress".to_string(),
      group: StateGroup::Started,
      color: String::new(),
    });
    issue
  }

  #[test]
  fn test_empty_list_normalizes_to_inactive() {
    let mut filters = IssueFilters::default();
    filters.apply(FilterPatch::default().labels(vec!["bug".to_string()]));
    assert_eq!(filters.labels, Some(vec!["bug".to_string()]));

    filters.apply(FilterPatch::default().labels(vec![]));
    assert_eq!(filters.labels, None);
  }

  #[test]
  fn test_merge_leaves_other_dimensions() {
    let mut filters = IssueFilters::default();
    filters.apply(FilterPatch::default().priority(vec![Priority::High]));
    filters.apply(FilterPatch::default().labels(vec!["bug".to_string()]));

    assert_eq!(filters.priority, Some(vec![Priority::High]));
    assert_eq!(filters.labels, Some(vec!["bug".to_string()]));

    filters.apply(FilterPatch::default().clear(FilterDimension::Priority));
    assert_eq!(filters.priority, None);
    assert!(filters.labels.is_some());
  }

  #[test]
  fn test_clear_all() {
    let mut filters = IssueFilters::default();
    filters.apply(
      FilterPatch::default()
        .labels(vec!["bug".to_string()])
        .issue_type(Some(IssueTypeFilter::Active)),
    );
    assert!(filters.is_active());
    filters.clear_all();
    assert!(!filters.is_active());
    assert_eq!(filters, IssueFilters::default());
  }

  #[test]
  fn test_toggle_removes_last_value_to_inactive() {
    let mut filters = IssueFilters::default();
    filters.toggle(FilterDimension::Priority, "high").unwrap();
    assert_eq!(filters.priority, Some(vec![Priority::High]));
    filters.toggle(FilterDimension::Priority, "high").unwrap();
    assert_eq!(filters.priority, None);
  }

  #[test]
  fn test_matches_combines_dimensions() {
    let mut issue = started("1");
    issue.priority = Priority::High;
    issue.set_labels(vec!["bug".to_string()], &[]);

    let mut filters = IssueFilters::default();
    assert!(filters.matches(&issue));

    filters.apply(
      FilterPatch::default()
        .priority(vec![Priority::High, Priority::Low])
        .labels(vec!["bug".to_string(), "ui".to_string()]),
    );
    assert!(filters.matches(&issue));

    filters.apply(FilterPatch::default().state_group(vec![StateGroup::Backlog]));
    assert!(!filters.matches(&issue));
  }

  #[test]
  fn test_type_active_matches_started() {
    let mut filters = IssueFilters::default();
    filters.apply(FilterPatch::default().issue_type(Some(IssueTypeFilter::Active)));
    assert!(filters.matches(&started("1")));
    assert!(!filters.matches(&test_issue("2")));
  }

  #[test]
  fn test_target_date_bounds() {
    let mut issue = test_issue("1");
    issue.target_date = NaiveDate::from_ymd_opt(2024, 6, 15);

    let mut filters = IssueFilters::default();
    filters
      .toggle(FilterDimension::TargetDate, "2024-06-01;after,2024-06-30;before")
      .unwrap();
    assert!(filters.matches(&issue));

    issue.target_date = NaiveDate::from_ymd_opt(2024, 7, 1);
    assert!(!filters.matches(&issue));
  }

  #[test]
  fn test_params_round_trip_is_order_insensitive() {
    let mut a = IssueFilters::default();
    a.apply(FilterPatch::default().labels(vec!["ui".to_string(), "bug".to_string()]));
    let mut b = IssueFilters::default();
    b.apply(FilterPatch::default().labels(vec!["bug".to_string(), "ui".to_string()]));

    let mut pa = QueryParams::new();
    a.write_params(&mut pa);
    let mut pb = QueryParams::new();
    b.write_params(&mut pb);
    assert_eq!(pa, pb);

    let restored = IssueFilters::from_params(&pa);
    assert_eq!(restored.labels, Some(vec!["bug".to_string(), "ui".to_string()]));
  }
}
