//! Grouping and ordering engine.
//!
//! Pure functions from an issue collection plus the selected group-by and
//! order-by fields to an ordered-within-group mapping. Nothing here touches
//! the cache or the network.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::model::{Issue, IssuePatch, KnownDetails, Priority, StateGroup};

/// Key of one bucket in a grouped collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
  /// Bucket for issues with no value for the grouped field.
  pub const NONE: &'static str = "None";
  /// The single implicit bucket used when nothing is grouped.
  pub const ALL: &'static str = "All";

  pub fn new(key: impl Into<String>) -> Self {
    Self(key.into())
  }

  pub fn none() -> Self {
    Self(Self::NONE.to_string())
  }

  pub fn all() -> Self {
    Self(Self::ALL.to_string())
  }

  pub fn is_none(&self) -> bool {
    self.0 == Self::NONE
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  fn from_optional(value: Option<&str>) -> Self {
    match value {
      Some(v) if !v.is_empty() => Self::new(v),
      _ => Self::none(),
    }
  }
}

impl fmt::Display for GroupKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for GroupKey {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}

/// Field used to bucket issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupBy {
  #[serde(rename = "state")]
  State,
  #[serde(rename = "priority")]
  Priority,
  #[serde(rename = "labels")]
  Labels,
  #[serde(rename = "created_by")]
  CreatedBy,
  #[serde(rename = "state_detail.group")]
  StateGroup,
  #[serde(rename = "project")]
  Project,
}

impl GroupBy {
  pub const ALL: [GroupBy; 6] = [
    GroupBy::State,
    GroupBy::Priority,
    GroupBy::Labels,
    GroupBy::CreatedBy,
    GroupBy::StateGroup,
    GroupBy::Project,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      GroupBy::State => "state",
      GroupBy::Priority => "priority",
      GroupBy::Labels => "labels",
      GroupBy::CreatedBy => "created_by",
      GroupBy::StateGroup => "state_detail.group",
      GroupBy::Project => "project",
    }
  }

  /// Buckets an issue belongs to. Exactly one, except for labels which fans
  /// out once per label (or lands in "None" when unlabelled).
  pub fn keys_for(self, issue: &Issue) -> Vec<GroupKey> {
    match self {
      GroupBy::State => vec![GroupKey::from_optional(Some(issue.state.as_str()))],
      GroupBy::Priority => vec![priority_key(issue.priority)],
      GroupBy::Labels => {
        let mut keys: Vec<GroupKey> = Vec::new();
        for label in &issue.labels {
          let key = GroupKey::new(label.as_str());
          if !keys.contains(&key) {
            keys.push(key);
          }
        }
        if keys.is_empty() {
          keys.push(GroupKey::none());
        }
        keys
      }
      GroupBy::CreatedBy => vec![GroupKey::from_optional(issue.created_by.as_deref())],
      GroupBy::StateGroup => vec![GroupKey::from_optional(
        issue.state_group().map(StateGroup::as_str),
      )],
      GroupBy::Project => vec![GroupKey::from_optional(Some(issue.project.as_str()))],
    }
  }

  /// Every bucket the field can produce, for fields with a closed domain.
  pub fn known_keys(self) -> Vec<GroupKey> {
    match self {
      GroupBy::Priority => Priority::ALL.into_iter().map(priority_key).collect(),
      GroupBy::StateGroup => StateGroup::ALL
        .into_iter()
        .map(|g| GroupKey::new(g.as_str()))
        .collect(),
      _ => Vec::new(),
    }
  }

  /// Display rank of a bucket; ties broken by the key itself.
  fn key_rank(self, key: &GroupKey) -> u8 {
    match self {
      GroupBy::Priority => key
        .as_str()
        .parse::<Priority>()
        .map(Priority::rank)
        .unwrap_or(u8::MAX),
      GroupBy::StateGroup => key
        .as_str()
        .parse::<StateGroup>()
        .map(StateGroup::rank)
        .unwrap_or(u8::MAX),
      _ if key.is_none() => 1,
      _ => 0,
    }
  }
}

impl fmt::Display for GroupBy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for GroupBy {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    GroupBy::ALL
      .into_iter()
      .find(|g| g.as_str() == s.trim())
      .ok_or_else(|| ParseError::new("group by", s))
  }
}

fn priority_key(priority: Priority) -> GroupKey {
  match priority {
    Priority::None => GroupKey::none(),
    other => GroupKey::new(other.as_str()),
  }
}

/// Field an order-by compares on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
  CreatedAt,
  UpdatedAt,
  Priority,
  SortOrder,
  StateName,
  AssigneesName,
  LabelsName,
  TargetDate,
  EstimatePoint,
}

impl OrderField {
  pub const ALL: [OrderField; 9] = [
    OrderField::CreatedAt,
    OrderField::UpdatedAt,
    OrderField::Priority,
    OrderField::SortOrder,
    OrderField::StateName,
    OrderField::AssigneesName,
    OrderField::LabelsName,
    OrderField::TargetDate,
    OrderField::EstimatePoint,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderField::CreatedAt => "created_at",
      OrderField::UpdatedAt => "updated_at",
      OrderField::Priority => "priority",
      OrderField::SortOrder => "sort_order",
      OrderField::StateName => "state__name",
      OrderField::AssigneesName => "assignees__name",
      OrderField::LabelsName => "labels__name",
      OrderField::TargetDate => "target_date",
      OrderField::EstimatePoint => "estimate__point",
    }
  }

  /// Ascending comparison. Issues missing the value sort after those that
  /// have one.
  pub fn compare(self, a: &Issue, b: &Issue) -> Ordering {
    match self {
      OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
      OrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
      OrderField::Priority => a.priority.rank().cmp(&b.priority.rank()),
      OrderField::SortOrder => a.sort_order.total_cmp(&b.sort_order),
      OrderField::StateName => missing_last(
        a.state_detail.as_ref().map(|s| s.name.to_lowercase()),
        b.state_detail.as_ref().map(|s| s.name.to_lowercase()),
      ),
      OrderField::AssigneesName => missing_last(a.first_assignee_name(), b.first_assignee_name()),
      OrderField::LabelsName => missing_last(a.first_label_name(), b.first_label_name()),
      OrderField::TargetDate => missing_last(a.target_date, b.target_date),
      OrderField::EstimatePoint => missing_last(a.estimate_point, b.estimate_point),
    }
  }
}

fn missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => a.cmp(&b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

/// Field plus direction. A leading `-` in the wire form means descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderBy {
  pub field: OrderField,
  pub descending: bool,
}

impl OrderBy {
  pub const fn asc(field: OrderField) -> Self {
    Self {
      field,
      descending: false,
    }
  }

  pub const fn desc(field: OrderField) -> Self {
    Self {
      field,
      descending: true,
    }
  }

  pub fn compare(self, a: &Issue, b: &Issue) -> Ordering {
    if self.descending {
      self.field.compare(b, a)
    } else {
      self.field.compare(a, b)
    }
  }

  /// Stable sort: issues with equal keys keep their relative input order.
  pub fn sort(self, issues: &mut [Issue]) {
    issues.sort_by(|a, b| self.compare(a, b));
  }
}

impl Default for OrderBy {
  fn default() -> Self {
    Self::desc(OrderField::CreatedAt)
  }
}

impl fmt::Display for OrderBy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.descending {
      f.write_str("-")?;
    }
    f.write_str(self.field.as_str())
  }
}

impl FromStr for OrderBy {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let (descending, name) = match trimmed.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, trimmed),
    };
    OrderField::ALL
      .into_iter()
      .find(|f| f.as_str() == name)
      .map(|field| Self { field, descending })
      .ok_or_else(|| ParseError::new("order by", s))
  }
}

impl TryFrom<String> for OrderBy {
  type Error = ParseError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<OrderBy> for String {
  fn from(order: OrderBy) -> Self {
    order.to_string()
  }
}

/// Order a collection in place.
pub fn order_issues(issues: &mut [Issue], order_by: OrderBy) {
  order_by.sort(issues);
}

/// Group and order a collection.
///
/// With no group-by every issue lands in the single [`GroupKey::ALL`] bucket.
pub fn group_issues(issues: &[Issue], group_by: Option<GroupBy>, order_by: OrderBy) -> GroupedIssues {
  let mut groups: BTreeMap<GroupKey, Vec<Issue>> = BTreeMap::new();

  for issue in issues {
    match group_by {
      Some(field) => {
        for key in field.keys_for(issue) {
          groups.entry(key).or_default().push(issue.clone());
        }
      }
      None => groups.entry(GroupKey::all()).or_default().push(issue.clone()),
    }
  }

  for group in groups.values_mut() {
    order_by.sort(group);
  }

  GroupedIssues {
    group_by,
    order_by,
    groups,
  }
}

/// Bucket issues by target date for the calendar layout. Undated issues are
/// left out.
pub fn bucket_by_target_date(issues: &[Issue], order_by: OrderBy) -> BTreeMap<NaiveDate, Vec<Issue>> {
  let mut days: BTreeMap<NaiveDate, Vec<Issue>> = BTreeMap::new();
  for issue in issues {
    if let Some(date) = issue.target_date {
      days.entry(date).or_default().push(issue.clone());
    }
  }
  for day in days.values_mut() {
    order_by.sort(day);
  }
  days
}

/// Mapping from group key to the ordered issues in that group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedIssues {
  group_by: Option<GroupBy>,
  order_by: OrderBy,
  groups: BTreeMap<GroupKey, Vec<Issue>>,
}

impl GroupedIssues {
  pub fn group_by(&self) -> Option<GroupBy> {
    self.group_by
  }

  pub fn order_by(&self) -> OrderBy {
    self.order_by
  }

  pub fn get(&self, key: &GroupKey) -> Option<&[Issue]> {
    self.groups.get(key).map(Vec::as_slice)
  }

  /// Group keys in display order: closed domains by rank, "None" last.
  pub fn keys(&self) -> Vec<&GroupKey> {
    let mut keys: Vec<&GroupKey> = self.groups.keys().collect();
    if let Some(field) = self.group_by {
      keys.sort_by(|a, b| field.key_rank(a).cmp(&field.key_rank(b)).then(a.cmp(b)));
    }
    keys
  }

  pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[Issue])> + '_ {
    self
      .keys()
      .into_iter()
      .filter_map(move |k| self.groups.get(k).map(|issues| (k, issues.as_slice())))
  }

  pub fn group_count(&self) -> usize {
    self.groups.len()
  }

  /// Number of placements, counting label fan-out copies.
  pub fn placement_count(&self) -> usize {
    self.groups.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.groups.values().all(Vec::is_empty)
  }

  /// Each issue once, in display order of its first placement.
  pub fn unique_issues(&self) -> Vec<Issue> {
    let mut seen = std::collections::HashSet::new();
    self
      .iter()
      .flat_map(|(_, issues)| issues.iter())
      .filter(|issue| seen.insert(issue.id.clone()))
      .cloned()
      .collect()
  }

  pub fn find(&self, issue_id: &str) -> Option<&Issue> {
    self
      .groups
      .values()
      .flat_map(|issues| issues.iter())
      .find(|issue| issue.id == issue_id)
  }

  pub fn contains_issue(&self, issue_id: &str) -> bool {
    self.find(issue_id).is_some()
  }

  /// Add empty buckets so every given key is present.
  pub fn insert_empty_groups(&mut self, keys: impl IntoIterator<Item = GroupKey>) {
    for key in keys {
      self.groups.entry(key).or_default();
    }
  }

  /// Drop buckets that hold no issues.
  pub fn remove_empty_groups(&mut self) {
    self.groups.retain(|_, issues| !issues.is_empty());
  }

  /// Recompute under new parameters from the unique issues held here.
  pub fn regroup(&self, group_by: Option<GroupBy>, order_by: OrderBy) -> GroupedIssues {
    group_issues(&self.unique_issues(), group_by, order_by)
  }

  /// Patch every copy of an issue, moving it between buckets if the grouped
  /// field changed. Existing buckets survive even if they end up empty.
  pub fn patch_issue(&mut self, issue_id: &str, patch: &IssuePatch, known: &KnownDetails) -> bool {
    if !self.contains_issue(issue_id) {
      return false;
    }
    let mut issues = self.unique_issues();
    for issue in issues.iter_mut().filter(|i| i.id == issue_id) {
      patch.apply_to(issue, known);
    }
    self.rebuild(&issues);
    true
  }

  /// Remove every copy of an issue. Emptied buckets are kept.
  pub fn remove_issue(&mut self, issue_id: &str) -> bool {
    let mut removed = false;
    for group in self.groups.values_mut() {
      let before = group.len();
      group.retain(|i| i.id != issue_id);
      removed |= group.len() != before;
    }
    removed
  }

  /// Place an issue into every bucket it belongs to and re-sort those buckets.
  pub fn insert_issue(&mut self, issue: Issue) {
    let keys = match self.group_by {
      Some(field) => field.keys_for(&issue),
      None => vec![GroupKey::all()],
    };
    for key in keys {
      let group = self.groups.entry(key).or_default();
      group.push(issue.clone());
      self.order_by.sort(group);
    }
  }

  /// Swap an issue (possibly under a new id) for its replacement.
  pub fn replace_issue(&mut self, issue_id: &str, issue: Issue) -> bool {
    if !self.remove_issue(issue_id) {
      return false;
    }
    self.insert_issue(issue);
    true
  }

  /// Take the issue at `index` out of a bucket.
  pub fn take(&mut self, key: &GroupKey, index: usize) -> Option<Issue> {
    let group = self.groups.get_mut(key)?;
    (index < group.len()).then(|| group.remove(index))
  }

  /// Insert at a position (clamped to the bucket length), then re-sort the
  /// bucket by the current order-by. Equal keys keep the dropped position.
  pub fn insert_at(&mut self, key: GroupKey, index: usize, issue: Issue) {
    let group = self.groups.entry(key).or_default();
    let index = index.min(group.len());
    group.insert(index, issue);
    self.order_by.sort(group);
  }

  /// Replace every remaining copy of an issue in place, without moving it.
  pub fn update_copies(&mut self, issue: &Issue) {
    for group in self.groups.values_mut() {
      for slot in group.iter_mut().filter(|i| i.id == issue.id) {
        *slot = issue.clone();
      }
    }
  }

  fn rebuild(&mut self, issues: &[Issue]) {
    let previous: Vec<GroupKey> = self.groups.keys().cloned().collect();
    *self = group_issues(issues, self.group_by, self.order_by);
    self.insert_empty_groups(previous);
  }
}
