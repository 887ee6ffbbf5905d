use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::filters::{FilterPatch, IssueFilters};
use super::grouping::{GroupBy, OrderBy, OrderField};
use crate::cache::{CacheKey, QueryParams, Scope};
use crate::error::ParseError;

/// Surface a view state belongs to: a workspace, optionally narrowed to a
/// project or a user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewScope {
  pub workspace: String,
  pub project: Option<String>,
  pub user: Option<String>,
}

impl ViewScope {
  pub fn project(workspace: impl Into<String>, project: impl Into<String>) -> Self {
    Self {
      workspace: workspace.into(),
      project: Some(project.into()),
      user: None,
    }
  }

  pub fn user(workspace: impl Into<String>, user: Option<String>) -> Self {
    Self {
      workspace: workspace.into(),
      project: None,
      user,
    }
  }

  /// Cache scope holding this surface's issues.
  pub fn issue_scope(&self) -> Scope {
    match &self.project {
      Some(project) => Scope::project(project.clone()),
      None => Scope::UserIssues {
        workspace: self.workspace.clone(),
        user_id: self.user.clone(),
      },
    }
  }
}

/// How a collection is rendered. Each layout has its own cache contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLayout {
  #[default]
  List,
  Kanban,
  Calendar,
  Spreadsheet,
  GanttChart,
}

impl IssueLayout {
  pub const ALL: [IssueLayout; 5] = [
    IssueLayout::List,
    IssueLayout::Kanban,
    IssueLayout::Calendar,
    IssueLayout::Spreadsheet,
    IssueLayout::GanttChart,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      IssueLayout::List => "list",
      IssueLayout::Kanban => "kanban",
      IssueLayout::Calendar => "calendar",
      IssueLayout::Spreadsheet => "spreadsheet",
      IssueLayout::GanttChart => "gantt_chart",
    }
  }

  /// Whether the layout renders grouped buckets.
  pub fn is_grouped(self) -> bool {
    matches!(self, IssueLayout::List | IssueLayout::Kanban)
  }
}

impl fmt::Display for IssueLayout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for IssueLayout {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    IssueLayout::ALL
      .into_iter()
      .find(|l| l.as_str() == s.trim())
      .ok_or_else(|| ParseError::new("layout", s))
  }
}

/// Per-field display toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayProperty {
  Assignee,
  DueDate,
  Labels,
  Key,
  Priority,
  State,
  SubIssueCount,
  Link,
  AttachmentCount,
  Estimate,
  CreatedOn,
  UpdatedOn,
}

impl DisplayProperty {
  pub const ALL: [DisplayProperty; 12] = [
    DisplayProperty::Assignee,
    DisplayProperty::DueDate,
    DisplayProperty::Labels,
    DisplayProperty::Key,
    DisplayProperty::Priority,
    DisplayProperty::State,
    DisplayProperty::SubIssueCount,
    DisplayProperty::Link,
    DisplayProperty::AttachmentCount,
    DisplayProperty::Estimate,
    DisplayProperty::CreatedOn,
    DisplayProperty::UpdatedOn,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      DisplayProperty::Assignee => "assignee",
      DisplayProperty::DueDate => "due_date",
      DisplayProperty::Labels => "labels",
      DisplayProperty::Key => "key",
      DisplayProperty::Priority => "priority",
      DisplayProperty::State => "state",
      DisplayProperty::SubIssueCount => "sub_issue_count",
      DisplayProperty::Link => "link",
      DisplayProperty::AttachmentCount => "attachment_count",
      DisplayProperty::Estimate => "estimate",
      DisplayProperty::CreatedOn => "created_on",
      DisplayProperty::UpdatedOn => "updated_on",
    }
  }
}

impl FromStr for DisplayProperty {
  type Err = ParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    DisplayProperty::ALL
      .into_iter()
      .find(|p| p.as_str() == s.trim())
      .ok_or_else(|| ParseError::new("display property", s))
  }
}

/// Which fields a rendered issue shows. Everything is on by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayProperties {
  pub assignee: bool,
  pub due_date: bool,
  pub labels: bool,
  pub key: bool,
  pub priority: bool,
  pub state: bool,
  pub sub_issue_count: bool,
  pub link: bool,
  pub attachment_count: bool,
  pub estimate: bool,
  pub created_on: bool,
  pub updated_on: bool,
}

impl Default for DisplayProperties {
  fn default() -> Self {
    Self {
      assignee: true,
      due_date: true,
      labels: true,
      key: true,
      priority: true,
      state: true,
      sub_issue_count: true,
      link: true,
      attachment_count: true,
      estimate: true,
      created_on: true,
      updated_on: true,
    }
  }
}

impl DisplayProperties {
  fn slot(&mut self, property: DisplayProperty) -> &mut bool {
    match property {
      DisplayProperty::Assignee => &mut self.assignee,
      DisplayProperty::DueDate => &mut self.due_date,
      DisplayProperty::Labels => &mut self.labels,
      DisplayProperty::Key => &mut self.key,
      DisplayProperty::Priority => &mut self.priority,
      DisplayProperty::State => &mut self.state,
      DisplayProperty::SubIssueCount => &mut self.sub_issue_count,
      DisplayProperty::Link => &mut self.link,
      DisplayProperty::AttachmentCount => &mut self.attachment_count,
      DisplayProperty::Estimate => &mut self.estimate,
      DisplayProperty::CreatedOn => &mut self.created_on,
      DisplayProperty::UpdatedOn => &mut self.updated_on,
    }
  }

  pub fn get(&self, property: DisplayProperty) -> bool {
    match property {
      DisplayProperty::Assignee => self.assignee,
      DisplayProperty::DueDate => self.due_date,
      DisplayProperty::Labels => self.labels,
      DisplayProperty::Key => self.key,
      DisplayProperty::Priority => self.priority,
      DisplayProperty::State => self.state,
      DisplayProperty::SubIssueCount => self.sub_issue_count,
      DisplayProperty::Link => self.link,
      DisplayProperty::AttachmentCount => self.attachment_count,
      DisplayProperty::Estimate => self.estimate,
      DisplayProperty::CreatedOn => self.created_on,
      DisplayProperty::UpdatedOn => self.updated_on,
    }
  }

  pub fn set(&mut self, property: DisplayProperty, shown: bool) {
    *self.slot(property) = shown;
  }

  pub fn toggle(&mut self, property: DisplayProperty) -> bool {
    let slot = self.slot(property);
    *slot = !*slot;
    *slot
  }

  pub fn shown(&self) -> Vec<DisplayProperty> {
    DisplayProperty::ALL
      .into_iter()
      .filter(|p| self.get(*p))
      .collect()
  }
}

/// Defaults applied to newly created view states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ViewDefaults {
  #[serde(default)]
  pub group_by: Option<GroupBy>,
  #[serde(default)]
  pub order_by: OrderBy,
  #[serde(default)]
  pub show_empty_groups: bool,
  #[serde(default)]
  pub layout: IssueLayout,
}

/// Filters, grouping, ordering and display options of one surface.
///
/// Nothing here touches the cache. Changing grouping or ordering only
/// changes the key and the derived collection produced on the next read.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
  scope: ViewScope,
  layout: IssueLayout,
  group_by: Option<GroupBy>,
  order_by: OrderBy,
  filters: IssueFilters,
  properties: DisplayProperties,
  show_empty_groups: bool,
}

impl ViewState {
  pub fn new(scope: ViewScope, defaults: &ViewDefaults) -> Self {
    let mut view = Self {
      scope,
      layout: IssueLayout::List,
      group_by: None,
      order_by: defaults.order_by,
      filters: IssueFilters::default(),
      properties: DisplayProperties::default(),
      show_empty_groups: defaults.show_empty_groups,
    };
    view.set_group_by(defaults.group_by);
    view.set_layout(defaults.layout);
    view
  }

  pub fn scope(&self) -> &ViewScope {
    &self.scope
  }

  pub fn layout(&self) -> IssueLayout {
    self.layout
  }

  pub fn group_by(&self) -> Option<GroupBy> {
    self.group_by
  }

  pub fn order_by(&self) -> OrderBy {
    self.order_by
  }

  pub fn filters(&self) -> &IssueFilters {
    &self.filters
  }

  pub fn properties(&self) -> &DisplayProperties {
    &self.properties
  }

  pub fn show_empty_groups(&self) -> bool {
    self.show_empty_groups
  }

  /// Merge a partial filter update; untouched dimensions keep their values.
  pub fn set_filters(&mut self, patch: FilterPatch) {
    self.filters.apply(patch);
    debug!("filters now: {}", self.filters);
  }

  pub fn clear_filters(&mut self) {
    self.filters.clear_all();
  }

  /// Change grouping. Kanban always stays grouped (by state when asked to
  /// ungroup), and grouping by priority drops a priority ordering.
  pub fn set_group_by(&mut self, group_by: Option<GroupBy>) {
    self.group_by = match (group_by, self.layout) {
      (None, IssueLayout::Kanban) => Some(GroupBy::State),
      (other, _) => other,
    };
    if self.group_by == Some(GroupBy::Priority) && self.order_by.field == OrderField::Priority {
      self.order_by = OrderBy::default();
    }
    debug!("group by {:?}, order by {}", self.group_by, self.order_by);
  }

  /// Change ordering. Ordering by priority inside priority groups is
  /// meaningless and falls back to the default ordering.
  pub fn set_order_by(&mut self, order_by: OrderBy) {
    self.order_by =
      if self.group_by == Some(GroupBy::Priority) && order_by.field == OrderField::Priority {
        OrderBy::default()
      } else {
        order_by
      };
  }

  pub fn set_layout(&mut self, layout: IssueLayout) {
    self.layout = layout;
    if layout == IssueLayout::Kanban && self.group_by.is_none() {
      self.group_by = Some(GroupBy::State);
    }
  }

  pub fn toggle_property(&mut self, property: DisplayProperty) -> bool {
    self.properties.toggle(property)
  }

  pub fn set_show_empty_groups(&mut self, show: bool) {
    self.show_empty_groups = show;
  }

  /// Grouping the rendered collection actually uses.
  pub fn effective_group_by(&self) -> Option<GroupBy> {
    if self.layout.is_grouped() {
      self.group_by
    } else {
      None
    }
  }

  /// Query parameters for the current layout.
  ///
  /// - list, kanban: grouping, ordering and filters
  /// - calendar: filters only
  /// - spreadsheet: ordering, filters, top-level issues only
  /// - gantt: filters, dated issues
  pub fn query_params(&self) -> QueryParams {
    let mut params = QueryParams::new();
    match self.layout {
      IssueLayout::List | IssueLayout::Kanban => {
        if let Some(group_by) = self.group_by {
          params.insert("group_by", group_by.as_str());
        }
        params.insert("order_by", self.order_by.to_string());
      }
      IssueLayout::Calendar => {}
      IssueLayout::Spreadsheet => {
        params.insert("order_by", self.order_by.to_string());
        params.insert("sub_issue", "false");
      }
      IssueLayout::GanttChart => {
        params.insert("start_target_date", "true");
      }
    }
    self.filters.write_params(&mut params);
    params
  }

  /// Key under an explicit scope, e.g. a cycle or module of the project.
  pub fn cache_key(&self, scope: Scope) -> CacheKey {
    CacheKey::new(scope, self.query_params())
  }

  /// Key of this surface's own issue list.
  pub fn issues_key(&self) -> CacheKey {
    self.cache_key(self.scope.issue_scope())
  }
}

/// View states of every surface, created on first access.
#[derive(Debug, Default)]
pub struct ViewStore {
  defaults: ViewDefaults,
  views: HashMap<ViewScope, ViewState>,
}

impl ViewStore {
  pub fn new(defaults: ViewDefaults) -> Self {
    Self {
      defaults,
      views: HashMap::new(),
    }
  }

  pub fn get(&self, scope: &ViewScope) -> Option<&ViewState> {
    self.views.get(scope)
  }

  pub fn view_mut(&mut self, scope: &ViewScope) -> &mut ViewState {
    let defaults = &self.defaults;
    self
      .views
      .entry(scope.clone())
      .or_insert_with(|| ViewState::new(scope.clone(), defaults))
  }

  pub fn len(&self) -> usize {
    self.views.len()
  }

  pub fn is_empty(&self) -> bool {
    self.views.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::view::FilterDimension;

  fn project_view() -> ViewState {
    ViewState::new(ViewScope::project("acme", "proj"), &ViewDefaults::default())
  }

  #[test]
  fn test_set_filters_merges() {
    let mut view = project_view();
    view.set_filters(FilterPatch::default().labels(vec!["bug".to_string()]));
    view.set_filters(FilterPatch::default().assignees(vec!["u1".to_string()]));

    assert_eq!(view.filters().labels, Some(vec!["bug".to_string()]));
    assert_eq!(view.filters().assignees, Some(vec!["u1".to_string()]));

    view.set_filters(FilterPatch::default().labels(vec![]));
    assert_eq!(view.filters().labels, None);
    assert!(view.filters().assignees.is_some());

    view.clear_filters();
    assert!(view.filters().active_dimensions().is_empty());
  }

  #[test]
  fn test_priority_grouping_resets_priority_order() {
    let mut view = project_view();
    view.set_order_by(OrderBy::asc(OrderField::Priority));
    view.set_group_by(Some(GroupBy::Priority));
    assert_eq!(view.order_by(), OrderBy::default());

    view.set_order_by(OrderBy::asc(OrderField::Priority));
    assert_eq!(view.order_by(), OrderBy::default());

    view.set_order_by(OrderBy::asc(OrderField::SortOrder));
    assert_eq!(view.order_by(), OrderBy::asc(OrderField::SortOrder));
  }

  #[test]
  fn test_kanban_is_always_grouped() {
    let mut view = project_view();
    view.set_layout(IssueLayout::Kanban);
    assert_eq!(view.group_by(), Some(GroupBy::State));

    view.set_group_by(None);
    assert_eq!(view.group_by(), Some(GroupBy::State));

    view.set_layout(IssueLayout::List);
    view.set_group_by(None);
    assert_eq!(view.group_by(), None);
  }

  #[test]
  fn test_params_follow_layout() {
    let mut view = project_view();
    view.set_group_by(Some(GroupBy::State));
    view.set_filters(FilterPatch::default().labels(vec!["bug".to_string()]));

    assert_eq!(
      view.query_params().serialize(),
      "group_by=state&labels=bug&order_by=-created_at"
    );

    view.set_layout(IssueLayout::Calendar);
    assert_eq!(view.query_params().serialize(), "labels=bug");

    view.set_layout(IssueLayout::Spreadsheet);
    assert_eq!(
      view.query_params().serialize(),
      "labels=bug&order_by=-created_at&sub_issue=false"
    );

    view.set_layout(IssueLayout::GanttChart);
    assert_eq!(
      view.query_params().serialize(),
      "labels=bug&start_target_date=true"
    );
  }

  #[test]
  fn test_same_view_same_key() {
    let mut a = project_view();
    let mut b = project_view();
    a.set_filters(FilterPatch::default().labels(vec!["x".to_string(), "y".to_string()]));
    b.set_filters(FilterPatch::default().labels(vec!["y".to_string(), "x".to_string()]));
    assert_eq!(a.issues_key().hash(), b.issues_key().hash());
  }

  #[test]
  fn test_type_filter_in_params() {
    let mut view = project_view();
    view
      .set_filters(FilterPatch::default().set_raw(FilterDimension::Type, &["backlog".to_string()]).unwrap());
    assert_eq!(view.query_params().get("type"), Some("backlog"));
  }

  #[test]
  fn test_display_properties_toggle() {
    let mut view = project_view();
    assert!(view.properties().get(DisplayProperty::Estimate));
    assert!(!view.toggle_property(DisplayProperty::Estimate));
    assert!(!view.properties().get(DisplayProperty::Estimate));
    assert_eq!(view.properties().shown().len(), 11);
  }

  #[test]
  fn test_store_scopes_are_independent() {
    let mut store = ViewStore::new(ViewDefaults {
      group_by: Some(GroupBy::Priority),
      ..Default::default()
    });
    let mine = ViewScope::user("acme", None);
    let project = ViewScope::project("acme", "proj");

    store.view_mut(&mine).set_layout(IssueLayout::Calendar);
    assert_eq!(store.view_mut(&project).layout(), IssueLayout::List);
    assert_eq!(store.view_mut(&project).group_by(), Some(GroupBy::Priority));
    assert_eq!(store.len(), 2);
  }
}
