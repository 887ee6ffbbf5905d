//! Command handlers: one cache, one view store and one mutation coordinator
//! per invocation.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{HttpIssueService, IssueReader, IssueWriter, MemoryIssueService};
use crate::cache::{CacheKey, CacheSource, CacheValue, IssueCache, Scope};
use crate::config::Config;
use crate::fields;
use crate::model::{Issue, IssueDraft, Priority};
use crate::mutation::{DragMove, MoveOutcome, MutationCoordinator};
use crate::notify::LogNotifier;
use crate::output;
use crate::view::{
  calendar_days, DerivedState, DerivedView, DisplayProperty, FilterDimension, FilterPatch, GroupBy,
  GroupKey, IssueLayout, OrderBy, ViewScope, ViewState, ViewStore,
};

/// Which collection `list` shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTarget {
  Project,
  Cycle(String),
  Module(String),
  View(String),
  /// The caller's assigned issues
  Mine,
  User(String),
}

/// View overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
  pub layout: Option<IssueLayout>,
  /// `Some(None)` ungroups
  pub group_by: Option<Option<GroupBy>>,
  pub order_by: Option<OrderBy>,
  pub filters: Vec<(FilterDimension, Vec<String>)>,
  pub show_empty_groups: bool,
  pub hide: Vec<DisplayProperty>,
}

/// Parse a `--group-by` value; `none` ungroups.
pub fn parse_group_by(value: &str) -> Result<Option<GroupBy>> {
  match value.trim().to_lowercase().as_str() {
    "none" | "" => Ok(None),
    other => Ok(Some(other.parse()?)),
  }
}

/// Parse a `--filter key=v1,v2` value.
pub fn parse_filter(value: &str) -> Result<(FilterDimension, Vec<String>)> {
  let (dimension, values) = value
    .split_once('=')
    .ok_or_else(|| eyre!("Filters look like key=value[,value]: {}", value))?;
  let values = values
    .split(',')
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .collect();
  Ok((dimension.parse()?, values))
}

/// Main application state
pub struct App {
  config: Config,
  cache: IssueCache,
  views: ViewStore,
  coordinator: MutationCoordinator,
}

impl App {
  /// Build the app over the REST API, or over a fixture file when given.
  pub fn new(config: Config, fixture: Option<&Path>) -> Result<Self> {
    let (reader, writer): (Arc<dyn IssueReader>, Arc<dyn IssueWriter>) = match fixture {
      Some(path) => {
        info!("using fixture {}", path.display());
        let service = Arc::new(MemoryIssueService::from_file(path)?);
        (service.clone(), service)
      }
      None => {
        let service = Arc::new(HttpIssueService::new(&config)?);
        (service.clone(), service)
      }
    };
    Ok(Self::with_services(config, reader, writer))
  }

  pub fn with_services(
    config: Config,
    reader: Arc<dyn IssueReader>,
    writer: Arc<dyn IssueWriter>,
  ) -> Self {
    let cache = IssueCache::with_stale_time(reader, config.stale_time());
    let coordinator = MutationCoordinator::new(cache.clone(), writer, Arc::new(LogNotifier));
    let views = ViewStore::new(config.views.clone());
    Self {
      config,
      cache,
      views,
      coordinator,
    }
  }

  fn project(&self) -> Result<String> {
    self
      .config
      .default_project
      .clone()
      .filter(|p| !p.trim().is_empty())
      .ok_or_else(|| eyre!("No project configured. Set default_project in config or use -p flag."))
  }

  fn project_view(&mut self) -> Result<ViewState> {
    let scope = ViewScope::project(self.config.api.workspace.clone(), self.project()?);
    Ok(self.views.view_mut(&scope).clone())
  }

  /// Render a collection under the view's grouping, ordering and filters.
  pub async fn list(&mut self, target: ListTarget, options: ListOptions) -> Result<String> {
    let workspace = self.config.api.workspace.clone();
    let scope = match &target {
      ListTarget::Mine => ViewScope::user(workspace, None),
      ListTarget::User(user) => ViewScope::user(workspace, Some(user.clone())),
      _ => ViewScope::project(workspace, self.project()?),
    };

    let view = self.views.view_mut(&scope);
    if let Some(layout) = options.layout {
      view.set_layout(layout);
    }
    if let Some(group_by) = options.group_by {
      view.set_group_by(group_by);
    }
    if let Some(order_by) = options.order_by {
      view.set_order_by(order_by);
    }
    let mut filters = FilterPatch::default();
    for (dimension, values) in &options.filters {
      filters = filters.set_raw(*dimension, values)?;
    }
    view.set_filters(filters);
    if options.show_empty_groups {
      view.set_show_empty_groups(true);
    }
    for property in &options.hide {
      if view.properties().get(*property) {
        view.toggle_property(*property);
      }
    }
    let view = view.clone();

    let key = match (&target, &scope.project) {
      (ListTarget::Cycle(cycle_id), Some(project_id)) => view.cache_key(Scope::CycleIssues {
        project_id: project_id.clone(),
        cycle_id: cycle_id.clone(),
      }),
      (ListTarget::Module(module_id), Some(project_id)) => view.cache_key(Scope::ModuleIssues {
        project_id: project_id.clone(),
        module_id: module_id.clone(),
      }),
      (ListTarget::View(view_id), Some(project_id)) => view.cache_key(Scope::ViewIssues {
        project_id: project_id.clone(),
        view_id: view_id.clone(),
      }),
      _ => view.issues_key(),
    };
    debug!("listing {} as {}", key, view.layout());

    let loaded = self.cache.load(&key).await?;
    if loaded.source == CacheSource::Offline {
      warn!("{} is served from cache, the service is unreachable", key);
    }

    if view.layout() == IssueLayout::Calendar {
      let days = calendar_days(&self.cache, &key, view.order_by()).unwrap_or_default();
      return Ok(output::render_calendar(&days, view.properties()));
    }

    let mut derived = DerivedView::new();
    match derived.derive(&self.cache, &key, &view) {
      DerivedState::Ready { grouped, .. } => Ok(output::render_grouped(&grouped, view.properties())),
      DerivedState::NotLoaded => Err(eyre!("{} could not be loaded", key)),
    }
  }

  /// Load an issue through its details entry.
  async fn issue(&self, issue_id: &str) -> Result<Issue> {
    let key = CacheKey::bare(Scope::details(self.project()?, issue_id));
    match self.cache.load(&key).await?.data {
      CacheValue::Issue(issue) => Ok(*issue),
      other => Err(eyre!("Expected an issue for {}, got {}", key, other.kind())),
    }
  }

  /// Apply `field=value` assignments to an issue.
  pub async fn set(&mut self, issue_id: &str, assignments: &[String]) -> Result<Issue> {
    let patch = fields::parse_assignments(assignments)?;
    let issue = self.issue(issue_id).await?;
    let list_key = self.project_view()?.issues_key();
    let updated = self
      .coordinator
      .patch(&issue, &[list_key], patch)?
      .settle()
      .await?;
    Ok(updated)
  }

  /// Move an issue to another group of the project view.
  ///
  /// Returns `None` when the issue already was in that group.
  pub async fn move_issue(
    &mut self,
    issue_id: &str,
    to: &str,
    group_by: Option<GroupBy>,
  ) -> Result<Option<Issue>> {
    let scope = ViewScope::project(self.config.api.workspace.clone(), self.project()?);
    let view = self.views.view_mut(&scope);
    if group_by.is_some() {
      view.set_group_by(group_by);
    }
    let view = view.clone();
    let field = view
      .effective_group_by()
      .ok_or_else(|| eyre!("Moving needs a grouped view. Set views.group_by or pass --group-by."))?;

    let key = view.issues_key();
    self.cache.load(&key).await?;
    let cached = self
      .cache
      .read(&key)
      .ok_or_else(|| eyre!("{} could not be loaded", key))?;
    let CacheValue::Grouped(grouped) = &cached.value else {
      return Err(eyre!("{} is not grouped", key));
    };
    let (source, index) = grouped
      .iter()
      .find_map(|(group, issues)| {
        issues
          .iter()
          .position(|i| i.id == issue_id)
          .map(|index| (group.clone(), index))
      })
      .ok_or_else(|| eyre!("Issue {} is not in {}", issue_id, key))?;

    let destination = if to.eq_ignore_ascii_case("none") {
      GroupKey::none()
    } else {
      GroupKey::new(to)
    };
    debug!("moving {} by {} from {} to {}", issue_id, field, source, destination);

    match self
      .coordinator
      .move_issue(&key, DragMove::to_group(source, index, destination, 0))?
    {
      MoveOutcome::Noop => Ok(None),
      MoveOutcome::Moved(pending) => Ok(Some(pending.settle().await?)),
      MoveOutcome::Deleted(pending) => {
        pending.settle().await?;
        Ok(None)
      }
    }
  }

  pub async fn create(&mut self, name: &str, priority: Priority) -> Result<Issue> {
    let project = self.project()?;
    let target = self.project_view()?.issues_key();
    let draft = IssueDraft {
      priority,
      ..IssueDraft::new(name)
    };
    let created = self
      .coordinator
      .create(&project, &target, draft)?
      .settle()
      .await?;
    Ok(created)
  }

  pub async fn delete(&mut self, issue_id: &str) -> Result<()> {
    let issue = self.issue(issue_id).await?;
    let list_key = self.project_view()?.issues_key();
    self
      .coordinator
      .delete(&issue, &[list_key])?
      .settle()
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ApiConfig;
  use crate::model::test_issue;

  fn app(issues: Vec<Issue>) -> (App, Arc<MemoryIssueService>) {
    let service = Arc::new(MemoryIssueService::new(issues));
    let config = Config {
      api: ApiConfig {
        url: "http://localhost/api/".to_string(),
        workspace: "acme".to_string(),
      },
      default_project: Some("proj".to_string()),
      ..Config::default()
    };
    (App::with_services(config, service.clone(), service.clone()), service)
  }

  fn named(id: &str, name: &str, priority: Priority) -> Issue {
    let mut issue = test_issue(id);
    issue.name = name.to_string();
    issue.priority = priority;
    issue
  }

  #[test]
  fn test_parse_group_by() {
    assert_eq!(parse_group_by("none").unwrap(), None);
    assert_eq!(parse_group_by("priority").unwrap(), Some(GroupBy::Priority));
    assert!(parse_group_by("colour").is_err());
  }

  #[test]
  fn test_parse_filter() {
    let (dimension, values) = parse_filter("priority=high,low").unwrap();
    assert_eq!(dimension, FilterDimension::Priority);
    assert_eq!(values, vec!["high".to_string(), "low".to_string()]);
    assert!(parse_filter("priority").is_err());
  }

  #[tokio::test]
  async fn test_list_groups_and_filters() {
    let (mut app, _) = app(vec![
      named("1", "Fix login", Priority::High),
      named("2", "Write docs", Priority::Low),
    ]);

    let out = app
      .list(
        ListTarget::Project,
        ListOptions {
          group_by: Some(Some(GroupBy::Priority)),
          filters: vec![(FilterDimension::Priority, vec!["high".to_string()])],
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert!(out.starts_with("high (1)\n"));
    assert!(out.contains("Fix login"));
    assert!(!out.contains("Write docs"));
  }

  #[tokio::test]
  async fn test_list_without_project() {
    let (mut app, _) = app(vec![]);
    app.config.default_project = None;
    assert!(app.list(ListTarget::Project, ListOptions::default()).await.is_err());
  }

  #[tokio::test]
  async fn test_set_patches_issue() {
    let (mut app, service) = app(vec![named("1", "Fix login", Priority::Low)]);
    let updated = app.set("1", &["prio=urgent".to_string()]).await.unwrap();
    assert_eq!(updated.priority, Priority::Urgent);
    assert_eq!(service.stored("1").unwrap().priority, Priority::Urgent);
  }

  #[tokio::test]
  async fn test_move_between_priority_groups() {
    let (mut app, service) = app(vec![named("1", "Fix login", Priority::Low)]);
    let moved = app
      .move_issue("1", "high", Some(GroupBy::Priority))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(moved.priority, Priority::High);
    assert_eq!(service.write_calls(), 1);

    let again = app.move_issue("1", "high", None).await.unwrap();
    assert!(again.is_none());
  }

  #[tokio::test]
  async fn test_move_needs_grouping() {
    let (mut app, _) = app(vec![test_issue("1")]);
    assert!(app.move_issue("1", "high", None).await.is_err());
  }

  #[tokio::test]
  async fn test_create_and_delete() {
    let (mut app, service) = app(vec![]);
    let created = app.create("New issue", Priority::Medium).await.unwrap();
    assert_eq!(service.stored(&created.id).unwrap().name, "New issue");

    app.delete(&created.id).await.unwrap();
    assert!(service.stored(&created.id).is_none());
  }
}
