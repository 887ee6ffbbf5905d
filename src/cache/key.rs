//! Structured cache keys.
//!
//! A key is a logical scope plus a normalized parameter record. Two callers
//! asking for the same scope, ids and parameters always hash to the same
//! entry, regardless of the order parameters were supplied in.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::KeyError;
use crate::view::{GroupBy, OrderBy};

/// Logical scope an entry covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
  ProjectIssues { project_id: String },
  CycleIssues { project_id: String, cycle_id: String },
  ModuleIssues { project_id: String, module_id: String },
  ViewIssues { project_id: String, view_id: String },
  /// Issues assigned to a user across a workspace; `None` means the caller.
  UserIssues { workspace: String, user_id: Option<String> },
  SubIssues { project_id: String, parent_id: String },
  IssueDetails { project_id: String, issue_id: String },
  IssueActivity { project_id: String, issue_id: String },
}

impl Scope {
  pub fn project(project_id: impl Into<String>) -> Self {
    Self::ProjectIssues {
      project_id: project_id.into(),
    }
  }

  pub fn sub_issues(project_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
    Self::SubIssues {
      project_id: project_id.into(),
      parent_id: parent_id.into(),
    }
  }

  pub fn details(project_id: impl Into<String>, issue_id: impl Into<String>) -> Self {
    Self::IssueDetails {
      project_id: project_id.into(),
      issue_id: issue_id.into(),
    }
  }

  pub fn activity(project_id: impl Into<String>, issue_id: impl Into<String>) -> Self {
    Self::IssueActivity {
      project_id: project_id.into(),
      issue_id: issue_id.into(),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Scope::ProjectIssues { .. } => "project_issues",
      Scope::CycleIssues { .. } => "cycle_issues",
      Scope::ModuleIssues { .. } => "module_issues",
      Scope::ViewIssues { .. } => "view_issues",
      Scope::UserIssues { .. } => "user_issues",
      Scope::SubIssues { .. } => "sub_issues",
      Scope::IssueDetails { .. } => "issue_details",
      Scope::IssueActivity { .. } => "issue_activity",
    }
  }

  /// Identifier segment of the key, e.g. `proj/cycle`.
  pub fn id(&self) -> String {
    match self {
      Scope::ProjectIssues { project_id } => project_id.clone(),
      Scope::CycleIssues {
        project_id,
        cycle_id: id,
      }
      | Scope::ModuleIssues {
        project_id,
        module_id: id,
      }
      | Scope::ViewIssues {
        project_id,
        view_id: id,
      }
      | Scope::SubIssues {
        project_id,
        parent_id: id,
      }
      | Scope::IssueDetails {
        project_id,
        issue_id: id,
      }
      | Scope::IssueActivity {
        project_id,
        issue_id: id,
      } => format!("{}/{}", project_id, id),
      Scope::UserIssues { workspace, user_id } => {
        format!("{}/{}", workspace, user_id.as_deref().unwrap_or("me"))
      }
    }
  }

  /// Identifier fields in declaration order, `None` for an absent user id.
  fn segments(&self) -> Vec<Option<&str>> {
    match self {
      Scope::ProjectIssues { project_id } => vec![Some(project_id.as_str())],
      Scope::CycleIssues {
        project_id,
        cycle_id: id,
      }
      | Scope::ModuleIssues {
        project_id,
        module_id: id,
      }
      | Scope::ViewIssues {
        project_id,
        view_id: id,
      }
      | Scope::SubIssues {
        project_id,
        parent_id: id,
      }
      | Scope::IssueDetails {
        project_id,
        issue_id: id,
      }
      | Scope::IssueActivity {
        project_id,
        issue_id: id,
      } => vec![Some(project_id.as_str()), Some(id.as_str())],
      Scope::UserIssues { workspace, user_id } => {
        vec![Some(workspace.as_str()), user_id.as_deref()]
      }
    }
  }

  pub fn project_id(&self) -> Option<&str> {
    match self {
      Scope::ProjectIssues { project_id }
      | Scope::CycleIssues { project_id, .. }
      | Scope::ModuleIssues { project_id, .. }
      | Scope::ViewIssues { project_id, .. }
      | Scope::SubIssues { project_id, .. }
      | Scope::IssueDetails { project_id, .. }
      | Scope::IssueActivity { project_id, .. } => Some(project_id),
      Scope::UserIssues { .. } => None,
    }
  }

  /// Whether entries under this scope hold an issue collection.
  pub fn is_list(&self) -> bool {
    !matches!(
      self,
      Scope::SubIssues { .. } | Scope::IssueDetails { .. } | Scope::IssueActivity { .. }
    )
  }

  /// Reject keys with blank identifiers before anything is read or written.
  pub fn validate(&self) -> Result<(), KeyError> {
    fn require(scope: &'static str, field: &'static str, value: &str) -> Result<(), KeyError> {
      if value.trim().is_empty() {
        Err(KeyError::MissingIdentifier { scope, field })
      } else {
        Ok(())
      }
    }

    let kind = self.kind();
    match self {
      Scope::ProjectIssues { project_id } => require(kind, "project_id", project_id),
      Scope::CycleIssues {
        project_id,
        cycle_id,
      } => {
        require(kind, "project_id", project_id)?;
        require(kind, "cycle_id", cycle_id)
      }
      Scope::ModuleIssues {
        project_id,
        module_id,
      } => {
        require(kind, "project_id", project_id)?;
        require(kind, "module_id", module_id)
      }
      Scope::ViewIssues {
        project_id,
        view_id,
      } => {
        require(kind, "project_id", project_id)?;
        require(kind, "view_id", view_id)
      }
      Scope::UserIssues { workspace, user_id } => {
        require(kind, "workspace", workspace)?;
        match user_id {
          Some(user) => require(kind, "user_id", user),
          None => Ok(()),
        }
      }
      Scope::SubIssues {
        project_id,
        parent_id,
      } => {
        require(kind, "project_id", project_id)?;
        require(kind, "parent_id", parent_id)
      }
      Scope::IssueDetails {
        project_id,
        issue_id,
      }
      | Scope::IssueActivity {
        project_id,
        issue_id,
      } => {
        require(kind, "project_id", project_id)?;
        require(kind, "issue_id", issue_id)
      }
    }
  }
}

/// Normalized query parameters.
///
/// Keys are sorted, values trimmed, blank values dropped. List values are
/// sorted and de-duplicated before being joined with commas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: &str, value: impl AsRef<str>) {
    let value = value.as_ref().trim();
    if value.is_empty() {
      self.0.remove(key);
    } else {
      self.0.insert(key.to_string(), value.to_string());
    }
  }

  pub fn insert_list(&mut self, key: &str, values: &[String]) {
    let mut values: Vec<&str> = values
      .iter()
      .map(|v| v.trim())
      .filter(|v| !v.is_empty())
      .collect();
    values.sort_unstable();
    values.dedup();
    self.insert(key, values.join(","));
  }

  pub fn with(mut self, key: &str, value: impl AsRef<str>) -> Self {
    self.insert(key, value);
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn get_list(&self, key: &str) -> Vec<String> {
    self
      .get(key)
      .map(|v| v.split(',').map(str::to_string).collect())
      .unwrap_or_default()
  }

  pub fn remove(&mut self, key: &str) -> Option<String> {
    self.0.remove(key)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Grouping carried by the parameters, if any and if it parses.
  pub fn group_by(&self) -> Option<GroupBy> {
    self.get("group_by").and_then(|v| v.parse().ok())
  }

  pub fn order_by(&self) -> Option<OrderBy> {
    self.get("order_by").and_then(|v| v.parse().ok())
  }

  /// Canonical `k=v&k2=v2` form.
  pub fn serialize(&self) -> String {
    self
      .0
      .iter()
      .map(|(k, v)| format!("{}={}", k, v))
      .collect::<Vec<_>>()
      .join("&")
  }
}

impl<'a> FromIterator<(&'a str, &'a str)> for QueryParams {
  fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
    let mut params = Self::new();
    for (k, v) in iter {
      params.insert(k, v);
    }
    params
  }
}

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub scope: Scope,
  pub params: QueryParams,
}

impl CacheKey {
  pub fn new(scope: Scope, params: QueryParams) -> Self {
    Self { scope, params }
  }

  /// Key with no parameters, used for detail, activity and sub-issue scopes.
  pub fn bare(scope: Scope) -> Self {
    Self::new(scope, QueryParams::new())
  }

  pub fn validate(&self) -> Result<(), KeyError> {
    self.scope.validate()
  }

  /// Stable fixed-length hash of the key.
  ///
  /// Every segment is length-prefixed, so identifiers containing `/`, `:`
  /// or `=` cannot run into their neighbours. An absent user id has its own
  /// marker and never matches a literal id.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.scope.kind().as_bytes());
    for segment in self.scope.segments() {
      match segment {
        Some(value) => hasher.update(format!("|{}:{}", value.len(), value).as_bytes()),
        None => hasher.update(b"|-"),
      }
    }
    for (k, v) in self.params.iter() {
      hasher.update(format!("&{}:{}={}:{}", k.len(), k, v.len(), v).as_bytes());
    }
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    let what = match &self.scope {
      Scope::ProjectIssues { project_id } => format!("project {} issues", project_id),
      Scope::CycleIssues {
        project_id,
        cycle_id,
      } => format!("cycle {} issues in {}", cycle_id, project_id),
      Scope::ModuleIssues {
        project_id,
        module_id,
      } => format!("module {} issues in {}", module_id, project_id),
      Scope::ViewIssues {
        project_id,
        view_id,
      } => format!("view {} issues in {}", view_id, project_id),
      Scope::UserIssues { workspace, user_id } => match user_id {
        Some(user) => format!("issues of {} in {}", user, workspace),
        None => format!("my issues in {}", workspace),
      },
      Scope::SubIssues { parent_id, .. } => format!("sub-issues of {}", parent_id),
      Scope::IssueDetails { issue_id, .. } => format!("issue {}", issue_id),
      Scope::IssueActivity { issue_id, .. } => format!("activity of {}", issue_id),
    };
    if self.params.is_empty() {
      what
    } else {
      format!("{} ({})", what, self.params.serialize())
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description())
  }
}
