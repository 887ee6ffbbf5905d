use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::view::ViewDefaults;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  pub default_project: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Defaults for new views
  #[serde(default)]
  pub views: ViewDefaults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Base URL, e.g. https://api.example.com/api/
  #[serde(default)]
  pub url: String,
  /// Workspace slug
  #[serde(default)]
  pub workspace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Age in seconds after which a cached entry is refetched on load
  #[serde(default = "default_stale_seconds")]
  pub stale_seconds: u64,
}

fn default_stale_seconds() -> u64 {
  300
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_seconds: default_stale_seconds(),
    }
  }
}

/// File name looked up in the working directory.
const LOCAL_FILE: &str = "issueview.yaml";
/// Overrides the lookup when `--config` is not given.
const PATH_ENV: &str = "IV_CONFIG";

impl Config {
  /// Read the configuration for an `iv` run.
  ///
  /// `--config` wins, then `$IV_CONFIG`, then `./issueview.yaml`, then
  /// `issueview/config.yaml` under the platform config directory.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(path) => path.to_path_buf(),
      None => Self::lookup_paths()
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
          eyre!(
            "no issueview config found; pass --config, set {} or create {}",
            PATH_ENV,
            Self::user_path()
              .map(|p| p.display().to_string())
              .unwrap_or_else(|| LOCAL_FILE.to_string())
          )
        })?,
    };
    Self::read(&path)
  }

  /// `issueview/config.yaml` in the platform config directory.
  pub fn user_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("issueview").join("config.yaml"))
  }

  fn lookup_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::env::var_os(PATH_ENV)
      .map(PathBuf::from)
      .into_iter()
      .collect();
    paths.push(PathBuf::from(LOCAL_FILE));
    paths.extend(Self::user_path());
    paths
  }

  fn read(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .wrap_err_with(|| format!("cannot read issueview config {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
      .wrap_err_with(|| format!("invalid issueview config {}", path.display()))?;
    config
      .check()
      .wrap_err_with(|| format!("invalid issueview config {}", path.display()))?;
    Ok(config)
  }

  /// An API URL must parse and come with a workspace slug.
  fn check(&self) -> Result<()> {
    let url = self.api.url.trim();
    if url.is_empty() {
      return Ok(());
    }
    Url::parse(url).map_err(|e| eyre!("api.url '{}': {}", url, e))?;
    if self.api.workspace.trim().is_empty() {
      return Err(eyre!("api.workspace is required when api.url is set"));
    }
    Ok(())
  }

  /// Get the API token from environment variables.
  ///
  /// Checks IV_API_TOKEN first, then ISSUEVIEW_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("IV_API_TOKEN")
      .or_else(|_| std::env::var("ISSUEVIEW_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set IV_API_TOKEN or ISSUEVIEW_API_TOKEN environment variable.")
      })
  }

  pub fn stale_time(&self) -> chrono::Duration {
    let seconds = i64::try_from(self.cache.stale_seconds).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(seconds).unwrap_or(chrono::Duration::MAX)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::view::{GroupBy, IssueLayout, OrderBy, OrderField};
  use std::io::Write;

  #[test]
  fn test_load_full_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"
api:
  url: https://api.example.com/api/
  workspace: acme
default_project: proj
cache:
  stale_seconds: 60
views:
  group_by: priority
  order_by: sort_order
  show_empty_groups: true
  layout: kanban
"#
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.api.workspace, "acme");
    assert_eq!(config.default_project.as_deref(), Some("proj"));
    assert_eq!(config.stale_time(), chrono::Duration::seconds(60));
    assert_eq!(config.views.group_by, Some(GroupBy::Priority));
    assert_eq!(config.views.order_by, OrderBy::asc(OrderField::SortOrder));
    assert_eq!(config.views.layout, IssueLayout::Kanban);
    assert!(config.views.show_empty_groups);
  }

  #[test]
  fn test_defaults_for_missing_sections() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "api:\n  url: http://localhost:8000/api/\n  workspace: w\n").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.stale_seconds, 300);
    assert_eq!(config.views.group_by, None);
    assert_eq!(config.views.layout, IssueLayout::List);
  }

  #[test]
  fn test_missing_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
    assert!(err.to_string().contains("cannot read issueview config"));
  }

  #[test]
  fn test_url_without_workspace_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "api:\n  url: https://api.example.com/api/\n").unwrap();

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid issueview config"));
    assert!(format!("{:?}", err).contains("api.workspace is required"));
  }

  #[test]
  fn test_malformed_url_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "api:\n  url: not a url\n  workspace: acme\n").unwrap();

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(format!("{:?}", err).contains("api.url 'not a url'"));
  }
}
