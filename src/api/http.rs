use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{ApiActivityList, ApiErrorBody, ApiIssueList};
use super::{IssueReader, IssueWriter};
use crate::cache::{QueryParams, Scope};
use crate::config::Config;
use crate::error::RemoteError;
use crate::model::{Issue, IssueActivity, IssueDraft, IssuePatch, SubIssueResponse};

/// REST client for the issue API.
#[derive(Clone)]
pub struct HttpIssueService {
  client: Client,
  base: Url,
  workspace: String,
}

impl HttpIssueService {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let mut key =
      HeaderValue::from_str(&token).map_err(|e| eyre!("Invalid API token header: {}", e))?;
    key.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert("X-Api-Key", key);

    let client = Client::builder()
      .default_headers(headers)
      .user_agent(concat!("issueview/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    // Relative joins drop the last path segment unless it ends with a slash
    let mut raw = config.api.url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }
    let base = Url::parse(&raw).map_err(|e| eyre!("Invalid API url {}: {}", raw, e))?;

    Ok(Self {
      client,
      base,
      workspace: config.api.workspace.clone(),
    })
  }

  fn url(&self, path: &str) -> Result<Url, RemoteError> {
    self
      .base
      .join(path)
      .map_err(|e| RemoteError::new("url", format!("{}: {}", path, e)))
  }

  fn project_path(&self, project_id: &str, rest: &str) -> String {
    format!(
      "workspaces/{}/projects/{}/{}",
      self.workspace, project_id, rest
    )
  }

  fn list_path(&self, scope: &Scope) -> Result<String, RemoteError> {
    let path = match scope {
      Scope::ProjectIssues { project_id } => self.project_path(project_id, "issues/"),
      Scope::CycleIssues {
        project_id,
        cycle_id,
      } => self.project_path(project_id, &format!("cycles/{}/cycle-issues/", cycle_id)),
      Scope::ModuleIssues {
        project_id,
        module_id,
      } => self.project_path(project_id, &format!("modules/{}/module-issues/", module_id)),
      Scope::ViewIssues {
        project_id,
        view_id,
      } => self.project_path(project_id, &format!("views/{}/issues/", view_id)),
      Scope::UserIssues { workspace, user_id } => match user_id {
        Some(user) => format!("workspaces/{}/user-issues/{}/", workspace, user),
        None => format!("workspaces/{}/my-issues/", workspace),
      },
      other => {
        return Err(RemoteError::new(
          "400",
          format!("{} scope does not list issues", other.kind()),
        ))
      }
    };
    Ok(path)
  }

  async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
    let response = request
      .send()
      .await
      .map_err(|e| RemoteError::network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body: ApiErrorBody = response.json().await.unwrap_or_default();
    let message = body
      .message()
      .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    Err(RemoteError::new(status.as_u16().to_string(), message))
  }

  async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
    self
      .send(request)
      .await?
      .json::<T>()
      .await
      .map_err(|e| RemoteError::network(format!("invalid response body: {}", e)))
  }
}

#[async_trait]
impl IssueReader for HttpIssueService {
  async fn list_issues(&self, scope: &Scope, params: &QueryParams) -> Result<Vec<Issue>, RemoteError> {
    let url = self.url(&self.list_path(scope)?)?;
    // Grouping happens client-side; the server only filters and orders
    let query: Vec<(&str, &str)> = params.iter().filter(|(k, _)| *k != "group_by").collect();
    debug!("GET {} {:?}", url, query);

    let list: ApiIssueList = self.send_json(self.client.get(url).query(&query)).await?;
    Ok(list.into_issues())
  }

  async fn sub_issues(&self, project_id: &str, parent_id: &str) -> Result<SubIssueResponse, RemoteError> {
    let url = self.url(&self.project_path(project_id, &format!("issues/{}/sub-issues/", parent_id)))?;
    debug!("GET {}", url);
    self.send_json(self.client.get(url)).await
  }

  async fn issue(&self, project_id: &str, issue_id: &str) -> Result<Issue, RemoteError> {
    let url = self.url(&self.project_path(project_id, &format!("issues/{}/", issue_id)))?;
    debug!("GET {}", url);
    self.send_json(self.client.get(url)).await
  }

  async fn activity(&self, project_id: &str, issue_id: &str) -> Result<Vec<IssueActivity>, RemoteError> {
    let url = self.url(&self.project_path(project_id, &format!("issues/{}/history/", issue_id)))?;
    debug!("GET {}", url);
    let list: ApiActivityList = self.send_json(self.client.get(url)).await?;
    Ok(list.into_activity())
  }
}

#[async_trait]
impl IssueWriter for HttpIssueService {
  async fn create_issue(&self, project_id: &str, draft: &IssueDraft) -> Result<Issue, RemoteError> {
    let url = self.url(&self.project_path(project_id, "issues/"))?;
    debug!("POST {}", url);
    self.send_json(self.client.post(url).json(draft)).await
  }

  async fn patch_issue(
    &self,
    project_id: &str,
    issue_id: &str,
    patch: &IssuePatch,
  ) -> Result<Issue, RemoteError> {
    let url = self.url(&self.project_path(project_id, &format!("issues/{}/", issue_id)))?;
    debug!("PATCH {} {:?}", url, patch.fields());
    self.send_json(self.client.patch(url).json(patch)).await
  }

  async fn delete_issue(&self, project_id: &str, issue_id: &str) -> Result<(), RemoteError> {
    let url = self.url(&self.project_path(project_id, &format!("issues/{}/", issue_id)))?;
    debug!("DELETE {}", url);
    self.send(self.client.delete(url)).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{ApiConfig, Config};

  fn service(url: &str) -> HttpIssueService {
    let config = Config {
      api: ApiConfig {
        url: url.to_string(),
        workspace: "acme".to_string(),
      },
      ..Config::default()
    };
    HttpIssueService {
      client: Client::new(),
      base: Url::parse(&format!("{}/", config.api.url.trim_end_matches('/'))).unwrap(),
      workspace: config.api.workspace,
    }
  }

  #[test]
  fn test_list_paths() {
    let svc = service("https://tracker.example.com/api/v1");
    let cycle = Scope::CycleIssues {
      project_id: "p1".to_string(),
      cycle_id: "c1".to_string(),
    };
    assert_eq!(
      svc.url(&svc.list_path(&cycle).unwrap()).unwrap().as_str(),
      "https://tracker.example.com/api/v1/workspaces/acme/projects/p1/cycles/c1/cycle-issues/"
    );

    let mine = Scope::UserIssues {
      workspace: "acme".to_string(),
      user_id: None,
    };
    assert_eq!(svc.list_path(&mine).unwrap(), "workspaces/acme/my-issues/");
  }

  #[test]
  fn test_detail_scope_is_not_listable() {
    let svc = service("https://tracker.example.com/api/v1/");
    let err = svc.list_path(&Scope::details("p1", "i1")).unwrap_err();
    assert_eq!(err.code, "400");
  }
}
