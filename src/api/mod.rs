//! Remote issue services.
//!
//! The cache reads through [`IssueReader`] and the mutation coordinator writes
//! through [`IssueWriter`]. Both are swappable: [`HttpIssueService`] talks to
//! the REST API, [`MemoryIssueService`] serves a fixture in process.

mod http;
mod memory;
mod types;

use async_trait::async_trait;

use crate::cache::{QueryParams, Scope};
use crate::error::RemoteError;
use crate::model::{Issue, IssueActivity, IssueDraft, IssuePatch, SubIssueResponse};

pub use http::HttpIssueService;
pub use memory::MemoryIssueService;

/// Read side of the issue service.
#[async_trait]
pub trait IssueReader: Send + Sync {
  /// Issues for a list scope, in server order.
  async fn list_issues(&self, scope: &Scope, params: &QueryParams) -> Result<Vec<Issue>, RemoteError>;

  async fn sub_issues(&self, project_id: &str, parent_id: &str) -> Result<SubIssueResponse, RemoteError>;

  async fn issue(&self, project_id: &str, issue_id: &str) -> Result<Issue, RemoteError>;

  async fn activity(&self, project_id: &str, issue_id: &str) -> Result<Vec<IssueActivity>, RemoteError>;
}

/// Write side of the issue service.
#[async_trait]
pub trait IssueWriter: Send + Sync {
  async fn create_issue(&self, project_id: &str, draft: &IssueDraft) -> Result<Issue, RemoteError>;

  async fn patch_issue(
    &self,
    project_id: &str,
    issue_id: &str,
    patch: &IssuePatch,
  ) -> Result<Issue, RemoteError>;

  async fn delete_issue(&self, project_id: &str, issue_id: &str) -> Result<(), RemoteError>;
}
