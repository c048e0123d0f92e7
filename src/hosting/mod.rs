//! Code-hosting boundary.
//!
//! The core only sees [`PullRequest`] records through [`HostingProvider`];
//! [`GitHubClient`] is the one implementation.

pub mod github;
pub mod types;

pub use github::GitHubClient;
pub use types::{CreatePullRequest, IssueComment, ListPullRequests, PullRequest, UpdatePullRequest};

use crate::errors::Result;
use async_trait::async_trait;

/// Marks the comment gstack owns on each pull request of a stack
pub const STACK_COMMENT_MARKER: &str = "This stack of pull requests is managed by gstack.";

/// Pull request operations against a hosting service
#[async_trait]
pub trait HostingProvider: Send + Sync {
    /// Get the provider name for display purposes
    fn name(&self) -> &'static str;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    async fn list_pull_requests(&self, filter: &ListPullRequests) -> Result<Vec<PullRequest>>;

    async fn create_pull_request(&self, request: &CreatePullRequest) -> Result<PullRequest>;

    async fn update_pull_request(
        &self,
        number: u64,
        update: &UpdatePullRequest,
    ) -> Result<PullRequest>;

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<PullRequest>;

    async fn convert_to_draft(&self, pr: &PullRequest) -> Result<PullRequest>;

    async fn mark_ready_for_review(&self, pr: &PullRequest) -> Result<PullRequest>;

    /// The comment carrying [`STACK_COMMENT_MARKER`], if present
    async fn find_stack_comment(&self, number: u64) -> Result<Option<IssueComment>>;

    async fn add_comment(&self, number: u64, body: &str) -> Result<IssueComment>;

    async fn remove_comment(&self, comment_id: u64) -> Result<()>;
}
