use super::types::{
    ApiPullRequest, CreatePullRequest, IssueComment, ListPullRequests, PullRequest,
    UpdatePullRequest,
};
use super::{HostingProvider, STACK_COMMENT_MARKER};
use crate::config::{Credential, HostingConfig};
use crate::errors::{Result, StackError};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, trace};

const COMMENTS_PER_PAGE: usize = 100;

/// GitHub REST (and, for draft state, GraphQL) client
pub struct GitHubClient {
    client: Client,
    base_url: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(config: &HostingConfig, credential: &Credential) -> Result<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(StackError::config(
                "hosting.owner and hosting.repo must be set (run `gstack init` in a clone with a remote)",
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", credential.token()))
                .map_err(|e| StackError::config(format!("Invalid auth header: {e}")))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("gstack/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(|e| StackError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
        })
    }

    /// Get the base API URL for this repository
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.api_url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| StackError::hosting(format!("GET request failed: {e}")))?;

        Self::handle_response(response).await
    }

    async fn send_json<T, U>(&self, method: reqwest::Method, url: &str, body: &T) -> Result<U>
    where
        T: Serialize + ?Sized,
        U: for<'de> Deserialize<'de>,
    {
        debug!("{} {}", method, url);

        let response = self
            .client
            .request(method.clone(), url)
            .json(body)
            .send()
            .await
            .map_err(|e| StackError::hosting(format!("{method} request failed: {e}")))?;

        Self::handle_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.api_url(path);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| StackError::hosting(format!("DELETE request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(StackError::hosting(format!(
                "DELETE failed with status {status}: {text}"
            )))
        }
    }

    /// Handle HTTP response and deserialize JSON
    async fn handle_response<T>(response: reqwest::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StackError::hosting(format!("Failed to read response body: {e}")))?;

        if status.is_success() {
            trace!("Response body: {}", text);
            serde_json::from_str(&text)
                .map_err(|e| StackError::hosting(format!("Failed to parse JSON response: {e}")))
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(StackError::auth(format!("Request was rejected: {text}")))
        } else {
            Err(StackError::hosting(format!(
                "Request failed with status {status}: {text}"
            )))
        }
    }

    /// Run a pull request mutation by node id, then re-read the pull request
    async fn graphql_pr_mutation(&self, mutation: &str, pr: &PullRequest) -> Result<PullRequest> {
        let query = format!(
            "mutation($id: ID!) {{ {mutation}(input: {{pullRequestId: $id}}) {{ pullRequest {{ number }} }} }}"
        );
        let body = json!({ "query": query, "variables": { "id": pr.id } });
        let url = format!("{}/graphql", self.base_url);

        let response: GraphQlResponse = self.send_json(reqwest::Method::POST, &url, &body).await?;
        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(StackError::hosting(format!(
                "{mutation} failed for #{}: {}",
                pr.number,
                messages.join("; ")
            )));
        }

        self.get_pull_request(pr.number).await
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[async_trait]
impl HostingProvider for GitHubClient {
    fn name(&self) -> &'static str {
        "GitHub"
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let pr: ApiPullRequest = self.get(&format!("pulls/{number}"), &[]).await?;
        Ok(pr.into())
    }

    async fn list_pull_requests(&self, filter: &ListPullRequests) -> Result<Vec<PullRequest>> {
        let prs: Vec<ApiPullRequest> = self.get("pulls", &filter.query()).await?;
        Ok(prs.into_iter().map(PullRequest::from).collect())
    }

    async fn create_pull_request(&self, request: &CreatePullRequest) -> Result<PullRequest> {
        let pr: ApiPullRequest = self
            .send_json(reqwest::Method::POST, &self.api_url("pulls"), request)
            .await?;
        debug!("Created pull request #{} for '{}'", pr.number, request.head);
        Ok(pr.into())
    }

    async fn update_pull_request(
        &self,
        number: u64,
        update: &UpdatePullRequest,
    ) -> Result<PullRequest> {
        let pr: ApiPullRequest = self
            .send_json(
                reqwest::Method::PATCH,
                &self.api_url(&format!("pulls/{number}")),
                update,
            )
            .await?;
        Ok(pr.into())
    }

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<PullRequest> {
        let pr: ApiPullRequest = self
            .send_json(
                reqwest::Method::POST,
                &self.api_url(&format!("pulls/{number}/requested_reviewers")),
                &json!({ "reviewers": reviewers }),
            )
            .await?;
        Ok(pr.into())
    }

    async fn convert_to_draft(&self, pr: &PullRequest) -> Result<PullRequest> {
        self.graphql_pr_mutation("convertPullRequestToDraft", pr)
            .await
    }

    async fn mark_ready_for_review(&self, pr: &PullRequest) -> Result<PullRequest> {
        self.graphql_pr_mutation("markPullRequestReadyForReview", pr)
            .await
    }

    async fn find_stack_comment(&self, number: u64) -> Result<Option<IssueComment>> {
        let per_page = COMMENTS_PER_PAGE.to_string();
        let mut page = 1usize;
        loop {
            let page_param = page.to_string();
            let comments: Vec<IssueComment> = self
                .get(
                    &format!("issues/{number}/comments"),
                    &[("per_page", per_page.as_str()), ("page", page_param.as_str())],
                )
                .await?;

            let count = comments.len();
            if let Some(found) = comments
                .into_iter()
                .find(|c| c.body.contains(STACK_COMMENT_MARKER))
            {
                return Ok(Some(found));
            }
            if count < COMMENTS_PER_PAGE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn add_comment(&self, number: u64, body: &str) -> Result<IssueComment> {
        self.send_json(
            reqwest::Method::POST,
            &self.api_url(&format!("issues/{number}/comments")),
            &json!({ "body": body }),
        )
        .await
    }

    async fn remove_comment(&self, comment_id: u64) -> Result<()> {
        self.delete(&format!("issues/comments/{comment_id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HostingConfig {
        HostingConfig {
            api_url: "https://api.example.com/".to_string(),
            owner: "octo".to_string(),
            repo: "widgets".to_string(),
            token: None,
        }
    }

    #[test]
    fn test_api_url_joins_cleanly() {
        let client = GitHubClient::new(&config(), &Credential::new("t")).unwrap();
        assert_eq!(
            client.api_url("/pulls/3"),
            "https://api.example.com/repos/octo/widgets/pulls/3"
        );
    }

    #[test]
    fn test_missing_repository_is_config_error() {
        let mut config = config();
        config.repo.clear();
        assert!(matches!(
            GitHubClient::new(&config, &Credential::new("t")),
            Err(StackError::Config(_))
        ));
    }
}
