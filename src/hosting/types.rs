use serde::{Deserialize, Serialize};

/// Normalized pull request, independent of the hosting API's shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Opaque node id, used by mutations addressed by id
    pub id: String,
    pub number: u64,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub is_draft: bool,
    pub permalink: String,
    /// `open`, `closed`, or `merged`
    pub state: String,
    pub title: String,
    pub body: String,
    pub merge_commit: Option<String>,
}

impl PullRequest {
    pub fn head_branch_name(&self) -> &str {
        self.head_ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.head_ref_name)
    }

    pub fn base_branch_name(&self) -> &str {
        self.base_ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.base_ref_name)
    }

    pub fn is_merged(&self) -> bool {
        self.state == "merged"
    }

    /// The merge commit, only once the pull request is merged
    pub fn landed_commit(&self) -> Option<&str> {
        if self.is_merged() {
            self.merge_commit.as_deref()
        } else {
            None
        }
    }
}

/// Filters for listing pull requests; unset fields are not sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPullRequests {
    pub state: Option<String>,
    /// `owner:branch`
    pub head: Option<String>,
    pub base: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

impl ListPullRequests {
    pub fn query(&self) -> Vec<(&'static str, &str)> {
        [
            ("state", &self.state),
            ("head", &self.head),
            ("base", &self.base),
            ("sort", &self.sort),
            ("direction", &self.direction),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdatePullRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Branch the pull request merges into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: String,
}

/// Pull request as the REST API returns it
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiPullRequest {
    #[serde(default)]
    pub node_id: String,
    pub number: u64,
    pub head: ApiRef,
    pub base: ApiRef,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub html_url: String,
    pub state: String,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merged_at: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

impl From<ApiPullRequest> for PullRequest {
    fn from(pr: ApiPullRequest) -> Self {
        // The list endpoint omits `merged`; `merged_at` is always present
        let merged = pr.merged.unwrap_or(false) || pr.merged_at.is_some();
        Self {
            id: pr.node_id,
            number: pr.number,
            head_ref_name: pr.head.ref_name,
            base_ref_name: pr.base.ref_name,
            is_draft: pr.draft,
            permalink: pr.html_url,
            state: if merged {
                "merged".to_string()
            } else {
                pr.state
            },
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            merge_commit: pr.merge_commit_sha.filter(|sha| !sha.is_empty()),
        }
    }
}
