//! Mirroring pull request state into the branch graph.
//!
//! Network calls happen between short transactions; no lock is held while
//! waiting on the hosting service.

use crate::errors::Result;
use crate::hosting::{
    CreatePullRequest, HostingProvider, ListPullRequests, PullRequest, UpdatePullRequest,
    STACK_COMMENT_MARKER,
};
use crate::storage::{Branch, Database, GraphRead, PullRequestRecord, WriteTx};
use tracing::{debug, info};

/// The git operations submitting a stack needs
pub trait SubmitGit {
    /// Publish a branch to the remote without clobbering unseen remote work
    fn push_branch(&self, branch: &str) -> Result<()>;
    /// Subject and body of the branch's tip commit
    fn commit_message(&self, branch: &str) -> Result<(String, String)>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Draft state to apply: new pull requests are opened with it and
    /// existing ones converted. `None` opens ready pull requests and leaves
    /// existing ones alone.
    pub draft: Option<bool>,
    /// Requested on newly opened pull requests
    pub reviewers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBranch {
    pub branch: String,
    pub number: u64,
    pub permalink: String,
    pub action: SubmitAction,
}

impl From<&PullRequest> for PullRequestRecord {
    fn from(pr: &PullRequest) -> Self {
        Self {
            id: pr.id.clone(),
            number: pr.number,
            permalink: pr.permalink.clone(),
            state: pr.state.clone(),
            title: pr.title.clone(),
            body: pr.body.clone(),
            is_draft: pr.is_draft,
            merge_commit: pr.merge_commit.clone(),
        }
    }
}

/// Store `pr` as the mirror of `branch`, recording the landed commit if merged
pub fn link_pull_request(db: &Database, branch: &str, pr: &PullRequest) -> Result<()> {
    let mut tx = db.begin_write();
    let entry = tx.branch_mut(branch)?;
    entry.pull_request = Some(PullRequestRecord::from(pr));
    if let Some(sha) = pr.landed_commit() {
        entry.merge_commit = Some(sha.to_string());
    }
    tx.commit()?;
    debug!("Linked '{}' to #{}", branch, pr.number);
    Ok(())
}

/// Re-fetch every linked pull request of a stack and link members that have
/// none yet to the newest pull request opened from them; returns the
/// branches refreshed
pub async fn refresh_pull_requests<P>(
    db: &Database,
    provider: &P,
    stack: &str,
) -> Result<Vec<String>>
where
    P: HostingProvider + ?Sized,
{
    let (owner, members) = {
        let tx = db.begin_read();
        let members: Vec<(String, Option<u64>)> = tx
            .ordered_stack_branches(stack)?
            .into_iter()
            .map(|b| (b.name.clone(), b.pull_request.as_ref().map(|pr| pr.number)))
            .collect();
        (tx.repository().owner.clone(), members)
    };

    let mut refreshed = Vec::with_capacity(members.len());
    for (branch, number) in members {
        let pr = match number {
            Some(number) => Some(provider.get_pull_request(number).await?),
            None if !owner.is_empty() => {
                let filter = ListPullRequests {
                    state: Some("all".to_string()),
                    head: Some(format!("{owner}:{branch}")),
                    ..ListPullRequests::default()
                };
                provider.list_pull_requests(&filter).await?.into_iter().next()
            }
            None => None,
        };
        if let Some(pr) = pr {
            link_pull_request(db, &branch, &pr)?;
            refreshed.push(branch);
        }
    }

    info!(
        "Refreshed {} pull request(s) of '{}'",
        refreshed.len(),
        stack
    );
    Ok(refreshed)
}

/// Markdown listing of a stack's pull requests, top of the stack first
pub fn render_stack_comment(ordered: &[&Branch], current: &str) -> String {
    let mut body = String::from("### Stack\n\n");
    for branch in ordered.iter().rev() {
        let label = match &branch.pull_request {
            Some(pr) => format!("#{} {}", pr.number, pr.title),
            None => format!("`{}` (no pull request)", branch.name),
        };
        if branch.name == current {
            body.push_str(&format!("- **{label}** \u{1F448}\n"));
        } else {
            body.push_str(&format!("- {label}\n"));
        }
    }
    if let Some(first) = ordered.first() {
        body.push_str(&format!("- `{}`\n", first.parent.name()));
    }
    body.push_str(&format!("\n<sub>{STACK_COMMENT_MARKER}</sub>\n"));
    body
}

/// Replace the managed comment on every linked pull request of a stack
pub async fn sync_stack_comments<P>(db: &Database, provider: &P, stack: &str) -> Result<usize>
where
    P: HostingProvider + ?Sized,
{
    let comments: Vec<(u64, String)> = {
        let tx = db.begin_read();
        let ordered = tx.ordered_stack_branches(stack)?;
        ordered
            .iter()
            .filter_map(|b| {
                b.pull_request
                    .as_ref()
                    .map(|pr| (pr.number, render_stack_comment(&ordered, &b.name)))
            })
            .collect()
    };

    for (number, body) in &comments {
        if let Some(existing) = provider.find_stack_comment(*number).await? {
            provider.remove_comment(existing.id).await?;
        }
        provider.add_comment(*number, body).await?;
        debug!("Posted stack comment on #{}", number);
    }

    Ok(comments.len())
}

/// Push every unmerged member of a stack and open or retarget its pull
/// request so that it merges into the member's parent
pub async fn submit<P, G>(
    db: &Database,
    provider: &P,
    git: &G,
    stack: &str,
    options: &SubmitOptions,
) -> Result<Vec<SubmittedBranch>>
where
    P: HostingProvider + ?Sized,
    G: SubmitGit + ?Sized,
{
    let (owner, members) = {
        let tx = db.begin_read();
        let members: Vec<(String, String, Option<u64>)> = tx
            .ordered_stack_branches(stack)?
            .into_iter()
            .filter(|b| !b.pull_request.as_ref().is_some_and(|pr| pr.is_merged()))
            .map(|b| {
                (
                    b.name.clone(),
                    b.parent.name().to_string(),
                    b.pull_request.as_ref().map(|pr| pr.number),
                )
            })
            .collect();
        (tx.repository().owner.clone(), members)
    };

    let mut submitted = Vec::with_capacity(members.len());
    for (branch, base, number) in members {
        git.push_branch(&branch)?;

        let existing = match number {
            Some(number) => Some(provider.get_pull_request(number).await?),
            None if !owner.is_empty() => {
                let filter = ListPullRequests {
                    state: Some("open".to_string()),
                    head: Some(format!("{owner}:{branch}")),
                    ..ListPullRequests::default()
                };
                provider.list_pull_requests(&filter).await?.into_iter().next()
            }
            None => None,
        };

        let (pr, action) = match existing.filter(|pr| pr.state == "open") {
            Some(pr) => retarget(provider, pr, &base, options.draft).await?,
            None => {
                let (title, body) = git.commit_message(&branch)?;
                let request = CreatePullRequest {
                    title,
                    body,
                    head: branch.clone(),
                    base: base.clone(),
                    draft: options.draft.unwrap_or(false),
                };
                let mut pr = provider.create_pull_request(&request).await?;
                if !options.reviewers.is_empty() {
                    pr = provider.request_reviewers(pr.number, &options.reviewers).await?;
                }
                info!("Opened #{} for '{}' into '{}'", pr.number, branch, base);
                (pr, SubmitAction::Created)
            }
        };

        link_pull_request(db, &branch, &pr)?;
        submitted.push(SubmittedBranch {
            branch,
            number: pr.number,
            permalink: pr.permalink,
            action,
        });
    }

    Ok(submitted)
}

/// Point an open pull request at `base` and apply the requested draft state
async fn retarget<P>(
    provider: &P,
    mut pr: PullRequest,
    base: &str,
    draft: Option<bool>,
) -> Result<(PullRequest, SubmitAction)>
where
    P: HostingProvider + ?Sized,
{
    let mut action = SubmitAction::Unchanged;
    if pr.base_branch_name() != base {
        let update = UpdatePullRequest {
            base: Some(base.to_string()),
            ..UpdatePullRequest::default()
        };
        pr = provider.update_pull_request(pr.number, &update).await?;
        debug!("Retargeted #{} onto '{}'", pr.number, base);
        action = SubmitAction::Updated;
    }
    match draft {
        Some(true) if !pr.is_draft => {
            pr = provider.convert_to_draft(&pr).await?;
            action = SubmitAction::Updated;
        }
        Some(false) if pr.is_draft => {
            pr = provider.mark_ready_for_review(&pr).await?;
            action = SubmitAction::Updated;
        }
        _ => {}
    }
    Ok((pr, action))
}

/// Retire every member whose mirrored pull request is merged.
///
/// Members are retired from the top of the stack down, so a merged root
/// whose merged children go first can still be retired.
pub fn prune_merged(db: &Database, stack: &str) -> Result<Vec<String>> {
    let mut tx = db.begin_write();
    match retire_merged(&mut tx, stack) {
        Ok(merged) => {
            tx.commit()?;
            Ok(merged)
        }
        Err(e) => {
            tx.abort();
            Err(e)
        }
    }
}

fn retire_merged(tx: &mut WriteTx<'_>, stack: &str) -> Result<Vec<String>> {
    let merged: Vec<String> = tx
        .ordered_stack_branches(stack)?
        .into_iter()
        .filter(|b| b.pull_request.as_ref().is_some_and(|pr| pr.is_merged()))
        .map(|b| b.name.clone())
        .collect();

    for branch in merged.iter().rev() {
        tx.retire_branch(branch)?;
        info!("Retired merged branch '{}'", branch);
    }
    Ok(merged)
}
