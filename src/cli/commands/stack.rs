use super::RepoContext;
use crate::cli::output::Output;
use crate::config::Credential;
use crate::errors::{Result, StackError};
use crate::hosting::GitHubClient;
use crate::stack::remote::{
    prune_merged, refresh_pull_requests, submit, sync_stack_comments, SubmitAction, SubmitOptions,
};
use crate::stack::{HeritageEntry, RestackManager, RestackReport, StackService};
use crate::storage::{Branch, GraphRead};
use clap::Subcommand;
use console::style;

#[derive(Debug, Subcommand)]
pub enum StackAction {
    /// Create a new stack and make it current
    Create {
        /// Stack name
        name: String,
        /// Branch the stack is based on (default: trunk)
        #[arg(long, short)]
        base: Option<String>,
    },

    /// Switch the current stack
    Switch {
        /// Stack name
        name: String,
    },

    /// List all stacks
    List,

    /// Show the branches of a stack in order
    Show {
        /// Stack name (defaults to the current stack)
        name: Option<String>,
    },

    /// Create a branch off the current branch in the current stack
    Branch {
        /// New branch name
        name: String,
    },

    /// Add an existing branch to the current stack
    Track {
        /// Branch name
        name: String,
        /// Parent branch (default: the stack's base)
        #[arg(long, short)]
        parent: Option<String>,
    },

    /// Rebase every branch of a stack whose parent moved
    Sync {
        /// Stack name (defaults to the current stack)
        name: Option<String>,

        /// Resume after resolving a conflict
        #[arg(long, conflicts_with_all = ["abort", "skip"])]
        r#continue: bool,

        /// Abandon the halted rebase
        #[arg(long, conflicts_with = "skip")]
        abort: bool,

        /// Drop the conflicting commit and resume
        #[arg(long)]
        skip: bool,
    },

    /// Show the ancestry of a branch down to the trunk
    Log {
        /// Branch name (defaults to the checked-out branch)
        branch: Option<String>,
    },

    /// Refresh pull request state from GitHub
    Refresh {
        /// Stack name (defaults to the current stack)
        name: Option<String>,
        /// Also rewrite the stack comment on each pull request
        #[arg(long)]
        comments: bool,
    },

    /// Push every branch and open or retarget its pull request
    Submit {
        /// Stack name (defaults to the current stack)
        name: Option<String>,
        /// Open new pull requests as drafts and convert existing ones
        #[arg(long, conflicts_with = "ready")]
        draft: bool,
        /// Mark existing draft pull requests ready for review
        #[arg(long)]
        ready: bool,
        /// Reviewer to request on new pull requests (repeatable)
        #[arg(long = "reviewer", short = 'r')]
        reviewers: Vec<String>,
    },

    /// Retire branches whose pull requests are merged
    Prune {
        /// Stack name (defaults to the current stack)
        name: Option<String>,
    },
}

pub async fn run(action: StackAction) -> Result<()> {
    let ctx = RepoContext::open()?;

    match action {
        StackAction::Create { name, base } => create_stack(&ctx, &name, base.as_deref()),
        StackAction::Switch { name } => {
            service(&ctx).switch_stack(&name)?;
            Output::success(format!("Switched to stack '{name}'"));
            Ok(())
        }
        StackAction::List => list_stacks(&ctx),
        StackAction::Show { name } => show_stack(&ctx, name),
        StackAction::Branch { name } => {
            let branch = service(&ctx).create_branch(&name)?;
            print_registered("Created", &branch);
            Ok(())
        }
        StackAction::Track { name, parent } => {
            let branch = service(&ctx).track_branch(&name, parent.as_deref())?;
            print_registered("Tracking", &branch);
            Ok(())
        }
        StackAction::Sync {
            name,
            r#continue,
            abort,
            skip,
        } => sync_stack(&ctx, name, r#continue, abort, skip),
        StackAction::Log { branch } => show_heritage(&ctx, branch),
        StackAction::Refresh { name, comments } => refresh_stack(&ctx, name, comments).await,
        StackAction::Submit {
            name,
            draft,
            ready,
            reviewers,
        } => {
            let draft = match (draft, ready) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let options = SubmitOptions { draft, reviewers };
            submit_stack(&ctx, name, &options).await
        }
        StackAction::Prune { name } => {
            let stack = resolve_stack_name(&ctx, name)?;
            let pruned = prune_merged(&ctx.db, &stack)?;
            if pruned.is_empty() {
                Output::info(format!("No merged branches in '{stack}'"));
            } else {
                Output::success(format!("Retired {} merged branch(es)", pruned.len()));
                for branch in &pruned {
                    Output::sub_item(branch);
                }
                Output::tip(format!(
                    "Run `{}` to move the rest onto their new parents",
                    ctx.settings.sync.command_name
                ));
            }
            Ok(())
        }
    }
}

fn service(ctx: &RepoContext) -> StackService<'_> {
    StackService::new(&ctx.db, &ctx.repo, &ctx.settings)
}

/// The named stack, or the current one
fn resolve_stack_name(ctx: &RepoContext, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => ctx
            .db
            .begin_read()
            .current_stack()
            .map(|s| s.name.clone())
            .ok_or_else(|| {
                StackError::validation("No current stack; create one with `gstack stack create`")
            }),
    }
}

fn create_stack(ctx: &RepoContext, name: &str, base: Option<&str>) -> Result<()> {
    let stack = service(ctx).create_stack(name, base)?;
    Output::success(format!("Created stack '{}'", stack.name));
    Output::sub_item(format!("Base branch: {}", style(&stack.base_branch).cyan()));
    Output::next_steps(&["gstack stack branch <branch>", "gstack stack track <branch>"]);
    Ok(())
}

fn list_stacks(ctx: &RepoContext) -> Result<()> {
    let tx = ctx.db.begin_read();
    let stacks = tx.all_stacks();
    if stacks.is_empty() {
        Output::info("No stacks yet");
        return Ok(());
    }

    let current = tx.repository().current_stack.as_deref();
    for stack in stacks {
        let marker = if current == Some(stack.name.as_str()) {
            style("*").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {} {} ({} branch(es))",
            marker,
            style(&stack.name).bold(),
            style(format!("on {}", stack.base_branch)).dim(),
            stack.branches.len()
        );
    }
    Ok(())
}

fn show_stack(ctx: &RepoContext, name: Option<String>) -> Result<()> {
    let stack_name = resolve_stack_name(ctx, name)?;
    let checked_out = ctx.repo.get_current_branch().ok();

    let tx = ctx.db.begin_read();
    let stack = tx
        .stack(&stack_name)
        .ok_or_else(|| StackError::StackNotFound(stack_name.clone()))?;
    let ordered = tx.ordered_stack_branches(&stack_name)?;

    Output::section(format!("Stack '{}'", stack.name));
    for branch in ordered.iter().rev() {
        let name = if checked_out.as_deref() == Some(branch.name.as_str()) {
            style(format!("{} (current)", branch.name)).green().bold().to_string()
        } else {
            branch.name.clone()
        };
        let pr = match &branch.pull_request {
            Some(pr) => format!(" #{} [{}]", pr.number, pr.state),
            None => String::new(),
        };
        println!("  {}{}", name, style(pr).dim());
        println!(
            "  {} {}",
            style("│").dim(),
            style(format!("on {}", branch.parent.name())).dim()
        );
    }
    println!("  {}", style(&stack.base_branch).cyan());
    Ok(())
}

fn print_registered(verb: &str, branch: &Branch) {
    Output::success(format!("{verb} '{}'", branch.name));
    Output::sub_item(format!("Parent: {}", style(branch.parent.name()).cyan()));
}

fn sync_stack(
    ctx: &RepoContext,
    name: Option<String>,
    resume: bool,
    abort: bool,
    skip: bool,
) -> Result<()> {
    let progress = ctx.progress_path();
    let manager = RestackManager::new(&ctx.db, &ctx.repo, &progress);

    if abort {
        let state = manager.abort_restack()?;
        Output::success(format!(
            "Aborted restack of '{}'; '{}' is unchanged",
            state.stack_name, state.halted_branch
        ));
        return Ok(());
    }

    let report = if resume {
        manager.continue_restack()?
    } else if skip {
        manager.skip_restack()?
    } else {
        let stack = resolve_stack_name(ctx, name)?;
        if ctx.repo.is_dirty()? {
            return Err(StackError::validation(
                "Working tree has uncommitted changes; commit or stash them first",
            ));
        }
        manager.restack(&stack)?
    };

    match report {
        RestackReport::Completed(summary) => {
            if summary.restacked.is_empty() {
                Output::success(format!("Stack '{}' is up to date", summary.stack));
            } else {
                Output::success(format!(
                    "Restacked {} branch(es) of '{}'",
                    summary.restacked.len(),
                    summary.stack
                ));
                for branch in &summary.restacked {
                    Output::sub_item(branch);
                }
            }
            Ok(())
        }
        RestackReport::Halted(conflict) => {
            Output::error(format!(
                "Conflict while restacking '{}' in '{}'",
                conflict.branch, conflict.stack
            ));
            if let Some(headline) = &conflict.headline {
                Output::sub_item(headline);
            }
            if !conflict.hint.trim().is_empty() {
                println!("\n{}", conflict.hint.trim_end());
            }
            Output::next_steps(&[
                "Resolve the conflicts and `git add` the files",
                "gstack stack sync --continue",
                "or: gstack stack sync --skip | --abort",
            ]);
            Err(StackError::rebase(format!(
                "restack halted on '{}'",
                conflict.branch
            )))
        }
    }
}

fn show_heritage(ctx: &RepoContext, branch: Option<String>) -> Result<()> {
    let branch = match branch {
        Some(branch) => branch,
        None => ctx.repo.get_current_branch()?,
    };

    let tx = ctx.db.begin_read();
    let heritage = tx.heritage(&branch)?;
    for (depth, entry) in heritage.iter().enumerate() {
        let indent = "  ".repeat(depth);
        match entry {
            HeritageEntry::Branch(b) => {
                let head = b.parent.head().map(short_sha).unwrap_or("unrecorded");
                println!(
                    "{}{} {}",
                    indent,
                    style(&b.name).bold(),
                    style(format!("(built on {})", head)).dim()
                );
            }
            HeritageEntry::Trunk(name) => println!("{}{}", indent, style(name).cyan()),
        }
    }
    Ok(())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

async fn refresh_stack(ctx: &RepoContext, name: Option<String>, comments: bool) -> Result<()> {
    let stack = resolve_stack_name(ctx, name)?;
    let credential = Credential::resolve(&ctx.settings.hosting)?;
    let client = GitHubClient::new(&ctx.settings.hosting, &credential)?;

    let refreshed = refresh_pull_requests(&ctx.db, &client, &stack).await?;
    Output::success(format!(
        "Refreshed {} pull request(s) of '{}'",
        refreshed.len(),
        stack
    ));

    {
        let tx = ctx.db.begin_read();
        for name in &refreshed {
            if let Some(pr) = tx.branch(name).and_then(|b| b.pull_request.as_ref()) {
                Output::sub_item(format!(
                    "{} #{} [{}] {}",
                    name, pr.number, pr.state, pr.permalink
                ));
            }
        }
    }

    if comments {
        let posted = sync_stack_comments(&ctx.db, &client, &stack).await?;
        Output::success(format!("Updated the stack comment on {posted} pull request(s)"));
    }
    Ok(())
}

async fn submit_stack(ctx: &RepoContext, name: Option<String>, options: &SubmitOptions) -> Result<()> {
    let stack = resolve_stack_name(ctx, name)?;
    let progress = ctx.progress_path();
    if let Some(state) = RestackManager::new(&ctx.db, &ctx.repo, &progress).in_progress()? {
        return Err(StackError::RestackInProgress(state.stack_name));
    }

    let credential = Credential::resolve(&ctx.settings.hosting)?;
    let client = GitHubClient::new(&ctx.settings.hosting, &credential)?;

    let submitted = submit(&ctx.db, &client, &ctx.repo, &stack, options).await?;
    if submitted.is_empty() {
        Output::info(format!("Nothing to submit in '{stack}'"));
        return Ok(());
    }

    Output::success(format!("Submitted {} branch(es) of '{}'", submitted.len(), stack));
    for entry in &submitted {
        let label = match entry.action {
            SubmitAction::Created => style("created").green(),
            SubmitAction::Updated => style("updated").yellow(),
            SubmitAction::Unchanged => style("unchanged").dim(),
        };
        Output::sub_item(format!(
            "{} #{} [{}] {}",
            entry.branch, entry.number, label, entry.permalink
        ));
    }

    let posted = sync_stack_comments(&ctx.db, &client, &stack).await?;
    Output::success(format!("Updated the stack comment on {posted} pull request(s)"));
    Ok(())
}
