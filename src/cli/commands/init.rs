use crate::cli::output::Output;
use crate::config::{is_repo_initialized, load_settings, repo_config_file, state_file, Settings};
use crate::errors::{Result, StackError};
use crate::git::get_current_repository;
use crate::stack::StackService;
use crate::storage::Database;
use tracing::{debug, warn};

/// Initialize a repository for gstack
pub async fn run(trunk: Option<String>, force: bool) -> Result<()> {
    let repo = get_current_repository()?;
    let git_dir = repo.git_dir().to_path_buf();
    debug!("Found Git repository at: {}", repo.path().display());

    if is_repo_initialized(&git_dir) && !force {
        return Err(StackError::validation(
            "Repository is already initialized for gstack. Use --force to reinitialize.",
        ));
    }
    if force && is_repo_initialized(&git_dir) {
        warn!("Force reinitializing repository...");
    }

    let config_file = repo_config_file(&git_dir);
    if let Some(trunk) = &trunk {
        if !repo.branch_exists(trunk) {
            return Err(StackError::validation(format!(
                "Trunk branch '{trunk}' does not exist"
            )));
        }
        Settings::set_in_file(&config_file, "git.trunk_branch", trunk)?;
    }

    let settings = load_settings(&git_dir)?;
    if !repo.branch_exists(&settings.git.trunk_branch) {
        Output::warning(format!(
            "Trunk branch '{}' does not exist yet",
            settings.git.trunk_branch
        ));
    }

    let (db, _) = Database::open(&state_file(&git_dir))?;
    let repository = StackService::new(&db, &repo, &settings).init()?;

    if !repository.owner.is_empty() {
        if settings.hosting.owner.is_empty() {
            Settings::set_in_file(&config_file, "hosting.owner", &repository.owner)?;
        }
        if settings.hosting.repo.is_empty() {
            Settings::set_in_file(&config_file, "hosting.repo", &repository.name)?;
        }
    }

    Output::success("gstack repository initialized");
    Output::sub_item(format!("Trunk: {}", settings.git.trunk_branch));
    if repository.id.is_empty() {
        Output::sub_item(format!(
            "No GitHub repository found on remote '{}'",
            settings.git.remote
        ));
    } else {
        Output::sub_item(format!("GitHub repository: {}", repository.id));
    }

    Output::next_steps(&[
        "gstack stack create <name>",
        "gstack stack branch <branch>",
        "gstack stack sync",
    ]);
    Ok(())
}
