use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{get_config_dir, load_settings, repo_config_file, Settings};
use crate::errors::Result;
use crate::git::get_current_repository;

/// Handle configuration commands
pub async fn run(action: ConfigAction) -> Result<()> {
    let repo = get_current_repository()?;
    let git_dir = repo.git_dir().to_path_buf();

    match action {
        ConfigAction::Set { key, value, global } => {
            let file = if global {
                get_config_dir()?.join("config.json")
            } else {
                repo_config_file(&git_dir)
            };
            Settings::set_in_file(&file, &key, &value)?;

            let shown = if key == "hosting.token" { "********" } else { value.as_str() };
            Output::success(format!("Configuration updated: {key} = {shown}"));
            if key == "hosting.token" {
                Output::tip("GSTACK_TOKEN or GITHUB_TOKEN in the environment take precedence");
            }
        }
        ConfigAction::Get { key } => {
            let settings = load_settings(&git_dir)?;
            let value = settings.get_value(&key)?;
            if key == "hosting.token" && !value.is_empty() {
                println!("{key} = ********");
            } else {
                println!("{key} = {value}");
            }
        }
        ConfigAction::List => {
            let settings = load_settings(&git_dir)?;
            Output::section("gstack configuration");
            for (key, value) in settings.entries() {
                Output::key_value(key, value);
            }
        }
    }

    Ok(())
}
