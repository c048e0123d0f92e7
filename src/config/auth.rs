use super::settings::HostingConfig;
use crate::errors::{Result, StackError};
use std::process::{Command, Stdio};
use tracing::debug;

/// Environment variables consulted for a token, in order
pub const TOKEN_ENV_VARS: [&str; 2] = ["GSTACK_TOKEN", "GITHUB_TOKEN"];

/// An API token for the hosting service
#[derive(Clone)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token from the environment, then config, then the `gh` CLI
    pub fn resolve(config: &HostingConfig) -> Result<Self> {
        if let Some(token) = from_env() {
            return Ok(Self::new(token));
        }
        if let Some(token) = config.token.as_deref().filter(|t| !t.trim().is_empty()) {
            debug!("Using token from configuration");
            return Ok(Self::new(token));
        }
        if let Some(token) = from_gh_cli() {
            debug!("Using token from `gh auth token`");
            return Ok(Self::new(token));
        }
        Err(StackError::auth(format!(
            "No API token found. Set {} or run `gstack config set hosting.token <token>`",
            TOKEN_ENV_VARS.join(" or ")
        )))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").field("token", &"***").finish()
    }
}

fn from_env() -> Option<String> {
    TOKEN_ENV_VARS.iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .inspect(|_| debug!("Using token from ${}", var))
    })
}

fn from_gh_cli() -> Option<String> {
    let output = Command::new("gh")
        .args(["auth", "token"])
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in TOKEN_ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_env_token_wins_over_config() {
        clear_env();
        std::env::set_var("GITHUB_TOKEN", "from-env");
        let config = HostingConfig {
            token: Some("from-config".to_string()),
            ..HostingConfig::default()
        };

        let credential = Credential::resolve(&config).unwrap();
        assert_eq!(credential.token(), "from-env");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_gstack_token_preferred() {
        clear_env();
        std::env::set_var("GSTACK_TOKEN", "primary");
        std::env::set_var("GITHUB_TOKEN", "secondary");

        let credential = Credential::resolve(&HostingConfig::default()).unwrap();
        assert_eq!(credential.token(), "primary");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_token_used_without_env() {
        clear_env();
        let config = HostingConfig {
            token: Some("from-config".to_string()),
            ..HostingConfig::default()
        };
        assert_eq!(Credential::resolve(&config).unwrap().token(), "from-config");
    }

    #[test]
    fn test_debug_hides_token() {
        let rendered = format!("{:?}", Credential::new("secret"));
        assert!(!rendered.contains("secret"));
    }
}
