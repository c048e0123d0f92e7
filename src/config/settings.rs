use crate::errors::{Result, StackError};
use crate::git::DEFAULT_SYNC_COMMAND;
use crate::utils::atomic_file;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub git: GitSettings,
    pub hosting: HostingConfig,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    pub trunk_branch: String,
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Substituted for `git rebase` in conflict hints
    pub command_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            git: GitSettings::default(),
            hosting: HostingConfig::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            trunk_branch: "main".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            token: None,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            command_name: DEFAULT_SYNC_COMMAND.to_string(),
        }
    }
}

const KEYS: [&str; 7] = [
    "git.trunk_branch",
    "git.remote",
    "hosting.api_url",
    "hosting.owner",
    "hosting.repo",
    "hosting.token",
    "sync.command_name",
];

impl Settings {
    /// Load settings from a file; a missing file yields defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::load_layered(&[path])
    }

    /// Defaults, overlaid key by key by each existing file in order
    pub fn load_layered(paths: &[&Path]) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Self::default())
            .map_err(|e| StackError::config(format!("Failed to build default config: {e}")))?;
        let builder = paths.iter().fold(
            ::config::Config::builder().add_source(defaults),
            |builder, path| {
                builder.add_source(
                    ::config::File::from(*path)
                        .format(::config::FileFormat::Json)
                        .required(false),
                )
            },
        );

        builder
            .build()
            .and_then(|layered| layered.try_deserialize())
            .map_err(|e| StackError::config(format!("Failed to load config: {e}")))
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        atomic_file::write_json(path, self)
    }

    /// Set one key in the file at `path`, leaving its other keys unset so
    /// lower layers still apply
    pub fn set_in_file(path: &Path, key: &str, value: &str) -> Result<()> {
        let mut effective = Self::load_from_file(path)?;
        effective.set_value(key, value)?;
        effective.validate()?;

        let mut raw = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| StackError::config(format!("Failed to parse config file {path:?}: {e}")))?
        } else {
            Value::Object(Map::new())
        };

        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| StackError::config(format!("Unknown config key: {key}")))?;
        let section = raw
            .as_object_mut()
            .ok_or_else(|| StackError::config(format!("Config file {path:?} is not an object")))?
            .entry(section)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| StackError::config(format!("'{section}' in {path:?} is not an object")))?;
        if value.is_empty() && key == "hosting.token" {
            section.remove(field);
        } else {
            section.insert(field.to_string(), Value::String(value.to_string()));
        }

        atomic_file::write_json(path, &raw)
    }

    /// Update a configuration value by key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "git.trunk_branch" => self.git.trunk_branch = value.to_string(),
            "git.remote" => self.git.remote = value.to_string(),
            "hosting.api_url" => self.hosting.api_url = value.to_string(),
            "hosting.owner" => self.hosting.owner = value.to_string(),
            "hosting.repo" => self.hosting.repo = value.to_string(),
            "hosting.token" => {
                self.hosting.token = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            "sync.command_name" => self.sync.command_name = value.to_string(),
            _ => return Err(StackError::config(format!("Unknown config key: {key}"))),
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "git.trunk_branch" => &self.git.trunk_branch,
            "git.remote" => &self.git.remote,
            "hosting.api_url" => &self.hosting.api_url,
            "hosting.owner" => &self.hosting.owner,
            "hosting.repo" => &self.hosting.repo,
            "hosting.token" => self.hosting.token.as_deref().unwrap_or(""),
            "sync.command_name" => &self.sync.command_name,
            _ => return Err(StackError::config(format!("Unknown config key: {key}"))),
        };
        Ok(value.to_string())
    }

    /// Every key with its value, the token masked
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .map(|key| {
                let value = if *key == "hosting.token" {
                    match &self.hosting.token {
                        Some(_) => "********".to_string(),
                        None => String::new(),
                    }
                } else {
                    self.get_value(key).unwrap_or_default()
                };
                (*key, value)
            })
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.hosting.api_url.starts_with("http://") && !self.hosting.api_url.starts_with("https://")
        {
            return Err(StackError::config(
                "hosting.api_url must start with http:// or https://",
            ));
        }
        if self.git.trunk_branch.trim().is_empty() {
            return Err(StackError::config("git.trunk_branch cannot be empty"));
        }
        if self.sync.command_name.trim().is_empty() {
            return Err(StackError::config("sync.command_name cannot be empty"));
        }
        Ok(())
    }
}
