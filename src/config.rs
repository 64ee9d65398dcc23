//! Configuration for `git-review`: the global TOML file and the per-repository git config.

use crate::{
    constants::{
        CFG_FILE_NAME, DEFAULT_REMOTE, DEFAULT_TIMEOUT_SECS, DEFAULT_UPSTREAM, GIT_CONFIG_SECTION,
    },
    errors::{ReviewError, ReviewResult},
    git::RepositoryExt,
    stack::StackRef,
};
use git2::Repository;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

/// The environment variable that overrides the configured token.
const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// The global configuration, stored at `~/.git-review.toml`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReviewConfig {
    /// The GitHub personal access token.
    #[serde(default)]
    pub github_token: String,
    /// The API root for GitHub Enterprise installations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Upper bound for each GitHub API call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            github_token: String::new(),
            api_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ReviewConfig {
    /// Returns the path of the global configuration file.
    pub fn path() -> ReviewResult<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CFG_FILE_NAME))
            .ok_or_else(|| ReviewError::ConfigNotInitialized("home directory not found".into()))
    }

    /// Loads the global configuration, applying the `GITHUB_TOKEN` override. A missing file yields
    /// the defaults.
    pub fn load() -> ReviewResult<Self> {
        let mut config = Self::load_from(&Self::path()?)?;
        if let Ok(token) = env::var(TOKEN_ENV) {
            debug!("Using the token from ${}", TOKEN_ENV);
            config.github_token = token;
        }
        Ok(config)
    }

    /// Loads the configuration file at `path`, falling back to the defaults if it does not exist.
    pub fn load_from(path: &Path) -> ReviewResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Persists the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> ReviewResult<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Loads the global configuration, prompting for a token and saving it when none is
    /// configured.
    pub fn load_or_initialize() -> ReviewResult<Self> {
        let mut config = Self::load()?;
        if config.github_token.is_empty() {
            config.github_token = inquire::Password::new("GitHub personal access token:")
                .without_confirmation()
                .prompt()?;
            config.save_to(&Self::path()?)?;
        }
        Ok(config)
    }

    /// The configured token.
    ///
    /// ## Returns
    /// - `Err(ReviewError::ConfigNotInitialized)` - If no token is configured.
    pub fn token(&self) -> ReviewResult<&str> {
        if self.github_token.is_empty() {
            return Err(ReviewError::ConfigNotInitialized(format!(
                "no GitHub token; run `git-review config` or set ${}",
                TOKEN_ENV
            )));
        }
        Ok(&self.github_token)
    }

    /// The upper bound for each GitHub API call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StackRef {
    /// Reads the working branch, upstream and remote from the `review` section of the git config
    /// of `repository`. The working branch defaults to the checked out branch.
    pub fn load(repository: &Repository) -> ReviewResult<Self> {
        let config = repository.config()?.snapshot()?;
        let setting = |key: &str| {
            config
                .get_string(&format!("{}.{}", GIT_CONFIG_SECTION, key))
                .ok()
        };

        let branch = match setting("branch") {
            Some(branch) => branch,
            None => repository.current_branch_name()?,
        };
        Ok(Self::new(
            branch,
            setting("main").unwrap_or_else(|| DEFAULT_UPSTREAM.to_string()),
            setting("origin").unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
        ))
    }
}
