//! Runtime configuration for the `refrain` binary.
//!
//! Loaded once at startup from a TOML file and passed explicitly to every
//! component; there is no ambient global state. The directory token can be
//! kept out of the file and supplied via `REFRAIN_DIRECTORY_TOKEN`.
//!
//! # Example
//!
//! ```toml
//! [directory]
//! base_url = "https://fleet.example.com/api/v1"
//! token = "..."            # or REFRAIN_DIRECTORY_TOKEN
//!
//! [state]
//! dir = "/data/server_optimize"
//!
//! [notify]
//! webhook_url = "https://chat.example.com/hooks/abc"
//! ```

use std::path::{Path, PathBuf};

use refrain_core::Family;
use serde::Deserialize;

/// Environment variable consulted when `[directory].token` is absent.
pub const TOKEN_ENV: &str = "REFRAIN_DIRECTORY_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub directory: DirectorySettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub notify: NotifySettings,
}

/// `[directory]` section -- the fleet directory service.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySettings {
    pub base_url: String,
    /// Bearer token; falls back to [`TOKEN_ENV`] when unset.
    pub token: Option<String>,
}

/// `[state]` section -- where the append-only logs live.
#[derive(Debug, Clone, Deserialize)]
pub struct StateSettings {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        StateSettings {
            dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/data/server_optimize")
}

/// `[notify]` section -- optional run-summary webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifySettings {
    pub webhook_url: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<AppConfig, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("error: could not read config '{}': {}", path.display(), e))?;
        toml::from_str(&contents)
            .map_err(|e| format!("error: invalid config '{}': {}", path.display(), e))
    }

    /// The directory bearer token, from the file or the environment.
    pub fn directory_token(&self) -> Result<String, String> {
        if let Some(token) = &self.directory.token {
            return Ok(token.clone());
        }
        std::env::var(TOKEN_ENV).map_err(|_| {
            format!("error: no [directory].token in config and {TOKEN_ENV} is not set")
        })
    }

    /// Per-family processed-server log path.
    pub fn run_log_path(&self, family: Family) -> PathBuf {
        self.state.dir.join(format!("{family}_processed.log"))
    }

    /// Per-family token-cache log path.
    pub fn token_cache_path(&self, family: Family) -> PathBuf {
        self.state.dir.join(format!("{family}_tokens.log"))
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
