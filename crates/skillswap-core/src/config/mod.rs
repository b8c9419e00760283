mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use skillswap_ledger::Identity;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the merged configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `explicit`, else `SKILLSWAP_CONFIG`, else `config/default.toml`.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var("SKILLSWAP_CONFIG")
            .map_or_else(|_| PathBuf::from("config/default.toml"), PathBuf::from)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync.channel_capacity == 0 {
            bail!("sync.channel_capacity must be at least 1");
        }
        if let Some(identity) = &self.participant.identity
            && identity.trim().is_empty()
        {
            bail!("participant.identity must not be blank when set");
        }
        if self.gateway.enabled {
            if self.gateway.rate_limit == 0 {
                bail!("gateway.rate_limit must be at least 1");
            }
            if self.gateway.max_body_size == 0 {
                bail!("gateway.max_body_size must be at least 1");
            }
        }
        Ok(())
    }

    /// Normalized local identity, if configured.
    #[must_use]
    pub fn local_identity(&self) -> Option<Identity> {
        self.participant
            .identity
            .as_deref()
            .map(Identity::new)
            .filter(|id| !id.is_empty())
    }
}
