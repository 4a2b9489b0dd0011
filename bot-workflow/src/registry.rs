use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use berner_core::{ConfigError, CoreError, Forum, Platform};
use tracing::{info, warn};

/// Persisted, ordered list of monitored subreddit names.
pub struct ForumRegistry {
    path: PathBuf,
}

impl ForumRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The persisted name list, or `None` when no list has been saved yet.
    pub fn load_names(&self) -> Result<Option<Vec<String>>, CoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Write the name list back to durable storage, atomically.
    pub fn persist(&self, names: &[String]) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(names)?)?;
        fs::rename(&tmp, &self.path)?;
        info!("Subreddits list saved to {}", self.path.display());
        Ok(())
    }

    /// Load the persisted list, falling back to `defaults` (and persisting
    /// them) on first run, then resolve each name to a live forum handle.
    ///
    /// A name that fails to resolve is logged and skipped rather than
    /// aborting startup; resolving none of the names is fatal.
    pub async fn load_or_default(
        &self,
        defaults: &[&str],
        platform: &dyn Platform,
    ) -> Result<Vec<Forum>, CoreError> {
        let names = match self.load_names()? {
            Some(names) => names,
            None => {
                info!("No subreddits list found, starting with the default set");
                let names: Vec<String> = defaults.iter().map(|s| s.to_string()).collect();
                self.persist(&names)?;
                names
            }
        };

        let mut seen = HashSet::new();
        let mut forums = Vec::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                warn!("Duplicate subreddit {} in list, ignoring", name);
                continue;
            }
            match platform.resolve_forum(name).await {
                Ok(forum) => {
                    info!("Loaded r/{} successfully", forum.name);
                    forums.push(forum);
                }
                Err(e) => warn!("Skipping r/{}: {}", name, e),
            }
        }

        if forums.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "none of the configured subreddits could be resolved".to_string(),
            }
            .into());
        }

        Ok(forums)
    }
}
