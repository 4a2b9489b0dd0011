use std::fs;
use std::path::{Path, PathBuf};

use berner_core::{ConfigError, CoreError, Credentials};
use tracing::{debug, info};

/// Durable storage for the application credentials record.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted credentials. Returns
    /// `ConfigError::CredentialsNotFound` when no record exists yet, which
    /// is the signal to run the authorization flow.
    pub fn load(&self) -> Result<Credentials, CoreError> {
        if !self.path.exists() {
            return Err(ConfigError::CredentialsNotFound {
                path: self.path.display().to_string(),
            }
            .into());
        }

        let raw = fs::read_to_string(&self.path)?;
        let credentials = serde_json::from_str(&raw)?;
        debug!("Loaded credentials from {}", self.path.display());
        Ok(credentials)
    }

    /// Overwrite the persisted record. The record is written to a temp file
    /// beside the target and renamed into place, so a crash mid-write
    /// cannot corrupt an existing record.
    pub fn save(&self, credentials: &Credentials) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(credentials)?)?;
        fs::rename(&tmp, &self.path)?;
        info!("Saved credentials to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berner_core::Credentials;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("bot.config.json"));

        let credentials = Credentials {
            app_id: "z8huXvY0aph0PQ".to_string(),
            access_token: Some("access-123".to_string()),
            refresh_token: Some("refresh-456".to_string()),
        };

        store.save(&credentials).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, credentials);
    }

    #[test]
    fn load_without_record_is_not_found() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("missing.json"));

        let result = store.load();
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::CredentialsNotFound { .. }))
        ));
    }

    #[test]
    fn save_overwrites_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot.config.json");
        let store = CredentialStore::new(&path);

        let first = Credentials::new("app-one");
        store.save(&first).unwrap();

        let second = Credentials {
            app_id: "app-one".to_string(),
            access_token: Some("token".to_string()),
            refresh_token: None,
        };
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap(), second);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn record_uses_pascal_case_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot.config.json");
        let store = CredentialStore::new(&path);

        let credentials = Credentials {
            app_id: "abc".to_string(),
            access_token: Some("t1".to_string()),
            refresh_token: Some("t2".to_string()),
        };
        store.save(&credentials).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"AppId\""));
        assert!(raw.contains("\"AccessToken\""));
        assert!(raw.contains("\"RefreshToken\""));
    }

    #[test]
    fn unauthorized_credentials_round_trip_with_null_tokens() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("bot.config.json"));

        let credentials = Credentials::new("fresh-app");
        assert!(!credentials.is_authorized());

        store.save(&credentials).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, None);
        assert_eq!(loaded.refresh_token, None);
    }
}
