use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::credentials::CredentialPair;
use crate::error::{RelayError, Result};

/// JSON file holding the mail credential pair
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored pair. A missing file is not an error.
    pub fn load(&self) -> Result<Option<CredentialPair>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No token file present");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path).map_err(|e| {
            RelayError::TokenStore(format!(
                "Failed to read token file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        let pair: CredentialPair = serde_json::from_str(&json).map_err(|e| {
            RelayError::TokenStore(format!(
                "Failed to parse token file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(path = %self.path.display(), "Loaded tokens");
        Ok(Some(pair))
    }

    /// Overwrite the stored pair via a temp file and rename
    pub fn save(&self, pair: &CredentialPair) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(pair)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| {
            RelayError::TokenStore(format!("Failed to write token file: {}", e))
        })?;
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            RelayError::TokenStore(format!("Failed to replace token file: {}", e))
        })?;

        debug!(path = %self.path.display(), "Stored tokens");
        Ok(())
    }
}

/// Owner read/write only
fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let pair = CredentialPair {
            access_token: "access-123".to_string(),
            refresh_token: "refresh-456".to_string(),
        };

        store.save(&pair).unwrap();
        assert_eq!(store.load().unwrap(), Some(pair));
        assert!(!dir.path().join("tokens.json.tmp").exists());
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(
            &path,
            r#"{ "access_token": "a", "refresh_token": "r" }"#,
        )
        .unwrap();

        let pair = TokenStore::new(&path).load().unwrap().unwrap();
        assert_eq!(pair.access_token, "a");
        assert_eq!(pair.refresh_token, "r");
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").unwrap();

        let err = TokenStore::new(&path).load().unwrap_err();
        assert!(matches!(err, RelayError::TokenStore(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::new(&path);
        store
            .save(&CredentialPair {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            })
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
