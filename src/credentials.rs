use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// OAuth2 access/refresh token pair for the mail API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Process-wide owner of the single credential pair.
///
/// Cloning the holder shares the same pair; the lock is never held across
/// an `.await`.
#[derive(Clone, Debug, Default)]
pub struct CredentialHolder {
    pair: Arc<RwLock<Option<CredentialPair>>>,
}

impl CredentialHolder {
    pub fn new(pair: Option<CredentialPair>) -> Self {
        Self {
            pair: Arc::new(RwLock::new(pair)),
        }
    }

    /// Current pair, if any has been loaded or refreshed
    pub fn get(&self) -> Option<CredentialPair> {
        self.pair.read().clone()
    }

    /// Current access token, empty when no credentials are configured
    pub fn access_token(&self) -> String {
        self.pair
            .read()
            .as_ref()
            .map(|p| p.access_token.clone())
            .unwrap_or_default()
    }

    /// Current refresh token, empty when no credentials are configured
    pub fn refresh_token(&self) -> String {
        self.pair
            .read()
            .as_ref()
            .map(|p| p.refresh_token.clone())
            .unwrap_or_default()
    }

    /// Replace the pair in place after a successful refresh
    pub fn update(&self, pair: CredentialPair) {
        *self.pair.write() = Some(pair);
        info!("Mail credentials updated");
    }

    pub fn is_configured(&self) -> bool {
        self.pair.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: &str) -> CredentialPair {
        CredentialPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn test_empty_holder() {
        let holder = CredentialHolder::default();
        assert!(!holder.is_configured());
        assert_eq!(holder.access_token(), "");
        assert_eq!(holder.refresh_token(), "");
        assert!(holder.get().is_none());
    }

    #[test]
    fn test_update_is_shared_between_clones() {
        let holder = CredentialHolder::new(Some(pair("old_access", "old_refresh")));
        let other = holder.clone();

        other.update(pair("new_access", "new_refresh"));

        assert_eq!(holder.access_token(), "new_access");
        assert_eq!(holder.refresh_token(), "new_refresh");
        assert_eq!(holder.get(), Some(pair("new_access", "new_refresh")));
    }
}
