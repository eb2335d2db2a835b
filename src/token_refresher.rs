use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::MailConfig;
use crate::credentials::{CredentialHolder, CredentialPair};
use crate::error::{RelayError, Result};
use crate::telemetry::get_metrics;
use crate::token_store::TokenStore;

/// Token endpoint response. Both tokens are required for a refresh to count.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Exchanges the stored refresh token for a new credential pair
#[derive(Clone)]
pub struct TokenRefresher {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    holder: CredentialHolder,
    store: TokenStore,
    /// Serializes refreshes so concurrent 401s trigger one exchange
    in_flight: Arc<Mutex<()>>,
}

impl TokenRefresher {
    pub fn new(
        client: Client,
        config: &MailConfig,
        holder: CredentialHolder,
        store: TokenStore,
    ) -> Self {
        Self {
            client,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            holder,
            store,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Refresh unconditionally
    pub async fn refresh(&self) -> Result<CredentialPair> {
        let _guard = self.in_flight.lock().await;
        self.exchange().await
    }

    /// Refresh after the upstream rejected `rejected_access_token`.
    ///
    /// If another caller already replaced that token while this one waited
    /// for the lock, the current pair is returned without a new exchange.
    pub async fn refresh_after(&self, rejected_access_token: &str) -> Result<CredentialPair> {
        let _guard = self.in_flight.lock().await;

        if let Some(current) = self.holder.get() {
            if current.access_token != rejected_access_token {
                debug!("Access token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        self.exchange().await
    }

    async fn exchange(&self) -> Result<CredentialPair> {
        match self.request_tokens().await {
            Ok(pair) => {
                self.holder.update(pair.clone());
                if let Err(e) = self.store.save(&pair) {
                    warn!(
                        path = %self.store.path().display(),
                        "Refreshed tokens could not be persisted: {}", e
                    );
                }
                if let Some(m) = get_metrics() {
                    m.token_refreshes.add(1, &[]);
                }
                info!("Microsoft token refreshed successfully");
                Ok(pair)
            }
            Err(e) => {
                if let Some(m) = get_metrics() {
                    m.token_refresh_failures.add(1, &[]);
                }
                error!("Error refreshing Microsoft token: {}", e);
                Err(e)
            }
        }
    }

    async fn request_tokens(&self) -> Result<CredentialPair> {
        let refresh_token = self.holder.refresh_token();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RelayError::RefreshFailed(format!("Failed to send token request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::RefreshFailed(format!(
                "Token endpoint returned HTTP {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            RelayError::RefreshFailed(format!("Failed to parse token response: {}", e))
        })?;

        match (token.access_token, token.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(CredentialPair {
                access_token,
                refresh_token,
            }),
            _ => Err(RelayError::RefreshFailed(
                "Token response missing access_token or refresh_token".to_string(),
            )),
        }
    }
}
