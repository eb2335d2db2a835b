//! Mailbox message listing through Microsoft Graph.
//!
//! A 401 from Graph triggers exactly one token refresh followed by exactly
//! one retry, regardless of whether the refresh succeeded.

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::credentials::CredentialHolder;
use crate::error::{RelayError, Result};
use crate::telemetry::get_metrics;
use crate::token_refresher::TokenRefresher;

const NO_BODY: &str = "No content available";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    value: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    to_recipients: Option<Vec<Recipient>>,
    received_date_time: Option<String>,
    body: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: Option<EmailAddress>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: Option<String>,
}

/// Graph error envelope: `{ "error": { "code": ..., "message": ... } }`
#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
}

/// One row of the email log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailLogEntry {
    /// Recipient addresses joined with ", "
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub body: String,
}

impl From<Message> for EmailLogEntry {
    fn from(message: Message) -> Self {
        let email = message
            .to_recipients
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                r.email_address
                    .and_then(|a| a.address)
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(", ");

        let body = message
            .body
            .and_then(|b| b.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| NO_BODY.to_string());

        Self {
            email,
            date: message.received_date_time,
            body,
        }
    }
}

/// Fetches email logs for the configured mailbox
#[derive(Clone)]
pub struct MailFetcher {
    client: Client,
    messages_url: String,
    holder: CredentialHolder,
    refresher: TokenRefresher,
}

impl MailFetcher {
    pub fn new(
        client: Client,
        config: &MailConfig,
        holder: CredentialHolder,
        refresher: TokenRefresher,
    ) -> Self {
        Self {
            client,
            messages_url: config.messages_url(),
            holder,
            refresher,
        }
    }

    pub async fn fetch_emails(&self) -> Result<Vec<EmailLogEntry>> {
        let access_token = self.holder.access_token();

        let err = match self.list_messages(&access_token).await {
            Ok(entries) => return Ok(entries),
            Err(e) => e,
        };

        if !err.is_unauthorized() {
            return Err(RelayError::Fetch(format!(
                "Error fetching Email logs: {}",
                err
            )));
        }

        info!("Token expired. Refreshing token...");
        let refresh_failure = self.refresher.refresh_after(&access_token).await.err();

        // Retry once with whatever token the holder now carries
        let retry_token = self.holder.access_token();
        self.list_messages(&retry_token).await.map_err(|retry_err| {
            let message = match refresh_failure {
                Some(RelayError::RefreshFailed(reason)) => format!(
                    "Error retrying Email logs: {} (token refresh failed: {})",
                    retry_err, reason
                ),
                Some(refresh_err) => format!(
                    "Error retrying Email logs: {} ({})",
                    retry_err, refresh_err
                ),
                None => format!("Error retrying Email logs: {}", retry_err),
            };
            RelayError::Fetch(message)
        })
    }

    async fn list_messages(&self, access_token: &str) -> Result<Vec<EmailLogEntry>> {
        debug!(url = %self.messages_url, "Listing mailbox messages");

        let response = self
            .client
            .get(&self.messages_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                record_upstream_error();
                RelayError::from(e)
            })?;

        let response = check_status(response).await?;
        let list: MessageList = response.json().await.map_err(|e| {
            record_upstream_error();
            RelayError::from(e)
        })?;

        Ok(list.value.into_iter().map(EmailLogEntry::from).collect())
    }
}

/// Turn a non-2xx Graph response into an upstream error carrying the status
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    record_upstream_error();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<GraphErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error.message);

    let mut message = format!("Request failed with status code {}", status.as_u16());
    if let Some(detail) = detail {
        message.push_str(": ");
        message.push_str(&detail);
    }
    warn!(status = status.as_u16(), "Graph request failed");

    Err(RelayError::Upstream {
        status: Some(status.as_u16()),
        message,
    })
}

fn record_upstream_error() {
    if let Some(m) = get_metrics() {
        m.upstream_errors.add(1, &[opentelemetry::KeyValue::new("source", "mail")]);
    }
}
