use chrono::{DateTime, Local};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::SmsConfig;
use crate::error::{RelayError, Result};
use crate::telemetry::get_metrics;

const UNKNOWN: &str = "Unknown";
const NO_CONTENT: &str = "No content";

/// Twilio message list page
#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    to: Option<String>,
    date_sent: Option<String>,
    body: Option<String>,
}

/// Twilio error body: `{ "code": ..., "message": ..., "status": ... }`
#[derive(Debug, Deserialize)]
struct TwilioError {
    message: Option<String>,
}

/// One row of the SMS log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsLogEntry {
    /// 1-based position in the upstream response
    pub id: usize,
    pub phone_number: String,
    pub date: String,
    pub message: String,
}

impl SmsLogEntry {
    fn new(id: usize, message: Message) -> Self {
        Self {
            id,
            phone_number: non_empty(message.to).unwrap_or_else(|| UNKNOWN.to_string()),
            date: non_empty(message.date_sent)
                .map(|d| format_date_sent(&d))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            message: non_empty(message.body)
                .map(|b| b.replace('\n', "<br>"))
                .unwrap_or_else(|| NO_CONTENT.to_string()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Render a Twilio RFC 2822 timestamp in local time, e.g. "5/1/2024, 3:04:05 PM".
/// Unparseable values are returned unchanged.
pub fn format_date_sent(raw: &str) -> String {
    match DateTime::parse_from_rfc2822(raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%-m/%-d/%Y, %-I:%M:%S %p")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Fetches the most recent SMS messages from Twilio
#[derive(Clone)]
pub struct SmsFetcher {
    client: Client,
    messages_url: String,
    api_key: String,
    api_secret: String,
    page_size: u32,
}

impl SmsFetcher {
    pub fn new(client: Client, config: &SmsConfig) -> Self {
        Self {
            client,
            messages_url: config.messages_url(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            page_size: config.page_size,
        }
    }

    pub async fn fetch_sms(&self) -> Result<Vec<SmsLogEntry>> {
        self.list_messages().await.map_err(|e| {
            if let Some(m) = get_metrics() {
                m.upstream_errors
                    .add(1, &[opentelemetry::KeyValue::new("source", "sms")]);
            }
            error!("Error fetching SMS logs: {}", e);
            RelayError::Fetch(format!("Error fetching SMS logs: {}", e))
        })
    }

    async fn list_messages(&self) -> Result<Vec<SmsLogEntry>> {
        debug!(url = %self.messages_url, limit = self.page_size, "Listing SMS messages");

        let response = self
            .client
            .get(&self.messages_url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(&[("PageSize", self.page_size)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TwilioError>(&body)
                .ok()
                .and_then(|e| e.message);
            let message = match detail {
                Some(detail) => format!("{} (HTTP {})", detail, status.as_u16()),
                None => format!("Request failed with status code {}", status.as_u16()),
            };
            return Err(RelayError::Upstream {
                status: Some(status.as_u16()),
                message,
            });
        }

        let page: MessagePage = response.json().await?;

        Ok(page
            .messages
            .into_iter()
            .take(self.page_size as usize)
            .enumerate()
            .map(|(i, m)| SmsLogEntry::new(i + 1, m))
            .collect())
    }
}
