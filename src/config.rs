use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RelayError, Result};

/// Microsoft Graph mail configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,

    /// Graph API base URL (e.g., "https://graph.microsoft.com/v1.0")
    #[serde(default = "default_graph_api_url")]
    pub api_url: String,

    /// Mailbox whose messages are listed
    #[serde(default)]
    pub mailbox: String,

    /// Identity platform authority, without tenant
    #[serde(default = "default_authority")]
    pub authority: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Where the access/refresh token pair is persisted
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

impl MailConfig {
    /// Token endpoint for the configured tenant
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Message listing endpoint for the configured mailbox
    pub fn messages_url(&self) -> String {
        format!(
            "{}/users/{}/messages",
            self.api_url.trim_end_matches('/'),
            self.mailbox
        )
    }
}

fn default_graph_api_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_scope() -> String {
    "https://graph.microsoft.com/.default offline_access".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("tokens.json")
}

/// Twilio messaging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,

    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,

    /// Number of most recent messages returned
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl SmsConfig {
    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_page_size() -> u32 {
    10
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            api_url: default_graph_api_url(),
            mailbox: String::new(),
            authority: default_authority(),
            scope: default_scope(),
            token_file: default_token_file(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            base_url: default_twilio_base_url(),
            page_size: default_page_size(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    /// OTLP endpoint for exporting traces and metrics
    pub otlp_endpoint: Option<String>,
    /// Log filter (e.g., "info", "debug", "logrelay=debug")
    pub log_filter: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listen address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory of static files served alongside the API
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,

    /// Timeout applied to every outbound HTTP request
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub sms: SmsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("public"))
}

fn default_http_timeout() -> u64 {
    30
}

/// Environment variables that take precedence over file values
const ENV_OVERRIDES: &[&str] = &[
    "MICROSOFT_GRAPH_TENANT_ID",
    "MICROSOFT_GRAPH_CLIENT_ID",
    "MICROSOFT_GRAPH_CLIENT_SECRET",
    "MICROSOFT_GRAPH_API_URL",
    "MICROSOFT_GRAPH_EMAIL",
    "TWILIO_ACCOUNT_SID",
    "TWILIO_API_KEY",
    "TWILIO_API_SECRET",
];

impl Config {
    /// Load configuration from a YAML file, apply environment overrides and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields with values from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ENV_OVERRIDES {
            let Some(value) = lookup(key).filter(|v| !v.is_empty()) else {
                continue;
            };
            let slot = match *key {
                "MICROSOFT_GRAPH_TENANT_ID" => &mut self.mail.tenant_id,
                "MICROSOFT_GRAPH_CLIENT_ID" => &mut self.mail.client_id,
                "MICROSOFT_GRAPH_CLIENT_SECRET" => &mut self.mail.client_secret,
                "MICROSOFT_GRAPH_API_URL" => &mut self.mail.api_url,
                "MICROSOFT_GRAPH_EMAIL" => &mut self.mail.mailbox,
                "TWILIO_ACCOUNT_SID" => &mut self.sms.account_sid,
                "TWILIO_API_KEY" => &mut self.sms.api_key,
                "TWILIO_API_SECRET" => &mut self.sms.api_secret,
                _ => continue,
            };
            *slot = value;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.listen.is_empty() {
            return Err(RelayError::Config("'listen' address is required".to_string()));
        }

        let required = [
            (&self.mail.tenant_id, "mail.tenant_id"),
            (&self.mail.client_id, "mail.client_id"),
            (&self.mail.mailbox, "mail.mailbox"),
            (&self.sms.account_sid, "sms.account_sid"),
            (&self.sms.api_key, "sms.api_key"),
        ];
        for (value, name) in required {
            if value.is_empty() {
                return Err(RelayError::Config(format!("'{}' is required", name)));
            }
        }

        if self.sms.page_size == 0 {
            return Err(RelayError::Config("'sms.page_size' must be > 0".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
listen: "127.0.0.1:3000"

mail:
  tenant_id: "tenant-1"
  client_id: "client-1"
  client_secret: "secret-1"
  mailbox: "ops@example.com"

sms:
  account_sid: "AC123"
  api_key: "SK123"
  api_secret: "twilio-secret"

telemetry:
  otlp_endpoint: "http://localhost:4317"
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(config.listen, "127.0.0.1:3000");
        assert_eq!(config.mail.tenant_id, "tenant-1");
        assert_eq!(config.mail.api_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.mail.token_file, PathBuf::from("tokens.json"));
        assert_eq!(config.sms.page_size, 10);
        assert_eq!(config.http_timeout_seconds, 30);
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
        assert_eq!(
            config.telemetry.otlp_endpoint,
            Some("http://localhost:4317".to_string())
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_urls() {
        let config: Config = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(
            config.mail.token_url(),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(
            config.mail.messages_url(),
            "https://graph.microsoft.com/v1.0/users/ops@example.com/messages"
        );
        assert_eq!(
            config.sms.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config: Config = serde_yaml::from_str(YAML).unwrap();
        config.apply_overrides(|key| match key {
            "MICROSOFT_GRAPH_CLIENT_SECRET" => Some("from-env".to_string()),
            "TWILIO_API_KEY" => Some("SKenv".to_string()),
            "MICROSOFT_GRAPH_EMAIL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.mail.client_secret, "from-env");
        assert_eq!(config.sms.api_key, "SKenv");
        assert_eq!(config.mail.mailbox, "ops@example.com");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let config: Config = serde_yaml::from_str("listen: \"0.0.0.0:3000\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mail.tenant_id"));

        let mut config: Config = serde_yaml::from_str(YAML).unwrap();
        config.sms.page_size = 0;
        assert!(config.validate().is_err());
    }
}
