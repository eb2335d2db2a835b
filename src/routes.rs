use std::path::Path;
use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use reqwest::Client;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::CredentialHolder;
use crate::error::{RelayError, Result};
use crate::mail::{EmailLogEntry, MailFetcher};
use crate::sms::{SmsFetcher, SmsLogEntry};
use crate::telemetry::get_metrics;
use crate::token_refresher::TokenRefresher;
use crate::token_store::TokenStore;

/// Shared state for the route handlers
#[derive(Clone)]
pub struct AppState {
    pub mail: MailFetcher,
    pub sms: SmsFetcher,
    pub credentials: CredentialHolder,
}

impl AppState {
    /// Wire fetchers, refresher and token store from configuration.
    /// Stored tokens are loaded here, once.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let store = TokenStore::new(&config.mail.token_file);
        let pair = match store.load() {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Ignoring unreadable token file: {}", e);
                None
            }
        };
        if pair.is_some() {
            info!(path = %store.path().display(), "Loaded mail credentials");
        } else {
            warn!("No mail credentials loaded; /view-emails will fail until tokens are provided");
        }

        let credentials = CredentialHolder::new(pair);
        let refresher =
            TokenRefresher::new(client.clone(), &config.mail, credentials.clone(), store);
        let mail = MailFetcher::new(client.clone(), &config.mail, credentials.clone(), refresher);
        let sms = SmsFetcher::new(client, &config.sms);

        Ok(Self {
            mail,
            sms,
            credentials,
        })
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mail_credentials: bool,
}

fn record(source: &'static str, started: Instant, ok: bool) {
    if let Some(m) = get_metrics() {
        m.record_request(source, started.elapsed(), ok);
    }
}

async fn view_emails(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<EmailLogEntry>>, RelayError> {
    let started = Instant::now();
    let result = state.mail.fetch_emails().await;
    record("mail", started, result.is_ok());
    result.map(Json)
}

async fn view_sms(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<SmsLogEntry>>, RelayError> {
    let started = Instant::now();
    let result = state.sms.fetch_sms().await;
    record("sms", started, result.is_ok());
    result.map(Json)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        mail_credentials: state.credentials.is_configured(),
    };
    (StatusCode::OK, Json(response))
}

/// Liveness probe - always returns 200
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Build the relay router. Files under `static_dir` are served for any
/// other path when the directory exists.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/view-emails", get(view_emails))
        .route("/view-sms", get(view_sms))
        .route("/healthz", get(health_handler))
        .route("/livez", get(liveness_handler))
        .with_state(state);

    if let Some(dir) = static_dir.filter(|d| d.is_dir()) {
        info!(dir = %dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Serve `app` on `addr` until ctrl-c
pub async fn serve(addr: &str, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Server is running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
