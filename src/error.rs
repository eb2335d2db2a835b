use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token store error: {0}")]
    TokenStore(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-2xx or transport failure from an upstream API. `status` is `None`
    /// when no response was received.
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    Fetch(String),
}

impl RelayError {
    /// Whether the upstream rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RelayError::Upstream { status: Some(401), .. })
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_detection() {
        let err = RelayError::Upstream {
            status: Some(401),
            message: "Request failed with status code 401".to_string(),
        };
        assert!(err.is_unauthorized());

        let err = RelayError::Upstream {
            status: Some(403),
            message: "Request failed with status code 403".to_string(),
        };
        assert!(!err.is_unauthorized());
        assert!(!RelayError::Fetch("boom".to_string()).is_unauthorized());
    }

    #[test]
    fn test_error_response_is_500() {
        let response = RelayError::Fetch("Error fetching SMS logs: down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
