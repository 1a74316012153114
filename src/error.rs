use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("Session expired (HTTP {status})")]
    AuthExpired { status: u16 },

    #[error("Marketplace fetch failed ({})", fmt_status(.status))]
    Fetch { status: Option<u16> },

    #[error("Malformed marketplace payload: {0}")]
    Parse(String),

    #[error("Invalid LEGO set id: {0} (5 digits required)")]
    InvalidProductId(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Scrape already running for {0}")]
    ScrapeInProgress(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!("HTTP {s}"),
        None => "no response".to_string(),
    }
}

impl AppError {
    /// Maps a transport failure onto the fetch taxonomy. Timeouts and
    /// connection errors have no status; anything else keeps the one reqwest saw.
    pub fn from_transport(e: reqwest::Error) -> Self {
        AppError::Fetch {
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidProductId(_) | AppError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            AppError::ScrapeInProgress(_) => StatusCode::CONFLICT,
            AppError::Session(_)
            | AppError::AuthExpired { .. }
            | AppError::Fetch { .. }
            | AppError::Parse(_)
            | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
