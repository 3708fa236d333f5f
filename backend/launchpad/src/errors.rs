//! Application-wide error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sale_engine::SaleError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchpadError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sale(#[from] SaleError),

    #[error("KYC oracle error: {0}")]
    KycOracle(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Sale writer for sale {0} is not running")]
    WriterUnavailable(i64),
}

impl LaunchpadError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Sale(e) => match e {
                SaleError::InvalidConfig(_)
                | SaleError::InvalidAmount
                | SaleError::InvalidContributor => StatusCode::BAD_REQUEST,
                SaleError::NotResolved => StatusCode::NOT_FOUND,
                SaleError::BelowMinimum { .. }
                | SaleError::AboveMaximum { .. }
                | SaleError::HardCapExceeded { .. }
                | SaleError::KycRequired
                | SaleError::NothingToClaim => StatusCode::UNPROCESSABLE_ENTITY,
                SaleError::SaleClosed
                | SaleError::SaleStillOpen
                | SaleError::AlreadyResolved
                | SaleError::AlreadyClaimed
                | SaleError::AlreadyRefunded
                | SaleError::SequenceConflict { .. } => StatusCode::CONFLICT,
                SaleError::CorruptHistory(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::KycOracle(_) | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::WriterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Migrate(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sale(e) => e.kind(),
            Self::Database(_) => "database",
            Self::Migrate(_) => "migration",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
            Self::KycOracle(_) => "kyc_oracle",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::WriterUnavailable(_) => "writer_unavailable",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl IntoResponse for LaunchpadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind: self.kind(),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, LaunchpadError>;
