//! Crate-wide error types.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A storage operation exhausted its transient-error retries.
    ///
    /// Upstream components treat this as degraded, not fatal: the loop
    /// logs and continues, and the next successful run reconstructs state.
    #[error("storage degraded: {0}")]
    Degraded(String),

    /// Input failed validation. Never retried.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl Error {
    /// Build an [`Error::Invalid`] for a named field.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by the execution layer (orders, balance, venue).
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("price {price} exceeds maximum {max}")]
    PriceCap { price: Decimal, max: Decimal },

    #[error("venue rejected order: {reason}")]
    VenueRejected { reason: String },

    #[error("unknown order {0}")]
    UnknownOrder(String),
}

pub type Result<T> = std::result::Result<T, Error>;
