//! Error handling for the application

use thiserror::Error;

/// History-store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("invalid stored value in column {column}: {value}")]
    InvalidValue { column: String, value: String },
}

/// Listing-fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("no product links found under {0}")]
    NoListings(String),
}

/// Spot-price feed errors
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed spot payload: {0}")]
    MalformedPayload(String),
}

/// Notification delivery errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    BadStatus(u16),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("market data error: {0}")]
    Market(#[from] MarketError),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("export error: {0}")]
    Export(#[from] std::io::Error),
}
