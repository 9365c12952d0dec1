use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("rate limited after backoff, giving up on {0}")]
    RateLimited(String),

    #[error("geocoder not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, GeoError>;
