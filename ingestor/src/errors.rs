use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Metrics output is not valid UTF-8: {0}")]
    MetricsEncoding(#[from] std::string::FromUtf8Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
