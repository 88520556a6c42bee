use thiserror::Error;

pub type Result<T> = std::result::Result<T, IihflowError>;

#[derive(Debug, Error)]
pub enum IihflowError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("{group} pagination exceeded {iterations} requests without completing")]
    PaginationLimit { group: &'static str, iterations: u32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
