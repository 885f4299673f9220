use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("An engagement session is already running (list {0})")]
    AlreadyRunning(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Worker unavailable: {0}")]
    WorkerGone(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
