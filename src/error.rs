use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("event source error: {0}")]
    Source(String),
    #[error("failed to open transport {port}: {reason}")]
    TransportOpen { port: String, reason: String },
    #[error("state lock poisoned")]
    StateLock,
}
