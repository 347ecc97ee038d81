/// Error taxonomy for the pipeline core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            other => CoreError::StoreUnavailable(format!("database error: {}", other)),
        }
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::StoreUnavailable(format!("redis error: {}", err))
    }
}

impl From<rdkafka::error::KafkaError> for CoreError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        CoreError::StoreUnavailable(format!("kafka error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for CoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CoreError::Cancelled("operation deadline exceeded".to_string())
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
