use thiserror::Error;

#[derive(Error, Debug)]
pub enum OtpError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Failures raised by a [`RecordStore`](crate::storage::RecordStore) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
