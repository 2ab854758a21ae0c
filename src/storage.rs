use crate::config::{OtpConfig, StorageType};
use crate::errors::{OtpError, StorageError};
use crate::model::OtpRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod memory;
pub mod mongo;
pub mod redis;

/// Persistence contract for OTP records, keyed by email and issuance time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Most recent record for `email` with `created_at >= not_before`.
    async fn find_live(
        &self,
        email: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError>;

    async fn insert(&self, record: &OtpRecord) -> Result<(), StorageError>;

    /// Removes and returns one record matching `email` and `otp` with
    /// `created_at >= not_before`. Must be a single atomic operation.
    async fn find_and_delete_matching(
        &self,
        email: &str,
        otp: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError>;

    /// Deletes every record with `created_at < created_before`.
    async fn delete_many(&self, created_before: DateTime<Utc>) -> Result<u64, StorageError>;
}

pub use self::memory::InMemoryStorage;
pub use self::mongo::MongoStorage;
pub use self::redis::RedisStorage;

/// Builds the backend selected by `config.storage_type`.
pub async fn connect(config: &OtpConfig) -> Result<Arc<dyn RecordStore>, OtpError> {
    let storage: Arc<dyn RecordStore> = match config.storage_type {
        StorageType::Memory => Arc::new(InMemoryStorage::new()),
        StorageType::Redis => Arc::new(RedisStorage::new(&config.redis_url)?),
        StorageType::Mongo => {
            let storage = MongoStorage::connect(
                &config.mongodb_uri,
                &config.mongodb_database,
                &config.mongodb_collection,
            )
            .await?;
            storage.ensure_indexes().await?;
            Arc::new(storage)
        }
    };
    Ok(storage)
}
