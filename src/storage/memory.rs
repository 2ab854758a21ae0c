use crate::errors::StorageError;
use crate::model::OtpRecord;
use crate::storage::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct InMemoryStorage {
    otps: Arc<RwLock<HashMap<String, Vec<OtpRecord>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            otps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> Result<usize, StorageError> {
        let map = self.otps.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStorage {
    async fn find_live(
        &self,
        email: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError> {
        let map = self.otps.read().map_err(|_| StorageError::LockPoisoned)?;
        let found = map.get(email).and_then(|records| {
            records
                .iter()
                .filter(|r| r.created_at >= not_before)
                .max_by_key(|r| r.created_at)
                .cloned()
        });
        Ok(found)
    }

    async fn insert(&self, record: &OtpRecord) -> Result<(), StorageError> {
        let mut map = self.otps.write().map_err(|_| StorageError::LockPoisoned)?;
        map.entry(record.email.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn find_and_delete_matching(
        &self,
        email: &str,
        otp: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError> {
        // Lookup and removal share one write guard.
        let mut map = self.otps.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(records) = map.get_mut(email) else {
            return Ok(None);
        };

        let position = records
            .iter()
            .position(|r| r.otp == otp && r.created_at >= not_before);
        let removed = position.map(|idx| records.remove(idx));

        if records.is_empty() {
            map.remove(email);
        }
        Ok(removed)
    }

    async fn delete_many(&self, created_before: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut map = self.otps.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut removed = 0u64;

        map.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.created_at >= created_before);
            removed += (before - records.len()) as u64;
            !records.is_empty()
        });

        Ok(removed)
    }
}
