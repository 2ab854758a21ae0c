use crate::errors::StorageError;
use crate::model::OtpRecord;
use crate::storage::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct OtpDocument {
    email: String,
    otp: String,
    #[serde(rename = "createdAt")]
    created_at: bson::DateTime,
}

impl From<&OtpRecord> for OtpDocument {
    fn from(record: &OtpRecord) -> Self {
        Self {
            email: record.email.clone(),
            otp: record.otp.clone(),
            created_at: to_bson(record.created_at),
        }
    }
}

impl OtpDocument {
    fn into_record(self) -> Result<OtpRecord, StorageError> {
        let millis = self.created_at.timestamp_millis();
        let created_at = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::Corrupt(format!("createdAt out of range for {}", self.email))
        })?;
        Ok(OtpRecord {
            email: self.email,
            otp: self.otp,
            created_at,
        })
    }
}

fn to_bson(instant: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(instant.timestamp_millis())
}

/// One document per issued passcode: `{ email, otp, createdAt }`.
pub struct MongoStorage {
    collection: Collection<OtpDocument>,
}

impl MongoStorage {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, StorageError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self::from_client(&client, database, collection))
    }

    pub fn from_client(client: &Client, database: &str, collection: &str) -> Self {
        let collection = client
            .database(database)
            .collection::<OtpDocument>(collection);
        Self { collection }
    }

    /// Creates the lookup index on `(email, createdAt)` and the sweep index on
    /// `createdAt`. Safe to call repeatedly.
    pub async fn ensure_indexes(&self) -> Result<(), StorageError> {
        let lookup = IndexModel::builder()
            .keys(doc! { "email": 1, "createdAt": -1 })
            .options(
                IndexOptions::builder()
                    .name("email_created_at".to_string())
                    .build(),
            )
            .build();
        let sweep = IndexModel::builder()
            .keys(doc! { "createdAt": 1 })
            .options(IndexOptions::builder().name("created_at".to_string()).build())
            .build();

        self.collection.create_indexes([lookup, sweep]).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MongoStorage {
    async fn find_live(
        &self,
        email: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError> {
        let document = self
            .collection
            .find_one(doc! {
                "email": email,
                "createdAt": { "$gte": to_bson(not_before) },
            })
            .sort(doc! { "createdAt": -1 })
            .await?;

        document.map(OtpDocument::into_record).transpose()
    }

    async fn insert(&self, record: &OtpRecord) -> Result<(), StorageError> {
        self.collection.insert_one(OtpDocument::from(record)).await?;
        Ok(())
    }

    async fn find_and_delete_matching(
        &self,
        email: &str,
        otp: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError> {
        let document = self
            .collection
            .find_one_and_delete(doc! {
                "email": email,
                "otp": otp,
                "createdAt": { "$gte": to_bson(not_before) },
            })
            .await?;

        document.map(OtpDocument::into_record).transpose()
    }

    async fn delete_many(&self, created_before: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = self
            .collection
            .delete_many(doc! { "createdAt": { "$lt": to_bson(created_before) } })
            .await?;
        Ok(result.deleted_count)
    }
}
