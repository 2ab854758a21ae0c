use crate::errors::StorageError;
use crate::model::OtpRecord;
use crate::storage::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};

const EXPIRY_INDEX_KEY: &str = "otp:expiry";
const RECORD_KEY_PREFIX: &str = "otp:rec:";
const SWEEP_BATCH_SIZE: isize = 500;

// KEYS[1] = otp:rec:{email}, KEYS[2] = otp:expiry
// ARGV[1] = otp, ARGV[2] = not_before (ms), ARGV[3] = email
const FIND_AND_DELETE_SCRIPT: &str = r#"
local members = redis.call('ZRANGEBYSCORE', KEYS[1], ARGV[2], '+inf')
for _, member in ipairs(members) do
    local sep = string.find(member, ':', 1, true)
    if sep and string.sub(member, 1, sep - 1) == ARGV[1] then
        redis.call('ZREM', KEYS[1], member)
        redis.call('ZREM', KEYS[2], ARGV[3] .. '\0' .. member)
        return member
    end
end
return false
"#;

// KEYS[1] = otp:expiry, KEYS[2] = otp:rec:{email}
// ARGV[1] = expiry index member, ARGV[2] = record member
const DELETE_EXPIRED_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
return redis.call('ZREM', KEYS[2], ARGV[2])
"#;

/// Records live in one sorted set per email (`otp:rec:{email}`), scored by
/// issuance time in milliseconds, with members `{otp}:{created_ms}`.
///
/// `otp:expiry` indexes every record across emails by the same score, with
/// members `{email}\0{otp}:{created_ms}`, so the sweep can find stale records
/// without scanning every email.
pub struct RedisStorage {
    client: redis::Client,
    find_and_delete: Script,
    delete_expired: Script,
}

impl RedisStorage {
    pub fn new(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            find_and_delete: Script::new(FIND_AND_DELETE_SCRIPT),
            delete_expired: Script::new(DELETE_EXPIRED_SCRIPT),
        })
    }

    fn record_key(email: &str) -> String {
        format!("{}{}", RECORD_KEY_PREFIX, email)
    }
}

fn encode_member(record: &OtpRecord) -> String {
    format!("{}:{}", record.otp, record.created_at.timestamp_millis())
}

fn decode_member(email: &str, member: &str) -> Result<OtpRecord, StorageError> {
    let (otp, millis) = member
        .split_once(':')
        .ok_or_else(|| StorageError::Corrupt(format!("malformed OTP entry for {}", email)))?;
    let millis: i64 = millis
        .parse()
        .map_err(|_| StorageError::Corrupt(format!("malformed OTP timestamp for {}", email)))?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Corrupt(format!("OTP timestamp out of range for {}", email)))?;
    Ok(OtpRecord::new(email, otp, created_at))
}

fn index_member(email: &str, record_member: &str) -> String {
    format!("{}\0{}", email, record_member)
}

// Record members are digits and a colon, so the last NUL always splits them
// from the email.
fn split_index_member(member: &str) -> Result<(&str, &str), StorageError> {
    member
        .rsplit_once('\0')
        .ok_or_else(|| StorageError::Corrupt("malformed OTP expiry entry".to_string()))
}

#[async_trait]
impl RecordStore for RedisStorage {
    async fn find_live(
        &self,
        email: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let members: Vec<String> = conn
            .zrevrangebyscore_limit(
                Self::record_key(email),
                "+inf",
                not_before.timestamp_millis(),
                0,
                1,
            )
            .await?;

        members
            .first()
            .map(|member| decode_member(email, member))
            .transpose()
    }

    async fn insert(&self, record: &OtpRecord) -> Result<(), StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let score = record.created_at.timestamp_millis();
        let member = encode_member(record);

        let _: () = redis::pipe()
            .atomic()
            .zadd(Self::record_key(&record.email), &member, score)
            .ignore()
            .zadd(EXPIRY_INDEX_KEY, index_member(&record.email, &member), score)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn find_and_delete_matching(
        &self,
        email: &str,
        otp: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let member: Option<String> = self
            .find_and_delete
            .key(Self::record_key(email))
            .key(EXPIRY_INDEX_KEY)
            .arg(otp)
            .arg(not_before.timestamp_millis())
            .arg(email)
            .invoke_async(&mut conn)
            .await?;

        member
            .map(|member| decode_member(email, &member))
            .transpose()
    }

    async fn delete_many(&self, created_before: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let cutoff = format!("({}", created_before.timestamp_millis());
        let mut removed = 0u64;

        loop {
            // Each entry is removed below, so the next page starts at offset 0
            let stale: Vec<String> = conn
                .zrangebyscore_limit(EXPIRY_INDEX_KEY, "-inf", &cutoff, 0, SWEEP_BATCH_SIZE)
                .await?;

            for entry in &stale {
                let (email, record_member) = split_index_member(entry)?;
                let deleted: u64 = self
                    .delete_expired
                    .key(EXPIRY_INDEX_KEY)
                    .key(Self::record_key(email))
                    .arg(entry)
                    .arg(record_member)
                    .invoke_async(&mut conn)
                    .await?;
                removed += deleted;
            }

            if (stale.len() as isize) < SWEEP_BATCH_SIZE {
                break;
            }
        }

        Ok(removed)
    }
}
