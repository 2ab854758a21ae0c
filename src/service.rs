use crate::clock::{Clock, SystemClock};
use crate::config::{OtpConfig, MAX_OTP_SIZE, MIN_OTP_SIZE};
use crate::errors::OtpError;
use crate::model::{OtpCandidate, OtpRecord};
use crate::storage::RecordStore;
use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Issues, verifies and expires email OTPs. Holds no mutable state of its
/// own; share it behind an `Arc`.
pub struct OtpService {
    pub config: OtpConfig,
    storage: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl OtpService {
    pub fn new(config: OtpConfig, storage: Arc<dyn RecordStore>) -> Result<Self, OtpError> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // Backends persist millisecond timestamps; working at that precision keeps
    // stored instants and cutoffs comparable across all of them.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    /// Returns the live OTP for `email`, issuing a new one if none exists.
    ///
    /// Re-issuing an existing code does not extend its validity.
    #[instrument(skip(self))]
    pub async fn generate(&self, email: &str) -> Result<String, OtpError> {
        let now = self.now();
        let not_before = now - self.config.validity_period();

        if let Some(existing) = self.storage.find_live(email, not_before).await? {
            info!("OTP already issued, reusing it");
            return Ok(existing.otp);
        }

        let otp = generate_otp(self.config.otp_size)?;
        self.storage
            .insert(&OtpRecord::new(email, &otp, now))
            .await?;

        info!("Issued new OTP");
        Ok(otp)
    }

    /// Consumes the live OTP matching `candidate`. Succeeds at most once per
    /// issued code.
    #[instrument(skip(self, candidate))]
    pub async fn verify(
        &self,
        email: &str,
        candidate: impl Into<OtpCandidate>,
    ) -> Result<OtpRecord, OtpError> {
        let candidate = candidate.into();
        if candidate.digit_count() != self.config.otp_size as usize || !candidate.is_numeric() {
            warn!("Rejected OTP with wrong shape");
            return Err(OtpError::InvalidOtp);
        }

        let not_before = self.now() - self.config.validity_period();
        match self
            .storage
            .find_and_delete_matching(email, candidate.as_str(), not_before)
            .await?
        {
            Some(record) => {
                info!("Verified OTP");
                Ok(record)
            }
            None => {
                warn!("No live OTP matched");
                Err(OtpError::InvalidOtp)
            }
        }
    }

    /// Deletes every record older than the validity window and returns how
    /// many were removed. Records exactly at the boundary survive.
    #[instrument(skip(self))]
    pub async fn clear_expired(&self) -> Result<u64, OtpError> {
        let cutoff = self.now() - self.config.validity_period();
        let removed = self.storage.delete_many(cutoff).await?;
        info!(removed, "Cleared expired OTPs");
        Ok(removed)
    }
}

/// Draws a uniformly random code of exactly `size` decimal digits.
///
/// Sizes above one never start with zero. A single digit code ranges over
/// `0..=9`.
pub fn generate_otp(size: u32) -> Result<String, OtpError> {
    if size < MIN_OTP_SIZE || size > MAX_OTP_SIZE {
        return Err(OtpError::InvalidConfiguration(format!(
            "Invalid OTP size: {}",
            size
        )));
    }

    let (min, max) = otp_range(size);
    let value = rand::thread_rng().gen_range(min..=max);
    Ok(value.to_string())
}

fn otp_range(size: u32) -> (u64, u64) {
    let max = 10u64.pow(size) - 1;
    let min = if size == 1 { 0 } else { 10u64.pow(size - 1) };
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::StorageError;
    use crate::storage::MockRecordStore;
    use chrono::{Duration, TimeZone, Utc};
    use mockall::predicate::*;

    fn test_config() -> OtpConfig {
        OtpConfig {
            otp_size: 4,
            validity_period_minutes: 5,
            ..OtpConfig::default()
        }
    }

    fn fixed_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_generate_otp_digit_counts() {
        for size in MIN_OTP_SIZE..=MAX_OTP_SIZE {
            let (min, max) = otp_range(size);
            for _ in 0..50 {
                let otp = generate_otp(size).unwrap();
                assert_eq!(otp.len(), size as usize, "size {} produced {}", size, otp);
                let value: u64 = otp.parse().unwrap();
                assert!(value >= min && value <= max);
            }
        }
    }

    #[test]
    fn test_otp_range() {
        assert_eq!(otp_range(1), (0, 9));
        assert_eq!(otp_range(4), (1_000, 9_999));
        assert_eq!(otp_range(10), (1_000_000_000, 9_999_999_999));
    }

    #[test]
    fn test_generate_otp_rejects_bad_size() {
        assert!(matches!(
            generate_otp(0),
            Err(OtpError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            generate_otp(11),
            Err(OtpError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = OtpConfig {
            otp_size: 11,
            ..OtpConfig::default()
        };
        let result = OtpService::new(config, Arc::new(MockRecordStore::new()));
        assert!(matches!(result, Err(OtpError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_generate_reuses_live_otp() {
        let mut mock_storage = MockRecordStore::new();
        let clock = fixed_clock();
        let not_before = clock.now() - Duration::minutes(5);

        mock_storage
            .expect_find_live()
            .with(eq("test@example.com"), eq(not_before))
            .times(1)
            .returning(move |email, _| {
                Ok(Some(OtpRecord::new(
                    email,
                    "4821",
                    not_before + Duration::minutes(1),
                )))
            });
        mock_storage.expect_insert().never();

        let service = OtpService::new(test_config(), Arc::new(mock_storage))
            .unwrap()
            .with_clock(clock);

        let otp = service.generate("test@example.com").await.unwrap();
        assert_eq!(otp, "4821");
    }

    #[tokio::test]
    async fn test_generate_inserts_new_otp() {
        let mut mock_storage = MockRecordStore::new();
        let clock = fixed_clock();
        let now = clock.now();

        mock_storage.expect_find_live().returning(|_, _| Ok(None));
        mock_storage
            .expect_insert()
            .withf(move |record| {
                record.email == "test@example.com"
                    && record.otp.len() == 4
                    && record.created_at == now
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = OtpService::new(test_config(), Arc::new(mock_storage))
            .unwrap()
            .with_clock(clock);

        let otp = service.generate("test@example.com").await.unwrap();
        assert_eq!(otp.len(), 4);
    }

    #[tokio::test]
    async fn test_timestamps_are_whole_milliseconds() {
        let mut mock_storage = MockRecordStore::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start + Duration::microseconds(1_500)));
        let truncated = start + Duration::milliseconds(1);

        mock_storage
            .expect_find_live()
            .with(eq("test@example.com"), eq(truncated - Duration::minutes(5)))
            .returning(|_, _| Ok(None));
        mock_storage
            .expect_insert()
            .withf(move |record| record.created_at == truncated)
            .times(1)
            .returning(|_| Ok(()));
        mock_storage
            .expect_delete_many()
            .with(eq(truncated - Duration::minutes(5)))
            .times(1)
            .returning(|_| Ok(0));

        let service = OtpService::new(test_config(), Arc::new(mock_storage))
            .unwrap()
            .with_clock(clock);

        service.generate("test@example.com").await.unwrap();
        service.clear_expired().await.unwrap();
    }

    #[test]
    fn test_new_ignores_cleanup_interval() {
        let config = OtpConfig {
            cleanup_interval_seconds: 0,
            ..test_config()
        };
        assert!(OtpService::new(config, Arc::new(MockRecordStore::new())).is_ok());
    }

    #[tokio::test]
    async fn test_generate_propagates_storage_error() {
        let mut mock_storage = MockRecordStore::new();

        mock_storage.expect_find_live().returning(|_, _| Ok(None));
        mock_storage
            .expect_insert()
            .returning(|_| Err(StorageError::LockPoisoned));

        let service = OtpService::new(test_config(), Arc::new(mock_storage)).unwrap();

        let result = service.generate("test@example.com").await;
        assert!(matches!(result, Err(OtpError::StorageError(_))));
    }

    #[tokio::test]
    async fn test_verify_wrong_length_skips_storage() {
        let mut mock_storage = MockRecordStore::new();
        mock_storage.expect_find_and_delete_matching().never();

        let service = OtpService::new(test_config(), Arc::new(mock_storage)).unwrap();

        for candidate in ["123", "12345", "", "12a4"] {
            let result = service.verify("test@example.com", candidate).await;
            assert!(matches!(result, Err(OtpError::InvalidOtp)));
        }
        let result = service.verify("test@example.com", 123u32).await;
        assert!(matches!(result, Err(OtpError::InvalidOtp)));
    }

    #[tokio::test]
    async fn test_verify_success() {
        let mut mock_storage = MockRecordStore::new();
        let clock = fixed_clock();
        let not_before = clock.now() - Duration::minutes(5);

        mock_storage
            .expect_find_and_delete_matching()
            .with(eq("test@example.com"), eq("4821"), eq(not_before))
            .times(1)
            .returning(move |email, otp, _| Ok(Some(OtpRecord::new(email, otp, not_before))));

        let service = OtpService::new(test_config(), Arc::new(mock_storage))
            .unwrap()
            .with_clock(clock);

        let record = service.verify("test@example.com", 4821u32).await.unwrap();
        assert_eq!(record.otp, "4821");
    }

    #[tokio::test]
    async fn test_verify_invalid() {
        let mut mock_storage = MockRecordStore::new();

        mock_storage
            .expect_find_and_delete_matching()
            .times(1)
            .returning(|_, _, _| Ok(None));

        let service = OtpService::new(test_config(), Arc::new(mock_storage)).unwrap();

        let result = service.verify("test@example.com", "0000").await;
        assert!(matches!(result, Err(OtpError::InvalidOtp)));
    }

    #[tokio::test]
    async fn test_clear_expired_uses_window_cutoff() {
        let mut mock_storage = MockRecordStore::new();
        let clock = fixed_clock();
        let cutoff = clock.now() - Duration::minutes(5);

        mock_storage
            .expect_delete_many()
            .with(eq(cutoff))
            .times(1)
            .returning(|_| Ok(3));

        let service = OtpService::new(test_config(), Arc::new(mock_storage))
            .unwrap()
            .with_clock(clock);

        assert_eq!(service.clear_expired().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_clear_expired_propagates_storage_error() {
        let mut mock_storage = MockRecordStore::new();
        mock_storage
            .expect_delete_many()
            .returning(|_| Err(StorageError::Corrupt("bad".to_string())));

        let service = OtpService::new(test_config(), Arc::new(mock_storage)).unwrap();

        let result = service.clear_expired().await;
        assert!(matches!(result, Err(OtpError::StorageError(_))));
    }
}
