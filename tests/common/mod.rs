use chrono::{TimeZone, Utc};
use email_otp_store::{InMemoryStorage, ManualClock, OtpConfig, OtpService, StorageType};
use std::sync::Arc;

#[allow(dead_code)]
pub struct TestApp {
    pub service: Arc<OtpService>,
    pub storage: Arc<InMemoryStorage>,
    pub clock: Arc<ManualClock>,
}

pub fn test_config(otp_size: u32, validity_period_minutes: u32) -> OtpConfig {
    OtpConfig {
        otp_size,
        validity_period_minutes,
        storage_type: StorageType::Memory,
        ..OtpConfig::default()
    }
}

#[allow(dead_code)]
pub fn spawn_app(otp_size: u32, validity_period_minutes: u32) -> TestApp {
    let storage = Arc::new(InMemoryStorage::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));

    let service = OtpService::new(
        test_config(otp_size, validity_period_minutes),
        storage.clone(),
    )
    .unwrap()
    .with_clock(clock.clone());

    TestApp {
        service: Arc::new(service),
        storage,
        clock,
    }
}
