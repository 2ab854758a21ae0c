use crate::errors::OtpError;

pub const MIN_OTP_SIZE: u32 = 1;
pub const MAX_OTP_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub otp_size: u32,
    pub validity_period_minutes: u32,
    pub storage_type: StorageType,
    pub redis_url: String,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub mongodb_collection: String,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StorageType {
    Memory,
    Redis,
    Mongo,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            otp_size: 6,
            validity_period_minutes: 5,
            storage_type: StorageType::Mongo,
            redis_url: "redis://127.0.0.1/".to_string(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: "otp".to_string(),
            mongodb_collection: "otps".to_string(),
            cleanup_interval_seconds: 60,
        }
    }
}

impl OtpConfig {
    pub fn from_env() -> Result<Self, OtpError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("OTP_SIZE") {
            config.otp_size = val
                .parse()
                .map_err(|_| OtpError::InvalidConfiguration("Invalid OTP_SIZE".to_string()))?;
        }
        if let Ok(val) = std::env::var("OTP_VALIDITY_PERIOD_MINUTES") {
            config.validity_period_minutes = val.parse().map_err(|_| {
                OtpError::InvalidConfiguration("Invalid OTP_VALIDITY_PERIOD_MINUTES".to_string())
            })?;
        }
        if let Ok(val) = std::env::var("OTP_CLEANUP_INTERVAL_SECONDS") {
            config.cleanup_interval_seconds = val.parse().map_err(|_| {
                OtpError::InvalidConfiguration("Invalid OTP_CLEANUP_INTERVAL_SECONDS".to_string())
            })?;
        }

        if let Ok(val) = std::env::var("STORAGE_TYPE") {
            config.storage_type = match val.to_lowercase().as_str() {
                "memory" => StorageType::Memory,
                "redis" => StorageType::Redis,
                "mongo" | "mongodb" => StorageType::Mongo,
                _ => {
                    return Err(OtpError::InvalidConfiguration(
                        "Invalid STORAGE_TYPE: must be 'memory', 'redis' or 'mongodb'".to_string(),
                    ))
                }
            };
        }

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }
        if let Ok(val) = std::env::var("MONGODB_URI") {
            config.mongodb_uri = val;
        }
        if let Ok(val) = std::env::var("MONGODB_DATABASE") {
            config.mongodb_database = val;
        }
        if let Ok(val) = std::env::var("MONGODB_COLLECTION") {
            config.mongodb_collection = val;
        }

        config.validate()?;
        config.validate_cleanup_interval()?;
        Ok(config)
    }

    /// Rejects settings the service cannot run with. Called once at startup.
    pub fn validate(&self) -> Result<(), OtpError> {
        if self.otp_size < MIN_OTP_SIZE || self.otp_size > MAX_OTP_SIZE {
            return Err(OtpError::InvalidConfiguration(format!(
                "OTP size must be between {} and {}, got {}",
                MIN_OTP_SIZE, MAX_OTP_SIZE, self.otp_size
            )));
        }
        if self.validity_period_minutes < 1 {
            return Err(OtpError::InvalidConfiguration(
                "OTP validity period must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }

    /// Rejects a sweep interval the scheduler cannot tick on. Only relevant
    /// to hosts that run [`CleanupService`](crate::cron::CleanupService).
    pub fn validate_cleanup_interval(&self) -> Result<(), OtpError> {
        if self.cleanup_interval_seconds < 1 {
            return Err(OtpError::InvalidConfiguration(
                "Cleanup interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validity_period(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.validity_period_minutes))
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_seconds)
    }
}
