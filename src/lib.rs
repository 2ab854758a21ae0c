#![doc = include_str!("../README.md")]

pub mod clock;
pub mod config;
pub mod cron;
pub mod errors;
pub mod model;
pub mod service;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OtpConfig, StorageType};
pub use cron::CleanupService;
pub use errors::{OtpError, StorageError};
pub use model::{OtpCandidate, OtpRecord};
pub use service::OtpService;
pub use storage::{InMemoryStorage, MongoStorage, RecordStore, RedisStorage};
