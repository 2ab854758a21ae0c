use chrono::{DateTime, Utc};

/// One issued passcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub email: String,
    pub otp: String,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn new(email: &str, otp: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            email: email.to_string(),
            otp: otp.to_string(),
            created_at,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>, validity: chrono::Duration) -> bool {
        self.created_at >= now - validity
    }
}

/// A passcode submitted for verification, either as text or as a number.
///
/// Numbers are compared by their decimal rendering, so `42u32` only matches a
/// two-digit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCandidate(String);

impl OtpCandidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digit_count(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl From<&str> for OtpCandidate {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OtpCandidate {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for OtpCandidate {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<u32> for OtpCandidate {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for OtpCandidate {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}
