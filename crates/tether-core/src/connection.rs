use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SUCCESS_MESSAGE: &str = "Connection test successful!";
pub const TIMEOUT_MESSAGE: &str = "Connection test timed out. The remote did not answer in time.";

/// Stable categories derived from probe diagnostics. Advisory only: use them
/// for messaging, not for control flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Connection,
    Network,
    Authentication,
    ResourceNotFound,
    InvalidParams,
    Timeout,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Connection => "CONNECTION",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Authentication => "AUTHENTICATION",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifiedError {
    pub code: ErrorCode,
    /// Diagnostic output of the probe, trimmed.
    pub message: String,
}

/// Outcome of one connection test. Created fresh per call and never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

impl ConnectionResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn timed_out(detail: impl Into<String>) -> Self {
        Self::failed(TIMEOUT_MESSAGE, ErrorCode::Timeout, detail)
    }

    pub fn failed(message: impl Into<String>, code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
            error: Some(ClassifiedError {
                code,
                message: detail.into(),
            }),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
