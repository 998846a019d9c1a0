//! Security module for inbound frame validation.
//!
//! Every text frame is checked against the configured size, depth and
//! collection limits before it is parsed into a request.

use crate::config::SecurityConfig;
use crate::error::ErrorCode;
use serde_json::Value;

pub mod input_validation;

/// Validates inbound frames against one [`SecurityConfig`].
#[derive(Debug, Clone)]
pub struct FrameValidator {
    config: SecurityConfig,
}

impl FrameValidator {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Checks a raw frame and returns its parsed JSON on success.
    pub fn validate(&self, frame: &[u8]) -> Result<Value, SecurityError> {
        input_validation::validate_json_message(frame, &self.config)
    }
}

/// Security-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Message contains forbidden characters")]
    MaliciousContent,
}

impl SecurityError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ValidationError
    }
}
