//! Failure handling for the turn loop
//!
//! This module provides:
//! - Error classification and the recognizer recovery table
//! - Retry with exponential backoff
//! - Time limits for remote calls

pub mod classify;
pub mod retry;
pub mod timeout;

// Re-export commonly used types
pub use classify::{
    classify, friendly_message, handle_recognition_error, ErrorCategory, ErrorSignature,
    RecognitionErrorCode, RecognitionErrorPolicy, RecoveryAction,
};
pub use retry::{delay_for_attempt, should_retry_error, with_retry, RetryPolicy};
pub use timeout::{with_timeout, DEFAULT_LLM_TIMEOUT, LLM_TIMEOUT_MESSAGE};
