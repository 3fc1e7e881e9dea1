//! Error types for the fingerprint pipeline
//!
//! This module provides the error taxonomy shared by the browser side and
//! the edge endpoints:
//! - Detailed error variants for different failure modes
//! - Error codes for programmatic handling
//! - HTTP status mapping for the edge handlers
//! - Public (non-revealing) messages for response bodies

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, FingerprintError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Request errors (1xx)
    InvalidBody = 100,
    MethodNotAllowed = 101,
    NotFound = 102,

    // Access errors (2xx)
    Unauthorized = 200,

    // Storage errors (3xx)
    StorageError = 300,
    StorageUnavailable = 301,

    // Network errors (4xx)
    NetworkError = 400,

    // Browser environment errors (5xx)
    MissingGlobal = 500,
    ProbeFailed = 501,

    // Internal errors (9xx)
    InternalError = 900,
}

/// Main error type for the fingerprint pipeline
#[derive(Error, Debug, Clone)]
pub enum FingerprintError {
    // ===== Request Errors =====
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ===== Access Errors =====
    #[error("Unauthorized")]
    Unauthorized,

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("KV not available")]
    StorageUnavailable,

    // ===== Network Errors =====
    #[error("Network error: {0}")]
    Network(String),

    // ===== Browser Errors =====
    #[error("Missing browser global: {0}")]
    MissingGlobal(&'static str),

    #[error("Probe failed: {0}")]
    Probe(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FingerprintError {
    /// Get the error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            FingerprintError::InvalidBody(_) => ErrorCode::InvalidBody,
            FingerprintError::MethodNotAllowed(_) => ErrorCode::MethodNotAllowed,
            FingerprintError::NotFound(_) => ErrorCode::NotFound,
            FingerprintError::Unauthorized => ErrorCode::Unauthorized,
            FingerprintError::Storage(_) => ErrorCode::StorageError,
            FingerprintError::StorageUnavailable => ErrorCode::StorageUnavailable,
            FingerprintError::Network(_) => ErrorCode::NetworkError,
            FingerprintError::MissingGlobal(_) => ErrorCode::MissingGlobal,
            FingerprintError::Probe(_) => ErrorCode::ProbeFailed,
            FingerprintError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// HTTP status the edge handlers answer with for this error
    ///
    /// Body parse failures map to 500, not 400.
    pub fn status(&self) -> u16 {
        match self {
            FingerprintError::MethodNotAllowed(_) => 405,
            FingerprintError::NotFound(_) => 404,
            FingerprintError::Unauthorized => 401,
            _ => 500,
        }
    }

    /// Message safe to put in a response body
    pub fn public_message(&self) -> &'static str {
        match self {
            FingerprintError::MethodNotAllowed(_) => "Method not allowed",
            FingerprintError::NotFound(_) => "Not found",
            FingerprintError::Unauthorized => "Unauthorized",
            FingerprintError::StorageUnavailable => "KV not available",
            _ => "Internal error",
        }
    }

    /// Wrap a JS exception raised during a probe
    pub fn probe(err: JsValue) -> Self {
        FingerprintError::Probe(format!("{:?}", err))
    }
}

impl From<serde_json::Error> for FingerprintError {
    fn from(err: serde_json::Error) -> Self {
        FingerprintError::InvalidBody(err.to_string())
    }
}

impl From<FingerprintError> for JsValue {
    fn from(err: FingerprintError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Error information for JavaScript consumption
#[derive(Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u32,
    pub status: u16,
    pub message: String,
}

impl From<&FingerprintError> for ErrorInfo {
    fn from(err: &FingerprintError) -> Self {
        ErrorInfo {
            code: err.code() as u32,
            status: err.status(),
            message: err.to_string(),
        }
    }
}
