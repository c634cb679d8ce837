use crate::params::ParameterViolation;
use crate::types::OutputFormat;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that prevent the service from starting.
///
/// Every model-level variant names the offending model so an operator can find
/// the broken entry in the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid server configuration: {0}")]
    InvalidServer(String),

    #[error("No models configured")]
    NoModels,

    #[error("Duplicate model id '{0}'")]
    DuplicateModelId(String),

    #[error("Model '{model}' declares no languages")]
    NoLanguages { model: String },

    #[error("Model '{model}': default language '{language}' is not one of {languages:?}")]
    DefaultLanguageNotSupported {
        model: String,
        language: String,
        languages: Vec<String>,
    },

    #[error("Models '{first}' and '{second}' are both marked as default")]
    MultipleDefaults { first: String, second: String },

    #[error("Model '{model}': parameter '{parameter}': {reason}")]
    InvalidParameter {
        model: String,
        parameter: String,
        reason: String,
    },
}

impl ConfigError {
    /// The model entry this error is about, if it concerns a single model.
    pub fn model(&self) -> Option<&str> {
        match self {
            ConfigError::DuplicateModelId(model)
            | ConfigError::NoLanguages { model }
            | ConfigError::DefaultLanguageNotSupported { model, .. }
            | ConfigError::InvalidParameter { model, .. } => Some(model),
            ConfigError::MultipleDefaults { second, .. } => Some(second),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Stable wire codes for per-request failures.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    TextTooLong,
    TextEmpty,
    ModelNotFound,
    ModelUnavailable,
    LanguageNotSupported,
    InvalidParameter,
    SynthesisFailed,
    ServiceBusy,
    SynthesisTimeout,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Advisory HTTP status for an API layer fronting the orchestrator.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::TextEmpty
            | ErrorCode::LanguageNotSupported
            | ErrorCode::InvalidParameter => 422,
            ErrorCode::TextTooLong => 413,
            ErrorCode::ModelNotFound => 404,
            ErrorCode::ModelUnavailable
            | ErrorCode::ServiceBusy
            | ErrorCode::ServiceUnavailable => 503,
            ErrorCode::SynthesisTimeout => 504,
            ErrorCode::SynthesisFailed => 500,
        }
    }
}

/// Abstract error classes, independent of any wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unavailable,
    LanguageUnsupported,
    Busy,
    Timeout,
    SynthesisFailed,
}

/// A typed, actionable failure for a single synthesis request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Text cannot be empty")]
    TextEmpty,

    #[error("Text exceeds maximum length of {max_length} characters")]
    TextTooLong {
        max_length: usize,
        actual_length: usize,
    },

    #[error("Model '{model_id}' not found")]
    ModelNotFound {
        model_id: String,
        available_models: Vec<String>,
    },

    #[error("Model '{model_id}' is not available: {reason}")]
    ModelUnavailable { model_id: String, reason: String },

    #[error("Language '{language}' is not supported")]
    LanguageNotSupported {
        language: String,
        model_id: Option<String>,
        supported_languages: Vec<String>,
    },

    #[error(transparent)]
    InvalidParameter(#[from] ParameterViolation),

    #[error("Output format '{format}' is not supported")]
    UnsupportedFormat { format: OutputFormat },

    #[error("Service is busy, please try again later")]
    ServiceBusy { outstanding: usize, capacity: usize },

    #[error("Synthesis with model '{model_id}' exceeded the {timeout:?} deadline")]
    SynthesisTimeout { model_id: String, timeout: Duration },

    #[error("Synthesis failed: {detail}")]
    SynthesisFailed { model_id: String, detail: String },

    #[error("No synthesis model is available")]
    ServiceUnavailable,
}

impl SynthesisError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SynthesisError::TextEmpty => ErrorCode::TextEmpty,
            SynthesisError::TextTooLong { .. } => ErrorCode::TextTooLong,
            SynthesisError::ModelNotFound { .. } => ErrorCode::ModelNotFound,
            SynthesisError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            SynthesisError::LanguageNotSupported { .. } => ErrorCode::LanguageNotSupported,
            SynthesisError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            SynthesisError::UnsupportedFormat { .. } => ErrorCode::ValidationError,
            SynthesisError::ServiceBusy { .. } => ErrorCode::ServiceBusy,
            SynthesisError::SynthesisTimeout { .. } => ErrorCode::SynthesisTimeout,
            SynthesisError::SynthesisFailed { .. } => ErrorCode::SynthesisFailed,
            SynthesisError::ServiceUnavailable => ErrorCode::ServiceUnavailable,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SynthesisError::TextEmpty
            | SynthesisError::TextTooLong { .. }
            | SynthesisError::InvalidParameter(_)
            | SynthesisError::UnsupportedFormat { .. } => ErrorKind::Validation,
            SynthesisError::ModelNotFound { .. } => ErrorKind::NotFound,
            SynthesisError::ModelUnavailable { .. } | SynthesisError::ServiceUnavailable => {
                ErrorKind::Unavailable
            }
            SynthesisError::LanguageNotSupported { .. } => ErrorKind::LanguageUnsupported,
            SynthesisError::ServiceBusy { .. } => ErrorKind::Busy,
            SynthesisError::SynthesisTimeout { .. } => ErrorKind::Timeout,
            SynthesisError::SynthesisFailed { .. } => ErrorKind::SynthesisFailed,
        }
    }

    /// Structured context for the error body, when there is any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            SynthesisError::TextEmpty | SynthesisError::ServiceUnavailable => None,
            SynthesisError::TextTooLong {
                max_length,
                actual_length,
            } => Some(json!({ "max_length": max_length, "actual_length": actual_length })),
            SynthesisError::ModelNotFound {
                model_id,
                available_models,
            } => Some(json!({ "model_id": model_id, "available_models": available_models })),
            SynthesisError::ModelUnavailable { model_id, reason } => {
                Some(json!({ "model_id": model_id, "reason": reason }))
            }
            SynthesisError::LanguageNotSupported {
                language,
                model_id,
                supported_languages,
            } => Some(json!({
                "language": language,
                "model_id": model_id,
                "supported_languages": supported_languages,
            })),
            SynthesisError::InvalidParameter(violation) => Some(violation.details()),
            SynthesisError::UnsupportedFormat { format } => Some(json!({ "format": format })),
            SynthesisError::ServiceBusy {
                outstanding,
                capacity,
            } => Some(json!({ "queue_size": outstanding, "max_size": capacity })),
            SynthesisError::SynthesisTimeout { model_id, timeout } => Some(json!({
                "model_id": model_id,
                "timeout_ms": timeout.as_millis() as u64,
            })),
            SynthesisError::SynthesisFailed { model_id, detail } => {
                Some(json!({ "model_id": model_id, "error": detail }))
            }
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Wire body: `{"error": {"code": ..., "message": ..., "details": ...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
