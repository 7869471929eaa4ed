//! REST envelopes and the client-side error taxonomy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Success envelope: `{ content: { data, meta? } }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse<T> {
    pub content: ApiContent<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiContent<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// One entry of the failure envelope `{ errors: [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    /// Present when the error concerns a specific request field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub errors: Vec<FieldError>,
}

pub const ACTION_NOT_ALLOWED: &str = "ACTION_NOT_ALLOWED";
pub const INSUFFICIENT_PERMISSION: &str = "INSUFFICIENT_PERMISSION";
pub const INVALID_PERMISSION: &str = "INVALID_PERMISSION";
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

const AUTHORIZATION_CODES: [&str; 4] = [
    ACTION_NOT_ALLOWED,
    INSUFFICIENT_PERMISSION,
    INVALID_PERMISSION,
    UNAUTHORIZED,
];

const STALE_CODES: [&str; 1] = [INVALID_MESSAGE];

/// Every REST failure the client can observe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was received. The same call may be re-issued.
    #[error("network error: {0}")]
    Network(String),
    /// Structured per-field errors.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),
    #[error("not allowed ({code}): {message}")]
    Authorization { code: String, message: String },
    /// The entity no longer exists server-side.
    #[error("stale entity ({code}): {message}")]
    StaleEntity { code: String, message: String },
    #[error("HTTP {status}: {body}")]
    Http {
        status: u16,
        errors: Vec<FieldError>,
        body: String,
    },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| match &e.param {
            Some(param) => format!("{param}: {}", e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApiError {
    /// Classify a non-success response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
            return ApiError::Http {
                status,
                errors: Vec::new(),
                body: body.to_string(),
            };
        };

        if parsed.errors.iter().any(|e| e.param.is_some()) {
            return ApiError::Validation(parsed.errors);
        }

        if let Some(first) = parsed.errors.first() {
            if AUTHORIZATION_CODES.contains(&first.code.as_str()) {
                return ApiError::Authorization {
                    code: first.code.clone(),
                    message: first.message.clone(),
                };
            }
            if STALE_CODES.contains(&first.code.as_str()) {
                return ApiError::StaleEntity {
                    code: first.code.clone(),
                    message: first.message.clone(),
                };
            }
        }

        ApiError::Http {
            status,
            errors: parsed.errors,
            body: body.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, ApiError::StaleEntity { .. })
    }

    /// First server error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Authorization { code, .. } | ApiError::StaleEntity { code, .. } => Some(code),
            ApiError::Validation(errors) | ApiError::Http { errors, .. } => {
                errors.first().map(|e| e.code.as_str())
            }
            ApiError::Network(_) | ApiError::Deserialize(_) => None,
        }
    }

    /// Field name to message, for routing validation errors to inputs.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            ApiError::Validation(errors) => errors
                .iter()
                .filter_map(|e| Some((e.param.clone()?, e.message.clone())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}
