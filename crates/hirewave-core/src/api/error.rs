use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {}", .detail.as_deref().unwrap_or("invalid data"))]
    Validation {
        detail: Option<String>,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("Unauthorized - token may be expired")]
    Unauthorized(Option<String>),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session expired - please log in again")]
    SessionExpired,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error payload shapes the backend produces: `{detail}`, `{error}`,
/// `{message}`, or a map of field name to message(s).
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
    message: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn detail(&self) -> Option<String> {
        self.detail
            .clone()
            .or_else(|| self.error.clone())
            .or_else(|| self.message.clone())
            .filter(|d| !d.is_empty())
    }

    fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .filter_map(|(field, value)| {
                let messages: Vec<String> = match value {
                    serde_json::Value::String(s) => vec![s.clone()],
                    serde_json::Value::Array(items) => items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                (!messages.is_empty()).then(|| (field.clone(), messages))
            })
            .collect()
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed = ErrorBody::parse(body);
        let detail_or_body = || parsed.detail().unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 => ApiError::Validation {
                detail: parsed.detail(),
                fields: parsed.field_errors(),
            },
            401 => ApiError::Unauthorized(parsed.detail()),
            403 => ApiError::AccessDenied(detail_or_body()),
            404 => ApiError::NotFound(detail_or_body()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail_or_body())),
        }
    }

    /// Whether the backend rejected the credential (401 or 403). Either one
    /// ends the signed-in session.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized(_) | ApiError::AccessDenied(_) | ApiError::SessionExpired
        )
    }

    /// Message the backend supplied with the failure, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Validation { detail, .. } => detail.as_deref(),
            ApiError::Unauthorized(detail) => detail.as_deref(),
            _ => None,
        }
    }

    /// Failure reason shown on the login form
    pub fn login_message(&self) -> String {
        if let Some(detail) = self.detail() {
            return detail.to_string();
        }
        if let ApiError::Validation { fields, .. } = self {
            if let Some(first) = fields.values().flatten().next() {
                return first.clone();
            }
        }
        match self {
            ApiError::Validation { .. } | ApiError::Unauthorized(_) | ApiError::AccessDenied(_) => {
                "Invalid email or password".to_string()
            }
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::ServerError(_) => {
                "The server encountered an error. Please try again later.".to_string()
            }
            ApiError::RateLimited => "Too many attempts. Please wait and try again.".to_string(),
            _ => "Login failed".to_string(),
        }
    }

    /// User-facing message for any API failure. Field-level validation
    /// errors are rendered one per line as `field: message, message`.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) | ApiError::SessionExpired => {
                "Your session has expired. Please log in again.".to_string()
            }
            ApiError::AccessDenied(_) => {
                "You do not have permission to access this resource.".to_string()
            }
            ApiError::NotFound(_) => "The requested resource was not found.".to_string(),
            ApiError::Validation { detail, fields } => {
                if !fields.is_empty() {
                    fields
                        .iter()
                        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
                        .collect::<Vec<_>>()
                        .join("\n")
                } else if let Some(detail) = detail {
                    detail.clone()
                } else {
                    "Invalid data submitted. Please check your inputs.".to_string()
                }
            }
            ApiError::ServerError(_) => {
                "The server encountered an error. Please try again later.".to_string()
            }
            ApiError::RateLimited => "Too many requests. Please wait before retrying.".to_string(),
            ApiError::NetworkError(_) => {
                "Network error. Please check your internet connection.".to_string()
            }
            ApiError::InvalidResponse(msg) => format!("Error: {}", msg),
        }
    }
}
