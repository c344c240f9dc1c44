use thiserror::Error;

/// Transport-level failures from the remote records API.
///
/// None of these ever touch the local cache; a failed fetch leaves the
/// last synced data in place.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies carried in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Classify a non-2xx response by status code.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(body),
            status @ 500..=599 => ApiError::ServerError { status, body },
            other => ApiError::InvalidResponse(format!("Status {}: {}", other, body)),
        }
    }
}

/// Truncate a response body so errors stay loggable.
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let cut = body
        .char_indices()
        .take_while(|(i, _)| *i <= MAX_ERROR_BODY_LENGTH)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
}

// ============================================================================
// Tests
// ============================================================================
