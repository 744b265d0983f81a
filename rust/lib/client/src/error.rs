use std::collections::BTreeMap;

use serde_json::Value;

use crate::storage::StorageError;

/// Field name → messages, as returned by the backend for rejected input.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Keys that carry a human-readable message rather than a field error.
const MESSAGE_KEYS: &[&str] = &["detail", "message", "error", "errors"];

/// Client-side API error.
///
/// Produced once at the HTTP boundary; callers match on the variant,
/// never on the response body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rejected input (4xx other than 401/403/404).
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("validation failed"))]
    Validation {
        status: u16,
        fields: FieldErrors,
        message: Option<String>,
    },

    /// 401 that survived the refresh-and-retry cycle.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Token refresh failed; the local session has been cleared.
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

impl ApiError {
    /// Map a non-success response to an error.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let message = match parsed.as_ref() {
            Some(value) => root_message(value).unwrap_or_default(),
            None => body.trim().to_string(),
        };

        match status {
            401 => ApiError::Unauthorized(or_default(message, "authentication required")),
            403 => ApiError::PermissionDenied(or_default(message, "forbidden")),
            404 => ApiError::NotFound(or_default(message, "not found")),
            400..=499 => {
                let fields = parsed.as_ref().map(field_errors).unwrap_or_default();
                let message = Some(message).filter(|m| !m.is_empty());
                if status == 400 && mentions_tenant(message.as_deref(), &fields) {
                    tracing::warn!(
                        status,
                        detail = message.as_deref().unwrap_or(""),
                        "request rejected for missing organization context"
                    );
                }
                ApiError::Validation {
                    status,
                    fields,
                    message,
                }
            }
            _ => ApiError::Server {
                status,
                message: or_default(message, "server error"),
            },
        }
    }

    /// HTTP status behind this error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Validation { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::Unauthorized(_) => Some(401),
            ApiError::PermissionDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Per-field messages of a validation error.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

fn or_default(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// First string found under a message key of the root object.
fn root_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    MESSAGE_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Field errors live under `errors` when it is an object, otherwise at
/// the root. Non-message scalars (`"error": true`) are skipped.
fn field_errors(body: &Value) -> FieldErrors {
    let source = match body.get("errors") {
        Some(Value::Object(errors)) => errors,
        _ => match body.as_object() {
            Some(root) => root,
            None => return FieldErrors::new(),
        },
    };

    let mut fields = FieldErrors::new();
    for (key, value) in source {
        if MESSAGE_KEYS.contains(&key.as_str()) {
            continue;
        }
        let messages: Vec<String> = match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Value::Object(_) => vec![value.to_string()],
            _ => continue,
        };
        if !messages.is_empty() {
            fields.insert(key.clone(), messages);
        }
    }
    fields
}

fn mentions_tenant(message: Option<&str>, fields: &FieldErrors) -> bool {
    let hit = |s: &str| s.to_ascii_lowercase().contains("org");
    message.is_some_and(hit) || fields.keys().any(|k| hit(k.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_nested_under_errors() {
        let body = r#"{"error": true, "errors": {"email": ["Enter a valid email address."], "phone": "Invalid"}}"#;
        let err = ApiError::from_response(400, body);
        let fields = err.field_errors().unwrap();
        assert_eq!(fields["email"], vec!["Enter a valid email address.".to_string()]);
        assert_eq!(fields["phone"], vec!["Invalid".to_string()]);
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "HTTP 400: validation failed");
    }

    #[test]
    fn validation_errors_at_root() {
        let body = r#"{"title": ["This field is required."], "detail": "Bad request"}"#;
        let err = ApiError::from_response(422, body);
        match err {
            ApiError::Validation { status, fields, message } => {
                assert_eq!(status, 422);
                assert_eq!(fields.len(), 1);
                assert_eq!(fields["title"], vec!["This field is required.".to_string()]);
                assert_eq!(message.as_deref(), Some("Bad request"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(ApiError::from_response(401, ""), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::from_response(403, "{}"), ApiError::PermissionDenied(_)));
        assert!(ApiError::from_response(404, r#"{"detail": "Not found."}"#).is_not_found());
        assert!(matches!(ApiError::from_response(409, "{}"), ApiError::Validation { status: 409, .. }));
        assert!(matches!(ApiError::from_response(502, "bad gateway"), ApiError::Server { status: 502, .. }));
    }

    #[test]
    fn not_found_keeps_backend_message() {
        let err = ApiError::from_response(404, r#"{"detail": "Not found."}"#);
        assert_eq!(err.to_string(), "not found: Not found.");
    }

    #[test]
    fn plain_text_body_becomes_message() {
        let err = ApiError::from_response(500, "  upstream crashed \n");
        assert_eq!(err.to_string(), "HTTP 500: upstream crashed");
    }

    #[test]
    fn tenant_error_is_still_validation() {
        let err = ApiError::from_response(400, r#"{"error": "missing org_id in token"}"#);
        match err {
            ApiError::Validation { fields, message, .. } => {
                assert!(fields.is_empty());
                assert_eq!(message.as_deref(), Some("missing org_id in token"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn non_object_body_has_no_fields() {
        let err = ApiError::from_response(400, r#"["oops"]"#);
        assert!(err.field_errors().unwrap().is_empty());
    }
}
