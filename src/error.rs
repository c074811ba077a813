use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type Result<T, E = BundleError> = std::result::Result<T, E>;

/// Closed taxonomy of bundle errors, mirrored both ways against HTTP status codes:
/// `status_code()` encodes outbound, `from_status` decodes a remote response.
#[derive(thiserror::Error, displaydoc::Display)]
pub enum BundleError {
    /// no bundle with id `{0}` on this node
    NotFound(String),
    /// bundle `{0}` is not modifiable in its current state
    NotCompleted(String),
    /// bundle state could not be read: {0}
    Unreadable(anyhow::Error),
    /// bundle `{0}` already exists
    AlreadyExists(String),
    /// storage failure creating or writing bundle `{0}`: {1}
    InsufficientStorage(String, anyhow::Error),
    /// unexpected response (status {status}): {excerpt}
    Transport { status: u16, excerpt: String },
}

impl std::fmt::Debug for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl BundleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotCompleted(_) => StatusCode::NOT_MODIFIED,
            Self::Unreadable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::InsufficientStorage(..) => StatusCode::INSUFFICIENT_STORAGE,
            Self::Transport { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }

    /// Decode a response's status code (and up to the first 100 bytes of its body) into the
    /// taxonomy, for the typed client's inbound path.
    pub fn from_status(id: &str, status: StatusCode, body: &str) -> Option<Self> {
        match status {
            StatusCode::OK => None,
            StatusCode::NOT_FOUND => Some(Self::NotFound(id.to_string())),
            StatusCode::NOT_MODIFIED => Some(Self::NotCompleted(id.to_string())),
            StatusCode::CONFLICT => Some(Self::AlreadyExists(id.to_string())),
            StatusCode::INTERNAL_SERVER_ERROR => {
                Some(Self::Unreadable(anyhow::anyhow!("{}", excerpt(body))))
            }
            other => Some(Self::Transport {
                status: other.as_u16(),
                excerpt: excerpt(body),
            }),
        }
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= 100 {
        body.to_string()
    } else {
        body[..100].to_string()
    }
}

#[derive(Serialize)]
struct ErrorPayload {
    code: u16,
    error: String,
}

impl IntoResponse for BundleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let payload = ErrorPayload {
            code: status.as_u16(),
            error: self.to_string(),
        };
        tracing::error!(error = ?self, status = %status, "bundle request failed");
        (status, Json(payload)).into_response()
    }
}

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    write!(f, "{e}")?;
    let mut current = e.source();
    while let Some(cause) = current {
        write!(f, "\n\tCaused by: {cause}")?;
        current = cause.source();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(250);
        assert_eq!(excerpt(&long).len(), 100);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn from_status_round_trips_known_codes() {
        assert!(matches!(
            BundleError::from_status("b0", StatusCode::NOT_FOUND, ""),
            Some(BundleError::NotFound(_))
        ));
        assert!(matches!(
            BundleError::from_status("b0", StatusCode::NOT_MODIFIED, ""),
            Some(BundleError::NotCompleted(_))
        ));
        assert!(matches!(
            BundleError::from_status("b0", StatusCode::CONFLICT, ""),
            Some(BundleError::AlreadyExists(_))
        ));
        assert!(BundleError::from_status("b0", StatusCode::OK, "").is_none());
    }

    #[test]
    fn from_status_folds_other_codes_into_transport() {
        let err = BundleError::from_status("b0", StatusCode::BAD_GATEWAY, "upstream down")
            .expect("non-ok status yields an error");
        match err {
            BundleError::Transport { status, excerpt } => {
                assert_eq!(status, 502);
                assert_eq!(excerpt, "upstream down");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }
}
