mod error_kind;

use actix_web::{http::StatusCode, HttpResponse, HttpResponseBuilder, ResponseError};
use anyhow::anyhow;
use serde_json::json;
use std::fmt::{Debug, Display, Formatter};

pub use error_kind::ErrorKind;

/// Application-specific error type. Validator rejections (401/409/429/403/400) are built as
/// plain `HttpResponse`s directly in the ingress pipeline and never go through this type -
/// `Error` is reserved for genuinely unexpected failures and for the small set of structured
/// errors the agent-facing tools (scheduling, deletion) return.
#[derive(thiserror::Error)]
pub struct Error {
    pub root_cause: anyhow::Error,
    kind: ErrorKind,
}

impl Error {
    /// Creates a Client error instance with the given message.
    pub fn client<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Self {
            root_cause: anyhow!(message),
            kind: ErrorKind::ClientError,
        }
    }

    /// Creates a permission-denied error instance.
    pub fn permission_denied<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Self {
            root_cause: anyhow!(message),
            kind: ErrorKind::PermissionDenied,
        }
    }

    /// Creates a not-found error instance.
    pub fn not_found<M>(message: M) -> Self
    where
        M: Display + Debug + Send + Sync + 'static,
    {
        Self {
            root_cause: anyhow!(message),
            kind: ErrorKind::NotFound,
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.root_cause, f)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.root_cause, f)
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::ClientError => StatusCode::BAD_REQUEST,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self.kind {
            ErrorKind::Unknown => "Internal Server Error".to_string(),
            _ => self.root_cause.to_string(),
        };
        HttpResponseBuilder::new(self.status_code()).json(json!({
            "status": "error",
            "message": message,
        }))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Error {
        err.downcast::<Error>().unwrap_or_else(|root_cause| Error {
            root_cause,
            kind: ErrorKind::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};
    use actix_web::{http::StatusCode, ResponseError};
    use anyhow::anyhow;

    #[test]
    fn can_create_client_errors() {
        let error = Error::client("Uh oh.");
        assert_eq!(error.kind(), ErrorKind::ClientError);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn can_create_permission_denied_errors() {
        let error = Error::permission_denied("Permission denied");
        assert_eq!(error.kind(), ErrorKind::PermissionDenied);
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn can_create_unknown_errors() {
        let error = Error::from(anyhow!("Something sensitive"));
        assert_eq!(error.kind(), ErrorKind::Unknown);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn can_recover_original_error() {
        let client_error = Error::client_with_root_cause_for_test(anyhow!("One"));
        let error = Error::from(anyhow!(client_error).context("Four"));
        assert_eq!(error.kind(), ErrorKind::ClientError);
    }

    impl Error {
        fn client_with_root_cause_for_test(root_cause: anyhow::Error) -> Self {
            Self {
                root_cause,
                kind: ErrorKind::ClientError,
            }
        }
    }
}
