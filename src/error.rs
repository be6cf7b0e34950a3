use actix_web::http::StatusCode;
use actix_web::HttpResponse;

// ============================================================================
// Sidecar Error Taxonomy
// ============================================================================
//
// Propagation policy:
// - Signature/Validation reject the request before any side effect (400).
// - NotFound short-circuits as "nothing to do" where duplicate or
//   out-of-order webhook delivery is expected, and as a 404 where the caller
//   asked about a specific record.
// - Delivery/Fulfillment are caught per-step inside multi-step flows so one
//   failing downstream call does not prevent the others from attempting.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("print fulfillment failed: {0}")]
    Fulfillment(String),

    #[error("webhook signature rejected: {0}")]
    Signature(String),

    #[error("record store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, SidecarError>;

impl From<sqlx::Error> for SidecarError {
    fn from(err: sqlx::Error) -> Self {
        SidecarError::Store(err.to_string())
    }
}

impl actix_web::ResponseError for SidecarError {
    fn status_code(&self) -> StatusCode {
        match self {
            SidecarError::Validation(_) | SidecarError::Signature(_) => StatusCode::BAD_REQUEST,
            SidecarError::NotFound(_) => StatusCode::NOT_FOUND,
            SidecarError::Configuration(_)
            | SidecarError::Delivery(_)
            | SidecarError::Fulfillment(_)
            | SidecarError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SidecarError::Validation("missing email".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SidecarError::Signature("bad digest".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SidecarError::NotFound("order".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SidecarError::Fulfillment("vendor 503".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = SidecarError::NotFound("order".into());
        assert_eq!(err.to_string(), "order not found");
    }
}
