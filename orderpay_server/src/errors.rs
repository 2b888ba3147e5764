use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use orderpay_engine::traits::LifecycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Lifecycle(e) => lifecycle_status(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::Lifecycle(LifecycleError::DatabaseError(e)) => {
                error!("🗃️ Database error while handling a request. {e}");
                "An internal error occurred. Please try again later.".to_string()
            },
            Self::IOError(_) | Self::Unspecified(_) => {
                error!("💻️ {self}");
                "An internal error occurred. Please try again later.".to_string()
            },
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "success": false, "error": message }).to_string())
    }
}

fn lifecycle_status(e: &LifecycleError) -> StatusCode {
    match e {
        LifecycleError::ValidationError(_) => StatusCode::BAD_REQUEST,
        LifecycleError::InvalidTransition(_) => StatusCode::CONFLICT,
        LifecycleError::VersionConflict { .. } => StatusCode::CONFLICT,
        LifecycleError::RefundExceedsCapturedAmount { .. } => StatusCode::CONFLICT,
        LifecycleError::DuplicateEvent(_) => StatusCode::CONFLICT,
        LifecycleError::SignatureVerificationError => StatusCode::UNAUTHORIZED,
        LifecycleError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::AuthorizationNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::RefundNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LifecycleError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        LifecycleError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
