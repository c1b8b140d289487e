use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, warn};
use serde::Serialize;

use crate::error::WalletError;

/// [`WalletError`] at the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub WalletError);

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(e) => match std::error::Error::source(&e) {
                Some(source) => format!("invalid request body: {}", source),
                None => "invalid request body".to_string(),
            },
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON".to_string(),
            JsonRejection::MissingJsonContentType(_) => {
                "expected `Content-Type: application/json`".to_string()
            },
            _ => "request body could not be read".to_string(),
        };
        ApiError(WalletError::validation("body", message))
    }
}

/// JSON request body whose rejections answer with the [`ErrorResponse`] envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            WalletError::Validation { .. } => StatusCode::BAD_REQUEST,
            WalletError::Unauthorized => StatusCode::UNAUTHORIZED,
            WalletError::NotFound(_) => StatusCode::NOT_FOUND,
            WalletError::UpstreamRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::Configuration(_) | WalletError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            WalletError::Configuration(_) | WalletError::Storage(_) => error!("{}", self.0),
            WalletError::UpstreamUnavailable { .. } => warn!("{}", self.0),
            _ => {},
        }

        let field = match &self.0 {
            WalletError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        // Driver and pool text stays in the log.
        let message = match &self.0 {
            WalletError::Storage(_) => "storage unavailable".to_string(),
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.0.code(),
                message,
                field,
            },
        });

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
