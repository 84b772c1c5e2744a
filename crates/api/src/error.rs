use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use matchcast_models::MatchcastError;
use tracing::error;

use crate::routes::ApiResponse;

#[derive(Debug)]
pub enum ApiError {
    Pipeline(MatchcastError),
    Unauthorized,
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(err) => match err {
                MatchcastError::InvalidDate(_)
                | MatchcastError::InvalidRange(_)
                | MatchcastError::ConfirmationRequired(_) => StatusCode::BAD_REQUEST,
                MatchcastError::MissingCredentials(_) => StatusCode::UNAUTHORIZED,
                MatchcastError::FixtureFetch(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Pipeline(err) => err.to_string(),
            ApiError::Unauthorized => "Missing or invalid bearer token".to_string(),
            ApiError::Internal(message) => message.clone(),
        }
    }
}

impl From<MatchcastError> for ApiError {
    fn from(err: MatchcastError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<prometheus::Error> for ApiError {
    fn from(err: prometheus::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(%status, "request failed: {}", message);
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (MatchcastError::InvalidDate("x".into()), StatusCode::BAD_REQUEST),
            (MatchcastError::InvalidRange("x".into()), StatusCode::BAD_REQUEST),
            (MatchcastError::ConfirmationRequired("x".into()), StatusCode::BAD_REQUEST),
            (MatchcastError::MissingCredentials("x".into()), StatusCode::UNAUTHORIZED),
            (MatchcastError::FixtureFetch("x".into()), StatusCode::BAD_GATEWAY),
            (MatchcastError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
