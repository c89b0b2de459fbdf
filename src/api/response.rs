// src/api/response.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{ControlError, ControlResult};

/// JSON envelope shared by every control route.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Handler outcome: either a payload or the control error that stopped it.
pub enum ApiResult<T: Serialize> {
    Ok(T),
    Failed(ControlError),
}

impl<T: Serialize> From<ControlResult<T>> for ApiResult<T> {
    fn from(result: ControlResult<T>) -> Self {
        match result {
            Ok(data) => ApiResult::Ok(data),
            Err(e) => ApiResult::Failed(e),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResult<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResult::Ok(data) => Json(Envelope {
                success: true,
                data: Some(data),
                error: None,
            })
            .into_response(),
            ApiResult::Failed(e) => {
                let body = Envelope::<T> {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                };
                (status_code(&e), Json(body)).into_response()
            }
        }
    }
}

fn status_code(error: &ControlError) -> StatusCode {
    match error {
        ControlError::InvalidBounds { .. }
        | ControlError::InvalidBatch(_)
        | ControlError::InvalidWorkerName(_) => StatusCode::BAD_REQUEST,
        ControlError::DispatchInProgress => StatusCode::CONFLICT,
        ControlError::DispatchProtocol(_) => StatusCode::BAD_GATEWAY,
        ControlError::OrchestratorUnavailable(_)
        | ControlError::ScaleFailed(_)
        | ControlError::DispatchTransport(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(result: ControlResult<u32>) -> StatusCode {
        ApiResult::from(result).into_response().status()
    }

    #[test]
    fn test_error_kinds_map_to_status_codes() {
        assert_eq!(status(Ok(1)), StatusCode::OK);
        assert_eq!(
            status(Err(ControlError::InvalidBounds { min: 0, max: 1 })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(Err(ControlError::DispatchInProgress)), StatusCode::CONFLICT);
        assert_eq!(
            status(Err(ControlError::DispatchProtocol("no result for a.png".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(Err(ControlError::ScaleFailed("release not found".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
