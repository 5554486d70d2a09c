use corral_core::{CoordinatorError, LaunchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// JSON body of every non-2xx response.
///
/// Exactly one of `coordinator` / `launch` carries the typed error when the
/// failure came from the collaborator behind the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchError>,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Coordinator(e) => match e {
                CoordinatorError::UnknownJob(_) | CoordinatorError::UnknownContainer(_) => 404,
                CoordinatorError::AlreadyRegistered(_)
                | CoordinatorError::NotRegistered(_)
                | CoordinatorError::Unregistered(_) => 409,
                CoordinatorError::JobTerminated { .. } => 410,
                CoordinatorError::InvalidCapability(_) => 422,
                CoordinatorError::Rejected(_) => 400,
                CoordinatorError::Unavailable(_) => 503,
                CoordinatorError::Timeout(_) => 504,
                CoordinatorError::Protocol(_) => 500,
            },
            ApiError::Launch(_) => 422,
            ApiError::InvalidRequest(_) => 400,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
            coordinator: match self {
                ApiError::Coordinator(e) => Some(e.clone()),
                _ => None,
            },
            launch: match self {
                ApiError::Launch(e) => Some(e.clone()),
                _ => None,
            },
        }
    }
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self.body())).into_response()
    }
}
