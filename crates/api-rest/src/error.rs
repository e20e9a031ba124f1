//! Mapping of core and authentication failures onto HTTP responses.

use api_shared::wire::ErrorRes;
use api_shared::AuthError;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clinic_core::{ClinicError, Environment, Role};

/// Generic message carried by every 5xx response that did not name its own context.
pub const INTERNAL_ERROR: &str = "Internal error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{source}")]
    Clinic {
        source: ClinicError,
        expose_detail: bool,
    },
    /// Request body or path that the extractor could not read.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{context}: {detail}")]
    Internal {
        context: &'static str,
        detail: String,
        expose_detail: bool,
    },
}

impl ApiError {
    /// Clean policy deny, naming what was denied.
    pub fn denied(role: Role, path: &str, method: &str) -> Self {
        Self::Forbidden(format!(
            "Forbidden: role '{role}' does not have access to {path} [{method}]"
        ))
    }

    pub fn clinic(source: ClinicError, environment: Environment) -> Self {
        Self::Clinic {
            source,
            expose_detail: environment.exposes_error_detail(),
        }
    }

    pub fn internal(context: &'static str, detail: impl Into<String>, environment: Environment) -> Self {
        Self::Internal {
            context,
            detail: detail.into(),
            expose_detail: environment.exposes_error_detail(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Clinic { source, .. } => clinic_status(source),
            Self::Rejected { status, .. } => *status,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

fn clinic_status(err: &ClinicError) -> StatusCode {
    match err {
        ClinicError::NotFound { .. } => StatusCode::NOT_FOUND,
        ClinicError::InvalidDate(_) | ClinicError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ClinicError::InvalidTransition { .. }
        | ClinicError::InvalidPrescriptionTransition { .. }
        | ClinicError::SlotTaken { .. } => StatusCode::CONFLICT,
        ClinicError::StoreFailure(_)
        | ClinicError::StoreTimeout(_)
        | ClinicError::StorePoisoned
        | ClinicError::StoreCancelled
        | ClinicError::StoreInterrupted(_)
        | ClinicError::CorruptRow { .. }
        | ClinicError::PolicyEvalError(_)
        | ClinicError::PartialWriteFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Unauthenticated(err) => ErrorRes {
                error: err.to_string(),
                details: None,
            },
            Self::Forbidden(message) | Self::Rejected { message, .. } => ErrorRes {
                error: message,
                details: None,
            },
            Self::Clinic {
                source,
                expose_detail,
            } => {
                if status.is_server_error() {
                    tracing::error!(error = ?source, "request failed: {source}");
                    ErrorRes {
                        error: INTERNAL_ERROR.to_owned(),
                        details: expose_detail.then(|| source.to_string()),
                    }
                } else {
                    ErrorRes {
                        error: source.to_string(),
                        details: None,
                    }
                }
            }
            Self::Internal {
                context,
                detail,
                expose_detail,
            } => {
                tracing::error!("{context}: {detail}");
                ErrorRes {
                    error: context.to_owned(),
                    details: expose_detail.then_some(detail),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::AppointmentStatus;

    #[test]
    fn clinic_errors_map_to_statuses() {
        let env = Environment::Development;
        let cases = [
            (ClinicError::InvalidDate("x".into()), StatusCode::BAD_REQUEST),
            (
                ClinicError::NotFound {
                    entity: "appointment",
                    id: 1,
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ClinicError::InvalidTransition {
                    from: AppointmentStatus::Completed,
                    to: AppointmentStatus::Cancelled,
                },
                StatusCode::CONFLICT,
            ),
            (
                ClinicError::PolicyEvalError("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ClinicError::StoreTimeout(std::time::Duration::from_millis(5)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::clinic(err, env).status(), status);
        }
    }

    #[test]
    fn forbidden_message_names_role_path_and_method() {
        let err = ApiError::denied(Role::Patient, "/api/v1/users", "GET");
        assert_eq!(
            err.to_string(),
            "Forbidden: role 'patient' does not have access to /api/v1/users [GET]"
        );
    }

    #[test]
    fn rejections_keep_their_status() {
        let err = ApiError::Rejected {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "missing field `doctor_id`".into(),
        };
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "missing field `doctor_id`");
    }

    #[test]
    fn production_hides_internal_detail() {
        let err = ApiError::internal("Failed to process user", "disk on fire", Environment::Production);
        assert!(matches!(
            err,
            ApiError::Internal {
                expose_detail: false,
                ..
            }
        ));
    }
}
