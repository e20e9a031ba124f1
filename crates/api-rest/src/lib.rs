//! # API REST
//!
//! REST API for the clinic backend.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - the authorization gate in front of every `/api/v1` route
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status mapping)
//!
//! Uses `api-shared` for wire types and identity verification, and `clinic-core` for every
//! rule about the data.

#![warn(rust_2018_idioms)]

pub mod convert;
pub mod error;
pub mod extract;
pub mod gate;
pub mod handlers;
pub mod logging;
pub mod startup;
pub mod state;

pub use error::ApiError;
pub use gate::RequestPrincipal;
pub use state::AppState;

use api_shared::wire;
use axum::middleware;
use axum::routing::{delete, get, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::ping,
        handlers::profile,
        handlers::list_users,
        handlers::get_user,
        handlers::set_role,
        handlers::list_departments,
        handlers::create_department,
        handlers::update_department,
        handlers::delete_department,
        handlers::list_doctors,
        handlers::list_patients,
        handlers::get_patient,
        handlers::patient_history,
        handlers::list_appointments,
        handlers::book_appointment,
        handlers::complete_appointment,
        handlers::get_consultation,
        handlers::cancel_appointment,
        handlers::delete_appointment,
        handlers::list_prescriptions,
        handlers::update_prescription,
    ),
    components(schemas(
        wire::HealthRes,
        wire::ErrorRes,
        wire::ProfileRes,
        wire::UserRes,
        wire::SetRoleReq,
        wire::DepartmentReq,
        wire::DepartmentRes,
        wire::DoctorRes,
        wire::PatientRes,
        wire::BookAppointmentReq,
        wire::AppointmentRes,
        wire::MedicationReq,
        wire::CompleteAppointmentReq,
        wire::CompleteAppointmentRes,
        wire::ConsultationRes,
        wire::PrescriptionRes,
        wire::UpdatePrescriptionReq,
        wire::HistoryRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full router.
///
/// `/health`, `/ping` and the Swagger UI are public. Every other route sits behind
/// [`gate::authorize`], which is attached as a route layer so unmatched paths still 404
/// without touching the identity issuer.
pub fn app(state: AppState) -> Router {
    let gated = Router::new()
        .route("/api/v1/profile", get(handlers::profile))
        .route("/api/v1/users", get(handlers::list_users))
        .route("/api/v1/users/:id", get(handlers::get_user))
        .route("/api/v1/users/:id/role", put(handlers::set_role))
        .route(
            "/api/v1/departments",
            get(handlers::list_departments).post(handlers::create_department),
        )
        .route(
            "/api/v1/departments/:id",
            put(handlers::update_department).delete(handlers::delete_department),
        )
        .route("/api/v1/doctors", get(handlers::list_doctors))
        .route("/api/v1/patients", get(handlers::list_patients))
        .route("/api/v1/patients/:id", get(handlers::get_patient))
        .route("/api/v1/patients/:id/history", get(handlers::patient_history))
        .route(
            "/api/v1/appointments",
            get(handlers::list_appointments).post(handlers::book_appointment),
        )
        .route(
            "/api/v1/appointments/:id/complete",
            put(handlers::complete_appointment),
        )
        .route(
            "/api/v1/appointments/:id/consultation",
            get(handlers::get_consultation),
        )
        .route(
            "/api/v1/appointments/:id/cancel",
            put(handlers::cancel_appointment),
        )
        .route("/api/v1/appointments/:id", delete(handlers::delete_appointment))
        .route("/api/v1/prescriptions", get(handlers::list_prescriptions))
        .route(
            "/api/v1/prescriptions/:id",
            put(handlers::update_prescription),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::authorize,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ping", get(handlers::ping))
        .merge(gated)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(logging::log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
