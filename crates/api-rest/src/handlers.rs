//! REST handlers. Every `/api/v1` handler runs behind the authorization gate and reads the
//! caller from [`RequestPrincipal`].

use crate::convert;
use crate::error::ApiError;
use crate::extract::{AppJson, AppPath};
use crate::gate::RequestPrincipal;
use crate::state::AppState;
use api_shared::wire::{
    AppointmentRes, BookAppointmentReq, CompleteAppointmentReq, CompleteAppointmentRes,
    ConsultationRes, DepartmentReq, DepartmentRes, DoctorRes, ErrorRes, HealthRes, HistoryRes, PatientRes,
    PrescriptionRes, ProfileRes, SetRoleReq, UpdatePrescriptionReq, UserRes,
};
use api_shared::HealthService;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;
use clinic_core::{
    Appointment, ClinicError, MedicationOrder, Principal, PrescriptionStatus, Role,
};

fn parse_input<T>(raw: &str, state: &AppState) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = ClinicError>,
{
    raw.parse::<T>()
        .map_err(|e| ApiError::clinic(e, state.environment))
}

// ============================================================================
// PUBLIC
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used by monitoring and load balancer health checks. Not gated.
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/ping",
    responses((status = 200, description = "Liveness probe", body = String))
)]
pub async fn ping() -> &'static str {
    HealthService::pong()
}

// ============================================================================
// PRINCIPALS
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "The authenticated principal", body = ProfileRes),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorRes)
    )
)]
/// Echoes the request-scoped principal set by the gate.
#[axum::debug_handler]
pub async fn profile(
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
) -> Json<ProfileRes> {
    Json(convert::profile(&principal))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "All principals", body = [UserRes]),
        (status = 403, description = "Caller lacks access", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserRes>>, ApiError> {
    let users = state.store(|clinic| clinic.users.list_users()).await?;
    Ok(Json(users.iter().map(convert::user).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "One principal", body = UserRes),
        (status = 404, description = "User not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<UserRes>, ApiError> {
    let user = state.store(move |clinic| clinic.users.find_user(id)).await?;
    Ok(Json(convert::user(&user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/role",
    params(("id" = i64, Path, description = "User id")),
    request_body = SetRoleReq,
    responses(
        (status = 200, description = "Role changed and profile synchronised", body = UserRes),
        (status = 400, description = "Unknown role", body = ErrorRes),
        (status = 404, description = "User or department not found", body = ErrorRes)
    )
)]
/// Changes a user's role.
///
/// Granting the doctor role creates or updates the doctor profile; granting the patient
/// role creates an empty patient profile when none exists.
#[axum::debug_handler]
pub async fn set_role(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<SetRoleReq>,
) -> Result<Json<UserRes>, ApiError> {
    let role: Role = parse_input(&req.role, &state)?;
    let user = state
        .store(move |clinic| {
            clinic
                .users
                .set_role(id, role, req.department_id, req.specialization)
        })
        .await?;
    Ok(Json(convert::user(&user)))
}

// ============================================================================
// CATALOGUE
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/departments",
    responses((status = 200, description = "Live departments", body = [DepartmentRes]))
)]
#[axum::debug_handler]
pub async fn list_departments(
    State(state): State<AppState>,
) -> Result<Json<Vec<DepartmentRes>>, ApiError> {
    let departments = state.store(|clinic| clinic.catalog.departments()).await?;
    Ok(Json(departments.into_iter().map(convert::department).collect()))
}

#[utoipa::path(
    post,
    path = "/api/v1/departments",
    request_body = DepartmentReq,
    responses(
        (status = 201, description = "Department created", body = DepartmentRes),
        (status = 400, description = "Missing or duplicate name", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn create_department(
    State(state): State<AppState>,
    AppJson(req): AppJson<DepartmentReq>,
) -> Result<(StatusCode, Json<DepartmentRes>), ApiError> {
    let department = state
        .store(move |clinic| clinic.catalog.create_department(&req.name, &req.description))
        .await?;
    Ok((StatusCode::CREATED, Json(convert::department(department))))
}

#[utoipa::path(
    put,
    path = "/api/v1/departments/{id}",
    params(("id" = i64, Path, description = "Department id")),
    request_body = DepartmentReq,
    responses(
        (status = 200, description = "Department updated", body = DepartmentRes),
        (status = 404, description = "Department not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn update_department(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<DepartmentReq>,
) -> Result<Json<DepartmentRes>, ApiError> {
    let department = state
        .store(move |clinic| {
            clinic
                .catalog
                .update_department(id, &req.name, &req.description)
        })
        .await?;
    Ok(Json(convert::department(department)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/departments/{id}",
    params(("id" = i64, Path, description = "Department id")),
    responses(
        (status = 204, description = "Department deleted"),
        (status = 404, description = "Department not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn delete_department(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .store(move |clinic| clinic.catalog.delete_department(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/doctors",
    responses((status = 200, description = "Doctors with department detail", body = [DoctorRes]))
)]
#[axum::debug_handler]
pub async fn list_doctors(State(state): State<AppState>) -> Result<Json<Vec<DoctorRes>>, ApiError> {
    let doctors = state.store(|clinic| clinic.catalog.doctors()).await?;
    Ok(Json(doctors.into_iter().map(convert::doctor).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients",
    responses((status = 200, description = "Users currently holding the patient role", body = [PatientRes]))
)]
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
) -> Result<Json<Vec<PatientRes>>, ApiError> {
    let patients = state.store(|clinic| clinic.catalog.patients()).await?;
    Ok(Json(patients.into_iter().map(convert::patient).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "One patient", body = PatientRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<PatientRes>, ApiError> {
    let patient = state.store(move |clinic| clinic.catalog.patient(id)).await?;
    Ok(Json(convert::patient(patient)))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/history",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Appointments and prescriptions, newest first", body = HistoryRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn patient_history(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<HistoryRes>, ApiError> {
    let history = state.store(move |clinic| clinic.lifecycle.history(id)).await?;
    Ok(Json(convert::history(history)))
}

// ============================================================================
// APPOINTMENTS
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/appointments",
    responses((status = 200, description = "Appointments visible to the caller, newest first", body = [AppointmentRes]))
)]
#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
) -> Result<Json<Vec<AppointmentRes>>, ApiError> {
    let appointments = state
        .store(move |clinic| clinic.lifecycle.list_for(&principal))
        .await?;
    Ok(Json(
        appointments
            .into_iter()
            .map(convert::appointment_detail)
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/appointments",
    request_body = BookAppointmentReq,
    responses(
        (status = 201, description = "Appointment booked", body = AppointmentRes),
        (status = 400, description = "Unparsable appointment date", body = ErrorRes),
        (status = 404, description = "Doctor or patient not found", body = ErrorRes),
        (status = 409, description = "Doctor already booked at that time", body = ErrorRes)
    )
)]
/// Books an appointment for the caller, or for any patient when the caller is an admin.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppState>,
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
    AppJson(req): AppJson<BookAppointmentReq>,
) -> Result<(StatusCode, Json<AppointmentRes>), ApiError> {
    let patient_id = req.patient_id.unwrap_or(principal.id);
    if patient_id != principal.id && principal.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "Forbidden: only admins may book for another patient".into(),
        ));
    }
    let appointment = state
        .store(move |clinic| {
            clinic
                .lifecycle
                .book(patient_id, req.doctor_id, &req.appointment_date)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(convert::appointment(&appointment))))
}

/// Admins may act on any appointment; others only on appointments they take part in.
fn ensure_participant(
    principal: &Principal,
    appointment: &Appointment,
    as_doctor_only: bool,
) -> Result<(), ApiError> {
    let allowed = match principal.role {
        Role::Admin => true,
        _ if as_doctor_only => appointment.doctor_id == principal.id,
        _ => appointment.doctor_id == principal.id || appointment.patient_id == principal.id,
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Forbidden: appointment {} does not belong to you",
            appointment.id
        )))
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/appointments/{id}/complete",
    params(("id" = i64, Path, description = "Appointment id")),
    request_body = CompleteAppointmentReq,
    responses(
        (status = 200, description = "Appointment completed with consultation and prescriptions", body = CompleteAppointmentRes),
        (status = 404, description = "Appointment not found", body = ErrorRes),
        (status = 409, description = "Appointment is not scheduled", body = ErrorRes),
        (status = 500, description = "Completion rolled back", body = ErrorRes)
    )
)]
/// Completes an appointment as the attending doctor.
///
/// The status change, the consultation and every prescription are written together; on any
/// failure none of them persist and the appointment stays scheduled.
#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppState>,
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<CompleteAppointmentReq>,
) -> Result<Json<CompleteAppointmentRes>, ApiError> {
    let appointment = state.store(move |clinic| clinic.lifecycle.find(id)).await?;
    ensure_participant(&principal, &appointment, true)?;

    let medications: Vec<MedicationOrder> = req
        .medications
        .into_iter()
        .map(|m| MedicationOrder {
            medication: m.medication,
            dosage: m.dosage,
        })
        .collect();
    let completed = state
        .store(move |clinic| {
            clinic
                .lifecycle
                .complete(id, &req.diagnosis, &req.notes, &medications)
        })
        .await?;
    Ok(Json(convert::completed(completed)))
}

#[utoipa::path(
    get,
    path = "/api/v1/appointments/{id}/consultation",
    params(("id" = i64, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Consultation and prescriptions of a completed appointment", body = ConsultationRes),
        (status = 404, description = "Appointment or consultation not found", body = ErrorRes)
    )
)]
/// Reads the consultation of an appointment the caller takes part in.
#[axum::debug_handler]
pub async fn get_consultation(
    State(state): State<AppState>,
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ConsultationRes>, ApiError> {
    let appointment = state.store(move |clinic| clinic.lifecycle.find(id)).await?;
    ensure_participant(&principal, &appointment, false)?;
    let (consultation, prescriptions) = state
        .store(move |clinic| clinic.lifecycle.consultation(id))
        .await?;
    Ok(Json(convert::consultation(consultation, &prescriptions)))
}

#[utoipa::path(
    put,
    path = "/api/v1/appointments/{id}/cancel",
    params(("id" = i64, Path, description = "Appointment id")),
    responses(
        (status = 200, description = "Appointment cancelled", body = AppointmentRes),
        (status = 404, description = "Appointment not found", body = ErrorRes),
        (status = 409, description = "Appointment is not scheduled", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<AppointmentRes>, ApiError> {
    let appointment = state.store(move |clinic| clinic.lifecycle.find(id)).await?;
    ensure_participant(&principal, &appointment, false)?;
    let cancelled = state.store(move |clinic| clinic.lifecycle.cancel(id)).await?;
    Ok(Json(convert::appointment(&cancelled)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/appointments/{id}",
    params(("id" = i64, Path, description = "Appointment id")),
    responses(
        (status = 204, description = "Appointment deleted"),
        (status = 404, description = "Appointment not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.store(move |clinic| clinic.lifecycle.delete(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// PRESCRIPTIONS
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/prescriptions",
    responses((status = 200, description = "Prescriptions visible to the caller, newest first", body = [PrescriptionRes]))
)]
#[axum::debug_handler]
pub async fn list_prescriptions(
    State(state): State<AppState>,
    Extension(RequestPrincipal(principal)): Extension<RequestPrincipal>,
) -> Result<Json<Vec<PrescriptionRes>>, ApiError> {
    let prescriptions = state
        .store(move |clinic| clinic.lifecycle.prescriptions_for(&principal))
        .await?;
    Ok(Json(
        prescriptions
            .into_iter()
            .map(convert::prescription_detail)
            .collect(),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/prescriptions/{id}",
    params(("id" = i64, Path, description = "Prescription id")),
    request_body = UpdatePrescriptionReq,
    responses(
        (status = 200, description = "Prescription status updated", body = PrescriptionRes),
        (status = 400, description = "Unknown status", body = ErrorRes),
        (status = 409, description = "Status cannot move backwards", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn update_prescription(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdatePrescriptionReq>,
) -> Result<Json<PrescriptionRes>, ApiError> {
    let status: PrescriptionStatus = parse_input(&req.status, &state)?;
    let prescription = state
        .store(move |clinic| clinic.lifecycle.update_prescription_status(id, status))
        .await?;
    Ok(Json(convert::prescription(&prescription)))
}
