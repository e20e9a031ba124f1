//! Authorization gate.
//!
//! Every gated request runs this linear pipeline before any handler:
//!
//! 1. extract the bearer token and verify it (failure: 401)
//! 2. resolve the verified identity to a principal (failure: 500)
//! 3. attach the principal to the request
//! 4. enforce `(role, path, method)` (error: 500, deny: 403)
//!
//! Any failure ends the request. There are no retries.

use crate::error::ApiError;
use crate::state::AppState;
use api_shared::{bearer_token, AuthError, VerifiedIdentity};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use clinic_core::{Identity, Principal};

/// The authenticated principal for the current request. Set once by the gate.
#[derive(Clone, Debug)]
pub struct RequestPrincipal(pub Principal);

pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = match req.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| AuthError::MalformedHeader)?),
    };
    let token = bearer_token(header)?.to_owned();

    let identity = verify(&state, token).await?;

    let principal = state
        .blocking(move |clinic| clinic.principals.resolve(&identity))
        .await
        .map_err(|e| {
            ApiError::internal("Failed to process user", e.to_string(), state.environment)
        })?;

    let path = req.uri().path().to_owned();
    let method = req.method().as_str().to_owned();
    match state.enforcer.enforce(principal.role, &path, &method) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(user_id = principal.id, role = %principal.role, %path, %method, "policy denied request");
            return Err(ApiError::denied(principal.role, &path, &method));
        }
        Err(err) => {
            return Err(ApiError::internal(
                "Error occurred when authorizing user",
                format!("{err} (role {})", principal.role),
                state.environment,
            ));
        }
    }

    req.extensions_mut().insert(RequestPrincipal(principal));
    Ok(next.run(req).await)
}

async fn verify(state: &AppState, token: String) -> Result<Identity, AuthError> {
    let verifier = state.verifier.clone();
    let task = tokio::task::spawn_blocking(move || verifier.verify(&token));
    let verified = match tokio::time::timeout(state.identity_timeout, task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join)) => return Err(AuthError::InvalidToken(format!("verifier failed: {join}"))),
        Err(_) => return Err(AuthError::Timeout),
    };
    Ok(into_identity(verified))
}

fn into_identity(verified: VerifiedIdentity) -> Identity {
    Identity {
        email: verified.email,
        subject: verified.subject,
        name: verified.name,
        picture: verified.picture,
    }
}
