//! Request extractors whose rejections use the same JSON error body as every other failure.

use crate::error::ApiError;
use axum::extract::{FromRequest, FromRequestParts};

/// [`axum::Json`] with malformed or incomplete bodies reported as [`ApiError::Rejected`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// [`axum::extract::Path`] with unparsable segments reported as [`ApiError::Rejected`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);
