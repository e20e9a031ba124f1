//! # API Shared
//!
//! Shared utilities and definitions for the clinic APIs.
//!
//! Contains:
//! - Identity verification for bearer credentials (`auth`)
//! - JSON wire types with OpenAPI schemas (`wire`)
//! - Shared services like `HealthService`
//!
//! Used by `api-rest` and the operator CLI.

pub mod auth;
pub mod health;
pub mod wire;

pub use auth::{
    bearer_token, AuthError, DevTokenIssuer, Es256Verifier, IdentityVerifier, IssuerConfig,
    TokenClaims, VerifiedIdentity,
};
pub use health::HealthService;
