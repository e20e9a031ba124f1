use crate::wire::HealthRes;

/// Simple health service shared by every binary that serves HTTP.
///
/// This service provides a standardised way to check that the clinic backend is up.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance.
    ///
    /// # Returns
    /// A `HealthRes` indicating the service is healthy.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Clinic is alive".into(),
        }
    }

    /// Reply for the `/ping` liveness probe.
    pub fn pong() -> &'static str {
        "pong"
    }
}
