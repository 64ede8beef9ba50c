use crate::dto::HealthRes;

/// Health check shared by every API surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Regulação API is alive".into(),
        }
    }
}
