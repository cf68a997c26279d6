use crate::dto::HealthRes;
use chrono::{SecondsFormat, Utc};

/// Simple health service used by both HTTP APIs
///
/// Reports liveness and the server's current time.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Creates a new instance of HealthService.
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance
    ///
    /// # Returns
    /// A `HealthRes` with status `ok` and an RFC 3339 timestamp.
    pub fn check_health() -> HealthRes {
        HealthRes {
            status: "ok".into(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_reports_ok_with_parseable_time() {
        let res = HealthService::check_health();
        assert_eq!(res.status, "ok");
        assert!(chrono::DateTime::parse_from_rfc3339(&res.time).is_ok());
    }
}
