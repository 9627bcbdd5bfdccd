use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Turns a caller-supplied timeout into the duration actually enforced.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutResolver {
    default: Duration,
}

impl TimeoutResolver {
    pub fn new(default: Duration) -> Self {
        Self { default }
    }

    /// Zero or negative means "use the default"; this never fails.
    pub fn resolve(&self, requested_seconds: i64) -> Duration {
        if requested_seconds <= 0 {
            self.default
        } else {
            Duration::from_secs(requested_seconds as u64)
        }
    }

    pub fn default_duration(&self) -> Duration {
        self.default
    }
}

impl Default for TimeoutResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_uses_default() {
        let resolver = TimeoutResolver::default();
        let default = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        assert_eq!(resolver.resolve(0), default);
        assert_eq!(resolver.resolve(-1), default);
        assert_eq!(resolver.resolve(i64::MIN), default);
    }

    #[test]
    fn test_positive_is_exact() {
        let resolver = TimeoutResolver::new(Duration::from_secs(7));
        assert_eq!(resolver.resolve(1), Duration::from_secs(1));
        assert_eq!(resolver.resolve(120), Duration::from_secs(120));
        assert_eq!(resolver.default_duration(), Duration::from_secs(7));
    }
}
