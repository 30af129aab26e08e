use std::time::Duration;

/// Validated runtime settings shared by the stores and handlers.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub soa_primary: String, // "ns1.example.net."
    pub soa_contact: String, // "hostmaster.example.net."
    /// TTL applied when a record is written with ttl 0.
    pub default_ttl: u32,
    pub token_ttl: Duration,
    /// Clock skew tolerated when checking token expiry.
    pub token_leeway: Duration,
    /// Reject InitZone when another account already owns the zone name.
    pub exclusive_zone_names: bool,
    pub retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            soa_primary: "ns1.localhost.".into(),
            soa_contact: "hostmaster.localhost.".into(),
            default_ttl: DEFAULT_RECORD_TTL,
            token_ttl: Duration::from_secs(60 * 60),
            token_leeway: Duration::from_secs(30),
            exclusive_zone_names: false,
            retry: RetryPolicy::default(),
        }
    }
}

pub const DEFAULT_RECORD_TTL: u32 = 3600;

/// Bounded retry for transactions aborted by a concurrent writer.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(10);
        self.base_delay.saturating_mul(1 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    }
}
