use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Fixed-window request limiter keyed by client IP.
pub struct RateLimiter {
    /// Map from IP to (window_start, requests_in_window)
    windows: DashMap<IpAddr, (Instant, u32)>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Limiter for position fix ingress.
    pub fn for_fixes(per_second: u32) -> Self {
        Self::new(per_second, Duration::from_secs(1))
    }

    /// Returns Ok(()) if allowed, Err(remaining_wait_time) if rate limited.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut entry = self.windows.entry(ip).or_insert((now, 0));
        let (window_start, count) = entry.value_mut();

        let elapsed = now.saturating_duration_since(*window_start);
        if elapsed >= self.window {
            *window_start = now;
            *count = 1;
            return Ok(());
        }

        if *count >= self.max_requests {
            return Err(self.window - elapsed);
        }

        *count += 1;
        Ok(())
    }

    /// Drop windows that ended long enough ago to be irrelevant.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let horizon = self.window * 2;
        self.windows
            .retain(|_, (window_start, _)| now.saturating_duration_since(*window_start) < horizon);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_allows_under_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let now = Instant::now();

        assert!(limiter.check_at(ip(1), now).is_ok());
        assert!(limiter.check_at(ip(1), now).is_ok());
        assert!(limiter.check_at(ip(1), now).is_ok());
    }

    #[test]
    fn test_blocks_over_limit_with_wait() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let now = Instant::now();

        assert!(limiter.check_at(ip(1), now).is_ok());
        assert!(limiter.check_at(ip(1), now).is_ok());

        let wait = limiter
            .check_at(ip(1), now + Duration::from_millis(400))
            .unwrap_err();
        assert_eq!(wait, Duration::from_millis(600));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        let now = Instant::now();

        assert!(limiter.check_at(ip(1), now).is_ok());
        assert!(limiter.check_at(ip(1), now).is_err());
        assert!(limiter.check_at(ip(1), now + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_different_ips_independent() {
        let limiter = RateLimiter::for_fixes(1);
        let now = Instant::now();

        assert!(limiter.check_at(ip(1), now).is_ok());
        assert!(limiter.check_at(ip(2), now).is_ok());
        assert!(limiter.check_at(ip(1), now).is_err());
        assert!(limiter.check_at(ip(2), now).is_err());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_cleanup_keeps_recent_clients() {
        let limiter = RateLimiter::for_fixes(5);
        limiter.check(ip(1)).unwrap();

        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
