//! Pure decisions of the engagement loop: quota, pacing, destination checks.

use outreach_core::config::TimingConfig;
use outreach_core::EngagementSettings;
use outreach_storage::EngagementStats;
use rand::Rng;
use std::time::Duration;

/// Reason used when the worker itself detects the daily limit.
pub const QUOTA_REASON: &str = "daily limit reached";

/// Whether another candidate may be processed today.
///
/// A non-positive limit disables the quota. Otherwise both counters (taken as
/// zero when they belong to another day) must be strictly below the limit.
pub fn quota_allows(stats: &EngagementStats, daily_limit: i64, today: &str) -> bool {
    if daily_limit <= 0 {
        return true;
    }
    let (posts, comments) = stats.effective_for(today);
    i64::from(posts) < daily_limit && i64::from(comments) < daily_limit
}

/// Completion reasons that mean "stop for today" rather than "next candidate".
pub fn is_quota_reason(reason: &str) -> bool {
    let normalized: String = reason
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    normalized.starts_with("quota") || normalized.contains("daily_limit")
}

/// Uniform delay in `[min_delay, max_delay]` with millisecond granularity.
/// Inverted bounds are swapped.
pub fn next_delay<R: Rng + ?Sized>(settings: &EngagementSettings, rng: &mut R) -> Duration {
    let a = settings.min_delay().as_millis() as u64;
    let b = settings.max_delay().as_millis() as u64;
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Duration::from_millis(rng.gen_range(lo..=hi))
}

/// Whether the reached address is the intended one, allowing redirects that
/// only append to it (query strings, fragments, sub-paths). The append must
/// start at a boundary, so `/in/c1` does not match `/in/c10`.
pub fn destination_matches(reached: &str, intended: &str) -> bool {
    let intended = intended.trim().trim_end_matches('/');
    if intended.is_empty() {
        return false;
    }
    match reached.trim().strip_prefix(intended) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Fixed timings of the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    pub agent_timeout: Duration,
    pub quota_cooldown: Duration,
    pub resume_settle: Duration,
    pub resync_interval: Duration,
    pub keepalive_interval: Duration,
}

impl From<&TimingConfig> for Pacing {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            agent_timeout: timing.agent_timeout(),
            quota_cooldown: timing.quota_cooldown(),
            resume_settle: timing.resume_settle(),
            resync_interval: timing.resync_interval(),
            keepalive_interval: timing.keepalive_interval(),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stats(posts: u32, comments: u32, date: &str) -> EngagementStats {
        EngagementStats {
            posts_engaged_today: posts,
            comments_posted_today: comments,
            last_reset_date: Some(date.to_string()),
        }
    }

    #[test]
    fn test_quota_disabled_when_limit_not_positive() {
        let s = stats(500, 500, "2026-10-15");
        assert!(quota_allows(&s, 0, "2026-10-15"));
        assert!(quota_allows(&s, -1, "2026-10-15"));
    }

    #[test]
    fn test_quota_checks_both_counters() {
        assert!(quota_allows(&stats(4, 4, "2026-10-15"), 5, "2026-10-15"));
        assert!(!quota_allows(&stats(5, 0, "2026-10-15"), 5, "2026-10-15"));
        assert!(!quota_allows(&stats(0, 5, "2026-10-15"), 5, "2026-10-15"));
    }

    #[test]
    fn test_quota_ignores_counters_from_other_days() {
        assert!(quota_allows(&stats(9, 9, "2026-10-14"), 5, "2026-10-15"));
        assert!(quota_allows(&EngagementStats::default(), 1, "2026-10-15"));
    }

    #[test]
    fn test_quota_reason_detection() {
        assert!(is_quota_reason(QUOTA_REASON));
        assert!(is_quota_reason("Daily-Limit"));
        assert!(is_quota_reason("quota_exceeded"));
        assert!(!is_quota_reason("engaged"));
        assert!(!is_quota_reason("agent timeout"));
    }

    #[test]
    fn test_next_delay_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let settings = EngagementSettings {
            min_delay_secs: 10,
            max_delay_secs: 20,
            daily_limit: 0,
        };
        for _ in 0..200 {
            let d = next_delay(&settings, &mut rng);
            assert!(d >= Duration::from_secs(10) && d <= Duration::from_secs(20));
        }

        let inverted = EngagementSettings {
            min_delay_secs: 30,
            max_delay_secs: 5,
            daily_limit: 0,
        };
        let d = next_delay(&inverted, &mut rng);
        assert!(d >= Duration::from_secs(5) && d <= Duration::from_secs(30));

        let fixed = EngagementSettings {
            min_delay_secs: 3,
            max_delay_secs: 3,
            daily_limit: 0,
        };
        assert_eq!(next_delay(&fixed, &mut rng), Duration::from_secs(3));
    }

    #[test]
    fn test_destination_prefix_match() {
        let intended = "https://www.linkedin.com/in/jane/";
        assert!(destination_matches("https://www.linkedin.com/in/jane/", intended));
        assert!(destination_matches("https://www.linkedin.com/in/jane?trk=x", intended));
        assert!(destination_matches(
            "https://www.linkedin.com/in/jane/recent-activity/",
            intended
        ));
        assert!(!destination_matches("https://www.linkedin.com/login", intended));
        assert!(!destination_matches("https://www.linkedin.com/in/jane", ""));

        let c1 = "https://www.linkedin.com/in/c1/";
        assert!(!destination_matches("https://www.linkedin.com/in/c10/", c1));
        assert!(!destination_matches("https://www.linkedin.com/in/c1-other", c1));
        assert!(destination_matches("https://www.linkedin.com/in/c1", c1));
        assert!(destination_matches("https://www.linkedin.com/in/c1#about", c1));
    }
}
