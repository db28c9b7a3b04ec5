use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(3600),
        }
    }
}

/// Sliding-window request counter keyed by user id.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    windows: HashMap<i64, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            windows: HashMap::new(),
        }
    }

    pub fn check(&mut self, user_id: i64) -> bool {
        self.check_at(user_id, Instant::now())
    }

    /// Records a request at `now` if the user still has budget in the window.
    /// Rejected requests are not recorded.
    pub fn check_at(&mut self, user_id: i64, now: Instant) -> bool {
        let window = self.settings.window;
        // Users whose whole window has lapsed are forgotten.
        self.windows.retain(|_, requests| {
            requests
                .back()
                .is_some_and(|latest| now.saturating_duration_since(*latest) < window)
        });

        let requests = self.windows.entry(user_id).or_default();
        while requests
            .front()
            .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
        {
            requests.pop_front();
        }

        if requests.len() >= self.settings.max_requests {
            warn!("Rate limit exceeded for user {user_id}");
            return false;
        }

        requests.push_back(now);
        true
    }

    pub fn remaining(&self, user_id: i64) -> usize {
        self.remaining_at(user_id, Instant::now())
    }

    pub fn remaining_at(&self, user_id: i64, now: Instant) -> usize {
        let live = self.live_requests(user_id, now).count();
        self.settings.max_requests.saturating_sub(live)
    }

    pub fn reset_time(&self, user_id: i64) -> Option<Instant> {
        self.reset_time_at(user_id, Instant::now())
    }

    /// When the oldest request still inside the window drops out of it.
    pub fn reset_time_at(&self, user_id: i64, now: Instant) -> Option<Instant> {
        self.live_requests(user_id, now)
            .min()
            .map(|oldest| oldest + self.settings.window)
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.windows.len()
    }

    fn live_requests(&self, user_id: i64, now: Instant) -> impl Iterator<Item = Instant> + '_ {
        let window = self.settings.window;
        self.windows
            .get(&user_id)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |at| now.saturating_duration_since(*at) < window)
    }
}
