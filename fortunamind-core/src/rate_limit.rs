// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tier-based sliding-window rate limiting.
//!
//! Counts are exact over the trailing window, not a calendar bucket: each
//! user keeps a time-ordered set of event timestamps per window, pruned
//! lazily on access. Check-and-record happens under one per-user lock so
//! the hour, day and month windows move together or not at all.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::identity::UserHandle;
use crate::tiers::{Tier, UNLIMITED};

const MINUTE_SECS: u64 = 60;
const HOUR_SECS: u64 = 3_600;
const DAY_SECS: u64 = 86_400;
const MONTH_SECS: u64 = 30 * DAY_SECS;

/// The limiter's backing store could not be reached. The in-process
/// implementation never produces this; the adapter applies the
/// fail-closed-on-write / fail-open-on-read policy when it appears.
#[derive(Debug, Error)]
#[error("rate limiter backing store unavailable: {0}")]
pub struct RateLimitUnavailable(pub String);

/// Outcome of a check-and-record call.
#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the earliest event of the tightest breached window
    /// leaves that window. Only set on rejection.
    pub retry_after_secs: Option<u64>,
    /// Requests left in the smallest metered window after this call.
    pub remaining: Option<i64>,
}

impl RateDecision {
    fn allow(remaining: Option<i64>) -> Self {
        Self {
            allowed: true,
            retry_after_secs: None,
            remaining,
        }
    }

    fn reject(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: Some(retry_after_secs),
            remaining: Some(0),
        }
    }
}

/// Current usage per window, for the stats tool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RateUsage {
    pub hour: usize,
    pub day: usize,
    pub month: usize,
}

struct Window {
    width_secs: u64,
    events: VecDeque<u64>,
}

impl Window {
    fn new(width_secs: u64) -> Self {
        Self {
            width_secs,
            events: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.width_secs);
        while matches!(self.events.front(), Some(&t) if t < cutoff) {
            self.events.pop_front();
        }
    }

    fn count(&mut self, now: u64) -> usize {
        self.prune(now);
        self.events.len()
    }

    /// Seconds until the oldest recorded event exits the window.
    fn retry_after(&self, now: u64) -> u64 {
        match self.events.front() {
            Some(&oldest) => (oldest + self.width_secs).saturating_sub(now).max(1),
            None => 1,
        }
    }
}

struct UserWindows {
    minute: Window,
    hour: Window,
    day: Window,
    month: Window,
}

impl UserWindows {
    fn new() -> Self {
        Self {
            minute: Window::new(MINUTE_SECS),
            hour: Window::new(HOUR_SECS),
            day: Window::new(DAY_SECS),
            month: Window::new(MONTH_SECS),
        }
    }

    fn is_idle(&mut self, now: u64) -> bool {
        self.month.count(now) == 0
    }
}

/// Per-user sliding-window rate limiter.
///
/// Striped by user handle: concurrent calls for different users never
/// contend, concurrent calls for the same user serialize on that user's
/// lock and cannot double-count.
pub struct RateLimiter {
    stripes: DashMap<UserHandle, Arc<Mutex<UserWindows>>>,
    /// Optional global floor applied to every metered tier on a one-minute
    /// sub-window.
    per_minute_floor: Option<u32>,
}

impl RateLimiter {
    pub fn new(per_minute_floor: Option<u32>) -> Self {
        Self {
            stripes: DashMap::new(),
            per_minute_floor,
        }
    }

    /// Check every window for the tier and, if all pass, record the event
    /// in all of them atomically.
    pub fn check_and_record(
        &self,
        handle: &UserHandle,
        tier: Tier,
    ) -> Result<RateDecision, RateLimitUnavailable> {
        self.check_and_record_at(handle, tier, unix_now())
    }

    fn check_and_record_at(
        &self,
        handle: &UserHandle,
        tier: Tier,
        now: u64,
    ) -> Result<RateDecision, RateLimitUnavailable> {
        let limits = tier.limits();
        if limits.is_unmetered() && self.per_minute_floor.is_none() {
            return Ok(RateDecision::allow(None));
        }

        let stripe = self
            .stripes
            .entry(handle.clone())
            .or_insert_with(|| Arc::new(Mutex::new(UserWindows::new())))
            .value()
            .clone();
        let mut guard = stripe.lock();
        let windows = &mut *guard;

        // (limit, window) pairs ordered shortest first, so a multi-window
        // breach reports the most immediate retry hint.
        let floor = self.per_minute_floor.map(i64::from).unwrap_or(UNLIMITED);
        let mut checks = [
            (floor, &mut windows.minute),
            (limits.per_hour, &mut windows.hour),
            (limits.per_day, &mut windows.day),
            (limits.per_month, &mut windows.month),
        ];

        let mut remaining: Option<i64> = None;
        for (limit, window) in checks.iter_mut() {
            if *limit == UNLIMITED {
                continue;
            }
            let count = window.count(now) as i64;
            if count >= *limit {
                let retry_after = window.retry_after(now);
                warn!(
                    user = %handle_prefix(handle),
                    tier = %tier,
                    window_secs = window.width_secs,
                    retry_after,
                    "rate limit exceeded"
                );
                return Ok(RateDecision::reject(retry_after));
            }
            if remaining.is_none() {
                // Smallest metered window; minus one for the event being
                // recorded now.
                remaining = Some(*limit - count - 1);
            }
        }

        for (_, window) in checks.iter_mut() {
            window.events.push_back(now);
        }
        Ok(RateDecision::allow(remaining))
    }

    /// Current usage snapshot without recording anything.
    pub fn usage(&self, handle: &UserHandle) -> RateUsage {
        self.usage_at(handle, unix_now())
    }

    fn usage_at(&self, handle: &UserHandle, now: u64) -> RateUsage {
        match self.stripes.get(handle) {
            Some(stripe) => {
                let mut windows = stripe.lock();
                RateUsage {
                    hour: windows.hour.count(now),
                    day: windows.day.count(now),
                    month: windows.month.count(now),
                }
            }
            None => RateUsage::default(),
        }
    }

    /// Drop stripes whose newest event has left the largest window.
    pub fn prune_idle(&self) {
        let now = unix_now();
        self.stripes
            .retain(|_, stripe| !stripe.lock().is_idle(now));
    }

    /// Number of users currently tracked, for diagnostics.
    pub fn tracked_users(&self) -> usize {
        self.stripes.len()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn handle_prefix(handle: &UserHandle) -> &str {
    &handle.as_str()[..handle.as_str().len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn handle(email: &str) -> UserHandle {
        Identity::default().derive_handle(email).unwrap()
    }

    #[test]
    fn first_n_allowed_then_rejected_with_retry_hint() {
        let limiter = RateLimiter::new(None);
        let user = handle("free@example.com");
        let per_hour = Tier::Free.limits().per_hour;

        let base = 1_700_000_000;
        for i in 0..per_hour {
            let decision = limiter
                .check_and_record_at(&user, Tier::Free, base)
                .unwrap();
            assert!(decision.allowed, "call {i} should pass");
        }
        let decision = limiter
            .check_and_record_at(&user, Tier::Free, base)
            .unwrap();
        assert!(!decision.allowed);
        let retry = decision.retry_after_secs.unwrap();
        assert!(retry > 0 && retry <= HOUR_SECS);
    }

    #[test]
    fn rejection_does_not_consume_quota() {
        let limiter = RateLimiter::new(Some(2));
        let user = handle("probe@example.com");
        let base = 1_700_000_000;

        assert!(limiter.check_and_record_at(&user, Tier::Premium, base).unwrap().allowed);
        assert!(limiter.check_and_record_at(&user, Tier::Premium, base).unwrap().allowed);
        for _ in 0..5 {
            assert!(!limiter.check_and_record_at(&user, Tier::Premium, base).unwrap().allowed);
        }
        // The five rejected calls recorded nothing: both minute events
        // expire and quota is whole again.
        assert!(limiter
            .check_and_record_at(&user, Tier::Premium, base + MINUTE_SECS + 1)
            .unwrap()
            .allowed);
    }

    #[test]
    fn windows_slide_rather_than_reset() {
        let limiter = RateLimiter::new(Some(2));
        let user = handle("slide@example.com");
        let base = 1_700_000_000;

        assert!(limiter.check_and_record_at(&user, Tier::Premium, base).unwrap().allowed);
        assert!(limiter
            .check_and_record_at(&user, Tier::Premium, base + 30)
            .unwrap()
            .allowed);
        // t+45: both events still inside the trailing minute.
        assert!(!limiter
            .check_and_record_at(&user, Tier::Premium, base + 45)
            .unwrap()
            .allowed);
        // t+61: the first event has left the window.
        assert!(limiter
            .check_and_record_at(&user, Tier::Premium, base + 61)
            .unwrap()
            .allowed);
    }

    #[test]
    fn users_do_not_share_quota() {
        let limiter = RateLimiter::new(Some(1));
        let base = 1_700_000_000;
        let alice = handle("alice@example.com");
        let bob = handle("bob@example.com");

        assert!(limiter.check_and_record_at(&alice, Tier::Free, base).unwrap().allowed);
        assert!(!limiter.check_and_record_at(&alice, Tier::Free, base).unwrap().allowed);
        assert!(limiter.check_and_record_at(&bob, Tier::Free, base).unwrap().allowed);
    }

    #[test]
    fn unmetered_tier_skips_tracking() {
        let limiter = RateLimiter::new(None);
        let user = handle("enterprise@example.com");
        for _ in 0..10_000 {
            assert!(limiter
                .check_and_record(&user, Tier::Enterprise)
                .unwrap()
                .allowed);
        }
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn floor_applies_to_unmetered_tier_when_configured() {
        let limiter = RateLimiter::new(Some(3));
        let user = handle("enterprise@example.com");
        let base = 1_700_000_000;
        for _ in 0..3 {
            assert!(limiter
                .check_and_record_at(&user, Tier::Enterprise, base)
                .unwrap()
                .allowed);
        }
        assert!(!limiter
            .check_and_record_at(&user, Tier::Enterprise, base)
            .unwrap()
            .allowed);
    }

    #[test]
    fn all_windows_record_together() {
        let limiter = RateLimiter::new(None);
        let user = handle("atomic@example.com");
        let base = 1_700_000_000;
        for _ in 0..3 {
            limiter.check_and_record_at(&user, Tier::Free, base).unwrap();
        }
        let usage = limiter.usage_at(&user, base);
        assert_eq!(usage.hour, 3);
        assert_eq!(usage.day, 3);
        assert_eq!(usage.month, 3);
    }

    #[test]
    fn remaining_counts_down_in_smallest_window() {
        let limiter = RateLimiter::new(None);
        let user = handle("remaining@example.com");
        let base = 1_700_000_000;
        let first = limiter.check_and_record_at(&user, Tier::Free, base).unwrap();
        assert_eq!(first.remaining, Some(Tier::Free.limits().per_hour - 1));
        let second = limiter.check_and_record_at(&user, Tier::Free, base).unwrap();
        assert_eq!(second.remaining, Some(Tier::Free.limits().per_hour - 2));
    }

    #[test]
    fn idle_users_are_pruned() {
        let limiter = RateLimiter::new(None);
        let user = handle("sleepy@example.com");
        let long_ago = 1_000_000_000;
        limiter
            .check_and_record_at(&user, Tier::Free, long_ago)
            .unwrap();
        assert_eq!(limiter.tracked_users(), 1);
        limiter.prune_idle();
        assert_eq!(limiter.tracked_users(), 0);
    }
}
