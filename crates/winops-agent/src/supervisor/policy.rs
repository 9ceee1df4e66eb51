//! Crash-restart budget.
//!
//! The first restart inside the window is immediate. Each further restart
//! waits twice as long as the previous one, up to a ceiling. Once more than
//! `limit` restarts would fall inside the window the supervisor gives up.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use winops_config::Config;

/// Tunables for the restart budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub limit: u32,
    pub window: Duration,
    pub backoff: Duration,
    pub backoff_max: Duration,
}

impl RestartPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.restart_limit(),
            window: config.restart_window(),
            backoff: config.restart_backoff(),
            backoff_max: config.restart_backoff_max(),
        }
    }

    fn delay_for(&self, restarts_in_window: usize) -> Duration {
        if restarts_in_window <= 1 {
            return Duration::ZERO;
        }
        let doublings = u32::try_from(restarts_in_window - 2).unwrap_or(u32::MAX);
        let factor = 2_u32.checked_pow(doublings).unwrap_or(u32::MAX);
        self.backoff
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// What the supervisor should do about a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Immediate,
    After(Duration),
    GiveUp { restarts: usize },
}

/// Sliding-window record of recent restarts.
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    history: VecDeque<Instant>,
}

impl RestartTracker {
    #[must_use]
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            history: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &RestartPolicy {
        &self.policy
    }

    /// Restarts currently counted against the window.
    #[must_use]
    pub fn restarts_in_window(&self) -> usize {
        self.history.len()
    }

    /// Records a restart attempt at `now` and decides how to proceed.
    pub fn record(&mut self, now: Instant) -> RestartDecision {
        while let Some(oldest) = self.history.front() {
            if now.saturating_duration_since(*oldest) >= self.policy.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
        let limit = usize::try_from(self.policy.limit).unwrap_or(usize::MAX);
        if self.history.len() >= limit {
            return RestartDecision::GiveUp {
                restarts: self.history.len(),
            };
        }
        self.history.push_back(now);
        let delay = self.policy.delay_for(self.history.len());
        if delay.is_zero() {
            RestartDecision::Immediate
        } else {
            RestartDecision::After(delay)
        }
    }
}
