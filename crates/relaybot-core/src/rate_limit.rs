use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::{config::Config, domain::UserId};

/// Admission policy: sliding window, escalating cooldowns, spam keywords.
#[derive(Clone, Debug)]
pub struct RateLimitPolicy {
    pub rate_limit: u32,
    pub window: Duration,
    pub cooldown_table: Vec<Duration>,
    /// Lower-cased keywords, matched as substrings.
    pub spam_keywords: Vec<String>,
}

impl RateLimitPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            rate_limit: cfg.rate_limit,
            window: cfg.time_window,
            cooldown_table: cfg.cooldown_table.clone(),
            spam_keywords: cfg.spam_keywords.clone(),
        }
    }
}

/// When a rate-limited sender may try again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockedUntil {
    At(DateTime<Utc>),
    Permanent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RejectSpamKeyword { keyword: String },
    RejectRateLimited { blocked_until: BlockedUntil },
}

#[derive(Clone, Debug, Default)]
struct RateState {
    window: VecDeque<DateTime<Utc>>,
    warning_count: u32,
    blocked_until: Option<DateTime<Utc>>,
}

/// Read-only view of one sender's rate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateStatus {
    pub in_window: usize,
    pub warning_count: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Per-sender sliding-window limiter with an escalating cooldown state machine.
///
/// `warning_count` only grows. Once it reaches the cooldown table length the
/// sender is rejected for good.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    states: HashMap<UserId, RateState>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            states: HashMap::new(),
        }
    }

    pub fn admit(&mut self, user_id: UserId, text: &str, now: DateTime<Utc>) -> Decision {
        if let Some(keyword) = self.spam_keyword(text) {
            return Decision::RejectSpamKeyword { keyword };
        }

        let table_len = self.policy.cooldown_table.len() as u32;
        let window = chrono_duration(self.policy.window);
        let state = self.states.entry(user_id).or_default();

        if state.warning_count >= table_len {
            return Decision::RejectRateLimited {
                blocked_until: BlockedUntil::Permanent,
            };
        }

        if let Some(until) = state.blocked_until {
            if now < until {
                return Decision::RejectRateLimited {
                    blocked_until: BlockedUntil::At(until),
                };
            }
        }

        let horizon = sub(now, window);
        while state.window.front().is_some_and(|ts| *ts <= horizon) {
            state.window.pop_front();
        }

        if state.window.len() >= self.policy.rate_limit as usize {
            state.warning_count += 1;
            let last = self.policy.cooldown_table.len() - 1;
            let idx = (state.warning_count as usize - 1).min(last);
            let until = add(now, chrono_duration(self.policy.cooldown_table[idx]));
            state.blocked_until = Some(until);

            let blocked_until = if state.warning_count >= table_len {
                BlockedUntil::Permanent
            } else {
                BlockedUntil::At(until)
            };
            return Decision::RejectRateLimited { blocked_until };
        }

        state.window.push_back(now);
        Decision::Allow
    }

    pub fn status(&self, user_id: UserId) -> RateStatus {
        match self.states.get(&user_id) {
            Some(s) => RateStatus {
                in_window: s.window.len(),
                warning_count: s.warning_count,
                blocked_until: s.blocked_until,
            },
            None => RateStatus {
                in_window: 0,
                warning_count: 0,
                blocked_until: None,
            },
        }
    }

    /// Drop states that carry no penalty and whose window has been quiet for `idle`.
    ///
    /// States with warnings are kept so the count never goes back down.
    pub fn evict_idle(&mut self, now: DateTime<Utc>, idle: Duration) -> usize {
        let horizon = sub(now, chrono_duration(idle.max(self.policy.window)));
        let before = self.states.len();
        self.states.retain(|_, s| {
            s.warning_count > 0 || s.window.back().is_some_and(|ts| *ts > horizon)
        });
        before - self.states.len()
    }

    pub fn tracked_senders(&self) -> usize {
        self.states.len()
    }

    fn spam_keyword(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        let lower = text.to_lowercase();
        self.policy
            .spam_keywords
            .iter()
            .find(|kw| !kw.is_empty() && lower.contains(kw.as_str()))
            .cloned()
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn add(t: DateTime<Utc>, d: chrono::Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn sub(t: DateTime<Utc>, d: chrono::Duration) -> DateTime<Utc> {
    t.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> RateLimitPolicy {
        RateLimitPolicy {
            rate_limit: 5,
            window: Duration::from_secs(60),
            cooldown_table: vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900),
            ],
            spam_keywords: vec!["casino".to_string(), "free money".to_string()],
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn sixth_message_in_window_is_rejected_with_first_cooldown() {
        let mut rl = RateLimiter::new(policy());
        let u = UserId(222);
        let start = t0();

        for i in 0..5 {
            assert_eq!(rl.admit(u, "hi", start + secs(i * 2)), Decision::Allow);
        }
        let now = start + secs(10);
        assert_eq!(
            rl.admit(u, "hi", now),
            Decision::RejectRateLimited {
                blocked_until: BlockedUntil::At(now + secs(60))
            }
        );
        assert_eq!(rl.status(u).warning_count, 1);
    }

    #[test]
    fn blocked_sender_stays_blocked_until_cooldown_ends() {
        let mut rl = RateLimiter::new(policy());
        let u = UserId(1);
        let start = t0();
        for _ in 0..5 {
            rl.admit(u, "x", start);
        }
        rl.admit(u, "x", start);

        let until = start + secs(60);
        assert_eq!(
            rl.admit(u, "x", start + secs(30)),
            Decision::RejectRateLimited {
                blocked_until: BlockedUntil::At(until)
            }
        );
        // Rejections while blocked do not add warnings.
        assert_eq!(rl.status(u).warning_count, 1);

        // After the cooldown the old window has expired too.
        assert_eq!(rl.admit(u, "x", start + secs(61)), Decision::Allow);
    }

    #[test]
    fn cooldowns_escalate_and_end_in_permanent_block() {
        let mut rl = RateLimiter::new(policy());
        let u = UserId(7);
        let mut now = t0();
        let expected = [60, 300];

        for cooldown in expected {
            for _ in 0..5 {
                assert_eq!(rl.admit(u, "x", now), Decision::Allow);
            }
            assert_eq!(
                rl.admit(u, "x", now),
                Decision::RejectRateLimited {
                    blocked_until: BlockedUntil::At(now + secs(cooldown))
                }
            );
            now = now + secs(cooldown + 61);
        }

        for _ in 0..5 {
            assert_eq!(rl.admit(u, "x", now), Decision::Allow);
        }
        assert_eq!(
            rl.admit(u, "x", now),
            Decision::RejectRateLimited {
                blocked_until: BlockedUntil::Permanent
            }
        );
        assert_eq!(rl.status(u).warning_count, 3);

        // Terminal: no amount of waiting lifts it.
        let much_later = now + secs(365 * 24 * 3600);
        assert_eq!(
            rl.admit(u, "x", much_later),
            Decision::RejectRateLimited {
                blocked_until: BlockedUntil::Permanent
            }
        );
        assert_eq!(rl.status(u).warning_count, 3);
    }

    #[test]
    fn cooldown_index_is_clamped_for_single_entry_table() {
        let mut p = policy();
        p.cooldown_table = vec![Duration::from_secs(60)];
        p.rate_limit = 1;
        let mut rl = RateLimiter::new(p);
        let u = UserId(3);
        let now = t0();

        assert_eq!(rl.admit(u, "x", now), Decision::Allow);
        assert_eq!(
            rl.admit(u, "x", now),
            Decision::RejectRateLimited {
                blocked_until: BlockedUntil::Permanent
            }
        );
        assert_eq!(rl.status(u).blocked_until, Some(now + secs(60)));
    }

    #[test]
    fn spam_keywords_never_consume_window_slots() {
        let mut rl = RateLimiter::new(policy());
        let u = UserId(9);
        let now = t0();

        for _ in 0..5 {
            assert_eq!(
                rl.admit(u, "Visit the CASINO now", now),
                Decision::RejectSpamKeyword {
                    keyword: "casino".to_string()
                }
            );
        }
        assert_eq!(rl.status(u).in_window, 0);
        assert_eq!(rl.admit(u, "a clean message", now), Decision::Allow);
    }

    #[test]
    fn senders_are_independent() {
        let mut rl = RateLimiter::new(policy());
        let now = t0();
        for _ in 0..6 {
            rl.admit(UserId(1), "x", now);
        }
        assert_eq!(rl.admit(UserId(2), "x", now), Decision::Allow);
        assert_eq!(rl.status(UserId(2)).warning_count, 0);
    }

    #[test]
    fn window_slides() {
        let mut rl = RateLimiter::new(policy());
        let u = UserId(5);
        let start = t0();
        for i in 0..5 {
            assert_eq!(rl.admit(u, "x", start + secs(i)), Decision::Allow);
        }
        // The first entry (t+0) falls out of the window at t+60.
        assert_eq!(rl.admit(u, "x", start + secs(60)), Decision::Allow);
        assert_eq!(rl.status(u).in_window, 5);
    }

    #[test]
    fn eviction_keeps_penalized_senders() {
        let mut rl = RateLimiter::new(policy());
        let now = t0();
        rl.admit(UserId(1), "x", now);
        for _ in 0..6 {
            rl.admit(UserId(2), "x", now);
        }

        let evicted = rl.evict_idle(now + secs(7200), Duration::from_secs(3600));
        assert_eq!(evicted, 1);
        assert_eq!(rl.tracked_senders(), 1);
        assert_eq!(rl.status(UserId(2)).warning_count, 1);
    }
}
