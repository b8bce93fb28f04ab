//! Ticket Scheduler (C3): an interval-based gate deciding when each
//! periodic service is due to run.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Status of a scheduled ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Active,
    Expired,
}

/// One outstanding interval for a scheduled section.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub section: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: TicketStatus,
}

/// Gates every periodic service (C6/C8/C9/C10) to its configured
/// interval. One instance is shared across the runtime; `check_ticket`
/// is called once per tick per section.
///
/// The first call for a section only creates the ticket and returns
/// `false` (not due yet); the caller is expected to also honor a
/// bootstrap override on the very first tick regardless of this
/// result, tracked separately via [`Scheduler::is_bootstrap_tick`].
pub struct Scheduler {
    tickets: Mutex<HashMap<String, Ticket>>,
    expired: Mutex<Vec<String>>,
    bootstrapped: Mutex<std::collections::HashSet<String>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
            expired: Mutex::new(Vec::new()),
            bootstrapped: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Whether `section` has never been ticked before. Consumes the
    /// bootstrap flag on first call, so it reports `true` exactly once
    /// per section.
    pub fn is_bootstrap_tick(&self, section: &str) -> bool {
        let mut seen = self.bootstrapped.lock().expect("scheduler lock poisoned");
        seen.insert(section.to_string())
    }

    /// Returns `true` exactly when `section`'s ticket has expired
    /// (i.e. the service is due); otherwise creates the ticket (on
    /// first call) or does nothing (while it is still active) and
    /// returns `false`.
    pub fn check_ticket(&self, section: &str, interval_seconds: Option<i64>, now: DateTime<Utc>) -> bool {
        let mut tickets = self.tickets.lock().expect("scheduler lock poisoned");
        match tickets.get_mut(section) {
            None => {
                if let Some(interval) = interval_seconds {
                    tickets.insert(
                        section.to_string(),
                        Ticket {
                            section: section.to_string(),
                            created_at: now,
                            expires_at: now + chrono::Duration::seconds(interval),
                            status: TicketStatus::Active,
                        },
                    );
                }
                false
            }
            Some(ticket) => {
                if ticket.status == TicketStatus::Active && now >= ticket.expires_at {
                    ticket.status = TicketStatus::Expired;
                    self.expired
                        .lock()
                        .expect("scheduler lock poisoned")
                        .push(section.to_string());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Background sweep (every 10s in the runtime): drop tickets whose
    /// section was recorded expired, so the next `check_ticket` call
    /// recreates them with a fresh interval.
    pub fn sweep(&self) {
        let mut expired = self.expired.lock().expect("scheduler lock poisoned");
        if expired.is_empty() {
            return;
        }
        let mut tickets = self.tickets.lock().expect("scheduler lock poisoned");
        for section in expired.drain(..) {
            tickets.remove(&section);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn first_call_creates_ticket_and_is_not_due() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.check_ticket("point-polling", Some(10), at(0)));
    }

    #[test]
    fn ticket_not_due_before_interval_elapses() {
        let scheduler = Scheduler::new();
        scheduler.check_ticket("point-polling", Some(10), at(0));
        assert!(!scheduler.check_ticket("point-polling", None, at(5)));
    }

    #[test]
    fn ticket_due_once_interval_elapses() {
        let scheduler = Scheduler::new();
        scheduler.check_ticket("point-polling", Some(10), at(0));
        assert!(scheduler.check_ticket("point-polling", None, at(10)));
    }

    #[test]
    fn sweep_allows_ticket_recreation() {
        let scheduler = Scheduler::new();
        scheduler.check_ticket("point-polling", Some(10), at(0));
        assert!(scheduler.check_ticket("point-polling", None, at(11)));
        scheduler.sweep();
        assert!(!scheduler.check_ticket("point-polling", Some(10), at(11)));
    }

    #[test]
    fn bootstrap_tick_fires_exactly_once_per_section() {
        let scheduler = Scheduler::new();
        assert!(scheduler.is_bootstrap_tick("device-discovery"));
        assert!(!scheduler.is_bootstrap_tick("device-discovery"));
        assert!(scheduler.is_bootstrap_tick("point-discovery"));
    }
}
