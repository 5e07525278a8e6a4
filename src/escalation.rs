//! Approval levels, tickets, and timeout-driven escalation.
//!
//! Approval authority forms a strict total order: `AUTO < SUPERVISOR <
//! MANAGER < EXECUTIVE`. Every non-auto pending approval carries a deadline;
//! when it lapses undecided the ticket advances exactly one level and a fresh
//! deadline is armed. A lapse at the top level is terminal; there is nobody
//! left to escalate to.
//!
//! Auto-approval bypasses this module entirely: a scenario that meets the
//! auto-approval policy never creates a ticket.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::runtime::WorkflowEngine;

/// Rank of human authority required to authorize a scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApprovalLevel {
    Auto,
    Supervisor,
    Manager,
    Executive,
}

impl ApprovalLevel {
    /// The next-higher level, or `None` at the top of the ladder.
    #[must_use]
    pub fn next(&self) -> Option<ApprovalLevel> {
        match self {
            ApprovalLevel::Auto => Some(ApprovalLevel::Supervisor),
            ApprovalLevel::Supervisor => Some(ApprovalLevel::Manager),
            ApprovalLevel::Manager => Some(ApprovalLevel::Executive),
            ApprovalLevel::Executive => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalLevel::Auto => "AUTO",
            ApprovalLevel::Supervisor => "SUPERVISOR",
            ApprovalLevel::Manager => "MANAGER",
            ApprovalLevel::Executive => "EXECUTIVE",
        }
    }

    pub fn parse(s: &str) -> Option<ApprovalLevel> {
        match s {
            "AUTO" => Some(ApprovalLevel::Auto),
            "SUPERVISOR" => Some(ApprovalLevel::Supervisor),
            "MANAGER" => Some(ApprovalLevel::Manager),
            "EXECUTIVE" => Some(ApprovalLevel::Executive),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an approval ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
}

/// Per-level escalation deadlines.
#[derive(Clone, Debug)]
pub struct EscalationTimeouts {
    pub supervisor: Duration,
    pub manager: Duration,
    pub executive: Duration,
}

impl Default for EscalationTimeouts {
    fn default() -> Self {
        Self {
            supervisor: Duration::minutes(15),
            manager: Duration::minutes(30),
            executive: Duration::minutes(60),
        }
    }
}

impl EscalationTimeouts {
    /// Deadline duration for a level; `Auto` never holds a ticket.
    pub fn for_level(&self, level: ApprovalLevel) -> Option<Duration> {
        match level {
            ApprovalLevel::Auto => None,
            ApprovalLevel::Supervisor => Some(self.supervisor),
            ApprovalLevel::Manager => Some(self.manager),
            ApprovalLevel::Executive => Some(self.executive),
        }
    }
}

/// A pending (or decided) request for human authorization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub level: ApprovalLevel,
    pub status: TicketStatus,
    pub requested_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

impl ApprovalTicket {
    /// Open a ticket at the given level. Returns `None` for `Auto`.
    pub fn open(
        level: ApprovalLevel,
        now: DateTime<Utc>,
        timeouts: &EscalationTimeouts,
    ) -> Option<ApprovalTicket> {
        let duration = timeouts.for_level(level)?;
        Some(ApprovalTicket {
            level,
            status: TicketStatus::Pending,
            requested_at: now,
            timeout_at: now + duration,
        })
    }

    /// Whether the ticket is pending and its deadline has lapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::Pending && now >= self.timeout_at
    }
}

/// Result of applying the escalation rule to an expired ticket.
#[derive(Clone, Debug, PartialEq)]
pub enum Escalation {
    /// A fresh ticket one level up, with a newly armed deadline.
    Advanced {
        from: ApprovalLevel,
        to: ApprovalLevel,
        ticket: ApprovalTicket,
    },
    /// The ticket was already at the top level; no further escalation.
    Exhausted,
}

/// Advance an expired ticket exactly one level, or report exhaustion.
///
/// The caller is responsible for checking [`ApprovalTicket::is_expired`]
/// first; the new deadline is computed from the escalation moment, not from
/// the original request.
pub fn escalate(
    ticket: &ApprovalTicket,
    now: DateTime<Utc>,
    timeouts: &EscalationTimeouts,
) -> Escalation {
    match ticket.level.next() {
        Some(next_level) => {
            let next_ticket = ApprovalTicket::open(next_level, now, timeouts)
                .unwrap_or_else(|| ApprovalTicket {
                    level: next_level,
                    status: TicketStatus::Pending,
                    requested_at: now,
                    timeout_at: now,
                });
            Escalation::Advanced {
                from: ticket.level,
                to: next_level,
                ticket: next_ticket,
            }
        }
        None => Escalation::Exhausted,
    }
}

/// Background task that periodically sweeps every pending approval.
///
/// The timer only drives [`WorkflowEngine::sweep_escalations`]; all the
/// decision logic lives in the engine so tests can pass explicit clocks.
pub struct EscalationTimer {
    handle: JoinHandle<()>,
}

impl EscalationTimer {
    /// Spawn a sweep every `interval`.
    pub fn spawn(engine: Arc<WorkflowEngine>, interval: StdDuration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.sweep_escalations(Utc::now()).await;
            }
        });
        Self { handle }
    }

    /// Stop the background sweep.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}
