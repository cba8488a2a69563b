/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured outcome and error types for the placement scheduler.
//!
//! Two enums model the two layers:
//!
//! * [`RejectReason`] – why a single task was rejected during a pass.  A
//!   rejection is a normal simulation outcome, counted in the run metrics,
//!   never an error.
//! * [`SchedulerError`] – a condition under which the scheduler cannot run
//!   at all, or a ledger inconsistency surfaced from the fleet.

use thiserror::Error;

use crate::clock::SimTime;
use crate::fleet::LedgerError;
use crate::task::TaskId;

// ── Admission control ─────────────────────────────────────────────────────────

/// Detailed reason why a task was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The task demands more cpu or ram than a VM's fixed share, so no VM
    /// can ever hold it.
    Oversized { cpu: f64, ram: f64, share: f64 },

    /// Starting now, the task would finish after its deadline.
    DeadlineMiss { finish_at: SimTime, deadline: SimTime },

    /// The placement policy declined the task.
    PolicyRejected { policy: String },

    /// A parent, sibling or composite was rejected.
    Cascade { origin: TaskId },
}

impl RejectReason {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::Oversized { .. } => "oversized",
            RejectReason::DeadlineMiss { .. } => "deadline",
            RejectReason::PolicyRejected { .. } => "policy",
            RejectReason::Cascade { .. } => "cascade",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Oversized { cpu, ram, share } => write!(
                f,
                "demand cpu {:.3}/ram {:.3} exceeds the VM share {:.3}",
                cpu, ram, share
            ),

            RejectReason::DeadlineMiss {
                finish_at,
                deadline,
            } => write!(
                f,
                "would finish at {:.6}s, after its deadline {:.6}s",
                finish_at, deadline
            ),

            RejectReason::PolicyRejected { policy } => {
                write!(f, "placement policy '{}' rejected the task", policy)
            }

            RejectReason::Cascade { origin } => {
                write!(f, "dependency {} was rejected", origin)
            }
        }
    }
}

// ── Top-level scheduler errors ────────────────────────────────────────────────

/// Conditions under which a scheduler cannot be built or cannot continue.
///
/// | Variant | Raised by |
/// |---|---|
/// | `EmptyFleet` | `PlacementScheduler::new` |
/// | `UnknownPolicy` | `policy::by_name` |
/// | `Ledger` | a reservation or reclamation on a slot outside the fleet |
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The fleet has no server or no VM per server.
    #[error("fleet has {servers} server(s) × {vms} VM(s); at least one of each is required")]
    EmptyFleet { servers: usize, vms: usize },

    /// The policy name is not recognised.
    #[error("unknown placement policy: '{0}' (valid: round-robin)")]
    UnknownPolicy(String),

    /// The fleet ledger refused an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
