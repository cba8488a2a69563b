/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Placement scheduler.
//!
//! [`PlacementScheduler`] owns the [`Fleet`] ledger and the
//! [`EnergyMeter`], and drives one [`PlacementPolicy`].  A pass walks a
//! ready queue snapshot in order; for each task:
//!
//! | Task state / check | Outcome |
//! |---|---|
//! | already `Rejected` (cascade earlier in the pass) | propagate, drop |
//! | cpu or ram above the VM share | reject, `Oversized` |
//! | `now + runtime > deadline` | reject, `DeadlineMiss` |
//! | policy returns `Place(slot)` | reclaim probed VMs, reserve, `Running` |
//! | policy returns `Defer` | stays `Ready` for the next pass |
//! | policy returns `Reject` | reject, `PolicyRejected` |
//!
//! Every rejection cascades immediately through the graph.  Capacity is only
//! reclaimed on VMs the policy probed while deciding, so reclamation is a
//! side effect of placement attempts rather than a timer.
//!
//! # Acceptance
//! A plain task counts as accepted when it is admitted.  A sub-task counts
//! only when its admission completes the set, i.e. when the composite it was
//! split from turns `Running`; the composite is then one accepted task.

pub mod error;
pub mod policy;

pub use error::{RejectReason, SchedulerError};
pub use policy::{Decision, PlacementPolicy, RoundRobin};

use tracing::{debug, warn};

use crate::clock::SimTime;
use crate::dag::TaskGraph;
use crate::energy::EnergyMeter;
use crate::fleet::{Fleet, LedgerError, VmSlot};
use crate::task::{Task, TaskId, TaskStatus, CAPACITY_EPSILON};

// ── Pass bookkeeping ──────────────────────────────────────────────────────────

/// Counters for one scheduling pass.
///
/// Rejection counters are per schedulable unit (sub-tasks under
/// decomposition); `accepted` is per original task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub admitted: usize,
    pub accepted: usize,
    pub rejected_oversized: usize,
    pub rejected_deadline: usize,
    pub rejected_policy: usize,
    pub rejected_cascade: usize,
    pub deferred: usize,
    pub finished: usize,
}

impl PassOutcome {
    pub fn rejected(&self) -> usize {
        self.rejected_oversized
            + self.rejected_deadline
            + self.rejected_policy
            + self.rejected_cascade
    }

    /// `true` if any task changed status during the pass.
    pub fn made_progress(&self) -> bool {
        self.admitted > 0 || self.rejected() > 0
    }

    fn count_rejection(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::Oversized { .. } => self.rejected_oversized += 1,
            RejectReason::DeadlineMiss { .. } => self.rejected_deadline += 1,
            RejectReason::PolicyRejected { .. } => self.rejected_policy += 1,
            RejectReason::Cascade { .. } => self.rejected_cascade += 1,
        }
    }

    pub fn absorb(&mut self, other: &PassOutcome) {
        self.admitted += other.admitted;
        self.accepted += other.accepted;
        self.rejected_oversized += other.rejected_oversized;
        self.rejected_deadline += other.rejected_deadline;
        self.rejected_policy += other.rejected_policy;
        self.rejected_cascade += other.rejected_cascade;
        self.deferred += other.deferred;
        self.finished += other.finished;
    }
}

/// Result of offering one task to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Admitted {
        slot: VmSlot,
        /// Counts toward the acceptance total.
        accepted: bool,
    },
    Rejected(RejectReason),
    Deferred,
}

// ── PlacementScheduler ────────────────────────────────────────────────────────

/// Exclusive owner of the fleet ledger during a run.
pub struct PlacementScheduler<P: PlacementPolicy = RoundRobin> {
    fleet: Fleet,
    policy: P,
    energy: EnergyMeter,
}

impl<P: PlacementPolicy> PlacementScheduler<P> {
    /// # Errors
    /// [`SchedulerError::EmptyFleet`] if the fleet has no server or no VM.
    pub fn new(fleet: Fleet, policy: P, energy: EnergyMeter) -> Result<Self, SchedulerError> {
        if fleet.server_count() == 0 || fleet.vms_per_server() == 0 {
            return Err(SchedulerError::EmptyFleet {
                servers: fleet.server_count(),
                vms: fleet.vms_per_server(),
            });
        }
        Ok(Self {
            fleet,
            policy,
            energy,
        })
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn energy(&self) -> &EnergyMeter {
        &self.energy
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    // ── Pass ──────────────────────────────────────────────────────────────────

    /// Offer every task of `queue` once, in order, at virtual time `now`.
    pub fn run_pass(
        &mut self,
        graph: &mut TaskGraph,
        queue: &[TaskId],
        now: SimTime,
    ) -> Result<PassOutcome, SchedulerError> {
        let mut outcome = PassOutcome::default();

        for &id in queue {
            match graph.task(id).status {
                TaskStatus::Ready => {}
                TaskStatus::Rejected => {
                    let cascaded = graph.update_status(id);
                    count_cascade(graph, id, &cascaded, &mut outcome);
                    continue;
                }
                TaskStatus::Running | TaskStatus::Finished => continue,
            }

            match self.try_place(graph, id, now, &mut outcome)? {
                Attempt::Admitted { slot, accepted } => {
                    outcome.admitted += 1;
                    if accepted {
                        outcome.accepted += 1;
                    }
                    debug!(task = %graph.task(id).label(), slot = %slot, now, "admitted");
                }
                Attempt::Rejected(reason) => {
                    outcome.count_rejection(&reason);
                    let cascaded = graph.reject(id);
                    count_cascade(graph, id, &cascaded, &mut outcome);
                    debug!(
                        task = %graph.task(id).label(),
                        reason = reason.kind(),
                        cascaded = cascaded.len(),
                        "rejected: {reason}"
                    );
                }
                Attempt::Deferred => outcome.deferred += 1,
            }
        }

        debug!(
            now,
            queued = queue.len(),
            admitted = outcome.admitted,
            rejected = outcome.rejected(),
            deferred = outcome.deferred,
            "pass complete"
        );
        Ok(outcome)
    }

    /// Admission control, policy decision, reclamation and reservation for
    /// one `Ready` task.  Tasks finished by reclamation are added to
    /// `outcome.finished`.
    pub fn try_place(
        &mut self,
        graph: &mut TaskGraph,
        id: TaskId,
        now: SimTime,
        outcome: &mut PassOutcome,
    ) -> Result<Attempt, SchedulerError> {
        let task = graph.task(id);
        if let Err(reason) = check_admission(task, self.fleet.vm_share(), now) {
            return Ok(Attempt::Rejected(reason));
        }
        let (demand, end_time) = (task.demand, task.finish_if_started(now));

        let (decision, mut touched) = {
            let mut view = self.fleet.view(now);
            let decision = self.policy.decide(task, &mut view);
            (decision, view.into_probed())
        };
        if let Decision::Place(slot) = decision {
            if !touched.contains(&slot) {
                touched.push(slot);
            }
        }
        outcome.finished += self.reclaim(graph, &touched, now)?;

        match decision {
            Decision::Place(slot) => match self.fleet.reserve(slot, id, demand, end_time) {
                Ok(()) => {
                    let completed = graph.mark_running(id, slot, now);
                    self.policy.on_admitted(slot);
                    self.energy.record_event(&self.fleet, now);
                    let accepted = !graph.task(id).is_subtask() || completed.is_some();
                    Ok(Attempt::Admitted { slot, accepted })
                }
                Err(LedgerError::InsufficientCapacity { .. }) => {
                    warn!(
                        task = %graph.task(id).label(),
                        slot = %slot,
                        policy = self.policy.name(),
                        "policy chose a VM without room, deferring"
                    );
                    Ok(Attempt::Deferred)
                }
                Err(e) => Err(e.into()),
            },
            Decision::Defer => Ok(Attempt::Deferred),
            Decision::Reject => Ok(Attempt::Rejected(RejectReason::PolicyRejected {
                policy: self.policy.name().to_string(),
            })),
        }
    }

    // ── Reclamation ───────────────────────────────────────────────────────────

    /// Reclaim expired occupants of `slots` and mark them finished.
    /// Returns the number of tasks (composites included) that finished.
    pub fn reclaim(
        &mut self,
        graph: &mut TaskGraph,
        slots: &[VmSlot],
        now: SimTime,
    ) -> Result<usize, SchedulerError> {
        let mut finished = 0;
        for &slot in slots {
            for occupant in self.fleet.reclaim_expired(slot, now)? {
                finished += mark_done(graph, occupant.task);
            }
        }
        Ok(finished)
    }

    /// Reclaim every VM of the fleet.
    pub fn reclaim_all(&mut self, graph: &mut TaskGraph, now: SimTime) -> usize {
        self.fleet
            .reclaim_all(now)
            .into_iter()
            .map(|o| mark_done(graph, o.task))
            .sum()
    }

    /// Close cost accounting at `now`.
    pub fn close(&mut self, now: SimTime) {
        self.energy.finish(now);
    }
}

/// Count the schedulable units rejected because of `origin`.  Composites
/// are not placed themselves and are left out.
fn count_cascade(
    graph: &TaskGraph,
    origin: TaskId,
    cascaded: &[TaskId],
    outcome: &mut PassOutcome,
) {
    for &id in cascaded {
        if graph.task(id).is_composite() {
            continue;
        }
        let reason = RejectReason::Cascade { origin };
        debug!(task = %graph.task(id).label(), reason = reason.kind(), "rejected: {reason}");
        outcome.count_rejection(&reason);
    }
}

/// Mark `id` finished; count the composite too if fan-in completed it.
fn mark_done(graph: &mut TaskGraph, id: TaskId) -> usize {
    if graph.task(id).status != TaskStatus::Running {
        return 0;
    }
    1 + usize::from(graph.mark_finished(id).is_some())
}

/// Policy-independent admission gate.
///
/// Checks (in order):
/// 1. Demand fits a VM's fixed share at all.
/// 2. Started at `now`, the task meets its deadline.
pub fn check_admission(
    task: &Task,
    vm_share: f64,
    now: SimTime,
) -> Result<(), RejectReason> {
    let d = task.demand;
    if d.cpu > vm_share + CAPACITY_EPSILON || d.ram > vm_share + CAPACITY_EPSILON {
        return Err(RejectReason::Oversized {
            cpu: d.cpu,
            ram: d.ram,
            share: vm_share,
        });
    }

    let finish_at = task.finish_if_started(now);
    if finish_at > task.deadline {
        return Err(RejectReason::DeadlineMiss {
            finish_at,
            deadline: task.deadline,
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
