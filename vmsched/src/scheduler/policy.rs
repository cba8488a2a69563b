/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pluggable placement decisions.
//!
//! A [`PlacementPolicy`] only chooses *where* a task goes.  Admission
//! control (oversize and deadline checks), reclamation, reservation and cost
//! accounting stay in the [`PlacementScheduler`](super::PlacementScheduler),
//! so a replacement policy cannot bypass them.

use tracing::trace;

use crate::fleet::{FleetView, VmSlot};
use crate::task::Task;

use super::SchedulerError;

/// Outcome of one [`PlacementPolicy::decide`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reserve the task on this VM.
    Place(VmSlot),
    /// No VM fits right now; retry on a later pass.
    Defer,
    /// Never place this task.
    Reject,
}

/// Chooses a VM for a task that already passed admission control.
pub trait PlacementPolicy: Send {
    fn name(&self) -> &str;

    /// Pick a VM for `task`.  Spare capacity must be read through
    /// [`FleetView::probe`]; the scheduler reclaims every probed VM before
    /// acting on the decision.
    fn decide(&mut self, task: &Task, view: &mut FleetView<'_>) -> Decision;

    /// Called after the scheduler reserved a task on `slot`.
    fn on_admitted(&mut self, _slot: VmSlot) {}
}

impl<P: PlacementPolicy + ?Sized> PlacementPolicy for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn decide(&mut self, task: &Task, view: &mut FleetView<'_>) -> Decision {
        (**self).decide(task, view)
    }

    fn on_admitted(&mut self, slot: VmSlot) {
        (**self).on_admitted(slot)
    }
}

/// Build a policy from its configured name.
///
/// # Errors
/// [`SchedulerError::UnknownPolicy`] for an unrecognised name.
pub fn by_name(name: &str) -> Result<Box<dyn PlacementPolicy>, SchedulerError> {
    match name {
        RoundRobin::NAME | "round_robin" => Ok(Box::new(RoundRobin::new())),
        other => Err(SchedulerError::UnknownPolicy(other.to_string())),
    }
}

// ── Round robin ───────────────────────────────────────────────────────────────

/// Rotating first-fit.
///
/// The sweep starts at `(next_server, vm 0)`, tries every VM of a server in
/// order, then moves to the next server, wrapping, and gives up after each
/// server has been visited once.  The cursor advances by one server after
/// every admission, whichever server took the task, and wraps at the server
/// count seen by the last sweep.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    next_server: usize,
    servers: usize,
}

impl RoundRobin {
    pub const NAME: &'static str = "round-robin";

    pub fn new() -> Self {
        Self::default()
    }

    /// Server the next sweep starts from.
    pub fn next_server(&self) -> usize {
        self.next_server
    }
}

impl PlacementPolicy for RoundRobin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn decide(&mut self, task: &Task, view: &mut FleetView<'_>) -> Decision {
        let servers = view.server_count();
        if servers == 0 {
            return Decision::Defer;
        }
        self.servers = servers;
        let start = self.next_server % servers;
        for step in 0..servers {
            let server = (start + step) % servers;
            for vm in 0..view.vms_per_server() {
                let slot = VmSlot::new(server, vm);
                if let Some((cpu, ram)) = view.probe(slot) {
                    if task.demand.fits_within(cpu, ram) {
                        return Decision::Place(slot);
                    }
                }
            }
        }
        trace!(task = %task.label(), probed = view.probed().len(), "sweep found no VM");
        Decision::Defer
    }

    fn on_admitted(&mut self, _slot: VmSlot) {
        self.next_server += 1;
        if self.servers > 0 {
            self.next_server %= self.servers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::Fleet;
    use crate::task::{Demand, TaskId};

    fn task(cpu: f64, ram: f64) -> Task {
        Task::new("j", 0, Demand::new(cpu, ram, 0.0))
    }

    #[test]
    fn sweep_starts_at_cursor_and_wraps() {
        let fleet = Fleet::new(3, 2);
        let mut rr = RoundRobin::new();
        assert_eq!(
            rr.decide(&task(0.1, 0.1), &mut fleet.view(0.0)),
            Decision::Place(VmSlot::new(0, 0))
        );
        rr.on_admitted(VmSlot::new(0, 0));
        rr.on_admitted(VmSlot::new(1, 0));
        assert_eq!(rr.next_server(), 2);

        let mut view = fleet.view(0.0);
        assert_eq!(
            rr.decide(&task(0.1, 0.1), &mut view),
            Decision::Place(VmSlot::new(2, 0))
        );
    }

    #[test]
    fn cursor_wraps_at_the_server_count() {
        let fleet = Fleet::new(4, 1);
        let mut rr = RoundRobin::new();
        for placed in 1..=10 {
            let Decision::Place(slot) = rr.decide(&task(0.01, 0.01), &mut fleet.view(0.0)) else {
                panic!("empty fleet must place");
            };
            rr.on_admitted(slot);
            assert_eq!(rr.next_server(), placed % 4);
        }
    }

    #[test]
    fn full_vm_moves_to_next_vm_then_next_server() {
        let mut fleet = Fleet::new(2, 2);
        for (i, slot) in [VmSlot::new(0, 0), VmSlot::new(0, 1)].into_iter().enumerate() {
            fleet
                .reserve(slot, TaskId(i), Demand::new(0.45, 0.45, 0.0), 10.0)
                .unwrap();
        }
        let mut rr = RoundRobin::new();
        let mut view = fleet.view(0.0);
        assert_eq!(
            rr.decide(&task(0.2, 0.2), &mut view),
            Decision::Place(VmSlot::new(1, 0))
        );
        assert_eq!(view.probed().len(), 3);
    }

    #[test]
    fn exhausted_sweep_defers_after_one_visit_per_server() {
        let mut fleet = Fleet::new(3, 2);
        let slots: Vec<VmSlot> = fleet.slots().collect();
        for (i, slot) in slots.into_iter().enumerate() {
            fleet
                .reserve(slot, TaskId(i), Demand::new(0.5, 0.5, 0.0), 10.0)
                .unwrap();
        }
        let mut rr = RoundRobin::new();
        let mut view = fleet.view(1.0);
        assert_eq!(rr.decide(&task(0.1, 0.1), &mut view), Decision::Defer);
        assert_eq!(view.probed().len(), 6, "each VM probed exactly once");
    }

    #[test]
    fn expired_occupants_count_as_free() {
        let mut fleet = Fleet::new(1, 1);
        fleet
            .reserve(VmSlot::new(0, 0), TaskId(0), Demand::new(1.0, 1.0, 0.0), 0.5)
            .unwrap();
        let mut rr = RoundRobin::new();
        let mut view = fleet.view(0.6);
        assert_eq!(
            rr.decide(&task(0.5, 0.5), &mut view),
            Decision::Place(VmSlot::new(0, 0))
        );
    }

    #[test]
    fn policies_resolve_by_name() {
        assert_eq!(by_name("round-robin").unwrap().name(), RoundRobin::NAME);
        assert!(matches!(
            by_name("learned"),
            Err(SchedulerError::UnknownPolicy(name)) if name == "learned"
        ));
    }
}
