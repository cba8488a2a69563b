/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use crate::clock::SimTime;

use super::{Fleet, VmSlot};

/// Read-only window onto the fleet handed to a placement policy.
///
/// Spare capacity is reported as it will be once expired occupants are
/// reclaimed.  Every slot the policy inspects is recorded; the scheduler
/// reclaims exactly those VMs afterwards, so reclamation stays a side effect
/// of placement attempts.
#[derive(Debug)]
pub struct FleetView<'a> {
    fleet: &'a Fleet,
    now: SimTime,
    probed: Vec<VmSlot>,
}

impl<'a> FleetView<'a> {
    pub(super) fn new(fleet: &'a Fleet, now: SimTime) -> Self {
        Self {
            fleet,
            now,
            probed: Vec::new(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn server_count(&self) -> usize {
        self.fleet.server_count()
    }

    pub fn vms_per_server(&self) -> usize {
        self.fleet.vms_per_server()
    }

    pub fn vm_share(&self) -> f64 {
        self.fleet.vm_share()
    }

    /// Utilisation of server `server` as currently booked (expired
    /// occupants still count until reclaimed).
    pub fn server_utilization(&self, server: usize) -> Option<f64> {
        self.fleet.servers().get(server).map(|s| s.utilization())
    }

    /// `(spare cpu, spare ram)` of `slot` after reclamation at `now`, or
    /// `None` for a slot outside the fleet.  Records the probe.
    pub fn probe(&mut self, slot: VmSlot) -> Option<(f64, f64)> {
        let vm = self.fleet.vm(slot).ok()?;
        if !self.probed.contains(&slot) {
            self.probed.push(slot);
        }
        Some(vm.spare_after_reclaim(self.now))
    }

    /// Slots inspected so far, in first-probe order.
    pub fn probed(&self) -> &[VmSlot] {
        &self.probed
    }

    pub fn into_probed(self) -> Vec<VmSlot> {
        self.probed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Demand, TaskId};

    #[test]
    fn probe_reports_post_reclaim_spare_and_records_slot() {
        let mut fleet = Fleet::new(2, 2);
        let slot = VmSlot::new(1, 0);
        fleet
            .reserve(slot, TaskId(0), Demand::new(0.3, 0.3, 0.0), 0.5)
            .unwrap();

        let mut early = fleet.view(0.4);
        let (cpu, _) = early.probe(slot).unwrap();
        assert!((cpu - 0.2).abs() < 1e-12);

        let mut late = fleet.view(0.6);
        let (cpu, _) = late.probe(slot).unwrap();
        assert!((cpu - 0.5).abs() < 1e-12);
        late.probe(slot);
        assert_eq!(late.into_probed(), vec![slot]);
    }

    #[test]
    fn out_of_range_probe_is_not_recorded() {
        let fleet = Fleet::new(1, 1);
        let mut view = fleet.view(0.0);
        assert!(view.probe(VmSlot::new(3, 0)).is_none());
        assert!(view.probed().is_empty());
        assert_eq!(view.server_count(), 1);
        assert_eq!(view.vms_per_server(), 1);
        assert_eq!(view.server_utilization(0), Some(0.0));
        assert_eq!(view.server_utilization(1), None);
    }
}
