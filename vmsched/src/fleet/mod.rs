/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Server fleet and per-VM spare-capacity ledger.
//!
//! Every server has unit capacity `(cpu = 1, ram = 1, disk = 1)` and is
//! partitioned into `vms_per_server` VMs of `1 / vms_per_server` cpu and ram
//! each.  A VM tracks its spare capacity and the tasks currently holding a
//! reservation on it.
//!
//! Reclamation is lazy: capacity held by a task whose end time has passed is
//! only returned when [`Fleet::reclaim_expired`] is called for that VM, which
//! the scheduler does as a side effect of a placement attempt touching it.
//!
//! The ledger is owned and mutated exclusively by the
//! [`PlacementScheduler`](crate::scheduler::PlacementScheduler).  Policies see
//! it through the read-only [`FleetView`].

mod view;

pub use view::FleetView;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::clock::SimTime;
use crate::task::{Demand, TaskId};

// ── Addressing ────────────────────────────────────────────────────────────────

/// Address of one VM: `(server index, VM index on that server)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmSlot {
    pub server: usize,
    pub vm: usize,
}

impl VmSlot {
    pub fn new(server: usize, vm: usize) -> Self {
        Self { server, vm }
    }
}

impl fmt::Display for VmSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}/vm{}", self.server, self.vm)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Ledger operations that would break capacity conservation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("VM {slot} does not exist (fleet has {servers} servers × {vms} VMs)")]
    UnknownSlot {
        slot: VmSlot,
        servers: usize,
        vms: usize,
    },

    #[error(
        "VM {slot} cannot hold task {task}: needs cpu {need_cpu:.4}/ram {need_ram:.4}, \
         spare cpu {spare_cpu:.4}/ram {spare_ram:.4}"
    )]
    InsufficientCapacity {
        slot: VmSlot,
        task: TaskId,
        need_cpu: f64,
        need_ram: f64,
        spare_cpu: f64,
        spare_ram: f64,
    },
}

// ── VM ────────────────────────────────────────────────────────────────────────

/// A task holding capacity on a VM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub task: TaskId,
    pub demand: Demand,
    pub end_time: SimTime,
}

/// Fixed-share partition of a server.
#[derive(Debug, Clone)]
pub struct Vm {
    capacity: f64,
    spare_cpu: f64,
    spare_ram: f64,
    running: Vec<Occupant>,
}

impl Vm {
    fn new(capacity: f64) -> Self {
        Self {
            capacity,
            spare_cpu: capacity,
            spare_ram: capacity,
            running: Vec::new(),
        }
    }

    /// Fixed cpu (and ram) share of this VM.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// `(spare cpu, spare ram)`.
    pub fn spare(&self) -> (f64, f64) {
        (self.spare_cpu, self.spare_ram)
    }

    pub fn running(&self) -> &[Occupant] {
        &self.running
    }

    /// Cpu currently reserved, expired occupants included.
    pub fn used_cpu(&self) -> f64 {
        self.capacity - self.spare_cpu
    }

    /// Spare capacity as it would be after reclaiming at `now`.
    pub fn spare_after_reclaim(&self, now: SimTime) -> (f64, f64) {
        self.running
            .iter()
            .filter(|o| o.end_time < now)
            .fold((self.spare_cpu, self.spare_ram), |(c, r), o| {
                (c + o.demand.cpu, r + o.demand.ram)
            })
    }

    fn take(&mut self, demand: Demand) {
        self.spare_cpu = clamp_spare(self.spare_cpu - demand.cpu, self.capacity);
        self.spare_ram = clamp_spare(self.spare_ram - demand.ram, self.capacity);
    }

    fn give_back(&mut self, demand: Demand) {
        self.spare_cpu = clamp_spare(self.spare_cpu + demand.cpu, self.capacity);
        self.spare_ram = clamp_spare(self.spare_ram + demand.ram, self.capacity);
    }
}

/// Keep a spare value inside `[0, capacity]`, absorbing float drift.
fn clamp_spare(value: f64, capacity: f64) -> f64 {
    value.clamp(0.0, capacity)
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Unit-capacity server partitioned into VMs.
#[derive(Debug, Clone)]
pub struct Server {
    vms: Vec<Vm>,
}

impl Server {
    pub fn vms(&self) -> &[Vm] {
        &self.vms
    }

    /// Fraction of the server's cpu not reserved by any VM occupant.
    pub fn idle_cpu_fraction(&self) -> f64 {
        (1.0 - self.utilization()).max(0.0)
    }

    /// Reserved cpu across all VMs, as a fraction of the unit capacity.
    pub fn utilization(&self) -> f64 {
        self.vms.iter().map(Vm::used_cpu).sum::<f64>().clamp(0.0, 1.0)
    }
}

// ── Fleet ─────────────────────────────────────────────────────────────────────

/// All servers of a run.
#[derive(Debug, Clone)]
pub struct Fleet {
    servers: Vec<Server>,
    vms_per_server: usize,
}

impl Fleet {
    /// Build `servers` servers of `vms_per_server` VMs each, all idle.
    ///
    /// Callers validate that both counts are non-zero; see
    /// [`PlacementScheduler::new`](crate::scheduler::PlacementScheduler::new).
    pub fn new(servers: usize, vms_per_server: usize) -> Self {
        let share = if vms_per_server == 0 {
            0.0
        } else {
            1.0 / vms_per_server as f64
        };
        let servers = (0..servers)
            .map(|_| Server {
                vms: (0..vms_per_server).map(|_| Vm::new(share)).collect(),
            })
            .collect();
        Self {
            servers,
            vms_per_server,
        }
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn vms_per_server(&self) -> usize {
        self.vms_per_server
    }

    /// Fixed cpu/ram share of every VM (`1 / vms_per_server`).
    pub fn vm_share(&self) -> f64 {
        if self.vms_per_server == 0 {
            0.0
        } else {
            1.0 / self.vms_per_server as f64
        }
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn vm(&self, slot: VmSlot) -> Result<&Vm, LedgerError> {
        self.servers
            .get(slot.server)
            .and_then(|s| s.vms.get(slot.vm))
            .ok_or(LedgerError::UnknownSlot {
                slot,
                servers: self.servers.len(),
                vms: self.vms_per_server,
            })
    }

    fn vm_mut(&mut self, slot: VmSlot) -> Result<&mut Vm, LedgerError> {
        let (servers, vms) = (self.servers.len(), self.vms_per_server);
        self.servers
            .get_mut(slot.server)
            .and_then(|s| s.vms.get_mut(slot.vm))
            .ok_or(LedgerError::UnknownSlot {
                slot,
                servers,
                vms,
            })
    }

    /// Every slot in server-major order.
    pub fn slots(&self) -> impl Iterator<Item = VmSlot> + '_ {
        (0..self.servers.len())
            .flat_map(move |s| (0..self.vms_per_server).map(move |v| VmSlot::new(s, v)))
    }

    /// `(spare cpu, spare ram)` of `slot` as currently booked.
    pub fn spare(&self, slot: VmSlot) -> Result<(f64, f64), LedgerError> {
        self.vm(slot).map(Vm::spare)
    }

    /// Book `demand` for `task` on `slot` until `end_time`.
    ///
    /// # Errors
    /// [`LedgerError::InsufficientCapacity`] if the VM's spare cpu or ram is
    /// below the demand; the ledger is left untouched.
    pub fn reserve(
        &mut self,
        slot: VmSlot,
        task: TaskId,
        demand: Demand,
        end_time: SimTime,
    ) -> Result<(), LedgerError> {
        let vm = self.vm_mut(slot)?;
        if !demand.fits_within(vm.spare_cpu, vm.spare_ram) {
            return Err(LedgerError::InsufficientCapacity {
                slot,
                task,
                need_cpu: demand.cpu,
                need_ram: demand.ram,
                spare_cpu: vm.spare_cpu,
                spare_ram: vm.spare_ram,
            });
        }
        vm.take(demand);
        vm.running.push(Occupant {
            task,
            demand,
            end_time,
        });
        Ok(())
    }

    /// Release every occupant of `slot` whose end time is strictly before
    /// `now` and return them.  The caller marks the tasks finished.
    pub fn reclaim_expired(
        &mut self,
        slot: VmSlot,
        now: SimTime,
    ) -> Result<Vec<Occupant>, LedgerError> {
        let vm = self.vm_mut(slot)?;
        let (expired, kept): (Vec<Occupant>, Vec<Occupant>) =
            vm.running.drain(..).partition(|o| o.end_time < now);
        vm.running = kept;
        for o in &expired {
            vm.give_back(o.demand);
        }
        if vm.running.is_empty() {
            // no occupants left: drop accumulated rounding error
            vm.spare_cpu = vm.capacity;
            vm.spare_ram = vm.capacity;
        }
        if !expired.is_empty() {
            debug!(slot = %slot, released = expired.len(), now, "capacity reclaimed");
        }
        Ok(expired)
    }

    /// Reclaim every VM of the fleet at `now`.
    pub fn reclaim_all(&mut self, now: SimTime) -> Vec<Occupant> {
        let slots: Vec<VmSlot> = self.slots().collect();
        let mut released = Vec::new();
        for slot in slots {
            if let Ok(mut v) = self.reclaim_expired(slot, now) {
                released.append(&mut v);
            }
        }
        released
    }

    /// Earliest end time among occupants still holding capacity.
    pub fn earliest_release(&self) -> Option<SimTime> {
        self.occupants().map(|o| o.end_time).reduce(f64::min)
    }

    /// Latest end time among occupants still holding capacity.
    pub fn latest_release(&self) -> Option<SimTime> {
        self.occupants().map(|o| o.end_time).reduce(f64::max)
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants().count()
    }

    fn occupants(&self) -> impl Iterator<Item = &Occupant> + '_ {
        self.servers
            .iter()
            .flat_map(|s| s.vms.iter())
            .flat_map(|v| v.running.iter())
    }

    /// Largest deviation, over all VMs and both axes, between
    /// `spare + Σ occupant demand` and the VM capacity.  Zero up to float
    /// rounding while the ledger is consistent.
    pub fn conservation_error(&self) -> f64 {
        self.servers
            .iter()
            .flat_map(|s| s.vms.iter())
            .map(|vm| {
                let (cpu, ram) = vm
                    .running
                    .iter()
                    .fold((0.0, 0.0), |(c, r), o| (c + o.demand.cpu, r + o.demand.ram));
                let cpu_err = (vm.spare_cpu + cpu - vm.capacity).abs();
                let ram_err = (vm.spare_ram + ram - vm.capacity).abs();
                cpu_err.max(ram_err)
            })
            .fold(0.0, f64::max)
    }

    /// Read-only view for placement policies at virtual time `now`.
    pub fn view(&self, now: SimTime) -> FleetView<'_> {
        FleetView::new(self, now)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
