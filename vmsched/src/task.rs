/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the placement simulator.
//!
//! ```text
//! trace file ──(TraceRecord)──►  Task (arena, TaskGraph)  ──(scheduler)──►  VM occupant
//!                                  ↑ status machine                            ↑ ledger entry
//! ```
//!
//! # Ownership model
//! Every [`Task`] lives in the flat arena owned by
//! [`TaskGraph`](crate::dag::TaskGraph).  Relations between tasks (parents,
//! children, sub-tasks, the back-reference from a sub-task to the task it was
//! split from) are stored as [`TaskId`] indices into that arena, never as
//! references, so the graph can be mutated freely while it is traversed.

use std::fmt;

use crate::clock::SimTime;
use crate::fleet::VmSlot;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Index of a task inside the [`TaskGraph`](crate::dag::TaskGraph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Lifecycle state of a task.
///
/// ```text
/// Ready ──admit──► Running ──reclaim──► Finished
///   │
///   └──oversized / deadline miss / cascade──► Rejected
/// ```
///
/// Only `Ready` blocks a child from entering the ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    #[default]
    Ready,
    Running,
    Finished,
    Rejected,
}

impl TaskStatus {
    /// `true` once the task can no longer change state by itself
    /// (`Finished` or `Rejected`).
    pub fn is_resolved(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Rejected)
    }

    /// `true` for tasks that hold, or held, a VM reservation.
    pub fn is_admitted(self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Finished)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Finished => "finished",
            TaskStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

// ── Resource demand ───────────────────────────────────────────────────────────

/// Resource demand expressed as fractions of one server's unit capacity.
///
/// Only `cpu` and `ram` take part in admission control; `disk` is carried
/// through from the trace for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Demand {
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
}

impl Demand {
    pub fn new(cpu: f64, ram: f64, disk: f64) -> Self {
        Self { cpu, ram, disk }
    }

    /// Same demand multiplied by `factor` on every axis.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            cpu: self.cpu * factor,
            ram: self.ram * factor,
            disk: self.disk * factor,
        }
    }

    /// `true` if both cpu and ram fit within the given share.
    pub fn fits_within(&self, cpu: f64, ram: f64) -> bool {
        self.cpu <= cpu + CAPACITY_EPSILON && self.ram <= ram + CAPACITY_EPSILON
    }
}

/// Tolerance applied to capacity comparisons so that repeated float
/// reserve/release cycles do not turn an exact fit into a refusal.
pub const CAPACITY_EPSILON: f64 = 1e-9;

// ── Task ──────────────────────────────────────────────────────────────────────

/// A unit of work with resource demand, timing and dependency edges.
///
/// Original tasks come straight from the trace.  Under decomposition each
/// original task additionally owns an ordered list of `subtasks`; the
/// scheduler then places the sub-tasks and the original task acts as a
/// composite whose status follows its sub-tasks.
#[derive(Debug, Clone, Default)]
pub struct Task {
    // ── Identity ──────────────────────────────────────────────────────────────
    /// Job identifier from the trace (column 1).
    pub job_id: String,

    /// Task index within the job (column 2).
    pub index: u32,

    // ── Resources & timing ────────────────────────────────────────────────────
    pub demand: Demand,

    /// Expected execution duration in virtual seconds.
    pub runtime: SimTime,

    /// Absolute virtual time by which execution must complete.
    pub deadline: SimTime,

    /// Admission time + runtime.  `None` until the task is placed.
    pub end_time: Option<SimTime>,

    // ── State ─────────────────────────────────────────────────────────────────
    pub status: TaskStatus,

    /// VM the task was admitted to.
    pub placement: Option<VmSlot>,

    // ── Relations (arena indices) ─────────────────────────────────────────────
    pub parents: Vec<TaskId>,
    pub children: Vec<TaskId>,

    /// Sub-tasks this task was split into, in creation order.  Empty unless
    /// the run decomposes tasks.
    pub subtasks: Vec<TaskId>,

    /// For a sub-task: the task it was split from.  Never an ownership edge.
    pub parent_task: Option<TaskId>,
}

impl Task {
    pub fn new(job_id: impl Into<String>, index: u32, demand: Demand) -> Self {
        Self {
            job_id: job_id.into(),
            index,
            demand,
            ..Default::default()
        }
    }

    pub fn is_subtask(&self) -> bool {
        self.parent_task.is_some()
    }

    /// `true` for an original task that has been split into sub-tasks.
    pub fn is_composite(&self) -> bool {
        !self.subtasks.is_empty()
    }

    /// Virtual time at which the task would finish if admitted at `now`.
    pub fn finish_if_started(&self, now: SimTime) -> SimTime {
        now + self.runtime
    }

    /// Human-readable `job/index` label used in log events.
    pub fn label(&self) -> String {
        if self.is_subtask() {
            format!("{}/{}*", self.job_id, self.index)
        } else {
            format!("{}/{}", self.job_id, self.index)
        }
    }
}

// ── Job ───────────────────────────────────────────────────────────────────────

/// Ordered collection of tasks sharing one trace job identifier.
#[derive(Debug, Clone, Default)]
pub struct Job {
    pub id: String,
    /// Original (non-sub) tasks of the job in trace order.
    pub tasks: Vec<TaskId>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
