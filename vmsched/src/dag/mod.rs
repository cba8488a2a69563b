/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task dependency graph.
//!
//! [`TaskGraph`] is a flat arena of [`Task`]s with parent/child relations
//! stored as [`TaskId`] indices.  [`DagBuilder`] turns parsed trace jobs into
//! a graph by drawing one random candidate parent per task and installing the
//! edge only when it keeps the job acyclic.
//!
//! All graph walks (cycle check, cascading rejection) are iterative with an
//! explicit visited set, so deep dependency chains never hit the call stack.
//!
//! # Composite tasks
//! When decomposition is enabled every original task is split into
//! sub-tasks (see [`decompose`]).  The scheduler places the sub-tasks; the
//! original task becomes a composite whose status follows them:
//!
//! | Sub-tasks | Composite |
//! |---|---|
//! | all admitted (running or finished) | `Running` |
//! | all finished | `Finished` |
//! | any rejected | `Rejected` (with every sibling) |

pub mod decompose;
pub mod ready;

use rand::Rng;
use tracing::{debug, info};

use crate::clock::SimTime;
use crate::config::DagConfig;
use crate::fleet::VmSlot;
use crate::task::{Job, Task, TaskId, TaskStatus};
use crate::trace::JobRecord;

// ── TaskGraph ─────────────────────────────────────────────────────────────────

/// Arena owning every task of a run.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    jobs: Vec<Job>,
}

/// Snapshot of how many tasks sit in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub ready: usize,
    pub running: usize,
    pub finished: usize,
    pub rejected: usize,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ──────────────────────────────────────────────────────────

    /// Open a new, empty job and return its position.
    pub fn add_job(&mut self, id: impl Into<String>) -> usize {
        self.jobs.push(Job {
            id: id.into(),
            tasks: Vec::new(),
        });
        self.jobs.len() - 1
    }

    /// Append an original task to job `job`.
    ///
    /// # Panics
    /// Panics if `job` was not returned by [`add_job`](Self::add_job).
    pub fn add_task(&mut self, job: usize, task: Task) -> TaskId {
        let id = self.push(task);
        self.jobs[job].tasks.push(id);
        id
    }

    /// Append a task that belongs to no job list (sub-tasks).
    fn push(&mut self, task: Task) -> TaskId {
        self.tasks.push(task);
        TaskId(self.tasks.len() - 1)
    }

    /// Install `parent → child` unless it would close a cycle.
    ///
    /// The edge is refused when `parent == child` or when `parent` is
    /// already reachable from `child` through child edges.  Returns `true`
    /// if the edge is present afterwards.
    pub fn try_add_edge(&mut self, parent: TaskId, child: TaskId) -> bool {
        if parent == child || self.reaches(child, parent) {
            return false;
        }
        if !self.tasks[parent.0].children.contains(&child) {
            self.tasks[parent.0].children.push(child);
            self.tasks[child.0].parents.push(parent);
        }
        true
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    pub fn task_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.0]
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Number of entries in the arena, sub-tasks included.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ids of every arena entry in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.tasks.len()).map(TaskId)
    }

    /// Original (trace) tasks, excluding sub-tasks.
    pub fn originals(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.ids().filter(|&id| !self.task(id).is_subtask())
    }

    pub fn original_count(&self) -> usize {
        self.originals().count()
    }

    /// Tasks the scheduler places: every task that has not been split into
    /// sub-tasks.  Under decomposition these are exactly the sub-tasks.
    pub fn schedulable_units(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.ids().filter(|&id| !self.task(id).is_composite())
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Ready => counts.ready += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Finished => counts.finished += 1,
                TaskStatus::Rejected => counts.rejected += 1,
            }
        }
        counts
    }

    // ── Reachability ──────────────────────────────────────────────────────────

    /// `true` if `to` can be reached from `from` by following child edges
    /// (a task trivially reaches itself).
    pub fn reaches(&self, from: TaskId, to: TaskId) -> bool {
        if from == to {
            return true;
        }
        if self.tasks[from.0].children.is_empty() {
            return false;
        }
        let mut visited = vec![false; self.tasks.len()];
        let mut stack = vec![from];
        visited[from.0] = true;
        while let Some(cur) = stack.pop() {
            for &next in &self.tasks[cur.0].children {
                if next == to {
                    return true;
                }
                if !visited[next.0] {
                    visited[next.0] = true;
                    stack.push(next);
                }
            }
        }
        false
    }

    /// `true` if the child-edge relation contains a cycle anywhere.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }
        let mut mark = vec![Mark::New; self.tasks.len()];
        for root in 0..self.tasks.len() {
            if mark[root] != Mark::New {
                continue;
            }
            // (node, next child position)
            let mut stack = vec![(root, 0usize)];
            mark[root] = Mark::Open;
            while let Some(top) = stack.last_mut() {
                let (node, pos) = *top;
                if let Some(&child) = self.tasks[node].children.get(pos) {
                    top.1 += 1;
                    match mark[child.0] {
                        Mark::Open => return true,
                        Mark::New => {
                            mark[child.0] = Mark::Open;
                            stack.push((child.0, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    mark[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        false
    }

    // ── Status transitions ────────────────────────────────────────────────────

    /// Mark `id` rejected and cascade.  Returns every *other* task newly
    /// rejected by the cascade.
    pub fn reject(&mut self, id: TaskId) -> Vec<TaskId> {
        self.tasks[id.0].status = TaskStatus::Rejected;
        self.update_status(id)
    }

    /// Propagate the status of `id` to its dependents.
    ///
    /// For a rejected task every reachable descendant is rejected; for a
    /// sub-task the siblings and the composite it was split from are
    /// rejected too, and for a composite its sub-tasks.  Tasks already
    /// finished keep their status.  Any other status is a no-op.
    ///
    /// Returns the tasks whose status changed, in discovery order.
    pub fn update_status(&mut self, id: TaskId) -> Vec<TaskId> {
        if self.tasks[id.0].status != TaskStatus::Rejected {
            return Vec::new();
        }

        let mut newly = Vec::new();
        let mut visited = vec![false; self.tasks.len()];
        let mut stack = vec![id];
        visited[id.0] = true;

        while let Some(cur) = stack.pop() {
            let task = &self.tasks[cur.0];
            let mut next: Vec<TaskId> = task.children.clone();
            next.extend_from_slice(&task.subtasks);
            if let Some(composite) = task.parent_task {
                next.push(composite);
                next.extend_from_slice(&self.tasks[composite.0].subtasks);
            }

            for n in next {
                if visited[n.0] {
                    continue;
                }
                visited[n.0] = true;
                let t = &mut self.tasks[n.0];
                if !t.status.is_resolved() {
                    t.status = TaskStatus::Rejected;
                    newly.push(n);
                }
                stack.push(n);
            }
        }

        if !newly.is_empty() {
            debug!(
                origin = %self.tasks[id.0].label(),
                cascaded = newly.len(),
                "cascading rejection"
            );
        }
        newly
    }

    /// Record the admission of `id` onto `slot`.
    ///
    /// For a sub-task, returns the composite if this admission completed the
    /// set (every sibling now running or finished); the composite then moves
    /// to `Running`.
    pub fn mark_running(&mut self, id: TaskId, slot: VmSlot, now: SimTime) -> Option<TaskId> {
        let task = &mut self.tasks[id.0];
        task.status = TaskStatus::Running;
        task.placement = Some(slot);
        task.end_time = Some(task.finish_if_started(now));

        let composite = task.parent_task?;
        let subs = &self.tasks[composite.0].subtasks;
        let all_admitted = subs.iter().all(|s| self.tasks[s.0].status.is_admitted());
        let end = subs
            .iter()
            .filter_map(|s| self.tasks[s.0].end_time)
            .fold(now, f64::max);

        let comp = &mut self.tasks[composite.0];
        if all_admitted && comp.status == TaskStatus::Ready {
            comp.status = TaskStatus::Running;
            comp.end_time = Some(end);
            Some(composite)
        } else {
            None
        }
    }

    /// Record that `id` completed.  Only a running task can finish; a task
    /// rejected while it held a reservation stays rejected.
    ///
    /// For a sub-task, returns the composite if it finished as a result.
    pub fn mark_finished(&mut self, id: TaskId) -> Option<TaskId> {
        let task = &mut self.tasks[id.0];
        if task.status != TaskStatus::Running {
            return None;
        }
        task.status = TaskStatus::Finished;

        let composite = task.parent_task?;
        let all_finished = self.tasks[composite.0]
            .subtasks
            .iter()
            .all(|s| self.tasks[s.0].status == TaskStatus::Finished);

        let comp = &mut self.tasks[composite.0];
        if all_finished && comp.status == TaskStatus::Running {
            comp.status = TaskStatus::Finished;
            Some(composite)
        } else {
            None
        }
    }
}

// ── DagBuilder ────────────────────────────────────────────────────────────────

/// Builds a [`TaskGraph`] from parsed trace jobs.
pub struct DagBuilder<'a, R: Rng> {
    config: &'a DagConfig,
    rng: &'a mut R,
    created_at: SimTime,
}

impl<'a, R: Rng> DagBuilder<'a, R> {
    pub fn new(config: &'a DagConfig, rng: &'a mut R) -> Self {
        Self {
            config,
            rng,
            created_at: 0.0,
        }
    }

    /// Virtual time at which tasks are created; deadlines are absolute from
    /// this instant.
    pub fn created_at(mut self, now: SimTime) -> Self {
        self.created_at = now;
        self
    }

    /// Create every task, attach random acyclic edges, then decompose if the
    /// configuration asks for it.
    pub fn build(self, jobs: &[JobRecord]) -> TaskGraph {
        let DagBuilder {
            config,
            rng,
            created_at,
        } = self;

        let mut graph = TaskGraph::new();
        for record in jobs {
            let job = graph.add_job(record.id().unwrap_or_default());
            for r in &record.records {
                let mut task = Task::new(r.job_id.clone(), r.index, r.demand);
                task.runtime = config.runtime_ms.sample_secs(rng);
                task.deadline = created_at + task.runtime + config.deadline_slack_ms.sample_secs(rng);
                graph.add_task(job, task);
            }
        }

        let (edges, refused) = link_jobs(&mut graph, config.independent_draws, rng);

        let mut subtasks = 0usize;
        if config.decompose {
            let originals: Vec<TaskId> = graph.originals().collect();
            for id in originals {
                subtasks += decompose::decompose(&mut graph, id, config, rng, created_at).len();
            }
        }

        info!(
            jobs = graph.jobs().len(),
            tasks = graph.original_count(),
            edges,
            refused_edges = refused,
            subtasks,
            "DAG built"
        );
        graph
    }
}

/// Draw one candidate parent per task and install the acyclic ones.
///
/// With `independent_draws` the candidate index is drawn from
/// `[-len, len-1]` and a negative draw means "no parent this round".
/// Returns `(installed, refused)` edge counts.
fn link_jobs<R: Rng>(graph: &mut TaskGraph, independent_draws: bool, rng: &mut R) -> (usize, usize) {
    let mut installed = 0usize;
    let mut refused = 0usize;

    for j in 0..graph.jobs().len() {
        let members = graph.jobs()[j].tasks.clone();
        let len = members.len() as i64;
        let low = if independent_draws { -len } else { 0 };
        for &child in &members {
            let draw = rng.gen_range(low..len);
            if draw < 0 {
                continue;
            }
            let parent = members[draw as usize];
            if graph.try_add_edge(parent, child) {
                installed += 1;
            } else {
                refused += 1;
            }
        }
    }
    (installed, refused)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
