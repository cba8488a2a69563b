/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Ready-queue generation.
//!
//! A schedulable task is eligible when it is `Ready` itself and none of its
//! parents is still `Ready`.  Running, finished or rejected parents do not
//! block (a rejected parent has already cascaded its rejection).  The queue
//! is a pure function of the graph: regenerate it after every pass.

use crate::task::{TaskId, TaskStatus};

use super::TaskGraph;

impl TaskGraph {
    /// `true` if `id` may be offered to the scheduler right now.
    pub fn is_eligible(&self, id: TaskId) -> bool {
        let task = self.task(id);
        task.status == TaskStatus::Ready
            && task
                .parents
                .iter()
                .all(|&p| self.task(p).status != TaskStatus::Ready)
    }

    /// Lazily yield eligible schedulable tasks in arena insertion order.
    pub fn ready_iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.schedulable_units().filter(|&id| self.is_eligible(id))
    }

    /// Snapshot of [`ready_iter`](Self::ready_iter).
    pub fn ready_queue(&self) -> Vec<TaskId> {
        self.ready_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DagConfig;
    use crate::dag::{decompose::decompose, TaskGraph};
    use crate::fleet::VmSlot;
    use crate::task::{Demand, Task, TaskId, TaskStatus};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn diamond() -> (TaskGraph, [TaskId; 4]) {
        // a → b, a → c, b → d, c → d
        let mut g = TaskGraph::new();
        let job = g.add_job("j");
        let ids: Vec<TaskId> = (0..4)
            .map(|i| g.add_task(job, Task::new("j", i, Demand::new(0.1, 0.1, 0.0))))
            .collect();
        g.try_add_edge(ids[0], ids[1]);
        g.try_add_edge(ids[0], ids[2]);
        g.try_add_edge(ids[1], ids[3]);
        g.try_add_edge(ids[2], ids[3]);
        (g, [ids[0], ids[1], ids[2], ids[3]])
    }

    #[test]
    fn only_roots_are_ready_initially() {
        let (g, [a, ..]) = diamond();
        assert_eq!(g.ready_queue(), vec![a]);
    }

    #[test]
    fn running_parent_unblocks_children() {
        let (mut g, [a, b, c, d]) = diamond();
        g.mark_running(a, VmSlot { server: 0, vm: 0 }, 0.0);
        assert_eq!(g.ready_queue(), vec![b, c]);

        g.mark_running(b, VmSlot { server: 0, vm: 0 }, 0.0);
        assert_eq!(g.ready_queue(), vec![c], "d still waits for c");

        g.reject(c);
        assert_eq!(g.task(d).status, TaskStatus::Rejected);
        assert!(g.ready_queue().is_empty());
    }

    #[test]
    fn regeneration_is_idempotent() {
        let (mut g, [a, ..]) = diamond();
        g.mark_running(a, VmSlot { server: 0, vm: 0 }, 0.0);
        let first = g.ready_queue();
        let second = g.ready_queue();
        assert_eq!(first, second);
    }

    #[test]
    fn composites_are_never_queued_directly() {
        let (mut g, [a, b, ..]) = diamond();
        let config = DagConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let subs_a = decompose(&mut g, a, &config, &mut rng, 0.0);
        decompose(&mut g, b, &config, &mut rng, 0.0);

        let queue = g.ready_queue();
        assert!(!queue.contains(&a));
        for id in &queue {
            assert!(g.task(*id).is_subtask());
        }
        // only a's pieces without sibling dependencies are ready
        assert!(queue.iter().all(|id| subs_a.contains(id)));
        assert!(queue.contains(subs_a.first().unwrap()));
    }
}
