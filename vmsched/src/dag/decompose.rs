/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Splitting a task into dependent sub-tasks.
//!
//! A task is cut into `N ∈ [1, max_subtasks]` pieces.  The first `N−1`
//! pieces each take an independently drawn fraction `p` of what is left;
//! the last piece takes the residual plus a random communication overhead
//! in `[0, subtask_overhead]` on each resource axis and on runtime.  The last
//! piece depends on all of its siblings (fan-in), and every piece inherits
//! the external parent and child edges of the task it was split from.

use rand::Rng;

use crate::clock::SimTime;
use crate::config::DagConfig;
use crate::task::{Demand, Task, TaskId};

use super::TaskGraph;

/// Round to three decimals.
fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Split `id` into sub-tasks created at virtual time `now` and return their
/// ids in order.  The last id is the fan-in piece.
pub fn decompose<R: Rng>(
    graph: &mut TaskGraph,
    id: TaskId,
    config: &DagConfig,
    rng: &mut R,
    now: SimTime,
) -> Vec<TaskId> {
    let source = graph.task(id).clone();
    let count = rng.gen_range(1..=config.max_subtasks.max(1));
    let overhead = config.subtask_overhead.max(0.0);

    let mut remaining = 1.0_f64;
    let mut pieces: Vec<Task> = Vec::with_capacity(count as usize);

    for _ in 1..count {
        let p = round3(rng.gen_range(0.0..=remaining)).min(remaining);
        remaining = (remaining - p).max(0.0);

        let mut sub = piece_of(&source, id);
        sub.demand = source.demand.scaled(p);
        sub.runtime = source.runtime * p;
        sub.deadline = now + sub.runtime + config.subtask_slack_ms.sample_secs(rng);
        pieces.push(sub);
    }

    let mut last = piece_of(&source, id);
    last.demand = Demand::new(
        source.demand.cpu * (remaining + rng.gen_range(0.0..=overhead)),
        source.demand.ram * (remaining + rng.gen_range(0.0..=overhead)),
        source.demand.disk * (remaining + rng.gen_range(0.0..=overhead)),
    );
    last.runtime = source.runtime * (remaining + rng.gen_range(0.0..=overhead));
    last.deadline =
        now + source.runtime * remaining + config.subtask_slack_ms.sample_secs(rng);
    pieces.push(last);

    let ids: Vec<TaskId> = pieces.into_iter().map(|t| graph.push(t)).collect();

    // Fan-in: the last piece waits for every sibling.
    if let Some((&fan_in, siblings)) = ids.split_last() {
        for &s in siblings {
            graph.tasks[s.0].children.push(fan_in);
            graph.tasks[fan_in.0].parents.push(s);
        }
    }

    graph.tasks[id.0].subtasks = ids.clone();
    ids
}

/// Fresh sub-task sharing identity and external edges with `source`.
fn piece_of(source: &Task, id: TaskId) -> Task {
    let mut sub = Task::new(source.job_id.clone(), source.index, Demand::default());
    sub.status = source.status;
    sub.parents = source.parents.clone();
    sub.children = source.children.clone();
    sub.parent_task = Some(id);
    sub
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain() -> (TaskGraph, TaskId, TaskId, TaskId) {
        let mut g = TaskGraph::new();
        let job = g.add_job("j");
        let make = |i| {
            let mut t = Task::new("j", i, Demand::new(0.2, 0.1, 0.05));
            t.runtime = 0.008;
            t
        };
        let a = g.add_task(job, make(0));
        let b = g.add_task(job, make(1));
        let c = g.add_task(job, make(2));
        g.try_add_edge(a, b);
        g.try_add_edge(b, c);
        (g, a, b, c)
    }

    #[test]
    fn piece_count_is_bounded() {
        let config = DagConfig::default();
        for seed in 0..50 {
            let (mut g, _, b, _) = chain();
            let mut rng = StdRng::seed_from_u64(seed);
            let subs = decompose(&mut g, b, &config, &mut rng, 0.0);
            assert!((1..=5).contains(&subs.len()), "got {} pieces", subs.len());
            assert_eq!(g.task(b).subtasks, subs);
        }
    }

    #[test]
    fn pieces_inherit_external_edges_and_backref() {
        let config = DagConfig::default();
        let (mut g, a, b, c) = chain();
        let mut rng = StdRng::seed_from_u64(3);
        let subs = decompose(&mut g, b, &config, &mut rng, 0.0);
        for &s in &subs {
            let t = g.task(s);
            assert_eq!(t.parent_task, Some(b));
            assert!(t.parents.contains(&a));
            assert!(t.children.contains(&c));
            assert_eq!(t.status, TaskStatus::Ready);
            assert_eq!(t.job_id, "j");
        }
    }

    #[test]
    fn last_piece_fans_in_from_siblings() {
        let config = DagConfig {
            max_subtasks: 5,
            ..DagConfig::default()
        };
        // find a seed that produces more than one piece
        for seed in 0..100 {
            let (mut g, _, b, _) = chain();
            let mut rng = StdRng::seed_from_u64(seed);
            let subs = decompose(&mut g, b, &config, &mut rng, 0.0);
            if subs.len() < 2 {
                continue;
            }
            let (&last, siblings) = subs.split_last().unwrap();
            for &s in siblings {
                assert!(g.task(last).parents.contains(&s));
                assert!(g.task(s).children.contains(&last));
            }
            assert!(!g.has_cycle());
            return;
        }
        panic!("no seed produced a multi-piece split");
    }

    #[test]
    fn fractions_sum_to_whole_plus_bounded_overhead() {
        let config = DagConfig::default();
        for seed in 0..50 {
            let (mut g, _, b, _) = chain();
            let mut rng = StdRng::seed_from_u64(seed);
            let subs = decompose(&mut g, b, &config, &mut rng, 0.0);
            let cpu: f64 = subs.iter().map(|&s| g.task(s).demand.cpu).sum();
            let parent_cpu = g.task(b).demand.cpu;
            assert!(cpu >= parent_cpu - 1e-9, "seed {seed}: {cpu} < {parent_cpu}");
            assert!(
                cpu <= parent_cpu * (1.0 + config.subtask_overhead) + 1e-9,
                "seed {seed}: {cpu} exceeds overhead bound"
            );
            let runtime: f64 = subs.iter().map(|&s| g.task(s).runtime).sum();
            assert!(runtime >= g.task(b).runtime - 1e-12);
        }
    }

    #[test]
    fn single_piece_without_overhead_copies_parent() {
        let config = DagConfig {
            max_subtasks: 1,
            subtask_overhead: 0.0,
            ..DagConfig::default()
        };
        let (mut g, _, b, _) = chain();
        let mut rng = StdRng::seed_from_u64(0);
        let subs = decompose(&mut g, b, &config, &mut rng, 0.0);
        assert_eq!(subs.len(), 1);
        let piece = g.task(subs[0]);
        assert!((piece.demand.cpu - 0.2).abs() < 1e-12);
        assert!((piece.runtime - 0.008).abs() < 1e-12);
        assert!(piece.deadline > piece.runtime);
    }
}
