/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Run driver.
//!
//! A [`Simulation`] owns everything one run needs (graph, scheduler,
//! virtual clock) and nothing is shared between runs, so independent
//! simulations can execute in parallel.
//!
//! The loop regenerates the ready queue, runs one pass at the current
//! virtual time and advances the clock by `pass_interval`.  A pass that
//! neither admits nor rejects anything jumps the clock to just after the
//! earliest pending release, so that lazy reclamation can free capacity on
//! the next pass.  Once the queue is empty the run settles: the clock moves
//! past the last release and every VM is reclaimed, finishing every admitted
//! task.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::clock::{SimClock, SimTime, MIN_TICK};
use crate::config::{SimConfig, Variant};
use crate::dag::{DagBuilder, TaskGraph};
use crate::energy::{partition_farms, CostMode, EnergyMeter};
use crate::fleet::Fleet;
use crate::scheduler::{policy, PassOutcome, PlacementPolicy, PlacementScheduler};
use crate::trace::{self, JobRecord};

// ── Report ────────────────────────────────────────────────────────────────────

/// Counters accumulated over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunMetrics {
    pub passes: u64,
    /// Idle passes resolved by jumping the clock to the next release.
    pub clock_jumps: u64,
    pub placement_events: u64,
    /// Totals over every pass plus the settle step.
    pub outcome: PassOutcome,
    /// Schedulable tasks still `Ready` when the loop stopped.
    pub stalled: usize,
    /// Virtual time at the end of the settle step.
    pub final_time: SimTime,
}

/// Everything reported for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub variant: Variant,
    pub policy: String,
    pub cost_mode: CostMode,
    pub farms: usize,
    pub servers: usize,
    /// Original (trace) tasks.
    pub tasks: usize,
    pub accepted: usize,
    /// Wall time of the scheduling loop and settle step.
    pub elapsed: Duration,
    pub total_cost: f64,
    /// Diagnostic tariffed farm cost; not part of `total_cost`.
    pub farm_cost: f64,
    pub reject_rate: f64,
    pub metrics: RunMetrics,
}

impl RunReport {
    /// Column names matching the [`Display`](fmt::Display) output.  The
    /// first seven columns are the headline figures; the rest break the
    /// rejections down per schedulable unit.
    pub const HEADER: &'static str = "variant farms servers tasks elapsed_s cost reject_rate \
         farm_cost placements oversized deadline policy cascade stalled";
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        write!(
            f,
            "{} {} {} {} {:.6} {:.4} {:.4} {:.4} {} {} {} {} {} {}",
            self.variant,
            self.farms,
            self.servers,
            self.tasks,
            self.elapsed.as_secs_f64(),
            self.total_cost,
            self.reject_rate,
            self.farm_cost,
            m.placement_events,
            m.outcome.rejected_oversized,
            m.outcome.rejected_deadline,
            m.outcome.rejected_policy,
            m.outcome.rejected_cascade,
            m.stalled
        )
    }
}

/// `1 − accepted / total`, or 0 for an empty universe.
pub fn reject_rate(accepted: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        1.0 - accepted as f64 / total as f64
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

/// One self-contained run.
pub struct Simulation<P: PlacementPolicy> {
    config: SimConfig,
    graph: TaskGraph,
    scheduler: PlacementScheduler<P>,
    clock: SimClock,
    farms: usize,
}

impl<P: PlacementPolicy> Simulation<P> {
    /// Build the graph from parsed trace `jobs` and set up the fleet.
    pub fn new(config: &SimConfig, jobs: &[JobRecord], policy: P) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let clock = SimClock::new();
        let graph = DagBuilder::new(&config.dag, &mut rng)
            .created_at(clock.now())
            .build(jobs);
        Self::assemble(config, graph, policy, &mut rng, clock)
    }

    /// Run over an already-built graph whose timing is absolute from
    /// virtual time 0.
    pub fn from_graph(config: &SimConfig, graph: TaskGraph, policy: P) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::assemble(config, graph, policy, &mut rng, SimClock::new())
    }

    fn assemble(
        config: &SimConfig,
        graph: TaskGraph,
        policy: P,
        rng: &mut StdRng,
        clock: SimClock,
    ) -> Result<Self> {
        let farms = partition_farms(config.server_count, config.farm_count(), rng);
        let farm_count = farms.len();
        let energy = EnergyMeter::new(config.cost_mode, farms).starting_at(clock.now());
        let fleet = Fleet::new(config.server_count, config.vms_per_server);
        let scheduler = PlacementScheduler::new(fleet, policy, energy)?;
        Ok(Self {
            config: config.clone(),
            graph,
            scheduler,
            clock,
            farms: farm_count,
        })
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Drive the run to completion and report.  The graph stays available
    /// for inspection afterwards.
    pub fn run(&mut self) -> Result<RunReport> {
        let started = Instant::now();
        let mut metrics = RunMetrics::default();
        let tasks = self.graph.original_count();

        info!(
            variant = %self.config.variant,
            policy = self.scheduler.policy().name(),
            servers = self.config.server_count,
            vms = self.config.vms_per_server,
            farms = self.farms,
            tasks,
            "simulation starting"
        );

        loop {
            let queue = self.graph.ready_queue();
            if queue.is_empty() {
                break;
            }
            if metrics.passes >= self.config.max_passes {
                warn!(
                    passes = metrics.passes,
                    ready = queue.len(),
                    "pass limit reached, stopping"
                );
                metrics.stalled = queue.len();
                break;
            }

            let now = self.clock.now();
            let outcome = self.scheduler.run_pass(&mut self.graph, &queue, now)?;
            metrics.passes += 1;
            metrics.outcome.absorb(&outcome);
            self.clock.advance(self.config.pass_interval);

            if outcome.made_progress() {
                continue;
            }
            match self.scheduler.fleet().earliest_release() {
                Some(release) if release < now => {
                    // the policy left expired capacity unclaimed
                    metrics.outcome.finished +=
                        self.scheduler.reclaim_all(&mut self.graph, now);
                }
                Some(release) => {
                    let target = release + MIN_TICK;
                    self.clock.advance_to(target);
                    metrics.clock_jumps += 1;
                    debug!(from = now, to = self.clock.now(), ready = queue.len(), "clock jump");
                }
                None => {
                    warn!(
                        ready = queue.len(),
                        now,
                        "no task running and none admissible, stopping"
                    );
                    metrics.stalled = queue.len();
                    break;
                }
            }
        }

        // ── Settle ────────────────────────────────────────────────────────────
        if let Some(last) = self.scheduler.fleet().latest_release() {
            self.clock.advance_to(last + MIN_TICK);
        }
        metrics.outcome.finished += self.scheduler.reclaim_all(&mut self.graph, self.clock.now());
        metrics.final_time = self.clock.now();

        self.scheduler.close(self.clock.now());
        let policy_name = self.scheduler.policy().name().to_string();
        let energy = self.scheduler.energy();
        metrics.placement_events = energy.events();
        let elapsed = started.elapsed();

        let accepted = metrics.outcome.accepted;
        let report = RunReport {
            variant: self.config.variant,
            policy: policy_name,
            cost_mode: energy.mode(),
            farms: self.farms,
            servers: self.config.server_count,
            tasks,
            accepted,
            elapsed,
            total_cost: energy.total_cost(),
            farm_cost: energy.farm_cost(),
            reject_rate: reject_rate(accepted, tasks),
            metrics,
        };

        info!(
            variant = %report.variant,
            tasks,
            accepted,
            reject_rate = report.reject_rate,
            cost = report.total_cost,
            farm_cost = report.farm_cost,
            placements = metrics.placement_events,
            rejected_oversized = metrics.outcome.rejected_oversized,
            rejected_deadline = metrics.outcome.rejected_deadline,
            rejected_policy = metrics.outcome.rejected_policy,
            rejected_cascade = metrics.outcome.rejected_cascade,
            stalled = metrics.stalled,
            passes = metrics.passes,
            clock_jumps = metrics.clock_jumps,
            virtual_s = metrics.final_time,
            elapsed_ms = elapsed.as_millis() as u64,
            "simulation finished"
        );
        Ok(report)
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Load the configured trace and run it with the configured policy.
///
/// # Errors
/// Invalid configuration, missing or malformed trace, unknown policy.
pub fn run(config: &SimConfig) -> Result<RunReport> {
    config.validate()?;
    let Some(path) = config.trace_file.as_deref() else {
        bail!("no trace file configured (set trace_file or pass --trace)");
    };
    let jobs = trace::load_trace(path, config.task_count_cap)
        .with_context(|| format!("Failed to load trace {}", path.display()))?;
    let policy = policy::by_name(&config.policy)?;
    run_with_policy(config, &jobs, policy)
}

/// Run already-parsed `jobs` with an explicit policy.
pub fn run_with_policy<P: PlacementPolicy>(
    config: &SimConfig,
    jobs: &[JobRecord],
    policy: P,
) -> Result<RunReport> {
    Simulation::new(config, jobs, policy)?.run()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::FleetView;
    use crate::scheduler::{Decision, RoundRobin};
    use crate::task::{Demand, Task, TaskStatus};
    use crate::trace::TraceRecord;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn jobs(count: usize, per_job: usize) -> Vec<JobRecord> {
        (0..count)
            .map(|j| JobRecord {
                records: (0..per_job)
                    .map(|i| TraceRecord {
                        job_id: format!("j{j}"),
                        index: i as u32,
                        demand: Demand::new(0.05 + 0.01 * (i % 5) as f64, 0.08, 0.01),
                    })
                    .collect(),
            })
            .collect()
    }

    fn small_config(variant: Variant) -> SimConfig {
        let mut config = SimConfig::for_variant(variant);
        config.server_count = 6;
        config.seed = Some(17);
        config
    }

    #[test]
    fn empty_universe_is_a_valid_outcome() {
        let report = run_with_policy(&small_config(Variant::Improved), &[], RoundRobin::new()).unwrap();
        assert_eq!(report.tasks, 0);
        assert_eq!(report.reject_rate, 0.0);
        assert_eq!(report.total_cost, 0.0);
        assert_eq!(report.metrics.passes, 0);
    }

    #[test]
    fn past_deadline_tasks_are_all_rejected() {
        let mut graph = TaskGraph::new();
        let job = graph.add_job("j");
        for i in 0..10 {
            let mut t = Task::new("j", i, Demand::new(0.3, 0.3, 0.0));
            t.runtime = 0.005;
            t.deadline = -1.0;
            graph.add_task(job, t);
        }
        let mut config = small_config(Variant::Baseline);
        config.server_count = 1;
        config.vms_per_server = 2;

        let report = Simulation::from_graph(&config, graph, RoundRobin::new())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(report.tasks, 10);
        assert_eq!(report.reject_rate, 1.0);
        assert_eq!(report.metrics.outcome.rejected_deadline, 10);
        assert_eq!(report.metrics.placement_events, 0);
    }

    #[test]
    fn rendered_report_carries_the_rejection_breakdown() {
        let report = RunReport {
            variant: Variant::Baseline,
            policy: "round-robin".into(),
            cost_mode: CostMode::PerEvent,
            farms: 10,
            servers: 6,
            tasks: 20,
            accepted: 12,
            elapsed: Duration::from_millis(1500),
            total_cost: 3.5,
            farm_cost: 41.25,
            reject_rate: reject_rate(12, 20),
            metrics: RunMetrics {
                placement_events: 12,
                outcome: PassOutcome {
                    rejected_oversized: 2,
                    rejected_deadline: 3,
                    rejected_policy: 1,
                    rejected_cascade: 4,
                    ..PassOutcome::default()
                },
                stalled: 0,
                ..RunMetrics::default()
            },
        };

        let line = report.to_string();
        let columns: Vec<&str> = line.split_whitespace().collect();
        let header: Vec<&str> = RunReport::HEADER.split_whitespace().collect();
        assert_eq!(columns.len(), header.len());
        let cell = |name: &str| columns[header.iter().position(|h| *h == name).unwrap()];

        assert_eq!(cell("variant"), "baseline");
        assert_eq!(cell("elapsed_s"), "1.500000");
        assert_eq!(cell("reject_rate"), "0.4000");
        assert_eq!(cell("farm_cost"), "41.2500");
        assert_eq!(cell("placements"), "12");
        assert_eq!(cell("oversized"), "2");
        assert_eq!(cell("deadline"), "3");
        assert_eq!(cell("policy"), "1");
        assert_eq!(cell("cascade"), "4");
        assert_eq!(cell("stalled"), "0");
    }

    #[test]
    fn every_variant_resolves_every_task() {
        for variant in Variant::ALL {
            let config = small_config(variant);
            let mut sim = Simulation::new(&config, &jobs(4, 15), RoundRobin::new()).unwrap();
            let report = sim.run().unwrap();

            assert_eq!(report.tasks, 60, "{variant}");
            assert_eq!(report.metrics.stalled, 0, "{variant}");
            assert!((0.0..=1.0).contains(&report.reject_rate), "{variant}");
            assert!(report.accepted > 0, "{variant}: nothing accepted");
            assert!(report.total_cost > 0.0, "{variant}");
            assert_eq!(report.farms, 10);
        }
    }

    #[test]
    fn same_seed_reproduces_the_run() {
        let config = small_config(Variant::Baseline);
        let a = run_with_policy(&config, &jobs(5, 12), RoundRobin::new()).unwrap();
        let b = run_with_policy(&config, &jobs(5, 12), RoundRobin::new()).unwrap();
        assert_eq!(a.accepted, b.accepted);
        assert_eq!(a.total_cost, b.total_cost);
        assert_eq!(a.metrics.passes, b.metrics.passes);
        assert_eq!(a.metrics.final_time, b.metrics.final_time);
    }

    #[test]
    fn time_integrated_mode_changes_only_the_cost() {
        let mut config = small_config(Variant::Baseline);
        let per_event = run_with_policy(&config, &jobs(2, 10), RoundRobin::new()).unwrap();
        config.cost_mode = CostMode::TimeIntegrated;
        let integrated = run_with_policy(&config, &jobs(2, 10), RoundRobin::new()).unwrap();

        assert_eq!(per_event.accepted, integrated.accepted);
        assert_eq!(integrated.cost_mode, CostMode::TimeIntegrated);
        assert!(integrated.total_cost < per_event.total_cost);
    }

    struct Refuser;

    impl PlacementPolicy for Refuser {
        fn name(&self) -> &str {
            "refuser"
        }
        fn decide(&mut self, _task: &Task, _view: &mut FleetView<'_>) -> Decision {
            Decision::Reject
        }
    }

    #[test]
    fn custom_policy_drops_in() {
        let config = small_config(Variant::Baseline);
        let report = run_with_policy(&config, &jobs(2, 5), Refuser).unwrap();
        assert_eq!(report.policy, "refuser");
        assert_eq!(report.accepted, 0);
        assert_eq!(report.reject_rate, 1.0);
        assert!(report.metrics.outcome.rejected_policy > 0);
    }

    struct Idler;

    impl PlacementPolicy for Idler {
        fn name(&self) -> &str {
            "idler"
        }
        fn decide(&mut self, _task: &Task, _view: &mut FleetView<'_>) -> Decision {
            Decision::Defer
        }
    }

    #[test]
    fn policy_that_never_places_stops_instead_of_spinning() {
        let config = small_config(Variant::Baseline);
        let mut sim = Simulation::new(&config, &jobs(1, 4), Idler).unwrap();
        let report = sim.run().unwrap();
        assert_eq!(report.metrics.passes, 1);
        assert!(report.metrics.stalled > 0);
        assert_eq!(report.reject_rate, 1.0);
    }

    #[test]
    fn run_loads_trace_from_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "J 1").unwrap();
        for i in 0..6 {
            writeln!(f, "t j1 {i} x 0.10 0.10 0.01").unwrap();
        }
        let mut config = small_config(Variant::Improved);
        config.trace_file = Some(f.path().to_path_buf());
        config.task_count_cap = 4;

        let report = run(&config).unwrap();
        assert_eq!(report.tasks, 4);
        assert_eq!(report.policy, "round-robin");
        assert_eq!(
            report.to_string().split_whitespace().count(),
            RunReport::HEADER.split_whitespace().count()
        );
    }

    #[test]
    fn run_without_trace_is_an_error() {
        let config = small_config(Variant::Improved);
        let err = run(&config).unwrap_err();
        assert!(err.to_string().contains("no trace file"));
    }

    #[test]
    fn unknown_policy_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "J 1\nt j1 0 x 0.1 0.1 0.0").unwrap();
        let mut config = small_config(Variant::Improved);
        config.trace_file = Some(f.path().to_path_buf());
        config.policy = "learned".into();
        assert!(run(&config).is_err());
    }

    #[test]
    fn statuses_are_terminal_after_run() {
        for variant in Variant::ALL {
            let config = small_config(variant);
            let mut sim = Simulation::new(&config, &jobs(3, 10), RoundRobin::new()).unwrap();
            let report = sim.run().unwrap();

            for t in sim.graph().tasks() {
                assert!(
                    matches!(t.status, TaskStatus::Finished | TaskStatus::Rejected),
                    "{variant}: {} left {}",
                    t.label(),
                    t.status
                );
            }
            let finished_originals = sim
                .graph()
                .originals()
                .filter(|&id| sim.graph().task(id).status == TaskStatus::Finished)
                .count();
            assert_eq!(finished_originals, report.accepted, "{variant}");
        }
    }
}
