/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Energy and cost accounting.
//!
//! Power of a unit (a server, or a farm of servers) with load `r` out of
//! capacity `c`:
//!
//! ```text
//! u   = r / c
//! pwr = base + dynamic
//! base    = 1 if r > 0 else 0
//! dynamic = α·u                      if u < KNEE
//!         = α·KNEE + β·(u − KNEE)²   otherwise
//! ```
//!
//! with `α = 0.5`, `β = 10`, `KNEE = 0.7`.
//!
//! | Mode | Accrual per placement event | At run end |
//! |---|---|---|
//! | [`CostMode::PerEvent`] | full fleet power after the placement | nothing |
//! | [`CostMode::TimeIntegrated`] | previous fleet power × virtual time since the last event | same, up to the end instant |
//!
//! Farms are diagnostic only: they accumulate their own power and a tariffed
//! monetary cost but never feed [`EnergyMeter::total_cost`].

use std::ops::Range;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::SimTime;
use crate::fleet::Fleet;

// ── Power model ───────────────────────────────────────────────────────────────

/// Linear slope below the knee.
pub const ALPHA: f64 = 0.5;
/// Quadratic penalty above the knee.
pub const BETA: f64 = 10.0;
/// Utilisation at which the dynamic term turns quadratic.
pub const KNEE: f64 = 0.7;

/// Farm power below this is billed at [`PRICE_LOW`].
pub const TARIFF_THRESHOLD: f64 = 1.5;
pub const PRICE_LOW: f64 = 5.91;
pub const PRICE_HIGH: f64 = 8.27;

/// Power drawn by a unit carrying load `r` out of capacity `c`.
///
/// A unit with no capacity draws nothing.
pub fn unit_power(r: f64, c: f64) -> f64 {
    if c <= 0.0 {
        return 0.0;
    }
    let u = r / c;
    let base = if r > 0.0 { 1.0 } else { 0.0 };
    let dynamic = if u < KNEE {
        ALPHA * u
    } else {
        ALPHA * KNEE + BETA * (u - KNEE).powi(2)
    };
    base + dynamic
}

/// Instantaneous fleet power from current occupancy.
///
/// Occupants whose end time has passed but which have not been reclaimed yet
/// still count.
pub fn fleet_power(fleet: &Fleet) -> f64 {
    fleet
        .servers()
        .iter()
        .map(|s| unit_power(1.0 - s.idle_cpu_fraction(), 1.0))
        .sum()
}

/// Price per unit of farm power.
pub fn tariff(power: f64) -> f64 {
    if power < TARIFF_THRESHOLD {
        PRICE_LOW
    } else {
        PRICE_HIGH
    }
}

// ── Cost mode ─────────────────────────────────────────────────────────────────

/// How placement events turn into accumulated cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostMode {
    #[default]
    PerEvent,
    TimeIntegrated,
}

impl std::fmt::Display for CostMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostMode::PerEvent => write!(f, "per-event"),
            CostMode::TimeIntegrated => write!(f, "time-integrated"),
        }
    }
}

impl std::str::FromStr for CostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-event" | "per_event" => Ok(CostMode::PerEvent),
            "time-integrated" | "time_integrated" => Ok(CostMode::TimeIntegrated),
            other => Err(format!(
                "unknown cost mode '{other}' (valid: per-event, time-integrated)"
            )),
        }
    }
}

// ── Farms ─────────────────────────────────────────────────────────────────────

/// A contiguous group of servers accounted together.
#[derive(Debug, Clone, PartialEq)]
pub struct Farm {
    pub index: usize,
    pub servers: Range<usize>,
    /// Accumulated power over placement events.
    pub energy: f64,
    /// Accumulated tariffed cost over placement events.
    pub cost: f64,
}

impl Farm {
    pub fn size(&self) -> usize {
        self.servers.len()
    }

    /// Current power of the farm's servers.
    pub fn power(&self, fleet: &Fleet) -> f64 {
        let servers = fleet.servers();
        let load: f64 = self
            .servers
            .clone()
            .filter_map(|i| servers.get(i))
            .map(|s| s.utilization())
            .sum();
        unit_power(load, self.size() as f64)
    }
}

/// Split `server_count` servers into `farm_count` contiguous farms.
///
/// Each of the first `farm_count − 1` farms draws its size uniformly from
/// `[0, ⌊2·m/n⌋]` (capped at `m`), where `m` servers and `n` farms are
/// still unassigned.  The last farm takes whatever is left.
pub fn partition_farms<R: Rng + ?Sized>(
    server_count: usize,
    farm_count: usize,
    rng: &mut R,
) -> Vec<Farm> {
    let mut farms = Vec::with_capacity(farm_count);
    let mut start = 0usize;
    for index in 0..farm_count {
        let left = server_count - start;
        let size = if index + 1 == farm_count {
            left
        } else {
            let farms_left = farm_count - index;
            rng.gen_range(0..=(2 * left / farms_left)).min(left)
        };
        farms.push(Farm {
            index,
            servers: start..start + size,
            energy: 0.0,
            cost: 0.0,
        });
        start += size;
    }
    farms
}

// ── Meter ─────────────────────────────────────────────────────────────────────

/// Per-run cost accumulator.
#[derive(Debug, Clone)]
pub struct EnergyMeter {
    mode: CostMode,
    total_cost: f64,
    events: u64,
    farms: Vec<Farm>,
    last_power: f64,
    last_time: SimTime,
}

impl EnergyMeter {
    pub fn new(mode: CostMode, farms: Vec<Farm>) -> Self {
        Self {
            mode,
            total_cost: 0.0,
            events: 0,
            farms,
            last_power: 0.0,
            last_time: 0.0,
        }
    }

    /// Start the integration window at `now` (time-integrated mode only).
    pub fn starting_at(mut self, now: SimTime) -> Self {
        self.last_time = now;
        self
    }

    pub fn mode(&self) -> CostMode {
        self.mode
    }

    /// Account for one successful placement at virtual time `now`.
    pub fn record_event(&mut self, fleet: &Fleet, now: SimTime) {
        let power = fleet_power(fleet);
        self.events += 1;
        match self.mode {
            CostMode::PerEvent => self.total_cost += power,
            CostMode::TimeIntegrated => {
                self.total_cost += self.last_power * (now - self.last_time).max(0.0);
                self.last_time = self.last_time.max(now);
            }
        }
        self.last_power = power;

        for farm in &mut self.farms {
            let p = farm.power(fleet);
            farm.energy += p;
            farm.cost += p * tariff(p);
        }
        debug!(event = self.events, power, total = self.total_cost, "cost recorded");
    }

    /// Close the run at `now`.  Time-integrated mode accrues the last
    /// interval; per-event mode is unaffected.
    pub fn finish(&mut self, now: SimTime) {
        if self.mode == CostMode::TimeIntegrated {
            self.total_cost += self.last_power * (now - self.last_time).max(0.0);
            self.last_time = self.last_time.max(now);
            self.last_power = 0.0;
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Number of placement events recorded.
    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn farms(&self) -> &[Farm] {
        &self.farms
    }

    /// Sum of every farm's tariffed cost.
    pub fn farm_cost(&self) -> f64 {
        self.farms.iter().map(|f| f.cost).sum()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
