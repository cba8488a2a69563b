/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! vmsched – DAG task placement simulator
//!
//! Trace jobs become dependency graphs whose tasks are admitted onto
//! VM-partitioned servers under deadline and capacity constraints, driven by
//! a virtual clock and a pluggable placement policy.
//!
//! ```text
//! lib.rs
//! ├── clock       – virtual simulation time
//! ├── task        – task model, status, demand
//! ├── trace       – line-oriented trace parsing
//! ├── dag/        – arena graph, cascading rejection, decomposition, ready queue
//! ├── fleet/      – servers, VMs, spare-capacity ledger, policy view
//! ├── energy      – power curve, farms, tariff, cost modes
//! ├── scheduler/  – admission gate, passes, placement policies
//! ├── config/     – YAML configuration and variant presets
//! └── driver      – run loop and report
//! ```

pub mod clock;
pub mod config;
pub mod dag;
pub mod driver;
pub mod energy;
pub mod fleet;
pub mod scheduler;
pub mod task;
pub mod trace;
