/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulation configuration loading and presets.
//!
//! Every run is described by a [`SimConfig`].  It can be built from a
//! [`Variant`] preset or loaded from YAML; every field has a default so
//! partial files are accepted:
//! ```yaml
//! scale: small
//! trace_file: traces/batch_task.txt
//! task_count_cap: 5000
//! server_count: 200
//! vms_per_server: 2
//! seed: 42
//! cost_mode: per-event
//! dag:
//!   independent_draws: false
//!   decompose: true
//!   deadline_slack_ms: { min: 500, max: 5000 }
//! ```
//!
//! Fields are construction-time only; nothing is reconfigured while a run
//! is in progress.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{ensure, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info};

use crate::energy::CostMode;

// ── Ranges ────────────────────────────────────────────────────────────────────

/// Inclusive range of whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MillisRange {
    pub min: u32,
    pub max: u32,
}

impl MillisRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Draw a whole number of milliseconds and return it in seconds.
    pub fn sample_secs<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let (lo, hi) = (self.min.min(self.max), self.min.max(self.max));
        f64::from(rng.gen_range(lo..=hi)) / 1000.0
    }
}

impl fmt::Display for MillisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={} ms", self.min, self.max)
    }
}

// ── DAG generation ────────────────────────────────────────────────────────────

/// How tasks get their timing, edges and sub-task split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DagConfig {
    /// Draw candidate parents from `[-len, len)`; a negative draw leaves the
    /// task without a parent for that round.
    pub independent_draws: bool,
    /// Split every task into sub-tasks.
    pub decompose: bool,
    pub runtime_ms: MillisRange,
    /// Added to creation time + runtime to form the deadline.
    pub deadline_slack_ms: MillisRange,
    /// Upper bound on pieces per decomposed task.
    pub max_subtasks: u32,
    /// Upper bound on the fraction added to the fan-in piece on each axis.
    pub subtask_overhead: f64,
    pub subtask_slack_ms: MillisRange,
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            independent_draws: false,
            decompose: false,
            runtime_ms: MillisRange::new(1, 10),
            deadline_slack_ms: MillisRange::new(500, 5000),
            max_subtasks: 5,
            subtask_overhead: 0.1,
            subtask_slack_ms: MillisRange::new(50, 50_000),
        }
    }
}

// ── Scale ─────────────────────────────────────────────────────────────────────

/// Experiment scale; selects the farm count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Small,
    Large,
}

impl Scale {
    /// Fixed 10 farms at small scale, one per 50 servers (at least one) at
    /// large scale.
    pub fn farm_count(self, server_count: usize) -> usize {
        match self {
            Scale::Small => 10,
            Scale::Large => (server_count / 50).max(1),
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::Small => write!(f, "small"),
            Scale::Large => write!(f, "large"),
        }
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "small" => Ok(Scale::Small),
            "large" => Ok(Scale::Large),
            other => Err(format!("unknown scale '{other}' (valid: small, large)")),
        }
    }
}

// ── Variants ──────────────────────────────────────────────────────────────────

/// Named reference configurations.
///
/// | Variant | VMs/server | Independent draws | Deadline slack | Decompose |
/// |---|---|---|---|---|
/// | `earliest` | 10 | yes | 50..=5000 ms | no |
/// | `baseline` | 2 | yes | 50..=5000 ms | no |
/// | `improved` | 2 | no | 500..=5000 ms | yes |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Earliest,
    Baseline,
    #[default]
    Improved,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Earliest, Variant::Baseline, Variant::Improved];

    pub fn vms_per_server(self) -> usize {
        match self {
            Variant::Earliest => 10,
            Variant::Baseline | Variant::Improved => 2,
        }
    }

    /// Overwrite the preset-controlled fields of `config`.
    pub fn apply(self, config: &mut SimConfig) {
        config.variant = self;
        config.vms_per_server = self.vms_per_server();
        let dag = &mut config.dag;
        match self {
            Variant::Earliest | Variant::Baseline => {
                dag.independent_draws = true;
                dag.decompose = false;
                dag.deadline_slack_ms = MillisRange::new(50, 5000);
            }
            Variant::Improved => {
                dag.independent_draws = false;
                dag.decompose = true;
                dag.deadline_slack_ms = MillisRange::new(500, 5000);
            }
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Earliest => write!(f, "earliest"),
            Variant::Baseline => write!(f, "baseline"),
            Variant::Improved => write!(f, "improved"),
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.to_string() == s)
            .ok_or_else(|| {
                format!("unknown variant '{s}' (valid: earliest, baseline, improved)")
            })
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Everything one simulation run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub scale: Scale,
    pub trace_file: Option<PathBuf>,
    /// Stop reading the trace after this many task records.
    pub task_count_cap: usize,
    pub server_count: usize,
    pub vms_per_server: usize,
    pub variant: Variant,
    /// Fixed seed for reproducible runs; drawn from entropy when absent.
    pub seed: Option<u64>,
    pub cost_mode: CostMode,
    pub policy: String,
    /// Virtual seconds between scheduling passes.
    pub pass_interval: f64,
    /// Upper bound on scheduling passes per run.
    pub max_passes: u64,
    pub dag: DagConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut config = Self {
            scale: Scale::Small,
            trace_file: None,
            task_count_cap: 1000,
            server_count: 200,
            vms_per_server: 2,
            variant: Variant::Improved,
            seed: None,
            cost_mode: CostMode::PerEvent,
            policy: String::from("round-robin"),
            pass_interval: 0.001,
            max_passes: 10_000_000,
            dag: DagConfig::default(),
        };
        Variant::Improved.apply(&mut config);
        config
    }
}

impl SimConfig {
    /// Defaults with `variant`'s preset applied.
    pub fn for_variant(variant: Variant) -> Self {
        let mut config = Self::default();
        variant.apply(&mut config);
        config
    }

    /// Parse a YAML file.  The preset named by `variant` (default
    /// `improved`) is applied first, then every field present in the file
    /// overrides it; absent fields keep the preset's value.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, or the result fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading simulation configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        debug!(
            variant = %config.variant,
            servers = config.server_count,
            vms = config.vms_per_server,
            cap = config.task_count_cap,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Overlay `content` on the preset of the variant it names.
    fn from_yaml(content: &str) -> Result<Self> {
        let overlay: Value = serde_yaml::from_str(content)?;
        let variant = match overlay.get("variant") {
            Some(v) => serde_yaml::from_value(v.clone())?,
            None => Variant::default(),
        };
        let mut merged = serde_yaml::to_value(Self::for_variant(variant))?;
        merge_yaml(&mut merged, overlay);
        Ok(serde_yaml::from_value(merged)?)
    }

    /// Reject configurations that cannot describe a run.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.server_count > 0, "server_count must be at least 1");
        ensure!(self.vms_per_server > 0, "vms_per_server must be at least 1");
        ensure!(
            self.pass_interval.is_finite() && self.pass_interval > 0.0,
            "pass_interval must be a positive number of seconds (got {})",
            self.pass_interval
        );
        ensure!(self.max_passes > 0, "max_passes must be at least 1");

        let dag = &self.dag;
        for (name, range) in [
            ("runtime_ms", dag.runtime_ms),
            ("deadline_slack_ms", dag.deadline_slack_ms),
            ("subtask_slack_ms", dag.subtask_slack_ms),
        ] {
            ensure!(range.min <= range.max, "dag.{name} is inverted ({range})");
        }
        ensure!(dag.max_subtasks >= 1, "dag.max_subtasks must be at least 1");
        ensure!(
            dag.subtask_overhead.is_finite() && dag.subtask_overhead >= 0.0,
            "dag.subtask_overhead must be non-negative (got {})",
            dag.subtask_overhead
        );
        Ok(())
    }

    /// Number of farms for this run's scale and server count.
    pub fn farm_count(&self) -> usize {
        self.scale.farm_count(self.server_count)
    }
}

/// Recursively copy the entries of `overlay` into `base`.  Mappings merge
/// key by key; any other value replaces the base value.
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_yaml(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        // an empty document leaves every preset field in place
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── Presets ───────────────────────────────────────────────────────────────

    #[test]
    fn variant_presets_match_reference_table() {
        let earliest = SimConfig::for_variant(Variant::Earliest);
        assert_eq!(earliest.vms_per_server, 10);
        assert!(earliest.dag.independent_draws);
        assert!(!earliest.dag.decompose);
        assert_eq!(earliest.dag.deadline_slack_ms, MillisRange::new(50, 5000));

        let baseline = SimConfig::for_variant(Variant::Baseline);
        assert_eq!(baseline.vms_per_server, 2);
        assert!(baseline.dag.independent_draws);

        let improved = SimConfig::for_variant(Variant::Improved);
        assert_eq!(improved.vms_per_server, 2);
        assert!(!improved.dag.independent_draws);
        assert!(improved.dag.decompose);
        assert_eq!(improved.dag.deadline_slack_ms, MillisRange::new(500, 5000));
    }

    #[test]
    fn default_is_improved_and_valid() {
        let config = SimConfig::default();
        assert_eq!(config, SimConfig::for_variant(Variant::Improved));
        config.validate().unwrap();
    }

    #[test]
    fn variant_names_round_trip_through_from_str() {
        for v in Variant::ALL {
            assert_eq!(v.to_string().parse::<Variant>().unwrap(), v);
        }
        assert!("newest".parse::<Variant>().is_err());
    }

    #[test]
    fn farm_count_follows_scale() {
        assert_eq!(Scale::Small.farm_count(4000), 10);
        assert_eq!(Scale::Large.farm_count(4000), 80);
        assert_eq!(Scale::Large.farm_count(20), 1);
    }

    #[test]
    fn millis_range_samples_whole_milliseconds_in_bounds() {
        let range = MillisRange::new(1, 10);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            let s = range.sample_secs(&mut rng);
            assert!((0.001..=0.010).contains(&s));
            let ms = s * 1000.0;
            assert!((ms - ms.round()).abs() < 1e-9);
        }
    }

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
scale: large
trace_file: /data/batch_task.txt
task_count_cap: 250
server_count: 400
vms_per_server: 10
variant: earliest
seed: 7
cost_mode: time-integrated
dag:
  independent_draws: true
  decompose: false
  deadline_slack_ms: { min: 50, max: 5000 }
"#;
        let f = yaml_tempfile(yaml);
        let config = SimConfig::load_from_file(f.path()).unwrap();

        assert_eq!(config.scale, Scale::Large);
        assert_eq!(config.trace_file, Some(PathBuf::from("/data/batch_task.txt")));
        assert_eq!(config.task_count_cap, 250);
        assert_eq!(config.server_count, 400);
        assert_eq!(config.vms_per_server, 10);
        assert_eq!(config.variant, Variant::Earliest);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.cost_mode, CostMode::TimeIntegrated);
        assert!(config.dag.independent_draws);
        assert_eq!(config.dag.runtime_ms, MillisRange::new(1, 10), "default kept");
        assert_eq!(config.farm_count(), 8);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let f = yaml_tempfile("server_count: 12\n");
        let config = SimConfig::load_from_file(f.path()).unwrap();
        assert_eq!(config.server_count, 12);
        assert_eq!(config.vms_per_server, 2);
        assert_eq!(config.policy, "round-robin");
        assert_eq!(config.seed, None);
    }

    #[test]
    fn yaml_variant_applies_its_preset() {
        let f = yaml_tempfile("variant: earliest\n");
        let config = SimConfig::load_from_file(f.path()).unwrap();
        assert_eq!(config.variant, Variant::Earliest);
        assert_eq!(config.vms_per_server, 10);
        assert!(config.dag.independent_draws);
        assert!(!config.dag.decompose);
        assert_eq!(config.dag.deadline_slack_ms, MillisRange::new(50, 5000));
    }

    #[test]
    fn explicit_fields_override_the_yaml_variant_preset() {
        let yaml = r#"
variant: baseline
vms_per_server: 4
dag:
  decompose: true
"#;
        let f = yaml_tempfile(yaml);
        let config = SimConfig::load_from_file(f.path()).unwrap();
        assert_eq!(config.variant, Variant::Baseline);
        assert_eq!(config.vms_per_server, 4);
        assert!(config.dag.decompose);
        assert!(config.dag.independent_draws, "preset kept for absent field");
        assert_eq!(config.dag.max_subtasks, 5);
    }

    #[test]
    fn empty_yaml_is_the_default() {
        let f = yaml_tempfile("");
        assert_eq!(SimConfig::load_from_file(f.path()).unwrap(), SimConfig::default());
    }

    #[test]
    fn unknown_yaml_variant_returns_error() {
        let f = yaml_tempfile("variant: newest\n");
        assert!(SimConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(SimConfig::load_from_file(Path::new("/nonexistent/path/sim.yaml")).is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(SimConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn zero_servers_fail_validation() {
        let f = yaml_tempfile("server_count: 0\n");
        let err = SimConfig::load_from_file(f.path()).unwrap_err();
        assert!(format!("{err:#}").contains("server_count"));
    }

    #[test]
    fn inverted_range_fails_validation() {
        let mut config = SimConfig::default();
        config.dag.runtime_ms = MillisRange::new(10, 1);
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.pass_interval = -1.0;
        assert!(config.validate().is_err());
    }
}
