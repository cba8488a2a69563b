/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use vmsched::config::{Scale, SimConfig, Variant};
use vmsched::driver::{self, RunReport};
use vmsched::energy::CostMode;

// ── CLI argument definition ───────────────────────────────────────────────────

/// DAG task placement simulator.
///
/// Example:
///   vmsched --trace batch_task.txt --tasks 5000 --servers 200 \
///           --variant all --seed 42
#[derive(Debug, Parser)]
#[command(
    name = "vmsched",
    about = "DAG task placement simulator over VM-partitioned servers",
    long_about = None,
)]
struct Cli {
    /// YAML simulation configuration; command-line flags override it.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Input trace file.
    #[arg(short = 't', long = "trace")]
    trace: Option<PathBuf>,

    /// Stop reading the trace after this many tasks.
    #[arg(short = 'n', long = "tasks")]
    tasks: Option<usize>,

    /// Number of servers.
    #[arg(short = 's', long = "servers")]
    servers: Option<usize>,

    /// VMs per server (defaults to the variant's preset).
    #[arg(long = "vms")]
    vms: Option<usize>,

    /// Experiment scale: small or large.
    #[arg(long = "scale")]
    scale: Option<Scale>,

    /// Variant preset to run: earliest, baseline, improved, or `all` to run
    /// every variant in parallel.
    #[arg(short = 'v', long = "variant")]
    variant: Option<VariantChoice>,

    /// Seed for reproducible runs.
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Cost accumulation: per-event or time-integrated.
    #[arg(long = "cost-mode")]
    cost_mode: Option<CostMode>,

    /// Placement policy name.
    #[arg(short = 'p', long = "policy")]
    policy: Option<String>,
}

/// One preset, or all of them.
#[derive(Debug, Clone, Copy, PartialEq)]
enum VariantChoice {
    One(Variant),
    All,
}

impl FromStr for VariantChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(VariantChoice::All),
            other => other.parse().map(VariantChoice::One),
        }
    }
}

impl Cli {
    /// Variants to run, or `None` to keep the configured one untouched.
    fn variants(&self) -> Option<Vec<Variant>> {
        self.variant.map(|choice| match choice {
            VariantChoice::One(v) => vec![v],
            VariantChoice::All => Variant::ALL.to_vec(),
        })
    }

    /// Apply explicit flags on top of `config`.
    fn override_fields(&self, config: &mut SimConfig) {
        if let Some(path) = &self.trace {
            config.trace_file = Some(path.clone());
        }
        if let Some(n) = self.tasks {
            config.task_count_cap = n;
        }
        if let Some(n) = self.servers {
            config.server_count = n;
        }
        if let Some(n) = self.vms {
            config.vms_per_server = n;
        }
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(mode) = self.cost_mode {
            config.cost_mode = mode;
        }
        if let Some(policy) = &self.policy {
            config.policy = policy.clone();
        }
    }

    /// One configuration per requested run.
    fn build_configs(&self) -> Result<Vec<SimConfig>> {
        let base = match &self.config {
            Some(path) => SimConfig::load_from_file(path)?,
            None => {
                warn!("No configuration file provided, using defaults");
                SimConfig::default()
            }
        };

        // the loaded base already carries its own variant's preset
        let explicit_preset = self.variant.is_some();
        let variants = self.variants().unwrap_or_else(|| vec![base.variant]);
        variants
            .into_iter()
            .map(|variant| {
                let mut config = base.clone();
                if explicit_preset {
                    variant.apply(&mut config);
                }
                self.override_fields(&mut config);
                config
                    .validate()
                    .with_context(|| format!("Invalid configuration for variant {variant}"))?;
                Ok(config)
            })
            .collect()
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!(
        config  = ?cli.config,
        trace   = ?cli.trace,
        tasks   = ?cli.tasks,
        servers = ?cli.servers,
        variant = ?cli.variant,
        seed    = ?cli.seed,
        "Configuration"
    );

    match run(&cli).await {
        Ok(reports) => {
            println!("{}", RunReport::HEADER);
            for report in reports {
                println!("{report}");
            }
        }
        Err(e) => {
            error!("Simulation failed: {:#}", e);
            process::exit(1);
        }
    }
}

/// Run every requested configuration on its own blocking worker.
async fn run(cli: &Cli) -> Result<Vec<RunReport>> {
    let configs = cli.build_configs()?;

    let handles: Vec<_> = configs
        .into_iter()
        .map(|config| tokio::task::spawn_blocking(move || driver::run(&config)))
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle.await.context("simulation worker panicked")??;
        reports.push(report);
    }
    Ok(reports)
}
