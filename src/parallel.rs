//! Independent replications of one scenario.
//!
//! A replication builds its own [`Scenario`] from a shared configuration with
//! a different seed and runs it to completion. Runs share nothing, so with
//! the `parallel` feature they are spread over a rayon thread pool; without
//! it they run one after the other. Either way the results come back in seed
//! order and are identical.
//!
//! # Feature Flag
//!
//! Parallel execution requires the `parallel` feature (on by default):
//! ```toml
//! [dependencies]
//! aerosim = { version = "0.1", features = ["parallel"] }
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ConfigResult, ScenarioConfig};
use crate::packet::FlowKey;
use crate::scenario::Scenario;
use crate::scheduler::RunSummary;
use crate::stats::{FlowReport, Timer};

/// Result of one replication.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Replication {
    /// Seed the run used
    pub seed: u64,
    /// How the run ended
    pub summary: RunSummary,
    /// Per-flow report over the configured stop time
    pub report: BTreeMap<FlowKey, FlowReport>,
}

/// Throughput of one flow across replications.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThroughputSummary {
    /// Number of replications the flow appeared in
    pub runs: usize,
    pub mean_bps: f64,
    pub min_bps: f64,
    pub max_bps: f64,
}

/// Runs one replication of `config` with `seed`.
pub fn run_replication(config: &ScenarioConfig, seed: u64) -> ConfigResult<Replication> {
    let mut config = config.clone();
    config.simulation.seed = seed;

    let mut scenario = Scenario::from_config(&config)?;
    let summary = scenario.run();
    let report = scenario.simulation().report()?;

    Ok(Replication {
        seed,
        summary,
        report,
    })
}

/// Returns `count` consecutive seeds starting at `base`.
pub fn seeds(base: u64, count: usize) -> Vec<u64> {
    (0..count as u64).map(|i| base.wrapping_add(i)).collect()
}

/// Runs replications of one scenario.
///
/// # Example
///
/// ```
/// use aerosim::config::ScenarioConfig;
/// use aerosim::parallel::{seeds, ReplicationRunner};
///
/// let config = ScenarioConfig::from_yaml(r#"
/// simulation: { stop_time: 1s }
/// groups:
///   - { name: a, network: 10.0.0.0 }
/// "#)?;
///
/// let results = ReplicationRunner::new().with_threads(2).run(&config, &seeds(1, 4))?;
/// assert_eq!(results.len(), 4);
/// assert_eq!(results[3].seed, 4);
/// # Ok::<(), aerosim::config::ConfigError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReplicationRunner {
    /// Worker threads; 0 uses rayon's global pool
    num_threads: usize,
}

impl ReplicationRunner {
    /// Creates a runner using the global thread pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Returns the configured number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs one replication per seed, sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn run(&self, config: &ScenarioConfig, seeds: &[u64]) -> ConfigResult<Vec<Replication>> {
        let timer = Timer::start();
        let results = run_sequential(config, seeds);
        tracing::info!(runs = seeds.len(), wall_ms = timer.elapsed_ms(), "replications finished");
        results
    }

    /// Runs one replication per seed on worker threads.
    #[cfg(feature = "parallel")]
    pub fn run(&self, config: &ScenarioConfig, seeds: &[u64]) -> ConfigResult<Vec<Replication>> {
        let timer = Timer::start();
        let run_all = || -> ConfigResult<Vec<Replication>> {
            seeds
                .par_iter()
                .map(|&seed| run_replication(config, seed))
                .collect()
        };

        let results = if self.num_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build()
            {
                Ok(pool) => pool.install(run_all),
                Err(err) => {
                    tracing::warn!(%err, "could not build thread pool, using the global one");
                    run_all()
                }
            }
        } else {
            run_all()
        };

        tracing::info!(
            runs = seeds.len(),
            threads = self.num_threads,
            wall_ms = timer.elapsed_ms(),
            "replications finished"
        );
        results
    }
}

/// Runs one replication per seed on the current thread.
pub fn run_sequential(config: &ScenarioConfig, seeds: &[u64]) -> ConfigResult<Vec<Replication>> {
    seeds
        .iter()
        .map(|&seed| run_replication(config, seed))
        .collect()
}

/// Runs one replication per seed with the default runner.
pub fn run_replications(config: &ScenarioConfig, seeds: &[u64]) -> ConfigResult<Vec<Replication>> {
    ReplicationRunner::new().run(config, seeds)
}

/// Aggregates per-flow throughput over replications.
pub fn summarize(replications: &[Replication]) -> BTreeMap<FlowKey, ThroughputSummary> {
    let mut samples: BTreeMap<FlowKey, Vec<f64>> = BTreeMap::new();
    for replication in replications {
        for (key, report) in &replication.report {
            samples.entry(*key).or_default().push(report.throughput_bps);
        }
    }

    samples
        .into_iter()
        .map(|(key, values)| {
            let runs = values.len();
            let summary = ThroughputSummary {
                runs,
                mean_bps: values.iter().sum::<f64>() / runs as f64,
                min_bps: values.iter().copied().fold(f64::INFINITY, f64::min),
                max_bps: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            (key, summary)
        })
        .collect()
}
