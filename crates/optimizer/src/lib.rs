use crate::error::OptimizerError;
use crate::generator::parameter_grid;
use backtester::{BacktestResult, Backtester};
use configuration::{OptimizerConfig, SimulationConfig, StrategyConfig};
use core_types::PriceSeries;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

pub mod error;
pub mod generator;

/// The result of one optimizer pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationOutcome {
    /// The winning parameter set and its simulated run.
    pub best: BacktestResult,
    /// The pool the winner was picked from, sorted ascending by delta.
    pub candidates: Vec<BacktestResult>,
    /// Number of parameter sets that were backtested.
    pub evaluated: usize,
}

/// Grid-searches the strategy parameters over a window of history.
pub struct Optimizer {
    config: OptimizerConfig,
    backtester: Backtester,
    show_progress: bool,
}

impl Optimizer {
    pub fn new(
        config: OptimizerConfig,
        strategy: StrategyConfig,
        simulation: SimulationConfig,
    ) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self {
            config,
            backtester: Backtester::new(strategy, simulation)?,
            show_progress: false,
        })
    }

    /// Draws a progress bar on the terminal while the pass runs.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// The shortest history a pass accepts: every grid point needs at least two
    /// aligned bars.
    pub fn required_history(&self) -> usize {
        self.config.max_bb_period() + 1
    }

    /// Runs one full pass over `series`.
    ///
    /// Returns `Ok(None)` when no parameter set beat simply holding the starting
    /// wallet. This is a normal outcome; the caller keeps its current parameters.
    pub fn run(&self, series: &PriceSeries) -> Result<Option<OptimizationOutcome>, OptimizerError> {
        let needed = self.required_history();
        if series.len() < needed {
            return Err(OptimizerError::InsufficientHistory {
                needed,
                available: series.len(),
            });
        }

        let grid = parameter_grid(&self.config);
        let total: usize = grid.iter().map(|(_, sets)| sets.len()).sum();

        tracing::info!(
            combinations = total,
            bars = series.len(),
            threads = rayon::current_num_threads(),
            "Starting optimization pass"
        );

        let progress_bar = if self.show_progress {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                    .progress_chars("=>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut pool = Vec::new();
        for (rsi_period, sets) in &grid {
            // `collect` on an indexed parallel iterator keeps the input order, which
            // the candidate filter below depends on.
            let results = sets
                .par_iter()
                .map(|params| {
                    let result = self.backtester.run(series, params);
                    progress_bar.inc(1);
                    result
                })
                .collect::<Result<Vec<_>, _>>()?;

            let kept = select_candidates(&results, self.config.keep_per_rsi_period);
            tracing::debug!(rsi_period, evaluated = results.len(), kept = kept.len(), "RSI period done");
            pool.extend(kept);
        }

        progress_bar.finish_with_message("Optimization pass complete.");

        let outcome = pick_best(pool).map(|(best, candidates)| OptimizationOutcome {
            best,
            candidates,
            evaluated: total,
        });

        match &outcome {
            Some(o) => tracing::info!(params = ?o.best.params, delta = o.best.delta, "Optimizer found parameters"),
            None => tracing::info!("No adequate parameters found"),
        }

        Ok(outcome)
    }
}

/// The high-water-mark filter over results in discovery order.
///
/// A result is kept when it beats holding (`delta > 0`) and is at least as good as
/// everything kept before it. Only the last `keep` survivors are returned, so the
/// output is ascending in delta but is not necessarily the global top `keep`.
pub fn select_candidates(results: &[BacktestResult], keep: usize) -> Vec<BacktestResult> {
    let mut best = 0.0;
    let mut kept: Vec<BacktestResult> = Vec::new();
    for result in results {
        if result.is_candidate() && result.delta >= best {
            best = result.delta;
            kept.push(*result);
        }
    }
    let skip = kept.len().saturating_sub(keep);
    kept.split_off(skip)
}

/// Sorts the pool ascending by delta and takes the last element. Equal deltas keep
/// their discovery order, so the later one wins.
pub fn pick_best(mut pool: Vec<BacktestResult>) -> Option<(BacktestResult, Vec<BacktestResult>)> {
    pool.sort_by(|a, b| a.delta.total_cmp(&b.delta));
    let best = *pool.last()?;
    Some((best, pool))
}
