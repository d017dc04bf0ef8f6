use crate::error::BacktestError;
use configuration::{SimulationConfig, StrategyConfig};
use core_types::{ParameterSet, PriceSeries};
use serde::{Deserialize, Serialize};
use strategies::{IndicatorFrame, RsiBbStrategy, StrategyState, TradeAction};

pub mod error;

/// The outcome of replaying one `ParameterSet` over a window of history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Excess return of the simulated strategy over holding the starting wallet.
    pub delta: f64,
    pub params: ParameterSet,
    pub end_in_sell_period: bool,
    pub end_in_buy_period: bool,
    /// Number of simulated fills.
    pub trades: usize,
    /// Wallet value at the end of the window, in quote currency.
    pub final_wallet: f64,
}

impl BacktestResult {
    /// Only runs that beat the baseline are worth publishing.
    pub fn is_candidate(&self) -> bool {
        self.delta > 0.0
    }
}

/// The two-currency wallet of a simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Wallet {
    usd: f64,
    crypto: f64,
}

impl Wallet {
    fn sell(&mut self, price: f64, sim: &SimulationConfig) {
        self.usd += self.crypto * price * sim.fee_factor * sim.fill_portion;
        self.crypto *= 1.0 - sim.fill_portion;
    }

    fn buy(&mut self, price: f64, sim: &SimulationConfig) {
        self.crypto += self.usd * sim.fee_factor * sim.fill_portion / price;
        self.usd *= 1.0 - sim.fill_portion;
    }

    fn value(&self, price: f64) -> f64 {
        self.usd + self.crypto * price
    }
}

/// The backtesting engine.
///
/// A pure calculator: every run starts from a fresh `StrategyState` and a fresh
/// wallet, so identical inputs always yield identical results and runs can be
/// executed in parallel.
#[derive(Debug, Clone)]
pub struct Backtester {
    strategy: RsiBbStrategy,
    simulation: SimulationConfig,
}

impl Backtester {
    pub fn new(
        strategy_config: StrategyConfig,
        simulation: SimulationConfig,
    ) -> Result<Self, BacktestError> {
        Ok(Self {
            strategy: RsiBbStrategy::new(strategy_config)?,
            simulation,
        })
    }

    pub fn strategy(&self) -> &RsiBbStrategy {
        &self.strategy
    }

    /// Replays `params` over `series`.
    pub fn run(
        &self,
        series: &PriceSeries,
        params: &ParameterSet,
    ) -> Result<BacktestResult, BacktestError> {
        let frame = self.strategy.frame(series, params)?;
        self.run_frame(&frame, params)
    }

    /// Replays `params` over an already aligned frame.
    pub fn run_frame(
        &self,
        frame: &IndicatorFrame,
        params: &ParameterSet,
    ) -> Result<BacktestResult, BacktestError> {
        let points = frame.points();
        if points.len() < 2 {
            return Err(BacktestError::DataUnavailable {
                needed: params.lookback() + 1,
                available: params.lookback() - 1 + points.len(),
            });
        }

        let sim = &self.simulation;
        let first_price = points[0].price;
        let last_price = points[points.len() - 1].price;

        // Equal value on both sides at the first bar.
        let start = Wallet {
            usd: sim.starting_usd,
            crypto: sim.starting_usd / first_price,
        };
        let start_value = 2.0 * sim.starting_usd;

        let mut wallet = start;
        let mut state = StrategyState::new(*params);
        let mut trades = 0;

        for pair in points.windows(2) {
            let transition = self.strategy.step(&state, &pair[0], &pair[1])?;
            for action in &transition.actions {
                match *action {
                    TradeAction::Sell { price, .. } => {
                        wallet.sell(price, sim);
                        trades += 1;
                    }
                    TradeAction::Buy { price, .. } => {
                        wallet.buy(price, sim);
                        trades += 1;
                    }
                    _ => {}
                }
            }
            state = transition.state;
        }

        let final_wallet = wallet.value(last_price);
        // Equivalent to actionGainLoss - noActionGainLoss, where the baseline is the
        // untouched starting wallet; a run without fills lands exactly on zero.
        let delta = (final_wallet - start.value(last_price)) / start_value;

        tracing::trace!(?params, delta, trades, "Backtest finished");

        Ok(BacktestResult {
            delta,
            params: *params,
            end_in_sell_period: state.in_sell_period,
            end_in_buy_period: state.in_buy_period,
            trades,
            final_wallet,
        })
    }
}
