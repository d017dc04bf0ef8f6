use crate::error::EngineError;
use alerter::Notifier;
use api_client::{ApiClient, OrderRequest};
use backtester::BacktestResult;
use configuration::Config;
use core_types::{OrderSide, PriceSeries};
use optimizer::Optimizer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strategies::{FireTrigger, RsiBbStrategy, StrategyState, TradeAction};
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};

pub mod error;
pub mod scheduler;

pub use scheduler::{CycleScheduler, TickPlan};

/// What one strategy cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Evaluated {
        actions: Vec<TradeAction>,
        orders_submitted: usize,
        orders_failed: usize,
    },
    /// The cycle could not run; the state is unchanged.
    Skipped { reason: String },
}

/// What one optimizer pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationReport {
    /// The winner's parameters are now live.
    Published(BacktestResult),
    /// Nothing beat holding; the live parameters are unchanged.
    NoAdequateParameters,
    Failed { reason: String },
    /// Another pass was still in flight.
    AlreadyRunning,
}

/// Releases the in-flight flag when the pass ends, however it ends.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The central orchestrator for the live trading bot.
///
/// Cheap to clone: every clone shares the same state, collaborators and optimizer
/// guard, which is how the background optimizer task gets its handle.
#[derive(Clone)]
pub struct LiveEngine {
    // --- Configuration ---
    config: Arc<Config>,
    strategy: RsiBbStrategy,

    // --- Shared, Thread-Safe Components ---
    api_client: Arc<dyn ApiClient>,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<StrategyState>>,
    optimizer: Arc<Optimizer>,
    optimizer_running: Arc<AtomicBool>,
}

impl LiveEngine {
    /// Creates a new `LiveEngine` running the seed parameters with no watch and no
    /// stop-loss armed. `init` replaces that with a state matching the account.
    pub fn new(
        config: Config,
        api_client: Arc<dyn ApiClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let strategy = RsiBbStrategy::new(config.strategy.clone())?;
        let optimizer = Optimizer::new(
            config.optimizer.clone(),
            config.strategy.clone(),
            config.simulation.clone(),
        )?;
        let state = StrategyState::new(config.strategy.seed);

        Ok(Self {
            config: Arc::new(config),
            strategy,
            api_client,
            notifier,
            state: Arc::new(Mutex::new(state)),
            optimizer: Arc::new(optimizer),
            optimizer_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A copy of the live state.
    pub async fn state(&self) -> StrategyState {
        *self.state.lock().await
    }

    pub fn is_optimizing(&self) -> bool {
        self.optimizer_running.load(Ordering::Acquire)
    }

    /// Arms the start-up stop-loss on whichever side the account currently holds.
    pub async fn init(&self) -> Result<(), EngineError> {
        let bot = &self.config.bot;
        let series = self.fetch_history().await?;
        let last_bar = *series
            .last()
            .ok_or_else(|| EngineError::EmptyHistory(bot.symbol()))?;
        let holdings = self.api_client.get_holdings(&bot.base, &bot.quote).await?;

        let seeded = StrategyState::seeded(
            self.config.strategy.seed,
            &holdings,
            &last_bar,
            self.config.strategy.stop_loss_portion,
        );
        *self.state.lock().await = seeded;

        tracing::info!(
            symbol = %bot.symbol(),
            base = %holdings.base,
            quote = %holdings.quote,
            stop_loss_lower = seeded.stop_loss_lower,
            stop_loss_upper = seeded.stop_loss_upper,
            "Engine initialized"
        );
        self.send(&format!(
            "Bot started on {} ({} mode)",
            bot.symbol(),
            if bot.live_trading_enabled { "live" } else { "testnet" }
        ))
        .await;
        Ok(())
    }

    async fn fetch_history(&self) -> Result<PriceSeries, EngineError> {
        let bot = &self.config.bot;
        Ok(self
            .api_client
            .fetch_bars(&bot.base, &bot.quote, bot.interval_minutes)
            .await?)
    }

    /// Runs one step of the state machine on the two most recent bars of `series`.
    ///
    /// The successor state is committed before any order goes out, and is kept
    /// even when an order fails: the exchange collaborator owns retries.
    pub async fn evaluate_cycle(&self, series: &PriceSeries) -> CycleOutcome {
        let transition = {
            let mut state = self.state.lock().await;
            match self.strategy.evaluate(&state, series) {
                Ok(transition) => {
                    *state = transition.state;
                    transition
                }
                Err(e) => {
                    drop(state);
                    tracing::warn!(error = %e, "Strategy cycle skipped");
                    self.send(&format!("Cycle skipped: {}", e)).await;
                    return CycleOutcome::Skipped { reason: e.to_string() };
                }
            }
        };

        tracing::debug!(
            in_sell_period = transition.state.in_sell_period,
            in_buy_period = transition.state.in_buy_period,
            stop_loss_upper = transition.state.stop_loss_upper,
            stop_loss_lower = transition.state.stop_loss_lower,
            "Cycle committed"
        );

        let mut orders_submitted = 0;
        let mut orders_failed = 0;
        for action in &transition.actions {
            self.send(&self.describe(action)).await;

            let Some((side, price_hint)) = action.order() else {
                continue;
            };
            if self.place_order(side, price_hint).await {
                orders_submitted += 1;
            } else {
                orders_failed += 1;
            }
        }

        CycleOutcome::Evaluated {
            actions: transition.actions,
            orders_submitted,
            orders_failed,
        }
    }

    async fn place_order(&self, side: OrderSide, price_hint: f64) -> bool {
        let bot = &self.config.bot;
        let request = OrderRequest {
            side,
            base: &bot.base,
            quote: &bot.quote,
            price_hint,
            fraction: self.config.strategy.trade_fraction,
        };
        match self.api_client.submit_order(&request).await {
            Ok(response) => {
                tracing::info!(
                    order_id = response.order_id,
                    status = %response.status,
                    executed_qty = %response.executed_qty,
                    "Order accepted"
                );
                true
            }
            Err(e) => {
                tracing::error!(error = %e, ?side, price_hint, "Order submission failed");
                self.send(&format!("{:?} order failed: {}", side, e)).await;
                false
            }
        }
    }

    /// Runs one optimizer pass over `series` and publishes the winner.
    ///
    /// The search itself runs on the blocking pool; the caller only waits for it.
    pub async fn run_optimization(&self, series: PriceSeries) -> OptimizationReport {
        let Some(_guard) = InFlight::acquire(&self.optimizer_running) else {
            tracing::debug!("Optimizer pass already in flight");
            return OptimizationReport::AlreadyRunning;
        };

        let optimizer = Arc::clone(&self.optimizer);
        let joined = tokio::task::spawn_blocking(move || optimizer.run(&series)).await;

        let report = match joined {
            Ok(Ok(Some(outcome))) => {
                self.publish(&outcome.best).await;
                OptimizationReport::Published(outcome.best)
            }
            Ok(Ok(None)) => OptimizationReport::NoAdequateParameters,
            Ok(Err(e)) => OptimizationReport::Failed { reason: e.to_string() },
            Err(e) => OptimizationReport::Failed { reason: format!("optimizer task panicked: {}", e) },
        };

        match &report {
            OptimizationReport::Published(best) => {
                let p = best.params;
                self.send(&format!(
                    "New parameters: RSI {} [{} / {}], BB {} x {} (delta {:.4})",
                    p.rsi_period, p.rsi_lower_bound, p.rsi_upper_bound, p.bb_period, p.bb_level, best.delta
                ))
                .await;
            }
            OptimizationReport::NoAdequateParameters => {
                self.send("No adequate parameters found").await;
            }
            OptimizationReport::Failed { reason } => {
                tracing::error!(%reason, "Optimizer pass failed");
                self.send(&format!("Optimizer failed: {}", reason)).await;
            }
            OptimizationReport::AlreadyRunning => {}
        }
        report
    }

    /// Starts an optimizer pass in the background unless one is already running.
    /// Returns whether a pass was started.
    pub fn launch_optimizer(&self, series: PriceSeries) -> bool {
        if self.is_optimizing() {
            return false;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_optimization(series).await;
        });
        true
    }

    /// Makes `result`'s parameters live.
    ///
    /// A watch the optimizer's replay ended in is carried over, but a watch the
    /// live state is already in is never cleared.
    pub async fn publish(&self, result: &BacktestResult) {
        let mut state = self.state.lock().await;
        state.params = result.params;
        if !state.in_sell_period {
            state.in_sell_period = result.end_in_sell_period;
        }
        if !state.in_buy_period {
            state.in_buy_period = result.end_in_buy_period;
        }
        tracing::info!(params = ?result.params, delta = result.delta, "Published new parameters");
    }

    /// The main loop: polls the clock and runs whatever the scheduler asks for,
    /// until Ctrl-C.
    pub async fn run(&self) -> Result<(), EngineError> {
        self.init().await?;

        let mut scheduler = CycleScheduler::new(&self.config.scheduler);
        let mut timer = interval(Duration::from_secs(self.config.scheduler.tick_seconds));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(symbol = %self.config.bot.symbol(), "Engine is running");

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown requested");
                    self.send("Bot stopped").await;
                    return Ok(());
                }
            }

            let plan = scheduler.plan(chrono::Utc::now());
            if plan.is_idle() {
                continue;
            }

            let series = match self.fetch_history().await {
                Ok(series) => series,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch history");
                    self.send(&format!("Failed to fetch history: {}", e)).await;
                    continue;
                }
            };

            // The optimizer goes first so it never waits behind order submission.
            if plan.launch_optimizer && !self.launch_optimizer(series.clone()) {
                tracing::debug!("Skipping optimizer launch, previous pass still running");
            }
            if plan.run_cycle {
                let outcome = self.evaluate_cycle(&series).await;
                tracing::debug!(?outcome, "Cycle finished");
            }
        }
    }

    fn describe(&self, action: &TradeAction) -> String {
        let bot = &self.config.bot;
        match *action {
            TradeAction::SellWatchEntered => {
                format!("Sell signal on {}: overbought, waiting for the turn", bot.symbol())
            }
            TradeAction::BuyWatchEntered => {
                format!("Buy signal on {}: oversold, waiting for the turn", bot.symbol())
            }
            TradeAction::Sell { price, trigger: FireTrigger::Signal } => {
                format!("Selling {} at ~{:.2} {}", bot.base, price, bot.quote)
            }
            TradeAction::Sell { price, trigger: FireTrigger::StopLoss } => {
                format!("Stop-loss hit: selling {} at ~{:.2} {}", bot.base, price, bot.quote)
            }
            TradeAction::Buy { price, trigger: FireTrigger::Signal } => {
                format!("Buying {} at ~{:.2} {}", bot.base, price, bot.quote)
            }
            TradeAction::Buy { price, trigger: FireTrigger::StopLoss } => {
                format!("Stop-loss hit: buying {} at ~{:.2} {}", bot.base, price, bot.quote)
            }
            TradeAction::DoubleSellSuppressed => {
                "Double sell suppressed: the last sell's stop-loss is still armed".to_string()
            }
            TradeAction::DoubleBuySuppressed => {
                "Double buy suppressed: the last buy's stop-loss is still armed".to_string()
            }
        }
    }

    async fn send(&self, message: &str) {
        if let Err(e) = self.notifier.notify(message).await {
            tracing::error!(error = %e, "Failed to send notification");
        }
    }
}
