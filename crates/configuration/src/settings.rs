use crate::error::ConfigError;
use crate::optimizer_config::OptimizerConfig;
use core_types::{ParameterSet, PriceSource};
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot: BotConfig,
    pub strategy: StrategyConfig,
    pub simulation: SimulationConfig,
    pub optimizer: OptimizerConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
    pub telegram: TelegramConfig,
}

impl Config {
    /// Checks the cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy
            .seed
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("strategy.seed: {}", e)))?;

        let fraction = |name: &str, v: f64| {
            if v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(ConfigError::ValidationError(format!(
                    "{} must lie in (0, 1], got {}",
                    name, v
                )))
            }
        };
        fraction("strategy.trade_fraction", self.strategy.trade_fraction)?;
        fraction("strategy.stop_loss_portion", self.strategy.stop_loss_portion)?;
        fraction("simulation.fee_factor", self.simulation.fee_factor)?;
        fraction("simulation.fill_portion", self.simulation.fill_portion)?;

        if self.strategy.hysteresis_margin < 0.0 {
            return Err(ConfigError::ValidationError(
                "strategy.hysteresis_margin cannot be negative".to_string(),
            ));
        }
        if self.simulation.starting_usd <= 0.0 {
            return Err(ConfigError::ValidationError(
                "simulation.starting_usd must be positive".to_string(),
            ));
        }
        if self.bot.interval_minutes == 0
            || self.scheduler.cycle_every_minutes == 0
            || self.scheduler.optimize_every_minutes == 0
            || self.scheduler.tick_seconds == 0
        {
            return Err(ConfigError::ValidationError(
                "intervals and cadences must be non-zero".to_string(),
            ));
        }
        self.optimizer.validate()?;
        Ok(())
    }
}

/// Which market the bot trades and how much history it pulls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The traded (crypto) currency, e.g. "BTC".
    pub base: String,
    /// The currency it is priced in, e.g. "USDT".
    pub quote: String,
    /// Bar width in minutes.
    pub interval_minutes: u32,
    /// How many bars to request for every cycle and optimizer pass.
    pub history_limit: usize,
    /// When false, orders go to the exchange testnet.
    pub live_trading_enabled: bool,
}

impl BotConfig {
    /// The exchange symbol of the pair, e.g. "BTCUSDT".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            interval_minutes: 15,
            history_limit: 300,
            live_trading_enabled: false,
        }
    }
}

/// Settings of the live RSI/Bollinger state machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Parameters the bot starts with, before the first optimizer pass.
    pub seed: ParameterSet,
    /// RSI points the indicator must retreat past a bound before a watch fires.
    pub hysteresis_margin: f64,
    /// Distance of the stop-loss from the reference price (0.03 = 3%).
    pub stop_loss_portion: f64,
    /// Fraction of the spent currency moved by a live order.
    pub trade_fraction: f64,
    pub price_source: PriceSource,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            seed: ParameterSet::default(),
            hysteresis_margin: 3.0,
            stop_loss_portion: 0.03,
            trade_fraction: 0.99,
            price_source: PriceSource::Close,
        }
    }
}

/// Constants of the backtest wallet simulation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Multiplier applied to every simulated fill (0.995 = 0.5% fee).
    pub fee_factor: f64,
    /// Portion of the spent balance moved by a simulated fill.
    pub fill_portion: f64,
    /// USD side of the starting wallet; the crypto side starts at the same value.
    pub starting_usd: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fee_factor: 0.995,
            fill_portion: 0.95,
            starting_usd: 100.0,
        }
    }
}

/// Cadence of the foreground loop and the background optimizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Resolution of the polling timer.
    pub tick_seconds: u64,
    /// A strategy cycle runs on minutes divisible by this value.
    pub cycle_every_minutes: u32,
    /// An optimizer pass is launched on minutes divisible by this value.
    pub optimize_every_minutes: u32,
    /// Launch one optimizer pass right after start-up.
    pub optimize_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            cycle_every_minutes: 5,
            optimize_every_minutes: 60,
            optimize_on_start: true,
        }
    }
}

/// A single API key pair.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub key: String,
    pub secret: String,
}

/// Credentials for both exchange environments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub production: ApiKeys,
    pub testnet: ApiKeys,
    /// Decimal places order quantities are rounded down to.
    pub quantity_precision: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            production: ApiKeys::default(),
            testnet: ApiKeys::default(),
            quantity_precision: 5,
        }
    }
}

/// Telegram bot credentials. Empty values disable the alerter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}
