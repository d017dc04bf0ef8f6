use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod optimizer_config;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use optimizer_config::{FloatRange, IntRange, OptimizerConfig};
pub use settings::{
    ApiConfig, ApiKeys, BotConfig, Config, SchedulerConfig, SimulationConfig, StrategyConfig,
    TelegramConfig,
};

/// Prefix for environment overrides, e.g. `BANDWATCH__BOT__BASE=ETH`.
pub const ENV_PREFIX: &str = "BANDWATCH";

/// Loads the application configuration from a TOML file plus environment overrides.
///
/// The file is optional: every section carries defaults, so a bare environment is
/// enough to start the bot against the testnet. The result is validated before it
/// is handed out.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(path, "Configuration loaded");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config("definitely-not-here.toml").unwrap();
        assert_eq!(config.bot.base, "BTC");
        assert_eq!(config.strategy.seed.rsi_period, 10);
        assert_eq!(config.scheduler.optimize_every_minutes, 60);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[bot]
base = "LRC"
quote = "USDT"
interval_minutes = 15

[strategy]
hysteresis_margin = 5.0
price_source = "hl2"

[strategy.seed]
rsi_period = 8
rsi_upper_bound = 80.0
rsi_lower_bound = 20.0
bb_period = 14
bb_level = 2.5

[optimizer.bb_level]
start = 2.0
end = 3.0
step = 0.5
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = load_config(&path).unwrap();
        assert_eq!(config.bot.base, "LRC");
        assert_eq!(config.strategy.hysteresis_margin, 5.0);
        assert_eq!(config.strategy.price_source, core_types::PriceSource::Hl2);
        assert_eq!(config.strategy.seed.bb_period, 14);
        assert_eq!(config.optimizer.bb_level.values(), vec![2.0, 2.5, 3.0]);
        // Untouched sections keep their defaults.
        assert_eq!(config.simulation.fee_factor, 0.995);
    }

    #[test]
    fn invalid_seed_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[strategy.seed]
rsi_period = 12
rsi_upper_bound = 74.0
rsi_lower_bound = 16.0
bb_period = 8
bb_level = 3.0
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
