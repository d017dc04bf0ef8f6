use configuration::OptimizerConfig;
use core_types::ParameterSet;
use itertools::iproduct;

/// Every valid parameter set for one RSI period, in discovery order.
///
/// The nesting is upper bound, lower bound, Bollinger period, Bollinger level, with
/// the last one varying fastest. Combinations that fail `ParameterSet::validate`
/// are dropped here so the backtester never sees them.
pub fn parameter_sets_for(config: &OptimizerConfig, rsi_period: usize) -> Vec<ParameterSet> {
    iproduct!(
        config.rsi_upper_bound.values(),
        config.rsi_lower_bound.values(),
        config.bb_periods(rsi_period),
        config.bb_level.values()
    )
    .map(|(upper, lower, bb_period, bb_level)| ParameterSet {
        rsi_period,
        rsi_upper_bound: upper,
        rsi_lower_bound: lower,
        bb_period,
        bb_level,
    })
    .filter(|params| params.validate().is_ok())
    .collect()
}

/// The whole grid, grouped by RSI period in ascending discovery order.
pub fn parameter_grid(config: &OptimizerConfig) -> Vec<(usize, Vec<ParameterSet>)> {
    config
        .rsi_period
        .values()
        .into_iter()
        .map(|period| (period, parameter_sets_for(config, period)))
        .collect()
}
