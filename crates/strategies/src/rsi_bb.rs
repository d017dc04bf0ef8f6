use crate::error::StrategyError;
use crate::indicators::{FramePoint, IndicatorFrame};
use configuration::StrategyConfig;
use core_types::{Holdings, OrderSide, ParameterSet, PriceBar, PriceSeries};
use serde::{Deserialize, Serialize};

/// Everything the state machine remembers between invocations.
///
/// Both stop-loss levels use `0.0` for "inactive".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub in_sell_period: bool,
    pub in_buy_period: bool,
    pub stop_loss_upper: f64,
    pub stop_loss_lower: f64,
    pub params: ParameterSet,
}

impl StrategyState {
    /// A fresh state with no watch and no stop-loss armed.
    pub fn new(params: ParameterSet) -> Self {
        Self {
            in_sell_period: false,
            in_buy_period: false,
            stop_loss_upper: 0.0,
            stop_loss_lower: 0.0,
            params,
        }
    }

    /// The start-up state: a stop-loss protecting whichever side the account
    /// currently holds.
    pub fn seeded(
        params: ParameterSet,
        holdings: &Holdings,
        last_bar: &PriceBar,
        stop_loss_portion: f64,
    ) -> Self {
        let mut state = Self::new(params);
        if holdings.is_long(last_bar.close) {
            state.stop_loss_lower = last_bar.low * (1.0 - stop_loss_portion);
        } else {
            state.stop_loss_upper = last_bar.high * (1.0 + stop_loss_portion);
        }
        state
    }
}

/// Why an order was fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireTrigger {
    /// A watch period ended.
    Signal,
    /// A stop-loss level was breached.
    StopLoss,
}

/// One observable outcome of a state-machine step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradeAction {
    SellWatchEntered,
    BuyWatchEntered,
    Sell { price: f64, trigger: FireTrigger },
    Buy { price: f64, trigger: FireTrigger },
    /// A sell fired while the previous sell's stop-loss was still armed.
    DoubleSellSuppressed,
    /// A buy fired while the previous buy's stop-loss was still armed.
    DoubleBuySuppressed,
}

impl TradeAction {
    /// The order this action asks for, if any, as `(side, price hint)`.
    pub fn order(&self) -> Option<(OrderSide, f64)> {
        match *self {
            TradeAction::Sell { price, .. } => Some((OrderSide::Sell, price)),
            TradeAction::Buy { price, .. } => Some((OrderSide::Buy, price)),
            _ => None,
        }
    }
}

/// The successor state and the actions that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: StrategyState,
    pub actions: Vec<TradeAction>,
}

/// The RSI + Bollinger Bands hysteresis state machine with a ratcheting stop-loss.
#[derive(Debug, Clone)]
pub struct RsiBbStrategy {
    config: StrategyConfig,
}

impl RsiBbStrategy {
    pub fn new(config: StrategyConfig) -> Result<Self, StrategyError> {
        if config.hysteresis_margin < 0.0 || !config.hysteresis_margin.is_finite() {
            return Err(StrategyError::InvalidParameters(
                "hysteresis_margin must be a non-negative number".to_string(),
            ));
        }
        if !(config.stop_loss_portion > 0.0 && config.stop_loss_portion < 1.0) {
            return Err(StrategyError::InvalidParameters(
                "stop_loss_portion must lie in (0, 1)".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Aligns `series` with the indicators of `params`.
    pub fn frame(
        &self,
        series: &PriceSeries,
        params: &ParameterSet,
    ) -> Result<IndicatorFrame, StrategyError> {
        IndicatorFrame::build(series, params, self.config.price_source)
    }

    /// Runs one step on the two most recent bars of `series`.
    pub fn evaluate(
        &self,
        state: &StrategyState,
        series: &PriceSeries,
    ) -> Result<Transition, StrategyError> {
        let frame = self.frame(series, &state.params)?;
        let (prev, current) = frame.latest_pair().ok_or(StrategyError::InsufficientData {
            needed: state.params.lookback() + 1,
            available: series.len(),
        })?;
        self.step(state, prev, current)
    }

    /// The transition function.
    ///
    /// Watch entries look at the previous, completed bar; exits, fires and stop-loss
    /// breaches look at the current one. The six checks run in a fixed order and
    /// later checks see the stop-loss levels written by earlier ones.
    pub fn step(
        &self,
        state: &StrategyState,
        prev: &FramePoint,
        current: &FramePoint,
    ) -> Result<Transition, StrategyError> {
        prev.ensure_finite()?;
        current.ensure_finite()?;

        let params = &state.params;
        let margin = self.config.hysteresis_margin;
        let portion = self.config.stop_loss_portion;
        let mut next = *state;
        let mut actions = Vec::new();

        tracing::debug!(
            rsi = current.rsi,
            bb_upper = current.bb_upper,
            bb_lower = current.bb_lower,
            high = current.high,
            low = current.low,
            stop_loss_upper = state.stop_loss_upper,
            stop_loss_lower = state.stop_loss_lower,
            "Evaluating RSI/BB step"
        );

        // Sell watch. Entry and exit are exclusive within one step.
        if !state.in_sell_period {
            if prev.rsi > params.rsi_upper_bound && prev.high > prev.bb_upper {
                next.in_sell_period = true;
                actions.push(TradeAction::SellWatchEntered);
            }
        } else if current.rsi <= params.rsi_upper_bound - margin && current.high <= current.bb_upper {
            if next.stop_loss_upper == 0.0 {
                actions.push(TradeAction::Sell {
                    price: current.price,
                    trigger: FireTrigger::Signal,
                });
                next.stop_loss_upper = current.high * (1.0 + portion);
                tracing::info!(price = current.price, rsi = current.rsi, "Sell signal fired");
            } else {
                tracing::warn!(stop_loss_upper = next.stop_loss_upper, "Double sell suppressed");
                actions.push(TradeAction::DoubleSellSuppressed);
            }
            next.in_sell_period = false;
            next.stop_loss_lower = 0.0;
        }

        // Buy watch.
        if !state.in_buy_period {
            if prev.rsi < params.rsi_lower_bound && prev.low < prev.bb_lower {
                next.in_buy_period = true;
                actions.push(TradeAction::BuyWatchEntered);
            }
        } else if current.rsi >= params.rsi_lower_bound + margin && current.low >= current.bb_lower {
            if next.stop_loss_lower == 0.0 {
                actions.push(TradeAction::Buy {
                    price: current.price,
                    trigger: FireTrigger::Signal,
                });
                next.stop_loss_lower = current.low * (1.0 - portion);
                tracing::info!(price = current.price, rsi = current.rsi, "Buy signal fired");
            } else {
                tracing::warn!(stop_loss_lower = next.stop_loss_lower, "Double buy suppressed");
                actions.push(TradeAction::DoubleBuySuppressed);
            }
            next.in_buy_period = false;
            next.stop_loss_upper = 0.0;
        }

        // Floor under a long position: only ever raised.
        if next.stop_loss_lower > 0.0 {
            let ratcheted = prev.low * (1.0 - portion);
            if ratcheted > next.stop_loss_lower {
                next.stop_loss_lower = ratcheted;
            }
            if current.low < next.stop_loss_lower {
                tracing::info!(low = current.low, stop = next.stop_loss_lower, "Lower stop-loss breached");
                actions.push(TradeAction::Sell {
                    price: current.close,
                    trigger: FireTrigger::StopLoss,
                });
                next.stop_loss_upper = current.high * (1.0 + portion);
                next.stop_loss_lower = 0.0;
            }
        }

        // Ceiling over a flat position: only ever lowered.
        if next.stop_loss_upper > 0.0 {
            let ratcheted = prev.high * (1.0 + portion);
            if ratcheted < next.stop_loss_upper {
                next.stop_loss_upper = ratcheted;
            }
            if current.high > next.stop_loss_upper {
                tracing::info!(high = current.high, stop = next.stop_loss_upper, "Upper stop-loss breached");
                actions.push(TradeAction::Buy {
                    price: current.close,
                    trigger: FireTrigger::StopLoss,
                });
                next.stop_loss_lower = current.low * (1.0 - portion);
                next.stop_loss_upper = 0.0;
            }
        }

        Ok(Transition { state: next, actions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn strategy() -> RsiBbStrategy {
        RsiBbStrategy::new(StrategyConfig::default()).unwrap()
    }

    fn point(rsi: f64, high: f64, low: f64, bb_upper: f64, bb_lower: f64) -> FramePoint {
        FramePoint {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            high,
            low,
            close: (high + low) / 2.0,
            price: (high + low) / 2.0,
            rsi,
            bb_upper,
            bb_middle: (bb_upper + bb_lower) / 2.0,
            bb_lower,
        }
    }

    fn neutral() -> FramePoint {
        point(50.0, 101.0, 99.0, 110.0, 90.0)
    }

    fn state() -> StrategyState {
        StrategyState::new(ParameterSet::default())
    }

    #[test]
    fn overbought_prior_bar_enters_sell_watch() {
        let prev = point(80.0, 112.0, 105.0, 110.0, 90.0);
        let t = strategy().step(&state(), &prev, &neutral()).unwrap();
        assert!(t.state.in_sell_period);
        assert_eq!(t.actions, vec![TradeAction::SellWatchEntered]);
    }

    #[test]
    fn entry_needs_both_indicators() {
        let rsi_only = point(80.0, 105.0, 100.0, 110.0, 90.0);
        let band_only = point(60.0, 112.0, 105.0, 110.0, 90.0);
        for prev in [rsi_only, band_only] {
            let t = strategy().step(&state(), &prev, &neutral()).unwrap();
            assert!(!t.state.in_sell_period);
            assert!(t.actions.is_empty());
        }
    }

    #[test]
    fn watch_is_not_cleared_in_the_step_that_set_it() {
        // The current bar would satisfy the exit condition on its own.
        let prev = point(80.0, 112.0, 105.0, 110.0, 90.0);
        let t = strategy().step(&state(), &prev, &neutral()).unwrap();
        assert!(t.state.in_sell_period);
        assert!(!t.actions.iter().any(|a| matches!(a, TradeAction::Sell { .. })));
    }

    #[test]
    fn sell_fires_after_hysteresis_margin() {
        let mut s = state();
        s.in_sell_period = true;
        s.stop_loss_lower = 90.0;

        // 72 is below the bound (74) but inside the margin: keep watching.
        let inside_margin = point(72.0, 101.0, 99.0, 110.0, 90.0);
        let t = strategy().step(&s, &neutral(), &inside_margin).unwrap();
        assert!(t.state.in_sell_period);
        assert!(t.actions.is_empty());

        let t = strategy().step(&s, &neutral(), &neutral()).unwrap();
        assert!(!t.state.in_sell_period);
        assert_eq!(t.state.stop_loss_lower, 0.0);
        assert_eq!(
            t.actions,
            vec![TradeAction::Sell { price: 100.0, trigger: FireTrigger::Signal }]
        );
        assert!((t.state.stop_loss_upper - 101.0 * 1.03).abs() < 1e-9);
    }

    #[test]
    fn double_sell_is_suppressed_but_watch_clears() {
        let mut s = state();
        s.in_sell_period = true;
        s.stop_loss_upper = 200.0;
        let t = strategy().step(&s, &neutral(), &neutral()).unwrap();
        assert!(!t.state.in_sell_period);
        assert_eq!(t.actions, vec![TradeAction::DoubleSellSuppressed]);
        assert!(t.actions.iter().all(|a| a.order().is_none()));
    }

    #[test]
    fn double_buy_is_suppressed_but_watch_clears() {
        let mut s = state();
        s.in_buy_period = true;
        s.stop_loss_lower = 50.0;
        s.stop_loss_upper = 150.0;
        let t = strategy().step(&s, &neutral(), &neutral()).unwrap();
        assert!(!t.state.in_buy_period);
        assert_eq!(t.actions, vec![TradeAction::DoubleBuySuppressed]);
        assert!(t.actions.iter().all(|a| a.order().is_none()));
        assert_eq!(t.state.stop_loss_upper, 0.0);
        // Still armed, and ratcheted from the prior low.
        assert!((t.state.stop_loss_lower - 99.0 * 0.97).abs() < 1e-9);
    }

    #[test]
    fn stop_loss_fires_in_the_step_that_opens_a_watch() {
        let mut s = state();
        s.stop_loss_lower = 100.0;
        // Overbought prior bar; the floor ratchets to 105 * 0.97 = 101.85.
        let prev = point(80.0, 112.0, 105.0, 110.0, 90.0);
        let drop = point(60.0, 103.0, 95.0, 110.0, 90.0);
        let t = strategy().step(&s, &prev, &drop).unwrap();
        assert_eq!(
            t.actions,
            vec![
                TradeAction::SellWatchEntered,
                TradeAction::Sell { price: 99.0, trigger: FireTrigger::StopLoss },
            ]
        );
        assert!(t.state.in_sell_period);
        assert_eq!(t.state.stop_loss_lower, 0.0);
        assert!((t.state.stop_loss_upper - 103.0 * 1.03).abs() < 1e-9);
    }

    #[test]
    fn buy_mirrors_sell() {
        let oversold = point(10.0, 92.0, 85.0, 110.0, 90.0);
        let t = strategy().step(&state(), &oversold, &neutral()).unwrap();
        assert!(t.state.in_buy_period);
        assert_eq!(t.actions, vec![TradeAction::BuyWatchEntered]);

        let mut s = state();
        s.in_buy_period = true;
        s.stop_loss_upper = 150.0;
        let t = strategy().step(&s, &neutral(), &neutral()).unwrap();
        assert!(!t.state.in_buy_period);
        assert_eq!(t.state.stop_loss_upper, 0.0);
        assert!((t.state.stop_loss_lower - 99.0 * 0.97).abs() < 1e-9);
        assert_eq!(
            t.actions,
            vec![TradeAction::Buy { price: 100.0, trigger: FireTrigger::Signal }]
        );
    }

    #[test]
    fn lower_stop_ratchets_up_only() {
        let mut s = state();
        s.stop_loss_lower = 90.0;
        let prev = point(50.0, 101.0, 99.0, 110.0, 90.0);
        let t = strategy().step(&s, &prev, &neutral()).unwrap();
        assert!((t.state.stop_loss_lower - 99.0 * 0.97).abs() < 1e-9);

        s.stop_loss_lower = 98.0;
        let t = strategy().step(&s, &prev, &neutral()).unwrap();
        assert_eq!(t.state.stop_loss_lower, 98.0);
    }

    #[test]
    fn lower_stop_breach_sells_at_close_and_arms_ceiling() {
        let mut s = state();
        s.stop_loss_lower = 98.5;
        let prev = point(50.0, 101.0, 90.0, 110.0, 80.0);
        let crash = point(40.0, 99.0, 95.0, 110.0, 80.0);
        let t = strategy().step(&s, &prev, &crash).unwrap();
        assert_eq!(
            t.actions,
            vec![TradeAction::Sell { price: 97.0, trigger: FireTrigger::StopLoss }]
        );
        assert_eq!(t.state.stop_loss_lower, 0.0);
        assert!((t.state.stop_loss_upper - 99.0 * 1.03).abs() < 1e-9);
    }

    #[test]
    fn upper_stop_breach_buys_and_arms_floor() {
        let mut s = state();
        s.stop_loss_upper = 102.0;
        let prev = point(50.0, 101.0, 99.0, 120.0, 80.0);
        let spike = point(60.0, 106.0, 100.0, 120.0, 80.0);
        let t = strategy().step(&s, &prev, &spike).unwrap();
        // Ratchet first: min(102, 101 * 1.03) = 102, then the breach.
        assert_eq!(
            t.actions,
            vec![TradeAction::Buy { price: 103.0, trigger: FireTrigger::StopLoss }]
        );
        assert_eq!(t.state.stop_loss_upper, 0.0);
        assert!((t.state.stop_loss_lower - 100.0 * 0.97).abs() < 1e-9);
    }

    #[test]
    fn non_finite_input_fails_without_touching_state() {
        let s = state();
        let bad = point(f64::NAN, 101.0, 99.0, 110.0, 90.0);
        let err = strategy().step(&s, &neutral(), &bad).unwrap_err();
        assert!(matches!(err, StrategyError::NonFinite(_)));
        assert_eq!(s, state());
    }

    #[test]
    fn seeded_state_protects_current_holdings() {
        let bar = PriceBar {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 95.0,
            close: 100.0,
        };
        let long = Holdings {
            base: 1.into(),
            quote: 10.into(),
        };
        let flat = Holdings {
            base: 0.into(),
            quote: 10.into(),
        };
        let s = StrategyState::seeded(ParameterSet::default(), &long, &bar, 0.03);
        assert!((s.stop_loss_lower - 95.0 * 0.97).abs() < 1e-9);
        assert_eq!(s.stop_loss_upper, 0.0);
        let s = StrategyState::seeded(ParameterSet::default(), &flat, &bar, 0.03);
        assert!((s.stop_loss_upper - 105.0 * 1.03).abs() < 1e-9);
        assert_eq!(s.stop_loss_lower, 0.0);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = StrategyConfig {
            stop_loss_portion: 0.0,
            ..StrategyConfig::default()
        };
        assert!(RsiBbStrategy::new(config).is_err());
    }
}
