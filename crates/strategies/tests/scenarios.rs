use chrono::{Duration, TimeZone, Utc};
use configuration::StrategyConfig;
use core_types::{ParameterSet, PriceBar, PriceSeries};
use proptest::prelude::*;
use strategies::{FireTrigger, RsiBbStrategy, StrategyState, TradeAction, Transition};

fn series(closes: &[f64], wick: f64) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar {
            timestamp: start + Duration::minutes(15 * i as i64),
            open: c,
            high: c + wick,
            low: c - wick,
            close: c,
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

fn params() -> ParameterSet {
    ParameterSet {
        rsi_period: 4,
        rsi_upper_bound: 74.0,
        rsi_lower_bound: 16.0,
        bb_period: 6,
        bb_level: 1.0,
    }
}

/// Runs the state machine over every aligned bar pair of `series`.
fn replay(strategy: &RsiBbStrategy, series: &PriceSeries, params: &ParameterSet) -> Vec<(StrategyState, Transition)> {
    let frame = strategy.frame(series, params).unwrap();
    let mut state = StrategyState::new(*params);
    let mut steps = Vec::new();
    for pair in frame.points().windows(2) {
        let transition = strategy.step(&state, &pair[0], &pair[1]).unwrap();
        let before = state;
        state = transition.state;
        steps.push((before, transition));
    }
    steps
}

fn strategy() -> RsiBbStrategy {
    RsiBbStrategy::new(StrategyConfig::default()).unwrap()
}

#[test]
fn rising_series_sells_once_on_the_pullback() {
    let mut closes: Vec<f64> = (0..12).map(|i| 100.0 + i as f64).collect();
    closes.extend([108.0, 105.0]);
    let steps = replay(&strategy(), &series(&closes, 0.5), &params());

    assert_eq!(steps[0].1.actions, vec![TradeAction::SellWatchEntered]);
    let sells: Vec<_> = steps
        .iter()
        .flat_map(|(_, t)| t.actions.iter())
        .filter(|a| matches!(a, TradeAction::Sell { .. }))
        .collect();
    assert_eq!(
        sells,
        vec![&TradeAction::Sell { price: 108.0, trigger: FireTrigger::Signal }]
    );
    // The sell lands on bar 12, the seventh step of the replay.
    assert!(steps[6].1.actions.contains(sells[0]));
}

#[test]
fn flat_series_never_acts() {
    let steps = replay(&strategy(), &series(&[100.0; 30], 0.0), &params());
    assert!(steps.iter().all(|(_, t)| t.actions.is_empty()));
    let (_, last) = steps.last().unwrap();
    assert_eq!(last.state, StrategyState::new(params()));
}

#[test]
fn evaluate_uses_the_two_latest_bars() {
    let mut closes: Vec<f64> = (0..12).map(|i| 100.0 + i as f64).collect();
    closes.push(108.0);
    let data = series(&closes, 0.5);
    let strategy = strategy();

    let mut state = StrategyState::new(params());
    state.in_sell_period = true;
    let transition = strategy.evaluate(&state, &data).unwrap();
    assert_eq!(
        transition.actions,
        vec![TradeAction::Sell { price: 108.0, trigger: FireTrigger::Signal }]
    );
}

fn random_walk() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0..3.0f64, 20..80).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|s| {
                price = (price + s).max(5.0);
                price
            })
            .collect()
    })
}

fn random_params() -> impl Strategy<Value = ParameterSet> {
    (2usize..8, 0usize..6, 0.5..3.0f64, 60.0..90.0f64, 10.0..40.0f64).prop_map(
        |(rsi_period, extra, bb_level, upper, lower)| ParameterSet {
            rsi_period,
            rsi_upper_bound: upper,
            rsi_lower_bound: lower,
            bb_period: rsi_period + extra,
            bb_level,
        },
    )
}

proptest! {
    #[test]
    fn a_watch_is_never_entered_and_left_in_one_step(
        closes in random_walk(),
        params in random_params(),
    ) {
        for (before, t) in replay(&strategy(), &series(&closes, 1.0), &params) {
            let sell_fired = t.actions.iter().any(|a| matches!(
                a,
                TradeAction::Sell { trigger: FireTrigger::Signal, .. } | TradeAction::DoubleSellSuppressed
            ));
            let buy_fired = t.actions.iter().any(|a| matches!(
                a,
                TradeAction::Buy { trigger: FireTrigger::Signal, .. } | TradeAction::DoubleBuySuppressed
            ));
            if t.actions.contains(&TradeAction::SellWatchEntered) {
                prop_assert!(!before.in_sell_period);
                prop_assert!(!sell_fired);
                prop_assert!(t.state.in_sell_period);
            }
            if t.actions.contains(&TradeAction::BuyWatchEntered) {
                prop_assert!(!before.in_buy_period);
                prop_assert!(!buy_fired);
                prop_assert!(t.state.in_buy_period);
            }
        }
    }

    #[test]
    fn stop_levels_only_ratchet_towards_price(
        closes in random_walk(),
        params in random_params(),
    ) {
        for (before, t) in replay(&strategy(), &series(&closes, 1.0), &params) {
            let any_sell = t.actions.iter().any(|a| matches!(a, TradeAction::Sell { .. }));
            let any_buy = t.actions.iter().any(|a| matches!(a, TradeAction::Buy { .. }));

            // Between re-arms the floor only rises and the ceiling only falls.
            if before.stop_loss_lower > 0.0 && t.state.stop_loss_lower > 0.0 && !any_sell && !any_buy {
                prop_assert!(t.state.stop_loss_lower >= before.stop_loss_lower);
            }
            if before.stop_loss_upper > 0.0 && t.state.stop_loss_upper > 0.0 && !any_sell && !any_buy {
                prop_assert!(t.state.stop_loss_upper <= before.stop_loss_upper);
            }
            prop_assert!(t.state.stop_loss_lower >= 0.0 && t.state.stop_loss_upper >= 0.0);
        }
    }

    #[test]
    fn a_second_sell_needs_a_buy_in_between(
        closes in random_walk(),
        params in random_params(),
    ) {
        let mut last_fill: Option<bool> = None; // Some(true) = sell
        for (_, t) in replay(&strategy(), &series(&closes, 1.0), &params) {
            for action in &t.actions {
                match action {
                    TradeAction::Sell { trigger: FireTrigger::Signal, .. } => {
                        prop_assert_ne!(last_fill, Some(true));
                        last_fill = Some(true);
                    }
                    TradeAction::Buy { trigger: FireTrigger::Signal, .. } => {
                        prop_assert_ne!(last_fill, Some(false));
                        last_fill = Some(false);
                    }
                    TradeAction::Sell { .. } => last_fill = Some(true),
                    TradeAction::Buy { .. } => last_fill = Some(false),
                    _ => {}
                }
            }
        }
    }
}
