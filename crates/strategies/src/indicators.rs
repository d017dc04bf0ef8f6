use crate::error::StrategyError;
use chrono::{DateTime, Utc};
use core_types::{ParameterSet, PriceSeries, PriceSource};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use ta::indicators::BollingerBands;
use ta::{Next, Period, Reset};

/// Relative strength index over a sliding window of the most recent `period`
/// bar-over-bar differences, using plain means (no Wilder smoothing).
///
/// The very first input has no predecessor and contributes a zero difference, so
/// the indicator is fully formed after `period` inputs.
#[derive(Debug, Clone)]
pub struct RollingRsi {
    period: usize,
    prev: Option<f64>,
    changes: VecDeque<f64>,
}

impl RollingRsi {
    pub fn new(period: usize) -> Result<Self, StrategyError> {
        if period < 2 {
            return Err(StrategyError::InvalidParameters(format!(
                "RSI period must be at least 2, got {}",
                period
            )));
        }
        Ok(Self {
            period,
            prev: None,
            changes: VecDeque::with_capacity(period + 1),
        })
    }
}

impl Period for RollingRsi {
    fn period(&self) -> usize {
        self.period
    }
}

impl Reset for RollingRsi {
    fn reset(&mut self) {
        self.prev = None;
        self.changes.clear();
    }
}

impl Next<f64> for RollingRsi {
    type Output = f64;

    fn next(&mut self, input: f64) -> f64 {
        let change = self.prev.map_or(0.0, |p| input - p);
        self.prev = Some(input);
        self.changes.push_back(change);
        if self.changes.len() > self.period {
            self.changes.pop_front();
        }

        // Summed from scratch each time so a sample depends on its window only.
        let n = self.changes.len() as f64;
        let (gain, loss) = self.changes.iter().fold((0.0, 0.0), |(g, l), &c| {
            if c > 0.0 { (g + c, l) } else { (g, l - c) }
        });
        let avg_gain = gain / n;
        let avg_loss = loss / n;

        if avg_loss == 0.0 {
            return 100.0;
        }
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// One Bollinger sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

fn check_series(values: &[f64], period: usize) -> Result<(), StrategyError> {
    if values.len() < period {
        return Err(StrategyError::InsufficientData {
            needed: period,
            available: values.len(),
        });
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(StrategyError::NonFinite(format!("price series at index {}", i)));
    }
    Ok(())
}

/// RSI of `values`, one sample per bar from index `period - 1` onwards.
pub fn rsi(values: &[f64], period: usize) -> Result<Vec<f64>, StrategyError> {
    let mut indicator = RollingRsi::new(period)?;
    check_series(values, period)?;
    Ok(values
        .iter()
        .map(|&v| indicator.next(v))
        .skip(period - 1)
        .collect())
}

/// Bollinger Bands of `values` (population standard deviation), one sample per bar
/// from index `period - 1` onwards.
pub fn bollinger(values: &[f64], period: usize, level: f64) -> Result<Vec<Bands>, StrategyError> {
    if period < 2 {
        return Err(StrategyError::InvalidParameters(format!(
            "Bollinger period must be at least 2, got {}",
            period
        )));
    }
    if !(level > 0.0 && level.is_finite()) {
        return Err(StrategyError::InvalidParameters(format!(
            "Bollinger level must be positive, got {}",
            level
        )));
    }
    check_series(values, period)?;

    let mut bb = BollingerBands::new(period, level).map_err(|e| {
        StrategyError::IndicatorError(format!("Failed to initialize Bollinger Bands: {:?}", e))
    })?;
    Ok(values
        .iter()
        .map(|&v| {
            let out = bb.next(v);
            Bands {
                upper: out.upper,
                middle: out.average,
                lower: out.lower,
            }
        })
        .skip(period - 1)
        .collect())
}

/// A bar together with the indicator values the state machine reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramePoint {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// The configured price proxy (close or high/low midpoint).
    pub price: f64,
    pub rsi: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
}

impl FramePoint {
    pub(crate) fn ensure_finite(&self) -> Result<(), StrategyError> {
        let fields = [
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("price", self.price),
            ("rsi", self.rsi),
            ("bb_upper", self.bb_upper),
            ("bb_middle", self.bb_middle),
            ("bb_lower", self.bb_lower),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(StrategyError::NonFinite(format!(
                "{} of bar at {}",
                name, self.timestamp
            ))),
            None => Ok(()),
        }
    }
}

/// Bars and indicators aligned 1:1, starting at the first bar for which every
/// indicator of the parameter set is fully formed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    points: Vec<FramePoint>,
}

impl IndicatorFrame {
    pub fn build(
        series: &PriceSeries,
        params: &ParameterSet,
        source: PriceSource,
    ) -> Result<Self, StrategyError> {
        params.validate()?;
        let lookback = params.lookback();
        if series.len() < lookback {
            return Err(StrategyError::InsufficientData {
                needed: lookback,
                available: series.len(),
            });
        }

        let prices = series.prices(source);
        let rsi_values = rsi(&prices, params.rsi_period)?;
        let bands = bollinger(&prices, params.bb_period, params.bb_level)?;

        let start = lookback - 1;
        let points = series.bars()[start..]
            .iter()
            .enumerate()
            .map(|(offset, bar)| {
                let i = start + offset;
                let bb = bands[i + 1 - params.bb_period];
                FramePoint {
                    timestamp: bar.timestamp,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    price: prices[i],
                    rsi: rsi_values[i + 1 - params.rsi_period],
                    bb_upper: bb.upper,
                    bb_middle: bb.middle,
                    bb_lower: bb.lower,
                }
            })
            .collect();

        Ok(Self { points })
    }

    pub fn points(&self) -> &[FramePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The previous and the current (possibly still forming) point.
    pub fn latest_pair(&self) -> Option<(&FramePoint, &FramePoint)> {
        match self.points.len() {
            0 | 1 => None,
            n => Some((&self.points[n - 2], &self.points[n - 1])),
        }
    }
}
