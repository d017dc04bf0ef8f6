use crate::enums::PriceSource;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One unit of market data. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    /// Returns the price proxy selected by `source`.
    pub fn price(&self, source: PriceSource) -> f64 {
        match source {
            PriceSource::Close => self.close,
            PriceSource::Hl2 => (self.high + self.low) / 2.0,
        }
    }

    fn check(&self, index: usize) -> Result<(), CoreError> {
        let fields = [self.open, self.high, self.low, self.close];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CoreError::InvalidInput(
                format!("bar {}", index),
                "prices must be finite and non-negative".to_string(),
            ));
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low || self.high < body_high {
            return Err(CoreError::InvalidInput(
                format!("bar {}", index),
                format!(
                    "high/low ({}/{}) do not enclose open/close ({}/{})",
                    self.high, self.low, self.open, self.close
                ),
            ));
        }
        Ok(())
    }
}

/// A chronologically ordered sequence of `PriceBar`s.
///
/// The constructor guarantees strictly increasing timestamps and sane OHLC values,
/// so every consumer downstream can index into it without re-validating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PriceBar>", into = "Vec<PriceBar>")]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, CoreError> {
        for (i, bar) in bars.iter().enumerate() {
            bar.check(i)?;
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(CoreError::Unordered(i));
            }
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// The most recent `n` bars (or all of them when the series is shorter).
    pub fn tail(&self, n: usize) -> PriceSeries {
        let start = self.bars.len().saturating_sub(n);
        Self {
            bars: self.bars[start..].to_vec(),
        }
    }

    pub fn prices(&self, source: PriceSource) -> Vec<f64> {
        self.bars.iter().map(|b| b.price(source)).collect()
    }
}

impl TryFrom<Vec<PriceBar>> for PriceSeries {
    type Error = CoreError;

    fn try_from(bars: Vec<PriceBar>) -> Result<Self, Self::Error> {
        Self::new(bars)
    }
}

impl From<PriceSeries> for Vec<PriceBar> {
    fn from(series: PriceSeries) -> Self {
        series.bars
    }
}

/// The tunable parameters of the RSI/Bollinger strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub rsi_period: usize,
    pub rsi_upper_bound: f64,
    pub rsi_lower_bound: f64,
    pub bb_period: usize,
    /// Standard-deviation multiplier of the Bollinger spread.
    pub bb_level: f64,
}

impl ParameterSet {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.rsi_period < 2 {
            return Err(CoreError::InvalidParameters(format!(
                "rsi_period must be at least 2, got {}",
                self.rsi_period
            )));
        }
        if !(self.rsi_upper_bound > 50.0 && self.rsi_upper_bound < 100.0) {
            return Err(CoreError::InvalidParameters(format!(
                "rsi_upper_bound must lie in (50, 100), got {}",
                self.rsi_upper_bound
            )));
        }
        if !(self.rsi_lower_bound > 0.0 && self.rsi_lower_bound < 50.0) {
            return Err(CoreError::InvalidParameters(format!(
                "rsi_lower_bound must lie in (0, 50), got {}",
                self.rsi_lower_bound
            )));
        }
        if self.bb_period < self.rsi_period {
            return Err(CoreError::InvalidParameters(format!(
                "bb_period ({}) must not be shorter than rsi_period ({})",
                self.bb_period, self.rsi_period
            )));
        }
        if !(self.bb_level > 0.0 && self.bb_level.is_finite()) {
            return Err(CoreError::InvalidParameters(format!(
                "bb_level must be positive, got {}",
                self.bb_level
            )));
        }
        Ok(())
    }

    /// The longest lookback in use, i.e. the number of bars before the first
    /// fully-formed indicator sample.
    pub fn lookback(&self) -> usize {
        self.bb_period.max(self.rsi_period)
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            rsi_period: 10,
            rsi_upper_bound: 74.0,
            rsi_lower_bound: 16.0,
            bb_period: 12,
            bb_level: 3.0,
        }
    }
}

/// Free balances of the traded pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Holdings {
    /// Balance of the base (crypto) currency.
    pub base: Decimal,
    /// Balance of the quote (fiat/stable) currency.
    pub quote: Decimal,
}

impl Holdings {
    /// True when the base currency, valued at `price`, is at least as large as the quote balance.
    pub fn is_long(&self, price: f64) -> bool {
        let base_value = self.base.to_f64().unwrap_or(0.0) * price;
        base_value >= self.quote.to_f64().unwrap_or(0.0)
    }
}
