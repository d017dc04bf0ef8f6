use crate::error::ConfigError;
use serde::Deserialize;

/// The parameter grid searched by the optimizer.
///
/// Every range is inclusive of both ends and is walked from `start` towards `end`,
/// so `start > end` walks it downwards. The walking order matters: the optimizer's
/// candidate filter is sensitive to discovery order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub rsi_period: IntRange,
    pub rsi_upper_bound: FloatRange,
    pub rsi_lower_bound: FloatRange,
    /// Upper end and stride of the Bollinger period; each pass starts it at the RSI period.
    pub bb_period_end: usize,
    pub bb_period_step: usize,
    pub bb_level: FloatRange,
    /// Number of most recent candidates kept per RSI period.
    pub keep_per_rsi_period: usize,
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rsi_period.validate("optimizer.rsi_period")?;
        self.rsi_upper_bound.validate("optimizer.rsi_upper_bound")?;
        self.rsi_lower_bound.validate("optimizer.rsi_lower_bound")?;
        self.bb_level.validate("optimizer.bb_level")?;
        if self.bb_period_step == 0 {
            return Err(ConfigError::ValidationError(
                "optimizer.bb_period_step must be positive".to_string(),
            ));
        }
        if self.keep_per_rsi_period == 0 {
            return Err(ConfigError::ValidationError(
                "optimizer.keep_per_rsi_period must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Bollinger periods searched for a given RSI period.
    pub fn bb_periods(&self, rsi_period: usize) -> Vec<usize> {
        (rsi_period..=self.bb_period_end)
            .step_by(self.bb_period_step.max(1))
            .collect()
    }

    /// The longest Bollinger period the grid can produce.
    pub fn max_bb_period(&self) -> usize {
        self.rsi_period
            .values()
            .into_iter()
            .flat_map(|p| self.bb_periods(p))
            .max()
            .unwrap_or(0)
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            rsi_period: IntRange { start: 3, end: 11, step: 1 },
            rsi_upper_bound: FloatRange { start: 84.0, end: 64.0, step: 2.0 },
            rsi_lower_bound: FloatRange { start: 16.0, end: 36.0, step: 2.0 },
            bb_period_end: 25,
            bb_period_step: 2,
            bb_level: FloatRange { start: 1.75, end: 3.25, step: 0.25 },
            keep_per_rsi_period: 3,
        }
    }
}

/// An inclusive integer range with a positive stride.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct IntRange {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl IntRange {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.step == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Step for '{}' must be positive.",
                name
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> Vec<usize> {
        let step = self.step.max(1);
        if self.start <= self.end {
            (self.start..=self.end).step_by(step).collect()
        } else {
            (self.end..=self.start).rev().step_by(step).collect()
        }
    }
}

/// An inclusive real range with a positive stride.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FloatRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl FloatRange {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(self.step > 0.0) || !self.start.is_finite() || !self.end.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "Step for '{}' must be positive and bounds finite.",
                name
            )));
        }
        Ok(())
    }

    /// Values are computed as `start ± i·step` rather than accumulated, so long
    /// ranges do not drift.
    pub fn values(&self) -> Vec<f64> {
        if !(self.step > 0.0) {
            return Vec::new();
        }
        let direction = if self.end >= self.start { 1.0 } else { -1.0 };
        let count = ((self.end - self.start).abs() / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| self.start + direction * self.step * i as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_matches_reference_ranges() {
        let grid = OptimizerConfig::default();
        assert_eq!(grid.rsi_period.values(), (3..=11).collect::<Vec<_>>());
        assert_eq!(
            grid.rsi_upper_bound.values(),
            vec![84.0, 82.0, 80.0, 78.0, 76.0, 74.0, 72.0, 70.0, 68.0, 66.0, 64.0]
        );
        assert_eq!(grid.rsi_lower_bound.values().len(), 11);
        assert_eq!(grid.bb_level.values().len(), 7);
        assert_eq!(grid.bb_periods(3), vec![3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 25]);
        assert_eq!(grid.bb_periods(10), vec![10, 12, 14, 16, 18, 20, 22, 24]);
        assert_eq!(grid.max_bb_period(), 25);
    }

    #[test]
    fn descending_int_range() {
        let range = IntRange { start: 9, end: 3, step: 3 };
        assert_eq!(range.values(), vec![9, 6, 3]);
    }

    #[test]
    fn float_range_is_inclusive_and_drift_free() {
        let range = FloatRange { start: 0.1, end: 0.3, step: 0.1 };
        let values = range.values();
        assert_eq!(values.len(), 3);
        assert!((values[2] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn zero_step_is_rejected() {
        let mut grid = OptimizerConfig::default();
        grid.bb_level.step = 0.0;
        assert!(grid.validate().is_err());
    }
}
