use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// One OHLCV observation for a fixed interval
///
/// Sequences of bars are symbol-scoped and strictly chronological; ordering
/// and de-duplication are the caller's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (high + low) / 2
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Reject non-finite fields, negative volume and inverted ranges
    pub fn validate(&self, index: usize) -> Result<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EngineError::MalformedBar {
                    index,
                    reason: format!("{} is not finite", name),
                });
            }
        }
        if self.high < self.low {
            return Err(EngineError::MalformedBar {
                index,
                reason: format!("high {} below low {}", self.high, self.low),
            });
        }
        if self.volume < 0.0 {
            return Err(EngineError::MalformedBar {
                index,
                reason: "negative volume".to_string(),
            });
        }
        Ok(())
    }
}

/// Validate a whole bar sequence, failing on the first malformed bar
pub fn validate_bars(bars: &[PriceBar]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate(i)?;
    }
    Ok(())
}

/// Directional action
///
/// `Skip` is what the orchestrator emits when an evaluation could not run;
/// for persistence tracking it is the same normalized value as `Hold`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Skip,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
            Action::Skip => "skip",
        }
    }

    /// Collapse `Skip` into `Hold`
    pub fn normalized(self) -> Action {
        match self {
            Action::Skip => Action::Hold,
            other => other,
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self, Action::Buy | Action::Sell)
    }

    /// Lenient parse used for externally supplied opinions
    pub fn parse(value: &str) -> Option<Action> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" | "bullish" => Some(Action::Buy),
            "sell" | "short" | "bearish" => Some(Action::Sell),
            "hold" | "neutral" => Some(Action::Hold),
            "skip" => Some(Action::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::PriceBar;
    use chrono::{Duration, TimeZone, Utc};

    /// Bars from (open, high, low, close) tuples, one day apart, volume 1000
    pub fn create_test_bars(prices: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| PriceBar {
                timestamp: start + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    /// Bars from closes: open = previous close, high/low one point outside the body
    pub fn bars_from_closes(closes: &[f64]) -> Vec<PriceBar> {
        let tuples: Vec<(f64, f64, f64, f64)> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                (open, open.max(close) + 1.0, open.min(close) - 1.0, close)
            })
            .collect();
        create_test_bars(&tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::create_test_bars;
    use super::*;

    #[test]
    fn test_true_range_gap_up() {
        let bar = &create_test_bars(&[(100.0, 110.0, 90.0, 105.0)])[0];
        assert!((bar.true_range(70.0) - 40.0).abs() < f64::EPSILON);
        assert!((bar.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_candle_anatomy() {
        let bar = &create_test_bars(&[(100.0, 112.0, 95.0, 108.0)])[0];
        assert_eq!(bar.body(), 8.0);
        assert_eq!(bar.upper_wick(), 4.0);
        assert_eq!(bar.lower_wick(), 5.0);
        assert!(bar.is_bullish());
    }

    #[test]
    fn test_validate_rejects_nan_and_inverted() {
        let mut bars = create_test_bars(&[(100.0, 101.0, 99.0, 100.0)]);
        assert!(validate_bars(&bars).is_ok());

        bars[0].close = f64::NAN;
        assert!(matches!(
            validate_bars(&bars),
            Err(EngineError::MalformedBar { index: 0, .. })
        ));

        let inverted = create_test_bars(&[(100.0, 90.0, 110.0, 100.0)]);
        assert!(validate_bars(&inverted).is_err());
    }

    #[test]
    fn test_action_normalization() {
        assert_eq!(Action::Skip.normalized(), Action::Hold);
        assert_eq!(Action::Buy.normalized(), Action::Buy);
        assert!(!Action::Hold.is_directional());
        assert_eq!(Action::parse("SELL"), Some(Action::Sell));
        assert_eq!(Action::parse("maybe"), None);
    }

    #[test]
    fn test_action_serde_snake_case() {
        let json = serde_json::to_string(&Action::Buy).unwrap();
        assert_eq!(json, "\"buy\"");
        let parsed: Action = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(parsed, Action::Skip);
    }
}
