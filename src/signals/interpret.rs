/// Turn indicator readings and pattern matches into signals
///
/// Only directional readings produce a signal. Neutral readings, and
/// indicators with no directional interpretation (OBV, VWAP, ATR, pivots),
/// are left to the audit trail.
use super::{Signal, SourceKind};
use crate::indicators::{IndicatorKind, IndicatorOutput, IndicatorSnapshot};
use crate::models::{Action, PriceBar};
use crate::patterns::{PatternMatch, PatternSignal};

/// Patterns ending more than this many bars ago are stale
pub const PATTERN_RECENCY_BARS: usize = 3;

const ADX_TREND_THRESHOLD: f64 = 25.0;

struct Reading {
    action: Action,
    /// How decisive the reading is, in [0, 1]
    strength: f64,
    note: String,
}

impl Reading {
    fn new(action: Action, strength: f64, note: String) -> Self {
        Self {
            action,
            strength: strength.clamp(0.0, 1.0),
            note,
        }
    }
}

/// Lower/upper threshold oscillators (RSI, Stochastic, MFI, Williams %R, CCI)
fn oscillator(value: f64, lower: f64, upper: f64, span: f64, name: &str) -> Option<Reading> {
    if value < lower {
        Some(Reading::new(
            Action::Buy,
            (lower - value) / span,
            format!("{} {:.1} below {}", name, value, lower),
        ))
    } else if value > upper {
        Some(Reading::new(
            Action::Sell,
            (value - upper) / span,
            format!("{} {:.1} above {}", name, value, upper),
        ))
    } else {
        None
    }
}

/// Side of price relative to a level; 5% away is full strength
fn side_of(close: f64, level: f64, name: &str) -> Option<Reading> {
    if level <= 0.0 || close == level {
        return None;
    }
    let gap = (close - level) / level;
    let action = if gap > 0.0 { Action::Buy } else { Action::Sell };
    let position = if gap > 0.0 { "above" } else { "below" };
    Some(Reading::new(
        action,
        gap.abs() * 20.0,
        format!("close {} {} {:.4}", position, name, level),
    ))
}

fn band_break(close: f64, upper: f64, lower: f64, name: &str) -> Option<Reading> {
    let width = upper - lower;
    if close > upper {
        let strength = if width > 0.0 { (close - upper) / width } else { 1.0 };
        Some(Reading::new(
            Action::Sell,
            0.5 + strength,
            format!("close above upper {} band", name),
        ))
    } else if close < lower {
        let strength = if width > 0.0 { (lower - close) / width } else { 1.0 };
        Some(Reading::new(
            Action::Buy,
            0.5 + strength,
            format!("close below lower {} band", name),
        ))
    } else {
        None
    }
}

/// Channel breakouts compare against the previous bar's channel, since the
/// current bar is part of its own extreme
fn channel_breakout(close: f64, output: &IndicatorOutput, name: &str) -> Option<Reading> {
    let upper = output.previous(Some("upper"))?;
    let lower = output.previous(Some("lower"))?;
    if close > upper {
        Some(Reading::new(
            Action::Buy,
            0.5 + (close - upper) / upper * 20.0,
            format!("close broke above {} channel", name),
        ))
    } else if close < lower {
        Some(Reading::new(
            Action::Sell,
            0.5 + (lower - close) / lower * 20.0,
            format!("close broke below {} channel", name),
        ))
    } else {
        None
    }
}

fn read(output: &IndicatorOutput, close: f64) -> Option<Reading> {
    let latest = |field: &str| output.latest(Some(field));
    match output.kind {
        IndicatorKind::Sma
        | IndicatorKind::Ema
        | IndicatorKind::Wma
        | IndicatorKind::Dema
        | IndicatorKind::Tema
        | IndicatorKind::Tma
        | IndicatorKind::Hma
        | IndicatorKind::Mcginley
        | IndicatorKind::Vwma => side_of(close, output.latest(None)?, &output.key),
        IndicatorKind::Rsi => oscillator(output.latest(None)?, 30.0, 70.0, 30.0, "RSI"),
        IndicatorKind::Stochastic => oscillator(latest("k")?, 20.0, 80.0, 20.0, "Stochastic %K"),
        IndicatorKind::Mfi => oscillator(output.latest(None)?, 20.0, 80.0, 20.0, "MFI"),
        IndicatorKind::WilliamsR => {
            oscillator(output.latest(None)?, -80.0, -20.0, 20.0, "Williams %R")
        }
        IndicatorKind::Cci => oscillator(output.latest(None)?, -100.0, 100.0, 100.0, "CCI"),
        IndicatorKind::Macd => {
            let histogram = latest("histogram")?;
            if histogram == 0.0 || close <= 0.0 {
                return None;
            }
            let action = if histogram > 0.0 { Action::Buy } else { Action::Sell };
            Some(Reading::new(
                action,
                histogram.abs() / close * 100.0,
                format!("MACD histogram {:.4}", histogram),
            ))
        }
        IndicatorKind::Bollinger => band_break(close, latest("upper")?, latest("lower")?, "Bollinger"),
        IndicatorKind::Keltner => band_break(close, latest("upper")?, latest("lower")?, "Keltner"),
        IndicatorKind::Donchian => channel_breakout(close, output, "Donchian"),
        IndicatorKind::FractalChannel => channel_breakout(close, output, "fractal"),
        IndicatorKind::Adx => {
            let adx = output.latest(None)?;
            if adx <= ADX_TREND_THRESHOLD {
                return None;
            }
            let plus = latest("plus_di")?;
            let minus = latest("minus_di")?;
            let action = if plus > minus {
                Action::Buy
            } else if minus > plus {
                Action::Sell
            } else {
                return None;
            };
            Some(Reading::new(
                action,
                (adx - ADX_TREND_THRESHOLD) / ADX_TREND_THRESHOLD,
                format!("ADX {:.1} trending, +DI {:.1} / -DI {:.1}", adx, plus, minus),
            ))
        }
        IndicatorKind::Psar => side_of(close, output.latest(None)?, "PSAR"),
        IndicatorKind::Supertrend => {
            let direction = latest("direction")?;
            let line = output.latest(None)?;
            let mut reading = side_of(close, line, "Supertrend")?;
            let expected = if direction > 0.0 { Action::Buy } else { Action::Sell };
            if reading.action != expected {
                return None;
            }
            reading.strength = reading.strength.max(0.5);
            Some(reading)
        }
        IndicatorKind::Ichimoku => {
            let a = latest("senkou_a")?;
            let b = latest("senkou_b")?;
            let (top, bottom) = (a.max(b), a.min(b));
            if close > top {
                side_of(close, top, "Ichimoku cloud")
            } else if close < bottom {
                side_of(close, bottom, "Ichimoku cloud")
            } else {
                None
            }
        }
        IndicatorKind::LinearRegression => {
            let slope = latest("slope")?;
            let value = output.latest(None)?;
            if slope == 0.0 || value <= 0.0 {
                return None;
            }
            let action = if slope > 0.0 { Action::Buy } else { Action::Sell };
            Some(Reading::new(
                action,
                slope.abs() / value * 100.0,
                format!("regression slope {:.4} per bar", slope),
            ))
        }
        IndicatorKind::Atr
        | IndicatorKind::Obv
        | IndicatorKind::Vwap
        | IndicatorKind::PivotPoints
        | IndicatorKind::FibonacciPivots => None,
    }
}

/// One signal per directional indicator reading at the last bar
pub fn indicator_signals(bars: &[PriceBar], snapshot: &IndicatorSnapshot) -> Vec<Signal> {
    let Some(close) = bars.last().map(|b| b.close).filter(|c| c.is_finite()) else {
        return Vec::new();
    };

    let mut signals = Vec::new();
    for output in snapshot.outputs() {
        let Some(reading) = read(output, close) else {
            continue;
        };
        let mut signal = Signal::new(
            format!("indicator:{}", output.key),
            SourceKind::Indicator,
            reading.action,
            0.5 + 0.5 * reading.strength,
            reading.strength,
        )
        .with_metadata("indicator", output.key.clone())
        .with_metadata("reading", reading.note);
        if let Some(value) = output.latest(None) {
            signal = signal.with_metadata("value", value);
        }
        signals.push(signal);
    }
    signals
}

/// One signal per recent directional pattern match
pub fn pattern_signals(patterns: &[PatternMatch], bar_count: usize) -> Vec<Signal> {
    let earliest = bar_count.saturating_sub(PATTERN_RECENCY_BARS);
    patterns
        .iter()
        .filter(|m| m.index >= earliest)
        .filter_map(|m| {
            let action = match m.signal {
                PatternSignal::Bullish => Action::Buy,
                PatternSignal::Bearish => Action::Sell,
                PatternSignal::Neutral => return None,
            };
            Some(
                Signal::new(
                    format!("pattern:{}@{}", m.pattern_id, m.index),
                    SourceKind::Pattern,
                    action,
                    m.confidence,
                    m.confidence,
                )
                .with_metadata("pattern_id", m.pattern_id.clone())
                .with_metadata("index", m.index)
                .with_metadata("span", m.span),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorParams;
    use crate::models::test_support::bars_from_closes;
    use std::collections::BTreeMap;

    fn snapshot_of(bars: &[PriceBar], names: &[&str]) -> IndicatorSnapshot {
        let enabled: BTreeMap<String, IndicatorParams> = names
            .iter()
            .map(|n| (n.to_string(), IndicatorParams::new()))
            .collect();
        IndicatorSnapshot::build(bars, &enabled)
    }

    #[test]
    fn test_overbought_rsi_reads_sell() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes);
        let signals = indicator_signals(&bars, &snapshot_of(&bars, &["rsi"]));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action(), Action::Sell);
        assert_eq!(signals[0].source_id(), "indicator:rsi_14");
        assert_eq!(signals[0].strength(), 1.0);
        assert_eq!(signals[0].confidence(), 1.0);
    }

    #[test]
    fn test_close_above_moving_average_reads_buy() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes);
        let signals = indicator_signals(&bars, &snapshot_of(&bars, &["sma", "obv", "atr"]));
        // obv and atr have no reading
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action(), Action::Buy);
    }

    #[test]
    fn test_undefined_indicator_gives_no_signal() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0]);
        assert!(indicator_signals(&bars, &snapshot_of(&bars, &["rsi", "sma"])).is_empty());
        assert!(indicator_signals(&[], &IndicatorSnapshot::new()).is_empty());
    }

    #[test]
    fn test_only_recent_directional_patterns() {
        let patterns = vec![
            PatternMatch::new("hammer", 2, 1, PatternSignal::Bullish, 0.6, "old"),
            PatternMatch::new("doji", 9, 1, PatternSignal::Neutral, 0.5, "neutral"),
            PatternMatch::new("evening_star", 9, 3, PatternSignal::Bearish, 0.7, "recent"),
        ];
        let signals = pattern_signals(&patterns, 10);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action(), Action::Sell);
        assert_eq!(signals[0].confidence(), 0.7);
        assert_eq!(signals[0].source_id(), "pattern:evening_star@9");
    }
}
