/// Market structure and volume analysis
///
/// Swing structure (higher highs / lower lows) and volume helpers used by
/// rule references (`average_volume`) and the built-in predictors.
use serde::Serialize;

use crate::models::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStructure {
    HigherHighsHigherLows, // Uptrend
    LowerHighsLowerLows,   // Downtrend
    Mixed,                 // No clear structure
}

impl MarketStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStructure::HigherHighsHigherLows => "higher_highs_higher_lows",
            MarketStructure::LowerHighsLowerLows => "lower_highs_lower_lows",
            MarketStructure::Mixed => "mixed",
        }
    }
}

/// Local extremes of a window: bar highs above both neighbours, bar lows
/// below both neighbours. Returned as (position, price).
pub(crate) fn swing_points(bars: &[PriceBar]) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if bars.len() < 3 {
        return (highs, lows);
    }
    for i in 1..bars.len() - 1 {
        let (prev, curr, next) = (&bars[i - 1], &bars[i], &bars[i + 1]);
        if curr.high > prev.high && curr.high > next.high {
            highs.push((i, curr.high));
        }
        if curr.low < prev.low && curr.low < next.low {
            lows.push((i, curr.low));
        }
    }
    (highs, lows)
}

/// Count rising and falling steps between consecutive swing prices
fn count_steps(points: &[(usize, f64)]) -> (usize, usize) {
    points.windows(2).fold((0, 0), |(up, down), pair| {
        if pair[1].1 > pair[0].1 {
            (up + 1, down)
        } else {
            (up, down + 1)
        }
    })
}

/// Analyze market structure over the last `lookback` bars
///
/// Needs at least two swing highs and two swing lows; three agreeing steps
/// are required before a trend structure is reported.
pub fn analyze_market_structure(bars: &[PriceBar], lookback: usize) -> MarketStructure {
    if bars.len() < lookback || lookback < 4 {
        return MarketStructure::Mixed;
    }

    let recent = &bars[bars.len() - lookback..];
    let (swing_highs, swing_lows) = swing_points(recent);
    if swing_highs.len() < 2 || swing_lows.len() < 2 {
        return MarketStructure::Mixed;
    }

    let (higher_highs, lower_highs) = count_steps(&swing_highs);
    let (higher_lows, lower_lows) = count_steps(&swing_lows);

    let up = higher_highs + higher_lows;
    let down = lower_highs + lower_lows;

    if up > down && up >= 3 {
        MarketStructure::HigherHighsHigherLows
    } else if down > up && down >= 3 {
        MarketStructure::LowerHighsLowerLows
    } else {
        MarketStructure::Mixed
    }
}

/// Mean volume of the last `period` bars
pub fn calculate_average_volume(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let total: f64 = bars[bars.len() - period..].iter().map(|b| b.volume).sum();
    Some(total / period as f64)
}

/// True when the last bar's volume exceeds `threshold` times the mean of
/// the `lookback` bars before it
pub fn is_volume_spike(bars: &[PriceBar], lookback: usize, threshold: f64) -> bool {
    if lookback == 0 || bars.len() < lookback + 1 {
        return false;
    }
    let current = bars[bars.len() - 1].volume;
    let prior = &bars[bars.len() - lookback - 1..bars.len() - 1];
    let avg = prior.iter().map(|b| b.volume).sum::<f64>() / lookback as f64;
    current > threshold * avg
}

/// Share of up-close volume and down-close volume over the last `lookback`
/// bars. Unchanged closes are ignored; the ratios sum to 1.
pub fn calculate_volume_direction_ratio(bars: &[PriceBar], lookback: usize) -> Option<(f64, f64)> {
    if lookback < 2 || bars.len() < lookback {
        return None;
    }
    let recent = &bars[bars.len() - lookback..];
    let (up, down) = recent.windows(2).fold((0.0, 0.0), |(up, down), pair| {
        let change = pair[1].close - pair[0].close;
        if change > 0.0 {
            (up + pair[1].volume, down)
        } else if change < 0.0 {
            (up, down + pair[1].volume)
        } else {
            (up, down)
        }
    });

    let total = up + down;
    if total == 0.0 {
        return Some((0.5, 0.5));
    }
    Some((up / total, down / total))
}
