// Technical indicators module
// Every indicator maps a bar sequence to series index-aligned with the bars.
// A position is `None` until its lookback is satisfied; NaN/Inf never leak out.

pub mod adx;
pub mod atr;
pub mod channels;
pub mod ichimoku;
pub mod macd;
pub mod market_analysis;
pub mod moving_average;
pub mod oscillators;
pub mod pivots;
pub mod registry;
pub mod regression;
pub mod rsi;
pub mod trend;
pub mod volume;

pub use adx::{calculate_adx, AdxSeries};
pub use atr::{calculate_atr, true_range_series};
pub use channels::{
    calculate_bollinger, calculate_donchian, calculate_fractal_channel, calculate_keltner, Bands,
};
pub use ichimoku::{calculate_ichimoku, IchimokuSeries};
pub use macd::{calculate_macd, MacdSeries};
pub use market_analysis::{
    analyze_market_structure, calculate_average_volume, calculate_volume_direction_ratio,
    is_volume_spike, MarketStructure,
};
pub use moving_average::{
    calculate_dema, calculate_ema, calculate_hma, calculate_mcginley, calculate_sma,
    calculate_tema, calculate_tma, calculate_vwma, calculate_wma, ema_series, sma_series,
    wma_series,
};
pub use oscillators::{
    calculate_cci, calculate_mfi, calculate_stochastic, calculate_williams_r, StochasticSeries,
};
pub use pivots::{calculate_fibonacci_pivots, calculate_pivot_points, PivotSeries};
pub use registry::{IndicatorKind, IndicatorOutput, IndicatorParams, IndicatorSnapshot};
pub use regression::{calculate_linear_regression, LinearRegressionSeries};
pub use rsi::calculate_rsi;
pub use trend::{calculate_psar, calculate_supertrend, SupertrendSeries};
pub use volume::{calculate_obv, calculate_vwap};

use crate::models::PriceBar;

/// An indicator series: `None` marks an undefined position
pub type Series = Vec<Option<f64>>;

/// Map a raw float to a defined value, treating NaN/Inf as undefined
pub fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Close prices as a series
pub fn closes(bars: &[PriceBar]) -> Series {
    bars.iter().map(|b| finite(b.close)).collect()
}

/// Apply a per-bar extractor, keeping only finite values
pub fn extract(bars: &[PriceBar], f: impl Fn(&PriceBar) -> f64) -> Series {
    bars.iter().map(|b| finite(f(b))).collect()
}

/// Most recent defined value of a series
pub fn last_defined(series: &[Option<f64>]) -> Option<f64> {
    series.iter().rev().find_map(|v| *v)
}

/// Value at the final position, `None` when that position is undefined
pub fn latest(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Element-wise combination of two aligned series
pub fn combine(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Series {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => finite(f(*x, *y)),
            _ => None,
        })
        .collect()
}

/// Highest value over the trailing window ending at `end` (inclusive)
pub(crate) fn window_max(values: &[f64], end: usize, period: usize) -> f64 {
    values[end + 1 - period..=end]
        .iter()
        .fold(f64::NEG_INFINITY, |a, &b| a.max(b))
}

/// Lowest value over the trailing window ending at `end` (inclusive)
pub(crate) fn window_min(values: &[f64], end: usize, period: usize) -> f64 {
    values[end + 1 - period..=end]
        .iter()
        .fold(f64::INFINITY, |a, &b| a.min(b))
}

/// Population standard deviation over a trailing window
pub fn rolling_stddev(values: &[Option<f64>], period: usize) -> Series {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        let window: Option<Vec<f64>> = values[i + 1 - period..=i].iter().copied().collect();
        if let Some(window) = window {
            if window.iter().all(|v| *v == window[0]) {
                out[i] = Some(0.0);
                continue;
            }
            let mean = window.iter().sum::<f64>() / period as f64;
            let variance =
                window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
            out[i] = finite(variance.sqrt());
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: Option<f64>, expected: f64, epsilon: f64) {
    match actual {
        Some(v) => assert!(
            (v - expected).abs() < epsilon,
            "expected {expected}, got {v}"
        ),
        None => panic!("expected {expected}, got undefined"),
    }
}
