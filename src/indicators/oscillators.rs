/// Bounded oscillators: Stochastic, CCI, MFI and Williams %R
use super::moving_average::sma_series;
use super::{extract, finite, window_max, window_min, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticSeries {
    pub k: Series,
    pub d: Series,
}

/// Stochastic oscillator
///
/// %K = 100 · (close − lowest low) / (highest high − lowest low) over
/// `k_period`; %D = SMA(%K, d_period). A window with no range reads 50.
pub fn calculate_stochastic(bars: &[PriceBar], k_period: usize, d_period: usize) -> StochasticSeries {
    let n = bars.len();
    let mut k = vec![None; n];
    if k_period > 0 && n >= k_period {
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        for i in (k_period - 1)..n {
            let hh = window_max(&highs, i, k_period);
            let ll = window_min(&lows, i, k_period);
            let range = hh - ll;
            let value = if range == 0.0 {
                50.0
            } else {
                100.0 * (bars[i].close - ll) / range
            };
            k[i] = finite(value);
        }
    }
    let d = sma_series(&k, d_period);
    StochasticSeries { k, d }
}

/// Commodity Channel Index
///
/// (TP − SMA(TP)) / (0.015 · mean absolute deviation); zero deviation reads 0.
pub fn calculate_cci(bars: &[PriceBar], period: usize) -> Series {
    let typical = extract(bars, |b| b.typical_price());
    let mean = sma_series(&typical, period);
    let mut out = vec![None; bars.len()];

    for i in 0..bars.len() {
        let (Some(tp), Some(m)) = (typical[i], mean[i]) else {
            continue;
        };
        let deviation: Option<f64> = typical[i + 1 - period..=i]
            .iter()
            .try_fold(0.0, |acc, v| v.map(|x| acc + (x - m).abs()));
        let Some(deviation) = deviation.map(|d| d / period as f64) else {
            continue;
        };
        out[i] = if deviation == 0.0 {
            Some(0.0)
        } else {
            finite((tp - m) / (0.015 * deviation))
        };
    }
    out
}

/// Money Flow Index
///
/// Volume-weighted RSI over typical price; no negative flow reads 100.
/// Defined from position `period`.
pub fn calculate_mfi(bars: &[PriceBar], period: usize) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let typical: Vec<f64> = bars.iter().map(|b| b.typical_price()).collect();
    // flows[i] is the signed raw money flow of bar i relative to bar i-1
    let flows: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 {
                0.0
            } else {
                let raw = typical[i] * bars[i].volume;
                if typical[i] > typical[i - 1] {
                    raw
                } else if typical[i] < typical[i - 1] {
                    -raw
                } else {
                    0.0
                }
            }
        })
        .collect();

    for i in period..n {
        let window = &flows[i + 1 - period..=i];
        let positive: f64 = window.iter().filter(|f| **f > 0.0).sum();
        let negative: f64 = window.iter().filter(|f| **f < 0.0).map(|f| f.abs()).sum();
        let mfi = if negative == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + positive / negative)
        };
        out[i] = finite(mfi);
    }
    out
}

/// Williams %R: −100 · (highest high − close) / (highest high − lowest low)
///
/// A window with no range reads −50.
pub fn calculate_williams_r(bars: &[PriceBar], period: usize) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    for i in (period - 1)..n {
        let hh = window_max(&highs, i, period);
        let ll = window_min(&lows, i, period);
        let range = hh - ll;
        let value = if range == 0.0 {
            -50.0
        } else {
            -100.0 * (hh - bars[i].close) / range
        };
        out[i] = finite(value);
    }
    out
}
