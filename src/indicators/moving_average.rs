/// Moving averages
///
/// SMA, EMA and WMA are the primitives. DEMA, TEMA, TMA, HMA, McGinley and
/// VWMA are composed from them so rounding follows the primitives exactly.
use super::{closes, combine, extract, finite, Series};
use crate::models::PriceBar;

/// Simple moving average over an arbitrary series
///
/// Undefined for the first `period - 1` positions, and wherever the window
/// contains an undefined input.
pub fn sma_series(values: &[Option<f64>], period: usize) -> Series {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    for i in (period - 1)..n {
        let sum = values[i + 1 - period..=i]
            .iter()
            .try_fold(0.0, |acc, v| v.map(|x| acc + x));
        out[i] = sum.and_then(|s| finite(s / period as f64));
    }
    out
}

/// Exponential moving average over an arbitrary series
///
/// Seeding: the first defined input is taken as-is, the next `period - 2`
/// values are the running simple average of the defined prefix, and from
/// there `ema = (price - prev) * 2/(period+1) + prev`. Leading undefined
/// inputs stay undefined; later gaps are skipped without touching state.
pub fn ema_series(values: &[Option<f64>], period: usize) -> Series {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut seen = 0usize;
    let mut prefix_sum = 0.0;
    let mut prev = 0.0;

    for (i, value) in values.iter().enumerate() {
        let Some(price) = *value else {
            continue;
        };

        let ema = if seen == 0 {
            price
        } else if seen + 1 < period {
            (prefix_sum + price) / (seen + 1) as f64
        } else {
            (price - prev) * multiplier + prev
        };

        prefix_sum += price;
        seen += 1;
        prev = ema;
        out[i] = finite(ema);
    }
    out
}

/// Linearly weighted moving average (weights 1..=period, newest heaviest)
pub fn wma_series(values: &[Option<f64>], period: usize) -> Series {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let denominator = (period * (period + 1)) as f64 / 2.0;
    for i in (period - 1)..n {
        let weighted = values[i + 1 - period..=i]
            .iter()
            .enumerate()
            .try_fold(0.0, |acc, (w, v)| v.map(|x| acc + x * (w + 1) as f64));
        out[i] = weighted.and_then(|s| finite(s / denominator));
    }
    out
}

pub fn calculate_sma(bars: &[PriceBar], period: usize) -> Series {
    sma_series(&closes(bars), period)
}

pub fn calculate_ema(bars: &[PriceBar], period: usize) -> Series {
    ema_series(&closes(bars), period)
}

pub fn calculate_wma(bars: &[PriceBar], period: usize) -> Series {
    wma_series(&closes(bars), period)
}

/// DEMA = 2·EMA − EMA(EMA)
pub fn calculate_dema(bars: &[PriceBar], period: usize) -> Series {
    let ema1 = calculate_ema(bars, period);
    let ema2 = ema_series(&ema1, period);
    combine(&ema1, &ema2, |e1, e2| 2.0 * e1 - e2)
}

/// TEMA = 3·EMA − 3·EMA(EMA) + EMA(EMA(EMA))
pub fn calculate_tema(bars: &[PriceBar], period: usize) -> Series {
    let ema1 = calculate_ema(bars, period);
    let ema2 = ema_series(&ema1, period);
    let ema3 = ema_series(&ema2, period);
    let partial = combine(&ema1, &ema2, |e1, e2| 3.0 * e1 - 3.0 * e2);
    combine(&partial, &ema3, |p, e3| p + e3)
}

/// Triangular MA: SMA of an SMA, split so the total window equals `period`
pub fn calculate_tma(bars: &[PriceBar], period: usize) -> Series {
    if period == 0 {
        return vec![None; bars.len()];
    }
    let first = period.div_ceil(2);
    let second = period / 2 + 1;
    let inner = calculate_sma(bars, first);
    sma_series(&inner, second)
}

/// Hull MA: WMA(2·WMA(n/2) − WMA(n), √n)
pub fn calculate_hma(bars: &[PriceBar], period: usize) -> Series {
    if period < 2 {
        return calculate_wma(bars, period);
    }
    let half = calculate_wma(bars, period / 2);
    let full = calculate_wma(bars, period);
    let raw = combine(&half, &full, |h, f| 2.0 * h - f);
    let sqrt_period = ((period as f64).sqrt().floor() as usize).max(1);
    wma_series(&raw, sqrt_period)
}

/// McGinley dynamic, seeded with the first SMA value
///
/// md = md + (price − md) / (period · (price / md)^4)
pub fn calculate_mcginley(bars: &[PriceBar], period: usize) -> Series {
    let prices = closes(bars);
    let seed = sma_series(&prices, period);
    let mut out = vec![None; bars.len()];

    let Some(start) = seed.iter().position(Option::is_some) else {
        return out;
    };

    let mut md = seed[start].unwrap_or_default();
    out[start] = Some(md);
    for i in (start + 1)..prices.len() {
        let Some(price) = prices[i] else {
            continue;
        };
        if md == 0.0 {
            md = price;
        } else {
            let ratio = price / md;
            md += (price - md) / (period as f64 * ratio.powi(4));
        }
        out[i] = finite(md);
    }
    out
}

/// Volume-weighted MA: SMA(close·volume) / SMA(volume)
pub fn calculate_vwma(bars: &[PriceBar], period: usize) -> Series {
    let price_volume = extract(bars, |b| b.close * b.volume);
    let volume = extract(bars, |b| b.volume);
    let numerator = sma_series(&price_volume, period);
    let denominator = sma_series(&volume, period);
    combine(&numerator, &denominator, |n, d| n / d)
}
