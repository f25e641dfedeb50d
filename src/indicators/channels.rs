/// Price channels: Bollinger, Keltner, Donchian and fractal channels
///
/// All of them return upper/middle/lower bands with `upper >= middle >= lower`
/// wherever the bands are defined.
use super::atr::calculate_atr;
use super::moving_average::{calculate_ema, sma_series};
use super::{closes, finite, rolling_stddev, window_max, window_min, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

impl Bands {
    fn undefined(n: usize) -> Self {
        Self {
            upper: vec![None; n],
            middle: vec![None; n],
            lower: vec![None; n],
        }
    }

    /// Write one position, dropping it entirely if any band is not finite
    fn set(&mut self, i: usize, upper: f64, middle: f64, lower: f64) {
        if let (Some(u), Some(m), Some(l)) = (finite(upper), finite(middle), finite(lower)) {
            self.upper[i] = Some(u);
            self.middle[i] = Some(m);
            self.lower[i] = Some(l);
        }
    }
}

/// Bollinger Bands: SMA(period) ± k · population stddev
pub fn calculate_bollinger(bars: &[PriceBar], period: usize, k: f64) -> Bands {
    let prices = closes(bars);
    let middle = sma_series(&prices, period);
    let stddev = rolling_stddev(&prices, period);
    let mut bands = Bands::undefined(bars.len());
    let k = k.abs();

    for i in 0..bars.len() {
        if let (Some(m), Some(sd)) = (middle[i], stddev[i]) {
            bands.set(i, m + k * sd, m, m - k * sd);
        }
    }
    bands
}

/// Keltner Channels: EMA(period) ± multiplier · ATR(atr_period)
pub fn calculate_keltner(
    bars: &[PriceBar],
    period: usize,
    atr_period: usize,
    multiplier: f64,
) -> Bands {
    let middle = calculate_ema(bars, period);
    let atr = calculate_atr(bars, atr_period);
    let mut bands = Bands::undefined(bars.len());
    let multiplier = multiplier.abs();

    for i in 0..bars.len() {
        if let (Some(m), Some(a)) = (middle[i], atr[i]) {
            bands.set(i, m + multiplier * a, m, m - multiplier * a);
        }
    }
    bands
}

/// Donchian Channels: highest high / lowest low over the window
pub fn calculate_donchian(bars: &[PriceBar], period: usize) -> Bands {
    let n = bars.len();
    let mut bands = Bands::undefined(n);
    if period == 0 || n < period {
        return bands;
    }

    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    for i in (period - 1)..n {
        let upper = window_max(&highs, i, period);
        let lower = window_min(&lows, i, period);
        bands.set(i, upper, (upper + lower) / 2.0, lower);
    }
    bands
}

/// Fractal channel built from the last confirmed Williams fractals
///
/// A fractal high at bar `c` has a high strictly above the `span` bars on
/// each side; it is only confirmed once those right-hand bars exist, so the
/// channel at position `i` uses fractals centred at or before `i - span`.
/// When a trend leaves the older fractal on the wrong side the two levels
/// are ordered so the upper band stays on top.
pub fn calculate_fractal_channel(bars: &[PriceBar], span: usize) -> Bands {
    let n = bars.len();
    let mut bands = Bands::undefined(n);
    if span == 0 || span >= n || n < 2 * span + 1 {
        return bands;
    }

    let mut last_high: Option<f64> = None;
    let mut last_low: Option<f64> = None;

    for i in (2 * span)..n {
        let c = i - span;
        let left = c - span..c;
        let right = c + 1..=c + span;

        let is_high = left
            .clone()
            .chain(right.clone())
            .all(|j| bars[c].high > bars[j].high);
        let is_low = left.chain(right).all(|j| bars[c].low < bars[j].low);

        if is_high {
            last_high = Some(bars[c].high);
        }
        if is_low {
            last_low = Some(bars[c].low);
        }

        if let (Some(h), Some(l)) = (last_high, last_low) {
            let upper = h.max(l);
            let lower = h.min(l);
            bands.set(i, upper, (upper + lower) / 2.0, lower);
        }
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use crate::models::test_support::{bars_from_closes, create_test_bars};

    fn assert_ordered(bands: &Bands) {
        for i in 0..bands.upper.len() {
            if let (Some(u), Some(m), Some(l)) = (bands.upper[i], bands.middle[i], bands.lower[i])
            {
                assert!(u >= m && m >= l, "bands out of order at {i}: {u} {m} {l}");
            }
        }
    }

    #[test]
    fn test_bollinger_constant_collapses() {
        let bars = create_test_bars(&[(100.0, 100.0, 100.0, 100.0); 25]);
        let bands = calculate_bollinger(&bars, 20, 2.0);
        assert!(bands.middle[18].is_none());
        assert_eq!(bands.upper[24], bands.lower[24]);
        assert_eq!(bands.upper[24], bands.middle[24]);
    }

    #[test]
    fn test_bollinger_inexact_mean_still_collapses() {
        // 0.1 repeated does not average back to exactly 0.1
        let bars = create_test_bars(&[(0.1, 0.1, 0.1, 0.1); 30]);
        let bands = calculate_bollinger(&bars, 7, 2.0);
        for i in 6..30 {
            assert!(bands.middle[i].is_some());
            assert_eq!(bands.upper[i], bands.middle[i]);
            assert_eq!(bands.lower[i], bands.middle[i]);
        }
    }

    #[test]
    fn test_fractal_channel_huge_span() {
        let bars = create_test_bars(&[(10.0, 11.0, 9.0, 10.0); 8]);
        let bands = calculate_fractal_channel(&bars, usize::MAX);
        assert!(bands.upper.iter().all(Option::is_none));
        assert_eq!(bands.upper.len(), 8);
    }

    #[test]
    fn test_bollinger_known_width() {
        // closes 2,4,4,4,5,5,7,9 have population stddev 2
        let bars = bars_from_closes(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let bands = calculate_bollinger(&bars, 8, 2.0);
        assert_approx(bands.middle[7], 5.0, 1e-12);
        assert_approx(bands.upper[7], 9.0, 1e-12);
        assert_approx(bands.lower[7], 1.0, 1e-12);
    }

    #[test]
    fn test_keltner_ordering() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 13) % 7) as f64).collect();
        let bands = calculate_keltner(&bars_from_closes(&closes), 20, 10, 2.0);
        assert!(bands.upper[8].is_none());
        assert!(bands.upper[9].is_some());
        assert_ordered(&bands);
    }

    #[test]
    fn test_donchian_window() {
        let bars = create_test_bars(&[
            (10.0, 12.0, 9.0, 11.0),
            (11.0, 15.0, 10.0, 14.0),
            (14.0, 14.5, 8.0, 9.0),
            (9.0, 11.0, 8.5, 10.0),
        ]);
        let bands = calculate_donchian(&bars, 3);
        assert_eq!(bands.upper[2], Some(15.0));
        assert_eq!(bands.lower[2], Some(8.0));
        assert_eq!(bands.upper[3], Some(15.0));
        assert_ordered(&bands);
    }

    #[test]
    fn test_fractal_channel_confirmation() {
        let bars = create_test_bars(&[
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 12.0, 8.0, 10.0),
            (10.0, 15.0, 6.0, 10.0),
            (10.0, 12.0, 8.0, 10.0),
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 11.5, 9.5, 10.0),
        ]);
        let bands = calculate_fractal_channel(&bars, 2);
        // fractal centred at 2 is confirmed at 4
        assert!(bands.upper[3].is_none());
        assert_eq!(bands.upper[4], Some(15.0));
        assert_eq!(bands.lower[4], Some(6.0));
        assert_ordered(&bands);
    }
}
