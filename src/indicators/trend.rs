/// Trend-following stops: Parabolic SAR and Supertrend
use super::atr::calculate_atr;
use super::{finite, Series};
use crate::models::PriceBar;

/// Parabolic SAR (Wilder)
///
/// Starts on bar 1 with the trend implied by the first two closes.
/// `step` is the acceleration increment, `max_step` its cap.
pub fn calculate_psar(bars: &[PriceBar], step: f64, max_step: f64) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];
    if n < 2 {
        return out;
    }

    let mut long = bars[1].close >= bars[0].close;
    let mut sar = if long { bars[0].low } else { bars[0].high };
    let mut extreme = if long { bars[1].high } else { bars[1].low };
    let mut af = step;

    for i in 1..n {
        let bar = &bars[i];
        let prev = &bars[i - 1];

        if i > 1 {
            sar += af * (extreme - sar);
            // SAR never moves inside the previous two bars
            let prev2 = &bars[i - 2];
            if long {
                sar = sar.min(prev.low).min(prev2.low);
            } else {
                sar = sar.max(prev.high).max(prev2.high);
            }
        }

        if long && bar.low < sar {
            long = false;
            sar = extreme;
            extreme = bar.low;
            af = step;
        } else if !long && bar.high > sar {
            long = true;
            sar = extreme;
            extreme = bar.high;
            af = step;
        } else if long && bar.high > extreme {
            extreme = bar.high;
            af = (af + step).min(max_step);
        } else if !long && bar.low < extreme {
            extreme = bar.low;
            af = (af + step).min(max_step);
        }

        out[i] = finite(sar);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupertrendSeries {
    pub value: Series,
    /// +1 for an uptrend, −1 for a downtrend
    pub direction: Series,
}

/// Supertrend: median price ± multiplier · ATR with ratcheting final bands
pub fn calculate_supertrend(bars: &[PriceBar], period: usize, multiplier: f64) -> SupertrendSeries {
    let n = bars.len();
    let mut result = SupertrendSeries {
        value: vec![None; n],
        direction: vec![None; n],
    };
    let atr = calculate_atr(bars, period);

    let mut final_upper = 0.0;
    let mut final_lower = 0.0;
    let mut uptrend = true;
    let mut started = false;

    for i in 0..n {
        let Some(a) = atr[i] else {
            continue;
        };
        let mid = bars[i].median_price();
        let basic_upper = mid + multiplier * a;
        let basic_lower = mid - multiplier * a;

        if !started {
            final_upper = basic_upper;
            final_lower = basic_lower;
            uptrend = bars[i].close >= mid;
            started = true;
        } else {
            let prev_close = bars[i - 1].close;
            final_upper = if basic_upper < final_upper || prev_close > final_upper {
                basic_upper
            } else {
                final_upper
            };
            final_lower = if basic_lower > final_lower || prev_close < final_lower {
                basic_lower
            } else {
                final_lower
            };

            if uptrend && bars[i].close < final_lower {
                uptrend = false;
            } else if !uptrend && bars[i].close > final_upper {
                uptrend = true;
            }
        }

        let (value, direction) = if uptrend {
            (final_lower, 1.0)
        } else {
            (final_upper, -1.0)
        };
        result.value[i] = finite(value);
        result.direction[i] = Some(direction);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::latest;
    use crate::models::test_support::bars_from_closes;

    #[test]
    fn test_psar_below_price_in_uptrend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 2.0).collect();
        let bars = bars_from_closes(&closes);
        let psar = calculate_psar(&bars, 0.02, 0.2);
        assert!(psar[0].is_none());
        assert!(latest(&psar).unwrap() < bars.last().unwrap().low);
    }

    #[test]
    fn test_psar_flips_on_reversal() {
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64 * 2.0).collect();
        closes.extend((0..15).map(|i| 126.0 - i as f64 * 3.0));
        let bars = bars_from_closes(&closes);
        let psar = calculate_psar(&bars, 0.02, 0.2);
        assert!(latest(&psar).unwrap() > bars.last().unwrap().high);
    }

    #[test]
    fn test_supertrend_direction_follows_trend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let st = calculate_supertrend(&bars_from_closes(&closes), 10, 3.0);
        assert!(st.value[8].is_none());
        assert_eq!(latest(&st.direction), Some(1.0));
        assert!(latest(&st.value).unwrap() < 129.0);

        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64 * 2.0).collect();
        let st = calculate_supertrend(&bars_from_closes(&closes), 10, 3.0);
        assert_eq!(latest(&st.direction), Some(-1.0));
    }
}
