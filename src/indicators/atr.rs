/// Average True Range (ATR) indicator
///
/// Measures market volatility by averaging true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The first bar has no previous close, so its true range is high - low.
/// The average is a simple moving average of the true range.
use super::moving_average::sma_series;
use super::{finite, Series};
use crate::models::PriceBar;

/// True range per bar
pub fn true_range_series(bars: &[PriceBar]) -> Series {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let tr = if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            };
            finite(tr)
        })
        .collect()
}

/// ATR series; defined from position `period - 1`
pub fn calculate_atr(bars: &[PriceBar], period: usize) -> Series {
    sma_series(&true_range_series(bars), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, latest};
    use crate::models::test_support::create_test_bars;

    #[test]
    fn test_calculate_atr_low_volatility() {
        let bars = create_test_bars(&[(100.0, 101.0, 99.0, 100.0); 15]);
        let atr = calculate_atr(&bars, 14);
        assert_approx(latest(&atr), 2.0, 1e-12);
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        let bars = create_test_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ]);
        let atr = calculate_atr(&bars, 14);
        assert!(latest(&atr).unwrap() > 10.0);
    }

    #[test]
    fn test_true_range_uses_gap() {
        let bars = create_test_bars(&[(100.0, 110.0, 100.0, 105.0), (125.0, 130.0, 120.0, 125.0)]);
        let tr = true_range_series(&bars);
        assert_approx(tr[0], 10.0, 1e-12);
        // |130 - 105| dominates the 10 point range
        assert_approx(tr[1], 25.0, 1e-12);
    }

    #[test]
    fn test_atr_zero_volatility() {
        let bars = create_test_bars(&[(50.0, 50.0, 50.0, 50.0); 10]);
        for value in calculate_atr(&bars, 5).into_iter().flatten() {
            assert_eq!(value, 0.0);
        }
    }

    #[test]
    fn test_atr_insufficient_data() {
        let bars = create_test_bars(&[(100.0, 101.0, 99.0, 100.0); 2]);
        assert!(calculate_atr(&bars, 14).iter().all(Option::is_none));
    }
}
