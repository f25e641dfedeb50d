/// Volume indicators: On-Balance Volume and VWAP
use super::{finite, Series};
use crate::models::PriceBar;

/// On-Balance Volume, starting at 0 on the first bar
pub fn calculate_obv(bars: &[PriceBar]) -> Series {
    let mut out = Vec::with_capacity(bars.len());
    let mut obv = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev_close = bars[i - 1].close;
            if bar.close > prev_close {
                obv += bar.volume;
            } else if bar.close < prev_close {
                obv -= bar.volume;
            }
        }
        out.push(finite(obv));
    }
    out
}

/// Volume-weighted average price of the typical price
///
/// `period = None` accumulates from the first bar; `Some(p)` uses a rolling
/// window. Windows with zero total volume are undefined.
pub fn calculate_vwap(bars: &[PriceBar], period: Option<usize>) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];

    match period {
        None => {
            let mut pv = 0.0;
            let mut vol = 0.0;
            for (i, bar) in bars.iter().enumerate() {
                pv += bar.typical_price() * bar.volume;
                vol += bar.volume;
                if vol > 0.0 {
                    out[i] = finite(pv / vol);
                }
            }
        }
        Some(period) => {
            if period == 0 || n < period {
                return out;
            }
            for i in (period - 1)..n {
                let window = &bars[i + 1 - period..=i];
                let pv: f64 = window.iter().map(|b| b.typical_price() * b.volume).sum();
                let vol: f64 = window.iter().map(|b| b.volume).sum();
                if vol > 0.0 {
                    out[i] = finite(pv / vol);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use crate::models::test_support::{bars_from_closes, create_test_bars};

    #[test]
    fn test_obv_direction() {
        let bars = bars_from_closes(&[10.0, 11.0, 10.5, 10.5, 12.0]);
        let obv = calculate_obv(&bars);
        assert_eq!(
            obv,
            vec![Some(0.0), Some(1000.0), Some(0.0), Some(0.0), Some(1000.0)]
        );
    }

    #[test]
    fn test_vwap_cumulative() {
        let mut bars = create_test_bars(&[(10.0, 10.0, 10.0, 10.0), (20.0, 20.0, 20.0, 20.0)]);
        bars[1].volume = 3000.0;
        let vwap = calculate_vwap(&bars, None);
        assert_approx(vwap[0], 10.0, 1e-12);
        // (10*1000 + 20*3000) / 4000
        assert_approx(vwap[1], 17.5, 1e-12);
    }

    #[test]
    fn test_vwap_zero_volume_undefined() {
        let mut bars = create_test_bars(&[(10.0, 10.0, 10.0, 10.0); 3]);
        for bar in &mut bars {
            bar.volume = 0.0;
        }
        assert!(calculate_vwap(&bars, None).iter().all(Option::is_none));
        assert!(calculate_vwap(&bars, Some(2)).iter().all(Option::is_none));
    }
}
