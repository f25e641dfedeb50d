/// Ichimoku Kinko Hyo
///
/// Tenkan and kijun are window midpoints. Senkou spans are normally drawn
/// `displacement` bars ahead; here each position holds the span that is
/// plotted *at* that bar, i.e. computed from bar `i - displacement`, so no
/// future bar is ever read. Chikou is the current close (drawn
/// `displacement` bars back) and is defined once that earlier slot exists.
use super::{finite, window_max, window_min, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct IchimokuSeries {
    pub tenkan: Series,
    pub kijun: Series,
    pub senkou_a: Series,
    pub senkou_b: Series,
    pub chikou: Series,
}

fn midpoint_series(highs: &[f64], lows: &[f64], period: usize) -> Series {
    let n = highs.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        out[i] = finite((window_max(highs, i, period) + window_min(lows, i, period)) / 2.0);
    }
    out
}

pub fn calculate_ichimoku(
    bars: &[PriceBar],
    tenkan_period: usize,
    kijun_period: usize,
    senkou_b_period: usize,
    displacement: usize,
) -> IchimokuSeries {
    let n = bars.len();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let tenkan = midpoint_series(&highs, &lows, tenkan_period);
    let kijun = midpoint_series(&highs, &lows, kijun_period);
    let span_b_raw = midpoint_series(&highs, &lows, senkou_b_period);

    let mut senkou_a = vec![None; n];
    let mut senkou_b = vec![None; n];
    let mut chikou = vec![None; n];

    for i in displacement..n {
        let src = i - displacement;
        if let (Some(t), Some(k)) = (tenkan[src], kijun[src]) {
            senkou_a[i] = finite((t + k) / 2.0);
        }
        senkou_b[i] = span_b_raw[src];
        chikou[i] = finite(bars[i].close);
    }

    IchimokuSeries {
        tenkan,
        kijun,
        senkou_a,
        senkou_b,
        chikou,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use crate::models::test_support::bars_from_closes;

    #[test]
    fn test_ichimoku_lookbacks() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let ichi = calculate_ichimoku(&bars_from_closes(&closes), 9, 26, 52, 26);
        assert!(ichi.tenkan[7].is_none());
        assert!(ichi.tenkan[8].is_some());
        assert!(ichi.kijun[24].is_none());
        assert!(ichi.kijun[25].is_some());
        assert!(ichi.senkou_a[50].is_none());
        assert!(ichi.senkou_a[51].is_some());
        assert!(ichi.senkou_b[76].is_none());
        assert!(ichi.senkou_b[77].is_some());
        assert!(ichi.chikou[25].is_none());
        assert_approx(ichi.chikou[99], 199.0, 1e-12);
    }

    #[test]
    fn test_span_is_displaced_not_future() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes);
        let ichi = calculate_ichimoku(&bars, 3, 5, 7, 4);
        let src = 30 - 4;
        let expected = (ichi.tenkan[src].unwrap() + ichi.kijun[src].unwrap()) / 2.0;
        assert_approx(ichi.senkou_a[30], expected, 1e-12);
    }
}
