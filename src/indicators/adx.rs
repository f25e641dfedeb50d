/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// Also returns +DI and -DI to determine trend direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend
use super::{finite, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct AdxSeries {
    pub adx: Series,
    pub plus_di: Series,
    pub minus_di: Series,
}

/// Calculate ADX, +DI and -DI series
///
/// +DI/-DI are defined from position `period`, ADX from `2 * period - 1`.
pub fn calculate_adx(bars: &[PriceBar], period: usize) -> AdxSeries {
    let n = bars.len();
    let mut result = AdxSeries {
        adx: vec![None; n],
        plus_di: vec![None; n],
        minus_di: vec![None; n],
    };
    if period == 0 || n <= period {
        return result;
    }

    // Step 1: True Range and Directional Movement, from bar 1
    let mut true_ranges = vec![0.0; n];
    let mut plus_dms = vec![0.0; n];
    let mut minus_dms = vec![0.0; n];
    for i in 1..n {
        let bar = &bars[i];
        let prev = &bars[i - 1];
        true_ranges[i] = bar.true_range(prev.close);

        let up_move = bar.high - prev.high;
        let down_move = prev.low - bar.low;
        plus_dms[i] = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        minus_dms[i] = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
    }

    // Step 2: Wilder smoothing seeded with the simple average of the first window
    let p = period as f64;
    let mut smoothed_tr = true_ranges[1..=period].iter().sum::<f64>() / p;
    let mut smoothed_plus = plus_dms[1..=period].iter().sum::<f64>() / p;
    let mut smoothed_minus = minus_dms[1..=period].iter().sum::<f64>() / p;

    let mut dx_values: Vec<f64> = Vec::with_capacity(n);
    let mut adx: Option<f64> = None;

    for i in period..n {
        if i > period {
            smoothed_tr = (smoothed_tr * (p - 1.0) + true_ranges[i]) / p;
            smoothed_plus = (smoothed_plus * (p - 1.0) + plus_dms[i]) / p;
            smoothed_minus = (smoothed_minus * (p - 1.0) + minus_dms[i]) / p;
        }

        // Step 3: +DI and -DI
        let (plus_di, minus_di) = if smoothed_tr > 0.0 {
            (
                smoothed_plus / smoothed_tr * 100.0,
                smoothed_minus / smoothed_tr * 100.0,
            )
        } else {
            (0.0, 0.0)
        };
        result.plus_di[i] = finite(plus_di);
        result.minus_di[i] = finite(minus_di);

        // Step 4: DX
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        };
        dx_values.push(dx);

        // Step 5: ADX is the Wilder average of DX
        if dx_values.len() == period {
            adx = Some(dx_values.iter().sum::<f64>() / p);
        } else if let Some(prev) = adx {
            adx = Some((prev * (p - 1.0) + dx) / p);
        }
        result.adx[i] = adx.and_then(finite);
    }

    result
}
