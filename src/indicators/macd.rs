/// Moving Average Convergence Divergence
///
/// macd = EMA(fast) − EMA(slow), signal = EMA(macd, signal_period),
/// histogram = macd − signal.
use super::moving_average::{calculate_ema, ema_series};
use super::{combine, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn calculate_macd(
    bars: &[PriceBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> MacdSeries {
    let fast_ema = calculate_ema(bars, fast);
    let slow_ema = calculate_ema(bars, slow);
    let macd = combine(&fast_ema, &slow_ema, |f, s| f - s);
    let signal = ema_series(&macd, signal_period);
    let histogram = combine(&macd, &signal, |m, s| m - s);

    MacdSeries {
        macd,
        signal,
        histogram,
    }
}
