/// Calculate Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Average gain and loss are plain means over the last `period` changes
/// (no Wilder smoothing). When the average loss is exactly zero the RSI is
/// 100, including a window with no movement at all.
use super::{closes, finite, Series};
use crate::models::PriceBar;

pub fn calculate_rsi(bars: &[PriceBar], period: usize) -> Series {
    rsi_series(&closes(bars), period)
}

/// RSI over an arbitrary series; defined from position `period` onward
pub fn rsi_series(prices: &[Option<f64>], period: usize) -> Series {
    let n = prices.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    // changes[i] is the move into position i (undefined at 0)
    let changes: Vec<Option<f64>> = (0..n)
        .map(|i| {
            if i == 0 {
                None
            } else {
                match (prices[i - 1], prices[i]) {
                    (Some(prev), Some(curr)) => Some(curr - prev),
                    _ => None,
                }
            }
        })
        .collect();

    for i in period..n {
        let window = &changes[i + 1 - period..=i];
        let mut gains = 0.0;
        let mut losses = 0.0;
        let mut complete = true;
        for change in window {
            match change {
                Some(c) if *c > 0.0 => gains += c,
                Some(c) => losses += c.abs(),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;

        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        };
        out[i] = finite(rsi);
    }
    out
}
