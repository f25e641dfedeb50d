/// Least-squares linear regression over a trailing window of closes
use super::{closes, finite, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressionSeries {
    /// Fitted value at the current bar
    pub value: Series,
    /// Slope per bar
    pub slope: Series,
    /// Projection one bar ahead (time series forecast)
    pub forecast: Series,
}

pub fn calculate_linear_regression(bars: &[PriceBar], period: usize) -> LinearRegressionSeries {
    let n = bars.len();
    let mut result = LinearRegressionSeries {
        value: vec![None; n],
        slope: vec![None; n],
        forecast: vec![None; n],
    };
    if period < 2 || n < period {
        return result;
    }

    let prices = closes(bars);
    let p = period as f64;
    // x runs 0..period-1 inside each window
    let sum_x = p * (p - 1.0) / 2.0;
    let sum_x2 = (p - 1.0) * p * (2.0 * p - 1.0) / 6.0;
    let denominator = p * sum_x2 - sum_x * sum_x;

    for i in (period - 1)..n {
        let window: Option<Vec<f64>> = prices[i + 1 - period..=i].iter().copied().collect();
        let Some(window) = window else {
            continue;
        };
        let sum_y: f64 = window.iter().sum();
        let sum_xy: f64 = window
            .iter()
            .enumerate()
            .map(|(x, y)| x as f64 * y)
            .sum();

        let slope = (p * sum_xy - sum_x * sum_y) / denominator;
        let intercept = (sum_y - slope * sum_x) / p;

        result.slope[i] = finite(slope);
        result.value[i] = finite(intercept + slope * (p - 1.0));
        result.forecast[i] = finite(intercept + slope * p);
    }
    result
}
