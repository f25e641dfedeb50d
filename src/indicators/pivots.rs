/// Pivot points from the previous bar's high, low and close
///
/// Position `i` uses bar `i - 1`, so the first position is undefined.
use super::{finite, Series};
use crate::models::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct PivotSeries {
    pub pivot: Series,
    pub r1: Series,
    pub r2: Series,
    pub r3: Series,
    pub s1: Series,
    pub s2: Series,
    pub s3: Series,
}

impl PivotSeries {
    fn undefined(n: usize) -> Self {
        Self {
            pivot: vec![None; n],
            r1: vec![None; n],
            r2: vec![None; n],
            r3: vec![None; n],
            s1: vec![None; n],
            s2: vec![None; n],
            s3: vec![None; n],
        }
    }

    fn set(&mut self, i: usize, levels: [f64; 7]) {
        let [p, r1, r2, r3, s1, s2, s3] = levels;
        self.pivot[i] = finite(p);
        self.r1[i] = finite(r1);
        self.r2[i] = finite(r2);
        self.r3[i] = finite(r3);
        self.s1[i] = finite(s1);
        self.s2[i] = finite(s2);
        self.s3[i] = finite(s3);
    }
}

/// Classic floor-trader pivots
pub fn calculate_pivot_points(bars: &[PriceBar]) -> PivotSeries {
    let mut out = PivotSeries::undefined(bars.len());
    for i in 1..bars.len() {
        let prev = &bars[i - 1];
        let (h, l, c) = (prev.high, prev.low, prev.close);
        let p = (h + l + c) / 3.0;
        out.set(
            i,
            [
                p,
                2.0 * p - l,
                p + (h - l),
                h + 2.0 * (p - l),
                2.0 * p - h,
                p - (h - l),
                l - 2.0 * (h - p),
            ],
        );
    }
    out
}

/// Fibonacci pivots: pivot ± 0.382 / 0.618 / 1.0 of the previous range
pub fn calculate_fibonacci_pivots(bars: &[PriceBar]) -> PivotSeries {
    let mut out = PivotSeries::undefined(bars.len());
    for i in 1..bars.len() {
        let prev = &bars[i - 1];
        let p = prev.typical_price();
        let range = prev.range();
        out.set(
            i,
            [
                p,
                p + 0.382 * range,
                p + 0.618 * range,
                p + range,
                p - 0.382 * range,
                p - 0.618 * range,
                p - range,
            ],
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use crate::models::test_support::create_test_bars;

    #[test]
    fn test_standard_pivots() {
        let bars = create_test_bars(&[(100.0, 110.0, 90.0, 105.0), (105.0, 106.0, 104.0, 105.0)]);
        let pivots = calculate_pivot_points(&bars);
        assert!(pivots.pivot[0].is_none());
        // P = (110 + 90 + 105) / 3
        let p = 305.0 / 3.0;
        assert_approx(pivots.pivot[1], p, 1e-12);
        assert_approx(pivots.r1[1], 2.0 * p - 90.0, 1e-12);
        assert_approx(pivots.s1[1], 2.0 * p - 110.0, 1e-12);
        assert_approx(pivots.r2[1], p + 20.0, 1e-12);
    }

    #[test]
    fn test_fibonacci_pivots_ordered() {
        let bars = create_test_bars(&[(100.0, 110.0, 90.0, 105.0), (105.0, 106.0, 104.0, 105.0)]);
        let fib = calculate_fibonacci_pivots(&bars);
        let levels = [
            fib.s3[1], fib.s2[1], fib.s1[1], fib.pivot[1], fib.r1[1], fib.r2[1], fib.r3[1],
        ];
        for pair in levels.windows(2) {
            assert!(pair[0].unwrap() < pair[1].unwrap());
        }
    }
}
