/// Chart formations built from swing pivots
///
/// A pivot is a bar whose high (low) is strictly above (below) every other
/// bar within `PIVOT_SPAN` bars on either side, so it is only confirmed
/// `PIVOT_SPAN` bars later. Matches are reported at that confirming bar.
use std::collections::BTreeMap;

use super::{PatternMatch, PatternParams, PatternSignal};
use crate::error::Result;
use crate::models::{validate_bars, PriceBar};

const PIVOT_SPAN: usize = 2;
/// Bars in the impulse leg of a flag
const POLE_LEN: usize = 10;
/// Bars in the consolidation of a flag
const FLAG_LEN: usize = 5;
/// Minimum relative move of the flag pole
const POLE_MIN_MOVE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pivot {
    index: usize,
    price: f64,
}

fn find_pivots(bars: &[PriceBar]) -> (Vec<Pivot>, Vec<Pivot>) {
    let mut peaks = Vec::new();
    let mut troughs = Vec::new();
    let n = bars.len();
    if n < 2 * PIVOT_SPAN + 1 {
        return (peaks, troughs);
    }
    for i in PIVOT_SPAN..n - PIVOT_SPAN {
        let window = (i - PIVOT_SPAN..=i + PIVOT_SPAN).filter(|&k| k != i);
        let (high, low) = (bars[i].high, bars[i].low);
        if window.clone().all(|k| bars[k].high < high) {
            peaks.push(Pivot { index: i, price: high });
        }
        if window.clone().all(|k| bars[k].low > low) {
            troughs.push(Pivot { index: i, price: low });
        }
    }
    (peaks, troughs)
}

/// Bar at which a pivot-based formation ending at `last_pivot` is confirmed
fn confirmed_at(last_pivot: usize, n: usize) -> usize {
    (last_pivot + PIVOT_SPAN).min(n - 1)
}

fn chart_match(
    id: &str,
    start: usize,
    last_pivot: usize,
    n: usize,
    signal: PatternSignal,
    confidence: f64,
    description: String,
) -> PatternMatch {
    let index = confirmed_at(last_pivot, n);
    PatternMatch::new(id, index, index + 1 - start, signal, confidence, description)
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    let avg = (a + b) / 2.0;
    avg != 0.0 && (a - b).abs() / avg.abs() <= tolerance
}

/// Relative slope per bar between two pivots
fn slope(p1: &Pivot, p2: &Pivot) -> f64 {
    let dx = p2.index as f64 - p1.index as f64;
    if dx == 0.0 || p1.price == 0.0 {
        return 0.0;
    }
    (p2.price - p1.price) / p1.price / dx
}

fn double_extreme(
    bars: &[PriceBar],
    params: &PatternParams,
    id: &str,
    tops: bool,
) -> Result<Vec<PatternMatch>> {
    validate_bars(bars)?;
    let n = bars.len();
    let (peaks, troughs) = find_pivots(bars);
    let (extremes, opposite) = if tops { (&peaks, &troughs) } else { (&troughs, &peaks) };

    let mut found = Vec::new();
    for pair in extremes.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if !within(first.price, second.price, params.tolerance) {
            continue;
        }
        let avg = (first.price + second.price) / 2.0;
        let between = opposite
            .iter()
            .filter(|p| p.index > first.index && p.index < second.index);
        let middle = if tops {
            between.map(|p| p.price).reduce(f64::min)
        } else {
            between.map(|p| p.price).reduce(f64::max)
        };
        let Some(middle) = middle else {
            continue;
        };
        // the pullback between the two extremes must be clearly deeper than the band
        let depth = (avg - middle).abs() / avg.abs();
        if depth <= params.tolerance {
            continue;
        }
        let (signal, level) = if tops {
            (PatternSignal::Bearish, "resistance")
        } else {
            (PatternSignal::Bullish, "support")
        };
        found.push(chart_match(
            id,
            first.index,
            second.index,
            n,
            signal,
            0.75,
            format!("Two tests of {} near {:.4}, neckline {:.4}", level, avg, middle),
        ));
    }
    Ok(found)
}

pub fn detect_double_top(bars: &[PriceBar], params: &PatternParams) -> Result<Vec<PatternMatch>> {
    double_extreme(bars, params, "double_top", true)
}

pub fn detect_double_bottom(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    double_extreme(bars, params, "double_bottom", false)
}

fn triple_extreme(
    bars: &[PriceBar],
    params: &PatternParams,
    id: &str,
    tops: bool,
) -> Result<Vec<PatternMatch>> {
    validate_bars(bars)?;
    let n = bars.len();
    let (peaks, troughs) = find_pivots(bars);
    let (extremes, opposite) = if tops { (&peaks, &troughs) } else { (&troughs, &peaks) };

    let mut found = Vec::new();
    for triple in extremes.windows(3) {
        let avg = triple.iter().map(|p| p.price).sum::<f64>() / 3.0;
        if avg == 0.0 {
            continue;
        }
        let max_dev = triple
            .iter()
            .map(|p| (p.price - avg).abs())
            .fold(0.0, f64::max);
        if max_dev / avg.abs() > params.tolerance {
            continue;
        }
        let reactions = opposite
            .iter()
            .filter(|p| p.index > triple[0].index && p.index < triple[2].index)
            .count();
        if reactions < 2 {
            continue;
        }
        let signal = if tops {
            PatternSignal::Bearish
        } else {
            PatternSignal::Bullish
        };
        found.push(chart_match(
            id,
            triple[0].index,
            triple[2].index,
            n,
            signal,
            0.8,
            format!("Three tests of {:.4}", avg),
        ));
    }
    Ok(found)
}

pub fn detect_triple_top(bars: &[PriceBar], params: &PatternParams) -> Result<Vec<PatternMatch>> {
    triple_extreme(bars, params, "triple_top", true)
}

pub fn detect_triple_bottom(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    triple_extreme(bars, params, "triple_bottom", false)
}

fn head_and_shoulders(
    bars: &[PriceBar],
    params: &PatternParams,
    id: &str,
    inverse: bool,
) -> Result<Vec<PatternMatch>> {
    validate_bars(bars)?;
    let n = bars.len();
    let (peaks, troughs) = find_pivots(bars);
    let (extremes, opposite) = if inverse { (&troughs, &peaks) } else { (&peaks, &troughs) };

    let mut found = Vec::new();
    for triple in extremes.windows(3) {
        let (left, head, right) = (triple[0], triple[1], triple[2]);
        if !within(left.price, right.price, params.tolerance) {
            continue;
        }
        let shoulders = (left.price + right.price) / 2.0;
        let head_clear = if inverse {
            head.price < shoulders * (1.0 - params.tolerance)
        } else {
            head.price > shoulders * (1.0 + params.tolerance)
        };
        if !head_clear {
            continue;
        }
        let neckline: Vec<f64> = opposite
            .iter()
            .filter(|p| p.index > left.index && p.index < right.index)
            .map(|p| p.price)
            .collect();
        if neckline.len() < 2 {
            continue;
        }
        let neck = (neckline[0] + neckline[neckline.len() - 1]) / 2.0;
        let signal = if inverse {
            PatternSignal::Bullish
        } else {
            PatternSignal::Bearish
        };
        found.push(chart_match(
            id,
            left.index,
            right.index,
            n,
            signal,
            0.8,
            format!("Head at {:.4}, neckline {:.4}", head.price, neck),
        ));
    }
    Ok(found)
}

pub fn detect_head_and_shoulders(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    head_and_shoulders(bars, params, "head_and_shoulders", false)
}

pub fn detect_inverse_head_and_shoulders(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    head_and_shoulders(bars, params, "inverse_head_and_shoulders", true)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Converging {
    Ascending,
    Descending,
    Symmetrical,
    RisingWedge,
    FallingWedge,
}

impl Converging {
    fn classify(upper: f64, lower: f64, flat: f64) -> Option<Converging> {
        if upper.abs() < flat && lower > flat {
            Some(Converging::Ascending)
        } else if lower.abs() < flat && upper < -flat {
            Some(Converging::Descending)
        } else if upper < -flat && lower > flat {
            Some(Converging::Symmetrical)
        } else if upper > flat && lower > flat && lower > upper {
            Some(Converging::RisingWedge)
        } else if upper < -flat && lower < -flat && upper < lower {
            Some(Converging::FallingWedge)
        } else {
            None
        }
    }
}

/// Pair consecutive peak pairs with overlapping trough pairs and classify
/// the two trendlines. Duplicate matches at the same bar keep the first.
fn trendline_patterns(
    bars: &[PriceBar],
    params: &PatternParams,
    id: &str,
    wanted: Converging,
    signal: PatternSignal,
    confidence: f64,
) -> Result<Vec<PatternMatch>> {
    validate_bars(bars)?;
    let n = bars.len();
    let (peaks, troughs) = find_pivots(bars);

    let mut by_index: BTreeMap<usize, PatternMatch> = BTreeMap::new();
    for p in peaks.windows(2) {
        for t in troughs.windows(2) {
            let start = p[0].index.max(t[0].index);
            let end = p[1].index.min(t[1].index);
            if end <= start {
                continue;
            }
            let upper = slope(&p[0], &p[1]);
            let lower = slope(&t[0], &t[1]);
            if Converging::classify(upper, lower, params.slope_tolerance) != Some(wanted) {
                continue;
            }
            let first = p[0].index.min(t[0].index);
            let last = p[1].index.max(t[1].index);
            let m = chart_match(
                id,
                first,
                last,
                n,
                signal,
                confidence,
                format!(
                    "Resistance slope {:+.4}%/bar, support slope {:+.4}%/bar",
                    upper * 100.0,
                    lower * 100.0
                ),
            );
            by_index.entry(m.index).or_insert(m);
        }
    }
    Ok(by_index.into_values().collect())
}

pub fn detect_ascending_triangle(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    trendline_patterns(
        bars,
        params,
        "ascending_triangle",
        Converging::Ascending,
        PatternSignal::Bullish,
        0.7,
    )
}

pub fn detect_descending_triangle(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    trendline_patterns(
        bars,
        params,
        "descending_triangle",
        Converging::Descending,
        PatternSignal::Bearish,
        0.7,
    )
}

pub fn detect_symmetrical_triangle(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    trendline_patterns(
        bars,
        params,
        "symmetrical_triangle",
        Converging::Symmetrical,
        PatternSignal::Neutral,
        0.65,
    )
}

pub fn detect_rising_wedge(bars: &[PriceBar], params: &PatternParams) -> Result<Vec<PatternMatch>> {
    trendline_patterns(
        bars,
        params,
        "rising_wedge",
        Converging::RisingWedge,
        PatternSignal::Bearish,
        0.7,
    )
}

pub fn detect_falling_wedge(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    trendline_patterns(
        bars,
        params,
        "falling_wedge",
        Converging::FallingWedge,
        PatternSignal::Bullish,
        0.7,
    )
}

/// Strong pole followed by a shallow counter-move of at most half the pole
fn flag(bars: &[PriceBar], id: &str, bullish: bool) -> Result<Vec<PatternMatch>> {
    validate_bars(bars)?;
    let span = POLE_LEN + FLAG_LEN;
    let mut found = Vec::new();
    if bars.len() < span + 1 {
        return Ok(found);
    }

    for i in span..bars.len() {
        let pole_start = bars[i - span].close;
        let pole_end = bars[i - FLAG_LEN].close;
        if pole_start <= 0.0 || pole_end <= 0.0 {
            continue;
        }
        let pole_move = (pole_end - pole_start) / pole_start;
        let drift = (bars[i].close - pole_end) / pole_end;

        let flag_bars = &bars[i + 1 - FLAG_LEN..=i];
        let flag_high = flag_bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let flag_low = flag_bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let pole_height = (pole_end - pole_start).abs();
        let tight = flag_high - flag_low <= 0.5 * pole_height;

        let matched = if bullish {
            pole_move >= POLE_MIN_MOVE && drift <= 0.0 && drift >= -pole_move / 2.0
        } else {
            pole_move <= -POLE_MIN_MOVE && drift >= 0.0 && drift <= -pole_move / 2.0
        };
        if matched && tight {
            let signal = if bullish {
                PatternSignal::Bullish
            } else {
                PatternSignal::Bearish
            };
            found.push(PatternMatch::new(
                id,
                i,
                span + 1,
                signal,
                0.65,
                format!(
                    "Pole {:+.2}% then consolidation {:+.2}%",
                    pole_move * 100.0,
                    drift * 100.0
                ),
            ));
        }
    }
    Ok(found)
}

pub fn detect_bull_flag(bars: &[PriceBar], _params: &PatternParams) -> Result<Vec<PatternMatch>> {
    flag(bars, "bull_flag", true)
}

pub fn detect_bear_flag(bars: &[PriceBar], _params: &PatternParams) -> Result<Vec<PatternMatch>> {
    flag(bars, "bear_flag", false)
}
