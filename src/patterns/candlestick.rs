/// Candlestick formations over 1-3 bar windows
///
/// Each detector scans every window ending at index `i` and reports a match
/// at `i`. A window containing a malformed bar fails the whole detector,
/// which the dispatcher isolates.
use super::{PatternMatch, PatternParams, PatternSignal};
use crate::error::Result;
use crate::models::PriceBar;

/// Body/range ratio under which a bar counts as a doji
const DOJI_BODY_RATIO: f64 = 0.1;
/// Bars of context used to judge the trend preceding a formation
const TREND_LOOKBACK: usize = 3;

fn scan(
    bars: &[PriceBar],
    span: usize,
    id: &str,
    description: &str,
    check: impl Fn(&[PriceBar], usize) -> Option<(PatternSignal, f64)>,
) -> Result<Vec<PatternMatch>> {
    let mut found = Vec::new();
    if bars.len() < span {
        return Ok(found);
    }
    for i in (span - 1)..bars.len() {
        let start = i + 1 - span;
        for (offset, bar) in bars[start..=i].iter().enumerate() {
            bar.validate(start + offset)?;
        }
        if let Some((signal, confidence)) = check(bars, i) {
            found.push(PatternMatch::new(id, i, span, signal, confidence, description));
        }
    }
    Ok(found)
}

/// Relative close change over the bars before `i`; 0 without enough history
fn prior_trend(bars: &[PriceBar], i: usize) -> f64 {
    if i < TREND_LOOKBACK {
        return 0.0;
    }
    let from = bars[i - TREND_LOOKBACK].close;
    let to = bars[i - 1].close;
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from
    }
}

fn body_ratio(bar: &PriceBar) -> Option<f64> {
    let range = bar.range();
    if range > 0.0 {
        Some(bar.body() / range)
    } else {
        None
    }
}

fn shadow_confidence(shadow: f64, body: f64) -> f64 {
    if body == 0.0 {
        return 0.6;
    }
    (shadow / body / 2.0 * 0.4 + 0.5).min(0.9)
}

fn engulfing_confidence(ratio: f64) -> f64 {
    (0.5 + ratio * 0.1).min(0.9)
}

/// Long lower shadow, small body at the top of the range
fn hammer_shape(bar: &PriceBar) -> bool {
    let range = bar.range();
    range > 0.0
        && bar.lower_wick() >= 2.0 * bar.body()
        && bar.lower_wick() >= 0.6 * range
        && bar.upper_wick() <= 0.1 * range
}

/// Long upper shadow, small body at the bottom of the range
fn inverted_hammer_shape(bar: &PriceBar) -> bool {
    let range = bar.range();
    range > 0.0
        && bar.upper_wick() >= 2.0 * bar.body()
        && bar.upper_wick() >= 0.6 * range
        && bar.lower_wick() <= 0.1 * range
}

fn small_wicks(bar: &PriceBar) -> bool {
    let range = bar.range();
    range > 0.0 && bar.upper_wick() <= 0.25 * range && bar.lower_wick() <= 0.25 * range
}

pub fn detect_doji(bars: &[PriceBar], _params: &PatternParams) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "doji", "Open and close nearly equal: indecision", |b, i| {
        let ratio = body_ratio(&b[i])?;
        (ratio <= DOJI_BODY_RATIO).then(|| {
            let confidence = (1.0 - ratio / DOJI_BODY_RATIO).clamp(0.5, 0.95);
            (PatternSignal::Neutral, confidence)
        })
    })
}

pub fn detect_hammer(bars: &[PriceBar], _params: &PatternParams) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "hammer", "Long lower shadow after a decline", |b, i| {
        let bar = &b[i];
        (hammer_shape(bar) && prior_trend(b, i) < 0.0).then(|| {
            (
                PatternSignal::Bullish,
                shadow_confidence(bar.lower_wick(), bar.body()),
            )
        })
    })
}

pub fn detect_hanging_man(bars: &[PriceBar], _params: &PatternParams) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "hanging_man", "Long lower shadow after an advance", |b, i| {
        let bar = &b[i];
        (hammer_shape(bar) && prior_trend(b, i) > 0.0).then(|| {
            (
                PatternSignal::Bearish,
                shadow_confidence(bar.lower_wick(), bar.body()),
            )
        })
    })
}

pub fn detect_inverted_hammer(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "inverted_hammer", "Long upper shadow after a decline", |b, i| {
        let bar = &b[i];
        (inverted_hammer_shape(bar) && prior_trend(b, i) < 0.0).then(|| {
            (
                PatternSignal::Bullish,
                shadow_confidence(bar.upper_wick(), bar.body()),
            )
        })
    })
}

pub fn detect_shooting_star(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "shooting_star", "Long upper shadow after an advance", |b, i| {
        let bar = &b[i];
        (inverted_hammer_shape(bar) && prior_trend(b, i) > 0.0).then(|| {
            (
                PatternSignal::Bearish,
                shadow_confidence(bar.upper_wick(), bar.body()),
            )
        })
    })
}

pub fn detect_bullish_marubozu(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "bullish_marubozu", "Full bullish body without shadows", |b, i| {
        let bar = &b[i];
        (bar.is_bullish() && body_ratio(bar)? >= 0.95).then_some((PatternSignal::Bullish, 0.85))
    })
}

pub fn detect_bearish_marubozu(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "bearish_marubozu", "Full bearish body without shadows", |b, i| {
        let bar = &b[i];
        (bar.is_bearish() && body_ratio(bar)? >= 0.95).then_some((PatternSignal::Bearish, 0.85))
    })
}

pub fn detect_spinning_top(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 1, "spinning_top", "Small body with shadows on both sides", |b, i| {
        let bar = &b[i];
        let ratio = body_ratio(bar)?;
        (ratio > DOJI_BODY_RATIO
            && ratio <= 0.3
            && bar.upper_wick() > bar.body()
            && bar.lower_wick() > bar.body())
        .then_some((PatternSignal::Neutral, 0.6))
    })
}

pub fn detect_bullish_engulfing(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 2, "bullish_engulfing", "Bullish body engulfs the prior bearish body", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        (prev.is_bearish()
            && curr.is_bullish()
            && curr.open <= prev.close
            && curr.close >= prev.open
            && curr.body() > prev.body())
        .then(|| {
            (
                PatternSignal::Bullish,
                engulfing_confidence(curr.body() / prev.body()),
            )
        })
    })
}

pub fn detect_bearish_engulfing(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 2, "bearish_engulfing", "Bearish body engulfs the prior bullish body", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        (prev.is_bullish()
            && curr.is_bearish()
            && curr.open >= prev.close
            && curr.close <= prev.open
            && curr.body() > prev.body())
        .then(|| {
            (
                PatternSignal::Bearish,
                engulfing_confidence(curr.body() / prev.body()),
            )
        })
    })
}

/// Current body inside a large previous body
fn harami_inside(prev: &PriceBar, curr: &PriceBar) -> bool {
    body_ratio(prev).is_some_and(|r| r >= 0.5)
        && curr.body() < prev.body()
        && curr.body_top() <= prev.body_top()
        && curr.body_bottom() >= prev.body_bottom()
}

pub fn detect_bullish_harami(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 2, "bullish_harami", "Small bullish body inside a bearish body", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        (prev.is_bearish() && curr.is_bullish() && harami_inside(prev, curr))
            .then_some((PatternSignal::Bullish, 0.7))
    })
}

pub fn detect_bearish_harami(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 2, "bearish_harami", "Small bearish body inside a bullish body", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        (prev.is_bullish() && curr.is_bearish() && harami_inside(prev, curr))
            .then_some((PatternSignal::Bearish, 0.7))
    })
}

pub fn detect_piercing_line(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 2, "piercing_line", "Opens below and closes past the prior midpoint", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        let midpoint = (prev.open + prev.close) / 2.0;
        (prev.is_bearish()
            && curr.is_bullish()
            && curr.open < prev.close
            && curr.close > midpoint
            && curr.close < prev.open)
            .then_some((PatternSignal::Bullish, 0.75))
    })
}

pub fn detect_dark_cloud_cover(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 2, "dark_cloud_cover", "Opens above and closes under the prior midpoint", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        let midpoint = (prev.open + prev.close) / 2.0;
        (prev.is_bullish()
            && curr.is_bearish()
            && curr.open > prev.close
            && curr.close < midpoint
            && curr.close > prev.open)
            .then_some((PatternSignal::Bearish, 0.75))
    })
}

fn nearly_equal(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs());
    scale > 0.0 && (a - b).abs() / scale <= tolerance
}

pub fn detect_tweezer_top(bars: &[PriceBar], params: &PatternParams) -> Result<Vec<PatternMatch>> {
    let tolerance = params.tolerance * 0.1;
    scan(bars, 2, "tweezer_top", "Matching highs with a bearish reversal", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        (prev.is_bullish() && curr.is_bearish() && nearly_equal(prev.high, curr.high, tolerance))
            .then_some((PatternSignal::Bearish, 0.7))
    })
}

pub fn detect_tweezer_bottom(
    bars: &[PriceBar],
    params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    let tolerance = params.tolerance * 0.1;
    scan(bars, 2, "tweezer_bottom", "Matching lows with a bullish reversal", |b, i| {
        let (prev, curr) = (&b[i - 1], &b[i]);
        (prev.is_bearish() && curr.is_bullish() && nearly_equal(prev.low, curr.low, tolerance))
            .then_some((PatternSignal::Bullish, 0.7))
    })
}

pub fn detect_morning_star(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 3, "morning_star", "Bearish bar, small star, bullish recovery", |b, i| {
        let (first, star, third) = (&b[i - 2], &b[i - 1], &b[i]);
        (first.is_bearish()
            && star.body() < first.body() / 3.0
            && third.is_bullish()
            && third.close > (first.open + first.close) / 2.0)
            .then_some((PatternSignal::Bullish, 0.85))
    })
}

pub fn detect_evening_star(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(bars, 3, "evening_star", "Bullish bar, small star, bearish decline", |b, i| {
        let (first, star, third) = (&b[i - 2], &b[i - 1], &b[i]);
        (first.is_bullish()
            && star.body() < first.body() / 3.0
            && third.is_bearish()
            && third.close < (first.open + first.close) / 2.0)
            .then_some((PatternSignal::Bearish, 0.85))
    })
}

pub fn detect_three_white_soldiers(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(
        bars,
        3,
        "three_white_soldiers",
        "Three bullish bars with rising closes and small shadows",
        |b, i| {
            let window = &b[i - 2..=i];
            (window.iter().all(|bar| bar.is_bullish() && small_wicks(bar))
                && window[1].close > window[0].close
                && window[2].close > window[1].close)
                .then_some((PatternSignal::Bullish, 0.8))
        },
    )
}

pub fn detect_three_black_crows(
    bars: &[PriceBar],
    _params: &PatternParams,
) -> Result<Vec<PatternMatch>> {
    scan(
        bars,
        3,
        "three_black_crows",
        "Three bearish bars with falling closes and small shadows",
        |b, i| {
            let window = &b[i - 2..=i];
            (window.iter().all(|bar| bar.is_bearish() && small_wicks(bar))
                && window[1].close < window[0].close
                && window[2].close < window[1].close)
                .then_some((PatternSignal::Bearish, 0.8))
        },
    )
}
