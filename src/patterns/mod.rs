// Pattern detection module
// Candlestick formations look at a fixed window of 1-3 bars; chart formations
// work from swing pivots over the whole history. Every detector is isolated:
// an error or panic in one is logged and the scan carries on.

pub mod candlestick;
pub mod chart;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::Result;
use crate::models::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSignal {
    Bullish,
    Bearish,
    Neutral,
}

impl PatternSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternSignal::Bullish => "bullish",
            PatternSignal::Bearish => "bearish",
            PatternSignal::Neutral => "neutral",
        }
    }
}

/// One detected formation. `index` is the last bar of the formation and
/// `span` the number of bars it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_id: String,
    pub index: usize,
    pub span: usize,
    pub signal: PatternSignal,
    pub confidence: f64,
    pub description: String,
}

impl PatternMatch {
    pub fn new(
        pattern_id: &str,
        index: usize,
        span: usize,
        signal: PatternSignal,
        confidence: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern_id: pattern_id.to_string(),
            index,
            span,
            signal,
            confidence: confidence.clamp(0.0, 1.0),
            description: description.into(),
        }
    }

    /// First bar of the formation
    pub fn start(&self) -> usize {
        (self.index + 1).saturating_sub(self.span)
    }
}

/// Per-pattern tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    /// Relative band within which peaks/troughs count as equal
    pub tolerance: f64,
    /// Matches below this confidence are dropped
    pub min_confidence: f64,
    /// Relative slope per bar under which a trendline counts as flat
    pub slope_tolerance: f64,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            tolerance: 0.02,
            min_confidence: 0.0,
            slope_tolerance: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFamily {
    Candlestick,
    Chart,
}

type Detector = fn(&[PriceBar], &PatternParams) -> Result<Vec<PatternMatch>>;

pub struct PatternDefinition {
    pub id: &'static str,
    pub family: PatternFamily,
    detect: Detector,
}

macro_rules! pattern {
    ($id:literal, $family:ident, $detector:path) => {
        PatternDefinition {
            id: $id,
            family: PatternFamily::$family,
            detect: $detector,
        }
    };
}

/// Every registered detector
pub static PATTERNS: &[PatternDefinition] = &[
    pattern!("doji", Candlestick, candlestick::detect_doji),
    pattern!("hammer", Candlestick, candlestick::detect_hammer),
    pattern!("inverted_hammer", Candlestick, candlestick::detect_inverted_hammer),
    pattern!("hanging_man", Candlestick, candlestick::detect_hanging_man),
    pattern!("shooting_star", Candlestick, candlestick::detect_shooting_star),
    pattern!("bullish_marubozu", Candlestick, candlestick::detect_bullish_marubozu),
    pattern!("bearish_marubozu", Candlestick, candlestick::detect_bearish_marubozu),
    pattern!("spinning_top", Candlestick, candlestick::detect_spinning_top),
    pattern!("bullish_engulfing", Candlestick, candlestick::detect_bullish_engulfing),
    pattern!("bearish_engulfing", Candlestick, candlestick::detect_bearish_engulfing),
    pattern!("bullish_harami", Candlestick, candlestick::detect_bullish_harami),
    pattern!("bearish_harami", Candlestick, candlestick::detect_bearish_harami),
    pattern!("piercing_line", Candlestick, candlestick::detect_piercing_line),
    pattern!("dark_cloud_cover", Candlestick, candlestick::detect_dark_cloud_cover),
    pattern!("tweezer_top", Candlestick, candlestick::detect_tweezer_top),
    pattern!("tweezer_bottom", Candlestick, candlestick::detect_tweezer_bottom),
    pattern!("morning_star", Candlestick, candlestick::detect_morning_star),
    pattern!("evening_star", Candlestick, candlestick::detect_evening_star),
    pattern!("three_white_soldiers", Candlestick, candlestick::detect_three_white_soldiers),
    pattern!("three_black_crows", Candlestick, candlestick::detect_three_black_crows),
    pattern!("double_top", Chart, chart::detect_double_top),
    pattern!("double_bottom", Chart, chart::detect_double_bottom),
    pattern!("triple_top", Chart, chart::detect_triple_top),
    pattern!("triple_bottom", Chart, chart::detect_triple_bottom),
    pattern!("head_and_shoulders", Chart, chart::detect_head_and_shoulders),
    pattern!("inverse_head_and_shoulders", Chart, chart::detect_inverse_head_and_shoulders),
    pattern!("ascending_triangle", Chart, chart::detect_ascending_triangle),
    pattern!("descending_triangle", Chart, chart::detect_descending_triangle),
    pattern!("symmetrical_triangle", Chart, chart::detect_symmetrical_triangle),
    pattern!("rising_wedge", Chart, chart::detect_rising_wedge),
    pattern!("falling_wedge", Chart, chart::detect_falling_wedge),
    pattern!("bull_flag", Chart, chart::detect_bull_flag),
    pattern!("bear_flag", Chart, chart::detect_bear_flag),
];

pub fn find_pattern(id: &str) -> Option<&'static PatternDefinition> {
    let id = id.trim().to_ascii_lowercase();
    PATTERNS.iter().find(|p| p.id == id)
}

pub fn known_patterns() -> impl Iterator<Item = &'static str> {
    PATTERNS.iter().map(|p| p.id)
}

/// Detect patterns by id.
///
/// `None` runs every registered detector with default parameters; an empty
/// selection detects nothing.
pub fn detect_patterns(bars: &[PriceBar], selected: Option<&[String]>) -> Vec<PatternMatch> {
    match selected {
        None => detect_configured(bars, None),
        Some(ids) => {
            let configured: BTreeMap<String, PatternParams> = ids
                .iter()
                .map(|id| (id.clone(), PatternParams::default()))
                .collect();
            detect_configured(bars, Some(&configured))
        }
    }
}

/// Detect patterns with per-pattern parameters, sorted by bar index
pub fn detect_configured(
    bars: &[PriceBar],
    selected: Option<&BTreeMap<String, PatternParams>>,
) -> Vec<PatternMatch> {
    let defaults = PatternParams::default();
    let mut plan: Vec<(&PatternDefinition, &PatternParams)> = Vec::new();

    match selected {
        None => plan.extend(PATTERNS.iter().map(|def| (def, &defaults))),
        Some(map) => {
            for (id, params) in map {
                match find_pattern(id) {
                    Some(def) => plan.push((def, params)),
                    None => tracing::warn!("Unknown pattern '{}' skipped", id),
                }
            }
        }
    }

    let mut matches = Vec::new();
    for (def, params) in plan {
        matches.extend(run_detector(def, bars, params));
    }

    matches.sort_by(|a, b| {
        a.index
            .cmp(&b.index)
            .then_with(|| a.pattern_id.cmp(&b.pattern_id))
    });
    matches
}

fn run_detector(
    def: &PatternDefinition,
    bars: &[PriceBar],
    params: &PatternParams,
) -> Vec<PatternMatch> {
    match catch_unwind(AssertUnwindSafe(|| (def.detect)(bars, params))) {
        Ok(Ok(found)) => found
            .into_iter()
            .filter(|m| m.confidence >= params.min_confidence)
            .collect(),
        Ok(Err(e)) => {
            tracing::warn!("Pattern detector '{}' failed: {}", def.id, e);
            Vec::new()
        }
        Err(_) => {
            tracing::error!("Pattern detector '{}' panicked", def.id);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::create_test_bars;

    fn soldiers() -> Vec<PriceBar> {
        create_test_bars(&[
            (100.0, 105.5, 99.5, 105.0),
            (105.0, 110.5, 104.5, 110.0),
            (110.0, 115.5, 109.5, 115.0),
        ])
    }

    #[test]
    fn test_empty_selection_detects_nothing() {
        let selected: Vec<String> = Vec::new();
        assert!(detect_patterns(&soldiers(), Some(&selected)).is_empty());
    }

    #[test]
    fn test_unknown_pattern_skipped() {
        let selected = vec!["flying_pig".to_string(), "three_white_soldiers".to_string()];
        let found = detect_patterns(&soldiers(), Some(&selected));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern_id, "three_white_soldiers");
    }

    #[test]
    fn test_all_patterns_sorted_by_index() {
        let found = detect_patterns(&soldiers(), None);
        assert!(found.iter().any(|m| m.pattern_id == "three_white_soldiers"));
        assert!(found.windows(2).all(|w| w[0].index <= w[1].index));
    }

    #[test]
    fn test_malformed_bar_isolated_per_detector() {
        let mut bars = soldiers();
        bars[0].high = f64::NAN;
        // the malformed window is rejected, nothing aborts
        let found = detect_patterns(&bars, None);
        assert!(found.iter().all(|m| m.confidence.is_finite()));
    }

    #[test]
    fn test_min_confidence_filter() {
        let mut selected = BTreeMap::new();
        selected.insert(
            "three_white_soldiers".to_string(),
            PatternParams {
                min_confidence: 0.9,
                ..PatternParams::default()
            },
        );
        assert!(detect_configured(&soldiers(), Some(&selected)).is_empty());
    }

    #[test]
    fn test_registry_ids_unique() {
        let mut ids: Vec<&str> = known_patterns().collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(find_pattern("Double_Top").is_some());
    }
}
