/// Signal aggregation
///
/// Pipeline: risk override, collection, uniform risk dampening, then one of
/// three combination methods, then position scaling.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{MlPrediction, SentimentReading, Signal, SourceKind};
use crate::models::Action;
use crate::risk::RiskPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AggregationMethod {
    WeightedAverage,
    EnsembleVoting,
    ThresholdBased,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::WeightedAverage => "weighted_average",
            AggregationMethod::EnsembleVoting => "ensemble_voting",
            AggregationMethod::ThresholdBased => "threshold_based",
        }
    }

    /// Unknown names fall back to weighted_average with a warning
    pub fn parse(name: &str) -> AggregationMethod {
        match name.trim().to_ascii_lowercase().as_str() {
            "weighted_average" | "weighted" => AggregationMethod::WeightedAverage,
            "ensemble_voting" | "voting" | "ensemble" => AggregationMethod::EnsembleVoting,
            "threshold_based" | "threshold" => AggregationMethod::ThresholdBased,
            other => {
                tracing::warn!(
                    "Unknown aggregation method '{}', using weighted_average",
                    other
                );
                AggregationMethod::WeightedAverage
            }
        }
    }
}

impl From<String> for AggregationMethod {
    fn from(value: String) -> Self {
        AggregationMethod::parse(&value)
    }
}

impl From<AggregationMethod> for String {
    fn from(method: AggregationMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filters for threshold_based aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationThresholds {
    pub min_confidence: f64,
    pub min_strength: f64,
    pub required_count: usize,
}

impl Default for AggregationThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_strength: 0.5,
            required_count: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub method: AggregationMethod,
    /// Weight per source kind (`ml`, `indicator`, ...); missing kinds weigh 1.0
    pub source_weights: BTreeMap<String, f64>,
    /// Extra multiplier for ML signals by model id; missing models weigh 1.0
    pub model_weights: BTreeMap<String, f64>,
    pub thresholds: AggregationThresholds,
    #[serde(flatten)]
    pub risk: RiskPolicy,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        let source_weights = [
            (SourceKind::Ml, 1.0),
            (SourceKind::Indicator, 1.0),
            (SourceKind::Pattern, 0.8),
            (SourceKind::SocialSentiment, 0.5),
            (SourceKind::NewsSentiment, 0.5),
        ]
        .into_iter()
        .map(|(kind, w)| (kind.as_str().to_string(), w))
        .collect();

        Self {
            method: AggregationMethod::WeightedAverage,
            source_weights,
            model_weights: BTreeMap::new(),
            thresholds: AggregationThresholds::default(),
            risk: RiskPolicy::default(),
        }
    }
}

impl AggregationConfig {
    /// Source weight times, for ML signals, the model weight
    pub fn weight_of(&self, signal: &Signal) -> f64 {
        let source = self
            .source_weights
            .get(signal.source().as_str())
            .copied()
            .unwrap_or(1.0);
        let model = match (signal.source(), signal.model_id()) {
            (SourceKind::Ml, Some(id)) => self.model_weights.get(id).copied().unwrap_or(1.0),
            _ => 1.0,
        };
        let weight = source * model;
        if weight.is_finite() {
            weight.max(0.0)
        } else {
            0.0
        }
    }
}

/// Opinions grouped by where they came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSources {
    pub ml_predictions: Vec<MlPrediction>,
    pub social_sentiment: Option<SentimentReading>,
    pub news_sentiment: Option<SentimentReading>,
    pub indicators: Vec<Signal>,
    pub patterns: Vec<Signal>,
}

impl SignalSources {
    /// Normalise every source into signals, in a stable order
    pub fn collect(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.ml_predictions.iter().map(|p| p.to_signal()).collect();
        if let Some(reading) = &self.social_sentiment {
            signals.push(reading.to_signal(SourceKind::SocialSentiment));
        }
        if let Some(reading) = &self.news_sentiment {
            signals.push(reading.to_signal(SourceKind::NewsSentiment));
        }
        signals.extend(self.indicators.iter().cloned());
        signals.extend(self.patterns.iter().cloned());
        signals
    }

    pub fn is_empty(&self) -> bool {
        self.ml_predictions.is_empty()
            && self.social_sentiment.is_none()
            && self.news_sentiment.is_none()
            && self.indicators.is_empty()
            && self.patterns.is_empty()
    }
}

/// Normalised per-action scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionScores {
    pub buy: f64,
    pub sell: f64,
    pub hold: f64,
}

impl ActionScores {
    fn hold_only() -> Self {
        Self {
            buy: 0.0,
            sell: 0.0,
            hold: 1.0,
        }
    }

    pub fn get(&self, action: Action) -> f64 {
        match action.normalized() {
            Action::Buy => self.buy,
            Action::Sell => self.sell,
            _ => self.hold,
        }
    }

    fn add(&mut self, action: Action, amount: f64) {
        match action.normalized() {
            Action::Buy => self.buy += amount,
            Action::Sell => self.sell += amount,
            _ => self.hold += amount,
        }
    }

    pub fn total(&self) -> f64 {
        self.buy + self.sell + self.hold
    }

    /// Scale to sum 1; all-zero buckets become hold-only
    fn normalized(&self) -> Self {
        let total = self.total();
        if !(total.is_finite() && total > 0.0) {
            return Self::hold_only();
        }
        Self {
            buy: self.buy / total,
            sell: self.sell / total,
            hold: self.hold / total,
        }
    }

    /// Strictly highest bucket; any tie resolves to hold
    pub fn winner(&self) -> Action {
        if self.buy > self.sell && self.buy > self.hold {
            Action::Buy
        } else if self.sell > self.buy && self.sell > self.hold {
            Action::Sell
        } else {
            Action::Hold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub action_scores: ActionScores,
    pub position_scale_factor: f64,
    pub risk_score: f64,
    pub signals_used: usize,
    pub aggregation_method: String,
    pub risk_override: bool,
}

impl Decision {
    pub fn hold(reason: impl Into<String>, risk_score: f64, method: AggregationMethod) -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            reason: reason.into(),
            action_scores: ActionScores::default(),
            position_scale_factor: 1.0,
            risk_score,
            signals_used: 0,
            aggregation_method: method.as_str().to_string(),
            risk_override: false,
        }
    }

    /// Evaluation could not run; nothing may be executed
    pub fn skip(reason: impl Into<String>, risk_score: f64) -> Self {
        Self {
            action: Action::Skip,
            confidence: 0.0,
            reason: reason.into(),
            action_scores: ActionScores::default(),
            position_scale_factor: 0.0,
            risk_score,
            signals_used: 0,
            aggregation_method: "none".to_string(),
            risk_override: false,
        }
    }

    pub fn is_directional(&self) -> bool {
        self.action.is_directional()
    }
}

/// Decision plus the signal lists it was built from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationReport {
    pub decision: Decision,
    pub raw_signals: Vec<Signal>,
    pub adjusted_signals: Vec<Signal>,
    /// Effective weight of each signal, aligned with `adjusted_signals`
    pub weights: Vec<f64>,
    pub confidence_multiplier: f64,
}

struct Outcome {
    action: Action,
    confidence: f64,
    scores: ActionScores,
    reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregationConfig,
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn aggregate(&self, sources: &SignalSources, risk_score: f64) -> Decision {
        self.aggregate_detailed(sources, risk_score).decision
    }

    pub fn aggregate_detailed(&self, sources: &SignalSources, risk_score: f64) -> AggregationReport {
        let method = self.config.method;
        let policy = &self.config.risk;

        if policy.is_override(risk_score) {
            let reason = if risk_score.is_finite() {
                format!(
                    "Risk score {:.1} exceeds threshold {:.1}",
                    risk_score, policy.risk_score_threshold
                )
            } else {
                format!("Invalid risk score {}", risk_score)
            };
            tracing::warn!("Risk override: {}, forcing hold", reason);
            let mut decision = Decision::hold(reason, risk_score, method);
            decision.risk_override = true;
            decision.position_scale_factor = 0.0;
            return AggregationReport {
                decision,
                raw_signals: Vec::new(),
                adjusted_signals: Vec::new(),
                weights: Vec::new(),
                confidence_multiplier: 0.0,
            };
        }

        let raw_signals = sources.collect();
        let multiplier = policy.confidence_multiplier(risk_score);
        let adjusted: Vec<Signal> = raw_signals.iter().map(|s| s.scaled(multiplier)).collect();
        let weights: Vec<f64> = adjusted.iter().map(|s| self.config.weight_of(s)).collect();

        if adjusted.is_empty() {
            let decision = Decision::hold("No signals available", risk_score, method);
            return AggregationReport {
                decision,
                raw_signals,
                adjusted_signals: adjusted,
                weights,
                confidence_multiplier: multiplier,
            };
        }

        let outcome = match method {
            AggregationMethod::WeightedAverage => weighted_average(&adjusted, &weights),
            AggregationMethod::EnsembleVoting => ensemble_voting(&adjusted),
            AggregationMethod::ThresholdBased => {
                threshold_based(&adjusted, &self.config.thresholds)
            }
        };

        let decision = Decision {
            action: outcome.action,
            confidence: super::unit(outcome.confidence),
            reason: outcome.reason,
            action_scores: outcome.scores,
            position_scale_factor: policy.position_scale_factor(risk_score),
            risk_score,
            signals_used: adjusted.len(),
            aggregation_method: method.as_str().to_string(),
            risk_override: false,
        };

        tracing::debug!(
            "Aggregated {} signals via {}: {} (confidence {:.2}, buy {:.2} / sell {:.2} / hold {:.2})",
            decision.signals_used,
            method,
            decision.action,
            decision.confidence,
            decision.action_scores.buy,
            decision.action_scores.sell,
            decision.action_scores.hold
        );

        AggregationReport {
            decision,
            raw_signals,
            adjusted_signals: adjusted,
            weights,
            confidence_multiplier: multiplier,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn weighted_average(signals: &[Signal], weights: &[f64]) -> Outcome {
    let mut buckets = ActionScores::default();
    for (signal, weight) in signals.iter().zip(weights) {
        buckets.add(signal.action(), signal.confidence() * signal.strength() * weight);
    }
    let scores = buckets.normalized();
    let action = scores.winner();

    // confidence is the weighted mean of the winners' own confidences
    let (num, den) = signals
        .iter()
        .zip(weights)
        .filter(|(s, _)| s.action() == action)
        .fold((0.0, 0.0), |(n, d), (s, w)| (n + s.confidence() * w, d + w));
    let confidence = if den > 0.0 { num / den } else { 0.0 };

    Outcome {
        action,
        confidence,
        scores,
        reason: format!(
            "Weighted average of {} signals: {} scored {:.2}",
            signals.len(),
            action,
            scores.get(action)
        ),
    }
}

fn ensemble_voting(signals: &[Signal]) -> Outcome {
    let mut votes = ActionScores::default();
    for signal in signals {
        votes.add(signal.action(), 1.0);
    }
    let action = votes.winner();
    let confidence = mean(
        signals
            .iter()
            .filter(|s| s.action() == action)
            .map(|s| s.confidence()),
    );

    Outcome {
        action,
        confidence,
        scores: votes.normalized(),
        reason: format!(
            "Ensemble vote: buy {} / sell {} / hold {}",
            votes.buy, votes.sell, votes.hold
        ),
    }
}

fn threshold_based(signals: &[Signal], thresholds: &AggregationThresholds) -> Outcome {
    let qualifying: Vec<&Signal> = signals
        .iter()
        .filter(|s| {
            s.action().is_directional()
                && s.confidence() >= thresholds.min_confidence
                && s.strength() >= thresholds.min_strength
        })
        .collect();

    let mut counts = ActionScores::default();
    for signal in &qualifying {
        counts.add(signal.action(), 1.0);
    }
    let scores = counts.normalized();

    if qualifying.len() < thresholds.required_count.max(1) {
        return Outcome {
            action: Action::Hold,
            confidence: 0.0,
            scores,
            reason: format!(
                "Only {} of {} signals met thresholds (need {})",
                qualifying.len(),
                signals.len(),
                thresholds.required_count
            ),
        };
    }

    let first = qualifying[0].action();
    if qualifying.iter().any(|s| s.action() != first) {
        return Outcome {
            action: Action::Hold,
            confidence: 0.0,
            scores,
            reason: format!(
                "Qualifying signals disagree (buy {} / sell {})",
                counts.buy, counts.sell
            ),
        };
    }

    Outcome {
        action: first,
        confidence: mean(qualifying.iter().map(|s| s.confidence())),
        scores,
        reason: format!(
            "{} qualifying signals agree on {}",
            qualifying.len(),
            first
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(id: &str, source: SourceKind, action: Action, conf: f64, strength: f64) -> Signal {
        Signal::new(id, source, action, conf, strength)
    }

    fn sources(signals: Vec<Signal>) -> SignalSources {
        SignalSources {
            indicators: signals,
            ..SignalSources::default()
        }
    }

    fn config(method: AggregationMethod) -> AggregationConfig {
        AggregationConfig {
            method,
            source_weights: BTreeMap::new(),
            risk: RiskPolicy {
                risk_adjustment_factor: 0.0,
                ..RiskPolicy::default()
            },
            ..AggregationConfig::default()
        }
    }

    #[test]
    fn test_no_signals_is_hold() {
        let decision = Aggregator::default().aggregate(&SignalSources::default(), 10.0);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.signals_used, 0);
        assert_eq!(decision.action_scores, ActionScores::default());
    }

    #[test]
    fn test_risk_override_ignores_signals() {
        let input = sources(vec![sig("a", SourceKind::Indicator, Action::Buy, 1.0, 1.0)]);
        let decision = Aggregator::default().aggregate(&input, 85.0);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.risk_override);
        assert_eq!(decision.position_scale_factor, 0.0);
    }

    #[test]
    fn test_invalid_risk_score_holds() {
        let input = sources(vec![sig("a", SourceKind::Indicator, Action::Buy, 0.6, 1.0)]);
        let decision = Aggregator::default().aggregate(&input, f64::NAN);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.risk_override);
        assert_eq!(decision.position_scale_factor, 0.0);
        assert!(decision.reason.starts_with("Invalid risk score"));
    }

    #[test]
    fn test_negative_risk_score_does_not_amplify() {
        let input = sources(vec![sig("a", SourceKind::Indicator, Action::Buy, 0.6, 1.0)]);
        let aggregator = Aggregator::default();
        let at_zero = aggregator.aggregate(&input, 0.0);
        let negative = aggregator.aggregate(&input, -100.0);
        assert_eq!(negative.action, Action::Buy);
        assert_eq!(negative.confidence, at_zero.confidence);
        assert!((negative.confidence - 0.6).abs() < 1e-12);
        assert_eq!(negative.position_scale_factor, at_zero.position_scale_factor);
    }

    #[test]
    fn test_weighted_average_scores_and_confidence() {
        let input = sources(vec![
            sig("a", SourceKind::Indicator, Action::Buy, 0.8, 1.0),
            sig("b", SourceKind::Indicator, Action::Buy, 0.6, 0.5),
            sig("c", SourceKind::Indicator, Action::Sell, 0.5, 0.4),
        ]);
        let decision = Aggregator::new(config(AggregationMethod::WeightedAverage)).aggregate(&input, 40.0);
        // contributions 0.8 + 0.3 buy, 0.2 sell
        assert_eq!(decision.action, Action::Buy);
        assert!((decision.action_scores.buy - 1.1 / 1.3).abs() < 1e-9);
        assert!((decision.action_scores.total() - 1.0).abs() < 1e-9);
        assert!((decision.confidence - 0.7).abs() < 1e-9);
        assert_eq!(decision.position_scale_factor, 1.0);
    }

    #[test]
    fn test_risk_dampening_lowers_reported_confidence() {
        let input = sources(vec![sig("a", SourceKind::Indicator, Action::Sell, 0.8, 1.0)]);
        let mut cfg = config(AggregationMethod::WeightedAverage);
        cfg.risk.risk_adjustment_factor = 0.5;
        let report = Aggregator::new(cfg).aggregate_detailed(&input, 50.0);
        assert_eq!(report.decision.action, Action::Sell);
        // scores stay normalised, confidence carries the 0.75 multiplier
        assert_eq!(report.decision.action_scores.sell, 1.0);
        assert!((report.decision.confidence - 0.6).abs() < 1e-9);
        assert_eq!(report.raw_signals[0].confidence(), 0.8);
        assert_eq!(report.decision.position_scale_factor, 1.0);
    }

    #[test]
    fn test_model_weights_apply_to_ml_only() {
        let mut cfg = config(AggregationMethod::WeightedAverage);
        cfg.model_weights.insert("big".into(), 3.0);
        let input = SignalSources {
            ml_predictions: vec![MlPrediction {
                model_id: "big".into(),
                action: Action::Sell,
                confidence: 0.6,
                predicted_gain: 0.0,
                predicted_loss: 0.0,
            }],
            indicators: vec![
                sig("a", SourceKind::Indicator, Action::Buy, 0.6, 0.6),
                sig("b", SourceKind::Indicator, Action::Buy, 0.6, 0.6),
            ],
            ..SignalSources::default()
        };
        let report = Aggregator::new(cfg).aggregate_detailed(&input, 0.0);
        assert_eq!(report.weights, vec![3.0, 1.0, 1.0]);
        assert_eq!(report.decision.action, Action::Sell);
    }

    #[test]
    fn test_all_zero_contributions_hold() {
        let input = sources(vec![sig("a", SourceKind::Indicator, Action::Buy, 0.0, 0.0)]);
        let decision = Aggregator::new(config(AggregationMethod::WeightedAverage)).aggregate(&input, 0.0);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.action_scores, ActionScores::hold_only());
        assert_eq!(decision.position_scale_factor, 1.2);
    }

    #[test]
    fn test_voting_majority_and_tie() {
        let agg = Aggregator::new(config(AggregationMethod::EnsembleVoting));
        let input = sources(vec![
            sig("a", SourceKind::Indicator, Action::Sell, 0.9, 1.0),
            sig("b", SourceKind::Indicator, Action::Sell, 0.5, 1.0),
            sig("c", SourceKind::Indicator, Action::Buy, 1.0, 1.0),
        ]);
        let decision = agg.aggregate(&input, 0.0);
        assert_eq!(decision.action, Action::Sell);
        assert!((decision.confidence - 0.7).abs() < 1e-9);

        let tie = sources(vec![
            sig("a", SourceKind::Indicator, Action::Sell, 0.9, 1.0),
            sig("b", SourceKind::Indicator, Action::Buy, 0.9, 1.0),
        ]);
        assert_eq!(agg.aggregate(&tie, 0.0).action, Action::Hold);
    }

    #[test]
    fn test_threshold_requires_unanimous_count() {
        let agg = Aggregator::new(config(AggregationMethod::ThresholdBased));
        let agree = sources(vec![
            sig("a", SourceKind::Indicator, Action::Buy, 0.9, 0.9),
            sig("b", SourceKind::Indicator, Action::Buy, 0.7, 0.6),
            sig("c", SourceKind::Indicator, Action::Sell, 0.3, 0.9),
        ]);
        let decision = agg.aggregate(&agree, 0.0);
        assert_eq!(decision.action, Action::Buy);
        assert!((decision.confidence - 0.8).abs() < 1e-9);

        let disagree = sources(vec![
            sig("a", SourceKind::Indicator, Action::Buy, 0.9, 0.9),
            sig("b", SourceKind::Indicator, Action::Sell, 0.9, 0.9),
        ]);
        let decision = agg.aggregate(&disagree, 0.0);
        assert_eq!(decision.action, Action::Hold);
        assert!(decision.reason.contains("disagree"));

        let too_few = sources(vec![sig("a", SourceKind::Indicator, Action::Buy, 0.9, 0.9)]);
        let decision = agg.aggregate(&too_few, 0.0);
        assert_eq!(decision.action, Action::Hold);
        assert!(decision.reason.contains("need 2"));
    }

    #[test]
    fn test_unknown_method_falls_back() {
        let cfg: AggregationConfig =
            serde_json::from_value(serde_json::json!({"method": "astrology"})).unwrap();
        assert_eq!(cfg.method, AggregationMethod::WeightedAverage);
        let cfg: AggregationConfig = serde_json::from_value(serde_json::json!({
            "method": "voting", "risk_score_threshold": 70.0
        }))
        .unwrap();
        assert_eq!(cfg.method, AggregationMethod::EnsembleVoting);
        assert_eq!(cfg.risk.risk_score_threshold, 70.0);
    }
}
