// Decision orchestrator
// One `DecisionEngine` per instrument: bars -> indicators and patterns ->
// rules -> signals -> aggregator -> persistence gate -> decision + audit.
// Failures inside the analysis stage become a `skip` decision for that
// instrument only.

pub mod config;
pub mod desk;

pub use config::{EngineConfig, RuleGateMode, RuleSet};
pub use desk::DecisionDesk;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::indicators::IndicatorSnapshot;
use crate::models::{validate_bars, Action, PriceBar};
use crate::patterns::{detect_configured, PatternMatch};
use crate::persistence::{PersistenceCheck, PersistenceState, PersistenceTracker};
use crate::predictors::{sentiment_analyzer, ModelRegistry, SentimentAnalyzer};
use crate::rules::{evaluate, RuleContext, RuleNode};
use crate::signals::{
    indicator_signals, pattern_signals, AggregationReport, Aggregator, Decision, MlPrediction,
    SentimentReading, Signal, SignalSources,
};

/// Opinions produced outside the engine for this cycle. Supplied sentiment
/// readings take precedence over the configured analyzers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalOpinions {
    pub ml_predictions: Vec<MlPrediction>,
    pub social_sentiment: Option<SentimentReading>,
    pub news_sentiment: Option<SentimentReading>,
}

/// Everything needed to evaluate one instrument once
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationInput {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
    pub risk_score: f64,
    #[serde(flatten)]
    pub external: ExternalOpinions,
}

/// Outcome of the buy/sell rule trees; `None` when no tree is configured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub buy: Option<bool>,
    pub sell: Option<bool>,
}

/// Full trail of one evaluation, for downstream logging and replay
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditSnapshot {
    pub symbol: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub bars_used: usize,
    /// Latest defined value of every computed indicator component
    pub indicator_values: BTreeMap<String, f64>,
    /// Indicators whose reading produced a directional signal
    pub fired_indicators: Vec<String>,
    pub patterns: Vec<PatternMatch>,
    pub rules: RuleOutcome,
    pub raw_signals: Vec<Signal>,
    pub adjusted_signals: Vec<Signal>,
    pub signal_weights: Vec<f64>,
    pub confidence_multiplier: f64,
    /// Aggregator output before the rule gate
    pub aggregated: Option<Decision>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub symbol: String,
    pub decision: Decision,
    pub persistence: PersistenceCheck,
    pub audit: AuditSnapshot,
}

impl Evaluation {
    /// Directional, confirmed by the persistence gate, and not blocked by
    /// position scaling
    pub fn should_execute(&self) -> bool {
        self.persistence.should_execute
            && self.decision.is_directional()
            && self.decision.position_scale_factor > 0.0
    }
}

/// Output of the analysis stage, computed under panic isolation
struct Analysis {
    snapshot: IndicatorSnapshot,
    patterns: Vec<PatternMatch>,
    rules: RuleOutcome,
    indicator_signals: Vec<Signal>,
    pattern_signals: Vec<Signal>,
}

pub struct DecisionEngine {
    symbol: String,
    config: EngineConfig,
    registry: Arc<ModelRegistry>,
    aggregator: Aggregator,
    tracker: PersistenceTracker,
    social: Option<Box<dyn SentimentAnalyzer>>,
    news: Option<Box<dyn SentimentAnalyzer>>,
}

impl DecisionEngine {
    pub fn new(symbol: impl Into<String>, config: EngineConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            symbol: symbol.into(),
            aggregator: Aggregator::new(config.aggregation.clone()),
            tracker: PersistenceTracker::new(config.persistence),
            social: sentiment_analyzer(&config.social_sentiment),
            news: sentiment_analyzer(&config.news_sentiment),
            registry,
            config,
        }
    }

    /// Resume the persistence gate from an exported state
    pub fn with_persistence_state(mut self, state: PersistenceState) -> Self {
        self.tracker = PersistenceTracker::from_state(state);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persistence_state(&self) -> &PersistenceState {
        self.tracker.state()
    }

    pub fn evaluate_input(&mut self, input: &EvaluationInput) -> Evaluation {
        self.evaluate(&input.bars, input.risk_score, &input.external)
    }

    /// Run one decision cycle over `bars` (oldest first)
    pub fn evaluate(
        &mut self,
        bars: &[PriceBar],
        risk_score: f64,
        external: &ExternalOpinions,
    ) -> Evaluation {
        let window = match self.config.lookback {
            0 => bars,
            lookback => &bars[bars.len().saturating_sub(lookback)..],
        };
        let timestamp = window.last().map(|b| b.timestamp);

        let analysis = match catch_unwind(AssertUnwindSafe(|| self.analyze(window))) {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => return self.skip(window, risk_score, e.to_string()),
            Err(panic) => {
                let reason = format!("analysis panicked: {}", panic_message(panic.as_ref()));
                return self.skip(window, risk_score, reason);
            }
        };

        let mut predictions = external.ml_predictions.clone();
        predictions.extend(self.registry.predict_all(window, &analysis.snapshot));

        let social = external
            .social_sentiment
            .clone()
            .or_else(|| self.social.as_ref().map(|a| a.analyze(&self.symbol)));
        let news = external
            .news_sentiment
            .clone()
            .or_else(|| self.news.as_ref().map(|a| a.analyze(&self.symbol)));

        let sources = SignalSources {
            ml_predictions: predictions,
            social_sentiment: social,
            news_sentiment: news,
            indicators: analysis.indicator_signals,
            patterns: analysis.pattern_signals,
        };
        let report = self.aggregator.aggregate_detailed(&sources, risk_score);
        let aggregated = report.decision.clone();
        let decision = self.apply_rule_gate(report.decision.clone(), &analysis.rules);

        let at = timestamp.unwrap_or_else(Utc::now);
        let persistence = self.tracker.check(decision.action, at);

        tracing::info!(
            "{}: {} (confidence {:.2}, {} signals, scale {:.1}) - {}",
            self.symbol,
            decision.action,
            decision.confidence,
            decision.signals_used,
            decision.position_scale_factor,
            persistence.reason
        );

        let AggregationReport {
            raw_signals,
            adjusted_signals,
            weights,
            confidence_multiplier,
            ..
        } = report;
        let fired_indicators = sources
            .indicators
            .iter()
            .filter_map(|s| s.metadata().get("indicator").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();

        let audit = AuditSnapshot {
            symbol: self.symbol.clone(),
            timestamp,
            bars_used: window.len(),
            indicator_values: analysis.snapshot.latest_values(),
            fired_indicators,
            patterns: analysis.patterns,
            rules: analysis.rules,
            raw_signals,
            adjusted_signals,
            signal_weights: weights,
            confidence_multiplier,
            aggregated: Some(aggregated),
            error: None,
        };

        Evaluation {
            symbol: self.symbol.clone(),
            decision,
            persistence,
            audit,
        }
    }

    fn analyze(&self, bars: &[PriceBar]) -> Result<Analysis> {
        if bars.is_empty() {
            return Err(EngineError::InsufficientData {
                bars: 0,
                minimum: 1,
            });
        }
        validate_bars(bars)?;

        let snapshot = IndicatorSnapshot::build(bars, &self.config.indicators);
        let patterns = detect_configured(bars, self.config.patterns.as_ref());

        let ctx = RuleContext::new(bars, &snapshot, &patterns);
        let run = |tree: &Option<RuleNode>| tree.as_ref().map(|node| evaluate(node, &ctx));
        let rules = RuleOutcome {
            buy: run(&self.config.rules.buy),
            sell: run(&self.config.rules.sell),
        };

        let indicator_signals = indicator_signals(bars, &snapshot);
        let pattern_signals = pattern_signals(&patterns, bars.len());
        tracing::debug!(
            "{}: {} indicators, {} patterns, {} indicator signals, {} pattern signals",
            self.symbol,
            snapshot.len(),
            patterns.len(),
            indicator_signals.len(),
            pattern_signals.len()
        );

        Ok(Analysis {
            snapshot,
            patterns,
            rules,
            indicator_signals,
            pattern_signals,
        })
    }

    fn apply_rule_gate(&self, mut decision: Decision, rules: &RuleOutcome) -> Decision {
        if self.config.rules.gate != RuleGateMode::Confirm {
            return decision;
        }
        let confirmation = match decision.action {
            Action::Buy => rules.buy,
            Action::Sell => rules.sell,
            _ => None,
        };
        if confirmation == Some(false) {
            tracing::info!(
                "{}: {} not confirmed by its rule tree, holding",
                self.symbol,
                decision.action
            );
            decision.reason = format!(
                "{} not confirmed by {} rule ({})",
                decision.action, decision.action, decision.reason
            );
            decision.action = Action::Hold;
        }
        decision
    }

    fn skip(&mut self, window: &[PriceBar], risk_score: f64, reason: String) -> Evaluation {
        tracing::error!("{}: evaluation skipped: {}", self.symbol, reason);
        let timestamp = window.last().map(|b| b.timestamp);
        let decision = Decision::skip(reason.clone(), risk_score);
        let persistence = self
            .tracker
            .check(Action::Skip, timestamp.unwrap_or_else(Utc::now));

        Evaluation {
            symbol: self.symbol.clone(),
            decision,
            persistence,
            audit: AuditSnapshot {
                symbol: self.symbol.clone(),
                timestamp,
                bars_used: window.len(),
                error: Some(reason),
                ..AuditSnapshot::default()
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorParams;
    use crate::models::test_support::{bars_from_closes, create_test_bars};
    use crate::persistence::{PersistenceConfig, PersistenceMode};
    use crate::predictors::ExternalPredictor;
    use crate::signals::AggregationMethod;

    fn rising(n: usize) -> Vec<PriceBar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        bars_from_closes(&closes)
    }

    fn rsi_only() -> EngineConfig {
        let mut config = EngineConfig::default();
        config
            .indicators
            .insert("rsi".to_string(), IndicatorParams::new());
        config.patterns = Some(BTreeMap::new());
        config.persistence = PersistenceConfig {
            mode: PersistenceMode::TickCount,
            required_value: 2,
        };
        config
    }

    fn engine(config: EngineConfig) -> DecisionEngine {
        DecisionEngine::new("TEST", config, Arc::new(ModelRegistry::new()))
    }

    #[test]
    fn test_overbought_series_sells_after_persistence() {
        let mut engine = engine(rsi_only());
        let bars = rising(30);
        let first = engine.evaluate(&bars, 10.0, &ExternalOpinions::default());
        assert_eq!(first.decision.action, Action::Sell);
        assert!(!first.should_execute());
        assert!(first.audit.indicator_values["rsi_14"] > 70.0);
        assert_eq!(first.audit.fired_indicators, vec!["rsi_14".to_string()]);

        let second = engine.evaluate(&bars, 10.0, &ExternalOpinions::default());
        assert!(second.persistence.should_execute);
        assert!(second.should_execute());
    }

    #[test]
    fn test_malformed_bars_become_skip() {
        let mut engine = engine(rsi_only());
        let mut bars = rising(30);
        bars[10].low = bars[10].high + 5.0;
        let evaluation = engine.evaluate(&bars, 10.0, &ExternalOpinions::default());
        assert_eq!(evaluation.decision.action, Action::Skip);
        assert!(evaluation.decision.reason.contains("malformed bar"));
        assert!(evaluation.audit.error.is_some());
        assert!(!evaluation.should_execute());
    }

    #[test]
    fn test_empty_history_is_skip() {
        let mut engine = engine(rsi_only());
        let evaluation = engine.evaluate(&[], 0.0, &ExternalOpinions::default());
        assert_eq!(evaluation.decision.action, Action::Skip);
        assert!(evaluation.decision.reason.contains("insufficient data"));
    }

    #[test]
    fn test_rule_gate_confirm_downgrades() {
        let mut config = rsi_only();
        config.rules.gate = RuleGateMode::Confirm;
        config.rules.sell = Some(RuleNode::indicator("rsi", Some(14), "<", 50.0));
        let mut engine = engine(config);
        let evaluation = engine.evaluate(&rising(30), 0.0, &ExternalOpinions::default());
        assert_eq!(evaluation.decision.action, Action::Hold);
        assert_eq!(evaluation.audit.rules.sell, Some(false));
        assert_eq!(evaluation.audit.aggregated.as_ref().map(|d| d.action), Some(Action::Sell));
    }

    #[test]
    fn test_advisory_rules_only_reported() {
        let mut config = rsi_only();
        config.rules.sell = Some(RuleNode::indicator("rsi", Some(14), ">", 70.0));
        let mut engine = engine(config);
        let evaluation = engine.evaluate(&rising(30), 0.0, &ExternalOpinions::default());
        assert_eq!(evaluation.audit.rules.sell, Some(true));
        assert_eq!(evaluation.audit.rules.buy, None);
        assert_eq!(evaluation.decision.action, Action::Sell);
    }

    #[test]
    fn test_panicking_model_does_not_abort() {
        let mut registry = ModelRegistry::new();
        registry.register(Box::new(ExternalPredictor::new("boom", |_, _| panic!("bad model"))));
        let mut engine = DecisionEngine::new("TEST", rsi_only(), Arc::new(registry));
        let evaluation = engine.evaluate(&rising(30), 0.0, &ExternalOpinions::default());
        assert_eq!(evaluation.decision.action, Action::Sell);
    }

    #[test]
    fn test_external_opinions_and_risk_override() {
        let mut config = rsi_only();
        config.aggregation.method = AggregationMethod::EnsembleVoting;
        let mut engine = engine(config);
        let external = ExternalOpinions {
            ml_predictions: vec![
                MlPrediction {
                    model_id: "a".into(),
                    action: Action::Buy,
                    confidence: 0.9,
                    predicted_gain: 0.05,
                    predicted_loss: 0.01,
                },
                MlPrediction {
                    model_id: "b".into(),
                    action: Action::Buy,
                    confidence: 0.8,
                    predicted_gain: 0.04,
                    predicted_loss: 0.01,
                },
            ],
            ..ExternalOpinions::default()
        };
        let bars = rising(30);
        let evaluation = engine.evaluate(&bars, 20.0, &external);
        // two ML buys outvote the RSI sell
        assert_eq!(evaluation.decision.action, Action::Buy);
        assert_eq!(evaluation.decision.signals_used, 3);

        let blocked = engine.evaluate(&bars, 95.0, &external);
        assert_eq!(blocked.decision.action, Action::Hold);
        assert!(blocked.decision.risk_override);
        assert!(!blocked.should_execute());
    }

    #[test]
    fn test_lookback_window_limits_bars() {
        let mut config = rsi_only();
        config.lookback = 20;
        let mut engine = engine(config);
        let evaluation = engine.evaluate(&rising(60), 0.0, &ExternalOpinions::default());
        assert_eq!(evaluation.audit.bars_used, 20);
    }

    #[test]
    fn test_three_white_soldiers_signal_reaches_aggregator() {
        let mut config = EngineConfig::default();
        config.indicators.insert("obv".to_string(), IndicatorParams::new());
        let mut patterns = BTreeMap::new();
        patterns.insert("three_white_soldiers".to_string(), Default::default());
        config.patterns = Some(patterns);
        let mut engine = engine(config);
        let bars = create_test_bars(&[
            (100.0, 105.5, 99.5, 105.0),
            (105.0, 110.5, 104.5, 110.0),
            (110.0, 115.5, 109.5, 115.0),
        ]);
        let evaluation = engine.evaluate(&bars, 0.0, &ExternalOpinions::default());
        assert_eq!(evaluation.audit.patterns.len(), 1);
        assert_eq!(evaluation.decision.action, Action::Buy);
        assert_eq!(evaluation.decision.signals_used, 1);
    }
}
