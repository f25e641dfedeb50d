/// Engine configuration
///
/// Layered with the `config` crate: an optional TOML/JSON file, then
/// `DECISIONBOT__...` environment variables (`__` separates nesting levels,
/// e.g. `DECISIONBOT__AGGREGATION__METHOD=ensemble_voting`). Every option has
/// a default, so an empty configuration is a working one.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::indicators::IndicatorParams;
use crate::patterns::PatternParams;
use crate::persistence::PersistenceConfig;
use crate::predictors::{ModelConfig, SentimentConfig};
use crate::rules::RuleNode;
use crate::signals::AggregationConfig;

pub const ENV_PREFIX: &str = "DECISIONBOT";

/// How buy/sell rule trees interact with the aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGateMode {
    /// Rule outcomes are reported in the audit only
    #[default]
    Advisory,
    /// A directional decision its rule tree does not confirm becomes hold
    Confirm,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub buy: Option<RuleNode>,
    pub sell: Option<RuleNode>,
    pub gate: RuleGateMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bars considered per evaluation, counted back from the newest; 0 = all
    pub lookback: usize,
    pub aggregation: AggregationConfig,
    pub persistence: PersistenceConfig,
    /// Enabled indicators by name; empty enables every known indicator
    pub indicators: BTreeMap<String, IndicatorParams>,
    /// Enabled patterns by id; absent runs every detector, empty runs none
    pub patterns: Option<BTreeMap<String, PatternParams>>,
    pub rules: RuleSet,
    pub models: Vec<ModelConfig>,
    pub social_sentiment: SentimentConfig,
    pub news_sentiment: SentimentConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback: 200,
            aggregation: AggregationConfig::default(),
            persistence: PersistenceConfig::default(),
            indicators: BTreeMap::new(),
            patterns: None,
            rules: RuleSet::default(),
            models: Vec::new(),
            social_sentiment: SentimentConfig::default(),
            news_sentiment: SentimentConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        tracing::debug!(
            "Loaded engine config: lookback {}, method {}, persistence {:?}",
            config.lookback,
            config.aggregation.method,
            config.persistence.mode
        );
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceMode;
    use crate::signals::AggregationMethod;
    use std::io::Write;

    #[test]
    fn test_defaults_are_complete() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.persistence.mode, PersistenceMode::TickCount);
        assert!(config.patterns.is_none());
    }

    #[test]
    fn test_json_with_rules_and_patterns() {
        let config = EngineConfig::from_json(
            r#"{
                "lookback": 50,
                "aggregation": {"method": "threshold_based", "thresholds": {"required_count": 3}},
                "indicators": {"rsi": {"period": 14}},
                "patterns": {"hammer": {"min_confidence": 0.6}},
                "rules": {
                    "gate": "confirm",
                    "sell": {"type": "indicator", "indicator": "rsi", "period": 14, "operator": ">", "value": 70}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.lookback, 50);
        assert_eq!(config.aggregation.method, AggregationMethod::ThresholdBased);
        assert_eq!(config.aggregation.thresholds.required_count, 3);
        assert_eq!(config.rules.gate, RuleGateMode::Confirm);
        assert!(config.rules.sell.is_some());
        assert!(config.rules.buy.is_none());
        let patterns = config.patterns.unwrap();
        assert_eq!(patterns["hammer"].min_confidence, 0.6);
        assert_eq!(patterns["hammer"].tolerance, 0.02);
    }

    #[test]
    fn test_load_toml_file() {
        let dir = std::env::temp_dir().join(format!("decisionbot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
lookback = 120

[aggregation]
method = "ensemble_voting"
risk_score_threshold = 75.0

[persistence]
mode = "time_duration"
required_value = 30

[[models]]
id = "rsi_model"
kind = "rsi"
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.lookback, 120);
        assert_eq!(config.aggregation.method, AggregationMethod::EnsembleVoting);
        assert_eq!(config.aggregation.risk.risk_score_threshold, 75.0);
        assert_eq!(config.persistence.mode, PersistenceMode::TimeDuration);
        assert_eq!(config.persistence.required_value, 30);
        assert_eq!(config.models.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
