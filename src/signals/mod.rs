// Signal model and aggregation
// Every opinion (ML model, sentiment, indicator reading, pattern) becomes a
// `Signal` before it reaches the aggregator.

pub mod aggregator;
pub mod interpret;

pub use aggregator::{
    ActionScores, AggregationConfig, AggregationMethod, AggregationReport, AggregationThresholds,
    Aggregator, Decision, SignalSources,
};
pub use interpret::{indicator_signals, pattern_signals};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::models::Action;

/// Where an opinion came from; also the key into `source_weights`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ml,
    SocialSentiment,
    NewsSentiment,
    Indicator,
    Pattern,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Ml => "ml",
            SourceKind::SocialSentiment => "social_sentiment",
            SourceKind::NewsSentiment => "news_sentiment",
            SourceKind::Indicator => "indicator",
            SourceKind::Pattern => "pattern",
        }
    }

    pub fn parse(value: &str) -> Option<SourceKind> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ml" | "model" => Some(SourceKind::Ml),
            "social_sentiment" | "social" => Some(SourceKind::SocialSentiment),
            "news_sentiment" | "news" => Some(SourceKind::NewsSentiment),
            "indicator" | "indicators" => Some(SourceKind::Indicator),
            "pattern" | "patterns" => Some(SourceKind::Pattern),
            _ => None,
        }
    }
}

/// Clamp into [0, 1]; NaN becomes 0
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One directional opinion
///
/// Immutable once built. Confidence and strength are clamped into [0, 1] at
/// construction, and `skip` collapses to `hold`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    source_id: String,
    source: SourceKind,
    action: Action,
    confidence: f64,
    strength: f64,
    metadata: BTreeMap<String, Value>,
}

impl Signal {
    pub fn new(
        source_id: impl Into<String>,
        source: SourceKind,
        action: Action,
        confidence: f64,
        strength: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source,
            action: action.normalized(),
            confidence: unit(confidence),
            strength: unit(strength),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Copy with confidence multiplied by `factor` (still clamped)
    pub fn scaled(&self, factor: f64) -> Signal {
        Signal {
            confidence: unit(self.confidence * factor),
            ..self.clone()
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Model id for ML signals, used to look up the per-model weight
    pub fn model_id(&self) -> Option<&str> {
        self.metadata.get("model_id").and_then(Value::as_str)
    }

    pub fn to_dict(&self) -> Value {
        let mut map = Map::new();
        map.insert("source_id".into(), Value::from(self.source_id.clone()));
        map.insert("source".into(), Value::from(self.source.as_str()));
        map.insert("action".into(), Value::from(self.action.as_str()));
        map.insert("confidence".into(), Value::from(self.confidence));
        map.insert("strength".into(), Value::from(self.strength));
        map.insert(
            "metadata".into(),
            Value::Object(self.metadata.clone().into_iter().collect()),
        );
        Value::Object(map)
    }

    /// Rebuild a signal from `to_dict` output or an externally supplied
    /// dictionary. `source` defaults to ml, `strength` to 1.0 and `metadata`
    /// to empty; out-of-range numbers are clamped.
    pub fn from_dict(dict: &Value) -> Result<Signal> {
        let obj = dict.as_object().ok_or_else(|| EngineError::InvalidSignal {
            reason: "expected a JSON object".to_string(),
        })?;

        let source_id = obj
            .get("source_id")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing source_id"))?;
        let action = obj
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing action"))?;
        let action =
            Action::parse(action).ok_or_else(|| invalid(&format!("unknown action '{}'", action)))?;
        let confidence = obj
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| invalid("missing confidence"))?;
        let strength = obj.get("strength").and_then(Value::as_f64).unwrap_or(1.0);
        let source = match obj.get("source").and_then(Value::as_str) {
            Some(name) => SourceKind::parse(name)
                .ok_or_else(|| invalid(&format!("unknown source '{}'", name)))?,
            None => SourceKind::Ml,
        };

        let mut signal = Signal::new(source_id, source, action, confidence, strength);
        if let Some(Value::Object(meta)) = obj.get("metadata") {
            signal.metadata = meta.clone().into_iter().collect();
        }
        Ok(signal)
    }
}

fn invalid(reason: &str) -> EngineError {
    EngineError::InvalidSignal {
        reason: reason.to_string(),
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Signal::from_dict(&value).map_err(serde::de::Error::custom)
    }
}

/// Output contract of an ML model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlPrediction {
    pub model_id: String,
    pub action: Action,
    pub confidence: f64,
    #[serde(default)]
    pub predicted_gain: f64,
    #[serde(default)]
    pub predicted_loss: f64,
}

impl MlPrediction {
    /// Strength is the share of the expected move on the predicted side:
    /// gain/(gain+loss) for buy, loss/(gain+loss) for sell. Hold reads 0.5,
    /// and without any expected move the model's confidence stands in.
    pub fn to_signal(&self) -> Signal {
        let gain = self.predicted_gain.abs();
        let loss = self.predicted_loss.abs();
        let total = gain + loss;
        let strength = match self.action.normalized() {
            Action::Hold => 0.5,
            _ if total == 0.0 || !total.is_finite() => self.confidence,
            Action::Buy => gain / total,
            _ => loss / total,
        };
        Signal::new(
            format!("ml:{}", self.model_id),
            SourceKind::Ml,
            self.action,
            self.confidence,
            strength,
        )
        .with_metadata("model_id", self.model_id.clone())
        .with_metadata("predicted_gain", finite_or_zero(self.predicted_gain))
        .with_metadata("predicted_loss", finite_or_zero(self.predicted_loss))
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Output contract of a sentiment provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub action: Action,
    pub confidence: f64,
    pub strength: f64,
}

impl SentimentReading {
    pub fn neutral() -> Self {
        Self {
            action: Action::Hold,
            confidence: 0.0,
            strength: 0.0,
        }
    }

    pub fn to_signal(&self, source: SourceKind) -> Signal {
        Signal::new(
            source.as_str(),
            source,
            self.action,
            self.confidence,
            self.strength,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signal_clamps_on_construction() {
        let s = Signal::new("x", SourceKind::Ml, Action::Buy, 1.7, -0.3);
        assert_eq!(s.confidence(), 1.0);
        assert_eq!(s.strength(), 0.0);

        let s = Signal::new("x", SourceKind::Ml, Action::Skip, f64::NAN, 0.4);
        assert_eq!(s.action(), Action::Hold);
        assert_eq!(s.confidence(), 0.0);
    }

    #[test]
    fn test_dict_round_trip() {
        let signal = Signal::new("ml:lstm", SourceKind::Ml, Action::Sell, 0.72, 0.4)
            .with_metadata("model_id", "lstm")
            .with_metadata("horizon", 4);
        let back = Signal::from_dict(&signal.to_dict()).unwrap();
        assert_eq!(back, signal);
        assert_eq!(back.model_id(), Some("lstm"));
    }

    #[test]
    fn test_from_dict_defaults_and_errors() {
        let s = Signal::from_dict(&json!({"source_id": "ext", "action": "BUY", "confidence": 3}))
            .unwrap();
        assert_eq!(s.source(), SourceKind::Ml);
        assert_eq!(s.confidence(), 1.0);
        assert_eq!(s.strength(), 1.0);

        assert!(Signal::from_dict(&json!({"action": "buy", "confidence": 0.5})).is_err());
        assert!(Signal::from_dict(&json!({"source_id": "a", "action": "moon", "confidence": 0.5}))
            .is_err());
        assert!(Signal::from_dict(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_ml_prediction_strength() {
        let p = MlPrediction {
            model_id: "m1".into(),
            action: Action::Buy,
            confidence: 0.8,
            predicted_gain: 0.06,
            predicted_loss: 0.02,
        };
        let s = p.to_signal();
        assert!((s.strength() - 0.75).abs() < 1e-9);
        assert_eq!(s.source_id(), "ml:m1");
        assert_eq!(s.model_id(), Some("m1"));

        let flat = MlPrediction {
            predicted_gain: 0.0,
            predicted_loss: 0.0,
            ..p
        };
        assert!((flat.to_signal().strength() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_signal_deserializes_through_from_dict() {
        let s: Signal = serde_json::from_value(json!({
            "source_id": "news_sentiment", "source": "news", "action": "sell",
            "confidence": 0.6, "strength": 0.5
        }))
        .unwrap();
        assert_eq!(s.source(), SourceKind::NewsSentiment);
        assert_eq!(s.action(), Action::Sell);
    }
}
