// Pluggable opinion sources
// Models produce `MlPrediction`s and sentiment providers produce
// `SentimentReading`s. The engine only sees the traits; which variant runs is
// decided by configuration.

pub mod sentiment;

pub use sentiment::{
    sentiment_analyzer, DummySentimentAnalyzer, SentimentAnalyzer, SentimentConfig,
    SentimentProvider, StaticSentimentAnalyzer,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::indicators::{
    analyze_market_structure, IndicatorKind, IndicatorParams, IndicatorSnapshot, MarketStructure,
};
use crate::models::{Action, PriceBar};
use crate::signals::MlPrediction;

/// Base trait for all prediction models
pub trait Predictor: Send + Sync {
    /// Registry id, also the key into `model_weights`
    fn id(&self) -> &str;

    fn predict(&self, bars: &[PriceBar], indicators: &IndicatorSnapshot) -> Result<MlPrediction>;

    /// Minimum bars required before `predict` can say anything
    fn min_bars_required(&self) -> usize {
        1
    }
}

/// Latest value from the snapshot, computing on demand when not cached
fn indicator_value(
    bars: &[PriceBar],
    indicators: &IndicatorSnapshot,
    kind: IndicatorKind,
    period: usize,
) -> Option<f64> {
    let mut params = IndicatorParams::new();
    params.insert("period".to_string(), period.into());
    let key = kind.key(&params);
    indicators
        .latest(&key, None)
        .or_else(|| kind.compute(bars, &params).latest(None))
}

fn hold(id: &str, confidence: f64) -> MlPrediction {
    MlPrediction {
        model_id: id.to_string(),
        action: Action::Hold,
        confidence,
        predicted_gain: 0.0,
        predicted_loss: 0.0,
    }
}

/// Mean-reversion reading of RSI
#[derive(Debug, Clone)]
pub struct RsiPredictor {
    id: String,
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiPredictor {
    pub fn new(id: impl Into<String>, period: usize, oversold: f64, overbought: f64) -> Self {
        Self {
            id: id.into(),
            period,
            oversold,
            overbought,
        }
    }
}

impl Predictor for RsiPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, bars: &[PriceBar], indicators: &IndicatorSnapshot) -> Result<MlPrediction> {
        let rsi = indicator_value(bars, indicators, IndicatorKind::Rsi, self.period).ok_or(
            EngineError::InsufficientData {
                bars: bars.len(),
                minimum: self.min_bars_required(),
            },
        )?;

        let prediction = if rsi < self.oversold {
            let depth = (self.oversold - rsi) / self.oversold.max(1.0);
            MlPrediction {
                model_id: self.id.clone(),
                action: Action::Buy,
                confidence: 0.5 + 0.5 * depth,
                predicted_gain: depth * 0.1,
                predicted_loss: 0.01,
            }
        } else if rsi > self.overbought {
            let depth = (rsi - self.overbought) / (100.0 - self.overbought).max(1.0);
            MlPrediction {
                model_id: self.id.clone(),
                action: Action::Sell,
                confidence: 0.5 + 0.5 * depth,
                predicted_gain: 0.01,
                predicted_loss: depth * 0.1,
            }
        } else {
            hold(&self.id, 0.5)
        };
        Ok(prediction)
    }

    fn min_bars_required(&self) -> usize {
        self.period + 1
    }
}

/// Trend-following fast/slow SMA comparison
#[derive(Debug, Clone)]
pub struct SmaCrossPredictor {
    id: String,
    fast: usize,
    slow: usize,
}

impl SmaCrossPredictor {
    pub fn new(id: impl Into<String>, fast: usize, slow: usize) -> Self {
        Self {
            id: id.into(),
            fast,
            slow,
        }
    }
}

impl Predictor for SmaCrossPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, bars: &[PriceBar], indicators: &IndicatorSnapshot) -> Result<MlPrediction> {
        let insufficient = || EngineError::InsufficientData {
            bars: bars.len(),
            minimum: self.min_bars_required(),
        };
        let fast = indicator_value(bars, indicators, IndicatorKind::Sma, self.fast)
            .ok_or_else(insufficient)?;
        let slow = indicator_value(bars, indicators, IndicatorKind::Sma, self.slow)
            .ok_or_else(insufficient)?;
        if slow <= 0.0 {
            return Ok(hold(&self.id, 0.0));
        }

        let spread = (fast - slow) / slow;
        // swing structure agreeing with the cross adds conviction
        let agrees = match analyze_market_structure(bars, self.slow) {
            MarketStructure::HigherHighsHigherLows => spread > 0.0,
            MarketStructure::LowerHighsLowerLows => spread < 0.0,
            MarketStructure::Mixed => false,
        };
        let bonus = if agrees { 0.1 } else { 0.0 };
        let confidence = (0.5 + spread.abs() * 10.0 + bonus).min(1.0);
        let prediction = if spread > 0.0 {
            MlPrediction {
                model_id: self.id.clone(),
                action: Action::Buy,
                confidence,
                predicted_gain: spread,
                predicted_loss: spread / 2.0,
            }
        } else if spread < 0.0 {
            MlPrediction {
                model_id: self.id.clone(),
                action: Action::Sell,
                confidence,
                predicted_gain: spread.abs() / 2.0,
                predicted_loss: spread.abs(),
            }
        } else {
            hold(&self.id, 0.5)
        };
        Ok(prediction)
    }

    fn min_bars_required(&self) -> usize {
        self.fast.max(self.slow)
    }
}

/// Canned neutral output for models that are configured but not available
#[derive(Debug, Clone)]
pub struct DummyPredictor {
    id: String,
}

impl DummyPredictor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Predictor for DummyPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, _bars: &[PriceBar], _indicators: &IndicatorSnapshot) -> Result<MlPrediction> {
        Ok(hold(&self.id, 0.5))
    }
}

type PredictFn = dyn Fn(&[PriceBar], &IndicatorSnapshot) -> Result<MlPrediction> + Send + Sync;

/// Adapter for a model hosted outside this crate
#[derive(Clone)]
pub struct ExternalPredictor {
    id: String,
    predict_fn: Arc<PredictFn>,
}

impl ExternalPredictor {
    pub fn new<F>(id: impl Into<String>, predict_fn: F) -> Self
    where
        F: Fn(&[PriceBar], &IndicatorSnapshot) -> Result<MlPrediction> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            predict_fn: Arc::new(predict_fn),
        }
    }
}

impl fmt::Debug for ExternalPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalPredictor").field("id", &self.id).finish()
    }
}

impl Predictor for ExternalPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, bars: &[PriceBar], indicators: &IndicatorSnapshot) -> Result<MlPrediction> {
        let mut prediction = (self.predict_fn)(bars, indicators)?;
        prediction.model_id = self.id.clone();
        Ok(prediction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Rsi,
    SmaCross,
    Dummy,
}

/// One `[[models]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub kind: ModelKind,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl ModelConfig {
    fn usize_param(&self, name: &str, default: usize) -> usize {
        self.params
            .get(name)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    fn f64_param(&self, name: &str, default: f64) -> f64 {
        self.params
            .get(name)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn build(&self) -> Box<dyn Predictor> {
        match self.kind {
            ModelKind::Rsi => Box::new(RsiPredictor::new(
                self.id.clone(),
                self.usize_param("period", 14),
                self.f64_param("oversold", 30.0),
                self.f64_param("overbought", 70.0),
            )),
            ModelKind::SmaCross => Box::new(SmaCrossPredictor::new(
                self.id.clone(),
                self.usize_param("fast", 10),
                self.usize_param("slow", 30),
            )),
            ModelKind::Dummy => Box::new(DummyPredictor::new(self.id.clone())),
        }
    }
}

/// Models by id. Built once at startup and shared by every instrument's
/// engine through an `Arc`.
#[derive(Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Box<dyn Predictor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(models: &[ModelConfig]) -> Self {
        let mut registry = Self::new();
        for model in models {
            registry.register(model.build());
        }
        registry
    }

    /// Add a model; an existing model with the same id is replaced
    pub fn register(&mut self, predictor: Box<dyn Predictor>) {
        let id = predictor.id().to_string();
        if self.models.insert(id.clone(), predictor).is_some() {
            tracing::warn!("Model '{}' registered twice, keeping the latest", id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn Predictor> {
        self.models.get(id).map(|m| m.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Run every model; a model that errors or panics is logged and skipped
    pub fn predict_all(&self, bars: &[PriceBar], indicators: &IndicatorSnapshot) -> Vec<MlPrediction> {
        let mut predictions = Vec::new();
        for (id, model) in &self.models {
            if bars.len() < model.min_bars_required() {
                tracing::debug!(
                    "Model '{}' needs {} bars, have {}",
                    id,
                    model.min_bars_required(),
                    bars.len()
                );
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| model.predict(bars, indicators))) {
                Ok(Ok(prediction)) => predictions.push(prediction),
                Ok(Err(e)) => tracing::warn!("Model '{}' failed: {}", id, e),
                Err(_) => tracing::error!("Model '{}' panicked", id),
            }
        }
        predictions
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}
