/// Sentiment providers for the social and news sources
use serde::{Deserialize, Serialize};

use crate::models::Action;
use crate::signals::SentimentReading;

pub trait SentimentAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, symbol: &str) -> SentimentReading;
}

/// Always neutral with zero confidence; stands in until a real feed exists
#[derive(Debug, Clone, Default)]
pub struct DummySentimentAnalyzer;

impl SentimentAnalyzer for DummySentimentAnalyzer {
    fn name(&self) -> &str {
        "dummy"
    }

    fn analyze(&self, _symbol: &str) -> SentimentReading {
        SentimentReading::neutral()
    }
}

/// Returns the same configured reading for every symbol
#[derive(Debug, Clone)]
pub struct StaticSentimentAnalyzer {
    reading: SentimentReading,
}

impl StaticSentimentAnalyzer {
    pub fn new(reading: SentimentReading) -> Self {
        Self { reading }
    }
}

impl SentimentAnalyzer for StaticSentimentAnalyzer {
    fn name(&self) -> &str {
        "static"
    }

    fn analyze(&self, _symbol: &str) -> SentimentReading {
        self.reading.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentProvider {
    /// Source not consulted
    None,
    Dummy,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub provider: SentimentProvider,
    /// Reading returned by the static provider
    pub action: Action,
    pub confidence: f64,
    pub strength: f64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            provider: SentimentProvider::None,
            action: Action::Hold,
            confidence: 0.0,
            strength: 0.0,
        }
    }
}

/// Build the analyzer selected by configuration
pub fn sentiment_analyzer(config: &SentimentConfig) -> Option<Box<dyn SentimentAnalyzer>> {
    match config.provider {
        SentimentProvider::None => None,
        SentimentProvider::Dummy => Some(Box::new(DummySentimentAnalyzer)),
        SentimentProvider::Static => Some(Box::new(StaticSentimentAnalyzer::new(
            SentimentReading {
                action: config.action,
                confidence: config.confidence,
                strength: config.strength,
            },
        ))),
    }
}
