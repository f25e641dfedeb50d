// Core modules
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod patterns;
pub mod persistence;
pub mod predictors;
pub mod replay;
pub mod risk;
pub mod rules;
pub mod signals;

// Re-export commonly used types
pub use engine::{
    DecisionDesk, DecisionEngine, EngineConfig, Evaluation, EvaluationInput, ExternalOpinions,
};
pub use indicators::{IndicatorKind, IndicatorSnapshot, Series};
pub use models::*;
pub use patterns::{PatternMatch, PatternSignal};
pub use persistence::{PersistenceConfig, PersistenceMode, PersistenceTracker};
pub use predictors::{ModelRegistry, Predictor};
pub use rules::RuleNode;
pub use signals::{Aggregator, Decision, MlPrediction, SentimentReading, Signal, SourceKind};

// Error handling
pub use error::{EngineError, Result};
