/// Batch evaluation across instruments
///
/// Each symbol gets its own `DecisionEngine` (and so its own persistence
/// tracker); only the model registry is shared. Symbols are evaluated in
/// parallel with rayon and results come back in no particular order.
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DecisionEngine, EngineConfig, Evaluation, EvaluationInput};
use crate::persistence::PersistenceState;
use crate::predictors::ModelRegistry;

pub struct DecisionDesk {
    config: EngineConfig,
    registry: Arc<ModelRegistry>,
    engines: BTreeMap<String, DecisionEngine>,
}

impl DecisionDesk {
    pub fn new(config: EngineConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            config,
            registry,
            engines: BTreeMap::new(),
        }
    }

    /// Build the registry from the configured models
    pub fn from_config(config: EngineConfig) -> Self {
        let registry = Arc::new(ModelRegistry::from_config(&config.models));
        Self::new(config, registry)
    }

    /// Engine for `symbol`, created on first use
    pub fn engine(&mut self, symbol: &str) -> &mut DecisionEngine {
        let config = &self.config;
        let registry = &self.registry;
        self.engines
            .entry(symbol.to_string())
            .or_insert_with(|| DecisionEngine::new(symbol, config.clone(), Arc::clone(registry)))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// Exported persistence state of every known symbol
    pub fn persistence_states(&self) -> BTreeMap<String, PersistenceState> {
        self.engines
            .iter()
            .map(|(symbol, engine)| (symbol.clone(), engine.persistence_state().clone()))
            .collect()
    }

    /// Evaluate every input. Inputs for the same symbol run in the order
    /// given, on that symbol's engine.
    pub fn evaluate_all(&mut self, inputs: &[EvaluationInput]) -> Vec<Evaluation> {
        let mut grouped: BTreeMap<&str, Vec<&EvaluationInput>> = BTreeMap::new();
        for input in inputs {
            self.engine(&input.symbol);
            grouped.entry(input.symbol.as_str()).or_default().push(input);
        }

        tracing::debug!(
            "Evaluating {} inputs across {} symbols",
            inputs.len(),
            grouped.len()
        );

        self.engines
            .par_iter_mut()
            .filter_map(|(symbol, engine)| {
                grouped.get(symbol.as_str()).map(|batch| {
                    batch
                        .iter()
                        .map(|input| engine.evaluate_input(input))
                        .collect::<Vec<_>>()
                })
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorParams;
    use crate::models::test_support::bars_from_closes;
    use crate::models::Action;

    fn input(symbol: &str, closes: &[f64]) -> EvaluationInput {
        EvaluationInput {
            symbol: symbol.to_string(),
            bars: bars_from_closes(closes),
            risk_score: 10.0,
            ..EvaluationInput::default()
        }
    }

    fn desk() -> DecisionDesk {
        let mut config = EngineConfig::default();
        config
            .indicators
            .insert("rsi".to_string(), IndicatorParams::new());
        config.patterns = Some(BTreeMap::new());
        DecisionDesk::from_config(config)
    }

    #[test]
    fn test_instruments_are_isolated() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let mut bad = input("BAD", &up);
        bad.bars[5].close = f64::NAN;

        let mut desk = desk();
        let mut results = desk.evaluate_all(&[input("UP", &up), bad, input("DOWN", &down)]);
        results.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let actions: Vec<(&str, Action)> = results
            .iter()
            .map(|e| (e.symbol.as_str(), e.decision.action))
            .collect();
        assert_eq!(
            actions,
            vec![("BAD", Action::Skip), ("DOWN", Action::Buy), ("UP", Action::Sell)]
        );
    }

    #[test]
    fn test_repeated_symbol_uses_one_tracker() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let mut desk = desk();
        let results = desk.evaluate_all(&[input("UP", &up), input("UP", &up), input("UP", &up)]);
        let counters: Vec<u64> = results.iter().map(|e| e.persistence.counter).collect();
        assert_eq!(counters, vec![1, 2, 3]);
        assert!(results[2].should_execute());
        assert_eq!(desk.persistence_states()["UP"].counter, 3);
    }
}
