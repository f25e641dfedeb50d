use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::{DecisionEngine, ExternalOpinions};
use crate::error::{EngineError, Result};
use crate::models::{Action, PriceBar};

/// One replayed bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub action: Action,
    pub confidence: f64,
    pub should_execute: bool,
}

/// Decision statistics for a walk-forward replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub symbol: String,
    pub total_bars: usize,
    pub evaluations: usize,
    /// Decisions per action name
    pub action_counts: BTreeMap<String, usize>,
    pub executable: usize,
    pub skips: usize,
    pub first_executable: Option<DateTime<Utc>>,
    pub steps: Vec<ReplayStep>,
}

impl ReplaySummary {
    pub fn count(&self, action: Action) -> usize {
        self.action_counts.get(action.as_str()).copied().unwrap_or(0)
    }

    pub fn print_report(&self) {
        println!("\n=== REPLAY SUMMARY: {} ===", self.symbol);
        println!("  Bars:                  {}", self.total_bars);
        println!("  Evaluations:           {}", self.evaluations);
        for action in [Action::Buy, Action::Sell, Action::Hold, Action::Skip] {
            let count = self.count(action);
            let share = if self.evaluations > 0 {
                count as f64 / self.evaluations as f64 * 100.0
            } else {
                0.0
            };
            println!("  {:<22} {} ({:.1}%)", format!("{}:", action), count, share);
        }
        println!("  Executable:            {}", self.executable);
        match self.first_executable {
            Some(ts) => println!("  First executable:      {}", ts.format("%Y-%m-%d %H:%M")),
            None => println!("  First executable:      none"),
        }
    }
}

/// Walks a bar history forward, evaluating the engine once per bar
pub struct ReplayRunner {
    warmup: usize,
    risk_score: f64,
}

impl Default for ReplayRunner {
    fn default() -> Self {
        Self {
            warmup: 30,
            risk_score: 20.0,
        }
    }
}

impl ReplayRunner {
    /// `warmup` bars are observed before the first evaluation
    pub fn new(warmup: usize, risk_score: f64) -> Self {
        Self { warmup, risk_score }
    }

    pub fn run(&self, engine: &mut DecisionEngine, bars: &[PriceBar]) -> Result<ReplaySummary> {
        if bars.len() <= self.warmup {
            return Err(EngineError::InsufficientData {
                bars: bars.len(),
                minimum: self.warmup + 1,
            });
        }

        tracing::info!(
            "Starting replay for {}: {} bars, warmup {}",
            engine.symbol(),
            bars.len(),
            self.warmup
        );

        let external = ExternalOpinions::default();
        let mut summary = ReplaySummary {
            symbol: engine.symbol().to_string(),
            total_bars: bars.len(),
            evaluations: 0,
            action_counts: BTreeMap::new(),
            executable: 0,
            skips: 0,
            first_executable: None,
            steps: Vec::with_capacity(bars.len() - self.warmup),
        };

        for i in self.warmup..bars.len() {
            let evaluation = engine.evaluate(&bars[..=i], self.risk_score, &external);
            let action = evaluation.decision.action;
            let should_execute = evaluation.should_execute();

            summary.evaluations += 1;
            *summary
                .action_counts
                .entry(action.as_str().to_string())
                .or_insert(0) += 1;
            if action == Action::Skip {
                summary.skips += 1;
            }
            if should_execute {
                summary.executable += 1;
                summary.first_executable.get_or_insert(bars[i].timestamp);
            }
            summary.steps.push(ReplayStep {
                index: i,
                timestamp: bars[i].timestamp,
                close: bars[i].close,
                action,
                confidence: evaluation.decision.confidence,
                should_execute,
            });
        }

        tracing::info!(
            "Replay complete for {}: {} evaluations, {} executable, {} skipped",
            summary.symbol,
            summary.evaluations,
            summary.executable,
            summary.skips
        );
        Ok(summary)
    }

    /// Run and print the summary
    pub fn run_and_report(
        &self,
        engine: &mut DecisionEngine,
        bars: &[PriceBar],
        scenario_name: &str,
    ) -> Result<ReplaySummary> {
        println!("\nReplaying: {}", scenario_name);
        println!("   Symbol: {}", engine.symbol());
        println!("   Bars: {}", bars.len());

        let summary = self.run(engine, bars)?;
        summary.print_report();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::indicators::IndicatorParams;
    use crate::predictors::ModelRegistry;
    use crate::replay::synthetic::{MarketScenario, SyntheticDataGenerator};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn engine() -> DecisionEngine {
        let mut config = EngineConfig::default();
        config
            .indicators
            .insert("rsi".to_string(), IndicatorParams::new());
        config
            .indicators
            .insert("sma".to_string(), IndicatorParams::new());
        config.patterns = Some(BTreeMap::new());
        DecisionEngine::new("SYNTH", config, Arc::new(ModelRegistry::new()))
    }

    #[test]
    fn test_replay_counts_every_bar_after_warmup() {
        tracing_subscriber::fmt()
            .with_env_filter("decisionbot=debug")
            .try_init()
            .ok();

        let bars = SyntheticDataGenerator::new(42).generate(MarketScenario::Uptrend, 120, 60);
        let summary = ReplayRunner::new(30, 10.0).run(&mut engine(), &bars).unwrap();

        assert_eq!(summary.evaluations, 90);
        assert_eq!(summary.steps.len(), 90);
        assert_eq!(summary.action_counts.values().sum::<usize>(), 90);
        assert_eq!(summary.skips, 0);
        assert!(summary.executable <= summary.evaluations);
        assert_eq!(summary.steps[0].index, 30);
    }

    #[test]
    fn test_replay_insufficient_data() {
        let bars = SyntheticDataGenerator::new(42).generate(MarketScenario::Sideways, 20, 5);
        let result = ReplayRunner::new(30, 10.0).run(&mut engine(), &bars);
        assert!(matches!(
            result,
            Err(EngineError::InsufficientData { bars: 20, minimum: 31 })
        ));
    }
}
