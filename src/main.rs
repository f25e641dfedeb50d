use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use decisionbot::engine::{DecisionEngine, EngineConfig, ExternalOpinions};
use decisionbot::indicators::{
    analyze_market_structure, calculate_volume_direction_ratio, is_volume_spike, IndicatorKind,
    IndicatorParams,
};
use decisionbot::models::{validate_bars, PriceBar};
use decisionbot::patterns::{detect_patterns, known_patterns};
use decisionbot::predictors::ModelRegistry;
use decisionbot::replay::{MarketScenario, ReplayRunner, SyntheticDataGenerator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "decisionbot", version, about = "Trading decision engine")]
struct Cli {
    /// Engine config file (TOML or JSON); DECISIONBOT__* env vars override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one decision cycle and print the evaluation as JSON
    Evaluate {
        /// JSON array of bars, oldest first
        bars: PathBuf,
        #[arg(long, default_value = "UNKNOWN")]
        symbol: String,
        #[arg(long, default_value_t = 0.0)]
        risk_score: f64,
        /// JSON object with ml_predictions / social_sentiment / news_sentiment
        #[arg(long)]
        signals: Option<PathBuf>,
    },
    /// Print the latest values of one indicator
    Indicators {
        bars: PathBuf,
        /// Indicator name, e.g. rsi, macd, bollinger
        #[arg(long)]
        name: String,
        #[arg(long)]
        period: Option<usize>,
    },
    /// List pattern matches
    Patterns {
        bars: PathBuf,
        /// Restrict detection to these pattern ids (repeatable)
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// Print the pattern catalogue and exit
        #[arg(long)]
        list: bool,
    },
    /// Walk a bar history forward through the engine
    Replay {
        bars: PathBuf,
        #[arg(long, default_value = "REPLAY")]
        symbol: String,
        #[arg(long, default_value_t = 30)]
        warmup: usize,
        #[arg(long, default_value_t = 20.0)]
        risk_score: f64,
    },
    /// Replay synthetic market scenarios
    Demo {
        /// uptrend, downtrend, sideways, volatile or reversal; all when omitted
        #[arg(long)]
        scenario: Option<String>,
        #[arg(long, default_value_t = 300)]
        bars: usize,
        #[arg(long, default_value_t = 60)]
        interval: i64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::Evaluate {
            bars,
            symbol,
            risk_score,
            signals,
        } => {
            let bars = read_bars(&bars)?;
            let external = match signals {
                Some(path) => read_json::<ExternalOpinions>(&path)?,
                None => ExternalOpinions::default(),
            };
            let registry = Arc::new(ModelRegistry::from_config(&config.models));
            let mut engine = DecisionEngine::new(symbol, config, registry);
            let evaluation = engine.evaluate(&bars, risk_score, &external);
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }
        Command::Indicators { bars, name, period } => {
            let bars = read_bars(&bars)?;
            let kind = match IndicatorKind::parse(&name) {
                Some(kind) => kind,
                None => bail!("Unknown indicator '{}'", name),
            };
            let mut params = IndicatorParams::new();
            if let Some(period) = period {
                params.insert("period".to_string(), period.into());
            }
            let output = kind.compute(&bars, &params);

            println!("{} ({} bars)", output.key, bars.len());
            for (component, series) in &output.components {
                let latest = series.last().copied().flatten();
                match latest {
                    Some(value) => println!("  {:<16} {:.4}", component, value),
                    None => println!("  {:<16} undefined", component),
                }
            }
            println!(
                "  {:<16} {}",
                "structure",
                analyze_market_structure(&bars, bars.len().min(20)).as_str()
            );
            if let Some((up, down)) = calculate_volume_direction_ratio(&bars, bars.len().min(20)) {
                println!("  {:<16} {:.0}% up / {:.0}% down", "volume", up * 100.0, down * 100.0);
            }
            if is_volume_spike(&bars, 20, 2.0) {
                println!("  {:<16} last bar above 2x the 20-bar average", "volume spike");
            }
        }
        Command::Patterns {
            bars,
            patterns,
            list,
        } => {
            if list {
                for id in known_patterns() {
                    println!("{}", id);
                }
                return Ok(());
            }
            let bars = read_bars(&bars)?;
            let selected = if patterns.is_empty() {
                None
            } else {
                Some(patterns.as_slice())
            };
            let matches = detect_patterns(&bars, selected);
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Command::Replay {
            bars,
            symbol,
            warmup,
            risk_score,
        } => {
            let bars = read_bars(&bars)?;
            let registry = Arc::new(ModelRegistry::from_config(&config.models));
            let mut engine = DecisionEngine::new(symbol, config, registry);
            ReplayRunner::new(warmup, risk_score).run(&mut engine, &bars)?.print_report();
        }
        Command::Demo {
            scenario,
            bars,
            interval,
            seed,
        } => {
            let scenarios = match scenario {
                Some(name) => match MarketScenario::parse(&name) {
                    Some(s) => vec![s],
                    None => bail!("Unknown scenario '{}'", name),
                },
                None => MarketScenario::ALL.to_vec(),
            };
            let registry = Arc::new(ModelRegistry::from_config(&config.models));
            let runner = ReplayRunner::default();

            for scenario in scenarios {
                let data = SyntheticDataGenerator::new(seed).generate(scenario, bars, interval);
                let mut engine = DecisionEngine::new(
                    scenario.as_str().to_uppercase(),
                    config.clone(),
                    Arc::clone(&registry),
                );
                runner.run_and_report(&mut engine, &data, scenario.as_str())?;
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_bars(path: &Path) -> anyhow::Result<Vec<PriceBar>> {
    let bars: Vec<PriceBar> = read_json(path)?;
    validate_bars(&bars)?;
    tracing::info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("decisionbot=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
