// Walk-forward replay of bar histories through a decision engine
pub mod runner;
pub mod synthetic;

pub use runner::{ReplayRunner, ReplayStep, ReplaySummary};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
