use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::models::PriceBar;

/// Market scenario types for synthetic bar generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% per day of bars)
    Uptrend,
    /// Steady downtrend with noise (-2% per day of bars)
    Downtrend,
    /// Mean-reverting chop (±1% around the base price)
    Sideways,
    /// Large swings (±5% per bar)
    Volatile,
    /// Rally for the first half, then a 25% slide
    Reversal,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 5] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::Reversal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Sideways => "sideways",
            MarketScenario::Volatile => "volatile",
            MarketScenario::Reversal => "reversal",
        }
    }

    pub fn parse(name: &str) -> Option<MarketScenario> {
        MarketScenario::ALL
            .into_iter()
            .find(|s| s.as_str() == name.trim().to_ascii_lowercase())
    }
}

/// Reproducible bar series for demos and tests
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start: DateTime<Utc>,
}

impl SyntheticDataGenerator {
    /// Same seed, same bars
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000_000.0,
            start: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Generate `count` bars spaced `interval_minutes` apart
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        count: usize,
        interval_minutes: i64,
    ) -> Vec<PriceBar> {
        let bars_per_day = (24.0 * 60.0 / interval_minutes.max(1) as f64).max(1.0);
        let mut price = self.base_price;
        let mut bars = Vec::with_capacity(count);

        for i in 0..count {
            let timestamp = self.start + Duration::minutes(i as i64 * interval_minutes);
            let previous = price;
            price = self.step(scenario, price, i, count, bars_per_day);
            bars.push(self.make_bar(previous, price, timestamp));
        }
        bars
    }

    fn step(
        &mut self,
        scenario: MarketScenario,
        price: f64,
        i: usize,
        count: usize,
        bars_per_day: f64,
    ) -> f64 {
        match scenario {
            MarketScenario::Uptrend => {
                price * (1.0 + 0.02 / bars_per_day + self.rng.gen_range(-0.001..0.001))
            }
            MarketScenario::Downtrend => {
                price * (1.0 - 0.02 / bars_per_day + self.rng.gen_range(-0.001..0.001))
            }
            MarketScenario::Sideways => {
                let pull = (self.base_price - price) * 0.1;
                price + pull + price * self.rng.gen_range(-0.01..0.01)
            }
            MarketScenario::Volatile => {
                let next = price * (1.0 + self.rng.gen_range(-0.05..0.05));
                next.max(self.base_price * 0.5)
            }
            MarketScenario::Reversal => {
                let half = (count / 2).max(1);
                if i < half {
                    price * (1.0 + self.rng.gen_range(-0.005..0.01))
                } else {
                    let slide = 0.25 / half as f64;
                    price * (1.0 - slide + self.rng.gen_range(-0.005..0.005))
                }
            }
        }
    }

    /// Open at the previous close, with a small wick either side of the body
    fn make_bar(&mut self, open: f64, close: f64, timestamp: DateTime<Utc>) -> PriceBar {
        let wick = 0.002;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..wick));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..wick));
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);
        PriceBar::new(timestamp, open, high, low, close, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validate_bars;

    #[test]
    fn test_trends_end_where_expected() {
        let up = SyntheticDataGenerator::new(42).generate(MarketScenario::Uptrend, 500, 60);
        let down = SyntheticDataGenerator::new(42).generate(MarketScenario::Downtrend, 500, 60);
        assert_eq!(up.len(), 500);
        assert!(up[499].close > up[0].close);
        assert!(down[499].close < down[0].close);
    }

    #[test]
    fn test_sideways_stays_near_base() {
        let mut gen = SyntheticDataGenerator::new(7);
        let base = gen.base_price();
        let bars = gen.generate(MarketScenario::Sideways, 500, 60);
        assert!(bars
            .iter()
            .all(|b| b.close > base * 0.9 && b.close < base * 1.1));
    }

    #[test]
    fn test_same_seed_same_bars() {
        let a = SyntheticDataGenerator::new(9).generate(MarketScenario::Volatile, 50, 5);
        let b = SyntheticDataGenerator::new(9).generate(MarketScenario::Volatile, 50, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bars_are_valid_and_sequential() {
        for scenario in MarketScenario::ALL {
            let bars = SyntheticDataGenerator::new(1).generate(scenario, 200, 15);
            assert!(validate_bars(&bars).is_ok(), "{:?}", scenario);
            assert!(bars.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
        }
        assert_eq!(MarketScenario::parse("Reversal"), Some(MarketScenario::Reversal));
    }

    #[test]
    fn test_custom_base_and_start() {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).unwrap();
        let bars = SyntheticDataGenerator::new(3)
            .with_base_price(20.0)
            .with_start(start)
            .generate(MarketScenario::Sideways, 10, 5);
        assert_eq!(bars[0].timestamp, start);
        assert_eq!(bars[9].timestamp, start + Duration::minutes(45));
        assert!(bars.iter().all(|b| b.close > 15.0 && b.close < 25.0));
    }
}
