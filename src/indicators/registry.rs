/// Indicator registry: name parsing, parameter defaults and the per-cycle
/// snapshot cache keyed by `name_period`
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{
    calculate_adx, calculate_atr, calculate_bollinger, calculate_cci, calculate_dema,
    calculate_donchian, calculate_ema, calculate_fibonacci_pivots, calculate_fractal_channel,
    calculate_hma, calculate_ichimoku, calculate_keltner, calculate_linear_regression,
    calculate_macd, calculate_mcginley, calculate_mfi, calculate_obv, calculate_pivot_points,
    calculate_psar, calculate_rsi, calculate_sma, calculate_stochastic, calculate_supertrend,
    calculate_tema, calculate_tma, calculate_vwap, calculate_vwma, calculate_williams_r,
    calculate_wma, last_defined, Bands, PivotSeries, Series,
};
use crate::models::PriceBar;

/// Parameter dictionary for one indicator (`{"period": 14}`)
pub type IndicatorParams = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Wma,
    Dema,
    Tema,
    Tma,
    Hma,
    Mcginley,
    Vwma,
    Rsi,
    Macd,
    Bollinger,
    Keltner,
    Donchian,
    FractalChannel,
    Atr,
    Adx,
    Stochastic,
    Cci,
    Mfi,
    WilliamsR,
    Obv,
    Vwap,
    Psar,
    Supertrend,
    Ichimoku,
    LinearRegression,
    PivotPoints,
    FibonacciPivots,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 29] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Wma,
        IndicatorKind::Dema,
        IndicatorKind::Tema,
        IndicatorKind::Tma,
        IndicatorKind::Hma,
        IndicatorKind::Mcginley,
        IndicatorKind::Vwma,
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Bollinger,
        IndicatorKind::Keltner,
        IndicatorKind::Donchian,
        IndicatorKind::FractalChannel,
        IndicatorKind::Atr,
        IndicatorKind::Adx,
        IndicatorKind::Stochastic,
        IndicatorKind::Cci,
        IndicatorKind::Mfi,
        IndicatorKind::WilliamsR,
        IndicatorKind::Obv,
        IndicatorKind::Vwap,
        IndicatorKind::Psar,
        IndicatorKind::Supertrend,
        IndicatorKind::Ichimoku,
        IndicatorKind::LinearRegression,
        IndicatorKind::PivotPoints,
        IndicatorKind::FibonacciPivots,
    ];

    /// Case-insensitive lookup with common aliases
    pub fn parse(name: &str) -> Option<IndicatorKind> {
        let normalized = name
            .trim()
            .to_ascii_lowercase()
            .replace(|c: char| c == '-' || c == ' ', "_");
        let kind = match normalized.as_str() {
            "sma" => IndicatorKind::Sma,
            "ema" => IndicatorKind::Ema,
            "wma" => IndicatorKind::Wma,
            "dema" => IndicatorKind::Dema,
            "tema" => IndicatorKind::Tema,
            "tma" | "trima" => IndicatorKind::Tma,
            "hma" | "hull" => IndicatorKind::Hma,
            "mcginley" | "mcginley_dynamic" => IndicatorKind::Mcginley,
            "vwma" | "vwap_ma" => IndicatorKind::Vwma,
            "rsi" => IndicatorKind::Rsi,
            "macd" => IndicatorKind::Macd,
            "bollinger" | "bbands" | "bollinger_bands" | "bb" => IndicatorKind::Bollinger,
            "keltner" | "keltner_channel" | "kc" => IndicatorKind::Keltner,
            "donchian" | "donchian_channel" => IndicatorKind::Donchian,
            "fractal_channel" | "fractal" | "fractals" => IndicatorKind::FractalChannel,
            "atr" => IndicatorKind::Atr,
            "adx" | "dmi" => IndicatorKind::Adx,
            "stochastic" | "stoch" => IndicatorKind::Stochastic,
            "cci" => IndicatorKind::Cci,
            "mfi" => IndicatorKind::Mfi,
            "williams_r" | "willr" | "williams" => IndicatorKind::WilliamsR,
            "obv" => IndicatorKind::Obv,
            "vwap" => IndicatorKind::Vwap,
            "psar" | "parabolic_sar" | "sar" => IndicatorKind::Psar,
            "supertrend" => IndicatorKind::Supertrend,
            "ichimoku" => IndicatorKind::Ichimoku,
            "linear_regression" | "linreg" | "lr" | "tsf" => IndicatorKind::LinearRegression,
            "pivot_points" | "pivots" | "pivot" => IndicatorKind::PivotPoints,
            "fibonacci_pivots" | "fib_pivots" => IndicatorKind::FibonacciPivots,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Wma => "wma",
            IndicatorKind::Dema => "dema",
            IndicatorKind::Tema => "tema",
            IndicatorKind::Tma => "tma",
            IndicatorKind::Hma => "hma",
            IndicatorKind::Mcginley => "mcginley",
            IndicatorKind::Vwma => "vwma",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Bollinger => "bollinger",
            IndicatorKind::Keltner => "keltner",
            IndicatorKind::Donchian => "donchian",
            IndicatorKind::FractalChannel => "fractal_channel",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Adx => "adx",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::Cci => "cci",
            IndicatorKind::Mfi => "mfi",
            IndicatorKind::WilliamsR => "williams_r",
            IndicatorKind::Obv => "obv",
            IndicatorKind::Vwap => "vwap",
            IndicatorKind::Psar => "psar",
            IndicatorKind::Supertrend => "supertrend",
            IndicatorKind::Ichimoku => "ichimoku",
            IndicatorKind::LinearRegression => "linear_regression",
            IndicatorKind::PivotPoints => "pivot_points",
            IndicatorKind::FibonacciPivots => "fibonacci_pivots",
        }
    }

    /// The lookback that names the cache key, `None` for period-less indicators
    pub fn default_period(&self) -> Option<usize> {
        match self {
            IndicatorKind::Sma | IndicatorKind::Ema | IndicatorKind::Wma => Some(20),
            IndicatorKind::Dema | IndicatorKind::Tema | IndicatorKind::Tma => Some(20),
            IndicatorKind::Hma | IndicatorKind::Mcginley | IndicatorKind::Vwma => Some(20),
            IndicatorKind::Rsi | IndicatorKind::Atr | IndicatorKind::Adx => Some(14),
            IndicatorKind::Mfi | IndicatorKind::WilliamsR | IndicatorKind::Stochastic => Some(14),
            IndicatorKind::Macd => Some(12),
            IndicatorKind::Bollinger | IndicatorKind::Keltner | IndicatorKind::Donchian => {
                Some(20)
            }
            IndicatorKind::Cci => Some(20),
            IndicatorKind::FractalChannel => Some(2),
            IndicatorKind::Supertrend => Some(10),
            IndicatorKind::Ichimoku => Some(9),
            IndicatorKind::LinearRegression => Some(14),
            IndicatorKind::Obv
            | IndicatorKind::Vwap
            | IndicatorKind::Psar
            | IndicatorKind::PivotPoints
            | IndicatorKind::FibonacciPivots => None,
        }
    }

    /// Cache key for a parameter set: `rsi_14`, `macd_12`, `obv`
    pub fn key(&self, params: &IndicatorParams) -> String {
        match self.period_param(params) {
            Some(period) => format!("{}_{}", self.name(), period),
            None => self.name().to_string(),
        }
    }

    fn period_param(&self, params: &IndicatorParams) -> Option<usize> {
        match self {
            IndicatorKind::Macd => self
                .default_period()
                .map(|d| param_usize(params, "fast", param_usize(params, "period", d))),
            IndicatorKind::Stochastic => self
                .default_period()
                .map(|d| param_usize(params, "k_period", param_usize(params, "period", d))),
            IndicatorKind::Ichimoku => self
                .default_period()
                .map(|d| param_usize(params, "tenkan", param_usize(params, "period", d))),
            IndicatorKind::FractalChannel => self
                .default_period()
                .map(|d| param_usize(params, "span", param_usize(params, "period", d))),
            IndicatorKind::Vwap => params.get("period").and_then(Value::as_u64).map(|p| p as usize),
            _ => self.default_period().map(|d| param_usize(params, "period", d)),
        }
    }

    /// Compute this indicator with defaults filled in for missing parameters
    pub fn compute(&self, bars: &[PriceBar], params: &IndicatorParams) -> IndicatorOutput {
        let period = self.period_param(params).unwrap_or(0);
        let key = self.key(params);
        let mut out = IndicatorOutput::new(*self, key, self.name());

        match self {
            IndicatorKind::Sma => out.push("sma", calculate_sma(bars, period)),
            IndicatorKind::Ema => out.push("ema", calculate_ema(bars, period)),
            IndicatorKind::Wma => out.push("wma", calculate_wma(bars, period)),
            IndicatorKind::Dema => out.push("dema", calculate_dema(bars, period)),
            IndicatorKind::Tema => out.push("tema", calculate_tema(bars, period)),
            IndicatorKind::Tma => out.push("tma", calculate_tma(bars, period)),
            IndicatorKind::Hma => out.push("hma", calculate_hma(bars, period)),
            IndicatorKind::Mcginley => out.push("mcginley", calculate_mcginley(bars, period)),
            IndicatorKind::Vwma => out.push("vwma", calculate_vwma(bars, period)),
            IndicatorKind::Rsi => out.push("rsi", calculate_rsi(bars, period)),
            IndicatorKind::Macd => {
                let slow = param_usize(params, "slow", 26);
                let signal = param_usize(params, "signal", 9);
                let macd = calculate_macd(bars, period, slow, signal);
                out.push("macd", macd.macd);
                out.push("signal", macd.signal);
                out.push("histogram", macd.histogram);
            }
            IndicatorKind::Bollinger => {
                let k = param_f64(params, "std_dev", param_f64(params, "k", 2.0));
                out.push_bands(calculate_bollinger(bars, period, k));
            }
            IndicatorKind::Keltner => {
                let atr_period = param_usize(params, "atr_period", 10);
                let multiplier = param_f64(params, "multiplier", 2.0);
                out.push_bands(calculate_keltner(bars, period, atr_period, multiplier));
            }
            IndicatorKind::Donchian => out.push_bands(calculate_donchian(bars, period)),
            IndicatorKind::FractalChannel => {
                out.push_bands(calculate_fractal_channel(bars, period))
            }
            IndicatorKind::Atr => out.push("atr", calculate_atr(bars, period)),
            IndicatorKind::Adx => {
                let adx = calculate_adx(bars, period);
                out.push("adx", adx.adx);
                out.push("plus_di", adx.plus_di);
                out.push("minus_di", adx.minus_di);
            }
            IndicatorKind::Stochastic => {
                let d_period = param_usize(params, "d_period", 3);
                let stoch = calculate_stochastic(bars, period, d_period);
                out.push("k", stoch.k);
                out.push("d", stoch.d);
            }
            IndicatorKind::Cci => out.push("cci", calculate_cci(bars, period)),
            IndicatorKind::Mfi => out.push("mfi", calculate_mfi(bars, period)),
            IndicatorKind::WilliamsR => out.push("williams_r", calculate_williams_r(bars, period)),
            IndicatorKind::Obv => out.push("obv", calculate_obv(bars)),
            IndicatorKind::Vwap => {
                let window = params.get("period").and_then(Value::as_u64).map(|p| p as usize);
                out.push("vwap", calculate_vwap(bars, window));
            }
            IndicatorKind::Psar => {
                let step = param_f64(params, "step", 0.02);
                let max_step = param_f64(params, "max_step", 0.2);
                out.push("psar", calculate_psar(bars, step, max_step));
            }
            IndicatorKind::Supertrend => {
                let multiplier = param_f64(params, "multiplier", 3.0);
                let st = calculate_supertrend(bars, period, multiplier);
                out.push("supertrend", st.value);
                out.push("direction", st.direction);
            }
            IndicatorKind::Ichimoku => {
                let kijun = param_usize(params, "kijun", 26);
                let senkou_b = param_usize(params, "senkou_b", 52);
                let displacement = param_usize(params, "displacement", 26);
                let ichi = calculate_ichimoku(bars, period, kijun, senkou_b, displacement);
                out.primary = "tenkan".to_string();
                out.push("tenkan", ichi.tenkan);
                out.push("kijun", ichi.kijun);
                out.push("senkou_a", ichi.senkou_a);
                out.push("senkou_b", ichi.senkou_b);
                out.push("chikou", ichi.chikou);
            }
            IndicatorKind::LinearRegression => {
                let lr = calculate_linear_regression(bars, period);
                out.primary = "value".to_string();
                out.push("value", lr.value);
                out.push("slope", lr.slope);
                out.push("forecast", lr.forecast);
            }
            IndicatorKind::PivotPoints => out.push_pivots(calculate_pivot_points(bars)),
            IndicatorKind::FibonacciPivots => out.push_pivots(calculate_fibonacci_pivots(bars)),
        }
        out
    }
}

fn param_usize(params: &IndicatorParams, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn param_f64(params: &IndicatorParams, name: &str, default: f64) -> f64 {
    params
        .get(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

/// Named component series of one computed indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorOutput {
    pub kind: IndicatorKind,
    pub key: String,
    /// Component read when a caller asks for the indicator without a field
    pub primary: String,
    pub components: BTreeMap<String, Series>,
}

impl IndicatorOutput {
    fn new(kind: IndicatorKind, key: String, primary: &str) -> Self {
        Self {
            kind,
            key,
            primary: primary.to_string(),
            components: BTreeMap::new(),
        }
    }

    fn push(&mut self, name: &str, series: Series) {
        self.components.insert(name.to_string(), series);
    }

    fn push_bands(&mut self, bands: Bands) {
        self.primary = "middle".to_string();
        self.push("upper", bands.upper);
        self.push("middle", bands.middle);
        self.push("lower", bands.lower);
    }

    fn push_pivots(&mut self, pivots: PivotSeries) {
        self.primary = "pivot".to_string();
        self.push("pivot", pivots.pivot);
        self.push("r1", pivots.r1);
        self.push("r2", pivots.r2);
        self.push("r3", pivots.r3);
        self.push("s1", pivots.s1);
        self.push("s2", pivots.s2);
        self.push("s3", pivots.s3);
    }

    pub fn series(&self, field: Option<&str>) -> Option<&Series> {
        self.components.get(field.unwrap_or(&self.primary))
    }

    /// Value at the last bar; undefined if the final position is undefined
    pub fn latest(&self, field: Option<&str>) -> Option<f64> {
        self.series(field).and_then(|s| s.last().copied().flatten())
    }

    /// Value one bar back, used for crossover readings
    pub fn previous(&self, field: Option<&str>) -> Option<f64> {
        self.series(field).and_then(|s| {
            let n = s.len();
            if n < 2 {
                None
            } else {
                s[n - 2]
            }
        })
    }
}

/// Every indicator computed for one evaluation cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    outputs: BTreeMap<String, IndicatorOutput>,
}

impl IndicatorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the enabled indicators; an empty map enables every known
    /// indicator with its defaults. Unknown names are logged and skipped.
    pub fn build(bars: &[PriceBar], enabled: &BTreeMap<String, IndicatorParams>) -> Self {
        let mut snapshot = Self::new();
        if enabled.is_empty() {
            let defaults = IndicatorParams::new();
            for kind in IndicatorKind::ALL {
                snapshot.insert(kind.compute(bars, &defaults));
            }
            return snapshot;
        }

        for (name, params) in enabled {
            match IndicatorKind::parse(name) {
                Some(kind) => snapshot.insert(kind.compute(bars, params)),
                None => tracing::warn!("Unknown indicator '{}' skipped", name),
            }
        }
        snapshot
    }

    pub fn insert(&mut self, output: IndicatorOutput) {
        self.outputs.insert(output.key.clone(), output);
    }

    pub fn get(&self, key: &str) -> Option<&IndicatorOutput> {
        self.outputs.get(key)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &IndicatorOutput> {
        self.outputs.values()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn latest(&self, key: &str, field: Option<&str>) -> Option<f64> {
        self.get(key).and_then(|o| o.latest(field))
    }

    /// Most recent defined value of every component, keyed `key` for the
    /// primary component and `key.component` for the others
    pub fn latest_values(&self) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for output in self.outputs.values() {
            for (component, series) in &output.components {
                let Some(value) = last_defined(series) else {
                    continue;
                };
                let name = if *component == output.primary {
                    output.key.clone()
                } else {
                    format!("{}.{}", output.key, component)
                };
                values.insert(name, value);
            }
        }
        values
    }
}
