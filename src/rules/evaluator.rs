/// Recursive evaluation of rule trees
///
/// Every leaf reads the last bar of the context. Missing data (undefined
/// indicator, unknown name, pattern not detected) makes a leaf false; the
/// evaluator never errors.
use chrono::{Datelike, Timelike};

use super::{BoolOp, Comparison, Condition, Operand, RuleNode};
use crate::indicators::{calculate_average_volume, IndicatorKind, IndicatorParams, IndicatorSnapshot};
use crate::models::PriceBar;
use crate::patterns::PatternMatch;

/// Window used by the `average_volume` reference
pub const AVERAGE_VOLUME_PERIOD: usize = 20;

/// Everything a rule can look at for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub bars: &'a [PriceBar],
    pub indicators: &'a IndicatorSnapshot,
    pub patterns: &'a [PatternMatch],
}

impl<'a> RuleContext<'a> {
    pub fn new(
        bars: &'a [PriceBar],
        indicators: &'a IndicatorSnapshot,
        patterns: &'a [PatternMatch],
    ) -> Self {
        Self {
            bars,
            indicators,
            patterns,
        }
    }

    fn last_bar(&self) -> Option<&'a PriceBar> {
        self.bars.last()
    }

    /// Latest value of an indicator, from the snapshot when cached under its
    /// `name_period` key, otherwise computed on demand
    fn indicator_value(
        &self,
        kind: IndicatorKind,
        params: &IndicatorParams,
        field: Option<&str>,
    ) -> Option<f64> {
        let key = kind.key(params);
        match self.indicators.get(&key) {
            Some(output) => output.latest(field),
            None => {
                tracing::debug!("Indicator '{}' not cached, computing on demand", key);
                kind.compute(self.bars, params).latest(field)
            }
        }
    }

    /// Resolve a named reference to a number
    fn reference(&self, name: &str) -> Option<f64> {
        let name = name.trim().to_ascii_lowercase();
        if let Some(value) = self.bar_field(&name) {
            return Some(value);
        }
        if name == "average_volume" {
            let period = AVERAGE_VOLUME_PERIOD.min(self.bars.len());
            return calculate_average_volume(self.bars, period);
        }
        if let Some(period) = name.strip_prefix("average_volume_") {
            let period: usize = period.parse().ok()?;
            return calculate_average_volume(self.bars, period);
        }

        let (key, field) = match name.split_once('.') {
            Some((key, field)) => (key, Some(field)),
            None => (name.as_str(), None),
        };
        if let Some(output) = self.indicators.get(key) {
            return output.latest(field);
        }

        // `sma_50` style keys that were not precomputed
        let (kind_name, period) = match key.rsplit_once('_') {
            Some((kind_name, period)) => match period.parse::<usize>() {
                Ok(period) => (kind_name, Some(period)),
                Err(_) => (key, None),
            },
            None => (key, None),
        };
        let kind = IndicatorKind::parse(kind_name)?;
        let mut params = IndicatorParams::new();
        if let Some(period) = period {
            params.insert("period".to_string(), period.into());
        }
        self.indicator_value(kind, &params, field)
    }

    fn bar_field(&self, name: &str) -> Option<f64> {
        let bar = self.last_bar()?;
        let value = match name {
            "open" => bar.open,
            "high" => bar.high,
            "low" => bar.low,
            "close" | "price" => bar.close,
            "volume" => bar.volume,
            "typical_price" | "typical" => bar.typical_price(),
            "median_price" | "median" => bar.median_price(),
            _ => return None,
        };
        Some(value)
    }

    fn operand(&self, operand: &Operand) -> Option<f64> {
        match operand {
            Operand::Number(v) => Some(*v),
            Operand::Reference(name) => self.reference(name),
        }
    }
}

/// Evaluate a rule tree against the context
pub fn evaluate(node: &RuleNode, ctx: &RuleContext) -> bool {
    match node {
        RuleNode::Group(group) => match &group.operator {
            BoolOp::And => group.conditions.iter().all(|c| evaluate(c, ctx)),
            BoolOp::Or => group.conditions.iter().any(|c| evaluate(c, ctx)),
            BoolOp::Not => {
                if group.conditions.is_empty() {
                    return false;
                }
                // several children are negated as a conjunction
                !group.conditions.iter().all(|c| evaluate(c, ctx))
            }
            BoolOp::Unknown(raw) => {
                tracing::warn!("Unknown boolean operator '{}', treating as AND", raw);
                group.conditions.iter().all(|c| evaluate(c, ctx))
            }
        },
        RuleNode::Condition(condition) => evaluate_condition(condition, ctx),
    }
}

fn compare(left: Option<f64>, operator: &Comparison, right: Option<f64>) -> bool {
    match (left, right) {
        (Some(l), Some(r)) if l.is_finite() && r.is_finite() => operator.apply(l, r),
        _ => false,
    }
}

fn evaluate_condition(condition: &Condition, ctx: &RuleContext) -> bool {
    match condition {
        Condition::Indicator {
            indicator,
            period,
            field,
            params,
            operator,
            value,
        } => {
            let Some(kind) = IndicatorKind::parse(indicator) else {
                tracing::warn!("Rule references unknown indicator '{}'", indicator);
                return false;
            };
            let mut params = params.clone();
            if let Some(period) = period {
                params.insert("period".to_string(), (*period).into());
            }
            let left = ctx.indicator_value(kind, &params, field.as_deref());
            compare(left, operator, ctx.operand(value))
        }
        Condition::Pattern {
            pattern,
            signal,
            min_confidence,
            within_bars,
        } => {
            let n = ctx.bars.len();
            let earliest = n.saturating_sub((*within_bars).max(1));
            ctx.patterns.iter().any(|m| {
                m.pattern_id.eq_ignore_ascii_case(pattern)
                    && m.index >= earliest
                    && m.confidence >= *min_confidence
                    && signal.map_or(true, |s| s == m.signal)
            })
        }
        Condition::Price {
            field,
            operator,
            value,
        } => {
            let left = ctx.bar_field(&field.to_ascii_lowercase());
            compare(left, operator, ctx.operand(value))
        }
        Condition::Volume {
            operator,
            value,
            multiplier,
        } => {
            let left = ctx.last_bar().map(|b| b.volume);
            let right = ctx.operand(value).map(|v| v * multiplier.unwrap_or(1.0));
            compare(left, operator, right)
        }
        Condition::Time {
            field,
            operator,
            value,
        } => {
            let left = ctx.last_bar().and_then(|bar| {
                let ts = bar.timestamp;
                let v = match field.to_ascii_lowercase().as_str() {
                    "hour" => ts.hour(),
                    "minute" => ts.minute(),
                    "weekday" | "day_of_week" => ts.weekday().num_days_from_monday(),
                    "day" | "day_of_month" => ts.day(),
                    "month" => ts.month(),
                    other => {
                        tracing::warn!("Unknown time field '{}'", other);
                        return None;
                    }
                };
                Some(v as f64)
            });
            compare(left, operator, ctx.operand(value))
        }
        Condition::Unknown => {
            tracing::warn!("Unknown condition type, condition is false");
            false
        }
    }
}
