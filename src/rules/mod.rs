// Rule trees for buy/sell gating
// A tree is a JSON document of AND/OR/NOT groups over leaf conditions on
// indicators, patterns, price, volume and bar time. Malformed operators never
// fail deserialisation: they degrade at evaluation time with a warning.

pub mod evaluator;

pub use evaluator::{evaluate, RuleContext};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::indicators::IndicatorParams;
use crate::patterns::PatternSignal;

/// Boolean combinator of a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BoolOp {
    And,
    Or,
    Not,
    /// Anything unrecognised; evaluated as AND
    Unknown(String),
}

impl From<String> for BoolOp {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "AND" | "ALL" => BoolOp::And,
            "OR" | "ANY" => BoolOp::Or,
            "NOT" => BoolOp::Not,
            _ => BoolOp::Unknown(value),
        }
    }
}

impl From<BoolOp> for String {
    fn from(op: BoolOp) -> Self {
        match op {
            BoolOp::And => "AND".to_string(),
            BoolOp::Or => "OR".to_string(),
            BoolOp::Not => "NOT".to_string(),
            BoolOp::Unknown(raw) => raw,
        }
    }
}

/// Numeric comparison of a leaf condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparison {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Ne,
    Unknown(String),
}

/// Tolerance for `==` / `!=`
pub const EQUALITY_EPSILON: f64 = 1e-4;

impl Comparison {
    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Lt => left < right,
            Comparison::Gte => left >= right,
            Comparison::Lte => left <= right,
            Comparison::Eq => (left - right).abs() < EQUALITY_EPSILON,
            Comparison::Ne => (left - right).abs() >= EQUALITY_EPSILON,
            Comparison::Unknown(raw) => {
                tracing::warn!("Unknown comparison operator '{}', condition is false", raw);
                false
            }
        }
    }
}

impl From<String> for Comparison {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            ">" | "gt" => Comparison::Gt,
            "<" | "lt" => Comparison::Lt,
            ">=" | "gte" | "ge" => Comparison::Gte,
            "<=" | "lte" | "le" => Comparison::Lte,
            "==" | "=" | "eq" => Comparison::Eq,
            "!=" | "<>" | "ne" => Comparison::Ne,
            _ => Comparison::Unknown(value),
        }
    }
}

impl From<Comparison> for String {
    fn from(op: Comparison) -> Self {
        match op {
            Comparison::Gt => ">".to_string(),
            Comparison::Lt => "<".to_string(),
            Comparison::Gte => ">=".to_string(),
            Comparison::Lte => "<=".to_string(),
            Comparison::Eq => "==".to_string(),
            Comparison::Ne => "!=".to_string(),
            Comparison::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// Right-hand side of a comparison: a literal or a named reference such as
/// `average_volume`, `close`, `sma_20` or `bollinger_20.upper`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Reference(String),
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Number(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Reference(value.to_string())
    }
}

fn default_within_bars() -> usize {
    1
}

fn default_price_field() -> String {
    "close".to_string()
}

/// Leaf predicate, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    Indicator {
        indicator: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        period: Option<usize>,
        /// Component of a multi-series indicator (`histogram`, `upper`, ...)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "IndicatorParams::is_empty")]
        params: IndicatorParams,
        operator: Comparison,
        value: Operand,
    },
    Pattern {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<PatternSignal>,
        #[serde(default)]
        min_confidence: f64,
        /// Formation must end within the last N bars
        #[serde(default = "default_within_bars")]
        within_bars: usize,
    },
    Price {
        #[serde(default = "default_price_field")]
        field: String,
        operator: Comparison,
        value: Operand,
    },
    Volume {
        operator: Comparison,
        value: Operand,
        /// Scales the right-hand side (`volume > 1.5 * average_volume`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiplier: Option<f64>,
    },
    Time {
        /// hour, minute, weekday (0 = Monday), day or month of the last bar
        field: String,
        operator: Comparison,
        value: Operand,
    },
    #[serde(other)]
    Unknown,
}

/// AND/OR/NOT group of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub operator: BoolOp,
    pub conditions: Vec<RuleNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Condition(Condition),
}

impl RuleNode {
    pub fn from_json(json: &str) -> Result<RuleNode> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<RuleNode> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn and(conditions: Vec<RuleNode>) -> RuleNode {
        RuleNode::Group(RuleGroup {
            operator: BoolOp::And,
            conditions,
        })
    }

    pub fn or(conditions: Vec<RuleNode>) -> RuleNode {
        RuleNode::Group(RuleGroup {
            operator: BoolOp::Or,
            conditions,
        })
    }

    pub fn not(condition: RuleNode) -> RuleNode {
        RuleNode::Group(RuleGroup {
            operator: BoolOp::Not,
            conditions: vec![condition],
        })
    }

    /// `indicator(period) <op> value`
    pub fn indicator(
        name: &str,
        period: Option<usize>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> RuleNode {
        RuleNode::Condition(Condition::Indicator {
            indicator: name.to_string(),
            period,
            field: None,
            params: IndicatorParams::new(),
            operator: Comparison::from(operator.to_string()),
            value: value.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_tree() {
        let node = RuleNode::from_value(json!({
            "operator": "AND",
            "conditions": [
                {"type": "indicator", "indicator": "rsi", "period": 14, "operator": ">", "value": 70},
                {"operator": "OR", "conditions": [
                    {"type": "pattern", "pattern": "evening_star"},
                    {"type": "volume", "operator": ">", "value": "average_volume"}
                ]}
            ]
        }))
        .unwrap();

        let RuleNode::Group(group) = node else {
            panic!("expected group");
        };
        assert_eq!(group.operator, BoolOp::And);
        assert_eq!(group.conditions.len(), 2);
        assert!(matches!(
            &group.conditions[0],
            RuleNode::Condition(Condition::Indicator { operator: Comparison::Gt, value: Operand::Number(v), .. }) if *v == 70.0
        ));
        let RuleNode::Group(inner) = &group.conditions[1] else {
            panic!("expected nested group");
        };
        assert_eq!(inner.operator, BoolOp::Or);
        assert!(matches!(
            &inner.conditions[1],
            RuleNode::Condition(Condition::Volume { value: Operand::Reference(r), .. }) if r == "average_volume"
        ));
    }

    #[test]
    fn test_unknown_operators_survive_parsing() {
        let node = RuleNode::from_value(json!({
            "operator": "XOR",
            "conditions": [
                {"type": "price", "operator": "~=", "value": 1},
                {"type": "astrology", "sign": "leo"}
            ]
        }))
        .unwrap();
        let RuleNode::Group(group) = node else {
            panic!("expected group");
        };
        assert_eq!(group.operator, BoolOp::Unknown("XOR".to_string()));
        assert!(matches!(
            &group.conditions[0],
            RuleNode::Condition(Condition::Price { operator: Comparison::Unknown(_), .. })
        ));
        assert_eq!(group.conditions[1], RuleNode::Condition(Condition::Unknown));
    }

    #[test]
    fn test_comparison_epsilon() {
        assert!(Comparison::Eq.apply(1.00001, 1.0));
        assert!(!Comparison::Eq.apply(1.001, 1.0));
        assert!(Comparison::Ne.apply(1.001, 1.0));
        assert!(!Comparison::Unknown("?".into()).apply(1.0, 1.0));
    }

    #[test]
    fn test_tree_serialises_back() {
        let node = RuleNode::and(vec![RuleNode::indicator("rsi", Some(14), ">", 70.0)]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["operator"], "AND");
        assert_eq!(json["conditions"][0]["type"], "indicator");
        assert_eq!(json["conditions"][0]["operator"], ">");
        let back = RuleNode::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
