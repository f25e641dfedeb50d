// Risk handling for aggregation
// The risk score (0-100) is produced by an external risk manager. Here it is
// only consumed: as a hard override, as a confidence dampener and as a
// position-size scale.

use serde::{Deserialize, Serialize};

/// Risk limits applied while aggregating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Scores strictly above this force a hold
    pub risk_score_threshold: f64,
    /// Confidence multiplier is `max(0, 1 - factor * score / 100)`
    pub risk_adjustment_factor: f64,
    pub risk_based_scaling: bool,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            risk_score_threshold: 80.0,
            risk_adjustment_factor: 0.5,
            risk_based_scaling: true,
        }
    }
}

/// Clamp a finite score into [0, 100]; non-finite scores are invalid
pub fn sanitize_risk_score(risk_score: f64) -> Option<f64> {
    if risk_score.is_finite() {
        Some(risk_score.clamp(0.0, 100.0))
    } else {
        None
    }
}

impl RiskPolicy {
    /// An invalid (non-finite) score always overrides
    pub fn is_override(&self, risk_score: f64) -> bool {
        match sanitize_risk_score(risk_score) {
            Some(score) => score > self.risk_score_threshold,
            None => true,
        }
    }

    /// Uniform confidence dampening in [0, 1]
    pub fn confidence_multiplier(&self, risk_score: f64) -> f64 {
        match sanitize_risk_score(risk_score) {
            Some(score) => (1.0 - self.risk_adjustment_factor * (score / 100.0)).clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    /// Position-size scale; 1.0 when scaling is disabled
    pub fn position_scale_factor(&self, risk_score: f64) -> f64 {
        if !self.risk_based_scaling {
            return 1.0;
        }
        position_scale_for(risk_score)
    }
}

/// >80 blocks, 60-80 halves, <30 allows 1.2x, otherwise 1.0
pub fn position_scale_for(risk_score: f64) -> f64 {
    let Some(risk_score) = sanitize_risk_score(risk_score) else {
        return 0.0;
    };
    if risk_score > 80.0 {
        0.0
    } else if risk_score >= 60.0 {
        0.5
    } else if risk_score < 30.0 {
        1.2
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_is_strictly_above_threshold() {
        let policy = RiskPolicy::default();
        assert!(policy.is_override(85.0));
        assert!(!policy.is_override(80.0));
    }

    #[test]
    fn test_dampening_never_negative() {
        let policy = RiskPolicy {
            risk_adjustment_factor: 2.0,
            ..RiskPolicy::default()
        };
        assert!((policy.confidence_multiplier(25.0) - 0.5).abs() < 1e-12);
        assert_eq!(policy.confidence_multiplier(90.0), 0.0);
        assert_eq!(policy.confidence_multiplier(f64::NAN), 0.0);
    }

    #[test]
    fn test_out_of_range_scores() {
        let policy = RiskPolicy::default();
        assert!(policy.is_override(f64::NAN));
        assert!(policy.is_override(f64::INFINITY));
        assert_eq!(position_scale_for(f64::NAN), 0.0);

        // negative scores clamp to 0 and never amplify
        assert!(!policy.is_override(-100.0));
        assert_eq!(policy.confidence_multiplier(-100.0), 1.0);
        assert_eq!(position_scale_for(-100.0), 1.2);
        assert_eq!(sanitize_risk_score(250.0), Some(100.0));
        assert!(policy.is_override(250.0));
    }

    #[test]
    fn test_position_scale_bands() {
        assert_eq!(position_scale_for(81.0), 0.0);
        assert_eq!(position_scale_for(80.0), 0.5);
        assert_eq!(position_scale_for(60.0), 0.5);
        assert_eq!(position_scale_for(45.0), 1.0);
        assert_eq!(position_scale_for(30.0), 1.0);
        assert_eq!(position_scale_for(10.0), 1.2);

        let disabled = RiskPolicy {
            risk_based_scaling: false,
            ..RiskPolicy::default()
        };
        assert_eq!(disabled.position_scale_factor(95.0), 1.0);
    }
}
