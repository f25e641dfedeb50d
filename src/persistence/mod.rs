use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::models::Action;

/// Checks remembered in `PersistenceState::history`
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Same action for `required_value` consecutive checks
    TickCount,
    /// Same action for `required_value` minutes of bar time
    TimeDuration,
    /// Pass-through: every directional action executes
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mode: PersistenceMode,
    pub required_value: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistenceMode::TickCount,
            required_value: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceRecord {
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub counter: u64,
}

/// Everything the tracker knows, exportable to an external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceState {
    pub mode: PersistenceMode,
    pub required_value: u64,
    pub current_signal: Option<Action>,
    pub counter: u64,
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: VecDeque<PersistenceRecord>,
}

impl PersistenceState {
    fn new(config: PersistenceConfig) -> Self {
        Self {
            mode: config.mode,
            required_value: config.required_value,
            current_signal: None,
            counter: 0,
            window_start: None,
            history: VecDeque::new(),
        }
    }
}

/// Result of one persistence check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceCheck {
    /// Normalised action being tracked
    pub action: Action,
    pub counter: u64,
    pub elapsed_minutes: f64,
    pub should_execute: bool,
    pub reason: String,
}

/// Confirmation gate: an action must stay the same for N checks or M
/// minutes before it becomes executable.
///
/// One tracker per instrument. Hold and skip are the same tracked value and
/// never execute.
#[derive(Debug, Clone)]
pub struct PersistenceTracker {
    state: PersistenceState,
}

impl PersistenceTracker {
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            state: PersistenceState::new(config),
        }
    }

    /// Resume from a previously exported state
    pub fn from_state(mut state: PersistenceState) -> Self {
        while state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }
        Self { state }
    }

    pub fn state(&self) -> &PersistenceState {
        &self.state
    }

    pub fn export_state(&self) -> PersistenceState {
        self.state.clone()
    }

    pub fn mode(&self) -> PersistenceMode {
        self.state.mode
    }

    pub fn reset(&mut self) {
        let config = PersistenceConfig {
            mode: self.state.mode,
            required_value: self.state.required_value,
        };
        self.state = PersistenceState::new(config);
    }

    /// Record `action` observed at `at` and decide whether it may execute
    pub fn check(&mut self, action: Action, at: DateTime<Utc>) -> PersistenceCheck {
        let action = action.normalized();
        let state = &mut self.state;

        if state.current_signal == Some(action) {
            state.counter += 1;
        } else {
            if let Some(previous) = state.current_signal {
                tracing::debug!(
                    "Persistence reset: {} -> {} after {} checks",
                    previous,
                    action,
                    state.counter
                );
            }
            state.current_signal = Some(action);
            state.counter = 1;
            state.window_start = Some(at);
        }

        let elapsed_minutes = state
            .window_start
            .map(|start| ((at - start).num_seconds() as f64 / 60.0).max(0.0))
            .unwrap_or(0.0);

        state.history.push_back(PersistenceRecord {
            action,
            timestamp: at,
            counter: state.counter,
        });
        while state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }

        let required = state.required_value;
        let (met, progress) = match state.mode {
            PersistenceMode::TickCount => (
                state.counter >= required,
                format!("{}/{} checks", state.counter, required),
            ),
            PersistenceMode::TimeDuration => (
                elapsed_minutes >= required as f64,
                format!("{:.1}/{} minutes", elapsed_minutes, required),
            ),
            PersistenceMode::Disabled => (true, "persistence disabled".to_string()),
        };

        let should_execute = met && action.is_directional();
        let reason = if !action.is_directional() {
            format!("{} is never executable ({})", action, progress)
        } else if should_execute {
            format!("{} confirmed ({})", action, progress)
        } else {
            format!("{} awaiting confirmation ({})", action, progress)
        };

        if should_execute && state.mode != PersistenceMode::Disabled {
            tracing::info!("Persistence gate open for {}: {}", action, progress);
        }

        PersistenceCheck {
            action,
            counter: state.counter,
            elapsed_minutes,
            should_execute,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn ticks(required: u64) -> PersistenceTracker {
        PersistenceTracker::new(PersistenceConfig {
            mode: PersistenceMode::TickCount,
            required_value: required,
        })
    }

    #[test]
    fn test_three_ticks_to_execute() {
        let mut tracker = ticks(3);
        assert!(!tracker.check(Action::Buy, t0()).should_execute);
        assert!(!tracker.check(Action::Buy, t0()).should_execute);
        let third = tracker.check(Action::Buy, t0());
        assert!(third.should_execute);
        assert_eq!(third.counter, 3);
    }

    #[test]
    fn test_change_resets_counter() {
        let mut tracker = ticks(3);
        tracker.check(Action::Buy, t0());
        tracker.check(Action::Buy, t0());
        let flipped = tracker.check(Action::Sell, t0());
        assert_eq!(flipped.counter, 1);
        assert!(!flipped.should_execute);
        assert_eq!(tracker.state().current_signal, Some(Action::Sell));
    }

    #[test]
    fn test_hold_and_skip_are_one_value_and_never_execute() {
        let mut tracker = ticks(2);
        tracker.check(Action::Hold, t0());
        let check = tracker.check(Action::Skip, t0());
        assert_eq!(check.counter, 2);
        assert_eq!(check.action, Action::Hold);
        assert!(!check.should_execute);
    }

    #[test]
    fn test_time_duration_mode() {
        let mut tracker = PersistenceTracker::new(PersistenceConfig {
            mode: PersistenceMode::TimeDuration,
            required_value: 15,
        });
        assert!(!tracker.check(Action::Sell, t0()).should_execute);
        assert!(!tracker.check(Action::Sell, t0() + Duration::minutes(10)).should_execute);
        let later = tracker.check(Action::Sell, t0() + Duration::minutes(15));
        assert!(later.should_execute);
        assert_eq!(later.elapsed_minutes, 15.0);
        // change restarts the window
        let changed = tracker.check(Action::Buy, t0() + Duration::minutes(20));
        assert_eq!(changed.elapsed_minutes, 0.0);
        assert!(!changed.should_execute);
    }

    #[test]
    fn test_disabled_passes_directional_through() {
        let mut tracker = PersistenceTracker::new(PersistenceConfig {
            mode: PersistenceMode::Disabled,
            required_value: 0,
        });
        assert!(tracker.check(Action::Buy, t0()).should_execute);
        assert!(!tracker.check(Action::Hold, t0()).should_execute);
    }

    #[test]
    fn test_history_bounded_and_state_round_trip() {
        let mut tracker = ticks(3);
        for i in 0..150 {
            tracker.check(Action::Buy, t0() + Duration::minutes(i));
        }
        assert_eq!(tracker.state().history.len(), HISTORY_LIMIT);
        assert_eq!(tracker.state().counter, 150);

        let json = serde_json::to_string(&tracker.export_state()).unwrap();
        let restored: PersistenceState = serde_json::from_str(&json).unwrap();
        let mut resumed = PersistenceTracker::from_state(restored);
        let check = resumed.check(Action::Buy, t0() + Duration::minutes(150));
        assert_eq!(check.counter, 151);
        assert!(check.should_execute);

        resumed.reset();
        assert_eq!(resumed.state().counter, 0);
        assert_eq!(resumed.state().current_signal, None);
    }
}
