//! Occupancy state machine.
//!
//! Fuses per-frame motion evidence with a no-motion timeout into a two-state
//! appliance decision. Pure logic: no I/O, no clock reads. Callers pass the
//! current instant and carry out the returned `Decision`.
//!
//! Invariant: the appliance is `Off` only when the time since the last
//! evidence is at least the timeout, and evidence always switches it `On` in
//! the same step.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Power state of the lights and fans, switched together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplianceState {
    On,
    Off,
}

impl ApplianceState {
    pub fn is_on(self) -> bool {
        matches!(self, ApplianceState::On)
    }
}

impl std::fmt::Display for ApplianceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ApplianceState::On => "ON",
            ApplianceState::Off => "OFF",
        })
    }
}

/// Command for the actuator sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "ON")]
    TurnOn,
    #[serde(rename = "OFF")]
    TurnOff,
}

impl Action {
    /// State reached once the action is carried out.
    pub fn target(self) -> ApplianceState {
        match self {
            Action::TurnOn => ApplianceState::On,
            Action::TurnOff => ApplianceState::Off,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.target().fmt(f)
    }
}

/// When evidence during an already-on period is written to the event history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLogging {
    /// Every evidence observation produces a record.
    #[default]
    EveryTick,
    /// Only evidence that switches the appliance on produces a record.
    TransitionsOnly,
}

/// Event history entry requested by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub motion_detected: bool,
    pub action: Option<Action>,
}

/// Outcome of one controller step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    pub action: Option<Action>,
    pub log: Option<LogEntry>,
}

impl Decision {
    pub fn none() -> Self {
        Self::default()
    }

    fn transition(action: Action) -> Self {
        Self {
            action: Some(action),
            log: Some(LogEntry {
                motion_detected: action == Action::TurnOn,
                action: Some(action),
            }),
        }
    }

    fn record_only(motion_detected: bool) -> Self {
        Self {
            action: None,
            log: Some(LogEntry {
                motion_detected,
                action: None,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.log.is_none()
    }
}

/// Two-state occupancy controller. Starts `On` with the idle clock at `now`.
#[derive(Clone, Debug)]
pub struct OccupancyController {
    state: ApplianceState,
    last_evidence: Instant,
    timeout: Duration,
    evidence_logging: EvidenceLogging,
}

impl OccupancyController {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            state: ApplianceState::On,
            last_evidence: now,
            timeout,
            evidence_logging: EvidenceLogging::default(),
        }
    }

    pub fn with_evidence_logging(mut self, mode: EvidenceLogging) -> Self {
        self.evidence_logging = mode;
        self
    }

    pub fn state(&self) -> ApplianceState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_evidence(&self) -> Instant {
        self.last_evidence
    }

    pub fn evidence_logging(&self) -> EvidenceLogging {
        self.evidence_logging
    }

    /// Time since the last evidence.
    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_evidence)
    }

    /// Time left before the timeout fires, zero once it has elapsed.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.timeout.saturating_sub(self.idle(now))
    }

    /// Feed one evidence observation.
    ///
    /// Evidence refreshes the idle clock and switches the appliance on if it
    /// is off. Absence of evidence runs the timeout check.
    pub fn on_evidence(&mut self, detected: bool, now: Instant) -> Decision {
        if !detected {
            return self.tick(now);
        }

        self.last_evidence = now;
        match self.state {
            ApplianceState::Off => {
                self.state = ApplianceState::On;
                Decision::transition(Action::TurnOn)
            }
            ApplianceState::On => match self.evidence_logging {
                EvidenceLogging::EveryTick => Decision::record_only(true),
                EvidenceLogging::TransitionsOnly => Decision::none(),
            },
        }
    }

    /// Timeout check, independent of frame arrival.
    pub fn tick(&mut self, now: Instant) -> Decision {
        if self.state.is_on() && self.idle(now) >= self.timeout {
            self.state = ApplianceState::Off;
            return Decision::transition(Action::TurnOff);
        }
        Decision::none()
    }

    /// Switch on without evidence. No-op when already on.
    pub fn turn_on(&mut self, now: Instant) -> Decision {
        if self.state.is_on() {
            return Decision::none();
        }
        self.state = ApplianceState::On;
        // A manual switch-on starts a fresh idle period.
        self.last_evidence = now;
        Decision::transition(Action::TurnOn)
    }

    /// Switch off regardless of the idle clock. No-op when already off.
    pub fn turn_off(&mut self) -> Decision {
        if !self.state.is_on() {
            return Decision::none();
        }
        self.state = ApplianceState::Off;
        Decision::transition(Action::TurnOff)
    }

    /// Restart the idle clock without changing state.
    pub fn reset_timer(&mut self, now: Instant) {
        self.last_evidence = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn at(t0: Instant, secs: u64) -> Instant {
        t0 + Duration::from_secs(secs)
    }

    #[test]
    fn starts_on_with_clock_at_creation() {
        let t0 = Instant::now();
        let ctl = OccupancyController::new(TIMEOUT, t0);
        assert_eq!(ctl.state(), ApplianceState::On);
        assert_eq!(ctl.last_evidence(), t0);
        assert_eq!(ctl.remaining(at(t0, 4)), Duration::from_secs(6));
    }

    #[test]
    fn timeout_turns_off_once() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        let decision = ctl.tick(at(t0, 10));
        assert_eq!(decision.action, Some(Action::TurnOff));
        assert_eq!(
            decision.log,
            Some(LogEntry {
                motion_detected: false,
                action: Some(Action::TurnOff)
            })
        );
        // Off stays off without repeating the record.
        assert!(ctl.tick(at(t0, 11)).is_empty());
        assert!(ctl.tick(at(t0, 60)).is_empty());
    }

    #[test]
    fn idle_below_timeout_keeps_on() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        assert!(ctl.tick(t0 + Duration::from_millis(9_999)).is_empty());
        assert_eq!(ctl.state(), ApplianceState::On);
    }

    #[test]
    fn evidence_while_off_turns_on_immediately() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        ctl.tick(at(t0, 10));
        let decision = ctl.on_evidence(true, at(t0, 3_600));
        assert_eq!(decision.action, Some(Action::TurnOn));
        assert_eq!(
            decision.log,
            Some(LogEntry {
                motion_detected: true,
                action: Some(Action::TurnOn)
            })
        );
        assert_eq!(ctl.state(), ApplianceState::On);
        assert_eq!(ctl.last_evidence(), at(t0, 3_600));
    }

    #[test]
    fn evidence_while_on_records_every_tick_by_default() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        for s in 1..4 {
            let decision = ctl.on_evidence(true, at(t0, s));
            assert_eq!(decision.action, None);
            assert_eq!(
                decision.log,
                Some(LogEntry {
                    motion_detected: true,
                    action: None
                })
            );
        }
    }

    #[test]
    fn transitions_only_mode_skips_steady_evidence() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0)
            .with_evidence_logging(EvidenceLogging::TransitionsOnly);
        assert!(ctl.on_evidence(true, at(t0, 1)).is_empty());
        assert_eq!(ctl.last_evidence(), at(t0, 1));
        ctl.tick(at(t0, 11));
        assert_eq!(
            ctl.on_evidence(true, at(t0, 12)).action,
            Some(Action::TurnOn)
        );
    }

    #[test]
    fn no_evidence_runs_timeout_check() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        assert!(ctl.on_evidence(false, at(t0, 5)).is_empty());
        assert_eq!(ctl.last_evidence(), t0);
        assert_eq!(
            ctl.on_evidence(false, at(t0, 10)).action,
            Some(Action::TurnOff)
        );
    }

    #[test]
    fn manual_transitions_are_idempotent() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        assert!(ctl.turn_on(at(t0, 1)).is_empty());
        assert_eq!(ctl.last_evidence(), t0);

        assert_eq!(ctl.turn_off().action, Some(Action::TurnOff));
        assert!(ctl.turn_off().is_empty());
        assert_eq!(ctl.state(), ApplianceState::Off);

        assert_eq!(ctl.turn_on(at(t0, 2)).action, Some(Action::TurnOn));
        assert!(ctl.turn_on(at(t0, 3)).is_empty());
        assert_eq!(ctl.last_evidence(), at(t0, 2));
    }

    #[test]
    fn reset_timer_postpones_timeout() {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        ctl.reset_timer(at(t0, 8));
        assert!(ctl.tick(at(t0, 12)).is_empty());
        assert_eq!(ctl.tick(at(t0, 18)).action, Some(Action::TurnOff));
    }

    #[test]
    fn clock_never_runs_backwards() {
        let t0 = Instant::now();
        let ctl = OccupancyController::new(TIMEOUT, at(t0, 5));
        assert_eq!(ctl.idle(t0), Duration::ZERO);
        assert_eq!(ctl.remaining(t0), TIMEOUT);
    }

    #[test]
    fn action_serializes_as_on_off() {
        assert_eq!(serde_json::to_string(&Action::TurnOn).unwrap(), "\"ON\"");
        assert_eq!(serde_json::to_string(&Action::TurnOff).unwrap(), "\"OFF\"");
        assert_eq!(Action::TurnOff.to_string(), "OFF");
    }
}
