use std::time::{Duration, Instant};

use energy_saver::{Action, ApplianceState, OccupancyController};

const TIMEOUT: Duration = Duration::from_secs(10);

fn at(t0: Instant, millis: u64) -> Instant {
    t0 + Duration::from_millis(millis)
}

/// Tick once per second from `from` to `to` seconds, returning the state
/// after each tick and every action emitted.
fn tick_range(
    ctl: &mut OccupancyController,
    t0: Instant,
    from: u64,
    to: u64,
) -> (Vec<(u64, ApplianceState)>, Vec<(u64, Action)>) {
    let mut states = Vec::new();
    let mut actions = Vec::new();
    for s in from..=to {
        if let Some(action) = ctl.tick(at(t0, s * 1000)).action {
            actions.push((s, action));
        }
        states.push((s, ctl.state()));
    }
    (states, actions)
}

#[test]
fn single_motion_then_silence() {
    let t0 = Instant::now();
    let mut ctl = OccupancyController::new(TIMEOUT, t0);
    ctl.on_evidence(true, t0);

    let (states, actions) = tick_range(&mut ctl, t0, 0, 15);
    for (s, state) in states {
        let expected = if s < 10 {
            ApplianceState::On
        } else {
            ApplianceState::Off
        };
        assert_eq!(state, expected, "state at {}s", s);
    }
    assert_eq!(actions, vec![(10, Action::TurnOff)]);
}

#[test]
fn later_motion_postpones_shutdown() {
    let t0 = Instant::now();
    let mut ctl = OccupancyController::new(TIMEOUT, t0);
    ctl.on_evidence(true, t0);
    let (_, early) = tick_range(&mut ctl, t0, 1, 4);
    assert!(early.is_empty());

    assert!(ctl.on_evidence(true, at(t0, 5_000)).action.is_none());
    let (_, actions) = tick_range(&mut ctl, t0, 5, 20);
    assert_eq!(actions, vec![(15, Action::TurnOff)]);
}

#[test]
fn timeout_boundary_is_inclusive() {
    let t0 = Instant::now();
    let mut ctl = OccupancyController::new(TIMEOUT, t0);
    assert!(ctl.tick(at(t0, 9_999)).action.is_none());
    assert_eq!(ctl.tick(at(t0, 10_000)).action, Some(Action::TurnOff));
}

#[test]
fn reactivation_is_immediate_after_any_idle_time() {
    for idle_secs in [10u64, 11, 600, 86_400] {
        let t0 = Instant::now();
        let mut ctl = OccupancyController::new(TIMEOUT, t0);
        ctl.tick(at(t0, idle_secs * 1000));
        assert_eq!(ctl.state(), ApplianceState::Off);
        let decision = ctl.on_evidence(true, at(t0, idle_secs * 1000 + 1));
        assert_eq!(decision.action, Some(Action::TurnOn));
        assert_eq!(ctl.state(), ApplianceState::On);
    }
}

#[test]
fn evidence_refreshes_clock_in_both_states() {
    let t0 = Instant::now();
    let mut ctl = OccupancyController::new(TIMEOUT, t0);
    ctl.on_evidence(true, at(t0, 3_000));
    assert_eq!(ctl.idle(at(t0, 3_000)), Duration::ZERO);

    ctl.tick(at(t0, 13_000));
    assert_eq!(ctl.state(), ApplianceState::Off);
    ctl.on_evidence(true, at(t0, 20_000));
    assert_eq!(ctl.remaining(at(t0, 20_000)), TIMEOUT);
}

#[test]
fn repeated_actuation_requests_emit_once() {
    let t0 = Instant::now();
    let mut ctl = OccupancyController::new(TIMEOUT, t0);
    let offs: Vec<_> = (0..3).filter_map(|_| ctl.turn_off().action).collect();
    assert_eq!(offs, vec![Action::TurnOff]);
    let ons: Vec<_> = (0..3u64)
        .filter_map(|i| ctl.on_evidence(true, at(t0, i)).action)
        .collect();
    assert_eq!(ons, vec![Action::TurnOn]);
}
