// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::{start_fast_axes, start_reference};
use std::time::Duration;
use steprack_client::{ensure_power, Error, Group, RateLimiter};
use steprack_protocol::State;

fn group_of(ctrl: &steprack_client::Controller, addrs: &[u16]) -> Group {
    let axes: Vec<_> = addrs.iter().map(|a| ctrl.axis(*a).unwrap()).collect();
    Group::new(axes).unwrap()
}

#[test]
fn grouped_move_with_progress() {
    let ctrl = start_fast_axes();
    let group = group_of(&ctrl, &[1, 5]);

    group.start_move(&[100, 200]).unwrap();

    let mut limiter = RateLimiter::new(Duration::from_millis(10));
    let mut saw_moving = false;
    let mut last = None;
    for (states, positions) in group.motion() {
        assert_eq!(states.len(), 2);
        assert_eq!(positions.len(), 2);
        if states.iter().any(State::is_moving) {
            saw_moving = true;
        }
        last = Some((states, positions));
        limiter.pace();
    }
    let (states, positions) = last.expect("motion yields at least one sample");
    assert!(saw_moving, "at least one sample must observe motion");
    assert!(!states.iter().any(State::is_moving));
    assert_eq!(positions, vec![100, 200]);
    assert_eq!(group.get_pos(), vec![100, 200]);
}

#[test]
fn stop_and_drain_recovery() {
    let ctrl = start_fast_axes();
    let group = group_of(&ctrl, &[1, 5]);
    // Slow the axes down so the stop lands mid-flight.
    ctrl.set_velocity(&[(1, 50.0), (5, 50.0)]).unwrap();
    group.start_move(&[100_000, 100_000]).unwrap();
    assert!(group.is_moving());

    // The documented recovery: stop the group, then drain a fresh motion
    // iterator until every axis stands still.
    group.start_stop().unwrap();
    for (_, _) in group.motion() {}
    assert!(!group.is_moving());
    let positions = group.get_pos();
    assert!(positions[0] < 100_000, "stop interrupted the move");
}

#[test]
fn wait_stopped_times_out() {
    let ctrl = start_fast_axes();
    let group = group_of(&ctrl, &[1]);
    ctrl.set_velocity(&[(1, 10.0)]).unwrap();
    group.start_move(&[1_000_000]).unwrap();
    assert!(!group.wait_stopped(Some(Duration::from_millis(100)), Duration::from_millis(10)));
    group.start_stop().unwrap();
    assert!(group.wait_stopped(Some(Duration::from_secs(5)), Duration::from_millis(10)));
}

#[test]
fn group_requires_single_controller() {
    let ctrl_a = start_reference();
    let ctrl_b = start_reference();
    let mixed = vec![ctrl_a.axis(1).unwrap(), ctrl_b.axis(5).unwrap()];
    assert!(matches!(Group::new(mixed), Err(Error::Usage(_))));
    assert!(matches!(Group::new(vec![]), Err(Error::Usage(_))));
}

#[test]
fn group_accessors_fall_back_per_axis() {
    let ctrl = start_reference();
    // 152 is present but dead; the one-shot ?POS over [1, 152] works on
    // the simulator, so include an unplugged axis to force the fallback.
    let group = group_of(&ctrl, &[1, 2]);
    let positions = group.get_pos();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0], 55);
    assert_eq!(positions[1], 0, "unreadable axis gets the default");

    let names = group.names();
    assert_eq!(names[0], "th");
    assert_eq!(names[1], "", "unreadable name becomes empty");
}

#[test]
fn ensure_power_flips_only_mismatched_axes() {
    let ctrl = start_reference();
    let group = group_of(&ctrl, &[1, 151]);
    assert_eq!(group.get_power(), vec![true, false]);

    {
        let guard = ensure_power(&group).unwrap();
        assert_eq!(guard.flipped(), &[151]);
        assert_eq!(group.get_power(), vec![true, true]);
    }
    // Restored on drop: 151 back off, 1 untouched.
    assert_eq!(group.get_power(), vec![true, false]);
}

#[test]
fn ensure_power_restores_on_error_path() {
    let ctrl = start_reference();
    let group = group_of(&ctrl, &[1, 151]);

    let result: Result<(), Error> = (|| {
        let _guard = ensure_power(&group)?;
        assert_eq!(group.get_power(), vec![true, true]);
        Err(Error::Command("motion failed".into()))
    })();
    assert!(result.is_err());
    assert_eq!(
        group.get_power(),
        vec![true, false],
        "power restored across the error path"
    );
}

#[test]
fn ensure_power_nests() {
    let ctrl = start_reference();
    let group = group_of(&ctrl, &[151]);

    let outer = ensure_power(&group).unwrap();
    assert_eq!(group.get_power(), vec![true]);
    {
        // The inner scope measures no delta, so its exit changes nothing.
        let inner = ensure_power(&group).unwrap();
        assert!(inner.flipped().is_empty());
    }
    assert_eq!(group.get_power(), vec![true]);
    outer.restore().unwrap();
    assert_eq!(group.get_power(), vec![false]);
}

#[test]
fn strict_move_refused_when_axis_not_ready() {
    let ctrl = start_reference();
    let result = ctrl.move_axes(&[(1, 10), (151, 10)], true, true);
    assert!(matches!(result, Err(Error::Command(_))));
    // Nothing moved.
    assert_eq!(
        ctrl.get_pos(&[1], steprack_protocol::PositionRegister::Axis)
            .unwrap(),
        vec![55]
    );
}

#[test]
fn per_axis_motion_commands() {
    let ctrl = start_fast_axes();
    let axis = ctrl.axis(1).unwrap();
    axis.move_to(60).unwrap();
    let group = group_of(&ctrl, &[1]);
    assert!(group.wait_stopped(Some(Duration::from_secs(5)), Duration::from_millis(5)));
    assert_eq!(axis.pos().unwrap(), 60);

    axis.rmove(-10).unwrap();
    assert!(group.wait_stopped(Some(Duration::from_secs(5)), Duration::from_millis(5)));
    assert_eq!(axis.pos().unwrap(), 50);
}
