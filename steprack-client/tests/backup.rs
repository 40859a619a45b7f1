// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;
use steprack_client::backup;

#[test]
fn save_then_check_round_trips() {
    let ctrl = start_reference();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("steprack.cfg");

    backup::save(&ctrl, &file, &[1, 5]).unwrap();
    assert!(file.exists());
    assert_eq!(backup::backup_axes(&file).unwrap(), vec![1, 5]);

    let diffs = backup::check(&ctrl, &file, &[]).unwrap();
    assert!(diffs.is_empty(), "fresh backup must match: {diffs:?}");
}

#[test]
fn check_detects_changed_settings() {
    let ctrl = start_reference();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("steprack.cfg");
    backup::save(&ctrl, &file, &[1]).unwrap();

    ctrl.set_velocity(&[(1, 777.0)]).unwrap();
    ctrl.axis(1).unwrap().set_name("renamed").unwrap();

    let diffs = backup::check(&ctrl, &file, &[]).unwrap();
    let axis_diffs = diffs.get("AXIS_1").expect("axis section must differ");
    let keys: Vec<&str> = axis_diffs.iter().map(|d| d.key.as_str()).collect();
    assert!(keys.contains(&"VELOCITY"), "{keys:?}");
    assert!(keys.contains(&"NAME"), "{keys:?}");
    assert!(!diffs.contains_key("SYSTEM"));
}

#[test]
fn check_can_restrict_to_axes() {
    let ctrl = start_reference();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("steprack.cfg");
    backup::save(&ctrl, &file, &[1, 5]).unwrap();

    ctrl.set_velocity(&[(5, 999.0)]).unwrap();

    // Restricted to axis 1, the change on 5 is invisible.
    let diffs = backup::check(&ctrl, &file, &[1]).unwrap();
    assert!(diffs.is_empty(), "{diffs:?}");

    let diffs = backup::check(&ctrl, &file, &[5]).unwrap();
    assert!(diffs.contains_key("AXIS_5"));
}

#[test]
fn check_unknown_axis_rejected() {
    let ctrl = start_reference();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("steprack.cfg");
    backup::save(&ctrl, &file, &[1]).unwrap();
    assert!(backup::check(&ctrl, &file, &[5]).is_err());
}

#[test]
fn backup_contains_expected_sections() {
    let ctrl = start_reference();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("steprack.cfg");
    backup::save(&ctrl, &file, &[1]).unwrap();

    let text = std::fs::read_to_string(&file).unwrap();
    for needle in [
        "[GENERAL]",
        "[SYSTEM]",
        "[CONTROLLER]",
        "[AXIS_1]",
        "VER_DSP",
        "CFG_ACTIVE",
        "POS_AXIS = 55",
        "VELOCITY = 100",
    ] {
        assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
    }
}

#[test]
fn activate_axes_signs_configuration() {
    let ctrl = start_reference();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("steprack.cfg");
    backup::save(&ctrl, &file, &[1]).unwrap();

    backup::activate_axes(&ctrl, &file, true).unwrap();
    let signature = ctrl.axis(1).unwrap().config().unwrap();
    assert_eq!(signature, "CONF001");
}
