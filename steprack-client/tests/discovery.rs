// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;
use steprack_client::Error;

#[test]
fn find_alive_axes() {
    let ctrl = start_reference();
    assert_eq!(ctrl.find_axes(true).unwrap(), vec![1, 5, 151]);
}

#[test]
fn find_present_axes_includes_dead_board() {
    let ctrl = start_reference();
    assert_eq!(ctrl.find_axes(false).unwrap(), vec![1, 5, 151, 152]);
}

#[test]
fn find_racks() {
    let ctrl = start_reference();
    assert_eq!(ctrl.find_racks().unwrap(), vec![0, 15]);
}

#[test]
fn auto_populate_registers_alive_axes() {
    let ctrl = start_reference();
    assert!(ctrl.axes().is_empty());
    assert_eq!(ctrl.auto_populate().unwrap(), vec![1, 5, 151]);
    assert_eq!(ctrl.axes(), vec![1, 5, 151]);
}

#[test]
fn update_axes_drops_missing_boards() {
    let ctrl = start_reference();
    // Axis 7 is a valid address but not plugged into the system.
    ctrl.axis(7).unwrap();
    ctrl.axis(1).unwrap();
    assert_eq!(ctrl.axes(), vec![1, 7]);
    ctrl.update_axes().unwrap();
    assert_eq!(ctrl.axes(), vec![1]);
}

#[test]
fn invalid_addresses_rejected_before_io() {
    let ctrl = start_reference();
    for addr in [0u16, 9, 10, 159, 200] {
        assert!(
            matches!(ctrl.axis(addr), Err(Error::Usage(_))),
            "axis {addr} must be rejected"
        );
    }
    assert!(matches!(
        ctrl.get_pos(&[9], steprack_protocol::PositionRegister::Axis),
        Err(Error::Usage(_))
    ));
}

#[test]
fn aliases_follow_axis_lifecycle() {
    let ctrl = start_reference();
    ctrl.add_alias("th", 1).unwrap();
    assert_eq!(ctrl.axis_by_name("th").unwrap().addr(), 1);
    assert_eq!(ctrl.resolve("th").unwrap(), 1);
    assert_eq!(ctrl.resolve("5").unwrap(), 5);

    ctrl.remove_axis(1);
    assert!(matches!(ctrl.axis_by_name("th"), Err(Error::Usage(_))));
}

#[test]
fn aliases_are_case_sensitive() {
    let ctrl = start_reference();
    ctrl.add_alias("th", 1).unwrap();
    assert!(ctrl.axis_by_name("TH").is_err());
    let aliases = ctrl.get_aliases();
    assert_eq!(aliases.get(&1).unwrap(), &vec!["th".to_string()]);
}
