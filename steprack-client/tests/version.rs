// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;

#[test]
fn system_version_tree() {
    let ctrl = start_reference();
    let ver = ctrl.version().unwrap();
    assert_eq!(ver.system().unwrap().version, 3.17);
    assert_eq!(ver.system().unwrap().timestamp, "Tue Feb 16 10:57:37 2016");
    assert_eq!(ver.controller().unwrap().version, 3.17);
    assert_eq!(ver.controller_component("DSP").unwrap().version, 3.67);
    assert_eq!(ver.controller_component("MCPU1").unwrap().version, 1.19);
    assert_eq!(ver.driver().unwrap().version, 3.17);
}

#[test]
fn bare_version_number() {
    let ctrl = start_reference();
    assert_eq!(ctrl.fver().unwrap(), 3.17);
}

#[test]
fn axis_version_has_driver_components() {
    let ctrl = start_reference();
    let ver = ctrl.axis(1).unwrap().version().unwrap();
    assert_eq!(ver.driver_component("DSP").unwrap().version, 3.67);
    assert_eq!(ver.driver_component("IO").unwrap().version, 1.0);
}

#[test]
fn version_display_reparses_identically() {
    let ctrl = start_reference();
    let ver = ctrl.version().unwrap();
    let rendered = ver.to_string();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(steprack_protocol::FirmwareVersion::parse(&lines), ver);
}

#[test]
fn check_version_accepts_pinned_release() {
    let ctrl = start_reference();
    assert_eq!(ctrl.check_version().unwrap(), 3.17);
}

#[test]
fn saved_version_readable() {
    let ctrl = start_reference();
    let ver = ctrl.version_saved().unwrap();
    assert_eq!(ver.system().unwrap().version, 3.17);
}
