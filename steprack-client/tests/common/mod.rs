// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

use std::time::Duration;
use steprack_client::Controller;
use steprack_simulator::{reference_axes, AxisConfig, Simulator};

/// Boot a simulator on a free port and connect a controller to it.
pub fn start(axes: Vec<AxisConfig>) -> Controller {
    let sim = Simulator::bind("127.0.0.1:0", axes).unwrap();
    let port = sim.port();
    sim.spawn();
    Controller::connect_with_timeout("127.0.0.1", port, Duration::from_secs(5)).unwrap()
}

/// The reference system: axes 1 (`th`, pos 55) and 5 (`tth`, pos -3) on
/// rack 0, powered-off 151 (`chi`) and dead 152 (`phi`) on rack 15.
pub fn start_reference() -> Controller {
    start(reference_axes())
}

/// Two fast axes for motion tests.
pub fn start_fast_axes() -> Controller {
    start(vec![
        AxisConfig::new(1).with_name("th").with_pos(55).with_velocity(1000.0),
        AxisConfig::new(5).with_name("tth").with_pos(-3).with_velocity(1000.0),
    ])
}
