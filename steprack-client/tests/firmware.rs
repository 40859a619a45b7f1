// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;
use std::time::Duration;
use steprack_client::firmware::{self, UpdateConfig};
use steprack_protocol::SystemMode;

fn fast_config() -> UpdateConfig {
    UpdateConfig {
        save_delay: Duration::from_millis(10),
        poll_interval: Duration::from_millis(10),
        reboot_delay: Duration::from_millis(10),
    }
}

#[test]
fn load_firmware_transfers_image() {
    let ctrl = start_reference();
    firmware::load_firmware(&ctrl, &[0xAA; 64], &fast_config()).unwrap();
    // The controller accepted the block and the session still works.
    assert_eq!(ctrl.mode().unwrap(), SystemMode::Oper);
}

#[test]
fn prog_status_polls_until_done() {
    let ctrl = start_reference();
    firmware::install_firmware(&ctrl, "ALL", true, false, None).unwrap();
    let mut seen = Vec::new();
    firmware::wait_programmed(&ctrl, &fast_config(), &mut |pct| seen.push(pct)).unwrap();
    assert!(!seen.is_empty(), "progress must be reported");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
}

#[test]
fn full_update_flow() {
    let ctrl = start_reference();
    let image = vec![0x5Au8; 128];
    let mut progress = Vec::new();
    let previous =
        firmware::firmware_update(&ctrl, &image, &fast_config(), &mut |pct| progress.push(pct))
            .unwrap();
    assert_eq!(previous, 3.17);
    assert_eq!(ctrl.mode().unwrap(), SystemMode::Oper);
}
