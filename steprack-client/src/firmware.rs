// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Firmware programming orchestration.
//!
//! Thin flows over the controller's `*PROG`/`PROG`/`?PROG` primitives:
//! load an image into the master flash, install it on components, and the
//! full update sequence with progress reporting.

use crate::controller::Controller;
use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Timing knobs for [`firmware_update`]. The defaults match the
/// controller's real save/reboot times; tests shrink them.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Grace period after loading an image to the master flash.
    pub save_delay: Duration,
    /// Interval between `?PROG` polls.
    pub poll_interval: Duration,
    /// How long a reboot takes before the controller answers again.
    pub reboot_delay: Duration,
}

impl Default for UpdateConfig {
    fn default() -> UpdateConfig {
        UpdateConfig {
            save_delay: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            reboot_delay: Duration::from_secs(120),
        }
    }
}

/// Load a firmware image into the master flash (`*PROG NONE SAVE` plus
/// the binary block).
pub fn load_firmware(ctrl: &Controller, image: &[u8], config: &UpdateConfig) -> Result<()> {
    ctrl.sprog(image, None, false, true, "")?;
    // The controller is deaf while it commits the image.
    thread::sleep(config.save_delay);
    Ok(())
}

/// Install firmware on `component`. With an image, the code is
/// transferred inline; without, the copy stored in the master flash is
/// used.
pub fn install_firmware(
    ctrl: &Controller,
    component: &str,
    force: bool,
    saving: bool,
    image: Option<&[u8]>,
) -> Result<()> {
    match image {
        Some(data) => ctrl.sprog(data, Some(component), force, saving, ""),
        None => ctrl.prog(component, force),
    }
}

/// Poll the programming status until it reports DONE. The callback
/// receives the progress percentage when the controller publishes one.
pub fn wait_programmed(
    ctrl: &Controller,
    config: &UpdateConfig,
    progress: &mut dyn FnMut(f64),
) -> Result<()> {
    loop {
        match ctrl.get_prog_status() {
            Ok(status) => {
                let phase = status.first().map(String::as_str).unwrap_or("");
                if phase.eq_ignore_ascii_case("DONE") || phase.eq_ignore_ascii_case("OFF") {
                    return Ok(());
                }
                if phase.eq_ignore_ascii_case("ERROR") {
                    return Err(Error::Command("firmware programming failed".into()));
                }
                if let Some(pct) = status.last().and_then(|t| t.parse::<f64>().ok()) {
                    progress(pct);
                }
            }
            Err(Error::Connection(_)) | Err(Error::Timeout(_)) => {
                // The controller drops the link while reprogramming
                // itself; keep polling until it answers again.
                warn!("connection lost while programming, waiting for the controller");
            }
            Err(e) => return Err(e),
        }
        thread::sleep(config.poll_interval);
    }
}

/// Full update sequence: read the running version, switch to PROG mode,
/// load the image, install it everywhere, wait, reboot and return to OPER
/// mode. Returns the previously running system version.
pub fn firmware_update(
    ctrl: &Controller,
    image: &[u8],
    config: &UpdateConfig,
    progress: &mut dyn FnMut(f64),
) -> Result<f64> {
    let current = match ctrl.version() {
        Ok(ver) => ver.system().map(|leaf| leaf.version).unwrap_or(-1.0),
        Err(e) => {
            warn!("cannot read the running version: {e}");
            -1.0
        }
    };
    info!(version = current, "current firmware");

    ctrl.set_mode(steprack_protocol::SystemMode::Prog)?;
    load_firmware(ctrl, image, config)?;
    info!("image loaded to master flash");

    install_firmware(ctrl, "ALL", true, false, None)?;
    if current >= 0.0 && current < 3.17 {
        // Older controllers do not reprogram their MCPUs with ALL.
        for component in ["MCPU0", "MCPU1", "MCPU2"] {
            install_firmware(ctrl, component, false, false, None)?;
        }
    }
    wait_programmed(ctrl, config, progress)?;

    info!("programming done, rebooting");
    ctrl.reboot()?;
    ctrl.disconnect();
    thread::sleep(config.reboot_delay);

    ctrl.set_mode(steprack_protocol::SystemMode::Oper)?;
    if ctrl.mode()? != steprack_protocol::SystemMode::Oper {
        return Err(Error::Command(
            "controller did not return to OPER mode after update".into(),
        ));
    }
    info!("firmware update done");
    Ok(current)
}
