// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Controller configuration backups.
//!
//! A backup is an INI-style snapshot: `GENERAL` (date), `SYSTEM`
//! (host/port/version), `CONTROLLER` (component versions) and one
//! `AXIS_<n>` section per axis with the active flag, driver versions, the
//! full `?CFG` dump, the attribute registers and, below firmware 3, the
//! `DISDIS` setting. `check` re-reads the live system and reports the
//! differing keys per section.

use crate::axis::Axis;
use crate::controller::Controller;
use crate::error::{Error, Result};
use chrono::Local;
use configparser::ini::Ini;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use steprack_protocol::{InfoPort, PositionRegister};
use tracing::{info, warn};

/// Placeholder recorded for attributes the axis could not answer.
pub const UNKNOWN: &str = "Unknown";

const KEY_NOT_IN_BACKUP: &str = "KeyNotFoundInBackup";
const KEY_NOT_IN_SYSTEM: &str = "KeyNotFoundInSystem";

/// Ordered section → key → value snapshot.
type Snapshot = BTreeMap<String, BTreeMap<String, String>>;

/// One differing key within a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub key: String,
    pub backup: String,
    pub current: String,
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: backup({}) != system({})",
            self.key, self.backup, self.current
        )
    }
}

fn axis_section(addr: u16) -> String {
    format!("AXIS_{addr}")
}

fn read_or_unknown(label: &str, addr: u16, value: Result<String>) -> String {
    match value {
        Ok(v) => v,
        Err(e) => {
            warn!(axis = addr, "cannot read {label}: {e}");
            UNKNOWN.to_string()
        }
    }
}

fn snapshot_axis(axis: &Axis, section: &mut BTreeMap<String, String>) -> Result<()> {
    let addr = axis.addr();
    let active = axis.is_active()?;
    section.insert("ACTIVE".into(), if active { "YES" } else { "NO" }.into());
    if !active {
        warn!(axis = addr, "driver is not active, some reads will fail");
    }

    let ver = axis.version()?;
    for (component, version) in ver.driver_components() {
        section.insert(format!("VER_{component}"), version.to_string());
    }
    let driver_ver = ver.driver().map(|leaf| leaf.version).unwrap_or(-1.0);

    for (param, value) in axis.get_cfg(None)? {
        section.insert(format!("CFG_{param}"), value);
    }

    section.insert(
        "NAME".into(),
        read_or_unknown("name", addr, axis.name()),
    );
    section.insert(
        "VELOCITY".into(),
        read_or_unknown("velocity", addr, axis.velocity().map(|v| v.to_string())),
    );
    section.insert(
        "ACCTIME".into(),
        read_or_unknown("acctime", addr, axis.acctime().map(|v| v.to_string())),
    );
    section.insert(
        "PCLOOP".into(),
        read_or_unknown(
            "pcloop",
            addr,
            axis.pcloop().map(|on| if on { "ON" } else { "OFF" }.to_string()),
        ),
    );
    section.insert(
        "INDEXER".into(),
        read_or_unknown("indexer", addr, axis.indexer().map(|s| s.to_string())),
    );
    section.insert(
        "ID".into(),
        read_or_unknown("id", addr, axis.id().map(|(hw, sn)| format!("{hw} {sn}"))),
    );

    for register in PositionRegister::ALL {
        section.insert(
            format!("POS_{register}"),
            read_or_unknown("pos", addr, axis.get_pos(*register).map(|v| v.to_string())),
        );
        section.insert(
            format!("ENC_{register}"),
            read_or_unknown("enc", addr, axis.get_enc(*register).map(|v| v.to_string())),
        );
    }

    // Signal wiring and the newer attributes only exist from firmware 3 on.
    let v3_ports = [
        InfoPort::InfoA,
        InfoPort::InfoB,
        InfoPort::InfoC,
        InfoPort::OutPos,
        InfoPort::OutPAux,
        InfoPort::SyncPos,
        InfoPort::SyncAux,
    ];
    if driver_ver >= 3.0 {
        for port in v3_ports {
            section.insert(
                port.to_string(),
                read_or_unknown(
                    "signal",
                    addr,
                    axis.get_signal_cfg(port)
                        .map(|(sig, pol)| format!("{sig} {pol}")),
                ),
            );
        }
        section.insert(
            "CSWITCH".into(),
            read_or_unknown("cswitch", addr, axis.cswitch()),
        );
        section.insert(
            "ECAM".into(),
            read_or_unknown("ecam", addr, axis.ecam()),
        );
    } else {
        // External-disable lives in a dedicated command below firmware 3.
        let disdis = axis
            .controller()
            .send_cmd(&format!("{addr}:?DISDIS"))
            .and_then(|reply| reply.into_tokens())
            .map(|tokens| tokens.join(" "));
        section.insert("DISDIS".into(), read_or_unknown("disdis", addr, disdis));
    }
    Ok(())
}

fn snapshot(ctrl: &Controller, axes: &[u16]) -> Result<Snapshot> {
    let mut snap = Snapshot::new();

    let mut system = BTreeMap::new();
    system.insert("HOST".to_string(), ctrl.host());
    system.insert("PORT".to_string(), ctrl.port().to_string());
    let ver = ctrl.version()?;
    let system_ver = ver
        .system()
        .map(|leaf| leaf.version)
        .ok_or_else(|| Error::Protocol("version reply carries no SYSTEM line".into()))?;
    system.insert("VERSION".to_string(), system_ver.to_string());
    snap.insert("SYSTEM".into(), system);

    let mut controller = BTreeMap::new();
    for (component, version) in ver.controller_components() {
        controller.insert(format!("VER_{component}"), version.to_string());
    }
    snap.insert("CONTROLLER".into(), controller);

    for addr in axes {
        let axis = ctrl.axis(*addr)?;
        let mut section = BTreeMap::new();
        snapshot_axis(&axis, &mut section)?;
        snap.insert(axis_section(*addr), section);
    }
    Ok(snap)
}

fn write_snapshot(snap: &Snapshot, general: bool, path: &Path) -> Result<()> {
    let mut out = String::from("# File auto-generated by the steprack backup tool.\n\n");
    if general {
        let now = Local::now();
        out.push_str("[GENERAL]\n");
        out.push_str(&format!("DATE = {}\n", now.format("%Y/%m/%d")));
        out.push_str(&format!("TIME = {}\n\n", now.format("%H:%M:%S %z")));
    }
    for (section, keys) in snap {
        out.push_str(&format!("[{section}]\n"));
        for (key, value) in keys {
            out.push_str(&format!("{key} = {value}\n"));
        }
        out.push('\n');
    }
    std::fs::write(path, out)
        .map_err(|e| Error::Usage(format!("cannot write backup {}: {e}", path.display())))
}

fn load_backup(path: &Path) -> Result<Snapshot> {
    let mut ini = Ini::new_cs();
    let map = ini
        .load(path)
        .map_err(|e| Error::Usage(format!("cannot read backup {}: {e}", path.display())))?;
    let mut snap = Snapshot::new();
    for (section, keys) in map {
        let mut out = BTreeMap::new();
        for (key, value) in keys {
            out.insert(key, value.unwrap_or_default());
        }
        snap.insert(section, out);
    }
    Ok(snap)
}

/// Axis addresses recorded in a backup file.
pub fn backup_axes(path: &Path) -> Result<Vec<u16>> {
    let snap = load_backup(path)?;
    let mut axes = Vec::new();
    for section in snap.keys() {
        if let Some(addr) = section.strip_prefix("AXIS_") {
            axes.push(addr.parse().map_err(|_| {
                Error::Usage(format!("bad axis section {section:?} in backup"))
            })?);
        }
    }
    axes.sort_unstable();
    Ok(axes)
}

/// Snapshot the controller (or the given axes) into `path`.
pub fn save(ctrl: &Controller, path: &Path, axes: &[u16]) -> Result<()> {
    let axes = if axes.is_empty() {
        ctrl.find_axes(true)?
    } else {
        axes.to_vec()
    };
    info!(file = %path.display(), ?axes, "saving backup");
    let snap = snapshot(ctrl, &axes)?;
    write_snapshot(&snap, true, path)
}

/// Diff two values the way operators read them: trimmed,
/// case-insensitive.
fn same_value(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn diff_section(
    backup: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Vec<Diff> {
    let mut diffs = Vec::new();
    for (key, value) in backup {
        match current.get(key) {
            None => diffs.push(Diff {
                key: key.clone(),
                backup: value.clone(),
                current: KEY_NOT_IN_SYSTEM.into(),
            }),
            Some(live) if !same_value(value, live) => diffs.push(Diff {
                key: key.clone(),
                backup: value.clone(),
                current: live.clone(),
            }),
            Some(_) => {}
        }
    }
    for (key, live) in current {
        if !backup.contains_key(key) {
            diffs.push(Diff {
                key: key.clone(),
                backup: KEY_NOT_IN_BACKUP.into(),
                current: live.clone(),
            });
        }
    }
    diffs
}

/// Compare a backup file against the live system. Returns the differing
/// keys per section; an empty map means the system matches the backup.
pub fn check(ctrl: &Controller, path: &Path, axes: &[u16]) -> Result<BTreeMap<String, Vec<Diff>>> {
    let mut saved = load_backup(path)?;
    saved.remove("GENERAL");

    let file_axes = backup_axes(path)?;
    let axes: Vec<u16> = if axes.is_empty() {
        file_axes
    } else {
        for addr in axes {
            if !file_axes.contains(addr) {
                return Err(Error::Usage(format!("there is no backup for axis {addr}")));
            }
        }
        // Restrict the comparison to the requested axes.
        saved.retain(|section, _| {
            !section.starts_with("AXIS_")
                || axes.contains(
                    &section[5..].parse::<u16>().unwrap_or(u16::MAX),
                )
        });
        axes.to_vec()
    };

    info!(host = %ctrl.host(), ?axes, "checking backup");
    let live = snapshot(ctrl, &axes)?;
    let mut diffs = BTreeMap::new();
    for (section, saved_keys) in &saved {
        let empty = BTreeMap::new();
        let live_keys = live.get(section).unwrap_or(&empty);
        let section_diffs = diff_section(saved_keys, live_keys);
        if !section_diffs.is_empty() {
            diffs.insert(section.clone(), section_diffs);
        }
    }
    if diffs.is_empty() {
        info!("no differences found");
    }
    Ok(diffs)
}

/// Re-activate the axes recorded in a backup: enter configuration mode,
/// write the active flag and sign the change.
pub fn activate_axes(ctrl: &Controller, path: &Path, force: bool) -> Result<()> {
    let snap = load_backup(path)?;
    for (section, keys) in &snap {
        let Some(addr) = section.strip_prefix("AXIS_") else {
            continue;
        };
        let addr: u16 = addr
            .parse()
            .map_err(|_| Error::Usage(format!("bad axis section {section:?} in backup")))?;
        let active = force
            || keys
                .get("ACTIVE")
                .is_some_and(|v| v.eq_ignore_ascii_case("YES"));
        let axis = ctrl.axis(addr)?;
        let cfg = if active { "YES" } else { "NO" };
        info!(axis = addr, active = cfg, "activating");
        axis.set_config(None)?;
        axis.set_cfg(&["ACTIVE", cfg])?;
        axis.set_config(Some(&format!("conf{addr:03}")))?;
    }
    Ok(())
}
