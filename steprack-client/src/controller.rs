// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! System-level command surface of one controller.
//!
//! A [`Controller`] is a cheap cloneable handle over a shared session;
//! [`Axis`](crate::Axis) handles and [`Group`](crate::Group)s reference the
//! same session, so closing the controller closes them all.

use crate::axis::Axis;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::parse::{parse_f64, parse_hex_u32, parse_i64, parse_list, parse_on_off};
use crate::session::{Reply, Session};
use crate::MutexExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use steprack_protocol::{
    is_valid_axis, version::supported_versions, AcctimeType, FirmwareVersion, PositionRegister,
    State, SystemMode, VelocityType,
};
use tracing::warn;

pub(crate) struct Inner {
    session: Session,
    known: Mutex<BTreeSet<u16>>,
    aliases: Mutex<HashMap<String, u16>>,
}

/// Handle to one StepRack controller.
#[derive(Clone)]
pub struct Controller {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Controller({}:{})",
            self.inner.session.host(),
            self.inner.session.port()
        )
    }
}

fn join_addrs(addrs: &[u16]) -> Result<String> {
    if addrs.is_empty() {
        return Err(Error::Usage("empty axis list".into()));
    }
    let mut out = String::new();
    for addr in addrs {
        validate_axis(*addr)?;
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&addr.to_string());
    }
    Ok(out)
}

fn join_pairs<T: fmt::Display>(pairs: &[(u16, T)]) -> Result<String> {
    if pairs.is_empty() {
        return Err(Error::Usage("empty axis list".into()));
    }
    let mut out = String::new();
    for (addr, value) in pairs {
        validate_axis(*addr)?;
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("{addr} {value}"));
    }
    Ok(out)
}

pub(crate) fn validate_axis(addr: u16) -> Result<()> {
    if !is_valid_axis(addr) {
        return Err(Error::Usage(format!("bad axis address {addr}")));
    }
    Ok(())
}

impl Controller {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Connect to `host:port` with the default timeout.
    pub fn connect(host: &str, port: u16) -> Result<Controller> {
        Controller::connect_with_timeout(host, port, Controller::DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Controller> {
        let session = Session::connect(host, port, timeout)?;
        Ok(Controller {
            inner: Arc::new(Inner {
                session,
                known: Mutex::new(BTreeSet::new()),
                aliases: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Connect to a `[tcp://]host[:port]` URL (port defaults to 5000).
    pub fn from_url(url: &str) -> Result<Controller> {
        let ep = Endpoint::parse(url)?;
        Controller::connect(&ep.host, ep.port)
    }

    pub fn from_endpoint(ep: &Endpoint) -> Result<Controller> {
        Controller::connect(&ep.host, ep.port)
    }

    pub fn host(&self) -> String {
        self.inner.session.host()
    }

    pub fn port(&self) -> u16 {
        self.inner.session.port()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    pub fn disconnect(&self) {
        self.inner.session.disconnect()
    }

    /// Two handles are the same controller when they share a session.
    pub fn same_controller(&self, other: &Controller) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Raw command escape hatch. Commands follow the programming interface
    /// exactly; the reply is returned parsed but untyped.
    pub fn send_cmd(&self, cmd: &str) -> Result<Reply> {
        self.inner.session.send_cmd(cmd)
    }

    pub(crate) fn send_binary(&self, words: &[u16]) -> Result<()> {
        self.inner.session.send_binary(words)
    }

    // ------------------------------------------------------------------
    // Axis handles and aliases
    // ------------------------------------------------------------------

    /// Get a handle for `addr`, validating the address shape
    /// (`rack*10 + index`, rack 0-15, index 1-8).
    pub fn axis(&self, addr: u16) -> Result<Axis> {
        validate_axis(addr)?;
        self.inner.known.lock_or_panic().insert(addr);
        Ok(Axis::new(self.clone(), addr))
    }

    /// Addresses a handle has been created for, ascending.
    pub fn axes(&self) -> Vec<u16> {
        self.inner.known.lock_or_panic().iter().copied().collect()
    }

    /// Forget an axis; aliases pointing at it are purged too.
    pub fn remove_axis(&self, addr: u16) {
        self.inner.known.lock_or_panic().remove(&addr);
        self.inner
            .aliases
            .lock_or_panic()
            .retain(|_, target| *target != addr);
    }

    /// Register a case-sensitive alias for an axis.
    pub fn add_alias(&self, name: &str, addr: u16) -> Result<()> {
        validate_axis(addr)?;
        self.inner.known.lock_or_panic().insert(addr);
        self.inner
            .aliases
            .lock_or_panic()
            .insert(name.to_string(), addr);
        Ok(())
    }

    /// Aliases per axis address.
    pub fn get_aliases(&self) -> BTreeMap<u16, Vec<String>> {
        let mut out: BTreeMap<u16, Vec<String>> = BTreeMap::new();
        for (name, addr) in self.inner.aliases.lock_or_panic().iter() {
            out.entry(*addr).or_default().push(name.clone());
        }
        for names in out.values_mut() {
            names.sort();
        }
        out
    }

    pub fn axis_by_name(&self, name: &str) -> Result<Axis> {
        let addr = {
            let aliases = self.inner.aliases.lock_or_panic();
            *aliases
                .get(name)
                .ok_or_else(|| Error::Usage(format!("no axis with name {name:?}")))?
        };
        self.axis(addr)
    }

    /// Resolve a selector that is either a numeric address or an alias.
    pub fn resolve(&self, selector: &str) -> Result<u16> {
        if let Ok(addr) = selector.parse::<u16>() {
            validate_axis(addr)?;
            return Ok(addr);
        }
        self.axis_by_name(selector).map(|axis| axis.addr())
    }

    /// Discover alive axes and register a handle for each.
    pub fn auto_populate(&self) -> Result<Vec<u16>> {
        let axes = self.find_axes(true)?;
        let mut known = self.inner.known.lock_or_panic();
        for addr in &axes {
            known.insert(*addr);
        }
        Ok(axes)
    }

    /// Drop registered axes that are no longer present in the system.
    pub fn update_axes(&self) -> Result<()> {
        let present = self.find_axes(false)?;
        let stale: Vec<u16> = self
            .axes()
            .into_iter()
            .filter(|addr| !present.contains(addr))
            .collect();
        for addr in stale {
            self.remove_axis(addr);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Enumerate axes from the rack/driver presence masks, in strictly
    /// ascending order. With `only_alive`, use the alive mask instead of
    /// the present mask.
    pub fn find_axes(&self, only_alive: bool) -> Result<Vec<u16>> {
        let racks = parse_hex_u32(&self.query_first("?SYSSTAT")?)?;
        let mut axes = Vec::new();
        for rack in 0..16u16 {
            if racks & (1 << rack) == 0 {
                continue;
            }
            let tokens = self.send_cmd(&format!("?SYSSTAT {rack}"))?.into_tokens()?;
            if tokens.len() < 2 {
                return Err(Error::Protocol(format!(
                    "?SYSSTAT {rack}: expected present and alive masks, got {tokens:?}"
                )));
            }
            let mask = parse_hex_u32(&tokens[if only_alive { 1 } else { 0 }])?;
            for driver in 0..8u16 {
                if mask & (1 << driver) != 0 {
                    axes.push(rack * 10 + driver + 1);
                }
            }
        }
        Ok(axes)
    }

    /// Indices of the racks present in the system, ascending.
    pub fn find_racks(&self) -> Result<Vec<u8>> {
        let racks = parse_hex_u32(&self.query_first("?SYSSTAT")?)?;
        Ok((0..16u8).filter(|i| racks & (1 << i) != 0).collect())
    }

    // ------------------------------------------------------------------
    // System
    // ------------------------------------------------------------------

    pub fn mode(&self) -> Result<SystemMode> {
        Ok(self.query_first("?MODE")?.parse()?)
    }

    pub fn set_mode(&self, mode: SystemMode) -> Result<()> {
        self.write(&format!("MODE {mode}"))
    }

    /// Full firmware version tree (`0:?VER INFO`).
    pub fn version(&self) -> Result<FirmwareVersion> {
        let lines = self.send_cmd("0:?VER INFO")?.into_lines()?;
        Ok(FirmwareVersion::parse(&lines))
    }

    /// Bare system version number (`?VER`).
    pub fn fver(&self) -> Result<f64> {
        parse_f64(&self.query_first("?VER")?)
    }

    /// Version tree stored in the master flash (`?VER SAVED`).
    pub fn version_saved(&self) -> Result<FirmwareVersion> {
        let lines = self.send_cmd("?VER SAVED")?.into_lines()?;
        Ok(FirmwareVersion::parse(&lines))
    }

    /// Compare the installed version against the pinned supported set.
    /// Returns the system version when fully consistent, `-1.0` when the
    /// release is known but component versions disagree.
    pub fn check_version(&self) -> Result<f64> {
        let ver = self.version()?;
        let system = ver
            .system()
            .map(|leaf| leaf.version)
            .ok_or_else(|| Error::Protocol("version reply carries no SYSTEM line".into()))?;
        let known = supported_versions()
            .iter()
            .any(|name| name.parse::<f64>().ok() == Some(system));
        if !known {
            return Err(Error::Usage(format!("version {system} not supported")));
        }
        if ver.is_supported() {
            Ok(system)
        } else {
            warn!("module versions are not consistent");
            Ok(-1.0)
        }
    }

    /// System reboot.
    pub fn reboot(&self) -> Result<()> {
        self.write("REBOOT")
    }

    /// Reset one rack, or the whole system when `rack` is `None`.
    pub fn reset(&self, rack: Option<u8>) -> Result<()> {
        match rack {
            Some(nr) => self.write(&format!("RESET {nr}")),
            None => self.write("RESET"),
        }
    }

    // ------------------------------------------------------------------
    // Multi-axis queries (result order == input order)
    // ------------------------------------------------------------------

    pub fn get_pos(&self, addrs: &[u16], register: PositionRegister) -> Result<Vec<i64>> {
        let tokens = self
            .send_cmd(&format!("?POS {register} {}", join_addrs(addrs)?))?
            .into_tokens()?;
        parse_list(&tokens, addrs.len(), parse_i64)
    }

    /// Fast position readout; falls back to `?POS` on controllers whose
    /// firmware predates the fast form.
    pub fn get_fpos(&self, addrs: &[u16], register: PositionRegister) -> Result<Vec<i64>> {
        let cmd = format!("?FPOS {register} {}", join_addrs(addrs)?);
        let reply = match self.send_cmd(&cmd) {
            Err(Error::Command(_)) => return self.get_pos(addrs, register),
            other => other?,
        };
        parse_list(&reply.into_tokens()?, addrs.len(), parse_i64)
    }

    pub fn set_pos(&self, pairs: &[(u16, i64)], register: PositionRegister) -> Result<()> {
        self.write(&format!("POS {register} {}", join_pairs(pairs)?))
    }

    pub fn get_enc(&self, addrs: &[u16], register: PositionRegister) -> Result<Vec<i64>> {
        let tokens = self
            .send_cmd(&format!("?ENC {register} {}", join_addrs(addrs)?))?
            .into_tokens()?;
        parse_list(&tokens, addrs.len(), parse_i64)
    }

    pub fn set_enc(&self, pairs: &[(u16, i64)], register: PositionRegister) -> Result<()> {
        self.write(&format!("ENC {register} {}", join_pairs(pairs)?))
    }

    pub fn get_status(&self, addrs: &[u16]) -> Result<Vec<u32>> {
        let tokens = self
            .send_cmd(&format!("?STATUS {}", join_addrs(addrs)?))?
            .into_tokens()?;
        parse_list(&tokens, addrs.len(), |t| parse_hex_u32(t))
    }

    /// Fast status readout with the slow-form fallback.
    pub fn get_fstatus(&self, addrs: &[u16]) -> Result<Vec<u32>> {
        let cmd = format!("?FSTATUS {}", join_addrs(addrs)?);
        let reply = match self.send_cmd(&cmd) {
            Err(Error::Command(_)) => return self.get_status(addrs),
            other => other?,
        };
        parse_list(&reply.into_tokens()?, addrs.len(), |t| parse_hex_u32(t))
    }

    pub fn get_states(&self, addrs: &[u16]) -> Result<Vec<State>> {
        Ok(self
            .get_fstatus(addrs)?
            .into_iter()
            .map(State::new)
            .collect())
    }

    pub fn get_power(&self, addrs: &[u16]) -> Result<Vec<bool>> {
        let tokens = self
            .send_cmd(&format!("?POWER {}", join_addrs(addrs)?))?
            .into_tokens()?;
        parse_list(&tokens, addrs.len(), parse_on_off)
    }

    pub fn set_power(&self, addrs: &[u16], on: bool) -> Result<()> {
        let state = if on { "ON" } else { "OFF" };
        self.write(&format!("POWER {state} {}", join_addrs(addrs)?))
    }

    pub fn get_velocity(&self, addrs: &[u16]) -> Result<Vec<f64>> {
        self.get_velocity_of(addrs, VelocityType::Nominal)
    }

    pub fn get_velocity_of(&self, addrs: &[u16], vtype: VelocityType) -> Result<Vec<f64>> {
        let tokens = self
            .send_cmd(&format!("?VELOCITY {vtype} {}", join_addrs(addrs)?))?
            .into_tokens()?;
        parse_list(&tokens, addrs.len(), parse_f64)
    }

    pub fn set_velocity(&self, pairs: &[(u16, f64)]) -> Result<()> {
        self.write(&format!("VELOCITY {}", join_pairs(pairs)?))
    }

    pub fn get_acctime(&self, addrs: &[u16]) -> Result<Vec<f64>> {
        self.get_acctime_of(addrs, AcctimeType::Nominal)
    }

    pub fn get_acctime_of(&self, addrs: &[u16], atype: AcctimeType) -> Result<Vec<f64>> {
        let tokens = self
            .send_cmd(&format!("?ACCTIME {atype} {}", join_addrs(addrs)?))?
            .into_tokens()?;
        parse_list(&tokens, addrs.len(), parse_f64)
    }

    pub fn set_acctime(&self, pairs: &[(u16, f64)]) -> Result<()> {
        self.write(&format!("ACCTIME {}", join_pairs(pairs)?))
    }

    /// Home search status per axis: `(state, direction)`.
    pub fn get_homestat(&self, addrs: &[u16]) -> Result<Vec<(String, i32)>> {
        let tokens = self
            .send_cmd(&format!("?HOMESTAT {}", join_addrs(addrs)?))?
            .into_tokens()?;
        if tokens.len() != addrs.len() * 2 {
            return Err(Error::Protocol(format!(
                "expected {} homestat pairs, got {} tokens",
                addrs.len(),
                tokens.len()
            )));
        }
        tokens
            .chunks_exact(2)
            .map(|pair| {
                Ok((
                    pair[0].clone(),
                    pair[1].parse::<i32>().map_err(|_| {
                        Error::Protocol(format!("bad homestat direction {:?}", pair[1]))
                    })?,
                ))
            })
            .collect()
    }

    /// Synchronize internal position registers for several axes.
    pub fn esync(&self, addrs: &[u16]) -> Result<()> {
        self.write(&format!("ESYNC {}", join_addrs(addrs)?))
    }

    /// Reset control position registers for several axes.
    pub fn ctrlrst(&self, addrs: &[u16]) -> Result<()> {
        self.write(&format!("CTRLRST {}", join_addrs(addrs)?))
    }

    // ------------------------------------------------------------------
    // Motion
    // ------------------------------------------------------------------

    fn motion_cmd(
        &self,
        verb: &str,
        group: bool,
        strict: bool,
        tail: &str,
    ) -> Result<()> {
        let mut cmd = String::from(verb);
        if group {
            cmd.push_str(" GROUP");
        }
        if strict {
            cmd.push_str(" STRICT");
        }
        cmd.push(' ');
        cmd.push_str(tail);
        self.write(&cmd)
    }

    /// Start an absolute move on several axes. `group` makes the start
    /// atomic (all listed axes or none); `strict` refuses the whole
    /// command when any listed axis is not ready.
    pub fn move_axes(&self, pairs: &[(u16, i64)], group: bool, strict: bool) -> Result<()> {
        self.motion_cmd("MOVE", group, strict, &join_pairs(pairs)?)
    }

    /// Start a relative move on several axes.
    pub fn rmove_axes(&self, pairs: &[(u16, i64)], group: bool, strict: bool) -> Result<()> {
        self.motion_cmd("RMOVE", group, strict, &join_pairs(pairs)?)
    }

    /// Move several axes to a parameter value.
    pub fn movep(&self, pos: f64, addrs: &[u16], group: bool, strict: bool) -> Result<()> {
        self.motion_cmd("MOVEP", group, strict, &format!("{pos} {}", join_addrs(addrs)?))
    }

    /// Start a parametric move on several axes.
    pub fn pmove(&self, pos: f64, addrs: &[u16], group: bool, strict: bool) -> Result<()> {
        self.motion_cmd("PMOVE", group, strict, &format!("{pos} {}", join_addrs(addrs)?))
    }

    /// Stop with the normal deceleration ramp.
    pub fn stop(&self, addrs: &[u16]) -> Result<()> {
        self.write(&format!("STOP {}", join_addrs(addrs)?))
    }

    /// Abort immediately.
    pub fn abort(&self, addrs: &[u16]) -> Result<()> {
        self.write(&format!("ABORT {}", join_addrs(addrs)?))
    }

    // ------------------------------------------------------------------
    // Racks
    // ------------------------------------------------------------------

    /// Rack hardware identification strings.
    pub fn get_rid(&self, racks: &[u8]) -> Result<Vec<String>> {
        let list = join_racks(racks)?;
        let tokens = self.send_cmd(&format!("?RID {list}"))?.into_tokens()?;
        parse_list(&tokens, racks.len(), |t| Ok(t.to_string()))
    }

    /// Rack temperatures.
    pub fn get_rtemp(&self, racks: &[u8]) -> Result<Vec<f64>> {
        let list = join_racks(racks)?;
        let tokens = self.send_cmd(&format!("?RTEMP {list}"))?.into_tokens()?;
        parse_list(&tokens, racks.len(), parse_f64)
    }

    // ------------------------------------------------------------------
    // Position multiplexer
    // ------------------------------------------------------------------

    /// Wire `source` to `dest` in the position signal multiplexer.
    pub fn add_pmux(
        &self,
        source: &str,
        dest: &str,
        pos: bool,
        aux: bool,
        hard: bool,
    ) -> Result<()> {
        let mut cmd = String::from("PMUX");
        if hard {
            cmd.push_str(" HARD");
        }
        if pos {
            cmd.push_str(" POS");
        }
        if aux {
            cmd.push_str(" AUX");
        }
        cmd.push(' ');
        cmd.push_str(source);
        if !dest.is_empty() {
            cmd.push(' ');
            cmd.push_str(dest);
        }
        self.write(&cmd)
    }

    /// Remove a multiplexer rule; with an empty `dest`, clear them all.
    pub fn clear_pmux(&self, dest: &str) -> Result<()> {
        let cmd = if dest.is_empty() {
            "PMUX REMOVE".to_string()
        } else {
            format!("PMUX REMOVE {dest}")
        };
        self.write(&cmd)
    }

    /// Current multiplexer configuration, one rule per line.
    pub fn get_pmux(&self) -> Result<Vec<String>> {
        self.send_cmd("?PMUX")?.into_any_lines()
    }

    /// Current groups of linked drivers.
    pub fn get_linked(&self) -> Result<Vec<String>> {
        self.send_cmd("?LINKED")?.into_any_lines()
    }

    // ------------------------------------------------------------------
    // Firmware programming primitives
    // ------------------------------------------------------------------

    /// Send a firmware image for programming: `*PROG` header followed by
    /// the binary block. `component` is `NONE`, a board address,
    /// `DRIVERS`, `CONTROLLERS` or `ALL`.
    pub fn sprog(
        &self,
        image: &[u8],
        component: Option<&str>,
        force: bool,
        saving: bool,
        options: &str,
    ) -> Result<()> {
        let comp = component.map(str::to_uppercase).unwrap_or_else(|| "NONE".into());
        let mut cmd = format!("*PROG {comp}");
        if force {
            cmd.push_str(" FORCE");
        }
        cmd.push_str(if saving { " SAVE" } else { " NOSAVE" });
        if !options.is_empty() {
            cmd.push(' ');
            cmd.push_str(options);
        }
        self.send_cmd(&cmd)?;
        self.send_binary(&steprack_protocol::block::words_from_image(image))
    }

    /// Program from the image previously stored in the master flash.
    pub fn prog(&self, component: &str, force: bool) -> Result<()> {
        let mut cmd = format!("PROG {}", component.to_uppercase());
        if force {
            cmd.push_str(" FORCE");
        }
        self.send_cmd(&cmd)?;
        Ok(())
    }

    /// Programming state: `OFF`, `ACTIVE <progress>`, `DONE` or `ERROR`.
    /// Tries the modern query first and falls back to the underscore
    /// dialect of older firmwares.
    pub fn get_prog_status(&self) -> Result<Vec<String>> {
        match self.send_cmd("?PROG") {
            Err(Error::Command(_)) => self.send_cmd("?_PROG")?.into_tokens(),
            other => other?.into_tokens(),
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    pub(crate) fn query_first(&self, cmd: &str) -> Result<String> {
        let tokens = self.send_cmd(cmd)?.into_tokens()?;
        tokens
            .into_iter()
            .next()
            .ok_or_else(|| Error::Protocol(format!("{cmd}: empty reply")))
    }

    pub(crate) fn write(&self, cmd: &str) -> Result<()> {
        self.send_cmd(cmd)?;
        Ok(())
    }
}

fn join_racks(racks: &[u8]) -> Result<String> {
    if racks.is_empty() {
        return Err(Error::Usage("empty rack list".into()));
    }
    for rack in racks {
        if *rack > 15 {
            return Err(Error::Usage(format!("bad rack number {rack}")));
        }
    }
    Ok(racks
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" "))
}
