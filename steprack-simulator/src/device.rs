// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! The emulated controller: per-axis state, a linear motion model and the
//! command dispatcher.

use crate::AxisConfig;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Instant;
use steprack_protocol::{block, is_valid_axis, vdata, ColumnRole, TableDType};
use tracing::debug;

const CMD_NOT_RECOGNISED: &str = "Command not recognised";
const CANNOT_BROADCAST_QUERY: &str = "Cannot broadcast a query";
const CANNOT_ACK_BROADCAST: &str = "Cannot acknowledge a broadcast";
const WRONG_PARAMETERS: &str = "Wrong parameter(s)";
const WRONG_NR_PARAMETERS: &str = "Wrong number of parameter(s)";
const BOARD_NOT_PRESENT: &str = "Board is not present in the system";
const BAD_BOARD_ADDRESS: &str = "Bad board address";
const AXIS_NOT_READY: &str = "Axis not ready";

/// Status word of a parked, powered, ready axis.
const STATUS_BASE: u32 = 0x0000_3203;
const BIT_READY: u32 = 1 << 9;
const BIT_MOVING: u32 = 1 << 10;
const BIT_5VPOWER: u32 = 1 << 21;
const BIT_POWERON: u32 = 1 << 23;

const SYS_VER_INFO: &[&str] = &[
    "SYSTEM       :  3.17 : Tue Feb 16 10:57:37 2016",
    "   CONTROLLER:  3.17",
    "   DRIVER    :  3.17",
];

const MASTER_VER_INFO: &[&str] = &[
    "SYSTEM       :  3.17 : Tue Feb 16 10:57:37 2016",
    "   CONTROLLER:  3.17",
    "      DSP    :  3.67 : Mon Dec 14 13:22:03 2015",
    "      FPGA   :  1.00 : Tue Jan 21 19:33:00 2014",
    "      MCPU0  :  1.19",
    "      MCPU1  :  1.19",
    "      MCPU2  :  1.125",
    "   DRIVER    :  3.17",
];

const DRIVER_VER_INFO: &[&str] = &[
    "SYSTEM       :  3.17 : Tue Feb 16 10:57:37 2016",
    "   CONTROLLER:  3.17",
    "   DRIVER    :  3.17",
    "      DSP    :  3.67 : Mon Dec 14 13:22:03 2015",
    "      FPGA   :  7.01 : Sat Mar  7 20:35:00 2015",
    "      PCB    :  1.00",
    "      IO     :  1.00",
];

/// Default measurement readings served by `?MEAS`.
const MEAS_DEFAULTS: &[(&str, &str)] = &[
    ("VCC", "80.2165"),
    ("VM", "78.9"),
    ("I", "0.00545881"),
    ("IA", "-0.00723386"),
    ("IB", "-0.000653267"),
    ("IC", "0"),
    ("R", "-6894.35"),
    ("RA", "-3797.74"),
    ("RB", "-3797.74"),
    ("T", "36.5"),
    ("RT", "31.0"),
];

/// Outcome of one dispatched command.
enum Outcome {
    Reply(String),
    Multi(Vec<String>),
    Ok,
    Silent,
    Error(String),
}

/// What the connection must read next when a header command announced a
/// binary block.
#[derive(Debug, Clone)]
pub enum BinaryTarget {
    Ecam {
        addr: u16,
        dtype: TableDType,
    },
    List {
        addr: u16,
        cyclic: bool,
        dtype: TableDType,
    },
    Par {
        addr: u16,
    },
    Prog,
}

struct LinearMotion {
    from: f64,
    to: f64,
    velocity: f64,
    t0: Instant,
}

impl LinearMotion {
    fn position(&self, now: Instant) -> f64 {
        let elapsed = now.duration_since(self.t0).as_secs_f64();
        let distance = (self.to - self.from).abs();
        let travelled = (self.velocity * elapsed).min(distance);
        self.from + travelled * (self.to - self.from).signum()
    }

    fn finished(&self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.t0).as_secs_f64();
        self.velocity * elapsed >= (self.to - self.from).abs()
    }
}

pub(crate) struct SimAxis {
    addr: u16,
    alive: bool,
    pos: f64,
    velocity: f64,
    acctime: f64,
    power: bool,
    motion: Option<LinearMotion>,
    pos_regs: HashMap<String, i64>,
    enc_regs: HashMap<String, i64>,
    attrs: HashMap<String, String>,
    cfg: BTreeMap<String, String>,
    ecam_table: Vec<f64>,
    ecam_output: String,
    list_table: Vec<f64>,
    par_table: Option<Vec<(f64, f64, f64)>>,
    cfghome: Option<String>,
    cfghome_pending: Option<String>,
}

impl SimAxis {
    fn new(config: &AxisConfig) -> SimAxis {
        let mut attrs = HashMap::new();
        attrs.insert("NAME".into(), config.name.clone());
        attrs.insert("ACTIVE".into(), "YES".into());
        attrs.insert("PCLOOP".into(), "ON".into());
        attrs.insert("INDEXER".into(), "INTERNAL".into());
        attrs.insert("CSWITCH".into(), "NORMAL".into());
        attrs.insert("WTEMP".into(), "45".into());
        attrs.insert("CONFIG".into(), "ops@host_2020/02/17_12:51:24".into());
        attrs.insert("ID_HW".into(), format!("0008.028E.EB{:02X}", config.address));
        attrs.insert("ID_SN".into(), format!("{}", 4900 + config.address));
        attrs.insert("POST".into(), "0".into());
        attrs.insert("AUXPS".into(), "ON".into());
        attrs.insert("INFOA".into(), "HIGH NORMAL".into());
        attrs.insert("INFOB".into(), "HIGH NORMAL".into());
        attrs.insert("INFOC".into(), "HIGH INVERTED".into());
        attrs.insert("OUTPOS".into(), "MOTOR NORMAL".into());
        attrs.insert("OUTPAUX".into(), "LOW NORMAL".into());
        attrs.insert("SYNCPOS".into(), "AXIS NORMAL".into());
        attrs.insert("SYNCAUX".into(), "ENABLED NORMAL".into());
        attrs.insert("STOPCODE".into(), "0x0000".into());
        attrs.insert("VSTOPCODE".into(), "No abnormal stop condition".into());
        attrs.insert("HOMESTAT".into(), "DONE 1".into());
        attrs.insert("SRCHSTAT".into(), "DONE 1".into());
        attrs.insert("PARVEL".into(), "0".into());
        attrs.insert("PARACCT".into(), "0.25".into());

        let mut cfg = BTreeMap::new();
        cfg.insert("ACTIVE".into(), "YES".into());
        cfg.insert("NVOLT".into(), "48".into());
        cfg.insert("NCURR".into(), "2.8".into());
        cfg.insert("EXTDISABLE".into(), "NONE".into());

        SimAxis {
            addr: config.address,
            alive: config.alive,
            pos: config.pos as f64,
            velocity: config.velocity,
            acctime: config.acctime,
            power: config.power,
            motion: None,
            pos_regs: HashMap::new(),
            enc_regs: HashMap::new(),
            attrs,
            cfg,
            ecam_table: Vec::new(),
            ecam_output: "OFF".into(),
            list_table: Vec::new(),
            par_table: None,
            cfghome: None,
            cfghome_pending: None,
        }
    }

    fn update(&mut self, now: Instant) {
        if let Some(motion) = &self.motion {
            self.pos = motion.position(now);
            if motion.finished(now) {
                self.motion = None;
            }
        }
    }

    fn status(&mut self, now: Instant) -> u32 {
        self.update(now);
        let mut word = STATUS_BASE | BIT_5VPOWER;
        if !self.alive {
            word &= !0b10;
        }
        if self.power {
            word |= BIT_POWERON | BIT_READY;
        } else {
            word &= !BIT_READY;
        }
        if self.motion.is_some() {
            word |= BIT_MOVING;
            word &= !BIT_READY;
        }
        word
    }

    fn position(&mut self, register: &str, now: Instant) -> i64 {
        if register == "AXIS" {
            self.update(now);
            self.pos.round() as i64
        } else {
            *self.pos_regs.get(register).unwrap_or(&0)
        }
    }

    fn set_position(&mut self, register: &str, value: i64) {
        if register == "AXIS" {
            self.motion = None;
            self.pos = value as f64;
        } else {
            self.pos_regs.insert(register.to_string(), value);
        }
    }

    fn encoder(&mut self, register: &str) -> i64 {
        *self.enc_regs.get(register).unwrap_or(&0)
    }

    fn start_move(&mut self, target: i64, now: Instant) -> Result<(), String> {
        if !self.power {
            return Err(AXIS_NOT_READY.to_string());
        }
        self.update(now);
        self.motion = Some(LinearMotion {
            from: self.pos,
            to: target as f64,
            velocity: self.velocity.abs().max(1e-9),
            t0: now,
        });
        Ok(())
    }

    fn stop(&mut self, now: Instant) {
        self.update(now);
        self.motion = None;
    }
}

/// The emulated controller.
pub struct Device {
    mode: String,
    axes: BTreeMap<u16, SimAxis>,
    pmux: Vec<String>,
    prog_polls_left: u32,
}

struct Parsed {
    ack: bool,
    addr: Option<u16>,
    broadcast: bool,
    query: bool,
    star: bool,
    instr: String,
    args: Vec<String>,
}

fn cmd_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    RE.get_or_init(|| {
        Regex::new(r"^(?P<ack>#)?\s*((?P<addr>\d+)?(?P<broadcast>:))?\s*(?P<query>\?)?(?P<star>\*)?(?P<instr>\w+)\s*").unwrap()
    })
}

fn fmt_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl Device {
    pub fn new(axes: &[AxisConfig]) -> Device {
        let mut map = BTreeMap::new();
        for config in axes {
            if !is_valid_axis(config.address) {
                continue;
            }
            map.insert(config.address, SimAxis::new(config));
        }
        Device {
            mode: "OPER".into(),
            axes: map,
            pmux: Vec::new(),
            prog_polls_left: 0,
        }
    }

    /// Handle one command line. Returns the textual reply (if any) and
    /// the binary block the connection must read next (if any).
    pub fn handle_line(&mut self, line: &str) -> (Option<String>, Option<BinaryTarget>) {
        let line = line.trim();
        if line.is_empty() {
            return (None, None);
        }
        debug!(cmd = line, "processing");
        let Some(caps) = cmd_regex().captures(line) else {
            return (None, None);
        };
        let parsed = Parsed {
            ack: caps.name("ack").is_some(),
            addr: caps.name("addr").and_then(|m| m.as_str().parse().ok()),
            broadcast: caps.name("broadcast").is_some() && caps.name("addr").is_none(),
            query: caps.name("query").is_some(),
            star: caps.name("star").is_some(),
            instr: caps["instr"].to_uppercase(),
            args: line[caps.get(0).map(|m| m.end()).unwrap_or(0)..]
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        };
        let echo = {
            let addr = parsed
                .addr
                .map(|a| format!("{a}:"))
                .unwrap_or_else(|| if caps.name("broadcast").is_some() && parsed.addr.is_none() { ":".into() } else { String::new() });
            let q = if parsed.query { "?" } else { "" };
            format!("{addr}{q}{}", parsed.instr)
        };

        let (outcome, binary) = self.dispatch(&parsed);
        let reply = match outcome {
            Outcome::Reply(text) => Some(format!("{echo} {text}\n")),
            Outcome::Multi(lines) if lines.is_empty() => Some(format!("{echo} $\n$\n")),
            Outcome::Multi(lines) => Some(format!("{echo} $\n{}\n$\n", lines.join("\n"))),
            Outcome::Ok => parsed.ack.then(|| format!("{echo} OK\n")),
            Outcome::Silent => None,
            Outcome::Error(msg) => {
                (parsed.ack || parsed.query).then(|| format!("{echo} ERROR {msg}\n"))
            }
        };
        (reply, binary)
    }

    /// Store a binary payload announced by an earlier header command.
    pub fn load_binary(&mut self, target: &BinaryTarget, words: &[u16]) {
        match target {
            BinaryTarget::Ecam { addr, dtype } => {
                if let Some(axis) = self.axes.get_mut(addr) {
                    axis.ecam_table = words_to_values(words, *dtype);
                }
            }
            BinaryTarget::List {
                addr,
                cyclic: _,
                dtype,
            } => {
                if let Some(axis) = self.axes.get_mut(addr) {
                    axis.list_table = words_to_values(words, *dtype);
                }
            }
            BinaryTarget::Par { addr } => {
                let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
                if let (Some(axis), Ok(columns)) =
                    (self.axes.get_mut(addr), vdata::decode_columns(&bytes))
                {
                    let params = columns
                        .iter()
                        .find(|c| c.role == ColumnRole::Parameter)
                        .map(|c| c.values.clone())
                        .unwrap_or_default();
                    let positions = columns
                        .iter()
                        .find(|c| c.role == ColumnRole::Position)
                        .map(|c| c.values.clone())
                        .unwrap_or_default();
                    let slopes = columns
                        .iter()
                        .find(|c| c.role == ColumnRole::Slope)
                        .map(|c| c.values.clone())
                        .unwrap_or_else(|| vec![0.0; params.len()]);
                    axis.par_table = Some(
                        params
                            .iter()
                            .zip(&positions)
                            .zip(&slopes)
                            .map(|((p, x), s)| (*p, *x, *s))
                            .collect(),
                    );
                }
            }
            BinaryTarget::Prog => {
                self.prog_polls_left = 2;
            }
        }
    }

    fn axis_mut(&mut self, token: &str) -> Result<&mut SimAxis, String> {
        let addr: u16 = token.parse().map_err(|_| WRONG_PARAMETERS.to_string())?;
        if !is_valid_axis(addr) {
            return Err(BAD_BOARD_ADDRESS.to_string());
        }
        self.axes
            .get_mut(&addr)
            .ok_or_else(|| BOARD_NOT_PRESENT.to_string())
    }

    /// Selector + axis-list argument handling shared by the multi-axis
    /// queries: an axis-level command targets its own address.
    fn axis_args(parsed: &Parsed, selectors: &[&str], default: &str) -> (String, Vec<String>) {
        let mut args = parsed.args.clone();
        let selector = if args
            .first()
            .map(|a| selectors.contains(&a.to_uppercase().as_str()))
            .unwrap_or(false)
        {
            args.remove(0).to_uppercase()
        } else {
            default.to_string()
        };
        if let Some(addr) = parsed.addr {
            args.insert(0, addr.to_string());
        }
        (selector, args)
    }

    fn dispatch(&mut self, parsed: &Parsed) -> (Outcome, Option<BinaryTarget>) {
        if parsed.query && parsed.broadcast {
            return (Outcome::Error(CANNOT_BROADCAST_QUERY.into()), None);
        }
        if parsed.ack && parsed.broadcast {
            return (Outcome::Error(CANNOT_ACK_BROADCAST.into()), None);
        }
        if parsed.star {
            return self.dispatch_binary_header(parsed);
        }
        let now = Instant::now();
        let outcome = match parsed.instr.as_str() {
            "MODE" => self.cmd_mode(parsed),
            "VER" => self.cmd_ver(parsed),
            "SYSSTAT" => self.cmd_sysstat(parsed),
            "RID" => self.cmd_rid(parsed),
            "RTEMP" => self.cmd_rtemp(parsed),
            "POS" => self.cmd_pos(parsed, now, false),
            "FPOS" => self.cmd_pos(parsed, now, true),
            "ENC" => self.cmd_enc(parsed),
            "STATUS" | "FSTATUS" => self.cmd_status(parsed, now),
            "VSTATUS" => Outcome::Multi(vec![
                "AXIS STATUS REPORT".into(),
                format!("MODE {}", self.mode),
            ]),
            "POWER" => self.cmd_power(parsed),
            "VELOCITY" => self.cmd_velocity(parsed, now),
            "ACCTIME" => self.cmd_acctime(parsed),
            "MOVE" | "UMOVE" => self.cmd_move(parsed, now, false),
            "RMOVE" => self.cmd_move(parsed, now, true),
            "STOP" | "ABORT" => self.cmd_stop(parsed, now),
            "JOG" | "CJOG" => self.cmd_jog(parsed, now),
            "ESYNC" | "CTRLRST" | "BLINK" | "HOME" | "SRCH" | "TRACK" | "PTRACK" | "LTRACK"
            | "CMOVE" | "MOVEL" | "PMOVE" | "MOVEP" => Outcome::Ok,
            "ISG" => self.cmd_isg(parsed),
            "ECAM" => self.cmd_ecam(parsed),
            "ECAMDAT" => self.cmd_ecamdat(parsed),
            "LISTDAT" => self.cmd_listdat(parsed),
            "PARDAT" => self.cmd_pardat(parsed),
            "PMUX" => self.cmd_pmux(parsed),
            "LINKED" => Outcome::Multi(vec![]),
            "PROG" => self.cmd_prog(parsed),
            "REBOOT" => Outcome::Ok,
            "RESET" => Outcome::Silent,
            "MEAS" => self.cmd_meas(parsed),
            "CFG" => self.cmd_cfg(parsed),
            "CFGINFO" => self.cmd_cfginfo(parsed),
            "CONFIG" => self.cmd_config(parsed),
            "ADDR" => match parsed.addr {
                Some(addr) => Outcome::Reply(format!("{addr}")),
                None => Outcome::Error(WRONG_NR_PARAMETERS.into()),
            },
            "ID" => self.cmd_id(parsed),
            "ALARM" => Outcome::Reply("NO".into()),
            "WARNING" => Outcome::Reply("NONE".into()),
            "HELP" => Outcome::Multi(vec!["MOVE".into(), "STOP".into(), "?POS".into()]),
            // Plain per-axis attributes.
            "NAME" | "ACTIVE" | "PCLOOP" | "INDEXER" | "CSWITCH" | "WTEMP" | "STOPCODE"
            | "VSTOPCODE" | "HOMESTAT" | "SRCHSTAT" | "PARVEL" | "PARACCT" | "POST" | "AUXPS"
            | "INFOA" | "INFOB" | "INFOC" | "OUTPOS" | "OUTPAUX" | "SYNCPOS" | "SYNCAUX"
            | "DISDIS" => self.cmd_attr(parsed),
            "PARPOS" => Outcome::Reply("0".into()),
            "PARVAL" => Outcome::Reply("0".into()),
            "HOMEPOS" | "HOMEENC" | "SRCHPOS" | "SRCHENC" => Outcome::Reply("0".into()),
            _ => Outcome::Error(CMD_NOT_RECOGNISED.into()),
        };
        (outcome, None)
    }

    fn dispatch_binary_header(&mut self, parsed: &Parsed) -> (Outcome, Option<BinaryTarget>) {
        let target = match parsed.instr.as_str() {
            "ECAMDAT" => parsed.addr.map(|addr| BinaryTarget::Ecam {
                addr,
                dtype: table_dtype(parsed.args.get(1)),
            }),
            "LISTDAT" => parsed.addr.map(|addr| BinaryTarget::List {
                addr,
                cyclic: parsed
                    .args
                    .first()
                    .map(|a| a.eq_ignore_ascii_case("CYCLIC"))
                    .unwrap_or(false),
                dtype: table_dtype(parsed.args.get(1)),
            }),
            "PARDAT" => parsed.addr.map(|addr| BinaryTarget::Par { addr }),
            "PROG" => Some(BinaryTarget::Prog),
            _ => None,
        };
        match target {
            Some(target) => (Outcome::Silent, Some(target)),
            None => (Outcome::Error(CMD_NOT_RECOGNISED.into()), None),
        }
    }

    fn cmd_mode(&mut self, parsed: &Parsed) -> Outcome {
        if parsed.query {
            Outcome::Reply(self.mode.clone())
        } else {
            match parsed.args.first() {
                Some(mode) => {
                    self.mode = mode.to_uppercase();
                    Outcome::Ok
                }
                None => Outcome::Error(WRONG_NR_PARAMETERS.into()),
            }
        }
    }

    fn cmd_ver(&mut self, parsed: &Parsed) -> Outcome {
        let selector = parsed
            .args
            .first()
            .map(|a| a.to_uppercase())
            .unwrap_or_else(|| "SYSTEM".into());
        match selector.as_str() {
            "INFO" | "SAVED" => {
                let lines = match parsed.addr {
                    None => SYS_VER_INFO,
                    Some(0) => MASTER_VER_INFO,
                    Some(_) => DRIVER_VER_INFO,
                };
                Outcome::Multi(lines.iter().map(|l| l.to_string()).collect())
            }
            _ => Outcome::Reply("3.17".into()),
        }
    }

    fn cmd_sysstat(&mut self, parsed: &Parsed) -> Outcome {
        match parsed.args.first() {
            None => {
                let mut mask = 0u32;
                for addr in self.axes.keys() {
                    mask |= 1 << (addr / 10);
                }
                Outcome::Reply(format!("0x{mask:04X}"))
            }
            Some(rack) => {
                let Ok(rack) = rack.parse::<u16>() else {
                    return Outcome::Error(WRONG_PARAMETERS.into());
                };
                let mut present = 0u32;
                let mut alive = 0u32;
                for (addr, axis) in &self.axes {
                    if addr / 10 == rack {
                        let bit = 1 << (addr % 10 - 1);
                        present |= bit;
                        if axis.alive {
                            alive |= bit;
                        }
                    }
                }
                Outcome::Reply(format!("0x{present:02X} 0x{alive:02X}"))
            }
        }
    }

    fn cmd_rid(&mut self, parsed: &Parsed) -> Outcome {
        let rids: Vec<String> = parsed
            .args
            .iter()
            .map(|rack| format!("0008.01C4.E8A{rack}"))
            .collect();
        Outcome::Reply(rids.join(" "))
    }

    fn cmd_rtemp(&mut self, parsed: &Parsed) -> Outcome {
        let temps: Vec<String> = parsed
            .args
            .iter()
            .enumerate()
            .map(|(i, _)| format!("{}", 30.0 + i as f64 / 2.0))
            .collect();
        Outcome::Reply(temps.join(" "))
    }

    fn cmd_pos(&mut self, parsed: &Parsed, now: Instant, fast: bool) -> Outcome {
        if fast && parsed.addr.is_some() {
            return Outcome::Error(CMD_NOT_RECOGNISED.into());
        }
        let selectors = [
            "AXIS", "MEASURE", "SHFTENC", "TGTENC", "CTRLENC", "ENCIN", "INPOS", "ABSENC",
            "MOTOR", "SYNC",
        ];
        let (selector, args) = Device::axis_args(parsed, &selectors, "AXIS");
        if parsed.query {
            let mut values = Vec::with_capacity(args.len());
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => values.push(axis.position(&selector, now).to_string()),
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Reply(values.join(" "))
        } else {
            for pair in args.chunks(2) {
                let [addr, value] = pair else {
                    return Outcome::Error(WRONG_NR_PARAMETERS.into());
                };
                let Ok(value) = value.parse::<i64>() else {
                    return Outcome::Error(WRONG_PARAMETERS.into());
                };
                match self.axis_mut(addr) {
                    Ok(axis) => axis.set_position(&selector, value),
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Ok
        }
    }

    fn cmd_enc(&mut self, parsed: &Parsed) -> Outcome {
        let selectors = [
            "AXIS", "MEASURE", "SHFTENC", "TGTENC", "CTRLENC", "ENCIN", "INPOS", "ABSENC",
            "MOTOR", "SYNC",
        ];
        let (selector, args) = Device::axis_args(parsed, &selectors, "AXIS");
        if parsed.query {
            let mut values = Vec::with_capacity(args.len());
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => values.push(axis.encoder(&selector).to_string()),
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Reply(values.join(" "))
        } else {
            for pair in args.chunks(2) {
                let [addr, value] = pair else {
                    return Outcome::Error(WRONG_NR_PARAMETERS.into());
                };
                let Ok(value) = value.parse::<i64>() else {
                    return Outcome::Error(WRONG_PARAMETERS.into());
                };
                match self.axis_mut(addr) {
                    Ok(axis) => {
                        axis.enc_regs.insert(selector.clone(), value);
                    }
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Ok
        }
    }

    fn cmd_status(&mut self, parsed: &Parsed, now: Instant) -> Outcome {
        let mut args = parsed.args.clone();
        if let Some(addr) = parsed.addr {
            args.insert(0, addr.to_string());
        }
        let mut words = Vec::with_capacity(args.len());
        for token in &args {
            match self.axis_mut(token) {
                Ok(axis) => words.push(format!("0x{:08X}", axis.status(now))),
                Err(msg) => return Outcome::Error(msg),
            }
        }
        Outcome::Reply(words.join(" "))
    }

    fn cmd_power(&mut self, parsed: &Parsed) -> Outcome {
        if parsed.query {
            let mut args = parsed.args.clone();
            if let Some(addr) = parsed.addr {
                args.insert(0, addr.to_string());
            }
            let mut states = Vec::with_capacity(args.len());
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => states.push(if axis.power { "ON" } else { "OFF" }.to_string()),
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Reply(states.join(" "))
        } else {
            let Some(state) = parsed.args.first() else {
                return Outcome::Error(WRONG_NR_PARAMETERS.into());
            };
            let on = state.eq_ignore_ascii_case("ON");
            let mut args: Vec<String> = parsed.args[1..].to_vec();
            if let Some(addr) = parsed.addr {
                args.insert(0, addr.to_string());
            }
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => axis.power = on,
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Ok
        }
    }

    fn cmd_velocity(&mut self, parsed: &Parsed, now: Instant) -> Outcome {
        let selectors = ["NOMINAL", "MIN", "MAX", "CURRENT", "DEFAULT"];
        let (selector, args) = Device::axis_args(parsed, &selectors, "NOMINAL");
        if parsed.query {
            let mut values = Vec::with_capacity(args.len());
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => values.push(match selector.as_str() {
                        "MIN" => "2".to_string(),
                        "MAX" => "3000".to_string(),
                        "DEFAULT" => "50".to_string(),
                        "CURRENT" => {
                            axis.update(now);
                            if axis.motion.is_some() {
                                fmt_float(axis.velocity)
                            } else {
                                "0".to_string()
                            }
                        }
                        _ => fmt_float(axis.velocity),
                    }),
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Reply(values.join(" "))
        } else {
            for pair in args.chunks(2) {
                let [addr, value] = pair else {
                    return Outcome::Error(WRONG_NR_PARAMETERS.into());
                };
                let Ok(value) = value.parse::<f64>() else {
                    return Outcome::Error(WRONG_PARAMETERS.into());
                };
                match self.axis_mut(addr) {
                    Ok(axis) => axis.velocity = value,
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Ok
        }
    }

    fn cmd_acctime(&mut self, parsed: &Parsed) -> Outcome {
        let selectors = ["NOMINAL", "STEPS", "DEFAULT"];
        let (selector, args) = Device::axis_args(parsed, &selectors, "NOMINAL");
        if parsed.query {
            let mut values = Vec::with_capacity(args.len());
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => values.push(match selector.as_str() {
                        "STEPS" => "30".to_string(),
                        "DEFAULT" => "0.01".to_string(),
                        _ => fmt_float(axis.acctime),
                    }),
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Reply(values.join(" "))
        } else {
            for pair in args.chunks(2) {
                let [addr, value] = pair else {
                    return Outcome::Error(WRONG_NR_PARAMETERS.into());
                };
                let Ok(value) = value.parse::<f64>() else {
                    return Outcome::Error(WRONG_PARAMETERS.into());
                };
                match self.axis_mut(addr) {
                    Ok(axis) => axis.acctime = value,
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Ok
        }
    }

    fn cmd_move(&mut self, parsed: &Parsed, now: Instant, relative: bool) -> Outcome {
        let mut args = parsed.args.clone();
        let mut strict = false;
        while let Some(flag) = args.first() {
            match flag.to_uppercase().as_str() {
                "GROUP" => {
                    args.remove(0);
                }
                "STRICT" => {
                    strict = true;
                    args.remove(0);
                }
                _ => break,
            }
        }
        if let Some(addr) = parsed.addr {
            args.insert(0, addr.to_string());
        }
        // Validate the whole list before starting anything, so a group
        // start is all-or-none.
        let mut moves = Vec::new();
        for pair in args.chunks(2) {
            let [addr, value] = pair else {
                return Outcome::Error(WRONG_NR_PARAMETERS.into());
            };
            let Ok(value) = value.parse::<i64>() else {
                return Outcome::Error(WRONG_PARAMETERS.into());
            };
            match self.axis_mut(addr) {
                Ok(axis) => {
                    if !axis.power && strict {
                        return Outcome::Error(AXIS_NOT_READY.into());
                    }
                    let target = if relative {
                        axis.position("AXIS", now) + value
                    } else {
                        value
                    };
                    moves.push((axis.addr, target));
                }
                Err(msg) => return Outcome::Error(msg),
            }
        }
        // Without STRICT, axes that cannot start are skipped and the rest
        // of the group moves.
        for (addr, target) in moves {
            if let Some(axis) = self.axes.get_mut(&addr) {
                let _ = axis.start_move(target, now);
            }
        }
        Outcome::Ok
    }

    fn cmd_stop(&mut self, parsed: &Parsed, now: Instant) -> Outcome {
        let mut args = parsed.args.clone();
        if let Some(addr) = parsed.addr {
            args.insert(0, addr.to_string());
        }
        for token in &args {
            match self.axis_mut(token) {
                Ok(axis) => axis.stop(now),
                Err(msg) => return Outcome::Error(msg),
            }
        }
        Outcome::Ok
    }

    fn cmd_jog(&mut self, parsed: &Parsed, now: Instant) -> Outcome {
        if parsed.query {
            let mut args = parsed.args.clone();
            if let Some(addr) = parsed.addr {
                args.insert(0, addr.to_string());
            }
            let mut values = Vec::new();
            for token in &args {
                match self.axis_mut(token) {
                    Ok(axis) => {
                        axis.update(now);
                        values.push(if axis.motion.is_some() {
                            fmt_float(axis.velocity)
                        } else {
                            "0".to_string()
                        });
                    }
                    Err(msg) => return Outcome::Error(msg),
                }
            }
            Outcome::Reply(values.join(" "))
        } else {
            Outcome::Ok
        }
    }

    fn cmd_isg(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                let selector = parsed
                    .args
                    .first()
                    .map(|a| a.to_uppercase())
                    .unwrap_or_default();
                if parsed.query {
                    match selector.as_str() {
                        "?HOMECFGD" => Outcome::Reply(
                            axis.cfghome.clone().unwrap_or_else(|| "0 0".into()),
                        ),
                        "?HOMED" => Outcome::Reply("1".into()),
                        "?SW" => Outcome::Reply("0 1 0".into()),
                        _ => Outcome::Error(CMD_NOT_RECOGNISED.into()),
                    }
                } else {
                    match selector.as_str() {
                        "CFGHOME" => {
                            let config = parsed.args[1..].join(" ");
                            // Firmware quirk: a lone CFGHOME write is
                            // lost; only a repeated identical write takes
                            // effect.
                            if axis.cfghome_pending.as_deref() == Some(config.as_str()) {
                                axis.cfghome = Some(config);
                                axis.cfghome_pending = None;
                            } else {
                                axis.cfghome_pending = Some(config);
                            }
                            Outcome::Ok
                        }
                        _ => Outcome::Error(CMD_NOT_RECOGNISED.into()),
                    }
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_ecam(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    Outcome::Reply(axis.ecam_output.clone())
                } else {
                    match parsed.args.first() {
                        Some(output) => {
                            axis.ecam_output = output.to_uppercase();
                            Outcome::Ok
                        }
                        None => Outcome::Error(WRONG_NR_PARAMETERS.into()),
                    }
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn dump_table_page(table: &[f64], parsed: &Parsed, reported_extra: usize) -> Outcome {
        let count: usize = parsed
            .args
            .first()
            .and_then(|a| a.parse().ok())
            .unwrap_or(200);
        let offset: usize = parsed
            .args
            .get(1)
            .and_then(|a| a.parse().ok())
            .unwrap_or(0);
        let reported = table.len() + reported_extra;
        let end = (offset + count).min(table.len());
        let rows: Vec<String> = (offset..end)
            .map(|i| format!("{i}/{reported} : {i} : {}", fmt_float(table[i])))
            .collect();
        Outcome::Multi(rows)
    }

    fn cmd_ecamdat(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    let table = axis.ecam_table.clone();
                    Device::dump_table_page(&table, parsed, 0)
                } else if parsed
                    .args
                    .first()
                    .map(|a| a.eq_ignore_ascii_case("CLEAR"))
                    .unwrap_or(false)
                {
                    axis.ecam_table.clear();
                    axis.ecam_output = "OFF".into();
                    Outcome::Ok
                } else {
                    Outcome::Error(WRONG_PARAMETERS.into())
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_listdat(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    let table = axis.list_table.clone();
                    // The list dump reports one more entry than the table
                    // really holds.
                    Device::dump_table_page(&table, parsed, 1)
                } else if parsed
                    .args
                    .first()
                    .map(|a| a.eq_ignore_ascii_case("CLEAR"))
                    .unwrap_or(false)
                {
                    axis.list_table.clear();
                    Outcome::Ok
                } else {
                    Outcome::Error(WRONG_PARAMETERS.into())
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_pardat(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    let table = axis.par_table.clone().unwrap_or_default();
                    match parsed.args.first().map(|a| a.to_uppercase()) {
                        Some(sel) if sel == "NPTS" => Outcome::Reply(table.len().to_string()),
                        _ => {
                            let start: usize = parsed
                                .args
                                .first()
                                .and_then(|a| a.parse().ok())
                                .unwrap_or(0);
                            let count: usize = parsed
                                .args
                                .get(1)
                                .and_then(|a| a.parse().ok())
                                .unwrap_or(20);
                            let end = (start + count).min(table.len());
                            let rows: Vec<String> = table[start..end]
                                .iter()
                                .map(|(p, x, s)| {
                                    format!("{} {} {}", fmt_float(*p), fmt_float(*x), fmt_float(*s))
                                })
                                .collect();
                            Outcome::Multi(rows)
                        }
                    }
                } else if parsed
                    .args
                    .first()
                    .map(|a| a.eq_ignore_ascii_case("CLEAR"))
                    .unwrap_or(false)
                {
                    axis.par_table = None;
                    Outcome::Ok
                } else {
                    Outcome::Error(WRONG_PARAMETERS.into())
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_pmux(&mut self, parsed: &Parsed) -> Outcome {
        if parsed.query {
            return Outcome::Multi(self.pmux.clone());
        }
        match parsed.args.first().map(|a| a.to_uppercase()) {
            Some(op) if op == "REMOVE" => {
                match parsed.args.get(1) {
                    Some(dest) => self.pmux.retain(|rule| !rule.ends_with(dest)),
                    None => self.pmux.clear(),
                }
                Outcome::Ok
            }
            Some(_) => {
                self.pmux.push(parsed.args.join(" "));
                Outcome::Ok
            }
            None => Outcome::Error(WRONG_NR_PARAMETERS.into()),
        }
    }

    fn cmd_prog(&mut self, parsed: &Parsed) -> Outcome {
        if parsed.query {
            if self.prog_polls_left > 0 {
                self.prog_polls_left -= 1;
                let pct = 100 - self.prog_polls_left * 40;
                Outcome::Reply(format!("ACTIVE {pct}"))
            } else {
                Outcome::Reply("DONE".into())
            }
        } else {
            self.prog_polls_left = 2;
            Outcome::Silent
        }
    }

    fn cmd_meas(&mut self, parsed: &Parsed) -> Outcome {
        let Some(param) = parsed.args.first() else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        let param = param.to_uppercase();
        match MEAS_DEFAULTS.iter().find(|(name, _)| *name == param) {
            Some((_, value)) => Outcome::Reply(value.to_string()),
            None => Outcome::Error("Current too low to take the measure".into()),
        }
    }

    fn cmd_cfg(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    match parsed.args.first() {
                        None => Outcome::Multi(
                            axis.cfg
                                .iter()
                                .map(|(k, v)| format!("{k} {v}"))
                                .collect(),
                        ),
                        Some(param) => {
                            let param = param.to_uppercase();
                            match axis.cfg.get(&param) {
                                Some(value) => Outcome::Reply(format!("{param} {value}")),
                                None => Outcome::Error(WRONG_PARAMETERS.into()),
                            }
                        }
                    }
                } else {
                    for pair in parsed.args.chunks(2) {
                        let [param, value] = pair else {
                            return Outcome::Error(WRONG_NR_PARAMETERS.into());
                        };
                        axis.cfg.insert(param.to_uppercase(), value.clone());
                    }
                    Outcome::Ok
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_cfginfo(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    match parsed.args.first() {
                        None => Outcome::Multi(
                            axis.cfg
                                .keys()
                                .map(|k| format!("{k} STRING"))
                                .collect(),
                        ),
                        Some(param) => Outcome::Reply(format!("{} STRING", param.to_uppercase())),
                    }
                } else {
                    Outcome::Error(CMD_NOT_RECOGNISED.into())
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_config(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    let value = axis.attrs.get("CONFIG").cloned().unwrap_or_default();
                    Outcome::Reply(value)
                } else {
                    if let Some(signature) = parsed.args.first() {
                        axis.attrs.insert("CONFIG".into(), signature.clone());
                    }
                    Outcome::Ok
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    fn cmd_id(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        let selector = parsed
            .args
            .first()
            .map(|a| a.to_uppercase())
            .unwrap_or_else(|| "HW".into());
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                let key = format!("ID_{selector}");
                match axis.attrs.get(&key) {
                    Some(value) => Outcome::Reply(value.clone()),
                    None => Outcome::Error(WRONG_PARAMETERS.into()),
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }

    /// Generic attribute read/write against the axis attribute store.
    fn cmd_attr(&mut self, parsed: &Parsed) -> Outcome {
        let Some(addr) = parsed.addr else {
            return Outcome::Error(WRONG_NR_PARAMETERS.into());
        };
        let instr = parsed.instr.clone();
        match self.axis_mut(&addr.to_string()) {
            Ok(axis) => {
                if parsed.query {
                    match axis.attrs.get(&instr) {
                        Some(value) => Outcome::Reply(value.clone()),
                        None => Outcome::Error(CMD_NOT_RECOGNISED.into()),
                    }
                } else {
                    let mut value = parsed.args.join(" ");
                    // Signal ports default to NORMAL polarity when only a
                    // signal is given.
                    let ports = [
                        "INFOA", "INFOB", "INFOC", "OUTPOS", "OUTPAUX", "SYNCPOS", "SYNCAUX",
                    ];
                    if ports.contains(&instr.as_str()) && parsed.args.len() == 1 {
                        value.push_str(" NORMAL");
                    }
                    axis.attrs.insert(instr, value);
                    Outcome::Ok
                }
            }
            Err(msg) => Outcome::Error(msg),
        }
    }
}

fn table_dtype(token: Option<&String>) -> TableDType {
    token
        .and_then(|t| t.parse().ok())
        .unwrap_or(TableDType::Float)
}

fn words_to_values(words: &[u16], dtype: TableDType) -> Vec<f64> {
    match dtype {
        TableDType::Float => block::f32_from_words(words)
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        TableDType::DFloat => block::f64_from_words(words),
        TableDType::Dword => block::i32_from_words(words)
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        TableDType::Byte => words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .map(|b| b as i8 as f64)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new(&[
            AxisConfig::new(1).with_name("th").with_pos(55),
            AxisConfig::new(5).with_name("tth").with_pos(-3),
            AxisConfig::new(151).with_name("chi").with_pos(-1000).powered(false),
            AxisConfig::new(152).with_name("phi").with_pos(1000).dead(),
        ])
    }

    fn reply(device: &mut Device, line: &str) -> String {
        device.handle_line(line).0.unwrap_or_default()
    }

    #[test]
    fn sysstat_masks() {
        let mut dev = device();
        assert_eq!(reply(&mut dev, "?SYSSTAT"), "?SYSSTAT 0x8001\n");
        assert_eq!(reply(&mut dev, "?SYSSTAT 0"), "?SYSSTAT 0x11 0x11\n");
        assert_eq!(reply(&mut dev, "?SYSSTAT 15"), "?SYSSTAT 0x03 0x01\n");
        assert_eq!(reply(&mut dev, "?SYSSTAT 7"), "?SYSSTAT 0x00 0x00\n");
    }

    #[test]
    fn fpos_multi_axis() {
        let mut dev = device();
        assert_eq!(reply(&mut dev, "?FPOS 1 5"), "?FPOS 55 -3\n");
        assert_eq!(reply(&mut dev, "?POS 5 1"), "?POS -3 55\n");
    }

    #[test]
    fn pos_write_and_read_back() {
        let mut dev = device();
        assert_eq!(reply(&mut dev, "#1:POS AXIS 100"), "1:POS OK\n");
        assert_eq!(reply(&mut dev, "1:?POS AXIS"), "1:?POS 100\n");
    }

    #[test]
    fn unknown_axis_errors() {
        let mut dev = device();
        let out = reply(&mut dev, "2:?POS AXIS");
        assert!(out.contains("ERROR Board is not present"), "{out}");
    }

    #[test]
    fn power_round_trip() {
        let mut dev = device();
        assert_eq!(reply(&mut dev, "?POWER 1 151"), "?POWER ON OFF\n");
        assert_eq!(reply(&mut dev, "#POWER ON 151"), "POWER OK\n");
        assert_eq!(reply(&mut dev, "?POWER 151"), "?POWER ON\n");
    }

    #[test]
    fn strict_move_refuses_unpowered_axis() {
        let mut dev = device();
        let out = reply(&mut dev, "#MOVE GROUP STRICT 1 10 151 20");
        assert!(out.contains("ERROR"), "{out}");
        // Nothing started: axis 1 still parked.
        assert_eq!(reply(&mut dev, "?FPOS 1"), "?FPOS 55\n");
    }

    #[test]
    fn ver_info_is_multiline() {
        let mut dev = device();
        let out = reply(&mut dev, "0:?VER INFO");
        assert!(out.starts_with("0:?VER $\n"));
        assert!(out.contains("MCPU0"));
        assert!(out.trim_end().ends_with('$'));
    }

    #[test]
    fn mode_round_trip() {
        let mut dev = device();
        assert_eq!(reply(&mut dev, "?MODE"), "?MODE OPER\n");
        assert_eq!(reply(&mut dev, "#MODE PROG"), "MODE OK\n");
        assert_eq!(reply(&mut dev, "?MODE"), "?MODE PROG\n");
    }

    #[test]
    fn ecam_binary_round_trip() {
        let mut dev = device();
        let (outcome, target) = dev.handle_line("1:*ECAMDAT AXIS FLOAT");
        assert!(outcome.is_none());
        let target = target.unwrap();
        dev.load_binary(&target, &block::words_from_f32(&[0.0, 1.5, 2.5]));
        let dump = reply(&mut dev, "1:?ECAMDAT 200 0");
        assert!(dump.contains("0/3 : 0 : 0"), "{dump}");
        assert!(dump.contains("2/3 : 2 : 2.5"), "{dump}");
    }

    #[test]
    fn listdat_reports_length_plus_one() {
        let mut dev = device();
        let (_, target) = dev.handle_line("1:*LISTDAT NOCYCLIC FLOAT");
        dev.load_binary(&target.unwrap(), &block::words_from_f32(&[1.0, 2.0]));
        let dump = reply(&mut dev, "1:?LISTDAT 200 0");
        assert!(dump.contains("0/3 : 0 : 1"), "{dump}");
        assert!(dump.contains("1/3 : 1 : 2"), "{dump}");
    }

    #[test]
    fn lone_cfghome_write_is_lost() {
        let mut dev = device();
        // One write is swallowed by the emulated firmware defect.
        assert_eq!(reply(&mut dev, "#1:ISG CFGHOME 4 1"), "1:ISG OK\n");
        assert_eq!(reply(&mut dev, "1:?ISG ?HOMECFGD"), "1:?ISG 0 0\n");
        // The repeated identical write takes effect.
        assert_eq!(reply(&mut dev, "#1:ISG CFGHOME 4 1"), "1:ISG OK\n");
        assert_eq!(reply(&mut dev, "1:?ISG ?HOMECFGD"), "1:?ISG 4 1\n");
    }

    #[test]
    fn broadcast_query_rejected() {
        let mut dev = device();
        let out = reply(&mut dev, ":?POS 1");
        assert!(out.contains("ERROR Cannot broadcast a query"), "{out}");
    }

    #[test]
    fn move_completes_over_time() {
        let mut dev = device();
        assert_eq!(reply(&mut dev, "#1:VELOCITY 1000000"), "1:VELOCITY OK\n");
        assert_eq!(reply(&mut dev, "#MOVE GROUP 1 60"), "MOVE OK\n");
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(reply(&mut dev, "?FPOS 1"), "?FPOS 60\n");
        let status = reply(&mut dev, "?FSTATUS 1");
        let word = u32::from_str_radix(
            status.trim().rsplit(' ').next().unwrap().trim_start_matches("0x"),
            16,
        )
        .unwrap();
        assert_eq!(word & BIT_MOVING, 0);
    }
}
