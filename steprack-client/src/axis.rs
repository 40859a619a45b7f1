// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Per-axis command surface.
//!
//! An [`Axis`] is a lightweight handle (address + shared controller); every
//! method formats one command with the `addr:` prefix and parses its reply.
//! Handles are cheap to clone and safe to share: the owning session
//! serializes every request they dispatch.

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::parse::{parse_f64, parse_hex_u32, parse_i64, parse_on_off};
use crate::session::Reply;
use std::fmt;
use steprack_protocol::{
    block, vdata, AcctimeType, ColumnRole, EcamOutput, EdgeType, FirmwareVersion, IndexerSource,
    InfoPort, InfoSignal, ListTrackMode, ParTableMode, Polarity, PositionRegister, SearchSignal,
    State, SystemMode, TableDType, TrackMode, Vdata,
};
use tracing::{debug, error};

/// Table uploads are limited by the controller's table memory.
pub const ECAM_TABLE_MAX_WORDS: usize = 40954;

/// Dump queries page through the table in subsets of at most this many
/// entries.
const DUMP_PAGE: usize = 200;
const PARDAT_PAGE: usize = 20;

/// Handle to a single driver board.
#[derive(Clone)]
pub struct Axis {
    ctrl: Controller,
    addr: u16,
}

impl fmt::Debug for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Axis({})", self.addr)
    }
}

impl Axis {
    pub(crate) fn new(ctrl: Controller, addr: u16) -> Axis {
        Axis { ctrl, addr }
    }

    /// The local address this handle was created with (no communication).
    pub fn addr(&self) -> u16 {
        self.addr
    }

    pub fn controller(&self) -> &Controller {
        &self.ctrl
    }

    fn send(&self, cmd: &str) -> Result<Reply> {
        self.ctrl.send_cmd(&format!("{}:{cmd}", self.addr))
    }

    fn write(&self, cmd: &str) -> Result<()> {
        self.send(cmd)?;
        Ok(())
    }

    fn query_tokens(&self, cmd: &str) -> Result<Vec<String>> {
        self.send(cmd)?.into_tokens()
    }

    fn query_first(&self, cmd: &str) -> Result<String> {
        self.query_tokens(cmd)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Protocol(format!("{}:{cmd}: empty reply", self.addr)))
    }

    fn query_joined(&self, cmd: &str) -> Result<String> {
        Ok(self.query_tokens(cmd)?.join(" "))
    }

    // ------------------------------------------------------------------
    // Identity and configuration
    // ------------------------------------------------------------------

    /// Address as reported by the board itself (`?ADDR`).
    pub fn remote_addr(&self) -> Result<u16> {
        self.query_first("?ADDR")?
            .parse()
            .map_err(|_| Error::Protocol("bad ?ADDR reply".into()))
    }

    pub fn is_active(&self) -> Result<bool> {
        Ok(self.query_first("?ACTIVE")?.eq_ignore_ascii_case("YES"))
    }

    pub fn mode(&self) -> Result<SystemMode> {
        Ok(self.query_first("?MODE")?.parse()?)
    }

    /// Axis name; may contain spaces.
    pub fn name(&self) -> Result<String> {
        self.query_joined("?NAME")
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.write(&format!("NAME {name}"))
    }

    /// Hardware id and serial number. Boards without a readable serial
    /// report an empty string there.
    pub fn id(&self) -> Result<(String, String)> {
        let hw = self.query_first("?ID HW")?;
        let sn = match self.query_first("?ID SN") {
            Ok(sn) => sn,
            Err(e) => {
                error!(axis = self.addr, "cannot read serial number: {e}");
                String::new()
            }
        };
        Ok((hw, sn))
    }

    /// Power-on self test result; zero means no errors.
    pub fn post(&self) -> Result<i64> {
        parse_i64(&self.query_first("?POST")?)
    }

    /// Identifier of the last valid configuration.
    pub fn config(&self) -> Result<String> {
        Ok(self.query_tokens("?CONFIG")?.join(" "))
    }

    /// Sign (or enter) configuration. `CONFIG <signature>` signs and
    /// leaves config mode; a bare `CONFIG` enters it.
    pub fn set_config(&self, signature: Option<&str>) -> Result<()> {
        match signature {
            Some(sig) => self.write(&format!("CONFIG {sig}")),
            None => self.write("CONFIG"),
        }
    }

    /// Current configuration, one `(parameter, value)` pair per entry.
    pub fn get_cfg(&self, parameter: Option<&str>) -> Result<Vec<(String, String)>> {
        match parameter {
            None => {
                let lines = self.send("?CFG")?.into_lines()?;
                Ok(split_key_values(&lines))
            }
            Some(param) => {
                // The parameter echo is consumed with the command echo;
                // whatever remains is the value.
                let tokens = self.query_tokens(&format!("?CFG {param}"))?;
                if tokens.is_empty() {
                    return Err(Error::Protocol(format!("?CFG {param}: empty reply")));
                }
                Ok(vec![(param.to_uppercase(), tokens.join(" "))])
            }
        }
    }

    /// Write configuration parameters: `CFG P1 V1 P2 V2 …`.
    pub fn set_cfg(&self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            return Err(Error::Usage("empty CFG argument list".into()));
        }
        self.write(&format!("CFG {}", args.join(" ")))
    }

    /// Configuration value types, as `(parameter, descriptor)` pairs.
    pub fn get_cfginfo(&self, parameter: Option<&str>) -> Result<Vec<(String, String)>> {
        match parameter {
            None => {
                let lines = self.send("?CFGINFO")?.into_lines()?;
                Ok(split_key_values(&lines))
            }
            Some(param) => {
                let tokens = self.query_tokens(&format!("?CFGINFO {param}"))?;
                if tokens.is_empty() {
                    return Err(Error::Protocol(format!("?CFGINFO {param}: empty reply")));
                }
                Ok(vec![(param.to_uppercase(), tokens.join(" "))])
            }
        }
    }

    /// Limit switch configuration (NORMAL, SMART, STICKY).
    pub fn cswitch(&self) -> Result<String> {
        self.query_first("?CSWITCH")
    }

    pub fn set_cswitch(&self, value: &str) -> Result<()> {
        self.write(&format!("CSWITCH {value}"))
    }

    /// Driver firmware version tree (`?VER INFO`).
    pub fn version(&self) -> Result<FirmwareVersion> {
        let lines = self.send("?VER INFO")?.into_lines()?;
        Ok(FirmwareVersion::parse(&lines))
    }

    /// Bare driver version number.
    pub fn fver(&self) -> Result<f64> {
        parse_f64(&self.query_first("?VER")?)
    }

    /// Blink the front panel LED for `secs` seconds.
    pub fn blink(&self, secs: u32) -> Result<()> {
        self.write(&format!("BLINK {secs}"))
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn status(&self) -> Result<u32> {
        parse_hex_u32(&self.query_first("?STATUS")?)
    }

    pub fn state(&self) -> Result<State> {
        Ok(State::new(self.status()?))
    }

    /// Verbose multi-line status report.
    pub fn vstatus(&self) -> Result<String> {
        Ok(self.send("?VSTATUS")?.into_lines()?.join("\n"))
    }

    pub fn stopcode(&self) -> Result<u16> {
        Ok(parse_hex_u32(&self.query_first("?STOPCODE")?)? as u16)
    }

    /// Message for the last motion's stop code.
    pub fn vstopcode(&self) -> Result<String> {
        self.query_joined("?VSTOPCODE")
    }

    /// Alarm condition: `(active, description)`.
    pub fn alarm(&self) -> Result<(bool, String)> {
        let tokens = self.query_tokens("?ALARM")?;
        if tokens.len() <= 1 {
            Ok((false, String::new()))
        } else {
            Ok((true, tokens.join(" ")))
        }
    }

    /// Active warning conditions.
    pub fn warning(&self) -> Result<Vec<String>> {
        self.send("?WARNING")?.into_any_lines()
    }

    /// Temperature warning threshold.
    pub fn wtemp(&self) -> Result<f64> {
        parse_f64(&self.query_first("?WTEMP")?)
    }

    pub fn set_wtemp(&self, value: f64) -> Result<()> {
        self.write(&format!("WTEMP {value}"))
    }

    // ------------------------------------------------------------------
    // Power
    // ------------------------------------------------------------------

    pub fn power(&self) -> Result<bool> {
        parse_on_off(&self.query_first("?POWER")?)
    }

    pub fn set_power(&self, on: bool) -> Result<()> {
        self.write(if on { "POWER ON" } else { "POWER OFF" })
    }

    /// Auxiliary power supply state.
    pub fn auxps(&self) -> Result<bool> {
        parse_on_off(&self.query_first("?AUXPS")?)
    }

    pub fn set_auxps(&self, on: bool) -> Result<()> {
        self.write(if on { "AUXPS ON" } else { "AUXPS OFF" })
    }

    // ------------------------------------------------------------------
    // Measurements
    // ------------------------------------------------------------------

    /// Measured value of an analog parameter (VCC, VM, I, IA, …).
    pub fn meas(&self, parameter: &str) -> Result<f64> {
        parse_f64(&self.query_first(&format!("?MEAS {parameter}"))?)
    }

    pub fn meas_vcc(&self) -> Result<f64> {
        self.meas("VCC")
    }

    pub fn meas_vm(&self) -> Result<f64> {
        self.meas("VM")
    }

    pub fn meas_i(&self) -> Result<f64> {
        self.meas("I")
    }

    pub fn meas_r(&self) -> Result<f64> {
        self.meas("R")
    }

    pub fn meas_t(&self) -> Result<f64> {
        self.meas("T")
    }

    pub fn meas_rt(&self) -> Result<f64> {
        self.meas("RT")
    }

    // ------------------------------------------------------------------
    // Position and encoder registers
    // ------------------------------------------------------------------

    /// Read a position register in axis units.
    pub fn get_pos(&self, register: PositionRegister) -> Result<i64> {
        parse_i64(&self.query_first(&format!("?POS {register}"))?)
    }

    pub fn set_pos(&self, register: PositionRegister, value: i64) -> Result<()> {
        self.write(&format!("POS {register} {value}"))
    }

    /// Nominal position (`AXIS` register).
    pub fn pos(&self) -> Result<i64> {
        self.get_pos(PositionRegister::Axis)
    }

    /// Read a position register in encoder steps.
    pub fn get_enc(&self, register: PositionRegister) -> Result<i64> {
        parse_i64(&self.query_first(&format!("?ENC {register}"))?)
    }

    pub fn set_enc(&self, register: PositionRegister, value: i64) -> Result<()> {
        self.write(&format!("ENC {register} {value}"))
    }

    pub fn enc(&self) -> Result<i64> {
        self.get_enc(PositionRegister::Axis)
    }

    /// Home value latched on a position register.
    pub fn home_position(&self, register: PositionRegister) -> Result<i64> {
        parse_i64(&self.query_first(&format!("?HOMEPOS {register}"))?)
    }

    /// Home value latched on an encoder register.
    pub fn home_encoder(&self, register: PositionRegister) -> Result<i64> {
        parse_i64(&self.query_first(&format!("?HOMEENC {register}"))?)
    }

    /// Search value latched on a position register.
    pub fn srch_position(&self, register: PositionRegister) -> Result<i64> {
        parse_i64(&self.query_first(&format!("?SRCHPOS {register}"))?)
    }

    /// Search value latched on an encoder register.
    pub fn srch_encoder(&self, register: PositionRegister) -> Result<i64> {
        parse_i64(&self.query_first(&format!("?SRCHENC {register}"))?)
    }

    // ------------------------------------------------------------------
    // Dynamics
    // ------------------------------------------------------------------

    /// Nominal velocity in steps per second.
    pub fn velocity(&self) -> Result<f64> {
        parse_f64(&self.query_first("?VELOCITY")?)
    }

    pub fn get_velocity(&self, vtype: steprack_protocol::VelocityType) -> Result<f64> {
        parse_f64(&self.query_first(&format!("?VELOCITY {vtype}"))?)
    }

    pub fn set_velocity(&self, value: f64) -> Result<()> {
        self.write(&format!("VELOCITY {value}"))
    }

    /// Acceleration time in seconds.
    pub fn acctime(&self) -> Result<f64> {
        parse_f64(&self.query_first("?ACCTIME")?)
    }

    pub fn get_acctime(&self, atype: AcctimeType) -> Result<f64> {
        parse_f64(&self.query_first(&format!("?ACCTIME {atype}"))?)
    }

    pub fn set_acctime(&self, value: f64) -> Result<()> {
        self.write(&format!("ACCTIME {value}"))
    }

    /// Whether the position closed loop is enabled.
    pub fn pcloop(&self) -> Result<bool> {
        parse_on_off(&self.query_first("?PCLOOP")?)
    }

    pub fn set_pcloop(&self, on: bool) -> Result<()> {
        self.write(if on { "PCLOOP ON" } else { "PCLOOP OFF" })
    }

    /// Current jog velocity.
    pub fn jog_velocity(&self) -> Result<f64> {
        parse_f64(&self.query_first("?JOG")?)
    }

    // ------------------------------------------------------------------
    // Motion
    // ------------------------------------------------------------------

    /// Start an absolute move.
    pub fn move_to(&self, position: i64) -> Result<()> {
        self.write(&format!("MOVE {position}"))
    }

    /// Update the target of the motion in progress.
    pub fn umove(&self, position: i64) -> Result<()> {
        self.write(&format!("UMOVE {position}"))
    }

    /// Start a relative move.
    pub fn rmove(&self, delta: i64) -> Result<()> {
        self.write(&format!("RMOVE {delta}"))
    }

    /// Absolute move while in configuration mode.
    pub fn cmove(&self, position: f64) -> Result<()> {
        self.write(&format!("CMOVE {position}"))
    }

    /// Move through the loaded position list to entry `lpos`.
    pub fn movel(&self, lpos: i64) -> Result<()> {
        self.write(&format!("MOVEL {lpos}"))
    }

    /// Start a parametric move.
    pub fn pmove(&self, pos: f64) -> Result<()> {
        self.write(&format!("PMOVE {pos}"))
    }

    /// Move the axis to a parameter value.
    pub fn movep(&self, pos: f64) -> Result<()> {
        self.write(&format!("MOVEP {pos}"))
    }

    /// Start jogging at `velocity`.
    pub fn jog(&self, velocity: f64) -> Result<()> {
        self.write(&format!("JOG {velocity}"))
    }

    /// Jog while in configuration mode.
    pub fn cjog(&self, velocity: f64) -> Result<()> {
        self.write(&format!("CJOG {velocity}"))
    }

    /// Stop with the normal deceleration ramp.
    pub fn stop(&self) -> Result<()> {
        self.write("STOP")
    }

    /// Abort the current movement immediately.
    pub fn abort(&self) -> Result<()> {
        self.write("ABORT")
    }

    /// Synchronize internal position registers.
    pub fn esync(&self) -> Result<()> {
        self.write("ESYNC")
    }

    /// Reset the control encoder value.
    pub fn ctrlrst(&self) -> Result<()> {
        self.write("CTRLRST")
    }

    // ------------------------------------------------------------------
    // Homing and search
    // ------------------------------------------------------------------

    /// Start the home search sequence; `mode` is -1, 0 or +1.
    pub fn home(&self, mode: i8) -> Result<()> {
        if !(-1..=1).contains(&mode) {
            return Err(Error::Usage(format!("bad home mode {mode}")));
        }
        self.write(&format!("HOME {mode}"))
    }

    /// Homing status: `(state, direction)`.
    pub fn homestat(&self) -> Result<(String, i32)> {
        let tokens = self.query_tokens("?HOMESTAT")?;
        if tokens.len() < 2 {
            return Err(Error::Protocol("?HOMESTAT: short reply".into()));
        }
        let dir = tokens[1]
            .parse()
            .map_err(|_| Error::Protocol(format!("bad homestat direction {:?}", tokens[1])))?;
        Ok((tokens[0].clone(), dir))
    }

    /// Start a search sequence on `signal`. The direction is rendered
    /// with an explicit sign; the firmware rejects a bare `1` here.
    pub fn srch(&self, signal: SearchSignal, edge: EdgeType, direction: i32) -> Result<()> {
        if direction != 1 && direction != -1 {
            return Err(Error::Usage(format!("bad search direction {direction}")));
        }
        self.write(&format!("SRCH {signal} {edge} {direction:+}"))
    }

    /// Search status: `(state, direction)`.
    pub fn srchstat(&self) -> Result<(String, i32)> {
        let tokens = self.query_tokens("?SRCHSTAT")?;
        if tokens.len() < 2 {
            return Err(Error::Protocol("?SRCHSTAT: short reply".into()));
        }
        let dir = tokens[1]
            .parse()
            .map_err(|_| Error::Protocol(format!("bad srchstat direction {:?}", tokens[1])))?;
        Ok((tokens[0].clone(), dir))
    }

    // ------------------------------------------------------------------
    // ISG service commands
    // ------------------------------------------------------------------

    /// Configure the homing signal and edge through the ISG service
    /// group. The command is written twice: affected firmwares lose a
    /// single `ISG CFGHOME` write.
    pub fn isg_cfghome(&self, signal: u8, edge: u8) -> Result<()> {
        let cmd = format!("ISG CFGHOME {signal} {edge}");
        self.write(&cmd)?;
        self.write(&cmd)
    }

    /// Homing signal configuration as reported by the ISG service group.
    pub fn isg_homecfgd(&self) -> Result<String> {
        self.query_joined("?ISG ?HOMECFGD")
    }

    /// Whether the ISG homing procedure latched home.
    pub fn isg_homed(&self) -> Result<bool> {
        Ok(self.query_first("?ISG ?HOMED")? == "1")
    }

    /// Raw switch states from the ISG service group:
    /// `(limit-, home, limit+)`.
    pub fn isg_switches(&self) -> Result<(i32, i32, i32)> {
        let tokens = self.query_tokens("?ISG ?SW")?;
        if tokens.len() < 3 {
            return Err(Error::Protocol("?ISG ?SW: short reply".into()));
        }
        let parse = |t: &String| {
            t.parse::<i32>()
                .map_err(|_| Error::Protocol(format!("bad switch state {t:?}")))
        };
        Ok((parse(&tokens[0])?, parse(&tokens[1])?, parse(&tokens[2])?))
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Follow a position source continuously.
    pub fn track(&self, source: PositionRegister, mode: TrackMode) -> Result<()> {
        self.write(&format!("TRACK {source} {mode}"))
    }

    /// Parametric tracking.
    pub fn ptrack(&self, source: PositionRegister, mode: TrackMode) -> Result<()> {
        self.write(&format!("PTRACK {source} {mode}"))
    }

    /// List tracking over the loaded position list.
    pub fn ltrack(&self, source: Option<PositionRegister>, mode: ListTrackMode) -> Result<()> {
        match source {
            Some(src) => self.write(&format!("LTRACK {src} {mode}")),
            None => self.write(&format!("LTRACK {mode}")),
        }
    }

    // ------------------------------------------------------------------
    // Parametric values and indexer
    // ------------------------------------------------------------------

    /// Position in parametric units.
    pub fn parpos(&self) -> Result<f64> {
        parse_f64(&self.query_first("?PARPOS")?)
    }

    pub fn parvel(&self) -> Result<f64> {
        parse_f64(&self.query_first("?PARVEL")?)
    }

    /// Set the parametric velocity. The value is written through zero
    /// first; some firmwares reject a direct change with an out-of-range
    /// error otherwise.
    pub fn set_parvel(&self, value: f64) -> Result<()> {
        self.write("PARVEL 0")?;
        self.write(&format!("PARVEL {value}"))
    }

    pub fn paracct(&self) -> Result<f64> {
        parse_f64(&self.query_first("?PARACCT")?)
    }

    pub fn set_paracct(&self, value: f64) -> Result<()> {
        self.write(&format!("PARACCT {value}"))
    }

    /// Motor position corresponding to a parameter value.
    pub fn parval(&self, parameter: f64) -> Result<f64> {
        parse_f64(&self.query_first(&format!("?PARVAL {parameter}"))?)
    }

    pub fn indexer(&self) -> Result<IndexerSource> {
        Ok(self.query_first("?INDEXER")?.parse()?)
    }

    pub fn set_indexer(&self, source: IndexerSource) -> Result<()> {
        self.write(&format!("INDEXER {source}"))
    }

    // ------------------------------------------------------------------
    // Info and sync signals
    // ------------------------------------------------------------------

    /// Configuration of an info/sync output port: `(signal, polarity)`.
    pub fn get_signal_cfg(&self, port: InfoPort) -> Result<(InfoSignal, Polarity)> {
        let tokens = self.query_tokens(&format!("?{port}"))?;
        if tokens.len() < 2 {
            return Err(Error::Protocol(format!("?{port}: short reply")));
        }
        Ok((tokens[0].parse()?, tokens[1].parse()?))
    }

    pub fn set_signal_cfg(
        &self,
        port: InfoPort,
        signal: InfoSignal,
        polarity: Polarity,
    ) -> Result<()> {
        self.write(&format!("{port} {signal} {polarity}"))
    }

    pub fn infoa(&self) -> Result<(InfoSignal, Polarity)> {
        self.get_signal_cfg(InfoPort::InfoA)
    }

    pub fn infob(&self) -> Result<(InfoSignal, Polarity)> {
        self.get_signal_cfg(InfoPort::InfoB)
    }

    pub fn infoc(&self) -> Result<(InfoSignal, Polarity)> {
        self.get_signal_cfg(InfoPort::InfoC)
    }

    // ------------------------------------------------------------------
    // Electronic cam
    // ------------------------------------------------------------------

    /// Current ecam output configuration.
    pub fn ecam(&self) -> Result<String> {
        self.query_joined("?ECAM")
    }

    pub fn set_ecam(&self, output: EcamOutput) -> Result<()> {
        self.write(&format!("ECAM {output}"))
    }

    /// Load the electronic cam table and switch the cam output to PULSE,
    /// the way virtually every caller wants it. Values are sorted
    /// ascending before upload.
    pub fn set_ecam_table(
        &self,
        values: &[f64],
        source: PositionRegister,
        dtype: TableDType,
    ) -> Result<()> {
        self.set_ecam_table_with(values, source, dtype, Some(EcamOutput::Pulse))
    }

    /// Same as [`Axis::set_ecam_table`] with control over the follow-up
    /// output command; `None` leaves the cam output untouched.
    pub fn set_ecam_table_with(
        &self,
        values: &[f64],
        source: PositionRegister,
        dtype: TableDType,
        enable: Option<EcamOutput>,
    ) -> Result<()> {
        let mut sorted = values.to_vec();
        if sorted.iter().any(|v| v.is_nan()) {
            return Err(Error::Usage("NaN in ecam table".into()));
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let words = table_words(&sorted, dtype)?;
        if words.len() > ECAM_TABLE_MAX_WORDS {
            return Err(Error::Usage(format!(
                "ecam table of {} words exceeds the table memory ({ECAM_TABLE_MAX_WORDS} words)",
                words.len()
            )));
        }
        self.send(&format!("*ECAMDAT {source} {dtype}"))?;
        self.ctrl.send_binary(&words)?;
        if let Some(output) = enable {
            self.set_ecam(output)?;
        }
        Ok(())
    }

    /// Clear the electronic cam table.
    pub fn clear_ecam_table(&self) -> Result<()> {
        self.write("ECAMDAT CLEAR")
    }

    /// Dump the electronic cam table, paging through `?ECAMDAT`.
    pub fn get_ecam_table(&self) -> Result<Vec<f64>> {
        self.dump_table("?ECAMDAT", false)
    }

    // ------------------------------------------------------------------
    // Position list table
    // ------------------------------------------------------------------

    /// Load a position list table.
    pub fn set_list_table(&self, values: &[f64], cyclic: bool, dtype: TableDType) -> Result<()> {
        let words = table_words(values, dtype)?;
        let mode = if cyclic { "CYCLIC" } else { "NOCYCLIC" };
        self.send(&format!("*LISTDAT {mode} {dtype}"))?;
        self.ctrl.send_binary(&words)
    }

    pub fn clear_list_table(&self) -> Result<()> {
        self.write("LISTDAT CLEAR")
    }

    /// Dump the position list table. The device reports a length one
    /// higher than the true table length here; the reader compensates.
    pub fn get_list_table(&self) -> Result<Vec<f64>> {
        self.dump_table("?LISTDAT", true)
    }

    // ------------------------------------------------------------------
    // Parametric trajectory table
    // ------------------------------------------------------------------

    /// Load a parametric trajectory with default column types (FLOAT
    /// parameters, DWORD positions, FLOAT slopes).
    pub fn set_parametric_table(
        &self,
        params: &[f64],
        positions: &[f64],
        slopes: Option<&[f64]>,
        mode: ParTableMode,
    ) -> Result<()> {
        self.set_parametric_table_with(
            params,
            positions,
            slopes,
            mode,
            TableDType::Float,
            TableDType::Dword,
            TableDType::Float,
        )
    }

    /// Load a parametric trajectory with explicit column types.
    #[allow(clippy::too_many_arguments)]
    pub fn set_parametric_table_with(
        &self,
        params: &[f64],
        positions: &[f64],
        slopes: Option<&[f64]>,
        mode: ParTableMode,
        param_type: TableDType,
        pos_type: TableDType,
        slope_type: TableDType,
    ) -> Result<()> {
        if params.len() != positions.len() {
            return Err(Error::Usage(format!(
                "parameter and position columns differ in length: {} vs {}",
                params.len(),
                positions.len()
            )));
        }
        if let Some(slopes) = slopes {
            if slopes.len() != params.len() {
                return Err(Error::Usage(format!(
                    "slope column of length {} does not match {} points",
                    slopes.len(),
                    params.len()
                )));
            }
        }
        let mut data = Vdata::new();
        data.append(params, vdata::ADDR_UNSET, ColumnRole::Parameter, param_type);
        data.append(positions, self.addr as u8, ColumnRole::Position, pos_type);
        if let Some(slopes) = slopes {
            data.append(slopes, self.addr as u8, ColumnRole::Slope, slope_type);
        }
        self.send(&format!("*PARDAT {mode}"))?;
        self.ctrl.send_binary(&data.to_words())
    }

    pub fn clear_parametric_table(&self) -> Result<()> {
        self.write("PARDAT CLEAR")
    }

    /// Dump the parametric table as `(parameters, positions, slopes)`.
    pub fn get_parametric_table(&self) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let npts: usize = self
            .query_first("?PARDAT NPTS")?
            .parse()
            .map_err(|_| Error::Protocol("bad ?PARDAT NPTS reply".into()))?;
        if npts == 0 {
            return Err(Error::Command(
                "there are no values loaded on the parametric table".into(),
            ));
        }
        let mut params = Vec::with_capacity(npts);
        let mut positions = Vec::with_capacity(npts);
        let mut slopes = Vec::with_capacity(npts);
        let mut start = 0usize;
        while start < npts {
            let count = PARDAT_PAGE.min(npts - start);
            let lines = self
                .send(&format!("?PARDAT {start} {count}"))?
                .into_any_lines()?;
            for line in &lines {
                let mut fields = line.split_whitespace();
                let (p, x, s) = (fields.next(), fields.next(), fields.next());
                match (p, x, s) {
                    (Some(p), Some(x), Some(s)) => {
                        params.push(parse_f64(p)?);
                        positions.push(parse_f64(x)?);
                        slopes.push(parse_f64(s)?);
                    }
                    _ => {
                        return Err(Error::Protocol(format!(
                            "bad parametric table row {line:?}"
                        )))
                    }
                }
            }
            start += count;
        }
        Ok((params, positions, slopes))
    }

    // ------------------------------------------------------------------
    // Table dumps
    // ------------------------------------------------------------------

    /// Page through a table dump query. Rows read
    /// `last/len : index : value`; paging continues until the last row id
    /// reaches the reported length (minus the off-by-one the list table
    /// dump is known for).
    fn dump_table(&self, query: &str, len_off_by_one: bool) -> Result<Vec<f64>> {
        let mut table = Vec::new();
        let mut start = 0usize;
        loop {
            let lines = self
                .send(&format!("{query} {DUMP_PAGE} {start}"))?
                .into_any_lines()?;
            let page = parse_dump_page(&lines)?;
            let Some((values, last, mut len)) = page else {
                // Nothing loaded at all.
                return Ok(table);
            };
            debug!(axis = self.addr, rows = values.len(), last, len, "table page");
            table.extend(values);
            if len_off_by_one {
                len = len.saturating_sub(1);
            }
            if last + 1 >= len {
                return Ok(table);
            }
            start = last + 1;
        }
    }
}

/// Split `KEY value…` lines into pairs, preserving order.
fn split_key_values(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(|line| {
            let mut fields = line.trim().splitn(2, ' ');
            let key = fields.next()?.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), fields.next().unwrap_or("").trim().to_string()))
        })
        .collect()
}

/// Parse one dump page: `(values, last_id, reported_len)`, or `None` for
/// an empty dump.
fn parse_dump_page(lines: &[String]) -> Result<Option<(Vec<f64>, usize, usize)>> {
    let mut values = Vec::with_capacity(lines.len());
    let mut last = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(':').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(Error::Protocol(format!("bad table dump row {line:?}")));
        }
        let (pos, total) = fields[0]
            .split_once('/')
            .ok_or_else(|| Error::Protocol(format!("bad table dump row {line:?}")))?;
        let pos: usize = pos
            .trim()
            .parse()
            .map_err(|_| Error::Protocol(format!("bad table dump row {line:?}")))?;
        let total: usize = total
            .trim()
            .parse()
            .map_err(|_| Error::Protocol(format!("bad table dump row {line:?}")))?;
        values.push(parse_f64(fields[2])?);
        last = Some((pos, total));
    }
    Ok(last.map(|(pos, total)| (values, pos, total)))
}

/// Convert table values into wire words according to the element type.
fn table_words(values: &[f64], dtype: TableDType) -> Result<Vec<u16>> {
    Ok(match dtype {
        TableDType::Float => block::words_from_f32(&values.iter().map(|v| *v as f32).collect::<Vec<_>>()),
        TableDType::DFloat => block::words_from_f64(values),
        TableDType::Dword => {
            block::words_from_i32(&values.iter().map(|v| *v as i32).collect::<Vec<_>>())
        }
        TableDType::Byte => {
            block::words_from_i8(&values.iter().map(|v| *v as i8).collect::<Vec<_>>())?
        }
    })
}
