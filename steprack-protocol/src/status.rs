// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Decoder for the 32-bit board status register.
//!
//! The layout is fixed by the controller firmware:
//!
//! | bits  | field    | meaning                                         |
//! |-------|----------|-------------------------------------------------|
//! | 0     | PRESENT  | driver present                                  |
//! | 1     | ALIVE    | board responsive                                |
//! | 2-3   | MODE     | 0 OPER, 1 PROG, 2 TEST, 3 FAIL                  |
//! | 4-6   | DISABLE  | 0 enabled, 1-7 specific disable causes          |
//! | 7-8   | INDEXER  | 0 internal, 1 in-system, 2 external, 3 linked   |
//! | 9     | READY    | ready to move                                   |
//! | 10    | MOVING   | axis moving                                     |
//! | 11    | SETTLING | closed loop settling                            |
//! | 12    | OUTOFWIN | out of settle window                            |
//! | 13    | WARNING  | warning condition                               |
//! | 14-17 | STOPCODE | why the last motion ended                       |
//! | 18    | LIMIT+   | limit+ signal live                              |
//! | 19    | LIMIT-   | limit- signal live                              |
//! | 20    | HOME     | home switch reached                             |
//! | 21    | 5VPOWER  | aux 5V supply on                                |
//! | 22    | VERSERR  | firmware version mismatch                       |
//! | 23    | POWERON  | motor power on                                  |
//! | 24-31 | INFO     | programming phase / master indexer              |

use std::fmt;

/// Board operating mode (status bits 2-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Oper,
    Prog,
    Test,
    Fail,
}

impl Mode {
    fn from_code(code: u32) -> Mode {
        match code & 0b11 {
            0 => Mode::Oper,
            1 => Mode::Prog,
            2 => Mode::Test,
            _ => Mode::Fail,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Oper => "OPER",
            Mode::Prog => "PROG",
            Mode::Test => "TEST",
            Mode::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

/// Motor power disable cause (status bits 4-6). Zero means enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disable {
    Enabled,
    AxisNotActive,
    HardwareAlarm,
    RemoteRackDisable,
    LocalRackDisable,
    RemoteAxisDisable,
    LocalAxisDisable,
    Software,
}

impl Disable {
    fn from_code(code: u32) -> Disable {
        match code & 0b111 {
            0 => Disable::Enabled,
            1 => Disable::AxisNotActive,
            2 => Disable::HardwareAlarm,
            3 => Disable::RemoteRackDisable,
            4 => Disable::LocalRackDisable,
            5 => Disable::RemoteAxisDisable,
            6 => Disable::LocalAxisDisable,
            _ => Disable::Software,
        }
    }

    /// Human-readable description, as printed by state tables.
    pub fn description(&self) -> &'static str {
        match self {
            Disable::Enabled => "Enabled",
            Disable::AxisNotActive => "Axis not active",
            Disable::HardwareAlarm => "Hardware alarm",
            Disable::RemoteRackDisable => "Remote rack disable input signal",
            Disable::LocalRackDisable => "Local rack disable switch",
            Disable::RemoteAxisDisable => "Remote axis disable input signal",
            Disable::LocalAxisDisable => "Local axis disable switch",
            Disable::Software => "Software disable",
        }
    }
}

impl fmt::Display for Disable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Indexer signal source (status bits 7-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexer {
    Internal,
    InSystem,
    External,
    Linked,
}

impl Indexer {
    fn from_code(code: u32) -> Indexer {
        match code & 0b11 {
            0 => Indexer::Internal,
            1 => Indexer::InSystem,
            2 => Indexer::External,
            _ => Indexer::Linked,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Indexer::Internal => "Internal indexer",
            Indexer::InSystem => "In-system indexer",
            Indexer::External => "External indexer",
            Indexer::Linked => "Linked axis indexer",
        }
    }
}

impl fmt::Display for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Reason the last motion ended (status bits 14-17).
///
/// Codes 7 and 14 are not assigned by any known firmware; they decode to
/// [`StopCode::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCode {
    EndOfMovement,
    Stop,
    Abort,
    LimitPos,
    LimitNeg,
    SettlingTimeout,
    AxisDisabled,
    InternalFailure,
    MotorFailure,
    PowerOverload,
    DriverOverheating,
    CloseLoopError,
    ControlEncoderError,
    ExternalAlarm,
    Unknown(u8),
}

impl StopCode {
    fn from_code(code: u32) -> StopCode {
        match code & 0b1111 {
            0 => StopCode::EndOfMovement,
            1 => StopCode::Stop,
            2 => StopCode::Abort,
            3 => StopCode::LimitPos,
            4 => StopCode::LimitNeg,
            5 => StopCode::SettlingTimeout,
            6 => StopCode::AxisDisabled,
            8 => StopCode::InternalFailure,
            9 => StopCode::MotorFailure,
            10 => StopCode::PowerOverload,
            11 => StopCode::DriverOverheating,
            12 => StopCode::CloseLoopError,
            13 => StopCode::ControlEncoderError,
            15 => StopCode::ExternalAlarm,
            other => StopCode::Unknown(other as u8),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            StopCode::EndOfMovement => 0,
            StopCode::Stop => 1,
            StopCode::Abort => 2,
            StopCode::LimitPos => 3,
            StopCode::LimitNeg => 4,
            StopCode::SettlingTimeout => 5,
            StopCode::AxisDisabled => 6,
            StopCode::InternalFailure => 8,
            StopCode::MotorFailure => 9,
            StopCode::PowerOverload => 10,
            StopCode::DriverOverheating => 11,
            StopCode::CloseLoopError => 12,
            StopCode::ControlEncoderError => 13,
            StopCode::ExternalAlarm => 15,
            StopCode::Unknown(c) => *c,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StopCode::EndOfMovement => "End of movement",
            StopCode::Stop => "Stop",
            StopCode::Abort => "Abort",
            StopCode::LimitPos => "Limit+ reached",
            StopCode::LimitNeg => "Limit- reached",
            StopCode::SettlingTimeout => "Settling timeout",
            StopCode::AxisDisabled => "Axis disabled",
            StopCode::InternalFailure => "Internal failure",
            StopCode::MotorFailure => "Motor failure",
            StopCode::PowerOverload => "Power overload",
            StopCode::DriverOverheating => "Driver overheating",
            StopCode::CloseLoopError => "Close loop error",
            StopCode::ControlEncoderError => "Control encoder error",
            StopCode::ExternalAlarm => "External alarm",
            StopCode::Unknown(_) => "n/a",
        }
    }
}

impl fmt::Display for StopCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Immutable snapshot of a board status register.
///
/// Construction never fails; every accessor reads the fixed bit layout and
/// unknown field values map to sentinels rather than errors. The raw word
/// is kept as-is, so `State::new(w).register() == w` for every `w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State(u32);

impl State {
    pub const fn new(register: u32) -> State {
        State(register)
    }

    /// The raw 32-bit register this snapshot decodes.
    pub const fn register(&self) -> u32 {
        self.0
    }

    fn bit(&self, n: u32) -> bool {
        (self.0 >> n) & 1 == 1
    }

    pub fn is_present(&self) -> bool {
        self.bit(0)
    }

    pub fn is_alive(&self) -> bool {
        self.bit(1)
    }

    pub fn mode(&self) -> Mode {
        Mode::from_code(self.0 >> 2)
    }

    pub fn disable(&self) -> Disable {
        Disable::from_code(self.0 >> 4)
    }

    pub fn is_disabled(&self) -> bool {
        self.disable() != Disable::Enabled
    }

    pub fn indexer(&self) -> Indexer {
        Indexer::from_code(self.0 >> 7)
    }

    pub fn is_ready(&self) -> bool {
        self.bit(9)
    }

    pub fn is_moving(&self) -> bool {
        self.bit(10)
    }

    pub fn is_settling(&self) -> bool {
        self.bit(11)
    }

    pub fn is_outofwin(&self) -> bool {
        self.bit(12)
    }

    pub fn is_warning(&self) -> bool {
        self.bit(13)
    }

    pub fn stop_code(&self) -> StopCode {
        StopCode::from_code(self.0 >> 14)
    }

    pub fn is_limit_positive(&self) -> bool {
        self.bit(18)
    }

    pub fn is_limit_negative(&self) -> bool {
        self.bit(19)
    }

    pub fn is_inhome(&self) -> bool {
        self.bit(20)
    }

    pub fn is_5vpower(&self) -> bool {
        self.bit(21)
    }

    pub fn is_verserr(&self) -> bool {
        self.bit(22)
    }

    pub fn is_poweron(&self) -> bool {
        self.bit(23)
    }

    /// Programming phase (PROG mode) or master indexer (OPER mode).
    pub fn info_code(&self) -> u8 {
        (self.0 >> 24) as u8
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trip() {
        for word in [0u32, 0x00205013, 0x00A03203, 0xFFFFFFFF, 0x12345678] {
            assert_eq!(State::new(word).register(), word);
        }
    }

    #[test]
    fn decode_reference_word() {
        // Word captured from a parked axis with its driver deactivated.
        let state = State::new(0x0020_5013);
        assert!(state.is_present());
        assert!(state.is_alive());
        assert_eq!(state.mode(), Mode::Oper);
        assert!(state.is_disabled());
        assert_eq!(state.disable(), Disable::AxisNotActive);
        assert_eq!(state.disable().description(), "Axis not active");
        assert_eq!(state.indexer(), Indexer::Internal);
        assert!(!state.is_ready());
        assert!(!state.is_moving());
        assert!(!state.is_settling());
        assert!(state.is_outofwin());
        assert!(!state.is_warning());
        assert_eq!(state.stop_code(), StopCode::Stop);
        assert_eq!(state.stop_code().description(), "Stop");
        assert!(!state.is_limit_positive());
        assert!(!state.is_limit_negative());
        assert!(!state.is_inhome());
        assert!(state.is_5vpower());
        assert!(!state.is_verserr());
        assert!(!state.is_poweron());
        assert_eq!(state.info_code(), 0);
    }

    #[test]
    fn decode_powered_ready_word() {
        // Default simulator word: powered, ready, aux 5V on.
        let state = State::new(0x00A0_3203);
        assert!(state.is_present());
        assert!(state.is_alive());
        assert_eq!(state.disable(), Disable::Enabled);
        assert!(!state.is_disabled());
        assert!(state.is_ready());
        assert!(!state.is_moving());
        assert!(state.is_poweron());
        assert!(state.is_5vpower());
    }

    #[test]
    fn moving_bit() {
        let stopped = State::new(0x00A0_3203);
        let moving = State::new(0x00A0_3203 | (1 << 10));
        assert!(!stopped.is_moving());
        assert!(moving.is_moving());
    }

    #[test]
    fn mode_codes_exhaustive() {
        assert_eq!(State::new(0b00 << 2).mode(), Mode::Oper);
        assert_eq!(State::new(0b01 << 2).mode(), Mode::Prog);
        assert_eq!(State::new(0b10 << 2).mode(), Mode::Test);
        assert_eq!(State::new(0b11 << 2).mode(), Mode::Fail);
    }

    #[test]
    fn stop_codes_cover_all_sixteen_values() {
        for code in 0u32..16 {
            let state = State::new(code << 14);
            assert_eq!(state.stop_code().code() as u32, code);
        }
        assert_eq!(State::new(7 << 14).stop_code(), StopCode::Unknown(7));
        assert_eq!(State::new(14 << 14).stop_code(), StopCode::Unknown(14));
        assert_eq!(State::new(15 << 14).stop_code(), StopCode::ExternalAlarm);
    }

    #[test]
    fn info_code_is_top_byte() {
        assert_eq!(State::new(0xAB00_0000).info_code(), 0xAB);
        assert_eq!(State::new(0x00FF_FFFF).info_code(), 0);
    }
}
