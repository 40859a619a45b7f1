// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Pure data model for the StepRack ASCII/binary wire protocol.
//!
//! This crate holds everything about the protocol that does not touch a
//! socket: the 32-bit board status word and its field decoders, the
//! register/signal/mode namespaces used to build commands, the firmware
//! version record produced by `?VER INFO`, and the binary framing used for
//! table and firmware uploads. `steprack-client` builds commands and parses
//! replies on top of it; `steprack-simulator` uses the same types from the
//! device side so both ends of a test share one definition.

pub mod block;
pub mod registers;
pub mod status;
pub mod vdata;
pub mod version;

pub use block::{encode_block, BlockHeader, START_MARK};
pub use registers::{
    AcctimeType, EcamOutput, EdgeType, IndexerSource, InfoPort, InfoSignal, ListTrackMode,
    ParTableMode, Polarity, PositionRegister, SearchSignal, SystemMode, TableDType, TrackMode,
    VelocityType,
};
pub use status::{Disable, Indexer, Mode, State, StopCode};
pub use vdata::{ColumnRole, Vdata, ADDR_UNSET};
pub use version::{ComponentVersion, FirmwareVersion, Subsystem};

/// Default TCP port a StepRack controller listens on.
pub const DEFAULT_PORT: u16 = 5000;

/// Highest addressable axis (`rack 15, driver 8`).
pub const MAX_AXIS: u16 = 158;

/// Errors raised by the protocol data model.
///
/// These never involve I/O: they come from parsing tokens the controller
/// sent or validating values a caller is about to send.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A token does not belong to the expected namespace (register name,
    /// signal, polarity, ...).
    #[error("invalid {what}: {value:?}")]
    InvalidValue {
        /// Namespace the value was checked against.
        what: &'static str,
        /// The offending token.
        value: String,
    },

    /// A binary frame or a structured reply is malformed.
    #[error("malformed frame: {0}")]
    Frame(String),
}

/// Returns true iff `addr` denotes a valid axis: `rack*10 + index` with
/// `rack` in `0..=15` and `index` in `1..=8`. Address 0 (the system master)
/// is *not* an axis address.
pub fn is_valid_axis(addr: u16) -> bool {
    let (rack, index) = (addr / 10, addr % 10);
    rack <= 15 && (1..=8).contains(&index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_axis_addresses() {
        assert!(is_valid_axis(1));
        assert!(is_valid_axis(8));
        assert!(is_valid_axis(151));
        assert!(is_valid_axis(158));
        assert!(!is_valid_axis(0));
        assert!(!is_valid_axis(9));
        assert!(!is_valid_axis(10));
        assert!(!is_valid_axis(159));
        assert!(!is_valid_axis(161));
        assert!(!is_valid_axis(200));
    }

    #[test]
    fn all_valid_axes_count() {
        let count = (0..=MAX_AXIS).filter(|a| is_valid_axis(*a)).count();
        assert_eq!(count, 16 * 8);
    }
}
