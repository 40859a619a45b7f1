// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Namespaces used to build commands: position/encoder registers, info
//! signal sources and polarities, tracking modes, search edges, ecam
//! outputs and system modes.
//!
//! Each enum renders to the exact token the controller expects and parses
//! back from replies case-insensitively.

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

macro_rules! token_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal, { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Wire token for this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }

            /// Every value in namespace order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let upper = s.to_uppercase();
                match upper.as_str() {
                    $($token => Ok($name::$variant),)+
                    _ => Err(ProtocolError::InvalidValue {
                        what: $what,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

token_enum!(
    /// Position and encoder register selectors (`?POS <reg>`, `?ENC <reg>`).
    PositionRegister, "position register", {
        Axis => "AXIS",
        Measure => "MEASURE",
        ShftEnc => "SHFTENC",
        TgtEnc => "TGTENC",
        CtrlEnc => "CTRLENC",
        EncIn => "ENCIN",
        InPos => "INPOS",
        AbsEnc => "ABSENC",
        Motor => "MOTOR",
        Sync => "SYNC",
    }
);

token_enum!(
    /// Signal sources accepted by INFOA/B/C, OUTPOS, OUTPAUX, SYNCPOS and
    /// SYNCAUX.
    InfoSignal, "info signal", {
        Low => "LOW",
        High => "HIGH",
        LimitPos => "LIM+",
        LimitNeg => "LIM-",
        Home => "HOME",
        EncAux => "ENCAUX",
        InpAux => "INPAUX",
        SyncAux => "SYNCAUX",
        Enable => "ENABLE",
        Alarm => "ALARM",
        Ready => "READY",
        Moving => "MOVING",
        Boost => "BOOST",
        Steady => "STEADY",
        Ecam => "ECAM",
        Axis => "AXIS",
        Motor => "MOTOR",
        Enabled => "ENABLED",
    }
);

token_enum!(
    /// Signal polarity.
    Polarity, "polarity", {
        Normal => "NORMAL",
        Inverted => "INVERTED",
    }
);

token_enum!(
    /// Tracking refinement for TRACK/PTRACK.
    TrackMode, "track mode", {
        Simple => "SIMPLE",
        Smart => "SMART",
        Full => "FULL",
    }
);

token_enum!(
    /// List-tracking refinement for LTRACK.
    ListTrackMode, "list track mode", {
        Cyclic => "CYCLIC",
        NoCyclic => "NOCYCLIC",
    }
);

token_enum!(
    /// Edge selector for search routines.
    EdgeType, "edge type", {
        PosEdge => "POSEDGE",
        NegEdge => "NEGEDGE",
    }
);

token_enum!(
    /// Signals a SRCH sequence may latch on.
    SearchSignal, "search signal", {
        LimitPos => "LIM+",
        LimitNeg => "LIM-",
        Home => "HOME",
        EncAux => "ENCAUX",
        InpAux => "INPAUX",
    }
);

token_enum!(
    /// Electronic-cam output configuration.
    EcamOutput, "ecam output", {
        Off => "OFF",
        Pulse => "PULSE",
        Low => "LOW",
        High => "HIGH",
    }
);

token_enum!(
    /// System or axis operating mode as reported by `?MODE`.
    SystemMode, "system mode", {
        Oper => "OPER",
        Prog => "PROG",
        Test => "TEST",
        Fail => "FAIL",
        Config => "CONFIG",
    }
);

token_enum!(
    /// Velocity selector for `?VELOCITY`.
    VelocityType, "velocity type", {
        Nominal => "NOMINAL",
        Min => "MIN",
        Max => "MAX",
        Default => "DEFAULT",
        Current => "CURRENT",
    }
);

token_enum!(
    /// Acceleration-time selector for `?ACCTIME`.
    AcctimeType, "acctime type", {
        Nominal => "NOMINAL",
        Steps => "STEPS",
        Default => "DEFAULT",
    }
);

token_enum!(
    /// Indexer signal source accepted by `INDEXER`.
    IndexerSource, "indexer source", {
        Internal => "INTERNAL",
        InSystem => "INSYSTEM",
        External => "EXTERNAL",
        Linked => "LINKED",
    }
);

token_enum!(
    /// The configurable info/sync output ports of a driver.
    InfoPort, "info port", {
        InfoA => "INFOA",
        InfoB => "INFOB",
        InfoC => "INFOC",
        OutPos => "OUTPOS",
        OutPAux => "OUTPAUX",
        SyncPos => "SYNCPOS",
        SyncAux => "SYNCAUX",
    }
);

token_enum!(
    /// Element type of an uploaded table.
    TableDType, "table data type", {
        Byte => "BYTE",
        Dword => "DWORD",
        Float => "FLOAT",
        DFloat => "DFLOAT",
    }
);

token_enum!(
    /// Interpolation mode of a parametric trajectory table.
    ParTableMode, "parametric table mode", {
        Linear => "LINEAR",
        Spline => "SPLINE",
        Cyclic => "CYCLIC",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_tokens_round_trip() {
        for reg in PositionRegister::ALL {
            assert_eq!(&reg.as_str().parse::<PositionRegister>().unwrap(), reg);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "shftenc".parse::<PositionRegister>().unwrap(),
            PositionRegister::ShftEnc
        );
        assert_eq!("lim+".parse::<SearchSignal>().unwrap(), SearchSignal::LimitPos);
        assert_eq!("pulse".parse::<EcamOutput>().unwrap(), EcamOutput::Pulse);
    }

    #[test]
    fn unknown_token_is_invalid_value() {
        let err = "BOGUS".parse::<Polarity>().unwrap_err();
        assert_eq!(err.to_string(), "invalid polarity: \"BOGUS\"");
    }

    #[test]
    fn search_signals_are_a_subset_of_info_signals() {
        for sig in SearchSignal::ALL {
            assert!(sig.as_str().parse::<InfoSignal>().is_ok());
        }
    }
}
