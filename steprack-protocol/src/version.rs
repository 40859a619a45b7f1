// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Firmware version records parsed from `?VER INFO` replies.
//!
//! The controller reports versions as an indented tree, e.g.
//!
//! ```text
//! SYSTEM       :  3.17 : Tue Feb 16 10:57:37 2016
//!    CONTROLLER:  3.17
//!       DSP    :  3.67 : Mon Dec 14 13:22:03 2015
//!       FPGA   :  1.00
//!    DRIVER    :  3.17
//! ```
//!
//! Indentation widths of 0, 3 and 6 spaces denote the three nesting levels.
//! Leaves are `(version, timestamp)` pairs; an unparsable version number is
//! recorded as `-1.0` rather than dropped, so a damaged line is visible in
//! the record instead of silently missing.

use std::collections::BTreeMap;
use std::fmt;

/// A `(version, build timestamp)` leaf. The timestamp may be empty; not
/// every component reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentVersion {
    pub version: f64,
    pub timestamp: String,
}

impl ComponentVersion {
    fn new(version: f64, timestamp: &str) -> ComponentVersion {
        ComponentVersion {
            version,
            timestamp: timestamp.to_string(),
        }
    }
}

/// One level-1 subsystem (CONTROLLER or DRIVER): its own version plus the
/// level-2 component leaves under it (DSP, FPGA, PCB, MCPUx, IO).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subsystem {
    pub version: Option<ComponentVersion>,
    pub components: BTreeMap<String, ComponentVersion>,
}

/// Parsed firmware version tree for a whole system or a single axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirmwareVersion {
    pub system: Option<ComponentVersion>,
    pub subsystems: BTreeMap<String, Subsystem>,
}

/// Pinned component versions for one validated release.
struct Pinned {
    system: f64,
    controller: &'static [(&'static str, f64)],
    driver: &'static [(&'static str, f64)],
}

// Releases validated against this library. A system passes is_supported()
// only when every pinned leaf matches exactly.
const SUPPORTED: &[(&str, Pinned)] = &[
    (
        "1.22",
        Pinned {
            system: 1.22,
            controller: &[
                ("VER", 1.22),
                ("DSP", 2.84),
                ("FPGA", 0.03),
                ("MCPU0", 0.2),
                ("MCPU1", 0.2),
                ("MCPU2", 1.125),
            ],
            driver: &[("VER", 1.22)],
        },
    ),
    (
        "1.225",
        Pinned {
            system: 1.225,
            controller: &[
                ("VER", 1.225),
                ("DSP", 2.85),
                ("FPGA", 0.03),
                ("MCPU0", 0.23),
                ("MCPU1", 0.23),
                ("MCPU2", 1.125),
            ],
            driver: &[("VER", 1.225)],
        },
    ),
    (
        "3.17",
        Pinned {
            system: 3.17,
            controller: &[
                ("VER", 3.17),
                ("DSP", 3.67),
                ("FPGA", 1.0),
                ("MCPU0", 1.19),
                ("MCPU1", 1.19),
                ("MCPU2", 1.125),
            ],
            driver: &[("VER", 3.17)],
        },
    ),
];

/// System version strings this library has been validated against.
pub fn supported_versions() -> Vec<&'static str> {
    SUPPORTED.iter().map(|(name, _)| *name).collect()
}

impl FirmwareVersion {
    /// Parse the payload lines of a `?VER INFO` reply (the lines between
    /// the `$` delimiters, in order).
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> FirmwareVersion {
        let mut out = FirmwareVersion::default();
        let mut current_sub: Option<String> = None;
        for raw in lines {
            let raw = raw.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            let indent = raw.len() - raw.trim_start().len();
            let mut fields = raw.splitn(3, ':');
            let component = fields.next().unwrap_or("").trim().to_uppercase();
            if component.is_empty() {
                continue;
            }
            let version = fields
                .next()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(-1.0);
            let when = fields.next().unwrap_or("").trim();
            let leaf = ComponentVersion::new(version, when);
            match indent {
                0 => {
                    out.system = Some(leaf);
                    current_sub = None;
                }
                3 => {
                    out.subsystems
                        .entry(component.clone())
                        .or_default()
                        .version = Some(leaf);
                    current_sub = Some(component);
                }
                6 => {
                    if let Some(sub) = &current_sub {
                        if let Some(entry) = out.subsystems.get_mut(sub) {
                            entry.components.insert(component, leaf);
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn subsystem(&self, name: &str) -> Option<&Subsystem> {
        self.subsystems.get(name)
    }

    fn sub_leaf(&self, sub: &str, component: &str) -> Option<&ComponentVersion> {
        let sub = self.subsystem(sub)?;
        if component == "VER" {
            sub.version.as_ref()
        } else {
            sub.components.get(component)
        }
    }

    /// Overall system version leaf.
    pub fn system(&self) -> Option<&ComponentVersion> {
        self.system.as_ref()
    }

    pub fn controller(&self) -> Option<&ComponentVersion> {
        self.sub_leaf("CONTROLLER", "VER")
    }

    pub fn controller_component(&self, component: &str) -> Option<&ComponentVersion> {
        self.sub_leaf("CONTROLLER", &component.to_uppercase())
    }

    pub fn driver(&self) -> Option<&ComponentVersion> {
        self.sub_leaf("DRIVER", "VER")
    }

    pub fn driver_component(&self, component: &str) -> Option<&ComponentVersion> {
        self.sub_leaf("DRIVER", &component.to_uppercase())
    }

    /// All driver-level leaves, VER included, keyed by component name.
    /// Backups persist exactly this map.
    pub fn driver_components(&self) -> BTreeMap<String, f64> {
        self.named_components("DRIVER")
    }

    /// All controller-level leaves, VER included, keyed by component name.
    pub fn controller_components(&self) -> BTreeMap<String, f64> {
        self.named_components("CONTROLLER")
    }

    fn named_components(&self, name: &str) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        if let Some(sub) = self.subsystem(name) {
            if let Some(ver) = &sub.version {
                out.insert("VER".to_string(), ver.version);
            }
            for (component, leaf) in &sub.components {
                out.insert(component.clone(), leaf.version);
            }
        }
        out
    }

    fn pinned(&self) -> Option<&'static Pinned> {
        let system = self.system()?.version;
        SUPPORTED
            .iter()
            .find(|(_, pinned)| pinned.system == system)
            .map(|(_, pinned)| pinned)
    }

    /// True iff the system version is a validated release and every pinned
    /// component leaf matches it exactly.
    pub fn is_supported(&self) -> bool {
        let Some(pinned) = self.pinned() else {
            return false;
        };
        let check = |expected: &[(&str, f64)], sub: &str| {
            expected.iter().all(|(component, version)| {
                self.sub_leaf(sub, component)
                    .is_some_and(|leaf| leaf.version == *version)
            })
        };
        check(pinned.controller, "CONTROLLER") && check(pinned.driver, "DRIVER")
    }
}

fn fmt_leaf(f: &mut fmt::Formatter<'_>, indent: usize, name: &str, leaf: &ComponentVersion) -> fmt::Result {
    let pad = " ".repeat(indent);
    let width = 13usize.saturating_sub(indent);
    if leaf.timestamp.is_empty() {
        writeln!(f, "{pad}{name:<width$}: {:5}", leaf.version)
    } else {
        writeln!(f, "{pad}{name:<width$}: {:5} : {}", leaf.version, leaf.timestamp)
    }
}

impl fmt::Display for FirmwareVersion {
    /// Re-indents the record in the controller's own format, so a parsed
    /// tree prints back with the same leaf set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(system) = &self.system {
            fmt_leaf(f, 0, "SYSTEM", system)?;
        }
        for (name, sub) in &self.subsystems {
            if let Some(version) = &sub.version {
                fmt_leaf(f, 3, name, version)?;
            }
            for (component, leaf) in &sub.components {
                fmt_leaf(f, 6, component, leaf)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MASTER_INFO: &[&str] = &[
        "SYSTEM       :  3.17 : Tue Feb 16 10:57:37 2016",
        "   CONTROLLER:  3.17",
        "      DSP    :  3.67 : Mon Dec 14 13:22:03 2015",
        "      FPGA   :  1.00 : Tue Jan 21 19:33:00 2014",
        "      MCPU0  :  1.19",
        "      MCPU1  :  1.19",
        "      MCPU2  :  1.125",
        "   DRIVER    :  3.17",
    ];

    const DRIVER_INFO: &[&str] = &[
        "SYSTEM       :  3.17 : Tue Feb 16 10:57:37 2016",
        "   CONTROLLER:  3.17",
        "   DRIVER    :  3.17",
        "      DSP    :  3.67 : Mon Dec 14 13:22:03 2015",
        "      FPGA   :  7.01 : Sat Mar  7 20:35:00 2015",
        "      PCB    :  1.00",
        "      IO     :  1.00",
    ];

    #[test]
    fn parse_master_tree() {
        let ver = FirmwareVersion::parse(MASTER_INFO);
        assert_eq!(ver.system().unwrap().version, 3.17);
        assert_eq!(ver.system().unwrap().timestamp, "Tue Feb 16 10:57:37 2016");
        assert_eq!(ver.controller().unwrap().version, 3.17);
        assert_eq!(ver.controller_component("DSP").unwrap().version, 3.67);
        assert_eq!(
            ver.controller_component("DSP").unwrap().timestamp,
            "Mon Dec 14 13:22:03 2015"
        );
        assert_eq!(ver.controller_component("MCPU2").unwrap().version, 1.125);
        assert_eq!(ver.driver().unwrap().version, 3.17);
        assert!(ver.driver_component("DSP").is_none());
    }

    #[test]
    fn parse_driver_tree() {
        let ver = FirmwareVersion::parse(DRIVER_INFO);
        assert_eq!(ver.driver_component("FPGA").unwrap().version, 7.01);
        assert_eq!(ver.driver_component("IO").unwrap().version, 1.0);
        assert_eq!(
            ver.driver_components().keys().collect::<Vec<_>>(),
            ["DSP", "FPGA", "IO", "PCB", "VER"]
        );
    }

    #[test]
    fn unparsable_version_becomes_negative() {
        let ver = FirmwareVersion::parse(&["SYSTEM : garbage : some day"]);
        assert_eq!(ver.system().unwrap().version, -1.0);
    }

    #[test]
    fn display_reparses_to_same_leaves() {
        let ver = FirmwareVersion::parse(MASTER_INFO);
        let rendered = ver.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        let reparsed = FirmwareVersion::parse(&lines);
        assert_eq!(ver, reparsed);
    }

    #[test]
    fn supported_release_is_accepted() {
        let ver = FirmwareVersion::parse(MASTER_INFO);
        assert!(ver.is_supported());
    }

    #[test]
    fn component_mismatch_is_rejected() {
        let mut lines: Vec<String> = MASTER_INFO.iter().map(|l| l.to_string()).collect();
        lines[2] = "      DSP    :  3.68".to_string();
        assert!(!FirmwareVersion::parse(&lines).is_supported());
    }

    #[test]
    fn unknown_system_version_is_rejected() {
        let ver = FirmwareVersion::parse(&["SYSTEM : 9.99"]);
        assert!(!ver.is_supported());
    }

    #[test]
    fn supported_version_names() {
        assert_eq!(supported_versions(), ["1.22", "1.225", "3.17"]);
    }
}
