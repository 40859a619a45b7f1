// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! End-to-end tests driving the built `steprack` binary against the
//! simulator.

use std::process::{Command, Output};
use steprack_simulator::{reference_axes, Simulator};

fn start_simulator() -> u16 {
    let sim = Simulator::bind("127.0.0.1:0", reference_axes()).unwrap();
    let port = sim.port();
    sim.spawn();
    port
}

fn steprack(port: u16, args: &[&str]) -> Output {
    let url = format!("127.0.0.1:{port}");
    Command::new(env!("CARGO_BIN_EXE_steprack"))
        .arg(&url)
        .args(args)
        .output()
        .expect("failed to run the steprack binary")
}

#[test]
fn state_lists_all_axes() {
    let port = start_simulator();
    let out = steprack(port, &["state", "--axes", "all"]);
    assert!(out.status.success(), "{out:?}");
    let stdout = String::from_utf8_lossy(&out.stdout);
    for needle in ["1", "5", "151", "152", "th", "chi"] {
        assert!(stdout.contains(needle), "missing {needle:?} in:\n{stdout}");
    }
}

#[test]
fn status_restricted_to_alive_axes() {
    let port = start_simulator();
    let out = steprack(port, &["status", "--axes", "alive"]);
    assert!(out.status.success(), "{out:?}");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("151"), "{stdout}");
    assert!(!stdout.contains("152"), "dead axis listed:\n{stdout}");
}

#[test]
fn mode_prints_oper() {
    let port = start_simulator();
    let out = steprack(port, &["mode"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "OPER");
}

#[test]
fn ver_prints_version_tree() {
    let port = start_simulator();
    let out = steprack(port, &["ver"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("SYSTEM"), "{stdout}");
    assert!(stdout.contains("3.17"), "{stdout}");
}

#[test]
fn send_prints_raw_reply() {
    let port = start_simulator();
    let out = steprack(port, &["send", "?FPOS", "1", "5"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "55 -3");
}

#[test]
fn move_reaches_target() {
    let port = start_simulator();
    let out = steprack(port, &["move", "1", "100"]);
    assert!(out.status.success(), "{out:?}");
    let check = steprack(port, &["send", "?FPOS", "1"]);
    assert_eq!(String::from_utf8_lossy(&check.stdout).trim(), "100");
}

#[test]
fn rmove_applies_delta() {
    let port = start_simulator();
    let out = steprack(port, &["rmove", "5", "10"]);
    assert!(out.status.success(), "{out:?}");
    let check = steprack(port, &["send", "?FPOS", "5"]);
    assert_eq!(String::from_utf8_lossy(&check.stdout).trim(), "7");
}

#[test]
fn unreachable_host_exits_nonzero() {
    // Bind and drop a port so nothing listens on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let out = steprack(port, &["mode"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error"), "{stderr}");
}

#[test]
fn odd_pair_count_is_an_error() {
    let port = start_simulator();
    let out = steprack(port, &["move", "1"]);
    assert!(!out.status.success());
}
