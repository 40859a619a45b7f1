// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;
use pretty_assertions::assert_eq;
use steprack_client::Error;
use steprack_protocol::{Disable, Mode, PositionRegister, StopCode};

#[test]
fn fast_positions_preserve_order() {
    let ctrl = start_reference();
    assert_eq!(
        ctrl.get_fpos(&[1, 5], PositionRegister::Axis).unwrap(),
        vec![55, -3]
    );
    assert_eq!(
        ctrl.get_fpos(&[5, 1], PositionRegister::Axis).unwrap(),
        vec![-3, 55]
    );
    assert_eq!(
        ctrl.get_pos(&[1, 5], PositionRegister::Axis).unwrap(),
        vec![55, -3]
    );
}

#[test]
fn multi_axis_equals_per_axis() {
    let ctrl = start_reference();
    let bulk = ctrl.get_pos(&[1, 5, 151], PositionRegister::Axis).unwrap();
    let singles: Vec<i64> = [1u16, 5, 151]
        .iter()
        .map(|a| ctrl.axis(*a).unwrap().pos().unwrap())
        .collect();
    assert_eq!(bulk, singles);
}

#[test]
fn set_pos_round_trip() {
    let ctrl = start_reference();
    ctrl.set_pos(&[(1, 1234), (5, -77)], PositionRegister::Axis)
        .unwrap();
    assert_eq!(
        ctrl.get_pos(&[1, 5], PositionRegister::Axis).unwrap(),
        vec![1234, -77]
    );
}

#[test]
fn register_variants_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    for register in [
        PositionRegister::Measure,
        PositionRegister::ShftEnc,
        PositionRegister::TgtEnc,
        PositionRegister::EncIn,
        PositionRegister::InPos,
        PositionRegister::AbsEnc,
        PositionRegister::Motor,
        PositionRegister::Sync,
    ] {
        axis.set_pos(register, 4242).unwrap();
        assert_eq!(axis.get_pos(register).unwrap(), 4242, "{register}");
        axis.set_enc(register, -17).unwrap();
        assert_eq!(axis.get_enc(register).unwrap(), -17, "{register}");
    }
}

#[test]
fn status_words_decode() {
    let ctrl = start_reference();
    let status = ctrl.get_status(&[1, 5]).unwrap();
    assert_eq!(status.len(), 2);
    let states = ctrl.get_states(&[1, 151, 152]).unwrap();
    assert!(states[0].is_present());
    assert!(states[0].is_alive());
    assert!(states[0].is_poweron());
    assert_eq!(states[0].mode(), Mode::Oper);
    assert_eq!(states[0].disable(), Disable::Enabled);
    assert_eq!(states[0].stop_code(), StopCode::EndOfMovement);
    assert!(!states[1].is_poweron(), "axis 151 starts powered off");
    assert!(!states[2].is_alive(), "axis 152 is dead");
}

#[test]
fn power_fan_out_and_round_trip() {
    let ctrl = start_reference();
    assert_eq!(ctrl.get_power(&[1, 151]).unwrap(), vec![true, false]);
    assert_eq!(ctrl.get_power(&[151, 1]).unwrap(), vec![false, true]);
    ctrl.set_power(&[151], true).unwrap();
    assert_eq!(ctrl.get_power(&[151]).unwrap(), vec![true]);
    ctrl.set_power(&[151], false).unwrap();
    assert_eq!(ctrl.get_power(&[151]).unwrap(), vec![false]);
}

#[test]
fn velocity_and_acctime_round_trip() {
    let ctrl = start_reference();
    ctrl.set_velocity(&[(1, 200.0)]).unwrap();
    assert_eq!(ctrl.get_velocity(&[1]).unwrap(), vec![200.0]);
    ctrl.set_acctime(&[(1, 0.1)]).unwrap();
    assert_eq!(ctrl.get_acctime(&[1]).unwrap(), vec![0.1]);

    let axis = ctrl.axis(1).unwrap();
    axis.set_velocity(300.0).unwrap();
    assert_eq!(axis.velocity().unwrap(), 300.0);
    assert_eq!(
        axis.get_velocity(steprack_protocol::VelocityType::Max).unwrap(),
        3000.0
    );
}

#[test]
fn query_to_missing_board_is_command_error() {
    let ctrl = start_reference();
    let axis = ctrl.axis(2).unwrap(); // valid address, no board
    match axis.pos() {
        Err(Error::Command(msg)) => assert!(msg.contains("not present"), "{msg}"),
        other => panic!("expected a command error, got {other:?}"),
    }
}

#[test]
fn axis_identity_and_attributes() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    assert_eq!(axis.remote_addr().unwrap(), 1);
    assert_eq!(axis.name().unwrap(), "th");
    assert!(axis.is_active().unwrap());
    assert!(axis.power().unwrap());
    assert_eq!(axis.mode().unwrap(), steprack_protocol::SystemMode::Oper);
    let (hw, sn) = axis.id().unwrap();
    assert!(!hw.is_empty());
    assert!(!sn.is_empty());

    axis.set_name("theta").unwrap();
    assert_eq!(axis.name().unwrap(), "theta");

    axis.set_pcloop(false).unwrap();
    assert!(!axis.pcloop().unwrap());
}

#[test]
fn signal_port_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    use steprack_protocol::{InfoPort, InfoSignal, Polarity};
    axis.set_signal_cfg(InfoPort::InfoA, InfoSignal::Low, Polarity::Inverted)
        .unwrap();
    assert_eq!(
        axis.infoa().unwrap(),
        (InfoSignal::Low, Polarity::Inverted)
    );
    let (signal, polarity) = axis.infob().unwrap();
    assert_eq!(signal, InfoSignal::High);
    assert_eq!(polarity, Polarity::Normal);
}

#[test]
fn cfg_dump_and_single_parameter() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    let cfg = axis.get_cfg(None).unwrap();
    assert!(cfg.iter().any(|(k, v)| k == "ACTIVE" && v == "YES"));

    let single = axis.get_cfg(Some("NVOLT")).unwrap();
    assert_eq!(single, vec![("NVOLT".to_string(), "48".to_string())]);

    axis.set_cfg(&["NVOLT", "24"]).unwrap();
    assert_eq!(
        axis.get_cfg(Some("NVOLT")).unwrap(),
        vec![("NVOLT".to_string(), "24".to_string())]
    );
}

#[test]
fn rack_info() {
    let ctrl = start_reference();
    let rids = ctrl.get_rid(&[0, 15]).unwrap();
    assert_eq!(rids.len(), 2);
    assert!(rids[0].starts_with("0008."));
    let temps = ctrl.get_rtemp(&[0, 15]).unwrap();
    assert_eq!(temps.len(), 2);
    assert!(matches!(ctrl.get_rid(&[16]), Err(Error::Usage(_))));
}

#[test]
fn raw_send_cmd() {
    let ctrl = start_reference();
    let reply = ctrl.send_cmd("?MODE").unwrap();
    assert_eq!(
        reply,
        steprack_client::Reply::Tokens(vec!["OPER".to_string()])
    );
}
