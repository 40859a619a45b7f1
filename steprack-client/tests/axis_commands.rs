// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;
use steprack_protocol::{
    EdgeType, IndexerSource, ListTrackMode, PositionRegister, SearchSignal, TrackMode,
};

#[test]
fn homing_and_search() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.home(1).unwrap();
    assert!(axis.home(2).is_err(), "home mode must be -1, 0 or 1");
    let (state, direction) = axis.homestat().unwrap();
    assert_eq!(state, "DONE");
    assert_eq!(direction, 1);
    assert_eq!(axis.home_position(PositionRegister::Axis).unwrap(), 0);

    axis.srch(SearchSignal::Home, EdgeType::PosEdge, 1).unwrap();
    axis.srch(SearchSignal::LimitNeg, EdgeType::NegEdge, -1).unwrap();
    assert!(axis.srch(SearchSignal::Home, EdgeType::PosEdge, 2).is_err());
    let (state, _) = axis.srchstat().unwrap();
    assert_eq!(state, "DONE");
}

#[test]
fn homing_signal_config_survives_the_lost_first_write() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    assert_eq!(axis.isg_homecfgd().unwrap(), "0 0");
    // The write is issued twice under the hood; the emulated firmware
    // drops a lone CFGHOME write, so the configuration only sticks when
    // both go out.
    axis.isg_cfghome(4, 1).unwrap();
    assert_eq!(axis.isg_homecfgd().unwrap(), "4 1");
    assert!(axis.isg_homed().unwrap());
    assert_eq!(axis.isg_switches().unwrap(), (0, 1, 0));
}

#[test]
fn tracking_modes() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.track(PositionRegister::EncIn, TrackMode::Full).unwrap();
    axis.ptrack(PositionRegister::InPos, TrackMode::Smart).unwrap();
    axis.ltrack(None, ListTrackMode::Cyclic).unwrap();
    axis.ltrack(Some(PositionRegister::Sync), ListTrackMode::NoCyclic)
        .unwrap();
}

#[test]
fn jog_and_misc_commands() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.jog(12.5).unwrap();
    axis.stop().unwrap();
    assert_eq!(axis.jog_velocity().unwrap(), 0.0);
    axis.esync().unwrap();
    axis.ctrlrst().unwrap();
    axis.blink(2).unwrap();
    ctrl.esync(&[1, 5]).unwrap();
    ctrl.ctrlrst(&[1, 5]).unwrap();
}

#[test]
fn indexer_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    assert_eq!(axis.indexer().unwrap(), IndexerSource::Internal);
    axis.set_indexer(IndexerSource::External).unwrap();
    assert_eq!(axis.indexer().unwrap(), IndexerSource::External);
}

#[test]
fn parametric_velocity_double_write() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.set_parvel(25.0).unwrap();
    assert_eq!(axis.parvel().unwrap(), 25.0);
    axis.set_paracct(0.5).unwrap();
    assert_eq!(axis.paracct().unwrap(), 0.5);
}

#[test]
fn measurements() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    assert_eq!(axis.meas_vcc().unwrap(), 80.2165);
    assert!(axis.meas("RC").is_err(), "RC reads too low to measure");
}

#[test]
fn pmux_rules() {
    let ctrl = start_reference();
    assert!(ctrl.get_pmux().unwrap().is_empty());
    ctrl.add_pmux("B0", "E1", true, true, false).unwrap();
    let rules = ctrl.get_pmux().unwrap();
    assert_eq!(rules.len(), 1);
    assert!(rules[0].contains("B0"), "{rules:?}");
    ctrl.clear_pmux("").unwrap();
    assert!(ctrl.get_pmux().unwrap().is_empty());
}

#[test]
fn alarm_warning_and_misc_status() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    assert_eq!(axis.alarm().unwrap(), (false, String::new()));
    assert_eq!(axis.warning().unwrap(), vec!["NONE".to_string()]);
    assert_eq!(axis.stopcode().unwrap(), 0);
    assert_eq!(axis.vstopcode().unwrap(), "No abnormal stop condition");
    assert_eq!(axis.wtemp().unwrap(), 45.0);
    axis.set_wtemp(50.0).unwrap();
    assert_eq!(axis.wtemp().unwrap(), 50.0);
    assert_eq!(axis.post().unwrap(), 0);
    assert!(axis.auxps().unwrap());
}
