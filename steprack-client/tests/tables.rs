// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
mod common;

use common::start_reference;
use steprack_client::{Error, ECAM_TABLE_MAX_WORDS};
use steprack_protocol::{ParTableMode, PositionRegister, TableDType};

#[test]
fn ecam_upload_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.set_ecam_table(&[0.0, 1.5, 2.5], PositionRegister::Axis, TableDType::Float)
        .unwrap();
    // The upload implicitly arms the cam output.
    assert_eq!(axis.ecam().unwrap(), "PULSE");
    assert_eq!(axis.get_ecam_table().unwrap(), vec![0.0, 1.5, 2.5]);
}

#[test]
fn ecam_table_is_sorted_before_upload() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.set_ecam_table(&[2.5, 0.0, 1.5], PositionRegister::Axis, TableDType::Float)
        .unwrap();
    assert_eq!(axis.get_ecam_table().unwrap(), vec![0.0, 1.5, 2.5]);
}

#[test]
fn ecam_upload_without_arming() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.set_ecam_table_with(&[1.0, 2.0], PositionRegister::Axis, TableDType::Float, None)
        .unwrap();
    assert_eq!(axis.ecam().unwrap(), "OFF");
}

#[test]
fn ecam_clear_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.set_ecam_table(&[1.0, 2.0], PositionRegister::Axis, TableDType::Float)
        .unwrap();
    axis.clear_ecam_table().unwrap();
    assert_eq!(axis.get_ecam_table().unwrap(), Vec::<f64>::new());
}

#[test]
fn oversized_ecam_table_rejected_before_io() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    // One float is two words; this is one entry over capacity.
    let values: Vec<f64> = (0..ECAM_TABLE_MAX_WORDS / 2 + 1).map(|i| i as f64).collect();
    match axis.set_ecam_table(&values, PositionRegister::Axis, TableDType::Float) {
        Err(Error::Usage(msg)) => assert!(msg.contains("table memory"), "{msg}"),
        other => panic!("expected a usage error, got {other:?}"),
    }
    // Nothing reached the device.
    assert_eq!(axis.get_ecam_table().unwrap(), Vec::<f64>::new());
}

#[test]
fn ecam_paging_over_large_table() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    // 450 entries force three dump pages of at most 200 rows.
    let values: Vec<f64> = (0..450).map(|i| i as f64).collect();
    axis.set_ecam_table(&values, PositionRegister::Axis, TableDType::Float)
        .unwrap();
    assert_eq!(axis.get_ecam_table().unwrap(), values);
}

#[test]
fn ecam_dword_table_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    let values = vec![-100.0, 0.0, 250.0];
    axis.set_ecam_table(&values, PositionRegister::Axis, TableDType::Dword)
        .unwrap();
    assert_eq!(axis.get_ecam_table().unwrap(), values);
}

#[test]
fn list_table_round_trip_with_length_compensation() {
    let ctrl = start_reference();
    let axis = ctrl.axis(5).unwrap();
    let values = vec![10.0, 20.0, 30.0];
    axis.set_list_table(&values, false, TableDType::Float).unwrap();
    // The device reports one entry more than the table holds; the reader
    // must still return exactly the uploaded values.
    assert_eq!(axis.get_list_table().unwrap(), values);
    axis.clear_list_table().unwrap();
    assert_eq!(axis.get_list_table().unwrap(), Vec::<f64>::new());
}

#[test]
fn parametric_table_round_trip() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    let params = vec![0.0, 0.5, 1.0];
    let positions = vec![0.0, 500.0, 1000.0];
    let slopes = vec![1.0, 1.0, 1.0];
    axis.set_parametric_table(&params, &positions, Some(&slopes), ParTableMode::Spline)
        .unwrap();
    let (p, x, s) = axis.get_parametric_table().unwrap();
    assert_eq!(p, params);
    assert_eq!(x, positions);
    assert_eq!(s, slopes);
}

#[test]
fn parametric_table_without_slopes() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    axis.set_parametric_table(&[0.0, 1.0], &[0.0, 100.0], None, ParTableMode::Linear)
        .unwrap();
    let (p, x, s) = axis.get_parametric_table().unwrap();
    assert_eq!(p, vec![0.0, 1.0]);
    assert_eq!(x, vec![0.0, 100.0]);
    assert_eq!(s, vec![0.0, 0.0]);
}

#[test]
fn parametric_table_length_mismatch_rejected() {
    let ctrl = start_reference();
    let axis = ctrl.axis(1).unwrap();
    assert!(matches!(
        axis.set_parametric_table(&[0.0, 1.0], &[0.0], None, ParTableMode::Linear),
        Err(Error::Usage(_))
    ));
    assert!(matches!(
        axis.set_parametric_table(&[0.0], &[0.0], Some(&[1.0, 2.0]), ParTableMode::Linear),
        Err(Error::Usage(_))
    ));
}

#[test]
fn empty_parametric_table_reports_no_values() {
    let ctrl = start_reference();
    let axis = ctrl.axis(5).unwrap();
    axis.clear_parametric_table().unwrap();
    assert!(matches!(
        axis.get_parametric_table(),
        Err(Error::Command(_))
    ));
}
