// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Vector-data frames for parametric trajectory tables.
//!
//! A `*PARDAT` upload carries several columns in one binary block: the
//! parameter axis, the position column for a given board, and optionally a
//! slope column. Each column is a self-describing record:
//!
//! ```text
//! offset  size  field
//! 0       2     signature   = 0xCAFE, u16 LE
//! 2       2     version     = 1, u16 LE
//! 4       4     byte length of the whole column incl. header, dword aligned
//! 8       4     point count
//! 12      2     data type code (see DTYPE_* constants)
//! 14      1     board address, 0xFF when the column is not board-bound
//! 15      1     column role (parameter / position / slope)
//! 16      ...   payload, zero-padded to the next dword boundary
//! ```
//!
//! Columns are concatenated and the whole buffer is reinterpreted as u16
//! words for the standard block frame.

use crate::registers::TableDType;
use crate::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Column record signature.
pub const SIGNATURE: u16 = 0xCAFE;

/// Frame format version.
pub const VERSION: u16 = 1;

/// Board address used for columns that are not bound to one board.
pub const ADDR_UNSET: u8 = 0xFF;

const HEADER_LEN: usize = 16;

/// Role a column plays in the trajectory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Parameter,
    Position,
    Slope,
}

impl ColumnRole {
    fn code(&self) -> u8 {
        match self {
            ColumnRole::Parameter => 1,
            ColumnRole::Position => 2,
            ColumnRole::Slope => 3,
        }
    }

    fn from_code(code: u8) -> Result<ColumnRole, ProtocolError> {
        match code {
            1 => Ok(ColumnRole::Parameter),
            2 => Ok(ColumnRole::Position),
            3 => Ok(ColumnRole::Slope),
            other => Err(ProtocolError::Frame(format!(
                "unknown vdata column role {other}"
            ))),
        }
    }
}

fn dtype_code(dtype: TableDType) -> u16 {
    match dtype {
        TableDType::Byte => 0x00,
        TableDType::Dword => 0x04,
        TableDType::Float => 0x05,
        TableDType::DFloat => 0x06,
    }
}

fn dtype_from_code(code: u16) -> Result<TableDType, ProtocolError> {
    match code {
        0x00 => Ok(TableDType::Byte),
        0x04 => Ok(TableDType::Dword),
        0x05 => Ok(TableDType::Float),
        0x06 => Ok(TableDType::DFloat),
        other => Err(ProtocolError::Frame(format!(
            "unknown vdata type code 0x{other:02X}"
        ))),
    }
}

fn encode_values(buf: &mut BytesMut, values: &[f64], dtype: TableDType) {
    for value in values {
        match dtype {
            TableDType::Byte => buf.put_i8(*value as i8),
            TableDType::Dword => buf.put_i32_le(*value as i32),
            TableDType::Float => buf.put_f32_le(*value as f32),
            TableDType::DFloat => buf.put_f64_le(*value),
        }
    }
}

fn value_size(dtype: TableDType) -> usize {
    match dtype {
        TableDType::Byte => 1,
        TableDType::Dword => 4,
        TableDType::Float => 4,
        TableDType::DFloat => 8,
    }
}

/// One decoded column, as recovered by the device side.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub role: ColumnRole,
    pub address: u8,
    pub dtype: TableDType,
    pub values: Vec<f64>,
}

/// Builder assembling the multi-column binary buffer.
#[derive(Debug, Default)]
pub struct Vdata {
    buf: BytesMut,
}

impl Vdata {
    pub fn new() -> Vdata {
        Vdata::default()
    }

    /// Append one column. `address` is the board the column applies to, or
    /// [`ADDR_UNSET`] for the shared parameter axis.
    pub fn append(&mut self, values: &[f64], address: u8, role: ColumnRole, dtype: TableDType) {
        let payload_len = values.len() * value_size(dtype);
        let padded = (HEADER_LEN + payload_len + 3) & !3;
        self.buf.put_u16_le(SIGNATURE);
        self.buf.put_u16_le(VERSION);
        self.buf.put_u32_le(padded as u32);
        self.buf.put_u32_le(values.len() as u32);
        self.buf.put_u16_le(dtype_code(dtype));
        self.buf.put_u8(address);
        self.buf.put_u8(role.code());
        encode_values(&mut self.buf, values, dtype);
        for _ in 0..(padded - HEADER_LEN - payload_len) {
            self.buf.put_u8(0);
        }
    }

    /// The assembled buffer. Always dword-aligned, hence safe to
    /// reinterpret as u16 words for the block frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Reinterpret the buffer as little-endian u16 words.
    pub fn to_words(&self) -> Vec<u16> {
        self.buf
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

fn decode_values(bytes: &[u8], count: usize, dtype: TableDType) -> Vec<f64> {
    let size = value_size(dtype);
    (0..count)
        .map(|i| {
            let chunk = &bytes[i * size..(i + 1) * size];
            match dtype {
                TableDType::Byte => chunk[0] as i8 as f64,
                TableDType::Dword => {
                    i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
                }
                TableDType::Float => {
                    f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
                }
                TableDType::DFloat => f64::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
                ]),
            }
        })
        .collect()
}

/// Decode a buffer of concatenated columns (the simulator's side of
/// [`Vdata`]).
pub fn decode_columns(mut bytes: &[u8]) -> Result<Vec<Column>, ProtocolError> {
    let mut columns = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Frame(format!(
                "truncated vdata column header: {} bytes",
                bytes.len()
            )));
        }
        let signature = u16::from_le_bytes([bytes[0], bytes[1]]);
        if signature != SIGNATURE {
            return Err(ProtocolError::Frame(format!(
                "bad vdata signature 0x{signature:04X}"
            )));
        }
        let total = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let dtype = dtype_from_code(u16::from_le_bytes([bytes[12], bytes[13]]))?;
        let address = bytes[14];
        let role = ColumnRole::from_code(bytes[15])?;
        if total > bytes.len() || total < HEADER_LEN + count * value_size(dtype) {
            return Err(ProtocolError::Frame(format!(
                "vdata column length {total} inconsistent with buffer"
            )));
        }
        let values = decode_values(&bytes[HEADER_LEN..], count, dtype);
        columns.push(Column {
            role,
            address,
            dtype,
            values,
        });
        bytes = &bytes[total..];
    }
    Ok(columns)
}
