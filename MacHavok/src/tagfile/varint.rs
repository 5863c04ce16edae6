//! Variable-length integers used by the TYPE subsections
//!
//! | Range              | Bytes | Lead bits  |
//! |--------------------|-------|------------|
//! | `< 0x80`           | 1     | `0xxxxxxx` |
//! | `< 0x4000`         | 2     | `10xxxxxx` |
//! | `< 0x20_0000`      | 3     | `110xxxxx` |
//! | `< 0x800_0000`     | 4     | `1110xxxx` |
//!
//! The remaining bits follow big-endian.

use crate::error::{Error, Result};
use byteorder::ReadBytesExt;
use std::io::Cursor;

/// First value that cannot be encoded.
pub const VARINT_LIMIT: u32 = 0x800_0000;

/// Append `value` to `out`.
pub fn write_varint(out: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..0x80 => out.push(value as u8),
        0x80..0x4000 => out.extend_from_slice(&[0x80 | (value >> 8) as u8, value as u8]),
        0x4000..0x20_0000 => out.extend_from_slice(&[0xC0 | (value >> 16) as u8, (value >> 8) as u8, value as u8]),
        0x20_0000..VARINT_LIMIT => out.extend_from_slice(&[
            0xE0 | (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]),
        _ => {
            return Err(Error::VarIntOverflow {
                value: u64::from(value),
                offset: None,
            });
        }
    }
    Ok(())
}

/// Read one value, failing with `VarIntOverflow` on a 5-byte lead.
pub fn read_varint(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let offset = cursor.position() as usize;
    let lead = read_byte(cursor)?;
    let value = match lead {
        0x00..=0x7F => u32::from(lead),
        0x80..=0xBF => (u32::from(lead & 0x3F) << 8) | u32::from(read_byte(cursor)?),
        0xC0..=0xDF => {
            let rest = read_tail(cursor, 2)?;
            (u32::from(lead & 0x1F) << 16) | rest
        }
        0xE0..=0xE7 => {
            let rest = read_tail(cursor, 3)?;
            (u32::from(lead & 0x0F) << 24) | rest
        }
        _ => {
            return Err(Error::VarIntOverflow {
                value: u64::from(lead),
                offset: Some(offset),
            });
        }
    };
    Ok(value)
}

fn read_byte(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor.read_u8().map_err(|_| Error::UnexpectedEof)
}

fn read_tail(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        value = (value << 8) | u32::from(read_byte(cursor)?);
    }
    Ok(value)
}
