//! Zig-zag variable-length integers.
//!
//! A signed value is zig-zag mapped (`0 → 0, -1 → 1, 1 → 2, ...`) and then
//! written 7 bits at a time, low bits first, with the high bit of each byte
//! set while more bytes follow. Every field of the index blob uses this form.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Longest encoding of a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode a signed integer as a zig-zag varint.
pub fn encode_varint(buf: &mut impl BufMut, value: i64) {
    let mut unsigned = ((value << 1) ^ (value >> 63)) as u64;
    while unsigned >= 0x80 {
        buf.put_u8(unsigned as u8 | 0x80);
        unsigned >>= 7;
    }
    buf.put_u8(unsigned as u8);
}

/// Decode a zig-zag varint.
///
/// Fails with [`Error::MalformedIndex`] if `buf` runs out before the
/// terminating byte or the value does not fit in 64 bits.
pub fn decode_varint(buf: &mut impl Buf) -> Result<i64> {
    let mut unsigned: u64 = 0;
    let mut shift = 0;

    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(Error::MalformedIndex("truncated varint"));
        }
        let byte = buf.get_u8();
        if byte < 0x80 {
            // The tenth byte may only contribute the top bit.
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(Error::MalformedIndex("varint overflows 64 bits"));
            }
            unsigned |= (byte as u64) << shift;
            let value = (unsigned >> 1) as i64;
            return Ok(if unsigned & 1 != 0 { !value } else { value });
        }
        unsigned |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    Err(Error::MalformedIndex("varint overflows 64 bits"))
}
