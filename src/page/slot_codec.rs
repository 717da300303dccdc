//! Slot-offset codec (spec §4.5). Grounded on
//! `index::bitmap_compressed::WahBitmap`'s word-at-a-time bit packing,
//! adapted from whole-word fill encoding to a fixed-width bit-packed field
//! array: a presence bitmap plus, for each populated slot in slot-index
//! order, exactly `w` bits of offset, LSB-first, spanning byte boundaries.
//!
//! Delta encoding is deliberately not used: offset order within the slot
//! array is arbitrary, so consecutive offsets carry no exploitable
//! correlation.

use crate::error::{PageError, Result};

/// Encode `slot_offsets` (one entry per slot; `None` for an unpopulated
/// slot) into the wire format: presence bitmap, then (if any slot is
/// populated) a width byte and the bit-packed offsets.
pub fn encode(slot_offsets: &[Option<u32>]) -> Vec<u8> {
    let mut out = Vec::new();
    let presence_bytes = slot_offsets.len().div_ceil(8);
    let mut presence = vec![0u8; presence_bytes];
    let mut max_offset: u32 = 0;
    let mut any = false;
    for (i, slot) in slot_offsets.iter().enumerate() {
        if let Some(offset) = slot {
            presence[i / 8] |= 1 << (i % 8);
            max_offset = max_offset.max(*offset);
            any = true;
        }
    }
    out.extend_from_slice(&presence);
    if !any {
        return out;
    }

    let width = bit_width(max_offset);
    out.push(width);

    let mut bit_cursor: usize = 0;
    let mut packed: Vec<u8> = Vec::new();
    for slot in slot_offsets.iter() {
        if let Some(offset) = slot {
            write_bits(&mut packed, &mut bit_cursor, *offset as u64, width);
        }
    }
    out.extend_from_slice(&packed);
    out
}

/// Decode a buffer produced by [`encode`] for `slot_count` logical slots.
/// Unpopulated slots decode to `-1`; populated slots decode to their
/// original offset, which always fits in `i64` range here (offsets are
/// `u32`-bounded).
pub fn decode(buf: &[u8], slot_count: usize) -> Result<Vec<i64>> {
    let presence_bytes = slot_count.div_ceil(8);
    if buf.len() < presence_bytes {
        return Err(PageError::CorruptPage {
            reason: "slot codec buffer shorter than presence bitmap".to_string(),
        });
    }
    let presence = &buf[..presence_bytes];
    let populated: Vec<usize> = (0..slot_count)
        .filter(|&i| (presence[i / 8] >> (i % 8)) & 1 == 1)
        .collect();

    let mut result = vec![-1i64; slot_count];
    if populated.is_empty() {
        return Ok(result);
    }

    let width = *buf.get(presence_bytes).ok_or_else(|| PageError::CorruptPage {
        reason: "slot codec buffer missing width byte".to_string(),
    })? as usize;
    if width == 0 || width > 32 {
        return Err(PageError::CorruptPage {
            reason: format!("slot codec width {} out of [1, 32]", width),
        });
    }

    let packed = &buf[presence_bytes + 1..];
    let mut bit_cursor = 0usize;
    for &slot_index in &populated {
        let value = read_bits(packed, &mut bit_cursor, width)?;
        result[slot_index] = value as i64;
    }
    Ok(result)
}

fn bit_width(max_offset: u32) -> u8 {
    if max_offset == 0 {
        1
    } else {
        (32 - max_offset.leading_zeros()).clamp(1, 32) as u8
    }
}

fn write_bits(out: &mut Vec<u8>, bit_cursor: &mut usize, value: u64, width: u8) {
    for i in 0..width {
        let bit = (value >> i) & 1;
        let byte_index = *bit_cursor / 8;
        if byte_index >= out.len() {
            out.push(0);
        }
        if bit == 1 {
            out[byte_index] |= 1 << (*bit_cursor % 8);
        }
        *bit_cursor += 1;
    }
}

fn read_bits(buf: &[u8], bit_cursor: &mut usize, width: usize) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..width {
        let byte_index = *bit_cursor / 8;
        let byte = *buf.get(byte_index).ok_or(PageError::CorruptPage {
            reason: "slot codec bit-packed read past end of buffer".to_string(),
        })?;
        let bit = (byte >> (*bit_cursor % 8)) & 1;
        value |= (bit as u64) << i;
        *bit_cursor += 1;
    }
    Ok(value)
}
