
//! Wavelet encoding and decoding.
// see https://github.com/AcademySoftwareFoundation/openexr/blob/8cd1b9210855fa4f6923c1b94df8a86166be19b1/OpenEXR/IlmImf/ImfWav.cpp

use crate::error::{Error, UnitResult};
use crate::math::Vec2;

/// The buffer must contain the sample at `(count.x - 1) * offset.x + (count.y - 1) * offset.y`.
fn check_buffer_size(buffer_len: usize, count: Vec2<usize>, offset: Vec2<usize>) -> UnitResult {
    if count.x() == 0 || count.y() == 0 {
        return Ok(());
    }

    let last_index = (count.x() - 1).checked_mul(offset.x())
        .and_then(|x| (count.y() - 1).checked_mul(offset.y()).and_then(|y| x.checked_add(y)));

    match last_index {
        Some(last) if last < buffer_len => Ok(()),
        _ => Err(Error::compression("wavelet buffer too small")),
    }
}

/// 2D wavelet encoding, in place.
/// `count` is the number of samples, `offset` the distance between horizontal and vertical neighbours.
pub fn encode(buffer: &mut [u16], count: Vec2<usize>, offset: Vec2<usize>, max: u16) -> UnitResult {
    check_buffer_size(buffer.len(), count, offset)?;

    let is_14_bit = max < (1 << 14);
    let (count_x, count_y) = (count.x(), count.y());
    let (offset_x, offset_y) = (offset.x(), offset.y());
    let n = count_x.min(count_y);

    let mut p: usize = 1; // == 1 << level
    let mut p2: usize = 2; // == 1 << (level + 1)

    while p2 <= n {
        let end_y = offset_y * (count_y - p2);
        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        let mut position_y = 0;
        while position_y <= end_y {
            let end_x = position_y + offset_x * (count_x - p2);

            let mut position_x = position_y;
            while position_x <= end_x {
                let pos_right = position_x + offset1_x;
                let pos_top = position_x + offset1_y;
                let pos_top_right = pos_top + offset1_x;

                let (center, right) = encode_pair(buffer[position_x], buffer[pos_right], is_14_bit);
                let (top, top_right) = encode_pair(buffer[pos_top], buffer[pos_top_right], is_14_bit);

                let (center, top) = encode_pair(center, top, is_14_bit);
                let (right, top_right) = encode_pair(right, top_right, is_14_bit);

                buffer[position_x] = center;
                buffer[pos_top] = top;
                buffer[pos_right] = right;
                buffer[pos_top_right] = top_right;

                position_x += offset2_x;
            }

            // encode remaining odd pixel column
            if count_x & p != 0 {
                let pos_top = position_x + offset1_y;
                let (center, top) = encode_pair(buffer[position_x], buffer[pos_top], is_14_bit);

                buffer[position_x] = center;
                buffer[pos_top] = top;
            }

            position_y += offset2_y;
        }

        // encode possibly remaining odd row
        if count_y & p != 0 {
            let end_x = position_y + offset_x * (count_x - p2);

            let mut position_x = position_y;
            while position_x <= end_x {
                let pos_right = position_x + offset1_x;
                let (center, right) = encode_pair(buffer[position_x], buffer[pos_right], is_14_bit);

                buffer[pos_right] = right;
                buffer[position_x] = center;

                position_x += offset2_x;
            }
        }

        p = p2;
        p2 <<= 1;
    }

    Ok(())
}

/// 2D wavelet decoding, in place. Inverse of `encode`.
pub fn decode(buffer: &mut [u16], count: Vec2<usize>, offset: Vec2<usize>, max: u16) -> UnitResult {
    check_buffer_size(buffer.len(), count, offset)?;

    let is_14_bit = max < (1 << 14);
    let (count_x, count_y) = (count.x(), count.y());
    let (offset_x, offset_y) = (offset.x(), offset.y());
    let n = count_x.min(count_y);

    // search max level
    let mut p: usize = 1;
    while p <= n { p <<= 1; }

    p >>= 1;
    let mut p2 = p;
    p >>= 1;

    while p >= 1 {
        let end_y = offset_y * (count_y - p2);
        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        let mut position_y = 0;
        while position_y <= end_y {
            let end_x = position_y + offset_x * (count_x - p2);

            let mut position_x = position_y;
            while position_x <= end_x {
                let pos_right = position_x + offset1_x;
                let pos_top = position_x + offset1_y;
                let pos_top_right = pos_top + offset1_x;

                let (center, top) = decode_pair(buffer[position_x], buffer[pos_top], is_14_bit);
                let (right, top_right) = decode_pair(buffer[pos_right], buffer[pos_top_right], is_14_bit);

                let (center, right) = decode_pair(center, right, is_14_bit);
                let (top, top_right) = decode_pair(top, top_right, is_14_bit);

                buffer[position_x] = center;
                buffer[pos_right] = right;
                buffer[pos_top] = top;
                buffer[pos_top_right] = top_right;

                position_x += offset2_x;
            }

            // decode last odd remaining x value
            if count_x & p != 0 {
                let pos_top = position_x + offset1_y;
                let (center, top) = decode_pair(buffer[position_x], buffer[pos_top], is_14_bit);

                buffer[position_x] = center;
                buffer[pos_top] = top;
            }

            position_y += offset2_y;
        }

        // decode remaining odd row
        if count_y & p != 0 {
            let end_x = position_y + offset_x * (count_x - p2);

            let mut position_x = position_y;
            while position_x <= end_x {
                let pos_right = position_x + offset1_x;
                let (center, right) = decode_pair(buffer[position_x], buffer[pos_right], is_14_bit);

                buffer[position_x] = center;
                buffer[pos_right] = right;

                position_x += offset2_x;
            }
        }

        p2 = p;
        p >>= 1;
    }

    Ok(())
}

#[inline]
fn encode_pair(a: u16, b: u16, is_14_bit: bool) -> (u16, u16) {
    if is_14_bit { encode_14bit(a, b) } else { encode_16bit(a, b) }
}

#[inline]
fn decode_pair(l: u16, h: u16, is_14_bit: bool) -> (u16, u16) {
    if is_14_bit { decode_14bit(l, h) } else { decode_16bit(l, h) }
}

/// Untransformed data values should be less than (1 << 14).
#[inline]
fn encode_14bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i16 as i32, b as i16 as i32);

    let m = (a + b) >> 1;
    let d = a - b;

    (m as i16 as u16, d as i16 as u16)
}

#[inline]
fn decode_14bit(l: u16, h: u16) -> (u16, u16) {
    let (l, h) = (l as i16 as i32, h as i16 as i32);

    let hi = h;
    let ai = l + (hi & 1) + (hi >> 1);

    let a = ai as i16; // rust needs explicit truncation
    let b = (ai - hi) as i16;

    (a as u16, b as u16)
}


const BIT_COUNT: i32 = 16;
const OFFSET: i32 = 1 << (BIT_COUNT - 1);
const MOD_MASK: i32 = (1 << BIT_COUNT) - 1;

/// Wavelet encoding for the full 16-bit range.
#[inline]
fn encode_16bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i32, b as i32);

    let a_offset = (a + OFFSET) & MOD_MASK;
    let mut m = (a_offset + b) >> 1;
    let d = a_offset - b;

    if d < 0 { m = (m + OFFSET) & MOD_MASK; }
    let d = d & MOD_MASK;

    (m as u16, d as u16)
}

#[inline]
fn decode_16bit(l: u16, h: u16) -> (u16, u16) {
    let (m, d) = (l as i32, h as i32);

    let b = (m - (d >> 1)) & MOD_MASK;
    let a = (d + b - OFFSET) & MOD_MASK;

    (a as u16, b as u16)
}
