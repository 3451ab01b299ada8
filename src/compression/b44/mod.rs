
//! Lossy compression of `f16` channels, in blocks of 4 by 4 samples.
//! Each block is stored in 14 bytes, or in 3 bytes if all samples are equal
//! and flat areas are optimized. All other sample types are stored as-is.
// see https://github.com/AcademySoftwareFoundation/openexr/blob/master/src/lib/OpenEXR/ImfB44Compressor.cpp

mod table;

use super::*;
use crate::error::Result;


/// The B44 and B44A compression methods.
pub struct B44 {

    /// Store blocks with sixteen equal samples in three bytes (B44A).
    pub optimize_uniform_areas: bool,
}

impl BlockCompressor for B44 {
    fn compress(&self, channels: &ChannelList, uncompressed: Bytes<'_>, bounds: IntegerBounds) -> Result<ByteVec> {
        compress(channels, uncompressed, bounds, self.optimize_uniform_areas)
    }

    fn decompress(&self, channels: &ChannelList, compressed: Bytes<'_>, bounds: IntegerBounds, expected_byte_size: usize, _: bool) -> Result<ByteVec> {
        decompress(channels, compressed, bounds, expected_byte_size)
    }
}


const BIAS: i32 = 0x20;
const SIX_BITS: i32 = 0x3f;

/// The third byte of a 14-byte block is always smaller than this.
const UNIFORM_BLOCK_MARKER: u8 = 13 << 2;


/// Rearranges the line-interleaved block into one contiguous region per channel.
fn split_channels(channels: &ChannelList, mut bytes: Bytes<'_>, bounds: IntegerBounds) -> Result<Vec<ByteVec>> {
    let mut planes: Vec<ByteVec> = channels.list.iter()
        .map(|channel| Vec::with_capacity(channel.subsampled_block_resolution(bounds).area() * channel.sample_type.bytes_per_sample()))
        .collect();

    for y in bounds.position.y() as i64 .. bounds.end().y() {
        for (channel, plane) in channels.list.iter().zip(&mut planes) {
            if !channel.is_sampled_row(y) { continue; }

            let line_size = channel.subsampled_block_resolution(bounds).x() * channel.sample_type.bytes_per_sample();
            if line_size > bytes.len() {
                return Err(Error::compression("b44 block size"));
            }

            let (line, rest) = bytes.split_at(line_size);
            plane.extend_from_slice(line);
            bytes = rest;
        }
    }

    Ok(planes)
}

/// Inverse of `split_channels`.
fn join_channels(channels: &ChannelList, planes: &[ByteVec], bounds: IntegerBounds, byte_size: usize) -> ByteVec {
    let mut out = Vec::with_capacity(byte_size);
    let mut plane_positions = vec![0_usize; planes.len()];

    for y in bounds.position.y() as i64 .. bounds.end().y() {
        for ((channel, plane), position) in channels.list.iter().zip(planes).zip(&mut plane_positions) {
            if !channel.is_sampled_row(y) { continue; }

            let line_size = channel.subsampled_block_resolution(bounds).x() * channel.sample_type.bytes_per_sample();
            out.extend_from_slice(&plane[*position .. *position + line_size]);
            *position += line_size;
        }
    }

    out
}


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, bounds: IntegerBounds, optimize_uniform_areas: bool) -> Result<ByteVec> {
    let planes = split_channels(channels, uncompressed, bounds)?;
    let mut out = Vec::with_capacity(uncompressed.len() / 2);

    for (channel, plane) in channels.list.iter().zip(&planes) {
        if channel.sample_type != SampleType::F16 {
            out.extend_from_slice(plane);
            continue;
        }

        let resolution = channel.subsampled_block_resolution(bounds);
        let (width, height) = (resolution.x(), resolution.y());
        if width == 0 || height == 0 { continue; }

        let samples: Vec<u16> = plane.chunks_exact(2)
            .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
            .collect();

        for block_y in (0 .. height).step_by(4) {
            for block_x in (0 .. width).step_by(4) {

                // blocks at the border repeat their last column and row
                let mut block = [0_u16; 16];
                for row in 0 .. 4 {
                    let y = (block_y + row).min(height - 1);

                    for column in 0 .. 4 {
                        let x = (block_x + column).min(width - 1);
                        block[row * 4 + column] = samples[y * width + x];
                    }
                }

                if channel.quantize_linearly {
                    let exp_table = table::exp_table();
                    for sample in &mut block { *sample = exp_table[*sample as usize]; }
                }

                let mut packed = [0_u8; 14];
                let length = pack(block, &mut packed, optimize_uniform_areas, !channel.quantize_linearly);
                out.extend_from_slice(&packed[.. length]);
            }
        }
    }

    Ok(out)
}

pub fn decompress(channels: &ChannelList, mut compressed: Bytes<'_>, bounds: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    let mut planes = Vec::with_capacity(channels.list.len());

    for channel in &channels.list {
        let resolution = channel.subsampled_block_resolution(bounds);
        let (width, height) = (resolution.x(), resolution.y());
        let byte_size = resolution.area() * channel.sample_type.bytes_per_sample();

        if channel.sample_type != SampleType::F16 {
            if byte_size > compressed.len() {
                return Err(Error::compression("b44 data ends unexpectedly"));
            }

            let (raw, rest) = compressed.split_at(byte_size);
            planes.push(raw.to_vec());
            compressed = rest;
            continue;
        }

        let mut samples = vec![0_u16; resolution.area()];

        for block_y in (0 .. height).step_by(4) {
            for block_x in (0 .. width).step_by(4) {
                if compressed.len() < 3 {
                    return Err(Error::compression("b44 data ends unexpectedly"));
                }

                let mut block = if compressed[2] >= UNIFORM_BLOCK_MARKER {
                    let block = unpack3(&compressed[.. 3]);
                    compressed = &compressed[3 ..];
                    block
                }
                else {
                    if compressed.len() < 14 {
                        return Err(Error::compression("b44 data ends unexpectedly"));
                    }

                    let block = unpack14(&compressed[.. 14]);
                    compressed = &compressed[14 ..];
                    block
                };

                if channel.quantize_linearly {
                    let log_table = table::log_table();
                    for sample in &mut block { *sample = log_table[*sample as usize]; }
                }

                // the padding of border blocks is discarded
                for row in 0 .. (height - block_y).min(4) {
                    for column in 0 .. (width - block_x).min(4) {
                        samples[(block_y + row) * width + block_x + column] = block[row * 4 + column];
                    }
                }
            }
        }

        planes.push(samples.iter().flat_map(|sample| sample.to_le_bytes()).collect());
    }

    if !compressed.is_empty() {
        return Err(Error::compression("b44 data longer than expected"));
    }

    Ok(join_channels(channels, &planes, bounds, expected_byte_size))
}


/// Maps the bits of a half float to an unsigned integer,
/// such that the order of the integers matches the order of the floats.
/// Infinities and nans are mapped to zero.
fn to_ordered(bits: u16) -> u16 {
    if bits & 0x7c00 == 0x7c00 { 0x8000 }
    else if bits & 0x8000 != 0 { !bits }
    else { bits | 0x8000 }
}

fn from_ordered(value: u16) -> u16 {
    if value & 0x8000 != 0 { value & 0x7fff }
    else { !value }
}

#[inline]
fn shift_and_round(x: i32, shift: i32) -> i32 {
    let x = x << 1;
    let a = (1 << shift) - 1;
    let shift = shift + 1;
    let b = (x >> shift) & 1;
    (x + a + b) >> shift
}

/// For each of the fifteen running differences, the indices of the two samples it connects.
/// The first column is traversed top to bottom, then each row from left to right.
const DIFFERENCE_PAIRS: [(usize, usize); 15] = [
    (0, 4), (4, 8), (8, 12),
    (0, 1), (4, 5), (8, 9), (12, 13),
    (1, 2), (5, 6), (9, 10), (13, 14),
    (2, 3), (6, 7), (10, 11), (14, 15),
];

/// Pack a block of 4 by 4 half floats into either 14 or 3 bytes.
/// Returns the number of bytes used.
fn pack(block: [u16; 16], out: &mut [u8; 14], optimize_uniform_areas: bool, exact_max: bool) -> usize {
    let mut ordered = [0_u16; 16];
    for (target, &bits) in ordered.iter_mut().zip(&block) {
        *target = to_ordered(bits);
    }

    let max = ordered.iter().copied().max().unwrap_or(0);

    // find a shift such that all rounded running differences fit into 6 bits
    let mut shift = -1;
    let mut distances = [0_i32; 16];
    let mut differences = [0_i32; 15];

    loop {
        shift += 1;

        for (distance, &value) in distances.iter_mut().zip(&ordered) {
            *distance = shift_and_round(max as i32 - value as i32, shift);
        }

        for (difference, &(first, second)) in differences.iter_mut().zip(&DIFFERENCE_PAIRS) {
            *difference = distances[first] - distances[second] + BIAS;
        }

        let min_difference = differences.iter().copied().min().unwrap_or(BIAS);
        let max_difference = differences.iter().copied().max().unwrap_or(BIAS);

        if min_difference >= 0 && max_difference <= SIX_BITS {
            if optimize_uniform_areas && min_difference == BIAS && max_difference == BIAS {
                out[0] = (ordered[0] >> 8) as u8;
                out[1] = ordered[0] as u8;
                out[2] = 0xfc;
                return 3;
            }

            break;
        }
    }

    if exact_max {
        // represent the sample that equals the maximum as accurately as possible
        ordered[0] = (max as i32 - (distances[0] << shift)) as u16;
    }

    out[0] = (ordered[0] >> 8) as u8;
    out[1] = ordered[0] as u8;

    // the shift and the differences, six bits each, most significant bit first
    let mut bits: u128 = shift as u128;
    for &difference in &differences {
        bits = (bits << 6) | difference as u128;
    }

    for (index, byte) in out[2 ..].iter_mut().enumerate() {
        *byte = (bits >> (8 * (11 - index))) as u8;
    }

    14
}

/// Unpack a 14-byte block into 4 by 4 half floats.
fn unpack14(bytes: &[u8]) -> [u16; 16] {
    debug_assert_eq!(bytes.len(), 14);

    let bits = bytes[2 ..].iter().fold(0_u128, |bits, &byte| (bits << 8) | byte as u128);
    let six_bits = |index: usize| ((bits >> (6 * (15 - index))) as i32) & SIX_BITS;

    let shift = six_bits(0);
    let bias = BIAS << shift;

    let mut ordered = [0_i32; 16];
    ordered[0] = ((bytes[0] as i32) << 8) | bytes[1] as i32;

    for (index, &(first, second)) in DIFFERENCE_PAIRS.iter().enumerate() {
        ordered[second] = (ordered[first] + (six_bits(index + 1) << shift) - bias) & 0xffff;
    }

    let mut block = [0_u16; 16];
    for (target, &value) in block.iter_mut().zip(&ordered) {
        *target = from_ordered(value as u16);
    }

    block
}

/// Unpack a 3-byte block into 4 by 4 equal half floats.
fn unpack3(bytes: &[u8]) -> [u16; 16] {
    let value = ((bytes[0] as u16) << 8) | bytes[1] as u16;
    [from_ordered(value); 16]
}
