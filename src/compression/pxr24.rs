
//! Lossy compression for F32 data, but lossless compression for U32 and F16 data.
// see https://github.com/AcademySoftwareFoundation/openexr/blob/master/OpenEXR/IlmImf/ImfPxr24Compressor.cpp

// This compressor is based on source code that was contributed to
// OpenEXR by Pixar Animation Studios. The compression method was
// developed by Loren Carpenter.

//  Each sample is converted to an unsigned integer: U32 stays as is,
//  F16 bits are reinterpreted, F32 values are rounded to 24 bits.
//  Every value is replaced by the difference to its left neighbour,
//  the differences are split into bytes, and the bytes of each line
//  are transposed so that the most significant bytes come first.
//  The result is compressed with zlib.

use super::*;
use crate::error::Result;


/// Differences and byte planes per line, followed by zlib.
pub struct Pxr24;

impl BlockCompressor for Pxr24 {
    fn compress(&self, channels: &ChannelList, uncompressed: Bytes<'_>, bounds: IntegerBounds) -> Result<ByteVec> {
        compress(channels, uncompressed, bounds)
    }

    fn decompress(&self, channels: &ChannelList, compressed: Bytes<'_>, bounds: IntegerBounds, expected_byte_size: usize, _: bool) -> Result<ByteVec> {
        decompress(channels, compressed, bounds, expected_byte_size)
    }
}


/// Number of bytes each sample occupies in the transposed buffer.
fn plane_count(sample_type: SampleType) -> usize {
    match sample_type {
        SampleType::F16 => 2,
        SampleType::F32 => 3,
        SampleType::U32 => 4,
    }
}

fn transposed_byte_size(channels: &ChannelList, bounds: IntegerBounds) -> usize {
    channels.list.iter()
        .map(|channel| channel.subsampled_block_resolution(bounds).area() * plane_count(channel.sample_type))
        .sum()
}

fn take_bytes<'s>(remaining: &mut &'s [u8], count: usize) -> Result<&'s [u8]> {
    if count > remaining.len() {
        return Err(Error::compression("pxr24 data ends unexpectedly"));
    }

    let (front, back) = remaining.split_at(count);
    *remaining = back;
    Ok(front)
}

pub fn compress(channels: &ChannelList, mut remaining_bytes: Bytes<'_>, bounds: IntegerBounds) -> Result<ByteVec> {
    let mut transposed = vec![0_u8; transposed_byte_size(channels, bounds)];
    let mut write_index = 0;

    for y in bounds.position.y() as i64 .. bounds.end().y() {
        for channel in &channels.list {
            if !channel.is_sampled_row(y) { continue; }

            let sample_count = channel.subsampled_block_resolution(bounds).x();
            let planes = plane_count(channel.sample_type);
            let sample_size = channel.sample_type.bytes_per_sample();

            let line = take_bytes(&mut remaining_bytes, sample_count * sample_size)?;
            let target = &mut transposed[write_index .. write_index + sample_count * planes];
            write_index += sample_count * planes;

            let mut previous: u32 = 0;

            for (index, sample) in line.chunks_exact(sample_size).enumerate() {
                let value = match channel.sample_type {
                    SampleType::F16 => u16::from_le_bytes([sample[0], sample[1]]) as u32,
                    SampleType::U32 => u32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]),
                    SampleType::F32 => f32_to_f24(f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])),
                };

                let difference = value.wrapping_sub(previous);
                previous = value;

                // most significant plane first
                for plane in 0 .. planes {
                    let shift = 8 * (planes - 1 - plane);
                    target[plane * sample_count + index] = (difference >> shift) as u8;
                }
            }
        }
    }

    if !remaining_bytes.is_empty() {
        return Err(Error::compression("pxr24 block size"));
    }

    Ok(zip::deflate(&transposed, 6))
}

pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, bounds: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    let transposed = zip::inflate(compressed, transposed_byte_size(channels, bounds))?;
    let mut remaining = transposed.as_slice();

    let mut out = Vec::with_capacity(expected_byte_size);

    for y in bounds.position.y() as i64 .. bounds.end().y() {
        for channel in &channels.list {
            if !channel.is_sampled_row(y) { continue; }

            let sample_count = channel.subsampled_block_resolution(bounds).x();
            let planes = plane_count(channel.sample_type);
            let line = take_bytes(&mut remaining, sample_count * planes)?;

            let mut accumulated: u32 = 0;

            for index in 0 .. sample_count {
                let byte = |plane: usize| line[plane * sample_count + index] as u32;

                let difference = match channel.sample_type {
                    SampleType::F16 => (byte(0) << 8) | byte(1),
                    SampleType::F32 => (byte(0) << 24) | (byte(1) << 16) | (byte(2) << 8),
                    SampleType::U32 => (byte(0) << 24) | (byte(1) << 16) | (byte(2) << 8) | byte(3),
                };

                accumulated = accumulated.wrapping_add(difference);

                match channel.sample_type {
                    SampleType::F16 => out.extend_from_slice(&(accumulated as u16).to_le_bytes()),
                    SampleType::F32 | SampleType::U32 => out.extend_from_slice(&accumulated.to_le_bytes()),
                }
            }
        }
    }

    if !remaining.is_empty() {
        return Err(Error::compression("pxr24 data longer than expected"));
    }

    Ok(out)
}


/// Conversion from 32-bit to 24-bit floating-point numbers.
/// Reverse conversion is just a simple 8-bit left shift.
pub fn f32_to_f24(float: f32) -> u32 {
    let bits = float.to_bits();

    let sign = bits & 0x80000000;
    let exponent = bits & 0x7f800000;
    let mantissa = bits & 0x007fffff;

    let result = if exponent == 0x7f800000 {
        if mantissa != 0 {
            // nan: keep the 15 leftmost bits of the significand,
            // but never turn into an infinity
            let mantissa = mantissa >> 8;
            (exponent >> 8) | mantissa | if mantissa == 0 { 1 } else { 0 }
        }
        else { // infinity
            exponent >> 8
        }
    }
    else { // finite, round the significand to 15 bits
        let result = ((exponent | mantissa) + (mantissa & 0x00000080)) >> 8;

        // rounding up close to the maximum overflows the exponent, so truncate instead
        if result >= 0x7f8000 { (exponent | mantissa) >> 8 }
        else { result }
    };

    (sign >> 8) | result
}
