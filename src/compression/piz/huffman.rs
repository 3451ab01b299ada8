//! Canonical Huffman coding of `u16` values, as used by `PIZ`.
//!
//! The output starts with five `u32` values: the smallest and the largest symbol,
//! the byte size of the code table, the bit count of the data, and zero.
//! The code table stores only code lengths, with runs of unused symbols shortened.
//! Runs of a repeated value are encoded as the value, a run symbol, and an 8-bit count.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::convert::TryFrom;

use crate::error::{Error, Result, UnitResult};
use crate::io::Data;

const INVALID_BIT_COUNT: &str = "huffman header (invalid number of bits)";
const INVALID_TABLE_ENTRY: &str = "huffman header (invalid code table entry)";
const NOT_ENOUGH_DATA: &str = "huffman data (decoded data are shorter than expected)";
const INVALID_TABLE_SIZE: &str = "huffman data (unexpected end of code table data)";
const TABLE_TOO_LONG: &str = "huffman data (code table is longer than expected)";
const INVALID_CODE: &str = "huffman data (invalid code)";
const TOO_MUCH_DATA: &str = "huffman data (decoded data are longer than expected)";

// every u16 value, plus one symbol for runs
const ENCODING_TABLE_SIZE: usize = (1 << 16) + 1;

// codes up to this length are decoded with a single lookup
const DECODE_BITS: i64 = 14;
const DECODING_TABLE_SIZE: usize = 1 << DECODE_BITS;
const DECODE_MASK: i64 = DECODING_TABLE_SIZE as i64 - 1;

// a code length in the packed table is 6 bits.
// lengths above the maximum mark runs of unused symbols instead
const MAX_CODE_LENGTH: i64 = 58;
const SHORT_ZEROCODE_RUN: i64 = 59;
const LONG_ZEROCODE_RUN: i64 = 63;
const SHORTEST_LONG_RUN: i64 = 2 + LONG_ZEROCODE_RUN - SHORT_ZEROCODE_RUN;
const LONGEST_LONG_RUN: i64 = 255 + SHORTEST_LONG_RUN;

const HEADER_SIZE: usize = 5 * u32::BYTE_SIZE;


/// Decode exactly `expected_size` values.
pub fn decompress(compressed: &[u8], expected_size: usize) -> Result<Vec<u16>> {
    if compressed.is_empty() {
        if expected_size != 0 { return Err(Error::compression(NOT_ENOUGH_DATA)); }
        else { return Ok(Vec::new()); }
    }

    if compressed.len() < HEADER_SIZE {
        return Err(Error::compression(NOT_ENOUGH_DATA));
    }

    let mut remaining = compressed;
    let min_code_index = u32::read_le(&mut remaining)? as usize;
    let max_code_index = u32::read_le(&mut remaining)? as usize;
    let _table_size = u32::read_le(&mut remaining)?;
    let bit_count = u32::read_le(&mut remaining)? as usize;
    let _reserved = u32::read_le(&mut remaining)?;

    if min_code_index >= ENCODING_TABLE_SIZE || max_code_index >= ENCODING_TABLE_SIZE {
        return Err(Error::compression(INVALID_TABLE_SIZE));
    }

    let encoding_table = read_encoding_table(&mut remaining, min_code_index, max_code_index)?;

    if bit_count > 8 * remaining.len() {
        return Err(Error::compression(INVALID_BIT_COUNT));
    }

    let decoding_table = build_decoding_table(&encoding_table, min_code_index, max_code_index)?;
    let packed_data = &remaining[.. (bit_count + 7) / 8];

    decode(
        &encoding_table, &decoding_table, packed_data,
        bit_count, max_code_index, expected_size,
    )
}

/// Encode the values, including the code table.
pub fn compress(uncompressed: &[u16]) -> Result<Vec<u8>> {
    if uncompressed.is_empty() {
        return Ok(vec![]);
    }

    let mut frequencies = vec![0_i64; ENCODING_TABLE_SIZE];
    count_frequencies(&mut frequencies, uncompressed);

    let (min_code_index, max_code_index) = build_encoding_table(&mut frequencies)?;

    let mut table = Vec::new();
    pack_encoding_table(&frequencies, min_code_index, max_code_index, &mut table);

    let mut data = Vec::with_capacity(uncompressed.len());
    let bit_count = encode(&frequencies, uncompressed, max_code_index, &mut data);

    let header_value = |value: usize| u32::try_from(value).map_err(|_| Error::compression("huffman data too large"));

    let mut result = Vec::with_capacity(HEADER_SIZE + table.len() + data.len());
    header_value(min_code_index)?.write_le(&mut result)?;
    header_value(max_code_index)?.write_le(&mut result)?;
    header_value(table.len())?.write_le(&mut result)?;
    header_value(bit_count)?.write_le(&mut result)?;
    0_u32.write_le(&mut result)?;

    result.extend_from_slice(&table);
    result.extend_from_slice(&data);
    Ok(result)
}


/// An entry of the decoding table.
/// Symbols range up to and including 65536, the run length symbol of data that contain 65535.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Code {
    Short(ShortCode),
    Long(Vec<u32>),
    Empty,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct ShortCode {
    symbol: u32,
    len: u8,
}

/// The bits that have been read but not yet decoded.
#[derive(Default)]
struct BitBuffer {
    bits: u64,
    count: i64,
}

impl BitBuffer {
    #[inline]
    fn read_byte(&mut self, input: &mut &[u8]) -> UnitResult {
        let (&byte, rest) = input.split_first().ok_or_else(|| Error::compression(NOT_ENOUGH_DATA))?;
        *input = rest;

        self.bits = (self.bits << 8) | byte as u64;
        self.count += 8;
        Ok(())
    }

    #[inline]
    fn read_bits(&mut self, count: i64, input: &mut &[u8]) -> Result<i64> {
        while self.count < count {
            self.read_byte(input)?;
        }

        self.count -= count;
        Ok(((self.bits >> self.count) & ((1 << count) - 1)) as i64)
    }

    /// The next `count` bits, without consuming them. Requires `count <= self.count`.
    #[inline]
    fn peek(&self, count: i64) -> i64 {
        ((self.bits >> (self.count - count)) & ((1_u64 << count) - 1)) as i64
    }
}

/// Decode `input_bit_count` bits of `input` into exactly `expected_output_size` values.
fn decode(
    encoding_table: &[i64],
    decoding_table: &[Code],
    mut input: &[u8],
    input_bit_count: usize,
    run_length_code: usize,
    expected_output_size: usize,
) -> Result<Vec<u16>> {
    let mut output = Vec::with_capacity(expected_output_size);
    let mut buffer = BitBuffer::default();

    while !input.is_empty() {
        buffer.read_byte(&mut input)?;

        while buffer.count >= DECODE_BITS {
            let code = &decoding_table[buffer.peek(DECODE_BITS) as usize];

            match code {
                Code::Short(code) => {
                    buffer.count -= code.len as i64;
                    read_code_into_vec(code.symbol, run_length_code, &mut buffer, &mut input, &mut output, expected_output_size)?;
                },

                Code::Long(long_codes) => {
                    let mut found = false;

                    for &long_code in long_codes {
                        let encoded_long_code = encoding_table[long_code as usize];
                        let length = length(encoded_long_code);

                        while buffer.count < length && !input.is_empty() {
                            buffer.read_byte(&mut input)?;
                        }

                        if buffer.count >= length && buffer.peek(length) == code_bits(encoded_long_code) {
                            buffer.count -= length;
                            read_code_into_vec(long_code, run_length_code, &mut buffer, &mut input, &mut output, expected_output_size)?;
                            found = true;
                            break;
                        }
                    }

                    if !found {
                        return Err(Error::compression(INVALID_CODE));
                    }
                },

                Code::Empty => return Err(Error::compression(INVALID_CODE)),
            }
        }
    }

    // drop the padding bits of the last byte
    let padding = (8 - input_bit_count as i64) & 7;
    buffer.bits >>= padding;
    buffer.count -= padding;

    while buffer.count > 0 {
        let index = (buffer.bits << (DECODE_BITS - buffer.count)) as i64 & DECODE_MASK;

        match &decoding_table[index as usize] {
            Code::Short(short_code) if short_code.len as i64 <= buffer.count => {
                buffer.count -= short_code.len as i64;
                read_code_into_vec(short_code.symbol, run_length_code, &mut buffer, &mut input, &mut output, expected_output_size)?;
            },

            _ => return Err(Error::compression(INVALID_CODE)),
        }
    }

    if output.len() != expected_output_size {
        return Err(Error::compression(NOT_ENOUGH_DATA));
    }

    Ok(output)
}

/// Index the codes by their first `DECODE_BITS` bits.
/// A short code fills every entry that starts with its bits.
/// A long code is appended to the list of the entry for its first bits.
fn build_decoding_table(
    encoding_table: &[i64],
    min_code_index: usize,
    max_code_index: usize,
) -> Result<Vec<Code>> {
    let mut decoding_table = vec![Code::Empty; DECODING_TABLE_SIZE];

    for code_index in min_code_index..=max_code_index {
        let encoded = encoding_table[code_index];

        let code = code_bits(encoded);
        let length = length(encoded);

        if (code >> length) != 0 {
            return Err(Error::compression(INVALID_TABLE_ENTRY));
        }

        if length > DECODE_BITS {
            let long_code = &mut decoding_table[(code >> (length - DECODE_BITS)) as usize];

            match long_code {
                Code::Empty => *long_code = Code::Long(vec![code_index as u32]),
                Code::Long(symbols) => symbols.push(code_index as u32),
                _ => return Err(Error::compression(INVALID_TABLE_ENTRY)),
            }
        }
        else if length != 0 {
            let default_value = Code::Short(ShortCode {
                symbol: code_index as u32,
                len: length as u8,
            });

            let start_index = (code << (DECODE_BITS - length)) as usize;
            let count = 1 << (DECODE_BITS - length);

            for value in &mut decoding_table[start_index..start_index + count] {
                *value = default_value.clone();
            }
        }
    }

    Ok(decoding_table)
}

/// Unpack the code lengths, expanding runs of unused symbols, and compute the codes.
fn read_encoding_table(
    packed: &mut &[u8],
    min_code_index: usize,
    max_code_index: usize,
) -> Result<Vec<i64>> {
    let mut encoding_table = vec![0_i64; ENCODING_TABLE_SIZE];
    let mut buffer = BitBuffer::default();

    let mut index = min_code_index;
    while index <= max_code_index {
        let code_len = buffer.read_bits(6, packed)?;
        encoding_table[index] = code_len;

        let zero_run = {
            if code_len == LONG_ZEROCODE_RUN { Some(buffer.read_bits(8, packed)? + SHORTEST_LONG_RUN) }
            else if code_len >= SHORT_ZEROCODE_RUN { Some(code_len - SHORT_ZEROCODE_RUN + 2) }
            else { None }
        };

        if let Some(zero_run) = zero_run {
            if index as i64 + zero_run > max_code_index as i64 + 1 {
                return Err(Error::compression(TABLE_TOO_LONG));
            }

            for value in &mut encoding_table[index..index + zero_run as usize] {
                *value = 0;
            }

            index += zero_run as usize;
        }
        else {
            index += 1;
        }
    }

    build_canonical_table(&mut encoding_table);
    Ok(encoding_table)
}

#[inline]
fn length(code: i64) -> i64 {
    code & 63
}

#[inline]
fn code_bits(code: i64) -> i64 {
    code >> 6
}

#[inline]
fn read_code_into_vec(
    symbol: u32,
    run_length_code: usize,
    buffer: &mut BitBuffer,
    input: &mut &[u8],
    out: &mut Vec<u16>,
    max_len: usize,
) -> UnitResult {
    if symbol as usize == run_length_code {
        let code_repetitions = buffer.read_bits(8, input)? as usize;

        let repeated_code = *out.last()
            .ok_or_else(|| Error::compression(NOT_ENOUGH_DATA))?;

        if out.len() + code_repetitions > max_len {
            return Err(Error::compression(TOO_MUCH_DATA));
        }

        out.extend(std::iter::repeat(repeated_code).take(code_repetitions));
    }
    else if out.len() < max_len {
        let value = u16::try_from(symbol).map_err(|_| Error::compression(INVALID_CODE))?;
        out.push(value);
    }
    else {
        return Err(Error::compression(TOO_MUCH_DATA));
    }

    Ok(())
}

fn count_frequencies(frequencies: &mut [i64], data: &[u16]) {
    for value in data {
        frequencies[*value as usize] += 1;
    }
}

/// The bits that have been encoded but not yet written.
#[derive(Default)]
struct BitWriter {
    bits: u64,
    count: i64,
}

impl BitWriter {
    fn write_bits(&mut self, count: i64, bits: i64, out: &mut Vec<u8>) {
        self.bits = (self.bits << count) | bits as u64;
        self.count += count;

        while self.count >= 8 {
            self.count -= 8;
            out.push((self.bits >> self.count) as u8);
        }
    }

    fn write_code(&mut self, code: i64, out: &mut Vec<u8>) {
        self.write_bits(length(code), code_bits(code), out)
    }

    /// Write the remaining bits, padded with zeroes.
    fn flush(&mut self, out: &mut Vec<u8>) {
        if self.count > 0 {
            out.push((self.bits << (8 - self.count)) as u8);
        }
    }
}

/// Write `run_count + 1` copies of a code. Long runs are written as the code,
/// the run code and an 8-bit count, if that needs fewer bits.
#[inline]
fn send_code(code: i64, run_count: usize, run_code: i64, writer: &mut BitWriter, out: &mut Vec<u8>) {
    if length(code) + length(run_code) + 8 < length(code) * run_count as i64 {
        writer.write_code(code, out);
        writer.write_code(run_code, out);
        writer.write_bits(8, run_count as i64, out);
    }
    else {
        for _ in 0..=run_count {
            writer.write_code(code, out);
        }
    }
}

/// Returns the number of bits written.
fn encode(
    frequencies: &[i64],
    uncompressed: &[u16],
    run_length_code: usize,
    out: &mut Vec<u8>,
) -> usize {
    let mut writer = BitWriter::default();
    let mut symbol = uncompressed[0];
    let mut run_count = 0;

    for &value in &uncompressed[1..] {
        if symbol == value && run_count < 255 {
            run_count += 1;
        }
        else {
            send_code(frequencies[symbol as usize], run_count, frequencies[run_length_code], &mut writer, out);
            run_count = 0;
        }

        symbol = value;
    }

    send_code(frequencies[symbol as usize], run_count, frequencies[run_length_code], &mut writer, out);

    let bit_count = out.len() * 8 + writer.count as usize;
    writer.flush(out);
    bit_count
}

/// Write the code length of each symbol in 6 bits.
/// Two to five unused symbols in a row are written as one length of 59 to 62,
/// longer runs as 63 followed by the run length minus six in 8 bits.
fn pack_encoding_table(frequencies: &[i64], min_index: usize, max_index: usize, out: &mut Vec<u8>) {
    let mut writer = BitWriter::default();

    let mut index = min_index;
    while index <= max_index {
        let code_length = length(frequencies[index]);

        if code_length == 0 {
            let mut zero_run = 1;

            while index < max_index && zero_run < LONGEST_LONG_RUN {
                if length(frequencies[index + 1]) > 0 {
                    break;
                }

                index += 1;
                zero_run += 1;
            }

            if zero_run >= 2 {
                if zero_run >= SHORTEST_LONG_RUN {
                    writer.write_bits(6, LONG_ZEROCODE_RUN, out);
                    writer.write_bits(8, zero_run - SHORTEST_LONG_RUN, out);
                }
                else {
                    writer.write_bits(6, SHORT_ZEROCODE_RUN + zero_run - 2, out);
                }

                index += 1;
                continue;
            }
        }

        writer.write_bits(6, code_length, out);
        index += 1;
    }

    writer.flush(out);
}

/// Replace each code length with `length | code << 6`.
/// The codes follow from the lengths alone: codes of one length count up with the symbol,
/// and shorter codes are numerically larger than the prefixes of longer codes.
fn build_canonical_table(code_table: &mut [i64]) {
    debug_assert_eq!(code_table.len(), ENCODING_TABLE_SIZE);

    let mut count_per_length = [0_i64; MAX_CODE_LENGTH as usize + 1];

    for &length in code_table.iter() {
        count_per_length[length as usize] += 1;
    }

    // the first code of each length, starting with the longest
    let mut code = 0_i64;
    for count in count_per_length.iter_mut().skip(1).rev() {
        let next_code = (code + *count) >> 1;
        *count = code;
        code = next_code;
    }

    for entry in code_table.iter_mut() {
        let length = *entry;
        if length > 0 {
            *entry = length | (count_per_length[length as usize] << 6);
            count_per_length[length as usize] += 1;
        }
    }
}


/// A subtree in the heap, named by one of its symbols.
#[derive(Eq, PartialEq)]
struct HeapFrequency {
    position: usize,
    frequency: i64,
}

impl Ord for HeapFrequency {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed, so that the least frequent symbol is on top,
        // and the lower index wins between equal frequencies
        other.frequency.cmp(&self.frequency)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for HeapFrequency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Replace the frequencies with canonical codes, and return the range of used symbols.
/// The symbol behind the largest used value becomes the run symbol.
/// Equal frequencies are ordered by symbol, so the codes do not depend on the heap implementation.
fn build_encoding_table(frequencies: &mut [i64]) -> Result<(usize, usize)> {
    debug_assert_eq!(frequencies.len(), ENCODING_TABLE_SIZE);

    // each symbol links to the next symbol in the same subtree,
    // the last symbol of a subtree links to itself
    let mut links = vec![0_usize; ENCODING_TABLE_SIZE];
    let mut heap = BinaryHeap::new();

    let min_frequency_index = frequencies.iter().position(|f| *f != 0).unwrap_or(0);
    let mut max_frequency_index = 0;

    for index in min_frequency_index..ENCODING_TABLE_SIZE {
        links[index] = index;

        if frequencies[index] != 0 {
            heap.push(HeapFrequency { position: index, frequency: frequencies[index] });
            max_frequency_index = index;
        }
    }

    // the run symbol
    max_frequency_index += 1;
    frequencies[max_frequency_index] = 1;
    heap.push(HeapFrequency { position: max_frequency_index, frequency: 1 });

    // repeatedly merge the two least frequent subtrees,
    // adding one bit to the code length of each symbol in both
    let mut code_lengths = vec![0_i64; ENCODING_TABLE_SIZE];

    while heap.len() > 1 {
        let (least, mut second) = match (heap.pop(), heap.pop()) {
            (Some(least), Some(second)) => (least, second),
            _ => break,
        };

        second.frequency += least.frequency;
        let high_position = second.position;
        heap.push(second);

        // both subtrees get one bit longer, and the lists are joined
        let mut index = high_position;
        loop {
            code_lengths[index] += 1;
            if code_lengths[index] > MAX_CODE_LENGTH {
                return Err(Error::compression("huffman code too long"));
            }

            if links[index] == index {
                links[index] = least.position;
                break;
            }

            index = links[index];
        }

        let mut index = least.position;
        loop {
            code_lengths[index] += 1;
            if code_lengths[index] > MAX_CODE_LENGTH {
                return Err(Error::compression("huffman code too long"));
            }

            if links[index] == index {
                break;
            }

            index = links[index];
        }
    }

    build_canonical_table(&mut code_lengths);
    frequencies.copy_from_slice(&code_lengths);

    Ok((min_frequency_index, max_frequency_index))
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    fn fill(rng: &mut impl Rng, size: usize) -> Vec<u16> {
        (0 .. size).map(|_| rng.random_range(0 .. u16::MAX)).collect()
    }

    #[test]
    fn canonical_codes_from_lengths() {
        let mut table = vec![ 0_i64; ENCODING_TABLE_SIZE ];
        table[1 ..= 4].copy_from_slice(&[ 1, 2, 3, 3 ]);
        build_canonical_table(&mut table);

        // the codes 1, 01, 000 and 001
        assert_eq!(&table[.. 5], &[ 0, 1 | 1 << 6, 2 | 1 << 6, 3, 3 | 1 << 6 ]);
        assert!(table[5 ..].iter().all(|&entry| entry == 0));
    }

    #[test]
    fn header_names_the_symbol_range() {
        let compressed = compress(&[ 5, 5, 5, 5, 9 ]).unwrap();
        let header: Vec<u32> = compressed[.. HEADER_SIZE].chunks(4)
            .map(|bytes| u32::from_le_bytes([ bytes[0], bytes[1], bytes[2], bytes[3] ]))
            .collect();

        // the run symbol follows the largest value
        assert_eq!(&header[.. 2], &[ 5, 10 ]);
        assert_eq!(header[2] as usize + HEADER_SIZE + (header[3] as usize + 7) / 8, compressed.len());
        assert_eq!(header[4], 0);
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut rng = rand::rng();
        let values = fill(&mut rng, 5000);
        assert_eq!(compress(&values).unwrap(), compress(&values).unwrap());
    }

    #[test]
    fn round_trip() {
        let mut rng = rand::rng();

        for &size in &[ 1, 2, 17, 1000, u16::MAX as usize, 200_000 ] {
            let raw = fill(&mut rng, size);

            let compressed = compress(&raw).unwrap();
            let uncompressed = decompress(&compressed, raw.len()).unwrap();

            assert_eq!(uncompressed, raw);
        }
    }

    #[test]
    fn round_trip_runs() {
        let zeroes = vec![ 0_u16; 12 ];
        assert_eq!(decompress(&compress(&zeroes).unwrap(), zeroes.len()).unwrap(), zeroes);

        let mut runs = Vec::new();
        for index in 0 .. 40_u16 {
            runs.extend(std::iter::repeat(index % 3).take(index as usize * 11 + 1));
            runs.push(65534);
        }

        let compressed = compress(&runs).unwrap();
        assert!(compressed.len() < runs.len());
        assert_eq!(decompress(&compressed, runs.len()).unwrap(), runs);
    }

    #[test]
    fn run_length_symbol_above_the_largest_value() {
        let mut values = vec![ 65535, 1, 2, 3 ];
        values.extend(std::iter::repeat(7).take(40));

        let compressed = compress(&values).unwrap();
        let max_code_index = u32::from_le_bytes([ compressed[4], compressed[5], compressed[6], compressed[7] ]);
        assert_eq!(max_code_index, 65536);

        assert_eq!(decompress(&compressed, values.len()).unwrap(), values);
    }

    #[test]
    fn long_runs_of_the_largest_value() {
        let mut values = vec![ 0_u16; 3 ];
        values.extend(std::iter::repeat(65535).take(700));
        values.extend_from_slice(&[ 12, 65535, 0, 0 ]);

        let compressed = compress(&values).unwrap();
        assert!(compressed.len() < 100);
        assert_eq!(decompress(&compressed, values.len()).unwrap(), values);
    }

    #[test]
    fn wrong_expected_size() {
        let values: Vec<u16> = (0 .. 100).map(|index| index * 613).collect();
        let compressed = compress(&values).unwrap();
        assert!(decompress(&compressed, 99).is_err());
        assert!(decompress(&compressed, 101).is_err());
        assert!(decompress(&[], 1).is_err());
        assert_eq!(decompress(&[], 0).unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn garbage_does_not_panic() {
        let mut rng = rand::rng();
        let compressed = compress(&fill(&mut rng, 100)).unwrap();

        for _ in 0 .. 300 {
            let mut bytes = compressed.clone();
            let index = rng.random_range(0 .. bytes.len());
            bytes[index] = rng.random();
            bytes.truncate(rng.random_range(0 ..= bytes.len()));

            let _ = decompress(&bytes, 100);
        }
    }
}
