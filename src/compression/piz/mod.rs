
//! PIZ: the words of a block are renumbered densely, transformed with a wavelet,
//! and then huffman encoded. A 32-bit sample counts as two interleaved 16-bit words.

mod huffman;
mod wavelet;

use std::convert::TryFrom;
use std::ops::Range;

use super::*;
use super::Result;
use crate::error::usize_to_i32;
use crate::io::Data;
use crate::math::Vec2;


const WORD_VALUES: usize = 1 << 16;

/// One bit for each possible word.
const BITMAP_BYTES: usize = WORD_VALUES / 8;


/// Wavelet and Huffman compression of 16-bit words.
pub struct Piz;

impl BlockCompressor for Piz {
    fn compress(&self, channels: &ChannelList, uncompressed: Bytes<'_>, bounds: IntegerBounds) -> Result<ByteVec> {
        compress(channels, uncompressed, bounds)
    }

    fn decompress(&self, channels: &ChannelList, compressed: Bytes<'_>, bounds: IntegerBounds, expected_byte_size: usize, _: bool) -> Result<ByteVec> {
        decompress(channels, compressed, bounds, expected_byte_size)
    }
}


/// The words of one channel inside the planar buffer.
#[derive(Debug)]
struct Region {
    start: usize,

    /// Lines are filled in or taken out one after another, starting at `start`.
    cursor: usize,

    resolution: Vec2<usize>,
    y_sampling: usize,
    words_per_sample: usize,
}

impl Region {
    fn words_per_line(&self) -> usize { self.resolution.x() * self.words_per_sample }
    fn len(&self) -> usize { self.words_per_line() * self.resolution.y() }
    fn range(&self) -> Range<usize> { self.start .. self.start + self.len() }

    fn next_line(&mut self) -> Range<usize> {
        let line = self.cursor .. self.cursor + self.words_per_line();
        self.cursor = line.end;
        line
    }
}

/// Each channel becomes a plane of words, and the planes follow each other.
/// Also returns the total number of words.
fn planar_regions(channels: &ChannelList, bounds: IntegerBounds) -> (Vec<Region>, usize) {
    let mut start = 0;

    let regions = channels.list.iter().map(|channel| {
        let region = Region {
            start, cursor: start,
            resolution: channel.subsampled_block_resolution(bounds),
            y_sampling: channel.sampling.y(),
            words_per_sample: channel.sample_type.bytes_per_sample() / u16::BYTE_SIZE,
        };

        start += region.len();
        region
    }).collect();

    (regions, start)
}

/// Visit the planar line of each channel in the order of the interleaved block:
/// line by line, and within a line, channel by channel, skipping subsampled lines.
fn interleaved_lines(
    regions: &mut [Region], bounds: IntegerBounds,
    mut visit: impl FnMut(Range<usize>) -> UnitResult
) -> UnitResult
{
    for y in i64::from(bounds.position.y()) .. bounds.end().y() {
        for region in regions.iter_mut() {
            if y.rem_euclid(region.y_sampling as i64) == 0 {
                visit(region.next_line())?;
            }
        }
    }

    Ok(())
}

type Transform = fn(&mut [u16], Vec2<usize>, Vec2<usize>, u16) -> UnitResult;

/// Run the wavelet transform on every plane, once per word of a sample.
fn transform_planes(words: &mut [u16], regions: &[Region], max_value: u16, transform: Transform) -> UnitResult {
    for region in regions.iter().filter(|region| region.len() > 0) {
        let plane = &mut words[region.range()];
        let strides = Vec2(region.words_per_sample, region.words_per_line());

        for word in 0 .. region.words_per_sample {
            transform(&mut plane[word ..], region.resolution, strides, max_value)?;
        }
    }

    Ok(())
}


/// Which words occur in a block. Zero counts as always present and is never stored.
#[derive(Debug, Clone, PartialEq)]
struct Bitmap(Vec<u8>);

impl Bitmap {
    fn empty() -> Self { Bitmap(vec![ 0; BITMAP_BYTES ]) }

    fn of(words: &[u16]) -> Self {
        let mut bitmap = Self::empty();

        for &word in words {
            bitmap.0[usize::from(word >> 3)] |= 1_u8 << (word & 7);
        }

        bitmap.0[0] &= !1;
        bitmap
    }

    fn contains(&self, word: u16) -> bool {
        word == 0 || self.0[usize::from(word >> 3)] & (1_u8 << (word & 7)) != 0
    }

    /// The first and the last byte with a bit set, if any word other than zero occurs.
    fn used_bytes(&self) -> Option<(usize, usize)> {
        let first = self.0.iter().position(|&byte| byte != 0)?;
        let last = self.0.iter().rposition(|&byte| byte != 0)?;
        Some((first, last))
    }

    /// All occurring words in increasing order. The position of a word in this list is its dense number.
    fn values(&self) -> Vec<u16> {
        (0 ..= u16::MAX).filter(|&word| self.contains(word)).collect()
    }
}

/// The largest dense number, for the wavelet to choose its value range.
fn max_dense(values: &[u16]) -> u16 {
    u16::try_from(values.len().saturating_sub(1)).unwrap_or(u16::MAX)
}


pub fn compress(channels: &ChannelList, bytes: Bytes<'_>, bounds: IntegerBounds) -> Result<ByteVec> {
    let (mut regions, word_count) = planar_regions(channels, bounds);
    if word_count * u16::BYTE_SIZE != bytes.len() {
        return Err(Error::compression("piz block size"));
    }

    let mut words = vec![ 0_u16; word_count ];
    let mut interleaved = bytes;

    interleaved_lines(&mut regions, bounds, |line| {
        u16::read_slice_le(&mut interleaved, &mut words[line])
    })?;

    let bitmap = Bitmap::of(&words);
    let values = bitmap.values();

    let mut dense = vec![ 0_u16; WORD_VALUES ];
    for (number, &value) in values.iter().enumerate() {
        dense[usize::from(value)] = number as u16;
    }

    for word in &mut words {
        *word = dense[usize::from(*word)];
    }

    transform_planes(&mut words, &regions, max_dense(&values), wavelet::encode)?;

    // without any word other than zero, the range is stored inverted
    let (first, last) = bitmap.used_bytes().unwrap_or((BITMAP_BYTES - 1, 0));

    let mut output = Vec::with_capacity(bytes.len() / 3);
    (first as u16).write_le(&mut output)?;
    (last as u16).write_le(&mut output)?;

    if first <= last {
        output.extend_from_slice(&bitmap.0[first ..= last]);
    }

    let encoded = huffman::compress(&words)?;
    usize_to_i32(encoded.len(), "piz huffman data length")?.write_le(&mut output)?;
    output.extend_from_slice(&encoded);

    Ok(output)
}

pub fn decompress(
    channels: &ChannelList, compressed: Bytes<'_>,
    bounds: IntegerBounds, expected_byte_size: usize,
) -> Result<ByteVec>
{
    let (mut regions, word_count) = planar_regions(channels, bounds);
    if word_count * u16::BYTE_SIZE != expected_byte_size {
        return Err(Error::compression("piz block size"));
    }

    let mut input = compressed;
    let first = usize::from(u16::read_le(&mut input)?);
    let last = usize::from(u16::read_le(&mut input)?);

    if last >= BITMAP_BYTES {
        return Err(Error::compression("piz bitmap size"));
    }

    let mut bitmap = Bitmap::empty();
    if first <= last {
        u8::read_slice_le(&mut input, &mut bitmap.0[first ..= last])?;
    }

    let values = bitmap.values();

    let length = i32::read_le(&mut input)?;
    let encoded = usize::try_from(length).ok()
        .and_then(|length| input.get(.. length))
        .ok_or_else(|| Error::compression("piz huffman data length"))?;

    let mut words = huffman::decompress(encoded, word_count)?;
    transform_planes(&mut words, &regions, max_dense(&values), wavelet::decode)?;

    // corrupt data may contain dense numbers without a value
    for word in &mut words {
        *word = values.get(usize::from(*word)).copied().unwrap_or(0);
    }

    let mut interleaved = Vec::with_capacity(expected_byte_size);

    interleaved_lines(&mut regions, bounds, |line| {
        let line = words.get(line).ok_or_else(|| Error::compression("piz channel layout"))?;
        u16::write_slice_le(&mut interleaved, line)
    })?;

    debug_assert_eq!(interleaved.len(), expected_byte_size);
    Ok(interleaved)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::ChannelDescription;
    use smallvec::smallvec;
    use rand::Rng;

    fn roundtrip(channels: &ChannelList, bounds: IntegerBounds, bytes: &[u8]) {
        let compressed = compress(channels, bytes, bounds).unwrap();
        let decompressed = decompress(channels, &compressed, bounds, bytes.len()).unwrap();
        assert_eq!(bytes, decompressed.as_slice());
    }

    #[test]
    fn roundtrip_any_sample_type(){
        let channels = ChannelList::new(smallvec![
            ChannelDescription::named("G", SampleType::F16),
            ChannelDescription::named("Z", SampleType::F32),
            ChannelDescription::named("id", SampleType::U32),
        ]);

        let mut random = rand::rng();

        for &(width, height) in &[ (1, 1), (3, 1), (1, 5), (7, 13), (32, 32), (33, 17) ] {
            let bounds = IntegerBounds::new((-5, 3), (width, height));
            let bytes: Vec<u8> = (0 .. block_byte_size(&channels, bounds)).map(|_| random.random()).collect();
            roundtrip(&channels, bounds, &bytes);
        }
    }

    #[test]
    fn roundtrip_special_float_bits(){
        let channels = ChannelList::new(smallvec![ ChannelDescription::named("Y", SampleType::F16) ]);
        let bounds = IntegerBounds::new((0, 0), (4, 2));

        // nan, infinities, negative zero, subnormals
        let values: [u16; 8] = [ 0x7e00, 0x7c00, 0xfc00, 0x8000, 0x0001, 0x03ff, 0x7bff, 0xffff ];
        let bytes: Vec<u8> = values.iter().flat_map(|value| value.to_le_bytes()).collect();
        roundtrip(&channels, bounds, &bytes);
    }

    #[test]
    fn roundtrip_subsampled(){
        let mut chroma = ChannelDescription::named("BY", SampleType::F16);
        chroma.sampling = Vec2(2, 2);

        let channels = ChannelList::new(smallvec![ chroma, ChannelDescription::named("Y", SampleType::F16) ]);
        let bounds = IntegerBounds::new((0, 2), (6, 5));
        let bytes: Vec<u8> = (0 .. block_byte_size(&channels, bounds)).map(|index| (index * 13 % 256) as u8).collect();
        roundtrip(&channels, bounds, &bytes);
    }

    #[test]
    fn bitmap_lists_the_occurring_words(){
        let bitmap = Bitmap::of(&[ 7, 7, 300, 65535 ]);
        assert_eq!(bitmap.used_bytes(), Some((0, BITMAP_BYTES - 1)));
        assert_eq!(bitmap.values(), vec![ 0, 7, 300, 65535 ]);
        assert_eq!(max_dense(&bitmap.values()), 3);

        // zero alone leaves the bitmap empty
        let zeroes = Bitmap::of(&[ 0, 0 ]);
        assert_eq!(zeroes.used_bytes(), None);
        assert_eq!(zeroes.values(), vec![ 0 ]);
    }

    #[test]
    fn all_words_occurring(){
        let channels = ChannelList::new(smallvec![ ChannelDescription::named("Y", SampleType::F16) ]);
        let bounds = IntegerBounds::new((0, 0), (256, 256));

        let bytes: Vec<u8> = (0 ..= u16::MAX).flat_map(|word| word.to_le_bytes()).collect();
        roundtrip(&channels, bounds, &bytes);
    }

    #[test]
    fn zeroes_only(){
        let channels = ChannelList::new(smallvec![ ChannelDescription::named("Y", SampleType::F16) ]);
        let bounds = IntegerBounds::new((0, 0), (9, 3));
        roundtrip(&channels, bounds, &[ 0; 9 * 3 * 2 ]);
    }

    #[test]
    fn corrupt_header_is_rejected(){
        let channels = ChannelList::new(smallvec![ ChannelDescription::named("Y", SampleType::F16) ]);
        let bounds = IntegerBounds::new((0, 0), (16, 16));

        // bitmap range exceeding the bitmap size
        assert!(decompress(&channels, &[0, 0, 0xff, 0xff, 0, 0], bounds, 512).is_err());

        // huffman length exceeding the data
        assert!(decompress(&channels, &[1, 0, 0, 0, 100, 0, 0, 0, 1, 2], bounds, 512).is_err());
    }
}
