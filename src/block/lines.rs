//! The lines of one channel inside an uncompressed block.

use std::ops::Range;

use smallvec::SmallVec;

use crate::block::BlockIndex;
use crate::error::{Error, Result, UnitResult};
use crate::io::Data;
use crate::math::*;
use crate::meta::attribute::sample_count_in_range;
use crate::meta::header::Header;


/// The bytes of one line of one channel, together with where the line belongs.
/// `T` is a shared or a mutable byte slice, see `LineRef` and `LineRefMut`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct LineSlice<T> {

    /// The position of the line in the file.
    pub location: LineIndex,

    /// Little endian samples of the channel's sample type.
    pub value: T,
}

/// Read access to the samples of a line.
pub type LineRef<'s> = LineSlice<&'s [u8]>;

/// Write access to the samples of a line.
pub type LineRefMut<'s> = LineSlice<&'s mut [u8]>;


/// Identifies a line of one channel in a file.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct LineIndex {

    /// Which part.
    pub part: usize,

    /// Position in the channel list of the part.
    pub channel: usize,

    /// Resolution level, zero without levels.
    pub level: Vec2<usize>,

    /// The first sample of the line, relative to the data window of the level.
    /// Subsampled channels count in samples, not in pixels.
    pub position: Vec2<usize>,

    /// Length of the line in samples.
    pub sample_count: usize,
}


#[derive(Clone, Copy, Debug)]
struct ChannelLayout {
    sampling: Vec2<usize>,
    bytes_per_sample: usize,
    first_sample_x: usize,
    sample_count: usize,
}

// row by row, and in each row the channels that have samples there
#[derive(Debug)]
struct LineIter {
    part: usize,
    level: Vec2<usize>,
    data_window_y: i64,
    channels: SmallVec<[ChannelLayout; 5]>,

    y: usize,
    end_y: usize,
    channel: usize,
    byte: usize,
}

impl Iterator for LineIter {
    type Item = (Range<usize>, LineIndex);

    fn next(&mut self) -> Option<Self::Item> {
        if self.channels.is_empty() { return None; }

        while self.y < self.end_y {
            let channel_index = self.channel;
            let layout = self.channels[channel_index];
            let y = self.y;

            self.channel += 1;
            if self.channel == self.channels.len() {
                self.channel = 0;
                self.y += 1;
            }

            let absolute_y = self.data_window_y + y as i64;
            if absolute_y.rem_euclid(layout.sampling.y() as i64) != 0 {
                continue;
            }

            let byte_len = layout.sample_count * layout.bytes_per_sample;
            let bytes = self.byte .. self.byte + byte_len;
            self.byte += byte_len;

            return Some((bytes, LineIndex {
                part: self.part,
                channel: channel_index,
                level: self.level,
                position: Vec2(layout.first_sample_x, y / layout.sampling.y()),
                sample_count: layout.sample_count,
            }));
        }

        None
    }
}

impl LineIndex {

    /// The byte range and the index of each line of an uncompressed block, in the order they are stored:
    /// row by row, and within a row every channel that is sampled in that row.
    pub fn lines_in_block(block: BlockIndex, header: &Header) -> impl Iterator<Item = (Range<usize>, LineIndex)> {
        let data_window = header.data_window.position;

        let channels = header.channels.list.iter().map(|channel| {
            let x_sampling = channel.sampling.x();
            let absolute_x = data_window.x() as i64 + block.pixel_position.x() as i64;

            ChannelLayout {
                sampling: channel.sampling,
                bytes_per_sample: channel.sample_type.bytes_per_sample(),
                first_sample_x: block.pixel_position.x() / x_sampling,
                sample_count: sample_count_in_range(absolute_x as i32, block.pixel_size.width(), x_sampling),
            }
        }).collect();

        LineIter {
            part: block.part,
            level: block.level,
            data_window_y: data_window.y() as i64,
            channels,

            y: block.pixel_position.y(),
            end_y: block.pixel_position.y() + block.pixel_size.height(),
            channel: 0,
            byte: 0,
        }
    }
}


impl<'s> LineRefMut<'s> {

    /// Overwrite the line. The slice must contain exactly one value per sample.
    pub fn write_samples_from_slice<T: Data>(self, slice: &[T]) -> UnitResult {
        if slice.len() != self.location.sample_count || self.value.len() != slice.len() * T::BYTE_SIZE {
            return Err(Error::argument("line size not matching the sample count"));
        }

        let mut write: &mut [u8] = self.value;
        T::write_slice_le(&mut write, slice)
    }
}

impl LineRef<'_> {

    /// Fill the slice, which must be as long as the line.
    pub fn read_samples_into_slice<T: Data>(self, slice: &mut [T]) -> UnitResult {
        if slice.len() != self.location.sample_count || self.value.len() != slice.len() * T::BYTE_SIZE {
            return Err(Error::invalid("line size not matching the sample count"));
        }

        let mut read = self.value;
        T::read_slice_le(&mut read, slice)
    }

    /// All samples, left to right.
    pub fn read_samples<T: Data>(&self) -> Result<Vec<T>> {
        let mut samples = vec![ T::default(); self.location.sample_count ];
        self.read_samples_into_slice(&mut samples)?;
        Ok(samples)
    }
}


#[cfg(test)]
mod test {
    use smallvec::smallvec;

    use super::*;
    use crate::compression::block_byte_size;
    use crate::meta::attribute::{ChannelDescription, IntegerBounds, SampleType};

    #[test]
    fn lines_of_a_simple_block(){
        let header = Header::new(Vec2(5, 3), smallvec![
            ChannelDescription::named("A", SampleType::F16),
            ChannelDescription::named("B", SampleType::U32),
        ]);

        let block = BlockIndex { part: 0, pixel_position: Vec2(0, 1), pixel_size: Vec2(5, 2), level: Vec2(0, 0) };
        let lines: Vec<_> = LineIndex::lines_in_block(block, &header).collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].0, 0 .. 10);
        assert_eq!(lines[1].0, 10 .. 30);
        assert_eq!(lines[2].0, 30 .. 40);
        assert_eq!(lines[3].1.position, Vec2(0, 2));
        assert_eq!(lines[3].1.channel, 1);
    }

    #[test]
    fn subsampled_lines_cover_the_block(){
        let mut chroma = ChannelDescription::named("RY", SampleType::F16);
        chroma.sampling = Vec2(2, 2);

        let header = Header::new(Vec2(6, 4), smallvec![ chroma, ChannelDescription::named("Y", SampleType::F32) ])
            .with_position(Vec2(-2, 2));

        let block = BlockIndex { part: 0, pixel_position: Vec2(0, 0), pixel_size: Vec2(6, 4), level: Vec2(0, 0) };
        let lines: Vec<_> = LineIndex::lines_in_block(block, &header).collect();

        // rows 2 and 4 carry chroma samples, all rows carry luma
        assert_eq!(lines.iter().filter(|(_, line)| line.channel == 0).count(), 2);
        assert_eq!(lines.iter().filter(|(_, line)| line.channel == 1).count(), 4);
        assert_eq!(lines[2].1.sample_count, 6);
        assert_eq!(lines[3].1.channel, 0);
        assert_eq!(lines[3].1.position, Vec2(0, 1));
        assert_eq!(lines[3].1.sample_count, 3);

        let bounds = IntegerBounds::new(Vec2(-2, 2), Vec2(6, 4));
        assert_eq!(lines.last().unwrap().0.end, block_byte_size(&header.channels, bounds));
    }

    #[test]
    fn samples_round_trip_through_lines(){
        let location = LineIndex { part: 0, channel: 0, level: Vec2(0, 0), position: Vec2(0, 0), sample_count: 3 };
        let mut bytes = vec![ 0_u8; 12 ];

        LineRefMut { location, value: &mut bytes }.write_samples_from_slice(&[ 1.5_f32, -2.0, 8.25 ]).unwrap();
        assert_eq!(LineRef { location, value: &bytes }.read_samples::<f32>().unwrap(), vec![ 1.5, -2.0, 8.25 ]);

        assert!(LineRef { location, value: &bytes[.. 8] }.read_samples::<f32>().is_err());
    }
}
