//! Deep images, where each pixel holds any number of samples per channel.

use std::ops::Range;

use crate::block::{BlockIndex, UncompressedDeepBlock};
use crate::block::lines::{LineIndex, LineRef, LineRefMut};
use crate::error::{Error, Result, UnitResult};
use crate::image::Samples;
use crate::math::*;
use crate::meta::attribute::Text;
use crate::meta::header::Header;


/// A deep scan line image.
///
/// The samples of a pixel at `(x, y)` are found in each channel row `y`,
/// in the range `sample_offsets[y][x - 1] .. sample_offsets[y][x]`,
/// where the offset before the first pixel is zero.
#[derive(Clone, Debug, PartialEq)]
pub struct DeepImage {

    /// The resolution in pixels.
    pub size: Vec2<usize>,

    /// The channel names, in the order of the header.
    pub channel_names: Vec<Text>,

    /// For each row, for each pixel, the number of samples
    /// in that pixel and all pixels to its left.
    pub sample_offsets: Vec<Vec<u32>>,

    /// For each channel, for each row, all samples of that row.
    pub channels: Vec<Vec<Samples>>,
}


impl DeepImage {

    /// An image without any samples, with rows to be filled by decoding.
    pub fn allocate(header: &Header) -> Self {
        let size = header.data_size();

        DeepImage {
            size,
            channel_names: header.channels.list.iter().map(|channel| channel.name.clone()).collect(),
            sample_offsets: vec![ vec![ 0; size.width() ]; size.height() ],
            channels: header.channels.list.iter()
                .map(|channel| vec![ Samples::new(channel.requested_type, 0); size.height() ])
                .collect(),
        }
    }

    /// The number of samples of all pixels in the row.
    pub fn row_sample_count(&self, y: usize) -> usize {
        self.sample_offsets.get(y)
            .and_then(|row| row.last())
            .map_or(0, |&count| count as usize)
    }

    /// Where the samples of the pixel are located in each channel row.
    pub fn sample_range(&self, position: Vec2<usize>) -> Option<Range<usize>> {
        let row = self.sample_offsets.get(position.y())?;
        let end = *row.get(position.x())? as usize;
        let start = if position.x() == 0 { 0 } else { row[position.x() - 1] as usize };
        Some(start .. end)
    }

    /// The samples of a channel in one pixel, converted to `f32`.
    pub fn pixel_samples(&self, channel: usize, position: Vec2<usize>) -> Option<Vec<f32>> {
        let range = self.sample_range(position)?;
        let row = self.channels.get(channel)?.get(position.y())?;
        range.map(|index| row.value_as_f32(index)).collect()
    }

    /// Check whether this image can be written with the header.
    pub fn validate(&self, header: &Header) -> UnitResult {
        if !header.deep {
            return Err(Error::argument("deep image for a flat header"));
        }

        if self.size != header.data_size() {
            return Err(Error::argument("deep image size not matching the header"));
        }

        if self.channels.len() != header.channels.list.len() || self.channel_names.len() != self.channels.len() {
            return Err(Error::argument("deep channel count not matching the header"));
        }

        for (name, channel) in self.channel_names.iter().zip(&header.channels.list) {
            if name != &channel.name {
                return Err(Error::argument(format!("deep channel `{}` not matching the header", name)));
            }
        }

        if self.sample_offsets.len() != self.size.height() {
            return Err(Error::argument("deep sample offset row count"));
        }

        for (y, row) in self.sample_offsets.iter().enumerate() {
            if row.len() != self.size.width() {
                return Err(Error::argument("deep sample offset row width"));
            }

            if row.windows(2).any(|pair| pair[1] < pair[0]) {
                return Err(Error::argument("deep sample offsets not increasing"));
            }

            let sample_count = self.row_sample_count(y);

            for (rows, channel) in self.channels.iter().zip(&header.channels.list) {
                let samples = rows.get(y).ok_or_else(|| Error::argument("deep channel row count"))?;

                if samples.len() != sample_count {
                    return Err(Error::argument(format!("deep sample count of channel `{}` in row {}", channel.name, y)));
                }

                if !samples.sample_type().converts_to(channel.sample_type) {
                    return Err(Error::argument(format!("deep samples of channel `{}` cannot be stored as {:?}", channel.name, channel.sample_type)));
                }
            }
        }

        Ok(())
    }

    /// Copy the rows of a decompressed block into this image.
    /// The header must carry the requested sample types.
    pub(crate) fn insert_block(&mut self, header: &Header, block: UncompressedDeepBlock) -> UnitResult {
        let width = block.index.pixel_size.width();
        let mut sample_bytes = block.sample_data.as_slice();

        for (line_index, sample_count) in block.line_sample_counts().enumerate() {
            let y = block.index.pixel_position.y() + line_index;
            let table = block.sample_count_table.get(line_index * width .. (line_index + 1) * width)
                .ok_or_else(|| Error::invalid("deep sample count table size"))?;

            *self.sample_offsets.get_mut(y).ok_or_else(|| Error::invalid("deep block position"))? = table.to_vec();

            for (channel_index, channel) in header.channels.list.iter().enumerate() {
                let byte_count = sample_count * channel.sample_type.bytes_per_sample();
                if sample_bytes.len() < byte_count {
                    return Err(Error::invalid("deep sample data too small"));
                }

                let (bytes, rest) = sample_bytes.split_at(byte_count);
                sample_bytes = rest;

                let location = deep_line(block.index, channel_index, y, sample_count);
                let mut samples = Samples::new(channel.requested_type, sample_count);
                samples.read_line(0, LineRef { location, value: bytes }, channel.sample_type)?;

                // allocation guarantees one row per line and one channel per header channel
                self.channels[channel_index][y] = samples;
            }
        }

        Ok(())
    }

    /// Collect the rows of a block from this image.
    pub(crate) fn extract_block(&self, header: &Header, index: BlockIndex) -> Result<UncompressedDeepBlock> {
        let rows = index.pixel_position.y() .. index.pixel_position.y() + index.pixel_size.height();

        let mut sample_count_table = Vec::with_capacity(index.pixel_size.area());
        let mut sample_data = Vec::new();

        for y in rows {
            let row = self.sample_offsets.get(y).ok_or_else(|| Error::argument("deep row index"))?;
            sample_count_table.extend_from_slice(row);

            let sample_count = self.row_sample_count(y);

            for (channel_index, channel) in header.channels.list.iter().enumerate() {
                let samples = self.channels.get(channel_index)
                    .and_then(|rows| rows.get(y))
                    .ok_or_else(|| Error::argument("deep channel row"))?;

                let start = sample_data.len();
                sample_data.resize(start + sample_count * channel.sample_type.bytes_per_sample(), 0);

                let location = deep_line(index, channel_index, y, sample_count);
                samples.write_line(0, LineRefMut { location, value: &mut sample_data[start ..] }, channel.sample_type)?;
            }
        }

        Ok(UncompressedDeepBlock { index, sample_count_table, sample_data })
    }
}

/// All samples of one channel in one row form a single line.
fn deep_line(block: BlockIndex, channel: usize, y: usize, sample_count: usize) -> LineIndex {
    LineIndex {
        part: block.part,
        channel,
        level: block.level,
        position: Vec2(0, y),
        sample_count,
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::meta::Blocks;
    use crate::meta::attribute::{ChannelDescription, LineOrder, SampleType};
    use smallvec::smallvec;

    fn header() -> Header {
        Header::new(Vec2(3, 2), smallvec![
            ChannelDescription::named("A", SampleType::F16),
            ChannelDescription::named("Z", SampleType::F32),
        ])
            .with_encoding(Compression::ZIP16, Blocks::ScanLines, LineOrder::Increasing)
            .with_deep(Some(3))
    }

    fn image() -> DeepImage {
        DeepImage {
            size: Vec2(3, 2),
            channel_names: vec![ "A".into(), "Z".into() ],
            sample_offsets: vec![ vec![ 1, 1, 3 ], vec![ 0, 0, 0 ] ],
            channels: vec![
                vec![ Samples::F16(vec![ half::f16::ONE; 3 ]), Samples::F16(Vec::new()) ],
                vec![ Samples::F32(vec![ 1.0, 2.0, 3.0 ]), Samples::F32(Vec::new()) ],
            ],
        }
    }

    #[test]
    fn samples_of_a_pixel(){
        let image = image();
        assert_eq!(image.sample_range(Vec2(0, 0)), Some(0 .. 1));
        assert_eq!(image.sample_range(Vec2(1, 0)), Some(1 .. 1));
        assert_eq!(image.pixel_samples(1, Vec2(2, 0)), Some(vec![ 2.0, 3.0 ]));
        assert_eq!(image.pixel_samples(1, Vec2(2, 1)), Some(Vec::new()));
        assert_eq!(image.sample_range(Vec2(3, 0)), None);
    }

    #[test]
    fn rows_round_trip_through_blocks(){
        let header = header();
        let image = image();
        image.validate(&header).unwrap();

        let mut decoded = DeepImage::allocate(&header);
        for tile in header.blocks_increasing_y_order() {
            let index = BlockIndex::from_coordinates(0, &header, tile.location).unwrap();
            decoded.insert_block(&header, image.extract_block(&header, index).unwrap()).unwrap();
        }

        assert_eq!(decoded, image);
    }

    #[test]
    fn inconsistent_images_are_rejected(){
        let header = header();

        let mut decreasing = image();
        decreasing.sample_offsets[0] = vec![ 2, 1, 3 ];
        assert!(decreasing.validate(&header).is_err());

        let mut missing_samples = image();
        missing_samples.channels[1][0] = Samples::F32(vec![ 1.0 ]);
        assert!(missing_samples.validate(&header).is_err());
    }
}
