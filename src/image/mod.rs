//! Decoded images in memory: one plane of samples per channel and resolution level.
//! Use `image::read` and `image::write` to decode and encode them,
//! or the functions in the `simple` module.

pub mod read;
pub mod write;
pub mod deep;
pub mod parts;

use half::f16;
use half::slice::HalfFloatSliceExt;

use crate::block::lines::{LineRef, LineRefMut};
use crate::block::{UncompressedBlock, UncompressedDeepBlock, DecompressChunk, CompressBlock};
use crate::block::chunk::Chunk;
use crate::error::{Error, Result, UnitResult};
use crate::math::*;
use crate::meta::{Blocks, MetaData, rip_map_level_count};
use crate::meta::attribute::{LevelMode, SampleType};
use crate::meta::header::{Header, LevelInfo};

pub use self::deep::DeepImage;
pub use self::parts::{Part, Content};
pub use self::read::ReadOptions;
pub use self::write::WriteOptions;


/// The samples of one channel in one resolution level, stored row by row.
/// The type is the requested type of the channel, which may differ from the type in the file.
#[derive(Clone, Debug, PartialEq)]
pub enum Samples {

    /// 16-bit float samples.
    F16(Vec<f16>),

    /// 32-bit float samples.
    F32(Vec<f32>),

    /// 32-bit unsigned integer samples.
    U32(Vec<u32>),
}

/// One resolution level of a flat image.
#[derive(Clone, Debug, PartialEq)]
pub struct Level {

    /// The level index. Both components are equal in mip maps, and zero in singular images.
    pub index: Vec2<usize>,

    /// The resolution of this level in pixels.
    pub size: Vec2<usize>,

    /// One plane per channel, in the channel order of the header.
    /// Subsampled channels have fewer samples than the level has pixels.
    pub channels: Vec<Samples>,
}

/// All resolution levels of a flat image, addressable by their level index.
#[derive(Clone, Debug, PartialEq)]
pub enum Levels {

    /// A single full resolution level. Used by all scan line images.
    Singular(Level),

    /// Levels of decreasing resolution, both dimensions reduced at once.
    /// The level at `Vec2(i, i)` is stored at position `i`.
    Mip {

        /// How the level sizes were rounded.
        rounding_mode: RoundingMode,

        /// The levels, starting with the full resolution.
        levels: Vec<Level>,
    },

    /// Levels of decreasing resolution, each dimension reduced independently.
    /// The level at `Vec2(x, y)` is stored at position `y * level_count.x() + x`.
    Rip {

        /// How the level sizes were rounded.
        rounding_mode: RoundingMode,

        /// The number of levels in each dimension.
        level_count: Vec2<usize>,

        /// The levels, in increasing y order.
        levels: Vec<Level>,
    },
}

/// A flat image, containing all resolution levels of one part.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {

    /// The resolution levels.
    pub levels: Levels,
}


impl Samples {

    /// A zeroed plane of the specified type.
    pub fn new(sample_type: SampleType, count: usize) -> Self {
        match sample_type {
            SampleType::F16 => Samples::F16(vec![ f16::ZERO; count ]),
            SampleType::F32 => Samples::F32(vec![ 0.0; count ]),
            SampleType::U32 => Samples::U32(vec![ 0; count ]),
        }
    }

    /// The type of the samples in this plane.
    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::F16(_) => SampleType::F16,
            Samples::F32(_) => SampleType::F32,
            Samples::U32(_) => SampleType::U32,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Samples::F16(values) => values.len(),
            Samples::F32(values) => values.len(),
            Samples::U32(values) => values.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// The sample at the index, converted to `f32`.
    pub fn value_as_f32(&self, index: usize) -> Option<f32> {
        match self {
            Samples::F16(values) => values.get(index).map(|value| value.to_f32()),
            Samples::F32(values) => values.get(index).copied(),
            Samples::U32(values) => values.get(index).map(|&value| value as f32),
        }
    }

    /// All samples, converted to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Samples::F16(values) => {
                let mut floats = vec![ 0.0; values.len() ];
                values.convert_to_f32_slice(&mut floats);
                floats
            },

            Samples::F32(values) => values.clone(),
            Samples::U32(values) => values.iter().map(|&value| value as f32).collect(),
        }
    }

    /// Decode the line, stored with `file_type`, into this plane, beginning at `start`.
    pub(crate) fn read_line(&mut self, start: usize, line: LineRef<'_>, file_type: SampleType) -> UnitResult {
        let count = line.location.sample_count;

        match (self, file_type) {
            (Samples::F16(values), SampleType::F16) => line.read_samples_into_slice(section(values, start, count)?),
            (Samples::F32(values), SampleType::F32) => line.read_samples_into_slice(section(values, start, count)?),
            (Samples::U32(values), SampleType::U32) => line.read_samples_into_slice(section(values, start, count)?),

            (Samples::F32(values), SampleType::F16) => {
                let halfs = line.read_samples::<f16>()?;
                halfs.convert_to_f32_slice(section(values, start, count)?);
                Ok(())
            },

            (Samples::F16(values), SampleType::F32) => {
                let floats = line.read_samples::<f32>()?;
                section(values, start, count)?.convert_from_f32_slice(&floats);
                Ok(())
            },

            (samples, file_type) => Err(Error::argument(format!(
                "{:?} samples cannot be converted to {:?}", file_type, samples.sample_type()
            ))),
        }
    }

    /// Encode a section of this plane, beginning at `start`, into the line stored with `file_type`.
    pub(crate) fn write_line(&self, start: usize, line: LineRefMut<'_>, file_type: SampleType) -> UnitResult {
        let count = line.location.sample_count;

        match (self, file_type) {
            (Samples::F16(values), SampleType::F16) => line.write_samples_from_slice(section_ref(values, start, count)?),
            (Samples::F32(values), SampleType::F32) => line.write_samples_from_slice(section_ref(values, start, count)?),
            (Samples::U32(values), SampleType::U32) => line.write_samples_from_slice(section_ref(values, start, count)?),

            (Samples::F32(values), SampleType::F16) => {
                let mut halfs = vec![ f16::ZERO; count ];
                halfs.convert_from_f32_slice(section_ref(values, start, count)?);
                line.write_samples_from_slice(&halfs)
            },

            (Samples::F16(values), SampleType::F32) => {
                let mut floats = vec![ 0.0_f32; count ];
                section_ref(values, start, count)?.convert_to_f32_slice(&mut floats);
                line.write_samples_from_slice(&floats)
            },

            (samples, file_type) => Err(Error::argument(format!(
                "{:?} samples cannot be stored as {:?}", samples.sample_type(), file_type
            ))),
        }
    }
}

fn section<T>(values: &mut [T], start: usize, count: usize) -> Result<&mut [T]> {
    start.checked_add(count).and_then(move |end| values.get_mut(start .. end))
        .ok_or_else(|| Error::invalid("line outside of the level"))
}

fn section_ref<T>(values: &[T], start: usize, count: usize) -> Result<&[T]> {
    start.checked_add(count).and_then(move |end| values.get(start .. end))
        .ok_or_else(|| Error::argument("line outside of the level"))
}


impl Level {

    /// A zeroed level with one plane per channel of the header, in the requested sample types.
    pub fn allocate(header: &Header, level: LevelInfo) -> Self {
        Level {
            index: level.index,
            size: level.size,
            channels: header.channels.list.iter()
                .map(|channel| Samples::new(channel.requested_type, channel.subsampled_pixels(level.size)))
                .collect(),
        }
    }

    /// The plane of the channel with the exact name, if the header has such a channel.
    pub fn channel_by_name(&self, header: &Header, name: &str) -> Option<&Samples> {
        header.channels.find_index_of_channel(name)
            .and_then(|index| self.channels.get(index))
    }

    fn validate(&self, header: &Header, expected: LevelInfo) -> UnitResult {
        if self.index != expected.index || self.size != expected.size {
            return Err(Error::argument(format!("level {:?} not matching the header", self.index)));
        }

        if self.channels.len() != header.channels.list.len() {
            return Err(Error::argument("channel count not matching the header"));
        }

        for (samples, channel) in self.channels.iter().zip(&header.channels.list) {
            if samples.len() != channel.subsampled_pixels(self.size) {
                return Err(Error::argument(format!("sample count of channel `{}` not matching its resolution", channel.name)));
            }

            if !samples.sample_type().converts_to(channel.sample_type) {
                return Err(Error::argument(format!("samples of channel `{}` cannot be stored as {:?}", channel.name, channel.sample_type)));
            }
        }

        Ok(())
    }
}


impl Levels {

    /// Zeroed levels as described by the header.
    pub fn allocate(header: &Header) -> Self {
        let mut levels = header.levels().into_iter()
            .map(|level| Level::allocate(header, level));

        match header.blocks {
            Blocks::Tiles(tiles) if tiles.level_mode == LevelMode::MipMap => Levels::Mip {
                rounding_mode: tiles.rounding_mode,
                levels: levels.collect(),
            },

            Blocks::Tiles(tiles) if tiles.level_mode == LevelMode::RipMap => Levels::Rip {
                rounding_mode: tiles.rounding_mode,
                level_count: rip_map_level_count(tiles.rounding_mode, header.data_size()),
                levels: levels.collect(),
            },

            // every header has at least the full resolution level
            _ => Levels::Singular(levels.next().unwrap_or_else(|| Level::allocate(header, LevelInfo {
                index: Vec2(0, 0), size: header.data_size()
            }))),
        }
    }

    /// The level at the index, if present.
    pub fn get(&self, index: Vec2<usize>) -> Option<&Level> {
        let level = match self {
            Levels::Singular(level) => Some(level),
            Levels::Mip { levels, .. } => if index.x() == index.y() { levels.get(index.x()) } else { None },
            Levels::Rip { levels, level_count, .. } => if index.x() < level_count.x() {
                levels.get(index.y() * level_count.x() + index.x())
            } else { None },
        };

        level.filter(|level| level.index == index)
    }

    /// The mutable level at the index, if present.
    pub fn get_mut(&mut self, index: Vec2<usize>) -> Option<&mut Level> {
        let level = match self {
            Levels::Singular(level) => Some(level),
            Levels::Mip { levels, .. } => if index.x() == index.y() { levels.get_mut(index.x()) } else { None },
            Levels::Rip { levels, level_count, .. } => if index.x() < level_count.x() {
                levels.get_mut(index.y() * level_count.x() + index.x())
            } else { None },
        };

        level.filter(|level| level.index == index)
    }

    /// All levels, in increasing y order, beginning with the full resolution.
    pub fn as_slice(&self) -> &[Level] {
        match self {
            Levels::Singular(level) => std::slice::from_ref(level),
            Levels::Mip { levels, .. } => levels,
            Levels::Rip { levels, .. } => levels,
        }
    }

    /// The full resolution level.
    pub fn largest(&self) -> Option<&Level> {
        self.as_slice().first()
    }
}


impl Image {

    /// A single level image. The planes must be in the channel order of the header.
    pub fn from_channels(size: impl Into<Vec2<usize>>, channels: Vec<Samples>) -> Self {
        Image { levels: Levels::Singular(Level { index: Vec2(0, 0), size: size.into(), channels }) }
    }

    /// A zeroed image with all levels described by the header,
    /// using the requested sample types of the channels.
    pub fn allocate(header: &Header) -> Self {
        Image { levels: Levels::allocate(header) }
    }

    /// The full resolution level.
    pub fn largest_level(&self) -> Option<&Level> {
        self.levels.largest()
    }

    /// The resolution of the full resolution level.
    pub fn size(&self) -> Vec2<usize> {
        self.largest_level().map_or(Vec2(0, 0), |level| level.size)
    }

    /// Check whether this image can be written with the header.
    pub fn validate(&self, header: &Header) -> UnitResult {
        if header.deep {
            return Err(Error::argument("flat image for a deep header"));
        }

        let expected = header.levels();
        let levels = self.levels.as_slice();

        if levels.len() != expected.len() {
            return Err(Error::argument("level count not matching the header"));
        }

        for (level, expected) in levels.iter().zip(expected) {
            level.validate(header, expected)?;
        }

        Ok(())
    }

    /// Copy the lines of a decompressed block into the planes.
    /// The header must be the one the block was decoded with, carrying the requested sample types.
    pub(crate) fn insert_block(&mut self, header: &Header, block: UncompressedBlock) -> UnitResult {
        let level = self.levels.get_mut(block.index.level)
            .ok_or_else(|| Error::invalid("block level index"))?;

        for (byte_range, line) in crate::block::lines::LineIndex::lines_in_block(block.index, header) {
            let channel = &header.channels.list[line.channel];
            let samples = &mut level.channels[line.channel];

            let width = channel.subsampled_resolution(level.size).width();
            let start = line.position.y() * width + line.position.x();

            let bytes = block.data.get(byte_range)
                .ok_or_else(|| Error::invalid("block data too small"))?;

            samples.read_line(start, LineRef { location: line, value: bytes }, channel.sample_type)?;
        }

        Ok(())
    }

    /// Collect the lines of a block from the planes.
    pub(crate) fn extract_block(&self, header: &Header, index: crate::block::BlockIndex) -> Result<UncompressedBlock> {
        let level = self.levels.get(index.level)
            .ok_or_else(|| Error::argument("block level index"))?;

        let coordinates = index.to_coordinates(header)?;
        let bounds = header.get_block_data_window_pixel_coordinates(coordinates)?;
        let mut data = vec![ 0_u8; crate::compression::block_byte_size(&header.channels, bounds) ];

        for (byte_range, line) in crate::block::lines::LineIndex::lines_in_block(index, header) {
            let channel = &header.channels.list[line.channel];
            let samples = &level.channels[line.channel];

            let width = channel.subsampled_resolution(level.size).width();
            let start = line.position.y() * width + line.position.x();

            let bytes = data.get_mut(byte_range)
                .ok_or_else(|| Error::argument("block data too small"))?;

            samples.write_line(start, LineRefMut { location: line, value: bytes }, channel.sample_type)?;
        }

        Ok(UncompressedBlock { index, data })
    }
}


/// Either kind of block, so that parts of mixed kinds can be processed in one pass.
#[derive(Debug)]
pub(crate) enum AnyBlock {
    Flat(UncompressedBlock),
    Deep(UncompressedDeepBlock),
}

impl DecompressChunk for AnyBlock {
    fn decompress_chunk(chunk: Chunk, meta_data: &MetaData, pedantic: bool) -> Result<Self> {
        let deep = meta_data.headers.get(chunk.part_index)
            .ok_or_else(|| Error::invalid("chunk part index"))?.deep;

        Ok(
            if deep { AnyBlock::Deep(UncompressedDeepBlock::decompress_chunk(chunk, meta_data, pedantic)?) }
            else { AnyBlock::Flat(UncompressedBlock::decompress_chunk(chunk, meta_data, pedantic)?) }
        )
    }
}

impl CompressBlock for AnyBlock {
    fn compress_to_chunk(self, headers: &[Header]) -> Result<Chunk> {
        match self {
            AnyBlock::Flat(block) => block.compress_to_chunk(headers),
            AnyBlock::Deep(block) => block.compress_to_chunk(headers),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::block::lines::LineIndex;
    use crate::compression::Compression;
    use crate::meta::attribute::{ChannelDescription, LineOrder, TileDescription};
    use smallvec::smallvec;

    #[test]
    fn half_lines_widen_to_float(){
        let location = LineIndex { part: 0, channel: 0, level: Vec2(0, 0), position: Vec2(0, 0), sample_count: 2 };
        let bytes: Vec<u8> = [ f16::from_f32(0.5), f16::from_f32(-3.0) ].iter()
            .flat_map(|value| value.to_le_bytes().to_vec()).collect();

        let mut samples = Samples::new(SampleType::F32, 3);
        samples.read_line(1, LineRef { location, value: &bytes }, SampleType::F16).unwrap();
        assert_eq!(samples, Samples::F32(vec![ 0.0, 0.5, -3.0 ]));

        let mut integers = Samples::new(SampleType::U32, 2);
        assert!(integers.read_line(0, LineRef { location, value: &bytes }, SampleType::F16).is_err());
        assert!(samples.read_line(2, LineRef { location, value: &bytes }, SampleType::F16).is_err());
    }

    #[test]
    fn rip_levels_are_addressed_by_index(){
        let tiles = TileDescription {
            tile_size: Vec2(4, 4),
            level_mode: LevelMode::RipMap,
            rounding_mode: RoundingMode::Down,
        };

        let header = Header::new(Vec2(8, 2), smallvec![ ChannelDescription::named("Y", SampleType::F16) ])
            .with_encoding(Compression::Uncompressed, Blocks::Tiles(tiles), LineOrder::Increasing);

        let image = Image::allocate(&header);
        assert_eq!(image.levels.as_slice().len(), 4 * 2);

        let level = image.levels.get(Vec2(2, 1)).unwrap();
        assert_eq!(level.size, Vec2(2, 1));
        assert_eq!(level.channels[0].len(), 2);

        assert!(image.levels.get(Vec2(4, 0)).is_none());
        assert!(image.levels.get(Vec2(0, 2)).is_none());
        image.validate(&header).unwrap();
    }

    #[test]
    fn blocks_round_trip_through_planes(){
        let header = Header::new(Vec2(3, 2), smallvec![
            ChannelDescription::named("A", SampleType::F16),
            ChannelDescription::named("B", SampleType::F32),
        ]);

        let image = Image::from_channels(Vec2(3, 2), vec![
            Samples::F32(vec![ 1.0, 2.0, 3.0, 4.0, 5.0, 6.0 ]),
            Samples::F32(vec![ 0.25, 0.5, 0.75, 1.0, 1.25, 1.5 ]),
        ]);

        image.validate(&header).unwrap();

        let mut decoded_header = header.clone();
        decoded_header.channels.list[0].requested_type = SampleType::F32;

        let mut decoded = Image::allocate(&decoded_header);
        for tile in header.blocks_increasing_y_order() {
            let index = crate::block::BlockIndex::from_coordinates(0, &header, tile.location).unwrap();
            let block = image.extract_block(&header, index).unwrap();
            decoded.insert_block(&decoded_header, block).unwrap();
        }

        assert_eq!(decoded, image);
    }
}
