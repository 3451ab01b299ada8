
//! The header section of a file: the magic number, the version word, the headers of all parts,
//! and the layout of the offset tables that follow them.
//! `MetaData` is the entry point.

pub mod attribute;
pub mod header;


use std::collections::HashSet;
use std::convert::TryFrom;

use bit_field::BitField;
use smallvec::SmallVec;

use crate::block::chunk::TileCoordinates;
use crate::compression::Compression;
use crate::error::*;
use crate::io::*;
use crate::math::*;
use crate::meta::attribute::*;
use crate::meta::header::Header;


/// Everything in front of the offset tables.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {

    /// File wide feature flags.
    pub version: Version,

    /// The header of each part, in the order of the part indices.
    pub headers: Headers,
}


/// The headers of all parts. Most files have a single part.
pub type Headers = SmallVec<[Header; 3]>;

/// The offset tables of all parts, in the order of the headers.
pub type OffsetTables = SmallVec<[OffsetTable; 3]>;

/// The byte position of each chunk of a part.
/// Entries are sorted by increasing y coordinate of the block,
/// regardless of the order in which the chunks appear in the file.
pub type OffsetTable = Vec<u64>;


/// The flags that follow the magic number.
/// Used to determine whether this file can be read by this library,
/// and which parsing path the remaining bytes require.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Version {

    /// The format version in the low byte of the version word.
    /// This library reads versions 1 and 2, and writes version 2.
    pub format_version: u8,

    /// The file contains a single part with tiled blocks.
    /// Never set for multipart or deep files, where each header declares its own block type.
    pub tiled: bool,

    /// Whether this file has names longer than 31 bytes.
    /// Names can never be longer than 255 bytes.
    pub long_names: bool,

    /// At least one part in this file contains deep data.
    pub deep: bool,

    /// The file contains a list of headers terminated by an empty header,
    /// and each chunk starts with the index of its part.
    pub multipart: bool,
}

// flags in the version word, above the format version byte
const TILED_BIT: usize = 9;
const LONG_NAMES_BIT: usize = 10;
const DEEP_BIT: usize = 11;
const MULTIPART_BIT: usize = 12;
const KNOWN_FLAG_BITS: u32 = 13;


/// A block of a part: which one, and how many pixels it covers.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct TileIndices {

    /// Tile and level index. Scan line blocks use column zero and level zero.
    pub location: TileCoordinates,

    /// Width and height in pixels, smaller than the tile size at the right and bottom edges.
    pub size: Vec2<usize>,
}

/// The shape of the blocks of a part.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Blocks {

    /// Full-width strips of scan lines, as high as the compression method requires.
    ScanLines,

    /// Rectangles of the specified size, possibly with several resolution levels.
    Tiles(TileDescription)
}

impl Blocks {

    /// Not scan lines.
    pub fn has_tiles(&self) -> bool {
        matches!(self, Blocks::Tiles(_))
    }
}


/// The four bytes every file starts with.
pub mod magic_number {
    use super::*;

    /// `v/1` followed by `0x01`.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Write the four bytes.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice_le(write, &BYTES)
    }

    /// Consume four bytes and compare them with the magic number.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut start = [0_u8; 4];
        u8::read_slice_le(read, &mut start)?;
        Ok(start == BYTES)
    }

    /// Fails with `Error::InvalidMagicNumber` for anything else than the magic number.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        match is_exr(read)? {
            true => Ok(()),
            false => Err(Error::InvalidMagicNumber),
        }
    }
}

/// Attribute lists, channel lists and header lists end with a zero byte.
pub mod sequence_end {
    use super::*;

    /// One byte.
    pub fn byte_size() -> usize { 1 }

    /// Write the zero byte.
    pub fn write(write: &mut impl Write) -> UnitResult {
        0_u8.write_le(write)
    }

    /// Consume the next byte only if it is the zero byte, and tell whether it was.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}

fn missing_attribute(name: &str) -> Error {
    Error::header(format!("missing or invalid {} attribute", name))
}


/// How many blocks of `block_size` cover `total_size`. The last block may be cut off.
pub fn compute_block_count(total_size: usize, block_size: usize) -> usize {
    RoundingMode::Up.divide(total_size, block_size)
}

/// Where block number `block_index` starts, and its size after cutting it off at `total_size`.
pub fn calculate_block_position_and_size(total_size: usize, block_size: usize, block_index: usize) -> Result<(usize, usize)> {
    let position = block_size.checked_mul(block_index)
        .ok_or_else(|| Error::invalid("block index"))?;

    Ok((position, calculate_block_size(total_size, block_size, position)?))
}

/// The size of the block starting at `block_position`, cut off at `total_size`.
pub fn calculate_block_size(total_size: usize, block_size: usize, block_position: usize) -> Result<usize> {
    match total_size.checked_sub(block_position) {
        Some(remaining) if remaining > 0 => Ok(remaining.min(block_size)),
        _ => Err(Error::invalid("block index")),
    }
}


/// Halving `full_res` until one pixel remains produces this many levels.
fn level_count(round: RoundingMode, full_res: usize) -> usize {
    round.log2(full_res) + 1
}

/// The size of `full_res` at level `level_index`. Never smaller than one pixel.
pub fn compute_level_size(round: RoundingMode, full_res: usize, level_index: usize) -> usize {
    let divisor = u32::try_from(level_index).ok()
        .and_then(|shift| 1_usize.checked_shl(shift));

    divisor.map_or(1, |divisor| round.divide(full_res, divisor).max(1))
}

fn level_size(round: RoundingMode, full_res: Vec2<usize>, level: Vec2<usize>) -> Vec2<usize> {
    Vec2(
        compute_level_size(round, full_res.width(), level.x()),
        compute_level_size(round, full_res.height(), level.y()),
    )
}

/// Each mip map level with its index and size, largest first.
/// The larger dimension decides how many levels there are.
pub fn mip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item=(usize, Vec2<usize>)> {
    let count = level_count(round, max_resolution.width().max(max_resolution.height()));
    (0 .. count).map(move |level| (level, level_size(round, max_resolution, Vec2(level, level))))
}

/// How many rip map levels exist along each axis.
pub fn rip_map_level_count(round: RoundingMode, max_resolution: Vec2<usize>) -> Vec2<usize> {
    max_resolution.map(|size| level_count(round, size))
}

/// Each rip map level with its indices and size.
/// All levels of one height come before the levels of the next smaller height.
pub fn rip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item=(Vec2<usize>, Vec2<usize>)> {
    let Vec2(columns, rows) = rip_map_level_count(round, max_resolution);

    (0 .. rows)
        .flat_map(move |y| (0 .. columns).map(move |x| Vec2(x, y)))
        .map(move |level| (level, level_size(round, max_resolution, level)))
}

/// The number of chunks of a part, which is also the length of its offset table.
/// Assumes a validated tile size.
pub fn compute_chunk_count(compression: Compression, data_size: Vec2<usize>, blocks: Blocks) -> usize {
    let tiles = match blocks {
        Blocks::ScanLines => return compute_block_count(data_size.height(), compression.scan_lines_per_block()),
        Blocks::Tiles(tiles) => tiles,
    };

    let tile_count = |level: Vec2<usize>| {
        compute_block_count(level.width(), tiles.tile_size.width())
            * compute_block_count(level.height(), tiles.tile_size.height())
    };

    match tiles.level_mode {
        LevelMode::Singular => tile_count(data_size),
        LevelMode::MipMap => mip_map_levels(tiles.rounding_mode, data_size).map(|(_, size)| tile_count(size)).sum(),
        LevelMode::RipMap => rip_map_levels(tiles.rounding_mode, data_size).map(|(_, size)| tile_count(size)).sum(),
    }
}



impl MetaData {

    /// Combine the headers with the version flags they require.
    pub fn new(headers: Headers) -> Self {
        MetaData { version: Version::infer(&headers), headers }
    }

    /// Decode and validate everything in front of the offset tables.
    /// Pedantic reading also rejects files that other readers might refuse.
    pub fn read_from_buffered(buffered: impl Read, pedantic: bool) -> Result<Self> {
        Self::read_validated_from_buffered_peekable(&mut PeekRead::new(buffered), None, pedantic)
    }

    pub(crate) fn read_validated_from_buffered_peekable(
        read: &mut PeekRead<impl Read>, max_pixel_bytes: Option<usize>, pedantic: bool
    ) -> Result<Self> {
        magic_number::validate_exr(read)?;
        let version = Version::read(read)?;
        let headers = Header::read_all(read, &version, pedantic)?;

        let meta_data = MetaData { version, headers };
        meta_data.validate(max_pixel_bytes, pedantic)?;

        log::debug!(
            "read exr meta data: {:?}, {} part(s), {} chunk(s)",
            meta_data.version, meta_data.headers.len(),
            meta_data.headers.iter().map(|header| header.chunk_count).sum::<usize>()
        );

        Ok(meta_data)
    }

    /// Refuses to write anything if the meta data is invalid.
    pub(crate) fn write_validating_to_buffered(&self, write: &mut impl Write, pedantic: bool) -> UnitResult {
        self.validate(None, pedantic)?;

        magic_number::write(write)?;
        self.version.write(write)?;
        Header::write_all(&self.headers, write, &self.version)
    }

    /// One table per header, as long as the chunk count of the header.
    /// Memory grows with the bytes actually present, so a truncated file cannot request huge tables.
    pub fn read_offset_tables(read: &mut PeekRead<impl Read>, headers: &Headers) -> Result<OffsetTables> {
        headers.iter()
            .map(|header| u64::read_vec_le(read, header.chunk_count))
            .collect()
    }

    /// The bytes occupied by the offset tables of these headers.
    pub fn offset_tables_byte_size(headers: &[Header]) -> usize {
        u64::BYTE_SIZE * headers.iter().map(|header| header.chunk_count).sum::<usize>()
    }

    /// Check the version flags against the headers, and each header on its own.
    /// Readers are lenient by default, writers are pedantic.
    pub fn validate(&self, max_pixel_bytes: Option<usize>, pedantic: bool) -> UnitResult {
        self.version.validate()?;

        match self.headers.len() {
            0 => return Err(Error::header("at least one part is required")),
            1 => {},
            _ if !self.version.multipart => return Err(Error::header("multiple headers require the multipart flag")),
            _ => {},
        }

        let mut long_names = false;
        for header in &self.headers {
            header.validate(&self.version, &mut long_names, pedantic)?;
        }

        if pedantic && long_names && !self.version.long_names {
            return Err(Error::header("long names require the long name flag"));
        }

        if let Some(max) = max_pixel_bytes {
            let byte_size = self.headers.iter().try_fold(0_usize, |sum, header| {
                sum.checked_add(header.total_pixel_bytes()?)
                    .ok_or_else(|| Error::invalid("image byte size exceeding integer maximum"))
            })?;

            if byte_size > max {
                return Err(Error::invalid("image larger than specified maximum"));
            }
        }

        // parts are addressed by name
        if self.version.multipart {
            let mut names = HashSet::with_capacity(self.headers.len());

            let duplicate = self.headers.iter()
                .filter_map(|header| header.name.as_ref())
                .find(|&name| !names.insert(name.bytes()));

            if let Some(name) = duplicate {
                return Err(Error::header(format!("duplicate part name: `{}`", name)));
            }
        }

        Ok(())
    }
}

impl Version {

    /// The flags a file with these headers requires.
    pub fn infer(headers: &[Header]) -> Self {
        let multipart = headers.len() > 1;
        let deep = headers.iter().any(|header| header.deep);

        let long_names = headers.iter()
            .flat_map(|header| header.attribute_names())
            .any(|name| name.bytes().len() > 31);

        let single_tiled_part = headers.first().map_or(false, |header| header.blocks.has_tiles());

        Version {
            format_version: 2,
            tiled: !multipart && !deep && single_tiled_part,
            long_names, deep, multipart,
        }
    }

    /// Check the magic number, then decode and validate the version word.
    /// Only the first eight bytes are inspected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::invalid("no bytes to read the version from"));
        }

        if bytes.len() < magic_number::BYTES.len() + u32::BYTE_SIZE {
            return Err(Error::invalid("too few bytes for magic number and version"));
        }

        let mut read = bytes;
        magic_number::validate_exr(&mut read)?;

        let version = Version::read(&mut read)?;
        version.validate()?;
        Ok(version)
    }

    /// Decode the version word without checking the flags against each other.
    /// Flags this library does not know are an error.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let word = u32::read_le(read)?;

        if word >> KNOWN_FLAG_BITS != 0 {
            return Err(Error::unsupported("unknown file feature flags"));
        }

        Ok(Version {
            format_version: word.get_bits(0 .. 8) as u8,
            tiled: word.get_bit(TILED_BIT),
            long_names: word.get_bit(LONG_NAMES_BIT),
            deep: word.get_bit(DEEP_BIT),
            multipart: word.get_bit(MULTIPART_BIT),
        })
    }

    /// Encode the version word as it is.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        let mut word = u32::from(self.format_version);
        word.set_bit(TILED_BIT, self.tiled);
        word.set_bit(LONG_NAMES_BIT, self.long_names);
        word.set_bit(DEEP_BIT, self.deep);
        word.set_bit(MULTIPART_BIT, self.multipart);
        word.write_le(write)
    }

    /// Only versions 1 and 2 exist.
    /// The tiled flag describes a single flat part, while deep and multipart files need version 2.
    pub fn validate(&self) -> UnitResult {
        if !matches!(self.format_version, 1 | 2) {
            return Err(Error::unsupported(format!("file format version {}", self.format_version)));
        }

        let single_flat_part = !self.deep && !self.multipart;
        let without_tiled_flag = !self.tiled && self.format_version == 2;

        if single_flat_part || without_tiled_flag { Ok(()) }
        else { Err(Error::header("contradicting file feature flags")) }
    }
}



#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, SampleType, LineOrder, IntegerBounds};
    use smallvec::smallvec;

    #[test]
    fn round_trip_version() {
        let version = Version {
            format_version: 2,
            tiled: false,
            long_names: true,
            deep: true,
            multipart: true
        };

        let mut data: Vec<u8> = Vec::new();
        version.write(&mut data).unwrap();
        assert_eq!(data, [2, 0b0000_0100 | 0b0000_1000 | 0b0001_0000, 0, 0].to_vec());

        let read = Version::read(&mut data.as_slice()).unwrap();
        assert_eq!(version, read);
    }

    #[test]
    fn version_parsing_errors() {
        assert!(matches!(Version::parse(&[]), Err(Error::InvalidData(_))));
        assert!(matches!(Version::parse(&[0x76, 0x2f, 0x31]), Err(Error::InvalidData(_))));
        assert!(matches!(Version::parse(&[0; 8]), Err(Error::InvalidMagicNumber)));

        // reserved flag bit 13 is set
        assert!(matches!(Version::parse(&[0x76, 0x2f, 0x31, 0x01, 2, 0b0010_0000, 0, 0]), Err(Error::Unsupported(_))));

        // version 3 does not exist
        assert!(matches!(Version::parse(&[0x76, 0x2f, 0x31, 0x01, 3, 0, 0, 0]), Err(Error::Unsupported(_))));

        // tiled and multipart cannot be combined
        assert!(matches!(Version::parse(&[0x76, 0x2f, 0x31, 0x01, 2, 0b0001_0010, 0, 0]), Err(Error::InvalidHeader(_))));

        let tiled = Version::parse(&[0x76, 0x2f, 0x31, 0x01, 2, 0b0000_0010, 0, 0, 99]).unwrap();
        assert!(tiled.tiled && !tiled.deep && !tiled.multipart && !tiled.long_names);
    }

    #[test]
    fn level_counts(){
        assert_eq!(mip_map_levels(RoundingMode::Down, Vec2(1, 1)).count(), 1);
        assert_eq!(mip_map_levels(RoundingMode::Down, Vec2(37, 9)).count(), 6);
        assert_eq!(mip_map_levels(RoundingMode::Up, Vec2(37, 9)).count(), 7);

        let smallest = mip_map_levels(RoundingMode::Down, Vec2(37, 9)).last().unwrap();
        assert_eq!(smallest, (5, Vec2(1, 1)));

        let rip = rip_map_level_count(RoundingMode::Down, Vec2(16, 4));
        assert_eq!(rip, Vec2(5, 3));

        let rip_levels: Vec<_> = rip_map_levels(RoundingMode::Down, Vec2(16, 4)).collect();
        assert_eq!(rip_levels.len(), 15);
        assert_eq!(rip_levels[1], (Vec2(1, 0), Vec2(8, 4)));
        assert_eq!(rip_levels[5], (Vec2(0, 1), Vec2(16, 2)));

        assert_eq!(compute_level_size(RoundingMode::Down, 37, 1), 18);
        assert_eq!(compute_level_size(RoundingMode::Up, 37, 1), 19);
        assert_eq!(compute_level_size(RoundingMode::Down, 37, 10), 1);
        assert_eq!(compute_level_size(RoundingMode::Down, 37, 500), 1);
    }

    #[test]
    fn blocks_are_cut_off_at_the_edge(){
        assert_eq!(compute_block_count(33, 16), 3);
        assert_eq!(calculate_block_position_and_size(33, 16, 2).unwrap(), (32, 1));
        assert!(calculate_block_position_and_size(33, 16, 3).is_err());
        assert!(calculate_block_position_and_size(33, usize::MAX, 2).is_err());
    }

    #[test]
    fn chunk_counts(){
        assert_eq!(compute_chunk_count(Compression::Uncompressed, Vec2(100, 33), Blocks::ScanLines), 33);
        assert_eq!(compute_chunk_count(Compression::ZIP16, Vec2(100, 33), Blocks::ScanLines), 3);
        assert_eq!(compute_chunk_count(Compression::PIZ, Vec2(100, 33), Blocks::ScanLines), 2);

        let tiles = TileDescription {
            tile_size: Vec2(8, 8),
            level_mode: LevelMode::MipMap,
            rounding_mode: RoundingMode::Down,
        };

        // levels 17x9, 8x4, 4x2, 2x1, 1x1
        assert_eq!(compute_chunk_count(Compression::Uncompressed, Vec2(17, 9), Blocks::Tiles(tiles)), 6 + 1 + 1 + 1 + 1);
    }

    #[test]
    fn round_trip_meta_data(){
        let channels = smallvec![ ChannelDescription::named("main", SampleType::U32) ];

        let header = Header::new(Vec2(2000, 333), channels)
            .with_name("test name".into())
            .with_position(Vec2(3, -5))
            .with_display_window(IntegerBounds::new(Vec2(2, 1), Vec2(11, 9)))
            .with_encoding(Compression::RLE, Blocks::ScanLines, LineOrder::Decreasing)
            .with_attribute("owner".into(), AttributeValue::Text("me".into()));

        let meta = MetaData::new(smallvec![ header ]);

        let mut data: Vec<u8> = Vec::new();
        meta.write_validating_to_buffered(&mut data, true).unwrap();

        let meta2 = MetaData::read_from_buffered(data.as_slice(), false).unwrap();
        meta2.validate(None, true).unwrap();
        assert_eq!(meta, meta2);
    }

    #[test]
    fn multipart_requires_unique_names(){
        let channels: SmallVec<[ChannelDescription; 5]> = smallvec![ ChannelDescription::named("Y", SampleType::F16) ];
        let first = Header::new(Vec2(4, 4), channels.clone()).with_name("a".into());
        let second = Header::new(Vec2(4, 4), channels).with_name("a".into());

        let meta = MetaData::new(smallvec![ first, second ]);
        assert!(matches!(meta.validate(None, false), Err(Error::InvalidHeader(_))));
    }
}
