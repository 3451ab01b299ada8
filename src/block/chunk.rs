
//! Chunks as they are stored in a file: the part index, the position of the block,
//! and the compressed bytes. Compression happens elsewhere.

use crate::error::{Error, Result, UnitResult, i32_to_usize, u64_to_usize, usize_to_i32, usize_to_u64};
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::IntegerBounds;
use crate::meta::header::Header;
use crate::meta::{Blocks, MetaData, calculate_block_size};


/// One entry of the chunk section of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {

    /// Stored in multipart files only, zero otherwise.
    pub part_index: usize,

    /// Position and compressed bytes.
    pub block: CompressedBlock,
}

/// A block whose bytes are still compressed, in one of the layouts a part can have.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressedBlock {

    /// `scanlineimage` parts.
    ScanLine(CompressedScanLineBlock),

    /// `tiledimage` parts.
    Tile(CompressedTileBlock),

    /// `deepscanline` parts.
    DeepScanLine(CompressedDeepScanLineBlock),
}

/// Some scan lines of a flat part.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedScanLineBlock {

    /// Absolute y coordinate of the first line.
    /// Blocks start at the top of the data window, one block height apart.
    pub y_coordinate: i32,

    /// Line by line, and within a line channel by channel.
    pub compressed_pixels: Vec<u8>,
}

/// A tile of a flat part.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedTileBlock {

    /// Which tile of which level.
    pub coordinates: TileCoordinates,

    /// Line by line, and within a line channel by channel.
    pub compressed_pixels: Vec<u8>,
}

/// Tile column and row, then level column and row.
/// Sorting compares the tile index before the level index.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TileCoordinates {

    /// Counted in tiles, not pixels.
    pub tile_index: Vec2<usize>,

    /// Both components are equal for mip maps, and zero without levels.
    pub level_index: Vec2<usize>,
}

/// Some scan lines of a deep part.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedDeepScanLineBlock {

    /// Absolute y coordinate of the first line.
    pub y_coordinate: i32,

    /// The sample data is this long after decompression.
    pub decompressed_sample_data_size: usize,

    /// Compressed `i32` running totals, one per pixel, restarting at each line.
    pub compressed_sample_count_table: Vec<u8>,

    /// Line by line, channel by channel, all samples of all pixels.
    pub compressed_sample_data: Vec<u8>,
}


impl TileCoordinates {

    fn write(&self, write: &mut impl Write) -> UnitResult {
        let Vec2(x, y) = self.tile_index;
        let Vec2(level_x, level_y) = self.level_index;

        for &value in &[ x, y, level_x, level_y ] {
            usize_to_i32(value, "tile coordinates")?.write_le(write)?;
        }

        Ok(())
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        let mut values = [ 0_i32; 4 ];
        i32::read_slice_le(read, &mut values)?;
        let [ x, y, level_x, level_y ] = values;

        // a level 32 would be 2^32 pixels smaller than the full resolution
        if level_x > 31 || level_y > 31 {
            return Err(Error::invalid("level index"));
        }

        Ok(TileCoordinates {
            tile_index: Vec2(x, y).to_usize("tile index")?,
            level_index: Vec2(level_x, level_y).to_usize("level index")?,
        })
    }

    /// The pixels of this tile in a level of the size `level_size`, relative to the level origin.
    /// Tiles at the right and bottom edge are clipped.
    pub fn to_data_indices(&self, tile_size: Vec2<usize>, level_size: Vec2<usize>) -> Result<IntegerBounds> {
        let start = self.tile_index.x().checked_mul(tile_size.width())
            .zip(self.tile_index.y().checked_mul(tile_size.height()))
            .filter(|&(x, y)| x < level_size.width() && y < level_size.height());

        let (x, y) = start.ok_or_else(|| Error::invalid("tile index"))?;

        Ok(IntegerBounds {
            position: Vec2(usize_to_i32(x, "tile x")?, usize_to_i32(y, "tile y")?),
            size: Vec2(
                calculate_block_size(level_size.width(), tile_size.width(), x)?,
                calculate_block_size(level_size.height(), tile_size.height(), y)?,
            ),
        })
    }
}


/// A decompressed sample count table of a deep part is never longer than this.
pub(crate) fn deep_table_byte_size(header: &Header) -> usize {
    header.data_size().width() * header.compression.scan_lines_per_block() * i32::BYTE_SIZE
}

impl CompressedBlock {

    /// Write the block, without the part number.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        match self {
            CompressedBlock::ScanLine(block) => {
                block.y_coordinate.write_le(write)?;
                u8::write_sized_slice_le(write, &block.compressed_pixels)
            },

            CompressedBlock::Tile(block) => {
                block.coordinates.write(write)?;
                u8::write_sized_slice_le(write, &block.compressed_pixels)
            },

            CompressedBlock::DeepScanLine(block) => {
                block.y_coordinate.write_le(write)?;

                for &size in &[ block.compressed_sample_count_table.len(), block.compressed_sample_data.len(), block.decompressed_sample_data_size ] {
                    usize_to_u64(size).write_le(write)?;
                }

                u8::write_slice_le(write, &block.compressed_sample_count_table)?;
                u8::write_slice_le(write, &block.compressed_sample_data)
            },
        }
    }

    /// Read a block of the specified part. Sizes are checked against the part,
    /// but the contents are only checked when decompressing.
    pub fn read(read: &mut impl Read, header: &Header) -> Result<Self> {
        let max_bytes = header.max_block_byte_size();

        Ok(match (header.blocks, header.deep) {
            (Blocks::ScanLines, false) => CompressedBlock::ScanLine(CompressedScanLineBlock {
                y_coordinate: i32::read_le(read)?,
                compressed_pixels: u8::read_sized_vec_le(read, max_bytes, "scan line block byte size")?,
            }),

            (Blocks::Tiles(_), false) => CompressedBlock::Tile(CompressedTileBlock {
                coordinates: TileCoordinates::read(read)?,
                compressed_pixels: u8::read_sized_vec_le(read, max_bytes, "tile byte size")?,
            }),

            (Blocks::ScanLines, true) => {
                let y_coordinate = i32::read_le(read)?;

                let mut sizes = [ 0_u64; 3 ];
                u64::read_slice_le(read, &mut sizes)?;
                let [ table_size, sample_data_size, decompressed_sample_data_size ] = sizes;

                // the sample data is only limited by the bytes in the file
                let table_size = u64_to_usize(table_size, "deep table size")?;
                if table_size > deep_table_byte_size(header) {
                    return Err(Error::invalid("deep table size"));
                }

                CompressedBlock::DeepScanLine(CompressedDeepScanLineBlock {
                    y_coordinate,
                    decompressed_sample_data_size: u64_to_usize(decompressed_sample_data_size, "deep sample data size")?,
                    compressed_sample_count_table: u8::read_vec_le(read, table_size)?,
                    compressed_sample_data: u8::read_vec_le(read, u64_to_usize(sample_data_size, "deep sample data size")?)?,
                })
            },

            (Blocks::Tiles(_), true) => return Err(Error::unsupported("deep tiles")),
        })
    }
}

impl Chunk {

    /// Write the chunk. The part number is only written in files with more than one part.
    pub fn write(&self, write: &mut impl Write, part_count: usize) -> UnitResult {
        if self.part_index >= part_count {
            return Err(Error::argument("chunk part index"));
        }

        if part_count != 1 {
            usize_to_i32(self.part_index, "part index")?.write_le(write)?;
        }

        self.block.write(write)
    }

    /// Read the next chunk of the file.
    pub fn read(read: &mut impl Read, meta_data: &MetaData) -> Result<Self> {
        let part_index = if meta_data.version.multipart { i32_to_usize(i32::read_le(read)?, "chunk part number")? } else { 0 };

        let header = meta_data.headers.get(part_index)
            .ok_or_else(|| Error::invalid("chunk part number"))?;

        Ok(Chunk { part_index, block: CompressedBlock::read(read, header)? })
    }
}


#[cfg(test)]
mod test {
    use smallvec::smallvec;

    use super::*;
    use crate::compression::Compression;
    use crate::meta::attribute::{ChannelDescription, LineOrder, SampleType};

    #[test]
    fn tile_data_indices_are_clipped(){
        let tile = TileCoordinates { tile_index: Vec2(2, 1), level_index: Vec2(0, 0) };
        let bounds = tile.to_data_indices(Vec2(16, 16), Vec2(40, 20)).unwrap();
        assert_eq!(bounds, IntegerBounds::new(Vec2(32, 16), Vec2(8, 4)));

        let outside = TileCoordinates { tile_index: Vec2(3, 0), level_index: Vec2(0, 0) };
        assert!(outside.to_data_indices(Vec2(16, 16), Vec2(40, 20)).is_err());

        let overflowing = TileCoordinates { tile_index: Vec2(usize::MAX, 0), level_index: Vec2(0, 0) };
        assert!(overflowing.to_data_indices(Vec2(16, 16), Vec2(40, 20)).is_err());
    }

    #[test]
    fn huge_levels_are_rejected(){
        let mut bytes = Vec::new();
        i32::write_slice_le(&mut bytes, &[ 0, 0, 32, 0 ]).unwrap();
        assert!(TileCoordinates::read(&mut bytes.as_slice()).is_err());
    }

    fn scan_line_header(compression: Compression) -> Header {
        Header::new(Vec2(10, 40), smallvec![ ChannelDescription::named("Y", SampleType::F16) ])
            .with_encoding(compression, Blocks::ScanLines, LineOrder::Increasing)
    }

    #[test]
    fn scan_line_block_sizes_are_limited_by_the_part(){
        let header = scan_line_header(Compression::Uncompressed);
        let max = header.max_block_byte_size();

        for &(size, valid) in &[ (max, true), (max + 1, false) ] {
            let mut bytes = Vec::new();
            0_i32.write_le(&mut bytes).unwrap();
            (size as i32).write_le(&mut bytes).unwrap();
            bytes.resize(bytes.len() + size, 0);

            assert_eq!(CompressedBlock::read(&mut bytes.as_slice(), &header).is_ok(), valid, "{} bytes", size);
        }
    }

    #[test]
    fn deep_blocks_keep_their_layout(){
        let header = scan_line_header(Compression::ZIP1).with_deep(None);

        let block = CompressedBlock::DeepScanLine(CompressedDeepScanLineBlock {
            y_coordinate: 7, decompressed_sample_data_size: 12,
            compressed_sample_count_table: vec![ 4; 8 ],
            compressed_sample_data: vec![ 5; 12 ],
        });

        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 + 3 * 8 + 8 + 12);
        assert_eq!(&bytes[4 .. 12], &[ 8, 0, 0, 0, 0, 0, 0, 0 ]);

        assert_eq!(CompressedBlock::read(&mut bytes.as_slice(), &header).unwrap(), block);
    }
}
