//! Handle compressed and uncompressed pixel byte blocks.
//! Includes compression and decompression of single blocks.
//!
//! Start with `block::reader::FileReader::new()`
//! and `block::writer::write_chunks_with()`.

pub mod chunk;
pub mod lines;
pub mod reader;
pub mod writer;

use crate::compression::ByteVec;
use crate::math::*;
use crate::error::{Result, Error, UnitResult};
use crate::io::Data;
use crate::meta::{MetaData, Blocks};
use crate::meta::header::Header;
use crate::block::chunk::{
    Chunk, CompressedBlock, CompressedScanLineBlock, CompressedTileBlock,
    CompressedDeepScanLineBlock, TileCoordinates
};


/// Specifies where a block of pixel data should be placed in the actual image.
/// This is a globally unique identifier which
/// includes the part, level index, and pixel location.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Debug)]
pub struct BlockIndex {

    /// Index of the part.
    pub part: usize,

    /// Index of the top left pixel of the block, relative to the level origin.
    pub pixel_position: Vec2<usize>,

    /// Number of pixels in this block. Blocks at the edge of a level may be smaller.
    pub pixel_size: Vec2<usize>,

    /// Index of the mip or rip level in the image.
    pub level: Vec2<usize>,
}

/// Contains a block of flat pixel data and where that data should be placed in the actual image.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UncompressedBlock {

    /// Location of the data inside the image.
    pub index: BlockIndex,

    /// Uncompressed pixel values of the whole block.
    /// This byte vector contains all pixel rows, one after another.
    /// For each line in the block, for each channel, the row values are contiguous.
    /// Subsampled channels are absent from the rows they do not sample.
    pub data: ByteVec,
}

/// Contains a block of deep scan lines and where that data should be placed in the actual image.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UncompressedDeepBlock {

    /// Location of the data inside the image.
    pub index: BlockIndex,

    /// For each line, for each pixel, the number of samples
    /// in that pixel and all pixels to its left within the same line.
    pub sample_count_table: Vec<u32>,

    /// For each line in the block, for each channel,
    /// the samples of all pixels of that line are contiguous.
    pub sample_data: ByteVec,
}


/// A block that can be reconstructed from a chunk of the file.
pub trait DecompressChunk: Sized + Send + 'static {

    /// Decompress the possibly compressed chunk.
    fn decompress_chunk(chunk: Chunk, meta_data: &MetaData, pedantic: bool) -> Result<Self>;
}

/// A block that can be compressed into a chunk of the file.
pub trait CompressBlock: Send + 'static {

    /// Consume this block by compressing it, returning a `Chunk`.
    fn compress_to_chunk(self, headers: &[Header]) -> Result<Chunk>;
}


impl BlockIndex {

    /// The block at the specified tile coordinates.
    pub fn from_coordinates(part: usize, header: &Header, coordinates: TileCoordinates) -> Result<Self> {
        let bounds = header.get_absolute_block_pixel_coordinates(coordinates)?;

        Ok(BlockIndex {
            part,
            level: coordinates.level_index,
            pixel_position: bounds.position.to_usize("block position")?,
            pixel_size: bounds.size,
        })
    }

    /// The tile coordinates of this block.
    /// Fails if this index does not describe a block of the header exactly.
    pub fn to_coordinates(&self, header: &Header) -> Result<TileCoordinates> {
        let block_size = match header.blocks {
            Blocks::Tiles(tiles) => tiles.tile_size,
            Blocks::ScanLines => Vec2(header.data_size().width().max(1), header.compression.scan_lines_per_block()),
        };

        let coordinates = TileCoordinates {
            tile_index: Vec2(
                self.pixel_position.x() / block_size.x(),
                self.pixel_position.y() / block_size.y(),
            ),
            level_index: self.level,
        };

        if BlockIndex::from_coordinates(self.part, header, coordinates)? != *self {
            return Err(Error::argument("block index not matching the blocks of the part"));
        }

        Ok(coordinates)
    }
}

impl Chunk {

    /// The tile coordinates of the block inside this chunk.
    /// Scan line blocks store their y coordinate, which is converted to a block index.
    pub fn coordinates(&self, header: &Header) -> Result<TileCoordinates> {
        match &self.block {
            CompressedBlock::Tile(tile) => {
                header.get_absolute_block_pixel_coordinates(tile.coordinates)?;
                Ok(tile.coordinates)
            },

            CompressedBlock::ScanLine(CompressedScanLineBlock { y_coordinate, .. }) |
            CompressedBlock::DeepScanLine(CompressedDeepScanLineBlock { y_coordinate, .. }) =>
                header.get_scan_line_block_tile_coordinates(*y_coordinate),
        }
    }
}


impl DecompressChunk for UncompressedBlock {

    // for uncompressed data, the byte vector in the chunk is moved all the way
    fn decompress_chunk(chunk: Chunk, meta_data: &MetaData, pedantic: bool) -> Result<Self> {
        let header: &Header = meta_data.headers.get(chunk.part_index)
            .ok_or_else(|| Error::invalid("chunk part index"))?;

        let coordinates = chunk.coordinates(header)?;
        let index = BlockIndex::from_coordinates(chunk.part_index, header, coordinates)?;
        let bounds = header.get_block_data_window_pixel_coordinates(coordinates)?;

        let compressed = match chunk.block {
            CompressedBlock::ScanLine(CompressedScanLineBlock { compressed_pixels, .. }) |
            CompressedBlock::Tile(CompressedTileBlock { compressed_pixels, .. }) => compressed_pixels,
            CompressedBlock::DeepScanLine(_) => return Err(Error::invalid("deep block in flat part")),
        };

        Ok(UncompressedBlock {
            data: header.compression.decompress_image_section(&header.channels, compressed, bounds, pedantic)?,
            index,
        })
    }
}

impl CompressBlock for UncompressedBlock {
    fn compress_to_chunk(self, headers: &[Header]) -> Result<Chunk> {
        let UncompressedBlock { data, index } = self;

        let header: &Header = headers.get(index.part)
            .ok_or_else(|| Error::argument("block part index"))?;

        if header.deep {
            return Err(Error::argument("flat block in deep part"));
        }

        let coordinates = index.to_coordinates(header)?;
        let bounds = header.get_block_data_window_pixel_coordinates(coordinates)?;
        let compressed_pixels = header.compression.compress_image_section(&header.channels, data, bounds)?;

        Ok(Chunk {
            part_index: index.part,
            block: match header.blocks {
                Blocks::ScanLines => CompressedBlock::ScanLine(CompressedScanLineBlock {
                    y_coordinate: bounds.position.y(),
                    compressed_pixels,
                }),

                Blocks::Tiles(_) => CompressedBlock::Tile(CompressedTileBlock {
                    coordinates, compressed_pixels,
                }),
            }
        })
    }
}


impl UncompressedDeepBlock {

    /// The total number of samples in each line of this block.
    pub fn line_sample_counts(&self) -> impl '_ + Iterator<Item = usize> {
        let width = self.index.pixel_size.width();

        self.sample_count_table.chunks(width.max(1))
            .map(|line| line.last().map_or(0, |&count| count as usize))
    }

    /// The number of bytes the sample data must have, given the sample count table.
    fn expected_sample_data_size(&self, header: &Header) -> Result<usize> {
        let samples: usize = self.line_sample_counts().sum();

        samples.checked_mul(header.channels.bytes_per_pixel)
            .ok_or_else(|| Error::invalid("deep sample data size exceeding integer maximum"))
    }

    /// Fails if the table has the wrong size or is not monotonically non-decreasing in each line.
    fn validate_table(&self, header: &Header, pedantic: bool) -> UnitResult {
        let width = self.index.pixel_size.width();

        if self.sample_count_table.len() != self.index.pixel_size.area() {
            return Err(Error::invalid("deep sample count table size"));
        }

        for line in self.sample_count_table.chunks(width.max(1)) {
            let mut previous = 0;

            for &cumulative in line {
                if cumulative < previous {
                    return Err(Error::invalid("deep sample count table not increasing"));
                }

                if pedantic {
                    if let Some(max) = header.max_samples_per_pixel {
                        if (cumulative - previous) as usize > max {
                            return Err(Error::invalid("more deep samples than allowed per pixel"));
                        }
                    }
                }

                previous = cumulative;
            }
        }

        Ok(())
    }
}

impl DecompressChunk for UncompressedDeepBlock {
    fn decompress_chunk(chunk: Chunk, meta_data: &MetaData, pedantic: bool) -> Result<Self> {
        let header: &Header = meta_data.headers.get(chunk.part_index)
            .ok_or_else(|| Error::invalid("chunk part index"))?;

        let coordinates = chunk.coordinates(header)?;
        let index = BlockIndex::from_coordinates(chunk.part_index, header, coordinates)?;

        let block = match chunk.block {
            CompressedBlock::DeepScanLine(block) => block,
            _ => return Err(Error::invalid("flat block in deep part")),
        };

        let table_byte_size = index.pixel_size.area() * u32::BYTE_SIZE;
        let table_bytes = header.compression.decompress_bytes(block.compressed_sample_count_table, table_byte_size)?;

        let mut sample_count_table = Vec::with_capacity(index.pixel_size.area());
        for bytes in table_bytes.chunks_exact(u32::BYTE_SIZE) {
            let cumulative = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if cumulative < 0 { return Err(Error::invalid("negative deep sample count")); }
            sample_count_table.push(cumulative as u32);
        }

        let mut deep_block = UncompressedDeepBlock { index, sample_count_table, sample_data: Vec::new() };
        deep_block.validate_table(header, pedantic)?;

        let expected_byte_size = deep_block.expected_sample_data_size(header)?;
        if block.decompressed_sample_data_size != expected_byte_size {
            return Err(Error::invalid("deep sample data size not matching the sample count table"));
        }

        deep_block.sample_data = header.compression.decompress_bytes(block.compressed_sample_data, expected_byte_size)?;
        Ok(deep_block)
    }
}

impl CompressBlock for UncompressedDeepBlock {
    fn compress_to_chunk(self, headers: &[Header]) -> Result<Chunk> {
        let header: &Header = headers.get(self.index.part)
            .ok_or_else(|| Error::argument("block part index"))?;

        if !header.deep {
            return Err(Error::argument("deep block in flat part"));
        }

        let coordinates = self.index.to_coordinates(header)?;
        let bounds = header.get_block_data_window_pixel_coordinates(coordinates)?;

        self.validate_table(header, true)?;
        if self.sample_data.len() != self.expected_sample_data_size(header)? {
            return Err(Error::argument("deep sample data size not matching the sample count table"));
        }

        let mut table_bytes = Vec::with_capacity(self.sample_count_table.len() * u32::BYTE_SIZE);
        for &cumulative in &self.sample_count_table {
            let cumulative = crate::error::usize_to_i32(cumulative as usize, "deep sample count")?;
            table_bytes.extend_from_slice(&cumulative.to_le_bytes());
        }

        let decompressed_sample_data_size = self.sample_data.len();

        Ok(Chunk {
            part_index: self.index.part,
            block: CompressedBlock::DeepScanLine(CompressedDeepScanLineBlock {
                y_coordinate: bounds.position.y(),
                decompressed_sample_data_size,
                compressed_sample_count_table: header.compression.compress_bytes(table_bytes)?,
                compressed_sample_data: header.compression.compress_bytes(self.sample_data)?,
            }),
        })
    }
}



/// A thread pool for compressing or decompressing blocks.
/// Returns `None` where no threads can be started.
#[cfg(feature = "rayon")]
pub(crate) fn thread_pool(purpose: &'static str, worker_count: Option<usize>) -> Option<rayon_core::ThreadPool> {
    let mut builder = rayon_core::ThreadPoolBuilder::new()
        .thread_name(move |index| format!("exr {} #{}", purpose, index));

    if let Some(count) = worker_count {
        builder = builder.num_threads(count);
    }

    match builder.build() {
        Ok(pool) => {
            log::debug!("{} blocks on {} threads", purpose, pool.current_num_threads());
            Some(pool)
        },

        // for example on wasm
        Err(error) => {
            log::warn!("{} blocks on the current thread, as no threads are available: {}", purpose, error);
            None
        },
    }
}

/// Run `work` on the pool for every input, and pass each output to `finish` on the current thread,
/// in the order the jobs complete. Keeps about one job per thread queued at any time.
/// Returns at the first error. Jobs already queued then still run, but their results are dropped.
#[cfg(feature = "rayon")]
pub(crate) fn run_on_pool<I, O>(
    pool: &rayon_core::ThreadPool,
    inputs: impl Iterator<Item = Result<I>>,
    work: impl Fn(I) -> Result<O> + Send + Sync + 'static,
    mut finish: impl FnMut(O) -> UnitResult,
) -> UnitResult
    where I: Send + 'static, O: Send + 'static
{
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, mpsc};

    let work = Arc::new(work);
    let (sender, receiver) = mpsc::channel::<Result<O>>();
    let max_queued = pool.current_num_threads().max(1) + 2;

    let mut inputs = inputs.fuse();
    let mut queued = 0;

    loop {
        while queued < max_queued {
            let input = match inputs.next() {
                Some(input) => input?,
                None => break,
            };

            let sender = sender.clone();
            let work = Arc::clone(&work);

            pool.spawn_fifo(move || {
                // a panic must not abort the process or leave the receiver waiting
                let output = catch_unwind(AssertUnwindSafe(|| (*work)(input)))
                    .unwrap_or_else(|_| Err(Error::invalid("block processing panicked")));

                match sender.send(output) {
                    Ok(()) => {},
                    Err(_) => log::debug!("dropping a block, as an earlier block failed"),
                }
            });

            queued += 1;
        }

        if queued == 0 {
            return Ok(());
        }

        // every queued job sends exactly once, and `sender` is still alive
        let output = receiver.recv().map_err(|_| Error::invalid("block thread stopped"))?;
        queued -= 1;

        finish(output?)?;
    }
}
