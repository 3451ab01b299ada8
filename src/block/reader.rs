//! Read the offset tables and chunks of a file, and decompress the chunks into blocks.

use std::convert::TryFrom;
use std::io::{Read, Seek};

use crate::block::{BlockIndex, DecompressChunk};
use crate::block::chunk::Chunk;
use crate::error::{Error, Result, UnitResult, u64_to_usize};
use crate::io::{PeekRead, Tracking};
use crate::meta::{MetaData, OffsetTables};

#[cfg(feature = "rayon")]
use crate::compression::Compression;

/// No supported compression method shrinks a block by a larger factor.
/// Images that claim to be larger than this, relative to the file size, are rejected
/// before any pixel memory is allocated.
const MAX_COMPRESSION_RATIO: usize = 4096;


/// A file with decoded meta data, positioned in front of its offset tables.
#[derive(Debug)]
pub struct FileReader<R> {
    meta_data: MetaData,
    file_size: usize,
    bytes: PeekRead<Tracking<R>>,
}

impl<R: Read + Seek> FileReader<R> {

    /// Decode and validate the meta data.
    /// The decoded size of all parts is limited by `max_pixel_bytes`,
    /// and by a limit derived from the size of the file.
    pub fn new(read: R, max_pixel_bytes: Option<usize>, pedantic: bool) -> Result<Self> {
        let mut bytes = PeekRead::new(Tracking::new(read));
        let file_size = bytes.stream_len()?;

        let plausible = file_size.saturating_mul(MAX_COMPRESSION_RATIO).max(1 << 20);
        let limit = max_pixel_bytes.map_or(plausible, |max| max.min(plausible));

        let meta_data = MetaData::read_validated_from_buffered_peekable(&mut bytes, Some(limit), pedantic)?;
        Ok(FileReader { meta_data, file_size, bytes })
    }

    /// The headers of all parts.
    pub fn meta_data(&self) -> &MetaData { &self.meta_data }

    /// Stop reading after the meta data.
    pub fn into_meta_data(self) -> MetaData { self.meta_data }

    /// Read the offset tables and prepare to read the chunks of all blocks accepted by `select`.
    /// The chunks are visited in the order of their position in the file.
    pub fn chunks(mut self, pedantic: bool, mut select: impl FnMut(BlockIndex) -> bool) -> Result<ChunkReader<R>> {
        let tables = MetaData::read_offset_tables(&mut self.bytes, &self.meta_data.headers)?;
        check_offsets(&tables, self.bytes.byte_position(), self.file_size, pedantic)?;

        let mut planned = Vec::new();
        let mut skipped = 0;

        for (part, (header, table)) in self.meta_data.headers.iter().zip(&tables).enumerate() {
            if table.len() != header.chunk_count {
                return Err(Error::offset("offset table length not matching the chunk count"));
            }

            // tables list the blocks of a part in increasing y order
            for (chunk_index, (tile, &offset)) in header.blocks_increasing_y_order().zip(table).enumerate() {
                if select(BlockIndex::from_coordinates(part, header, tile.location)?) {
                    planned.push(PlannedChunk { offset, part, chunk_index });
                }
                else {
                    skipped += 1;
                }
            }
        }

        planned.sort_unstable_by_key(|chunk| chunk.offset);
        log::debug!("reading {} chunks, skipping {}", planned.len(), skipped);

        Ok(ChunkReader {
            meta_data: self.meta_data,
            bytes: self.bytes,
            chunk_count: planned.len(),
            planned: planned.into_iter(),
            check_file_end: pedantic && skipped == 0,
        })
    }
}


/// Every chunk must start behind the offset tables and before the end of the file.
/// Strict reading also rejects two table entries pointing to the same chunk.
fn check_offsets(tables: &OffsetTables, first_chunk_byte: usize, file_size: usize, pedantic: bool) -> UnitResult {
    let mut offsets: Vec<u64> = tables.iter().flatten().copied().collect();

    if let Some(&outside) = offsets.iter().find(|&&offset| {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        offset < first_chunk_byte || offset >= file_size
    }) {
        return Err(Error::offset(format!("chunk offset {} outside of the file", outside)));
    }

    if pedantic {
        offsets.sort_unstable();

        if offsets.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(Error::offset("duplicate chunk offset"));
        }
    }

    Ok(())
}


/// Where a chunk should be, and which block it should contain.
#[derive(Debug, Clone, Copy)]
struct PlannedChunk {
    offset: u64,
    part: usize,
    chunk_index: usize,
}

/// Reads compressed chunks, each from the position its offset table entry names.
/// A chunk containing another block than the table entry expects is invalid,
/// so no block is returned twice and none is left out.
#[derive(Debug)]
pub struct ChunkReader<R> {
    meta_data: MetaData,
    bytes: PeekRead<Tracking<R>>,
    planned: std::vec::IntoIter<PlannedChunk>,
    chunk_count: usize,
    check_file_end: bool,
}

impl<R: Read + Seek> ChunkReader<R> {

    /// The headers of all parts.
    pub fn meta_data(&self) -> &MetaData { &self.meta_data }

    /// The number of chunks this reader returns in total.
    pub fn chunk_count(&self) -> usize { self.chunk_count }

    fn read_planned(&mut self, planned: PlannedChunk) -> Result<Chunk> {
        self.bytes.skip_to(u64_to_usize(planned.offset, "chunk offset")?)?;

        let chunk = Chunk::read(&mut self.bytes, &self.meta_data)?;
        let header = &self.meta_data.headers[chunk.part_index]; // checked by `Chunk::read`
        let chunk_index = header.chunk_index_of(chunk.coordinates(header)?)?;

        if chunk.part_index != planned.part || chunk_index != planned.chunk_index {
            return Err(Error::invalid("offset table entry pointing to another chunk"));
        }

        Ok(chunk)
    }

    /// Decompress all chunks on the current thread, passing each block to `insert`.
    pub fn decompress_sequential<B: DecompressChunk>(mut self, pedantic: bool, mut insert: impl FnMut(B) -> UnitResult) -> UnitResult {
        while let Some(chunk) = self.next() {
            let block = B::decompress_chunk(chunk?, &self.meta_data, pedantic)?;
            insert(block)?;
        }

        Ok(())
    }

    /// Decompress all chunks on a thread pool, passing each block to `insert` on the current thread.
    /// The blocks arrive in no particular order.
    /// Uncompressed files and files with a single chunk are read on the current thread.
    #[cfg(feature = "rayon")]
    pub fn decompress_parallel<B: DecompressChunk>(
        mut self, pedantic: bool, worker_count: Option<usize>,
        insert: impl FnMut(B) -> UnitResult
    ) -> UnitResult
    {
        let compressed = self.meta_data.headers.iter()
            .any(|header| header.compression != Compression::Uncompressed);

        let pool = if compressed && self.chunk_count > 1 { super::thread_pool("decompressing", worker_count) } else { None };
        let pool = match pool {
            Some(pool) => pool,
            None => return self.decompress_sequential(pedantic, insert),
        };

        let meta_data = std::sync::Arc::new(self.meta_data.clone());
        let decompress = move |chunk: Chunk| B::decompress_chunk(chunk, &meta_data, pedantic);

        super::run_on_pool(&pool, &mut self, decompress, insert)
    }

    /// Without threads, this decompresses on the current thread.
    #[cfg(not(feature = "rayon"))]
    pub fn decompress_parallel<B: DecompressChunk>(
        self, pedantic: bool, _worker_count: Option<usize>,
        insert: impl FnMut(B) -> UnitResult
    ) -> UnitResult
    {
        self.decompress_sequential(pedantic, insert)
    }
}

impl<R: Read + Seek> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Result<Chunk>> {
        if let Some(planned) = self.planned.next() {
            return Some(self.read_planned(planned));
        }

        // the last chunk of a complete file ends the file
        if std::mem::take(&mut self.check_file_end) && matches!(self.bytes.peek_u8(), Ok(Some(_))) {
            return Some(Err(Error::invalid("end of file expected")));
        }

        None
    }
}
