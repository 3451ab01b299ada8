//! Write the meta data, the offset tables and the chunks of a file.
//! Start with `write_chunks_with()`.

use std::io::{Seek, Write};

use crate::block::CompressBlock;
use crate::block::chunk::Chunk;
use crate::error::{Error, Result, UnitResult, usize_to_u64};
use crate::io::{Data, Tracking};
use crate::meta::{Headers, MetaData};

#[cfg(feature = "rayon")]
use std::collections::BTreeMap;

#[cfg(feature = "rayon")]
use crate::{compression::Compression, meta::attribute::LineOrder};


/// Write the meta data, then let `write_chunks` write every chunk of every part,
/// then fill in the offset tables and flush.
/// The destination should be buffered.
pub fn write_chunks_with<W: Write + Seek>(
    write: W, headers: Headers, pedantic: bool,
    write_chunks: impl FnOnce(&MetaData, &mut ChunkWriter<W>) -> UnitResult
) -> UnitResult
{
    let (meta_data, mut writer) = ChunkWriter::start(write, headers, pedantic)?;
    write_chunks(&meta_data, &mut writer)?;
    writer.finish()
}


/// Writes chunks one after another, remembering where each chunk starts.
#[derive(Debug)]
#[must_use]
pub struct ChunkWriter<W> {
    bytes: Tracking<W>,
    part_count: usize,
    tables_start: usize,

    /// For each part, the positions of the chunks in increasing y order.
    offsets: Vec<Vec<Option<u64>>>,
}

impl<W: Write + Seek> ChunkWriter<W> {

    fn start(write: W, headers: Headers, pedantic: bool) -> Result<(MetaData, Self)> {
        let mut bytes = Tracking::new(write);

        let meta_data = MetaData::new(headers);
        meta_data.write_validating_to_buffered(&mut bytes, pedantic)?;

        // zeroes until all chunks are written
        let tables_start = bytes.byte_position();
        bytes.seek_write_to(tables_start + MetaData::offset_tables_byte_size(&meta_data.headers))?;

        let offsets: Vec<Vec<Option<u64>>> = meta_data.headers.iter()
            .map(|header| vec![ None; header.chunk_count ])
            .collect();

        log::debug!(
            "writing {} chunks in {} parts",
            offsets.iter().map(Vec::len).sum::<usize>(), offsets.len()
        );

        let writer = ChunkWriter { bytes, part_count: meta_data.headers.len(), tables_start, offsets };
        Ok((meta_data, writer))
    }

    /// Append a chunk to the file. `index` is the position of its block
    /// in the increasing y order of its part. Every chunk must be written exactly once.
    pub fn write_chunk(&mut self, index: usize, chunk: Chunk) -> UnitResult {
        let offset = self.offsets.get_mut(chunk.part_index)
            .and_then(|table| table.get_mut(index))
            .ok_or_else(|| Error::argument("chunk index outside of the offset table"))?;

        if offset.is_some() {
            return Err(Error::argument(format!("chunk {} of part {} written twice", index, chunk.part_index)));
        }

        *offset = Some(usize_to_u64(self.bytes.byte_position()));
        chunk.write(&mut self.bytes, self.part_count)?;
        Ok(())
    }

    fn finish(mut self) -> UnitResult {
        let offsets: Vec<u64> = self.offsets.iter().flatten()
            .map(|offset| offset.ok_or_else(|| Error::argument("some chunks were not written")))
            .collect::<Result<_>>()?;

        self.bytes.seek_write_to(self.tables_start)?;
        u64::write_slice_le(&mut self.bytes, &offsets)?;

        // delayed io errors surface here
        self.bytes.flush()?;
        Ok(())
    }

    /// Compress each block on the current thread and write it immediately.
    /// Each block comes with its index in the increasing y order of its part.
    pub fn compress_sequential<B: CompressBlock>(
        &mut self, meta_data: &MetaData,
        blocks: impl Iterator<Item = Result<(usize, B)>>
    ) -> UnitResult
    {
        for block in blocks {
            let (index, block) = block?;
            let chunk = block.compress_to_chunk(&meta_data.headers)?;
            self.write_chunk(index, chunk)?;
        }

        Ok(())
    }

    /// Compress the blocks on a thread pool.
    /// The chunks are written in the order the blocks arrive,
    /// unless every part has an unspecified line order.
    #[cfg(feature = "rayon")]
    pub fn compress_parallel<B: CompressBlock>(
        &mut self, meta_data: &MetaData, worker_count: Option<usize>,
        blocks: impl Iterator<Item = Result<(usize, B)>>
    ) -> UnitResult
    {
        let compressed = meta_data.headers.iter()
            .any(|header| header.compression != Compression::Uncompressed);

        let pool = if compressed { super::thread_pool("compressing", worker_count) } else { None };
        let pool = match pool {
            Some(pool) => pool,
            None => return self.compress_sequential(meta_data, blocks),
        };

        let keep_order = meta_data.headers.iter()
            .any(|header| header.line_order != LineOrder::Unspecified);

        let mut in_order = InOrder::new(keep_order);

        let numbered = blocks.enumerate()
            .map(|(number, block)| block.map(|(index, block)| (number, index, block)));

        let headers = std::sync::Arc::new(meta_data.headers.clone());
        let compress = move |(number, index, block): (usize, usize, B)| {
            block.compress_to_chunk(&headers).map(|chunk| (number, index, chunk))
        };

        super::run_on_pool(&pool, numbered, compress, |(number, index, chunk)| {
            in_order.push(number, (index, chunk), |(index, chunk)| self.write_chunk(index, chunk))
        })
    }

    /// Without threads, this compresses on the current thread.
    #[cfg(not(feature = "rayon"))]
    pub fn compress_parallel<B: CompressBlock>(
        &mut self, meta_data: &MetaData, _worker_count: Option<usize>,
        blocks: impl Iterator<Item = Result<(usize, B)>>
    ) -> UnitResult
    {
        self.compress_sequential(meta_data, blocks)
    }
}


/// Passes items on in the order of their numbers, holding back items that arrive early.
/// Numbers start at zero and must not repeat.
#[cfg(feature = "rayon")]
#[derive(Debug)]
struct InOrder<T> {
    enabled: bool,
    next_number: usize,
    early: BTreeMap<usize, T>,
}

#[cfg(feature = "rayon")]
impl<T> InOrder<T> {
    fn new(enabled: bool) -> Self {
        InOrder { enabled, next_number: 0, early: BTreeMap::new() }
    }

    fn push(&mut self, number: usize, item: T, mut emit: impl FnMut(T) -> UnitResult) -> UnitResult {
        if !self.enabled {
            return emit(item);
        }

        self.early.insert(number, item);

        while let Some(item) = self.early.remove(&self.next_number) {
            self.next_number += 1;
            emit(item)?;
        }

        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::block::chunk::{CompressedBlock, CompressedScanLineBlock};
    use crate::compression::Compression;
    use crate::math::Vec2;
    use crate::meta::Blocks;
    use crate::meta::attribute::{ChannelDescription, LineOrder, SampleType};
    use crate::meta::header::Header;
    use smallvec::smallvec;
    use std::io::Cursor;

    fn scan_line_chunk(y: i32) -> Chunk {
        Chunk {
            part_index: 0,
            block: CompressedBlock::ScanLine(CompressedScanLineBlock {
                y_coordinate: y,
                compressed_pixels: vec![ 0; 8 ],
            })
        }
    }

    fn header() -> Header {
        Header::new(Vec2(2, 3), smallvec![ ChannelDescription::named("Y", SampleType::F32) ])
            .with_encoding(Compression::Uncompressed, Blocks::ScanLines, LineOrder::Increasing)
    }

    #[test]
    fn chunks_must_be_written_exactly_once(){
        let result = write_chunks_with(Cursor::new(Vec::new()), smallvec![ header() ], true, |_, writer| {
            writer.write_chunk(0, scan_line_chunk(0))?;
            writer.write_chunk(0, scan_line_chunk(0))
        });

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn missing_chunks_are_rejected(){
        let result = write_chunks_with(Cursor::new(Vec::new()), smallvec![ header() ], true, |_, writer| {
            writer.write_chunk(0, scan_line_chunk(0))
        });

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn chunks_outside_of_the_table_are_rejected(){
        let result = write_chunks_with(Cursor::new(Vec::new()), smallvec![ header() ], true, |_, writer| {
            writer.write_chunk(3, scan_line_chunk(3))
        });

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn offset_tables_point_to_chunks(){
        let mut bytes = Cursor::new(Vec::new());

        write_chunks_with(&mut bytes, smallvec![ header() ], true, |_, writer| {
            writer.write_chunk(2, scan_line_chunk(2))?;
            writer.write_chunk(0, scan_line_chunk(0))?;
            writer.write_chunk(1, scan_line_chunk(1))
        }).unwrap();

        let bytes = bytes.into_inner();
        let chunk_bytes = 4 + 4 + 8;
        let chunks_start = bytes.len() - 3 * chunk_bytes;
        let table_start = chunks_start - 3 * 8;

        let mut table = &bytes[table_start .. chunks_start];
        let offsets: Vec<u64> = (0..3).map(|_| u64::read_le(&mut table).unwrap()).collect();

        assert_eq!(offsets, vec![
            (chunks_start + chunk_bytes) as u64,
            (chunks_start + 2 * chunk_bytes) as u64,
            chunks_start as u64,
        ]);
    }

    #[test]
    #[cfg(feature = "rayon")]
    fn early_chunks_wait_for_their_predecessors(){
        let mut written = Vec::new();
        let mut in_order = InOrder::new(true);

        in_order.push(2, 'c', |item| { written.push(item); Ok(()) }).unwrap();
        in_order.push(1, 'b', |item| { written.push(item); Ok(()) }).unwrap();
        assert!(written.is_empty());

        in_order.push(0, 'a', |item| { written.push(item); Ok(()) }).unwrap();
        in_order.push(3, 'd', |item| { written.push(item); Ok(()) }).unwrap();
        assert_eq!(written, vec![ 'a', 'b', 'c', 'd' ]);
    }

    #[test]
    #[cfg(feature = "rayon")]
    fn unordered_chunks_are_written_on_arrival(){
        let mut written = Vec::new();
        let mut in_order = InOrder::new(false);

        for &number in &[ 2, 0, 1 ] {
            in_order.push(number, number, |item| { written.push(item); Ok(()) }).unwrap();
        }

        assert_eq!(written, vec![ 2, 0, 1 ]);
    }
}
