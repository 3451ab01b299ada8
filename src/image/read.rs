//! Decode the parts of a file into memory.

use std::io::{Read, Seek};

use crate::block::reader::{ChunkReader, FileReader};
use crate::error::{Error, Result, UnitResult};
use crate::image::{AnyBlock, Content, Part};
use crate::meta::MetaData;
use crate::meta::header::Header;


/// Controls how a file is decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadOptions {

    /// Reject files that violate the format in ways that could be tolerated,
    /// such as duplicate part names, unknown attribute values, or trailing bytes.
    pub pedantic: bool,

    /// Decompress blocks on multiple threads, where available.
    pub parallel: bool,

    /// Reject images that would occupy more bytes than this once decoded.
    pub max_pixel_bytes: Option<usize>,

    /// Limit the number of threads. Uses one thread per cpu if not set.
    pub worker_count: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            pedantic: false,
            parallel: true,
            max_pixel_bytes: None,
            worker_count: None,
        }
    }
}

impl ReadOptions {

    /// Reject any file that is not strictly valid.
    pub fn pedantic(self) -> Self { ReadOptions { pedantic: true, .. self } }

    /// Decode all blocks on the current thread.
    pub fn non_parallel(self) -> Self { ReadOptions { parallel: false, .. self } }

    /// Reject images larger than this number of decoded bytes.
    pub fn with_max_pixel_bytes(self, max_pixel_bytes: usize) -> Self {
        ReadOptions { max_pixel_bytes: Some(max_pixel_bytes), .. self }
    }

    /// Use at most this number of threads.
    pub fn with_worker_count(self, worker_count: usize) -> Self {
        ReadOptions { worker_count: Some(worker_count), .. self }
    }

    /// Fails for a worker count of zero.
    pub fn validate(&self) -> UnitResult {
        if self.worker_count == Some(0) {
            return Err(Error::argument("worker count must not be zero"));
        }

        Ok(())
    }
}


/// Decode the parts chosen by `select`.
/// For each part in the file, `select` returns the header to decode that part with,
/// or `None` to skip that part. The returned headers carry the requested sample types.
/// Returns one entry per part in the file, in file order.
pub fn read_parts_from_buffered<R: Read + Seek>(
    read: R, options: &ReadOptions,
    select: impl FnOnce(&MetaData) -> Result<Vec<Option<Header>>>
) -> Result<Vec<Option<Part>>>
{
    options.validate()?;

    let file = FileReader::new(read, options.max_pixel_bytes, options.pedantic)?;
    let requested = select(file.meta_data())?;

    if requested.len() != file.meta_data().headers.len() {
        return Err(Error::argument("one entry per part is required"));
    }

    log::debug!(
        "decoding {} of {} parts", requested.iter().filter(|part| part.is_some()).count(),
        requested.len()
    );

    let mut parts: Vec<Option<Part>> = requested.into_iter()
        .map(|header| header.map(Part::allocate))
        .collect();

    let selected: Vec<bool> = parts.iter().map(Option::is_some).collect();
    let chunks = file.chunks(options.pedantic, |block| selected[block.part])?;
    decode_chunks(chunks, options, &mut parts)?;

    Ok(parts)
}

/// Decode all parts of a file.
pub fn read_all_parts_from_buffered<R: Read + Seek>(read: R, options: &ReadOptions) -> Result<Vec<Part>> {
    let parts = read_parts_from_buffered(read, options, |meta| {
        Ok(meta.headers.iter().cloned().map(Some).collect())
    })?;

    Ok(parts.into_iter().flatten().collect())
}

/// Decode a single part of a file.
pub fn read_part_from_buffered<R: Read + Seek>(
    read: R, options: &ReadOptions,
    select: impl FnOnce(&MetaData) -> Result<(usize, Header)>
) -> Result<Part>
{
    let parts = read_parts_from_buffered(read, options, |meta| {
        let (index, header) = select(meta)?;
        let mut requested = vec![ None; meta.headers.len() ];

        *requested.get_mut(index).ok_or_else(|| Error::argument("part index"))? = Some(header);
        Ok(requested)
    })?;

    parts.into_iter().flatten().next()
        .ok_or_else(|| Error::argument("no part selected"))
}


fn decode_chunks<R: Read + Seek>(chunks: ChunkReader<R>, options: &ReadOptions, parts: &mut [Option<Part>]) -> UnitResult {
    let insert = |block: AnyBlock| -> UnitResult {
        let part_index = match &block {
            AnyBlock::Flat(block) => block.index.part,
            AnyBlock::Deep(block) => block.index.part,
        };

        let part = parts.get_mut(part_index).and_then(Option::as_mut)
            .ok_or_else(|| Error::invalid("block of a skipped part"))?;

        match (&mut part.content, block) {
            (Content::Flat(image), AnyBlock::Flat(block)) => image.insert_block(&part.header, block),
            (Content::Deep(image), AnyBlock::Deep(block)) => image.insert_block(&part.header, block),
            _ => Err(Error::invalid("block kind not matching the part")),
        }
    };

    if options.parallel { chunks.decompress_parallel(options.pedantic, options.worker_count, insert) }
    else { chunks.decompress_sequential(options.pedantic, insert) }
}
