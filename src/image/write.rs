//! Encode parts from memory into a file.

use std::io::{Seek, Write};

use crate::block::BlockIndex;
use crate::block::writer::write_chunks_with;
use crate::error::{Error, Result, UnitResult};
use crate::image::{AnyBlock, Content, DeepImage, Image, Part};
use crate::meta::Headers;
use crate::meta::header::Header;


/// Controls how a file is encoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteOptions {

    /// Compress blocks on multiple threads, where available.
    pub parallel: bool,

    /// Validate the headers strictly, ensuring that other readers can decode the file.
    pub pedantic: bool,

    /// Limit the number of threads. Uses one thread per cpu if not set.
    pub worker_count: Option<usize>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { parallel: true, pedantic: true, worker_count: None }
    }
}

impl WriteOptions {

    /// Compress all blocks on the current thread.
    pub fn non_parallel(self) -> Self { WriteOptions { parallel: false, .. self } }

    /// Use at most this number of threads.
    pub fn with_worker_count(self, worker_count: usize) -> Self {
        WriteOptions { worker_count: Some(worker_count), .. self }
    }

    /// Fails for a worker count of zero.
    pub fn validate(&self) -> UnitResult {
        if self.worker_count == Some(0) {
            return Err(Error::argument("worker count must not be zero"));
        }

        Ok(())
    }
}


/// Write all parts, in the specified order, to the byte destination.
/// The destination should be buffered.
pub fn write_parts_to_buffered<W: Write + Seek>(write: W, parts: &[Part], options: &WriteOptions) -> UnitResult {
    let parts: Vec<(&Header, ContentRef<'_>)> = parts.iter()
        .map(|part| (&part.header, match &part.content {
            Content::Flat(image) => ContentRef::Flat(image),
            Content::Deep(image) => ContentRef::Deep(image),
        }))
        .collect();

    write_contents_to_buffered(write, &parts, options)
}

/// Write a single flat part to the byte destination.
/// The destination should be buffered.
pub fn write_image_to_buffered<W: Write + Seek>(write: W, header: &Header, image: &Image, options: &WriteOptions) -> UnitResult {
    write_contents_to_buffered(write, &[ (header, ContentRef::Flat(image)) ], options)
}


#[derive(Clone, Copy, Debug)]
enum ContentRef<'i> {
    Flat(&'i Image),
    Deep(&'i DeepImage),
}

fn write_contents_to_buffered<W: Write + Seek>(write: W, parts: &[(&Header, ContentRef<'_>)], options: &WriteOptions) -> UnitResult {
    options.validate()?;

    if parts.is_empty() {
        return Err(Error::argument("at least one part is required"));
    }

    for &(header, content) in parts {
        match content {
            ContentRef::Flat(image) => image.validate(header)?,
            ContentRef::Deep(image) => image.validate(header)?,
        }
    }

    let headers: Headers = parts.iter().map(|&(header, _)| header.clone()).collect();

    write_chunks_with(write, headers, options.pedantic, |meta, chunk_writer| {
        let blocks = parts.iter().enumerate().flat_map(|(part_index, &(header, content))| {
            header.enumerate_ordered_blocks()
                .map(move |(index_in_header, tile)| (part_index, header, content, index_in_header, tile))
        });

        let blocks = blocks.map(|(part_index, header, content, index_in_header, tile)| -> Result<(usize, AnyBlock)> {
            let index = BlockIndex::from_coordinates(part_index, header, tile.location)?;

            let block = match content {
                ContentRef::Flat(image) => AnyBlock::Flat(image.extract_block(header, index)?),
                ContentRef::Deep(image) => AnyBlock::Deep(image.extract_block(header, index)?),
            };

            Ok((index_in_header, block))
        });

        if options.parallel { chunk_writer.compress_parallel(meta, options.worker_count, blocks) }
        else { chunk_writer.compress_sequential(meta, blocks) }
    })
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::image::Samples;
    use crate::math::Vec2;
    use crate::meta::attribute::{ChannelDescription, SampleType};
    use smallvec::smallvec;
    use std::io::Cursor;

    #[test]
    fn mismatching_planes_are_rejected(){
        let header = Header::new(Vec2(2, 2), smallvec![ ChannelDescription::named("Y", SampleType::F32) ]);
        let image = Image::from_channels(Vec2(2, 2), vec![ Samples::F32(vec![ 0.0; 3 ]) ]);

        let result = write_parts_to_buffered(Cursor::new(Vec::new()), &[ Part::flat(header, image) ], &WriteOptions::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn integers_are_never_converted(){
        let header = Header::new(Vec2(1, 1), smallvec![ ChannelDescription::named("id", SampleType::U32) ]);
        let image = Image::from_channels(Vec2(1, 1), vec![ Samples::F32(vec![ 7.0 ]) ]);

        let result = write_parts_to_buffered(Cursor::new(Vec::new()), &[ Part::flat(header, image) ], &WriteOptions::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
