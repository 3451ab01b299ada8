
//! The compression methods of OpenEXR, each applied to one block of pixels at a time.

mod zip;
mod rle;
mod piz;
mod pxr24;
mod b44;


use crate::meta::attribute::{IntegerBounds, SampleType, ChannelList};
use crate::error::{Result, Error, UnitResult};
use crate::io::{Data, Read, Write};


/// Bytes of a block.
pub type ByteVec = Vec<u8>;

/// Borrowed bytes of a block.
pub type Bytes<'s> = &'s [u8];

/// How the pixels of a part are compressed. The same method applies to every block of the part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {

    /// Raw little endian samples.
    Uncompressed,

    /// Lossless. Runs of equal bytes, after predicting each byte from its predecessor.
    RLE,

    /// Lossless. Deflate of the predicted bytes of a single line.
    ZIP1,

    /// Lossless. Deflate of the predicted bytes of 16 lines.
    ZIP16,

    /// Lossless. A wavelet transform of the 16-bit words of 32 lines, followed by huffman coding.
    PIZ,

    /// Rounds `f32` samples to 24 bits, then deflates 16 lines.
    /// `f16` and `u32` samples are kept exactly.
    PXR24,

    /// Packs each 4 by 4 pixel area of an `f16` channel into 14 bytes, losing precision.
    /// Other sample types are kept exactly.
    B44,

    /// Like `B44`, and packs areas of a single value into 3 bytes.
    B44A,

    /// Recognized, but not implemented. Lossy, 32 lines per block.
    DWAA(Option<f32>),

    /// Recognized, but not implemented. Lossy, 256 lines per block.
    DWAB(Option<f32>),
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA(_) => "dwaa",
            Compression::DWAB(_) => "dwab",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
        })
    }
}


/// One compression method, applied to the pixels of a single block.
///
/// The bytes of a block are laid out as in the file:
/// for each line, for each channel that has samples in that line,
/// all little-endian samples of that channel in that line.
/// The bounds are absolute coordinates, so that subsampled channels can find their rows.
pub(crate) trait BlockCompressor: Send + Sync {

    /// Compress the bytes of one block. The result may be larger than the input.
    fn compress(&self, channels: &ChannelList, uncompressed: Bytes<'_>, bounds: IntegerBounds) -> Result<ByteVec>;

    /// Reconstruct the bytes of one block. Must produce exactly `expected_byte_size` bytes.
    fn decompress(
        &self, channels: &ChannelList, compressed: Bytes<'_>, bounds: IntegerBounds,
        expected_byte_size: usize, pedantic: bool
    ) -> Result<ByteVec>;
}

/// Stores the bytes without any changes.
struct Store;

impl BlockCompressor for Store {
    fn compress(&self, _: &ChannelList, uncompressed: Bytes<'_>, _: IntegerBounds) -> Result<ByteVec> {
        Ok(uncompressed.to_vec())
    }

    fn decompress(&self, _: &ChannelList, compressed: Bytes<'_>, _: IntegerBounds, expected_byte_size: usize, _: bool) -> Result<ByteVec> {
        if compressed.len() != expected_byte_size {
            return Err(Error::compression("uncompressed block size"));
        }

        Ok(compressed.to_vec())
    }
}


/// The number of bytes a block occupies when uncompressed,
/// respecting channel subsampling. The bounds are absolute coordinates.
pub fn block_byte_size(channels: &ChannelList, bounds: IntegerBounds) -> usize {
    channels.list.iter()
        .map(|channel| channel.subsampled_block_resolution(bounds).area() * channel.sample_type.bytes_per_sample())
        .sum()
}


impl Compression {

    /// The strategy that implements this compression method.
    /// Fails for methods that are recognized but not implemented.
    pub(crate) fn compressor(self) -> Result<&'static dyn BlockCompressor> {
        use self::Compression::*;

        let compressor: &'static dyn BlockCompressor = match self {
            Uncompressed => &Store,
            RLE => &rle::Rle,
            ZIP1 | ZIP16 => &zip::Zip,
            PIZ => &piz::Piz,
            PXR24 => &pxr24::Pxr24,
            B44 => &b44::B44 { optimize_uniform_areas: false },
            B44A => &b44::B44 { optimize_uniform_areas: true },
            DWAA(_) | DWAB(_) => return Err(Error::unsupported(format!("{}", self))),
        };

        Ok(compressor)
    }

    /// Compress the image section of bytes.
    /// Falls back to the raw bytes if compression does not make the block smaller.
    /// The bounds are absolute coordinates of the block inside the data window.
    pub fn compress_image_section(self, channels: &ChannelList, uncompressed: ByteVec, bounds: IntegerBounds) -> Result<ByteVec> {
        if uncompressed.len() != block_byte_size(channels, bounds) {
            return Err(Error::argument("block byte size not matching its bounds"));
        }

        if self == Compression::Uncompressed {
            return Ok(uncompressed);
        }

        let compressed = self.compressor()?
            .compress(channels, &uncompressed, bounds)
            .map_err(|error| compression_error(self, error))?;

        // only write compressed if it actually is smaller than raw
        if compressed.len() < uncompressed.len() { Ok(compressed) }
        else { Ok(uncompressed) }
    }

    /// Decompress the image section of bytes.
    /// The bounds are absolute coordinates of the block inside the data window.
    pub fn decompress_image_section(self, channels: &ChannelList, compressed: ByteVec, bounds: IntegerBounds, pedantic: bool) -> Result<ByteVec> {
        let expected_byte_size = block_byte_size(channels, bounds);

        // note: always true where self == Uncompressed
        if compressed.len() == expected_byte_size {
            // the compressed data was larger than the raw data, so the small raw data has been written
            return Ok(compressed);
        }

        let bytes = self.compressor()?
            .decompress(channels, &compressed, bounds, expected_byte_size, pedantic)
            .map_err(|error| compression_error(self, error))?;

        if bytes.len() != expected_byte_size {
            return Err(Error::compression(format!("{} produced {} instead of {} bytes", self, bytes.len(), expected_byte_size)));
        }

        Ok(bytes)
    }

    /// Compress an unstructured byte sequence, such as a deep sample count table.
    /// Falls back to the raw bytes if compression does not make the data smaller.
    pub fn compress_bytes(self, uncompressed: ByteVec) -> Result<ByteVec> {
        use self::Compression::*;

        let compressed = match self {
            Uncompressed => return Ok(uncompressed),
            RLE => rle::compress_bytes(&uncompressed),
            ZIP1 | ZIP16 => zip::compress_bytes(&uncompressed),
            _ => return Err(Error::unsupported(format!("{} for deep data", self))),
        };

        let compressed = compressed.map_err(|error| compression_error(self, error))?;

        if compressed.len() < uncompressed.len() { Ok(compressed) }
        else { Ok(uncompressed) }
    }

    /// Decompress an unstructured byte sequence into exactly `expected_byte_size` bytes.
    pub fn decompress_bytes(self, compressed: ByteVec, expected_byte_size: usize) -> Result<ByteVec> {
        use self::Compression::*;

        if compressed.len() == expected_byte_size {
            return Ok(compressed);
        }

        let bytes = match self {
            Uncompressed => Err(Error::compression("uncompressed data size")),
            RLE => rle::decompress_bytes(&compressed, expected_byte_size),
            ZIP1 | ZIP16 => zip::decompress_bytes(&compressed, expected_byte_size),
            _ => return Err(Error::unsupported(format!("{} for deep data", self))),
        };

        let bytes = bytes.map_err(|error| compression_error(self, error))?;

        if bytes.len() != expected_byte_size {
            return Err(Error::compression(format!("{} produced {} instead of {} bytes", self, bytes.len(), expected_byte_size)));
        }

        Ok(bytes)
    }

    /// The number of lines in a scan line block.
    pub fn scan_lines_per_block(self) -> usize {
        use self::Compression::*;

        match self {
            Uncompressed | RLE | ZIP1 => 1,
            ZIP16 | PXR24 => 16,
            PIZ | B44 | B44A | DWAA(_) => 32,
            DWAB(_) => 256,
        }
    }

    /// Deep parts can only be stored raw, or with RLE or ZIP.
    pub fn supports_deep_data(self) -> bool {
        use self::Compression::*;
        matches!(self, Uncompressed | RLE | ZIP1 | ZIP16)
    }

    /// The number that identifies this method in a file.
    fn id(self) -> u8 {
        use self::Compression::*;

        match self {
            Uncompressed => 0, RLE => 1, ZIP1 => 2, ZIP16 => 3, PIZ => 4,
            PXR24 => 5, B44 => 6, B44A => 7, DWAA(_) => 8, DWAB(_) => 9,
        }
    }

    /// Write the value of a `compression` attribute.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        self.id().write_le(write)
    }

    /// Read the value of a `compression` attribute.
    /// The DWA compression level is stored in a separate attribute, so it is not known yet.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;

        let id = u8::read_le(read)?;

        [ Uncompressed, RLE, ZIP1, ZIP16, PIZ, PXR24, B44, B44A, DWAA(None), DWAB(None) ].iter()
            .copied().find(|compression| compression.id() == id)
            .ok_or_else(|| Error::attribute(format!("unknown compression method {}", id)))
    }
}

/// Failures inside a compressor are reported as `CompressionFailed`,
/// except for features that are known but not implemented.
fn compression_error(compression: Compression, error: Error) -> Error {
    match error {
        Error::Unsupported(message) => Error::unsupported(format!("{} ({})", compression, message)),
        Error::CompressionFailed(message) => Error::compression(format!("{}: {}", compression, message)),
        other => Error::compression(format!("{}: {}", compression, other)),
    }
}


/// Prepares bytes for RLE and ZIP: the even bytes are moved before the odd bytes,
/// then each byte is replaced by its difference to the previous byte, plus 128.
mod predictor {
    use super::ByteVec;

    pub fn encode(bytes: &[u8]) -> ByteVec {
        let evens = bytes.iter().step_by(2);
        let odds = bytes.iter().skip(1).step_by(2);

        let mut previous = None;

        evens.chain(odds).map(|&byte| {
            let difference = match previous {
                Some(previous) => byte.wrapping_sub(previous).wrapping_add(128),
                None => byte,
            };

            previous = Some(byte);
            difference
        }).collect()
    }

    pub fn decode(encoded: &[u8]) -> ByteVec {
        let mut restored = Vec::with_capacity(encoded.len());

        if let Some((&first, differences)) = encoded.split_first() {
            restored.push(first);

            let mut previous = first;
            for &difference in differences {
                previous = previous.wrapping_add(difference).wrapping_sub(128);
                restored.push(previous);
            }
        }

        let (evens, odds) = restored.split_at((restored.len() + 1) / 2);
        let mut bytes = Vec::with_capacity(restored.len());

        for (index, &even) in evens.iter().enumerate() {
            bytes.push(even);
            bytes.extend(odds.get(index));
        }

        bytes
    }

}
