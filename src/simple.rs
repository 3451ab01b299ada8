//! Single-call functions to decode and encode whole files in memory.
//!
//! Use these when the complete file fits into memory.
//! For more control, use the `image::read` and `image::write` modules,
//! or the block-level `block::reader` and `block::writer` modules.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use smallvec::SmallVec;

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::image::{DeepImage, Image, Level, Part, Samples, ReadOptions, WriteOptions};
use crate::image::parts::{find_part_by_name, layer_names, request_header};
use crate::image::read::{read_all_parts_from_buffered, read_part_from_buffered};
use crate::image::write::{write_image_to_buffered, write_parts_to_buffered};
use crate::math::Vec2;
use crate::meta::{Blocks, Headers, MetaData, Version, magic_number};
use crate::meta::attribute::{ChannelDescription, LineOrder, SampleType};
use crate::meta::header::Header;


/// Read the magic number and the version flags from the first eight bytes.
pub fn parse_version(bytes: &[u8]) -> Result<Version> {
    Version::parse(bytes)
}

/// Read all headers of a file. Does not decode any pixels.
pub fn parse_headers(bytes: &[u8]) -> Result<Headers> {
    Ok(MetaData::read_from_buffered(bytes, false)?.headers)
}

/// Read the header of the first part.
/// The version must be the one previously parsed from the same bytes.
pub fn parse_header(bytes: &[u8], version: &Version) -> Result<Header> {
    if parse_version(bytes)? != *version {
        return Err(Error::argument("version not matching the file"));
    }

    parse_headers(bytes)?.into_iter().next()
        .ok_or_else(|| Error::header("file without parts"))
}

/// Whether the bytes start with the magic number of exr files.
pub fn is_exr(bytes: &[u8]) -> bool {
    magic_number::is_exr(&mut &bytes[..]).unwrap_or(false)
}

/// Decode the flat part described by the header.
/// A named header selects the part with that name, an unnamed header selects the first part.
/// The channels must be those of the file, but may request different sample types.
pub fn load_image(bytes: &[u8], header: &Header) -> Result<Image> {
    load_image_from_buffered(Cursor::new(bytes), header, &ReadOptions::default())
}

/// Decode the flat part described by the header from any byte source.
pub fn load_image_from_buffered(read: impl Read + Seek, header: &Header, options: &ReadOptions) -> Result<Image> {
    let part = read_part_from_buffered(read, options, |meta| {
        let index = match &header.name {
            Some(name) => find_part_by_name(&meta.headers, &name.to_string())?.0,
            None => 0,
        };

        let file_header = meta.headers.get(index)
            .ok_or_else(|| Error::header("file without parts"))?;

        if file_header.deep {
            return Err(Error::argument("part contains deep data, use `load_deep`"));
        }

        Ok((index, request_header(file_header, header)?))
    })?;

    part.into_flat_image()
}

/// Encode a single flat part into a new file.
pub fn save_image(image: &Image, header: &Header) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    write_image_to_buffered(&mut bytes, header, image, &WriteOptions::default())?;
    Ok(bytes.into_inner())
}

/// Decode all parts of a file, flat and deep.
pub fn load_parts(bytes: &[u8], options: &ReadOptions) -> Result<Vec<Part>> {
    read_all_parts_from_buffered(Cursor::new(bytes), options)
}

/// Encode all parts into a new file, in the specified order.
/// Multiple parts require unique names.
pub fn save_parts(parts: &[Part], options: &WriteOptions) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    write_parts_to_buffered(&mut bytes, parts, options)?;
    Ok(bytes.into_inner())
}

/// Decode only the part with the specified name.
/// Returns `Error::LayerNotFound` if no part has that name.
pub fn load_part_by_name(bytes: &[u8], name: &str) -> Result<Part> {
    read_part_from_buffered(Cursor::new(bytes), &ReadOptions::default(), |meta| {
        let (index, header) = find_part_by_name(&meta.headers, name)?;
        Ok((index, header.clone()))
    })
}

/// Decode the first deep part of a file.
pub fn load_deep(bytes: &[u8]) -> Result<DeepImage> {
    let part = read_part_from_buffered(Cursor::new(bytes), &ReadOptions::default(), |meta| {
        meta.headers.iter().enumerate()
            .find(|(_, header)| header.deep)
            .map(|(index, header)| (index, header.clone()))
            .ok_or_else(|| Error::argument("file without deep parts"))
    })?;

    part.into_deep_image()
}

/// The layer names of the first part, which are the channel name prefixes before the last `.`.
pub fn list_layers(bytes: &[u8]) -> Result<Vec<String>> {
    let headers = parse_headers(bytes)?;
    let header = headers.first().ok_or_else(|| Error::header("file without parts"))?;
    Ok(layer_names(header))
}


/// Interleaved red, green, blue and alpha values.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbaImage {

    /// Number of pixels in each row.
    pub width: usize,

    /// Number of rows.
    pub height: usize,

    /// Four values per pixel, row by row.
    pub pixels: Vec<f32>,
}

/// Decode the first part of a file as rgba pixels.
pub fn load_rgba(path: impl AsRef<Path>) -> Result<RgbaImage> {
    let file = BufReader::new(File::open(path)?);
    load_rgba_from_buffered(file, None)
}

/// Decode the first part of a file in memory as rgba pixels.
pub fn load_rgba_from_memory(bytes: &[u8]) -> Result<RgbaImage> {
    load_rgba_from_buffered(Cursor::new(bytes), None)
}

/// Decode the channels `{layer}.R`, `{layer}.G`, `{layer}.B` and `{layer}.A` of the first part.
/// Returns `Error::LayerNotFound` if the first part has no channel in that layer.
pub fn load_rgba_layer(bytes: &[u8], layer: &str) -> Result<RgbaImage> {
    load_rgba_from_buffered(Cursor::new(bytes), Some(layer))
}

fn load_rgba_from_buffered(read: impl Read + Seek, layer: Option<&str>) -> Result<RgbaImage> {
    let part = read_part_from_buffered(read, &ReadOptions::default(), |meta| {
        let mut header = meta.headers.first()
            .ok_or_else(|| Error::header("file without parts"))?.clone();

        if header.deep {
            return Err(Error::argument("part contains deep data, use `load_deep`"));
        }

        for channel in &mut header.channels.list {
            if channel.sample_type == SampleType::F16 {
                channel.requested_type = SampleType::F32;
            }
        }

        Ok((0, header))
    })?;

    let level = part.flat_image()?.largest_level()
        .ok_or_else(|| Error::invalid("image without levels"))?;

    let prefix = layer.map_or(String::new(), |layer| format!("{}.", layer));
    let channel = |name: &str| part.header.channels.find_index_of_channel(&format!("{}{}", prefix, name));

    let layer_channels: Vec<usize> = part.header.channels.list.iter().enumerate()
        .filter(|(_, channel)| {
            let name = channel.name.to_string();
            name.starts_with(&prefix) && !name[prefix.len() ..].contains('.')
        })
        .map(|(index, _)| index)
        .collect();

    let [red, green, blue, alpha] = match (channel("R"), channel("G"), channel("B"), layer_channels.as_slice()) {
        (Some(red), Some(green), Some(blue), _) => [ Some(red), Some(green), Some(blue), channel("A") ],
        (_, _, _, &[ single ]) => [ Some(single); 4 ],
        (_, _, _, &[]) if layer.is_some() => return Err(Error::LayerNotFound(layer.unwrap_or_default().to_string())),
        _ => return Err(Error::unsupported("channels other than `R`, `G`, `B` and `A`, or a single channel")),
    };

    let size = level.size;
    let mut pixels = Vec::with_capacity(size.area() * 4);

    for y in 0 .. size.height() {
        for x in 0 .. size.width() {
            for (channel, default) in [ (red, 0.0), (green, 0.0), (blue, 0.0), (alpha, 1.0) ] {
                let value = match channel {
                    Some(index) => sample_at(&part.header, level, index, Vec2(x, y))?,
                    None => default,
                };

                pixels.push(value);
            }
        }
    }

    Ok(RgbaImage { width: size.width(), height: size.height(), pixels })
}

/// The sample of the channel that covers the pixel, respecting subsampling.
fn sample_at(header: &Header, level: &Level, channel_index: usize, pixel: Vec2<usize>) -> Result<f32> {
    let channel = &header.channels.list[channel_index];
    let width = channel.subsampled_resolution(level.size).width();
    let index = (pixel.y() / channel.sampling.y()) * width + pixel.x() / channel.sampling.x();

    level.channels.get(channel_index)
        .and_then(|samples| samples.value_as_f32(index))
        .ok_or_else(|| Error::invalid("sample outside of the channel"))
}


/// Encode interleaved pixels with 1, 3 or 4 components into a new scan line file.
/// A single component is stored as channel `Y`, otherwise as `R`, `G`, `B` and optionally `A`.
/// Uses zip compression, except for images smaller than 16 pixels in both dimensions.
pub fn save_rgba(pixels: &[f32], width: usize, height: usize, components: usize, as_half: bool) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(Error::argument("image size must not be zero"));
    }

    let names: &[&str] = match components {
        1 => &[ "Y" ],
        3 => &[ "R", "G", "B" ],
        4 => &[ "R", "G", "B", "A" ],
        _ => return Err(Error::argument("component count must be 1, 3 or 4")),
    };

    let pixel_count = width.checked_mul(height)
        .ok_or_else(|| Error::argument("image size too large"))?;

    if pixels.len() != pixel_count.saturating_mul(components) {
        return Err(Error::argument("pixel count not matching the image size"));
    }

    // channels are stored in alphabetical order
    let mut order: Vec<usize> = (0 .. components).collect();
    order.sort_by_key(|&component| names[component]);

    let sample_type = if as_half { SampleType::F16 } else { SampleType::F32 };
    let channels: SmallVec<[ChannelDescription; 5]> = order.iter()
        .map(|&component| ChannelDescription::named(names[component], sample_type))
        .collect();

    let planes: Vec<Samples> = order.iter()
        .map(|&component| Samples::F32(pixels.iter().skip(component).step_by(components).copied().collect()))
        .collect();

    let compression = if width < 16 && height < 16 { Compression::Uncompressed } else { Compression::ZIP16 };

    let header = Header::new(Vec2(width, height), channels)
        .with_encoding(compression, Blocks::ScanLines, LineOrder::Increasing);

    save_image(&Image::from_channels(Vec2(width, height), planes), &header)
}
