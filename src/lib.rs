//! Read and write OpenEXR images.
//! This library uses no foreign code or unsafe Rust.
//!
//! Supports scan line and tiled images, mip maps and rip maps,
//! multiple parts per file, deep scan line data, channel subsampling,
//! and all lossless compression methods as well as `PXR24`, `B44` and `B44A`.
//!
//! Start with the functions in the `simple` module, such as `simple::load_rgba`,
//! or use `image::read` and `image::write` for control over threads and validation.
//! The `block` module allows processing single chunks of pixels.

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    missing_debug_implementations,
    missing_docs,
)]


pub mod io; // public to allow for custom attribute byte parsing

pub mod math;
pub mod compression;
pub mod meta;
pub mod block;
pub mod image;
pub mod error;
pub mod simple;


/// Export the most important items from `exr_codec`.
/// _Note: This includes a type called `Result`, possibly overwriting the default `std::Result` type usage._
pub mod prelude {

    // main exports
    pub use crate::simple::{
        parse_version, parse_header, parse_headers,
        load_image, save_image, load_parts, save_parts,
        load_part_by_name, load_deep, is_exr, list_layers,
        load_rgba, load_rgba_from_memory, load_rgba_layer, save_rgba,
        RgbaImage,
    };

    // core data types
    pub use crate::image::{
        Image, Levels, Level, Samples, DeepImage,
        Part, Content, ReadOptions, WriteOptions,
    };

    // secondary data types
    pub use crate::meta::{self, MetaData, Version, Blocks};
    pub use crate::meta::header::Header;
    pub use crate::meta::attribute::{
        self, AttributeValue, ChannelDescription, SampleType, Text,
        LineOrder, TileDescription, LevelMode, IntegerBounds,
    };

    pub use crate::compression::Compression;
    pub use crate::math::{Vec2, RoundingMode};
    pub use crate::error::{self, Result, Error};

    // re-export external stuff
    pub use half::f16;
    pub use smallvec::{smallvec, SmallVec};
}
