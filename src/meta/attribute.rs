//! Attribute values of a header, and how each type of value is stored.
//! Values of types this library does not know are kept as bytes.

use std::borrow::Borrow;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};

use bit_field::BitField;
use smallvec::SmallVec;

use crate::error::*;
use crate::io::*;
use crate::math::{RoundingMode, Vec2};
use crate::meta::sequence_end;

pub use crate::compression::Compression;


/// The value of an attribute. The comments name the type as it appears in a file.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {

    /// `chlist`, the channels of a part.
    ChannelList(ChannelList),

    /// `chromaticities`
    Chromaticities(Chromaticities),

    /// `compression`
    Compression(Compression),

    /// `envmap`
    EnvironmentMap(EnvironmentMap),

    /// `keycode`
    KeyCode(KeyCode),

    /// `lineOrder`
    LineOrder(LineOrder),

    /// `m33f`, row by row.
    Matrix3x3([f32; 3*3]),

    /// `m44f`, row by row.
    Matrix4x4([f32; 4*4]),

    /// `preview`
    Preview(Preview),

    /// `rational`, a numerator and a denominator.
    Rational((i32, u32)),

    /// `stringvector`
    TextVector(Vec<Text>),

    /// `tiledesc`
    TileDescription(TileDescription),

    /// `timecode`
    TimeCode(TimeCode),

    /// `string`
    Text(Text),

    /// `double`
    F64(f64),

    /// `float`
    F32(f32),

    /// `int`
    I32(i32),

    /// `box2i`
    IntegerBounds(IntegerBounds),

    /// `box2f`
    FloatRect(FloatRect),

    /// `v2i`
    IntVec2(Vec2<i32>),

    /// `v2f`
    FloatVec2(Vec2<f32>),

    /// `v3i`
    IntVec3((i32, i32, i32)),

    /// `v3f`
    FloatVec3((f32, f32, f32)),

    /// Any other type. Written back unchanged.
    Unknown {

        /// As found in the file.
        type_name: Text,

        /// The encoded value. The `exr_codec::io::Data` trait helps decoding it.
        bytes: Vec<u8>,
    },
}

/// Bytes without a terminating zero, mostly ascii.
/// Names of attributes and channels are texts, as are string attributes.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Default)]
pub struct Text {
    bytes: TextBytes,
}

/// Short texts, such as channel names, are not allocated on the heap.
pub type TextBytes = SmallVec<[u8; 24]>;

/// An SMPTE 12M time code, stored as two packed `u32` values.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct TimeCode {

    /// 0 to 23.
    pub hours: u8,

    /// 0 to 59.
    pub minutes: u8,

    /// 0 to 59.
    pub seconds: u8,

    /// 0 to 29.
    pub frame: u8,

    /// Frame numbers are skipped to match 29.97 frames per second.
    pub drop_frame: bool,

    /// The color frame flag of the video signal.
    pub color_frame: bool,

    /// The field phase flag of the video signal.
    pub field_phase: bool,

    /// The flags in bits 23, 30 and 31 of the packed time.
    pub binary_group_flags: [bool; 3],

    /// Eight user defined values of four bits each.
    pub binary_groups: [u8; 8]
}

/// The kind of blocks in a part, as named by its `type` attribute.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BlockType {

    /// `scanlineimage`
    ScanLine,

    /// `tiledimage`
    Tile,

    /// `deepscanline`
    DeepScanLine,

    /// `deeptile`
    DeepTile,
}


/// A rectangle of pixels, such as a data window.
/// A file stores the inclusive minimum and maximum coordinates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The smallest coordinate inside the rectangle.
    pub position: Vec2<i32>,

    /// The pixel count in each dimension, so that the largest
    /// coordinate inside is `position + size - 1`.
    pub size: Vec2<usize>,
}

/// A float rectangle with inclusive corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatRect {

    /// The smallest coordinate.
    pub min: Vec2<f32>,

    /// The largest coordinate.
    pub max: Vec2<f32>
}

/// The channels of a part, in file order.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelList {

    /// Sorted by name in valid files.
    pub list: SmallVec<[ChannelDescription; 5]>,

    /// The summed sample size of all channels.
    pub bytes_per_pixel: usize,
}

/// Name, sample type and subsampling of one channel.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// For example `R` or `diffuse.G`.
    pub name: Text,

    /// How the samples are stored in the file.
    pub sample_type: SampleType,

    /// The type of the decoded samples. `F16` and `F32` convert into each other,
    /// `U32` converts into nothing else.
    /// Equal to `sample_type` after reading, and never written.
    pub requested_type: SampleType,

    /// Tells lossy compression to quantize linearly instead of perceptually.
    pub quantize_linearly: bool,

    /// Only every n-th column and row carries a sample.
    /// Must be `(1, 1)` unless the part consists of flat scan lines.
    pub sampling: Vec2<usize>,
}

/// How the samples of a channel are stored.
/// The discriminant is the value in a file.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// Unsigned 32-bit integers.
    U32 = 0,

    /// Half precision floats.
    F16 = 1,

    /// Single precision floats.
    F32 = 2,
}

/// CIE xy coordinates of the primaries and the white point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {

    /// Red primary.
    pub red: Vec2<f32>,

    /// Green primary.
    pub green: Vec2<f32>,

    /// Blue primary.
    pub blue: Vec2<f32>,

    /// White point.
    pub white: Vec2<f32>
}

/// How an environment map surrounds the viewer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EnvironmentMap {

    /// Longitude along x, latitude along y.
    LatitudeLongitude = 0,

    /// Six square faces, stacked vertically.
    Cube = 1,
}

/// The key code printed along the edge of motion picture film.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct KeyCode {

    /// 0 to 99.
    pub film_manufacturer_code: i32,

    /// 0 to 99.
    pub film_type: i32,

    /// 0 to 999999.
    pub film_roll_prefix: i32,

    /// 0 to 9999.
    pub count: i32,

    /// 0 to 119.
    pub perforation_offset: i32,

    /// 1 to 15.
    pub perforations_per_frame: i32,

    /// 20 to 120.
    pub perforations_per_count: i32,
}

/// The order of the chunks in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// The top block comes first.
    Increasing = 0,

    /// The bottom block comes first.
    Decreasing = 1,

    /// Any order. Blocks are placed by the coordinates in their chunk.
    Unspecified = 2,
}

/// A thumbnail of the image.
#[derive(Clone, Eq, PartialEq)]
pub struct Preview {

    /// Width and height in pixels.
    pub size: Vec2<usize>,

    /// Non-linear rgba, four bytes per pixel, row by row.
    pub pixel_data: Vec<u8>,
}

/// Tile size and resolution levels of a tiled part.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileDescription {

    /// The same on every level. Tiles at the right and bottom edge are clipped.
    pub tile_size: Vec2<usize>,

    /// Which smaller resolutions are stored.
    pub level_mode: LevelMode,

    /// How the sizes of smaller levels are rounded.
    pub rounding_mode: RoundingMode,
}

/// The resolution levels of a tiled part.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelMode {

    /// The full resolution only.
    Singular = 0,

    /// Each level halves both dimensions of the previous one.
    MipMap = 1,

    /// Every combination of halving the width and halving the height.
    RipMap = 2,
}


// type names as they appear in a file
const BOX2I: &[u8] = b"box2i";
const BOX2F: &[u8] = b"box2f";
const INT: &[u8] = b"int";
const FLOAT: &[u8] = b"float";
const DOUBLE: &[u8] = b"double";
const RATIONAL: &[u8] = b"rational";
const TIMECODE: &[u8] = b"timecode";
const V2I: &[u8] = b"v2i";
const V2F: &[u8] = b"v2f";
const V3I: &[u8] = b"v3i";
const V3F: &[u8] = b"v3f";
const CHLIST: &[u8] = b"chlist";
const CHROMATICITIES: &[u8] = b"chromaticities";
const COMPRESSION: &[u8] = b"compression";
const ENVMAP: &[u8] = b"envmap";
const KEYCODE: &[u8] = b"keycode";
const LINE_ORDER: &[u8] = b"lineOrder";
const M33F: &[u8] = b"m33f";
const M44F: &[u8] = b"m44f";
const PREVIEW: &[u8] = b"preview";
const STRING: &[u8] = b"string";
const STRING_VECTOR: &[u8] = b"stringvector";
const TILEDESC: &[u8] = b"tiledesc";

/// The size of every value of the named type, if all values have the same size.
fn fixed_byte_size(type_name: &[u8]) -> Option<usize> {
    Some(match type_name {
        COMPRESSION | ENVMAP | LINE_ORDER => 1,
        INT | FLOAT => 4,
        DOUBLE | RATIONAL | TIMECODE | V2I | V2F => 8,
        TILEDESC => 9,
        V3I | V3F => 12,
        BOX2I | BOX2F => 16,
        KEYCODE => 28,
        CHROMATICITIES => 32,
        M33F => 36,
        M44F => 64,
        _ => return None,
    })
}

/// Read exactly `N` values.
fn read_array<T: Data + Copy, const N: usize>(read: &mut impl Read) -> Result<[T; N]> {
    let mut values = [T::default(); N];
    T::read_slice_le(read, &mut values)?;
    Ok(values)
}


impl Text {

    /// Use the bytes as they are.
    pub fn from_bytes_unchecked(bytes: TextBytes) -> Self {
        Text { bytes }
    }

    /// Copy the bytes as they are.
    pub fn from_slice_unchecked(text: &[u8]) -> Self {
        Text { bytes: SmallVec::from_slice(text) }
    }

    /// The bytes, without a terminator.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check whether this text can be used as an attribute name, type name or channel name.
    /// Sets `long_names` if the text is longer than 31 bytes.
    pub fn validate_name(&self, long_names: &mut bool) -> UnitResult {
        if self.bytes.is_empty() {
            return Err(Error::attribute("name must not be empty"));
        }

        if self.bytes.contains(&0) {
            return Err(Error::attribute("name must not contain zero bytes"));
        }

        if self.bytes.len() > 255 {
            return Err(Error::attribute("name must not be longer than 255 bytes"));
        }

        if self.bytes.len() > 31 {
            *long_names = true;
        }

        Ok(())
    }

    /// The bytes plus a terminating zero.
    pub fn null_terminated_byte_size(&self) -> usize {
        self.bytes.len() + sequence_end::byte_size()
    }

    /// Write the bytes and a terminating zero.
    pub fn write_null_terminated(&self, write: &mut impl Write) -> UnitResult {
        debug_assert!(!self.bytes.is_empty(), "empty text would be mistaken for a sequence end");
        u8::write_slice_le(write, self.bytes())?;
        sequence_end::write(write)
    }

    /// Read up to and including a zero byte.
    /// Fails if more than `max_len` bytes precede the zero.
    pub fn read_null_terminated(read: &mut impl Read, max_len: usize) -> Result<Self> {
        let mut bytes = TextBytes::new();

        loop {
            let byte = u8::read_le(read)?;
            if byte == 0 { return Ok(Text { bytes }); }

            if bytes.len() == max_len {
                return Err(Error::attribute("name is too long"));
            }

            bytes.push(byte);
        }
    }

    // inside string vectors, each text is prefixed with its length
    fn write_sized(&self, write: &mut impl Write) -> UnitResult {
        u8::write_sized_slice_le(write, self.bytes())
    }

    fn read_sized(read: &mut impl Read, max_size: usize) -> Result<Self> {
        let bytes = u8::read_sized_vec_le(read, max_size, "text attribute length")?;
        Ok(Text::from_bytes_unchecked(SmallVec::from_vec(bytes)))
    }

    /// The bytes as latin-1 characters.
    pub fn chars(&self) -> impl '_ + Iterator<Item = char> {
        self.bytes.iter().map(|&byte| char::from(byte))
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, other: &&str) -> bool {
        self.bytes() == other.as_bytes()
    }
}

impl Borrow<[u8]> for Text {
    fn borrow(&self) -> &[u8] {
        self.bytes()
    }
}

// must hash like the borrowed bytes
impl Hash for Text {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes().hash(state)
    }
}

impl From<&str> for Text {
    fn from(string: &str) -> Self {
        Text::from_slice_unchecked(string.as_bytes())
    }
}

impl From<String> for Text {
    fn from(string: String) -> Self {
        Text::from_bytes_unchecked(SmallVec::from_vec(string.into_bytes()))
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Text({:?})", String::from_utf8_lossy(self.bytes()))
    }
}

impl fmt::Display for Text {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&String::from_utf8_lossy(self.bytes()))
    }
}


impl ChannelList {

    /// Sums up the pixel size. The order of the channels is not checked.
    pub fn new(channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let bytes_per_pixel = channels.iter().map(|channel| channel.sample_type.bytes_per_sample()).sum();
        ChannelList { list: channels, bytes_per_pixel }
    }

    /// The position of the channel with exactly this name.
    pub fn find_index_of_channel(&self, exact_name: &str) -> Option<usize> {
        self.list.iter().position(|channel| channel.name == *exact_name)
    }

    /// All channels and the terminating zero.
    pub fn byte_size(&self) -> usize {
        sequence_end::byte_size() + self.list.iter().map(ChannelDescription::byte_size).sum::<usize>()
    }

    /// Write all channels and the terminating zero.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.list.iter().try_for_each(|channel| channel.write(write))?;
        sequence_end::write(write)
    }

    /// Read channels up to the terminating zero.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut channels = SmallVec::new();

        while !sequence_end::has_come(read)? {
            channels.push(ChannelDescription::read(read)?);
        }

        Ok(ChannelList::new(channels))
    }

    /// Check that the list is not empty, names are unique, and every channel is valid.
    /// Pedantic validation also requires alphabetical order,
    /// which all files written by this library have.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds, pedantic: bool) -> UnitResult {
        if self.list.is_empty() {
            return Err(Error::header("at least one channel is required"));
        }

        for channel in &self.list {
            channel.validate(allow_sampling, data_window)?;
        }

        for (index, channel) in self.list.iter().enumerate() {
            if self.list[.. index].iter().any(|previous| previous.name == channel.name) {
                return Err(Error::header(format!("channel name `{}` is not unique", channel.name)));
            }
        }

        if pedantic && self.list.windows(2).any(|pair| pair[0].name > pair[1].name) {
            return Err(Error::header("channel names are not sorted alphabetically"));
        }

        Ok(())
    }
}

impl BlockType {

    fn name(self) -> &'static [u8] {
        match self {
            BlockType::ScanLine => b"scanlineimage",
            BlockType::Tile => b"tiledimage",
            BlockType::DeepScanLine => b"deepscanline",
            BlockType::DeepTile => b"deeptile",
        }
    }

    /// Interpret the value of a `type` attribute.
    pub fn parse(text: &Text) -> Result<Self> {
        [ BlockType::ScanLine, BlockType::Tile, BlockType::DeepScanLine, BlockType::DeepTile ].iter().copied()
            .find(|block_type| block_type.name() == text.bytes())
            .ok_or_else(|| Error::header(format!("unknown part type `{}`", text)))
    }

    /// The value of the `type` attribute.
    pub fn to_text(self) -> Text {
        Text::from_slice_unchecked(self.name())
    }

    /// Whether the pixels have a variable number of samples.
    pub fn is_deep(self) -> bool {
        matches!(self, BlockType::DeepScanLine | BlockType::DeepTile)
    }
}


impl IntegerBounds {

    /// A rectangle starting at the origin.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0, 0), size)
    }

    /// A rectangle starting at `start`.
    pub fn new(start: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        Self { position: start.into(), size: size.into() }
    }

    /// The first coordinate right of and below the rectangle.
    /// Only valid for validated bounds.
    pub fn end(self) -> Vec2<i64> {
        Vec2(
            i64::from(self.position.x()) + self.size.width() as i64,
            i64::from(self.position.y()) + self.size.height() as i64,
        )
    }

    /// The largest coordinate inside the rectangle.
    pub fn max(self) -> Vec2<i64> {
        let end = self.end();
        Vec2(end.0 - 1, end.1 - 1)
    }

    /// Check that the rectangle contains pixels, and that both corners are in range.
    pub fn validate(&self) -> UnitResult {
        if self.size.width() == 0 || self.size.height() == 0 {
            return Err(Error::header("window must contain at least one pixel"));
        }

        let min = Vec2(i64::from(self.position.x()), i64::from(self.position.y()));
        Self::validate_min_max(min, self.max())
    }

    // coordinates are limited to half of the i32 range
    fn validate_min_max(min: Vec2<i64>, max: Vec2<i64>) -> UnitResult {
        let limit = i64::from(i32::MAX / 2);
        let in_range = |value: i64| -limit < value && value < limit;

        if [ min.x(), min.y(), max.x(), max.y() ].iter().all(|&value| in_range(value)) { Ok(()) }
        else { Err(Error::header("window coordinates out of range")) }
    }

    /// Write the minimum and the maximum.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        let max = self.max();
        i32::write_slice_le(write, &[ self.position.x(), self.position.y(), max.x() as i32, max.y() as i32 ])
    }

    /// Read the minimum and the maximum. Fails if the maximum is smaller than the minimum.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let [ x_min, y_min, x_max, y_max ] = read_array::<i32, 4>(read)?;

        if x_max < x_min || y_max < y_min {
            return Err(Error::header("window maximum is smaller than its minimum"));
        }

        let min = Vec2(i64::from(x_min), i64::from(y_min));
        let max = Vec2(i64::from(x_max), i64::from(y_max));
        Self::validate_min_max(min, max)?;

        // the maximum is inclusive
        let size = Vec2((max.x() - min.x() + 1) as usize, (max.y() - min.y() + 1) as usize);
        Ok(IntegerBounds { position: Vec2(x_min, y_min), size })
    }
}


impl FloatRect {

    /// Write the minimum and the maximum.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        f32::write_slice_le(write, &[ self.min.x(), self.min.y(), self.max.x(), self.max.y() ])
    }

    /// Read the minimum and the maximum.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let [ min_x, min_y, max_x, max_y ] = read_array::<f32, 4>(read)?;
        Ok(FloatRect { min: Vec2(min_x, min_y), max: Vec2(max_x, max_y) })
    }
}

impl SampleType {

    const ALL: [SampleType; 3] = [ SampleType::U32, SampleType::F16, SampleType::F32 ];

    /// The size of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::F16 => 2,
            SampleType::F32 | SampleType::U32 => 4,
        }
    }

    /// Whether samples of this type can be decoded as the requested type.
    /// Only floats of different precision convert into each other.
    pub fn converts_to(self, requested: SampleType) -> bool {
        self == requested || (self != SampleType::U32 && requested != SampleType::U32)
    }

    /// Write the type as an `i32`.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        (self as i32).write_le(write)
    }

    /// Read the type from an `i32`.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let id = i32::read_le(read)?;

        usize::try_from(id).ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or_else(|| Error::attribute(format!("unknown sample type {}", id)))
    }
}

impl ChannelDescription {

    /// Color and luminance channels are quantized perceptually,
    /// all other channels, such as alpha or depth, linearly.
    pub fn guess_quantization_linearity(name: &Text) -> bool {
        const PERCEPTUAL: &[u8] = b"RGBLXYZrgblxyz";
        !matches!(name.bytes(), [ single ] if PERCEPTUAL.contains(single))
    }

    /// A full resolution channel, quantized as its name suggests.
    pub fn named(name: impl Into<Text>, sample_type: SampleType) -> Self {
        let name = name.into();
        let quantize_linearly = Self::guess_quantization_linearity(&name);
        Self::new(name, sample_type, quantize_linearly)
    }

    /// A full resolution channel.
    pub fn new(name: impl Into<Text>, sample_type: SampleType, quantize_linearly: bool) -> Self {
        Self {
            name: name.into(), sample_type, requested_type: sample_type,
            quantize_linearly, sampling: Vec2(1, 1)
        }
    }

    /// The resolution of this channel, respecting subsampling.
    /// Assumes the size is divisible by the sampling factors, which validation ensures.
    pub fn subsampled_resolution(&self, dimensions: Vec2<usize>) -> Vec2<usize> {
        Vec2(dimensions.x() / self.sampling.x(), dimensions.y() / self.sampling.y())
    }

    /// The count of samples this channel contains, respecting subsampling.
    pub fn subsampled_pixels(&self, dimensions: Vec2<usize>) -> usize {
        self.subsampled_resolution(dimensions).area()
    }

    /// The number of samples this channel has inside a rectangle of absolute pixel coordinates.
    /// Only pixels with coordinates divisible by the sampling factors carry a sample.
    pub fn subsampled_block_resolution(&self, bounds: IntegerBounds) -> Vec2<usize> {
        Vec2(
            sample_count_in_range(bounds.position.x(), bounds.size.width(), self.sampling.x()),
            sample_count_in_range(bounds.position.y(), bounds.size.height(), self.sampling.y()),
        )
    }

    /// Whether this channel stores samples in the row with the absolute coordinate `y`.
    pub fn is_sampled_row(&self, y: i64) -> bool {
        y.rem_euclid(self.sampling.y() as i64) == 0
    }

    /// Name, sample type, four bytes for the linearity flag, and the sampling.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size() + i32::BYTE_SIZE + 4 + 2 * i32::BYTE_SIZE
    }

    /// Write the channel without validating it.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;
        u8::write_slice_le(write, &[ u8::from(self.quantize_linearly), 0, 0, 0 ])?;

        i32::write_slice_le(write, &[
            usize_to_i32(self.sampling.x(), "channel sampling")?,
            usize_to_i32(self.sampling.y(), "channel sampling")?,
        ])
    }

    /// Read a channel without validating it.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let name = Text::read_null_terminated(read, 255)?;
        let sample_type = SampleType::read(read)?;

        // any nonzero byte means linear, three reserved bytes follow
        let [ linear, .. ] = read_array::<u8, 4>(read)?;
        let [ x_sampling, y_sampling ] = read_array::<i32, 2>(read)?;

        Ok(ChannelDescription {
            name, sample_type, requested_type: sample_type,
            quantize_linearly: linear != 0,
            sampling: Vec2(
                i32_to_usize(x_sampling, "negative channel sampling")?,
                i32_to_usize(y_sampling, "negative channel sampling")?,
            ),
        })
    }

    /// Validate this instance.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
        self.name.validate_name(&mut false)?;

        if self.sampling.x() == 0 || self.sampling.y() == 0 {
            return Err(Error::header("zero sampling factor"));
        }

        if !allow_sampling && self.sampling != Vec2(1, 1) {
            return Err(Error::header("subsampling is only allowed in flat scan line images"));
        }

        if self.sampling.x() > i32::MAX as usize || self.sampling.y() > i32::MAX as usize {
            return Err(Error::header("sampling factor too large"));
        }

        if data_window.position.x().rem_euclid(self.sampling.x() as i32) != 0
            || data_window.position.y().rem_euclid(self.sampling.y() as i32) != 0
        {
            return Err(Error::header("channel sampling factor not dividing data window position"));
        }

        if data_window.size.x() % self.sampling.x() != 0 || data_window.size.y() % self.sampling.y() != 0 {
            return Err(Error::header("channel sampling factor not dividing data window size"));
        }

        if !self.sample_type.converts_to(self.requested_type) {
            return Err(Error::argument(format!(
                "channel `{}` cannot be converted from {:?} to {:?}",
                self.name, self.sample_type, self.requested_type
            )));
        }

        Ok(())
    }
}

/// Count the multiples of `sampling` within `start .. start + length`.
pub(crate) fn sample_count_in_range(start: i32, length: usize, sampling: usize) -> usize {
    if length == 0 || sampling == 0 { return 0; }

    let sampling = sampling as i64;
    let first = start as i64;
    let last = first + length as i64 - 1;
    (last.div_euclid(sampling) - (first - 1).div_euclid(sampling)) as usize
}


// two decimal digits in one byte each
fn to_bcd(value: u8) -> u32 {
    u32::from(value / 10) << 4 | u32::from(value % 10)
}

fn from_bcd(bits: u32) -> u8 {
    (10 * bits.get_bits(4..8) + bits.get_bits(0..4)) as u8
}

impl TimeCode {

    /// Returns an error if any field is out of its allowed range.
    pub fn validate(&self) -> UnitResult {
        if self.frame > 29 { Err(Error::attribute("time code frame larger than 29")) }
        else if self.seconds > 59 { Err(Error::attribute("time code seconds larger than 59")) }
        else if self.minutes > 59 { Err(Error::attribute("time code minutes larger than 59")) }
        else if self.hours > 23 { Err(Error::attribute("time code hours larger than 23")) }
        else if self.binary_groups.iter().any(|&group| group > 15) {
            Err(Error::attribute("time code binary group value too large for 4 bits"))
        }
        else { Ok(()) }
    }

    /// Pack the time and the user data into two `u32` values, using the 60 field (TV60) layout.
    pub fn to_tv60(&self) -> Result<(u32, u32)> {
        // values out of range would not fit their bits
        self.validate()?;

        let mut time = 0_u32;
        time.set_bits(0..6, to_bcd(self.frame));
        time.set_bit(6, self.drop_frame);
        time.set_bit(7, self.color_frame);
        time.set_bits(8..15, to_bcd(self.seconds));
        time.set_bit(15, self.field_phase);
        time.set_bits(16..23, to_bcd(self.minutes));
        time.set_bit(23, self.binary_group_flags[0]);
        time.set_bits(24..30, to_bcd(self.hours));
        time.set_bit(30, self.binary_group_flags[1]);
        time.set_bit(31, self.binary_group_flags[2]);

        let mut user_data = 0_u32;
        for (index, &group) in self.binary_groups.iter().enumerate() {
            user_data.set_bits(index * 4 .. index * 4 + 4, u32::from(group));
        }

        Ok((time, user_data))
    }

    /// Unpack the two `u32` values of the TV60 layout.
    pub fn from_tv60(time: u32, user_data: u32) -> Self {
        let mut binary_groups = [0_u8; 8];
        for (index, group) in binary_groups.iter_mut().enumerate() {
            *group = user_data.get_bits(index * 4 .. index * 4 + 4) as u8;
        }

        TimeCode {
            hours: from_bcd(time.get_bits(24..30)),
            minutes: from_bcd(time.get_bits(16..23)),
            seconds: from_bcd(time.get_bits(8..15)),
            frame: from_bcd(time.get_bits(0..6)),
            drop_frame: time.get_bit(6),
            color_frame: time.get_bit(7),
            field_phase: time.get_bit(15),
            binary_group_flags: [ time.get_bit(23), time.get_bit(30), time.get_bit(31) ],
            binary_groups,
        }
    }

    /// Write the packed time and user data. Fails for fields out of range.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        let (time, user_data) = self.to_tv60()?;
        u32::write_slice_le(write, &[ time, user_data ])
    }

    /// Read the packed time and user data.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let [ time, user_data ] = read_array::<u32, 2>(read)?;
        Ok(Self::from_tv60(time, user_data))
    }
}

impl Chromaticities {

    /// Write the x and y coordinates of red, green, blue and white.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        for point in &[ self.red, self.green, self.blue, self.white ] {
            f32::write_slice_le(write, &[ point.x(), point.y() ])?;
        }

        Ok(())
    }

    /// Read the x and y coordinates of red, green, blue and white.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let [ red_x, red_y, green_x, green_y, blue_x, blue_y, white_x, white_y ] = read_array::<f32, 8>(read)?;

        Ok(Chromaticities {
            red: Vec2(red_x, red_y),
            green: Vec2(green_x, green_y),
            blue: Vec2(blue_x, blue_y),
            white: Vec2(white_x, white_y),
        })
    }
}

impl EnvironmentMap {

    /// Write the kind of map as a byte.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        (self as u8).write_le(write)
    }

    /// Read the kind of map from a byte.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        match u8::read_le(read)? {
            0 => Ok(EnvironmentMap::LatitudeLongitude),
            1 => Ok(EnvironmentMap::Cube),
            other => Err(Error::attribute(format!("unknown environment map {}", other))),
        }
    }
}

impl KeyCode {

    /// Write the seven numbers in declaration order.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        i32::write_slice_le(write, &[
            self.film_manufacturer_code, self.film_type, self.film_roll_prefix,
            self.count, self.perforation_offset,
            self.perforations_per_frame, self.perforations_per_count,
        ])
    }

    /// Read the seven numbers in declaration order.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let [
            film_manufacturer_code, film_type, film_roll_prefix,
            count, perforation_offset,
            perforations_per_frame, perforations_per_count,
        ] = read_array::<i32, 7>(read)?;

        Ok(KeyCode {
            film_manufacturer_code, film_type, film_roll_prefix,
            count, perforation_offset,
            perforations_per_frame, perforations_per_count,
        })
    }
}

impl LineOrder {

    const ALL: [LineOrder; 3] = [ LineOrder::Increasing, LineOrder::Decreasing, LineOrder::Unspecified ];

    /// Write the order as a byte.
    pub fn write(self, write: &mut impl Write) -> UnitResult {
        (self as u8).write_le(write)
    }

    /// Read the order from a byte.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let id = u8::read_le(read)?;

        Self::ALL.get(usize::from(id)).copied()
            .ok_or_else(|| Error::attribute(format!("unknown line order {}", id)))
    }
}


impl Preview {

    /// The size and the pixels.
    pub fn byte_size(&self) -> usize {
        2 * u32::BYTE_SIZE + self.pixel_data.len()
    }

    /// Write the size and the pixels.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        let size = [ u32::try_from(self.size.width())?, u32::try_from(self.size.height())? ];
        u32::write_slice_le(write, &size)?;
        u8::write_slice_le(write, &self.pixel_data)
    }

    /// Read the value. The pixel count must match the remaining attribute size.
    pub fn read(read: &mut impl Read, byte_size: usize) -> Result<Self> {
        let [ width, height ] = read_array::<u32, 2>(read)?;
        let (width, height) = (width as usize, height as usize);

        let pixel_bytes = width.checked_mul(height).and_then(|pixels| pixels.checked_mul(4))
            .filter(|&bytes| bytes + 2 * u32::BYTE_SIZE == byte_size)
            .ok_or_else(|| Error::attribute("preview dimensions do not match attribute size"))?;

        let pixel_data = u8::read_vec_le(read, pixel_bytes)?;
        Ok(Preview { size: Vec2(width, height), pixel_data })
    }
}

impl fmt::Debug for Preview {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Preview({}x{})", self.size.width(), self.size.height())
    }
}

impl LevelMode {
    const ALL: [LevelMode; 3] = [ LevelMode::Singular, LevelMode::MipMap, LevelMode::RipMap ];
}

impl TileDescription {

    /// Write the tile size, then one byte with the level mode
    /// in the low and the rounding mode in the high four bits.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        let size = [ u32::try_from(self.tile_size.width())?, u32::try_from(self.tile_size.height())? ];
        u32::write_slice_le(write, &size)?;

        let rounding: u8 = match self.rounding_mode {
            RoundingMode::Down => 0,
            RoundingMode::Up => 1,
        };

        (self.level_mode as u8 | rounding << 4).write_le(write)
    }

    /// Read the tile size and the modes.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let [ width, height ] = read_array::<u32, 2>(read)?;
        let modes = u8::read_le(read)?;

        let level_mode = LevelMode::ALL.get(usize::from(modes & 0x0f)).copied()
            .ok_or_else(|| Error::attribute("unknown tile level mode"))?;

        let rounding_mode = match modes >> 4 {
            0 => RoundingMode::Down,
            1 => RoundingMode::Up,
            _ => return Err(Error::attribute("unknown tile rounding mode")),
        };

        Ok(TileDescription { tile_size: Vec2(width as usize, height as usize), level_mode, rounding_mode })
    }

    /// Tiles must contain pixels and stay far below the coordinate limit.
    pub fn validate(&self) -> UnitResult {
        let limit = (i32::MAX / 2) as usize;

        if self.tile_size.width() == 0 || self.tile_size.height() == 0 {
            Err(Error::header("tile size must not be zero"))
        }
        else if self.tile_size.width() >= limit || self.tile_size.height() >= limit {
            Err(Error::header("tile size too large"))
        }
        else { Ok(()) }
    }
}


/// The size of a whole attribute: name, type name, value size and value.
pub fn byte_size(name: &Text, value: &AttributeValue) -> usize {
    name.null_terminated_byte_size()
        + value.type_name().len() + sequence_end::byte_size()
        + i32::BYTE_SIZE
        + value.byte_size()
}

/// Write name, type name, value size and value, without validating.
pub fn write(name: &Text, value: &AttributeValue, write: &mut impl Write) -> UnitResult {
    name.write_null_terminated(write)?;
    u8::write_slice_le(write, value.type_name())?;
    sequence_end::write(write)?;

    usize_to_i32(value.byte_size(), "attribute too large")?.write_le(write)?;
    value.write(write)
}

/// Read the name, the type name, and the undecoded value of an attribute.
/// Decode the value with `AttributeValue::from_bytes`.
pub fn read_raw(read: &mut PeekRead<impl Read>, max_name_len: usize) -> Result<(Text, Text, Vec<u8>)> {
    let name = Text::read_null_terminated(read, max_name_len)?;
    let type_name = Text::read_null_terminated(read, max_name_len)?;

    if type_name.is_empty() {
        return Err(Error::attribute(format!("attribute `{}` has no type", name)));
    }

    let size = usize::try_from(i32::read_le(read)?)
        .map_err(|_| Error::attribute(format!("attribute `{}` has negative size", name)))?;

    let bytes = u8::read_vec_le(read, size)?;
    Ok((name, type_name, bytes))
}


impl AttributeValue {

    /// The size of the value alone.
    pub fn byte_size(&self) -> usize {
        match self {
            AttributeValue::ChannelList(channels) => channels.byte_size(),
            AttributeValue::Preview(preview) => preview.byte_size(),

            // delimited by the attribute size, so no terminator
            AttributeValue::Text(text) => text.bytes().len(),

            AttributeValue::TextVector(texts) => texts.iter().map(|text| i32::BYTE_SIZE + text.bytes().len()).sum(),
            AttributeValue::Unknown { bytes, .. } => bytes.len(),

            fixed => fixed_byte_size(fixed.type_name()).unwrap_or_default(),
        }
    }

    /// The name of the type, as written in a file.
    pub fn type_name(&self) -> &[u8] {
        match self {
            AttributeValue::ChannelList(_) => CHLIST,
            AttributeValue::Chromaticities(_) => CHROMATICITIES,
            AttributeValue::Compression(_) => COMPRESSION,
            AttributeValue::EnvironmentMap(_) => ENVMAP,
            AttributeValue::KeyCode(_) => KEYCODE,
            AttributeValue::LineOrder(_) => LINE_ORDER,
            AttributeValue::Matrix3x3(_) => M33F,
            AttributeValue::Matrix4x4(_) => M44F,
            AttributeValue::Preview(_) => PREVIEW,
            AttributeValue::Rational(_) => RATIONAL,
            AttributeValue::TextVector(_) => STRING_VECTOR,
            AttributeValue::TileDescription(_) => TILEDESC,
            AttributeValue::TimeCode(_) => TIMECODE,
            AttributeValue::Text(_) => STRING,
            AttributeValue::F64(_) => DOUBLE,
            AttributeValue::F32(_) => FLOAT,
            AttributeValue::I32(_) => INT,
            AttributeValue::IntegerBounds(_) => BOX2I,
            AttributeValue::FloatRect(_) => BOX2F,
            AttributeValue::IntVec2(_) => V2I,
            AttributeValue::FloatVec2(_) => V2F,
            AttributeValue::IntVec3(_) => V3I,
            AttributeValue::FloatVec3(_) => V3F,
            AttributeValue::Unknown { type_name, .. } => type_name.bytes(),
        }
    }

    /// Write the value alone, without validating.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        match self {
            AttributeValue::ChannelList(channels) => channels.write(write),
            AttributeValue::Chromaticities(chromaticities) => chromaticities.write(write),
            AttributeValue::Compression(compression) => compression.write(write),
            AttributeValue::EnvironmentMap(map) => map.write(write),
            AttributeValue::KeyCode(code) => code.write(write),
            AttributeValue::LineOrder(order) => order.write(write),
            AttributeValue::Matrix3x3(matrix) => f32::write_slice_le(write, matrix),
            AttributeValue::Matrix4x4(matrix) => f32::write_slice_le(write, matrix),
            AttributeValue::Preview(preview) => preview.write(write),

            AttributeValue::Rational((numerator, denominator)) => {
                numerator.write_le(write)?;
                denominator.write_le(write)
            },

            AttributeValue::TextVector(texts) => texts.iter().try_for_each(|text| text.write_sized(write)),
            AttributeValue::TileDescription(tiles) => tiles.write(write),
            AttributeValue::TimeCode(time) => time.write(write),
            AttributeValue::Text(text) => u8::write_slice_le(write, text.bytes()),
            AttributeValue::F64(value) => value.write_le(write),
            AttributeValue::F32(value) => value.write_le(write),
            AttributeValue::I32(value) => value.write_le(write),
            AttributeValue::IntegerBounds(bounds) => bounds.write(write),
            AttributeValue::FloatRect(rect) => rect.write(write),
            AttributeValue::IntVec2(vector) => i32::write_slice_le(write, &[ vector.x(), vector.y() ]),
            AttributeValue::FloatVec2(vector) => f32::write_slice_le(write, &[ vector.x(), vector.y() ]),
            AttributeValue::IntVec3((x, y, z)) => i32::write_slice_le(write, &[ *x, *y, *z ]),
            AttributeValue::FloatVec3((x, y, z)) => f32::write_slice_le(write, &[ *x, *y, *z ]),
            AttributeValue::Unknown { bytes, .. } => u8::write_slice_le(write, bytes),
        }
    }

    /// Decode the value of an attribute of the named type.
    /// Values of unknown types are kept as bytes.
    /// Values of known types must have exactly the size of their type.
    pub fn from_bytes(type_name: Text, bytes: Vec<u8>) -> Result<Self> {
        if let Some(expected) = fixed_byte_size(type_name.bytes()) {
            if bytes.len() != expected {
                return Err(Error::attribute(format!(
                    "`{}` attribute with {} instead of {} bytes",
                    type_name, bytes.len(), expected
                )));
            }
        }

        let read = &mut bytes.as_slice();

        let value = match type_name.bytes() {
            BOX2I => IntegerBounds::read(read).map(AttributeValue::IntegerBounds),
            BOX2F => FloatRect::read(read).map(AttributeValue::FloatRect),
            INT => i32::read_le(read).map(AttributeValue::I32),
            FLOAT => f32::read_le(read).map(AttributeValue::F32),
            DOUBLE => f64::read_le(read).map(AttributeValue::F64),
            TIMECODE => TimeCode::read(read).map(AttributeValue::TimeCode),

            RATIONAL => read_array::<i32, 2>(read)
                .map(|[ numerator, denominator ]| AttributeValue::Rational((numerator, denominator as u32))),

            V2I => read_array::<i32, 2>(read).map(|[ x, y ]| AttributeValue::IntVec2(Vec2(x, y))),
            V2F => read_array::<f32, 2>(read).map(|[ x, y ]| AttributeValue::FloatVec2(Vec2(x, y))),
            V3I => read_array::<i32, 3>(read).map(|[ x, y, z ]| AttributeValue::IntVec3((x, y, z))),
            V3F => read_array::<f32, 3>(read).map(|[ x, y, z ]| AttributeValue::FloatVec3((x, y, z))),
            M33F => read_array::<f32, 9>(read).map(AttributeValue::Matrix3x3),
            M44F => read_array::<f32, 16>(read).map(AttributeValue::Matrix4x4),

            CHLIST => ChannelList::read(&mut PeekRead::new(&mut *read)).map(AttributeValue::ChannelList),
            CHROMATICITIES => Chromaticities::read(read).map(AttributeValue::Chromaticities),
            COMPRESSION => Compression::read(read).map(AttributeValue::Compression),
            ENVMAP => EnvironmentMap::read(read).map(AttributeValue::EnvironmentMap),
            KEYCODE => KeyCode::read(read).map(AttributeValue::KeyCode),
            LINE_ORDER => LineOrder::read(read).map(AttributeValue::LineOrder),
            PREVIEW => Preview::read(read, bytes.len()).map(AttributeValue::Preview),
            STRING => Ok(AttributeValue::Text(Text::from_slice_unchecked(*read))),
            STRING_VECTOR => read_text_vector(read).map(AttributeValue::TextVector),
            TILEDESC => TileDescription::read(read).map(AttributeValue::TileDescription),

            _ => return Ok(AttributeValue::Unknown { type_name, bytes }),
        };

        // a value shorter than its type is a malformed attribute, not a truncated file
        let value = value.map_err(|error| match error {
            Error::InvalidData(message) => Error::attribute(format!("`{}` attribute: {}", type_name, message)),
            other => other,
        })?;

        if let AttributeValue::ChannelList(_) = value {
            if !read.is_empty() {
                return Err(Error::attribute(format!("`{}` attribute has trailing bytes", type_name)));
            }
        }

        Ok(value)
    }
}

/// The number of texts follows from the attribute size.
fn read_text_vector(read: &mut &[u8]) -> Result<Vec<Text>> {
    let mut texts = Vec::new();

    while !read.is_empty() {
        let remaining = read.len();
        texts.push(Text::read_sized(read, remaining)?);
    }

    Ok(texts)
}


#[cfg(test)]
mod test {
    use super::*;

    fn write_read(name: &str, value: AttributeValue) -> AttributeValue {
        let name = Text::from(name);
        let mut bytes = Vec::new();
        super::write(&name, &value, &mut bytes).unwrap();
        assert_eq!(bytes.len(), super::byte_size(&name, &value), "byte size of {:?}", value);

        let (read_name, type_name, value_bytes) = read_raw(&mut PeekRead::new(bytes.as_slice()), 255).unwrap();
        assert_eq!(read_name, name);
        AttributeValue::from_bytes(type_name, value_bytes).unwrap()
    }

    #[test]
    fn attribute_write_read_roundtrip_and_byte_size(){
        let attributes = vec![
            AttributeValue::IntegerBounds(IntegerBounds::new(Vec2(-3, 7), Vec2(13, 1))),
            AttributeValue::FloatRect(FloatRect { min: Vec2(0.5, -1.0), max: Vec2(2.0, 3.0) }),
            AttributeValue::I32(-42),
            AttributeValue::F32(3.5),
            AttributeValue::F64(-0.125),
            AttributeValue::Rational((-1, 3)),
            AttributeValue::IntVec2(Vec2(4, -4)),
            AttributeValue::FloatVec3((1.0, 2.0, 3.0)),
            AttributeValue::Compression(Compression::PIZ),
            AttributeValue::LineOrder(LineOrder::Decreasing),
            AttributeValue::EnvironmentMap(EnvironmentMap::Cube),
            AttributeValue::Matrix3x3([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]),
            AttributeValue::Text(Text::from("some comment")),
            AttributeValue::TextVector(vec![ Text::from("left"), Text::from(""), Text::from("right") ]),
            AttributeValue::KeyCode(KeyCode {
                film_manufacturer_code: 1, film_type: 2, film_roll_prefix: 3, count: 4,
                perforation_offset: 5, perforations_per_frame: 6, perforations_per_count: 7,
            }),
            AttributeValue::Preview(Preview { size: Vec2(2, 1), pixel_data: vec![1, 2, 3, 4, 5, 6, 7, 8] }),
            AttributeValue::TileDescription(TileDescription {
                tile_size: Vec2(32, 64), level_mode: LevelMode::RipMap, rounding_mode: RoundingMode::Up
            }),
            AttributeValue::ChannelList(ChannelList::new(smallvec::smallvec![
                ChannelDescription::named("B", SampleType::F16),
                ChannelDescription::named("depth.Z", SampleType::F32),
                ChannelDescription::named("id", SampleType::U32),
            ])),
            AttributeValue::Unknown { type_name: Text::from("myType"), bytes: vec![9, 8, 7, 6, 5] },
        ];

        for value in attributes {
            assert_eq!(write_read("attribute", value.clone()), value);
        }
    }

    #[test]
    fn tile_description_mode_byte(){
        let description = TileDescription {
            tile_size: Vec2(16, 8), level_mode: LevelMode::MipMap, rounding_mode: RoundingMode::Up
        };

        let mut bytes = Vec::new();
        description.write(&mut bytes).unwrap();
        assert_eq!(bytes, vec![16, 0, 0, 0, 8, 0, 0, 0, 1 + 16]);
    }

    #[test]
    fn known_type_with_wrong_size_is_invalid_attribute(){
        let result = AttributeValue::from_bytes(Text::from("box2i"), vec![0; 12]);
        assert!(matches!(result, Err(Error::InvalidAttribute(_))), "{:?}", result);

        let result = AttributeValue::from_bytes(Text::from("int"), vec![0; 5]);
        assert!(matches!(result, Err(Error::InvalidAttribute(_))), "{:?}", result);

        // a channel list without terminator
        let result = AttributeValue::from_bytes(Text::from("chlist"), b"R\0".to_vec());
        assert!(matches!(result, Err(Error::InvalidAttribute(_))), "{:?}", result);
    }

    #[test]
    fn inverted_window_is_invalid_header(){
        let mut bytes = Vec::new();
        i32::write_slice_le(&mut bytes, &[5, 0, 4, 10]).unwrap();
        let result = AttributeValue::from_bytes(Text::from("box2i"), bytes);
        assert!(matches!(result, Err(Error::InvalidHeader(_))), "{:?}", result);
    }

    #[test]
    fn negative_attribute_size(){
        let mut bytes = b"name\0int\0".to_vec();
        (-4_i32).write_le(&mut bytes).unwrap();

        let result = read_raw(&mut PeekRead::new(bytes.as_slice()), 255);
        assert!(matches!(result, Err(Error::InvalidAttribute(_))), "{:?}", result.map(|(name, ..)| name));
    }

    #[test]
    fn time_code_pack(){
        let code = TimeCode {
            hours: 13, minutes: 37, seconds: 42, frame: 7,
            drop_frame: true, color_frame: false, field_phase: true,
            binary_group_flags: [true, false, true],
            binary_groups: [0, 1, 2, 3, 4, 5, 6, 15],
        };

        let (time, user_data) = code.to_tv60().unwrap();
        assert_eq!(time.get_bits(24..30), 0x13);
        assert_eq!(user_data >> 28, 15);
        assert_eq!(TimeCode::from_tv60(time, user_data), code);

        let invalid = TimeCode { hours: 24, .. code };
        assert!(invalid.to_tv60().is_err());
    }

    #[test]
    fn enumerations_reject_unknown_values(){
        assert!(matches!(AttributeValue::from_bytes(Text::from("lineOrder"), vec![ 3 ]), Err(Error::InvalidAttribute(_))));
        assert!(matches!(AttributeValue::from_bytes(Text::from("envmap"), vec![ 2 ]), Err(Error::InvalidAttribute(_))));
        assert!(SampleType::read(&mut [ 3_u8, 0, 0, 0 ].as_ref()).is_err());
        assert_eq!(SampleType::read(&mut [ 1_u8, 0, 0, 0 ].as_ref()).unwrap(), SampleType::F16);

        assert_eq!(BlockType::parse(&Text::from("deeptile")).unwrap(), BlockType::DeepTile);
        assert!(BlockType::parse(&Text::from("tiled")).is_err());
        assert_eq!(BlockType::DeepScanLine.to_text(), "deepscanline");
    }

    #[test]
    fn single_letter_color_channels_are_perceptual(){
        assert!(!ChannelDescription::named("R", SampleType::F16).quantize_linearly);
        assert!(!ChannelDescription::named("y", SampleType::F16).quantize_linearly);
        assert!(ChannelDescription::named("A", SampleType::F16).quantize_linearly);
        assert!(ChannelDescription::named("RG", SampleType::F16).quantize_linearly);
    }

    #[test]
    fn channel_validation(){
        let window = IntegerBounds::new(Vec2(2, 4), Vec2(8, 6));
        let mut channel = ChannelDescription::named("Y", SampleType::F16);
        channel.sampling = Vec2(2, 2);
        assert!(channel.validate(true, window).is_ok());
        assert!(channel.validate(false, window).is_err());

        channel.sampling = Vec2(3, 1);
        assert!(channel.validate(true, window).is_err());

        let mut channel = ChannelDescription::named("id", SampleType::U32);
        channel.requested_type = SampleType::F32;
        assert!(matches!(channel.validate(true, window), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn sampled_counts(){
        assert_eq!(sample_count_in_range(0, 16, 1), 16);
        assert_eq!(sample_count_in_range(0, 16, 3), 6);
        assert_eq!(sample_count_in_range(-4, 4, 2), 2);
        assert_eq!(sample_count_in_range(1, 1, 2), 0);
        assert_eq!(sample_count_in_range(5, 0, 2), 0);

        let mut channel = ChannelDescription::named("Y", SampleType::F16);
        channel.sampling = Vec2(2, 2);
        let block = IntegerBounds::new(Vec2(-2, 16), Vec2(8, 16));
        assert_eq!(channel.subsampled_block_resolution(block), Vec2(4, 8));
        assert!(channel.is_sampled_row(-2));
        assert!(!channel.is_sampled_row(-1));
    }
}
