
//! The header of one part: its channels, windows, block layout, and any further attributes.

use smallvec::smallvec;

use crate::meta::attribute::*;
use crate::meta::*;


/// The decoded attributes of one part.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// Sorted by name, as they are stored.
    pub channels: ChannelList,

    /// Applies to every block of the part.
    pub compression: Compression,

    /// Scan line blocks or tiles, and the resolution levels of tiled parts.
    pub blocks: Blocks,

    /// The order of the chunks in the file. Offset tables are always sorted by increasing y.
    pub line_order: LineOrder,

    /// The pixels that have values. The position can be negative.
    pub data_window: IntegerBounds,

    /// The pixels that should be displayed, which may extend beyond the data window.
    pub display_window: IntegerBounds,

    /// Width divided by height of a pixel. `1` if not stored.
    pub pixel_aspect: f32,

    /// Screen window of the camera projection. `(0, 0)` if not stored.
    pub screen_window_center: Vec2<f32>,

    /// Screen window of the camera projection. `1` if not stored.
    pub screen_window_width: f32,

    /// Parts of multipart files are addressed by name, so each of them needs one.
    pub name: Option<Text>,

    /// Samples per pixel vary, and a table stores how many each pixel has.
    pub deep: bool,

    /// Stored for deep parts, where only `1` is known.
    pub deep_data_version: Option<i32>,

    /// The largest sample count of any pixel in a deep part, if the writer knew it.
    pub max_samples_per_pixel: Option<usize>,

    /// How many chunks the part has across all levels, and so how long its offset table is.
    /// Computed from the other fields: change the layout with `Header::with_encoding` to keep it correct.
    pub chunk_count: usize,

    /// Attributes without a field, in file order.
    /// Values that fail to decode are kept as `AttributeValue::Unknown` and written back unchanged.
    pub custom_attributes: Vec<(Text, AttributeValue)>,
}


/// A resolution level of a part, as enumerated by `Header::levels`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LevelInfo {

    /// The level index. Both components are equal in mip maps, and zero in singular images.
    pub index: Vec2<usize>,

    /// The pixel resolution of this level.
    pub size: Vec2<usize>,
}


impl Header {

    /// An uncompressed scan line part with its data window at the origin.
    /// The display window equals the data window, lines are stored top to bottom,
    /// and there is no name and no custom attribute.
    pub fn new(data_size: impl Into<Vec2<usize>>, channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let data_size: Vec2<usize> = data_size.into();
        let compression = Compression::Uncompressed;
        let blocks = Blocks::ScanLines;

        Self {
            channels: ChannelList::new(channels),
            compression, blocks,
            line_order: LineOrder::Increasing,

            data_window: IntegerBounds::from_dimensions(data_size),
            display_window: IntegerBounds::from_dimensions(data_size),
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,

            name: None,
            deep: false,
            deep_data_version: None,
            max_samples_per_pixel: None,

            chunk_count: compute_chunk_count(compression, data_size, blocks),
            custom_attributes: Vec::new(),
        }
    }

    /// Multipart files require a unique name for each part.
    pub fn with_name(self, name: Text) -> Self {
        Self { name: Some(name), .. self }
    }

    /// Move the data window without resizing it.
    pub fn with_position(mut self, position: Vec2<i32>) -> Self {
        self.data_window.position = position;
        self
    }

    /// Replace the display window.
    pub fn with_display_window(self, display_window: IntegerBounds) -> Self {
        Self { display_window, .. self }
    }

    /// Change how the pixels are stored, and recompute the chunk count.
    pub fn with_encoding(self, compression: Compression, blocks: Blocks, line_order: LineOrder) -> Self {
        Self {
            chunk_count: compute_chunk_count(compression, self.data_window.size, blocks),
            compression, blocks, line_order,
            .. self
        }
    }

    /// Turn this into a deep scan line part of deep data version 1.
    pub fn with_deep(self, max_samples_per_pixel: Option<usize>) -> Self {
        Self {
            deep: true,
            deep_data_version: Some(1),
            max_samples_per_pixel,
            .. self
        }
    }

    /// Add a custom attribute. Standard names are refused when validating.
    pub fn with_attribute(mut self, name: Text, value: AttributeValue) -> Self {
        self.custom_attributes.push((name, value));
        self
    }

    /// The value of the custom attribute with this name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.custom_attributes.iter()
            .find(|(attribute_name, _)| *attribute_name == name)
            .map(|(_, value)| value)
    }

    /// The resolution of the largest level.
    pub fn data_size(&self) -> Vec2<usize> {
        self.data_window.size
    }

    /// All attribute names, channel names, and attribute type names that are stored in the file
    /// and are subject to the name length limit.
    pub fn attribute_names(&self) -> impl Iterator<Item = &Text> {
        let channels = self.channels.list.iter().map(|channel| &channel.name);

        let custom = self.custom_attributes.iter().flat_map(|(name, value)| {
            let type_name = match value {
                AttributeValue::Unknown { type_name, .. } => Some(type_name),
                _ => None,
            };

            std::iter::once(name).chain(type_name)
        });

        channels.chain(custom)
    }

    /// All resolution levels of this part in `LineOrder::Increasing` order.
    /// Scan line parts have exactly one level.
    pub fn levels(&self) -> Vec<LevelInfo> {
        let size = self.data_size();

        match self.blocks {
            Blocks::Tiles(tiles) => match tiles.level_mode {
                LevelMode::Singular => vec![ LevelInfo { index: Vec2(0, 0), size } ],

                LevelMode::MipMap => mip_map_levels(tiles.rounding_mode, size)
                    .map(|(index, size)| LevelInfo { index: Vec2(index, index), size })
                    .collect(),

                LevelMode::RipMap => rip_map_levels(tiles.rounding_mode, size)
                    .map(|(index, size)| LevelInfo { index, size })
                    .collect(),
            },

            Blocks::ScanLines => vec![ LevelInfo { index: Vec2(0, 0), size } ],
        }
    }

    /// The number of decoded bytes of all levels, not respecting subsampling.
    /// For deep parts, the size of the sample count tables.
    pub fn total_pixel_bytes(&self) -> Result<usize> {
        let overflow = || Error::invalid("image byte size exceeding integer maximum");

        let bytes_per_pixel = if self.deep { u32::BYTE_SIZE } else { self.channels.bytes_per_pixel };
        let mut total = 0_usize;

        for level in self.levels() {
            let bytes = level.size.width()
                .checked_mul(level.size.height())
                .and_then(|pixels| pixels.checked_mul(bytes_per_pixel))
                .ok_or_else(overflow)?;

            total = total.checked_add(bytes).ok_or_else(overflow)?;
        }

        Ok(total)
    }

    /// The blocks in the order the chunks are written, each with its position in the offset table.
    pub fn enumerate_ordered_blocks(&self) -> impl Iterator<Item = (usize, TileIndices)> + Send {
        let mut blocks: Vec<(usize, TileIndices)> = self.blocks_increasing_y_order().enumerate().collect();

        if self.line_order == LineOrder::Decreasing {
            blocks.reverse();
        }

        blocks.into_iter()
    }

    /// All blocks in the order of the offset table: level by level, and within a level row by row.
    pub fn blocks_increasing_y_order(&self) -> impl Iterator<Item = TileIndices> + ExactSizeIterator + DoubleEndedIterator {
        fn tiles_of(level_size: Vec2<usize>, tile_size: Vec2<usize>, level_index: Vec2<usize>) -> impl Iterator<Item = TileIndices> {
            fn divide_and_rest(total_size: usize, block_size: usize) -> impl Iterator<Item = (usize, usize)> {
                let block_count = compute_block_count(total_size, block_size);
                (0..block_count).map(move |block_index| {
                    let position = block_index * block_size;
                    (block_index, block_size.min(total_size - position))
                })
            }

            divide_and_rest(level_size.height(), tile_size.height()).flat_map(move |(y_index, tile_height)|{
                divide_and_rest(level_size.width(), tile_size.width()).map(move |(x_index, tile_width)|{
                    TileIndices {
                        size: Vec2(tile_width, tile_height),
                        location: TileCoordinates { tile_index: Vec2(x_index, y_index), level_index },
                    }
                })
            })
        }

        let tile_size = match self.blocks {
            Blocks::Tiles(tiles) => tiles.tile_size,
            Blocks::ScanLines => Vec2(self.data_size().width(), self.compression.scan_lines_per_block()),
        };

        let vec: Vec<TileIndices> = self.levels().into_iter()
            .flat_map(|level| tiles_of(level.size, tile_size, level.index))
            .collect();

        vec.into_iter()
    }

    /// Calculate the pixel rectangle of a block inside its level. Is not negative and starts at `0`.
    pub fn get_absolute_block_pixel_coordinates(&self, tile: TileCoordinates) -> Result<IntegerBounds> {
        match self.blocks {
            Blocks::Tiles(tiles) => {
                let level_size = self.level_size(tile.level_index)?;
                tile.to_data_indices(tiles.tile_size, level_size)
            },

            Blocks::ScanLines => {
                if tile.tile_index.x() != 0 || tile.level_index != Vec2(0, 0) {
                    return Err(Error::invalid("scan line block index"));
                }

                let (y, height) = calculate_block_position_and_size(
                    self.data_size().height(),
                    self.compression.scan_lines_per_block(),
                    tile.tile_index.y()
                )?;

                Ok(IntegerBounds {
                    position: Vec2(0, usize_to_i32(y, "scan line block position")?),
                    size: Vec2(self.data_size().width(), height)
                })
            },
        }
    }

    /// Calculate the position of a block in the global infinite 2D space of a file. May be negative.
    pub fn get_block_data_window_pixel_coordinates(&self, tile: TileCoordinates) -> Result<IntegerBounds> {
        let block = self.get_absolute_block_pixel_coordinates(tile)?;

        Ok(IntegerBounds {
            position: Vec2(
                block.position.x() + self.data_window.position.x(),
                block.position.y() + self.data_window.position.y(),
            ),
            size: block.size,
        })
    }

    /// Convert the y coordinate of a scan line chunk to its block index.
    /// Fails if the coordinate is not the first line of a block.
    pub fn get_scan_line_block_tile_coordinates(&self, y_coordinate: i32) -> Result<TileCoordinates> {
        let lines_per_block = self.compression.scan_lines_per_block() as i64;
        let relative = y_coordinate as i64 - self.data_window.position.y() as i64;

        if relative < 0 || relative >= self.data_size().height() as i64 || relative % lines_per_block != 0 {
            return Err(Error::invalid("scan line block y coordinate"));
        }

        Ok(TileCoordinates {
            tile_index: Vec2(0, (relative / lines_per_block) as usize),
            level_index: Vec2(0, 0),
        })
    }

    /// The resolution of the level with the specified index.
    pub fn level_size(&self, level_index: Vec2<usize>) -> Result<Vec2<usize>> {
        self.levels().into_iter()
            .find(|level| level.index == level_index)
            .map(|level| level.size)
            .ok_or_else(|| Error::invalid("level index"))
    }

    /// The position of a block in the offset table of this part.
    /// Fails for coordinates that do not address a block of this part.
    pub fn chunk_index_of(&self, tile: TileCoordinates) -> Result<usize> {
        match self.blocks {
            Blocks::ScanLines => {
                if tile.tile_index.x() != 0 || tile.level_index != Vec2(0, 0) || tile.tile_index.y() >= self.chunk_count {
                    return Err(Error::invalid("scan line block index"));
                }

                Ok(tile.tile_index.y())
            },

            Blocks::Tiles(tiles) => {
                let mut preceding = 0;

                for level in self.levels() {
                    let tile_counts = Vec2(
                        compute_block_count(level.size.width(), tiles.tile_size.width()),
                        compute_block_count(level.size.height(), tiles.tile_size.height()),
                    );

                    if level.index == tile.level_index {
                        if tile.tile_index.x() >= tile_counts.x() || tile.tile_index.y() >= tile_counts.y() {
                            return Err(Error::invalid("tile index"));
                        }

                        return Ok(preceding + tile.tile_index.y() * tile_counts.x() + tile.tile_index.x());
                    }

                    preceding += tile_counts.area();
                }

                Err(Error::invalid("tile level index"))
            },
        }
    }

    /// Maximum byte length of an uncompressed or compressed flat block, used for validation.
    pub fn max_block_byte_size(&self) -> usize {
        self.channels.bytes_per_pixel * match self.blocks {
            Blocks::Tiles(tiles) => tiles.tile_size.area(),
            Blocks::ScanLines => self.compression.scan_lines_per_block() * self.data_size().width()
        }
    }

    /// Validate this instance.
    /// Sets `long_names` if any name in this header is longer than 31 bytes.
    pub fn validate(&self, version: &Version, long_names: &mut bool, pedantic: bool) -> UnitResult {
        self.data_window.validate()?;
        self.display_window.validate()?;

        if self.chunk_count != compute_chunk_count(self.compression, self.data_size(), self.blocks) {
            return Err(Error::header("chunk count not matching data size"));
        }

        if let Blocks::Tiles(tiles) = self.blocks {
            tiles.validate()?;
        }

        if !version.multipart && !version.deep && self.blocks.has_tiles() != version.tiled {
            return Err(Error::header("tiled flag not matching the block type of the single part"));
        }

        if version.multipart && self.name.is_none() {
            return Err(missing_attribute("name"));
        }

        if self.deep && !version.deep {
            return Err(Error::header("deep part requires the deep flag"));
        }

        let allow_sampling = !self.deep && !self.blocks.has_tiles();
        self.channels.validate(allow_sampling, self.data_window, pedantic)?;

        for channel in &self.channels.list {
            channel.name.validate_name(long_names)?;
        }

        for (index, (name, value)) in self.custom_attributes.iter().enumerate() {
            name.validate_name(long_names)?;

            if let AttributeValue::Unknown { type_name, .. } = value {
                type_name.validate_name(long_names)?;
            }

            if standard_names::ALL.contains(&name.bytes()) {
                return Err(Error::header(format!("attribute name `{}` is reserved", name)));
            }

            if self.custom_attributes[.. index].iter().any(|(previous, _)| previous == name) {
                return Err(Error::header(format!("duplicate attribute name `{}`", name)));
            }
        }

        if self.deep {
            match self.deep_data_version {
                Some(1) => {},
                Some(other) => return Err(Error::unsupported(format!("deep data version {}", other))),
                None if pedantic => return Err(missing_attribute("deep data version")),
                None => {},
            }

            if !self.compression.supports_deep_data() {
                return Err(Error::header(format!("{} does not support deep data", self.compression)));
            }
        }

        if pedantic {
            if !self.pixel_aspect.is_normal() || self.pixel_aspect < 1.0e-6 || self.pixel_aspect > 1.0e6 {
                return Err(Error::header("pixel aspect ratio"));
            }

            if !self.screen_window_width.is_finite() || self.screen_window_width < 0.0 {
                return Err(Error::header("screen window width"));
            }

            if let Some(name) = &self.name {
                if name.is_empty() {
                    return Err(Error::header("part name must not be empty"));
                }
            }
        }

        Ok(())
    }

    /// A single header, or a list ending with an empty header in multipart files.
    /// The headers are not validated.
    pub fn read_all(read: &mut PeekRead<impl Read>, version: &Version, pedantic: bool) -> Result<Headers> {
        let mut headers = smallvec![ Header::read(read, version, pedantic)? ];

        if version.multipart {
            while !sequence_end::has_come(read)? {
                headers.push(Header::read(read, version, pedantic)?);
            }
        }

        Ok(headers)
    }

    /// The counterpart of `read_all`. Does not validate.
    pub fn write_all(headers: &[Header], write: &mut impl Write, version: &Version) -> UnitResult {
        headers.iter().try_for_each(|header| header.write(write, version))?;

        match version.multipart {
            true => sequence_end::write(write),
            false => Ok(()),
        }
    }

    /// Decode one header, up to and including its terminating zero byte.
    /// Lenient reading keeps custom attributes that fail to decode as `AttributeValue::Unknown`.
    pub fn read(read: &mut PeekRead<impl Read>, version: &Version, pedantic: bool) -> Result<Self> {
        let max_name_len = if pedantic && !version.long_names { 31 } else { 255 };

        let mut standard = StandardAttributes::default();
        let mut custom_attributes: Vec<(Text, AttributeValue)> = Vec::new();

        while !sequence_end::has_come(read)? {
            let (name, type_name, bytes) = attribute::read_raw(read, max_name_len)?;

            if standard_names::ALL.contains(&name.bytes()) {
                standard.insert(&name, AttributeValue::from_bytes(type_name, bytes)?)?;
                continue;
            }

            if custom_attributes.iter().any(|(existing, _)| existing == &name) {
                return Err(Error::header(format!("duplicate attribute name `{}`", name)));
            }

            let value = match AttributeValue::from_bytes(type_name.clone(), bytes.clone()) {
                Err(error) if !pedantic => {
                    log::warn!("keeping malformed attribute `{}` as opaque bytes: {}", name, error);
                    AttributeValue::Unknown { type_name, bytes }
                },

                decoded => decoded?,
            };

            custom_attributes.push((name, value));
        }

        standard.into_header(custom_attributes, version, pedantic)
    }

    /// The part type of this header, as stored in the `type` attribute.
    pub fn block_type(&self) -> BlockType {
        match (self.blocks, self.deep) {
            (Blocks::ScanLines, false) => BlockType::ScanLine,
            (Blocks::Tiles(_), false) => BlockType::Tile,
            (Blocks::ScanLines, true) => BlockType::DeepScanLine,
            (Blocks::Tiles(_), true) => BlockType::DeepTile,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write, version: &Version) -> UnitResult {
        use crate::meta::header::standard_names::*;
        use AttributeValue::*;

        let mut write_attribute = |name: &[u8], value: AttributeValue| {
            attribute::write(&attribute::Text::from_slice_unchecked(name), &value, write)
        };

        if let Blocks::Tiles(tiles) = self.blocks {
            write_attribute(TILES, TileDescription(tiles))?;
        }

        if version.multipart || self.deep {
            write_attribute(BLOCK_TYPE, Text(self.block_type().to_text()))?;
            write_attribute(CHUNKS, I32(usize_to_i32(self.chunk_count, "chunk count")?))?;
        }

        if self.deep {
            write_attribute(DEEP_DATA_VERSION, I32(self.deep_data_version.unwrap_or(1)))?;

            let max_samples = match self.max_samples_per_pixel {
                Some(max) => usize_to_i32(max, "max samples per pixel")?,
                None => -1,
            };

            write_attribute(MAX_SAMPLES, I32(max_samples))?;
        }

        if let Some(name) = &self.name {
            write_attribute(NAME, Text(name.clone()))?;
        }

        write_attribute(CHANNELS, ChannelList(self.channels.clone()))?;
        write_attribute(COMPRESSION, Compression(self.compression))?;
        write_attribute(DATA_WINDOW, IntegerBounds(self.data_window))?;
        write_attribute(DISPLAY_WINDOW, IntegerBounds(self.display_window))?;
        write_attribute(LINE_ORDER, LineOrder(self.line_order))?;
        write_attribute(PIXEL_ASPECT, F32(self.pixel_aspect))?;
        write_attribute(WINDOW_CENTER, FloatVec2(self.screen_window_center))?;
        write_attribute(WINDOW_WIDTH, F32(self.screen_window_width))?;

        for (name, value) in &self.custom_attributes {
            attribute::write(name, value, write)?;
        }

        sequence_end::write(write)
    }
}


/// Attribute names that are decoded into the fields of a `Header`.
/// Attributes with any other name are custom attributes.
pub mod standard_names {
    /// `tiles`
    pub const TILES: &[u8] = b"tiles";
    /// `name`
    pub const NAME: &[u8] = b"name";
    /// `type`
    pub const BLOCK_TYPE: &[u8] = b"type";
    /// `version`
    pub const DEEP_DATA_VERSION: &[u8] = b"version";
    /// `chunkCount`
    pub const CHUNKS: &[u8] = b"chunkCount";
    /// `maxSamplesPerPixel`
    pub const MAX_SAMPLES: &[u8] = b"maxSamplesPerPixel";
    /// `channels`
    pub const CHANNELS: &[u8] = b"channels";
    /// `compression`
    pub const COMPRESSION: &[u8] = b"compression";
    /// `dataWindow`
    pub const DATA_WINDOW: &[u8] = b"dataWindow";
    /// `displayWindow`
    pub const DISPLAY_WINDOW: &[u8] = b"displayWindow";
    /// `lineOrder`
    pub const LINE_ORDER: &[u8] = b"lineOrder";
    /// `pixelAspectRatio`
    pub const PIXEL_ASPECT: &[u8] = b"pixelAspectRatio";
    /// `screenWindowCenter`
    pub const WINDOW_CENTER: &[u8] = b"screenWindowCenter";
    /// `screenWindowWidth`
    pub const WINDOW_WIDTH: &[u8] = b"screenWindowWidth";

    /// Every name above.
    pub const ALL: &[&[u8]] = &[
        TILES, NAME, BLOCK_TYPE, DEEP_DATA_VERSION, CHUNKS, MAX_SAMPLES, CHANNELS,
        COMPRESSION, DATA_WINDOW, DISPLAY_WINDOW, LINE_ORDER, PIXEL_ASPECT, WINDOW_CENTER, WINDOW_WIDTH,
    ];
}


/// The standard attributes of a header while it is being read.
#[derive(Default)]
struct StandardAttributes {
    tiles: Option<TileDescription>,
    block_type: Option<BlockType>,
    deep_data_version: Option<i32>,
    chunk_count: Option<usize>,
    max_samples_per_pixel: Option<usize>,
    channels: Option<ChannelList>,
    compression: Option<Compression>,
    data_window: Option<IntegerBounds>,
    display_window: Option<IntegerBounds>,
    line_order: Option<LineOrder>,
    pixel_aspect: Option<f32>,
    screen_window_center: Option<Vec2<f32>>,
    screen_window_width: Option<f32>,
    name: Option<Text>,
}

impl StandardAttributes {

    /// Fails if the value has another type than the name requires.
    fn insert(&mut self, name: &Text, value: AttributeValue) -> UnitResult {
        use self::standard_names as names;
        use crate::meta::attribute::AttributeValue as Value;

        match (name.bytes(), value) {
            (names::TILES, Value::TileDescription(tiles)) => self.tiles = Some(tiles),
            (names::NAME, Value::Text(text)) => self.name = Some(text),
            (names::BLOCK_TYPE, Value::Text(text)) => self.block_type = Some(BlockType::parse(&text)?),
            (names::DEEP_DATA_VERSION, Value::I32(version)) => self.deep_data_version = Some(version),
            (names::CHUNKS, Value::I32(count)) => self.chunk_count = Some(i32_to_usize(count, "negative chunk count")?),

            // negative when the writer did not know the maximum
            (names::MAX_SAMPLES, Value::I32(max)) => self.max_samples_per_pixel = usize::try_from(max).ok(),

            (names::CHANNELS, Value::ChannelList(channels)) => self.channels = Some(channels),
            (names::COMPRESSION, Value::Compression(compression)) => self.compression = Some(compression),
            (names::DATA_WINDOW, Value::IntegerBounds(window)) => self.data_window = Some(window),
            (names::DISPLAY_WINDOW, Value::IntegerBounds(window)) => self.display_window = Some(window),
            (names::LINE_ORDER, Value::LineOrder(order)) => self.line_order = Some(order),
            (names::PIXEL_ASPECT, Value::F32(aspect)) => self.pixel_aspect = Some(aspect),
            (names::WINDOW_CENTER, Value::FloatVec2(center)) => self.screen_window_center = Some(center),
            (names::WINDOW_WIDTH, Value::F32(width)) => self.screen_window_width = Some(width),

            (_, value) => return Err(Error::attribute(format!(
                "attribute `{}` has unexpected type `{}`",
                name, String::from_utf8_lossy(value.type_name())
            ))),
        }

        Ok(())
    }

    /// Check that the attributes the version requires are present, and fill in defaults for the others.
    fn into_header(self, custom_attributes: Vec<(Text, AttributeValue)>, version: &Version, pedantic: bool) -> Result<Header> {
        let compression = self.compression.ok_or_else(|| missing_attribute("compression"))?;
        let data_window = self.data_window.ok_or_else(|| missing_attribute("data window"))?;
        let display_window = self.display_window.ok_or_else(|| missing_attribute("display window"))?;
        let channels = self.channels.ok_or_else(|| missing_attribute("channels"))?;
        let line_order = self.line_order.ok_or_else(|| missing_attribute("line order"))?;

        if pedantic {
            let viewing = [
                ("pixel aspect ratio", self.pixel_aspect.is_some()),
                ("screen window center", self.screen_window_center.is_some()),
                ("screen window width", self.screen_window_width.is_some()),
            ];

            if let Some(&(missing, _)) = viewing.iter().find(|(_, present)| !present) {
                return Err(missing_attribute(missing));
            }
        }

        if (version.multipart || version.deep) && self.block_type.is_none() {
            return Err(missing_attribute("type"));
        }

        if version.multipart && self.chunk_count.is_none() {
            return Err(missing_attribute("chunk count"));
        }

        let tiled = match self.block_type {
            None => version.tiled,
            Some(block_type) => matches!(block_type, BlockType::Tile | BlockType::DeepTile),
        };

        let blocks = match (tiled, self.tiles) {
            (false, _) => Blocks::ScanLines,
            (true, Some(tiles)) => Blocks::Tiles(tiles),
            (true, None) => return Err(missing_attribute("tiles")),
        };

        // sizes must be sane before computing the chunk count
        data_window.validate()?;
        if let Blocks::Tiles(tiles) = blocks { tiles.validate()?; }

        let chunk_count = compute_chunk_count(compression, data_window.size, blocks);
        if self.chunk_count.map_or(false, |stored| stored != chunk_count) {
            return Err(Error::header("chunk count not matching data size"));
        }

        Ok(Header {
            channels, compression, blocks, line_order,
            data_window, display_window,

            pixel_aspect: self.pixel_aspect.unwrap_or(1.0),
            screen_window_center: self.screen_window_center.unwrap_or(Vec2(0.0, 0.0)),
            screen_window_width: self.screen_window_width.unwrap_or(1.0),

            name: self.name,
            deep: self.block_type.map_or(false, BlockType::is_deep),
            deep_data_version: self.deep_data_version,
            max_samples_per_pixel: self.max_samples_per_pixel,

            chunk_count,
            custom_attributes,
        })
    }
}
