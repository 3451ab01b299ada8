//! Parts of a file, each with its own header and pixels.

use crate::error::{Error, Result, UnitResult};
use crate::image::{DeepImage, Image};
use crate::meta::header::Header;


/// One header with the decoded pixels of that part.
#[derive(Clone, Debug, PartialEq)]
pub struct Part {

    /// The header of this part, with the requested sample types of each channel.
    pub header: Header,

    /// The pixels of this part.
    pub content: Content,
}

/// The pixels of a part.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {

    /// A flat image with all of its resolution levels.
    Flat(Image),

    /// A deep scan line image.
    Deep(DeepImage),
}


impl Part {

    /// A flat part.
    pub fn flat(header: Header, image: Image) -> Self {
        Part { header, content: Content::Flat(image) }
    }

    /// A deep part. The header must be marked as deep.
    pub fn deep(header: Header, image: DeepImage) -> Self {
        Part { header, content: Content::Deep(image) }
    }

    /// A zeroed part as described by the header, with the requested sample types.
    pub fn allocate(header: Header) -> Self {
        let content =
            if header.deep { Content::Deep(DeepImage::allocate(&header)) }
            else { Content::Flat(Image::allocate(&header)) };

        Part { header, content }
    }

    /// The flat image of this part, or an error for deep parts.
    pub fn flat_image(&self) -> Result<&Image> {
        match &self.content {
            Content::Flat(image) => Ok(image),
            Content::Deep(_) => Err(Error::argument("part contains deep data")),
        }
    }

    /// Take the flat image of this part, or return an error for deep parts.
    pub fn into_flat_image(self) -> Result<Image> {
        match self.content {
            Content::Flat(image) => Ok(image),
            Content::Deep(_) => Err(Error::argument("part contains deep data")),
        }
    }

    /// Take the deep image of this part, or return an error for flat parts.
    pub fn into_deep_image(self) -> Result<DeepImage> {
        match self.content {
            Content::Deep(image) => Ok(image),
            Content::Flat(_) => Err(Error::argument("part contains flat data")),
        }
    }

    /// Check whether the pixels can be written with the header.
    pub fn validate(&self) -> UnitResult {
        match &self.content {
            Content::Flat(image) => image.validate(&self.header),
            Content::Deep(image) => image.validate(&self.header),
        }
    }
}


/// Find the part with the name. Unnamed parts never match.
pub fn find_part_by_name<'h>(headers: &'h [Header], name: &str) -> Result<(usize, &'h Header)> {
    headers.iter().enumerate()
        .find(|(_, header)| header.name.as_ref().map_or(false, |part_name| *part_name == name))
        .ok_or_else(|| Error::LayerNotFound(name.to_string()))
}

/// The channel name prefixes before the last `.`, in order of first appearance.
/// Channels without a prefix belong to no layer.
pub fn layer_names(header: &Header) -> Vec<String> {
    let mut layers: Vec<String> = Vec::new();

    for channel in &header.channels.list {
        let name = channel.name.to_string();

        if let Some(dot) = name.rfind('.') {
            let layer = &name[.. dot];
            if !layers.iter().any(|existing| existing == layer) {
                layers.push(layer.to_string());
            }
        }
    }

    layers
}

/// Copy the file header, taking only the requested sample types from the other header.
/// The channels of both headers must have equal names and stored types.
pub fn request_header(file: &Header, requested: &Header) -> Result<Header> {
    if file.channels.list.len() != requested.channels.list.len() {
        return Err(Error::argument("requested channel count not matching the file"));
    }

    let mut header = file.clone();

    for (channel, request) in header.channels.list.iter_mut().zip(&requested.channels.list) {
        if channel.name != request.name || channel.sample_type != request.sample_type {
            return Err(Error::argument(format!("requested channel `{}` not matching the file", request.name)));
        }

        if !channel.sample_type.converts_to(request.requested_type) {
            return Err(Error::argument(format!(
                "channel `{}` cannot be converted from {:?} to {:?}",
                channel.name, channel.sample_type, request.requested_type
            )));
        }

        channel.requested_type = request.requested_type;
    }

    Ok(header)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Vec2;
    use crate::meta::attribute::{ChannelDescription, SampleType};
    use smallvec::smallvec;

    fn header() -> Header {
        Header::new(Vec2(2, 2), smallvec![
            ChannelDescription::named("diffuse.B", SampleType::F16),
            ChannelDescription::named("diffuse.G", SampleType::F16),
            ChannelDescription::named("mask", SampleType::U32),
            ChannelDescription::named("a.b.c", SampleType::F32),
        ])
    }

    #[test]
    fn layers_in_order_of_appearance(){
        assert_eq!(layer_names(&header()), vec![ "diffuse".to_string(), "a.b".to_string() ]);
    }

    #[test]
    fn missing_names_are_reported(){
        let headers = [ header().with_name("beauty".into()), header() ];
        assert_eq!(find_part_by_name(&headers, "beauty").unwrap().0, 0);
        assert!(matches!(find_part_by_name(&headers, "depth"), Err(Error::LayerNotFound(name)) if name == "depth"));
    }

    #[test]
    fn requested_types_must_convert(){
        let file = header();

        let mut widened = file.clone();
        widened.channels.list[0].requested_type = SampleType::F32;
        assert_eq!(request_header(&file, &widened).unwrap().channels.list[0].requested_type, SampleType::F32);

        let mut integer = file.clone();
        integer.channels.list[2].requested_type = SampleType::F32;
        assert!(matches!(request_header(&file, &integer), Err(Error::InvalidArgument(_))));

        let mut renamed = file.clone();
        renamed.channels.list[1].name = "diffuse.R".into();
        assert!(request_header(&file, &renamed).is_err());
    }
}
