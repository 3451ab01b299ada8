//! Files with multiple parts, selected by index or by name.

extern crate exr_codec;
extern crate rand;

use exr_codec::prelude::*;
use rand::Rng;


fn named_part(name: &str, size: Vec2<usize>, compression: Compression, blocks: Blocks) -> Part {
    let header = Header::new(size, smallvec![
        ChannelDescription::named("R", SampleType::F16),
        ChannelDescription::named("Z", SampleType::F32),
    ])
        .with_name(name.into())
        .with_encoding(compression, blocks, LineOrder::Increasing);

    let mut random = rand::rng();
    let pixels = size.area();

    let image = Image::from_channels(size, vec![
        Samples::F16((0 .. pixels).map(|_| f16::from_f32(random.random_range(-4.0 .. 4.0))).collect()),
        Samples::F32((0 .. pixels).map(|_| random.random_range(0.0 .. 1.0e6)).collect()),
    ]);

    Part::flat(header, image)
}

fn tiles() -> Blocks {
    Blocks::Tiles(TileDescription {
        tile_size: Vec2(16, 16),
        level_mode: LevelMode::Singular,
        rounding_mode: RoundingMode::Down,
    })
}

fn three_parts() -> Vec<Part> {
    vec![
        named_part("beauty", Vec2(40, 30), Compression::ZIP16, Blocks::ScanLines),
        named_part("depth", Vec2(17, 50), Compression::PIZ, tiles()),
        named_part("mask", Vec2(8, 3), Compression::RLE, Blocks::ScanLines),
    ]
}

fn content_of(part: &Part) -> &Image {
    part.flat_image().expect("flat part expected")
}


#[test]
fn all_parts_round_trip(){
    let parts = three_parts();
    let bytes = save_parts(&parts, &WriteOptions::default()).unwrap();

    let version = parse_version(&bytes).unwrap();
    assert!(version.multipart);
    assert!(!version.tiled);

    for options in &[ ReadOptions::default(), ReadOptions::default().non_parallel().pedantic() ] {
        let decoded = load_parts(&bytes, options).unwrap();
        assert_eq!(decoded.len(), parts.len());

        for (decoded, original) in decoded.iter().zip(&parts) {
            assert_eq!(decoded.header.name, original.header.name);
            assert_eq!(content_of(decoded), content_of(original));
        }
    }
}

#[test]
fn headers_keep_their_order(){
    let bytes = save_parts(&three_parts(), &WriteOptions::default().non_parallel()).unwrap();
    let headers = parse_headers(&bytes).unwrap();

    let names: Vec<String> = headers.iter()
        .map(|header| header.name.as_ref().unwrap().to_string())
        .collect();

    assert_eq!(names, vec![ "beauty", "depth", "mask" ]);
    assert!(headers[1].blocks.has_tiles());
    assert_eq!(headers[2].compression, Compression::RLE);
}

#[test]
fn single_part_by_name(){
    let parts = three_parts();
    let bytes = save_parts(&parts, &WriteOptions::default()).unwrap();

    let depth = load_part_by_name(&bytes, "depth").unwrap();
    assert_eq!(content_of(&depth), content_of(&parts[1]));

    let mask = load_part_by_name(&bytes, "mask").unwrap();
    assert_eq!(content_of(&mask), content_of(&parts[2]));
}

#[test]
fn load_image_selects_by_header_name(){
    let parts = three_parts();
    let bytes = save_parts(&parts, &WriteOptions::default()).unwrap();

    let image = load_image(&bytes, &parts[2].header).unwrap();
    assert_eq!(&image, content_of(&parts[2]));

    let unnamed = Header { name: None, .. parts[0].header.clone() };
    let first = load_image(&bytes, &unnamed).unwrap();
    assert_eq!(&first, content_of(&parts[0]));
}

#[test]
fn unknown_names_are_reported(){
    let bytes = save_parts(&three_parts(), &WriteOptions::default()).unwrap();

    match load_part_by_name(&bytes, "specular") {
        Err(Error::LayerNotFound(name)) => assert_eq!(name, "specular"),
        other => panic!("expected a missing layer, got {:?}", other.map(|part| part.header.name)),
    }
}

#[test]
fn duplicate_names_are_rejected(){
    let parts = vec![
        named_part("beauty", Vec2(4, 4), Compression::Uncompressed, Blocks::ScanLines),
        named_part("beauty", Vec2(2, 2), Compression::Uncompressed, Blocks::ScanLines),
    ];

    assert!(matches!(save_parts(&parts, &WriteOptions::default()), Err(Error::InvalidHeader(_))));
}

#[test]
fn multiple_parts_require_names(){
    let mut parts = three_parts();
    parts[1].header.name = None;

    assert!(save_parts(&parts, &WriteOptions::default()).is_err());
}

#[test]
fn flat_and_deep_parts_together(){
    let deep_header = Header::new(Vec2(3, 2), smallvec![ ChannelDescription::named("Z", SampleType::F32) ])
        .with_name("points".into())
        .with_encoding(Compression::ZIP1, Blocks::ScanLines, LineOrder::Increasing)
        .with_deep(None);

    let deep = DeepImage {
        size: Vec2(3, 2),
        channel_names: vec![ "Z".into() ],
        sample_offsets: vec![ vec![ 0, 2, 3 ], vec![ 1, 1, 1 ] ],
        channels: vec![ vec![ Samples::F32(vec![ 0.5, 1.5, 2.5 ]), Samples::F32(vec![ 9.0 ]) ] ],
    };

    let parts = vec![
        named_part("color", Vec2(5, 5), Compression::ZIP1, Blocks::ScanLines),
        Part::deep(deep_header, deep.clone()),
    ];

    let bytes = save_parts(&parts, &WriteOptions::default()).unwrap();

    let version = parse_version(&bytes).unwrap();
    assert!(version.multipart && version.deep);

    let decoded = load_parts(&bytes, &ReadOptions::default()).unwrap();
    assert_eq!(content_of(&decoded[0]), content_of(&parts[0]));
    assert_eq!(decoded[1].content, Content::Deep(deep.clone()));

    assert_eq!(load_deep(&bytes).unwrap(), deep);
    assert!(matches!(load_image(&bytes, &parts[1].header), Err(Error::InvalidArgument(_))));

    let points = load_part_by_name(&bytes, "points").unwrap().into_deep_image().unwrap();
    assert_eq!(points.pixel_samples(0, Vec2(1, 0)), Some(vec![ 0.5, 1.5 ]));
}

#[test]
fn layers_of_the_first_part(){
    let header = Header::new(Vec2(2, 2), smallvec![
        ChannelDescription::named("A", SampleType::F16),
        ChannelDescription::named("diffuse.B", SampleType::F16),
        ChannelDescription::named("diffuse.G", SampleType::F16),
        ChannelDescription::named("diffuse.R", SampleType::F16),
        ChannelDescription::named("normal.X", SampleType::F32),
    ]);

    let image = Image::allocate(&header);
    let bytes = save_image(&image, &header).unwrap();

    assert_eq!(list_layers(&bytes).unwrap(), vec![ "diffuse".to_string(), "normal".to_string() ]);
    assert!(matches!(load_rgba_layer(&bytes, "specular"), Err(Error::LayerNotFound(_))));

    let diffuse = load_rgba_layer(&bytes, "diffuse").unwrap();
    assert_eq!((diffuse.width, diffuse.height), (2, 2));
    assert_eq!(&diffuse.pixels[.. 4], &[ 0.0, 0.0, 0.0, 1.0 ]);
}
