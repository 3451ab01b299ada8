//! Fuzzy testing.
//! Tries to discover panics with random bytes and with damaged files.
//! The long running variant is marked with `#[ignore]`. To run it, use `cargo test -- --ignored`.

use std::panic::catch_unwind;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

extern crate exr_codec;
use exr_codec::prelude::*;


/// A few small files that cover scan lines, tiles, levels, multiple parts, and deep data.
fn valid_files() -> Vec<Vec<u8>> {
    let channels: SmallVec<[ChannelDescription; 5]> = smallvec![
        ChannelDescription::named("B", SampleType::F16),
        ChannelDescription::named("G", SampleType::F32),
        ChannelDescription::named("R", SampleType::U32),
    ];

    let mip_tiles = Blocks::Tiles(TileDescription {
        tile_size: Vec2(4, 4), level_mode: LevelMode::MipMap, rounding_mode: RoundingMode::Up,
    });

    let mut files = Vec::new();

    for &compression in &[
        Compression::Uncompressed, Compression::RLE, Compression::ZIP1, Compression::ZIP16,
        Compression::PIZ, Compression::PXR24, Compression::B44, Compression::B44A,
    ] {
        let scan_lines = Header::new(Vec2(11, 37), channels.clone())
            .with_encoding(compression, Blocks::ScanLines, LineOrder::Increasing);

        let tiled = Header::new(Vec2(9, 6), channels.clone())
            .with_encoding(compression, mip_tiles, LineOrder::Increasing);

        for header in &[ scan_lines, tiled ] {
            let mut image = Image::allocate(header);

            if let Levels::Singular(level) = &mut image.levels {
                let count = level.channels[0].len();
                level.channels[0] = Samples::F16((0 .. count).map(|index| f16::from_f32(index as f32 * 0.25)).collect());
            }

            files.push(save_image(&image, header).expect("valid image"));
        }
    }

    let deep = Header::new(Vec2(3, 3), smallvec![ ChannelDescription::named("Z", SampleType::F32) ])
        .with_name("deep".into())
        .with_encoding(Compression::ZIP1, Blocks::ScanLines, LineOrder::Increasing)
        .with_deep(None);

    let mut deep_image = DeepImage::allocate(&deep);
    deep_image.sample_offsets[1] = vec![ 1, 3, 3 ];
    deep_image.channels[0][1] = Samples::F32(vec![ 1.0, 2.0, 3.0 ]);

    let flat = Header::new(Vec2(5, 2), channels).with_name("flat".into());

    files.push(save_parts(
        &[ Part::deep(deep.clone(), deep_image), Part::allocate(flat) ],
        &WriteOptions::default()
    ).expect("valid parts"));

    files
}

/// Decode the bytes with every entry point. Returns whether no entry point panicked.
fn decode_without_panic(bytes: &[u8]) -> bool {
    let bytes = bytes.to_vec();

    let result = catch_unwind(move || {
        let _ = parse_headers(&bytes);
        let _ = load_parts(&bytes, &ReadOptions::default());
        let _ = load_parts(&bytes, &ReadOptions::default().non_parallel().pedantic());
        let _ = load_rgba_from_memory(&bytes);
        let _ = load_deep(&bytes);
        let _ = list_layers(&bytes);
    });

    result.is_ok()
}

fn mutate(random: &mut StdRng, file: &mut Vec<u8>) {
    let mutations = random.random_range(1 .. 6);

    for _ in 0 .. mutations {
        match random.random_range(0 .. 4) {
            // flip bits, preferring the headers at the start of the file
            0 | 1 => {
                let position = (random.random::<f32>().powi(4) * file.len() as f32) as usize;
                if let Some(byte) = file.get_mut(position) { *byte ^= random.random::<u8>(); }
            },

            2 => {
                let length = random.random_range(0 .. file.len());
                file.truncate(length);
            },

            _ => {
                let position = random.random_range(0 .. file.len().max(1));
                let value = random.random::<u64>().to_le_bytes();
                for (offset, byte) in value.iter().enumerate() {
                    if let Some(target) = file.get_mut(position + offset) { *target = *byte; }
                }
            },
        }

        if file.is_empty() { break; }
    }
}

fn run(iterations: usize, seed: u64) {
    let files = valid_files();
    let mut random = StdRng::seed_from_u64(seed);
    let mut passed = true;

    for fuzz_index in 0 .. iterations {
        let mut file = files[random.random_range(0 .. files.len())].clone();
        mutate(&mut random, &mut file);

        if decode_without_panic(&file) {
            println!("✓ No Panic: case {}", fuzz_index);
        }
        else {
            println!("✗ Panic: case {}, {} bytes", fuzz_index, file.len());
            passed = false;
        }
    }

    assert!(passed, "A damaged file caused a panic");
}


#[test]
pub fn valid_files_decode(){
    for file in valid_files() {
        assert!(load_parts(&file, &ReadOptions::default().pedantic()).is_ok());
    }
}

#[test]
pub fn random_bytes(){
    let mut random = StdRng::seed_from_u64(17);
    let mut passed = true;

    for length in 0 .. 256 {
        let mut bytes: Vec<u8> = (0 .. length).map(|_| random.random()).collect();

        // most cases should get past the magic number
        if length >= 8 && random.random_bool(0.75) {
            bytes[.. 4].copy_from_slice(&meta::magic_number::BYTES);
            bytes[4 .. 8].copy_from_slice(&[ 2, random.random_range(0 .. 32) << 1, 0, 0 ]);
        }

        passed &= decode_without_panic(&bytes);
    }

    assert!(passed, "Random bytes caused a panic");
}

#[test]
pub fn damaged_files(){
    run(400, 3);
}

#[test]
#[ignore]
pub fn fuzz(){
    println!("started fuzzing");
    run(1 << 18, 92);
}
