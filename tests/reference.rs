//! Decode files that were written by an independent encoder, see `tests/fixtures/generate.py`,
//! and compare the pixels with the values the files were generated from.

extern crate exr_codec;

use exr_codec::prelude::*;


/// The value of a sample, with the position relative to the data window.
fn expected_value(channel: &str, x: usize, y: usize) -> f64 {
    match channel {
        "G" => if x < 16 && y < 16 { 0.5 } else { (x + 2 * y) as f64 * 0.0625 - 2.0 },
        "L" => if x < 16 && y < 16 { 3.0 } else { (x + 2 * y) as f64 * 0.0625 + 1.0 },
        "Y" => if (x + y) % 11 != 0 { (x + 2 * y) as f64 * 0.0625 + 1.0 } else { 2.0 },

        "Z" => f64::from(
            if y % 5 == 0 { (x * y) as f32 / 7.0 }
            else { (x as f32 * 3.0 - y as f32 * 5.0) / 16.0 }
        ),

        "id" => if y > 52 { 7.0 } else { ((x / 4) * 3 + (y << 24)) as f64 },
        _ => panic!("unexpected channel {}", channel),
    }
}

fn decoded_value(samples: &Samples, index: usize) -> f64 {
    match samples {
        Samples::F16(values) => f64::from(values[index].to_f32()),
        Samples::F32(values) => f64::from(values[index]),
        Samples::U32(values) => f64::from(values[index]),
    }
}

/// Decode the file and compare every sample, allowing the specified relative error for each channel.
fn check(bytes: &[u8], compression: Compression, size: Vec2<usize>, tolerances: &[(&str, f64)]) {
    for options in &[ ReadOptions::default(), ReadOptions::default().non_parallel().pedantic() ] {
        let mut parts = load_parts(bytes, options).expect("reference file not decoded");
        assert_eq!(parts.len(), 1);

        let part = parts.remove(0);
        assert_eq!(part.header.compression, compression);
        assert_eq!(part.header.data_window.position, Vec2(-3, 5));

        let channel_names: Vec<String> = part.header.channels.list.iter().map(|channel| channel.name.to_string()).collect();
        let image = part.into_flat_image().unwrap();
        let level = image.largest_level().unwrap();
        assert_eq!(level.size, size);

        for (name, samples) in channel_names.iter().zip(&level.channels) {
            let &(_, tolerance) = tolerances.iter().find(|(channel, _)| *channel == name.as_str())
                .expect("missing tolerance for channel");

            for y in 0 .. size.height() {
                for x in 0 .. size.width() {
                    let expected = expected_value(name, x, y);
                    let actual = decoded_value(samples, y * size.width() + x);

                    assert!(
                        (expected - actual).abs() <= tolerance * expected.abs().max(1.0),
                        "{}: channel {} at {}, {} is {} instead of {}", compression, name, x, y, actual, expected
                    );
                }
            }
        }
    }
}

const MIXED: [(&str, f64); 3] = [ ("G", 0.0), ("Z", 0.0), ("id", 0.0) ];


#[test]
fn rle(){
    check(include_bytes!("fixtures/rle.exr"), Compression::RLE, Vec2(53, 61), &MIXED);
}

#[test]
fn zip_single_lines(){
    check(include_bytes!("fixtures/zips.exr"), Compression::ZIP1, Vec2(53, 61), &MIXED);
}

#[test]
fn zip_blocks(){
    check(include_bytes!("fixtures/zip.exr"), Compression::ZIP16, Vec2(53, 61), &MIXED);
}

#[test]
fn piz_with_run_length_symbol_above_all_values(){
    check(include_bytes!("fixtures/piz.exr"), Compression::PIZ, Vec2(53, 61), &MIXED);
}

#[test]
fn piz_single_half_channel(){
    check(include_bytes!("fixtures/piz_luminance.exr"), Compression::PIZ, Vec2(64, 47), &[ ("Y", 0.0) ]);
}

#[test]
fn pxr24_rounds_only_floats(){
    check(
        include_bytes!("fixtures/pxr24.exr"), Compression::PXR24, Vec2(53, 61),
        &[ ("G", 0.0), ("Z", 1.0e-4), ("id", 0.0) ]
    );
}

#[test]
fn b44_keeps_smooth_halfs(){
    let tolerances = [ ("L", 1.0e-3), ("Z", 0.0), ("id", 0.0) ];
    check(include_bytes!("fixtures/b44.exr"), Compression::B44, Vec2(53, 61), &tolerances);
    check(include_bytes!("fixtures/b44a.exr"), Compression::B44A, Vec2(53, 61), &tolerances);
}
