#[macro_use]
extern crate bencher;

extern crate exr_codec;
use exr_codec::prelude::*;

use bencher::Bencher;


fn image(compression: Compression) -> (Header, Image) {
    let size = Vec2(512, 256);

    let header = Header::new(size, smallvec![
        ChannelDescription::named("B", SampleType::F16),
        ChannelDescription::named("G", SampleType::F16),
        ChannelDescription::named("R", SampleType::F16),
        ChannelDescription::named("Z", SampleType::F32),
    ])
        .with_encoding(compression, Blocks::ScanLines, LineOrder::Increasing);

    let gradient = |channel: usize| -> Vec<f32> {
        (0 .. size.area())
            .map(|index| ((index % size.width()) as f32 * 0.01 + (index / size.width()) as f32 * 0.02 + channel as f32).sin())
            .collect()
    };

    let image = Image::from_channels(size, vec![
        Samples::F32(gradient(0)), Samples::F32(gradient(1)),
        Samples::F32(gradient(2)), Samples::F32(gradient(3)),
    ]);

    (header, image)
}

fn write(bench: &mut Bencher, compression: Compression, options: WriteOptions) {
    let (header, image) = image(compression);
    let parts = [ Part::flat(header, image) ];

    bench.iter(||{
        bencher::black_box(save_parts(&parts, &options).unwrap());
    })
}

fn read(bench: &mut Bencher, compression: Compression, options: ReadOptions) {
    let (header, image) = image(compression);
    let bytes = save_image(&image, &header).unwrap();

    bench.iter(||{
        bencher::black_box(load_parts(&bytes, &options).unwrap());
    })
}

fn write_zip_parallel(bench: &mut Bencher) { write(bench, Compression::ZIP16, WriteOptions::default()) }
fn write_zip_sequential(bench: &mut Bencher) { write(bench, Compression::ZIP16, WriteOptions::default().non_parallel()) }
fn write_piz_parallel(bench: &mut Bencher) { write(bench, Compression::PIZ, WriteOptions::default()) }
fn write_b44_parallel(bench: &mut Bencher) { write(bench, Compression::B44, WriteOptions::default()) }

fn read_uncompressed(bench: &mut Bencher) { read(bench, Compression::Uncompressed, ReadOptions::default()) }
fn read_rle_parallel(bench: &mut Bencher) { read(bench, Compression::RLE, ReadOptions::default()) }
fn read_zip_parallel(bench: &mut Bencher) { read(bench, Compression::ZIP16, ReadOptions::default()) }
fn read_zip_sequential(bench: &mut Bencher) { read(bench, Compression::ZIP16, ReadOptions::default().non_parallel()) }
fn read_piz_parallel(bench: &mut Bencher) { read(bench, Compression::PIZ, ReadOptions::default()) }
fn read_pxr24_parallel(bench: &mut Bencher) { read(bench, Compression::PXR24, ReadOptions::default()) }

benchmark_group!(compression,
    write_zip_parallel,
    write_zip_sequential,
    write_piz_parallel,
    write_b44_parallel,
    read_uncompressed,
    read_rle_parallel,
    read_zip_parallel,
    read_zip_sequential,
    read_piz_parallel,
    read_pxr24_parallel
);

benchmark_main!(compression);
