//! Invalid files and invalid arguments must produce the matching error kind.

extern crate exr_codec;

use exr_codec::prelude::*;
use exr_codec::io::Data;


fn zeroed_file(compression: Compression) -> (Header, Vec<u8>) {
    let header = Header::new(Vec2(16, 16), smallvec![ ChannelDescription::named("Y", SampleType::F32) ])
        .with_encoding(compression, Blocks::ScanLines, LineOrder::Increasing);

    let bytes = save_image(&Image::allocate(&header), &header).unwrap();
    (header, bytes)
}

/// The byte position of the offset table of a single part file.
/// The first offset always points directly behind the table.
fn offset_table_position(bytes: &[u8], chunk_count: usize) -> usize {
    (8 .. bytes.len() - 8)
        .find(|&position| {
            let offset = u64::read_le(&mut &bytes[position ..]).unwrap();
            offset == (position + chunk_count * u64::BYTE_SIZE) as u64
        })
        .expect("no offset table found")
}

fn read_all(bytes: &[u8]) -> Result<Vec<Part>> {
    load_parts(bytes, &ReadOptions::default().non_parallel())
}


#[test]
fn missing_magic_number(){
    assert!(!is_exr(b"P6 2 2 255"));
    assert!(matches!(read_all(b"not an exr file, but long enough"), Err(Error::InvalidMagicNumber)));
    assert!(matches!(parse_version(&[ 0x76, 0x2f, 0x31, 0x02, 2, 0, 0, 0 ]), Err(Error::InvalidMagicNumber)));
    assert!(matches!(parse_version(&[ 0; 8 ]), Err(Error::InvalidMagicNumber)));
}

#[test]
fn too_few_bytes_for_the_version(){
    assert!(matches!(parse_version(&[]), Err(Error::InvalidData(_))));
    assert!(matches!(parse_version(&[ 0x76, 0x2f, 0x31 ]), Err(Error::InvalidData(_))));
}

#[test]
fn unknown_version_flags(){
    let (_, mut bytes) = zeroed_file(Compression::Uncompressed);
    bytes[5] |= 0b0010_0000;

    assert!(matches!(parse_version(&bytes), Err(Error::Unsupported(_))));
    assert!(matches!(read_all(&bytes), Err(Error::Unsupported(_))));
}

#[test]
fn mismatching_version_argument(){
    let (_, bytes) = zeroed_file(Compression::Uncompressed);
    let mut version = parse_version(&bytes).unwrap();
    assert!(parse_header(&bytes, &version).is_ok());

    version.multipart = true;
    assert!(matches!(parse_header(&bytes, &version), Err(Error::InvalidArgument(_))));
}

#[test]
fn truncated_headers(){
    let (_, bytes) = zeroed_file(Compression::ZIP16);

    for &length in &[ 8, 12, 30, 61 ] {
        let result = read_all(&bytes[.. length]);
        assert!(
            matches!(result, Err(Error::InvalidData(_)) | Err(Error::InvalidHeader(_)) | Err(Error::InvalidAttribute(_))),
            "unexpected result for {} bytes: {:?}", length, result.map(|parts| parts.len())
        );
    }
}

#[test]
fn truncated_pixels(){
    let (_, bytes) = zeroed_file(Compression::Uncompressed);
    let result = read_all(&bytes[.. bytes.len() - 100]);
    assert!(matches!(result, Err(Error::InvalidData(_)) | Err(Error::InvalidOffset(_))));
}

#[test]
fn offset_outside_of_the_file(){
    let (header, mut bytes) = zeroed_file(Compression::Uncompressed);
    let table = offset_table_position(&bytes, header.chunk_count);

    let outside = (bytes.len() as u64 + 7).to_le_bytes();
    bytes[table .. table + 8].copy_from_slice(&outside);

    assert!(matches!(read_all(&bytes), Err(Error::InvalidOffset(_))));
}

#[test]
fn offset_into_the_headers(){
    let (header, mut bytes) = zeroed_file(Compression::Uncompressed);
    let table = offset_table_position(&bytes, header.chunk_count);

    bytes[table .. table + 8].copy_from_slice(&4_u64.to_le_bytes());
    assert!(matches!(read_all(&bytes), Err(Error::InvalidOffset(_))));
}

#[test]
fn corrupted_compressed_pixels(){
    let (header, mut bytes) = zeroed_file(Compression::ZIP16);
    assert_eq!(header.chunk_count, 1);

    let table = offset_table_position(&bytes, header.chunk_count);
    let chunk = table + u64::BYTE_SIZE;

    let y = i32::read_le(&mut &bytes[chunk ..]).unwrap();
    let byte_count = i32::read_le(&mut &bytes[chunk + 4 ..]).unwrap() as usize;
    assert_eq!(y, 0);
    assert!(byte_count < 16 * 16 * 4, "zeroes should be compressed");

    let data = chunk + 8;
    for byte in &mut bytes[data .. data + byte_count] {
        *byte = 0xff;
    }

    assert!(matches!(read_all(&bytes), Err(Error::CompressionFailed(_))));
}

#[test]
fn corrupted_chunk_among_many_stops_all_threads(){
    let (header, mut bytes) = zeroed_file(Compression::ZIP1);
    assert_eq!(header.chunk_count, 16);

    let table = offset_table_position(&bytes, header.chunk_count);
    let chunk = u64::read_le(&mut &bytes[table + 5 * u64::BYTE_SIZE ..]).unwrap() as usize;

    let byte_count = i32::read_le(&mut &bytes[chunk + 4 ..]).unwrap() as usize;
    assert!(byte_count < 16 * 4, "zeroes should be compressed");

    for byte in &mut bytes[chunk + 8 .. chunk + 8 + byte_count] {
        *byte = 0xff;
    }

    for workers in 1 ..= 4 {
        let options = ReadOptions::default().with_worker_count(workers);
        assert!(matches!(load_parts(&bytes, &options), Err(Error::CompressionFailed(_))));
    }

    assert!(matches!(read_all(&bytes), Err(Error::CompressionFailed(_))));
}

#[test]
fn trailing_bytes_only_in_pedantic_mode(){
    let (_, mut bytes) = zeroed_file(Compression::RLE);
    bytes.extend_from_slice(&[ 1, 2, 3 ]);

    assert!(read_all(&bytes).is_ok());
    assert!(load_parts(&bytes, &ReadOptions::default().pedantic()).is_err());
}

#[test]
fn images_above_the_pixel_limit(){
    let (_, bytes) = zeroed_file(Compression::ZIP16);

    let limited = ReadOptions::default().with_max_pixel_bytes(100);
    assert!(matches!(load_parts(&bytes, &limited), Err(Error::InvalidData(_))));
    assert!(load_parts(&bytes, &ReadOptions::default().with_max_pixel_bytes(1 << 20)).is_ok());
}

#[test]
fn unsupported_compression(){
    let header = Header::new(Vec2(8, 8), smallvec![ ChannelDescription::named("Y", SampleType::F16) ])
        .with_encoding(Compression::DWAA(None), Blocks::ScanLines, LineOrder::Increasing);

    let part = Part::flat(header.clone(), Image::allocate(&header));
    let result = save_parts(&[ part ], &WriteOptions::default().non_parallel());
    assert!(matches!(result, Err(Error::Unsupported(_))));
}

#[test]
fn deep_data_requires_a_deep_compression(){
    let header = Header::new(Vec2(2, 2), smallvec![ ChannelDescription::named("Z", SampleType::F32) ])
        .with_encoding(Compression::PIZ, Blocks::ScanLines, LineOrder::Increasing)
        .with_deep(None);

    let part = Part::deep(header.clone(), DeepImage::allocate(&header));
    assert!(matches!(save_parts(&[ part ], &WriteOptions::default()), Err(Error::InvalidHeader(_))));
}

#[test]
fn invalid_arguments(){
    assert!(matches!(save_rgba(&[], 0, 0, 4, true), Err(Error::InvalidArgument(_))));
    assert!(matches!(save_rgba(&[ 0.0; 8 ], 2, 2, 2, true), Err(Error::InvalidArgument(_))));
    assert!(matches!(save_rgba(&[ 0.0; 7 ], 2, 1, 4, true), Err(Error::InvalidArgument(_))));

    let (_, bytes) = zeroed_file(Compression::Uncompressed);
    assert!(matches!(load_parts(&bytes, &ReadOptions::default().with_worker_count(0)), Err(Error::InvalidArgument(_))));
    assert!(matches!(save_parts(&[], &WriteOptions::default()), Err(Error::InvalidArgument(_))));
}

#[test]
fn missing_files_are_io_errors(){
    assert!(matches!(load_rgba("this/file/does/not/exist.exr"), Err(Error::Io(_))));
}
