use super::*;


/// Zlib compression of the whole block, ignoring the channel layout.
/// Blocks of one line and blocks of sixteen lines are compressed the same way.
pub struct Zip;

impl BlockCompressor for Zip {
    fn compress(&self, _: &ChannelList, uncompressed: Bytes<'_>, _: IntegerBounds) -> Result<ByteVec> {
        compress_bytes(uncompressed)
    }

    fn decompress(&self, _: &ChannelList, compressed: Bytes<'_>, _: IntegerBounds, expected_byte_size: usize, _: bool) -> Result<ByteVec> {
        decompress_bytes(compressed, expected_byte_size)
    }
}


pub fn decompress_bytes(data: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    Ok(predictor::decode(&inflate(data, expected_byte_size)?))
}

pub fn compress_bytes(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    Ok(deflate(&predictor::encode(uncompressed), 4))
}

/// Zlib compression without any preprocessing.
pub fn deflate(bytes: Bytes<'_>, level: u8) -> ByteVec {
    miniz_oxide::deflate::compress_to_vec_zlib(bytes, level)
}

/// Zlib decompression without any postprocessing.
/// Never produces more than the expected number of bytes, and fails if it produces less.
pub fn inflate(bytes: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let options = zune_inflate::DeflateOptions::default()
        .set_limit(expected_byte_size)
        .set_size_hint(expected_byte_size);

    let decompressed = zune_inflate::DeflateDecoder::new_with_options(bytes, options)
        .decode_zlib()
        .map_err(|_| Error::compression("zlib-compressed data malformed"))?;

    if decompressed.len() != expected_byte_size {
        return Err(Error::compression("zlib-compressed data size"));
    }

    Ok(decompressed)
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip(){
        let data: Vec<u8> = (0 .. 3000_u32).map(|i| (i / 3 % 200) as u8).collect();
        let compressed = compress_bytes(&data).unwrap();

        assert!(compressed.len() < data.len());
        assert_eq!(decompress_bytes(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn output_is_bounded(){
        let compressed = deflate(&[7_u8; 5000], 4);
        assert!(inflate(&compressed, 100).is_err());
        assert!(inflate(&compressed, 6000).is_err());
        assert_eq!(inflate(&compressed, 5000).unwrap(), vec![7_u8; 5000]);
    }

    #[test]
    fn garbage_is_rejected(){
        assert!(decompress_bytes(&[1, 2, 3, 4, 5, 6], 32).is_err());
        assert!(decompress_bytes(&[], 32).is_err());
    }
}
