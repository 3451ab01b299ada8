use super::*;

// a count byte `n >= 0` repeats the next byte `n + 1` times,
// a count byte `n < 0` is followed by `-n` literal bytes
const MIN_REPETITIONS: usize = 3;
const MAX_REPETITIONS: usize = 128;
const MAX_LITERALS: usize = 127;


/// Run length encoding of the whole block, ignoring the channel layout.
pub struct Rle;

impl BlockCompressor for Rle {
    fn compress(&self, _: &ChannelList, uncompressed: Bytes<'_>, _: IntegerBounds) -> Result<ByteVec> {
        compress_bytes(uncompressed)
    }

    fn decompress(&self, _: &ChannelList, compressed: Bytes<'_>, _: IntegerBounds, expected_byte_size: usize, _: bool) -> Result<ByteVec> {
        decompress_bytes(compressed, expected_byte_size)
    }
}


pub fn compress_bytes(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    let bytes = predictor::encode(uncompressed);
    let mut runs = Vec::with_capacity(bytes.len());
    let mut rest = bytes.as_slice();

    while let Some(&first) = rest.first() {
        let repetitions = rest.iter().take(MAX_REPETITIONS)
            .take_while(|&&byte| byte == first).count();

        let length = if repetitions >= MIN_REPETITIONS {
            runs.push((repetitions - 1) as u8);
            runs.push(first);
            repetitions
        }
        else {
            let literals = literal_count(rest, repetitions);
            runs.push((literals as u8).wrapping_neg());
            runs.extend_from_slice(&rest[.. literals]);
            literals
        };

        rest = &rest[length ..];
    }

    Ok(runs)
}

/// Literal bytes continue until three equal bytes follow.
fn literal_count(bytes: &[u8], at_least: usize) -> usize {
    (at_least .. bytes.len().min(MAX_LITERALS))
        .find(|&index| matches!(bytes.get(index .. index + 3), Some(&[a, b, c]) if a == b && b == c))
        .unwrap_or_else(|| bytes.len().min(MAX_LITERALS))
}

pub fn decompress_bytes(mut runs: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let mut bytes = Vec::with_capacity(expected_byte_size.min(1 << 16));

    while let Some((&count, rest)) = runs.split_first() {
        let count = count as i8;

        runs = if count < 0 {
            let length = usize::from(count.unsigned_abs());
            if length > rest.len() { return Err(truncated()); }

            let (literals, rest) = rest.split_at(length);
            if bytes.len() + length > expected_byte_size { return Err(too_long()); }

            bytes.extend_from_slice(literals);
            rest
        }
        else {
            let (&value, rest) = rest.split_first().ok_or_else(truncated)?;

            let end = bytes.len() + count as usize + 1;
            if end > expected_byte_size { return Err(too_long()); }

            bytes.resize(end, value);
            rest
        };
    }

    if bytes.len() != expected_byte_size {
        return Err(Error::compression("run length data shorter than the block"));
    }

    Ok(predictor::decode(&bytes))
}

fn truncated() -> Error { Error::compression("run length data ends unexpectedly") }
fn too_long() -> Error { Error::compression("run length data exceeding the block") }
