//! Lookup tables for channels that are quantized linearly.
//! Such samples are mapped through `exp(x / 8)` before packing
//! and through `8 * log(x)` after unpacking.

use half::f16;
use std::sync::OnceLock;

const TABLE_SIZE: usize = 1 << 16;

/// Maps the bits of a half float to the bits of `exp(x / 8)`.
pub fn exp_table() -> &'static [u16] {
    static TABLE: OnceLock<Vec<u16>> = OnceLock::new();

    TABLE.get_or_init(|| {
        let max_input = 8.0 * f16::MAX.to_f32().ln();

        (0 .. TABLE_SIZE).map(|bits| {
            let value = f16::from_bits(bits as u16);

            let result = if !value.is_finite() { f16::from_f32(0.0) }
                else if value.to_f32() >= max_input { f16::MAX }
                else { f16::from_f32((value.to_f32() / 8.0).exp()) };

            result.to_bits()
        }).collect()
    })
}

/// Maps the bits of a half float to the bits of `8 * log(x)`.
pub fn log_table() -> &'static [u16] {
    static TABLE: OnceLock<Vec<u16>> = OnceLock::new();

    TABLE.get_or_init(|| {
        (0 .. TABLE_SIZE).map(|bits| {
            let value = f16::from_bits(bits as u16);

            let result = if !value.is_finite() || value.to_f32() < 0.0 { f16::from_f32(0.0) }
                else { f16::from_f32(8.0 * value.to_f32().ln()) };

            result.to_bits()
        }).collect()
    })
}
