//! Little endian values, and byte streams that know their position.

pub use ::std::io::{Read, Write};

use std::convert::TryFrom;
use std::io::{ErrorKind, Seek, SeekFrom};
use ::half::f16;
use half::slice::HalfFloatSliceExt;
use lebe::prelude::*;

use crate::error::{Error, IoError, IoResult, Result, UnitResult, i32_to_usize, usize_to_i32, usize_to_u64};


/// Values stored in a file as little endian bytes.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes of one value in a file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read one value.
    fn read_le(read: &mut impl Read) -> Result<Self>;

    /// Write one value.
    fn write_le(self, write: &mut impl Write) -> UnitResult;

    /// Fill the slice completely, or fail.
    fn read_slice_le(read: &mut impl Read, values: &mut [Self]) -> UnitResult;

    /// Write all values of the slice.
    fn write_slice_le(write: &mut impl Write, values: &[Self]) -> UnitResult;

    /// Read `count` values. Memory grows only as far as the stream actually contains values,
    /// so a corrupt count in a truncated file cannot allocate much.
    fn read_vec_le(read: &mut impl Read, count: usize) -> Result<Vec<Self>> {
        let step = ((1 << 16) / Self::BYTE_SIZE.max(1)).max(1);
        let mut values = Vec::with_capacity(count.min(step));

        while values.len() < count {
            let start = values.len();
            let end = count.min(start + step);

            values.resize(end, Self::default());
            Self::read_slice_le(read, &mut values[start ..])?;
        }

        Ok(values)
    }

    /// Write the number of values as an `i32`, followed by the values.
    fn write_sized_slice_le(write: &mut impl Write, values: &[Self]) -> UnitResult {
        usize_to_i32(values.len(), "too many values")?.write_le(write)?;
        Self::write_slice_le(write, values)
    }

    /// Read an `i32` count followed by that many values.
    /// Negative counts, and counts above `max_count`, are invalid.
    fn read_sized_vec_le(read: &mut impl Read, max_count: usize, purpose: &'static str) -> Result<Vec<Self>> {
        let count = i32_to_usize(i32::read_le(read)?, purpose)?;

        if count > max_count {
            return Err(Error::invalid(purpose));
        }

        Self::read_vec_le(read, count)
    }
}

macro_rules! little_endian_data {
    ($($kind: ty),*) => { $(
        impl Data for $kind {
            fn read_le(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            fn write_le(self, write: &mut impl Write) -> UnitResult {
                Ok(write.write_as_little_endian(&self)?)
            }

            fn read_slice_le(read: &mut impl Read, values: &mut [Self]) -> UnitResult {
                Ok(read.read_from_little_endian_into(values)?)
            }

            fn write_slice_le(write: &mut impl Write, values: &[Self]) -> UnitResult {
                Ok(write.write_as_little_endian(values)?)
            }
        }
    )* };
}

little_endian_data!(u8, u16, u32, i32, u64, f32, f64);

// stored as the bits of the half
impl Data for f16 {
    fn read_le(read: &mut impl Read) -> Result<Self> {
        Ok(f16::from_bits(u16::read_le(read)?))
    }

    fn write_le(self, write: &mut impl Write) -> UnitResult {
        self.to_bits().write_le(write)
    }

    fn read_slice_le(read: &mut impl Read, values: &mut [Self]) -> UnitResult {
        u16::read_slice_le(read, values.reinterpret_cast_mut())
    }

    fn write_slice_le(write: &mut impl Write, values: &[Self]) -> UnitResult {
        u16::write_slice_le(write, values.reinterpret_cast())
    }
}


/// A byte stream that can look at the next byte before consuming it.
#[derive(Debug)]
pub struct PeekRead<T> {
    inner: T,
    next: Option<u8>,
}

impl<T: Read> PeekRead<T> {

    /// Nothing is read yet.
    pub fn new(inner: T) -> Self {
        PeekRead { inner, next: None }
    }

    /// The next byte, which stays in the stream. `None` at the end of the stream.
    pub fn peek_u8(&mut self) -> IoResult<Option<u8>> {
        if self.next.is_none() {
            let mut byte = 0_u8;

            match self.inner.read_exact(std::slice::from_mut(&mut byte)) {
                Ok(()) => self.next = Some(byte),
                Err(error) if error.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(error) => return Err(error),
            }
        }

        Ok(self.next)
    }

    /// Consume the next byte if it equals `value`, and tell whether it did.
    pub fn skip_if_eq(&mut self, value: u8) -> IoResult<bool> {
        let found = self.peek_u8()? == Some(value);

        if found {
            self.next = None;
        }

        Ok(found)
    }
}

impl<T: Read> Read for PeekRead<T> {
    fn read(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        match (self.next, buffer.first_mut()) {
            (Some(byte), Some(first)) => {
                *first = byte;
                self.next = None;
                Ok(1)
            },

            _ => self.inner.read(buffer),
        }
    }
}

impl<T: Read> PeekRead<Tracking<T>> {

    /// Bytes consumed so far. A peeked byte is not consumed.
    pub fn byte_position(&self) -> usize {
        self.inner.byte_position() - usize::from(self.next.is_some())
    }
}

impl<T: Read + Seek> PeekRead<Tracking<T>> {

    /// Continue reading at the specified byte.
    pub fn skip_to(&mut self, position: usize) -> IoResult<()> {
        self.inner.seek_read_to(position)?;
        self.next = None;
        Ok(())
    }

    /// The number of bytes in the whole stream.
    pub fn stream_len(&mut self) -> IoResult<usize> {
        self.inner.stream_len()
    }
}


/// Counts the bytes that pass through, so that a writer can come back to an earlier position.
/// The inner stream must only be moved through this wrapper.
#[derive(Debug)]
pub struct Tracking<T> {
    inner: T,
    position: usize,
}

impl<T> Tracking<T> {

    /// Assumes the stream is at its start.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    /// Bytes read or written so far.
    pub fn byte_position(&self) -> usize {
        self.position
    }
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> IoResult<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

impl<T: Read + Seek> Tracking<T> {

    /// Move to `target`. Short distances forward are read and discarded instead of seeking.
    fn seek_read_to(&mut self, target: usize) -> IoResult<()> {
        match target.checked_sub(self.position) {
            Some(0) => {},

            Some(distance) if distance < 16 => {
                let skipped = std::io::copy(&mut (&mut self.inner).take(usize_to_u64(distance)), &mut std::io::sink())?;

                if skipped < usize_to_u64(distance) {
                    return Err(IoError::new(ErrorKind::UnexpectedEof, "cannot skip behind the end"));
                }
            },

            _ => { self.inner.seek(SeekFrom::Start(usize_to_u64(target)))?; },
        }

        self.position = target;
        Ok(())
    }

    /// The length of the stream. Keeps the current position.
    fn stream_len(&mut self) -> IoResult<usize> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(usize_to_u64(self.position)))?;
        Ok(usize::try_from(end).unwrap_or(usize::MAX))
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move to `target`. Moving forward behind the written bytes writes zeroes.
    pub fn seek_write_to(&mut self, target: usize) -> IoResult<()> {
        if target < self.position {
            self.inner.seek(SeekFrom::Start(usize_to_u64(target)))?;
        }
        else if target > self.position {
            let zeroes = usize_to_u64(target - self.position);
            std::io::copy(&mut std::io::repeat(0).take(zeroes), &mut self.inner)?;
        }

        self.position = target;
        Ok(())
    }
}
