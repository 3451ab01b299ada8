
//! Error type definitions.

use std::borrow::Cow;
use std::io::ErrorKind;
pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::num::TryFromIntError;


/// A result that may contain an exr error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an exr error.
pub type UnitResult = Result<()>;


/// An error that may happen while reading or writing an exr file.
/// Every message is owned by the error and released together with it.
#[derive(Debug)]
pub enum Error {

    /// An argument passed to this library was not usable,
    /// for example a zero-sized image or a mismatching number of components.
    InvalidArgument(Cow<'static, str>),

    /// The byte stream is malformed or ends too early.
    InvalidData(Cow<'static, str>),

    /// The first four bytes are not the exr magic number.
    InvalidMagicNumber,

    /// The header could be parsed, but its contents contradict each other
    /// or a required attribute is missing.
    InvalidHeader(Cow<'static, str>),

    /// A single attribute is malformed, for example its byte size does not match its type.
    InvalidAttribute(Cow<'static, str>),

    /// An offset table entry points outside of the file.
    InvalidOffset(Cow<'static, str>),

    /// A compressed block could not be decoded into exactly the expected number of bytes.
    CompressionFailed(Cow<'static, str>),

    /// No part or layer with the requested name exists.
    LayerNotFound(String),

    /// The file uses a feature this library recognizes but does not implement.
    Unsupported(Cow<'static, str>),

    /// The underlying byte stream could not be read or written.
    Io(IoError),
}

impl Error {

    /// Create an error of the variant `InvalidData`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidData(message.into())
    }

    /// Create an error of the variant `Unsupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Unsupported(message.into())
    }

    /// Create an error of the variant `InvalidArgument`.
    pub(crate) fn argument(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Create an error of the variant `InvalidHeader`.
    pub(crate) fn header(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidHeader(message.into())
    }

    /// Create an error of the variant `InvalidAttribute`.
    pub(crate) fn attribute(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidAttribute(message.into())
    }

    /// Create an error of the variant `CompressionFailed`.
    pub(crate) fn compression(message: impl Into<Cow<'static, str>>) -> Self {
        Error::CompressionFailed(message.into())
    }

    /// Create an error of the variant `InvalidOffset`.
    pub(crate) fn offset(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidOffset(message.into())
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::invalid("reference to missing bytes")
        }
        else {
            Error::Io(error)
        }
    }
}

// TODO use `usize::try_from(x)?` everywhere
impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Error::invalid("invalid size")
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(message) => write!(formatter, "invalid argument: {}", message),
            Error::InvalidData(message) => write!(formatter, "invalid exr data: {}", message),
            Error::InvalidMagicNumber => write!(formatter, "not an exr file: magic number mismatch"),
            Error::InvalidHeader(message) => write!(formatter, "invalid exr header: {}", message),
            Error::InvalidAttribute(message) => write!(formatter, "invalid attribute: {}", message),
            Error::InvalidOffset(message) => write!(formatter, "invalid offset table: {}", message),
            Error::CompressionFailed(message) => write!(formatter, "compression failed: {}", message),
            Error::LayerNotFound(name) => write!(formatter, "layer not found: `{}`", name),
            Error::Unsupported(message) => write!(formatter, "not supported: {}", message),
            Error::Io(err) => err.fmt(formatter),
        }
    }
}


/// Return error on invalid range.
#[inline]
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_i32(value: usize, error_message: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::unsupported(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn u64_to_usize(value: u64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Widening conversion, cannot fail on any supported platform.
#[inline]
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    value as u64
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eof_becomes_invalid_data(){
        let error: Error = IoError::new(ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(error, Error::InvalidData(_)), "{:?}", error);

        let error: Error = IoError::new(ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(error, Error::Io(_)), "{:?}", error);
    }

    #[test]
    fn checked_conversions(){
        assert_eq!(i32_to_usize(7, "x").unwrap(), 7);
        assert!(i32_to_usize(-1, "x").is_err());
        assert!(usize_to_i32(usize::MAX, "x").is_err());
    }
}
