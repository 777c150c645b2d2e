
//! Error type definitions.

use std::borrow::Cow;
use std::io::ErrorKind;
pub use std::io::Error as IoError;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::num::TryFromIntError;


// Export types

/// A result that may contain a webp error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a webp error.
pub type UnitResult = Result<()>;


/// An error that may happen while decoding or encoding a webp file.
/// Distinguishes between three types of errors:
/// unsupported features, malformed data, and file system errors.
#[derive(Debug)]
pub enum Error {

    /// Decoding or encoding was cancelled by the caller.
    Aborted,

    /// The contents of the file are well-formed but use a feature that this crate does not decode,
    /// for example an inter-coded lossy frame.
    NotSupported(Cow<'static, str>),

    /// The contents of the file are malformed,
    /// or the arguments passed to an encoder are not valid.
    Invalid(Cow<'static, str>),

    /// The underlying byte sink failed.
    Io(IoError),
}


/// The riff signature or the form type is missing.
pub const MISSING_HEADER: &'static str = "riff header";

/// The declared riff size does not fit into the buffer.
pub const SHORT_PAYLOAD: &'static str = "riff payload size";

/// Fewer than eight bytes remain for the next chunk header.
pub const SHORT_CHUNK_HEADER: &'static str = "chunk header";

/// A chunk declares more bytes than its parent contains.
pub const CHUNK_TOO_LONG: &'static str = "chunk length";

/// The chunk list ended before any image chunk was found.
pub const NO_IMAGE_CHUNK: &'static str = "image chunk missing";

/// A bit reader ran past the end of its source.
pub const UNEXPECTED_END_OF_STREAM: &'static str = "unexpected end of stream";

/// A canonical code is over-subscribed or incomplete.
pub const INVALID_HUFFMAN_TREE: &'static str = "huffman tree";

/// The code lengths do not fit the alphabet.
pub const INVALID_CODE_LENGTHS: &'static str = "huffman code lengths";

/// A lossless transform type appeared twice.
pub const REPEATED_TRANSFORM: &'static str = "repeated transform";

/// The color cache size or a cache index is out of range.
pub const INVALID_COLOR_CACHE: &'static str = "color cache";

/// A back reference points before the first or after the last pixel.
pub const INVALID_LZ77: &'static str = "back reference";

/// A palette holds more than 256 colors.
pub const PALETTE_TOO_LARGE: &'static str = "palette with more than 256 colors";

/// A lossless bitstream declares a version other than zero.
pub const INVALID_VERSION: &'static str = "lossless version";


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Whether this error describes malformed data, as opposed to an unsupported feature.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Invalid(_))
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
            Error::Io(err) => err.fmt(formatter),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
            Error::Aborted => write!(formatter, "cancelled"),
        }
    }
}

/// Return error on invalid range.
#[inline]
pub(crate) fn u32_to_usize(value: u32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_u32(value: usize, error_message: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid(error_message))
}
