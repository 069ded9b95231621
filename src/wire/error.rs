use core::fmt;

/// The error type for parsing and emitting packet representations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The buffer is shorter than the format requires.
    Truncated,

    /// A field contains a value reserved for other protocol versions or variants.
    Unrecognized,

    /// A length or offset field contradicts the actual data.
    Malformed,

    /// The checksum field does not cover the data.
    Checksum,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Error::Truncated => "truncated packet",
            Error::Unrecognized => "unrecognized packet",
            Error::Malformed => "malformed packet",
            Error::Checksum => "checksum error",
        })
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
