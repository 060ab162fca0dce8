//! Error codes for disk operations

use core::fmt;

/// Result type for disk operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by device, scanner, validator and formatter operations.
///
/// This is a closed set: every fallible operation in the crate returns one
/// of these by value. Nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid parameter(s)
    BadParam,

    /// Operation requires sector alignment and the address or length is not
    /// sector-aligned
    MisAligned,

    /// Partition offset lies outside the allocatable region
    OutOfRange,

    /// Not enough room on the device for the requested partitions
    NoSpace,

    /// Memory or entropy resource unavailable
    NoMem,

    /// Media read failed
    ReadFailure,

    /// Media write failed
    WriteFailure,

    /// Media erase failed
    EraseFailure,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadParam => write!(f, "Invalid parameter(s)"),
            Self::MisAligned => write!(f, "Sector alignment required"),
            Self::OutOfRange => write!(f, "Partition outside allocatable region"),
            Self::NoSpace => write!(f, "No space for partition"),
            Self::NoMem => write!(f, "Resource allocation failed"),
            Self::ReadFailure => write!(f, "Media read failed"),
            Self::WriteFailure => write!(f, "Media write failed"),
            Self::EraseFailure => write!(f, "Media erase failed"),
        }
    }
}
