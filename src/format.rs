//! Compression format tags.
//!
//! Every plugin declares which compression format(s) it can handle in terms
//! of these tags. The tags also have a stable integer encoding used at the
//! C-compatible plugin module boundary.
//!
//! # Design Principles
//!
//! - **Type safety**: an enum instead of stringly-typed format names
//! - **Zero-cost**: small `Copy` type
//! - **Stable ABI**: explicit integer tags that never change meaning

use std::ffi::c_int;

/// Compression formats recognized by the library.
///
/// A "wildcard" query (match any format) is expressed as
/// `Option<CompressionFormat>` with `None` at the API surface; the wildcard
/// expands to [`CompressionFormat::ALL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CompressionFormat {
    /// AV1 (AOMedia Video 1).
    Av1 = 1,
    /// H.265/HEVC.
    Hevc = 2,
    /// H.264/AVC.
    Avc = 3,
    /// JPEG.
    Jpeg = 4,
    /// JPEG 2000.
    Jpeg2000 = 5,
    /// H.266/VVC.
    Vvc = 6,
    /// Uncompressed raw frames.
    Uncompressed = 7,
}

impl CompressionFormat {
    /// The fixed set of recognized formats a wildcard query expands to.
    pub const ALL: [CompressionFormat; 7] = [
        Self::Av1,
        Self::Hevc,
        Self::Avc,
        Self::Jpeg,
        Self::Jpeg2000,
        Self::Vvc,
        Self::Uncompressed,
    ];

    /// Get the human-readable name of the format.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Av1 => "AV1",
            Self::Hevc => "H.265/HEVC",
            Self::Avc => "H.264/AVC",
            Self::Jpeg => "JPEG",
            Self::Jpeg2000 => "JPEG 2000",
            Self::Vvc => "H.266/VVC",
            Self::Uncompressed => "uncompressed",
        }
    }

    /// Stable integer tag used at the plugin module boundary.
    #[inline]
    pub fn to_raw(self) -> c_int {
        self as c_int
    }

    /// Decode an integer tag from the plugin module boundary.
    ///
    /// Returns `None` for tags this library does not recognize (e.g. a tag
    /// introduced by a newer host).
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            1 => Some(Self::Av1),
            2 => Some(Self::Hevc),
            3 => Some(Self::Avc),
            4 => Some(Self::Jpeg),
            5 => Some(Self::Jpeg2000),
            6 => Some(Self::Vvc),
            7 => Some(Self::Uncompressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
