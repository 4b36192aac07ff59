//! Host library version encoding.
//!
//! The host version is packed into a single 32-bit integer with major, minor
//! and patch in the top three bytes; the low byte is reserved and zero.
//! Plugins compiled against plugin API version 4 or later may declare the
//! minimum host version they require in this encoding, and the loader
//! compares it against [`NUMERIC_VERSION`] before registering them.

/// Major version of the running library.
pub const VERSION_MAJOR: u32 = 1;

/// Minor version of the running library.
pub const VERSION_MINOR: u32 = 2;

/// Patch version of the running library.
pub const VERSION_PATCH: u32 = 0;

/// Human-readable version string of the running library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Packed numeric version of the running library.
pub const NUMERIC_VERSION: u32 = make_version(VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH);

/// Pack a major/minor/patch triple into the numeric version encoding.
///
/// Each component must fit in one byte; higher bits are truncated.
#[inline]
pub const fn make_version(major: u32, minor: u32, patch: u32) -> u32 {
    ((major & 0xff) << 24) | ((minor & 0xff) << 16) | ((patch & 0xff) << 8)
}

/// Extract the major component from a packed numeric version.
#[inline]
pub const fn version_major(version: u32) -> u32 {
    (version >> 24) & 0xff
}

/// Extract the minor component from a packed numeric version.
#[inline]
pub const fn version_minor(version: u32) -> u32 {
    (version >> 16) & 0xff
}

/// Extract the patch component from a packed numeric version.
#[inline]
pub const fn version_patch(version: u32) -> u32 {
    (version >> 8) & 0xff
}

/// Render a packed numeric version as `major.minor.patch`.
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version_major(version),
        version_minor(version),
        version_patch(version)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let v = make_version(1, 19, 8);
        assert_eq!(version_major(v), 1);
        assert_eq!(version_minor(v), 19);
        assert_eq!(version_patch(v), 8);
        assert_eq!(v & 0xff, 0, "low byte is reserved");
    }

    #[test]
    fn test_numeric_version_matches_components() {
        assert_eq!(version_major(NUMERIC_VERSION), VERSION_MAJOR);
        assert_eq!(version_minor(NUMERIC_VERSION), VERSION_MINOR);
        assert_eq!(version_patch(NUMERIC_VERSION), VERSION_PATCH);
    }

    #[test]
    fn test_ordering_follows_semver() {
        assert!(make_version(1, 2, 0) > make_version(1, 1, 9));
        assert!(make_version(2, 0, 0) > make_version(1, 255, 255));
    }

    #[test]
    fn test_version_string() {
        assert_eq!(version_string(make_version(1, 2, 0)), "1.2.0");
    }
}
