//! Versioned public option structs.
//!
//! [`DecodeOptions`] and [`EncodeOptions`] grow new fields release over
//! release. Each field belongs to a *version tier* (the tier at which it was
//! introduced), and each struct instance carries the tier its creator knows
//! about in `version`. Copying between instances of different tiers must only
//! transplant the fields both sides know, which is what
//! [`DecodeOptions::copy_bounded`] and [`EncodeOptions::copy_bounded`]
//! implement: a descending walk over per-tier copy routines, from
//! `min(dst.version, src.version)` down to tier 1.
//!
//! Both structs are `#[non_exhaustive]`: callers obtain instances through the
//! provided constructors (which populate every field with its documented
//! default) and never build them literally, so the structs can keep growing
//! without breaking callers.
//!
//! # Adding a tier
//!
//! Bump the `VERSION` constant, append the new fields, and append one entry
//! to the tier-copier table. Earlier entries are never touched.

use crate::error::{Error, Result};
use std::sync::Arc;

// ============================================================================
// Shared option payload types
// ============================================================================

/// Chroma downsampling algorithm preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChromaDownsampling {
    /// Nearest-neighbor sampling.
    NearestNeighbor,
    /// Box average of contributing pixels.
    #[default]
    Average,
    /// Sharp YUV downsampling.
    SharpYuv,
}

/// Chroma upsampling algorithm preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChromaUpsampling {
    /// Nearest-neighbor sampling.
    NearestNeighbor,
    /// Bilinear interpolation.
    #[default]
    Bilinear,
}

/// Preferred chroma conversion algorithms.
///
/// Defaults: [`ChromaDownsampling::Average`], [`ChromaUpsampling::Bilinear`],
/// and the preference treated as a hint rather than a requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ColorConversionOptions {
    /// Preferred algorithm when chroma has to be downsampled.
    pub preferred_chroma_downsampling: ChromaDownsampling,
    /// Preferred algorithm when chroma has to be upsampled.
    pub preferred_chroma_upsampling: ChromaUpsampling,
    /// If set, fail instead of falling back when the preferred algorithm is
    /// unavailable.
    pub only_use_preferred_chroma_algorithm: bool,
}

/// How an alpha channel is treated during color conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AlphaComposition {
    /// Keep the alpha plane untouched.
    #[default]
    Keep,
    /// Premultiply color samples by alpha.
    Premultiply,
    /// Drop the alpha plane.
    Drop,
}

/// Extended color conversion controls (decode tier 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ColorConversionExt {
    /// Alpha handling during conversion.
    pub alpha_composition: AlphaComposition,
}

/// A CICP (nclx) color profile attached to encoder output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NclxProfile {
    /// CICP color primaries code.
    pub color_primaries: u16,
    /// CICP transfer characteristics code.
    pub transfer_characteristics: u16,
    /// CICP matrix coefficients code.
    pub matrix_coefficients: u16,
    /// Full-range flag.
    pub full_range: bool,
}

/// Image orientation written into encoder output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Orientation {
    /// No transformation.
    #[default]
    Normal,
    /// Mirror horizontally.
    FlipHorizontally,
    /// Rotate 180 degrees.
    Rotate180,
    /// Mirror vertically.
    FlipVertically,
    /// Mirror horizontally, then rotate 90 degrees counter-clockwise.
    FlipHorizontallyThenRotateCcw,
    /// Rotate 90 degrees clockwise.
    RotateCw,
    /// Mirror horizontally, then rotate 90 degrees clockwise.
    FlipHorizontallyThenRotateCw,
    /// Rotate 90 degrees counter-clockwise.
    RotateCcw,
}

/// Decoding step reported through a [`ProgressSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressStep {
    /// Overall decode progress.
    Total,
    /// Per-tile loading progress.
    LoadTile,
}

/// Receiver for decoder progress reports.
///
/// All methods default to no-ops so implementors can pick the events they
/// care about.
pub trait ProgressSink: Send + Sync {
    /// A step started; `max` is the value `update` will reach at completion.
    fn start(&self, _step: ProgressStep, _max: u64) {}
    /// Progress within a running step.
    fn update(&self, _step: ProgressStep, _progress: u64) {}
    /// A step finished.
    fn end(&self, _step: ProgressStep) {}
}

/// Cooperative cancellation check polled by decoders; returns `true` to
/// cancel.
pub type CancelFn = Arc<dyn Fn() -> bool + Send + Sync>;

// ============================================================================
// DecodeOptions
// ============================================================================

/// Options passed to decoder invocations.
///
/// Fields are grouped by the version tier that introduced them. Fields above
/// an instance's `version` must be treated as absent by consumers; they hold
/// their defaults, never garbage.
#[non_exhaustive]
#[derive(Clone)]
pub struct DecodeOptions {
    /// The highest tier the creator of this instance knows about.
    pub version: u8,

    // --- tier 1 ---
    /// Ignore rotation/mirroring/cropping transformations.
    pub ignore_transformations: bool,
    /// Progress report receiver.
    pub progress: Option<Arc<dyn ProgressSink>>,

    // --- tier 2 ---
    /// Convert HDR content to 8 bit per channel.
    pub convert_hdr_to_8bit: bool,

    // --- tier 3 ---
    /// Reject bitstreams that violate the standard instead of tolerating
    /// them.
    pub strict_decoding: bool,

    // --- tier 4 ---
    /// Pin decoding to the plugin with this id name instead of resolving by
    /// priority.
    pub decoder_id: Option<String>,

    // --- tier 5 ---
    /// Preferred chroma conversion algorithms.
    pub color_conversion_options: ColorConversionOptions,

    // --- tier 6 ---
    /// Cooperative cancellation check.
    pub cancel: Option<CancelFn>,

    // --- tier 7 ---
    /// Extended color conversion controls.
    pub color_conversion_ext: Option<ColorConversionExt>,

    // --- tier 8 ---
    /// Ignore the edit list of image sequences.
    pub ignore_sequence_editlist: bool,
}

/// One tier's copy routine: transplant exactly the fields that tier
/// introduced.
type DecodeTierCopy = fn(&mut DecodeOptions, &DecodeOptions);

/// Tier-copier table, index 0 = tier 1. Appending a tier means appending one
/// entry here; earlier entries never change.
const DECODE_TIER_COPIERS: [DecodeTierCopy; DecodeOptions::VERSION as usize] = [
    |dst, src| {
        dst.ignore_transformations = src.ignore_transformations;
        dst.progress = src.progress.clone();
    },
    |dst, src| dst.convert_hdr_to_8bit = src.convert_hdr_to_8bit,
    |dst, src| dst.strict_decoding = src.strict_decoding,
    |dst, src| dst.decoder_id = src.decoder_id.clone(),
    |dst, src| dst.color_conversion_options = src.color_conversion_options,
    |dst, src| dst.cancel = src.cancel.clone(),
    |dst, src| dst.color_conversion_ext = src.color_conversion_ext,
    |dst, src| dst.ignore_sequence_editlist = src.ignore_sequence_editlist,
];

impl DecodeOptions {
    /// Highest version tier this library implements.
    pub const VERSION: u8 = 8;

    /// Create options at the current version tier with all fields at their
    /// documented defaults.
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            ignore_transformations: false,
            progress: None,
            convert_hdr_to_8bit: false,
            strict_decoding: false,
            decoder_id: None,
            color_conversion_options: ColorConversionOptions::default(),
            cancel: None,
            color_conversion_ext: None,
            ignore_sequence_editlist: false,
        }
    }

    /// Create default options declaring the given version tier.
    ///
    /// All fields (including those above `version`) are populated with their
    /// defaults; only the declared tier changes.
    pub fn with_version(version: u8) -> Result<Self> {
        if version == 0 || version > Self::VERSION {
            return Err(Error::InvalidParameterValue(format!(
                "decoding options version {version} not in 1..={}",
                Self::VERSION
            )));
        }
        let mut options = Self::new();
        options.version = version;
        Ok(options)
    }

    /// Copy fields from `src` bounded by the lower of the two declared
    /// versions.
    ///
    /// Walks the tier-copier table from `min(self.version, src.version)` down
    /// to tier 1. Fields above that tier keep their current values in `self`,
    /// and `self.version` itself is never modified. A `None` source is a
    /// no-op.
    pub fn copy_bounded(&mut self, src: Option<&DecodeOptions>) {
        let Some(src) = src else { return };
        let n = usize::from(self.version.min(src.version)).min(DECODE_TIER_COPIERS.len());
        for copy in DECODE_TIER_COPIERS[..n].iter().rev() {
            copy(self, src);
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("version", &self.version)
            .field("ignore_transformations", &self.ignore_transformations)
            .field("progress", &self.progress.is_some())
            .field("convert_hdr_to_8bit", &self.convert_hdr_to_8bit)
            .field("strict_decoding", &self.strict_decoding)
            .field("decoder_id", &self.decoder_id)
            .field("color_conversion_options", &self.color_conversion_options)
            .field("cancel", &self.cancel.is_some())
            .field("color_conversion_ext", &self.color_conversion_ext)
            .field("ignore_sequence_editlist", &self.ignore_sequence_editlist)
            .finish()
    }
}

// ============================================================================
// EncodeOptions
// ============================================================================

/// Options passed to encoder invocations.
///
/// Same versioning contract as [`DecodeOptions`].
#[non_exhaustive]
#[derive(Clone)]
pub struct EncodeOptions {
    /// The highest tier the creator of this instance knows about.
    pub version: u8,

    // --- tier 1 ---
    /// Store the alpha channel if the input has one.
    pub save_alpha_channel: bool,

    // --- tier 2 ---
    /// Write files readable by the macOS system decoder.
    pub mac_os_compatibility_workaround: bool,

    // --- tier 3 ---
    /// Write both an ICC and an nclx color box when both are available.
    pub save_two_colr_boxes_when_icc_and_nclx_available: bool,

    // --- tier 4 ---
    /// nclx profile to attach to the output.
    pub output_nclx_profile: Option<NclxProfile>,

    // --- tier 5 ---
    /// Suppress the nclx box entirely for macOS compatibility.
    pub macos_compatibility_workaround_no_nclx_profile: bool,

    // --- tier 6 ---
    /// Orientation to record in the output.
    pub image_orientation: Orientation,

    // --- tier 7 ---
    /// Preferred chroma conversion algorithms.
    pub color_conversion_options: ColorConversionOptions,
}

/// One tier's copy routine for [`EncodeOptions`].
type EncodeTierCopy = fn(&mut EncodeOptions, &EncodeOptions);

/// Tier-copier table, index 0 = tier 1.
const ENCODE_TIER_COPIERS: [EncodeTierCopy; EncodeOptions::VERSION as usize] = [
    |dst, src| dst.save_alpha_channel = src.save_alpha_channel,
    |dst, src| dst.mac_os_compatibility_workaround = src.mac_os_compatibility_workaround,
    |dst, src| {
        dst.save_two_colr_boxes_when_icc_and_nclx_available =
            src.save_two_colr_boxes_when_icc_and_nclx_available;
    },
    |dst, src| dst.output_nclx_profile = src.output_nclx_profile,
    |dst, src| {
        dst.macos_compatibility_workaround_no_nclx_profile =
            src.macos_compatibility_workaround_no_nclx_profile;
    },
    |dst, src| dst.image_orientation = src.image_orientation,
    |dst, src| dst.color_conversion_options = src.color_conversion_options,
];

impl EncodeOptions {
    /// Highest version tier this library implements.
    pub const VERSION: u8 = 7;

    /// Create options at the current version tier with all fields at their
    /// documented defaults.
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            save_alpha_channel: true,
            mac_os_compatibility_workaround: false,
            save_two_colr_boxes_when_icc_and_nclx_available: false,
            output_nclx_profile: None,
            macos_compatibility_workaround_no_nclx_profile: false,
            image_orientation: Orientation::Normal,
            color_conversion_options: ColorConversionOptions::default(),
        }
    }

    /// Create default options declaring the given version tier.
    pub fn with_version(version: u8) -> Result<Self> {
        if version == 0 || version > Self::VERSION {
            return Err(Error::InvalidParameterValue(format!(
                "encoding options version {version} not in 1..={}",
                Self::VERSION
            )));
        }
        let mut options = Self::new();
        options.version = version;
        Ok(options)
    }

    /// Copy fields from `src` bounded by the lower of the two declared
    /// versions. See [`DecodeOptions::copy_bounded`].
    pub fn copy_bounded(&mut self, src: Option<&EncodeOptions>) {
        let Some(src) = src else { return };
        let n = usize::from(self.version.min(src.version)).min(ENCODE_TIER_COPIERS.len());
        for copy in ENCODE_TIER_COPIERS[..n].iter().rev() {
            copy(self, src);
        }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EncodeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeOptions")
            .field("version", &self.version)
            .field("save_alpha_channel", &self.save_alpha_channel)
            .field(
                "mac_os_compatibility_workaround",
                &self.mac_os_compatibility_workaround,
            )
            .field(
                "save_two_colr_boxes_when_icc_and_nclx_available",
                &self.save_two_colr_boxes_when_icc_and_nclx_available,
            )
            .field("output_nclx_profile", &self.output_nclx_profile)
            .field(
                "macos_compatibility_workaround_no_nclx_profile",
                &self.macos_compatibility_workaround_no_nclx_profile,
            )
            .field("image_orientation", &self.image_orientation)
            .field("color_conversion_options", &self.color_conversion_options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DecodeOptions::new();
        assert_eq!(options.version, DecodeOptions::VERSION);
        assert!(!options.ignore_transformations);
        assert!(options.progress.is_none());
        assert!(!options.strict_decoding);
        assert_eq!(
            options.color_conversion_options.preferred_chroma_downsampling,
            ChromaDownsampling::Average
        );
        assert_eq!(
            options.color_conversion_options.preferred_chroma_upsampling,
            ChromaUpsampling::Bilinear
        );

        let options = EncodeOptions::new();
        assert_eq!(options.version, EncodeOptions::VERSION);
        assert!(options.save_alpha_channel);
        assert_eq!(options.image_orientation, Orientation::Normal);
    }

    #[test]
    fn test_with_version_bounds() {
        assert!(DecodeOptions::with_version(0).is_err());
        assert!(DecodeOptions::with_version(DecodeOptions::VERSION + 1).is_err());
        assert_eq!(DecodeOptions::with_version(3).unwrap().version, 3);

        assert!(matches!(
            EncodeOptions::with_version(0),
            Err(Error::InvalidParameterValue(_))
        ));
    }

    #[test]
    fn test_copy_bounded_none_is_noop() {
        let mut dst = DecodeOptions::new();
        dst.copy_bounded(None);
        assert!(!dst.ignore_transformations);
        assert_eq!(dst.version, DecodeOptions::VERSION);
    }

    #[test]
    fn test_copy_bounded_does_not_touch_version() {
        let mut dst = DecodeOptions::with_version(2).unwrap();
        let mut src = DecodeOptions::new();
        src.strict_decoding = true;
        dst.copy_bounded(Some(&src));
        assert_eq!(dst.version, 2);
        // Tier 3 field stays at its default; dst only declared tier 2.
        assert!(!dst.strict_decoding);
    }

    #[test]
    fn test_tier_table_is_complete() {
        assert_eq!(DECODE_TIER_COPIERS.len(), DecodeOptions::VERSION as usize);
        assert_eq!(ENCODE_TIER_COPIERS.len(), EncodeOptions::VERSION as usize);
    }
}
