//! Capability traits for decoder and encoder plugins.
//!
//! Inside the library a plugin is a trait object: [`DecoderPlugin`] or
//! [`EncoderPlugin`]. Built-in (statically linked) backends implement these
//! traits directly; dynamically loaded modules are wrapped by the adapters in
//! [`super::abi`], which is the only place the flat C-compatible descriptor
//! layout exists.

use crate::error::{Error, Result};
use crate::format::CompressionFormat;
use crate::options::{DecodeOptions, EncodeOptions};

/// Which capability a plugin provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PluginKind {
    /// The plugin decodes bitstreams.
    Decoder,
    /// The plugin encodes frames.
    Encoder,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decoder => write!(f, "decoder"),
            Self::Encoder => write!(f, "encoder"),
        }
    }
}

/// A minimal interleaved frame carrier crossing the dispatch seam.
///
/// Pixel buffer management proper lives outside this crate; this type exists
/// so the [`Decoder`]/[`Encoder`] traits have a concrete payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Interleaved channels per pixel (1 = gray, 3 = RGB, 4 = RGBA).
    pub channels: u8,
    /// Interleaved sample data, row-major, `width * height * channels` bytes.
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Expected length of `data` for the declared geometry.
    #[inline]
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * usize::from(self.channels)
    }
}

/// A single decoding session created by a [`DecoderPlugin`].
pub trait Decoder {
    /// Decode one complete bitstream into a frame.
    fn decode(&mut self, bitstream: &[u8], options: &DecodeOptions) -> Result<RawFrame>;
}

/// A single encoding session created by an [`EncoderPlugin`].
pub trait Encoder {
    /// Encode one frame into a bitstream.
    fn encode(&mut self, frame: &RawFrame, options: &EncodeOptions) -> Result<Vec<u8>>;

    /// Set a named encoder parameter (e.g. `"quality"`, `"lossless"`).
    ///
    /// The default implementation rejects every name.
    fn set_parameter(&mut self, name: &str, _value: &str) -> Result<()> {
        Err(Error::UnsupportedParameter(name.to_string()))
    }
}

/// Descriptor and factory for a decoder backend.
///
/// Registered descriptors are owned by the registry; descriptors sourced from
/// a dynamically loaded module must be unregistered before that module is
/// released.
pub trait DecoderPlugin: Send + Sync {
    /// Plugin API version this descriptor was written against.
    fn api_version(&self) -> u32;

    /// Short stable identifier, distinct from the display name.
    ///
    /// Name-based decoder resolution only considers plugins with
    /// `api_version() >= 3`; name identification did not exist before that.
    fn id_name(&self) -> &str;

    /// Long display name, derived at query time. May embed third-party
    /// library version strings.
    fn display_name(&self) -> String;

    /// Minimum packed host version this plugin requires, if it declares one.
    ///
    /// Only meaningful when `api_version() >= 4`; the loader ignores it for
    /// older plugins.
    fn minimum_host_version(&self) -> Option<u32> {
        None
    }

    /// Match priority for a compression format; 0 means unsupported, higher
    /// wins.
    fn format_priority(&self, format: CompressionFormat) -> u8;

    /// One-time initialization hook, run on registration.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Cleanup hook, run on unregistration.
    fn deinit(&self) {}

    /// Create a decoding session.
    fn new_decoder(&self) -> Result<Box<dyn Decoder>>;
}

/// Descriptor and factory for an encoder backend.
pub trait EncoderPlugin: Send + Sync {
    /// Plugin API version this descriptor was written against.
    fn api_version(&self) -> u32;

    /// Short stable identifier, distinct from the display name.
    fn id_name(&self) -> &str;

    /// Long display name, derived at query time.
    fn display_name(&self) -> String;

    /// Minimum packed host version this plugin requires, if it declares one.
    /// Only meaningful when `api_version() >= 4`.
    fn minimum_host_version(&self) -> Option<u32> {
        None
    }

    /// The single compression format this encoder produces.
    fn format(&self) -> CompressionFormat;

    /// Selection priority; higher wins when several encoders produce the
    /// same format.
    fn priority(&self) -> i32;

    /// Whether lossy encoding is available.
    fn supports_lossy(&self) -> bool;

    /// Whether lossless encoding is available.
    fn supports_lossless(&self) -> bool;

    /// One-time initialization hook, run on registration.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Cleanup hook, run on unregistration.
    fn deinit(&self) {}

    /// Create an encoding session.
    fn new_encoder(&self) -> Result<Box<dyn Encoder>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_kind_display() {
        assert_eq!(format!("{}", PluginKind::Decoder), "decoder");
        assert_eq!(format!("{}", PluginKind::Encoder), "encoder");
    }

    #[test]
    fn test_raw_frame_expected_len() {
        let frame = RawFrame {
            width: 4,
            height: 3,
            channels: 3,
            data: vec![0; 36],
        };
        assert_eq!(frame.expected_len(), 36);
        assert_eq!(frame.data.len(), frame.expected_len());
    }
}
