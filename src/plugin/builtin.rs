//! Built-in codec backends that ship with the library.
//!
//! These are ordinary [`DecoderPlugin`]/[`EncoderPlugin`] implementations
//! registered during library initialization, before any dynamic modules are
//! scanned. They use a low default priority so an external plugin for the
//! same format takes over automatically.

use super::descriptor::{Decoder, DecoderPlugin, Encoder, EncoderPlugin, RawFrame};
use super::registry::Registry;
use crate::error::{Error, Result};
use crate::format::CompressionFormat;
use crate::options::{DecodeOptions, EncodeOptions};
use std::sync::Arc;

/// Bitstream magic for the uncompressed framing.
const UNCOMPRESSED_MAGIC: &[u8; 4] = b"LUM0";

/// Header: magic + width (u32 LE) + height (u32 LE) + channels (u8).
const UNCOMPRESSED_HEADER_LEN: usize = 4 + 4 + 4 + 1;

/// Default selection priority for built-in backends.
const BUILTIN_PRIORITY: u8 = 10;

// ============================================================================
// Uncompressed decoder
// ============================================================================

/// Built-in decoder for the uncompressed framing.
pub struct UncompressedDecoderPlugin;

impl DecoderPlugin for UncompressedDecoderPlugin {
    fn api_version(&self) -> u32 {
        super::abi::PLUGIN_API_VERSION_MAX
    }

    fn id_name(&self) -> &str {
        "uncompressed"
    }

    fn display_name(&self) -> String {
        format!("built-in uncompressed decoder ({})", crate::version::VERSION)
    }

    fn format_priority(&self, format: CompressionFormat) -> u8 {
        if format == CompressionFormat::Uncompressed {
            BUILTIN_PRIORITY
        } else {
            0
        }
    }

    fn new_decoder(&self) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(UncompressedDecoder))
    }
}

struct UncompressedDecoder;

impl Decoder for UncompressedDecoder {
    fn decode(&mut self, bitstream: &[u8], options: &DecodeOptions) -> Result<RawFrame> {
        if let Some(cancel) = &options.cancel
            && cancel()
        {
            return Err(Error::Decoding("decode cancelled".to_string()));
        }
        if bitstream.len() < UNCOMPRESSED_HEADER_LEN {
            return Err(Error::Decoding("bitstream shorter than header".to_string()));
        }
        if &bitstream[..4] != UNCOMPRESSED_MAGIC {
            return Err(Error::Decoding("bad magic in bitstream".to_string()));
        }
        let width = u32::from_le_bytes(bitstream[4..8].try_into().unwrap());
        let height = u32::from_le_bytes(bitstream[8..12].try_into().unwrap());
        let channels = bitstream[12];
        let frame = RawFrame {
            width,
            height,
            channels,
            data: bitstream[UNCOMPRESSED_HEADER_LEN..].to_vec(),
        };
        if frame.data.len() != frame.expected_len() {
            if options.strict_decoding {
                return Err(Error::Decoding(format!(
                    "payload length {} does not match {}x{}x{}",
                    frame.data.len(),
                    width,
                    height,
                    channels
                )));
            }
            tracing::warn!(
                got = frame.data.len(),
                expected = frame.expected_len(),
                "uncompressed payload length mismatch, continuing"
            );
        }
        Ok(frame)
    }
}

// ============================================================================
// Uncompressed encoder
// ============================================================================

/// Built-in encoder for the uncompressed framing.
pub struct UncompressedEncoderPlugin;

impl EncoderPlugin for UncompressedEncoderPlugin {
    fn api_version(&self) -> u32 {
        super::abi::PLUGIN_API_VERSION_MAX
    }

    fn id_name(&self) -> &str {
        "uncompressed"
    }

    fn display_name(&self) -> String {
        format!("built-in uncompressed encoder ({})", crate::version::VERSION)
    }

    fn format(&self) -> CompressionFormat {
        CompressionFormat::Uncompressed
    }

    fn priority(&self) -> i32 {
        i32::from(BUILTIN_PRIORITY)
    }

    fn supports_lossy(&self) -> bool {
        false
    }

    fn supports_lossless(&self) -> bool {
        true
    }

    fn new_encoder(&self) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(UncompressedEncoder))
    }
}

struct UncompressedEncoder;

impl Encoder for UncompressedEncoder {
    fn encode(&mut self, frame: &RawFrame, _options: &EncodeOptions) -> Result<Vec<u8>> {
        if frame.data.len() != frame.expected_len() {
            return Err(Error::Encoding(format!(
                "frame data length {} does not match {}x{}x{}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.channels
            )));
        }
        let mut out = Vec::with_capacity(UNCOMPRESSED_HEADER_LEN + frame.data.len());
        out.extend_from_slice(UNCOMPRESSED_MAGIC);
        out.extend_from_slice(&frame.width.to_le_bytes());
        out.extend_from_slice(&frame.height.to_le_bytes());
        out.push(frame.channels);
        out.extend_from_slice(&frame.data);
        Ok(out)
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            // Uncompressed output is always lossless; accept compatible
            // values, reject contradictions.
            "lossless" => match value {
                "true" | "1" => Ok(()),
                "false" | "0" => Err(Error::InvalidParameterValue(
                    "uncompressed output is always lossless".to_string(),
                )),
                other => Err(Error::InvalidParameterValue(format!(
                    "lossless: expected boolean, got '{other}'"
                ))),
            },
            "quality" => {
                let quality: u32 = value.parse().map_err(|_| {
                    Error::InvalidParameterValue(format!("quality: expected integer, got '{value}'"))
                })?;
                if quality > 100 {
                    return Err(Error::InvalidParameterValue(format!(
                        "quality: {quality} out of range 0..=100"
                    )));
                }
                Ok(())
            }
            other => Err(Error::UnsupportedParameter(other.to_string())),
        }
    }
}

/// Register every built-in backend into `registry`.
///
/// Called once per initialization cycle; the caller guards against repeat
/// registration across nested init calls.
pub(crate) fn register_builtin_plugins(registry: &mut Registry) -> Result<()> {
    tracing::debug!("registering built-in codec plugins");
    registry.register_decoder(Arc::new(UncompressedDecoderPlugin))?;
    registry.register_encoder(Arc::new(UncompressedEncoderPlugin))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame() -> RawFrame {
        RawFrame {
            width: 2,
            height: 2,
            channels: 3,
            data: (0..12).collect(),
        }
    }

    #[test]
    fn test_uncompressed_roundtrip() {
        let frame = test_frame();
        let mut encoder = UncompressedEncoderPlugin.new_encoder().unwrap();
        let bitstream = encoder.encode(&frame, &EncodeOptions::default()).unwrap();
        assert_eq!(&bitstream[..4], UNCOMPRESSED_MAGIC);

        let mut decoder = UncompressedDecoderPlugin.new_decoder().unwrap();
        let decoded = decoder.decode(&bitstream, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut decoder = UncompressedDecoderPlugin.new_decoder().unwrap();
        let err = decoder
            .decode(b"NOPE\x01\x00\x00\x00\x01\x00\x00\x00\x01", &DecodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Decoding(_)));
    }

    #[test]
    fn test_strict_decoding_rejects_short_payload() {
        let frame = test_frame();
        let mut encoder = UncompressedEncoderPlugin.new_encoder().unwrap();
        let mut bitstream = encoder.encode(&frame, &EncodeOptions::default()).unwrap();
        bitstream.truncate(bitstream.len() - 2);

        let mut decoder = UncompressedDecoderPlugin.new_decoder().unwrap();
        // Lenient mode tolerates the mismatch.
        assert!(decoder.decode(&bitstream, &DecodeOptions::default()).is_ok());

        let strict = DecodeOptions {
            strict_decoding: true,
            ..DecodeOptions::default()
        };
        assert!(decoder.decode(&bitstream, &strict).is_err());
    }

    #[test]
    fn test_encoder_parameters() {
        let mut encoder = UncompressedEncoderPlugin.new_encoder().unwrap();
        encoder.set_parameter("lossless", "true").unwrap();
        encoder.set_parameter("quality", "90").unwrap();
        assert!(matches!(
            encoder.set_parameter("lossless", "false").unwrap_err(),
            Error::InvalidParameterValue(_)
        ));
        assert!(matches!(
            encoder.set_parameter("quality", "150").unwrap_err(),
            Error::InvalidParameterValue(_)
        ));
        assert!(matches!(
            encoder.set_parameter("speed", "8").unwrap_err(),
            Error::UnsupportedParameter(_)
        ));
    }

    #[test]
    fn test_register_builtin_plugins() {
        let mut registry = Registry::new();
        register_builtin_plugins(&mut registry).unwrap();
        assert!(registry
            .resolve_decoder(CompressionFormat::Uncompressed, None)
            .is_some());
        assert!(registry
            .resolve_encoder(Some(CompressionFormat::Uncompressed), None)
            .is_some());
    }
}
