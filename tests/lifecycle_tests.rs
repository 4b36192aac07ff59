//! Library lifecycle and plugin resolution through the public facade.
//!
//! Every test builds its own `Library` instance, so tests never observe each
//! other's registrations.

use lumina::error::{Error, Result};
use lumina::format::CompressionFormat;
use lumina::lifecycle::Library;
use lumina::options::{DecodeOptions, EncodeOptions};
use lumina::plugin::{Decoder, DecoderPlugin, Encoder, EncoderPlugin, RawFrame};
use std::sync::Arc;

struct FakeDecoderPlugin {
    id: &'static str,
    format: CompressionFormat,
    priority: u8,
}

impl DecoderPlugin for FakeDecoderPlugin {
    fn api_version(&self) -> u32 {
        3
    }

    fn id_name(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> String {
        format!("fake decoder '{}'", self.id)
    }

    fn format_priority(&self, format: CompressionFormat) -> u8 {
        if format == self.format { self.priority } else { 0 }
    }

    fn new_decoder(&self) -> Result<Box<dyn Decoder>> {
        Err(Error::Decoding("fake plugin".to_string()))
    }
}

struct FakeEncoderPlugin {
    id: &'static str,
    format: CompressionFormat,
    priority: i32,
}

impl EncoderPlugin for FakeEncoderPlugin {
    fn api_version(&self) -> u32 {
        3
    }

    fn id_name(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> String {
        format!("fake encoder '{}'", self.id)
    }

    fn format(&self) -> CompressionFormat {
        self.format
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports_lossy(&self) -> bool {
        true
    }

    fn supports_lossless(&self) -> bool {
        true
    }

    fn new_encoder(&self) -> Result<Box<dyn Encoder>> {
        Err(Error::Encoding("fake plugin".to_string()))
    }
}

#[test]
fn test_nested_init_keeps_state_until_last_deinit() {
    let library = Library::new();
    library.init().unwrap();
    library.init().unwrap();

    library
        .register_decoder_plugin(Arc::new(FakeDecoderPlugin {
            id: "nested",
            format: CompressionFormat::Av1,
            priority: 40,
        }))
        .unwrap();

    library.deinit();
    // One reference still held: the registration survives.
    assert!(library.have_decoder_for_format(CompressionFormat::Av1));

    library.deinit();
    assert!(!library.is_initialized());
}

#[test]
fn test_deinit_clears_custom_registrations() {
    let library = Library::new();
    library.init().unwrap();
    library
        .register_decoder_plugin(Arc::new(FakeDecoderPlugin {
            id: "transient",
            format: CompressionFormat::Hevc,
            priority: 40,
        }))
        .unwrap();
    assert!(library.have_decoder_for_format(CompressionFormat::Hevc));

    library.deinit();

    // The next query re-initializes implicitly: built-ins come back, the
    // custom registration does not.
    assert!(library.have_decoder_for_format(CompressionFormat::Uncompressed));
    assert!(!library.have_decoder_for_format(CompressionFormat::Hevc));
}

#[test]
fn test_highest_priority_decoder_wins_at_facade() {
    let library = Library::new();
    library
        .register_decoder_plugin(Arc::new(FakeDecoderPlugin {
            id: "x",
            format: CompressionFormat::Av1,
            priority: 50,
        }))
        .unwrap();
    library
        .register_decoder_plugin(Arc::new(FakeDecoderPlugin {
            id: "y",
            format: CompressionFormat::Av1,
            priority: 80,
        }))
        .unwrap();

    let resolved = library
        .decoder_for_format(CompressionFormat::Av1, None)
        .unwrap();
    assert_eq!(resolved.id_name(), "y");

    // A name override beats the priority winner.
    let pinned = library
        .decoder_for_format(CompressionFormat::Av1, Some("x"))
        .unwrap();
    assert_eq!(pinned.id_name(), "x");
}

#[test]
fn test_encoder_descriptors_come_back_priority_ordered() {
    let library = Library::new();
    for (id, priority) in [("slow", 20), ("fast", 90), ("mid", 50)] {
        library
            .register_encoder_plugin(Arc::new(FakeEncoderPlugin {
                id,
                format: CompressionFormat::Av1,
                priority,
            }))
            .unwrap();
    }

    let listed = library.encoder_descriptors(Some(CompressionFormat::Av1), None);
    let ids: Vec<&str> = listed.iter().map(|p| p.id_name()).collect();
    assert_eq!(ids, vec!["fast", "mid", "slow"]);

    let best = library
        .encoder_for_format(Some(CompressionFormat::Av1), None)
        .unwrap();
    assert_eq!(best.id_name(), "fast");
}

#[test]
fn test_missing_codec_is_absence_not_error() {
    let library = Library::new();
    assert!(!library.have_decoder_for_format(CompressionFormat::Jpeg2000));
    assert!(!library.have_encoder_for_format(CompressionFormat::Jpeg2000));
    assert!(library
        .decoder_for_format(CompressionFormat::Jpeg2000, None)
        .is_none());
}

#[test]
fn test_builtin_roundtrip_through_facade() {
    let library = Library::new();
    let frame = RawFrame {
        width: 3,
        height: 2,
        channels: 4,
        data: (0..24).collect(),
    };

    let encoder_plugin = library
        .encoder_for_format(Some(CompressionFormat::Uncompressed), None)
        .unwrap();
    let mut encoder = encoder_plugin.new_encoder().unwrap();
    let bitstream = encoder.encode(&frame, &EncodeOptions::default()).unwrap();

    let decoder_plugin = library
        .decoder_for_format(CompressionFormat::Uncompressed, None)
        .unwrap();
    let mut decoder = decoder_plugin.new_decoder().unwrap();
    let decoded = decoder.decode(&bitstream, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, frame);

    library.deinit();
}

#[test]
fn test_concurrent_queries_share_one_implicit_init() {
    let library = Library::new();
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    assert!(library.have_decoder_for_format(CompressionFormat::Uncompressed));
                    assert!(!library.have_encoder_for_format(CompressionFormat::Vvc));
                }
            });
        }
    });
    assert!(library.is_initialized());
    // All those queries held a single implicit reference.
    library.deinit();
    assert!(!library.is_initialized());
}

#[test]
fn test_unload_unknown_identity_fails() {
    let library = Library::new();
    #[cfg(unix)]
    let identity = lumina::plugin::ModuleIdentity::Handle(0xdead_beef);
    #[cfg(windows)]
    let identity = lumina::plugin::ModuleIdentity::Path(std::path::PathBuf::from(
        "C:\\does\\not\\exist.dll",
    ));
    let err = library.unload_plugin(&identity).unwrap_err();
    assert!(matches!(err, Error::PluginNotLoaded));
}

#[test]
fn test_load_plugins_from_missing_directory_reports_error() {
    let library = Library::new();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-subdir");
    let scan = library.load_plugins_from(&missing).unwrap();
    assert_eq!(scan.succeeded, 0);
    assert!(scan.plugins.is_empty());
    assert!(matches!(
        scan.error,
        Some(Error::CannotReadPluginDirectory { .. })
    ));
}
