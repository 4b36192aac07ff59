//! # Lumina
//!
//! A multi-codec media container core with a C-compatible plugin system.
//!
//! Lumina decouples container handling from codec backends: decoders and
//! encoders are plugins, either statically linked built-ins or shared
//! libraries loaded at runtime, selected per compression format through a
//! priority-based registry.
//!
//! ## Features
//!
//! - **Plugin registry**: per-format decoder resolution by match priority,
//!   priority-ordered encoder catalog, name-pinned overrides
//! - **Dynamic loading**: versioned C ABI with refcounted module handles,
//!   API-range and host-version gating
//! - **Refcounted lifecycle**: nested init/deinit with shared conversion
//!   tables and implicit initialization for capability queries
//! - **Versioned options**: decode/encode option structs that copy safely
//!   across versions in both directions
//!
//! ## Quick Start
//!
//! ```rust
//! use lumina::prelude::*;
//!
//! let library = Library::new();
//! library.init()?;
//!
//! if let Some(plugin) = library.decoder_for_format(CompressionFormat::Uncompressed, None) {
//!     let decoder = plugin.new_decoder()?;
//!     let _ = decoder; // feed it a bitstream via Decoder::decode
//! }
//!
//! library.deinit();
//! # Ok::<(), lumina::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod format;
pub mod lifecycle;
pub mod options;
pub mod plugin;
pub mod version;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::format::CompressionFormat;
    pub use crate::lifecycle::{ConversionTables, Library};
    pub use crate::options::{DecodeOptions, EncodeOptions};
    pub use crate::plugin::{Decoder, DecoderPlugin, Encoder, EncoderPlugin, RawFrame};
}

pub use error::{Error, Result};
