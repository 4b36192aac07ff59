//! Plugin system: codec backends, built-in and dynamically loaded.
//!
//! This module provides a plugin architecture that allows decoder and
//! encoder backends to be loaded at runtime from shared libraries. The
//! plugin ABI is kept minimal and C-compatible for maximum interoperability.
//!
//! # Plugin Structure
//!
//! A plugin is a shared library (.so on Linux, .dll on Windows) that exports
//! a single data symbol:
//!
//! ```c
//! const PluginModuleInfo lumina_plugin_info;
//! ```
//!
//! The info record names the plugin kind and points at a flat descriptor
//! struct ([`RawDecoderDescriptor`] or [`RawEncoderDescriptor`]) whose layout
//! grows with the plugin API version. Rust plugins emit the whole surface
//! with [`declare_decoder_plugin!`] or [`declare_encoder_plugin!`].
//!
//! # Resolution
//!
//! Registered plugins live in a [`Registry`]. Decoders are selected by
//! per-format match priority (optionally pinned by id name); encoders are
//! kept in a priority-ordered catalog and selected by first match. The
//! [`PluginLoader`] owns the OS module handles and keeps registration and
//! module lifetime in lockstep.

pub mod abi;
mod builtin;
mod descriptor;
mod loader;
mod registry;

pub use abi::{
    PLUGIN_API_VERSION_MAX, PLUGIN_API_VERSION_MIN, PLUGIN_ENTRY_NAME, PLUGIN_INFO_VERSION,
    PLUGIN_KIND_DECODER, PLUGIN_KIND_ENCODER, PluginModuleInfo, RawDecoderDescriptor,
    RawEncoderDescriptor, decoder_from_raw, decoder_to_raw, encoder_from_raw, encoder_to_raw,
    lumina_free_plugin_directories, lumina_plugin_directories,
};
pub use builtin::{UncompressedDecoderPlugin, UncompressedEncoderPlugin};
pub use descriptor::{Decoder, DecoderPlugin, Encoder, EncoderPlugin, PluginKind, RawFrame};
pub use loader::{
    DEFAULT_PLUGIN_DIRECTORY, DirectoryScan, LoadedPlugin, MODULE_SUFFIX, ModuleIdentity,
    PLUGIN_PATH_ENV, PluginLoader, plugin_directories,
};
pub use registry::Registry;

pub(crate) use builtin::register_builtin_plugins;
