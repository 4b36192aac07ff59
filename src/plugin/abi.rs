//! C-compatible plugin module ABI.
//!
//! A dynamically loaded module exports exactly one symbol, named
//! `lumina_plugin_info`, holding a [`PluginModuleInfo`] struct. The struct
//! points at a flat, versioned descriptor ([`RawDecoderDescriptor`] or
//! [`RawEncoderDescriptor`]) that must stay valid for the module's entire
//! loaded lifetime.
//!
//! This boundary is the only place a C-compatible layout is unavoidable; the
//! rest of the library works with the [`DecoderPlugin`]/[`EncoderPlugin`]
//! traits. The `Abi*Plugin` adapters in this module bridge the two.
//!
//! Descriptor structs are version-gated rather than versioned by layout:
//! the host only reads `id_name` when `api_version >= 3` and only reads
//! `min_host_version` when `api_version >= 4`, so modules written against an
//! older plugin API remain loadable.
//!
//! # Example Plugin (Rust)
//!
//! ```ignore
//! use lumina::plugin::{Decoder, RawFrame};
//!
//! struct MyDecoder;
//!
//! impl Decoder for MyDecoder {
//!     fn decode(&mut self, bitstream: &[u8], options: &DecodeOptions) -> Result<RawFrame> {
//!         // ...
//!     }
//! }
//!
//! lumina::declare_decoder_plugin! {
//!     api_version: 4,
//!     id_name: "mydecoder",
//!     display_name: "My decoder v1.0",
//!     min_host_version: lumina::version::make_version(1, 0, 0),
//!     supports: |format| if format == CompressionFormat::Av1 { 100 } else { 0 },
//!     create: || Box::new(MyDecoder),
//! }
//! ```

use super::descriptor::{Decoder, DecoderPlugin, Encoder, EncoderPlugin, PluginKind};
use crate::error::{Error, Result};
use crate::format::CompressionFormat;
use std::ffi::{CStr, CString, c_char, c_int, c_void};

/// Version of the [`PluginModuleInfo`] struct itself.
pub const PLUGIN_INFO_VERSION: c_int = 1;

/// Lowest plugin API version this host can load.
pub const PLUGIN_API_VERSION_MIN: u32 = 1;

/// Highest plugin API version this host knows about.
pub const PLUGIN_API_VERSION_MAX: u32 = 4;

/// Name of the single symbol a plugin module must export.
pub const PLUGIN_ENTRY_NAME: &str = "lumina_plugin_info";

/// Null-terminated form of [`PLUGIN_ENTRY_NAME`] for symbol lookup.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"lumina_plugin_info\0";

/// [`PluginModuleInfo::kind`] tag for decoder modules.
pub const PLUGIN_KIND_DECODER: c_int = 1;

/// [`PluginModuleInfo::kind`] tag for encoder modules.
pub const PLUGIN_KIND_ENCODER: c_int = 2;

/// The struct exported by a plugin module under [`PLUGIN_ENTRY_NAME`].
#[repr(C)]
pub struct PluginModuleInfo {
    /// Must equal [`PLUGIN_INFO_VERSION`].
    pub info_version: c_int,
    /// [`PLUGIN_KIND_DECODER`] or [`PLUGIN_KIND_ENCODER`].
    pub kind: c_int,
    /// Pointer to a [`RawDecoderDescriptor`] or [`RawEncoderDescriptor`],
    /// valid for the module's entire loaded lifetime.
    pub descriptor: *const c_void,
    /// Reserved for the host; plugins must initialize this to null.
    pub reserved: *mut c_void,
}

// SAFETY: PluginModuleInfo contains only raw pointers to static data,
// which are inherently Send + Sync.
unsafe impl Send for PluginModuleInfo {}
unsafe impl Sync for PluginModuleInfo {}

/// Flat decoder descriptor exported by a plugin module.
#[repr(C)]
pub struct RawDecoderDescriptor {
    /// Plugin API version this descriptor was written against.
    pub api_version: c_int,
    /// Returns the null-terminated display name.
    pub get_name: unsafe extern "C" fn() -> *const c_char,
    /// Optional one-time init hook; nonzero return is a failure.
    pub init: Option<unsafe extern "C" fn() -> c_int>,
    /// Optional cleanup hook.
    pub deinit: Option<unsafe extern "C" fn()>,
    /// Match priority for a raw compression-format tag; 0 = unsupported.
    pub does_support_format: unsafe extern "C" fn(c_int) -> c_int,
    /// Creates a decoding session; returns a pointer produced by
    /// [`decoder_to_raw`], or null on failure.
    pub new_decoder: unsafe extern "C" fn() -> *mut c_void,
    /// Optional destructor for sessions the host never adopted.
    pub free_decoder: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Null-terminated stable id name. Read only when `api_version >= 3`.
    pub id_name: *const c_char,
    /// Minimum packed host version required, 0 for none. Read only when
    /// `api_version >= 4`.
    pub min_host_version: u32,
}

// SAFETY: RawDecoderDescriptor contains only raw pointers to static data
// and function pointers, which are inherently Send + Sync.
unsafe impl Send for RawDecoderDescriptor {}
unsafe impl Sync for RawDecoderDescriptor {}

/// Flat encoder descriptor exported by a plugin module.
#[repr(C)]
pub struct RawEncoderDescriptor {
    /// Plugin API version this descriptor was written against.
    pub api_version: c_int,
    /// Returns the null-terminated display name.
    pub get_name: unsafe extern "C" fn() -> *const c_char,
    /// Optional one-time init hook; nonzero return is a failure.
    pub init: Option<unsafe extern "C" fn() -> c_int>,
    /// Optional cleanup hook.
    pub deinit: Option<unsafe extern "C" fn()>,
    /// Raw tag of the single compression format this encoder produces.
    pub format: c_int,
    /// Selection priority; higher wins.
    pub priority: c_int,
    /// Nonzero if lossy encoding is available.
    pub supports_lossy: c_int,
    /// Nonzero if lossless encoding is available.
    pub supports_lossless: c_int,
    /// Creates an encoding session; returns a pointer produced by
    /// [`encoder_to_raw`], or null on failure.
    pub new_encoder: unsafe extern "C" fn() -> *mut c_void,
    /// Optional destructor for sessions the host never adopted.
    pub free_encoder: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Null-terminated stable id name. Read only when `api_version >= 3`.
    pub id_name: *const c_char,
    /// Minimum packed host version required, 0 for none. Read only when
    /// `api_version >= 4`.
    pub min_host_version: u32,
}

// SAFETY: RawEncoderDescriptor contains only raw pointers to static data
// and function pointers, which are inherently Send + Sync.
unsafe impl Send for RawEncoderDescriptor {}
unsafe impl Sync for RawEncoderDescriptor {}

/// Decode a [`PluginModuleInfo::kind`] tag.
pub(crate) fn kind_from_raw(raw: c_int) -> Option<PluginKind> {
    match raw {
        PLUGIN_KIND_DECODER => Some(PluginKind::Decoder),
        PLUGIN_KIND_ENCODER => Some(PluginKind::Encoder),
        _ => None,
    }
}

// ============================================================================
// Session box transport
// ============================================================================

/// Convert a decoder session box to a raw pointer for the C ABI.
///
/// Used by plugins to return sessions from their `new_decoder` functions.
pub fn decoder_to_raw(decoder: Box<dyn Decoder>) -> *mut c_void {
    // The fat pointer is carried by boxing the trait object a second time.
    let boxed: Box<Box<dyn Decoder>> = Box::new(decoder);
    Box::into_raw(boxed) as *mut c_void
}

/// Convert a raw pointer back to a decoder session box.
///
/// # Safety
///
/// The pointer must have been created by [`decoder_to_raw`].
pub unsafe fn decoder_from_raw(ptr: *mut c_void) -> Box<dyn Decoder> {
    // SAFETY: Caller guarantees ptr was created by decoder_to_raw.
    let boxed: Box<Box<dyn Decoder>> = unsafe { Box::from_raw(ptr as *mut Box<dyn Decoder>) };
    *boxed
}

/// Convert an encoder session box to a raw pointer for the C ABI.
pub fn encoder_to_raw(encoder: Box<dyn Encoder>) -> *mut c_void {
    let boxed: Box<Box<dyn Encoder>> = Box::new(encoder);
    Box::into_raw(boxed) as *mut c_void
}

/// Convert a raw pointer back to an encoder session box.
///
/// # Safety
///
/// The pointer must have been created by [`encoder_to_raw`].
pub unsafe fn encoder_from_raw(ptr: *mut c_void) -> Box<dyn Encoder> {
    // SAFETY: Caller guarantees ptr was created by encoder_to_raw.
    let boxed: Box<Box<dyn Encoder>> = unsafe { Box::from_raw(ptr as *mut Box<dyn Encoder>) };
    *boxed
}

// ============================================================================
// Adapters: raw descriptor -> capability trait
// ============================================================================

/// [`DecoderPlugin`] adapter over a validated raw descriptor.
///
/// The descriptor pointer stays valid as long as the owning module is
/// loaded; the loader unregisters the adapter before releasing the module.
pub(crate) struct AbiDecoderPlugin {
    desc: *const RawDecoderDescriptor,
    /// Cached id name; empty for descriptors older than API version 3.
    id: String,
}

// SAFETY: AbiDecoderPlugin only holds a pointer to static module data that
// is kept alive by the loader for the adapter's whole registration span.
unsafe impl Send for AbiDecoderPlugin {}
unsafe impl Sync for AbiDecoderPlugin {}

impl AbiDecoderPlugin {
    /// Wrap a raw descriptor pointer taken from a module's
    /// [`PluginModuleInfo`].
    ///
    /// # Safety
    ///
    /// `desc` must be null or point to a valid descriptor that outlives the
    /// adapter.
    pub(crate) unsafe fn new(desc: *const RawDecoderDescriptor) -> Result<Self> {
        if desc.is_null() {
            return Err(Error::PluginLoading(
                "module exports a null decoder descriptor".to_string(),
            ));
        }
        // SAFETY: Caller guarantees a non-null desc is valid.
        let raw = unsafe { &*desc };
        let id = if raw.api_version >= 3 && !raw.id_name.is_null() {
            // SAFETY: id_name is a valid null-terminated string for v3+.
            unsafe { CStr::from_ptr(raw.id_name) }
                .to_str()
                .unwrap_or("")
                .to_string()
        } else {
            String::new()
        };
        Ok(Self { desc, id })
    }

    fn raw(&self) -> &RawDecoderDescriptor {
        // SAFETY: The descriptor outlives the adapter (module stays loaded).
        unsafe { &*self.desc }
    }
}

impl DecoderPlugin for AbiDecoderPlugin {
    fn api_version(&self) -> u32 {
        self.raw().api_version.max(0) as u32
    }

    fn id_name(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> String {
        // SAFETY: get_name returns a static null-terminated string.
        let ptr = unsafe { (self.raw().get_name)() };
        if ptr.is_null() {
            return String::new();
        }
        // SAFETY: Non-null name pointers are valid null-terminated strings.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn minimum_host_version(&self) -> Option<u32> {
        let raw = self.raw();
        (raw.api_version >= 4 && raw.min_host_version != 0).then_some(raw.min_host_version)
    }

    fn format_priority(&self, format: CompressionFormat) -> u8 {
        // SAFETY: does_support_format is a pure query on the descriptor.
        let matched = unsafe { (self.raw().does_support_format)(format.to_raw()) };
        matched.clamp(0, u8::MAX.into()) as u8
    }

    fn init(&self) -> Result<()> {
        if let Some(init) = self.raw().init {
            // SAFETY: init is the descriptor's own hook.
            let code = unsafe { init() };
            if code != 0 {
                return Err(Error::PluginLoading(format!(
                    "decoder plugin '{}' init hook failed (code {code})",
                    self.id
                )));
            }
        }
        Ok(())
    }

    fn deinit(&self) {
        if let Some(deinit) = self.raw().deinit {
            // SAFETY: deinit is the descriptor's own hook.
            unsafe { deinit() }
        }
    }

    fn new_decoder(&self) -> Result<Box<dyn Decoder>> {
        // SAFETY: new_decoder returns a decoder_to_raw pointer or null.
        let ptr = unsafe { (self.raw().new_decoder)() };
        if ptr.is_null() {
            return Err(Error::Decoding(format!(
                "decoder plugin '{}' failed to create a session",
                self.id
            )));
        }
        // SAFETY: Non-null pointers come from decoder_to_raw.
        Ok(unsafe { decoder_from_raw(ptr) })
    }
}

/// [`EncoderPlugin`] adapter over a validated raw descriptor.
pub(crate) struct AbiEncoderPlugin {
    desc: *const RawEncoderDescriptor,
    /// Cached id name; empty for descriptors older than API version 3.
    id: String,
    format: CompressionFormat,
}

// SAFETY: Same argument as AbiDecoderPlugin.
unsafe impl Send for AbiEncoderPlugin {}
unsafe impl Sync for AbiEncoderPlugin {}

impl AbiEncoderPlugin {
    /// Wrap a raw descriptor pointer taken from a module's
    /// [`PluginModuleInfo`].
    ///
    /// # Safety
    ///
    /// `desc` must be null or point to a valid descriptor that outlives the
    /// adapter.
    pub(crate) unsafe fn new(desc: *const RawEncoderDescriptor) -> Result<Self> {
        if desc.is_null() {
            return Err(Error::PluginLoading(
                "module exports a null encoder descriptor".to_string(),
            ));
        }
        // SAFETY: Caller guarantees a non-null desc is valid.
        let raw = unsafe { &*desc };
        let format = CompressionFormat::from_raw(raw.format).ok_or_else(|| {
            Error::PluginLoading(format!(
                "encoder descriptor declares unknown format tag {}",
                raw.format
            ))
        })?;
        let id = if raw.api_version >= 3 && !raw.id_name.is_null() {
            // SAFETY: id_name is a valid null-terminated string for v3+.
            unsafe { CStr::from_ptr(raw.id_name) }
                .to_str()
                .unwrap_or("")
                .to_string()
        } else {
            String::new()
        };
        Ok(Self { desc, id, format })
    }

    fn raw(&self) -> &RawEncoderDescriptor {
        // SAFETY: The descriptor outlives the adapter (module stays loaded).
        unsafe { &*self.desc }
    }
}

impl EncoderPlugin for AbiEncoderPlugin {
    fn api_version(&self) -> u32 {
        self.raw().api_version.max(0) as u32
    }

    fn id_name(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> String {
        // SAFETY: get_name returns a static null-terminated string.
        let ptr = unsafe { (self.raw().get_name)() };
        if ptr.is_null() {
            return String::new();
        }
        // SAFETY: Non-null name pointers are valid null-terminated strings.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn minimum_host_version(&self) -> Option<u32> {
        let raw = self.raw();
        (raw.api_version >= 4 && raw.min_host_version != 0).then_some(raw.min_host_version)
    }

    fn format(&self) -> CompressionFormat {
        self.format
    }

    fn priority(&self) -> i32 {
        self.raw().priority
    }

    fn supports_lossy(&self) -> bool {
        self.raw().supports_lossy != 0
    }

    fn supports_lossless(&self) -> bool {
        self.raw().supports_lossless != 0
    }

    fn init(&self) -> Result<()> {
        if let Some(init) = self.raw().init {
            // SAFETY: init is the descriptor's own hook.
            let code = unsafe { init() };
            if code != 0 {
                return Err(Error::PluginLoading(format!(
                    "encoder plugin '{}' init hook failed (code {code})",
                    self.id
                )));
            }
        }
        Ok(())
    }

    fn deinit(&self) {
        if let Some(deinit) = self.raw().deinit {
            // SAFETY: deinit is the descriptor's own hook.
            unsafe { deinit() }
        }
    }

    fn new_encoder(&self) -> Result<Box<dyn Encoder>> {
        // SAFETY: new_encoder returns an encoder_to_raw pointer or null.
        let ptr = unsafe { (self.raw().new_encoder)() };
        if ptr.is_null() {
            return Err(Error::Encoding(format!(
                "encoder plugin '{}' failed to create a session",
                self.id
            )));
        }
        // SAFETY: Non-null pointers come from encoder_to_raw.
        Ok(unsafe { encoder_from_raw(ptr) })
    }
}

// ============================================================================
// Plugin directory list, C surface
// ============================================================================

/// Resolve the plugin search directories as a null-terminated array of
/// owned C strings.
///
/// The returned array and every string in it are heap-allocated and must be
/// released through the matching [`lumina_free_plugin_directories`] call.
#[unsafe(no_mangle)]
pub extern "C" fn lumina_plugin_directories() -> *mut *mut c_char {
    let mut list: Vec<*mut c_char> = super::loader::plugin_directories()
        .iter()
        .map(|dir| {
            CString::new(dir.to_string_lossy().as_bytes())
                .unwrap_or_default()
                .into_raw()
        })
        .collect();
    list.push(std::ptr::null_mut());
    Box::into_raw(list.into_boxed_slice()) as *mut *mut c_char
}

/// Release an array obtained from [`lumina_plugin_directories`].
///
/// Walks the array freeing each string, then frees the array itself. Null is
/// accepted and ignored.
///
/// # Safety
///
/// `list` must be null or a pointer previously returned by
/// [`lumina_plugin_directories`] that has not been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lumina_free_plugin_directories(list: *mut *mut c_char) {
    if list.is_null() {
        return;
    }
    // SAFETY: Caller guarantees list came from lumina_plugin_directories:
    // a boxed slice of CString::into_raw pointers with a null terminator.
    unsafe {
        let mut len = 0usize;
        while !(*list.add(len)).is_null() {
            drop(CString::from_raw(*list.add(len)));
            len += 1;
        }
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            list,
            len + 1,
        )));
    }
}

// ============================================================================
// Plugin authoring macros
// ============================================================================

/// Define the exported [`PluginModuleInfo`] for a decoder plugin cdylib.
///
/// `supports` receives a [`CompressionFormat`](crate::format::CompressionFormat)
/// and returns the match priority as `u8` (0 = unsupported); `create` is a
/// `fn()` returning the boxed [`Decoder`](crate::plugin::Decoder) session.
#[macro_export]
macro_rules! declare_decoder_plugin {
    (
        api_version: $api:expr,
        id_name: $id:literal,
        display_name: $name:literal,
        min_host_version: $mhv:expr,
        supports: |$format:ident| $priority:expr,
        create: $create:expr $(,)?
    ) => {
        static __LUMINA_DECODER_ID: &[u8] = concat!($id, "\0").as_bytes();
        static __LUMINA_DECODER_NAME: &[u8] = concat!($name, "\0").as_bytes();

        extern "C" fn __lumina_decoder_name() -> *const std::ffi::c_char {
            __LUMINA_DECODER_NAME.as_ptr() as *const std::ffi::c_char
        }

        extern "C" fn __lumina_decoder_supports(raw: std::ffi::c_int) -> std::ffi::c_int {
            match $crate::format::CompressionFormat::from_raw(raw) {
                Some($format) => std::ffi::c_int::from($priority),
                None => 0,
            }
        }

        extern "C" fn __lumina_decoder_create() -> *mut std::ffi::c_void {
            let creator: fn() -> Box<dyn $crate::plugin::Decoder> = $create;
            $crate::plugin::abi::decoder_to_raw(creator())
        }

        static __LUMINA_DECODER_DESCRIPTOR: $crate::plugin::abi::RawDecoderDescriptor =
            $crate::plugin::abi::RawDecoderDescriptor {
                api_version: $api,
                get_name: __lumina_decoder_name,
                init: None,
                deinit: None,
                does_support_format: __lumina_decoder_supports,
                new_decoder: __lumina_decoder_create,
                free_decoder: None,
                id_name: __LUMINA_DECODER_ID.as_ptr() as *const std::ffi::c_char,
                min_host_version: $mhv,
            };

        /// Plugin entry point.
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static lumina_plugin_info: $crate::plugin::abi::PluginModuleInfo =
            $crate::plugin::abi::PluginModuleInfo {
                info_version: $crate::plugin::abi::PLUGIN_INFO_VERSION,
                kind: $crate::plugin::abi::PLUGIN_KIND_DECODER,
                descriptor: &__LUMINA_DECODER_DESCRIPTOR
                    as *const $crate::plugin::abi::RawDecoderDescriptor
                    as *const std::ffi::c_void,
                reserved: std::ptr::null_mut(),
            };
    };
}

/// Define the exported [`PluginModuleInfo`] for an encoder plugin cdylib.
#[macro_export]
macro_rules! declare_encoder_plugin {
    (
        api_version: $api:expr,
        id_name: $id:literal,
        display_name: $name:literal,
        min_host_version: $mhv:expr,
        format: $format:expr,
        priority: $priority:expr,
        lossy: $lossy:expr,
        lossless: $lossless:expr,
        create: $create:expr $(,)?
    ) => {
        static __LUMINA_ENCODER_ID: &[u8] = concat!($id, "\0").as_bytes();
        static __LUMINA_ENCODER_NAME: &[u8] = concat!($name, "\0").as_bytes();

        extern "C" fn __lumina_encoder_name() -> *const std::ffi::c_char {
            __LUMINA_ENCODER_NAME.as_ptr() as *const std::ffi::c_char
        }

        extern "C" fn __lumina_encoder_create() -> *mut std::ffi::c_void {
            let creator: fn() -> Box<dyn $crate::plugin::Encoder> = $create;
            $crate::plugin::abi::encoder_to_raw(creator())
        }

        static __LUMINA_ENCODER_DESCRIPTOR: $crate::plugin::abi::RawEncoderDescriptor =
            $crate::plugin::abi::RawEncoderDescriptor {
                api_version: $api,
                get_name: __lumina_encoder_name,
                init: None,
                deinit: None,
                format: ($format) as std::ffi::c_int,
                priority: $priority,
                supports_lossy: $lossy as std::ffi::c_int,
                supports_lossless: $lossless as std::ffi::c_int,
                new_encoder: __lumina_encoder_create,
                free_encoder: None,
                id_name: __LUMINA_ENCODER_ID.as_ptr() as *const std::ffi::c_char,
                min_host_version: $mhv,
            };

        /// Plugin entry point.
        #[unsafe(no_mangle)]
        #[allow(non_upper_case_globals)]
        pub static lumina_plugin_info: $crate::plugin::abi::PluginModuleInfo =
            $crate::plugin::abi::PluginModuleInfo {
                info_version: $crate::plugin::abi::PLUGIN_INFO_VERSION,
                kind: $crate::plugin::abi::PLUGIN_KIND_ENCODER,
                descriptor: &__LUMINA_ENCODER_DESCRIPTOR
                    as *const $crate::plugin::abi::RawEncoderDescriptor
                    as *const std::ffi::c_void,
                reserved: std::ptr::null_mut(),
            };
    };
}
