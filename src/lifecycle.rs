//! Process-wide library lifecycle: refcounted init/deinit and the facade API.
//!
//! All stateful operations go through a [`Library`]. The process normally
//! uses the shared instance from [`Library::global`], but every instance is
//! self-contained, so tests construct their own with [`Library::new`] and
//! never observe each other's state.
//!
//! Initialization is reference counted: `init` and `deinit` pair up, and the
//! shared state (conversion tables, built-in plugins, scanned plugin
//! directories) exists from the first `init` to the matching last `deinit`.
//! Capability queries self-initialize, which counts as a single implicit
//! `init` that is never paired with a `deinit`.

use crate::error::{Error, Result};
use crate::format::CompressionFormat;
use crate::options::{ChromaDownsampling, ChromaUpsampling};
use crate::plugin::{
    DecoderPlugin, DirectoryScan, EncoderPlugin, LoadedPlugin, ModuleIdentity, PluginLoader,
    Registry, plugin_directories, register_builtin_plugins,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

// ============================================================================
// Shared conversion tables
// ============================================================================

/// Fixed-point chroma resampling kernels, built once per init cycle and
/// shared via `Arc`.
///
/// Downsampling kernels are 2x2 weights in Q8 (sum 256); upsampling kernels
/// are four phase kernels in Q4 (sum 16 each). Consumers apply them to the
/// four nearest chroma samples.
pub struct ConversionTables {
    downsampling: [(ChromaDownsampling, [i32; 4]); 3],
    upsampling: [(ChromaUpsampling, [[u16; 4]; 4]); 2],
}

impl ConversionTables {
    fn build() -> Self {
        Self {
            downsampling: [
                (ChromaDownsampling::NearestNeighbor, [256, 0, 0, 0]),
                (ChromaDownsampling::Average, [64, 64, 64, 64]),
                // Sharpened box filter; negative lobes, still sums to 256.
                (ChromaDownsampling::SharpYuv, [360, -36, -36, -32]),
            ],
            upsampling: [
                (
                    ChromaUpsampling::NearestNeighbor,
                    [[16, 0, 0, 0], [16, 0, 0, 0], [16, 0, 0, 0], [16, 0, 0, 0]],
                ),
                (
                    ChromaUpsampling::Bilinear,
                    [[9, 3, 3, 1], [3, 9, 1, 3], [3, 1, 9, 3], [1, 3, 3, 9]],
                ),
            ],
        }
    }

    /// 2x2 downsampling weights (Q8) for `algorithm`.
    pub fn downsampling_kernel(&self, algorithm: ChromaDownsampling) -> [i32; 4] {
        self.downsampling
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, kernel)| *kernel)
            .unwrap_or([256, 0, 0, 0])
    }

    /// Four per-phase upsampling weight sets (Q4) for `algorithm`.
    pub fn upsampling_kernels(&self, algorithm: ChromaUpsampling) -> [[u16; 4]; 4] {
        self.upsampling
            .iter()
            .find(|(a, _)| *a == algorithm)
            .map(|(_, kernels)| *kernels)
            .unwrap_or([[16, 0, 0, 0]; 4])
    }
}

impl std::fmt::Debug for ConversionTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionTables").finish_non_exhaustive()
    }
}

// ============================================================================
// Library
// ============================================================================

struct LibraryState {
    init_count: u32,
    /// Survives a failed init on purpose: built-ins registered by an init
    /// attempt that later failed must not be registered twice by the retry.
    builtins_registered: bool,
    tables: Option<Arc<ConversionTables>>,
    registry: Registry,
    loader: PluginLoader,
}

impl LibraryState {
    fn empty() -> Self {
        Self {
            init_count: 0,
            builtins_registered: false,
            tables: None,
            registry: Registry::new(),
            loader: PluginLoader::new(),
        }
    }
}

/// Refcounted library instance owning the plugin registry and loader.
///
/// Public entry points take the state lock exactly once and call lock-free
/// internals, so no code path re-enters the mutex.
pub struct Library {
    state: Mutex<LibraryState>,
    /// Fast path for [`Library::ensure_initialized`]; true whenever
    /// `init_count > 0`.
    initialized: AtomicBool,
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl Library {
    /// Create an isolated, uninitialized instance.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LibraryState::empty()),
            initialized: AtomicBool::new(false),
        }
    }

    /// The process-wide shared instance.
    pub fn global() -> &'static Library {
        static GLOBAL: OnceLock<Library> = OnceLock::new();
        GLOBAL.get_or_init(Library::new)
    }

    /// Initialize the library, incrementing the init count.
    ///
    /// The first successful call builds the conversion tables, registers the
    /// built-in plugins and scans the configured plugin directories. Nested
    /// calls only bump the count. A failed first call leaves whatever partial
    /// state it built in place (no rollback) and does not increment the
    /// count; a retry picks up where it left off.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.init_count == 0 {
            Self::bootstrap(&mut state)?;
        }
        state.init_count += 1;
        self.initialized.store(true, Ordering::Release);
        tracing::debug!(init_count = state.init_count, "library init");
        Ok(())
    }

    /// Release one init reference; the last release tears everything down.
    ///
    /// Calling `deinit` more often than `init` is a no-op, the count never
    /// goes negative.
    pub fn deinit(&self) {
        let mut state = self.state.lock().unwrap();
        match state.init_count {
            0 => {}
            1 => {
                Self::teardown(&mut state);
                state.init_count = 0;
                self.initialized.store(false, Ordering::Release);
                tracing::debug!("library deinit, state released");
            }
            _ => {
                state.init_count -= 1;
                tracing::debug!(init_count = state.init_count, "library deinit");
            }
        }
    }

    /// Initialize implicitly if no explicit `init` has happened yet.
    ///
    /// The implicit init counts once and is never paired with a `deinit`.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        self.ensure_locked(&mut state)
    }

    /// Whether the init count is currently above zero.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_locked(&self, state: &mut LibraryState) -> Result<()> {
        if state.init_count == 0 {
            Self::bootstrap(state)?;
            state.init_count = 1;
            self.initialized.store(true, Ordering::Release);
            tracing::debug!("library initialized implicitly");
        }
        Ok(())
    }

    /// Lock, self-initialize best-effort, run `f`.
    ///
    /// Capability queries answer from whatever state exists even when the
    /// implicit bootstrap fails (e.g. an unreadable plugin directory), so a
    /// broken plugin setup degrades to "fewer codecs" instead of turning
    /// every query into an error.
    fn with_state<T>(&self, f: impl FnOnce(&mut LibraryState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        if let Err(error) = self.ensure_locked(&mut state) {
            tracing::warn!(%error, "implicit library initialization failed");
        }
        f(&mut state)
    }

    fn bootstrap(state: &mut LibraryState) -> Result<()> {
        if state.tables.is_none() {
            state.tables = Some(Arc::new(ConversionTables::build()));
        }
        if !state.builtins_registered {
            register_builtin_plugins(&mut state.registry)?;
            state.builtins_registered = true;
        }
        for directory in plugin_directories() {
            let scan = state.loader.load_all(&mut state.registry, &directory);
            match scan.error {
                // A missing or unreadable search directory is the common
                // case on systems without external plugins.
                Some(Error::CannotReadPluginDirectory { path, source }) => {
                    tracing::debug!(path = %path.display(), %source, "skipping plugin directory");
                }
                Some(error) if scan.succeeded == 0 => return Err(error),
                Some(error) => {
                    tracing::warn!(
                        directory = %directory.display(),
                        succeeded = scan.succeeded,
                        %error,
                        "some plugin modules failed to load"
                    );
                }
                None => {}
            }
        }
        Ok(())
    }

    fn teardown(state: &mut LibraryState) {
        state.loader.unload_all(&mut state.registry);
        state.registry.unregister_all_decoders();
        state.registry.unregister_all_encoders();
        state.tables = None;
        state.builtins_registered = false;
    }

    // ------------------------------------------------------------------
    // Facade: capability queries
    // ------------------------------------------------------------------

    /// Resolve the best decoder plugin for `format`, optionally pinned by id
    /// name.
    pub fn decoder_for_format(
        &self,
        format: CompressionFormat,
        name: Option<&str>,
    ) -> Option<Arc<dyn DecoderPlugin>> {
        self.with_state(|state| state.registry.resolve_decoder(format, name))
    }

    /// Resolve the best encoder plugin, optionally filtered by format and id
    /// name.
    pub fn encoder_for_format(
        &self,
        format: Option<CompressionFormat>,
        name: Option<&str>,
    ) -> Option<Arc<dyn EncoderPlugin>> {
        self.with_state(|state| state.registry.resolve_encoder(format, name))
    }

    /// Whether any registered decoder handles `format`.
    pub fn have_decoder_for_format(&self, format: CompressionFormat) -> bool {
        self.decoder_for_format(format, None).is_some()
    }

    /// Whether any registered encoder produces `format`.
    pub fn have_encoder_for_format(&self, format: CompressionFormat) -> bool {
        self.encoder_for_format(Some(format), None).is_some()
    }

    /// List decoder plugins by descending match priority, optionally
    /// filtered by format and truncated to `limit`.
    pub fn decoder_descriptors(
        &self,
        format: Option<CompressionFormat>,
        limit: Option<usize>,
    ) -> Vec<Arc<dyn DecoderPlugin>> {
        self.with_state(|state| state.registry.list_decoders(format, limit))
    }

    /// List encoder plugins in priority order, optionally filtered by format
    /// and id name.
    pub fn encoder_descriptors(
        &self,
        format: Option<CompressionFormat>,
        name: Option<&str>,
    ) -> Vec<Arc<dyn EncoderPlugin>> {
        self.with_state(|state| state.registry.list_encoders(format, name))
    }

    /// The shared conversion tables, present while initialized.
    pub fn conversion_tables(&self) -> Option<Arc<ConversionTables>> {
        self.with_state(|state| state.tables.clone())
    }

    // ------------------------------------------------------------------
    // Facade: registration and dynamic loading
    // ------------------------------------------------------------------

    /// Register an in-process decoder plugin.
    pub fn register_decoder_plugin(&self, plugin: Arc<dyn DecoderPlugin>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.ensure_locked(&mut state)?;
        state.registry.register_decoder(plugin)
    }

    /// Register an in-process encoder plugin.
    pub fn register_encoder_plugin(&self, plugin: Arc<dyn EncoderPlugin>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.ensure_locked(&mut state)?;
        state.registry.register_encoder(plugin)
    }

    /// Load one plugin module file.
    pub fn load_plugin(&self, path: &Path) -> Result<LoadedPlugin> {
        let mut state = self.state.lock().unwrap();
        self.ensure_locked(&mut state)?;
        let LibraryState {
            loader, registry, ..
        } = &mut *state;
        loader.load_one(registry, path)
    }

    /// Scan one directory for plugin modules, best-effort.
    pub fn load_plugins_from(&self, directory: &Path) -> Result<DirectoryScan> {
        let mut state = self.state.lock().unwrap();
        self.ensure_locked(&mut state)?;
        let LibraryState {
            loader, registry, ..
        } = &mut *state;
        Ok(loader.load_all(registry, directory))
    }

    /// Release one reference to a loaded plugin module.
    pub fn unload_plugin(&self, identity: &ModuleIdentity) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.ensure_locked(&mut state)?;
        let LibraryState {
            loader, registry, ..
        } = &mut *state;
        loader.unload(registry, identity)
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
