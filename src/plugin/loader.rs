//! Dynamic plugin loading using libloading.
//!
//! [`PluginLoader`] turns a directory path or explicit file path into zero or
//! more validated, registered plugins. Repeated loads of the same module are
//! idempotent: the loader keeps one entry per module identity with an open
//! count, and unloading is symmetric (the module is only released when the
//! count reaches zero).
//!
//! # Module identity
//!
//! On POSIX, `dlopen` returns the *same* handle for repeated loads of the
//! same file, so the handle is the identity. On Windows, `LoadLibrary`
//! returns a fresh handle per call even for the same file, so identity is the
//! canonicalized path. This difference is a genuine platform contract, which
//! is why [`ModuleIdentity`] spells it out instead of hiding it.

use super::abi::{
    AbiDecoderPlugin, AbiEncoderPlugin, PLUGIN_API_VERSION_MAX, PLUGIN_API_VERSION_MIN,
    PLUGIN_ENTRY_NAME, PLUGIN_ENTRY_SYMBOL, PLUGIN_INFO_VERSION, PluginModuleInfo,
    RawDecoderDescriptor, RawEncoderDescriptor, kind_from_raw,
};
use super::descriptor::{DecoderPlugin, EncoderPlugin, PluginKind};
use super::registry::Registry;
use crate::error::{Error, Result};
use crate::version;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use libloading::os::unix as dl;
#[cfg(windows)]
use libloading::os::windows as dl;

/// Environment variable overriding the plugin search path.
///
/// Holds a list of directories delimited by `:` (POSIX) or `;` (Windows).
pub const PLUGIN_PATH_ENV: &str = "LUMINA_PLUGIN_PATH";

/// Compiled-in fallback plugin directory used when the environment variable
/// is unset or empty.
#[cfg(unix)]
pub const DEFAULT_PLUGIN_DIRECTORY: &str = "/usr/local/lib/lumina/plugins";
/// Compiled-in fallback plugin directory used when the environment variable
/// is unset or empty.
#[cfg(windows)]
pub const DEFAULT_PLUGIN_DIRECTORY: &str = "C:\\Program Files\\lumina\\plugins";

#[cfg(unix)]
const PATH_LIST_DELIMITER: char = ':';
#[cfg(windows)]
const PATH_LIST_DELIMITER: char = ';';

/// Shared module suffix on this platform.
#[cfg(unix)]
pub const MODULE_SUFFIX: &str = "so";
/// Shared module suffix on this platform.
#[cfg(windows)]
pub const MODULE_SUFFIX: &str = "dll";

/// Resolve the plugin search directories.
///
/// Reads [`PLUGIN_PATH_ENV`]; if it is unset, empty, or contains only
/// delimiters, the single compiled-in [`DEFAULT_PLUGIN_DIRECTORY`] is
/// returned.
pub fn plugin_directories() -> Vec<PathBuf> {
    match std::env::var(PLUGIN_PATH_ENV) {
        Ok(list) if !list.is_empty() => {
            let directories = split_search_path(&list);
            if directories.is_empty() {
                vec![PathBuf::from(DEFAULT_PLUGIN_DIRECTORY)]
            } else {
                directories
            }
        }
        _ => vec![PathBuf::from(DEFAULT_PLUGIN_DIRECTORY)],
    }
}

fn split_search_path(list: &str) -> Vec<PathBuf> {
    list.split(PATH_LIST_DELIMITER)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Identity of a loaded module, used for load deduplication and unloading.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModuleIdentity {
    /// POSIX: the OS module handle (`dlopen` returns the same handle for the
    /// same file).
    #[cfg(unix)]
    Handle(usize),
    /// Windows: the canonicalized module path (`LoadLibrary` returns a fresh
    /// handle per call).
    #[cfg(windows)]
    Path(PathBuf),
}

/// A cross-platform handle to one dynamically loaded shared module.
pub(crate) struct PluginHandle {
    backend: HandleBackend,
    identity: ModuleIdentity,
}

enum HandleBackend {
    Dynamic(dl::Library),
    /// In-process stand-in carrying a descriptor directly, for tests that
    /// exercise loader semantics without building shared objects.
    #[cfg(test)]
    Stub(&'static PluginModuleInfo),
}

impl PluginHandle {
    /// Open a shared module file.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            // SAFETY: Loading a module runs its initializers. Plugin
            // directories are trusted by contract.
            let library = unsafe { dl::Library::new(path) }
                .map_err(|e| Error::PluginLoading(format!("{}: {e}", path.display())))?;
            let raw = library.into_raw();
            // SAFETY: `raw` was just produced by into_raw; ownership resumes
            // here so Drop closes the module.
            let library = unsafe { dl::Library::from_raw(raw) };
            Ok(Self {
                backend: HandleBackend::Dynamic(library),
                identity: ModuleIdentity::Handle(raw as usize),
            })
        }
        #[cfg(windows)]
        {
            // SAFETY: Loading a module runs its initializers. Plugin
            // directories are trusted by contract.
            let library = unsafe { dl::Library::new(path) }
                .map_err(|e| Error::PluginLoading(format!("{}: {e}", path.display())))?;
            let identity =
                ModuleIdentity::Path(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
            Ok(Self {
                backend: HandleBackend::Dynamic(library),
                identity,
            })
        }
    }

    #[cfg(test)]
    pub(crate) fn stub(info: &'static PluginModuleInfo, token: usize) -> Self {
        #[cfg(unix)]
        let identity = ModuleIdentity::Handle(token);
        #[cfg(windows)]
        let identity = ModuleIdentity::Path(PathBuf::from(format!("stub-{token}")));
        Self {
            backend: HandleBackend::Stub(info),
            identity,
        }
    }

    /// Identity used for deduplication; see [`ModuleIdentity`].
    pub(crate) fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// Resolve the well-known exported info symbol.
    fn module_info(&self) -> Result<&PluginModuleInfo> {
        match &self.backend {
            HandleBackend::Dynamic(library) => {
                // SAFETY: The entry symbol is plain static data of the
                // declared type per the module ABI.
                let symbol = unsafe { library.get::<*mut PluginModuleInfo>(PLUGIN_ENTRY_SYMBOL) }
                    .map_err(|_| {
                        Error::PluginLoading(format!("missing `{PLUGIN_ENTRY_NAME}` entry point"))
                    })?;
                let info: *const PluginModuleInfo = *symbol;
                // SAFETY: The symbol address points at static module data
                // that stays valid while the module is loaded.
                Ok(unsafe { &*info })
            }
            #[cfg(test)]
            HandleBackend::Stub(info) => Ok(info),
        }
    }
}

/// Summary of one successfully loaded (or re-referenced) plugin module.
#[derive(Clone, Debug)]
pub struct LoadedPlugin {
    /// Identity to pass to [`PluginLoader::unload`].
    pub identity: ModuleIdentity,
    /// Capability the module provides.
    pub kind: PluginKind,
    /// Display name reported by the plugin.
    pub name: String,
}

/// Outcome of a best-effort batch load from one directory.
///
/// One bad module never prevents loading the rest; the last failure is
/// remembered so callers can distinguish partial success (`succeeded > 0`,
/// error set) from total failure (`succeeded == 0`, error set).
#[derive(Debug, Default)]
pub struct DirectoryScan {
    /// Plugins loaded or re-referenced by this scan.
    pub plugins: Vec<LoadedPlugin>,
    /// Number of module files that loaded successfully.
    pub succeeded: usize,
    /// Last failure encountered, if any.
    pub error: Option<Error>,
}

enum ModulePlugin {
    Decoder(Arc<dyn DecoderPlugin>),
    Encoder(Arc<dyn EncoderPlugin>),
}

impl ModulePlugin {
    fn kind(&self) -> PluginKind {
        match self {
            Self::Decoder(_) => PluginKind::Decoder,
            Self::Encoder(_) => PluginKind::Encoder,
        }
    }

    fn api_version(&self) -> u32 {
        match self {
            Self::Decoder(p) => p.api_version(),
            Self::Encoder(p) => p.api_version(),
        }
    }

    fn minimum_host_version(&self) -> Option<u32> {
        match self {
            Self::Decoder(p) => p.minimum_host_version(),
            Self::Encoder(p) => p.minimum_host_version(),
        }
    }

    fn display_name(&self) -> String {
        match self {
            Self::Decoder(p) => p.display_name(),
            Self::Encoder(p) => p.display_name(),
        }
    }
}

/// One tracked module: OS handle, the plugin it exports, and an open count.
struct LoadedModule {
    path: PathBuf,
    // Field order matters: the registered Arc drops before the OS handle.
    plugin: ModulePlugin,
    handle: PluginHandle,
    open_count: u32,
}

impl LoadedModule {
    fn summary(&self) -> LoadedPlugin {
        LoadedPlugin {
            identity: self.handle.identity().clone(),
            kind: self.plugin.kind(),
            name: self.plugin.display_name(),
        }
    }
}

/// Loader and reference-counting table for dynamically loaded plugins.
pub struct PluginLoader {
    modules: Vec<LoadedModule>,
}

impl PluginLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Load one module file and register its plugin with `registry`.
    ///
    /// Loading a module that is already loaded is not an error: the existing
    /// entry's open count is incremented and its summary returned, without
    /// registering a second descriptor.
    pub fn load_one(&mut self, registry: &mut Registry, path: &Path) -> Result<LoadedPlugin> {
        let handle = PluginHandle::open(path)?;
        self.adopt(registry, handle, path)
    }

    /// Scan `directory` for module files and load each, best-effort.
    pub fn load_all(&mut self, registry: &mut Registry, directory: &Path) -> DirectoryScan {
        let mut scan = DirectoryScan::default();
        match candidate_files(directory) {
            Ok(paths) => {
                for path in paths {
                    let handle = PluginHandle::open(&path);
                    self.adopt_outcome(registry, &mut scan, &path, handle);
                }
            }
            Err(err) => {
                tracing::debug!("skipping plugin directory: {err}");
                scan.error = Some(err);
            }
        }
        scan
    }

    /// Release one reference to the module with the given identity.
    ///
    /// When the open count reaches zero the plugin is unregistered from
    /// `registry` *before* the OS handle is released, and the module entry is
    /// removed.
    pub fn unload(&mut self, registry: &mut Registry, identity: &ModuleIdentity) -> Result<()> {
        let index = self
            .modules
            .iter()
            .position(|module| module.handle.identity() == identity)
            .ok_or(Error::PluginNotLoaded)?;
        self.modules[index].open_count -= 1;
        if self.modules[index].open_count > 0 {
            return Ok(());
        }
        let module = self.modules.swap_remove(index);
        tracing::debug!("unloading plugin module {}", module.path.display());
        match &module.plugin {
            ModulePlugin::Decoder(p) => registry.unregister_decoder(p),
            ModulePlugin::Encoder(p) => registry.unregister_encoder(p),
        }
        // Dropping `module` releases the OS handle, after unregistration.
        Ok(())
    }

    /// Unregister and release every tracked module unconditionally.
    ///
    /// Used only during full library teardown; open counts are ignored.
    pub fn unload_all(&mut self, registry: &mut Registry) {
        for module in self.modules.drain(..) {
            match &module.plugin {
                ModulePlugin::Decoder(p) => registry.unregister_decoder(p),
                ModulePlugin::Encoder(p) => registry.unregister_encoder(p),
            }
        }
    }

    /// Open count of the module with the given identity, if tracked.
    pub fn open_count(&self, identity: &ModuleIdentity) -> Option<u32> {
        self.modules
            .iter()
            .find(|module| module.handle.identity() == identity)
            .map(|module| module.open_count)
    }

    /// Number of distinct modules currently tracked.
    pub fn loaded_count(&self) -> usize {
        self.modules.len()
    }

    /// Validate, register and track an opened handle.
    fn adopt(
        &mut self,
        registry: &mut Registry,
        handle: PluginHandle,
        path: &Path,
    ) -> Result<LoadedPlugin> {
        if let Some(existing) = self
            .modules
            .iter_mut()
            .find(|module| module.handle.identity() == handle.identity())
        {
            // Idempotent re-load. The duplicate OS handle is dropped here,
            // balancing the OS-level reference immediately.
            existing.open_count += 1;
            tracing::debug!(
                "plugin module {} already loaded, open count now {}",
                path.display(),
                existing.open_count
            );
            return Ok(existing.summary());
        }

        let info = handle.module_info()?;
        if info.info_version != PLUGIN_INFO_VERSION {
            return Err(Error::PluginLoading(format!(
                "unknown plugin info struct version {}",
                info.info_version
            )));
        }
        let kind = kind_from_raw(info.kind).ok_or_else(|| {
            Error::PluginLoading(format!("unknown plugin kind tag {}", info.kind))
        })?;
        let plugin = match kind {
            PluginKind::Decoder => {
                // SAFETY: The descriptor pointer stays valid while the module
                // is loaded, and the loader unregisters before releasing it.
                let adapter =
                    unsafe { AbiDecoderPlugin::new(info.descriptor as *const RawDecoderDescriptor) }?;
                ModulePlugin::Decoder(Arc::new(adapter))
            }
            PluginKind::Encoder => {
                // SAFETY: Same lifetime argument as the decoder arm.
                let adapter =
                    unsafe { AbiEncoderPlugin::new(info.descriptor as *const RawEncoderDescriptor) }?;
                ModulePlugin::Encoder(Arc::new(adapter))
            }
        };

        check_version_gates(&plugin, path)?;

        match &plugin {
            ModulePlugin::Decoder(p) => registry.register_decoder(Arc::clone(p))?,
            ModulePlugin::Encoder(p) => registry.register_encoder(Arc::clone(p))?,
        }

        let module = LoadedModule {
            path: path.to_path_buf(),
            plugin,
            handle,
            open_count: 1,
        };
        let summary = module.summary();
        tracing::debug!(
            "loaded {} plugin '{}' from {}",
            summary.kind,
            summary.name,
            path.display()
        );
        self.modules.push(module);
        Ok(summary)
    }

    /// Fold one per-file outcome into a batch scan.
    fn adopt_outcome(
        &mut self,
        registry: &mut Registry,
        scan: &mut DirectoryScan,
        path: &Path,
        handle: Result<PluginHandle>,
    ) {
        match handle.and_then(|h| self.adopt(registry, h, path)) {
            Ok(plugin) => {
                scan.succeeded += 1;
                scan.plugins.push(plugin);
            }
            Err(err) => {
                tracing::warn!("failed to load plugin {}: {err}", path.display());
                scan.error = Some(err);
            }
        }
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("modules", &self.modules.len())
            .finish()
    }
}

/// Validate a plugin's declared versions against what this host supports.
///
/// The module must still be closed by the caller on failure (no leak); both
/// gates report the same error kind so callers treat them uniformly as "this
/// plugin is unavailable".
fn check_version_gates(plugin: &ModulePlugin, path: &Path) -> Result<()> {
    let api = plugin.api_version();
    if !(PLUGIN_API_VERSION_MIN..=PLUGIN_API_VERSION_MAX).contains(&api) {
        return Err(Error::UnsupportedPluginVersion(format!(
            "{} declares plugin API version {api}, host supports {PLUGIN_API_VERSION_MIN} \
             through {PLUGIN_API_VERSION_MAX}",
            path.display()
        )));
    }
    if api >= 4 {
        if let Some(required) = plugin.minimum_host_version() {
            if required > version::NUMERIC_VERSION {
                return Err(Error::UnsupportedPluginVersion(format!(
                    "{} requires host {} or newer, running {}",
                    path.display(),
                    version::version_string(required),
                    version::VERSION
                )));
            }
        }
    }
    Ok(())
}

/// Enumerate candidate module files in `directory`.
///
/// The sequence is lazy, finite and non-restartable. On POSIX, regular
/// files, symlinks, and entries whose type the filesystem cannot report all
/// stay in; skipping them would silently drop valid modules.
pub(crate) fn candidate_files(directory: &Path) -> Result<impl Iterator<Item = PathBuf>> {
    let entries = std::fs::read_dir(directory).map_err(|source| Error::CannotReadPluginDirectory {
        path: directory.to_path_buf(),
        source,
    })?;
    Ok(entries.filter_map(|entry| {
        let entry = entry.ok()?;
        let path = entry.path();
        if path.extension() != Some(OsStr::new(MODULE_SUFFIX)) {
            return None;
        }
        if let Ok(file_type) = entry.file_type() {
            if file_type.is_dir() {
                return None;
            }
        }
        Some(path)
    }))
}
