//! Error types for Lumina.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Lumina's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Lumina operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A plugin module could not be opened, or its descriptor symbol could
    /// not be resolved. Per-file recoverable; batch loads aggregate these
    /// into a "last error" slot instead of aborting.
    #[error("failed to load plugin module: {0}")]
    PluginLoading(String),

    /// A plugin declares an API version or minimum required host version
    /// outside what this host supports. The plugin is simply not registered.
    #[error("unsupported plugin version: {0}")]
    UnsupportedPluginVersion(String),

    /// An unload was requested for a module identity the loader does not
    /// track. No state is changed.
    #[error("plugin is not loaded")]
    PluginNotLoaded,

    /// A configured plugin search directory could not be enumerated.
    /// Treated as zero candidates during discovery, never fatal to a scan.
    #[error("cannot read plugin directory {path}")]
    CannotReadPluginDirectory {
        /// The directory that could not be opened.
        path: PathBuf,
        /// The underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// A named parameter is not understood by the receiving plugin.
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),

    /// A parameter value is outside the accepted range or form.
    #[error("invalid parameter value: {0}")]
    InvalidParameterValue(String),

    /// A decoder backend reported a failure while decoding.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// An encoder backend reported a failure while encoding.
    #[error("encoding error: {0}")]
    Encoding(String),
}
