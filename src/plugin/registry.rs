//! Plugin registry: format to plugin resolution.
//!
//! Two independent catalogs, one per capability:
//!
//! - **Decoders**: an identity set. Priority is computed per query through
//!   each plugin's format-match predicate, so no stored order matters.
//! - **Encoders**: kept sorted by declared priority, descending, at all
//!   times. Insertion preserves the order, so iteration order *is* priority
//!   order and resolution is a plain linear scan.
//!
//! Resolving with no matching plugin returns `None`, never an error; callers
//! implement capability queries via presence/absence.

use super::descriptor::{DecoderPlugin, EncoderPlugin};
use crate::error::Result;
use crate::format::CompressionFormat;
use std::sync::Arc;

/// Catalogs of registered decoder and encoder plugins.
///
/// A `Registry` is plain data guarded by its owner (see
/// [`Library`](crate::lifecycle::Library)); it performs no locking itself,
/// which keeps it directly constructible in tests.
#[derive(Default)]
pub struct Registry {
    decoders: Vec<Arc<dyn DecoderPlugin>>,
    /// Invariant: sorted by `priority()` descending; ties keep insertion
    /// order.
    encoders: Vec<Arc<dyn EncoderPlugin>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder plugin.
    ///
    /// Runs the plugin's init hook exactly once, then inserts. Deduplication
    /// of dynamically loaded modules is the loader's job; built-ins are
    /// inserted here directly.
    pub fn register_decoder(&mut self, plugin: Arc<dyn DecoderPlugin>) -> Result<()> {
        plugin.init()?;
        self.decoders.push(plugin);
        Ok(())
    }

    /// Register an encoder plugin, keeping the catalog priority-descending.
    ///
    /// Equal-priority entries land after existing ones, so ties resolve by
    /// registration order, deterministically.
    pub fn register_encoder(&mut self, plugin: Arc<dyn EncoderPlugin>) -> Result<()> {
        plugin.init()?;
        let position = self
            .encoders
            .partition_point(|existing| existing.priority() >= plugin.priority());
        self.encoders.insert(position, plugin);
        Ok(())
    }

    /// Resolve the best decoder for `format`, optionally pinned by id name.
    ///
    /// A name match takes precedence over priority, but only plugins with
    /// `api_version() >= 3` can be targeted by name (name identification was
    /// introduced at version 3; older plugins are skipped even if their id
    /// field happens to be populated). Without a name match, the strictly
    /// highest positive match priority wins; ties keep the first encountered.
    pub fn resolve_decoder(
        &self,
        format: CompressionFormat,
        name: Option<&str>,
    ) -> Option<Arc<dyn DecoderPlugin>> {
        if let Some(name) = name {
            let by_name = self.decoders.iter().find(|plugin| {
                plugin.format_priority(format) > 0
                    && plugin.api_version() >= 3
                    && plugin.id_name() == name
            });
            if let Some(plugin) = by_name {
                return Some(Arc::clone(plugin));
            }
        }

        let mut best: Option<(&Arc<dyn DecoderPlugin>, u8)> = None;
        for plugin in &self.decoders {
            let priority = plugin.format_priority(format);
            if priority == 0 {
                continue;
            }
            match best {
                Some((_, best_priority)) if priority <= best_priority => {}
                _ => best = Some((plugin, priority)),
            }
        }
        best.map(|(plugin, _)| Arc::clone(plugin))
    }

    /// Resolve the best encoder for `format` (or any format if `None`),
    /// optionally filtered by id name.
    ///
    /// The catalog is already priority-ordered, so the first match wins.
    pub fn resolve_encoder(
        &self,
        format: Option<CompressionFormat>,
        name: Option<&str>,
    ) -> Option<Arc<dyn EncoderPlugin>> {
        self.encoders
            .iter()
            .find(|plugin| {
                format.is_none_or(|f| plugin.format() == f)
                    && name.is_none_or(|n| plugin.id_name() == n)
            })
            .map(Arc::clone)
    }

    /// List decoders matching `format` (or any recognized format if `None`),
    /// ordered by match priority descending, up to `limit`.
    ///
    /// With a wildcard, a plugin matching several formats is included once
    /// with its best priority.
    pub fn list_decoders(
        &self,
        format: Option<CompressionFormat>,
        limit: Option<usize>,
    ) -> Vec<Arc<dyn DecoderPlugin>> {
        let mut matches: Vec<(Arc<dyn DecoderPlugin>, u8)> = self
            .decoders
            .iter()
            .filter_map(|plugin| {
                let priority = match format {
                    Some(f) => plugin.format_priority(f),
                    None => CompressionFormat::ALL
                        .iter()
                        .map(|f| plugin.format_priority(*f))
                        .max()
                        .unwrap_or(0),
                };
                (priority > 0).then(|| (Arc::clone(plugin), priority))
            })
            .collect();
        // Stable sort: equal priorities keep registration order.
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        matches.into_iter().map(|(plugin, _)| plugin).collect()
    }

    /// List encoders filtered by format and id name (either may be a
    /// wildcard). No extra sort: catalog order is priority order.
    pub fn list_encoders(
        &self,
        format: Option<CompressionFormat>,
        name: Option<&str>,
    ) -> Vec<Arc<dyn EncoderPlugin>> {
        self.encoders
            .iter()
            .filter(|plugin| {
                format.is_none_or(|f| plugin.format() == f)
                    && name.is_none_or(|n| plugin.id_name() == n)
            })
            .map(Arc::clone)
            .collect()
    }

    /// Unregister one decoder plugin, running its cleanup hook.
    ///
    /// Tolerates plugins that are not (or no longer) registered, so module
    /// unloading after a mass unregister stays a no-op.
    pub fn unregister_decoder(&mut self, plugin: &Arc<dyn DecoderPlugin>) {
        if let Some(index) = self
            .decoders
            .iter()
            .position(|existing| Arc::ptr_eq(existing, plugin))
        {
            let removed = self.decoders.remove(index);
            removed.deinit();
        }
    }

    /// Unregister one encoder plugin, running its cleanup hook.
    pub fn unregister_encoder(&mut self, plugin: &Arc<dyn EncoderPlugin>) {
        if let Some(index) = self
            .encoders
            .iter()
            .position(|existing| Arc::ptr_eq(existing, plugin))
        {
            let removed = self.encoders.remove(index);
            removed.deinit();
        }
    }

    /// Run every decoder's cleanup hook and clear the catalog.
    pub fn unregister_all_decoders(&mut self) {
        for plugin in self.decoders.drain(..) {
            plugin.deinit();
        }
    }

    /// Run every encoder's cleanup hook and clear the catalog.
    pub fn unregister_all_encoders(&mut self) {
        for plugin in self.encoders.drain(..) {
            plugin.deinit();
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("decoders", &self.decoders.len())
            .field("encoders", &self.encoders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::plugin::descriptor::{Decoder, Encoder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestDecoderPlugin {
        id: &'static str,
        api_version: u32,
        format: CompressionFormat,
        priority: u8,
        deinit_calls: AtomicUsize,
    }

    impl TestDecoderPlugin {
        fn new(id: &'static str, format: CompressionFormat, priority: u8) -> Arc<Self> {
            Arc::new(Self {
                id,
                api_version: 3,
                format,
                priority,
                deinit_calls: AtomicUsize::new(0),
            })
        }

        fn with_api_version(
            id: &'static str,
            api_version: u32,
            format: CompressionFormat,
            priority: u8,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                api_version,
                format,
                priority,
                deinit_calls: AtomicUsize::new(0),
            })
        }
    }

    impl DecoderPlugin for TestDecoderPlugin {
        fn api_version(&self) -> u32 {
            self.api_version
        }

        fn id_name(&self) -> &str {
            self.id
        }

        fn display_name(&self) -> String {
            format!("test decoder '{}'", self.id)
        }

        fn format_priority(&self, format: CompressionFormat) -> u8 {
            if format == self.format { self.priority } else { 0 }
        }

        fn deinit(&self) {
            self.deinit_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn new_decoder(&self) -> crate::error::Result<Box<dyn Decoder>> {
            Err(Error::Decoding("test plugin has no sessions".to_string()))
        }
    }

    struct TestEncoderPlugin {
        id: &'static str,
        format: CompressionFormat,
        priority: i32,
    }

    impl TestEncoderPlugin {
        fn new(id: &'static str, format: CompressionFormat, priority: i32) -> Arc<Self> {
            Arc::new(Self {
                id,
                format,
                priority,
            })
        }
    }

    impl EncoderPlugin for TestEncoderPlugin {
        fn api_version(&self) -> u32 {
            3
        }

        fn id_name(&self) -> &str {
            self.id
        }

        fn display_name(&self) -> String {
            format!("test encoder '{}'", self.id)
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
            false
        }

        fn new_encoder(&self) -> crate::error::Result<Box<dyn Encoder>> {
            Err(Error::Encoding("test plugin has no sessions".to_string()))
        }
    }

    #[test]
    fn test_encoder_catalog_is_priority_ordered() {
        let mut registry = Registry::new();
        // Register out of order; listing must come back non-increasing.
        for (id, priority) in [("a", 10), ("b", 90), ("c", 50), ("d", 90), ("e", 30)] {
            registry
                .register_encoder(TestEncoderPlugin::new(id, CompressionFormat::Av1, priority))
                .unwrap();
        }
        let listed = registry.list_encoders(None, None);
        let priorities: Vec<i32> = listed.iter().map(|p| p.priority()).collect();
        assert_eq!(priorities, vec![90, 90, 50, 30, 10]);
        // Equal priorities keep registration order ("b" before "d").
        assert_eq!(listed[0].id_name(), "b");
        assert_eq!(listed[1].id_name(), "d");
    }

    #[test]
    fn test_resolve_decoder_by_priority() {
        let mut registry = Registry::new();
        registry
            .register_decoder(TestDecoderPlugin::new("x", CompressionFormat::Hevc, 50))
            .unwrap();
        registry
            .register_decoder(TestDecoderPlugin::new("y", CompressionFormat::Hevc, 80))
            .unwrap();

        let resolved = registry.resolve_decoder(CompressionFormat::Hevc, None).unwrap();
        assert_eq!(resolved.id_name(), "y");
    }

    #[test]
    fn test_name_override_precedes_priority() {
        let mut registry = Registry::new();
        registry
            .register_decoder(TestDecoderPlugin::new("low", CompressionFormat::Av1, 20))
            .unwrap();
        registry
            .register_decoder(TestDecoderPlugin::new("high", CompressionFormat::Av1, 90))
            .unwrap();

        let resolved = registry
            .resolve_decoder(CompressionFormat::Av1, Some("low"))
            .unwrap();
        assert_eq!(resolved.id_name(), "low");
    }

    #[test]
    fn test_name_lookup_skips_pre_v3_plugins() {
        let mut registry = Registry::new();
        registry
            .register_decoder(TestDecoderPlugin::with_api_version(
                "old",
                2,
                CompressionFormat::Jpeg,
                90,
            ))
            .unwrap();
        registry
            .register_decoder(TestDecoderPlugin::new("new", CompressionFormat::Jpeg, 10))
            .unwrap();

        // "old" cannot be targeted by name even though its id field is set;
        // the lookup falls through to priority resolution instead.
        let resolved = registry
            .resolve_decoder(CompressionFormat::Jpeg, Some("old"))
            .unwrap();
        assert_eq!(resolved.id_name(), "old");
        assert_eq!(resolved.api_version(), 2);

        // But by-name resolution for a v3 plugin still works.
        let resolved = registry
            .resolve_decoder(CompressionFormat::Jpeg, Some("new"))
            .unwrap();
        assert_eq!(resolved.id_name(), "new");
    }

    #[test]
    fn test_resolve_ties_keep_first_registered() {
        let mut registry = Registry::new();
        registry
            .register_decoder(TestDecoderPlugin::new("first", CompressionFormat::Vvc, 40))
            .unwrap();
        registry
            .register_decoder(TestDecoderPlugin::new("second", CompressionFormat::Vvc, 40))
            .unwrap();
        let resolved = registry.resolve_decoder(CompressionFormat::Vvc, None).unwrap();
        assert_eq!(resolved.id_name(), "first");
    }

    #[test]
    fn test_resolve_unsupported_format_is_absence_not_error() {
        let registry = Registry::new();
        assert!(registry.resolve_decoder(CompressionFormat::Jpeg2000, None).is_none());
        assert!(registry.resolve_encoder(Some(CompressionFormat::Jpeg2000), None).is_none());
    }

    #[test]
    fn test_list_decoders_wildcard_and_limit() {
        let mut registry = Registry::new();
        registry
            .register_decoder(TestDecoderPlugin::new("av1", CompressionFormat::Av1, 60))
            .unwrap();
        registry
            .register_decoder(TestDecoderPlugin::new("hevc", CompressionFormat::Hevc, 80))
            .unwrap();
        registry
            .register_decoder(TestDecoderPlugin::new("jpeg", CompressionFormat::Jpeg, 40))
            .unwrap();

        let all = registry.list_decoders(None, None);
        let ids: Vec<&str> = all.iter().map(|p| p.id_name()).collect();
        assert_eq!(ids, vec!["hevc", "av1", "jpeg"]);

        let top_two = registry.list_decoders(None, Some(2));
        assert_eq!(top_two.len(), 2);
        assert_eq!(top_two[0].id_name(), "hevc");

        let av1_only = registry.list_decoders(Some(CompressionFormat::Av1), None);
        assert_eq!(av1_only.len(), 1);
        assert_eq!(av1_only[0].id_name(), "av1");
    }

    #[test]
    fn test_list_encoders_filters() {
        let mut registry = Registry::new();
        registry
            .register_encoder(TestEncoderPlugin::new("av1-a", CompressionFormat::Av1, 70))
            .unwrap();
        registry
            .register_encoder(TestEncoderPlugin::new("hevc-a", CompressionFormat::Hevc, 80))
            .unwrap();
        registry
            .register_encoder(TestEncoderPlugin::new("av1-b", CompressionFormat::Av1, 40))
            .unwrap();

        let av1 = registry.list_encoders(Some(CompressionFormat::Av1), None);
        let ids: Vec<&str> = av1.iter().map(|p| p.id_name()).collect();
        assert_eq!(ids, vec!["av1-a", "av1-b"]);

        let by_name = registry.list_encoders(None, Some("hevc-a"));
        assert_eq!(by_name.len(), 1);

        // First match in catalog order wins for resolution.
        let resolved = registry.resolve_encoder(Some(CompressionFormat::Av1), None).unwrap();
        assert_eq!(resolved.id_name(), "av1-a");
    }

    #[test]
    fn test_unregister_runs_cleanup_hooks() {
        let mut registry = Registry::new();
        let plugin = TestDecoderPlugin::new("hooked", CompressionFormat::Avc, 10);
        registry
            .register_decoder(plugin.clone() as Arc<dyn DecoderPlugin>)
            .unwrap();

        let as_dyn: Arc<dyn DecoderPlugin> = plugin.clone();
        registry.unregister_decoder(&as_dyn);
        assert_eq!(plugin.deinit_calls.load(Ordering::SeqCst), 1);
        assert!(registry.list_decoders(None, None).is_empty());

        // Second unregister of the same plugin is tolerated, hook not rerun.
        registry.unregister_decoder(&as_dyn);
        assert_eq!(plugin.deinit_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_all() {
        let mut registry = Registry::new();
        registry
            .register_decoder(TestDecoderPlugin::new("d", CompressionFormat::Av1, 10))
            .unwrap();
        registry
            .register_encoder(TestEncoderPlugin::new("e", CompressionFormat::Av1, 10))
            .unwrap();
        registry.unregister_all_decoders();
        registry.unregister_all_encoders();
        assert!(registry.list_decoders(None, None).is_empty());
        assert!(registry.list_encoders(None, None).is_empty());
    }
}
