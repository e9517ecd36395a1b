//! Plugin discovery, loading and hot-swap
//!
//! The active plugin lives behind an `ArcSwapOption`. Loading constructs and
//! warms up the new plugin completely before a single pointer store makes it
//! visible, so the pipeline processes every frame with either the old or the
//! new plugin. A failed load never touches the active slot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::builtin;
use super::manifest::{is_valid_id, ManifestError, PluginInfo, PluginManifest};
use super::{Plugin, PluginError};
use crate::logs::LogSink;

const LOG_SOURCE: &str = "Plugins";

/// Constructor for a compiled-in plugin implementation
pub type PluginFactory = fn(&PluginManifest) -> anyhow::Result<Box<dyn Plugin>>;

/// The currently active plugin
pub struct ActivePlugin {
    id: String,
    name: String,
    plugin: Mutex<Box<dyn Plugin>>,
}

impl ActivePlugin {
    pub fn new(id: impl Into<String>, name: impl Into<String>, plugin: Box<dyn Plugin>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            plugin: Mutex::new(plugin),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, used to tag log lines
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive access for processing one frame
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Plugin>> {
        self.plugin.lock()
    }
}

pub struct PluginRegistry {
    plugins_dir: PathBuf,
    factories: HashMap<String, PluginFactory>,
    active: ArcSwapOption<ActivePlugin>,
    /// Serializes concurrent `load` calls
    load_lock: Mutex<()>,
    logs: Arc<LogSink>,
}

impl PluginRegistry {
    /// Registry over `plugins_dir` with the built-in implementations
    pub fn new(plugins_dir: impl AsRef<Path>, logs: Arc<LogSink>) -> Self {
        let mut registry = Self::empty(plugins_dir, logs);
        for (entry, factory) in builtin::FACTORIES {
            registry.register(entry, *factory);
        }
        registry
    }

    /// Registry without any implementations registered
    pub fn empty(plugins_dir: impl AsRef<Path>, logs: Arc<LogSink>) -> Self {
        Self {
            plugins_dir: plugins_dir.as_ref().to_path_buf(),
            factories: HashMap::new(),
            active: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
            logs,
        }
    }

    /// Make an implementation available under `entry`
    pub fn register(&mut self, entry: &str, factory: PluginFactory) {
        self.factories.insert(entry.to_string(), factory);
    }

    /// Directory scanned by `list_available`
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Registered implementation names, sorted
    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.factories.keys().cloned().collect();
        entries.sort();
        entries
    }

    /// Scan the plugin directory
    ///
    /// Every sub-directory with a readable `model.json` is listed, ordered
    /// by id. Broken manifests are skipped with a warning.
    pub fn list_available(&self) -> Vec<PluginInfo> {
        let entries = match std::fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "Plugin directory {} not readable: {}",
                    self.plugins_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut plugins: Vec<PluginInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let id = entry.file_name().to_str()?.to_string();
                match PluginManifest::load(&entry.path()) {
                    Ok(manifest) => Some(PluginInfo::new(&id, &manifest)),
                    Err(ManifestError::Missing(_)) => None,
                    Err(e) => {
                        warn!("Skipping plugin '{}': {}", id, e);
                        None
                    }
                }
            })
            .collect();
        plugins.sort_by(|a, b| a.id.cmp(&b.id));
        plugins
    }

    /// Load `id` and make it the active plugin
    ///
    /// Blocks the caller while the plugin is constructed; the pipeline keeps
    /// running with the previous plugin until the swap.
    pub fn load(&self, id: &str) -> Result<(), PluginError> {
        let _guard = self.load_lock.lock();

        let result = self.build(id);
        match result {
            Ok(active) => {
                let name = active.name().to_string();
                let previous = self.active.swap(Some(Arc::new(active)));
                if let Some(previous) = previous {
                    debug!("Replaced plugin '{}'", previous.id());
                }
                self.logs
                    .success(LOG_SOURCE, format!("Loaded plugin '{}' ({})", id, name));
                Ok(())
            }
            Err(e) => {
                self.logs.error(LOG_SOURCE, e.to_string());
                Err(e)
            }
        }
    }

    fn build(&self, id: &str) -> Result<ActivePlugin, PluginError> {
        if !is_valid_id(id) {
            return Err(PluginError::NotFound(id.to_string()));
        }
        let dir = self.plugins_dir.join(id);
        if !dir.is_dir() {
            return Err(PluginError::NotFound(id.to_string()));
        }
        let manifest = match PluginManifest::load(&dir) {
            Ok(manifest) => manifest,
            Err(ManifestError::Missing(_)) => return Err(PluginError::NotFound(id.to_string())),
            Err(e) => return Err(PluginError::load(id, e)),
        };

        let entry = manifest.entry_point(id);
        let factory = self
            .factories
            .get(entry)
            .ok_or_else(|| PluginError::load(id, format!("unknown entry '{}'", entry)))?;

        let mut plugin = factory(&manifest).map_err(|e| PluginError::load(id, format!("{:#}", e)))?;
        plugin
            .warm_up()
            .map_err(|e| PluginError::load(id, format!("warm-up failed: {:#}", e)))?;

        if !plugin.processes_frames() {
            self.logs.warning(
                LOG_SOURCE,
                format!("Plugin '{}' does not process frames; running pass-through", id),
            );
        }

        Ok(ActivePlugin::new(id, manifest.display_name(id), plugin))
    }

    /// Return to pass-through mode
    pub fn unload(&self) -> Option<String> {
        let _guard = self.load_lock.lock();
        let previous = self.active.swap(None)?;
        self.logs.info(
            LOG_SOURCE,
            format!("Unloaded plugin '{}', pass-through mode", previous.id()),
        );
        Some(previous.id().to_string())
    }

    /// Snapshot of the active plugin
    pub fn active(&self) -> Option<Arc<ActivePlugin>> {
        self.active.load_full()
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.load().as_ref().map(|p| p.id().to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_list_available_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "zeta", r#"{"name": "Zeta", "entry": "paint"}"#);
        write_manifest(dir.path(), "alpha", r#"{"name": "Alpha", "description": "first"}"#);
        write_manifest(dir.path(), "bad", "{oops");
        std::fs::create_dir_all(dir.path().join("no-manifest")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let registry = registry(dir.path());
        assert_eq!(registry.plugins_dir(), dir.path());
        let listed = registry.list_available();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
        assert_eq!(listed[0].description, "first");
        assert_eq!(listed[1].entry, "paint");
    }

    #[test]
    fn test_missing_dir_lists_nothing() {
        let registry = registry(Path::new("/nonexistent/plugins/dir"));
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn test_load_not_found_keeps_active() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "red", r#"{"entry": "paint"}"#);
        let registry = registry(dir.path());

        registry.load("red").unwrap();
        assert_eq!(registry.active_id().as_deref(), Some("red"));

        assert_eq!(
            registry.load("ghost"),
            Err(PluginError::NotFound("ghost".to_string()))
        );
        assert_eq!(
            registry.load("../red"),
            Err(PluginError::NotFound("../red".to_string()))
        );
        assert_eq!(registry.active_id().as_deref(), Some("red"));
    }

    #[test]
    fn test_load_errors_keep_previous_plugin() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "red", r#"{"entry": "paint"}"#);
        write_manifest(dir.path(), "broken", r#"{"name": "Broken"}"#);
        write_manifest(dir.path(), "mystery", r#"{"entry": "does_not_exist"}"#);
        write_manifest(dir.path(), "garbled", "[1, 2");
        let registry = registry(dir.path());
        registry.load("red").unwrap();
        let before = registry.active().unwrap();

        for id in ["broken", "mystery", "garbled"] {
            match registry.load(id) {
                Err(PluginError::LoadError { id: failed, .. }) => assert_eq!(failed, id),
                other => panic!("{}: unexpected {:?}", id, other),
            }
        }
        assert!(Arc::ptr_eq(&before, &registry.active().unwrap()));
    }

    #[test]
    fn test_warm_up_failure_keeps_previous_plugin() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "red", r#"{"entry": "paint"}"#);
        write_manifest(dir.path(), "gpu", r#"{"entry": "failing_warm_up"}"#);
        let registry = registry(dir.path());
        registry.load("red").unwrap();
        let before = registry.active().unwrap();

        match registry.load("gpu") {
            Err(PluginError::LoadError { id, reason }) => {
                assert_eq!(id, "gpu");
                assert!(reason.contains("warm-up failed"));
                assert!(reason.contains("CUDA device unavailable"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Arc::ptr_eq(&before, &registry.active().unwrap()));
    }

    #[test]
    fn test_non_processing_plugin_loads_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "idle", r#"{"entry": "no_process"}"#);
        let logs = Arc::new(LogSink::new());
        let mut registry = PluginRegistry::empty(dir.path(), logs.clone());
        registry.register("no_process", no_process);

        registry.load("idle").unwrap();
        assert_eq!(registry.active_id().as_deref(), Some("idle"));
        assert!(!registry.active().unwrap().lock().processes_frames());
        assert!(logs
            .recent(10)
            .iter()
            .any(|e| e.message.contains("does not process frames")));
    }

    #[test]
    fn test_missing_manifest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        let registry = registry(dir.path());
        assert!(matches!(
            registry.load("empty"),
            Err(PluginError::NotFound(_))
        ));
        assert!(registry.active().is_none());
    }

    #[test]
    fn test_swap_and_unload() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "red", r#"{"entry": "paint", "name": "Red"}"#);
        write_manifest(
            dir.path(),
            "blue",
            r#"{"entry": "paint", "settings": {"color": [0, 0, 255]}}"#,
        );
        let registry = registry(dir.path());

        registry.load("red").unwrap();
        let held = registry.active().unwrap();
        registry.load("blue").unwrap();

        // a reader holding the old plugin keeps a complete, usable instance
        assert_eq!(held.name(), "Red");
        assert_eq!(registry.active().unwrap().name(), "blue");

        assert_eq!(registry.unload().as_deref(), Some("blue"));
        assert!(registry.active().is_none());
        assert_eq!(registry.unload(), None);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = registry(Path::new("."));
        let entries = registry.entries();
        for name in ["edges", "grayscale", "motion", "overlay"] {
            assert!(entries.iter().any(|e| e == name), "missing {}", name);
        }
    }
}
