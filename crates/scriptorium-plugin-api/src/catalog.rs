//! In-memory catalog of validated plugins.

use crate::descriptor::{PluginDescriptor, PluginKind};
use std::collections::HashMap;

/// Plugins keyed by id.
///
/// A catalog is built by one scan and never touches disk afterwards. Hosts
/// replace it wholesale on rescan.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    plugins: HashMap<String, PluginDescriptor>,
}

impl PluginCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor, returning the one it replaced, if any.
    pub fn insert(&mut self, descriptor: PluginDescriptor) -> Option<PluginDescriptor> {
        self.plugins.insert(descriptor.id.clone(), descriptor)
    }

    /// Look up a plugin by id.
    pub fn find_by_id(&self, id: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(id)
    }

    /// All plugins of one kind, sorted by name then id.
    pub fn list_by_kind(&self, kind: PluginKind) -> Vec<&PluginDescriptor> {
        let mut plugins: Vec<_> = self.plugins.values().filter(|p| p.kind == kind).collect();
        sort_for_display(&mut plugins);
        plugins
    }

    /// All plugins, sorted by name then id.
    pub fn list_all(&self) -> Vec<&PluginDescriptor> {
        let mut plugins: Vec<_> = self.plugins.values().collect();
        sort_for_display(&mut plugins);
        plugins
    }

    /// Enable or disable a plugin. Returns `false` if the id is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.plugins.get_mut(id) {
            Some(descriptor) => {
                descriptor.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Plugin ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

fn sort_for_display(plugins: &mut [&PluginDescriptor]) {
    plugins.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(id: &str, name: &str, kind: PluginKind) -> PluginDescriptor {
        PluginDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            kind,
            root_dir: PathBuf::from("/plugins").join(id),
            entry_point: PathBuf::from("main.rhai"),
            enabled: true,
            description: None,
            authors: Vec::new(),
            engine: "rhai".to_string(),
            search_paths: Vec::new(),
            manifest_path: PathBuf::from("/plugins").join(id).join("manifest.toml"),
        }
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut catalog = PluginCatalog::new();
        assert!(catalog
            .insert(descriptor("wc", "Word Count", PluginKind::Validation))
            .is_none());

        let replaced = catalog.insert(descriptor("wc", "Word Count", PluginKind::Edit));
        assert_eq!(replaced.map(|d| d.kind), Some(PluginKind::Validation));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find_by_id("wc").unwrap().kind, PluginKind::Edit);
    }

    #[test]
    fn test_listing_is_sorted() {
        let mut catalog = PluginCatalog::new();
        catalog.insert(descriptor("zeta", "Beta", PluginKind::Edit));
        catalog.insert(descriptor("alpha", "Beta", PluginKind::Edit));
        catalog.insert(descriptor("spell", "Alpha", PluginKind::Validation));

        let names: Vec<_> = catalog.list_all().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(names, vec!["spell", "alpha", "zeta"]);

        let edits: Vec<_> = catalog
            .list_by_kind(PluginKind::Edit)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(edits, vec!["alpha", "zeta"]);
        assert!(catalog.list_by_kind(PluginKind::Output).is_empty());
    }

    #[test]
    fn test_set_enabled() {
        let mut catalog = PluginCatalog::new();
        catalog.insert(descriptor("wc", "Word Count", PluginKind::Validation));

        assert!(catalog.set_enabled("wc", false));
        assert!(!catalog.find_by_id("wc").unwrap().enabled);
        assert!(!catalog.set_enabled("missing", false));
    }
}
