//! File → owning-tool resolution.
//!
//! Given an arbitrary path, walk its parents to the nearest directory
//! holding `pai-manifest.yaml` and answer with that manifest's name, but
//! only when the tool is actually registered (stubs do not count).
//! Resolved manifest locations are cached for the lifetime of one
//! mapper, so CI batches over many files stay cheap.

use pai_manifest::{load_manifest, MANIFEST_FILE_NAME};
use pai_registry::Store;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps filesystem paths back to registered tools.
pub struct FileToolMapper<'a> {
    store: &'a Store,
    /// Directory → resolved tool name (None caches a miss).
    cache: HashMap<PathBuf, Option<String>>,
}

impl<'a> FileToolMapper<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// The registered tool owning `path`, if any.
    pub fn map_file(&mut self, path: &Path) -> Option<String> {
        let start = if path.is_dir() {
            path.to_path_buf()
        } else {
            path.parent()?.to_path_buf()
        };

        let mut walked: Vec<PathBuf> = Vec::new();
        let mut cursor = Some(start);
        let mut resolved: Option<String> = None;
        while let Some(dir) = cursor {
            if let Some(cached) = self.cache.get(&dir) {
                resolved = cached.clone();
                break;
            }
            walked.push(dir.clone());
            if dir.join(MANIFEST_FILE_NAME).is_file() {
                resolved = self.resolve_dir(&dir);
                break;
            }
            cursor = dir.parent().map(Path::to_path_buf);
        }

        // Every directory walked resolves to the same answer.
        for dir in walked {
            self.cache.insert(dir, resolved.clone());
        }
        resolved
    }

    /// Groups `paths` by owning tool, dropping paths owned by nothing.
    pub fn map_files(&mut self, paths: &[PathBuf]) -> BTreeMap<String, Vec<PathBuf>> {
        let mut out: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for path in paths {
            if let Some(tool) = self.map_file(path) {
                out.entry(tool).or_default().push(path.clone());
            }
        }
        out
    }

    fn resolve_dir(&self, dir: &Path) -> Option<String> {
        let manifest = match load_manifest(dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "unparseable manifest during mapping");
                return None;
            }
        };
        match self.store.get_tool(&manifest.name) {
            Ok(Some(tool)) if !tool.is_stub => Some(manifest.name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pai_registry::register_path;

    fn tool_dir(root: &Path, rel: &str, name: &str) -> PathBuf {
        let dir = root.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE_NAME),
            format!("name: {name}\nkind: cli\n"),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_maps_file_to_registered_tool() {
        let root = tempfile::tempdir().unwrap();
        let dir = tool_dir(root.path(), "email", "email");
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/main.ts"), "x").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        register_path(&mut store, &dir).unwrap();

        let mut mapper = FileToolMapper::new(&store);
        assert_eq!(
            mapper.map_file(&dir.join("src/main.ts")),
            Some("email".to_string())
        );
        assert_eq!(mapper.map_file(&dir), Some("email".to_string()));
    }

    #[test]
    fn test_unregistered_tool_maps_to_none() {
        let root = tempfile::tempdir().unwrap();
        let dir = tool_dir(root.path(), "email", "email");
        std::fs::write(dir.join("file.ts"), "x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let mut mapper = FileToolMapper::new(&store);
        assert_eq!(mapper.map_file(&dir.join("file.ts")), None);
    }

    #[test]
    fn test_stub_does_not_count_as_registered() {
        let root = tempfile::tempdir().unwrap();
        // A manifest on disk for a tool the registry only knows as a stub.
        let consumer = tool_dir(root.path(), "consumer", "consumer");
        std::fs::write(
            consumer.join(MANIFEST_FILE_NAME),
            "name: consumer\nkind: cli\ndepends_on:\n  - name: resona\n    kind: library\n",
        )
        .unwrap();
        let resona = tool_dir(root.path(), "resona", "resona");

        let mut store = Store::open_in_memory().unwrap();
        register_path(&mut store, &consumer).unwrap();

        let mut mapper = FileToolMapper::new(&store);
        assert_eq!(mapper.map_file(&resona.join("anything.ts")), None);
    }

    #[test]
    fn test_no_manifest_anywhere() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("plain")).unwrap();
        let store = Store::open_in_memory().unwrap();
        let mut mapper = FileToolMapper::new(&store);
        assert_eq!(mapper.map_file(&root.path().join("plain/file")), None);
    }

    #[test]
    fn test_map_files_groups_by_tool() {
        let root = tempfile::tempdir().unwrap();
        let email = tool_dir(root.path(), "email", "email");
        let calendar = tool_dir(root.path(), "calendar", "calendar");
        for dir in [&email, &calendar] {
            std::fs::create_dir_all(dir.join("src")).unwrap();
            std::fs::write(dir.join("src/a.ts"), "x").unwrap();
        }
        std::fs::write(email.join("src/b.ts"), "x").unwrap();

        let mut store = Store::open_in_memory().unwrap();
        register_path(&mut store, &email).unwrap();
        register_path(&mut store, &calendar).unwrap();

        let mut mapper = FileToolMapper::new(&store);
        let grouped = mapper.map_files(&[
            email.join("src/a.ts"),
            email.join("src/b.ts"),
            calendar.join("src/a.ts"),
            root.path().join("orphan.ts"),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["email"].len(), 2);
        assert_eq!(grouped["calendar"].len(), 1);
    }
}
