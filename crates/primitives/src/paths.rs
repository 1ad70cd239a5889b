//! Object-to-path mappings.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::image::Image;
use crate::update::Domain;

/// Removing this path drops every path of the object.
pub const ALL_PATHS: &str = "__ALL_PATHS__";

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PathsUpdate {
    pub changes: Vec<PathChange>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PathChange {
    pub object: String,
    #[serde(default)]
    pub added: BTreeSet<String>,
    #[serde(default)]
    pub removed: BTreeSet<String>,
}

impl PathsUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the change entry for `object`, creating it on first use.
    pub fn object(&mut self, object: impl Into<String>) -> &mut PathChange {
        let object = object.into();

        let idx = match self.changes.iter().position(|c| c.object == object) {
            Some(idx) => idx,
            None => {
                self.changes.push(PathChange::new(object));
                self.changes.len() - 1
            }
        };

        &mut self.changes[idx]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.added.is_empty() && c.removed.is_empty())
    }
}

impl PathChange {
    #[must_use]
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    pub fn add_path(&mut self, path: impl Into<String>) -> &mut Self {
        let _ = self.added.insert(path.into());
        self
    }

    pub fn remove_path(&mut self, path: impl Into<String>) -> &mut Self {
        let _ = self.removed.insert(path.into());
        self
    }

    pub fn remove_all(&mut self) -> &mut Self {
        self.remove_path(ALL_PATHS)
    }
}

/// Current object → paths mapping.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathsImage {
    objects: BTreeMap<String, BTreeSet<String>>,
}

impl PathsImage {
    #[must_use]
    pub fn paths(&self, object: &str) -> Option<&BTreeSet<String>> {
        self.objects.get(object)
    }

    pub fn objects(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Image for PathsImage {
    type Payload = PathsUpdate;

    const DOMAIN: Domain = Domain::Paths;

    fn apply(&mut self, payload: &PathsUpdate) {
        for change in &payload.changes {
            if change.removed.contains(ALL_PATHS) {
                let _ = self.objects.remove(&change.object);
            } else if let Some(paths) = self.objects.get_mut(&change.object) {
                paths.retain(|p| !change.removed.contains(p));
            }

            if !change.added.is_empty() {
                self.objects
                    .entry(change.object.clone())
                    .or_default()
                    .extend(change.added.iter().cloned());
            }

            if self
                .objects
                .get(&change.object)
                .is_some_and(BTreeSet::is_empty)
            {
                let _ = self.objects.remove(&change.object);
            }
        }
    }

    fn snapshot(&self) -> PathsUpdate {
        let changes = self
            .objects
            .iter()
            .map(|(object, paths)| PathChange {
                object: object.clone(),
                added: paths.clone(),
                removed: BTreeSet::new(),
            })
            .collect();

        PathsUpdate { changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with(object: &str, paths: &[&str]) -> PathsImage {
        let mut update = PathsUpdate::new();
        let change = update.object(object);
        for path in paths {
            let _ = change.add_path(*path);
        }

        let mut image = PathsImage::default();
        image.apply(&update);
        image
    }

    #[test]
    fn test_object_entry_is_reused() {
        let mut update = PathsUpdate::new();
        let _ = update.object("db1.tbl1").add_path("/warehouse/db1/tbl1");
        let _ = update.object("db1.tbl1").add_path("/warehouse/db1/tbl1/p=1");

        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].added.len(), 2);
    }

    #[test]
    fn test_apply_removes_then_adds() {
        let mut image = image_with("db1", &["/a", "/b"]);

        let mut update = PathsUpdate::new();
        let _ = update.object("db1").remove_path("/a").add_path("/c");
        image.apply(&update);

        let paths: Vec<_> = image.paths("db1").unwrap().iter().cloned().collect();
        assert_eq!(paths, ["/b", "/c"]);
    }

    #[test]
    fn test_remove_all_drops_object() {
        let mut image = image_with("db1", &["/a", "/b"]);

        let mut update = PathsUpdate::new();
        let _ = update.object("db1").remove_all();
        image.apply(&update);

        assert!(image.paths("db1").is_none());
        assert!(image.is_empty());
    }

    #[test]
    fn test_snapshot_restores_identical_image() {
        let image = image_with("db1.tbl", &["/x", "/y"]);

        let mut restored = image_with("other", &["/z"]);
        restored.restore(&image.snapshot());

        assert_eq!(restored, image);
    }

    #[test]
    fn test_empty_update() {
        let mut update = PathsUpdate::new();
        assert!(update.is_empty());
        let _ = update.object("db");
        assert!(update.is_empty());
    }
}
