//! Durable key-value persistence of JSON documents, scoped by deployment
//! environment.
//!
//! Every `(scope, slot)` pair maps to one file under the store root. Writes
//! replace the whole document in a single visible step (temp file in the same
//! directory, then rename), so a concurrent reader observes either the old or
//! the new document but never a partial one.

use {
    anyhow::{Context, Result},
    serde::{Serialize, de::DeserializeOwned},
    std::{
        fs,
        io::ErrorKind,
        path::{Path, PathBuf},
    },
};

pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reads the document stored in `slot`. A slot that has never been
    /// written yields `Ok(None)`; that is the normal fresh-run case, not an
    /// error.
    pub fn load<T: DeserializeOwned>(&self, scope: &str, slot: &str) -> Result<Option<T>> {
        let path = self.slot_path(scope, slot);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading checkpoint {}", path.display()));
            }
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed checkpoint document {}", path.display()))
            .map(Some)
    }

    /// Overwrites the slot's entire prior content. Creates the scope's
    /// directory on first write.
    pub fn save<T: Serialize>(&self, scope: &str, slot: &str, value: &T) -> Result<()> {
        let dir = self.root.join(scope);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating checkpoint scope {}", dir.display()))?;
        let path = self.slot_path(scope, slot);
        let mut file = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(file.as_file_mut(), value)
            .with_context(|| format!("serializing checkpoint {scope}/{slot}"))?;
        file.as_file().sync_all().context("syncing checkpoint")?;
        file.persist(&path)
            .with_context(|| format!("replacing checkpoint {}", path.display()))?;
        tracing::debug!(scope, slot, "checkpoint saved");
        Ok(())
    }

    /// Whether the slot has ever been written.
    pub fn exists(&self, scope: &str, slot: &str) -> bool {
        self.slot_path(scope, slot).exists()
    }

    /// Deletes the slot. Removing a slot that was never written is fine.
    pub fn remove(&self, scope: &str, slot: &str) -> Result<()> {
        let path = self.slot_path(scope, slot);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(scope, slot, "checkpoint removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing checkpoint {}", path.display())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, scope: &str, slot: &str) -> PathBuf {
        self.root.join(scope).join(format!("{slot}.json"))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde::Deserialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Document {
        cursor: usize,
        label: String,
    }

    fn document(cursor: usize) -> Document {
        Document {
            cursor,
            label: "load".to_string(),
        }
    }

    #[test]
    fn load_of_unwritten_slot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let loaded: Option<Document> = store.load("staging", "progress").unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save("staging", "progress", &document(7)).unwrap();
        let loaded: Option<Document> = store.load("staging", "progress").unwrap();
        assert_eq!(loaded, Some(document(7)));
    }

    #[test]
    fn save_overwrites_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save("staging", "progress", &document(3)).unwrap();
        store.save("staging", "progress", &document(6)).unwrap();
        let loaded: Option<Document> = store.load("staging", "progress").unwrap();
        assert_eq!(loaded, Some(document(6)));
    }

    #[test]
    fn scopes_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save("staging", "progress", &document(1)).unwrap();
        store.save("mainnet", "progress", &document(2)).unwrap();
        let staging: Option<Document> = store.load("staging", "progress").unwrap();
        let mainnet: Option<Document> = store.load("mainnet", "progress").unwrap();
        assert_eq!(staging, Some(document(1)));
        assert_eq!(mainnet, Some(document(2)));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save("staging", "progress", &document(1)).unwrap();
        store.remove("staging", "progress").unwrap();
        store.remove("staging", "progress").unwrap();
        let loaded: Option<Document> = store.load("staging", "progress").unwrap();
        assert_eq!(loaded, None);
        assert!(!store.exists("staging", "progress"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        std::fs::create_dir_all(dir.path().join("staging")).unwrap();
        std::fs::write(dir.path().join("staging/progress.json"), "{not json").unwrap();
        assert!(store.load::<Document>("staging", "progress").is_err());
    }
}
