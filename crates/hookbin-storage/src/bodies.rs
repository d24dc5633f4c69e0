//! Request body blob storage.
//!
//! Bodies are written once and never modified. Each body is addressed by a
//! relative reference `{token_id}/{request_id}`, so removing a token's
//! bodies is a single directory removal.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{Result, StorageError};

/// Where request bodies are kept.
#[derive(Clone, Debug)]
pub enum BodyStore {
    /// One file per body under a root directory.
    Disk { root: PathBuf },
    /// Process memory, for tests and ephemeral servers.
    Memory(Arc<Mutex<HashMap<String, Vec<u8>>>>),
}

impl BodyStore {
    /// Creates a disk store rooted at `root`, creating the directory.
    pub fn disk(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(BodyStore::Disk { root })
    }

    /// Creates an empty in-memory store.
    pub fn memory() -> Self {
        BodyStore::Memory(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Builds the reference for a request body.
    pub fn body_ref(token_id: &str, request_id: &str) -> String {
        format!("{}/{}", token_id, request_id)
    }

    /// Writes a body and returns its reference.
    ///
    /// On disk the body goes to a temporary file first and is renamed into
    /// place, so a reference never points at a partial body.
    pub fn write(&self, token_id: &str, request_id: &str, body: &[u8]) -> Result<String> {
        let body_ref = Self::body_ref(token_id, request_id);

        match self {
            BodyStore::Disk { root } => {
                let path = resolve(root, &body_ref)?;
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let tmp = path.with_extension("tmp");
                fs::write(&tmp, body)?;
                if let Err(e) = fs::rename(&tmp, &path) {
                    let _ = fs::remove_file(&tmp);
                    return Err(e.into());
                }
            }
            BodyStore::Memory(map) => {
                lock(map)?.insert(body_ref.clone(), body.to_vec());
            }
        }

        debug!(body_ref = %body_ref, len = body.len(), "Body stored");
        Ok(body_ref)
    }

    /// Reads a body by reference.
    pub fn read(&self, body_ref: &str) -> Result<Vec<u8>> {
        match self {
            BodyStore::Disk { root } => {
                let path = resolve(root, body_ref)?;
                fs::read(&path).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => StorageError::NotFound(format!("body {}", body_ref)),
                    _ => e.into(),
                })
            }
            BodyStore::Memory(map) => lock(map)?
                .get(body_ref)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("body {}", body_ref))),
        }
    }

    /// Deletes a body. Deleting a missing body is not an error.
    pub fn delete(&self, body_ref: &str) -> Result<()> {
        match self {
            BodyStore::Disk { root } => {
                let path = resolve(root, body_ref)?;
                match fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            BodyStore::Memory(map) => {
                lock(map)?.remove(body_ref);
                Ok(())
            }
        }
    }

    /// Deletes every body of a token.
    pub fn delete_token(&self, token_id: &str) -> Result<()> {
        match self {
            BodyStore::Disk { root } => {
                let dir = resolve(root, token_id)?;
                match fs::remove_dir_all(&dir) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            BodyStore::Memory(map) => {
                let prefix = format!("{}/", token_id);
                lock(map)?.retain(|k, _| !k.starts_with(&prefix));
                Ok(())
            }
        }
    }
}

/// Joins a reference onto the root, rejecting anything that escapes it.
fn resolve(root: &Path, body_ref: &str) -> Result<PathBuf> {
    let relative = Path::new(body_ref);
    let is_plain = !body_ref.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

    if !is_plain {
        return Err(StorageError::InvalidBodyRef(body_ref.to_string()));
    }
    Ok(root.join(relative))
}

fn lock(
    map: &Mutex<HashMap<String, Vec<u8>>>,
) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
    map.lock()
        .map_err(|_| StorageError::Config("Body store poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &BodyStore) {
        let body_ref = store.write("tok", "req-1", b"hello").unwrap();
        assert_eq!(body_ref, "tok/req-1");
        assert_eq!(store.read(&body_ref).unwrap(), b"hello");

        store.write("tok", "req-2", b"second").unwrap();
        store.write("other", "req-3", b"third").unwrap();

        store.delete(&body_ref).unwrap();
        assert!(matches!(
            store.read(&body_ref),
            Err(StorageError::NotFound(_))
        ));
        // Deleting twice is fine
        store.delete(&body_ref).unwrap();

        store.delete_token("tok").unwrap();
        assert!(store.read("tok/req-2").is_err());
        assert_eq!(store.read("other/req-3").unwrap(), b"third");
    }

    #[test]
    fn test_memory_store() {
        exercise(&BodyStore::memory());
    }

    #[test]
    fn test_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = BodyStore::disk(dir.path().join("bodies")).unwrap();
        exercise(&store);

        assert!(!dir.path().join("bodies/tok").exists());
    }

    #[test]
    fn test_disk_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = BodyStore::disk(dir.path()).unwrap();
        store.write("tok", "req", &[0u8, 1, 2]).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("tok"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["req"]);
    }

    #[test]
    fn test_rejects_escaping_refs() {
        let dir = tempfile::tempdir().unwrap();
        let store = BodyStore::disk(dir.path()).unwrap();

        for bad in ["../etc/passwd", "/etc/passwd", "", "a/../../b"] {
            assert!(
                matches!(store.read(bad), Err(StorageError::InvalidBodyRef(_))),
                "{bad}"
            );
        }
    }
}
