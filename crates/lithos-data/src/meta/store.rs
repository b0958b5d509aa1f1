// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use lithos_core::resource::{ResourceError, ResourceMetadata, ResourceUUID};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the record store inside the metadata folder.
const META_FILE_NAME: &str = "resources.meta";

/// The persistent mapping between resource UUIDs and logical file paths.
///
/// Two mutual-inverse indexes (`uuid → record` and `path → uuid`) are kept in
/// lock-step: every mutation runs under one internal mutex and updates both,
/// so the mappings can never drift apart. Mutations are write-through — the
/// full record set is re-encoded and written to disk before the call returns,
/// and a failed write rolls the in-memory change back so memory and disk never
/// stay inconsistent for longer than one operation.
pub struct MetadataStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    by_uuid: HashMap<ResourceUUID, ResourceMetadata>,
    by_path: HashMap<PathBuf, ResourceUUID>,
    meta_file: PathBuf,
}

impl MetadataStore {
    /// Opens the store rooted at `folder`, creating the folder if absent and
    /// eagerly loading every persisted record into memory.
    ///
    /// # Errors
    /// Returns [`ResourceError::MetadataWrite`] if the folder cannot be
    /// created, [`ResourceError::Io`] if the record file cannot be read, or
    /// [`ResourceError::DecodeFailure`] if its content is malformed.
    pub fn open(folder: &Path) -> Result<Self, ResourceError> {
        std::fs::create_dir_all(folder).map_err(|e| {
            ResourceError::MetadataWrite(format!(
                "cannot create metadata folder '{}': {e}",
                folder.display()
            ))
        })?;

        let meta_file = folder.join(META_FILE_NAME);
        let records = if meta_file.exists() {
            let bytes = std::fs::read(&meta_file).map_err(|e| ResourceError::Io {
                path: meta_file.display().to_string(),
                details: e.to_string(),
            })?;
            let config = bincode::config::standard();
            let (records, _): (Vec<ResourceMetadata>, _) =
                bincode::serde::decode_from_slice(&bytes, config).map_err(|e| {
                    ResourceError::DecodeFailure {
                        path: meta_file.display().to_string(),
                        details: e.to_string(),
                    }
                })?;
            records
        } else {
            Vec::new()
        };

        let mut by_uuid = HashMap::new();
        let mut by_path = HashMap::new();
        for record in records {
            if by_uuid.contains_key(&record.uuid) {
                return Err(ResourceError::DuplicateUuid(record.uuid));
            }
            by_path.insert(record.path.clone(), record.uuid);
            by_uuid.insert(record.uuid, record);
        }

        log::info!(
            "MetadataStore opened at '{}' with {} record(s).",
            folder.display(),
            by_uuid.len()
        );

        Ok(Self {
            inner: Mutex::new(StoreInner {
                by_uuid,
                by_path,
                meta_file,
            }),
        })
    }

    /// Resolves a UUID to the path its resource is persisted at.
    pub fn resolve_path(&self, uuid: ResourceUUID) -> Result<PathBuf, ResourceError> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_uuid
            .get(&uuid)
            .map(|record| record.path.clone())
            .ok_or_else(|| ResourceError::NotFound(uuid.to_string()))
    }

    /// Resolves a path to the UUID of the resource persisted there.
    pub fn resolve_uuid(&self, path: &Path) -> Result<ResourceUUID, ResourceError> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_path
            .get(path)
            .copied()
            .ok_or_else(|| ResourceError::NotFound(path.display().to_string()))
    }

    /// Returns `true` if the UUID has a persisted record.
    pub fn exists_uuid(&self, uuid: ResourceUUID) -> bool {
        self.inner.lock().unwrap().by_uuid.contains_key(&uuid)
    }

    /// Returns `true` if a record is persisted at `path`.
    pub fn exists_path(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().by_path.contains_key(path)
    }

    /// The number of persisted records.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_uuid.len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a record binding a fresh UUID to `path`.
    ///
    /// # Errors
    /// - [`ResourceError::DuplicateUuid`] if the UUID already has a record
    ///   (the caller contract is [`MetadataStore::update`]).
    /// - [`ResourceError::AlreadyExists`] if another record occupies `path`.
    /// - [`ResourceError::MetadataWrite`] if persisting fails; the in-memory
    ///   mutation is rolled back.
    pub fn create(&self, uuid: ResourceUUID, path: &Path) -> Result<(), ResourceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.by_uuid.contains_key(&uuid) {
            return Err(ResourceError::DuplicateUuid(uuid));
        }
        if inner.by_path.contains_key(path) {
            return Err(ResourceError::AlreadyExists(path.display().to_string()));
        }

        inner
            .by_uuid
            .insert(uuid, ResourceMetadata::new(uuid, path));
        inner.by_path.insert(path.to_path_buf(), uuid);

        if let Err(e) = persist(&inner) {
            inner.by_uuid.remove(&uuid);
            inner.by_path.remove(path);
            return Err(e);
        }
        log::debug!("Created metadata record {uuid} -> '{}'.", path.display());
        Ok(())
    }

    /// Repoints an existing record to `new_path`.
    ///
    /// # Errors
    /// - [`ResourceError::NotFound`] if the UUID has no record.
    /// - [`ResourceError::AlreadyExists`] if another record occupies `new_path`.
    /// - [`ResourceError::MetadataWrite`] if persisting fails; the in-memory
    ///   mutation is rolled back.
    pub fn update(&self, uuid: ResourceUUID, new_path: &Path) -> Result<(), ResourceError> {
        let mut inner = self.inner.lock().unwrap();
        let old_path = match inner.by_uuid.get(&uuid) {
            Some(record) => record.path.clone(),
            None => return Err(ResourceError::NotFound(uuid.to_string())),
        };
        if old_path == new_path {
            return Ok(());
        }
        if let Some(other) = inner.by_path.get(new_path) {
            if *other != uuid {
                return Err(ResourceError::AlreadyExists(new_path.display().to_string()));
            }
        }

        inner.by_path.remove(&old_path);
        inner.by_path.insert(new_path.to_path_buf(), uuid);
        inner
            .by_uuid
            .insert(uuid, ResourceMetadata::new(uuid, new_path));

        if let Err(e) = persist(&inner) {
            inner.by_path.remove(new_path);
            inner.by_path.insert(old_path.clone(), uuid);
            inner
                .by_uuid
                .insert(uuid, ResourceMetadata::new(uuid, old_path));
            return Err(e);
        }
        log::debug!("Moved metadata record {uuid} -> '{}'.", new_path.display());
        Ok(())
    }

    /// Deletes the record for `uuid`. A no-op for unknown UUIDs.
    ///
    /// # Errors
    /// [`ResourceError::MetadataWrite`] if persisting fails; the in-memory
    /// mutation is rolled back.
    pub fn remove(&self, uuid: ResourceUUID) -> Result<(), ResourceError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.by_uuid.remove(&uuid) else {
            return Ok(());
        };
        inner.by_path.remove(&record.path);

        if let Err(e) = persist(&inner) {
            inner.by_path.insert(record.path.clone(), uuid);
            inner.by_uuid.insert(uuid, record);
            return Err(e);
        }
        log::debug!("Removed metadata record {uuid}.");
        Ok(())
    }
}

/// Rewrites the full record set to the store file.
fn persist(inner: &StoreInner) -> Result<(), ResourceError> {
    let records: Vec<ResourceMetadata> = inner.by_uuid.values().cloned().collect();
    let config = bincode::config::standard();
    let bytes = bincode::serde::encode_to_vec(&records, config)
        .map_err(|e| ResourceError::MetadataWrite(e.to_string()))?;
    std::fs::write(&inner.meta_file, bytes).map_err(|e| {
        ResourceError::MetadataWrite(format!(
            "cannot write '{}': {e}",
            inner.meta_file.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_and_resolve_both_directions() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();

        let uuid = ResourceUUID::new();
        store.create(uuid, Path::new("textures/rock.tex")).unwrap();

        assert_eq!(
            store.resolve_path(uuid).unwrap(),
            PathBuf::from("textures/rock.tex")
        );
        assert_eq!(
            store.resolve_uuid(Path::new("textures/rock.tex")).unwrap(),
            uuid
        );
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let uuid = ResourceUUID::new();
        {
            let store = MetadataStore::open(dir.path()).unwrap();
            store.create(uuid, Path::new("meshes/ship.mesh")).unwrap();
        }

        let reopened = MetadataStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.resolve_path(uuid).unwrap(),
            PathBuf::from("meshes/ship.mesh")
        );
    }

    #[test]
    fn duplicate_uuid_create_is_rejected() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();

        let uuid = ResourceUUID::new();
        store.create(uuid, Path::new("a.tex")).unwrap();
        assert_eq!(
            store.create(uuid, Path::new("b.tex")),
            Err(ResourceError::DuplicateUuid(uuid))
        );
    }

    #[test]
    fn occupied_path_create_is_rejected() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();

        store.create(ResourceUUID::new(), Path::new("a.tex")).unwrap();
        assert_eq!(
            store.create(ResourceUUID::new(), Path::new("a.tex")),
            Err(ResourceError::AlreadyExists("a.tex".to_string()))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_repoints_and_frees_old_path() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();

        let uuid = ResourceUUID::new();
        store.create(uuid, Path::new("old.tex")).unwrap();
        store.update(uuid, Path::new("new.tex")).unwrap();

        assert_eq!(store.resolve_path(uuid).unwrap(), PathBuf::from("new.tex"));
        assert!(store.resolve_uuid(Path::new("old.tex")).is_err());
        assert!(!store.exists_path(Path::new("old.tex")));
        assert!(store.exists_path(Path::new("new.tex")));
    }

    #[test]
    fn update_unknown_uuid_fails() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        let uuid = ResourceUUID::new();
        assert_eq!(
            store.update(uuid, Path::new("x.tex")),
            Err(ResourceError::NotFound(uuid.to_string()))
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();

        let uuid = ResourceUUID::new();
        store.create(uuid, Path::new("a.tex")).unwrap();
        store.remove(uuid).unwrap();
        assert!(store.is_empty());
        // Second removal of an unknown UUID is a safe no-op.
        store.remove(uuid).unwrap();
    }
}
