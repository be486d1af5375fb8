use crate::manifest::BackupRootFolder;
use crate::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Every backup root known locally, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupStorage {
    backups: Vec<BackupRootFolder>,
}

impl BackupStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `backup`, replacing any stored root with the same token.
    pub fn add(&mut self, backup: BackupRootFolder) {
        match self.backups.iter_mut().find(|b| b.token == backup.token) {
            Some(existing) => *existing = backup,
            None => self.backups.push(backup),
        }
    }

    pub fn get(&self, token: &str) -> Option<&BackupRootFolder> {
        self.backups.iter().find(|b| b.token == token)
    }

    pub fn delete(&mut self, token: &str) -> Option<BackupRootFolder> {
        let index = self.backups.iter().position(|b| b.token == token)?;
        Some(self.backups.remove(index))
    }

    pub fn backups(&self) -> &[BackupRootFolder] {
        &self.backups
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}

/// Handle on the JSON file holding a [`BackupStorage`].
///
/// Every mutation reloads the file, applies the change and writes it back
/// while holding an async lock, so concurrent runs in one process never
/// interleave a read-modify-write cycle. Writes go through a temporary file
/// in the same directory and are renamed into place.
#[derive(Debug)]
pub struct BackupStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl BackupStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the store; a missing file is an empty store.
    pub async fn load(&self) -> Result<BackupStorage> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BackupStorage::new());
            }
            Err(e) => return Err(e.into()),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(BackupStorage::new());
        }

        let backups: Vec<BackupRootFolder> =
            serde_json::from_slice(&data).map_err(|e| Error::StoreCorrupted {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(BackupStorage { backups })
    }

    pub async fn save(&self, storage: &BackupStorage) -> Result<()> {
        let json = serde_json::to_vec_pretty(&storage.backups)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("Store writer task failed: {}", e)))??;

        debug!(path = %self.path.display(), backups = storage.len(), "Saved backup store");
        Ok(())
    }

    /// Runs `apply` against a freshly loaded store and saves the result.
    pub async fn transaction<F, T>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut BackupStorage) -> Result<T>,
    {
        let _guard = self.lock.lock().await;
        let mut storage = self.load().await?;
        let out = apply(&mut storage)?;
        self.save(&storage).await?;
        Ok(out)
    }

    pub async fn get(&self, token: &str) -> Result<BackupRootFolder> {
        let _guard = self.lock.lock().await;
        self.load()
            .await?
            .get(token)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                token: token.to_string(),
            })
    }

    /// Upserts one root.
    pub async fn put(&self, backup: &BackupRootFolder) -> Result<()> {
        let backup = backup.clone();
        self.transaction(move |storage| {
            storage.add(backup);
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, token: &str) -> Result<BackupRootFolder> {
        self.transaction(|storage| {
            storage.delete(token).ok_or_else(|| Error::NotFound {
                token: token.to_string(),
            })
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<BackupRootFolder>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.backups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileUpload;
    use tempfile::TempDir;

    #[test]
    fn test_add_is_upsert_by_token() {
        let mut storage = BackupStorage::new();
        let first = BackupRootFolder::new("first");
        let mut second = first.clone();
        second.folder.name = "second".to_string();

        storage.add(first);
        storage.add(second);

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.backups()[0].name(), "second");
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::open(dir.path().join("backups.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::open(dir.path().join("nested").join("backups.json"));

        let mut root = BackupRootFolder::new("docs");
        root.folder
            .add_child(FileUpload::single("a.txt", dir.path().join("a.txt")))
            .unwrap();
        store.put(&root).await.unwrap();
        store.put(&BackupRootFolder::new("other")).await.unwrap();

        let loaded = store.get(&root.token).await.unwrap();
        assert_eq!(loaded, root);
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.delete(&root.token).await.unwrap();
        assert!(matches!(
            store.get(&root.token).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(&root.token).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_is_plain_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backups.json");
        let store = BackupStore::open(&path);
        store.put(&BackupRootFolder::new("docs")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_array());
        assert_eq!(raw[0]["name"], "docs");
    }

    #[tokio::test]
    async fn test_corrupted_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backups.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = BackupStore::open(&path);
        assert!(matches!(
            store.load().await,
            Err(Error::StoreCorrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_every_token() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(BackupStore::open(dir.path().join("backups.json")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(&BackupRootFolder::new(format!("run-{}", i))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list().await.unwrap().len(), 8);
    }
}
