use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::atomic_write;

const FLUSH_EVERY: usize = 32;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed fingerprint cache {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Persistent `image_uri -> md5_hex` map, one file per user.
///
/// Writes are coalesced: the file is rewritten atomically after every
/// [`FLUSH_EVERY`] dirty entries and on [`FingerprintCache::flush`].
/// Entries for images the engine replaces or deletes must be removed so a
/// stale hash never masks a changed remote.
pub struct FingerprintCache {
    inner: Mutex<Inner>,
}

struct Inner {
    path: PathBuf,
    entries: HashMap<String, String>,
    dirty: usize,
}

impl FingerprintCache {
    pub fn load(path: PathBuf) -> Result<Self, CacheError> {
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                CacheError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            inner: Mutex::new(Inner {
                path,
                entries,
                dirty: 0,
            }),
        })
    }

    pub async fn get(&self, image_uri: &str) -> Option<String> {
        self.inner.lock().await.entries.get(image_uri).cloned()
    }

    pub async fn insert(&self, image_uri: &str, md5_hex: &str) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        let value = md5_hex.to_ascii_lowercase();
        if inner.entries.get(image_uri) == Some(&value) {
            return Ok(());
        }
        inner.entries.insert(image_uri.to_string(), value);
        Self::mark_dirty(&mut inner)
    }

    pub async fn remove(&self, image_uri: &str) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        if inner.entries.remove(image_uri).is_none() {
            return Ok(());
        }
        Self::mark_dirty(&mut inner)
    }

    pub async fn flush(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        if inner.dirty == 0 {
            return Ok(());
        }
        Self::write(&mut inner)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.inner.lock().await.entries.clone()
    }

    fn mark_dirty(inner: &mut Inner) -> Result<(), CacheError> {
        inner.dirty += 1;
        if inner.dirty >= FLUSH_EVERY {
            return Self::write(inner);
        }
        Ok(())
    }

    fn write(inner: &mut Inner) -> Result<(), CacheError> {
        // BTreeMap view keeps the on-disk representation stable.
        let ordered: BTreeMap<&String, &String> = inner.entries.iter().collect();
        let bytes = serde_json::to_vec_pretty(&ordered).expect("fingerprint map serialize");
        atomic_write(&inner.path, &bytes)?;
        inner.dirty = 0;
        Ok(())
    }
}
