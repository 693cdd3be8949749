use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use crate::ignore::IgnorePatternSet;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("i/o error under \"{path}\": {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalEntryKind {
    Dir,
    File {
        size: u64,
        mtime: Option<SystemTime>,
    },
    /// Path matched the ignore set; yielded so callers can log the skip.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: LocalEntryKind,
}

/// Lists one directory level, lexicographically by base name.
///
/// Hidden entries (leading `.`) are dropped outright and symlinks are
/// never followed.
pub async fn scan(dir: &Path, ignore: &IgnorePatternSet) -> Result<Vec<LocalEntry>, ScanError> {
    let io_err = |source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut reader = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(io_err)? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }
        let file_type = entry.file_type().await.map_err(io_err)?;
        if file_type.is_symlink() {
            continue;
        }
        let path = entry.path();
        if ignore.matches(&path) {
            entries.push(LocalEntry {
                path,
                file_name,
                kind: LocalEntryKind::Ignored,
            });
            continue;
        }
        let kind = if file_type.is_dir() {
            LocalEntryKind::Dir
        } else {
            let metadata = entry.metadata().await.map_err(io_err)?;
            LocalEntryKind::File {
                size: metadata.len(),
                mtime: metadata.modified().ok(),
            }
        };
        entries.push(LocalEntry {
            path,
            file_name,
            kind,
        });
    }
    entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(entries)
}

/// Streams a file through md5 and returns the lowercase hex digest.
pub async fn file_md5(path: &Path) -> std::io::Result<String> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// True when the file's extension is in the configured media set.
pub fn is_media(file_name: &str, extensions: &[String]) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.trim().to_ascii_lowercase();
            extensions.iter().any(|candidate| *candidate == ext)
        })
        .unwrap_or(false)
}
