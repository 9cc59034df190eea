use chrono::{DateTime, Utc};
use sanitize_filename::sanitize;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("not found")]
    NotFound,
    #[error("invalid key")]
    InvalidKey,
}

/// One directory entry as the filesystem reports it. Size and mtime come
/// from metadata, never from the uploader.
#[derive(Debug, Clone)]
pub struct StorageEntry {
    pub storage_key: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Wraps the uploads directory. Files are keyed by a server-generated
/// name; the user-supplied filename only ever contributes its extension.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

const TMP_SUFFIX: &str = ".part";

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Writes `content` under a freshly generated key and returns it.
    /// The write goes to a hidden temp name first and is renamed into
    /// place, so a crash mid-write never leaves a visible half-file.
    pub fn save(&self, display_name: &str, content: &[u8]) -> Result<String, StorageError> {
        let storage_key = generate_key(display_name);
        let tmp = self.root.join(format!(".{storage_key}{TMP_SUFFIX}"));
        let dest = self.root.join(&storage_key);

        let mut f = fs::File::create(&tmp)?;
        if let Err(e) = f.write_all(content).and_then(|_| f.sync_all()) {
            drop(f);
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        drop(f);
        if let Err(e) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(storage_key)
    }

    /// Enumerates stored files. A missing or unreadable directory is
    /// reported as "no files yet" rather than an error.
    pub fn list(&self) -> Vec<StorageEntry> {
        let entries = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) => {
                log::warn!("cannot read uploads dir {:?}: {e}", self.root);
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(_) => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(StorageEntry {
                storage_key: name,
                size_bytes: meta.len(),
                modified_at,
            });
        }
        out
    }

    /// Deletes the entry. `NotFound` means it was already gone, which
    /// callers treat as an ordinary outcome, not an I/O failure.
    pub fn remove(&self, storage_key: &str) -> Result<(), StorageError> {
        validate_key(storage_key)?;
        match fs::remove_file(self.root.join(storage_key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a key to its on-disk path for retrieval. The key is
    /// validated before any filesystem access.
    pub fn open(&self, storage_key: &str) -> Result<PathBuf, StorageError> {
        validate_key(storage_key)?;
        let path = self.root.join(storage_key);
        match fs::metadata(&path) {
            Ok(m) if m.is_file() => Ok(path),
            Ok(_) => Err(StorageError::NotFound),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// `{uuid}.{ext}`: collision-free under concurrent uploads with no
/// shared counter. Only the sanitized extension of the display name is
/// carried over.
fn generate_key(display_name: &str) -> String {
    let safe = sanitize(display_name);
    let ext = Path::new(&safe)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("bin");
    format!("{}.{}", uuid::Uuid::new_v4(), ext)
}

/// A key must be a single plain path component: no separators, no `..`,
/// no absolute paths, no dotfiles (which also covers in-flight temp
/// files).
fn validate_key(storage_key: &str) -> Result<(), StorageError> {
    if storage_key.is_empty()
        || storage_key.starts_with('.')
        || storage_key.contains('/')
        || storage_key.contains('\\')
    {
        return Err(StorageError::InvalidKey);
    }
    let mut components = Path::new(storage_key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StorageError::InvalidKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("uploads")).unwrap();
        (dir, storage)
    }

    #[test]
    fn save_generates_unique_keys_for_same_display_name() {
        let (_dir, storage) = scratch();
        let a = storage.save("photo.jpg", b"one").unwrap();
        let b = storage.save("photo.jpg", b"two").unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        assert!(b.ends_with(".jpg"));
        assert_eq!(storage.list().len(), 2);
    }

    #[test]
    fn save_keeps_extension_only() {
        let (_dir, storage) = scratch();
        let key = storage.save("../../etc/passwd.txt", b"x").unwrap();
        assert!(key.ends_with(".txt"));
        assert!(!key.contains(".."));
        assert!(!key.contains('/'));
    }

    #[test]
    fn save_without_extension_defaults_to_bin() {
        let (_dir, storage) = scratch();
        let key = storage.save("README", b"x").unwrap();
        assert!(key.ends_with(".bin"));
    }

    #[test]
    fn list_reports_actual_size_and_skips_temp_files() {
        let (_dir, storage) = scratch();
        let key = storage.save("report.pdf", &[0u8; 37888]).unwrap();
        std::fs::write(storage.root.join(".orphan.bin.part"), b"junk").unwrap();
        let entries = storage.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].storage_key, key);
        assert_eq!(entries[0].size_bytes, 37888);
    }

    #[test]
    fn list_on_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("uploads")).unwrap();
        std::fs::remove_dir(dir.path().join("uploads")).unwrap();
        assert!(storage.list().is_empty());
    }

    #[test]
    fn remove_twice_yields_not_found() {
        let (_dir, storage) = scratch();
        let key = storage.save("a.txt", b"x").unwrap();
        storage.remove(&key).unwrap();
        assert!(matches!(storage.remove(&key), Err(StorageError::NotFound)));
    }

    #[test]
    fn open_rejects_traversal_keys_before_touching_disk() {
        let (_dir, storage) = scratch();
        for key in ["../../etc/passwd", "..", "a/b.txt", "a\\b.txt", "/etc/passwd", "", ".hidden"] {
            assert!(
                matches!(storage.open(key), Err(StorageError::InvalidKey)),
                "key {key:?} should be invalid"
            );
            assert!(matches!(storage.remove(key), Err(StorageError::InvalidKey)));
        }
    }

    #[test]
    fn open_missing_key_is_not_found() {
        let (_dir, storage) = scratch();
        assert!(matches!(
            storage.open("00000000-0000-0000-0000-000000000000.bin"),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn open_returns_path_of_saved_file() {
        let (_dir, storage) = scratch();
        let key = storage.save("notes.txt", b"hello").unwrap();
        let path = storage.open(&key).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }
}
