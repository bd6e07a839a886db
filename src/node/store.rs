//! Local file storage of one datacenter
//!
//! A node's store is an opaque filename → blob map. Nothing outside the owning
//! node touches it; peers reach it only through vote and replicate requests.

use crate::common::{decode_filename, encode_filename, validate_filename, Error, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Trait for per-node storage backends
pub trait LocalStore: Send + Sync {
    /// Content of `filename`, if stored here.
    fn get(&self, filename: &str) -> Result<Option<Vec<u8>>>;

    /// Persist `content` under `filename`. Returns once the content is durable;
    /// concurrent readers see either the old or the new blob, never a mix.
    fn put(&self, filename: &str, content: &[u8]) -> Result<()>;

    fn exists(&self, filename: &str) -> Result<bool> {
        Ok(self.get(filename)?.is_some())
    }

    /// Stored filenames, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemStore {
    map: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal("store lock poisoned".into())
}

impl LocalStore for MemStore {
    fn get(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().map_err(poisoned)?.get(filename).cloned())
    }

    fn put(&self, filename: &str, content: &[u8]) -> Result<()> {
        self.map
            .write()
            .map_err(poisoned)?
            .insert(filename.to_string(), content.to_vec());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.map.read().map_err(poisoned)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Directory-backed store
///
/// Layout:
/// - `<root>/objects/<encoded filename>`: one blob per file
/// - `<root>/staging/`: in-flight writes, renamed into `objects/` once synced
pub struct FileStore {
    objects: PathBuf,
    staging: PathBuf,
}

impl FileStore {
    /// Open or create a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let objects = root.join("objects");
        let staging = root.join("staging");
        fs::create_dir_all(&objects)?;
        fs::create_dir_all(&staging)?;

        // Leftovers from a crash mid-write were never visible; drop them.
        let mut discarded = 0usize;
        for entry in fs::read_dir(&staging)? {
            let entry = entry?;
            if fs::remove_file(entry.path()).is_ok() {
                discarded += 1;
            }
        }
        if discarded > 0 {
            tracing::warn!("Discarded {} unfinished writes in {:?}", discarded, staging);
        }

        tracing::info!("FileStore opened at {:?}", root);
        Ok(Self { objects, staging })
    }

    fn object_path(&self, filename: &str) -> PathBuf {
        self.objects.join(encode_filename(filename))
    }

    fn sync_objects_dir(&self) -> Result<()> {
        #[cfg(unix)]
        File::open(&self.objects)?.sync_all()?;
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        // A name that could never be stored is simply absent.
        if validate_filename(filename).is_err() {
            return Ok(None);
        }
        match fs::read(self.object_path(filename)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, filename: &str, content: &[u8]) -> Result<()> {
        validate_filename(filename)?;
        let staged = self
            .staging
            .join(uuid::Uuid::new_v4().simple().to_string());

        let write_staged = || -> Result<()> {
            let mut file = File::create(&staged)?;
            file.write_all(content)?;
            file.sync_all()?;
            fs::rename(&staged, self.object_path(filename))?;
            Ok(())
        };

        if let Err(e) = write_staged() {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        self.sync_objects_dir()
    }

    fn exists(&self, filename: &str) -> Result<bool> {
        Ok(validate_filename(filename).is_ok() && self.object_path(filename).is_file())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.objects)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(decode_filename(name)?);
            }
        }
        names.sort();
        Ok(names)
    }
}
