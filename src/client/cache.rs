//! Client-side read cache
//!
//! Entries are created on a read miss and removed when the client's own write
//! to the same file succeeds. There is no TTL and no staleness check: a file
//! changed by another client stays cached until this client writes it.
//!
//! Every invalidation bumps a per-file generation. A read captures the
//! generation before going to the network and fills the cache only if it is
//! unchanged, so a fetch that overlapped a successful write never brings the
//! old content back.
//!
//! A cache opened on a directory survives restarts. Layout:
//! - `<dir>/objects/<encoded filename>`: cached content
//! - `<dir>/cache_metadata.json`: `{filename: {timestamp, source}}`

use crate::common::{encode_filename, validate_filename, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const METADATA_FILE: &str = "cache_metadata.json";

const OBJECTS_DIR: &str = "objects";

/// One cached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub filename: String,
    pub content: String,
    pub fetch_time: DateTime<Utc>,
    /// Datacenter the content was read from
    pub source_node: String,
}

impl CacheEntry {
    pub fn new(
        filename: impl Into<String>,
        content: impl Into<String>,
        source_node: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            fetch_time: Utc::now(),
            source_node: source_node.into(),
        }
    }
}

/// Metadata record persisted per cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    timestamp: DateTime<Utc>,
    source: String,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Invalidation count per filename; absent means zero.
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, filename: &str) -> u64 {
        self.generations.get(filename).copied().unwrap_or(0)
    }
}

pub struct ClientCache {
    state: Mutex<CacheState>,
    dir: Option<PathBuf>,
}

impl ClientCache {
    /// Cache that lives as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            dir: None,
        }
    }

    /// Open or create a cache persisted under `dir`, reloading previous
    /// entries. Metadata records whose content file is gone are dropped.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(OBJECTS_DIR))?;

        let meta = read_metadata(&dir)?;
        let mut entries = HashMap::with_capacity(meta.len());
        for (filename, record) in meta {
            if validate_filename(&filename).is_err() {
                tracing::debug!("Dropping cache record with invalid name {:?}", filename);
                continue;
            }
            match fs::read_to_string(content_path(&dir, &filename)) {
                Ok(content) => {
                    entries.insert(
                        filename.clone(),
                        CacheEntry {
                            filename,
                            content,
                            fetch_time: record.timestamp,
                            source_node: record.source,
                        },
                    );
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Dropping cache record for {}: content missing", filename);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!("Cache opened at {:?} with {} entries", dir, entries.len());
        Ok(Self {
            state: Mutex::new(CacheState {
                entries,
                generations: HashMap::new(),
            }),
            dir: Some(dir),
        })
    }

    /// Directory the cache is persisted to, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("cache lock poisoned".into()))
    }

    pub fn get(&self, filename: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.entries.get(filename).cloned())
    }

    pub fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self.lock()?.entries.contains_key(filename))
    }

    /// Current invalidation generation of `filename`. Capture it before
    /// fetching and hand it to [`ClientCache::insert_if_current`].
    pub fn generation(&self, filename: &str) -> Result<u64> {
        Ok(self.lock()?.generation(filename))
    }

    /// Cache `entry`, replacing any previous entry for the same file.
    pub fn insert(&self, entry: CacheEntry) -> Result<()> {
        let mut state = self.lock()?;
        self.store(&mut state, entry)
    }

    /// Cache `entry` unless `filename` was invalidated since `generation`
    /// was read. Returns whether the entry was stored.
    pub fn insert_if_current(&self, entry: CacheEntry, generation: u64) -> Result<bool> {
        let mut state = self.lock()?;
        if state.generation(&entry.filename) != generation {
            tracing::debug!(
                "Not caching {}: invalidated while it was fetched",
                entry.filename
            );
            return Ok(false);
        }
        self.store(&mut state, entry)?;
        Ok(true)
    }

    fn store(&self, state: &mut CacheState, entry: CacheEntry) -> Result<()> {
        validate_filename(&entry.filename)?;
        if let Some(dir) = &self.dir {
            fs::write(content_path(dir, &entry.filename), &entry.content)?;
        }
        state.entries.insert(entry.filename.clone(), entry);
        self.persist(&state.entries)
    }

    /// Drop the entry for `filename` and bump its generation. Returns
    /// whether an entry was cached.
    pub fn invalidate(&self, filename: &str) -> Result<bool> {
        let mut state = self.lock()?;
        *state.generations.entry(filename.to_string()).or_insert(0) += 1;
        let removed = state.entries.remove(filename).is_some();
        if let Some(dir) = &self.dir {
            if validate_filename(filename).is_ok() {
                match fs::remove_file(content_path(dir, filename)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if removed {
            self.persist(&state.entries)?;
        }
        Ok(removed)
    }

    /// Drop every entry. In-flight fetches of dropped files will not refill them.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        let CacheState {
            entries,
            generations,
        } = &mut *state;
        for filename in entries.keys() {
            *generations.entry(filename.clone()).or_insert(0) += 1;
            if let Some(dir) = &self.dir {
                let _ = fs::remove_file(content_path(dir, filename));
            }
        }
        entries.clear();
        self.persist(entries)
    }

    /// Cached filenames, sorted.
    pub fn filenames(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.entries.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    /// Rewrite the metadata file; the caller holds the state lock.
    fn persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let meta: BTreeMap<&str, EntryMeta> = entries
            .values()
            .map(|entry| {
                (
                    entry.filename.as_str(),
                    EntryMeta {
                        timestamp: entry.fetch_time,
                        source: entry.source_node.clone(),
                    },
                )
            })
            .collect();

        let tmp = dir.join(format!("{}.tmp", METADATA_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(&meta)?)?;
        fs::rename(&tmp, dir.join(METADATA_FILE))?;
        Ok(())
    }
}

fn content_path(dir: &Path, filename: &str) -> PathBuf {
    dir.join(OBJECTS_DIR).join(encode_filename(filename))
}

fn read_metadata(dir: &Path) -> Result<BTreeMap<String, EntryMeta>> {
    let data = match fs::read(dir.join(METADATA_FILE)) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&data) {
        Ok(meta) => Ok(meta),
        Err(e) => {
            // Content files are useless without their records; start over.
            tracing::warn!("Ignoring unreadable cache metadata in {:?}: {}", dir, e);
            for entry in fs::read_dir(dir.join(OBJECTS_DIR))? {
                let path = entry?.path();
                if path.is_file() {
                    let _ = fs::remove_file(&path);
                }
            }
            Ok(BTreeMap::new())
        }
    }
}
