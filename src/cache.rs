//! Path-keyed, timestamp-validated, LRU module cache (spec §4.3).
//!
//! Errors from this subsystem are always swallowed by the caller in favor of
//! reparsing from source (spec §7's "Internal" failure policy) — callers
//! should prefer [`ModuleCache::get_or_parse`] and treat a cache miss the same
//! as a cache error.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, ManifestError};
use crate::manifest::{parse_manifest, Module};

const SCHEMA_VERSION: u32 = 1;
const DEFAULT_MAX_ENTRIES: usize = 200;

/// 64-bit stable hash of an absolute path, used as the cache key instead of
/// the path string itself (spec §4.3).
pub fn hash_path(path: &Path) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableModule {
    name: String,
    version: String,
    description: Option<String>,
    author: Option<String>,
    license: Option<String>,
    required: Vec<String>,
    optional: Vec<String>,
    os: Vec<String>,
    arch: Vec<String>,
    shell: String,
    min_version: String,
    priority: i64,
    files: Vec<String>,
    pre_load: Option<String>,
    post_load: Option<String>,
    settings: indexmap::IndexMap<String, String>,
    path: PathBuf,
}

impl From<&Module> for SerializableModule {
    fn from(m: &Module) -> Self {
        Self {
            name: m.name.clone(),
            version: m.version.clone(),
            description: m.description.clone(),
            author: m.author.clone(),
            license: m.license.clone(),
            required: m.required.clone(),
            optional: m.optional.clone(),
            os: m.os.clone(),
            arch: m.arch.clone(),
            shell: m.shell.clone(),
            min_version: m.min_version.clone(),
            priority: m.priority,
            files: m.files.clone(),
            pre_load: m.pre_load.clone(),
            post_load: m.post_load.clone(),
            settings: m.settings.clone(),
            path: m.path.clone(),
        }
    }
}

impl From<SerializableModule> for Module {
    fn from(s: SerializableModule) -> Self {
        Module {
            name: s.name,
            version: s.version,
            description: s.description,
            author: s.author,
            license: s.license,
            required: s.required,
            optional: s.optional,
            os: s.os,
            arch: s.arch,
            shell: s.shell,
            min_version: s.min_version,
            priority: s.priority,
            files: s.files,
            pre_load: s.pre_load,
            post_load: s.post_load,
            settings: s.settings,
            path: s.path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    file_path: String,
    file_hash: u64,
    module: SerializableModule,
    file_timestamp: u64,
    parse_timestamp: u64,
    access_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema_version: u32,
    entries: Vec<CacheEntry>,
    resolutions: HashMap<String, Vec<String>>,
}

/// Process-wide module cache, constructed explicitly by the caller rather
/// than reached for as a global (Design Notes §9).
pub struct ModuleCache {
    entries: HashMap<u64, CacheEntry>,
    resolutions: HashMap<String, Vec<String>>,
    max_entries: usize,
    cache_path: PathBuf,
}

impl ModuleCache {
    /// Constructs an empty cache backed by `cache_dir/zephyr_cache.json`.
    pub fn init(cache_dir: &Path) -> Self {
        Self::init_with_capacity(cache_dir, DEFAULT_MAX_ENTRIES)
    }

    pub fn init_with_capacity(cache_dir: &Path, max_entries: usize) -> Self {
        let cache_path = cache_dir.join("zephyr_cache.json");
        let mut cache = Self {
            entries: HashMap::new(),
            resolutions: HashMap::new(),
            max_entries,
            cache_path,
        };
        cache.load_best_effort();
        cache
    }

    fn load_best_effort(&mut self) {
        let Ok(bytes) = std::fs::read(&self.cache_path) else {
            return;
        };
        let Ok(snapshot) = serde_json::from_slice::<Snapshot>(&bytes) else {
            tracing::warn!("cache snapshot at {} is corrupt or unknown, starting empty", self.cache_path.display());
            return;
        };
        if snapshot.schema_version != SCHEMA_VERSION {
            tracing::warn!("cache snapshot has unknown schema_version {}, starting empty", snapshot.schema_version);
            return;
        }
        for entry in snapshot.entries {
            self.entries.insert(entry.file_hash, entry);
        }
        self.resolutions = snapshot.resolutions;
    }

    /// Persists the cache to disk. Best-effort: failures are logged, never
    /// propagated (spec §4.3).
    pub fn shutdown(&self) {
        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION,
            entries: self.entries.values().cloned().collect(),
            resolutions: self.resolutions.clone(),
        };
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Some(parent) = self.cache_path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&self.cache_path, bytes) {
                    tracing::warn!("failed to persist module cache: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to serialize module cache: {e}"),
        }
    }

    /// Returns a parsed, deep-cloned [`Module`] for `path`, reparsing when the
    /// on-disk mtime differs from the cached entry or no entry exists.
    pub fn get_or_parse(&mut self, path: &Path) -> Result<Module, ManifestError> {
        let key = hash_path(path);
        let current_mtime = file_mtime_secs(path);

        if let Some(entry) = self.entries.get(&key) {
            if Some(entry.file_timestamp) == current_mtime {
                let module = entry.module.clone();
                self.bump_access(key);
                return Ok(module.into());
            }
            // Stat mismatch invalidates and removes the stale entry.
            self.entries.remove(&key);
        }

        let module = parse_manifest(path)?;
        let entry = CacheEntry {
            file_path: path.display().to_string(),
            file_hash: key,
            module: SerializableModule::from(&module),
            file_timestamp: current_mtime.unwrap_or(0),
            parse_timestamp: now_secs(),
            access_count: 1,
        };
        self.entries.insert(key, entry);
        self.evict_if_needed();
        Ok(module)
    }

    fn bump_access(&mut self, key: u64) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.access_count += 1;
        }
    }

    fn evict_if_needed(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let now = now_secs();
        let victim = self
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| score(a, now).partial_cmp(&score(b, now)).unwrap())
            .map(|(k, _)| *k);
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    /// Caches a previously-resolved load order by `key` (typically a hash of
    /// the set of module paths considered).
    pub fn put_resolution(&mut self, key: String, order: Vec<String>) {
        self.resolutions.insert(key, order);
    }

    pub fn get_resolution(&self, key: &str) -> Option<&Vec<String>> {
        self.resolutions.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn score(entry: &CacheEntry, now: u64) -> f64 {
    let hours_since_parse = (now.saturating_sub(entry.parse_timestamp)) as f64 / 3600.0;
    entry.access_count as f64 / (hours_since_parse + 1.0)
}

fn file_mtime_secs(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
