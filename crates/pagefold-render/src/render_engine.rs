use pagefold::Chapter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::render_ir::{CacheKey, ContentId, LayoutResult};
use crate::render_layout::{LayoutConfig, LayoutEngine};

/// Runtime diagnostics from cache lookups and layout passes.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderDiagnostic {
    ReflowTimeMs(u32),
    CacheHit { font_size: u32, page_count: usize },
    CacheMiss { font_size: u32 },
    CacheStoreFailed { font_size: u32 },
    LayoutUnmeasurable { font_size: u32 },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(RenderDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Failure reported by a cache store backend.
///
/// [`PageCache`] logs and swallows these; they never reach navigation.
#[derive(Debug)]
pub enum CacheStoreError {
    /// Underlying I/O failed.
    Io(io::Error),
    /// Entry could not be encoded.
    Encode(serde_json::Error),
    /// Writing the entry would exceed the store's size limit.
    QuotaExceeded { needed: usize, limit: usize },
    /// Store lock was poisoned by a panicking writer.
    Poisoned,
}

impl fmt::Display for CacheStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cache store I/O failed: {}", err),
            Self::Encode(err) => write!(f, "cache entry encode failed: {}", err),
            Self::QuotaExceeded { needed, limit } => write!(
                f,
                "cache store quota exceeded (needed={} limit={})",
                needed, limit
            ),
            Self::Poisoned => write!(f, "cache store lock poisoned"),
        }
    }
}

impl std::error::Error for CacheStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::QuotaExceeded { .. } | Self::Poisoned => None,
        }
    }
}

impl From<io::Error> for CacheStoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CacheStoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// Scoped key to serialized-value store backing [`PageCache`].
///
/// Writes are best-effort and last-writer-wins.
pub trait RenderCacheStore {
    /// Load the value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn store(&self, key: &str, value: &str) -> Result<(), CacheStoreError>;
}

/// In-process store.
///
/// Clones share one map, so several controllers over the same content see
/// each other's entries. An optional byte quota (keys plus values) makes
/// writes fail the way a full client store does.
#[derive(Clone, Debug, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryCacheStore {
    /// Create an empty, unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit total stored bytes.
    pub fn with_quota_bytes(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.entries.lock().map_or(0, |entries| {
            entries
                .iter()
                .map(|(key, value)| key.len() + value.len())
                .sum()
        })
    }

}

impl RenderCacheStore for MemoryCacheStore {
    fn load(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let entries = self.entries.lock().map_err(|_| CacheStoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<(), CacheStoreError> {
        let mut entries = self.entries.lock().map_err(|_| CacheStoreError::Poisoned)?;
        if let Some(limit) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(CacheStoreError::QuotaExceeded { needed, limit });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

const CACHE_SCHEMA_VERSION: u8 = 1;
const DEFAULT_MAX_CACHE_FILE_BYTES: usize = 4 * 1024 * 1024;
static CACHE_WRITE_NONCE: AtomicUsize = AtomicUsize::new(0);

/// File-backed store: one file per key.
///
/// Paths are deterministic by key: `<root>/<key-hash-hex>.json`. Writes go to
/// a temp file that is renamed into place. `max_file_bytes` is enforced on
/// both reads and writes.
#[derive(Clone, Debug)]
pub struct FileRenderCacheStore {
    root: PathBuf,
    max_file_bytes: usize,
}

impl FileRenderCacheStore {
    /// Create a new cache store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: DEFAULT_MAX_CACHE_FILE_BYTES,
        }
    }

    /// Set the maximum allowed cache file size in bytes.
    ///
    /// Values of `0` are treated as `1` to keep the cap explicit.
    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes.max(1);
        self
    }

    /// Root directory for cache files.
    pub fn cache_root(&self) -> &Path {
        &self.root
    }

    /// Maximum allowed cache file size in bytes.
    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Deterministic path for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let name = ContentId::from_bytes(key.as_bytes()).to_hex();
        self.root.join(format!("{}.json", name))
    }
}

impl RenderCacheStore for FileRenderCacheStore {
    fn load(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let path = self.entry_path(key);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let max_file_bytes = self.max_file_bytes as u64;
        if metadata.len() > max_file_bytes {
            return Err(CacheStoreError::QuotaExceeded {
                needed: metadata.len() as usize,
                limit: self.max_file_bytes,
            });
        }

        let file = File::open(&path)?;
        let mut reader = file.take(max_file_bytes.saturating_add(1));
        let mut payload = String::new();
        reader.read_to_string(&mut payload)?;
        if payload.len() > self.max_file_bytes {
            return Err(CacheStoreError::QuotaExceeded {
                needed: payload.len(),
                limit: self.max_file_bytes,
            });
        }
        Ok(Some(payload))
    }

    fn store(&self, key: &str, value: &str) -> Result<(), CacheStoreError> {
        if value.len() > self.max_file_bytes {
            return Err(CacheStoreError::QuotaExceeded {
                needed: value.len(),
                limit: self.max_file_bytes,
            });
        }
        fs::create_dir_all(&self.root)?;
        let final_path = self.entry_path(key);

        let nonce = CACHE_WRITE_NONCE.fetch_add(1, Ordering::Relaxed);
        let temp_path = self.root.join(format!(
            ".tmp-{}-{}-{}",
            ContentId::from_bytes(key.as_bytes()).to_hex(),
            std::process::id(),
            nonce
        ));

        let written = write_entry(&temp_path, value)
            .and_then(|()| fs::rename(&temp_path, &final_path));
        if let Err(err) = written {
            remove_file_quiet(&temp_path);
            return Err(err.into());
        }
        sync_directory(&self.root);
        Ok(())
    }
}

fn write_entry(path: &Path, value: &str) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(value.as_bytes())?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()
}

fn remove_file_quiet(path: &Path) {
    let _ = fs::remove_file(path);
}

fn sync_directory(path: &Path) {
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PersistedCacheEnvelope {
    version: u8,
    key: String,
    checksum: u32,
    page_count: usize,
    pages: Vec<String>,
}

impl PersistedCacheEnvelope {
    fn from_result(key: &CacheKey, result: &LayoutResult) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION,
            key: key.as_str().to_string(),
            checksum: pages_checksum(&result.pages),
            page_count: result.page_count,
            pages: result.pages.clone(),
        }
    }

    fn into_layout_result(self, key: &CacheKey) -> Option<LayoutResult> {
        if self.version != CACHE_SCHEMA_VERSION
            || self.key != key.as_str()
            || self.page_count != self.pages.len()
            || self.checksum != pages_checksum(&self.pages)
        {
            return None;
        }
        Some(LayoutResult {
            pages: self.pages,
            page_count: self.page_count,
        })
    }
}

fn pages_checksum(pages: &[String]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for page in pages {
        hasher.update(&(page.len() as u64).to_le_bytes());
        hasher.update(page.as_bytes());
    }
    hasher.finalize()
}

/// Content-addressed layout cache over a [`RenderCacheStore`].
///
/// Entries are pure functions of their key; a regeneration overwrites the
/// entry for its key and nothing is ever evicted. Store failures degrade to
/// recomputation.
pub struct PageCache {
    store: Box<dyn RenderCacheStore>,
    diagnostic_sink: DiagnosticSink,
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("has_diagnostic_sink", &self.diagnostic_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl PageCache {
    /// Create a cache over `store`.
    pub fn new(store: impl RenderCacheStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            diagnostic_sink: None,
        }
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(RenderDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: RenderDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    /// Backing store.
    pub fn store(&self) -> &dyn RenderCacheStore {
        self.store.as_ref()
    }

    /// Cached layout for these inputs, if present and intact.
    pub fn get(
        &self,
        chapters: &[Chapter],
        cfg: &LayoutConfig,
        font_size: u32,
    ) -> Option<LayoutResult> {
        let key = CacheKey::new(chapters, cfg, font_size);
        let hit = self.load_entry(&key);
        match &hit {
            Some(result) => {
                log::debug!("page cache hit: {} ({} pages)", key, result.page_count);
                self.emit_diagnostic(RenderDiagnostic::CacheHit {
                    font_size,
                    page_count: result.page_count,
                });
            }
            None => {
                log::debug!("page cache miss: {}", key);
                self.emit_diagnostic(RenderDiagnostic::CacheMiss { font_size });
            }
        }
        hit
    }

    fn load_entry(&self, key: &CacheKey) -> Option<LayoutResult> {
        let raw = match self.store.load(key.as_str()) {
            Ok(raw) => raw?,
            Err(err) => {
                log::warn!("page cache read failed for {}: {}", key, err);
                return None;
            }
        };
        let envelope: PersistedCacheEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("discarding undecodable page cache entry {}: {}", key, err);
                return None;
            }
        };
        let result = envelope.into_layout_result(key);
        if result.is_none() {
            log::warn!("discarding stale or corrupted page cache entry {}", key);
        }
        result
    }

    /// Store `result` for these inputs, overwriting any prior entry.
    ///
    /// Empty (unmeasurable) results are not stored. Returns whether the entry
    /// was persisted.
    pub fn put(
        &self,
        chapters: &[Chapter],
        cfg: &LayoutConfig,
        font_size: u32,
        result: &LayoutResult,
    ) -> bool {
        if result.is_empty() {
            log::debug!("not caching unmeasurable layout at font size {}", font_size);
            return false;
        }
        let key = CacheKey::new(chapters, cfg, font_size);
        let envelope = PersistedCacheEnvelope::from_result(&key, result);
        let stored = serde_json::to_string(&envelope)
            .map_err(CacheStoreError::from)
            .and_then(|payload| self.store.store(key.as_str(), &payload));
        match stored {
            Ok(()) => true,
            Err(err) => {
                log::warn!("page cache write failed for {}: {}", key, err);
                self.emit_diagnostic(RenderDiagnostic::CacheStoreFailed { font_size });
                false
            }
        }
    }

    /// Lay out and store every font size in one pass.
    ///
    /// Returns the number of entries persisted. Unmeasurable sizes are
    /// skipped.
    pub fn build_all(&self, chapters: &[Chapter], engine: &LayoutEngine, font_sizes: &[u32]) -> usize {
        let mut stored = 0usize;
        for &font_size in font_sizes {
            if self.build_one(chapters, engine, font_size).1 {
                stored += 1;
            }
        }
        stored
    }

    fn build_one(
        &self,
        chapters: &[Chapter],
        engine: &LayoutEngine,
        font_size: u32,
    ) -> (LayoutResult, bool) {
        let started = Instant::now();
        let result = engine.layout(chapters, font_size);
        let elapsed = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
        self.emit_diagnostic(RenderDiagnostic::ReflowTimeMs(elapsed));
        if result.is_empty() {
            log::debug!("layout at font size {} is not measurable yet", font_size);
            self.emit_diagnostic(RenderDiagnostic::LayoutUnmeasurable { font_size });
            return (result, false);
        }
        let stored = self.put(chapters, engine.config(), font_size, &result);
        (result, stored)
    }

    /// Cached layout, else rebuild the batch and return the fresh layout.
    ///
    /// `font_size` is built along with the batch even when it is not listed.
    /// Each size is laid out once; a store that rejects writes still gets the
    /// computed result back.
    pub fn get_or_build(
        &self,
        chapters: &[Chapter],
        engine: &LayoutEngine,
        font_size: u32,
        font_sizes: &[u32],
    ) -> LayoutResult {
        if let Some(hit) = self.get(chapters, engine.config(), font_size) {
            return hit;
        }
        let mut requested = None;
        let mut built = 0usize;
        for &size in font_sizes {
            let (result, stored) = self.build_one(chapters, engine, size);
            built += usize::from(stored);
            if size == font_size && requested.is_none() {
                requested = Some(result);
            }
        }
        log::debug!("rebuilt {} page cache entries", built);
        match requested {
            Some(result) => result,
            None => self.build_one(chapters, engine, font_size).0,
        }
    }
}
