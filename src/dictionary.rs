//! The dictionary facade: archive, index and caches behind one handle.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::archive::{Archive, RecordFormat};
use crate::cache::{CacheStats, DictCache};
use crate::config::DictionaryConfig;
use crate::entry::{self, EntryRecord};
use crate::index::{self, persist, BuildSummary, Index};
use crate::query::{self, Hit, QueryKey, QueryMode, QueryResult};
use crate::types::error::{DictError, Result};
use crate::types::models::EntryKey;

/// Redirect chains longer than this are treated as broken.
const MAX_REDIRECTS: usize = 8;

/// Where the index in use came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// Read from the index file.
    Loaded,
    /// Built because no index file existed.
    Built,
    /// Built because the index file was stale or unreadable.
    Rebuilt { reason: String },
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStatus::Loaded => write!(f, "loaded"),
            IndexStatus::Built => write!(f, "built"),
            IndexStatus::Rebuilt { reason } => write!(f, "rebuilt ({})", reason),
        }
    }
}

/// An open dictionary, ready for concurrent queries.
pub struct Dictionary {
    config: DictionaryConfig,
    archive: Arc<Archive>,
    index: Arc<Index>,
    format: RecordFormat,
    cache: Arc<DictCache>,
    status: IndexStatus,
}

impl Dictionary {
    /// Opens the archive and loads its index, building it when missing or stale.
    pub fn open(config: DictionaryConfig) -> Result<Self> {
        let cache = Arc::new(DictCache::new(
            config.entry_cache_capacity,
            config.query_cache_capacity,
        ));
        Self::with_cache(config, cache)
    }

    /// Like [`open`](Self::open), with a caller-supplied cache.
    pub fn with_cache(config: DictionaryConfig, cache: Arc<DictCache>) -> Result<Self> {
        config.validate()?;
        let archive = Archive::open(&config.archive_path, &config.archive_options())?;
        let (index, status) = load_or_build(&config, &archive)?;
        info!(
            "Dictionary '{}' ready: {} entries, index {}",
            archive.title(),
            archive.len(),
            status
        );
        Ok(Self {
            format: archive.record_format(),
            archive: Arc::new(archive),
            index: Arc::new(index),
            cache,
            status,
            config,
        })
    }

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_status(&self) -> &IndexStatus {
        &self.status
    }

    pub fn build_summary(&self) -> BuildSummary {
        let skipped = self.index.header.skipped as usize;
        BuildSummary {
            indexed: self.index.entry_count().saturating_sub(skipped),
            skipped,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Runs a query, at most `result_limit` hits.
    pub fn query(&self, text: &str, mode: QueryMode) -> Arc<QueryResult> {
        if text.trim().is_empty() {
            return Arc::new(QueryResult::default());
        }
        let limit = self.config.result_limit;
        self.cache.get_query_result(QueryKey::new(text, mode), || {
            query::run_shared(&self.index, text, mode, limit)
        })
    }

    /// Parses an entry, served from the cache when possible.
    pub fn fetch_entry(&self, key: EntryKey) -> Result<Arc<EntryRecord>> {
        self.cache.get_entry(key, || {
            let raw = self.archive.read(key)?;
            entry::parse(&raw, &self.format)
        })
    }

    /// Fetches an entry and follows `@@@LINK=` redirects to the target entry.
    pub fn fetch_resolved(&self, key: EntryKey) -> Result<Arc<EntryRecord>> {
        let mut current = self.fetch_entry(key)?;
        for _ in 0..MAX_REDIRECTS {
            if !current.is_redirect() {
                return Ok(current);
            }
            let target = current
                .cross_refs
                .first()
                .and_then(|target| self.resolve(target))
                .ok_or(DictError::EntryMissing(key))?;
            debug!("Following redirect {} -> {}", current.key, target);
            current = self.fetch_entry(target)?;
        }
        Err(DictError::EntryMissing(key))
    }

    /// Incremental lookup: prefix hits first, then full-text hits not already listed.
    pub fn lookup(&self, text: &str) -> Vec<Hit> {
        let limit = self.config.result_limit;
        let prefix = self.query(text, QueryMode::Prefix);
        let mut seen: BTreeSet<EntryKey> = prefix.iter().map(|hit| hit.key).collect();
        let mut hits: Vec<Hit> = prefix.iter().cloned().collect();

        if hits.len() < limit {
            let full_text = self.query(text, QueryMode::FullText);
            hits.extend(full_text.iter().filter(|hit| seen.insert(hit.key)).cloned());
        }
        hits.truncate(limit);
        hits
    }

    /// Headwords close to `word`, best first, for "did you mean" prompts.
    pub fn suggest(&self, word: &str) -> Vec<String> {
        let mode = QueryMode::Fuzzy {
            max_distance: self.config.fuzzy_max_distance,
        };
        let mut seen = BTreeSet::new();
        self.query(word, mode)
            .iter()
            .filter(|hit| seen.insert(hit.headword.clone()))
            .take(self.config.suggestion_limit)
            .map(|hit| hit.headword.clone())
            .collect()
    }

    /// Maps each cross-reference of `entry` to the entry it names, if any.
    pub fn resolve_cross_refs(&self, entry: &EntryRecord) -> Vec<(String, Option<EntryKey>)> {
        entry
            .cross_refs
            .iter()
            .map(|target| (target.clone(), self.resolve(target)))
            .collect()
    }

    fn resolve(&self, headword: &str) -> Option<EntryKey> {
        self.query(headword, QueryMode::Exact).iter().next().map(|hit| hit.key)
    }

    /// Runs a query on the rayon pool.
    ///
    /// Dropping the returned handle abandons the query; the worker finishes,
    /// fills the cache and discards its result.
    pub fn spawn_query(self: &Arc<Self>, text: &str, mode: QueryMode) -> QueryHandle {
        let (sender, receiver) = mpsc::channel();
        let dictionary = Arc::clone(self);
        let text = text.to_string();
        rayon::spawn(move || {
            let result = dictionary.query(&text, mode);
            if sender.send(result).is_err() {
                debug!("Query '{}' ({}) abandoned", text, mode);
            }
        });
        QueryHandle { receiver }
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary")
            .field("archive", &self.archive.path())
            .field("entries", &self.archive.len())
            .field("status", &self.status)
            .finish()
    }
}

/// Pending result of [`Dictionary::spawn_query`].
#[derive(Debug)]
pub struct QueryHandle {
    receiver: Receiver<Arc<QueryResult>>,
}

impl QueryHandle {
    /// Blocks until the result is ready. `None` if the worker died.
    pub fn wait(self) -> Option<Arc<QueryResult>> {
        self.receiver.recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Arc<QueryResult>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The result if it is already available.
    pub fn try_get(&self) -> Option<Arc<QueryResult>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

fn load_or_build(config: &DictionaryConfig, archive: &Archive) -> Result<(Index, IndexStatus)> {
    let path = config.index_path();
    let status = match load_checked(&path, config, archive) {
        Ok(index) => {
            info!("Index loaded from {}", path.display());
            return Ok((index, IndexStatus::Loaded));
        }
        Err(DictError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No index at {}, building", path.display());
            IndexStatus::Built
        }
        Err(e) if e.needs_rebuild() => {
            info!("Rebuilding index {}: {}", path.display(), e);
            IndexStatus::Rebuilt { reason: e.to_string() }
        }
        Err(e) => return Err(e),
    };

    let (index, _) = index::build(archive, &config.build_options());
    if config.persist_index {
        if let Err(e) = persist::save(&index, &path) {
            warn!("Could not save index to {}: {}", path.display(), e);
        }
    }
    Ok((index, status))
}

fn load_checked(path: &Path, config: &DictionaryConfig, archive: &Archive) -> Result<Index> {
    let index = persist::load(path)?;
    persist::check_provenance(&index, archive, &config.weights)?;
    Ok(index)
}
