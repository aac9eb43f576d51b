//! Persistent vector store backed by LMDB.
//!
//! Each collection lives in its own LMDB environment under
//! `<root>/<collection>/`, with two named databases:
//!
//! - `entries`: chunk id → bincode-encoded [`VectorEntry`]
//! - `meta`: the collection's name and established dimension
//!
//! LMDB allows one write transaction at a time and gives every read
//! transaction a consistent snapshot, so an upsert is applied all at once and
//! a concurrent query sees the collection either before or after it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::ann::{ApproximateIndex, ApproximateIndexFactory};
use crate::config::StoreConfig;
use crate::document::{SearchResult, VectorEntry};
use crate::error::{RagError, Result};
use crate::similarity::rank_exact;
use crate::vectorstore::{VectorStore, check_dimensions, validate_collection_name, validate_k};

const BACKEND: &str = "lmdb";
const ENTRIES_DB: &str = "entries";
const META_DB: &str = "meta";
const META_KEY: &str = "collection";
const DATA_FILE: &str = "data.mdb";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMeta {
    name: String,
    dimensions: Option<usize>,
}

fn lmdb_err(e: heed::Error) -> RagError {
    RagError::store(BACKEND, e)
}

fn codec_err(e: bincode::Error) -> RagError {
    RagError::store(BACKEND, format!("corrupt record: {e}"))
}

fn index_poisoned() -> RagError {
    RagError::store(BACKEND, "approximate index lock poisoned")
}

fn decode_entry(bytes: &[u8]) -> Result<VectorEntry> {
    bincode::deserialize(bytes).map_err(codec_err)
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::store(BACKEND, format!("storage task failed: {e}")))?
}

/// One opened collection environment.
struct CollectionHandle {
    name: String,
    env: Env,
    entries: Database<Str, Bytes>,
    meta: Database<Str, Bytes>,
    approximate: StdRwLock<Option<Box<dyn ApproximateIndex>>>,
}

impl CollectionHandle {
    fn open(path: &Path, name: &str, map_size: usize) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            RagError::store(BACKEND, format!("cannot create '{}': {e}", path.display()))
        })?;

        // SAFETY: the environment is opened once per store and its files are
        // only removed after the environment has been closed.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(2).open(path) }
            .map_err(lmdb_err)?;

        let mut wtxn = env.write_txn().map_err(lmdb_err)?;
        let entries = env.create_database(&mut wtxn, Some(ENTRIES_DB)).map_err(lmdb_err)?;
        let meta: Database<Str, Bytes> =
            env.create_database(&mut wtxn, Some(META_DB)).map_err(lmdb_err)?;
        if meta.get(&wtxn, META_KEY).map_err(lmdb_err)?.is_none() {
            let initial = CollectionMeta { name: name.to_string(), dimensions: None };
            let bytes = bincode::serialize(&initial).map_err(codec_err)?;
            meta.put(&mut wtxn, META_KEY, &bytes).map_err(lmdb_err)?;
        }
        wtxn.commit().map_err(lmdb_err)?;

        Ok(Self {
            name: name.to_string(),
            env,
            entries,
            meta,
            approximate: StdRwLock::new(None),
        })
    }

    fn read_meta(&self, txn: &RoTxn) -> Result<CollectionMeta> {
        match self.meta.get(txn, META_KEY).map_err(lmdb_err)? {
            Some(bytes) => bincode::deserialize(bytes).map_err(codec_err),
            None => Ok(CollectionMeta { name: self.name.clone(), dimensions: None }),
        }
    }

    fn write_meta(&self, txn: &mut RwTxn, meta: &CollectionMeta) -> Result<()> {
        let bytes = bincode::serialize(meta).map_err(codec_err)?;
        self.meta.put(txn, META_KEY, &bytes).map_err(lmdb_err)
    }

    fn write(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut wtxn = self.env.write_txn().map_err(lmdb_err)?;
        let mut meta = self.read_meta(&wtxn)?;
        // Returning early drops `wtxn`, which aborts the whole upsert.
        let dimensions = check_dimensions(&self.name, meta.dimensions, entries)?;

        for entry in entries {
            let bytes = bincode::serialize(entry).map_err(codec_err)?;
            self.entries.put(&mut wtxn, &entry.chunk_id, &bytes).map_err(lmdb_err)?;
        }
        if dimensions != meta.dimensions {
            meta.dimensions = dimensions;
            self.write_meta(&mut wtxn, &meta)?;
        }
        wtxn.commit().map_err(lmdb_err)?;
        Ok(entries.len())
    }

    fn len(&self) -> Result<usize> {
        let rtxn = self.env.read_txn().map_err(lmdb_err)?;
        Ok(self.entries.len(&rtxn).map_err(lmdb_err)? as usize)
    }

    fn dimensions(&self) -> Result<Option<usize>> {
        let rtxn = self.env.read_txn().map_err(lmdb_err)?;
        Ok(self.read_meta(&rtxn)?.dimensions)
    }

    fn all_entries(&self, rtxn: &RoTxn) -> Result<Vec<VectorEntry>> {
        self.entries
            .iter(rtxn)
            .map_err(lmdb_err)?
            .map(|item| item.map_err(lmdb_err).and_then(|(_, bytes)| decode_entry(bytes)))
            .collect()
    }

    /// Rank either the whole collection or only `candidates`, from one snapshot.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        candidates: Option<Vec<String>>,
    ) -> Result<Vec<SearchResult>> {
        let rtxn = self.env.read_txn().map_err(lmdb_err)?;
        if let Some(expected) = self.read_meta(&rtxn)?.dimensions {
            if expected != query.len() {
                return Err(RagError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected,
                    actual: query.len(),
                });
            }
        }

        let entries = match candidates {
            None => self.all_entries(&rtxn)?,
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in &ids {
                    if let Some(bytes) = self.entries.get(&rtxn, id).map_err(lmdb_err)? {
                        found.push(decode_entry(bytes)?);
                    }
                }
                found
            }
        };
        Ok(rank_exact(query, &entries, k))
    }

    /// Write `entries` and add them to the approximate index, if one is built.
    ///
    /// The index lock is held across the commit so an index build either
    /// reads a snapshot containing this write or sees it inserted afterwards.
    fn write_indexed(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut slot = self.approximate.write().map_err(|_| index_poisoned())?;
        let written = self.write(entries)?;
        if let Some(index) = slot.as_mut() {
            for entry in entries {
                index.insert(&entry.chunk_id, &entry.vector);
            }
        }
        Ok(written)
    }

    /// Build the approximate index from the current snapshot unless it exists.
    fn ensure_index(&self, factory: &dyn ApproximateIndexFactory) -> Result<()> {
        let mut slot = self.approximate.write().map_err(|_| index_poisoned())?;
        if slot.is_some() {
            return Ok(());
        }
        let rtxn = self.env.read_txn().map_err(lmdb_err)?;
        let dimensions = self.read_meta(&rtxn)?.dimensions.unwrap_or_default();
        let entries = self.all_entries(&rtxn)?;
        let mut index = factory.build(dimensions, entries.len());
        for entry in &entries {
            index.insert(&entry.chunk_id, &entry.vector);
        }
        debug!(collection = %self.name, indexed = index.len(), "built approximate index");
        *slot = Some(index);
        Ok(())
    }

    fn candidates(&self, query: &[f32], limit: usize) -> Result<Option<Vec<String>>> {
        let slot = self.approximate.read().map_err(|_| index_poisoned())?;
        Ok(slot.as_ref().map(|index| index.candidates(query, limit)))
    }
}

/// A [`VectorStore`] that persists collections to disk with LMDB.
///
/// Search is exact cosine ranking. For collections larger than
/// [`StoreConfig::exact_search_limit`], a store built with
/// [`with_approximate_index`](LmdbVectorStore::with_approximate_index)
/// narrows the ranking to candidates proposed by an in-memory
/// [`ApproximateIndex`], built on the first large query and kept up to date
/// by later upserts.
///
/// # Example
///
/// ```rust,ignore
/// use ragcheck_rag::{LmdbVectorStore, StoreConfig, VectorStore};
///
/// let store = LmdbVectorStore::open(StoreConfig::new("./chroma_db"))?;
/// store.upsert("company_documents", &entries).await?;
/// let hits = store.query("company_documents", &query_embedding, 3).await?;
/// ```
pub struct LmdbVectorStore {
    config: StoreConfig,
    approximate: Option<Arc<dyn ApproximateIndexFactory>>,
    collections: RwLock<HashMap<String, Arc<CollectionHandle>>>,
}

impl LmdbVectorStore {
    /// Open (or create) a store rooted at `config.root`.
    ///
    /// # Errors
    ///
    /// [`RagError::ConfigError`] for a zero map size or candidate multiplier,
    /// [`RagError::VectorStoreError`] if the root directory cannot be created.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.map_size == 0 {
            return Err(RagError::ConfigError("map_size must be greater than zero".into()));
        }
        if config.candidate_multiplier == 0 {
            return Err(RagError::ConfigError(
                "candidate_multiplier must be greater than zero".into(),
            ));
        }
        std::fs::create_dir_all(&config.root).map_err(|e| {
            RagError::store(BACKEND, format!("cannot create '{}': {e}", config.root.display()))
        })?;
        info!(root = %config.root.display(), "opened vector store");
        Ok(Self { config, approximate: None, collections: RwLock::new(HashMap::new()) })
    }

    /// Use `factory` for collections above the exact search limit.
    pub fn with_approximate_index(mut self, factory: Arc<dyn ApproximateIndexFactory>) -> Self {
        self.approximate = Some(factory);
        self
    }

    /// Return the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.config.root.join(name)
    }

    /// Look up an opened collection, opening it from disk (or creating it
    /// when `create` is set) on first use. `None` means it does not exist.
    async fn handle(&self, name: &str, create: bool) -> Result<Option<Arc<CollectionHandle>>> {
        if let Some(handle) = self.collections.read().await.get(name) {
            return Ok(Some(handle.clone()));
        }
        validate_collection_name(name)?;

        let mut collections = self.collections.write().await;
        if let Some(handle) = collections.get(name) {
            return Ok(Some(handle.clone()));
        }

        let path = self.collection_path(name);
        if !create && !path.join(DATA_FILE).exists() {
            return Ok(None);
        }

        let map_size = self.config.map_size;
        let owned_name = name.to_string();
        let handle =
            blocking(move || CollectionHandle::open(&path, &owned_name, map_size)).await?;
        let handle = Arc::new(handle);
        collections.insert(name.to_string(), handle.clone());
        info!(collection = name, "opened collection");
        Ok(Some(handle))
    }

    async fn existing(&self, name: &str) -> Result<Arc<CollectionHandle>> {
        self.handle(name, false).await?.ok_or_else(|| RagError::CollectionNotFound(name.into()))
    }

    /// Candidate ids from the approximate index, building it on first use.
    /// `None` means the collection should be searched exactly.
    async fn approximate_candidates(
        &self,
        handle: &Arc<CollectionHandle>,
        query: &[f32],
        k: usize,
    ) -> Result<Option<Vec<String>>> {
        let Some(factory) = self.approximate.clone() else {
            return Ok(None);
        };
        let len = {
            let h = handle.clone();
            blocking(move || h.len()).await?
        };
        if len <= self.config.exact_search_limit {
            return Ok(None);
        }

        let limit = k.saturating_mul(self.config.candidate_multiplier);
        let query = query.to_vec();
        let h = handle.clone();
        blocking(move || {
            h.ensure_index(factory.as_ref())?;
            h.candidates(&query, limit)
        })
        .await
    }
}

#[async_trait]
impl VectorStore for LmdbVectorStore {
    async fn create_collection(&self, name: &str) -> Result<()> {
        self.handle(name, true).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_collection_name(name)?;
        let handle = self.collections.write().await.remove(name);
        let path = self.collection_path(name);
        let env = handle.map(|h| h.env.clone());

        blocking(move || {
            if let Some(env) = env {
                // Blocks until in-flight queries release their handles.
                env.prepare_for_closing().wait();
            }
            if path.exists() {
                std::fs::remove_dir_all(&path).map_err(|e| {
                    RagError::store(BACKEND, format!("cannot remove '{}': {e}", path.display()))
                })?;
            }
            Ok(())
        })
        .await?;
        info!(collection = name, "deleted collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<usize> {
        let handle = self
            .handle(collection, true)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(collection.into()))?;

        let owned = entries.to_vec();
        let written = blocking(move || handle.write_indexed(&owned)).await?;

        debug!(collection, written, "upserted entries");
        Ok(written)
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_k(k)?;
        let handle = self.existing(collection).await?;
        let candidates = self.approximate_candidates(&handle, embedding, k).await?;
        let query = embedding.to_vec();
        blocking(move || handle.search(&query, k, candidates)).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let handle = self.existing(collection).await?;
        blocking(move || handle.len()).await
    }

    async fn dimensions(&self, collection: &str) -> Result<Option<usize>> {
        let handle = self.existing(collection).await?;
        blocking(move || handle.dimensions()).await
    }
}
