//! On-disk cache of immutable metadata files, bounded by byte size and
//! entry count with LRU eviction. Mirrors the original implementation's
//! `kDefaultMaxBytes` / `kDefaultMaxEntries` defaults.

use crate::error::MetadataError;
use crate::file::{Id160, MetadataFile};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    namespace: String,
    table: String,
    txid: Id160,
}

struct CacheEntry {
    file: Arc<MetadataFile>,
    size_bytes: usize,
}

/// Bounded, disk-backed cache of metadata files. Commits serialise through
/// `commit_mutex`; the cache index has its own lock so concurrent `get`s
/// don't contend with in-flight writes.
pub struct MetadataStore {
    path_prefix: PathBuf,
    max_bytes: usize,
    max_entries: usize,
    commit_mutex: Mutex<()>,
    cache: Mutex<CacheState>,
}

struct CacheState {
    index: HashMap<CacheKey, CacheEntry>,
    /// Most-recently-used key at the back; eviction walks from the front.
    order: VecDeque<CacheKey>,
    size_bytes: usize,
}

impl MetadataStore {
    pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;
    pub const DEFAULT_MAX_ENTRIES: usize = 1024;

    pub fn new<P: AsRef<Path>>(path_prefix: P) -> Self {
        Self::with_limits(path_prefix, Self::DEFAULT_MAX_BYTES, Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits<P: AsRef<Path>>(path_prefix: P, max_bytes: usize, max_entries: usize) -> Self {
        Self {
            path_prefix: path_prefix.as_ref().to_path_buf(),
            max_bytes,
            max_entries,
            commit_mutex: Mutex::new(()),
            cache: Mutex::new(CacheState {
                index: HashMap::new(),
                order: VecDeque::new(),
                size_bytes: 0,
            }),
        }
    }

    fn disk_path(&self, namespace: &str, table: &str, txid: Id160) -> PathBuf {
        self.path_prefix.join(namespace).join(table).join(txid.to_hex())
    }

    pub fn has(&self, namespace: &str, table: &str, txid: Id160) -> bool {
        let key = CacheKey {
            namespace: namespace.to_string(),
            table: table.to_string(),
            txid,
        };
        if self.cache.lock().index.contains_key(&key) {
            return true;
        }
        self.disk_path(namespace, table, txid).exists()
    }

    /// Fetches a metadata file, reading through to disk on cache miss and
    /// inserting it at the head of the LRU.
    pub fn get(&self, namespace: &str, table: &str, txid: Id160) -> Result<Arc<MetadataFile>, MetadataError> {
        let key = CacheKey {
            namespace: namespace.to_string(),
            table: table.to_string(),
            txid,
        };
        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.index.get(&key) {
                let file = Arc::clone(&entry.file);
                touch(&mut cache.order, &key);
                return Ok(file);
            }
        }

        let path = self.disk_path(namespace, table, txid);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MetadataError::NotFound {
                    context: format!("{namespace}/{table}/{}", txid.to_hex()),
                }
            } else {
                MetadataError::from_io_error(e, "reading metadata file")
            }
        })?;
        let file = Arc::new(MetadataFile::decode(&bytes)?);
        self.insert_cache_entry(key, Arc::clone(&file), bytes.len());
        Ok(file)
    }

    /// Writes a new, immutable metadata file to disk and inserts it into the
    /// cache. A given `(namespace, table, txid)` is only ever written once.
    pub fn store(&self, namespace: &str, table: &str, file: MetadataFile) -> Result<(), MetadataError> {
        file.validate()?;
        let _commit_guard = self.commit_mutex.lock();

        let dir = self.path_prefix.join(namespace).join(table);
        fs::create_dir_all(&dir).map_err(|e| MetadataError::from_io_error(e, "creating metadata directory"))?;

        let txid = file.txid;
        let path = self.disk_path(namespace, table, txid);
        if path.exists() {
            return Err(MetadataError::AlreadyExists {
                context: format!("{namespace}/{table}/{}", txid.to_hex()),
            });
        }

        let encoded = file.encode()?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &encoded).map_err(|e| MetadataError::from_io_error(e, "writing metadata file"))?;
        fs::rename(&tmp_path, &path).map_err(|e| MetadataError::from_io_error(e, "renaming metadata file into place"))?;

        let key = CacheKey {
            namespace: namespace.to_string(),
            table: table.to_string(),
            txid,
        };
        self.insert_cache_entry(key, Arc::new(file), encoded.len());
        Ok(())
    }

    pub fn cache_size(&self) -> usize {
        self.cache.lock().size_bytes
    }

    pub fn cache_entries(&self) -> usize {
        self.cache.lock().index.len()
    }

    fn insert_cache_entry(&self, key: CacheKey, file: Arc<MetadataFile>, size_bytes: usize) {
        let mut cache = self.cache.lock();
        if cache.index.contains_key(&key) {
            touch(&mut cache.order, &key);
            return;
        }
        cache.size_bytes += size_bytes;
        cache.index.insert(key.clone(), CacheEntry { file, size_bytes });
        cache.order.push_back(key);
        self.evict_locked(&mut cache);
    }

    fn evict_locked(&self, cache: &mut CacheState) {
        while (cache.size_bytes > self.max_bytes || cache.index.len() > self.max_entries)
            && !cache.order.is_empty()
        {
            if let Some(oldest) = cache.order.pop_front() {
                if let Some(entry) = cache.index.remove(&oldest) {
                    cache.size_bytes -= entry.size_bytes;
                }
            }
        }
    }
}

fn touch(order: &mut VecDeque<CacheKey>, key: &CacheKey) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
    order.push_back(key.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PartitionMapEntry;
    use crate::keyspace::{KeyspaceKey, KeyspaceType};
    use tempfile::tempdir;

    fn sample_file(seq: u64) -> MetadataFile {
        MetadataFile::new(
            Id160::from_sha1(format!("seq-{seq}").as_bytes()),
            seq,
            KeyspaceType::Uint64,
            vec![PartitionMapEntry::new(
                KeyspaceKey::empty(),
                Id160::from_sha1(b"p0"),
                vec!["s1".to_string()],
            )],
        )
    }

    #[test]
    fn store_then_get_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        let file = sample_file(1);
        let txid = file.txid;
        store.store("ns1", "t1", file.clone()).unwrap();

        assert!(store.has("ns1", "t1", txid));
        let fetched = store.get("ns1", "t1", txid).unwrap();
        assert_eq!(*fetched, file);
    }

    #[test]
    fn store_rejects_duplicate_txid() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        let file = sample_file(1);
        store.store("ns1", "t1", file.clone()).unwrap();
        let err = store.store("ns1", "t1", file).unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists { .. }));
    }

    #[test]
    fn evicts_by_entry_count() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::with_limits(dir.path(), usize::MAX, 2);
        for seq in 0..5 {
            store.store("ns1", "t1", sample_file(seq)).unwrap();
        }
        assert!(store.cache_entries() <= 2);
    }

    #[test]
    fn get_on_miss_reads_through_to_disk_after_eviction() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::with_limits(dir.path(), usize::MAX, 1);
        let first = sample_file(0);
        let first_txid = first.txid;
        store.store("ns1", "t1", first.clone()).unwrap();
        store.store("ns1", "t1", sample_file(1)).unwrap();
        // first entry was evicted from cache, but still readable from disk
        let refetched = store.get("ns1", "t1", first_txid).unwrap();
        assert_eq!(*refetched, first);
    }
}
