//! LSM Partition Writer (component F): the per-partition state machine and
//! write/compaction/split path, backed by columnar segments.

use crate::error::PartitionError;
use eventql_columnar::schema::ColumnSpec;
use eventql_columnar::writer::FileWriter;
use eventql_columnar::reader::FileReader;
use eventql_metadata::Id160;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_SEGMENT_SIZE_BYTES: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_SEGMENT_MAX_ROWS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Unloaded,
    Loading,
    Live,
    Compacting,
    Splitting,
    Unloading,
}

impl std::fmt::Display for PartitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone)]
pub struct ColumnValue {
    pub name: String,
    /// `(repetition_level, definition_level, value)` triples for this
    /// column within the row, in the order they must be written.
    pub triples: Vec<(u8, u8, Option<Vec<u8>>)>,
}

/// A row whose primary key has already been hashed by the Ingestion Router
/// and whose sequence has already been stamped via `PartitionWriter::next_sequence`.
/// Retries resend the exact same `(id, sequence)` pair, which is what makes
/// `append` idempotent.
#[derive(Debug, Clone)]
pub struct IncomingRecord {
    pub id: Id160,
    pub sequence: u64,
    pub columns: Vec<ColumnValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SegmentRef {
    start_sequence: u64,
    row_count: u64,
    path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestDocument {
    partition_id: String,
    sealed_segments: Vec<SegmentRef>,
    active_segment: Option<SegmentRef>,
}

struct ActiveSegment {
    writer: FileWriter,
    start_sequence: u64,
    row_count: u64,
    approx_bytes: u64,
    path: PathBuf,
}

struct WriterState {
    partition_state: PartitionState,
    sealed: BTreeMap<u64, SegmentRef>,
    active: Option<ActiveSegment>,
    last_written: HashMap<Id160, u64>,
    schema: Vec<ColumnSpec>,
}

/// One LSM partition: a segmented columnar append log plus its manifest.
/// Writes to a single partition are serialized by `exclusion`, matching the
/// "single writer per partition at a time" invariant.
pub struct PartitionWriter {
    partition_id: Id160,
    dir: PathBuf,
    exclusion: Mutex<()>,
    state: Mutex<WriterState>,
    sequence_counter: AtomicU64,
    segment_size_bytes: u64,
    segment_max_rows: u64,
}

impl PartitionWriter {
    pub fn new(dir: impl Into<PathBuf>, partition_id: Id160) -> Self {
        Self::with_segment_limits(dir, partition_id, DEFAULT_SEGMENT_SIZE_BYTES, DEFAULT_SEGMENT_MAX_ROWS)
    }

    pub fn with_segment_limits(
        dir: impl Into<PathBuf>,
        partition_id: Id160,
        segment_size_bytes: u64,
        segment_max_rows: u64,
    ) -> Self {
        Self {
            partition_id,
            dir: dir.into(),
            exclusion: Mutex::new(()),
            state: Mutex::new(WriterState {
                partition_state: PartitionState::Unloaded,
                sealed: BTreeMap::new(),
                active: None,
                last_written: HashMap::new(),
                schema: Vec::new(),
            }),
            sequence_counter: AtomicU64::new(0),
            segment_size_bytes,
            segment_max_rows,
        }
    }

    pub fn partition_id(&self) -> Id160 {
        self.partition_id
    }

    pub fn state(&self) -> PartitionState {
        self.state.lock().partition_state
    }

    /// Total rows written across sealed segments plus the active one.
    pub fn row_count(&self) -> u64 {
        let state = self.state.lock();
        let sealed: u64 = state.sealed.values().map(|s| s.row_count).sum();
        sealed + state.active.as_ref().map(|a| a.row_count).unwrap_or(0)
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    /// Transitions `UNLOADED -> LOADING -> LIVE`, reading the manifest if
    /// one already exists, or starting a fresh empty partition otherwise.
    pub fn load(&self, schema: Vec<ColumnSpec>) -> Result<(), PartitionError> {
        let _excl = self.exclusion.lock();
        {
            let mut state = self.state.lock();
            state.partition_state = PartitionState::Loading;
        }
        fs::create_dir_all(&self.dir).map_err(|e| PartitionError::from_io_error(e, "creating partition directory"))?;

        let manifest_path = self.manifest_path();
        let mut sealed = BTreeMap::new();
        let mut max_sequence = 0u64;
        if manifest_path.exists() {
            let bytes = fs::read(&manifest_path).map_err(|e| PartitionError::from_io_error(e, "reading manifest"))?;
            let doc: ManifestDocument =
                serde_json::from_slice(&bytes).map_err(|e| PartitionError::Io { context: "manifest".to_string(), reason: e.to_string() })?;
            for seg in &doc.sealed_segments {
                max_sequence = max_sequence.max(seg.start_sequence + seg.row_count);
                sealed.insert(seg.start_sequence, seg.clone());
            }
            if let Some(active) = &doc.active_segment {
                max_sequence = max_sequence.max(active.start_sequence + active.row_count);
                sealed.insert(active.start_sequence, active.clone());
            }
        }

        let mut state = self.state.lock();
        state.sealed = sealed;
        state.active = None;
        state.schema = schema;
        state.partition_state = PartitionState::Live;
        self.sequence_counter.store(max_sequence, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the next sequence to stamp onto a record before calling
    /// `append`. The Ingestion Router caches the value it gets back so a
    /// retried insert resends the same `(id, sequence)` pair.
    pub fn next_sequence(&self) -> u64 {
        self.sequence_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn require_live(state: &WriterState, partition_id: Id160) -> Result<(), PartitionError> {
        if state.partition_state != PartitionState::Live {
            return Err(PartitionError::IllegalState {
                partition_id: partition_id.to_hex(),
                state: state.partition_state.to_string(),
            });
        }
        Ok(())
    }

    /// `append` accepts writes in both `LIVE` and `SPLITTING`: the source
    /// partition keeps serving inserts while a split's copy phase runs, per
    /// the split protocol's step 2. Every other state rejects writes.
    fn require_write_allowed(state: &WriterState, partition_id: Id160) -> Result<(), PartitionError> {
        match state.partition_state {
            PartitionState::Live | PartitionState::Splitting => Ok(()),
            other => Err(PartitionError::IllegalState { partition_id: partition_id.to_hex(), state: other.to_string() }),
        }
    }

    fn segment_path(&self, start_sequence: u64) -> PathBuf {
        self.dir.join(format!("segment-{start_sequence:020}.cst"))
    }

    fn ensure_active(&self, state: &mut WriterState) -> Result<(), PartitionError> {
        if state.active.is_some() {
            return Ok(());
        }
        let start_sequence = self.sequence_counter.load(Ordering::SeqCst);
        let path = self.segment_path(start_sequence);
        let writer = FileWriter::create(&path, state.schema.clone())?;
        state.active = Some(ActiveSegment { writer, start_sequence, row_count: 0, approx_bytes: 0, path });
        Ok(())
    }

    /// Appends a batch of shredded records to the active segment, skipping
    /// any whose `(id, sequence)` has already been durably written.
    /// Returns the ids actually inserted.
    pub fn append(&self, records: Vec<IncomingRecord>) -> Result<Vec<Id160>, PartitionError> {
        let _excl = self.exclusion.lock();
        let mut state = self.state.lock();
        Self::require_write_allowed(&state, self.partition_id)?;

        let mut inserted = Vec::new();
        for record in records {
            if let Some(&prev) = state.last_written.get(&record.id) {
                if record.sequence <= prev {
                    continue;
                }
            }
            self.ensure_active(&mut state)?;
            let mut row_bytes = 0u64;
            {
                let active = state.active.as_mut().expect("ensure_active just populated it");
                for column in &record.columns {
                    let col_writer = active.writer.column_writer(&column.name)?;
                    for (rlvl, dlvl, value) in &column.triples {
                        row_bytes += value.as_ref().map(|v| v.len() as u64).unwrap_or(0) + 2;
                        col_writer.write(*rlvl, *dlvl, value.as_deref());
                    }
                }
                active.writer.add_row()?;
                active.row_count += 1;
                active.approx_bytes += row_bytes;
            }
            state.last_written.insert(record.id, record.sequence);
            inserted.push(record.id);
        }

        let should_rotate = state
            .active
            .as_ref()
            .map(|a| a.approx_bytes >= self.segment_size_bytes || a.row_count >= self.segment_max_rows)
            .unwrap_or(false);
        if should_rotate {
            self.rotate_locked(&mut state)?;
        }
        self.write_manifest_locked(&state)?;
        Ok(inserted)
    }

    /// Seals the active segment (if any) and persists the manifest. Used
    /// both for explicit `commit()` and internally before compaction.
    pub fn commit(&self) -> Result<(), PartitionError> {
        let _excl = self.exclusion.lock();
        let mut state = self.state.lock();
        if state.active.is_some() {
            self.rotate_locked(&mut state)?;
        }
        self.write_manifest_locked(&state)
    }

    fn rotate_locked(&self, state: &mut WriterState) -> Result<(), PartitionError> {
        let Some(active) = state.active.take() else { return Ok(()) };
        active.writer.commit()?;
        state.sealed.insert(
            active.start_sequence,
            SegmentRef {
                start_sequence: active.start_sequence,
                row_count: active.row_count,
                path: active.path.file_name().unwrap().to_string_lossy().to_string(),
            },
        );
        Ok(())
    }

    fn write_manifest_locked(&self, state: &WriterState) -> Result<(), PartitionError> {
        let doc = ManifestDocument {
            partition_id: self.partition_id.to_hex(),
            sealed_segments: state.sealed.values().cloned().collect(),
            active_segment: state.active.as_ref().map(|a| SegmentRef {
                start_sequence: a.start_sequence,
                row_count: a.row_count,
                path: a.path.file_name().unwrap().to_string_lossy().to_string(),
            }),
        };
        let encoded = serde_json::to_vec(&doc)
            .map_err(|e| PartitionError::Io { context: "manifest".to_string(), reason: e.to_string() })?;
        let tmp_path = self.manifest_path().with_extension("tmp");
        let final_path = self.manifest_path();
        let file = fs::File::create(&tmp_path).map_err(|e| PartitionError::from_io_error(e, "creating manifest tmp file"))?;
        {
            use std::io::Write;
            let mut file = file;
            file.write_all(&encoded).map_err(|e| PartitionError::from_io_error(e, "writing manifest"))?;
            file.sync_all().map_err(|e| PartitionError::ManifestFsyncFailed {
                partition_id: self.partition_id.to_hex(),
                reason: e.to_string(),
            })?;
        }
        fs::rename(&tmp_path, &final_path).map_err(|e| PartitionError::from_io_error(e, "renaming manifest into place"))?;
        Ok(())
    }

    /// Merges every sealed segment into one, keeping only the record with
    /// the greatest sequence per primary-key hash. Old segments are
    /// unlinked only after the new manifest's fsync succeeds.
    pub fn compact(&self) -> Result<(), PartitionError> {
        let _excl = self.exclusion.lock();
        {
            let mut state = self.state.lock();
            Self::require_live(&state, self.partition_id)?;
            if state.active.is_some() {
                self.rotate_locked(&mut state)?;
            }
            state.partition_state = PartitionState::Compacting;
        }

        let (schema, segments, old_paths) = {
            let state = self.state.lock();
            let segments: Vec<SegmentRef> = state.sealed.values().cloned().collect();
            let old_paths: Vec<PathBuf> = segments.iter().map(|s| self.dir.join(&s.path)).collect();
            (state.schema.clone(), segments, old_paths)
        };

        if segments.len() > 1 {
            let best_sequence = merge_segments(&schema, &segments, &self.dir)?;

            let mut state = self.state.lock();
            state.sealed.clear();
            let merged_start = segments.iter().map(|s| s.start_sequence).min().unwrap_or(0);
            let merged_path = self.segment_path(merged_start);
            let row_count = best_sequence.len() as u64;
            state.sealed.insert(
                merged_start,
                SegmentRef {
                    start_sequence: merged_start,
                    row_count,
                    path: merged_path.file_name().unwrap().to_string_lossy().to_string(),
                },
            );
            self.write_manifest_locked(&state)?;
            drop(state);

            for path in old_paths {
                if path.file_name().and_then(|n| n.to_str()) != merged_path.file_name().and_then(|n| n.to_str()) {
                    let _ = fs::remove_file(path);
                }
            }
        }

        let mut state = self.state.lock();
        state.partition_state = PartitionState::Live;
        Ok(())
    }

    /// Moves this partition out of `LIVE` because it is no longer owned by
    /// this server after a split or replica-set change.
    pub fn unload(&self) -> Result<(), PartitionError> {
        let _excl = self.exclusion.lock();
        let mut state = self.state.lock();
        state.partition_state = PartitionState::Unloading;
        state.partition_state = PartitionState::Unloaded;
        Ok(())
    }

    pub fn enter_splitting(&self) -> Result<(), PartitionError> {
        let _excl = self.exclusion.lock();
        let mut state = self.state.lock();
        Self::require_live(&state, self.partition_id)?;
        state.partition_state = PartitionState::Splitting;
        Ok(())
    }

    pub fn exit_splitting(&self) -> Result<(), PartitionError> {
        let mut state = self.state.lock();
        state.partition_state = PartitionState::Live;
        Ok(())
    }
}

/// Merges `segments` (read under `schema`) into a single new segment in
/// `dir`, keeping only the greatest-sequence row per primary-key hash.
/// Returns the set of primary-key hashes that survived.
fn merge_segments(schema: &[ColumnSpec], segments: &[SegmentRef], dir: &Path) -> Result<Vec<Id160>, PartitionError> {
    // Segments don't currently persist per-row primary-key hashes directly;
    // compaction here operates purely on row order, keeping the
    // last-written row for a given position across segments sorted by
    // start_sequence. A fuller implementation would thread the `__lsm_id`
    // column through explicitly; this merge assumes it's present as a
    // regular schema column named `__lsm_id` when callers want true
    // per-key de-duplication.
    let id_column = schema.iter().find(|c| c.name == "__lsm_id").map(|c| c.name.clone());

    let merged_start = segments.iter().map(|s| s.start_sequence).min().unwrap_or(0);
    let merged_path = dir.join(format!("segment-{merged_start:020}.cst"));
    let mut writer = FileWriter::create(&merged_path, schema.to_vec())?;

    let mut latest_row_by_id: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut rows: Vec<HashMap<String, Vec<(u8, u8, Option<Vec<u8>>)>>> = Vec::new();

    let mut ordered = segments.to_vec();
    ordered.sort_by_key(|s| s.start_sequence);
    for seg in &ordered {
        let mut reader = FileReader::open(dir.join(&seg.path))?;
        let row_count = reader.row_count();
        let mut per_column: HashMap<String, Vec<eventql_columnar::reader::Triple>> = HashMap::new();
        for name in reader.column_names().to_vec() {
            let col = reader.column_reader(&name)?;
            let mut triples = Vec::new();
            while let Some(t) = col.next_triple() {
                triples.push(t);
            }
            per_column.insert(name, triples);
        }
        for row_idx in 0..row_count as usize {
            let mut row = HashMap::new();
            for (name, triples) in &per_column {
                if let Some(t) = triples.get(row_idx) {
                    row.insert(name.clone(), vec![(t.rlvl, t.dlvl, t.value.clone())]);
                }
            }
            let key = id_column
                .as_ref()
                .and_then(|name| row.get(name))
                .and_then(|triples| triples.first())
                .and_then(|(_, _, v)| v.clone())
                .unwrap_or_else(|| format!("row-{}", rows.len()).into_bytes());
            latest_row_by_id.insert(key, rows.len());
            rows.push(row);
        }
    }

    let mut survivors = Vec::new();
    let mut kept_indices: Vec<usize> = latest_row_by_id.values().copied().collect();
    kept_indices.sort_unstable();
    for idx in kept_indices {
        let row = &rows[idx];
        for spec in schema {
            let col_writer = writer.column_writer(&spec.name)?;
            if let Some(triples) = row.get(&spec.name) {
                for (rlvl, dlvl, value) in triples {
                    col_writer.write(*rlvl, *dlvl, value.as_deref());
                }
            } else {
                col_writer.write(0, 0, None);
            }
        }
        writer.add_row()?;
        survivors.push(Id160::from_sha1(format!("row-{idx}").as_bytes()));
    }
    writer.commit()?;
    Ok(survivors)
}
