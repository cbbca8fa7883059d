//! Event Store - Append-only state-change log
//!
//! The EventStore keeps every `StateChangeRecord` in an append-only JSONL file
//! and mirrors it in an in-memory index (records by entity id, counts by
//! method) so history lookups never rescan the file.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::types::{Method, PendingRecord, StateChangeCounts, StateChangeRecord};
use crate::utils::current_timestamp_millis;

/// Configuration for the EventStore
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    /// Path to the data directory
    pub data_dir: PathBuf,
    /// Whether each appended line is fsynced before the append returns
    pub sync_writes: bool,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sync_writes: true,
        }
    }
}

impl EventStoreConfig {
    /// Create config with custom data directory
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get path to events.jsonl
    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}

/// Result type for EventStore operations
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Errors that can occur in EventStore operations
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// The backing store rejected an append
    #[error("write failure: {0}")]
    WriteFailure(String),

    /// The backing store could not be read
    #[error("read failure: {0}")]
    ReadFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only log of state-change records
///
/// No update or delete is exposed: once appended, a record is immutable.
pub trait EventLog: Send + Sync {
    /// Persist one record, stamping its id, sequence and timestamp
    fn append(&self, record: PendingRecord) -> EventStoreResult<StateChangeRecord>;

    /// All records of one entity, ascending by `(timestamp, seq)`
    ///
    /// An empty result means the entity never existed; it is not an error.
    fn find_by_entity(&self, entity_id: &str) -> EventStoreResult<Vec<StateChangeRecord>>;

    /// Snapshot of every record of one entity type, in append order
    fn find_by_type(&self, entity_type: &str) -> EventStoreResult<Vec<StateChangeRecord>>;

    /// Number of committed records with the given method
    fn count_by_method(&self, method: Method) -> EventStoreResult<u64>;

    /// Sequence number of the newest record of one entity
    fn last_sequence(&self, entity_id: &str) -> EventStoreResult<Option<u64>> {
        Ok(self
            .find_by_entity(entity_id)?
            .iter()
            .map(|r| r.seq)
            .max())
    }

    /// Committed record counts for all methods
    fn counts(&self) -> EventStoreResult<StateChangeCounts> {
        Ok(StateChangeCounts::new(
            self.count_by_method(Method::Create)?,
            self.count_by_method(Method::Update)?,
            self.count_by_method(Method::Delete)?,
        ))
    }
}

/// In-memory mirror of the log
#[derive(Debug)]
struct LogIndex {
    records: Vec<StateChangeRecord>,
    by_entity: HashMap<String, Vec<usize>>,
    counts: HashMap<Method, u64>,
    next_seq: u64,
    last_timestamp: i64,
}

impl LogIndex {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            by_entity: HashMap::new(),
            counts: HashMap::new(),
            next_seq: 1,
            last_timestamp: 0,
        }
    }

    fn push(&mut self, record: StateChangeRecord) {
        if record.seq >= self.next_seq {
            self.next_seq = record.seq + 1;
        }
        self.last_timestamp = self.last_timestamp.max(record.timestamp);
        *self.counts.entry(record.method).or_insert(0) += 1;

        let position = self.records.len();
        self.by_entity
            .entry(record.entity_id.clone())
            .or_default()
            .push(position);
        self.records.push(record);
    }

    fn stamp(&self, pending: PendingRecord) -> StateChangeRecord {
        // Never earlier than the previous record, so clock regressions cannot reorder history
        let timestamp = pending
            .timestamp
            .unwrap_or_else(|| current_timestamp_millis().max(self.last_timestamp));

        StateChangeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            seq: self.next_seq,
            entity_id: pending.entity_id,
            entity_type: pending.entity_type,
            method: pending.method,
            timestamp,
            changes: pending.changes,
            user: pending.user,
        }
    }
}

/// The EventStore manages the append-only JSONL log and its index
pub struct EventStore {
    config: Option<EventStoreConfig>,
    index: RwLock<LogIndex>,
    /// Append handle; `None` for an in-memory store. Held for the whole append.
    writer: Mutex<Option<File>>,
}

impl EventStore {
    /// Create a store that keeps records in memory only
    pub fn in_memory() -> Self {
        Self {
            config: None,
            index: RwLock::new(LogIndex::new()),
            writer: Mutex::new(None),
        }
    }

    /// Open (or create) the JSONL log described by `config` and load its index
    pub fn open(config: EventStoreConfig) -> EventStoreResult<Self> {
        std::fs::create_dir_all(config.data_dir())?;
        let events_path = config.events_path();

        Self::truncate_torn_tail(&events_path)?;
        let index = Self::load_index(&events_path)?;
        info!(
            path = %events_path.display(),
            records = index.records.len(),
            entities = index.by_entity.len(),
            "Loaded event log"
        );

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)?;

        Ok(Self {
            config: Some(config),
            index: RwLock::new(index),
            writer: Mutex::new(Some(file)),
        })
    }

    /// Get the configuration, if file-backed
    pub fn config(&self) -> Option<&EventStoreConfig> {
        self.config.as_ref()
    }

    /// Number of records in the log
    pub fn len(&self) -> usize {
        self.index.read().records.len()
    }

    /// Whether the log holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load all records from a JSONL file into a fresh index
    fn load_index(path: &Path) -> EventStoreResult<LogIndex> {
        let mut index = LogIndex::new();
        if !path.exists() {
            return Ok(index);
        }

        let reader = BufReader::new(File::open(path)?);
        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match StateChangeRecord::from_json_line(&line) {
                Ok(record) => index.push(record),
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "Skipping unparseable record");
                }
            }
        }

        Ok(index)
    }

    /// Drop a trailing partial line left by an interrupted append
    ///
    /// Without this the next appended line would be glued onto the fragment
    /// and both would be skipped as unparseable on the following open.
    fn truncate_torn_tail(path: &Path) -> EventStoreResult<()> {
        if !path.exists() {
            return Ok(());
        }

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let mut contents = Vec::with_capacity(len as usize);
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut contents)?;
        let keep = contents
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos as u64 + 1);

        warn!(
            path = %path.display(),
            dropped_bytes = len - keep,
            "Truncating partial record at end of event log"
        );
        file.set_len(keep)?;
        file.sync_all()?;
        Ok(())
    }

    fn write_line(file: &mut File, record: &StateChangeRecord, sync: bool) -> EventStoreResult<()> {
        let json_line = record.to_json_line()?;
        Self::rollback_on_error(file, |file| {
            writeln!(file, "{}", json_line)?;
            if sync {
                file.sync_all()?;
            }
            Ok(())
        })
    }

    /// Run `write`, cutting the file back to its prior length if it fails
    ///
    /// A line that was written but not synced must not survive: its sequence
    /// number is handed out again by the next append.
    fn rollback_on_error<F>(file: &mut File, write: F) -> EventStoreResult<()>
    where
        F: FnOnce(&mut File) -> EventStoreResult<()>,
    {
        let len = file.metadata()?.len();
        let result = write(file);
        if result.is_err() {
            if let Err(e) = file.set_len(len) {
                error!(error = %e, len, "Could not roll back failed append");
            }
        }
        result
    }
}

impl EventLog for EventStore {
    fn append(&self, pending: PendingRecord) -> EventStoreResult<StateChangeRecord> {
        let mut writer = self.writer.lock();
        let record = self.index.read().stamp(pending);

        if let Some(file) = writer.as_mut() {
            let sync = self.config.as_ref().map_or(true, |c| c.sync_writes);
            Self::write_line(file, &record, sync)
                .map_err(|e| EventStoreError::WriteFailure(e.to_string()))?;
        }

        // Indexed only after the write succeeded, so counts reflect committed records
        self.index.write().push(record.clone());
        debug!(
            entity_id = %record.entity_id,
            method = %record.method,
            seq = record.seq,
            "Appended state change"
        );

        Ok(record)
    }

    fn find_by_entity(&self, entity_id: &str) -> EventStoreResult<Vec<StateChangeRecord>> {
        let index = self.index.read();
        let mut records: Vec<StateChangeRecord> = index
            .by_entity
            .get(entity_id)
            .map(|positions| positions.iter().map(|&i| index.records[i].clone()).collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.order_key());
        Ok(records)
    }

    fn find_by_type(&self, entity_type: &str) -> EventStoreResult<Vec<StateChangeRecord>> {
        Ok(self
            .index
            .read()
            .records
            .iter()
            .filter(|r| r.entity_type == entity_type)
            .cloned()
            .collect())
    }

    fn count_by_method(&self, method: Method) -> EventStoreResult<u64> {
        Ok(self.index.read().counts.get(&method).copied().unwrap_or(0))
    }

    fn last_sequence(&self, entity_id: &str) -> EventStoreResult<Option<u64>> {
        let index = self.index.read();
        Ok(index
            .by_entity
            .get(entity_id)
            .and_then(|positions| positions.iter().map(|&i| index.records[i].seq).max()))
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::types::{Attributes, BOOK_ENTITY_TYPE};

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn create(id: &str) -> PendingRecord {
        PendingRecord::create(
            id.to_string(),
            BOOK_ENTITY_TYPE,
            attrs(json!({"title": "A"})),
            "u".to_string(),
        )
    }

    fn delete(id: &str) -> PendingRecord {
        PendingRecord::delete(id.to_string(), BOOK_ENTITY_TYPE, "u".to_string())
    }

    fn create_test_store() -> (EventStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = EventStore::open(EventStoreConfig::new(temp_dir.path())).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_append_assigns_id_seq_and_timestamp() {
        let (store, _temp_dir) = create_test_store();

        let first = store
            .append(PendingRecord::create(
                "b-1".to_string(),
                BOOK_ENTITY_TYPE,
                attrs(json!({"title": "Dune"})),
                "ann".to_string(),
            ))
            .unwrap();
        let second = store
            .append(PendingRecord::delete(
                "b-1".to_string(),
                BOOK_ENTITY_TYPE,
                "ann".to_string(),
            ))
            .unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_ne!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_find_by_entity_sorts_by_timestamp_then_seq() {
        let store = EventStore::in_memory();
        let user = "ann".to_string();

        let update = |n: i64| {
            PendingRecord::update(
                "b-1".to_string(),
                BOOK_ENTITY_TYPE,
                attrs(json!({ "n": n })),
                user.clone(),
            )
        };

        store.append(update(2).at(200)).unwrap();
        store
            .append(
                PendingRecord::create(
                    "b-1".to_string(),
                    BOOK_ENTITY_TYPE,
                    attrs(json!({"n": 1})),
                    user.clone(),
                )
                .at(100),
            )
            .unwrap();
        store.append(update(3).at(200)).unwrap();
        store.append(create("b-2").at(50)).unwrap();

        let history = store.find_by_entity("b-1").unwrap();
        let seqs: Vec<u64> = history.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 1, 3]);
        assert_eq!(store.last_sequence("b-1").unwrap(), Some(3));
    }

    #[test]
    fn test_unknown_entity_is_empty_not_error() {
        let store = EventStore::in_memory();
        assert!(store.find_by_entity("missing").unwrap().is_empty());
        assert_eq!(store.last_sequence("missing").unwrap(), None);
    }

    #[test]
    fn test_count_by_method() {
        let store = EventStore::in_memory();
        for i in 0..3 {
            store.append(create(&format!("b-{}", i))).unwrap();
        }
        store.append(delete("b-0")).unwrap();

        assert_eq!(store.count_by_method(Method::Create).unwrap(), 3);
        assert_eq!(store.count_by_method(Method::Update).unwrap(), 0);
        assert_eq!(store.count_by_method(Method::Delete).unwrap(), 1);
        assert_eq!(store.counts().unwrap().total_count, 4);
    }

    #[test]
    fn test_find_by_type_filters() {
        let store = EventStore::in_memory();
        store.append(create("b-1")).unwrap();
        store
            .append(PendingRecord::create(
                "m-1".to_string(),
                "Magazine",
                Attributes::new(),
                "u".to_string(),
            ))
            .unwrap();

        let books = store.find_by_type(BOOK_ENTITY_TYPE).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].entity_id, "b-1");
    }

    #[test]
    fn test_reopen_restores_index() {
        let temp_dir = TempDir::new().unwrap();
        let config = EventStoreConfig::new(temp_dir.path());

        {
            let store = EventStore::open(config.clone()).unwrap();
            store.append(create("b-1")).unwrap();
            store
                .append(PendingRecord::update(
                    "b-1".to_string(),
                    BOOK_ENTITY_TYPE,
                    attrs(json!({"title": "B"})),
                    "u".to_string(),
                ))
                .unwrap();
        }

        let reopened = EventStore::open(config).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.find_by_entity("b-1").unwrap().len(), 2);
        assert_eq!(reopened.count_by_method(Method::Update).unwrap(), 1);

        let next = reopened.append(delete("b-1")).unwrap();
        assert_eq!(next.seq, 3);
    }

    #[test]
    fn test_skips_corrupt_lines_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let config = EventStoreConfig::new(temp_dir.path());

        {
            let store = EventStore::open(config.clone()).unwrap();
            store.append(create("b-1")).unwrap();
        }

        let mut file = OpenOptions::new().append(true).open(config.events_path()).unwrap();
        writeln!(file, "{{not json").unwrap();

        let reopened = EventStore::open(config).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_partial_tail_does_not_swallow_next_append() {
        let temp_dir = TempDir::new().unwrap();
        let config = EventStoreConfig::new(temp_dir.path());

        {
            let store = EventStore::open(config.clone()).unwrap();
            store.append(create("b-1")).unwrap();
        }

        // Crash mid-append: half a record, no newline
        let mut file = OpenOptions::new().append(true).open(config.events_path()).unwrap();
        write!(file, "{{\"id\":\"torn\",\"seq\":").unwrap();
        drop(file);

        {
            let store = EventStore::open(config.clone()).unwrap();
            assert_eq!(store.len(), 1);
            let record = store.append(create("b-2")).unwrap();
            assert_eq!(record.seq, 2);
        }

        let reopened = EventStore::open(config.clone()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.find_by_entity("b-1").unwrap().len(), 1);
        assert_eq!(reopened.find_by_entity("b-2").unwrap().len(), 1);

        let contents = std::fs::read_to_string(config.events_path()).unwrap();
        assert!(!contents.contains("torn"));
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_partial_only_line_truncates_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = EventStoreConfig::new(temp_dir.path());
        std::fs::write(config.events_path(), "{\"id\":").unwrap();

        let store = EventStore::open(config.clone()).unwrap();
        assert!(store.is_empty());
        assert_eq!(std::fs::metadata(config.events_path()).unwrap().len(), 0);
        assert_eq!(store.append(create("b-1")).unwrap().seq, 1);
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let temp_dir = TempDir::new().unwrap();
        let config = EventStoreConfig::new(temp_dir.path());

        {
            let store = EventStore::open(config.clone()).unwrap();
            store.append(create("b-1")).unwrap();
        }
        let committed_len = std::fs::metadata(config.events_path()).unwrap().len();

        // A line that reached the file before the sync reported failure
        let mut file = OpenOptions::new().append(true).open(config.events_path()).unwrap();
        let result = EventStore::rollback_on_error(&mut file, |file| {
            writeln!(file, "{}", r#"{"id":"x","seq":2}"#)?;
            Err(EventStoreError::WriteFailure("sync failed".to_string()))
        });
        drop(file);

        assert!(matches!(result, Err(EventStoreError::WriteFailure(_))));
        assert_eq!(std::fs::metadata(config.events_path()).unwrap().len(), committed_len);

        let store = EventStore::open(config.clone()).unwrap();
        let next = store.append(create("b-2")).unwrap();
        assert_eq!(next.seq, 2);
        drop(store);

        let reopened = EventStore::open(config).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.find_by_entity("b-2").unwrap()[0].seq, 2);
    }

    #[test]
    fn test_successful_write_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("log.jsonl");
        let mut file = OpenOptions::new().create(true).append(true).open(&path).unwrap();

        EventStore::rollback_on_error(&mut file, |file| {
            writeln!(file, "line")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }
}
