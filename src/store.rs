use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::keydir::{Keydir, KeydirEntry};
use crate::record::{Record, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::segment::{parse_segment_file_name, Segment};
use crate::{Error, Result, BASE_SEGMENT_ID, MAX_FILE_SIZE};

/// Per-store tuning knobs, fixed at open.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rotation ceiling for the active segment, in bytes.
    pub max_file_size: u64,
    /// Upper bound on key length, in bytes.
    pub max_key_size: usize,
    /// Upper bound on value length, in bytes. Clamped to
    /// [`MAX_VALUE_SIZE`](crate::MAX_VALUE_SIZE) at open.
    pub max_value_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_file_size: MAX_FILE_SIZE,
            max_key_size: MAX_KEY_SIZE,
            max_value_size: MAX_VALUE_SIZE,
        }
    }
}

/// A Bitcask-style store: append-only segment files indexed by an in-memory
/// key directory.
///
/// `Store` is a cheap handle; clones share the same engine state and may be
/// used from any thread. Writes hold the exclusive lock end-to-end, reads
/// only the shared one, and segment reads are positional, so concurrent
/// readers never contend on a file cursor.
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

struct StoreInner {
    dir: PathBuf,
    config: Config,
    keydir: Keydir,
    /// Every open segment keyed by id. The highest id is the active one.
    segments: BTreeMap<u64, Segment>,
    active_id: u64,
    /// Byte offset at which the next record lands in the active segment.
    write_offset: u64,
    /// Set when an append may have left partial bytes behind. All further
    /// writes are refused so the tracked offset never drifts from disk.
    poisoned: bool,
    closed: bool,
}

impl Store {
    /// Opens the store in `dir` with the default [`Config`].
    ///
    /// The directory must already exist. Every segment file in it is
    /// replayed to rebuild the key directory, then a fresh active segment is
    /// created with the next id.
    pub fn open<P>(dir: P) -> Result<Store>
    where
        P: Into<PathBuf>,
    {
        Store::open_with_config(dir, Config::default())
    }

    /// Opens the store in `dir` with an explicit [`Config`].
    pub fn open_with_config<P>(dir: P, mut config: Config) -> Result<Store>
    where
        P: Into<PathBuf>,
    {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::DirectoryMissing(dir));
        }
        config.max_key_size = config.max_key_size.min(MAX_KEY_SIZE);
        config.max_value_size = config.max_value_size.min(MAX_VALUE_SIZE);

        let mut keydir = Keydir::default();
        let mut segments = BTreeMap::new();

        for (id, path) in list_segment_files(&dir)? {
            let segment = Segment::open(path, id)?;
            segment.replay(|record| {
                if record.tombstone {
                    keydir.remove(&record.key);
                } else {
                    keydir.insert(
                        record.key,
                        KeydirEntry {
                            segment_id: id,
                            offset: record.offset,
                            len: record.len,
                            timestamp: record.timestamp,
                        },
                    );
                }
            })?;
            segments.insert(id, segment);
        }

        let active_id = segments
            .keys()
            .next_back()
            .map_or(BASE_SEGMENT_ID, |last| last + 1);
        let active = Segment::create(&dir, active_id)?;
        segments.insert(active_id, active);

        info!(
            "opened store at {} with {} live keys across {} segments",
            dir.display(),
            keydir.len(),
            segments.len()
        );

        Ok(Store {
            inner: Arc::new(RwLock::new(StoreInner {
                dir,
                config,
                keydir,
                segments,
                active_id,
                write_offset: 0,
                poisoned: false,
                closed: false,
            })),
        })
    }

    /// Looks up `key` and reads its newest value back from disk.
    ///
    /// The whole record is re-read and its checksum verified on every call,
    /// so silent corruption surfaces as [`Error::ChecksumMismatch`] rather
    /// than as bad data.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }
        let entry = inner.keydir.get(key).ok_or(Error::KeyNotFound)?;
        let segment = inner
            .segments
            .get(&entry.segment_id)
            .ok_or(Error::KeyNotFound)?;

        let mut buf = vec![0u8; entry.len as usize];
        segment.read_exact_at(&mut buf, entry.offset)?;
        let record = Record::decode(&buf)?;
        record.verify_checksum(&buf)?;
        Ok(record.value)
    }

    /// Durably writes `value` under `key`.
    ///
    /// The record is appended and fsynced before the key directory is
    /// updated, so an acknowledged put survives a crash.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        inner.check_writable()?;
        inner.validate(key, Some(value))?;

        let timestamp = Utc::now().timestamp() as u32;
        let record = Record::put(timestamp, key, value);
        let (segment_id, offset) = inner.append_record(&record)?;
        inner.keydir.insert(
            key.to_vec(),
            KeydirEntry {
                segment_id,
                offset,
                len: record.len() as u32,
                timestamp,
            },
        );
        Ok(())
    }

    /// Writes a tombstone for `key` and drops it from the key directory.
    ///
    /// The key's older records remain on disk but become unreachable; replay
    /// of the tombstone keeps the key dead across restarts.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        inner.check_writable()?;
        inner.validate(key, None)?;
        if !inner.keydir.contains(key) {
            return Err(Error::KeyNotFound);
        }

        let timestamp = Utc::now().timestamp() as u32;
        let record = Record::tombstone(timestamp, key);
        inner.append_record(&record)?;
        inner.keydir.remove(key);
        Ok(())
    }

    /// Returns every live key. Order is unspecified.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        self.inner.read().keydir.keys()
    }

    /// Fsyncs and closes the active segment, then releases every other
    /// segment handle. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        if let Some(active) = inner.segments.get(&inner.active_id) {
            active.sync()?;
        }
        inner.segments.clear();
        inner.closed = true;
        debug!("closed store at {}", inner.dir.display());
        Ok(())
    }
}

impl StoreInner {
    fn check_writable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        Ok(())
    }

    fn validate(&self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if key.len() > self.config.max_key_size {
            return Err(Error::LargeKey {
                size: key.len(),
                limit: self.config.max_key_size,
            });
        }
        if let Some(value) = value {
            if value.len() > self.config.max_value_size {
                return Err(Error::LargeValue {
                    size: value.len(),
                    limit: self.config.max_value_size,
                });
            }
        }
        Ok(())
    }

    /// Encodes and appends `record` to the active segment, rotating first if
    /// the append would push it past the size ceiling. Returns the segment
    /// id and offset where the record landed.
    fn append_record(&mut self, record: &Record) -> Result<(u64, u64)> {
        let len = record.len() as u64;
        if self.write_offset + len > self.config.max_file_size {
            self.rotate()?;
        }

        let mut buf = Vec::with_capacity(record.len());
        record.encode_into(&mut buf)?;

        let offset = self.write_offset;
        let active = self.segments.get(&self.active_id).ok_or(Error::Closed)?;
        if let Err(e) = active.append(&buf) {
            // the file may now hold a partial record; refuse further writes
            // rather than let the tracked offset drift from what is on disk
            self.poisoned = true;
            return Err(e);
        }
        self.write_offset += len;
        Ok((self.active_id, offset))
    }

    /// Seals the active segment and starts a fresh one with the next id.
    /// The sealed segment stays open for reads of entries that still point
    /// into it.
    fn rotate(&mut self) -> Result<()> {
        let next_id = self.active_id + 1;
        debug!(
            "active segment {} reached the size ceiling, rotating to {}",
            self.active_id, next_id
        );
        let segment = Segment::create(&self.dir, next_id)?;
        self.segments.insert(next_id, segment);
        self.active_id = next_id;
        self.write_offset = 0;
        Ok(())
    }
}

/// Enumerates the data directory, refusing anything that is not a segment
/// file. Entries come back sorted by id so replay sees oldest first and
/// newer records shadow older ones.
fn list_segment_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let dirname = dir.display().to_string();
    let entries = fs::read_dir(dir).map_err(|source| Error::Io {
        source,
        filename: dirname.clone(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            source,
            filename: dirname.clone(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let id = parse_segment_file_name(&name.to_string_lossy())?;
        files.push((id, path));
    }
    files.sort_by_key(|(id, _)| *id);
    Ok(files)
}
