//! Append-only file table
//!
//! File layout:
//! - 8 bytes: magic `SRCIDLG1`
//! - records: `[u32 key_len][key][u32 value_len][value]`, little-endian
//!
//! Later records for a key shadow earlier ones. The whole table is replayed
//! into memory on open, so point reads never touch the disk. When shadowed
//! records outweigh live ones the table is rewritten on open.

use crate::store::{Store, StoreError, StoreResult};
use crate::utils::{read_bytes, write_bytes, MAX_FIELD_LEN};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAGIC: &[u8; 8] = b"SRCIDLG1";

/// Tables smaller than this are never compacted on open
const COMPACT_MIN_BYTES: u64 = 4096;

/// Per-record framing: two u32 length prefixes
const RECORD_OVERHEAD: u64 = 8;

struct Inner {
    file: File,
    /// Length of the committed prefix of the file
    len: u64,
    entries: FxHashMap<Vec<u8>, Vec<u8>>,
    /// Set when the file could not be brought back to `len`; writes are refused
    poisoned: bool,
}

impl Inner {
    /// Bytes a fresh rewrite of the live entries would take
    fn live_bytes(&self) -> u64 {
        MAGIC.len() as u64
            + self
                .entries
                .iter()
                .map(|(k, v)| RECORD_OVERHEAD + k.len() as u64 + v.len() as u64)
                .sum::<u64>()
    }
}

/// Outcome of replaying a table file
#[derive(Debug, PartialEq, Eq)]
enum Replay {
    /// Every byte belongs to a whole record
    Complete,
    /// The file ends inside a record that starts at `good`
    TornTail { good: usize },
    /// The record at `offset` is unreadable before the end of the file
    Corrupt { offset: usize },
}

/// File-backed [`Store`] that appends one record per write
pub struct LogStore {
    path: PathBuf,
    sync_writes: bool,
    inner: Mutex<Inner>,
}

impl LogStore {
    /// Open (or create) the table file at `path`.
    ///
    /// A torn final record left by a crash mid-append is cut off; everything
    /// before it is kept. Any other unreadable record fails the open with
    /// [`StoreError::Corrupt`] and leaves the file untouched.
    pub fn open(path: &Path, sync_writes: bool) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let data = fs::read(path)?;
        let mut entries = FxHashMap::default();

        let len = if data.is_empty() {
            file.write_all(MAGIC)?;
            file.sync_all()?;
            MAGIC.len() as u64
        } else {
            if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
                return Err(StoreError::BadMagic {
                    path: path.to_path_buf(),
                });
            }

            match replay(&data, &mut entries) {
                Replay::Complete => data.len() as u64,
                Replay::TornTail { good } => {
                    warn!(
                        path = %path.display(),
                        dropped = data.len() - good,
                        "truncating torn record at end of table"
                    );
                    file.set_len(good as u64)?;
                    file.sync_all()?;
                    good as u64
                }
                Replay::Corrupt { offset } => {
                    return Err(StoreError::Corrupt {
                        path: path.to_path_buf(),
                        offset: offset as u64,
                    });
                }
            }
        };

        file.seek(SeekFrom::Start(len))?;

        debug!(path = %path.display(), entries = entries.len(), "opened table");

        let store = Self {
            path: path.to_path_buf(),
            sync_writes,
            inner: Mutex::new(Inner {
                file,
                len,
                entries,
                poisoned: false,
            }),
        };

        let dead = store.dead_bytes();
        if len >= COMPACT_MIN_BYTES && dead > len - dead {
            if let Err(e) = store.compact() {
                if store.inner.lock().poisoned {
                    return Err(e);
                }
                warn!(path = %path.display(), error = %e, "compaction failed, keeping table as is");
            }
        }

        Ok(store)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the committed part of the backing file in bytes
    pub fn file_size(&self) -> u64 {
        self.inner.lock().len
    }

    /// Bytes held by shadowed records
    pub fn dead_bytes(&self) -> u64 {
        let inner = self.inner.lock();
        inner.len.saturating_sub(inner.live_bytes())
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the table so it holds only the live record for each key.
    ///
    /// The new file is written next to the old one and renamed over it, so a
    /// crash leaves either the old table or the new one.
    pub fn compact(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.poisoned {
            return Err(StoreError::Poisoned {
                path: self.path.clone(),
            });
        }

        let before = inner.len;
        let len = rewrite(&self.path, &inner.entries)?;

        // The old handle now points at an unlinked file
        let reopened = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .and_then(|mut file| file.seek(SeekFrom::Start(len)).map(|_| file));
        match reopened {
            Ok(file) => {
                inner.file = file;
                inner.len = len;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to reopen compacted table");
                inner.poisoned = true;
                return Err(e.into());
            }
        }

        info!(path = %self.path.display(), before, after = len, "compacted table");
        Ok(())
    }
}

/// Replay records into `entries`
fn replay(data: &[u8], entries: &mut FxHashMap<Vec<u8>, Vec<u8>>) -> Replay {
    let mut pos = MAGIC.len();

    while pos < data.len() {
        let mut input = &data[pos..];
        let record = read_bytes(&mut input).and_then(|key| Ok((key, read_bytes(&mut input)?)));

        match record {
            Ok((key, value)) => {
                entries.insert(key, value);
                pos = data.len() - input.len();
            }
            // `input` runs to the end of the file, so EOF means a torn tail
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Replay::TornTail { good: pos };
            }
            Err(_) => return Replay::Corrupt { offset: pos },
        }
    }

    Replay::Complete
}

/// Write the live entries to a temporary file and rename it over `path`.
/// Returns the new file length.
fn rewrite(path: &Path, entries: &FxHashMap<Vec<u8>, Vec<u8>>) -> io::Result<u64> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("table path has no file name"))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".compact.{}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let written = (|| -> io::Result<u64> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        for (key, value) in sorted {
            write_bytes(&mut buf, key)?;
            write_bytes(&mut buf, value)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        Ok(buf.len() as u64)
    })();

    match written {
        Ok(len) => {
            sync_parent_dir(path);
            Ok(len)
        }
        Err(e) => {
            if let Err(remove) = fs::remove_file(&tmp_path)
                && remove.kind() != io::ErrorKind::NotFound
            {
                debug!(path = %tmp_path.display(), error = %remove, "failed to remove temporary table");
            }
            Err(e)
        }
    }
}

/// Make a rename durable; best effort
fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent()
            && let Err(e) = File::open(parent).and_then(|dir| dir.sync_all())
        {
            debug!(dir = %parent.display(), error = %e, "failed to sync table directory");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

impl Store for LogStore {
    fn set_value(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let len = key.len().max(value.len());
        if len > MAX_FIELD_LEN {
            return Err(StoreError::TooLarge { len });
        }

        let mut record = Vec::with_capacity(RECORD_OVERHEAD as usize + key.len() + value.len());
        write_bytes(&mut record, key)?;
        write_bytes(&mut record, value)?;

        let mut inner = self.inner.lock();
        if inner.poisoned {
            return Err(StoreError::Poisoned {
                path: self.path.clone(),
            });
        }

        let written = inner.file.write_all(&record).and_then(|()| {
            if self.sync_writes {
                inner.file.sync_data()
            } else {
                inner.file.flush()
            }
        });

        if let Err(e) = written {
            // Back to the committed prefix, or stop taking writes
            let committed = inner.len;
            if let Err(rollback) = inner
                .file
                .set_len(committed)
                .and_then(|()| inner.file.seek(SeekFrom::Start(committed)).map(|_| ()))
            {
                warn!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back table, refusing further writes"
                );
                inner.poisoned = true;
            }
            return Err(e.into());
        }

        inner.len += record.len() as u64;
        inner.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn value(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn entries(&self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_reopen_replays_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        {
            let store = LogStore::open(&path, true).unwrap();
            store.set_value(b"a", b"1").unwrap();
            store.set_value(b"b", b"2").unwrap();
            store.set_value(b"a", b"3").unwrap();
        }

        let store = LogStore::open(&path, true).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.value(b"a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.value(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.value(b"c").unwrap(), None);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        let good_len = {
            let store = LogStore::open(&path, true).unwrap();
            store.set_value(b"kept", b"yes").unwrap();
            store.file_size()
        };

        // Half a record: key length claims 10 bytes, only 2 follow
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&10u32.to_le_bytes()).unwrap();
            file.write_all(b"ab").unwrap();
        }

        let store = LogStore::open(&path, true).unwrap();
        assert_eq!(store.file_size(), good_len);
        assert_eq!(store.value(b"kept").unwrap(), Some(b"yes".to_vec()));

        // Appends after recovery land on the intact prefix
        store.set_value(b"next", b"ok").unwrap();
        drop(store);
        let store = LogStore::open(&path, true).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.value(b"next").unwrap(), Some(b"ok".to_vec()));
    }

    #[test]
    fn test_oversized_value_is_refused_and_later_writes_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        {
            let store = LogStore::open(&path, false).unwrap();
            store.set_value(b"a", b"1").unwrap();

            let big = vec![0u8; MAX_FIELD_LEN + 1];
            assert!(matches!(
                store.set_value(b"big", &big),
                Err(StoreError::TooLarge { .. })
            ));

            store.set_value(b"c", b"3").unwrap();
        }

        let store = LogStore::open(&path, false).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.value(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.value(b"big").unwrap(), None);
        assert_eq!(store.value(b"c").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_corrupt_length_fails_open_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        {
            let store = LogStore::open(&path, false).unwrap();
            store.set_value(b"a", b"1").unwrap();
            store.set_value(b"b", b"2").unwrap();
        }

        // Key length of the first record claims more than any field may hold
        let mut data = fs::read(&path).unwrap();
        data[MAGIC.len()..MAGIC.len() + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, &data).unwrap();

        assert!(matches!(
            LogStore::open(&path, false),
            Err(StoreError::Corrupt { offset: 8, .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_failed_rollback_poisons_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        let store = LogStore::open(&path, false).unwrap();
        store.set_value(b"a", b"1").unwrap();
        let committed = store.file_size();

        // A read-only handle rejects both the append and the truncate
        store.inner.lock().file = File::open(&path).unwrap();

        assert!(matches!(store.set_value(b"b", b"2"), Err(StoreError::Io(_))));
        assert_eq!(store.value(b"b").unwrap(), None);
        assert_eq!(store.file_size(), committed);

        assert!(matches!(
            store.set_value(b"c", b"3"),
            Err(StoreError::Poisoned { .. })
        ));
        assert!(matches!(store.compact(), Err(StoreError::Poisoned { .. })));
        assert_eq!(store.value(b"a").unwrap(), Some(b"1".to_vec()));
        drop(store);

        let store = LogStore::open(&path, false).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
    }

    #[test]
    fn test_shadowed_records_are_compacted_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        {
            let store = LogStore::open(&path, false).unwrap();
            for i in 0..1000 {
                store.set_value(b"key", format!("{i}").as_bytes()).unwrap();
            }
            store.set_value(b"other", b"x").unwrap();
            assert!(store.dead_bytes() > store.file_size() / 2);
        }

        let store = LogStore::open(&path, false).unwrap();
        let live = MAGIC.len() as u64 + (RECORD_OVERHEAD + 3 + 3) + (RECORD_OVERHEAD + 5 + 1);
        assert_eq!(store.file_size(), live);
        assert_eq!(fs::metadata(&path).unwrap().len(), live);
        assert_eq!(store.dead_bytes(), 0);
        assert_eq!(store.value(b"key").unwrap(), Some(b"999".to_vec()));

        // The compacted file keeps taking appends
        store.set_value(b"key", b"1000").unwrap();
        drop(store);
        let store = LogStore::open(&path, false).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.value(b"key").unwrap(), Some(b"1000".to_vec()));
        assert_eq!(store.value(b"other").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_small_tables_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");

        let size = {
            let store = LogStore::open(&path, false).unwrap();
            for _ in 0..10 {
                store.set_value(b"k", b"v").unwrap();
            }
            store.file_size()
        };

        let store = LogStore::open(&path, false).unwrap();
        assert_eq!(store.file_size(), size);
        assert!(store.dead_bytes() > 0);

        store.compact().unwrap();
        assert_eq!(store.dead_bytes(), 0);
        assert_eq!(store.value(b"k").unwrap(), Some(b"v".to_vec()));
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.log");
        fs::write(&path, b"not a table").unwrap();

        assert!(matches!(
            LogStore::open(&path, false),
            Err(StoreError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_empty_table_has_only_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.log");

        let store = LogStore::open(&path, false).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.file_size(), MAGIC.len() as u64);
        assert_eq!(fs::read(&path).unwrap(), MAGIC);
    }
}
