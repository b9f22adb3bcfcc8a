//! Path interning
//!
//! [`PathInterner`] hands out one [`LocationId`] per distinct path and never
//! takes it back. Both directions of the mapping live behind one lock: the
//! reverse direction is an arena indexed by id, the forward direction a hash
//! map into it, so they cannot drift apart.
//!
//! Every new mapping is written to the backing [`Store`] before the id is
//! returned. A caller may treat any id it receives as permanent: after a
//! restart, [`PathInterner::load`] recovers exactly the same mapping.

use crate::error::{Error, Result};
use crate::index::types::LocationId;
use crate::store::Store;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the logical table holding path -> id pairs
pub const FILE_IDS_TABLE: &str = "fileids";

/// Tolerated gap between the largest loaded id and the number of mappings
const MAX_ID_SLACK: usize = 4096;

struct State {
    /// Slot `i` holds the path for id `i`. Slot 0 (null) is always empty;
    /// other holes only exist if the loaded table skipped ids.
    paths: Vec<Option<PathBuf>>,
    ids: FxHashMap<PathBuf, LocationId>,
}

impl State {
    /// The id the next allocation receives. Always one past the last slot.
    fn next_id(&self) -> u64 {
        (self.paths.len() as u64).max(u64::from(LocationId::FIRST.get()))
    }
}

/// Durable, bijective path <-> [`LocationId`] mapping
pub struct PathInterner<S> {
    store: S,
    state: RwLock<State>,
}

impl<S: Store> PathInterner<S> {
    /// Bulk-load every persisted mapping from `store`.
    ///
    /// The allocation counter is not stored anywhere; it restarts at one past
    /// the largest id found (or at 1 for an empty table).
    pub fn load(store: S) -> Result<Self> {
        let entries = store.entries()?;
        let mut pairs = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            let path = String::from_utf8(key).map_err(|e| corrupt(format!(
                "path key is not UTF-8 ({} bytes)",
                e.as_bytes().len()
            )))?;

            let id = LocationId::from_le_bytes(&value).ok_or_else(|| {
                corrupt(format!("{path}: expected a 4-byte id, found {} bytes", value.len()))
            })?;
            if id < LocationId::FIRST {
                return Err(corrupt(format!("{path}: mapped to the null id")));
            }

            pairs.push((id, PathBuf::from(path)));
        }

        pairs.sort_unstable_by_key(|(id, _)| *id);
        let max = pairs.last().map_or(0, |(id, _)| id.get());

        // Allocation never skips ids; a table that is mostly holes is damaged
        if max as usize > pairs.len().saturating_mul(2) + MAX_ID_SLACK {
            return Err(corrupt(format!(
                "largest id {max} is far beyond the {} stored mappings",
                pairs.len()
            )));
        }

        let slots = (max as usize + 1).max(LocationId::FIRST.get() as usize);
        let mut paths: Vec<Option<PathBuf>> = vec![None; slots];
        let mut ids = FxHashMap::with_capacity_and_hasher(pairs.len(), Default::default());

        for (id, path) in pairs {
            let slot = &mut paths[id.get() as usize];
            if let Some(existing) = slot {
                return Err(corrupt(format!(
                    "id {id} claimed by both {} and {}",
                    existing.display(),
                    path.display()
                )));
            }
            ids.insert(path.clone(), id);
            *slot = Some(path);
        }

        let state = State { paths, ids };
        info!(
            paths = state.ids.len(),
            next_id = state.next_id(),
            "loaded path interner"
        );

        Ok(Self {
            store,
            state: RwLock::new(state),
        })
    }

    /// Return the id for `path`, allocating and persisting a new one if the
    /// path has never been seen.
    ///
    /// Fails only when a new id would have to be allocated and the store
    /// rejects the write (or the id space is exhausted). In that case nothing
    /// changes: no id is handed out and the counter does not move.
    pub fn intern(&self, path: impl AsRef<Path>) -> Result<LocationId> {
        let path = path.as_ref();

        if let Some(&id) = self.state.read().ids.get(path) {
            return Ok(id);
        }

        let key = path.to_str().ok_or_else(|| Error::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let mut state = self.state.write();

        // Another caller may have allocated it while we waited for the lock
        if let Some(&id) = state.ids.get(path) {
            return Ok(id);
        }

        let raw = u32::try_from(state.next_id()).map_err(|_| Error::IdSpaceExhausted)?;
        let id = LocationId::new(raw);

        // The write lock stays held across the store write: no other caller
        // can observe this mapping before it is durable.
        self.store.set_value(key.as_bytes(), &id.to_le_bytes())?;

        state.paths.push(Some(path.to_path_buf()));
        state.ids.insert(path.to_path_buf(), id);

        debug!(%id, path = %path.display(), "allocated location id");
        Ok(id)
    }

    /// Return the id for `path` if it has been interned. Never allocates.
    pub fn lookup(&self, path: impl AsRef<Path>) -> Option<LocationId> {
        self.state.read().ids.get(path.as_ref()).copied()
    }

    /// Return the path for `id`
    pub fn path(&self, id: LocationId) -> Option<PathBuf> {
        self.state
            .read()
            .paths
            .get(id.get() as usize)
            .and_then(|slot| slot.clone())
    }

    /// Number of interned paths
    pub fn len(&self) -> usize {
        self.state.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw value the next allocation will receive
    pub fn next_id(&self) -> u64 {
        self.state.read().next_id()
    }

    /// Snapshot of every mapping in id order
    pub fn entries(&self) -> Vec<(LocationId, PathBuf)> {
        self.state
            .read()
            .paths
            .iter()
            .enumerate()
            .filter_map(|(raw, slot)| {
                slot.as_ref()
                    .map(|path| (LocationId::new(raw as u32), path.clone()))
            })
            .collect()
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }
}

fn corrupt(reason: String) -> Error {
    Error::CorruptEntry {
        table: FILE_IDS_TABLE,
        reason,
    }
}
