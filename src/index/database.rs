use crate::index::args::CompilerArgs;
use crate::index::interner::{PathInterner, FILE_IDS_TABLE};
use crate::index::source::{Dependencies, SourceRecord};
use crate::index::table::{SourceTable, SOURCES_TABLE};
use crate::index::types::{DbMeta, LocationId};
use crate::store::LogStore;
use crate::utils::{file_mtime, get_db_dir, AppConfig};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// One project's on-disk state: the path interner and the source table.
///
/// Open once per process and share by reference (or `Arc`); both tables are
/// safe to use from many threads.
pub struct Database {
    root: PathBuf,
    dir: PathBuf,
    interner: PathInterner<LogStore>,
    sources: SourceTable<LogStore>,
}

impl Database {
    /// Open the database for the project rooted at `root`
    pub fn open(root: &Path, config: &AppConfig) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Invalid project root: {}", root.display()))?;
        let dir = get_db_dir(config, &root)?;
        Self::open_at(&dir, &root, config)
    }

    /// Open a database stored in `dir` for the project rooted at `root`
    pub fn open_at(dir: &Path, root: &Path, config: &AppConfig) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let file_ids = LogStore::open(&table_path(dir, FILE_IDS_TABLE), config.sync_writes)
            .context("Failed to open file id table")?;
        let interner = PathInterner::load(file_ids).context("Failed to load file ids")?;

        let sources = LogStore::open(&table_path(dir, SOURCES_TABLE), config.sync_writes)
            .context("Failed to open source table")?;
        let sources = SourceTable::new(sources, config.source_cache_size);

        write_meta(dir, root)?;

        info!(
            root = %root.display(),
            dir = %dir.display(),
            paths = interner.len(),
            "opened database"
        );

        Ok(Self {
            root: root.to_path_buf(),
            dir: dir.to_path_buf(),
            interner,
            sources,
        })
    }

    pub fn interner(&self) -> &PathInterner<LogStore> {
        &self.interner
    }

    pub fn sources(&self) -> &SourceTable<LogStore> {
        &self.sources
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record that `path` was just indexed with `args` against the given
    /// dependency closure, taking timestamps from the filesystem.
    ///
    /// Interns the file and every dependency. Dependencies that cannot be
    /// stat'ed are left out of the record.
    pub fn record(
        &self,
        path: &Path,
        args: CompilerArgs,
        dependencies: &[PathBuf],
        unsaved: bool,
    ) -> Result<LocationId> {
        let id = self.interner.intern(path)?;
        let last_modified = file_mtime(path).unwrap_or(0);

        let record = if unsaved {
            SourceRecord::unsaved(args, last_modified)
        } else {
            let mut deps = Dependencies::new();
            for dep in dependencies {
                self.interner.intern(dep)?;
                if let Some(mtime) = file_mtime(dep) {
                    deps.insert(dep.clone(), mtime);
                }
            }
            SourceRecord::saved(args, last_modified, deps)
        };

        self.sources.put(id, &record)?;
        Ok(id)
    }

    /// Whether `path` has to be indexed again. Unknown paths always do.
    pub fn needs_reindex(&self, path: &Path) -> bool {
        match self.interner.lookup(path) {
            Some(id) => self.sources.needs_reindex(id, path),
            None => true,
        }
    }
}

fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.log"))
}

/// Write meta.json, keeping the creation time of an existing file
fn write_meta(dir: &Path, root: &Path) -> Result<()> {
    let meta_path = dir.join("meta.json");
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let created_at = File::open(&meta_path)
        .ok()
        .and_then(|file| serde_json::from_reader::<_, DbMeta>(file).ok())
        .map_or(now, |meta| meta.created_at);

    let meta = DbMeta {
        version: DbMeta::VERSION,
        root_path: root.to_path_buf(),
        created_at,
        updated_at: now,
    };

    let file = File::create(&meta_path)
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;
    serde_json::to_writer_pretty(file, &meta)?;
    Ok(())
}

/// Read meta.json from a database directory
pub fn read_meta(dir: &Path) -> Result<DbMeta> {
    let meta_path = dir.join("meta.json");
    let file = File::open(&meta_path).context("Failed to open meta.json")?;
    Ok(serde_json::from_reader(file)?)
}
