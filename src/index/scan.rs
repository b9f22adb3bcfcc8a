use crate::index::interner::PathInterner;
use crate::index::types::Language;
use crate::store::Store;
use crate::utils::progress;
use anyhow::Result;
use ignore::WalkBuilder;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Outcome of interning every file under a project root
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Files seen by the walk
    pub files: usize,
    /// Files that got a new id
    pub new_ids: usize,
    /// Files that could not be interned
    pub errors: usize,
    /// Files per language, by extension
    pub languages: FxHashMap<Language, usize>,
}

/// Collect every file under `root`, honoring ignore files
pub fn discover_files(root: &Path) -> Vec<PathBuf> {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(name.as_ref(), ".git" | "node_modules" | "target" | "build")
        })
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Intern every file under `root` in parallel
pub fn scan_project<S: Store>(
    interner: &PathInterner<S>,
    root: &Path,
    show_progress: bool,
) -> Result<ScanSummary> {
    let spinner = show_progress.then(|| progress::spinner("Discovering files..."));

    let files = discover_files(root);

    if let Some(spinner) = spinner {
        spinner.finish_with_message(format!("Found {} files", files.len()));
    }

    let bar = show_progress.then(|| progress::bar(files.len() as u64, "Interning paths..."));

    let before = interner.len();
    let errors = AtomicUsize::new(0);

    let languages = files
        .par_iter()
        .fold(FxHashMap::default, |mut languages: FxHashMap<Language, usize>, path| {
            match interner.intern(path) {
                Ok(id) => {
                    debug!(%id, path = %path.display(), "interned");
                    let language = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map_or(Language::Unknown, Language::from_extension);
                    *languages.entry(language).or_default() += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to intern");
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            if let Some(bar) = &bar {
                bar.inc(1);
            }
            languages
        })
        .reduce(FxHashMap::default, |mut acc, part| {
            for (language, count) in part {
                *acc.entry(language).or_default() += count;
            }
            acc
        });

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    Ok(ScanSummary {
        files: files.len(),
        new_ids: interner.len().saturating_sub(before),
        errors: errors.into_inner(),
        languages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;

    #[test]
    fn test_scan_interns_every_file_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.cpp"), "").unwrap();
        fs::write(dir.path().join("src/main.h"), "").unwrap();
        fs::write(dir.path().join("README"), "").unwrap();

        let interner = PathInterner::load(MemoryStore::new()).unwrap();
        let summary = scan_project(&interner, dir.path(), false).unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.new_ids, 3);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.languages.get(&Language::Cpp), Some(&1));
        assert!(interner.lookup(dir.path().join("src/main.h")).is_some());

        let again = scan_project(&interner, dir.path(), false).unwrap();
        assert_eq!(again.files, 3);
        assert_eq!(again.new_ids, 0);
        assert_eq!(interner.len(), 3);
    }

    #[test]
    fn test_discover_skips_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/out.o"), "").unwrap();
        fs::write(dir.path().join("a.c"), "").unwrap();

        let files = discover_files(dir.path());
        assert_eq!(files, vec![dir.path().join("a.c")]);
    }
}
