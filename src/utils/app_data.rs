use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "srcid";
const CONFIG_FILE: &str = "config.json";
const PROJECTS_DIR: &str = "projects";
const META_FILE: &str = "meta.json";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// fsync every table append before returning
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,

    /// Number of decoded source records kept in memory (0 disables the cache)
    #[serde(default = "default_source_cache_size")]
    pub source_cache_size: usize,

    /// Where project databases live. Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_sync_writes() -> bool {
    true
}

fn default_source_cache_size() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sync_writes: default_sync_writes(),
            source_cache_size: default_source_cache_size(),
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: AppConfig = serde_json::from_str(&content)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the app data directory
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Directory that holds one database per project
    pub fn projects_dir(&self) -> Result<PathBuf> {
        let base = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => get_app_data_dir()?,
        };
        let projects = base.join(PROJECTS_DIR);
        fs::create_dir_all(&projects)
            .with_context(|| format!("Failed to create {}", projects.display()))?;
        Ok(projects)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Get the database directory for a specific project root.
///
/// Falls back to any existing database whose `meta.json` names the same
/// root, so a database created under an older directory name is still found.
pub fn get_db_dir(config: &AppConfig, root_path: &Path) -> Result<PathBuf> {
    let dir = config.projects_dir()?.join(hash_path(root_path));
    if dir.join(META_FILE).exists() {
        return Ok(dir);
    }

    let canonical = root_path.canonicalize().unwrap_or_else(|_| root_path.to_path_buf());
    let existing = list_projects(config)?.into_iter().find(|project| {
        project.root_path == canonical
            || project.root_path.canonicalize().is_ok_and(|p| p == canonical)
    });
    Ok(existing.map_or(dir, |project| project.db_dir))
}

/// Hash a path to create a unique folder name
/// Format: first 16 chars of dir name + first 16 hex chars of its SHA-256
fn hash_path(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();

    // Get directory name for readability
    let dir_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let sanitized: String = dir_name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(16)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(path_str.as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}-{}", sanitized, &digest[..16])
}

/// Find the root of a project starting from a given path
/// Walks up the directory tree looking for:
/// 1. A .git directory (git repo root)
/// 2. A root that already has a database
pub fn find_project_root(config: &AppConfig, start_path: &Path) -> Result<PathBuf> {
    let start = start_path
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", start_path.display()))?;
    let mut current = start.as_path();

    loop {
        if current.join(".git").exists() {
            return Ok(current.to_path_buf());
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    current = start.as_path();
    loop {
        if has_database(config, current)? {
            return Ok(current.to_path_buf());
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    // Nothing found: a file's project is its directory
    if start.is_file()
        && let Some(parent) = start.parent()
    {
        return Ok(parent.to_path_buf());
    }
    Ok(start)
}

/// Check if a project root has a database
pub fn has_database(config: &AppConfig, root_path: &Path) -> Result<bool> {
    let db_dir = get_db_dir(config, root_path)?;
    Ok(db_dir.join(META_FILE).exists())
}

/// List all project databases
pub fn list_projects(config: &AppConfig) -> Result<Vec<ProjectLocation>> {
    let projects_dir = config.projects_dir()?;
    let mut projects = Vec::new();

    for entry in fs::read_dir(&projects_dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_dir() {
            continue;
        }

        let meta_path = path.join(META_FILE);
        let Ok(file) = fs::File::open(&meta_path) else {
            continue;
        };
        if let Ok(meta) = serde_json::from_reader::<_, serde_json::Value>(file)
            && let Some(root) = meta.get("root_path").and_then(|v| v.as_str())
        {
            projects.push(ProjectLocation {
                root_path: PathBuf::from(root),
                db_dir: path,
            });
        }
    }

    projects.sort_by(|a, b| a.root_path.cmp(&b.root_path));
    Ok(projects)
}

/// Remove the database for a project
pub fn remove_database(config: &AppConfig, root_path: &Path) -> Result<bool> {
    let db_dir = get_db_dir(config, root_path)?;
    if db_dir.exists() {
        fs::remove_dir_all(&db_dir)
            .with_context(|| format!("Failed to remove {}", db_dir.display()))?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// A project database on disk
#[derive(Debug, Clone)]
pub struct ProjectLocation {
    pub root_path: PathBuf,
    pub db_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AppConfig {
        AppConfig {
            data_dir: Some(dir.to_path_buf()),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_hash_path() {
        let hash1 = hash_path(Path::new("/home/user/project"));
        let hash2 = hash_path(Path::new("/home/user/project"));
        let hash3 = hash_path(Path::new("/home/user/other"));

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert!(hash1.starts_with("project-"));
    }

    #[test]
    fn test_hash_path_is_stable() {
        assert_eq!(
            hash_path(Path::new("/home/user/project")),
            "project-9dad1e4e08b0b11c"
        );
    }

    #[test]
    fn test_db_dir_found_through_meta_root() {
        let data = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let root = work.path().canonicalize().unwrap();
        let config = config_in(data.path());

        let fresh = get_db_dir(&config, &root).unwrap();
        assert_eq!(fresh.file_name().unwrap().to_str().unwrap(), hash_path(&root));

        let legacy = config.projects_dir().unwrap().join("legacy-0123456789abcdef");
        fs::create_dir_all(&legacy).unwrap();
        let meta = serde_json::json!({ "root_path": root });
        fs::write(legacy.join(META_FILE), meta.to_string()).unwrap();

        assert_eq!(get_db_dir(&config, &root).unwrap(), legacy);
        assert!(has_database(&config, &root).unwrap());
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.sync_writes);
        assert_eq!(config.source_cache_size, 256);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_app_config_partial_json() {
        let json = r#"{"sync_writes": false}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert!(!config.sync_writes);
        assert_eq!(config.source_cache_size, 256);
    }

    #[test]
    fn test_app_config_empty_json() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();

        assert!(config.sync_writes);
        assert_eq!(config.source_cache_size, 256);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_app_config_serialization() {
        let config = AppConfig {
            sync_writes: false,
            source_cache_size: 8,
            data_dir: Some(PathBuf::from("/var/lib/srcid")),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert!(!parsed.sync_writes);
        assert_eq!(parsed.source_cache_size, 8);
        assert_eq!(parsed.data_dir, Some(PathBuf::from("/var/lib/srcid")));
    }

    #[test]
    fn test_find_project_root_prefers_git() {
        let data = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let repo = work.path().join("repo");
        let nested = repo.join("src").join("deep");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::create_dir_all(&nested).unwrap();

        let config = config_in(data.path());
        let root = find_project_root(&config, &nested).unwrap();
        assert_eq!(root, repo.canonicalize().unwrap());
    }

    #[test]
    fn test_remove_missing_database() {
        let data = tempfile::tempdir().unwrap();
        let config = config_in(data.path());
        assert!(!remove_database(&config, Path::new("/no/such/project")).unwrap());
        assert!(list_projects(&config).unwrap().is_empty());
    }
}
