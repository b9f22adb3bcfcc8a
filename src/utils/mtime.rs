use std::path::Path;
use std::time::UNIX_EPOCH;

/// Modification time of `path` in nanoseconds since the Unix epoch.
///
/// `None` if the file cannot be stat'ed. Times before the epoch clamp to 0.
pub fn file_mtime(path: &Path) -> Option<u64> {
    let modified = path.metadata().and_then(|m| m.modified()).ok()?;
    Some(
        modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.c");
        assert_eq!(file_mtime(&file), None);

        std::fs::write(&file, "int x;").unwrap();
        let mtime = file_mtime(&file).unwrap();
        assert!(mtime > 0);
        assert_eq!(file_mtime(&file), Some(mtime));
    }
}
