use crate::index::database::{read_meta, Database};
use crate::index::types::Language;
use crate::utils::{list_projects, AppConfig};
use anyhow::Result;
use std::path::Path;

/// Display database statistics
pub fn show_stats(db: &Database) -> Result<()> {
    let interner = db.interner();
    let sources = db.sources().count()?;

    println!("Database Statistics");
    println!("===================");
    println!();
    println!("Root path:        {}", db.root().display());
    println!("Database:         {}", db.dir().display());
    println!("Paths interned:   {}", interner.len());
    println!("Next id:          {}", interner.next_id());
    println!("Source records:   {}", sources);

    let mut headers = 0;
    let mut sources_by_ext = 0;
    for (_, path) in interner.entries() {
        let language = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(Language::Unknown, Language::from_extension);
        if language.is_header() {
            headers += 1;
        } else if language != Language::Unknown {
            sources_by_ext += 1;
        }
    }
    println!("Source files:     {}", sources_by_ext);
    println!("Header files:     {}", headers);

    println!();
    println!("File id log:      {}", format_size(interner.store().file_size()));
    println!("Source log:       {}", format_size(db.sources().store().file_size()));
    println!(
        "Reclaimable:      {}",
        format_size(interner.store().dead_bytes() + db.sources().store().dead_bytes())
    );
    if let Ok(size) = dir_size(db.dir()) {
        println!("Total size:       {}", format_size(size));
    }

    if let Ok(meta) = read_meta(db.dir()) {
        println!();
        println!("Created:          {}", format_timestamp(meta.created_at));
        println!("Updated:          {}", format_timestamp(meta.updated_at));
    }

    Ok(())
}

/// List all project databases
pub fn list_databases(config: &AppConfig) -> Result<()> {
    let projects = list_projects(config)?;

    if projects.is_empty() {
        println!("No project databases found.");
        return Ok(());
    }

    println!("Project Databases");
    println!("=================");
    println!();

    for project in projects {
        let status = if project.root_path.exists() { "" } else { " [missing]" };
        println!("  {}{}", project.root_path.display(), status);
        println!("    Database: {}", project.db_dir.display());
        println!();
    }

    Ok(())
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}
