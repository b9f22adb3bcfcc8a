use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use srcid::index::{scan, stats, CompilerArgs, Database, LocationId};
use srcid::utils::{find_project_root, remove_database, AppConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "srcid")]
#[command(about = "Durable file ids and reindex fingerprints for C/C++ projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project path (auto-detects git root)
    #[arg(short, long, default_value = ".", global = true)]
    project: PathBuf,

    /// Override where project databases are stored
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Intern paths and print their ids
    Intern {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the path for an id
    Path { id: u32 },
    /// Dump every id -> path mapping
    List,
    /// Intern every file in the project
    Scan {
        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Store a source record for a file using its current mtimes
    Record {
        file: PathBuf,

        /// Compiler executable
        #[arg(long, default_value = "cc")]
        compiler: PathBuf,

        /// Dependency of the translation unit (repeatable)
        #[arg(long = "dep")]
        dependencies: Vec<PathBuf>,

        /// The file was indexed from an unsaved editor buffer
        #[arg(long)]
        unsaved: bool,

        /// Compiler arguments
        #[arg(last = true)]
        arguments: Vec<String>,
    },
    /// Report whether files need reindexing
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show database statistics
    Stats,
    /// Rewrite both tables without shadowed records
    Compact,
    /// List all project databases
    Projects,
    /// Remove the project's database
    Remove,
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AppConfig::load()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    match cli.command {
        Commands::Intern { paths } => {
            let db = open_database(&cli.project, &config)?;
            for path in paths {
                let path = absolute(&path)?;
                let id = db.interner().intern(&path)?;
                println!("{}\t{}", id, path.display());
            }
        }
        Commands::Path { id } => {
            let db = open_database(&cli.project, &config)?;
            match db.interner().path(LocationId::new(id)) {
                Some(path) => println!("{}", path.display()),
                None => bail!("No path for id {}", id),
            }
        }
        Commands::List => {
            let db = open_database(&cli.project, &config)?;
            for (id, path) in db.interner().entries() {
                println!("{}\t{}", id, path.display());
            }
        }
        Commands::Scan { quiet } => {
            let db = open_database(&cli.project, &config)?;
            println!("Scanning: {}", db.root().display());
            let summary = scan::scan_project(db.interner(), db.root(), !quiet)?;
            println!(
                "{} files, {} new ids, {} total",
                summary.files,
                summary.new_ids,
                db.interner().len()
            );
            if summary.errors > 0 {
                println!("{} files could not be interned", summary.errors);
            }

            let mut languages: Vec<_> = summary.languages.into_iter().collect();
            languages.sort_by(|a, b| b.1.cmp(&a.1));
            if !languages.is_empty() {
                println!();
                println!("Files by language:");
                for (language, count) in languages {
                    println!("  {:15} {}", format!("{:?}", language), count);
                }
            }
        }
        Commands::Record {
            file,
            compiler,
            dependencies,
            unsaved,
            arguments,
        } => {
            let db = open_database(&cli.project, &config)?;
            let file = absolute(&file)?;
            let dependencies = dependencies
                .iter()
                .map(|dep| absolute(dep))
                .collect::<Result<Vec<_>>>()?;
            let args = CompilerArgs::new(compiler, &file, arguments);
            let id = db.record(&file, args, &dependencies, unsaved)?;
            println!("{}\t{}", id, file.display());
        }
        Commands::Check { files } => {
            let db = open_database(&cli.project, &config)?;
            for file in files {
                let file = absolute(&file)?;
                let state = if db.needs_reindex(&file) {
                    "reindex"
                } else {
                    "up-to-date"
                };
                println!("{}\t{}", state, file.display());
            }
        }
        Commands::Stats => {
            let db = open_database(&cli.project, &config)?;
            stats::show_stats(&db)?;
        }
        Commands::Compact => {
            let db = open_database(&cli.project, &config)?;
            db.interner()
                .store()
                .compact()
                .context("Failed to compact file id table")?;
            db.sources()
                .store()
                .compact()
                .context("Failed to compact source table")?;
            println!("Compacted database for: {}", db.root().display());
        }
        Commands::Projects => {
            stats::list_databases(&config)?;
        }
        Commands::Remove => {
            let root = find_project_root(&config, &cli.project)?;
            if remove_database(&config, &root)? {
                println!("Removed database for: {}", root.display());
            } else {
                println!("No database for: {}", root.display());
            }
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_database(project: &Path, config: &AppConfig) -> Result<Database> {
    let root = find_project_root(config, project)?;
    Database::open(&root, config)
}

/// Resolve a command line path against the working directory
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}
