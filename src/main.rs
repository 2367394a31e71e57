//! fso - copy, move, rename, delete and watch files from the command line.
//!
//! Usage:
//!   fso copy SRC DEST          Copy a file or directory tree
//!   fso move SRC DEST          Move a file or directory
//!   fso rename PATH NAME       Rename in place
//!   fso delete PATH            Delete a file or directory tree
//!   fso ls DIR                 List files or subdirectories
//!   fso info PATH              Show a metadata snapshot
//!   fso watch DIR              Print coalesced changes until Ctrl-C
//!   fso --help                 Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use fsobject_core::{
    EngineConfig, FnSink, MetadataSnapshot, ProgressSink, StorageContext, StorageProgress,
};
use fsobject_ops::{
    CopyOptions, DirCopyOptions, DirectoryObject, MoveOptions, RelocationStrategy, StorageHandle,
};

#[derive(Parser)]
#[command(
    name = "fso",
    version,
    about = "Storage object operations with progress and change monitoring"
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy a file or directory tree
    Copy {
        source: PathBuf,
        destination: PathBuf,

        /// Replace existing files
        #[arg(short, long)]
        overwrite: bool,

        /// Files copied at once for directory trees
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Move a file or directory
    Move {
        source: PathBuf,
        destination: PathBuf,

        /// Replace an existing destination
        #[arg(short, long)]
        overwrite: bool,

        /// Always copy then delete, even on the same volume
        #[arg(long)]
        copy_delete: bool,
    },

    /// Rename a file or directory in place
    Rename { path: PathBuf, new_name: String },

    /// Delete a file or directory tree
    Delete { path: PathBuf },

    /// List entries under a directory
    Ls {
        #[arg(default_value = ".")]
        directory: PathBuf,

        /// Glob matched against entry names
        #[arg(short, long, default_value = "*")]
        pattern: String,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// List directories instead of files
        #[arg(short, long)]
        dirs: bool,
    },

    /// Show the metadata snapshot of a path
    Info {
        path: PathBuf,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one line per coalesced change until interrupted
    Watch {
        #[arg(default_value = ".")]
        directory: PathBuf,

        /// Debounce window in milliseconds
        #[arg(long, default_value = "250")]
        debounce_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Command::Copy {
            source,
            destination,
            overwrite,
            jobs,
        } => run_copy(source, destination, overwrite, jobs).await?,
        Command::Move {
            source,
            destination,
            overwrite,
            copy_delete,
        } => run_move(source, destination, overwrite, copy_delete).await?,
        Command::Rename { path, new_name } => {
            let handle = open_quiet(&path).await?;
            let metadata = handle
                .rename(&new_name, MoveOptions::default())
                .await
                .wrap_err("Rename failed")?;
            println!("{}", metadata.path.display());
        }
        Command::Delete { path } => {
            let handle = open_quiet(&path).await?;
            handle.delete().await.wrap_err("Delete failed")?;
            println!("Deleted {}", path.display());
        }
        Command::Ls {
            directory,
            pattern,
            recursive,
            dirs,
        } => run_ls(directory, &pattern, recursive, dirs).await?,
        Command::Info { path, json } => {
            let handle = open_quiet(&path).await?;
            let metadata = handle.metadata()?;
            if json {
                println!("{}", serde_json::to_string_pretty(metadata.as_ref())?);
            } else {
                print_snapshot(&metadata);
            }
        }
        Command::Watch {
            directory,
            debounce_ms,
        } => run_watch(directory, debounce_ms).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "fsobject=debug" } else { "fsobject=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn quiet_context() -> StorageContext {
    let config = EngineConfig {
        watch_directories: false,
        ..EngineConfig::default()
    };
    StorageContext::new(config)
}

async fn open_quiet(path: &Path) -> Result<StorageHandle> {
    StorageHandle::open_in(path, quiet_context())
        .await
        .wrap_err_with(|| format!("Cannot open {}", path.display()))
}

/// A sink that redraws a single status line on stderr.
fn progress_line() -> Arc<dyn ProgressSink> {
    Arc::new(FnSink(|p: StorageProgress| {
        eprint!(
            "\r{:>6.1}%  {} / {}  {}/s   ",
            p.percentage(),
            format_size(p.bytes_transferred),
            format_size(p.total_bytes),
            format_size(p.bytes_per_second as u64),
        );
    }))
}

async fn run_copy(
    source: PathBuf,
    destination: PathBuf,
    overwrite: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let handle = open_quiet(&source).await?;

    let target = match &handle {
        StorageHandle::File(file) => {
            let options = CopyOptions {
                overwrite,
                ..CopyOptions::default()
            }
            .with_progress(progress_line());
            let copy = file.copy_to(&destination, options).await;
            eprintln!();
            copy.wrap_err("Copy failed")?.full_path()?
        }
        StorageHandle::Directory(dir) => {
            let mut options = DirCopyOptions {
                overwrite,
                ..DirCopyOptions::default()
            }
            .with_progress(progress_line());
            if let Some(jobs) = jobs {
                options = options.with_max_concurrency(jobs);
            }
            let copy = dir.copy_to(&destination, options).await;
            eprintln!();
            copy.wrap_err("Copy failed")?.full_path()?
        }
    };

    println!("Copied {} -> {}", source.display(), target.display());
    Ok(())
}

async fn run_move(
    source: PathBuf,
    destination: PathBuf,
    overwrite: bool,
    copy_delete: bool,
) -> Result<()> {
    let handle = open_quiet(&source).await?;
    let strategy = if copy_delete {
        RelocationStrategy::CopyThenDelete
    } else {
        RelocationStrategy::Auto
    };
    let options = MoveOptions {
        overwrite,
        strategy,
        ..MoveOptions::default()
    }
    .with_progress(progress_line());

    let moved = handle.move_to(&destination, options).await;
    eprintln!();
    let metadata = moved.wrap_err("Move failed")?;

    println!("Moved {} -> {}", source.display(), metadata.path.display());
    Ok(())
}

async fn run_ls(directory: PathBuf, pattern: &str, recursive: bool, dirs: bool) -> Result<()> {
    let dir = DirectoryObject::open_in(&directory, quiet_context())
        .await
        .wrap_err_with(|| format!("Cannot open {}", directory.display()))?;

    let entries = if dirs {
        dir.get_directories(pattern, recursive).await?
    } else {
        dir.get_files(pattern, recursive).await?
    };

    let root = dir.full_path()?;
    for entry in entries {
        let shown = entry.strip_prefix(&root).unwrap_or(&entry);
        println!("{}", shown.display());
    }
    Ok(())
}

async fn run_watch(directory: PathBuf, debounce_ms: u64) -> Result<()> {
    let config = EngineConfig::builder()
        .debounce_window(Duration::from_millis(debounce_ms))
        .build()?;
    let dir = DirectoryObject::open_in(&directory, StorageContext::new(config))
        .await
        .wrap_err_with(|| format!("Cannot watch {}", directory.display()))?;
    let mut changes = dir.subscribe();

    eprintln!("Watching {} (Ctrl-C to stop)", dir.full_path()?.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => match event {
                Ok(event) => {
                    let summary = event
                        .metadata
                        .as_ref()
                        .map(|m| {
                            format!(
                                "{} files, {} dirs, {}",
                                m.file_count(),
                                m.dir_count(),
                                format_size(m.size)
                            )
                        })
                        .unwrap_or_default();
                    println!(
                        "{} {} {} {}",
                        Local::now().format("%H:%M:%S"),
                        event.change,
                        event.path.display(),
                        summary
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "change notifications dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    dir.dispose();
    Ok(())
}

fn print_snapshot(metadata: &MetadataSnapshot) {
    println!("{}", "─".repeat(60));
    println!(" {}", metadata.path.display());
    println!("{}", "─".repeat(60));
    if metadata.is_dir() {
        println!(" Kind:      directory");
        println!(
            " Contents:  {} files, {} directories",
            metadata.file_count(),
            metadata.dir_count()
        );
    } else {
        println!(" Kind:      file");
    }
    println!(" Size:      {}", format_size(metadata.size));
    println!(" Modified:  {}", format_time(metadata.timestamps.modified));
    if let Some(accessed) = metadata.timestamps.accessed {
        println!(" Accessed:  {}", format_time(accessed));
    }
    if let Some(created) = metadata.timestamps.created {
        println!(" Created:   {}", format_time(created));
    }
    println!(" Flags:     {:#06b}", metadata.attributes.bits());
    if let Some(mode) = metadata.extras.mode {
        println!(" Mode:      {:o}", mode & 0o7777);
    }
    if let Some(owner) = metadata.extras.owner {
        println!(" Owner:     {owner}");
    }
    if let Some(target) = &metadata.extras.link_target {
        println!(" Link to:   {}", target.display());
    }
    if let Some(info) = &metadata.type_info {
        println!(" Type:      {} ({})", info.display_type, info.mime);
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
