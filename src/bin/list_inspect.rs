use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use recordview::storage::{decode_frame, read_header};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "recordview-inspect")]
#[command(about = "Inspect persisted record list state files")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a state file as JSON
    Show { file: PathBuf },
    /// Validate framing and payload of a state file
    Check { file: PathBuf },
    /// Summarize every state file in a directory
    Scan { dir: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
            }),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Show { file } => show(&file),
        Command::Check { file } => check(&file).map(|summary| println!("{}", summary)),
        Command::Scan { dir } => scan(&dir),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))
}

fn show(path: &Path) -> Result<()> {
    let bytes = read(path)?;
    let header = read_header(&bytes).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    let persisted = decode_frame(&bytes).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    let document = serde_json::json!({
        "format_version": header.version,
        "payload_len": header.payload_len,
        "list": persisted,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn check(path: &Path) -> Result<String> {
    let bytes = read(path)?;
    let header = read_header(&bytes).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    debug!(file = %path.display(), version = header.version, payload = header.payload_len, "header ok");
    let persisted = decode_frame(&bytes).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    Ok(format!(
        "{}: ok (format v{}, {} records, field {}, saved {})",
        path.display(),
        header.version,
        persisted.records.len(),
        persisted.property,
        persisted.saved_at.to_rfc3339()
    ))
}

fn scan(dir: &Path) -> Result<()> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "rvls"))
        .collect();
    paths.sort();

    let mut failures = 0;
    for path in &paths {
        match check(path) {
            Ok(summary) => println!("{}", summary),
            Err(err) => {
                failures += 1;
                println!("{}", err);
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("{} of {} state files are unreadable", failures, paths.len()));
    }
    Ok(())
}
