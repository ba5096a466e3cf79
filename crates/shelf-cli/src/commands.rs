use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use shelf_server::{FileEntry, ServerConfig, ShelfServer};
use shelf_store::{PersistenceWarning, StorageService};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = resolve_config(&cli)?;
    let format = cli.format;
    tracing::debug!(?config, "resolved configuration");

    match cli.command {
        Command::Serve(args) => {
            apply_serve_args(&mut config, &args);
            cmd_serve(config)
        }
        Command::Add(args) => {
            let storage = open_storage(config)?;
            cmd_add(&storage, &args.path, format, &mut io::stdout().lock())
        }
        Command::List(_) => {
            let storage = open_storage(config)?;
            cmd_list(&storage, format, &mut io::stdout().lock())
        }
        Command::Show(args) => {
            let storage = open_storage(config)?;
            cmd_show(&storage, &args, format, &mut io::stdout().lock())
        }
        Command::Rm(args) => {
            let storage = open_storage(config)?;
            cmd_rm(&storage, &args.id, format, &mut io::stdout().lock())
        }
    }
}

fn open_storage(config: ServerConfig) -> anyhow::Result<StorageService> {
    StorageService::open(config.storage).context("failed to open storage")
}

/// Config file (if any), then environment and flags.
///
/// clap already resolves each flag against its environment variable, so a
/// flag that is `Some` here wins over the file.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_toml_file(path)?,
        None => ServerConfig::default(),
    };
    let overrides = &cli.storage;
    if let Some(dir) = &overrides.resources_dir {
        config.storage.resources_dir = dir.clone();
    }
    if let Some(path) = &overrides.mapping_path {
        config.storage.mapping_path = path.clone();
    }
    if let Some(max) = overrides.max_file_size {
        config.storage.max_file_size = max;
    }
    Ok(config)
}

pub fn apply_serve_args(config: &mut ServerConfig, args: &ServeArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
}

fn cmd_serve(config: ServerConfig) -> anyhow::Result<()> {
    let server = ShelfServer::new(config).context("failed to open storage")?;
    println!(
        "{} Shelf listening on {}",
        "✓".green().bold(),
        server.config().bind_addr().bold()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn report_warning(warning: &Option<PersistenceWarning>) {
    if let Some(w) = warning {
        eprintln!("{} {}", "warning:".yellow().bold(), w);
    }
}

fn cmd_add(
    storage: &StorageService,
    path: &Path,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let outcome = storage
        .add_path(path)
        .with_context(|| format!("failed to add {}", path.display()))?;
    report_warning(&outcome.warning);
    let (id, name) = outcome.value;

    match format {
        OutputFormat::Text => {
            writeln!(
                out,
                "{} Stored {} as {}",
                "✓".green().bold(),
                name.bold(),
                id.as_str().yellow()
            )?
        }
        OutputFormat::Json => {
            let mut body = json!({ "id": id.as_str(), "filename": name });
            if let Some(w) = outcome.warning {
                body["warning"] = json!(w.message);
            }
            writeln!(out, "{body}")?
        }
    }
    Ok(())
}

fn cmd_list(
    storage: &StorageService,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let entries = storage.list();
    match format {
        OutputFormat::Text if entries.is_empty() => writeln!(out, "No files stored.")?,
        OutputFormat::Text => {
            for (id, name) in &entries {
                writeln!(out, "{}  {}", id.as_str().yellow(), name)?;
            }
        }
        OutputFormat::Json => {
            let entries: Vec<FileEntry> = entries
                .into_iter()
                .map(|(id, name)| FileEntry {
                    id: id.to_string(),
                    name,
                })
                .collect();
            writeln!(out, "{}", serde_json::to_string(&entries)?)?;
        }
    }
    Ok(())
}

fn cmd_show(
    storage: &StorageService,
    args: &ShowArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let (path, name) = storage.get(&args.id)?;
    let size = fs::metadata(&path)?.len();

    if let Some(dest) = &args.output {
        let (content, _) = storage.read(&args.id)?;
        fs::write(dest, content).with_context(|| format!("failed to write {}", dest.display()))?;
    }

    match format {
        OutputFormat::Text => {
            writeln!(out, "{}  {}", args.id.yellow().bold(), name.bold())?;
            writeln!(out, "  Size: {size} bytes")?;
            writeln!(out, "  Path: {}", path.display())?;
            if let Some(dest) = &args.output {
                writeln!(out, "  {} {}", "Copied to".green(), dest.display())?;
            }
        }
        OutputFormat::Json => {
            let body = json!({
                "id": args.id,
                "name": name,
                "size": size,
                "path": path.display().to_string(),
            });
            writeln!(out, "{body}")?;
        }
    }
    Ok(())
}

fn cmd_rm(
    storage: &StorageService,
    id: &str,
    format: OutputFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let outcome = storage.delete(id)?;
    report_warning(&outcome.warning);
    match format {
        OutputFormat::Text => writeln!(out, "{} Deleted {}", "✓".green().bold(), id.yellow())?,
        OutputFormat::Json => writeln!(out, "{}", json!({ "status": "ok" }))?,
    }
    Ok(())
}
