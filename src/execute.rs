use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use gopin::get::{self, GetRequest, ValidatedRequest};
use gopin::index::ModDir;
use gopin::runner::{GoRunner, UpdatePolicy};
use crate::cli::{GopinCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let default_filter = if cli.verbose { "gopin=debug" } else { "gopin=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match cli.command {
        GopinCommand::Get {
            target,
            name,
            rename,
            go,
            insecure,
            link,
            update,
            update_patch,
        } => {
            let update = match (update, update_patch) {
                (true, _) => UpdatePolicy::Minor,
                (_, true) => UpdatePolicy::Patch,
                _ => UpdatePolicy::None,
            };
            execute_get(
                cli.moddir,
                GetRequest {
                    target,
                    name,
                    rename,
                    update,
                    link,
                    gobin: None,
                },
                go,
                insecure,
                cli.verbose,
            )
        }
        GopinCommand::List { name } => execute_list(cli.moddir, name),
        GopinCommand::Version => execute_version(),
    }
}

pub fn execute_get(
    moddir: PathBuf,
    req: GetRequest,
    go: PathBuf,
    insecure: bool,
    verbose: bool,
) -> Result<()> {
    // Validation first: a bad request must not even probe the toolchain.
    let validated = ValidatedRequest::parse(&req)?;
    let runner = GoRunner::new(go, insecure, verbose)?;
    let moddir = ModDir::new(moddir);
    get::run(&moddir, &runner, &validated).context("get failed")?;
    Ok(())
}

pub fn execute_list(moddir: PathBuf, name: Option<String>) -> Result<()> {
    let moddir = ModDir::new(moddir);
    let mut entries = moddir.list_pinned_tools(false)?;
    if let Some(name) = &name {
        entries.retain(|e| &e.name == name);
        if entries.is_empty() {
            bail!("no tool named {:?} is pinned", name);
        }
    }

    let mut rows: Vec<(String, String, String)> = Vec::new();
    for entry in &entries {
        for variant in &entry.variants {
            rows.push((
                entry.name.clone(),
                gopin::util::binary_name(&entry.name, &variant.package.version),
                variant.package.to_string(),
            ));
        }
    }

    let header = ("Name", "Binary Name", "Package @ Version");
    let name_w = rows
        .iter()
        .map(|r| r.0.len())
        .chain([header.0.len()])
        .max()
        .unwrap_or(0);
    let bin_w = rows
        .iter()
        .map(|r| r.1.len())
        .chain([header.1.len()])
        .max()
        .unwrap_or(0);

    println!(
        "{}",
        format!(
            "{:<name_w$}  {:<bin_w$}  {}",
            header.0, header.1, header.2
        )
        .bold()
    );
    for (name, bin, pkg) in &rows {
        println!("{:<name_w$}  {:<bin_w$}  {}", name, bin, pkg);
    }
    Ok(())
}

pub fn execute_version() -> Result<()> {
    println!("gopin v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
