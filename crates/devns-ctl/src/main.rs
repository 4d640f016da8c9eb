// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod manifest;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use devns_core::readdir::{self, Cursor, DirentReader};
use devns_core::{FaultPolicy, MemVnode, NamespaceTree, NodeId, NodeKind, NsError, Status};
use devns_logging::CliLoggingArgs;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::manifest::Manifest;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Build a device namespace from a manifest and inspect it"
)]
struct Cli {
    /// TOML manifest listing the entries to publish
    #[arg(long)]
    manifest: PathBuf,

    /// Allocation fault policy (JSON) installed after the namespace is built;
    /// use '-' for stdin
    #[arg(long)]
    fault_policy: Option<PathBuf>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory (one `KIND<TAB>NAME` line per entry)
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Enumeration buffer size in bytes
        #[arg(long, default_value_t = 256)]
        buffer_size: usize,
    },
    /// Print the whole namespace
    Tree,
    /// Resolve a path and print the node it names
    Resolve { path: String },
    /// Publish an extra entry and list its directory
    Link {
        path: String,
        #[arg(long, default_value = "file", value_parser = parse_kind)]
        kind: NodeKind,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let manifest = Manifest::load(&cli.manifest)?;
    cli.logging.clone().with_config(&manifest.logging).init("devns-ctl")?;

    let mut tree = manifest.build()?;
    if let Some(path) = &cli.fault_policy {
        let bytes = read_policy_spec(path)?;
        let policy = FaultPolicy::from_json_bytes(&bytes).context("invalid fault policy")?;
        tree.faults().set_policy(policy);
    }

    let output = run(&mut tree, cli.command)?;
    for line in output {
        println!("{line}");
    }
    Ok(())
}

fn run(tree: &mut NamespaceTree, command: Command) -> Result<Vec<String>> {
    match command {
        Command::Ls { path, buffer_size } => list(tree, &path, buffer_size),
        Command::Tree => Ok(tree.dump().lines().map(str::to_owned).collect()),
        Command::Resolve { path } => {
            let id = resolve(tree, &path)?;
            Ok(vec![format!(
                "NODE={id}\tKIND={}\tREFS={}",
                tree.kind(id)?,
                tree.refcount(id)?
            )])
        }
        Command::Link { path, kind } => {
            let (dir, name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
            let dir = if dir.is_empty() { "/" } else { dir };
            let parent = resolve(tree, dir)?;
            tree.link(parent, name.as_bytes(), Arc::new(MemVnode::new(kind)))
                .map_err(|err| status_error(&path, err))?;
            list(tree, dir, 256)
        }
    }
}

fn parse_kind(s: &str) -> Result<NodeKind, String> {
    match s {
        "dir" | "directory" => Ok(NodeKind::Directory),
        "file" => Ok(NodeKind::File),
        "device" => Ok(NodeKind::Device),
        _ => Err(format!("unsupported kind {s:?}; use dir, file or device")),
    }
}

fn resolve(tree: &NamespaceTree, path: &str) -> Result<NodeId> {
    tree.walk(tree.root(), path.as_bytes())
        .map_err(|err| status_error(path, err))
}

/// Drive the enumerator over `path` until it reports the end of the directory.
fn list(tree: &NamespaceTree, path: &str, buffer_size: usize) -> Result<Vec<String>> {
    let dir = resolve(tree, path)?;
    let mut buf = vec![0u8; buffer_size];
    let mut cursor = Cursor::START;
    let mut lines = Vec::new();
    loop {
        let out =
            readdir::read(tree, dir, cursor, &mut buf).map_err(|err| status_error(path, err))?;
        if out.is_end() {
            break;
        }
        for entry in DirentReader::new(&buf[..out.bytes]) {
            let entry = entry.map_err(|err| status_error(path, err))?;
            lines.push(format!("{}\t{}", entry.kind, String::from_utf8_lossy(entry.name)));
        }
        cursor = out.next;
    }
    Ok(lines)
}

fn status_error(path: &str, err: NsError) -> anyhow::Error {
    anyhow!("{path}: {err} (status={})", Status::from(err).into_raw())
}

fn read_policy_spec(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(path).with_context(|| format!("failed to read policy file {:?}", path))
    }
}
