use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use colored::Colorize;
use serde_json::json;
use strata_bridge::{BridgeMode, PartitionLog, SyncMode};
use strata_chain::{ChainEvent, RecordDraft};
use strata_partition::StaticKeyDiscovery;
use strata_sdk::{DataObject, KeyPair, NodeConfig, Repository, RequestScope, RightsSet};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    match cli.command {
        Command::Demo(args) => cmd_demo(config, args).await,
        Command::Inspect(args) => cmd_inspect(&args.dir),
        Command::Config(args) => cmd_config(&config, args),
    }
}

async fn cmd_demo(mut config: NodeConfig, args: DemoArgs) -> anyhow::Result<()> {
    match args.mode {
        Some(Mode::Ram) => config.bridge.mode = BridgeMode::Ram,
        Some(Mode::Log) => config.bridge.mode = BridgeMode::Log,
        None => {}
    }
    if let Some(dir) = args.dir {
        config.bridge.log_dir = dir;
    }
    if !config.resolver.parent_free_types.iter().any(|t| t == "Account") {
        config.resolver.parent_free_types.push("Account".into());
    }
    // Short pauses so forced maintenance returns promptly.
    config.maintenance.pause_ms = config.maintenance.pause_ms.min(50);
    config.maintenance.jitter_ms = config.maintenance.jitter_ms.min(50);

    let kp = KeyPair::generate();
    let mode = config.bridge.mode;
    let log_dir = config.bridge.log_dir.clone();
    let repo = Repository::open(
        config,
        Arc::new(StaticKeyDiscovery::new(vec![kp.verifying_key().clone()])),
    )?;
    let rights = RightsSet::new("demo").with_write_key(kp.clone());
    let scope = RequestScope::new();
    println!(
        "{} Node up ({} mode), writer key {}",
        "✓".green().bold(),
        format!("{mode:?}").to_lowercase().bold(),
        kp.public_hash().short_hex().cyan()
    );

    let root = DataObject::root("Account", json!({"name": "demo"}));
    let base = repo.write(&root, &rights, &scope).await?;
    println!("  {} {} -> {}", "root ".bold(), root.id, base.partition.to_string().yellow());

    let mut children = Vec::new();
    for seq in 0..args.children {
        let child = DataObject::child_of(&root, "Entry", json!({ "seq": seq }));
        let receipt = repo.write(&child, &rights, &scope).await?;
        println!("  {} {} -> {}", "child".bold(), child.id, receipt.partition.to_string().yellow());
        children.push(child);
    }

    let partition = repo
        .registry()
        .peek(&base.partition)
        .ok_or_else(|| anyhow!("partition {} is not live", base.partition))?;
    let mut edited = root.clone();
    for side in ["left", "right"] {
        edited.payload = json!({ "name": side });
        let record = RecordDraft::for_object(&edited, vec![base.version])?.sign(&kp)?;
        partition.bridge().write(record)?;
    }
    println!(
        "  {} concurrent edits of root, requires merge: {}",
        "!".yellow().bold(),
        partition.chain().requires_merge(&root.id)
    );

    if let Some(victim) = children.first() {
        repo.remove(victim, &rights, &scope).await?;
        println!(
            "  {} tombstone scheduled for {}, still readable: {}",
            "-".red().bold(),
            victim.id,
            repo.read(victim, &scope).await?.is_some()
        );
    }

    repo.force_maintenance().await?;
    println!("{} Maintenance pass complete (tick {})", "✓".green().bold(), repo.daemon().ticks());
    println!("  root requires merge: {}", partition.chain().requires_merge(&root.id));
    if let Some(victim) = children.first() {
        println!("  deleted child readable: {}", repo.read(victim, &scope).await?.is_some());
    }
    if let Some(latest) = repo.read(&root, &scope).await?.as_ref().and_then(|d| d.latest()) {
        println!("  root payload: {}", latest.payload_json()?.to_string().cyan());
    }
    println!(
        "  partition history: {} events, {} objects",
        partition.chain().history_len(),
        partition.chain().len()
    );
    if mode == BridgeMode::Log {
        println!("  logs written to {}", log_dir.display().to_string().bold());
    }

    repo.close().await;
    Ok(())
}

#[derive(Default)]
struct LogSummary {
    events: usize,
    data: usize,
    tombstones: usize,
    undecodable: usize,
    authors: HashSet<String>,
    live: HashMap<String, usize>,
}

fn summarise(path: &Path) -> anyhow::Result<LogSummary> {
    let log = PartitionLog::open(path, SyncMode::OsDefault)?;
    let mut summary = LogSummary::default();
    for payload in log.recover()? {
        summary.events += 1;
        match ChainEvent::decode(&payload) {
            Ok(ChainEvent::Data(record)) => {
                summary.data += 1;
                summary.authors.insert(record.author.short_hex());
                *summary.live.entry(record.key).or_default() += 1;
            }
            Ok(ChainEvent::Tombstone { key }) => {
                summary.tombstones += 1;
                summary.live.remove(&key);
            }
            Err(_) => summary.undecodable += 1,
        }
    }
    Ok(summary)
}

fn cmd_inspect(dir: &Path) -> anyhow::Result<()> {
    let mut logs: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "wal"))
        .collect();
    logs.sort();

    if logs.is_empty() {
        println!("No partition logs in {}", dir.display());
        return Ok(());
    }

    for path in &logs {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let summary = summarise(path)?;
        let status = if summary.undecodable == 0 {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        println!("{} {}", status, name.yellow().bold());
        println!(
            "  events: {} ({} data, {} tombstones)",
            summary.events.to_string().bold(),
            summary.data,
            summary.tombstones
        );
        let versions: usize = summary.live.values().sum();
        println!("  live objects: {} ({} versions)", summary.live.len(), versions);
        let mut authors: Vec<_> = summary.authors.into_iter().collect();
        authors.sort();
        println!("  authors: {}", authors.join(", ").cyan());
        if summary.undecodable > 0 {
            println!("  undecodable entries: {}", summary.undecodable.to_string().red());
        }
    }
    Ok(())
}

fn cmd_config(config: &NodeConfig, args: ConfigArgs) -> anyhow::Result<()> {
    if args.validate {
        config.validate()?;
        println!("{} Configuration is valid", "✓".green().bold());
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}
