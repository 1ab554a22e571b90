use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::{json, Value};
use tidemark_cas::InMemoryCas;
use tidemark_chain::InMemoryBlockchain;
use tidemark_core::{Node, NodeConfig, NodeStores, ResolutionError};
use tidemark_crypto::SigningKey;
use tidemark_protocol::{OperationRequest, Patch, ProtocolContext, VersionManager};
use tidemark_store::{InMemoryOperationQueue, InMemoryOperationStore};
use tidemark_types::DidSuffix;

use crate::cli::*;

const DEMO_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::CheckConfig(args) => cmd_check_config(args, cli.format),
        Command::VersionAt(args) => cmd_version_at(args, cli.format),
        Command::Demo(args) => cmd_demo(args, cli.format).await,
    }
}

fn load_config(path: &Path) -> anyhow::Result<NodeConfig> {
    NodeConfig::load(path).with_context(|| format!("invalid configuration {}", path.display()))
}

fn cmd_check_config(args: CheckConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(&args.path)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("{} {} is valid", "✓".green().bold(), args.path.display().to_string().bold());
    println!("  Protocol versions:");
    for entry in &config.protocol_versions {
        println!(
            "    from time {:>10}  {}",
            entry.starting_blockchain_time,
            entry.version.cyan()
        );
    }
    println!(
        "  Scheduler: batch every {}ms, write timeout {}ms",
        config.scheduler.batch_interval_ms, config.scheduler.write_timeout_ms
    );
    let depth = config
        .observer
        .max_fork_depth
        .map_or_else(|| "genesis".to_string(), |d| d.to_string());
    println!(
        "  Observer: poll every {}ms, fork search window {}, max fork depth {}",
        config.observer.poll_interval_ms, config.observer.fork_initial_window, depth
    );
    println!(
        "  Retry: {} attempts, backoff {}..{}ms",
        config.retry.max_attempts, config.retry.initial_backoff_ms, config.retry.max_backoff_ms
    );
    Ok(())
}

fn cmd_version_at(args: VersionAtArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(&args.path)?;
    // Bundles need backends to exist; a lookup never touches them.
    let context = ProtocolContext {
        chain: Arc::new(InMemoryBlockchain::default()),
        cas: Arc::new(InMemoryCas::new()),
        operation_store: Arc::new(InMemoryOperationStore::new()),
        queue: Arc::new(InMemoryOperationQueue::new()),
    };
    let versions = VersionManager::new(&config.protocol_versions, &context)?;
    let bundle = versions.version_for(args.time)?;
    let params = bundle.parameters();

    if format == OutputFormat::Json {
        let out = json!({
            "time": args.time,
            "version": bundle.version().as_str(),
            "codec": format!("{:?}", params.codec),
            "max_operations_per_batch": params.max_operations_per_batch,
            "max_batch_bytes": params.max_batch_bytes,
            "max_operation_bytes": params.max_operation_bytes,
            "fee_model": format!("{:?}", params.fee_model),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Time {} uses protocol {}",
        args.time.to_string().bold(),
        bundle.version().as_str().cyan().bold()
    );
    println!("  Codec: {:?}", params.codec);
    println!("  Max operations per batch: {}", params.max_operations_per_batch);
    println!("  Max batch bytes: {}", params.max_batch_bytes);
    println!("  Max operation bytes: {}", params.max_operation_bytes);
    println!("  Fee model: {:?}", params.fee_model);
    Ok(())
}

struct DemoDid {
    suffix: DidSuffix,
    update: SigningKey,
}

fn new_create(label: &str) -> anyhow::Result<(OperationRequest, DemoDid)> {
    let recovery = SigningKey::generate();
    let update = SigningKey::generate();
    let mut patch = Patch::new();
    patch.insert("label".into(), Value::from(label));
    let create = OperationRequest::create(&recovery.verifying_key(), &update.verifying_key(), patch)?;
    let suffix = create.did_suffix()?;
    Ok((create, DemoDid { suffix, update }))
}

/// Mine whatever the scheduler anchors until `done` holds.
async fn drive(
    chain: &InMemoryBlockchain,
    node: &Node,
    mut done: impl FnMut() -> bool,
) -> anyhow::Result<()> {
    tokio::time::timeout(DEMO_TIMEOUT, async {
        while !done() {
            if chain.pending_count() > 0 {
                let time = chain.mine_block();
                tracing::debug!(%time, "demo block mined");
                node.observer().wake();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("timed out waiting for the node")
}

async fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.operations == 0 {
        bail!("--operations must be at least 1");
    }
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => NodeConfig::default(),
    };
    // Demo pacing.
    config.scheduler.batch_interval_ms = 50;
    config.observer.poll_interval_ms = 50;

    let chain = Arc::new(InMemoryBlockchain::default());
    let node = Node::new(
        config,
        chain.clone(),
        Arc::new(InMemoryCas::new()),
        NodeStores::in_memory(),
    )?;
    node.start();
    let text = format == OutputFormat::Text;

    let mut dids = Vec::with_capacity(args.operations);
    for i in 0..args.operations {
        let (create, did) = new_create(&format!("demo-{i}"))?;
        node.submit_operation(&create.to_bytes()?).await?;
        if text {
            println!("{} create {}", "queued".yellow(), did.suffix);
        }
        dids.push(did);
    }
    drive(&chain, &node, || dids.iter().all(|d| node.resolve(&d.suffix).is_ok())).await?;
    if text {
        println!("{} {} DIDs anchored and ingested", "✓".green().bold(), dids.len());
    }

    let first = &dids[0];
    let next = SigningKey::generate();
    let mut patch = Patch::new();
    patch.insert("updated".into(), Value::Bool(true));
    let update = OperationRequest::update(&first.suffix, &first.update, &next.verifying_key(), patch)?;
    node.submit_operation(&update.to_bytes()?).await?;
    drive(&chain, &node, || {
        node.resolve(&first.suffix)
            .is_ok_and(|r| r.state.document.contains_key("updated"))
    })
    .await?;
    if text {
        println!("{} update applied to {}", "✓".green().bold(), first.suffix);
    }

    let mut fork = None;
    if args.fork {
        let (create, doomed) = new_create("doomed")?;
        node.submit_operation(&create.to_bytes()?).await?;
        drive(&chain, &node, || node.resolve(&doomed.suffix).is_ok()).await?;

        let last = chain
            .transactions()
            .last()
            .cloned()
            .context("ledger has no transactions")?;
        chain.reorg(last.transaction_time, vec![]);
        if text {
            println!(
                "{} ledger reorganized from time {}, transaction #{} dropped",
                "!".red().bold(),
                last.transaction_time,
                last.transaction_number
            );
        }

        let (create, replacement) = new_create("replacement")?;
        node.submit_operation(&create.to_bytes()?).await?;
        drive(&chain, &node, || {
            node.resolve(&replacement.suffix).is_ok()
                && matches!(node.resolve(&doomed.suffix), Err(ResolutionError::NotFound(_)))
        })
        .await?;
        if text {
            println!(
                "{} observer rewound; {} rolled back, {} anchored in its place",
                "✓".green().bold(),
                doomed.suffix,
                replacement.suffix
            );
        }
        fork = Some((doomed.suffix, replacement.suffix));
    }

    node.shutdown().await;

    let mut report: Vec<Value> = dids.iter().map(|d| describe(&node, &d.suffix)).collect();
    if let Some((doomed, replacement)) = &fork {
        report.push(describe(&node, doomed));
        report.push(describe(&node, replacement));
    }

    if text {
        println!("\n{}", "DID states".bold());
        for entry in &report {
            let status = entry["status"].as_str().unwrap_or_default();
            let colored_status = match status {
                "active" => status.green(),
                "deactivated" => status.yellow(),
                _ => status.red(),
            };
            println!("  {}  {}", entry["did"].as_str().unwrap_or_default().cyan(), colored_status);
            if let Some(document) = entry.get("document") {
                println!("    document: {document}");
                println!(
                    "    operations: {} applied, {} rejected",
                    entry["applied"], entry["rejected"]
                );
            }
        }
        println!(
            "\nLedger: {} transactions. Health: {}",
            chain.transactions().len(),
            serde_json::to_string(&node.health())?
        );
    } else {
        let out = json!({
            "dids": report,
            "ledger_transactions": chain.transactions().len(),
            "health": node.health(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}

fn describe(node: &Node, did: &DidSuffix) -> Value {
    match node.resolve(did) {
        Ok(resolved) => json!({
            "did": did.as_str(),
            "status": "active",
            "document": resolved.state.document,
            "applied": resolved.applied.len(),
            "rejected": resolved.rejected.len(),
        }),
        Err(ResolutionError::Deactivated { resolved }) => json!({
            "did": did.as_str(),
            "status": "deactivated",
            "document": resolved.state.document,
            "applied": resolved.applied.len(),
            "rejected": resolved.rejected.len(),
        }),
        Err(ResolutionError::NotFound(_)) => json!({
            "did": did.as_str(),
            "status": "not found",
        }),
        Err(e) => json!({
            "did": did.as_str(),
            "status": "error",
            "error": e.to_string(),
        }),
    }
}
