use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tracing::{info, warn};

use depot_group::{BlobStoreGroup, GroupError, ValidationMode};
use depot_reconcile::{
    parse_since, BlobStoreReconciliationLogger, DateBasedHelper, FixedApplicationDirectories,
    ReconciliationConfig, ReconciliationListener,
};
use depot_store::{BlobCreatedListener, BlobStore};
use depot_types::headers::{headers, BLOB_NAME_HEADER, CONTENT_TYPE_HEADER, CREATED_BY_HEADER};

use crate::cli::*;
use crate::topology::Topology;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Validate(args) => cmd_validate(args, &format),
        Command::Prefixes(args) => cmd_prefixes(args, &format),
        Command::Replay(args) => cmd_replay(args, &format),
        Command::Simulate(args) => cmd_simulate(args, &format),
    }
}

fn cmd_validate(args: ValidateArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let topology = Topology::load(&args.topology)?;
    let mut settings = topology.settings;
    if args.fail_fast {
        settings.validation = ValidationMode::FailFast;
    }
    let assembled = topology.assemble(settings, None)?;
    let failures = &assembled.failures;

    match format {
        OutputFormat::Json => {
            let groups: Vec<_> = topology
                .groups()
                .map(|def| {
                    let failure = failures.iter().find(|(name, _)| *name == def.name);
                    json!({
                        "group": def.name,
                        "valid": failure.is_none(),
                        "errors": failure.map(|(_, e)| error_json(e)).unwrap_or_default(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }
        OutputFormat::Text => {
            for def in topology.groups() {
                match failures.iter().find(|(name, _)| *name == def.name) {
                    None => {
                        let policy = assembled
                            .registry
                            .group(&def.name)
                            .map(|g| g.fill_policy_name().to_string())
                            .unwrap_or_default();
                        println!(
                            "{} {} ({}, {})",
                            "✓".green().bold(),
                            def.name.bold(),
                            def.members.join(", "),
                            policy.cyan()
                        );
                    }
                    Some((_, error)) => {
                        println!("{} {}", "✗".red().bold(), def.name.bold());
                        print_error(error);
                    }
                }
            }
        }
    }

    if !failures.is_empty() {
        bail!(
            "{} of {} groups failed validation",
            failures.len(),
            topology.groups().count()
        );
    }
    Ok(())
}

fn error_json(error: &GroupError) -> Vec<serde_json::Value> {
    match error.violations() {
        Some(violations) => violations
            .violations
            .iter()
            .map(|v| json!({ "store": v.store, "kind": format!("{:?}", v.kind), "message": v.message }))
            .collect(),
        None => vec![json!({ "message": error.to_string() })],
    }
}

fn print_error(error: &GroupError) {
    match error.violations() {
        Some(violations) => {
            for v in &violations.violations {
                println!("  {} {}", format!("[{}]", v.store).yellow(), v.message);
            }
        }
        None => println!("  {}", error.to_string().red()),
    }
}

fn cmd_prefixes(args: PrefixesArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let from = parse_since(&args.from).context("parsing --from")?;
    let to = parse_since(&args.to).context("parsing --to")?;
    let prefixes = DateBasedHelper::generate_prefixes(from, to);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&prefixes)?),
        OutputFormat::Text => {
            if prefixes.is_empty() {
                println!("No prefixes: {} is after {}.", args.from.yellow(), args.to.yellow());
            }
            for prefix in &prefixes {
                println!("{prefix}");
            }
        }
    }
    Ok(())
}

fn cmd_replay(args: ReplayArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let since = parse_since(&args.since).context("parsing --since")?;
    let mut config = ReconciliationConfig::default();
    if let Some(name) = args.directory_name {
        config.directory_name = name;
    }
    let logger = Arc::new(BlobStoreReconciliationLogger::new(
        Arc::new(FixedApplicationDirectories::new(&args.work_dir)),
        config,
    ));
    let log_dir = ReconciliationListener::new(logger.clone()).log_dir_for(&args.store);

    let mut count = 0usize;
    let mut rows = Vec::new();
    for entry in logger.entries_since(&log_dir, since) {
        count += 1;
        match format {
            OutputFormat::Json => rows.push(json!({
                "blob_id": entry.blob_id.to_string(),
                "timestamp": entry.timestamp.map(|ts| ts.to_string()),
                "date_based": entry.date_based,
                "file_date": entry.file_date.to_string(),
            })),
            OutputFormat::Text => {
                let when = entry
                    .timestamp
                    .map(|ts| ts.to_string())
                    .unwrap_or_else(|| entry.file_date.to_string());
                let layout = match entry.date_based {
                    Some(true) => "date-based",
                    Some(false) => "flat",
                    None => "-",
                };
                println!("{}  {}  {}", when.dimmed(), entry.blob_id.to_string().yellow(), layout);
            }
        }
    }
    info!(store = %args.store, since = %since, blobs = count, "replay finished");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => println!(
            "{} {} blobs created in {} since {}",
            "✓".green().bold(),
            count.to_string().bold(),
            args.store.bold(),
            since
        ),
    }
    Ok(())
}

/// Outcome of driving writes through one group.
struct GroupRun {
    committed: usize,
    rolled_back: usize,
    failed: usize,
}

fn cmd_simulate(args: SimulateArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let topology = Topology::load(&args.topology)?;

    let logger = args.work_dir.as_ref().map(|dir| {
        Arc::new(BlobStoreReconciliationLogger::new(
            Arc::new(FixedApplicationDirectories::new(dir)),
            topology.reconciliation.clone(),
        ))
    });
    let listener = logger.as_ref().map(|logger| {
        Arc::new(ReconciliationListener::new(logger.clone())) as Arc<dyn BlobCreatedListener>
    });

    let assembled = topology.assemble(topology.settings, listener)?;
    for (name, error) in &assembled.failures {
        println!("{} skipping {}: {}", "!".yellow().bold(), name.bold(), error);
    }

    let groups: Vec<_> = match &args.group {
        Some(name) => match assembled.registry.group(name) {
            Some(group) => vec![group],
            None => bail!("no usable group named '{name}'"),
        },
        None => assembled.registry.groups(),
    };

    let mut report = Vec::new();
    for group in &groups {
        let run = drive_group(&assembled.registry, group.name(), args.writes, args.rollback_every)?;
        let distribution = distribution(group)?;
        let metrics = group.metrics()?;
        match format {
            OutputFormat::Json => report.push(json!({
                "group": group.name(),
                "fill_policy": group.fill_policy_name(),
                "committed": run.committed,
                "rolled_back": run.rolled_back,
                "failed": run.failed,
                "total_size": metrics.total_size(),
                "members": distribution
                    .iter()
                    .map(|(name, count)| json!({ "store": name, "blobs": count }))
                    .collect::<Vec<_>>(),
            })),
            OutputFormat::Text => {
                println!(
                    "{} {} ({})",
                    "Group".bold(),
                    group.name().bold(),
                    group.fill_policy_name().cyan()
                );
                println!(
                    "  committed {}, rolled back {}, failed {}",
                    run.committed.to_string().green(),
                    run.rolled_back.to_string().yellow(),
                    run.failed.to_string().red()
                );
                for (name, count) in &distribution {
                    println!("  {:<20} {}", name, count);
                }
                println!("  total size: {} bytes", metrics.total_size());
            }
        }
    }
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Some(logger) = logger {
        for store in assembled.registry.groups().iter().flat_map(|g| g.member_names()) {
            let log_dir = Path::new(&logger.config().directory_name).join(store);
            let removed = logger
                .prune_expired(&log_dir)
                .with_context(|| format!("pruning reconciliation log of '{store}'"))?;
            if removed > 0 {
                info!(store, removed, "expired reconciliation logs pruned");
            }
        }
    }
    Ok(())
}

/// Write `writes` blobs into `group`, one session per blob. Every
/// `rollback_every`-th session is rolled back instead of committed.
fn drive_group(
    registry: &depot_group::BlobStoreRegistry,
    group: &str,
    writes: usize,
    rollback_every: Option<usize>,
) -> anyhow::Result<GroupRun> {
    let mut run = GroupRun { committed: 0, rolled_back: 0, failed: 0 };
    for i in 1..=writes {
        let mut session = registry.open_session(group)?;
        let name = format!("sim/{group}/{i}.bin");
        let payload = format!("simulated blob {i} for {group}");
        let blob_headers = headers([
            (BLOB_NAME_HEADER, name.as_str()),
            (CREATED_BY_HEADER, "depot-simulate"),
            (CONTENT_TYPE_HEADER, "application/octet-stream"),
        ]);
        if let Err(e) = session.create(payload.as_bytes(), &blob_headers) {
            warn!(group, error = %e, "simulated write failed");
            run.failed += 1;
            continue;
        }
        if rollback_every.is_some_and(|n| n > 0 && i % n == 0) {
            session.rollback();
            run.rolled_back += 1;
        } else {
            session.commit();
            run.committed += 1;
        }
    }
    Ok(run)
}

/// Live blob count per member, in member order.
fn distribution(group: &BlobStoreGroup) -> anyhow::Result<Vec<(String, usize)>> {
    group
        .members()
        .iter()
        .map(|member| Ok((member.name().to_string(), member.blob_ids()?.len())))
        .collect()
}
