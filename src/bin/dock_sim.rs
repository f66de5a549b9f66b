use anyhow::{bail, Context};
use crabdock::hooks::{self, HostEvent};
use crabdock::testing::{MemoryDock, MemoryMappingStore, MemoryPresence};
use crabdock::{DockEmbedConfig, EmbedAvClient, EmbedUrlBuilder, MemoryDocument, ParticipantId, PassReport};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Scenario file for `simulate`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scenario {
    streams: BTreeMap<String, String>,
    presence: PresenceSection,
    dock: DockSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresenceSection {
    active: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DockSection {
    tiles: Vec<String>,
    late_tiles: Vec<String>,
    late_after_ms: u64,
}

impl Default for DockSection {
    fn default() -> Self {
        Self {
            tiles: Vec::new(),
            late_tiles: Vec::new(),
            late_after_ms: 200,
        }
    }
}

fn main() -> anyhow::Result<()> {
    crabdock::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: dock-sim <embed-url|check-config|simulate> [args]");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "embed-url" => cmd_embed_url(&args),
        "check-config" => cmd_check_config(&args),
        "simulate" => cmd_simulate(&args),
        other => {
            eprintln!("Unknown command: {}", other);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&String>) -> anyhow::Result<DockEmbedConfig> {
    match path {
        Some(path) => DockEmbedConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path)),
        None => Ok(DockEmbedConfig::default()),
    }
}

fn cmd_embed_url(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 4 {
        bail!("Usage: dock-sim embed-url <url> <participant>");
    }
    let config = DockEmbedConfig::default();
    let builder = EmbedUrlBuilder::new(&config.embed);
    println!("{}", builder.build(&args[2], &ParticipantId::new(args[3].as_str())));
    Ok(())
}

fn cmd_check_config(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| DockEmbedConfig::default_path().display().to_string());
    let config = load_config(Some(&path))?;
    println!("{} is valid", path);
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    let Some(scenario_path) = args.get(2) else {
        bail!("Usage: dock-sim simulate <scenario.toml> [config.toml]");
    };
    let raw = std::fs::read_to_string(scenario_path)
        .with_context(|| format!("reading scenario {}", scenario_path))?;
    let scenario: Scenario = toml::from_str(&raw)?;
    let config = load_config(args.get(3))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(simulate(scenario, config))
}

async fn simulate(scenario: Scenario, config: DockEmbedConfig) -> anyhow::Result<()> {
    let document = Arc::new(MemoryDocument::new());
    let dock = Arc::new(MemoryDock::new(document.clone(), config.dock.clone()));
    for id in &scenario.dock.tiles {
        dock.add_tile(id.as_str())?;
    }

    let store = Arc::new(MemoryMappingStore::with_entries(
        scenario.streams.iter().map(|(id, url)| (id.as_str(), url.as_str())),
    ));
    let presence = Arc::new(MemoryPresence::with_active(
        scenario.presence.active.iter().map(String::as_str),
    ));
    let retry_budget = config.retry.interval() * config.retry.max_attempts;
    let client = Arc::new(EmbedAvClient::new(
        config,
        document.clone(),
        dock.clone(),
        store.clone(),
        presence,
    ));
    hooks::install(store.as_ref(), &client);

    let mut reports: Vec<PassReport> = Vec::new();
    for event in [HostEvent::Init, HostEvent::Ready] {
        if let Some(handle) = hooks::dispatch(&client, &event) {
            reports.extend(handle.wait().await);
        }
    }

    if !scenario.dock.late_tiles.is_empty() {
        tokio::time::sleep(Duration::from_millis(scenario.dock.late_after_ms)).await;
        for id in &scenario.dock.late_tiles {
            dock.add_tile(id.as_str())?;
        }
        tokio::time::sleep(retry_budget).await;
    }

    if let Some(handle) = hooks::dispatch(&client, &HostEvent::DockRendered) {
        reports.extend(handle.wait().await);
    }

    let participants: BTreeSet<ParticipantId> = scenario
        .streams
        .keys()
        .chain(&scenario.dock.tiles)
        .chain(&scenario.dock.late_tiles)
        .map(|id| ParticipantId::new(id.as_str()))
        .collect();

    let reconciler = client.reconciler();
    let overlays: Vec<_> = participants
        .iter()
        .map(|id| {
            serde_json::json!({
                "participant": id,
                "tile": dock.tile(id).is_some(),
                "overlays": reconciler.overlay_count(id),
                "frame_url": reconciler.overlay_url(id),
                "retry": reconciler.retries().last_outcome(id),
            })
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "passes": reports,
            "overlays": overlays,
            "dom_mutations": document.mutation_count(),
        }))?
    );
    Ok(())
}
