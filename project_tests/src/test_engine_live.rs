//! # Engine Live Data Test
//!
//! Runs the production wiring of the engine against a real CFP API and
//! prints what each collection ended up with.

use std::path::PathBuf;
use std::sync::Arc;

use cfp_sync::configs::resolve_config;
use cfp_sync::loggers::init_tracing;
use cfp_sync::model::{Conference, ResourceType};
use cfp_sync::services::StaticAuthProvider;
use cfp_sync::storage::InMemoryListStore;
use cfp_sync::{EngineConfig, EngineDeps, EngineOptions, SyncEngine};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(about = "Live smoke run of the conference sync engine")]
struct LiveArgs {
    #[clap(flatten)]
    engine: EngineConfig,

    #[clap(long, env = "CFP_SYNC_LIVE_CONFERENCE", help = "JSON file describing the conference to load.")]
    conference: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = LiveArgs::parse();
    let config = resolve_config(args.engine);
    let _guard = init_tracing(config.log_level(), config.log_dir.as_deref(), "engine_live")?;

    let raw = std::fs::read_to_string(&args.conference)?;
    let conference: Conference = serde_json::from_str(&raw)?;
    println!("[*] Loading {} ({}) from {}", conference.name(), conference.id(), conference.cfp_endpoint());

    let deps = EngineDeps::from_config(
        &config,
        Arc::new(StaticAuthProvider::signed_out()),
        Arc::new(InMemoryListStore::new()),
    )?;
    let engine = SyncEngine::start(EngineOptions::from(&config), deps);
    engine.select_conference(conference).await?;
    engine.settle().await?;
    let active = engine.active_conference().map(|c| c.id().to_string());
    info!(conference = ?active, "live run settled");

    println!("-----------------------------------------------");
    for resource in ResourceType::ALL {
        let state = *engine.retrieval_state(resource).borrow();
        let count = match resource {
            ResourceType::Sessions => engine.sessions().len(),
            ResourceType::Speakers => engine.speakers().len(),
            ResourceType::Tracks => engine.tracks().len(),
            ResourceType::ProposalTypes => engine.proposal_types().len(),
        };
        println!("{:<16} {:>5}  {:?}", resource.file_stem(), count, state);
    }
    println!("-----------------------------------------------");

    if let Some(conference) = engine.active_conference() {
        for day in conference.days() {
            println!("day {} ({}): {} sessions", day.index, day.date, engine.sessions_of_day(day.index).len());
        }
    }
    Ok(())
}
