use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use cfp_sync::configs::resolve_config;
use cfp_sync::loggers::init_tracing;
use cfp_sync::model::{Conference, ListKind, ResourceType};
use cfp_sync::services::{AuthenticatedUser, StaticAuthProvider};
use cfp_sync::storage::{InMemoryListStore, JsonFileListStore, ListStore};
use cfp_sync::{EngineConfig, EngineDeps, EngineOptions, SyncEngine};
use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use tracing::info;

/// Synchronizes one conference into the local cache and prints a summary.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Loads sessions, speakers, tracks and proposal types of a conference through the sync engine. Cached data is published first and then refreshed from the CFP API. With a user key the user's lists are reconciled against the cloud mirror directory."
)]
struct Args {
    #[clap(flatten)]
    engine: EngineConfig,

    /// Path to the conference JSON file (id, timezone, fromDate, toDate, cfpEndpoint).
    #[arg(short, long, env = "CFP_SYNC_CONFERENCE", conflicts_with = "conference_id")]
    conference: Option<PathBuf>,

    /// Conference id, when the conference is given by flags.
    #[arg(long, requires_all = ["time_zone", "from_date", "to_date", "cfp_endpoint"])]
    conference_id: Option<String>,

    /// IANA time zone of the conference, e.g. Europe/Brussels.
    #[arg(long)]
    time_zone: Option<String>,

    /// First conference day (YYYY-MM-DD).
    #[arg(long)]
    from_date: Option<NaiveDate>,

    /// Last conference day (YYYY-MM-DD), inclusive.
    #[arg(long)]
    to_date: Option<NaiveDate>,

    /// Base URL of the conference's CFP API.
    #[arg(long)]
    cfp_endpoint: Option<String>,

    /// Sign in as this user key and reconcile the user lists.
    #[arg(short, long, env = "CFP_SYNC_USER")]
    user: Option<String>,

    /// Directory standing in for the cloud mirror of user lists. In memory when unset.
    #[arg(long, env = "CFP_SYNC_CLOUD_MIRROR_DIR")]
    cloud_mirror_dir: Option<PathBuf>,

    /// A reload push payload to deliver after the first load.
    #[arg(long)]
    reload_payload: Option<String>,

    /// Print the summary as JSON.
    #[arg(short, long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    conference: String,
    sessions: usize,
    speakers: usize,
    tracks: usize,
    proposal_types: usize,
    sessions_per_day: Vec<usize>,
    reloaded: bool,
    user_lists: Vec<(String, usize)>,
}

fn conference_from_args(args: &Args) -> anyhow::Result<Conference> {
    if let Some(path) = &args.conference {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        return serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()));
    }
    match (&args.conference_id, &args.time_zone, args.from_date, args.to_date, &args.cfp_endpoint) {
        (Some(id), Some(zone), Some(from), Some(to), Some(endpoint)) => {
            Ok(Conference::new(id, zone, from, to, endpoint)?)
        }
        _ => bail!("give either --conference <file> or --conference-id with its dates, zone and endpoint"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = resolve_config(args.engine.clone());
    let _guard = init_tracing(config.log_level(), config.log_dir.as_deref(), "cfp-sync")?;

    let conference = conference_from_args(&args)?;

    let auth = Arc::new(match &args.user {
        Some(key) => StaticAuthProvider::signed_in(AuthenticatedUser::new(key, None)),
        None => StaticAuthProvider::signed_out(),
    });
    let cloud_lists: Arc<dyn ListStore> = match &args.cloud_mirror_dir {
        Some(dir) => Arc::new(JsonFileListStore::new(dir)),
        None => Arc::new(InMemoryListStore::new()),
    };
    let deps = EngineDeps::from_config(&config, auth, cloud_lists)?;
    let engine = SyncEngine::start(EngineOptions::from(&config), deps);

    engine.select_conference(conference).await?;
    if args.user.is_some() {
        engine.authentication_changed();
    }
    engine.settle().await?;

    let mut reloaded = false;
    if let Some(payload) = &args.reload_payload {
        engine.receive_reload(payload).await?;
        reloaded = engine.check_reload().await?;
        engine.settle().await?;
    }

    let active = engine
        .active_conference()
        .context("conference was deselected during the run")?;
    let mut user_lists = Vec::new();
    if args.user.is_some() {
        for kind in ListKind::ALL {
            user_lists.push((kind.to_string(), engine.user_list(kind)?.items().len()));
        }
    }
    let summary = Summary {
        conference: active.id().to_string(),
        sessions: engine.sessions().len(),
        speakers: engine.speakers().len(),
        tracks: engine.tracks().len(),
        proposal_types: engine.proposal_types().len(),
        sessions_per_day: active
            .days()
            .iter()
            .map(|day| engine.sessions_of_day(day.index).len())
            .collect(),
        reloaded,
        user_lists,
    };

    for resource in ResourceType::ALL {
        let state = *engine.retrieval_state(resource).borrow();
        info!(resource = resource.file_stem(), ?state, "final state");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Conference {}", summary.conference);
        println!("  sessions        {}", summary.sessions);
        for (day, count) in summary.sessions_per_day.iter().enumerate() {
            println!("    day {}        {}", day + 1, count);
        }
        println!("  speakers        {}", summary.speakers);
        println!("  tracks          {}", summary.tracks);
        println!("  proposal types  {}", summary.proposal_types);
        if args.reload_payload.is_some() {
            println!("  reloaded        {}", summary.reloaded);
        }
        for (kind, count) in &summary.user_lists {
            println!("  {kind:<15} {count}");
        }
    }
    Ok(())
}
