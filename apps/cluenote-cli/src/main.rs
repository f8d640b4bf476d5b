use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use cluenote_config::load_config;
use cluenote_core::audio::NullAudio;
use cluenote_core::types::SessionMode;
use cluenote_core::{RoomCode, RoomStore};
use cluenote_runtime::{
    PollingConfig, PollingRoomWatcher, SessionOrchestrator, SessionSettings,
};
use cluenote_stores::{InMemoryQueueStorage, InMemoryRoomStore};

#[derive(Parser)]
#[command(name = "cluenote", version, about = "Collaborative melody puzzle sessions")]
struct Cli {
    /// Optional YAML config; defaults are the product tuning values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted partner session end to end against an in-memory
    /// store: two clients author their partitions, meet at the ready
    /// barrier, then one solves every scene.
    Demo,
    /// Room code utilities.
    Codes {
        #[command(subcommand)]
        command: CodeCommand,
    },
}

#[derive(Subcommand)]
enum CodeCommand {
    /// Generate fresh room codes.
    Generate {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Validate a typed room code.
    Check { code: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => SessionSettings::from_config(&load_config(path)?),
        None => SessionSettings::default(),
    };

    match cli.command {
        Commands::Demo => run_demo(settings).await,
        Commands::Codes { command } => match command {
            CodeCommand::Generate { count } => {
                let mut rng = rand::thread_rng();
                for _ in 0..count {
                    println!("{}", RoomCode::generate(&mut rng));
                }
                Ok(())
            }
            CodeCommand::Check { code } => match RoomCode::parse(&code) {
                Ok(code) => {
                    println!("ok: {code}");
                    Ok(())
                }
                Err(err) => Err(anyhow::anyhow!("{err}")),
            },
        },
    }
}

fn client(store: &Arc<InMemoryRoomStore>, settings: &SessionSettings) -> SessionOrchestrator {
    let watcher = Arc::new(PollingRoomWatcher::new(
        store.clone() as Arc<dyn RoomStore>,
        settings.poll.clone(),
    ));
    SessionOrchestrator::new(
        store.clone(),
        Arc::new(InMemoryQueueStorage::new()),
        watcher,
        Arc::new(NullAudio),
        settings.clone(),
    )
}

async fn run_demo(settings: SessionSettings) -> anyhow::Result<()> {
    // Demo sessions poll fast; nobody wants to watch a 3s interval.
    let settings = SessionSettings {
        poll: PollingConfig {
            interval: Duration::from_millis(50),
            ..settings.poll.clone()
        },
        ..settings
    };
    let store = Arc::new(InMemoryRoomStore::new());
    let lead = client(&store, &settings);
    let joiner = client(&store, &settings);

    let code = lead
        .begin_lead(SessionMode::Partner, "moonlit-manor", "grand-finale", true)
        .await?;
    println!("room {code} created (partner mode)");
    joiner.join(&code, 1).await?;

    for orchestrator in [&lead, &joiner] {
        let player = orchestrator.player_index().await;
        for index in orchestrator.authoring_scenes().await {
            orchestrator
                .stage_scene(index, format!("room-{index}"), "music box")
                .await?;
            for col in 0..3 {
                orchestrator.toggle_cell(index, (index + col) % 5, col).await?;
            }
            println!("player {player} authored scene {index}");
        }
        orchestrator.mark_ready().await?;
        println!("player {player} is ready");
    }

    let (lead_entered, joiner_entered) =
        tokio::join!(lead.await_ready(), joiner.await_ready());
    anyhow::ensure!(lead_entered?, "lead never passed the ready barrier");
    anyhow::ensure!(joiner_entered?, "joiner never passed the ready barrier");
    println!("ready barrier passed, solving...");

    let room = lead
        .room()
        .await
        .ok_or_else(|| anyhow::anyhow!("no room after the ready barrier"))?;
    while let Some(index) = lead.current_scene().await {
        let target = &room.scenes[&index].scene.grid;
        println!("scene {index} target:\n{target}");
        lead.listen().await?;
        for (row, col) in target.active_cells() {
            lead.toggle_attempt(row, col).await?;
        }
        let outcome = lead.submit_attempt().await?;
        println!(
            "scene {index}: {} ({} pts, {} stars)",
            outcome.score.message, outcome.adjusted_points, outcome.score.stars
        );
    }

    let results = lead
        .results()
        .await
        .ok_or_else(|| anyhow::anyhow!("no results after solving"))?;
    println!(
        "session complete: {} points, {} stars across {} scenes",
        results.total_points,
        results.total_stars,
        results.scenes.len()
    );
    Ok(())
}
