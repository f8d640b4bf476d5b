//! Two-client partner sessions over a shared in-memory store.

use std::sync::Arc;
use std::time::Duration;

use cluenote_core::audio::NullAudio;
use cluenote_core::types::SessionMode;
use cluenote_core::RoomStore;
use cluenote_runtime::{
    PollingConfig, PollingRoomWatcher, SessionOrchestrator, SessionPhase, SessionSettings,
};
use cluenote_stores::{InMemoryQueueStorage, InMemoryRoomStore};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn settings() -> SessionSettings {
    SessionSettings {
        poll: PollingConfig {
            interval: Duration::from_millis(10),
            fail_threshold: 100,
        },
        ..SessionSettings::default()
    }
}

fn client(store: &Arc<InMemoryRoomStore>) -> SessionOrchestrator {
    let settings = settings();
    let watcher = Arc::new(PollingRoomWatcher::new(
        store.clone() as Arc<dyn RoomStore>,
        settings.poll.clone(),
    ));
    SessionOrchestrator::new(
        store.clone(),
        Arc::new(InMemoryQueueStorage::new()),
        watcher,
        Arc::new(NullAudio),
        settings,
    )
}

async fn author_partition(orchestrator: &SessionOrchestrator) {
    for index in orchestrator.authoring_scenes().await {
        orchestrator
            .stage_scene(index, format!("location-{index}"), "gramophone")
            .await
            .expect("stage");
        for col in 0..3 {
            let row = (index + col) % 5;
            assert!(orchestrator
                .toggle_cell(index, row, col)
                .await
                .expect("toggle"));
        }
    }
}

#[tokio::test]
async fn partner_ready_barrier_gates_both_clients() {
    let store = Arc::new(InMemoryRoomStore::new());
    let lead = client(&store);
    let joiner = client(&store);

    let code = lead
        .begin_lead(SessionMode::Partner, "halloween", "ending-1", true)
        .await
        .expect("lead");
    joiner.join(&code, 1).await.expect("join");

    assert_eq!(lead.authoring_scenes().await, vec![0, 1, 2]);
    assert_eq!(joiner.authoring_scenes().await, vec![3, 4, 5]);

    author_partition(&lead).await;
    lead.mark_ready().await.expect("lead ready");

    // One ready player out of two: the barrier holds.
    let snapshot = store
        .fetch_room(&code)
        .await
        .expect("fetch")
        .expect("present");
    assert!(!snapshot.is_collectively_ready());

    author_partition(&joiner).await;
    joiner.mark_ready().await.expect("joiner ready");

    let (lead_entered, joiner_entered) = timeout(TEST_TIMEOUT, async {
        tokio::join!(lead.await_ready(), joiner.await_ready())
    })
    .await
    .expect("barrier timed out");
    assert!(lead_entered.expect("lead barrier"));
    assert!(joiner_entered.expect("joiner barrier"));

    assert_eq!(lead.phase().await, SessionPhase::Solve);
    assert_eq!(joiner.phase().await, SessionPhase::Solve);

    // Every scene is present and frozen in the store.
    let room = store
        .fetch_room(&code)
        .await
        .expect("fetch")
        .expect("present");
    assert!(room.status.is_terminal());
    assert_eq!(room.scenes.len(), 6);
}

#[tokio::test]
async fn queued_writes_converge_after_outage() {
    let store = Arc::new(InMemoryRoomStore::new());
    let lead = client(&store);
    let joiner = client(&store);

    let code = lead
        .begin_lead(SessionMode::Partner, "halloween", "ending-1", true)
        .await
        .expect("lead");
    joiner.join(&code, 1).await.expect("join");

    author_partition(&lead).await;
    lead.mark_ready().await.expect("lead ready");

    // The joiner authors through an outage; edits apply locally and queue
    // for replay.
    store.set_offline(true);
    author_partition(&joiner).await;
    let local = joiner.room().await.expect("room");
    assert_eq!(local.scenes.len(), 3, "local view reflects every edit");
    assert!(local.scenes.contains_key(&3));
    joiner.mark_ready().await.expect("joiner ready");

    // Nothing reached the store while offline.
    store.set_offline(false);
    let remote = store
        .fetch_room(&code)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(remote.scenes.len(), 3, "only the lead's scenes are synced");
    assert!(!remote.is_collectively_ready());

    // Polling replays the queue and resends the ready flag.
    let (lead_entered, joiner_entered) = timeout(TEST_TIMEOUT, async {
        tokio::join!(lead.await_ready(), joiner.await_ready())
    })
    .await
    .expect("barrier timed out");
    assert!(lead_entered.expect("lead barrier"));
    assert!(joiner_entered.expect("joiner barrier"));

    let room = store
        .fetch_room(&code)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(room.scenes.len(), 6);
    assert!(room.is_collectively_ready());
}

#[tokio::test]
async fn joiner_with_out_of_range_player_is_rejected() {
    let store = Arc::new(InMemoryRoomStore::new());
    let lead = client(&store);
    let joiner = client(&store);

    let code = lead
        .begin_lead(SessionMode::Partner, "halloween", "ending-1", true)
        .await
        .expect("lead");

    let result = joiner.join(&code, 2).await;
    assert!(result.is_err());
    assert_eq!(joiner.phase().await, SessionPhase::Setup);
}
