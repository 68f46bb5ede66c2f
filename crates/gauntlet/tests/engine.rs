//! Integration tests for the engine loop, its handle and the server.
//!
//! Async tests use `start_paused = true`: tokio's clock only moves when the
//! runtime is idle, so heartbeats fire at exact 50 ms steps.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gauntlet::prelude::*;
use gauntlet::{JsonCatalog, spawn_catalog_writer};
use gauntlet_arena::Services;
use tokio::sync::oneshot;

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn lobby_state(id: u64) -> PlayerState {
    let mut state = PlayerState::competition(Location::new("lobby", id as f64, 70.0, 0.0), 14.0);
    state.level = id as u32;
    state
}

fn online_host() -> Arc<MemoryHost> {
    let host = Arc::new(MemoryHost::new());
    for id in 1..=6 {
        host.insert(pid(id), lobby_state(id));
    }
    host
}

/// Free-for-all, 2..=4 players, 2-tick countdown at 20 Hz.
fn quick_arena(key: &str) -> ArenaConfig {
    ArenaConfig {
        min_players: 2,
        max_players: 4,
        countdown_secs: 0.1,
        ..ArenaConfig::new(key, key, Location::new("arena", 0.0, 100.0, 0.0))
    }
}

// =========================================================================
// Heartbeat (driven by hand)
// =========================================================================

#[tokio::test]
async fn test_heartbeat_applies_queued_joins_before_tick() {
    let (mut engine, handle) = Engine::new(EngineConfig::default(), Services::new(online_host()));
    let created = handle.create_arena(quick_arena("sky"));
    engine.heartbeat(1);
    assert_eq!(created.await.unwrap().stage, ArenaStage::Waiting);

    let first = handle.join("sky", pid(1));
    let second = handle.join("sky", pid(2));
    engine.heartbeat(1);

    assert!(first.await.is_ok());
    assert!(second.await.is_ok());
    let status = handle.directory().status(&ArenaKey::new("sky")).unwrap();
    assert_eq!(status.stage, ArenaStage::Countdown);
    assert_eq!(status.players, 2);
    assert_eq!(handle.directory().arena_of(pid(2)), Some(ArenaKey::new("sky")));
}

#[tokio::test]
async fn test_heartbeat_replies_in_enqueue_order() {
    let (mut engine, handle) = Engine::new(EngineConfig::default(), Services::new(online_host()));
    let created = handle.create_arena(quick_arena("sky"));
    let join = handle.join("sky", pid(1));
    let again = handle.join("sky", pid(1));
    let leave = handle.leave(pid(1));
    let stray = handle.leave(pid(1));

    engine.heartbeat(1);

    assert!(created.await.is_ok());
    assert!(join.await.is_ok());
    assert_eq!(again.await.unwrap_err().kind(), ErrorKind::AlreadyInGame);
    assert_eq!(leave.await.unwrap(), ArenaKey::new("sky"));
    assert_eq!(stray.await.unwrap_err().kind(), ErrorKind::NotInGame);
}

/// Sends every joining player straight back out through the engine queue.
#[derive(Default)]
struct BounceOnJoin {
    handle: OnceLock<EngineHandle>,
}

impl ArenaObserver for BounceOnJoin {
    fn player_joined(&self, _arena: &ArenaKey, player: PlayerId, _team: TeamId) {
        if let Some(handle) = self.handle.get() {
            let _ = handle.leave(player);
        }
    }
}

#[tokio::test]
async fn test_heartbeat_commands_enqueued_during_dispatch_wait_for_next() {
    let bounce = Arc::new(BounceOnJoin::default());
    let services = Services::new(online_host()).with_observer(bounce.clone());
    let (mut engine, handle) = Engine::new(EngineConfig::default(), services);
    let _ = bounce.handle.set(handle.clone());
    let _ = handle.create_arena(quick_arena("sky"));
    engine.heartbeat(1);

    let joined = handle.join("sky", pid(1));
    engine.heartbeat(1);

    // The leave queued from inside the join is not applied in the same heartbeat.
    assert!(joined.await.is_ok());
    assert_eq!(handle.directory().arena_of(pid(1)), Some(ArenaKey::new("sky")));
    assert!(engine.registry().arena_of(pid(1)).is_some());

    engine.heartbeat(1);
    assert_eq!(handle.directory().arena_of(pid(1)), None);
    assert!(engine.registry().arena_of(pid(1)).is_none());
}

#[tokio::test]
async fn test_unknown_arena_commands_report_unknown_arena() {
    let (mut engine, handle) = Engine::new(EngineConfig::default(), Services::new(online_host()));
    let join = handle.join("nowhere", pid(1));
    let start = handle.force_start("nowhere");
    let delete = handle.delete_arena("nowhere");
    handle.mode_event("nowhere", ModeEvent::Eliminate { player: pid(1), by: None });

    engine.heartbeat(1);

    assert_eq!(join.await.unwrap_err().kind(), ErrorKind::UnknownArena);
    assert_eq!(start.await.unwrap_err().kind(), ErrorKind::UnknownArena);
    assert_eq!(delete.await.unwrap_err().kind(), ErrorKind::UnknownArena);
}

#[tokio::test]
async fn test_mode_event_eliminates_and_round_ends_same_heartbeat() {
    let (mut engine, handle) = Engine::new(EngineConfig::default(), Services::new(online_host()));
    let _ = handle.create_arena(quick_arena("sky"));
    let _ = handle.join("sky", pid(1));
    let _ = handle.join("sky", pid(2));
    engine.heartbeat(1);
    engine.heartbeat(2);
    assert_eq!(engine.registry().get(&ArenaKey::new("sky")).unwrap().stage(), ArenaStage::Active);

    handle.mode_event("sky", ModeEvent::Eliminate { player: pid(1), by: Some(pid(2)) });
    engine.heartbeat(1);

    let sky = engine.registry().get(&ArenaKey::new("sky")).unwrap();
    assert_eq!(sky.stage(), ArenaStage::Ending);
    assert_eq!(sky.winner(), Some(TeamId::Solo(pid(2))));
}

#[tokio::test]
async fn test_delete_arena_clears_directory_and_restores() {
    let host = online_host();
    let (mut engine, handle) = Engine::new(EngineConfig::default(), Services::new(host.clone()));
    let _ = handle.create_arena(quick_arena("sky"));
    let _ = handle.join("sky", pid(1));
    engine.heartbeat(1);
    assert_ne!(host.state(pid(1)).unwrap(), lobby_state(1));

    let deleted = handle.delete_arena("sky");
    engine.heartbeat(1);

    assert_eq!(deleted.await.unwrap().key, ArenaKey::new("sky"));
    assert!(handle.directory().is_empty());
    assert_eq!(handle.directory().arena_of(pid(1)), None);
    assert_eq!(host.state(pid(1)).unwrap(), lobby_state(1));
}

#[tokio::test]
async fn test_stop_restores_players_and_refuses_commands() {
    let host = online_host();
    let (mut engine, handle) = Engine::new(EngineConfig::default(), Services::new(host.clone()));
    let _ = handle.create_arena(quick_arena("sky"));
    let _ = handle.join("sky", pid(1));
    let _ = handle.join("sky", pid(2));
    engine.heartbeat(1);
    let queued = handle.join("sky", pid(3));

    engine.stop();

    assert!(matches!(queued.await, Err(ArenaError::Unavailable)));
    assert!(matches!(handle.join("sky", pid(4)).await, Err(ArenaError::Unavailable)));
    assert!(!handle.is_running());
    assert_eq!(host.state(pid(1)).unwrap(), lobby_state(1));
    assert_eq!(host.state(pid(2)).unwrap(), lobby_state(2));
}

#[tokio::test]
async fn test_dropped_engine_resolves_pending_unavailable() {
    let (engine, handle) = Engine::new(EngineConfig::default(), Services::new(online_host()));
    let pending = handle.join("sky", pid(1));
    drop(engine);
    assert!(matches!(pending.await, Err(ArenaError::Unavailable)));
}

// =========================================================================
// Run loop (paused clock)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_loop_drives_countdown_into_round() {
    let host = online_host();
    let (engine, handle) = Engine::new(EngineConfig::default(), Services::new(host.clone()));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(engine.run(async {
        let _ = stop_rx.await;
    }));

    handle.create_arena(quick_arena("sky")).await.unwrap();
    handle.join("sky", pid(1)).await.unwrap();
    handle.join("sky", pid(2)).await.unwrap();
    assert_eq!(
        handle.directory().status(&ArenaKey::new("sky")).unwrap().stage,
        ArenaStage::Countdown
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        handle.directory().status(&ArenaKey::new("sky")).unwrap().stage,
        ArenaStage::Active
    );

    stop_tx.send(()).unwrap();
    task.await.unwrap();

    assert_eq!(host.state(pid(1)).unwrap(), lobby_state(1));
    assert!(handle.directory().arena_of(pid(1)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_reconnect_within_grace_keeps_seat() {
    let host = online_host();
    let config = EngineConfig { reconnect_grace_secs: 1.0, ..EngineConfig::default() };
    let (engine, handle) = Engine::new(config, Services::new(host.clone()));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(engine.run(async {
        let _ = stop_rx.await;
    }));

    handle.create_arena(quick_arena("sky")).await.unwrap();
    handle.join("sky", pid(1)).await.unwrap();
    handle.join("sky", pid(2)).await.unwrap();
    handle.join("sky", pid(3)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.disconnect(pid(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.reconnect(pid(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let status = handle.directory().status(&ArenaKey::new("sky")).unwrap();
    assert_eq!(status.stage, ArenaStage::Active);
    assert_eq!(status.alive, 3);
    assert_eq!(handle.directory().arena_of(pid(1)), Some(ArenaKey::new("sky")));

    stop_tx.send(()).unwrap();
    task.await.unwrap();
}

// =========================================================================
// Server
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_server_round_persists_stats_and_catalogue() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("arenas.json");
    let store = Arc::new(MemoryStatsStore::new());
    let server = GauntletServer::builder()
        .catalog(&catalog_path)
        .build(online_host(), store.clone())
        .await
        .unwrap();
    let handle = server.handle();
    let stats = server.stats();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    handle.create_arena(quick_arena("sky")).await.unwrap();
    handle.join("sky", pid(1)).await.unwrap();
    handle.join("sky", pid(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.leave(pid(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        handle.directory().status(&ArenaKey::new("sky")).unwrap().stage,
        ArenaStage::Waiting
    );

    stop_tx.send(()).unwrap();
    task.await.unwrap();

    let winner = store.get(pid(2)).unwrap();
    assert_eq!((winner.wins, winner.games_played), (1, 1));
    let loser = store.get(pid(1)).unwrap();
    assert_eq!((loser.losses, loser.deaths), (1, 1));
    assert_eq!(stats.get(pid(2)).unwrap().wins, 1);

    let file = JsonCatalog::new(&catalog_path).load().await.unwrap();
    assert_eq!(file.arenas.len(), 1);
    assert_eq!(file.arenas[0].key, ArenaKey::new("sky"));
}

#[tokio::test]
async fn test_server_loads_catalogue_and_skips_bad_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arenas.json");
    let broken = ArenaConfig { min_players: 5, max_players: 2, ..quick_arena("broken") };
    let (writer, task) = spawn_catalog_writer(JsonCatalog::new(&path));
    writer.submit(CatalogFile::new(vec![quick_arena("sky"), broken]));
    drop(writer);
    task.await.unwrap();

    let server = GauntletServer::builder()
        .catalog(&path)
        .build(online_host(), Arc::new(MemoryStatsStore::new()))
        .await
        .unwrap();

    let directory = server.directory();
    assert!(directory.contains(&ArenaKey::new("sky")));
    assert!(!directory.contains(&ArenaKey::new("broken")));
}

#[tokio::test]
async fn test_server_build_fails_on_malformed_catalogue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arenas.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = GauntletServer::builder()
        .catalog(&path)
        .build(online_host(), Arc::new(MemoryStatsStore::new()))
        .await;

    assert!(matches!(result, Err(GauntletError::Protocol(_))));
}
