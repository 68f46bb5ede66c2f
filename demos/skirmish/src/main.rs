//! Plays two scripted rounds against an in-memory host and prints what a
//! scoreboard would see.
//!
//! ```text
//! cargo run -p skirmish
//! RUST_LOG=debug cargo run -p skirmish
//! ```

use std::sync::Arc;
use std::time::Duration;

use gauntlet::prelude::*;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// A custom mode
// ---------------------------------------------------------------------------

/// The round ends at the first knockout. Whoever scored it wins for their
/// team; a fall with no attacker leaves the last team standing, if any.
#[derive(Default)]
struct SuddenDeath {
    first_blood: Option<PlayerId>,
}

impl ModePolicy for SuddenDeath {
    fn name(&self) -> &str {
        "sudden_death"
    }

    fn on_event(&mut self, ctx: &mut VariantContext<'_>, event: &ModeEvent) -> Result<(), VariantError> {
        if let ModeEvent::Eliminate { player, by: Some(killer) } = event {
            if ctx.eliminate(*player, Some(*killer)) && self.first_blood.is_none() {
                self.first_blood = Some(*killer);
            }
            return Ok(());
        }
        ctx.apply_standard_event(event);
        Ok(())
    }

    fn is_round_over(&self, teams: &TeamPool) -> Result<bool, VariantError> {
        Ok(teams.alive_count() < teams.member_count() || teams.alive_team_count() <= 1)
    }

    fn resolve_winner(&mut self, teams: &TeamPool, _timed_out: bool) -> Result<Option<TeamId>, VariantError> {
        Ok(match self.first_blood {
            Some(killer) => teams.team_of(killer),
            None => teams.last_team_standing(),
        })
    }

    fn reset(&mut self) {
        self.first_blood = None;
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Prints every notification the way a chat feed would show it.
struct Announcer;

impl ArenaObserver for Announcer {
    fn stage_changed(&self, arena: &ArenaKey, _from: ArenaStage, to: ArenaStage) {
        println!("[{arena}] now {to}");
    }

    fn countdown(&self, arena: &ArenaKey, seconds_left: u64) {
        println!("[{arena}] starting in {seconds_left}...");
    }

    fn player_joined(&self, arena: &ArenaKey, player: PlayerId, team: TeamId) {
        println!("[{arena}] {player} joined team {team}");
    }

    fn player_eliminated(&self, arena: &ArenaKey, player: PlayerId, by: Option<PlayerId>) {
        match by {
            Some(killer) => println!("[{arena}] {player} was knocked out by {killer}"),
            None => println!("[{arena}] {player} is out"),
        }
    }

    fn round_ended(&self, arena: &ArenaKey, winner: Option<TeamId>, winners: &[PlayerId]) {
        match winner {
            Some(team) => println!("[{arena}] team {team} wins: {winners:?}"),
            None => println!("[{arena}] round over, nobody wins"),
        }
    }
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

fn lobby() -> Location {
    Location::new("lobby", 0.5, 70.0, 0.5)
}

fn duel_arena() -> ArenaConfig {
    ArenaConfig {
        kind: ArenaKind::Teams,
        teams: vec![TeamColor::Red, TeamColor::Blue],
        min_players: 4,
        max_players: 4,
        countdown_secs: 1.0,
        max_round_secs: Some(30.0),
        finish: Some(lobby()),
        variant: VariantSpec::Projectile { hits_to_eliminate: 2 },
        ..ArenaConfig::new("duel", "Archery Duel", Location::new("duel", 0.0, 80.0, 0.0))
    }
}

fn pit_arena() -> ArenaConfig {
    ArenaConfig {
        min_players: 2,
        max_players: 2,
        countdown_secs: 1.0,
        void_level: Some(0.0),
        finish: Some(lobby()),
        variant: VariantSpec::Custom { name: "sudden_death".into() },
        ..ArenaConfig::new("pit", "The Pit", Location::new("pit", 0.0, 40.0, 0.0))
    }
}

/// Polls the directory until the arena reaches `stage`.
async fn wait_for(handle: &EngineHandle, key: &str, stage: ArenaStage) -> Result<(), String> {
    let key = ArenaKey::new(key);
    for _ in 0..200 {
        if handle.directory().status(&key).is_some_and(|s| s.stage == stage) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(format!("arena {key} never reached {stage}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    gauntlet::init_tracing();

    let host = Arc::new(MemoryHost::new());
    for id in 1..=6 {
        host.insert(PlayerId(id), PlayerState::competition(lobby(), 20.0));
    }
    let store = Arc::new(MemoryStatsStore::new());

    let server = GauntletServer::builder()
        .config(EngineConfig { ending_secs: 1.0, ..EngineConfig::default() })
        .observer(Arc::new(Announcer))
        .mode("sudden_death", SuddenDeath::default)
        .build(host, store.clone())
        .await?;
    let handle = server.handle();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let engine = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    handle.create_arena(duel_arena()).await?;
    handle.create_arena(pit_arena()).await?;

    for id in 1..=4 {
        handle.join("duel", PlayerId(id)).await?;
    }
    handle.join("pit", PlayerId(5)).await?;
    handle.join("pit", PlayerId(6)).await?;

    wait_for(&handle, "duel", ArenaStage::Active).await?;
    wait_for(&handle, "pit", ArenaStage::Active).await?;

    // Red is P-1 and P-3, blue is P-2 and P-4.
    for (shooter, victim) in [(1, 2), (4, 3), (1, 2), (3, 4), (3, 4)] {
        handle.mode_event(
            "duel",
            ModeEvent::ProjectileHit { shooter: PlayerId(shooter), victim: PlayerId(victim) },
        );
    }
    handle.mode_event(
        "pit",
        ModeEvent::PlayerMoved { player: PlayerId(6), to: Location::new("pit", 3.0, -4.0, 1.0) },
    );

    wait_for(&handle, "duel", ArenaStage::Waiting).await?;
    wait_for(&handle, "pit", ArenaStage::Waiting).await?;

    let _ = stop_tx.send(());
    engine.await?;

    println!();
    for id in 1..=6 {
        let player = PlayerId(id);
        let stats = store.get(player).unwrap_or_default();
        println!(
            "{player}: games {} wins {} losses {} deaths {} kills {} hits {}",
            stats.games_played, stats.wins, stats.losses, stats.deaths, stats.eliminations, stats.projectile_hits
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet::arena::StaticWorld;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn live_pool(players: &[u64]) -> TeamPool {
        let mut pool = TeamPool::new(ArenaKind::FreeForAll, &[], 1);
        for p in players {
            pool.place(pid(*p));
        }
        pool.freeze();
        pool
    }

    #[test]
    fn test_sudden_death_first_blood_wins() {
        let mut pool = live_pool(&[1, 2, 3]);
        let key = ArenaKey::new("pit");
        let mut mode = SuddenDeath::default();

        let mut ctx = VariantContext::new(&key, &pool, &StaticWorld, None);
        mode.on_event(&mut ctx, &ModeEvent::Eliminate { player: pid(2), by: Some(pid(3)) })
            .unwrap();
        pool.eliminate(pid(2));

        assert!(mode.is_round_over(&pool).unwrap());
        assert_eq!(mode.resolve_winner(&pool, false).unwrap(), Some(TeamId::Solo(pid(3))));
    }

    #[test]
    fn test_sudden_death_void_fall_leaves_last_standing() {
        let mut pool = live_pool(&[5, 6]);
        let mut mode = SuddenDeath::default();
        assert!(!mode.is_round_over(&pool).unwrap());

        pool.eliminate(pid(6));

        assert!(mode.is_round_over(&pool).unwrap());
        assert_eq!(mode.resolve_winner(&pool, false).unwrap(), Some(TeamId::Solo(pid(5))));
    }

    #[test]
    fn test_demo_arenas_are_valid() {
        assert!(duel_arena().validate().is_ok());
        assert!(pit_arena().validate().is_ok());
    }
}
