//! Mode policies: the rules that differ between game modes.
//!
//! The stage machine is the same for every arena. What changes per mode is
//! what happens while a round is live: which events knock players out, what
//! a tick does to the map, when the round is over and who won. That is the
//! [`ModePolicy`] trait.
//!
//! The built-in modes are variants of [`Variant`]; anything else plugs in
//! through [`Variant::Custom`], usually built by name from a
//! [`ModeCatalog`].
//!
//! # Isolation
//!
//! Policy code is never trusted to behave. Every call goes through
//! [`Variant`], which turns both `Err` returns and panics into a
//! [`VariantError`]. The arena answers any such error by ending the round
//! with no winner.
//!
//! # Effects
//!
//! Policies don't touch rosters directly. They ask for eliminations and
//! statistics credits through a [`VariantContext`]; the arena applies them
//! after the call returns.

mod basic;
mod block_decay;
mod projectile;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use gauntlet_protocol::{ArenaKey, BlockPos, Location, PlayerId};
use serde::{Deserialize, Serialize};

use crate::{ArenaError, ArenaWorld, PlayerStats, TeamId, TeamPool, VariantSpec};

pub use basic::LastStanding;
pub use block_decay::BlockDecay;
pub use projectile::ProjectileDuel;

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// Something that happened in the world that the mode may care about.
/// Only delivered while a round is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeEvent {
    /// A player moved. Falling below the arena's void level knocks them out.
    PlayerMoved { player: PlayerId, to: Location },
    /// A player stood on a block.
    BlockStepped { player: PlayerId, block: BlockPos },
    /// `shooter` hit `victim` with a projectile.
    ProjectileHit { shooter: PlayerId, victim: PlayerId },
    /// The host decided the player is out (death, trigger zone, ...).
    Eliminate {
        player: PlayerId,
        #[serde(default)]
        by: Option<PlayerId>,
    },
}

impl ModeEvent {
    /// The player the event is about.
    pub fn player(&self) -> PlayerId {
        match self {
            Self::PlayerMoved { player, .. }
            | Self::BlockStepped { player, .. }
            | Self::Eliminate { player, .. } => *player,
            Self::ProjectileHit { shooter, .. } => *shooter,
        }
    }
}

/// A mode policy failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VariantError {
    /// The policy returned an error.
    #[error("{0}")]
    Failed(String),

    /// The policy panicked.
    #[error("panicked in {op}: {message}")]
    Panicked { op: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// VariantContext
// ---------------------------------------------------------------------------

/// What a policy can see and request during a call.
pub struct VariantContext<'a> {
    arena: &'a ArenaKey,
    teams: &'a TeamPool,
    world: &'a dyn ArenaWorld,
    void_level: Option<f64>,
    eliminations: Vec<(PlayerId, Option<PlayerId>)>,
    credits: Vec<(PlayerId, PlayerStats)>,
}

/// Requests collected from a [`VariantContext`], in the order they were made.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub eliminations: Vec<(PlayerId, Option<PlayerId>)>,
    pub credits: Vec<(PlayerId, PlayerStats)>,
}

impl<'a> VariantContext<'a> {
    pub fn new(
        arena: &'a ArenaKey,
        teams: &'a TeamPool,
        world: &'a dyn ArenaWorld,
        void_level: Option<f64>,
    ) -> Self {
        Self {
            arena,
            teams,
            world,
            void_level,
            eliminations: Vec::new(),
            credits: Vec::new(),
        }
    }

    pub fn arena(&self) -> &ArenaKey {
        self.arena
    }

    pub fn teams(&self) -> &TeamPool {
        self.teams
    }

    pub fn world(&self) -> &dyn ArenaWorld {
        self.world
    }

    pub fn void_level(&self) -> Option<f64> {
        self.void_level
    }

    /// `true` if the player is competing and not already marked for
    /// elimination during this call.
    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.teams.is_alive(player) && !self.eliminations.iter().any(|(p, _)| *p == player)
    }

    /// Asks for `player` to be knocked out, credited to `by`. Ignored (and
    /// `false` returned) if the player is not alive.
    pub fn eliminate(&mut self, player: PlayerId, by: Option<PlayerId>) -> bool {
        if !self.is_alive(player) {
            return false;
        }
        self.eliminations.push((player, by));
        true
    }

    /// Adds to a player's statistics.
    pub fn credit(&mut self, player: PlayerId, delta: PlayerStats) {
        self.credits.push((player, delta));
    }

    /// Handles the events every mode shares: void falls and host-reported
    /// eliminations. Returns `true` if the event was one of those.
    pub fn apply_standard_event(&mut self, event: &ModeEvent) -> bool {
        match event {
            ModeEvent::PlayerMoved { player, to } => {
                if self.void_level.is_some_and(|level| to.y < level) {
                    self.eliminate(*player, None);
                }
                true
            }
            ModeEvent::Eliminate { player, by } => {
                self.eliminate(*player, *by);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn into_effects(self) -> Effects {
        Effects {
            eliminations: self.eliminations,
            credits: self.credits,
        }
    }
}

// ---------------------------------------------------------------------------
// ModePolicy
// ---------------------------------------------------------------------------

/// The rules of a game mode.
///
/// Only [`name`](Self::name) is required; the defaults give plain
/// last-team-standing elimination with void falls.
///
/// Within a live round the arena calls, per heartbeat,
/// [`on_tick`](Self::on_tick) then [`is_round_over`](Self::is_round_over),
/// and [`resolve_winner`](Self::resolve_winner) exactly once when the round
/// ends.
pub trait ModePolicy: Send + 'static {
    /// Short name used in logs and the catalogue.
    fn name(&self) -> &str;

    /// Called when the round goes live, after teams are frozen.
    fn on_round_start(&mut self, _teams: &TeamPool) -> Result<(), VariantError> {
        Ok(())
    }

    /// Called for each mode event while the round is live.
    fn on_event(
        &mut self,
        ctx: &mut VariantContext<'_>,
        event: &ModeEvent,
    ) -> Result<(), VariantError> {
        ctx.apply_standard_event(event);
        Ok(())
    }

    /// Per-heartbeat work. `elapsed` is the game time since the last call,
    /// in ticks, and may be zero.
    fn on_tick(&mut self, _ctx: &mut VariantContext<'_>, _elapsed: u64) -> Result<(), VariantError> {
        Ok(())
    }

    /// End condition. Default: at most one team has anyone left alive.
    fn is_round_over(&self, teams: &TeamPool) -> Result<bool, VariantError> {
        Ok(teams.alive_team_count() <= 1)
    }

    /// Picks the winner. `timed_out` is set when the round hit its time
    /// limit instead of its end condition. Default: the last team
    /// standing, or nobody.
    fn resolve_winner(
        &mut self,
        teams: &TeamPool,
        _timed_out: bool,
    ) -> Result<Option<TeamId>, VariantError> {
        Ok(teams.last_team_standing())
    }

    /// Statistics every participant earns for the round.
    fn rewards(&self, teams: &TeamPool, winner: Option<TeamId>) -> HashMap<PlayerId, PlayerStats> {
        standard_rewards(teams, winner)
    }

    /// Drops per-round state. Called when the arena resets.
    fn reset(&mut self) {}
}

/// One game played for every member; a win for the winning team's members
/// and a loss for everyone else. With no winner nobody wins or loses.
pub fn standard_rewards(teams: &TeamPool, winner: Option<TeamId>) -> HashMap<PlayerId, PlayerStats> {
    let mut rewards = HashMap::new();
    for team in teams.teams() {
        let outcome = match winner {
            None => PlayerStats::default(),
            Some(id) if id == team.id() => PlayerStats { wins: 1, ..PlayerStats::default() },
            Some(_) => PlayerStats { losses: 1, ..PlayerStats::default() },
        };
        for player in team.members() {
            rewards.insert(*player, PlayerStats { games_played: 1, ..outcome });
        }
    }
    rewards
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// The mode an arena runs.
pub enum Variant {
    Elimination(LastStanding),
    BlockDecay(BlockDecay),
    Projectile(ProjectileDuel),
    Custom(Box<dyn ModePolicy>),
}

impl Variant {
    /// Builds the variant a catalogue entry names.
    ///
    /// # Errors
    /// [`ArenaError::InvalidConfig`] if a custom mode isn't registered.
    pub fn from_spec(spec: &VariantSpec, modes: &ModeCatalog) -> Result<Self, ArenaError> {
        Ok(match spec {
            VariantSpec::Elimination => Self::Elimination(LastStanding),
            VariantSpec::BlockDecay { decay_ticks } => Self::BlockDecay(BlockDecay::new(*decay_ticks)),
            VariantSpec::Projectile { hits_to_eliminate } => {
                Self::Projectile(ProjectileDuel::new(*hits_to_eliminate))
            }
            VariantSpec::Custom { name } => Self::Custom(
                modes
                    .build(name)
                    .ok_or_else(|| ArenaError::InvalidConfig(format!("unknown mode {name:?}")))?,
            ),
        })
    }

    pub fn custom(policy: impl ModePolicy) -> Self {
        Self::Custom(Box::new(policy))
    }

    pub fn policy(&self) -> &dyn ModePolicy {
        match self {
            Self::Elimination(p) => p,
            Self::BlockDecay(p) => p,
            Self::Projectile(p) => p,
            Self::Custom(p) => p.as_ref(),
        }
    }

    pub fn policy_mut(&mut self) -> &mut dyn ModePolicy {
        match self {
            Self::Elimination(p) => p,
            Self::BlockDecay(p) => p,
            Self::Projectile(p) => p,
            Self::Custom(p) => p.as_mut(),
        }
    }

    pub fn name(&self) -> &str {
        self.policy().name()
    }

    /// Runs `f` against the policy, turning a panic into
    /// [`VariantError::Panicked`].
    pub(crate) fn guarded<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut dyn ModePolicy) -> Result<T, VariantError>,
    ) -> Result<T, VariantError> {
        let policy = self.policy_mut();
        match panic::catch_unwind(AssertUnwindSafe(|| f(policy))) {
            Ok(result) => result,
            Err(payload) => Err(VariantError::Panicked {
                op,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Variant").field(&self.name()).finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// ModeCatalog
// ---------------------------------------------------------------------------

/// Builds a fresh policy for each arena that uses a custom mode.
pub type ModeFactory = Arc<dyn Fn() -> Box<dyn ModePolicy> + Send + Sync>;

/// Custom modes registered by name.
#[derive(Clone, Default)]
pub struct ModeCatalog {
    factories: HashMap<String, ModeFactory>,
}

impl ModeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mode; a later registration under the same name wins.
    pub fn register<F, P>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: ModePolicy,
    {
        self.factories
            .insert(name.into(), Arc::new(move || Box::new(factory()) as Box<dyn ModePolicy>));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(&self, name: &str) -> Option<Box<dyn ModePolicy>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for ModeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticWorld;
    use gauntlet_protocol::{ArenaKind, TeamColor};

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

    struct Exploding;

    impl ModePolicy for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn on_tick(&mut self, _ctx: &mut VariantContext<'_>, _elapsed: u64) -> Result<(), VariantError> {
            panic!("boom");
        }
    }

    #[test]
    fn test_context_eliminate_ignores_dead_and_duplicates() {
        let pool = live_pool(&[1, 2]);
        let key = ArenaKey::new("a");
        let mut ctx = VariantContext::new(&key, &pool, &StaticWorld, None);

        assert!(ctx.eliminate(pid(1), Some(pid(2))));
        assert!(!ctx.eliminate(pid(1), None), "already queued");
        assert!(!ctx.eliminate(pid(9), None), "not in the round");
        assert_eq!(ctx.into_effects().eliminations, vec![(pid(1), Some(pid(2)))]);
    }

    #[test]
    fn test_standard_event_eliminates_below_void() {
        let pool = live_pool(&[1, 2]);
        let key = ArenaKey::new("a");
        let mut ctx = VariantContext::new(&key, &pool, &StaticWorld, Some(0.0));

        ctx.apply_standard_event(&ModeEvent::PlayerMoved {
            player: pid(1),
            to: Location::new("w", 0.0, 5.0, 0.0),
        });
        ctx.apply_standard_event(&ModeEvent::PlayerMoved {
            player: pid(2),
            to: Location::new("w", 0.0, -3.0, 0.0),
        });

        assert_eq!(ctx.into_effects().eliminations, vec![(pid(2), None)]);
    }

    #[test]
    fn test_standard_rewards_win_and_loss() {
        let mut pool = TeamPool::new(ArenaKind::Teams, &[TeamColor::Red, TeamColor::Blue], 2);
        for p in 1..=4 {
            pool.place(pid(p));
        }
        pool.freeze();

        let rewards = standard_rewards(&pool, Some(TeamId::Color(TeamColor::Red)));

        assert_eq!(rewards.len(), 4);
        assert_eq!(rewards[&pid(1)].wins, 1);
        assert_eq!(rewards[&pid(2)].losses, 1);
        assert!(rewards.values().all(|s| s.games_played == 1));
    }

    #[test]
    fn test_standard_rewards_without_winner_only_counts_games() {
        let pool = live_pool(&[1, 2]);
        let rewards = standard_rewards(&pool, None);
        assert!(rewards.values().all(|s| s.games_played == 1 && s.wins == 0 && s.losses == 0));
    }

    #[test]
    fn test_guarded_turns_panic_into_error() {
        let pool = live_pool(&[1, 2]);
        let key = ArenaKey::new("a");
        let mut variant = Variant::custom(Exploding);

        let result = variant.guarded("tick", |p| {
            let mut ctx = VariantContext::new(&key, &pool, &StaticWorld, None);
            p.on_tick(&mut ctx, 1)
        });

        assert_eq!(
            result,
            Err(VariantError::Panicked { op: "tick", message: "boom".into() })
        );
    }

    #[test]
    fn test_from_spec_builds_builtins() {
        let modes = ModeCatalog::new();
        let v = Variant::from_spec(&VariantSpec::BlockDecay { decay_ticks: 4 }, &modes).unwrap();
        assert_eq!(v.name(), "block_decay");
        let v = Variant::from_spec(&VariantSpec::Elimination, &modes).unwrap();
        assert_eq!(v.name(), "elimination");
    }

    #[test]
    fn test_from_spec_unknown_custom_is_invalid_config() {
        let result = Variant::from_spec(&VariantSpec::Custom { name: "nope".into() }, &ModeCatalog::new());
        assert!(matches!(result, Err(ArenaError::InvalidConfig(_))));
    }

    #[test]
    fn test_catalog_builds_fresh_policy() {
        let mut modes = ModeCatalog::new();
        modes.register("exploding", || Exploding);

        assert!(modes.contains("exploding"));
        let v = Variant::from_spec(&VariantSpec::Custom { name: "exploding".into() }, &modes).unwrap();
        assert_eq!(v.name(), "exploding");
    }

    #[test]
    fn test_mode_event_json_shape() {
        let event: ModeEvent =
            serde_json::from_str(r#"{"type":"projectile_hit","shooter":1,"victim":2}"#).unwrap();
        assert_eq!(event, ModeEvent::ProjectileHit { shooter: pid(1), victim: pid(2) });
        assert_eq!(event.player(), pid(1));
    }
}
