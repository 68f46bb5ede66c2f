//! One arena's stage machine.
//!
//! An [`Arena`] is a plain owned value. It has no task, lock or timer of
//! its own: the registry mutates it from the heartbeat, which calls
//! [`Arena::tick`] once per heartbeat after dispatching queued commands.
//!
//! # Round lifecycle
//!
//! ```text
//! tick: players ≥ min           tick: countdown hits 0
//!  WAITING ─────────→ COUNTDOWN ─────────→ ACTIVE
//!     ▲                  │                  │ tick: policy says over,
//!     │ tick: < min      │                  │ or time limit reached
//!     └──────────────────┘                  ▼
//!     └──────────── tick: cleanup ────── ENDING
//! ```
//!
//! Each `tick` makes at most one transition, so every stage is visible to
//! at least one heartbeat. Timers count down by the elapsed ticks and clamp
//! at zero; a tick with zero elapsed advances no timer.
//!
//! # Snapshots
//!
//! Every seated player holds exactly one [`SessionSnapshot`], taken at join.
//! It is consumed exactly once: on leave, on grace-window expiry, at round
//! cleanup, or when the arena is evacuated.

use std::collections::BTreeMap;
use std::mem;

use gauntlet_protocol::{ArenaKey, ArenaKind, PlayerId};
use gauntlet_session::{Presence, PresenceTracker, RestoreOutcome, SessionError, SessionSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::variant::{standard_rewards, Effects, ModeEvent, Variant, VariantContext, VariantError};
use crate::{ArenaConfig, ArenaError, ArenaStage, PlayerStats, RoundRules, Services, TeamId, TeamPool};

// ---------------------------------------------------------------------------
// ArenaPlayer
// ---------------------------------------------------------------------------

/// A participant seated in an arena.
#[derive(Debug)]
pub struct ArenaPlayer {
    id: PlayerId,
    arena: ArenaKey,
    team: Option<TeamId>,
    snapshot: Option<SessionSnapshot>,
}

impl ArenaPlayer {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn arena(&self) -> &ArenaKey {
        &self.arena
    }

    pub fn team(&self) -> Option<TeamId> {
        self.team
    }

    /// The pre-game state waiting to be restored.
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Read-only view of one team, for scoreboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStatus {
    pub id: TeamId,
    pub members: Vec<PlayerId>,
    pub alive: usize,
}

/// Read-only view of an arena, for scoreboards, menus and lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaStatus {
    pub key: ArenaKey,
    pub display_name: String,
    pub kind: ArenaKind,
    pub mode: String,
    pub stage: ArenaStage,
    /// Whole seconds left, while counting down.
    pub countdown_remaining_secs: Option<u64>,
    pub players: usize,
    /// Players still competing. Equal to `players` outside a round.
    pub alive: usize,
    pub min_players: usize,
    pub max_players: usize,
    pub teams: Vec<TeamStatus>,
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// One arena: its configuration, its current round and everyone in it.
#[derive(Debug)]
pub struct Arena {
    config: ArenaConfig,
    rules: RoundRules,
    stage: ArenaStage,
    teams: TeamPool,
    players: BTreeMap<PlayerId, ArenaPlayer>,
    presence: PresenceTracker,
    variant: Variant,
    countdown_remaining: u64,
    round_elapsed: u64,
    ending_remaining: u64,
    winner: Option<TeamId>,
    /// Players who lost their seat since the registry last asked.
    departed: Vec<PlayerId>,
    /// Snapshots that could not reach their player, waiting to be handed
    /// to the registry.
    unrestored: Vec<SessionSnapshot>,
}

impl Arena {
    /// Creates an empty arena in WAITING.
    ///
    /// # Errors
    /// [`ArenaError::InvalidConfig`] if the config can never run.
    pub fn new(config: ArenaConfig, rules: RoundRules, variant: Variant) -> Result<Self, ArenaError> {
        config.validate()?;
        let teams = TeamPool::new(config.kind, &config.teams, config.team_capacity());
        Ok(Self {
            teams,
            presence: PresenceTracker::new(rules.grace_ticks),
            config,
            rules,
            stage: ArenaStage::Waiting,
            players: BTreeMap::new(),
            variant,
            countdown_remaining: 0,
            round_elapsed: 0,
            ending_remaining: 0,
            winner: None,
            departed: Vec::new(),
            unrestored: Vec::new(),
        })
    }

    // -- Queries ------------------------------------------------------------

    pub fn key(&self) -> &ArenaKey {
        &self.config.key
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn rules(&self) -> &RoundRules {
        &self.rules
    }

    pub fn stage(&self) -> ArenaStage {
        self.stage
    }

    pub fn teams(&self) -> &TeamPool {
        &self.teams
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    pub fn player(&self, player: PlayerId) -> Option<&ArenaPlayer> {
        self.players.get(&player)
    }

    pub fn players(&self) -> impl Iterator<Item = &ArenaPlayer> + '_ {
        self.players.values()
    }

    /// Seated players, connected or inside their grace window.
    pub fn participant_count(&self) -> usize {
        self.players.len()
    }

    pub fn presence(&self, player: PlayerId) -> Option<Presence> {
        self.presence.get(player)
    }

    pub fn countdown_remaining_ticks(&self) -> Option<u64> {
        (self.stage == ArenaStage::Countdown).then_some(self.countdown_remaining)
    }

    /// Whole seconds left on the countdown, rounded up.
    pub fn countdown_remaining_secs(&self) -> Option<u64> {
        self.countdown_remaining_ticks()
            .map(|ticks| ticks.div_ceil(self.rules.ticks_per_second))
    }

    /// The team that won the round currently in ENDING.
    pub fn winner(&self) -> Option<TeamId> {
        self.winner
    }

    pub fn status(&self) -> ArenaStatus {
        let alive = if self.stage.is_in_round() {
            self.teams.alive_count()
        } else {
            self.players.len()
        };
        ArenaStatus {
            key: self.config.key.clone(),
            display_name: self.config.display_name.clone(),
            kind: self.config.kind,
            mode: self.variant.name().to_string(),
            stage: self.stage,
            countdown_remaining_secs: self.countdown_remaining_secs(),
            players: self.players.len(),
            alive,
            min_players: self.config.min_players,
            max_players: self.config.max_players,
            teams: self
                .teams
                .teams()
                .iter()
                .map(|t| TeamStatus {
                    id: t.id(),
                    members: t.members().to_vec(),
                    alive: t.alive_count(),
                })
                .collect(),
        }
    }

    pub(crate) fn take_departed(&mut self) -> Vec<PlayerId> {
        mem::take(&mut self.departed)
    }

    pub(crate) fn take_unrestored(&mut self) -> Vec<SessionSnapshot> {
        mem::take(&mut self.unrestored)
    }

    // -- Player operations --------------------------------------------------

    /// Seats a player: captures their snapshot, clears them for competition,
    /// places them on a team and sends them to the anchor.
    ///
    /// # Errors
    /// - [`ArenaError::AlreadyInGame`]: already seated here
    /// - [`ArenaError::NotJoinable`]: a round is running
    /// - [`ArenaError::ArenaFull`]: no seat or no team slot left
    /// - [`ArenaError::Session`]: the snapshot could not be taken; nothing
    ///   was changed
    pub fn join(&mut self, svc: &Services, player: PlayerId) -> Result<TeamId, ArenaError> {
        if self.players.contains_key(&player) {
            return Err(ArenaError::AlreadyInGame(player, self.config.key.clone()));
        }
        if !self.stage.is_joinable() {
            return Err(ArenaError::NotJoinable {
                key: self.config.key.clone(),
                stage: self.stage,
            });
        }
        if self.players.len() >= self.config.max_players || !self.teams.has_room() {
            return Err(ArenaError::ArenaFull(self.config.key.clone()));
        }

        let snapshot = SessionSnapshot::capture(svc.host.as_ref(), player, &self.rules.health)?;
        let Some(team) = self.teams.place(player) else {
            self.restore_snapshot(svc, snapshot);
            return Err(ArenaError::ArenaFull(self.config.key.clone()));
        };

        if let Some(stale) = self.presence.seat(player) {
            debug!(arena = %self.config.key, %player, ?stale, "replaced stale presence record");
        }
        if let Err(err) = svc.host.teleport(player, &self.config.anchor) {
            warn!(arena = %self.config.key, %player, error = %err, "could not send player to arena");
        }
        self.players.insert(
            player,
            ArenaPlayer {
                id: player,
                arena: self.config.key.clone(),
                team: Some(team),
                snapshot: Some(snapshot),
            },
        );

        info!(
            arena = %self.config.key,
            %player,
            %team,
            players = self.players.len(),
            "player joined"
        );
        svc.observer.player_joined(&self.config.key, player, team);
        Ok(team)
    }

    /// Unseats a player and restores their snapshot. During a round this
    /// counts as an elimination.
    ///
    /// # Errors
    /// [`ArenaError::NotInGame`] if the player isn't seated here.
    pub fn leave(&mut self, svc: &Services, player: PlayerId) -> Result<(), ArenaError> {
        if !self.players.contains_key(&player) {
            return Err(ArenaError::NotInGame(player));
        }
        self.remove_player(svc, player);
        Ok(())
    }

    /// Holds a dropped player's seat, team and snapshot for the grace window.
    ///
    /// # Errors
    /// [`ArenaError::NotInGame`] if the player isn't seated here.
    pub fn disconnect(&mut self, player: PlayerId) -> Result<(), ArenaError> {
        if !self.players.contains_key(&player) {
            return Err(ArenaError::NotInGame(player));
        }
        self.presence.detach(player)?;
        info!(
            arena = %self.config.key,
            %player,
            grace_ticks = self.presence.grace_ticks(),
            "player disconnected, holding seat"
        );
        Ok(())
    }

    /// Ends a player's grace window. A reconnect for a player who never
    /// dropped is ignored.
    ///
    /// # Errors
    /// [`ArenaError::NotInGame`] if the player isn't seated here.
    pub fn reconnect(&mut self, player: PlayerId) -> Result<(), ArenaError> {
        if !self.players.contains_key(&player) {
            return Err(ArenaError::NotInGame(player));
        }
        match self.presence.reattach(player) {
            Ok(()) => info!(arena = %self.config.key, %player, "player reconnected"),
            Err(SessionError::AlreadyAttached(_)) => {
                debug!(arena = %self.config.key, %player, "reconnect for connected player ignored");
            }
            Err(err) => warn!(arena = %self.config.key, %player, error = %err, "reconnect rejected"),
        }
        Ok(())
    }

    /// Delivers a mode event to the policy. Ignored outside a round and for
    /// players who aren't seated here.
    pub fn on_mode_event(&mut self, svc: &Services, event: &ModeEvent) {
        if self.stage != ArenaStage::Active {
            trace!(arena = %self.config.key, stage = %self.stage, ?event, "mode event outside round ignored");
            return;
        }
        if !self.players.contains_key(&event.player()) {
            debug!(arena = %self.config.key, player = %event.player(), "mode event from outsider ignored");
            return;
        }

        let mut ctx = VariantContext::new(
            &self.config.key,
            &self.teams,
            svc.world.as_ref(),
            self.config.void_level,
        );
        let result = self.variant.guarded("on_event", |p| p.on_event(&mut ctx, event));
        let effects = ctx.into_effects();
        match result {
            Ok(()) => self.apply_effects(svc, effects),
            Err(source) => self.fail_round(svc, source),
        }
    }

    // -- Admin operations ---------------------------------------------------

    /// Starts the countdown now, capped at the forced-start length.
    ///
    /// # Errors
    /// - [`ArenaError::NotJoinable`]: a round is already running or ending
    /// - [`ArenaError::BelowMinimumPlayers`]: not enough players seated
    pub fn force_start(&mut self, svc: &Services) -> Result<(), ArenaError> {
        if !self.stage.is_joinable() {
            return Err(ArenaError::NotJoinable {
                key: self.config.key.clone(),
                stage: self.stage,
            });
        }
        if self.players.len() < self.config.min_players {
            return Err(ArenaError::BelowMinimumPlayers {
                key: self.config.key.clone(),
                required: self.config.min_players,
                current: self.players.len(),
            });
        }

        let cap = self.rules.force_countdown_ticks.min(self.rules.countdown_ticks);
        info!(arena = %self.config.key, countdown_ticks = cap, "round force-started");
        match self.stage {
            ArenaStage::Waiting => self.enter_countdown(svc, cap),
            _ if self.countdown_remaining > cap => {
                self.countdown_remaining = cap;
                self.announce_countdown(svc);
            }
            _ => {}
        }
        Ok(())
    }

    /// Stops whatever the arena is doing. A running round ends with no
    /// winner; a round that already ended is cleaned up now; before a
    /// round everyone is sent back with their snapshot restored.
    pub fn force_end(&mut self, svc: &Services) {
        info!(arena = %self.config.key, stage = %self.stage, "round force-ended");
        match self.stage {
            ArenaStage::Active => {
                self.presence.suspend();
                self.enter_ending(svc, None, false);
            }
            ArenaStage::Ending => self.reset(svc),
            ArenaStage::Countdown => {
                self.evacuate(svc);
                self.set_stage(svc, ArenaStage::Waiting);
            }
            ArenaStage::Waiting => self.evacuate(svc),
        }
    }

    /// Restores every seated player. Used before the arena is deleted and
    /// when the engine shuts down.
    pub fn shutdown(&mut self, svc: &Services) {
        self.evacuate(svc);
        self.stage = ArenaStage::Waiting;
    }

    /// Puts the arena back into a clean WAITING state after a fault,
    /// restoring everyone it can.
    pub fn recover(&mut self, svc: &Services) {
        warn!(arena = %self.config.key, stage = %self.stage, "recovering arena");
        let from = self.stage;
        self.shutdown(svc);
        if from != ArenaStage::Waiting {
            svc.observer.stage_changed(&self.config.key, from, ArenaStage::Waiting);
        }
    }

    // -- Heartbeat ----------------------------------------------------------

    /// Advances the arena by `elapsed` ticks and makes at most one stage
    /// transition.
    pub fn tick(&mut self, svc: &Services, elapsed: u64) {
        for player in self.presence.advance(elapsed) {
            warn!(arena = %self.config.key, %player, "grace window expired, removing player");
            self.remove_player(svc, player);
        }

        match self.stage {
            ArenaStage::Waiting => {
                if self.players.len() >= self.config.min_players {
                    self.enter_countdown(svc, self.rules.countdown_ticks);
                }
            }
            ArenaStage::Countdown => self.tick_countdown(svc, elapsed),
            ArenaStage::Active => self.tick_round(svc, elapsed),
            ArenaStage::Ending => {
                if elapsed > 0 {
                    self.ending_remaining = self.ending_remaining.saturating_sub(elapsed);
                    if self.ending_remaining == 0 {
                        self.reset(svc);
                    }
                }
            }
        }
    }

    fn tick_countdown(&mut self, svc: &Services, elapsed: u64) {
        if self.players.len() < self.config.min_players {
            info!(
                arena = %self.config.key,
                players = self.players.len(),
                min = self.config.min_players,
                "countdown aborted, below minimum"
            );
            self.countdown_remaining = 0;
            self.set_stage(svc, ArenaStage::Waiting);
            return;
        }
        if elapsed == 0 {
            return;
        }

        let before = self.countdown_remaining_secs();
        self.countdown_remaining = self.countdown_remaining.saturating_sub(elapsed);
        if self.countdown_remaining == 0 {
            self.start_round(svc);
        } else if self.countdown_remaining_secs() != before {
            self.announce_countdown(svc);
        }
    }

    fn tick_round(&mut self, svc: &Services, elapsed: u64) {
        self.round_elapsed += elapsed;

        let mut ctx = VariantContext::new(
            &self.config.key,
            &self.teams,
            svc.world.as_ref(),
            self.config.void_level,
        );
        let result = self.variant.guarded("on_tick", |p| p.on_tick(&mut ctx, elapsed));
        let effects = ctx.into_effects();
        if let Err(source) = result {
            self.fail_round(svc, source);
            return;
        }
        self.apply_effects(svc, effects);

        match self.variant.guarded("is_round_over", |p| p.is_round_over(&self.teams)) {
            Err(source) => self.fail_round(svc, source),
            Ok(true) => self.finish_round(svc, false),
            Ok(false) => {
                let timed_out = self
                    .rules
                    .max_round_ticks
                    .is_some_and(|limit| self.round_elapsed >= limit);
                if timed_out {
                    info!(arena = %self.config.key, ticks = self.round_elapsed, "round time limit reached");
                    self.finish_round(svc, true);
                }
            }
        }
    }

    // -- Transitions --------------------------------------------------------

    fn set_stage(&mut self, svc: &Services, to: ArenaStage) {
        let from = self.stage;
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
        self.stage = to;
        info!(arena = %self.config.key, %from, %to, "stage changed");
        svc.observer.stage_changed(&self.config.key, from, to);
    }

    fn enter_countdown(&mut self, svc: &Services, ticks: u64) {
        self.countdown_remaining = ticks;
        self.set_stage(svc, ArenaStage::Countdown);
        self.announce_countdown(svc);
    }

    fn announce_countdown(&self, svc: &Services) {
        if let Some(secs) = self.countdown_remaining_secs() {
            debug!(arena = %self.config.key, secs, "countdown");
            svc.observer.countdown(&self.config.key, secs);
        }
    }

    /// COUNTDOWN → ACTIVE: freezes teams and seals snapshots.
    fn start_round(&mut self, svc: &Services) {
        self.teams.freeze();
        for seat in self.players.values_mut() {
            if let Some(snapshot) = seat.snapshot.as_mut() {
                snapshot.seal();
            }
            seat.team = self.teams.team_of(seat.id);
        }
        self.round_elapsed = 0;
        self.winner = None;
        self.set_stage(svc, ArenaStage::Active);
        info!(
            arena = %self.config.key,
            mode = self.variant.name(),
            players = self.players.len(),
            teams = self.teams.alive_team_count(),
            "round started"
        );

        if let Err(source) = self.variant.guarded("on_round_start", |p| p.on_round_start(&self.teams)) {
            self.fail_round(svc, source);
        }
    }

    /// ACTIVE → ENDING through the policy's winner resolution.
    fn finish_round(&mut self, svc: &Services, timed_out: bool) {
        let winner = match self
            .variant
            .guarded("resolve_winner", |p| p.resolve_winner(&self.teams, timed_out))
        {
            Ok(winner) => winner,
            Err(source) => {
                self.log_variant_failure(source);
                None
            }
        };
        self.enter_ending(svc, winner, true);
    }

    /// ACTIVE → ENDING with no winner after a policy failure.
    fn fail_round(&mut self, svc: &Services, source: VariantError) {
        self.log_variant_failure(source);
        self.enter_ending(svc, None, false);
    }

    fn log_variant_failure(&self, source: VariantError) {
        let err = ArenaError::VariantFailure {
            key: self.config.key.clone(),
            source,
        };
        error!(arena = %self.config.key, error = %err, "ending round without a winner");
    }

    fn enter_ending(&mut self, svc: &Services, winner: Option<TeamId>, policy_rewards: bool) {
        self.winner = winner;
        self.ending_remaining = self.rules.ending_ticks;
        self.set_stage(svc, ArenaStage::Ending);

        let rewards = if policy_rewards {
            let teams = &self.teams;
            match self.variant.guarded("rewards", |p| Ok(p.rewards(teams, winner))) {
                Ok(rewards) => rewards,
                Err(source) => {
                    self.log_variant_failure(source);
                    standard_rewards(&self.teams, winner)
                }
            }
        } else {
            standard_rewards(&self.teams, winner)
        };
        svc.stats.record_all(rewards);

        let winners: Vec<PlayerId> = winner
            .and_then(|id| self.teams.get(&id))
            .map(|team| team.members().to_vec())
            .unwrap_or_default();
        match winner {
            Some(team) => info!(arena = %self.config.key, %team, ?winners, "round over"),
            None => info!(arena = %self.config.key, "round over, no winner"),
        }
        svc.observer.round_ended(&self.config.key, winner, &winners);
    }

    /// ENDING → WAITING: restores everyone, clears teams, rebuilds the map.
    fn reset(&mut self, svc: &Services) {
        for (player, mut seat) in mem::take(&mut self.players) {
            if let Some(snapshot) = seat.snapshot.take() {
                self.restore_snapshot(svc, snapshot);
            }
            if let Some(finish) = &self.config.finish {
                if let Err(err) = svc.host.teleport(player, finish) {
                    warn!(arena = %self.config.key, %player, error = %err, "could not send player to finish");
                }
            }
            self.departed.push(player);
            svc.observer.player_left(&self.config.key, player);
        }
        self.clear_round();
        svc.world.regenerate(&self.config.key, &self.config.anchor);
        self.set_stage(svc, ArenaStage::Waiting);
    }

    // -- Internals ----------------------------------------------------------

    fn remove_player(&mut self, svc: &Services, player: PlayerId) {
        let Some(mut seat) = self.players.remove(&player) else {
            return;
        };
        match self.stage {
            ArenaStage::Waiting | ArenaStage::Countdown => {
                self.teams.remove(player);
            }
            ArenaStage::Active => {
                self.record_elimination(svc, player, None);
            }
            ArenaStage::Ending => {}
        }
        self.presence.remove(player);
        if let Some(snapshot) = seat.snapshot.take() {
            self.restore_snapshot(svc, snapshot);
        }
        self.departed.push(player);

        info!(arena = %self.config.key, %player, players = self.players.len(), "player left");
        svc.observer.player_left(&self.config.key, player);
    }

    /// Restores every seated player without touching the stage.
    fn evacuate(&mut self, svc: &Services) {
        for (player, mut seat) in mem::take(&mut self.players) {
            if let Some(snapshot) = seat.snapshot.take() {
                self.restore_snapshot(svc, snapshot);
            }
            self.departed.push(player);
            svc.observer.player_left(&self.config.key, player);
        }
        self.clear_round();
    }

    fn clear_round(&mut self) {
        self.presence.clear();
        self.teams.clear();
        if let Err(source) = self.variant.guarded("reset", |p| {
            p.reset();
            Ok(())
        }) {
            self.log_variant_failure(source);
        }
        self.countdown_remaining = 0;
        self.round_elapsed = 0;
        self.ending_remaining = 0;
        self.winner = None;
    }

    fn record_elimination(&mut self, svc: &Services, player: PlayerId, by: Option<PlayerId>) {
        if self.teams.eliminate(player).is_none() {
            return;
        }
        svc.stats.record(player, PlayerStats::death());
        if let Some(killer) = by.filter(|k| *k != player) {
            svc.stats.record(killer, PlayerStats::elimination());
        }
        info!(
            arena = %self.config.key,
            %player,
            by = ?by,
            alive_teams = self.teams.alive_team_count(),
            "player eliminated"
        );
        svc.observer.player_eliminated(&self.config.key, player, by);
    }

    fn apply_effects(&mut self, svc: &Services, effects: Effects) {
        for (player, by) in effects.eliminations {
            self.record_elimination(svc, player, by);
        }
        for (player, delta) in effects.credits {
            svc.stats.record(player, delta);
        }
    }

    /// Replays a snapshot. One that can't reach its player is kept for the
    /// registry, which replays it when the player comes back.
    fn restore_snapshot(&mut self, svc: &Services, snapshot: SessionSnapshot) {
        let player = snapshot.player();
        let outcome = snapshot.restore(svc.host.as_ref(), &self.rules.health);
        if let RestoreOutcome::Failed { restore, snapshot, .. } = outcome {
            let err = ArenaError::SnapshotRestoreFailure {
                key: self.config.key.clone(),
                source: restore,
            };
            error!(arena = %self.config.key, %player, error = %err, "restore deferred until player returns");
            self.unrestored.push(*snapshot);
        }
    }
}
