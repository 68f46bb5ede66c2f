//! Arena configuration and the stage state machine.

use std::collections::HashSet;

use gauntlet_protocol::{ArenaKey, ArenaKind, Location, TeamColor};
use gauntlet_session::HealthBounds;
use gauntlet_tick::TickConfig;
use serde::{Deserialize, Serialize};

use crate::ArenaError;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Process-wide settings shared by every arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Heartbeat rate and overrun policy.
    pub tick: TickConfig,
    /// How long a disconnected player keeps their seat.
    pub reconnect_grace_secs: f64,
    /// How long a finished round lingers in ENDING before cleanup.
    /// Zero means cleanup runs on the next heartbeat.
    pub ending_secs: f64,
    /// Bounds restored health is clamped into.
    pub health: HealthBounds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            reconnect_grace_secs: 30.0,
            ending_secs: 0.0,
            health: HealthBounds::default(),
        }
    }
}

impl EngineConfig {
    /// Brings the heartbeat settings into range, so arenas convert seconds
    /// at the rate the scheduler actually runs.
    pub fn validated(mut self) -> Self {
        self.tick = self.tick.validated();
        self
    }
}

// ---------------------------------------------------------------------------
// VariantSpec
// ---------------------------------------------------------------------------

/// Which mode policy an arena runs, as written in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VariantSpec {
    /// Last team standing; eliminations from void falls or triggers.
    #[default]
    Elimination,
    /// Blocks vanish `decay_ticks` after a player steps on them.
    BlockDecay { decay_ticks: u64 },
    /// Players are knocked out after `hits_to_eliminate` projectile hits.
    Projectile { hits_to_eliminate: u32 },
    /// A mode registered with the engine under `name`.
    Custom { name: String },
}

// ---------------------------------------------------------------------------
// ArenaConfig
// ---------------------------------------------------------------------------

/// Configuration for one arena, as persisted in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub key: ArenaKey,
    pub display_name: String,

    /// Participants needed before the countdown starts.
    #[serde(default = "default_min_players")]
    pub min_players: usize,

    /// Hard cap on participants.
    #[serde(default = "default_max_players")]
    pub max_players: usize,

    #[serde(default)]
    pub kind: ArenaKind,

    /// Colors enabled for a team arena. Ignored for free-for-all.
    #[serde(default = "default_teams")]
    pub teams: Vec<TeamColor>,

    /// Members per team. Defaults to `max_players / teams`, rounded up.
    #[serde(default)]
    pub team_capacity: Option<usize>,

    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: f64,

    /// Countdown cap applied by a forced start.
    #[serde(default = "default_force_countdown_secs")]
    pub force_countdown_secs: f64,

    /// Round time limit. `None` means no limit.
    #[serde(default)]
    pub max_round_secs: Option<f64>,

    /// Where players are sent on join and where the world regenerates from.
    pub anchor: Location,

    /// Where players are sent once the round is cleaned up.
    #[serde(default)]
    pub finish: Option<Location>,

    /// Players moving below this height are eliminated.
    #[serde(default)]
    pub void_level: Option<f64>,

    #[serde(default)]
    pub variant: VariantSpec,
}

fn default_min_players() -> usize {
    2
}

fn default_max_players() -> usize {
    8
}

fn default_teams() -> Vec<TeamColor> {
    vec![TeamColor::Red, TeamColor::Blue]
}

fn default_countdown_secs() -> f64 {
    10.0
}

fn default_force_countdown_secs() -> f64 {
    3.0
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            key: ArenaKey::new("arena"),
            display_name: "Arena".into(),
            min_players: default_min_players(),
            max_players: default_max_players(),
            kind: ArenaKind::default(),
            teams: default_teams(),
            team_capacity: None,
            countdown_secs: default_countdown_secs(),
            force_countdown_secs: default_force_countdown_secs(),
            max_round_secs: None,
            anchor: Location::new("world", 0.0, 64.0, 0.0),
            finish: None,
            void_level: None,
            variant: VariantSpec::default(),
        }
    }
}

impl ArenaConfig {
    /// A config with defaults for everything but identity and anchor.
    pub fn new(key: impl Into<ArenaKey>, display_name: impl Into<String>, anchor: Location) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            anchor,
            ..Self::default()
        }
    }

    /// Members allowed per team.
    pub fn team_capacity(&self) -> usize {
        match self.kind {
            ArenaKind::FreeForAll => 1,
            ArenaKind::Teams => self
                .team_capacity
                .unwrap_or_else(|| self.max_players.div_ceil(self.teams.len().max(1))),
        }
    }

    /// Rejects configurations an arena could never run with.
    ///
    /// # Errors
    /// [`ArenaError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ArenaError> {
        let invalid = |msg: String| Err(ArenaError::InvalidConfig(msg));

        if self.key.is_empty() {
            return invalid("arena key must not be empty".into());
        }
        if self.min_players == 0 {
            return invalid(format!("{}: min_players must be at least 1", self.key));
        }
        if self.min_players > self.max_players {
            return invalid(format!(
                "{}: min_players ({}) exceeds max_players ({})",
                self.key, self.min_players, self.max_players
            ));
        }
        if !(self.countdown_secs >= 0.0) || !(self.force_countdown_secs >= 0.0) {
            return invalid(format!("{}: countdown must be non-negative", self.key));
        }
        if let Some(limit) = self.max_round_secs {
            if !(limit > 0.0) {
                return invalid(format!("{}: max_round_secs must be positive", self.key));
            }
        }
        if self.kind == ArenaKind::Teams {
            if self.teams.is_empty() {
                return invalid(format!("{}: a team arena needs at least one team", self.key));
            }
            let unique: HashSet<_> = self.teams.iter().collect();
            if unique.len() != self.teams.len() {
                return invalid(format!("{}: team colors must be unique", self.key));
            }
            let capacity = self.team_capacity();
            if capacity == 0 || capacity * self.teams.len() < self.min_players {
                return invalid(format!(
                    "{}: {} teams of {} cannot seat min_players ({})",
                    self.key,
                    self.teams.len(),
                    capacity,
                    self.min_players
                ));
            }
        }
        Ok(())
    }

    /// Resolves the time-based settings into heartbeat ticks.
    pub fn rules(&self, engine: &EngineConfig) -> RoundRules {
        let tick = engine.tick.clone().validated();
        RoundRules {
            ticks_per_second: tick.tick_rate_hz.max(1) as u64,
            countdown_ticks: tick.secs_to_ticks(self.countdown_secs),
            force_countdown_ticks: tick.secs_to_ticks(self.force_countdown_secs),
            max_round_ticks: self.max_round_secs.map(|s| tick.secs_to_ticks(s).max(1)),
            ending_ticks: tick.secs_to_ticks(engine.ending_secs).max(1),
            grace_ticks: tick.secs_to_ticks(engine.reconnect_grace_secs),
            health: engine.health,
        }
    }
}

/// An arena's timing settings, expressed in heartbeat ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundRules {
    pub ticks_per_second: u64,
    pub countdown_ticks: u64,
    pub force_countdown_ticks: u64,
    pub max_round_ticks: Option<u64>,
    /// At least 1: cleanup always happens on a later heartbeat than the
    /// round's end.
    pub ending_ticks: u64,
    pub grace_ticks: u64,
    pub health: HealthBounds,
}

// ---------------------------------------------------------------------------
// ArenaStage
// ---------------------------------------------------------------------------

/// The lifecycle stage of an arena.
///
/// ```text
///           ┌──────── below minimum ────────┐
///           ▼                               │
/// WAITING ──(minimum reached)──→ COUNTDOWN ─┘
///    ▲                               │
///    │                        (timer hits 0)
///    │                               ▼
///    └──(cleanup)── ENDING ←──(round over)── ACTIVE
/// ```
///
/// - **Waiting**: accepting players, not enough to start.
/// - **Countdown**: minimum reached, timer running; still accepting players.
/// - **Active**: round running, team composition frozen.
/// - **Ending**: round over, winner decided, waiting for cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArenaStage {
    Waiting,
    Countdown,
    Active,
    Ending,
}

impl ArenaStage {
    /// Returns `true` if the arena is accepting new players.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting | Self::Countdown)
    }

    /// Returns `true` while a round is being played.
    pub fn is_in_round(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Countdown)
                | (Self::Countdown, Self::Waiting)
                | (Self::Countdown, Self::Active)
                | (Self::Active, Self::Ending)
                | (Self::Ending, Self::Waiting)
        )
    }
}

impl std::fmt::Display for ArenaStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Countdown => write!(f, "COUNTDOWN"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Ending => write!(f, "ENDING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams_config() -> ArenaConfig {
        ArenaConfig {
            kind: ArenaKind::Teams,
            min_players: 2,
            max_players: 4,
            teams: vec![TeamColor::Red, TeamColor::Blue],
            ..ArenaConfig::default()
        }
    }

    #[test]
    fn test_stage_legal_edges() {
        use ArenaStage::*;
        assert!(Waiting.can_transition_to(Countdown));
        assert!(Countdown.can_transition_to(Waiting));
        assert!(Countdown.can_transition_to(Active));
        assert!(Active.can_transition_to(Ending));
        assert!(Ending.can_transition_to(Waiting));
    }

    #[test]
    fn test_stage_illegal_edges() {
        use ArenaStage::*;
        assert!(!Waiting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Waiting));
        assert!(!Ending.can_transition_to(Active));
        assert!(!Waiting.can_transition_to(Waiting));
    }

    #[test]
    fn test_stage_is_joinable() {
        assert!(ArenaStage::Waiting.is_joinable());
        assert!(ArenaStage::Countdown.is_joinable());
        assert!(!ArenaStage::Active.is_joinable());
        assert!(!ArenaStage::Ending.is_joinable());
    }

    #[test]
    fn test_stage_display_and_json() {
        assert_eq!(ArenaStage::Countdown.to_string(), "COUNTDOWN");
        assert_eq!(serde_json::to_string(&ArenaStage::Active).unwrap(), "\"ACTIVE\"");
    }

    #[test]
    fn test_team_capacity_defaults_to_even_split() {
        assert_eq!(teams_config().team_capacity(), 2);
        let odd = ArenaConfig { max_players: 5, ..teams_config() };
        assert_eq!(odd.team_capacity(), 3);
        assert_eq!(ArenaConfig::default().team_capacity(), 1);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(ArenaConfig::default().validate().is_ok());
        assert!(teams_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_min_above_max() {
        let cfg = ArenaConfig { min_players: 5, max_players: 4, ..ArenaConfig::default() };
        assert!(matches!(cfg.validate(), Err(ArenaError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_team_colors() {
        let cfg = ArenaConfig { teams: vec![TeamColor::Red, TeamColor::Red], ..teams_config() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_teams_too_small_for_minimum() {
        let cfg = ArenaConfig { team_capacity: Some(1), min_players: 3, ..teams_config() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_key() {
        let cfg = ArenaConfig { key: ArenaKey::new(" "), ..ArenaConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rules_convert_seconds_to_ticks() {
        let engine = EngineConfig::default(); // 20 Hz
        let cfg = ArenaConfig { max_round_secs: Some(60.0), ..ArenaConfig::default() };
        let rules = cfg.rules(&engine);
        assert_eq!(rules.countdown_ticks, 200);
        assert_eq!(rules.force_countdown_ticks, 60);
        assert_eq!(rules.max_round_ticks, Some(1200));
        assert_eq!(rules.ending_ticks, 1);
        assert_eq!(rules.grace_ticks, 600);
        assert_eq!(rules.ticks_per_second, 20);
    }

    #[test]
    fn test_rules_out_of_range_rate_uses_scheduler_rate() {
        let engine = EngineConfig {
            tick: TickConfig::with_rate(400),
            reconnect_grace_secs: 2.0,
            ..EngineConfig::default()
        };
        let rules = ArenaConfig::default().rules(&engine);
        assert_eq!(rules.ticks_per_second, u64::from(TickConfig::MAX_TICK_RATE_HZ));
        assert_eq!(rules.countdown_ticks, 1280);
        assert_eq!(rules.grace_ticks, 256);
        assert_eq!(engine.validated().tick.tick_rate_hz, 128);
    }

    #[test]
    fn test_config_json_uses_defaults() {
        let json = r#"{
            "key": "sky",
            "display_name": "Sky Ruins",
            "anchor": {"world": "sky", "x": 0.0, "y": 100.0, "z": 0.0},
            "variant": {"mode": "block_decay", "decay_ticks": 8}
        }"#;
        let cfg: ArenaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.min_players, 2);
        assert_eq!(cfg.max_players, 8);
        assert_eq!(cfg.kind, ArenaKind::FreeForAll);
        assert_eq!(cfg.variant, VariantSpec::BlockDecay { decay_ticks: 8 });
    }
}
