//! The live player state that a snapshot captures.
//!
//! A [`PlayerState`] is everything the engine takes away from a player when
//! they enter an arena and must hand back when they leave.

use gauntlet_protocol::Location;
use serde::{Deserialize, Serialize};

/// Full hunger bar on the host platform.
pub const MAX_FOOD_LEVEL: u32 = 20;

/// One stack of items in an inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub material: String,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(material: impl Into<String>, amount: u32) -> Self {
        Self {
            material: material.into(),
            amount,
        }
    }
}

/// An active potion/status effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: String,
    pub amplifier: u8,
    pub duration_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// A player's complete live state on the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Main inventory slots; `None` is an empty slot.
    pub inventory: Vec<Option<ItemStack>>,
    /// Helmet, chestplate, leggings, boots.
    pub armor: [Option<ItemStack>; 4],
    pub effects: Vec<StatusEffect>,
    pub level: u32,
    /// Progress towards the next level, `0.0..1.0`.
    pub exp_progress: f32,
    pub location: Location,
    pub health: f64,
    pub food_level: u32,
    pub saturation: f32,
    pub game_mode: GameMode,
    pub allow_flight: bool,
    pub flying: bool,
}

impl PlayerState {
    /// The blank state a player competes in: empty inventory, no effects,
    /// full vitals, survival mode, no flight. Position is kept.
    pub fn competition(location: Location, max_health: f64) -> Self {
        Self {
            inventory: Vec::new(),
            armor: [None, None, None, None],
            effects: Vec::new(),
            level: 0,
            exp_progress: 0.0,
            location,
            health: max_health,
            food_level: MAX_FOOD_LEVEL,
            saturation: 5.0,
            game_mode: GameMode::Survival,
            allow_flight: false,
            flying: false,
        }
    }
}

/// Bounds a restored health value is clamped into.
///
/// Maximum health differs between host editions, so both ends are
/// configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for HealthBounds {
    fn default() -> Self {
        Self { min: 1.0, max: 20.0 }
    }
}

impl HealthBounds {
    /// Clamps `health` into the bounds. NaN restores to full health.
    pub fn clamp(&self, health: f64) -> f64 {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        if health.is_nan() {
            return hi;
        }
        health.clamp(lo, hi)
    }
}
