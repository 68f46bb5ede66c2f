//! Projectile duels: a player is out after taking enough hits.

use std::collections::HashMap;

use gauntlet_protocol::PlayerId;

use super::{ModeEvent, ModePolicy, VariantContext, VariantError};
use crate::{PlayerStats, TeamId, TeamPool};

/// Counts projectile hits. Friendly fire and hits involving players who
/// are already out don't count. If the round times out, the surviving team
/// that landed the most hits wins; a tie is a draw.
#[derive(Debug, Clone, Default)]
pub struct ProjectileDuel {
    hits_to_eliminate: u32,
    taken: HashMap<PlayerId, u32>,
    landed: HashMap<TeamId, u32>,
}

impl ProjectileDuel {
    pub fn new(hits_to_eliminate: u32) -> Self {
        Self {
            hits_to_eliminate: hits_to_eliminate.max(1),
            ..Self::default()
        }
    }

    pub fn hits_taken(&self, player: PlayerId) -> u32 {
        self.taken.get(&player).copied().unwrap_or(0)
    }

    pub fn hits_landed(&self, team: TeamId) -> u32 {
        self.landed.get(&team).copied().unwrap_or(0)
    }
}

impl ModePolicy for ProjectileDuel {
    fn name(&self) -> &str {
        "projectile"
    }

    fn on_event(
        &mut self,
        ctx: &mut VariantContext<'_>,
        event: &ModeEvent,
    ) -> Result<(), VariantError> {
        let ModeEvent::ProjectileHit { shooter, victim } = *event else {
            ctx.apply_standard_event(event);
            return Ok(());
        };
        if shooter == victim || !ctx.is_alive(shooter) || !ctx.is_alive(victim) {
            return Ok(());
        }
        let (Some(shooter_team), Some(victim_team)) =
            (ctx.teams().team_of(shooter), ctx.teams().team_of(victim))
        else {
            return Ok(());
        };
        if shooter_team == victim_team {
            return Ok(());
        }

        *self.landed.entry(shooter_team).or_default() += 1;
        ctx.credit(
            shooter,
            PlayerStats {
                projectile_hits: 1,
                ..PlayerStats::default()
            },
        );

        let taken = self.taken.entry(victim).or_default();
        *taken += 1;
        if *taken >= self.hits_to_eliminate {
            ctx.eliminate(victim, Some(shooter));
        }
        Ok(())
    }

    fn resolve_winner(
        &mut self,
        teams: &TeamPool,
        timed_out: bool,
    ) -> Result<Option<TeamId>, VariantError> {
        if let Some(team) = teams.last_team_standing() {
            return Ok(Some(team));
        }
        if !timed_out {
            return Ok(None);
        }

        let mut best: Option<(TeamId, u32)> = None;
        let mut tied = false;
        for team in teams.alive_teams() {
            let hits = self.hits_landed(team.id());
            match best {
                Some((_, top)) if hits < top => {}
                Some((_, top)) if hits == top => tied = true,
                _ => {
                    best = Some((team.id(), hits));
                    tied = false;
                }
            }
        }
        Ok(if tied { None } else { best.map(|(id, _)| id) })
    }

    fn reset(&mut self) {
        self.taken.clear();
        self.landed.clear();
    }
}
