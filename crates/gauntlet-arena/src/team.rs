//! Team rosters for one arena.
//!
//! Every participant belongs to exactly one team. A free-for-all arena
//! gives each player a team of their own ([`TeamId::Solo`]); a team arena
//! has one roster per enabled color, created empty when the arena is.
//!
//! Each team keeps two lists:
//!
//! - **members**: everyone placed on the team this round. Fixed once the
//!   round starts, so round-end statistics still reach players who were
//!   knocked out or left.
//! - **alive**: members still competing. Always a subset of members.

use std::collections::BTreeSet;
use std::fmt;

use gauntlet_protocol::{ArenaKind, PlayerId, TeamColor};
use serde::{Deserialize, Serialize};

/// Identifies a team within an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamId {
    /// A colored team in a team arena.
    Color(TeamColor),
    /// A single player's team in a free-for-all arena.
    Solo(PlayerId),
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color(color) => write!(f, "{color}"),
            Self::Solo(player) => write!(f, "solo-{player}"),
        }
    }
}

/// One team's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    id: TeamId,
    capacity: usize,
    /// In placement order.
    members: Vec<PlayerId>,
    alive: BTreeSet<PlayerId>,
}

impl Team {
    fn new(id: TeamId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            members: Vec::new(),
            alive: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> TeamId {
        self.id
    }

    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    pub fn alive(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.alive.iter().copied()
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.alive.contains(&player)
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    /// A team with nobody left alive is out of the round. An empty team
    /// counts as eliminated.
    pub fn is_eliminated(&self) -> bool {
        self.alive.is_empty()
    }
}

/// All team rosters for one arena.
#[derive(Debug, Clone)]
pub struct TeamPool {
    kind: ArenaKind,
    colors: Vec<TeamColor>,
    capacity: usize,
    teams: Vec<Team>,
    frozen: bool,
}

impl TeamPool {
    /// Creates the rosters for an arena. Team arenas get one empty roster
    /// per color; free-for-all arenas start with none.
    pub fn new(kind: ArenaKind, colors: &[TeamColor], capacity: usize) -> Self {
        let mut colors = colors.to_vec();
        colors.sort();
        colors.dedup();
        let mut pool = Self {
            kind,
            colors,
            capacity: capacity.max(1),
            teams: Vec::new(),
            frozen: false,
        };
        pool.clear();
        pool
    }

    pub fn kind(&self) -> ArenaKind {
        self.kind
    }

    /// Returns `true` once the round has started.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns `true` if [`place`](Self::place) would succeed.
    pub fn has_room(&self) -> bool {
        if self.frozen {
            return false;
        }
        match self.kind {
            ArenaKind::FreeForAll => true,
            ArenaKind::Teams => self.teams.iter().any(|t| !t.is_full()),
        }
    }

    /// Puts a player on a team and returns it.
    ///
    /// Team arenas use the open team with the fewest members; ties go to
    /// the color that comes first in [`TeamColor::ALL`]. Returns `None` if
    /// every team is full, the player is already placed, or the round has
    /// started.
    pub fn place(&mut self, player: PlayerId) -> Option<TeamId> {
        if self.frozen || self.team_of(player).is_some() {
            return None;
        }
        let team = match self.kind {
            ArenaKind::FreeForAll => {
                self.teams.push(Team::new(TeamId::Solo(player), 1));
                self.teams.last_mut()?
            }
            ArenaKind::Teams => self
                .teams
                .iter_mut()
                .filter(|t| !t.is_full())
                .min_by_key(|t| (t.members.len(), t.id))?,
        };
        team.members.push(player);
        team.alive.insert(player);
        Some(team.id)
    }

    /// Takes a player off their team entirely. Only possible before the
    /// round starts; afterwards use [`eliminate`](Self::eliminate).
    pub fn remove(&mut self, player: PlayerId) -> Option<TeamId> {
        if self.frozen {
            return None;
        }
        let index = self.teams.iter().position(|t| t.is_member(player))?;
        let team = &mut self.teams[index];
        let id = team.id;
        team.members.retain(|p| *p != player);
        team.alive.remove(&player);
        if matches!(id, TeamId::Solo(_)) {
            self.teams.remove(index);
        }
        Some(id)
    }

    /// Marks a player as out of the round. Their membership is kept.
    /// Returns the team if the player was alive.
    pub fn eliminate(&mut self, player: PlayerId) -> Option<TeamId> {
        let team = self.teams.iter_mut().find(|t| t.alive.contains(&player))?;
        team.alive.remove(&player);
        Some(team.id)
    }

    /// Locks membership for the round and marks every member alive.
    pub fn freeze(&mut self) {
        for team in &mut self.teams {
            team.alive = team.members.iter().copied().collect();
        }
        self.frozen = true;
    }

    /// Empties every roster and unlocks membership.
    pub fn clear(&mut self) {
        self.teams = match self.kind {
            ArenaKind::FreeForAll => Vec::new(),
            ArenaKind::Teams => self
                .colors
                .iter()
                .map(|c| Team::new(TeamId::Color(*c), self.capacity))
                .collect(),
        };
        self.frozen = false;
    }

    pub fn team_of(&self, player: PlayerId) -> Option<TeamId> {
        self.teams.iter().find(|t| t.is_member(player)).map(|t| t.id)
    }

    pub fn get(&self, id: &TeamId) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == *id)
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Returns `true` if the team exists and has no open slot.
    pub fn is_team_full(&self, id: &TeamId) -> bool {
        self.get(id).is_some_and(Team::is_full)
    }

    pub fn is_alive(&self, player: PlayerId) -> bool {
        self.teams.iter().any(|t| t.is_alive(player))
    }

    /// Teams with at least one member still competing.
    pub fn alive_teams(&self) -> impl Iterator<Item = &Team> + '_ {
        self.teams.iter().filter(|t| !t.is_eliminated())
    }

    pub fn alive_team_count(&self) -> usize {
        self.alive_teams().count()
    }

    /// The only team left alive, if exactly one is.
    pub fn last_team_standing(&self) -> Option<TeamId> {
        let mut alive = self.alive_teams();
        let first = alive.next()?;
        alive.next().is_none().then_some(first.id)
    }

    pub fn member_count(&self) -> usize {
        self.teams.iter().map(|t| t.members.len()).sum()
    }

    pub fn alive_count(&self) -> usize {
        self.teams.iter().map(Team::alive_count).sum()
    }

    /// Every member of every team, in team order.
    pub fn members(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.teams.iter().flat_map(|t| t.members.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn red_blue(capacity: usize) -> TeamPool {
        TeamPool::new(ArenaKind::Teams, &[TeamColor::Blue, TeamColor::Red], capacity)
    }

    #[test]
    fn test_team_arena_starts_with_empty_rosters() {
        let pool = red_blue(2);
        assert_eq!(pool.teams().len(), 2);
        assert_eq!(pool.member_count(), 0);
        assert_eq!(pool.alive_team_count(), 0);
    }

    #[test]
    fn test_place_balances_by_member_count() {
        let mut pool = red_blue(2);
        assert_eq!(pool.place(pid(1)), Some(TeamId::Color(TeamColor::Red)));
        assert_eq!(pool.place(pid(2)), Some(TeamId::Color(TeamColor::Blue)));
        assert_eq!(pool.place(pid(3)), Some(TeamId::Color(TeamColor::Red)));
        assert_eq!(pool.place(pid(4)), Some(TeamId::Color(TeamColor::Blue)));
    }

    #[test]
    fn test_place_when_all_full_returns_none() {
        let mut pool = red_blue(1);
        pool.place(pid(1)).unwrap();
        pool.place(pid(2)).unwrap();

        assert!(!pool.has_room());
        assert_eq!(pool.place(pid(3)), None);
        assert!(pool.is_team_full(&TeamId::Color(TeamColor::Red)));
    }

    #[test]
    fn test_place_fills_gap_left_by_removal() {
        let mut pool = red_blue(2);
        for p in 1..=3 {
            pool.place(pid(p)).unwrap();
        }
        // Red: 1, 3. Blue: 2.
        pool.remove(pid(1));
        // Both teams now have one member; red wins the tie.
        assert_eq!(pool.place(pid(4)), Some(TeamId::Color(TeamColor::Red)));
    }

    #[test]
    fn test_place_twice_returns_none() {
        let mut pool = red_blue(2);
        pool.place(pid(1)).unwrap();
        assert_eq!(pool.place(pid(1)), None);
    }

    #[test]
    fn test_free_for_all_gives_each_player_a_solo_team() {
        let mut pool = TeamPool::new(ArenaKind::FreeForAll, &[], 1);
        assert_eq!(pool.place(pid(1)), Some(TeamId::Solo(pid(1))));
        assert_eq!(pool.place(pid(2)), Some(TeamId::Solo(pid(2))));
        assert_eq!(pool.teams().len(), 2);

        pool.remove(pid(1));
        assert_eq!(pool.teams().len(), 1);
    }

    #[test]
    fn test_freeze_blocks_placement_and_removal() {
        let mut pool = red_blue(2);
        pool.place(pid(1)).unwrap();
        pool.freeze();

        assert_eq!(pool.place(pid(2)), None);
        assert_eq!(pool.remove(pid(1)), None);
        assert_eq!(pool.team_of(pid(1)), Some(TeamId::Color(TeamColor::Red)));
    }

    #[test]
    fn test_eliminate_keeps_membership() {
        let mut pool = red_blue(2);
        pool.place(pid(1)).unwrap();
        pool.place(pid(2)).unwrap();
        pool.freeze();

        assert_eq!(pool.eliminate(pid(1)), Some(TeamId::Color(TeamColor::Red)));
        assert_eq!(pool.eliminate(pid(1)), None, "already out");

        let red = pool.get(&TeamId::Color(TeamColor::Red)).unwrap();
        assert!(red.is_member(pid(1)));
        assert!(red.is_eliminated());
        assert_eq!(pool.last_team_standing(), Some(TeamId::Color(TeamColor::Blue)));
    }

    #[test]
    fn test_alive_is_subset_of_members() {
        let mut pool = red_blue(3);
        for p in 1..=5 {
            pool.place(pid(p)).unwrap();
        }
        pool.freeze();
        pool.eliminate(pid(2));
        pool.eliminate(pid(3));

        for team in pool.teams() {
            assert!(team.alive().all(|p| team.is_member(p)));
        }
        assert_eq!(pool.member_count(), 5);
        assert_eq!(pool.alive_count(), 3);
    }

    #[test]
    fn test_clear_resets_rosters_and_unfreezes() {
        let mut pool = red_blue(2);
        pool.place(pid(1)).unwrap();
        pool.freeze();

        pool.clear();

        assert!(!pool.is_frozen());
        assert_eq!(pool.member_count(), 0);
        assert_eq!(pool.teams().len(), 2);
    }

    #[test]
    fn test_last_team_standing_none_when_two_alive() {
        let mut pool = TeamPool::new(ArenaKind::FreeForAll, &[], 1);
        pool.place(pid(1)).unwrap();
        pool.place(pid(2)).unwrap();
        pool.freeze();
        assert_eq!(pool.last_team_standing(), None);
    }

    #[test]
    fn test_team_id_display() {
        assert_eq!(TeamId::Color(TeamColor::Red).to_string(), "red");
        assert_eq!(TeamId::Solo(pid(7)).to_string(), "solo-P-7");
    }
}
