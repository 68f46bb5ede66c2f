//! Presence tracking: who is attached to an arena, and who is inside their
//! reconnect grace window.
//!
//! The grace window is counted in heartbeat ticks rather than wall-clock
//! time. The tracker never runs a timer of its own; the arena calls
//! [`PresenceTracker::advance`] once per heartbeat, so expiry happens on
//! the same thread as every other state change.
//!
//! # Lifecycle
//!
//! ```text
//! attach() ──→ detach() ──→ reattach()
//!    │             │             │
//!    ▼             ▼             ▼
//! [Attached]  [Detached]    [Attached]
//!                  │
//!                  ▼ advance() past the grace window
//!              [Expired] ──→ remove()
//! ```
//!
//! Expiring and removing are separate steps so the arena can run its
//! force-leave path for an expired player before the record disappears.

use std::collections::BTreeMap;

use gauntlet_protocol::PlayerId;

use crate::SessionError;

/// Whether a seated player is currently connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Connected and playing.
    Attached,
    /// Dropped; `remaining_ticks` heartbeats left to come back.
    Detached { remaining_ticks: u64 },
    /// The grace window elapsed. Waiting for the arena to remove them.
    Expired,
}

/// Presence records for the players seated in one arena.
///
/// Not thread-safe on its own and doesn't need to be: it lives inside an
/// arena, which only the heartbeat mutates. A `BTreeMap` keeps expiry
/// order deterministic.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    entries: BTreeMap<PlayerId, Presence>,
    grace_ticks: u64,
    /// While set, grace windows don't count down.
    suspended: bool,
}

impl PresenceTracker {
    /// Creates an empty tracker. `grace_ticks` of zero means a detached
    /// player expires on the very next `advance`.
    pub fn new(grace_ticks: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            grace_ticks,
            suspended: false,
        }
    }

    pub fn grace_ticks(&self) -> u64 {
        self.grace_ticks
    }

    /// Records a newly seated player as attached.
    ///
    /// # Errors
    /// [`SessionError::AlreadyAttached`] if a record already exists.
    pub fn attach(&mut self, player: PlayerId) -> Result<(), SessionError> {
        if self.entries.contains_key(&player) {
            return Err(SessionError::AlreadyAttached(player));
        }
        self.entries.insert(player, Presence::Attached);
        Ok(())
    }

    /// Records `player` as attached whatever was there before, and returns
    /// the record it replaced.
    pub fn seat(&mut self, player: PlayerId) -> Option<Presence> {
        self.entries.insert(player, Presence::Attached)
    }

    /// Starts the grace window for an attached player.
    ///
    /// Detaching an already detached player leaves their remaining window
    /// unchanged.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no record
    /// - [`SessionError::Expired`]: the window already ran out
    pub fn detach(&mut self, player: PlayerId) -> Result<(), SessionError> {
        let entry = self
            .entries
            .get_mut(&player)
            .ok_or(SessionError::NotFound(player))?;
        match entry {
            Presence::Attached => {
                *entry = Presence::Detached {
                    remaining_ticks: self.grace_ticks,
                };
                tracing::debug!(%player, grace_ticks = self.grace_ticks, "grace window started");
                Ok(())
            }
            Presence::Detached { .. } => Ok(()),
            Presence::Expired => Err(SessionError::Expired(player)),
        }
    }

    /// Ends the grace window: the player is attached again.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no record
    /// - [`SessionError::AlreadyAttached`]: the player never detached
    /// - [`SessionError::Expired`]: too late
    pub fn reattach(&mut self, player: PlayerId) -> Result<(), SessionError> {
        let entry = self
            .entries
            .get_mut(&player)
            .ok_or(SessionError::NotFound(player))?;
        match entry {
            Presence::Detached { .. } => {
                *entry = Presence::Attached;
                Ok(())
            }
            Presence::Attached => Err(SessionError::AlreadyAttached(player)),
            Presence::Expired => Err(SessionError::Expired(player)),
        }
    }

    /// Counts `elapsed` ticks off every grace window and returns the
    /// players whose window ran out during this call, in id order.
    ///
    /// A window of `n` ticks expires once `n` ticks have been counted; a
    /// window of zero expires on the first call regardless of `elapsed`.
    pub fn advance(&mut self, elapsed: u64) -> Vec<PlayerId> {
        let mut expired = Vec::new();
        if self.suspended {
            return expired;
        }
        for (player, presence) in self.entries.iter_mut() {
            if let Presence::Detached { remaining_ticks } = presence {
                *remaining_ticks = remaining_ticks.saturating_sub(elapsed);
                if *remaining_ticks == 0 {
                    *presence = Presence::Expired;
                    expired.push(*player);
                    tracing::info!(%player, "grace window expired");
                }
            }
        }
        expired
    }

    /// Forgets a player entirely.
    pub fn remove(&mut self, player: PlayerId) -> Option<Presence> {
        self.entries.remove(&player)
    }

    pub fn get(&self, player: PlayerId) -> Option<Presence> {
        self.entries.get(&player).copied()
    }

    pub fn is_detached(&self, player: PlayerId) -> bool {
        matches!(self.get(player), Some(Presence::Detached { .. }))
    }

    /// Number of players currently attached.
    pub fn attached_count(&self) -> usize {
        self.entries
            .values()
            .filter(|p| matches!(p, Presence::Attached))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stops every grace window where it is. Detached players stay
    /// detached and can still reattach, but nobody expires until
    /// [`clear`](Self::clear).
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Drops every record and resumes counting. Used when the arena resets.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.suspended = false;
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn tracker_with(grace: u64, players: &[u64]) -> PresenceTracker {
        let mut t = PresenceTracker::new(grace);
        for p in players {
            t.attach(pid(*p)).unwrap();
        }
        t
    }

    #[test]
    fn test_attach_twice_returns_already_attached() {
        let mut t = tracker_with(10, &[1]);
        assert_eq!(t.attach(pid(1)), Err(SessionError::AlreadyAttached(pid(1))));
    }

    #[test]
    fn test_detach_unknown_player_returns_not_found() {
        let mut t = PresenceTracker::new(10);
        assert_eq!(t.detach(pid(9)), Err(SessionError::NotFound(pid(9))));
    }

    #[test]
    fn test_detach_starts_full_grace_window() {
        let mut t = tracker_with(40, &[1]);
        t.detach(pid(1)).unwrap();
        assert_eq!(t.get(pid(1)), Some(Presence::Detached { remaining_ticks: 40 }));
        assert!(t.is_detached(pid(1)));
        assert_eq!(t.attached_count(), 0);
    }

    #[test]
    fn test_detach_twice_keeps_remaining_window() {
        let mut t = tracker_with(10, &[1]);
        t.detach(pid(1)).unwrap();
        t.advance(4);
        t.detach(pid(1)).unwrap();
        assert_eq!(t.get(pid(1)), Some(Presence::Detached { remaining_ticks: 6 }));
    }

    #[test]
    fn test_reattach_within_window_restores_attached() {
        let mut t = tracker_with(10, &[1]);
        t.detach(pid(1)).unwrap();
        t.advance(9);

        t.reattach(pid(1)).unwrap();

        assert_eq!(t.get(pid(1)), Some(Presence::Attached));
    }

    #[test]
    fn test_reattach_attached_player_returns_error() {
        let mut t = tracker_with(10, &[1]);
        assert_eq!(t.reattach(pid(1)), Err(SessionError::AlreadyAttached(pid(1))));
    }

    #[test]
    fn test_advance_expires_exactly_at_window_end() {
        let mut t = tracker_with(3, &[1]);
        t.detach(pid(1)).unwrap();

        assert!(t.advance(2).is_empty());
        assert_eq!(t.advance(1), vec![pid(1)]);
        assert_eq!(t.get(pid(1)), Some(Presence::Expired));
        assert_eq!(t.reattach(pid(1)), Err(SessionError::Expired(pid(1))));
    }

    #[test]
    fn test_advance_zero_elapsed_changes_nothing() {
        let mut t = tracker_with(3, &[1]);
        t.detach(pid(1)).unwrap();

        assert!(t.advance(0).is_empty());
        assert_eq!(t.get(pid(1)), Some(Presence::Detached { remaining_ticks: 3 }));
    }

    #[test]
    fn test_advance_zero_grace_expires_immediately() {
        let mut t = tracker_with(0, &[1]);
        t.detach(pid(1)).unwrap();
        assert_eq!(t.advance(0), vec![pid(1)]);
    }

    #[test]
    fn test_advance_burst_larger_than_window_expires_once() {
        let mut t = tracker_with(2, &[1, 2]);
        t.detach(pid(2)).unwrap();
        t.detach(pid(1)).unwrap();

        assert_eq!(t.advance(50), vec![pid(1), pid(2)]);
        assert!(t.advance(50).is_empty(), "expired players are reported once");
    }

    #[test]
    fn test_advance_ignores_attached_players() {
        let mut t = tracker_with(1, &[1, 2]);
        t.detach(pid(1)).unwrap();

        assert_eq!(t.advance(1), vec![pid(1)]);
        assert_eq!(t.get(pid(2)), Some(Presence::Attached));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut t = tracker_with(1, &[1, 2]);
        assert_eq!(t.remove(pid(1)), Some(Presence::Attached));
        assert_eq!(t.len(), 1);
        t.clear();
        assert!(t.is_empty());
    }

    #[test]
    fn test_seat_replaces_stale_record() {
        let mut t = tracker_with(1, &[1]);
        t.detach(pid(1)).unwrap();
        t.advance(1);

        assert_eq!(t.seat(pid(1)), Some(Presence::Expired));
        assert_eq!(t.get(pid(1)), Some(Presence::Attached));
        assert_eq!(t.seat(pid(2)), None);
    }

    #[test]
    fn test_suspend_stops_expiry_until_clear() {
        let mut t = tracker_with(2, &[1, 2]);
        t.detach(pid(1)).unwrap();
        t.suspend();

        assert!(t.advance(10).is_empty());
        assert_eq!(t.get(pid(1)), Some(Presence::Detached { remaining_ticks: 2 }));
        t.reattach(pid(1)).unwrap();

        t.clear();
        assert!(!t.is_suspended());
        t.attach(pid(3)).unwrap();
        t.detach(pid(3)).unwrap();
        assert_eq!(t.advance(2), vec![pid(3)]);
    }
}
