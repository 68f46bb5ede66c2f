//! Block decay: the floor disappears under players' feet.
//!
//! Every block a competitor steps on is queued for removal `decay_ticks`
//! later. Since every block uses the same delay, the queue is already
//! ordered by due time and a tick only has to pop from the front.

use std::collections::{HashSet, VecDeque};

use gauntlet_protocol::{BlockPos, PlayerId};

use super::{ModeEvent, ModePolicy, VariantContext, VariantError};
use crate::PlayerStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decay {
    pos: BlockPos,
    due: u64,
    by: PlayerId,
}

#[derive(Debug, Clone, Default)]
pub struct BlockDecay {
    decay_ticks: u64,
    /// Ticks since the round started.
    clock: u64,
    queue: VecDeque<Decay>,
    pending: HashSet<BlockPos>,
}

impl BlockDecay {
    pub fn new(decay_ticks: u64) -> Self {
        Self {
            decay_ticks,
            ..Self::default()
        }
    }

    pub fn decay_ticks(&self) -> u64 {
        self.decay_ticks
    }

    /// Blocks waiting to disappear.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl ModePolicy for BlockDecay {
    fn name(&self) -> &str {
        "block_decay"
    }

    fn on_event(
        &mut self,
        ctx: &mut VariantContext<'_>,
        event: &ModeEvent,
    ) -> Result<(), VariantError> {
        if let ModeEvent::BlockStepped { player, block } = event {
            // Stepping on a block that is already decaying changes nothing.
            if ctx.is_alive(*player) && self.pending.insert(*block) {
                self.queue.push_back(Decay {
                    pos: *block,
                    due: self.clock + self.decay_ticks,
                    by: *player,
                });
            }
            return Ok(());
        }
        ctx.apply_standard_event(event);
        Ok(())
    }

    fn on_tick(&mut self, ctx: &mut VariantContext<'_>, elapsed: u64) -> Result<(), VariantError> {
        self.clock += elapsed;
        while let Some(next) = self.queue.front().copied() {
            if next.due > self.clock {
                break;
            }
            self.queue.pop_front();
            self.pending.remove(&next.pos);
            ctx.world().remove_block(ctx.arena(), next.pos);
            ctx.credit(
                next.by,
                PlayerStats {
                    blocks_broken: 1,
                    ..PlayerStats::default()
                },
            );
            tracing::trace!(arena = %ctx.arena(), block = %next.pos, "block decayed");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.clock = 0;
        self.queue.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{ArenaWorld, TeamPool};
    use gauntlet_protocol::{ArenaKey, ArenaKind, Location};

    #[derive(Default)]
    struct RecordingWorld {
        removed: Mutex<Vec<BlockPos>>,
    }

    impl ArenaWorld for RecordingWorld {
        fn remove_block(&self, _arena: &ArenaKey, pos: BlockPos) {
            self.removed.lock().unwrap().push(pos);
        }

        fn regenerate(&self, _arena: &ArenaKey, _anchor: &Location) {}
    }

    fn pool() -> TeamPool {
        let mut pool = TeamPool::new(ArenaKind::FreeForAll, &[], 1);
        pool.place(PlayerId(1));
        pool.place(PlayerId(2));
        pool.freeze();
        pool
    }

    fn block(x: i32) -> BlockPos {
        BlockPos { x, y: 64, z: 0 }
    }

    fn step(mode: &mut BlockDecay, ctx: &mut VariantContext<'_>, player: u64, x: i32) {
        mode.on_event(ctx, &ModeEvent::BlockStepped { player: PlayerId(player), block: block(x) })
            .unwrap();
    }

    #[test]
    fn test_block_removed_after_decay_delay() {
        let pool = pool();
        let key = ArenaKey::new("a");
        let world = RecordingWorld::default();
        let mut mode = BlockDecay::new(3);
        let mut ctx = VariantContext::new(&key, &pool, &world, None);

        step(&mut mode, &mut ctx, 1, 0);
        mode.on_tick(&mut ctx, 2).unwrap();
        assert!(world.removed.lock().unwrap().is_empty());

        mode.on_tick(&mut ctx, 1).unwrap();
        assert_eq!(*world.removed.lock().unwrap(), vec![block(0)]);
        assert_eq!(mode.pending(), 0);
    }

    #[test]
    fn test_stepping_twice_queues_block_once() {
        let pool = pool();
        let key = ArenaKey::new("a");
        let world = RecordingWorld::default();
        let mut mode = BlockDecay::new(1);
        let mut ctx = VariantContext::new(&key, &pool, &world, None);

        step(&mut mode, &mut ctx, 1, 0);
        step(&mut mode, &mut ctx, 2, 0);
        assert_eq!(mode.pending(), 1);

        mode.on_tick(&mut ctx, 1).unwrap();
        assert_eq!(world.removed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_decay_credits_the_player_who_stepped() {
        let pool = pool();
        let key = ArenaKey::new("a");
        let mut mode = BlockDecay::new(0);
        let mut ctx = VariantContext::new(&key, &pool, &crate::StaticWorld, None);

        step(&mut mode, &mut ctx, 2, 5);
        mode.on_tick(&mut ctx, 1).unwrap();

        let effects = ctx.into_effects();
        assert_eq!(effects.credits.len(), 1);
        assert_eq!(effects.credits[0].0, PlayerId(2));
        assert_eq!(effects.credits[0].1.blocks_broken, 1);
    }

    #[test]
    fn test_burst_tick_removes_everything_due() {
        let pool = pool();
        let key = ArenaKey::new("a");
        let world = RecordingWorld::default();
        let mut mode = BlockDecay::new(2);
        let mut ctx = VariantContext::new(&key, &pool, &world, None);

        step(&mut mode, &mut ctx, 1, 0);
        mode.on_tick(&mut ctx, 1).unwrap();
        step(&mut mode, &mut ctx, 1, 1);
        mode.on_tick(&mut ctx, 10).unwrap();

        assert_eq!(*world.removed.lock().unwrap(), vec![block(0), block(1)]);
    }

    #[test]
    fn test_reset_forgets_queue() {
        let pool = pool();
        let key = ArenaKey::new("a");
        let mut mode = BlockDecay::new(5);
        let mut ctx = VariantContext::new(&key, &pool, &crate::StaticWorld, None);
        step(&mut mode, &mut ctx, 1, 0);

        mode.reset();

        assert_eq!(mode.pending(), 0);
    }
}
