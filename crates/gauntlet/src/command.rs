//! The event queue between producers and the heartbeat.
//!
//! Producers (network handlers, command executors, host callbacks) never
//! touch arena state. They push a [`Command`] onto an unbounded MPSC queue
//! and get a [`Pending`] reply back. The heartbeat drains the queue in FIFO
//! order before it ticks any arena, so a join enqueued before a countdown
//! expires is always applied first.
//!
//! ```text
//! producer ──send──→ [ Command | Command | ... ] ──try_recv──→ heartbeat
//!    ▲                                                            │
//!    └──────────────────── oneshot reply ─────────────────────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use gauntlet_arena::{ArenaConfig, ArenaError, ArenaStatus, ModeEvent, TeamId, Variant};
use gauntlet_protocol::{ArenaKey, PlayerId};
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<Result<T, ArenaError>>;

/// A request for the heartbeat to apply.
pub(crate) enum Command {
    Join {
        key: ArenaKey,
        player: PlayerId,
        reply: Reply<TeamId>,
    },
    Leave {
        player: PlayerId,
        reply: Reply<ArenaKey>,
    },
    Disconnect {
        player: PlayerId,
        reply: Reply<()>,
    },
    Reconnect {
        player: PlayerId,
        reply: Reply<()>,
    },
    /// Fire-and-forget; events for unknown arenas are logged and dropped.
    ModeEvent { key: ArenaKey, event: ModeEvent },
    CreateArena {
        config: ArenaConfig,
        /// Overrides the mode the config names.
        variant: Option<Variant>,
        reply: Reply<ArenaStatus>,
    },
    DeleteArena {
        key: ArenaKey,
        reply: Reply<ArenaConfig>,
    },
    ForceStart {
        key: ArenaKey,
        reply: Reply<()>,
    },
    ForceEnd {
        key: ArenaKey,
        reply: Reply<()>,
    },
}

impl Command {
    /// Short label for logs.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Disconnect { .. } => "disconnect",
            Self::Reconnect { .. } => "reconnect",
            Self::ModeEvent { .. } => "mode_event",
            Self::CreateArena { .. } => "create_arena",
            Self::DeleteArena { .. } => "delete_arena",
            Self::ForceStart { .. } => "force_start",
            Self::ForceEnd { .. } => "force_end",
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.name()).finish()
    }
}

/// The reply to a queued command.
///
/// The command is already enqueued when this is returned, whether or not it
/// is ever awaited; dropping it just discards the answer. Resolves to
/// [`ArenaError::Unavailable`] if the engine stopped before answering.
#[must_use = "the command is queued either way; await this to see whether it succeeded"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T, ArenaError>>,
}

impl<T> Pending<T> {
    pub(crate) fn channel() -> (Reply<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, ArenaError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(ArenaError::Unavailable)))
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}
