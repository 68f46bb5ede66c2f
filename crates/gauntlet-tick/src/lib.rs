//! Fixed-rate heartbeat scheduler for Gauntlet.
//!
//! One [`TickScheduler`] drives the whole process: every arena is advanced
//! from the same heartbeat. The scheduler only decides *when* a heartbeat
//! fires and how much game time it represents; draining the event queue
//! and ticking arenas is the engine's job.
//!
//! # Elapsed ticks
//!
//! Each [`TickInfo`] reports [`elapsed_ticks`](TickInfo::elapsed_ticks):
//! `1` in normal operation, more when the heartbeat woke up late and
//! skipped ticks. Arenas count their timers down by that amount and clamp
//! at zero, so a burst never jumps over a countdown boundary.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut shutdown => break,
//!         info = scheduler.wait_for_tick() => {
//!             engine.heartbeat(info.elapsed_ticks());
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a heartbeat fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Report the missed ticks as elapsed time and resume from now.
    #[default]
    Skip,
    /// Fire up to `max_catchup` extra heartbeats back to back.
    CatchUp {
        /// Cap on consecutive catch-up heartbeats.
        max_catchup: u32,
    },
    /// Keep the original cadence; the late heartbeat is not compensated.
    Drop,
}

/// Heartbeat settings. Every field has a default, so a partial JSON
/// object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Heartbeats per second, `1..=128`.
    pub tick_rate_hz: u32,
    pub policy: TickPolicy,
    /// Fraction of the period that heartbeat work may use before a warning.
    pub budget_warn_threshold: f64,
    pub budget_critical_threshold: f64,
    /// Track work-time averages and peaks.
    pub metrics_enabled: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            policy: TickPolicy::Skip,
            budget_warn_threshold: 0.8,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
        }
    }
}

impl TickConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Self::default()
        }
    }

    /// Brings every field into range: the rate into `1..=MAX_TICK_RATE_HZ`,
    /// both thresholds into `0.0..=1.0` with warn never above critical.
    pub fn validated(mut self) -> Self {
        let rate = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        if rate != self.tick_rate_hz {
            warn!(requested = self.tick_rate_hz, using = rate, "tick_rate_hz out of range");
            self.tick_rate_hz = rate;
        }
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        self.budget_warn_threshold = self
            .budget_warn_threshold
            .clamp(0.0, 1.0)
            .min(self.budget_critical_threshold);
        self
    }

    /// Length of one heartbeat period.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }

    /// Whole heartbeats covering `secs`, rounded up. Zero, negative and NaN
    /// durations give zero.
    pub fn secs_to_ticks(&self, secs: f64) -> u64 {
        if secs.is_nan() || secs <= 0.0 {
            return 0;
        }
        (secs * f64::from(self.tick_rate_hz.max(1))).ceil() as u64
    }
}

impl TickPolicy {
    /// Decides when the heartbeat after this one is due.
    ///
    /// `due` is when the heartbeat that just fired was scheduled and `now`
    /// is when it actually fired. Lateness within a tenth of a period is
    /// treated as jitter.
    pub fn reschedule(self, due: TokioInstant, now: TokioInstant, period: Duration) -> Reschedule {
        let late_by = now.saturating_duration_since(due);
        if late_by <= period / 10 {
            return Reschedule {
                next: due + period,
                late_by,
                overrun: false,
                behind: 0,
                skipped: 0,
            };
        }

        let behind = (late_by.as_nanos() / period.as_nanos().max(1)) as u64;
        let (next, skipped) = match self {
            TickPolicy::Skip => (now + period, behind),
            TickPolicy::CatchUp { max_catchup } => {
                let cap = u64::from(max_catchup);
                if behind <= cap {
                    (due + period, 0)
                } else {
                    (now + period, behind - cap)
                }
            }
            TickPolicy::Drop => (due + period, 0),
        };
        Reschedule {
            next,
            late_by,
            overrun: true,
            behind,
            skipped,
        }
    }
}

/// Result of [`TickPolicy::reschedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reschedule {
    pub next: TokioInstant,
    pub late_by: Duration,
    pub overrun: bool,
    /// Whole periods the heartbeat fell behind.
    pub behind: u64,
    /// Periods folded into this heartbeat's elapsed time instead of fired.
    pub skipped: u64,
}

/// How much of a heartbeat's period its work used, against the configured
/// thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetLevel {
    Within,
    Warn,
    Critical,
}

impl TickConfig {
    pub fn budget_level(&self, utilization: f64) -> BudgetLevel {
        if utilization >= self.budget_critical_threshold {
            BudgetLevel::Critical
        } else if utilization >= self.budget_warn_threshold {
            BudgetLevel::Warn
        } else {
            BudgetLevel::Within
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat info and metrics
// ---------------------------------------------------------------------------

/// A fired heartbeat, as returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Heartbeat number, starting at 1.
    pub tick: u64,
    pub dt: Duration,
    pub overrun: bool,
    pub ticks_skipped: u64,
}

impl TickInfo {
    /// Game time this heartbeat stands for.
    pub fn elapsed_ticks(&self) -> u64 {
        1 + self.ticks_skipped
    }
}

/// Counters kept by the scheduler. Work timings come from
/// [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub heartbeats: u64,
    pub overruns: u64,
    pub skipped: u64,
    /// Moving average of heartbeat work time.
    pub mean_work: Duration,
    pub peak_work: Duration,
    /// Work time of the last heartbeat over its period.
    pub last_utilization: f64,
}

impl TickMetrics {
    const SMOOTHING: f64 = 0.1;

    fn count(&mut self, plan: &Reschedule) {
        self.heartbeats += 1;
        self.skipped += plan.skipped;
        if plan.overrun {
            self.overruns += 1;
        }
    }

    fn observe_work(&mut self, work: Duration) {
        self.peak_work = self.peak_work.max(work);
        let mean = self.mean_work.as_secs_f64();
        self.mean_work = Duration::from_secs_f64(mean + (work.as_secs_f64() - mean) * Self::SMOOTHING);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fires heartbeats at a fixed rate.
pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    fired: u64,
    due: TokioInstant,
    work_started: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// The first heartbeat is due one period from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.tick_duration();
        debug!(
            rate_hz = config.tick_rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "heartbeat scheduler ready"
        );
        Self {
            due: TokioInstant::now() + period,
            config,
            period,
            fired: 0,
            work_started: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Sleeps until the next heartbeat is due.
    ///
    /// Cancel-safe: the schedule only moves after the sleep completes, so
    /// this can sit in a `tokio::select!` arm.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.due).await;

        let now = TokioInstant::now();
        let plan = self.config.policy.reschedule(self.due, now, self.period);
        self.fired += 1;
        self.work_started = Some(Instant::now());
        self.due = plan.next;
        self.metrics.count(&plan);

        if plan.behind > 0 || (plan.overrun && self.config.policy == TickPolicy::Drop) {
            warn!(
                tick = self.fired,
                late_ms = plan.late_by.as_secs_f64() * 1000.0,
                behind = plan.behind,
                skipped = plan.skipped,
                policy = ?self.config.policy,
                "heartbeat fired late"
            );
        }
        trace!(tick = self.fired, overrun = plan.overrun, "heartbeat");

        TickInfo {
            tick: self.fired,
            dt: self.period,
            overrun: plan.overrun,
            ticks_skipped: plan.skipped,
        }
    }

    /// Marks the current heartbeat's work as done. Logs when the work used
    /// more of the period than the thresholds allow. Does nothing if no
    /// heartbeat is in progress.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let work = started.elapsed();
        let utilization = work.as_secs_f64() / self.period.as_secs_f64();
        self.metrics.last_utilization = utilization;

        match self.config.budget_level(utilization) {
            BudgetLevel::Within => {}
            level => warn!(
                tick = self.fired,
                work_ms = work.as_secs_f64() * 1000.0,
                period_ms = self.period.as_secs_f64() * 1000.0,
                utilization = format!("{:.0}%", utilization * 100.0),
                critical = level == BudgetLevel::Critical,
                "heartbeat work over budget"
            ),
        }

        if self.config.metrics_enabled {
            self.metrics.observe_work(work);
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.fired
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.period
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }
}
