//! Heartbeat scheduler tests.
//!
//! Timed tests run with `start_paused = true`: the tokio clock stands still
//! until the runtime idles or a test calls `advance`.

use std::time::Duration;

use gauntlet_tick::{BudgetLevel, TickConfig, TickInfo, TickPolicy, TickScheduler};
use tokio::time::Instant;

const PERIOD: Duration = Duration::from_millis(50);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_config_default_runs_20hz_with_skip() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.tick_rate_hz, 20);
    assert_eq!(cfg.policy, TickPolicy::Skip);
    assert_eq!(cfg.tick_duration(), PERIOD);
}

#[test]
fn test_validated_rate_out_of_range_is_clamped() {
    assert_eq!(TickConfig::with_rate(0).validated().tick_rate_hz, 1);
    assert_eq!(TickConfig::with_rate(1000).validated().tick_rate_hz, 128);
    assert_eq!(TickConfig::with_rate(64).validated().tick_rate_hz, 64);
}

#[test]
fn test_validated_warn_above_critical_is_lowered() {
    let cfg = TickConfig {
        budget_warn_threshold: 0.9,
        budget_critical_threshold: 0.6,
        ..TickConfig::default()
    }
    .validated();
    assert_eq!(cfg.budget_warn_threshold, 0.6);
    assert_eq!(cfg.budget_critical_threshold, 0.6);
}

#[test]
fn test_secs_to_ticks_partial_tick_rounds_up() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.secs_to_ticks(30.0), 600);
    assert_eq!(cfg.secs_to_ticks(0.001), 1);
    assert_eq!(cfg.secs_to_ticks(0.0), 0);
    assert_eq!(cfg.secs_to_ticks(-1.0), 0);
    assert_eq!(cfg.secs_to_ticks(f64::NAN), 0);
}

#[test]
fn test_budget_level_thresholds() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.budget_level(0.5), BudgetLevel::Within);
    assert_eq!(cfg.budget_level(0.8), BudgetLevel::Warn);
    assert_eq!(cfg.budget_level(1.3), BudgetLevel::Critical);
}

#[test]
fn test_config_partial_json_fills_defaults() {
    let cfg: TickConfig = serde_json::from_str(r#"{"tick_rate_hz": 10, "policy": "drop"}"#).unwrap();
    assert_eq!(cfg.tick_rate_hz, 10);
    assert_eq!(cfg.policy, TickPolicy::Drop);
    assert_eq!(cfg.budget_warn_threshold, 0.8);
    assert!(cfg.metrics_enabled);

    let policy: TickPolicy = serde_json::from_str(r#"{"catch_up":{"max_catchup":2}}"#).unwrap();
    assert_eq!(policy, TickPolicy::CatchUp { max_catchup: 2 });
}

// =========================================================================
// TickPolicy::reschedule
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_reschedule_on_time_keeps_cadence() {
    let due = Instant::now();
    let plan = TickPolicy::Skip.reschedule(due, due + ms(3), PERIOD);
    assert!(!plan.overrun);
    assert_eq!(plan.next, due + PERIOD);
    assert_eq!(plan.skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reschedule_skip_folds_missed_periods_into_elapsed() {
    let due = Instant::now();
    let now = due + ms(130);
    let plan = TickPolicy::Skip.reschedule(due, now, PERIOD);
    assert!(plan.overrun);
    assert_eq!(plan.behind, 2);
    assert_eq!(plan.skipped, 2);
    assert_eq!(plan.next, now + PERIOD);
}

#[tokio::test(start_paused = true)]
async fn test_reschedule_catch_up_within_cap_fires_back_to_back() {
    let due = Instant::now();
    let plan = TickPolicy::CatchUp { max_catchup: 3 }.reschedule(due, due + ms(120), PERIOD);
    assert!(plan.overrun);
    assert_eq!(plan.skipped, 0);
    assert_eq!(plan.next, due + PERIOD);
}

#[tokio::test(start_paused = true)]
async fn test_reschedule_catch_up_beyond_cap_skips_the_rest() {
    let due = Instant::now();
    let now = due + ms(260);
    let plan = TickPolicy::CatchUp { max_catchup: 2 }.reschedule(due, now, PERIOD);
    assert_eq!(plan.behind, 5);
    assert_eq!(plan.skipped, 3);
    assert_eq!(plan.next, now + PERIOD);
}

#[tokio::test(start_paused = true)]
async fn test_reschedule_drop_never_skips() {
    let due = Instant::now();
    let plan = TickPolicy::Drop.reschedule(due, due + ms(400), PERIOD);
    assert!(plan.overrun);
    assert_eq!(plan.skipped, 0);
    assert_eq!(plan.next, due + PERIOD);
}

// =========================================================================
// TickScheduler
// =========================================================================

#[test]
fn test_tick_info_elapsed_includes_skipped() {
    let info = TickInfo {
        tick: 9,
        dt: PERIOD,
        overrun: true,
        ticks_skipped: 2,
    };
    assert_eq!(info.elapsed_ticks(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_numbers_heartbeats_from_one() {
    let mut s = TickScheduler::with_rate(20);
    assert_eq!(s.tick_count(), 0);

    for expected in 1..=4 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(info.elapsed_ticks(), 1);
        assert!(!info.overrun);
    }
    assert_eq!(s.metrics().heartbeats, 4);
    assert_eq!(s.metrics().overruns, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_after_stall_reports_elapsed() {
    let mut s = TickScheduler::with_rate(20);
    s.wait_for_tick().await;

    tokio::time::advance(ms(225)).await;
    let info = s.wait_for_tick().await;

    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 3);
    assert_eq!(info.elapsed_ticks(), 4);
    assert_eq!(s.metrics().overruns, 1);
    assert_eq!(s.metrics().skipped, 3);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_measures_work() {
    let mut s = TickScheduler::with_rate(20);
    s.record_tick_end();
    assert_eq!(s.metrics().peak_work, Duration::ZERO);

    s.wait_for_tick().await;
    // Work is timed with the wall clock, which start_paused doesn't freeze.
    std::thread::sleep(Duration::from_micros(100));
    s.record_tick_end();

    let m = s.metrics();
    assert!(m.peak_work > Duration::ZERO);
    assert!(m.mean_work > Duration::ZERO);
    assert!(m.last_utilization > 0.0 && m.last_utilization < 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_metrics_disabled_keeps_utilization_only() {
    let mut s = TickScheduler::new(TickConfig {
        metrics_enabled: false,
        ..TickConfig::default()
    });
    s.wait_for_tick().await;
    std::thread::sleep(Duration::from_micros(100));
    s.record_tick_end();

    assert_eq!(s.metrics().peak_work, Duration::ZERO);
    assert_eq!(s.metrics().mean_work, Duration::ZERO);
    assert!(s.metrics().last_utilization > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_in_select_stops_on_shutdown() {
    let mut s = TickScheduler::with_rate(20);
    let shutdown = tokio::time::sleep(ms(175));
    tokio::pin!(shutdown);

    let mut fired = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            info = s.wait_for_tick() => {
                fired += 1;
                assert_eq!(info.tick, fired);
                s.record_tick_end();
            }
        }
    }

    assert_eq!(fired, 3);
    assert_eq!(s.tick_count(), 3);
}
