//! Fixed-timestep tick scheduler for Arena.
//!
//! Provides configurable tick rates (1–128 Hz) for per-room game loops
//! with budget monitoring, overrun policies, and pause/resume support.
//!
//! # Event-driven mode
//!
//! When `tick_rate_hz` is 0, the scheduler enters event-driven mode and
//! [`TickScheduler::wait_for_tick`] pends forever.
//!
//! # Integration
//!
//! The scheduler sits inside a room actor's `tokio::select!` loop. The
//! whole firing (dispatch, simulate, flush) runs between `wait_for_tick`
//! and `record_tick_end`, so its duration is what the budget measures:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut shutdown => break,
//!         info = scheduler.wait_for_tick() => {
//!             room.fire(&info).await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What the schedule does after a firing runs past its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TickPolicy {
    /// Keep the original cadence. Every scheduled firing still runs: a slow
    /// firing delays the next ones, which then fire back to back until the
    /// schedule is caught up. Nothing is skipped or coalesced.
    #[default]
    Fixed,
    /// Skip the missed firing(s) and resume the cadence from now.
    Skip,
    /// Run up to `max_catchup` missed firings back to back, skip the rest.
    CatchUp {
        /// Hard cap on consecutive catch-up firings.
        max_catchup: u32,
    },
}

/// Full configuration for the tick scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Tick rate in Hz. 0 = event-driven (tick never fires).
    pub tick_rate_hz: u32,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Budget warning threshold (0.0–1.0). Default: 0.80 (80%).
    /// A warning is emitted when a firing uses more than this fraction of
    /// the tick period without exceeding it.
    pub budget_warn_threshold: f64,
    /// Enable per-tick timing metrics.
    pub metrics_enabled: bool,
    /// Random jitter (0–max µs) added to the *first* tick to desynchronize
    /// rooms created at the same instant.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 0,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
            metrics_enabled: true,
            initial_jitter_us: 2_000, // 0–2 ms default jitter
        }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Create a config for a specific tick rate with sensible defaults.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of a single tick (`1000ms / rate`). `None` for event-driven mode.
    pub fn tick_duration(&self) -> Option<Duration> {
        if self.tick_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64))
        }
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a firing, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Fixed delta time for this tick (always `1 / tick_rate`).
    pub dt: Duration,
    /// How far past its deadline this firing started.
    pub late_by: Duration,
    /// Firings dropped before this one (only `Skip` / `CatchUp` drop any).
    pub ticks_skipped: u64,
}

impl TickInfo {
    /// `true` if the firing started more than 10% of a period late.
    pub fn is_late(&self) -> bool {
        self.late_by > self.dt / 10
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for the tick scheduler.
///
/// Timing values refer to firing durations reported via
/// [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    /// Total firings.
    pub total_ticks: u64,
    /// Firings whose duration exceeded the tick period.
    pub budget_exceeded: u64,
    /// Firings that started late.
    pub total_late: u64,
    /// Firings dropped by `Skip` / `CatchUp`.
    pub total_skipped: u64,
    /// Exponential moving average of firing duration (α = 0.1).
    pub avg_tick_time: Duration,
    /// Longest firing observed.
    pub max_tick_time: Duration,
    /// Last firing's budget utilization (0.0–∞). >1.0 means overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-timestep tick scheduler. One per room actor.
///
/// Uses the Tokio clock throughout so paused-time tests are deterministic.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Option<Duration>,
    tick_count: u64,
    /// When the next tick is due.
    next_tick: Option<Instant>,
    /// When the current firing started. Set by `wait_for_tick`, consumed
    /// by `record_tick_end`.
    tick_start: Option<Instant>,
    paused: bool,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Create a new scheduler from config.
    ///
    /// The first tick is due one period from now, plus optional jitter.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let next_tick = tick_duration.map(|d| {
            let jitter = if config.initial_jitter_us > 0 {
                let us = rand::rng().random_range(0..config.initial_jitter_us);
                Duration::from_micros(us)
            } else {
                Duration::ZERO
            };
            Instant::now() + d + jitter
        });

        if config.tick_rate_hz == 0 {
            debug!("tick scheduler created in event-driven mode (no tick loop)");
        } else {
            debug!(
                rate_hz = config.tick_rate_hz,
                budget_ms = ?tick_duration.map(|d| d.as_secs_f64() * 1000.0),
                policy = ?config.policy,
                "tick scheduler created"
            );
        }

        Self {
            config,
            tick_duration,
            tick_count: 0,
            next_tick,
            tick_start: None,
            paused: false,
            metrics: TickMetrics::default(),
        }
    }

    /// Create a scheduler for a specific tick rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Wait until the next tick is due. Returns [`TickInfo`] for the tick.
    ///
    /// In event-driven mode or when paused this future pends forever.
    /// Cancel safe: dropping it before it resolves leaves the schedule as is.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, tick_dur) = match (self.next_tick, self.tick_duration) {
            (Some(next), Some(dur)) if !self.paused => (next, dur),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let behind = (late_by.as_nanos() / tick_dur.as_nanos()) as u64;
        let mut ticks_skipped = 0u64;

        self.next_tick = Some(match self.config.policy {
            TickPolicy::Fixed => next + tick_dur,
            TickPolicy::Skip => {
                ticks_skipped = behind;
                if ticks_skipped > 0 {
                    warn!(
                        tick = self.tick_count,
                        skipped = ticks_skipped,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "tick late, skipping ahead"
                    );
                }
                now + tick_dur
            }
            TickPolicy::CatchUp { max_catchup } => {
                if behind <= max_catchup as u64 {
                    next + tick_dur
                } else {
                    ticks_skipped = behind - max_catchup as u64;
                    warn!(
                        tick = self.tick_count,
                        behind,
                        skipping = ticks_skipped,
                        "tick late, catch-up capped at {max_catchup}"
                    );
                    // Jump past the skipped deadlines, leaving `max_catchup`
                    // of them still due.
                    next + tick_dur * (ticks_skipped as u32 + 1)
                }
            }
        });

        let info = TickInfo {
            tick: self.tick_count,
            dt: tick_dur,
            late_by,
            ticks_skipped,
        };

        if info.is_late() {
            self.metrics.total_late += 1;
            debug!(
                tick = self.tick_count,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick fired late"
            );
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, "tick fired");
        info
    }

    /// Record that the current firing has finished.
    ///
    /// Returns the firing's duration, or `None` if no firing was in
    /// progress. A firing longer than the tick period is reported once as
    /// "tick budget exceeded".
    pub fn record_tick_end(&mut self) -> Option<Duration> {
        let start = self.tick_start.take()?;
        let elapsed = start.elapsed();

        if let Some(budget) = self.tick_duration {
            let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
            self.metrics.budget_utilization = utilization;

            if elapsed > budget {
                self.metrics.budget_exceeded += 1;
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = budget.as_secs_f64() * 1000.0,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "tick budget exceeded"
                );
            } else if utilization >= self.config.budget_warn_threshold {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = budget.as_secs_f64() * 1000.0,
                    utilization_pct = format!("{:.1}", utilization * 100.0),
                    "tick approaching budget limit"
                );
            }
        }

        if self.config.metrics_enabled {
            if elapsed > self.metrics.max_tick_time {
                self.metrics.max_tick_time = elapsed;
            }
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            let curr = elapsed.as_secs_f64();
            self.metrics.avg_tick_time =
                Duration::from_secs_f64(prev * (1.0 - alpha) + curr * alpha);
        }

        Some(elapsed)
    }

    /// Pause the tick loop. `wait_for_tick` will pend until [`resume`](Self::resume) is called.
    ///
    /// Safe to call multiple times (idempotent).
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "tick scheduler paused");
        }
    }

    /// Resume the tick loop after a pause.
    ///
    /// Resets the next deadline to `now + tick_duration` so the time spent
    /// paused does not turn into a burst of back-to-back firings.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            if let Some(dur) = self.tick_duration {
                self.next_tick = Some(Instant::now() + dur);
            }
            debug!(tick = self.tick_count, "tick scheduler resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether this scheduler is in event-driven mode (tick rate = 0).
    pub fn is_event_driven(&self) -> bool {
        self.tick_duration.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    /// The fixed tick duration, or `None` for event-driven mode.
    pub fn tick_duration(&self) -> Option<Duration> {
        self.tick_duration
    }
}
