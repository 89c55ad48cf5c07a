//! Scheduler engine: one daily trigger, one poller thread.
//!
//! The poller wakes on a fixed cadence, fires the trigger when it is due and
//! waits (bounded by the run ceiling) for the runtime to report back. The
//! trigger is the only state it shares with the rest of the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use daybreak_core::config::DaybreakConfig;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::{ConfigStore, keys};

use crate::clock::Clock;
use crate::handoff::{Handoff, RunOutcome};
use crate::trigger::{ScheduleSpec, TimeOfDay};

/// Longest allowed poll cadence.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Poller cadence and limits.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub run_ceiling: Duration,
    pub tz: Tz,
    pub default_time: TimeOfDay,
}

impl SchedulerSettings {
    pub fn from_config(config: &DaybreakConfig) -> Result<Self> {
        let mut poll_interval = Duration::from_secs(config.scheduler.poll_interval_secs.max(1));
        if poll_interval > MAX_POLL_INTERVAL {
            tracing::warn!(
                "⚠️ poll_interval_secs={} exceeds {}s, clamping",
                config.scheduler.poll_interval_secs,
                MAX_POLL_INTERVAL.as_secs()
            );
            poll_interval = MAX_POLL_INTERVAL;
        }
        Ok(Self {
            poll_interval,
            run_ceiling: Duration::from_secs(config.scheduler.run_ceiling_secs),
            tz: config.tz()?,
            default_time: config.scheduler.default_time.parse()?,
        })
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Counters kept by the poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub triggered: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    triggered: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            triggered: self.triggered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Trigger {
    spec: ScheduleSpec,
    next_fire: DateTime<Utc>,
}

struct Poller {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Everything the poller thread needs.
struct PollerContext {
    trigger: Arc<Mutex<Option<Trigger>>>,
    counters: Arc<Counters>,
    clock: Arc<dyn Clock>,
    handoff: Handoff,
    poll_interval: Duration,
    run_ceiling: Duration,
    stop_rx: Receiver<()>,
}

/// Daily briefing scheduler.
pub struct Scheduler {
    store: Arc<dyn ConfigStore>,
    handoff: Handoff,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    trigger: Arc<Mutex<Option<Trigger>>>,
    counters: Arc<Counters>,
    poller: Mutex<Option<Poller>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        handoff: Handoff,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            handoff,
            clock,
            settings,
            trigger: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
            poller: Mutex::new(None),
        }
    }

    /// Install the trigger from the config store and launch the poller.
    /// No-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut poller = self.lock_poller()?;
        if poller.is_some() {
            tracing::debug!("Scheduler already running");
            return Ok(());
        }

        let time = self.stored_time();
        let spec = ScheduleSpec::new(time, self.settings.tz);
        let next_fire = spec.next_after(self.clock.now());
        *self.lock_trigger()? = Some(Trigger { spec, next_fire });

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let ctx = PollerContext {
            trigger: self.trigger.clone(),
            counters: self.counters.clone(),
            clock: self.clock.clone(),
            handoff: self.handoff.clone(),
            poll_interval: self.settings.poll_interval,
            run_ceiling: self.settings.run_ceiling,
            stop_rx,
        };
        let handle = std::thread::Builder::new()
            .name("daybreak-poller".to_owned())
            .spawn(move || poll_loop(ctx))
            .map_err(|e| {
                DaybreakError::Scheduling(format!("failed to spawn poller thread: {e}"))
            })?;

        *poller = Some(Poller { stop_tx, handle });
        tracing::info!(
            "⏰ Scheduler started: daily at {} (next {}), polling every {}s",
            spec,
            next_fire.with_timezone(&self.settings.tz).format("%Y-%m-%d %H:%M %Z"),
            self.settings.poll_interval.as_secs()
        );
        Ok(())
    }

    /// Clear the trigger and halt the poller. Idempotent.
    pub fn stop(&self) {
        let taken = match self.poller.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(poller) = taken else {
            return;
        };

        if let Ok(mut trigger) = self.trigger.lock() {
            *trigger = None;
        }
        let _ = poller.stop_tx.send(());
        drop(poller.stop_tx);
        if poller.handle.join().is_err() {
            tracing::error!("❌ Poller thread panicked");
        }
        tracing::info!("🛑 Scheduler stopped");
    }

    /// Replace the trigger with a new time of day. Never touches an in-flight
    /// run. Malformed input leaves the current trigger in place.
    pub fn reschedule(&self, new_time: &str) -> Result<()> {
        let time: TimeOfDay = new_time.parse()?;
        let mut trigger = self.lock_trigger()?;
        let Some(current) = trigger.as_mut() else {
            return Err(DaybreakError::Scheduling("scheduler is not running".into()));
        };

        let spec = ScheduleSpec::new(time, self.settings.tz);
        let previous = current.spec.time;
        *current = Trigger {
            spec,
            next_fire: spec.next_after(self.clock.now()),
        };
        tracing::info!(
            "🔁 Rescheduled {} -> {} (next {})",
            previous,
            time,
            current.next_fire.with_timezone(&self.settings.tz).format("%Y-%m-%d %H:%M %Z")
        );
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        match self.poller.lock() {
            Ok(p) if p.is_some() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Next fire time, if running.
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.trigger.lock().ok().and_then(|t| t.as_ref().map(|t| t.next_fire))
    }

    /// Active time of day, if running.
    pub fn current_time(&self) -> Option<TimeOfDay> {
        self.trigger.lock().ok().and_then(|t| t.as_ref().map(|t| t.spec.time))
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Pick up a changed `schedule.time_of_day` from the config store.
    /// Returns whether the trigger moved. A missing or malformed value, or a
    /// stopped scheduler, leaves everything as is.
    pub fn sync_from_store(&self) -> bool {
        let Some(current) = self.current_time() else {
            return false;
        };
        let Some(raw) = self.store.get(keys::SCHEDULE_TIME_OF_DAY) else {
            return false;
        };
        let stored: TimeOfDay = match raw.parse() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("⚠️ Ignoring stored briefing time: {e}");
                return false;
            }
        };
        if stored == current {
            return false;
        }
        match self.reschedule(&raw) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Reschedule failed: {e}");
                false
            }
        }
    }

    fn stored_time(&self) -> TimeOfDay {
        match self.store.get(keys::SCHEDULE_TIME_OF_DAY) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "⚠️ Stored briefing time is invalid ({e}), using {}",
                    self.settings.default_time
                );
                self.settings.default_time
            }),
            None => {
                tracing::warn!(
                    "⚠️ No briefing time configured, using {}",
                    self.settings.default_time
                );
                self.settings.default_time
            }
        }
    }

    fn lock_trigger(&self) -> Result<std::sync::MutexGuard<'_, Option<Trigger>>> {
        self.trigger
            .lock()
            .map_err(|e| DaybreakError::Scheduling(format!("trigger lock poisoned: {e}")))
    }

    fn lock_poller(&self) -> Result<std::sync::MutexGuard<'_, Option<Poller>>> {
        self.poller
            .lock()
            .map_err(|e| DaybreakError::Scheduling(format!("poller lock poisoned: {e}")))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Follow the stored briefing time until the task is aborted, so a
/// `schedule` written by another process reaches the running scheduler.
pub async fn watch_store(scheduler: Arc<Scheduler>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        scheduler.sync_from_store();
    }
}

/// Consume the due trigger, if any, advancing it to its next occurrence.
fn take_due(trigger: &Mutex<Option<Trigger>>, now: DateTime<Utc>) -> Option<ScheduleSpec> {
    let mut guard = trigger.lock().ok()?;
    let t = guard.as_mut()?;
    if now < t.next_fire {
        return None;
    }
    t.next_fire = t.spec.next_after(now);
    Some(t.spec)
}

fn poll_loop(ctx: PollerContext) {
    tracing::debug!("Poller thread running");
    loop {
        match ctx.stop_rx.recv_timeout(ctx.poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        let Some(spec) = take_due(&ctx.trigger, ctx.clock.now()) else {
            continue;
        };
        tracing::info!("🔔 Briefing triggered ({})", spec);
        Counters::bump(&ctx.counters.triggered);

        let reply = match ctx.handoff.submit() {
            Ok(rx) => rx,
            Err(e) => {
                tracing::error!("❌ Could not hand off run: {e}");
                Counters::bump(&ctx.counters.failed);
                continue;
            }
        };

        crossbeam_channel::select! {
            recv(reply) -> msg => match msg {
                Ok(RunOutcome::Completed(status)) => {
                    tracing::info!("✅ Run finished: {}", status);
                    Counters::bump(&ctx.counters.completed);
                }
                Ok(RunOutcome::Failed(reason)) => {
                    tracing::error!("❌ Run failed: {}", reason);
                    Counters::bump(&ctx.counters.failed);
                }
                Ok(RunOutcome::Skipped) => {
                    tracing::warn!("⏭️ Run skipped, previous one still running");
                    Counters::bump(&ctx.counters.skipped);
                }
                Err(_) => {
                    tracing::error!("❌ Executor dropped the run before reporting");
                    Counters::bump(&ctx.counters.failed);
                }
            },
            recv(ctx.stop_rx) -> _ => break,
            default(ctx.run_ceiling) => {
                tracing::warn!(
                    "⏱️ Run exceeded {}s ceiling, leaving it running",
                    ctx.run_ceiling.as_secs()
                );
                Counters::bump(&ctx.counters.timed_out);
            }
        }
    }
    tracing::debug!("Poller thread exiting");
}
