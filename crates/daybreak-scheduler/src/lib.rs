//! # Daybreak Scheduler
//!
//! Daily trigger, best-effort briefing pipeline and delivery.
//!
//! ## Architecture
//! ```text
//! Scheduler (std poller thread, wakes at most every 60s)
//!   ├── ScheduleSpec: "07:30 Europe/Paris" → next fire instant (DST-aware)
//!   └── due → Handoff (mpsc) → executor task on the async runtime
//!                ├── overlap guard: busy → Skipped
//!                └── BriefingJob
//!                      ├── Pipeline: market → commentary → holdings
//!                      │             → alerts → weather → ride score → compose
//!                      ├── Delivery: Discord embeds / JSON webhook
//!                      └── RunRecorder: one row per invocation
//! ```

pub mod clock;
pub mod compose;
pub mod dispatch;
pub mod engine;
pub mod handoff;
pub mod job;
pub mod pipeline;
pub mod prompts;
pub mod recorder;
pub mod scoring;
pub mod trigger;

pub use clock::{Clock, SystemClock};
pub use dispatch::{NotifyTarget, WebhookDelivery};
pub use engine::{Scheduler, SchedulerSettings, SchedulerState, SchedulerStats, watch_store};
pub use handoff::{Handoff, RunOutcome, ScheduledJob, spawn_executor};
pub use job::BriefingJob;
pub use pipeline::{Pipeline, PipelineReport, PipelineSettings};
pub use recorder::SqliteRunRecorder;
pub use trigger::{ScheduleSpec, TimeOfDay};
