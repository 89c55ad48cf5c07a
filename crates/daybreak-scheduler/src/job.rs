//! The briefing job: pipeline, then delivery, then exactly one run record.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use daybreak_core::error::DaybreakError;
use daybreak_core::traits::{Delivery, RunRecorder};
use daybreak_core::types::{RunRecord, RunStatus};
use futures::FutureExt;

use crate::handoff::{ScheduledJob, panic_message};
use crate::pipeline::Pipeline;

pub struct BriefingJob {
    pipeline: Pipeline,
    delivery: Arc<dyn Delivery>,
    recorder: Arc<dyn RunRecorder>,
}

impl BriefingJob {
    pub fn new(
        pipeline: Pipeline,
        delivery: Arc<dyn Delivery>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Self {
        Self {
            pipeline,
            delivery,
            recorder,
        }
    }

    /// Run once. The status follows delivery: a degraded briefing that was
    /// delivered is still a success.
    pub async fn run_once(&self) -> RunStatus {
        match AssertUnwindSafe(self.generate_and_deliver()).catch_unwind().await {
            Ok(record) => {
                let status = record.status;
                self.recorder.record(record);
                status
            }
            Err(panic) => {
                let err = DaybreakError::Critical(format!(
                    "briefing run panicked: {}",
                    panic_message(&*panic)
                ));
                tracing::error!("❌ {err}");
                self.recorder
                    .record(RunRecord::error("run aborted", err.to_string()));
                if let Err(e) = self.delivery.send_alert(&err.to_string()).await {
                    tracing::warn!("⚠️ Critical alert could not be sent: {e}");
                }
                RunStatus::Error
            }
        }
    }

    async fn generate_and_deliver(&self) -> RunRecord {
        let report = self.pipeline.generate().await;
        let summary = report.artifact.summary();

        match self.delivery.send(&report.artifact).await {
            Ok(()) => {
                if !report.ok() {
                    tracing::warn!(
                        "⚠️ Briefing delivered with {} errors: {}",
                        report.errors.len(),
                        report.errors.join("; ")
                    );
                }
                RunRecord::success(summary)
            }
            Err(e) => {
                tracing::error!("❌ Briefing delivery failed: {e}");
                let mut reasons = vec![e.to_string()];
                reasons.extend(report.errors);
                RunRecord::error(summary, reasons.join("; "))
            }
        }
    }
}

#[async_trait]
impl ScheduledJob for BriefingJob {
    async fn run(&self) -> RunStatus {
        self.run_once().await
    }
}
