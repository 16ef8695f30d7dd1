//! Executor: submit a work item and poll it to a terminal status.

use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{FlowError, FlowResult, WorkItemId, WorkItemRecord, WorkItemRequest, WorkItemStatus};
use crate::ports::{Clock, WorkItemApi, WorkItemInfo};

/// Fixed-cadence polling budget.
///
/// Constant interval on purpose: job duration is roughly known, so there is
/// nothing to gain from backing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

pub struct Executor<W, C> {
    api: W,
    clock: C,
}

impl<W: WorkItemApi, C: Clock> Executor<W, C> {
    pub fn new(api: W, clock: C) -> Self {
        Self { api, clock }
    }

    /// Submit once. A rejected submission is not retried.
    pub async fn submit(&self, request: &WorkItemRequest) -> FlowResult<WorkItemRecord> {
        let info = self
            .api
            .submit(request)
            .await
            .map_err(FlowError::Submission)?;
        info!(work_item = %info.id, activity = %request.activity_id, status = %info.status, "work item submitted");
        Ok(WorkItemRecord::new(info.id, info.status, self.clock.now()))
    }

    /// Single status read.
    pub async fn poll(&self, id: &WorkItemId) -> FlowResult<WorkItemInfo> {
        self.api.status(id).await.map_err(FlowError::Poll)
    }

    /// Sleep `interval`, read status, repeat until terminal or `max_attempts`
    /// reads have been made.
    ///
    /// Running out of attempts is not an error: the returned record carries
    /// the last non-terminal status and the caller checks `is_terminal()`.
    pub async fn await_completion(
        &self,
        id: &WorkItemId,
        policy: PollPolicy,
    ) -> FlowResult<WorkItemRecord> {
        let mut record = WorkItemRecord::new(id.clone(), WorkItemStatus::Pending, self.clock.now());

        for _ in 0..policy.max_attempts {
            self.clock.sleep(policy.interval).await;

            let info = self.poll(id).await?;
            record.observe(info.status, self.clock.now())?;
            info!(work_item = %id, status = %record.status, poll = record.polls, "status");

            if record.is_terminal() {
                return Ok(record);
            }
        }

        warn!(
            work_item = %id,
            status = %record.status,
            polls = record.polls,
            "polling budget exhausted before a terminal status"
        );
        Ok(record)
    }

    /// `submit` followed by `await_completion`.
    pub async fn run(
        &self,
        request: &WorkItemRequest,
        policy: PollPolicy,
    ) -> FlowResult<WorkItemRecord> {
        let submitted = self.submit(request).await?;
        let mut record = self.await_completion(&submitted.id, policy).await?;
        record.submitted_at = submitted.submitted_at;
        Ok(record)
    }
}
