//! Work item status and the local record of what has been observed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{FlowError, FlowResult};
use super::ids::WorkItemId;

/// Work item status as reported by the job service.
///
/// State transitions:
/// - Pending -> Inprogress -> Success | Failed | Cancelled
/// - Pending -> Success | Failed | Cancelled (fast jobs skip Inprogress)
///
/// Terminal states never move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum WorkItemStatus {
    Pending,
    Inprogress,
    Success,
    Failed,
    Cancelled,
}

impl WorkItemStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Success | WorkItemStatus::Failed | WorkItemStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Inprogress => "inprogress",
            WorkItemStatus::Success => "success",
            WorkItemStatus::Failed => "failed",
            WorkItemStatus::Cancelled => "cancelled",
        }
    }

    fn rank(self) -> u8 {
        match self {
            WorkItemStatus::Pending => 0,
            WorkItemStatus::Inprogress => 1,
            _ => 2,
        }
    }

    /// Forward-only: equal is fine, going back or leaving a terminal state is not.
    pub fn can_advance_to(self, next: WorkItemStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemStatus {
    type Err = FlowError;

    /// The service reports detailed failure reasons (`failedInstructions`,
    /// `failedDownload`, ...). They all fold into `Failed`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkItemStatus::Pending),
            "inprogress" => Ok(WorkItemStatus::Inprogress),
            "success" => Ok(WorkItemStatus::Success),
            "cancelled" => Ok(WorkItemStatus::Cancelled),
            s if s.starts_with("failed") => Ok(WorkItemStatus::Failed),
            other => Err(FlowError::UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for WorkItemStatus {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Local view of one submitted work item.
///
/// Design:
/// - The remote service owns the real state; this only tracks what we saw.
/// - All transitions go through `observe`, which rejects regressions.
#[derive(Debug, Clone)]
pub struct WorkItemRecord {
    pub id: WorkItemId,
    pub status: WorkItemStatus,

    /// Number of status reads issued so far.
    pub polls: u32,

    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItemRecord {
    pub fn new(id: WorkItemId, status: WorkItemStatus, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status,
            polls: 0,
            submitted_at: now,
            updated_at: now,
        }
    }

    /// Record the result of one status read.
    pub fn observe(&mut self, status: WorkItemStatus, now: DateTime<Utc>) -> FlowResult<()> {
        self.polls += 1;
        if !self.status.can_advance_to(status) {
            return Err(FlowError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pending("pending", WorkItemStatus::Pending)]
    #[case::inprogress("inprogress", WorkItemStatus::Inprogress)]
    #[case::success("success", WorkItemStatus::Success)]
    #[case::failed("failed", WorkItemStatus::Failed)]
    #[case::failed_instructions("failedInstructions", WorkItemStatus::Failed)]
    #[case::failed_upload("failedUpload", WorkItemStatus::Failed)]
    #[case::cancelled("cancelled", WorkItemStatus::Cancelled)]
    fn parses_service_status(#[case] raw: &str, #[case] expected: WorkItemStatus) {
        assert_eq!(raw.parse::<WorkItemStatus>().unwrap(), expected);
        let json = format!("\"{raw}\"");
        assert_eq!(serde_json::from_str::<WorkItemStatus>(&json).unwrap(), expected);
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert!("queued".parse::<WorkItemStatus>().is_err());
    }

    #[rstest]
    #[case::pending(WorkItemStatus::Pending, false)]
    #[case::inprogress(WorkItemStatus::Inprogress, false)]
    #[case::success(WorkItemStatus::Success, true)]
    #[case::failed(WorkItemStatus::Failed, true)]
    #[case::cancelled(WorkItemStatus::Cancelled, true)]
    fn terminal_set(#[case] status: WorkItemStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn record_moves_forward() {
        let now = Utc::now();
        let mut record = WorkItemRecord::new(WorkItemId::new("w1"), WorkItemStatus::Pending, now);

        record.observe(WorkItemStatus::Pending, now).unwrap();
        record.observe(WorkItemStatus::Inprogress, now).unwrap();
        record.observe(WorkItemStatus::Success, now).unwrap();

        assert_eq!(record.polls, 3);
        assert!(record.is_terminal());
    }

    #[test]
    fn record_rejects_regression() {
        let now = Utc::now();
        let mut record =
            WorkItemRecord::new(WorkItemId::new("w1"), WorkItemStatus::Inprogress, now);

        let err = record.observe(WorkItemStatus::Pending, now).unwrap_err();
        assert!(matches!(
            err,
            FlowError::InvalidTransition {
                from: WorkItemStatus::Inprogress,
                to: WorkItemStatus::Pending
            }
        ));
        assert_eq!(record.status, WorkItemStatus::Inprogress);
    }

    #[test]
    fn terminal_state_is_final() {
        assert!(!WorkItemStatus::Failed.can_advance_to(WorkItemStatus::Success));
        assert!(WorkItemStatus::Success.can_advance_to(WorkItemStatus::Success));
        assert!(WorkItemStatus::Pending.can_advance_to(WorkItemStatus::Cancelled));
    }
}
