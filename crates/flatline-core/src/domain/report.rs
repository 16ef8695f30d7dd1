//! Results of one execution run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{RunId, WorkItemId};
use super::status::WorkItemStatus;

/// An expected output that could not be located after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingOutput {
    pub object_key: String,
    pub reason: String,
}

/// Where to download one output from, or why it is not there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OutputLocation {
    Ready { object_key: String, url: String },
    Missing(MissingOutput),
}

impl OutputLocation {
    pub fn url(&self) -> Option<&str> {
        match self {
            OutputLocation::Ready { url, .. } => Some(url),
            OutputLocation::Missing(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, OutputLocation::Missing(_))
    }
}

/// Summary printed at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub work_item_id: WorkItemId,
    pub activity: String,
    pub status: WorkItemStatus,
    pub polls: u32,

    /// Polling ran out of attempts before a terminal status was seen.
    pub exhausted: bool,

    pub outputs: BTreeMap<String, OutputLocation>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == WorkItemStatus::Success
    }

    pub fn missing_outputs(&self) -> impl Iterator<Item = (&str, &MissingOutput)> {
        self.outputs.iter().filter_map(|(name, loc)| match loc {
            OutputLocation::Missing(m) => Some((name.as_str(), m)),
            OutputLocation::Ready { .. } => None,
        })
    }
}
