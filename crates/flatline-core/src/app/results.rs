//! Best-effort collection of a run's outputs.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::storage::StorageClient;
use crate::domain::{MissingOutput, OutputLocation, WorkItemId};
use crate::ports::ObjectStore;

/// Presign a download for every expected output.
///
/// `expected` maps a parameter name to its object key. A key that cannot be
/// presigned is reported as missing; it never fails the whole collection,
/// because a failed job can still have written its report.
pub async fn collect_results<S: ObjectStore>(
    storage: &StorageClient<S>,
    work_item: &WorkItemId,
    expected: &BTreeMap<String, String>,
) -> BTreeMap<String, OutputLocation> {
    let mut outputs = BTreeMap::new();

    for (name, object_key) in expected {
        let location = match storage.store().signed_download(object_key).await {
            Ok(url) => {
                info!(work_item = %work_item, output = %name, object_key = %object_key, "output ready");
                OutputLocation::Ready {
                    object_key: object_key.clone(),
                    url,
                }
            }
            Err(failure) => {
                let reason = if failure.is_not_found() {
                    "object not found".to_string()
                } else {
                    failure.to_string()
                };
                warn!(work_item = %work_item, output = %name, object_key = %object_key, %reason, "output missing");
                OutputLocation::Missing(MissingOutput {
                    object_key: object_key.clone(),
                    reason,
                })
            }
        };
        outputs.insert(name.clone(), location);
    }

    outputs
}
