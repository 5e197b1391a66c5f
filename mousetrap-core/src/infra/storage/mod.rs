mod local;
mod memory;

pub use local::LocalStorage;
pub use memory::InMemoryStorage;

use std::collections::BTreeMap;

use mousetrap_model::{EpochMillis, RESULT_TAG, ScanResult, TIMESTAMP_TAG};

/// Replace the scan tags in `tags`, leaving unrelated keys alone.
pub(crate) fn apply_scan_tags(
    tags: &mut BTreeMap<String, String>,
    result: ScanResult,
    ts: EpochMillis,
) {
    tags.insert(RESULT_TAG.to_string(), result.as_str().to_string());
    tags.insert(TIMESTAMP_TAG.to_string(), ts.to_string());
}
