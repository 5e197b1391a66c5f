/// Tag key holding the last scan result on a stored object.
pub const RESULT_TAG: &str = "MOUSETRAP_RESULT";
/// Tag key holding the epoch-millisecond timestamp of the last scan.
pub const TIMESTAMP_TAG: &str = "MOUSETRAP_TS";

/// Object metadata captured at ingestion and re-checked before a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct FileMetadata {
    pub size_bytes: u64,
    /// Content fingerprint, e.g. a strong ETag. May arrive quoted.
    pub fingerprint: String,
}

impl FileMetadata {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0 / 1024.0
    }

    /// Fingerprint with the surrounding ETag quotes removed.
    pub fn normalized_fingerprint(&self) -> String {
        self.fingerprint.trim_matches('"').to_string()
    }
}
