use std::pin::Pin;

use async_trait::async_trait;
use mousetrap_model::{EpochMillis, FileMetadata, ScanResult};
use tokio::io::AsyncRead;

use crate::error::Result;

/// Byte stream handed to the scan engine. Dropping it closes the source.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Object storage holding the files to scan.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Size and fingerprint of `path`, or `None` when it does not exist.
    async fn metadata(&self, path: &str) -> Result<Option<FileMetadata>>;

    async fn open_stream(&self, path: &str) -> Result<ByteStream>;

    /// Attach the scan result and timestamp to the object, replacing earlier
    /// scan tags and keeping unrelated ones.
    async fn tag(
        &self,
        path: &str,
        result: ScanResult,
        ts: EpochMillis,
    ) -> Result<()>;
}
