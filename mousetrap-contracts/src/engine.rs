use async_trait::async_trait;
use mousetrap_model::Verdict;

use crate::error::Result;
use crate::storage::ByteStream;

/// Byte-stream malware scanner.
///
/// Callers bound [`ScanEngine::scan`] with their own deadline; an
/// implementation must tolerate being dropped mid-scan.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(&self, stream: ByteStream) -> Result<Verdict>;

    /// Probe the engine end to end. `Ok(false)` means it answered but the
    /// answer was wrong.
    async fn health_check(&self) -> Result<bool>;
}
