use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use mousetrap_contracts::{
    BackendError, ByteStream, ObjectStorage, Result,
};
use mousetrap_model::{EpochMillis, FileMetadata, ScanResult};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::apply_scan_tags;

#[derive(Debug, Clone, Default)]
struct StoredObject {
    bytes: Arc<Vec<u8>>,
    tags: BTreeMap<String, String>,
}

/// Object storage held in memory, keyed by the full path string.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryStorage");
        match self.objects.try_read() {
            Ok(objects) => {
                debug.field("objects", &objects.len());
            }
            Err(_) => {
                debug.field("objects", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(
            path.into(),
            StoredObject {
                bytes: Arc::new(bytes.into()),
                tags: BTreeMap::new(),
            },
        );
    }

    pub async fn remove(&self, path: &str) -> bool {
        self.objects.write().await.remove(path).is_some()
    }

    pub async fn tags(&self, path: &str) -> Option<BTreeMap<String, String>> {
        self.objects
            .read()
            .await
            .get(path)
            .map(|object| object.tags.clone())
    }

    /// Set an arbitrary tag, as another system sharing the bucket would.
    pub async fn set_tag(&self, path: &str, key: &str, value: &str) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        object.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn metadata(&self, path: &str) -> Result<Option<FileMetadata>> {
        let objects = self.objects.read().await;
        Ok(objects.get(path).map(|object| FileMetadata {
            size_bytes: object.bytes.len() as u64,
            // Quoted like an S3 ETag.
            fingerprint: format!(
                "\"{}\"",
                hex::encode(Sha256::digest(object.bytes.as_slice()))
            ),
        }))
    }

    async fn open_stream(&self, path: &str) -> Result<ByteStream> {
        let objects = self.objects.read().await;
        let object = objects
            .get(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let bytes = object.bytes.as_ref().clone();
        Ok(Box::pin(Cursor::new(bytes)))
    }

    async fn tag(&self, path: &str, result: ScanResult, ts: EpochMillis) -> Result<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        apply_scan_tags(&mut object.tags, result, ts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mousetrap_model::{RESULT_TAG, TIMESTAMP_TAG};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn tagging_keeps_foreign_tags() {
        let storage = InMemoryStorage::new();
        storage.put("s3://bucket/a.csv", b"a,b,c".to_vec()).await;
        storage
            .set_tag("s3://bucket/a.csv", "owner", "reports")
            .await
            .unwrap();

        storage
            .tag("s3://bucket/a.csv", ScanResult::Clean, 1)
            .await
            .unwrap();
        storage
            .tag("s3://bucket/a.csv", ScanResult::Infected, 2)
            .await
            .unwrap();

        let tags = storage.tags("s3://bucket/a.csv").await.unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags["owner"], "reports");
        assert_eq!(tags[RESULT_TAG], "INFECTED");
        assert_eq!(tags[TIMESTAMP_TAG], "2");
    }

    #[tokio::test]
    async fn stream_yields_stored_bytes() {
        let storage = InMemoryStorage::new();
        storage.put("a", b"payload".to_vec()).await;

        let mut stream = storage.open_stream("a").await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"payload");

        let meta = storage.metadata("a").await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, 7);
        assert!(meta.fingerprint.starts_with('"'));
        assert!(storage.metadata("b").await.unwrap().is_none());
    }
}
