use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mousetrap_contracts::{
    BackendError, ByteStream, ObjectStorage, Result,
};
use mousetrap_model::{EpochMillis, FileMetadata, ScanResult};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::debug;

use super::apply_scan_tags;

const TAG_SUFFIX: &str = ".mousetrap-tags.json";

/// Object storage on a local filesystem.
///
/// Paths may be plain (`reports/a.csv`) or URI-shaped (`file:///reports/a.csv`,
/// `s3://bucket/a.csv`); either way they resolve under `root`. Tags live in a
/// JSON sidecar next to the file.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a task path onto the filesystem. Rejects anything that could
    /// escape `root`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = path
            .split_once("://")
            .map_or(path, |(_, rest)| rest)
            .trim_start_matches('/');

        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(BackendError::NotFound(format!(
                        "{path} resolves outside the storage root"
                    )));
                }
            }
        }
        if resolved == self.root {
            return Err(BackendError::NotFound(format!("{path} names no file")));
        }
        Ok(resolved)
    }

    fn sidecar(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(TAG_SUFFIX);
        PathBuf::from(name)
    }

    /// Current tags of `path`; empty when none were ever written.
    pub async fn tags(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let sidecar = Self::sidecar(&self.resolve(path)?);
        match fs::read(&sidecar).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn fingerprint(file: &Path) -> Result<String> {
        let mut reader = BufReader::new(fs::File::open(file).await?);
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn metadata(&self, path: &str) -> Result<Option<FileMetadata>> {
        let Ok(file) = self.resolve(path) else {
            return Ok(None);
        };
        let meta = match fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(FileMetadata {
            size_bytes: meta.len(),
            fingerprint: Self::fingerprint(&file).await?,
        }))
    }

    async fn open_stream(&self, path: &str) -> Result<ByteStream> {
        let file = self.resolve(path)?;
        let handle = fs::File::open(&file).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                BackendError::NotFound(path.to_string())
            } else {
                err.into()
            }
        })?;
        Ok(Box::pin(BufReader::new(handle)))
    }

    async fn tag(&self, path: &str, result: ScanResult, ts: EpochMillis) -> Result<()> {
        let file = self.resolve(path)?;
        if !fs::try_exists(&file).await? {
            return Err(BackendError::NotFound(path.to_string()));
        }
        let mut tags = self.tags(path).await?;
        apply_scan_tags(&mut tags, result, ts);

        let sidecar = Self::sidecar(&file);
        fs::write(&sidecar, serde_json::to_vec_pretty(&tags)?).await?;
        debug!(file = %path, sidecar = %sidecar.display(), "wrote scan tags");
        Ok(())
    }
}
