use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::foundation::error::{ConvError, ConvResult};

/// Bucket/key blob storage the worker reads sources from and writes results to.
pub trait ObjectStore: Send + Sync {
    fn ensure_bucket(&self, bucket: &str) -> ConvResult<()>;

    fn fetch(&self, bucket: &str, key: &str) -> ConvResult<Vec<u8>>;

    fn store(&self, bucket: &str, key: &str, bytes: &[u8], content_type: &str) -> ConvResult<()>;

    /// A URL granting read access to `bucket/key` for `ttl`.
    fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> ConvResult<String>;
}

const META_DIR: &str = ".meta";

/// Object store backed by a local directory: one subdirectory per bucket, one file per key.
///
/// Content types live in `<bucket>/.meta/<key>`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn open(root: impl Into<PathBuf>) -> ConvResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            ConvError::storage(format!("create store root '{}': {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> ConvResult<Option<String>> {
        let path = self.bucket_dir(bucket)?.join(META_DIR).join(checked_name("key", key)?);
        match std::fs::read_to_string(&path) {
            Ok(ct) => Ok(Some(ct)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConvError::storage(format!("read '{}': {e}", path.display()))),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> ConvResult<PathBuf> {
        Ok(self.root.join(checked_name("bucket", bucket)?))
    }

    fn object_path(&self, bucket: &str, key: &str) -> ConvResult<PathBuf> {
        Ok(self.bucket_dir(bucket)?.join(checked_name("key", key)?))
    }
}

/// Names become single path components, so separators and dot-prefixed names are refused.
fn checked_name<'a>(what: &str, name: &'a str) -> ConvResult<&'a str> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(ConvError::storage(format!("invalid {what} name '{name}'")));
    }
    Ok(name)
}

impl ObjectStore for FsObjectStore {
    fn ensure_bucket(&self, bucket: &str) -> ConvResult<()> {
        let dir = self.bucket_dir(bucket)?;
        std::fs::create_dir_all(dir.join(META_DIR)).map_err(|e| {
            ConvError::storage(format!("create bucket '{}': {e}", dir.display()))
        })
    }

    fn fetch(&self, bucket: &str, key: &str) -> ConvResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        std::fs::read(&path).map_err(|e| ConvError::storage(format!("fetch {bucket}/{key}: {e}")))
    }

    fn store(&self, bucket: &str, key: &str, bytes: &[u8], content_type: &str) -> ConvResult<()> {
        self.ensure_bucket(bucket)?;
        let path = self.object_path(bucket, key)?;
        let partial = path.with_file_name(format!(".{key}.partial"));
        std::fs::write(&partial, bytes)
            .and_then(|_| std::fs::rename(&partial, &path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&partial);
                ConvError::storage(format!("store {bucket}/{key}: {e}"))
            })?;

        let meta = self.bucket_dir(bucket)?.join(META_DIR).join(key);
        std::fs::write(&meta, content_type)
            .map_err(|e| ConvError::storage(format!("store content type of {bucket}/{key}: {e}")))?;
        tracing::debug!(bucket, key, bytes = bytes.len(), content_type, "stored object");
        Ok(())
    }

    fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> ConvResult<String> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(ConvError::storage(format!("presign {bucket}/{key}: no such object")));
        }
        let abs = std::path::absolute(&path)
            .map_err(|e| ConvError::storage(format!("presign {bucket}/{key}: {e}")))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ConvError::storage(format!("system clock before epoch: {e}")))?;
        let expires = (now + ttl).as_secs();
        Ok(format!("file://{}?expires={expires}", abs.display()))
    }
}
