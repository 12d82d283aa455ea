use std::path::{Component, Path, PathBuf};

use anyhow::Context;

/// An object either spilled to a local file or held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectData {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Where a fetched object should end up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchTarget {
    Path(PathBuf),
    Memory,
}

impl ObjectData {
    pub fn read_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            ObjectData::Path(path) => std::fs::read(path)
                .context(format!("can't read object file '{}'", path.display())),
            ObjectData::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Byte fetch/put keyed by `(bucket, key)`.
pub trait ObjectStore: Send + Sync {
    fn fetch(&self, bucket: &str, key: &str, target: FetchTarget) -> anyhow::Result<ObjectData>;

    fn put(&self, bucket: &str, key: &str, data: &ObjectData) -> anyhow::Result<()>;
}

/// Buckets are directories under `root`, keys are relative paths inside them.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> anyhow::Result<PathBuf> {
        let bucket_path = Path::new(bucket);
        let key_path = Path::new(key);
        let escapes = |path: &Path| {
            path.components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        };
        if bucket.is_empty() || escapes(bucket_path) {
            anyhow::bail!(format!("invalid bucket name '{}'", bucket));
        }
        if key.is_empty() || escapes(key_path) {
            anyhow::bail!(format!("invalid object key '{}'", key));
        }
        Ok(self.root.join(bucket_path).join(key_path))
    }
}

impl ObjectStore for LocalObjectStore {
    fn fetch(&self, bucket: &str, key: &str, target: FetchTarget) -> anyhow::Result<ObjectData> {
        let src = self.object_path(bucket, key)?;
        log::debug!("fetching '{}/{}' from '{}'", bucket, key, src.display());
        match target {
            FetchTarget::Memory => {
                let bytes = std::fs::read(&src)
                    .context(format!("can't fetch '{}/{}'", bucket, key))?;
                Ok(ObjectData::Bytes(bytes))
            }
            FetchTarget::Path(dst) => {
                if let Some(parent) = dst.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&src, &dst).context(format!(
                    "can't fetch '{}/{}' into '{}'",
                    bucket,
                    key,
                    dst.display()
                ))?;
                Ok(ObjectData::Path(dst))
            }
        }
    }

    fn put(&self, bucket: &str, key: &str, data: &ObjectData) -> anyhow::Result<()> {
        let dst = self.object_path(bucket, key)?;
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match data {
            ObjectData::Path(src) => {
                std::fs::copy(src, &dst).context(format!("can't put '{}/{}'", bucket, key))?;
            }
            ObjectData::Bytes(bytes) => {
                std::fs::write(&dst, bytes).context(format!("can't put '{}/{}'", bucket, key))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_fetch_both_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store
            .put("scenes", "box/scene.bin", &ObjectData::Bytes(vec![1, 2, 3]))
            .unwrap();

        let in_memory = store.fetch("scenes", "box/scene.bin", FetchTarget::Memory).unwrap();
        assert_eq!(in_memory, ObjectData::Bytes(vec![1, 2, 3]));

        let dst = dir.path().join("tmp").join("scene.bin");
        let on_disk = store
            .fetch("scenes", "box/scene.bin", FetchTarget::Path(dst.clone()))
            .unwrap();
        assert_eq!(on_disk, ObjectData::Path(dst.clone()));
        assert_eq!(on_disk.read_bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_object_and_escaping_keys_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.fetch("scenes", "nothing", FetchTarget::Memory).is_err());
        assert!(store.object_path("scenes", "../outside").is_err());
        assert!(store.object_path("/abs", "key").is_err());
        assert!(store.object_path("scenes", "").is_err());
    }
}
