use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use super::{parse_s3_uri, ObjectStore, StorageError};

/// Filesystem-backed object store: `s3://bucket/key` maps to `root/bucket/key`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(bucket).join(key);
        // Keys must stay inside the root.
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidUri(format!("{bucket}/{key}")));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        let (bucket, key) = parse_s3_uri(uri)?;
        let path = self.object_path(&bucket, &key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_json(&self, bucket: &str, key: &str, data: &Value) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(data).map_err(|e| StorageError::Json {
            uri: super::build_s3_uri(bucket, key),
            message: e.to_string(),
        })?;
        fs::write(&path, body)?;
        tracing::debug!(bucket, key, "Wrote JSON object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store
            .write_json("out", "doc/1/result.json", &json!({"inference_result": {"A": 1}}))
            .unwrap();

        let value = store.get_json("s3://out/doc/1/result.json").unwrap();
        assert_eq!(value["inference_result"]["A"], 1);
        assert!(dir.path().join("out/doc/1/result.json").exists());
    }

    #[test]
    fn reads_text_objects() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("in/pages")).unwrap();
        fs::write(dir.path().join("in/pages/1.txt"), "Invoice #42").unwrap();

        let store = LocalObjectStore::new(dir.path());
        assert_eq!(store.get_text("s3://in/pages/1.txt").unwrap(), "Invoice #42");
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.get_bytes("s3://in/none.json"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_json_reports_uri() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("in")).unwrap();
        fs::write(dir.path().join("in/bad.json"), "{not json").unwrap();

        let store = LocalObjectStore::new(dir.path());
        match store.get_json("s3://in/bad.json") {
            Err(StorageError::Json { uri, .. }) => assert_eq!(uri, "s3://in/bad.json"),
            other => panic!("expected JSON error, got {other:?}"),
        }
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.get_bytes("s3://in/../../etc/passwd"),
            Err(StorageError::InvalidUri(_))
        ));
    }
}
