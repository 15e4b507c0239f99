//! Object storage contract and URI helpers.
//!
//! Documents, page text, images and extraction results live in an object
//! store addressed by `s3://bucket/key` URIs.

pub mod local;

pub use local::LocalObjectStore;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage URI: {0}")]
    InvalidUri(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("JSON error for {uri}: {message}")]
    Json { uri: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read/write access to stored objects. Shared across worker threads.
pub trait ObjectStore: Send + Sync {
    fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, StorageError>;

    fn get_text(&self, uri: &str) -> Result<String, StorageError> {
        let bytes = self.get_bytes(uri)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn get_json(&self, uri: &str) -> Result<Value, StorageError> {
        let bytes = self.get_bytes(uri)?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Json {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }

    fn write_json(&self, bucket: &str, key: &str, data: &Value) -> Result<(), StorageError>;
}

/// Split `s3://bucket/key` into `(bucket, key)`.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String), StorageError> {
    let rest = uri.strip_prefix("s3://").ok_or_else(|| {
        StorageError::InvalidUri(format!("{uri}. Must start with s3://"))
    })?;

    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(StorageError::InvalidUri(format!(
            "{uri}. Format should be s3://bucket/key"
        ))),
    }
}

pub fn build_s3_uri(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}
