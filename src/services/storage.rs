use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Durable blob storage addressed by `(container, key)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Container (bucket) every object of this store lives in.
    fn container(&self) -> &str;

    /// Write an object, replacing any existing object under the same key.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Client for S3-compatible object storage.
pub struct S3BlobStore {
    bucket: Box<Bucket>,
    container: String,
}

impl S3BlobStore {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket,
            container: bucket_name.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;

        match response.status_code() {
            200 => Ok(()),
            code => Err(StorageError::Status { code }),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        match response.status_code() {
            200 => Ok(response.bytes().to_vec()),
            404 => Err(StorageError::NotFound(key.to_string())),
            code => Err(StorageError::Status { code }),
        }
    }
}

/// Process-local blob store.
pub struct InMemoryBlobStore {
    container: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.lock().map_err(|_| StorageError::Poisoned)?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 returned HTTP status {code}")]
    Status { code: u16 },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("In-memory blob store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_overwrites_same_key() {
        let store = InMemoryBlobStore::new("activity-results");
        tokio_test::block_on(async {
            store.put("daily_activity/a.csv", b"one", "text/csv").await.unwrap();
            store.put("daily_activity/a.csv", b"two", "text/csv").await.unwrap();
            assert_eq!(store.get("daily_activity/a.csv").await.unwrap(), b"two".to_vec());
        });
        assert_eq!(store.keys(), vec!["daily_activity/a.csv".to_string()]);
        assert_eq!(store.container(), "activity-results");
    }

    #[test]
    fn test_get_missing_key() {
        let store = InMemoryBlobStore::new("activity-results");
        let result = tokio_test::block_on(store.get("daily_activity/missing.csv"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
