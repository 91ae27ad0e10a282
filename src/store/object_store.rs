use crate::config::ObjectStoreBackend;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

/// Narrow façade over the object store. The Store Gateway is the only
/// component that holds one of these; everything else goes through the
/// Gateway. Two implementations, selected once at startup by
/// `ObjectStoreBackend` (the "small sum type + factory" strategy-selection
/// pattern): a filesystem root for dev/tests, and an S3-compatible bucket
/// for production.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Bytes>;
    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: String) -> Self {
        Self { root: PathBuf::from(root) }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn download(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::ObjectStore(format!("download {key}: {e}")))?;
        Ok(Bytes::from(data))
    }

    async fn upload(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::ObjectStore(format!("mkdir for {key}: {e}")))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::ObjectStore(format!("upload {key}: {e}")))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.path_for(key)).await.is_ok())
    }
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(bucket: String, endpoint: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download(&self, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::ObjectStore(format!("download {key}: {e}")))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::ObjectStore(format!("read body for {key}: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(bytes.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::UploadFailed(format!("{key}: {e}")))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(AppError::ObjectStore(format!("head {key}: {e}")))
                }
            }
        }
    }
}

pub async fn build(backend: &ObjectStoreBackend) -> std::sync::Arc<dyn ObjectStore> {
    match backend {
        ObjectStoreBackend::Filesystem(root) => {
            std::sync::Arc::new(FilesystemObjectStore::new(root.clone()))
        }
        ObjectStoreBackend::S3 { bucket, endpoint } => {
            std::sync::Arc::new(S3ObjectStore::new(bucket.clone(), endpoint.clone()).await)
        }
    }
}
