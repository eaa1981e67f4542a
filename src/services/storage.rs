use s3::creds::Credentials;
use s3::{Bucket, Region};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("HTTP download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Object storage for generated assets.
///
/// `upload` returns the public URL the asset is reachable at; `download`
/// accepts any URL (own bucket or an external one such as a provider CDN).
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        data: &[u8],
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

/// Cloudflare R2 (S3-compatible) storage client.
pub struct R2Storage {
    bucket: Box<Bucket>,
    http: reqwest::Client,
    /// Public base URL assets are served from, e.g. a CDN domain in front of
    /// the bucket.
    public_base_url: String,
}

impl R2Storage {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
        http: reqwest::Client,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            http,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ObjectStorage for R2Storage {
    async fn upload(
        &self,
        data: &[u8],
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        // Our own assets come straight from the bucket; anything else (base
        // product images, provider CDN overlays) over plain HTTP.
        if let Some(key) = url.strip_prefix(&self.public_base_url) {
            let response = self.bucket.get_object(key.trim_start_matches('/')).await?;
            return Ok(response.to_vec());
        }

        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
