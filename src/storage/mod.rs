use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::{
    aws::AmazonS3Builder, azure::MicrosoftAzureBuilder, gcp::GoogleCloudStorageBuilder,
    local::LocalFileSystem, path::Path as ObjectPath, Attribute, Attributes, ObjectMeta,
    ObjectStore, PutOptions,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum S3Vendor {
    #[default]
    AWS,
    GCP,
    Azure,
    Aliyun,
    Tencent,
    Minio,
    DigitalOcean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        path: String,
        public_base_url: Option<String>,
    },
    S3 {
        vendor: S3Vendor,
        bucket: String,
        region: String,
        access_key: String,
        secret_key: String,
        endpoint: Option<String>,
        prefix: Option<String>,
        public_base_url: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            path: "storage".to_string(),
            public_base_url: None,
        }
    }
}

/// Local uploads are served by the app itself under this route.
pub const LOCAL_MEDIA_ROUTE: &str = "/media";
/// Uploaded audio lives under this key prefix. Only this prefix is served
/// publicly; the call ledger and other internal objects sit beside it.
pub const UPLOAD_PREFIX: &str = "audio";
const DEFAULT_LOCAL_PUBLIC_BASE: &str = "http://localhost:8080/media";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    PublicRead,
    Private,
}

/// Where uploaded bytes end up. Returns the address the caller should record.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        policy: AccessPolicy,
    ) -> Result<String>;
}

#[derive(Clone)]
pub struct Storage {
    inner: Arc<dyn ObjectStore>,
    prefix: String,
    is_local: bool,
    local_root: Option<PathBuf>,
    public_base_url: String,
    location_base: String,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::Local {
                path,
                public_base_url,
            } => {
                let root = PathBuf::from(path);
                std::fs::create_dir_all(&root)
                    .with_context(|| format!("create storage directory {}", path))?;
                let store = LocalFileSystem::new_with_prefix(&root)?;
                Ok(Self {
                    inner: Arc::new(store),
                    prefix: "".to_string(),
                    is_local: true,
                    location_base: format!("file://{}", root.to_string_lossy()),
                    local_root: Some(root),
                    public_base_url: public_base_url
                        .clone()
                        .unwrap_or_else(|| DEFAULT_LOCAL_PUBLIC_BASE.to_string()),
                })
            }
            StorageConfig::S3 {
                vendor,
                bucket,
                region,
                access_key,
                secret_key,
                endpoint,
                prefix,
                public_base_url,
            } => {
                let endpoint = endpoint.as_deref().filter(|ep| !ep.is_empty());
                let store: Arc<dyn ObjectStore> = match vendor {
                    S3Vendor::AWS
                    | S3Vendor::Aliyun
                    | S3Vendor::Tencent
                    | S3Vendor::Minio
                    | S3Vendor::DigitalOcean => {
                        let mut builder = AmazonS3Builder::new()
                            .with_bucket_name(bucket)
                            .with_region(region)
                            .with_access_key_id(access_key)
                            .with_secret_access_key(secret_key);
                        if let Some(ep) = endpoint {
                            builder = builder
                                .with_endpoint(ep)
                                .with_virtual_hosted_style_request(false)
                                .with_allow_http(ep.starts_with("http://"));
                        }
                        Arc::new(builder.build()?)
                    }
                    S3Vendor::GCP => Arc::new(
                        GoogleCloudStorageBuilder::new()
                            .with_bucket_name(bucket)
                            .with_service_account_key(secret_key)
                            .build()?,
                    ),
                    S3Vendor::Azure => Arc::new(
                        MicrosoftAzureBuilder::new()
                            .with_container_name(bucket)
                            .with_account(access_key)
                            .with_access_key(secret_key)
                            .build()?,
                    ),
                };

                let public_base_url = match (public_base_url, endpoint) {
                    (Some(base), _) => base.clone(),
                    (None, Some(ep)) => format!("{}/{}", ep.trim_end_matches('/'), bucket),
                    (None, None) => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
                };

                Ok(Self {
                    inner: store,
                    prefix: prefix.clone().unwrap_or_default(),
                    is_local: false,
                    local_root: None,
                    public_base_url,
                    location_base: format!("s3://{}", bucket),
                })
            }
        }
    }

    fn normalize_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        }
    }

    fn object_path(&self, path: &str) -> ObjectPath {
        ObjectPath::from(self.normalize_path(path))
    }

    pub async fn write(&self, path: &str, bytes: Bytes) -> Result<()> {
        if let Some(parent) = self.local_path(path).and_then(|p| p.parent().map(|p| p.to_owned()))
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.inner.put(&self.object_path(path), bytes.into()).await?;
        Ok(())
    }

    pub async fn read(&self, path: &str) -> Result<Bytes> {
        let result = self.inner.get(&self.object_path(path)).await?;
        Ok(result.bytes().await?)
    }

    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>> {
        let prefix = self.object_path(prefix.unwrap_or(""));
        let mut stream = self.inner.list(Some(&prefix));
        let mut files = Vec::new();
        while let Some(item) = stream.next().await {
            files.push(item?);
        }
        Ok(files)
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn local_root(&self) -> Option<&PathBuf> {
        self.local_root.as_ref()
    }

    pub fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.local_root
            .as_ref()
            .map(|root| root.join(path.trim_start_matches('/')))
    }

    /// Address recorded for an object: a public URL, or the raw storage
    /// location when the object is private.
    pub fn url_for(&self, path: &str, policy: AccessPolicy) -> String {
        let normalized = self.normalize_path(path);
        match policy {
            AccessPolicy::PublicRead => {
                format!("{}/{}", self.public_base_url.trim_end_matches('/'), normalized)
            }
            AccessPolicy::Private => format!("{}/{}", self.location_base, normalized),
        }
    }
}

#[async_trait]
impl ObjectStorage for Storage {
    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        policy: AccessPolicy,
    ) -> Result<String> {
        let size = bytes.len();
        if self.is_local {
            // LocalFileSystem rejects object attributes
            self.write(key, bytes).await?;
        } else {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            let mut opts = PutOptions::default();
            opts.attributes = attributes;
            self.inner
                .put_opts(&self.object_path(key), bytes.into(), opts)
                .await?;
        }
        let url = self.url_for(key, policy);
        info!(key, size, content_type, ?policy, url, "object uploaded");
        Ok(url)
    }
}
