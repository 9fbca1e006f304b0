use super::{AssetCatalog, AudioAsset, AudioCategory};
use crate::{
    error::{CallError, CallResult},
    storage::{AccessPolicy, ObjectStorage, UPLOAD_PREFIX},
    utils::sanitize_file_name,
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const SUPPORTED_CONTENT_TYPE: &str = "audio/mpeg";
const KEY_MARKER: &str = "eldercall";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

pub struct AssetIngest {
    catalog: Arc<AssetCatalog>,
    storage: Arc<dyn ObjectStorage>,
}

impl AssetIngest {
    pub fn new(catalog: Arc<AssetCatalog>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { catalog, storage }
    }

    pub async fn ingest(
        &self,
        file: Option<UploadedFile>,
        friendly_name: &str,
        category: &str,
    ) -> CallResult<AudioAsset> {
        let file = file.ok_or(CallError::MissingFile)?;
        if file.content_type != SUPPORTED_CONTENT_TYPE {
            return Err(CallError::UnsupportedFormat(file.content_type));
        }
        let friendly_name = friendly_name.trim();
        let category = category.trim();
        if friendly_name.is_empty() || category.is_empty() {
            return Err(CallError::MissingFields);
        }
        let category: AudioCategory = category.parse()?;
        if self.catalog.contains(friendly_name, None).await {
            return Err(CallError::DuplicateAsset);
        }

        let key = storage_key(&file.file_name);
        let url = self
            .storage
            .upload(
                &key,
                file.bytes,
                SUPPORTED_CONTENT_TYPE,
                AccessPolicy::PublicRead,
            )
            .await
            .map_err(CallError::provider)?;

        match self
            .catalog
            .register_asset(friendly_name, category, &url)
            .await
        {
            Ok(asset) => {
                info!(friendly_name, %category, key, "audio asset ingested");
                Ok(asset)
            }
            Err(e) => {
                warn!(friendly_name, key, "uploaded object left unregistered: {}", e);
                Err(e)
            }
        }
    }
}

/// `audio/<unix-millis>-eldercall-<random>-<original filename>`
pub fn storage_key(original_name: &str) -> String {
    format!(
        "{}/{}-{}-{}-{}",
        UPLOAD_PREFIX,
        Utc::now().timestamp_millis(),
        KEY_MARKER,
        Uuid::new_v4().simple(),
        sanitize_file_name(original_name)
    )
}
