use super::{CallDirection, CallRecord, CallRecordStore, MemoryCallRecordStore};
use crate::storage::Storage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Keeps one `<call_sid>.json` document per call under `root` and serves
/// reads from an in-memory index rebuilt at startup.
///
/// Writes are serialized and reach storage before the index, so the index
/// never shows a state the ledger does not hold and the last write to a
/// record is also the last one persisted.
pub struct StorageCallRecordStore {
    index: MemoryCallRecordStore,
    storage: Storage,
    root: String,
    write_lock: Mutex<()>,
}

impl StorageCallRecordStore {
    pub async fn open(storage: Storage, root: &str) -> Result<Self> {
        let root = root.trim_matches('/').to_string();
        if let Some(dir) = storage.local_path(&root) {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create call record directory {}", dir.display()))?;
        }
        let mut records = Vec::new();
        for meta in storage.list(Some(&root)).await? {
            // listed locations carry the storage prefix, so re-address by file name
            let Some(file_name) = meta.location.filename().filter(|f| f.ends_with(".json")) else {
                continue;
            };
            let location = format!("{}/{}", root, file_name);
            let bytes = storage
                .read(&location)
                .await
                .with_context(|| format!("read call record {}", location))?;
            match serde_json::from_slice::<CallRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(location, "skipping unreadable call record: {}", e),
            }
        }
        info!(root, records = records.len(), "call record ledger loaded");
        Ok(Self {
            index: MemoryCallRecordStore::with_records(records),
            storage,
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, call_sid: &str) -> String {
        format!("{}/{}.json", self.root, crate::utils::sanitize_file_name(call_sid))
    }

    async fn persist(&self, record: &CallRecord) -> Result<()> {
        let content = serde_json::to_vec(record)?;
        self.storage
            .write(&self.path_for(&record.call_sid), Bytes::from(content))
            .await
            .with_context(|| format!("write call record {}", record.call_sid))
    }
}

#[async_trait]
impl CallRecordStore for StorageCallRecordStore {
    async fn save(&self, record: CallRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(&record).await?;
        self.index.save(record).await
    }

    async fn find_by_id(&self, call_id: &str) -> Result<Option<CallRecord>> {
        self.index.find_by_id(call_id).await
    }

    async fn find_active_for_user(
        &self,
        user_id: &str,
        candidate_ids: &[String],
    ) -> Result<Option<CallRecord>> {
        self.index.find_active_for_user(user_id, candidate_ids).await
    }

    async fn list_all(&self) -> Result<Vec<CallRecord>> {
        self.index.list_all().await
    }

    async fn list_by_direction(&self, direction: CallDirection) -> Result<Vec<CallRecord>> {
        self.index.list_by_direction(direction).await
    }

    async fn update_status(
        &self,
        call_id: &str,
        status: &str,
        duration: Option<u64>,
    ) -> Result<Option<CallRecord>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.index.find_by_id(call_id).await? else {
            return Ok(None);
        };
        if record.apply_status(status, duration) {
            self.persist(&record).await?;
            self.index.save(record.clone()).await?;
        }
        Ok(Some(record))
    }
}
