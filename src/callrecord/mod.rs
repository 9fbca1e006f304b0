use crate::{error::CallError, telephony::is_terminal_status};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use tokio::sync::Mutex;

mod storage;
pub use storage::StorageCallRecordStore;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Outbound,
    Inbound,
}

impl CallDirection {
    /// Maps provider direction labels such as `outbound-api` or `inbound`.
    pub fn from_provider(direction: &str) -> Option<Self> {
        if direction.starts_with("outbound") {
            Some(CallDirection::Outbound)
        } else if direction == "inbound" {
            Some(CallDirection::Inbound)
        } else {
            None
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Outbound => f.write_str("outbound"),
            CallDirection::Inbound => f.write_str("inbound"),
        }
    }
}

impl FromStr for CallDirection {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outbound" => Ok(CallDirection::Outbound),
            "inbound" => Ok(CallDirection::Inbound),
            other => Err(CallError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub call_sid: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_name: Option<String>,
    pub phone_number: String,
    pub call_direction: CallDirection,
    pub call_duration: u64,
    pub status: String,
    pub call_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn is_live(&self) -> bool {
        !is_terminal_status(&self.status)
    }

    /// Applies a status event. `updated_at` only moves when something
    /// changed; returns whether it did.
    pub fn apply_status(&mut self, status: &str, duration: Option<u64>) -> bool {
        let duration = duration.unwrap_or(self.call_duration);
        if self.status == status && self.call_duration == duration {
            return false;
        }
        self.status = status.to_string();
        self.call_duration = duration;
        self.updated_at = Utc::now();
        true
    }
}

#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn save(&self, record: CallRecord) -> Result<()>;
    async fn find_by_id(&self, call_id: &str) -> Result<Option<CallRecord>>;
    /// The newest non-terminal record of `user_id` whose id is in `candidate_ids`.
    async fn find_active_for_user(
        &self,
        user_id: &str,
        candidate_ids: &[String],
    ) -> Result<Option<CallRecord>>;
    async fn list_all(&self) -> Result<Vec<CallRecord>>;
    async fn list_by_direction(&self, direction: CallDirection) -> Result<Vec<CallRecord>>;
    /// Overwrites status (and duration when given). `None` for unknown ids.
    async fn update_status(
        &self,
        call_id: &str,
        status: &str,
        duration: Option<u64>,
    ) -> Result<Option<CallRecord>>;
}

#[derive(Default)]
pub struct MemoryCallRecordStore {
    records: Mutex<HashMap<String, CallRecord>>,
}

impl MemoryCallRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_records(records: Vec<CallRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|r| (r.call_sid.clone(), r))
                    .collect(),
            ),
        }
    }

    async fn sorted(&self, filter: impl Fn(&CallRecord) -> bool) -> Vec<CallRecord> {
        let records = self.records.lock().await;
        let mut matched: Vec<CallRecord> = records.values().filter(|&r| filter(r)).cloned().collect();
        matched.sort_by(|a, b| {
            a.call_date
                .cmp(&b.call_date)
                .then_with(|| a.call_sid.cmp(&b.call_sid))
        });
        matched
    }
}

#[async_trait]
impl CallRecordStore for MemoryCallRecordStore {
    async fn save(&self, record: CallRecord) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(record.call_sid.clone(), record);
        Ok(())
    }

    async fn find_by_id(&self, call_id: &str) -> Result<Option<CallRecord>> {
        Ok(self.records.lock().await.get(call_id).cloned())
    }

    async fn find_active_for_user(
        &self,
        user_id: &str,
        candidate_ids: &[String],
    ) -> Result<Option<CallRecord>> {
        let records = self.records.lock().await;
        Ok(candidate_ids
            .iter()
            .filter_map(|id| records.get(id))
            .filter(|r| r.user_id == user_id && r.is_live())
            .max_by(|a, b| {
                a.call_date
                    .cmp(&b.call_date)
                    .then_with(|| a.call_sid.cmp(&b.call_sid))
            })
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<CallRecord>> {
        Ok(self.sorted(|_| true).await)
    }

    async fn list_by_direction(&self, direction: CallDirection) -> Result<Vec<CallRecord>> {
        Ok(self.sorted(|r| r.call_direction == direction).await)
    }

    async fn update_status(
        &self,
        call_id: &str,
        status: &str,
        duration: Option<u64>,
    ) -> Result<Option<CallRecord>> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(call_id) else {
            return Ok(None);
        };
        record.apply_status(status, duration);
        Ok(Some(record.clone()))
    }
}
