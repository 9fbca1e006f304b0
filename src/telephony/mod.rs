use crate::call::script::CallScript;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod twilio;
pub use twilio::TwilioClient;

/// Status events the provider is asked to report for every placed call.
pub const STATUS_CALLBACK_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];
/// Provider-side states in which a call can still be ended.
pub const LIVE_STATUSES: [&str; 3] = ["queued", "ringing", "in-progress"];
pub const STATUS_COMPLETED: &str = "completed";
const TERMINAL_STATUSES: [&str; 5] = ["completed", "busy", "failed", "no-answer", "canceled"];

pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

#[derive(Debug, Clone)]
pub struct CreateCallRequest {
    pub script: CallScript,
    pub to: String,
    pub from: String,
    pub status_callback: String,
    pub events: Vec<String>,
}

/// The provider's synchronous answer to a call request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub id: String,
    pub direction: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallLog {
    pub sid: String,
    pub to: Option<String>,
    pub from: Option<String>,
    pub status: String,
    pub direction: Option<String>,
    pub duration: Option<u64>,
    pub start_time: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelephonyCapability: Send + Sync {
    async fn create_call(&self, request: CreateCallRequest) -> Result<ProviderCall>;
    /// Ids of provider calls currently in `status`.
    async fn list_calls(&self, status: &str) -> Result<Vec<String>>;
    async fn recent_calls(&self, limit: usize) -> Result<Vec<ProviderCallLog>>;
    async fn update_call_status(&self, call_id: &str, status: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_status("completed"));
        assert!(is_terminal_status("no-answer"));
        for status in LIVE_STATUSES {
            assert!(!is_terminal_status(status));
        }
        assert!(!is_terminal_status("initiated"));
    }
}
