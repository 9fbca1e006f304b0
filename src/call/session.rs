use super::script::CallScriptBuilder;
use crate::{
    asset::AudioCategory,
    callrecord::{CallDirection, CallRecord, CallRecordStore},
    error::{CallError, CallResult},
    telephony::{
        CreateCallRequest, ProviderCallLog, TelephonyCapability, LIVE_STATUSES, STATUS_CALLBACK_EVENTS,
        STATUS_COMPLETED,
    },
    user::User,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_PROVIDER_LOG_LIMIT: usize = 20;

/// Body of a call request as posted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCallRequest {
    pub callee_number: Option<String>,
    pub callee_name: Option<String>,
    #[serde(rename = "calldirection", alias = "callDirection")]
    pub call_direction: Option<String>,
    pub audio_category: Option<String>,
}

/// Provider-facing addressing shared by every outbound call.
#[derive(Debug, Clone)]
pub struct CallRouting {
    pub from_number: String,
    pub status_callback_url: String,
}

pub struct CallSessionManager {
    scripts: CallScriptBuilder,
    telephony: Arc<dyn TelephonyCapability>,
    records: Arc<dyn CallRecordStore>,
    routing: CallRouting,
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> CallResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(CallError::MissingField(field))
}

impl CallSessionManager {
    pub fn new(
        scripts: CallScriptBuilder,
        telephony: Arc<dyn TelephonyCapability>,
        records: Arc<dyn CallRecordStore>,
        routing: CallRouting,
    ) -> Self {
        Self {
            scripts,
            telephony,
            records,
            routing,
        }
    }

    pub async fn place_call(
        &self,
        user: Option<&User>,
        request: PlaceCallRequest,
    ) -> CallResult<CallRecord> {
        let user = user.ok_or(CallError::Unauthenticated)?;
        let callback_number = user
            .callback_number()
            .ok_or(CallError::MissingCallbackNumber)?;
        let callee_number = required(&request.callee_number, "calleeNumber")?;
        let category: AudioCategory =
            required(&request.audio_category, "audioCategory")?.parse()?;
        let explicit_direction = match request
            .call_direction
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            Some(direction) => Some(direction.parse::<CallDirection>()?),
            None => None,
        };

        let script = self
            .scripts
            .build(callee_number, category, Some(callback_number))
            .await
            .map_err(|e| match e {
                CallError::NotFound(_) => CallError::AudioCategoryEmpty(category.to_string()),
                other => other,
            })?;

        let accepted = self
            .telephony
            .create_call(CreateCallRequest {
                script,
                to: callee_number.to_string(),
                from: self.routing.from_number.clone(),
                status_callback: self.routing.status_callback_url.clone(),
                events: STATUS_CALLBACK_EVENTS.iter().map(|e| e.to_string()).collect(),
            })
            .await
            .map_err(CallError::provider)?;

        let call_direction = explicit_direction
            .or_else(|| {
                accepted
                    .direction
                    .as_deref()
                    .and_then(CallDirection::from_provider)
            })
            .unwrap_or(CallDirection::Outbound);
        let now = Utc::now();
        let record = CallRecord {
            call_sid: accepted.id,
            user_id: user.id.clone(),
            callee_name: request
                .callee_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            phone_number: callee_number.to_string(),
            call_direction,
            call_duration: 0,
            status: accepted.status,
            call_date: now,
            updated_at: now,
        };
        self.records
            .save(record.clone())
            .await
            .map_err(CallError::internal)?;
        info!(
            call_id = record.call_sid,
            user_id = record.user_id,
            %category,
            status = record.status,
            "call placed"
        );
        Ok(record)
    }

    /// Asks the provider to complete the caller's newest live call.
    pub async fn end_call(&self, user: Option<&User>) -> CallResult<CallRecord> {
        let user = user.ok_or(CallError::Unauthenticated)?;
        let mut live_ids = Vec::new();
        for status in LIVE_STATUSES {
            let ids = self
                .telephony
                .list_calls(status)
                .await
                .map_err(CallError::provider)?;
            live_ids.extend(ids);
        }
        if live_ids.is_empty() {
            return Err(CallError::NoOngoingCalls);
        }

        let record = self
            .records
            .find_active_for_user(&user.id, &live_ids)
            .await
            .map_err(CallError::internal)?
            .ok_or(CallError::NoOngoingCalls)?;

        self.telephony
            .update_call_status(&record.call_sid, STATUS_COMPLETED)
            .await
            .map_err(CallError::provider)?;
        info!(call_id = record.call_sid, user_id = user.id, "call ended");
        Ok(record)
    }

    /// Applies a provider status event. Never fails: the provider must always
    /// get an acknowledgement.
    pub async fn on_webhook(&self, call_id: &str, status: &str, duration: Option<u64>) {
        match self.records.update_status(call_id, status, duration).await {
            Ok(Some(record)) => info!(
                call_id,
                status,
                duration = record.call_duration,
                "call status updated"
            ),
            Ok(None) => warn!(call_id, status, "status event for unknown call dropped"),
            Err(e) => warn!(call_id, status, "failed to apply status event: {:#}", e),
        }
    }

    pub async fn provider_logs(&self, limit: usize) -> CallResult<Vec<ProviderCallLog>> {
        self.telephony
            .recent_calls(limit)
            .await
            .map_err(CallError::provider)
    }

    pub async fn list_all(&self) -> CallResult<Vec<CallRecord>> {
        self.records.list_all().await.map_err(CallError::internal)
    }

    pub async fn list_outbound(&self) -> CallResult<Vec<CallRecord>> {
        self.records
            .list_by_direction(CallDirection::Outbound)
            .await
            .map_err(CallError::internal)
    }
}
