use super::{CreateCallRequest, ProviderCall, ProviderCallLog, TelephonyCapability};
use crate::{config::TelephonyConfig, version};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

const API_VERSION: &str = "2010-04-01";
const LIST_PAGE_SIZE: usize = 50;
const MAX_LIST_PAGES: usize = 20;

/// Twilio Programmable Voice over its REST API.
pub struct TwilioClient {
    client: Client,
    base: Url,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct TwilioCall {
    sid: String,
    status: String,
    direction: Option<String>,
    to: Option<String>,
    from: Option<String>,
    // Twilio sends the duration as a string, or null while the call is live
    duration: Option<String>,
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioCallList {
    calls: Vec<TwilioCall>,
    #[serde(default)]
    next_page_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    code: Option<u32>,
    message: Option<String>,
}

impl From<TwilioCall> for ProviderCallLog {
    fn from(call: TwilioCall) -> Self {
        Self {
            duration: call.duration.as_deref().and_then(|d| d.parse().ok()),
            sid: call.sid,
            to: call.to,
            from: call.from,
            status: call.status,
            direction: call.direction,
            start_time: call.start_time,
        }
    }
}

impl TwilioClient {
    pub fn new(config: &TelephonyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(version::get_useragent())
            .build()?;
        Ok(Self {
            client,
            base: Url::parse(&config.api_base)?,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn calls_url(&self, suffix: &str) -> Result<Url> {
        Ok(self.base.join(&format!(
            "/{}/Accounts/{}/Calls{}.json",
            API_VERSION, self.account_sid, suffix
        ))?)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TwilioError>(&body) {
            Ok(TwilioError {
                code: Some(code),
                message: Some(message),
            }) => Err(anyhow!("twilio {} ({}): {}", status, code, message)),
            _ => Err(anyhow!("twilio {}: {}", status, body)),
        }
    }

    async fn fetch_page(&self, url: Url, query: &[(&str, String)]) -> Result<TwilioCallList> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Fetches the first page, then follows `next_page_uri` while
    /// `all_pages` is set, up to `MAX_LIST_PAGES`.
    async fn fetch_calls(
        &self,
        query: &[(&str, String)],
        all_pages: bool,
    ) -> Result<Vec<TwilioCall>> {
        let mut page = self.fetch_page(self.calls_url("")?, query).await?;
        let mut calls = std::mem::take(&mut page.calls);
        let mut pages = 1;
        while all_pages {
            let Some(next) = page.next_page_uri.take().filter(|uri| !uri.is_empty()) else {
                break;
            };
            if pages >= MAX_LIST_PAGES {
                warn!(pages, "twilio call listing truncated");
                break;
            }
            // the next page uri already carries the original filters
            page = self.fetch_page(self.base.join(&next)?, &[]).await?;
            calls.append(&mut page.calls);
            pages += 1;
        }
        Ok(calls)
    }
}

#[async_trait]
impl TelephonyCapability for TwilioClient {
    async fn create_call(&self, request: CreateCallRequest) -> Result<ProviderCall> {
        let start_time = Instant::now();
        let mut form: Vec<(&str, String)> = vec![
            ("To", request.to.clone()),
            ("From", request.from.clone()),
            ("Twiml", request.script.to_twiml()),
            ("StatusCallback", request.status_callback.clone()),
            ("StatusCallbackMethod", "POST".to_string()),
        ];
        for event in &request.events {
            form.push(("StatusCallbackEvent", event.clone()));
        }

        let response = self
            .client
            .post(self.calls_url("")?)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;
        let call: TwilioCall = Self::check(response).await?.json().await?;
        info!(
            call_id = call.sid,
            to = request.to,
            status = call.status,
            elapsed = start_time.elapsed().as_millis(),
            "twilio call created"
        );
        Ok(ProviderCall {
            id: call.sid,
            direction: call.direction,
            status: call.status,
        })
    }

    async fn list_calls(&self, status: &str) -> Result<Vec<String>> {
        let calls = self
            .fetch_calls(
                &[
                    ("Status", status.to_string()),
                    ("PageSize", LIST_PAGE_SIZE.to_string()),
                ],
                true,
            )
            .await?;
        debug!(status, count = calls.len(), "twilio calls listed");
        Ok(calls.into_iter().map(|c| c.sid).collect())
    }

    async fn recent_calls(&self, limit: usize) -> Result<Vec<ProviderCallLog>> {
        let calls = self
            .fetch_calls(&[("PageSize", limit.to_string())], false)
            .await?;
        Ok(calls.into_iter().map(ProviderCallLog::from).collect())
    }

    async fn update_call_status(&self, call_id: &str, status: &str) -> Result<()> {
        let response = self
            .client
            .post(self.calls_url(&format!("/{}", call_id))?)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", status)])
            .send()
            .await?;
        Self::check(response).await?;
        info!(call_id, status, "twilio call updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::script::{CallScript, VoiceAction};
    use axum::{
        extract::{Form, Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use serde_json::json;
    use std::{net::SocketAddr, sync::Arc};
    use tokio::{net::TcpListener, sync::Mutex};

    type Captured = Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>;

    async fn create(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Form(form): Form<Vec<(String, String)>>,
    ) -> Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let to = form
            .iter()
            .find(|(k, _)| k == "To")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        captured.lock().await.push((auth, form));
        if to == "+10000000000" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"code": 21211, "message": "Invalid 'To' Phone Number"})),
            )
                .into_response();
        }
        (
            StatusCode::CREATED,
            Json(json!({
                "sid": "CA123",
                "status": "queued",
                "direction": "outbound-api",
                "to": to,
                "from": "+15550000000",
                "duration": null,
                "start_time": null
            })),
        )
            .into_response()
    }

    async fn list(Query(query): Query<Vec<(String, String)>>) -> Json<serde_json::Value> {
        let value = |key: &str| {
            query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        let (calls, next) = match (value("Status"), value("Page")) {
            (Some("in-progress"), None) => (
                json!([{"sid": "CA1", "status": "in-progress"}]),
                json!("/2010-04-01/Accounts/AC123/Calls.json?Status=in-progress&PageSize=50&Page=1&PageToken=PA1"),
            ),
            (Some("in-progress"), Some("1")) => (
                json!([{"sid": "CA2", "status": "in-progress"}]),
                json!(null),
            ),
            (Some(_), _) => (json!([]), json!(null)),
            (None, _) => (
                json!([
                    {"sid": "CA1", "status": "in-progress", "direction": "outbound-api", "duration": null},
                    {"sid": "CA0", "status": "completed", "direction": "outbound-api", "duration": "42"}
                ]),
                json!("/2010-04-01/Accounts/AC123/Calls.json?PageSize=20&Page=1&PageToken=PA0"),
            ),
        };
        Json(json!({ "calls": calls, "next_page_uri": next }))
    }

    async fn update(
        State(captured): State<Captured>,
        Path(sid): Path<String>,
        Form(form): Form<Vec<(String, String)>>,
    ) -> Response {
        captured.lock().await.push((sid.clone(), form));
        if sid == "CA404.json" {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"code": 20404, "message": "not found"})),
            )
                .into_response();
        }
        Json(json!({"sid": sid, "status": "completed"})).into_response()
    }

    async fn fake_twilio() -> (TwilioClient, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/2010-04-01/Accounts/AC123/Calls.json",
                post(create).get(list),
            )
            .route("/2010-04-01/Accounts/AC123/Calls/{sid}", post(update))
            .with_state(captured.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        let config = TelephonyConfig {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            api_base: format!("http://{}", addr),
            ..Default::default()
        };
        (TwilioClient::new(&config).unwrap(), captured)
    }

    fn script() -> CallScript {
        CallScript::new(vec![
            VoiceAction::Play {
                url: "https://cdn/h.mp3".to_string(),
            },
            VoiceAction::Say {
                text: "hold on".to_string(),
            },
            VoiceAction::Dial {
                number: "+17770000000".to_string(),
            },
        ])
    }

    #[tokio::test]
    async fn test_create_call_posts_form() {
        let (client, captured) = fake_twilio().await;
        let call = client
            .create_call(CreateCallRequest {
                script: script(),
                to: "+15551234567".to_string(),
                from: "+15550000000".to_string(),
                status_callback: "https://example.com/status".to_string(),
                events: super::super::STATUS_CALLBACK_EVENTS
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
            })
            .await
            .unwrap();
        assert_eq!(call.id, "CA123");
        assert_eq!(call.status, "queued");
        assert_eq!(call.direction.as_deref(), Some("outbound-api"));

        let captured = captured.lock().await;
        let (auth, form) = &captured[0];
        assert!(auth.starts_with("Basic "));
        let value = |key: &str| {
            form.iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(value("To"), vec!["+15551234567"]);
        assert_eq!(value("StatusCallbackMethod"), vec!["POST"]);
        assert_eq!(
            value("StatusCallbackEvent"),
            vec!["initiated", "ringing", "answered", "completed"]
        );
        assert!(value("Twiml")[0].contains("<Dial>+17770000000</Dial>"));
    }

    #[tokio::test]
    async fn test_create_call_surfaces_provider_message() {
        let (client, _) = fake_twilio().await;
        let err = client
            .create_call(CreateCallRequest {
                script: script(),
                to: "+10000000000".to_string(),
                from: "+15550000000".to_string(),
                status_callback: "https://example.com/status".to_string(),
                events: vec![],
            })
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("21211"), "{}", message);
        assert!(message.contains("Invalid 'To' Phone Number"));
    }

    #[tokio::test]
    async fn test_list_and_recent_calls() {
        let (client, _) = fake_twilio().await;
        // live listings follow next_page_uri to the end
        assert_eq!(
            client.list_calls("in-progress").await.unwrap(),
            vec!["CA1", "CA2"]
        );
        assert!(client.list_calls("ringing").await.unwrap().is_empty());

        // recent calls stop at the first page
        let recent = client.recent_calls(20).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].duration, None);
        assert_eq!(recent[1].duration, Some(42));
    }

    #[tokio::test]
    async fn test_update_call_status() {
        let (client, captured) = fake_twilio().await;
        client.update_call_status("CA1", "completed").await.unwrap();
        {
            let captured = captured.lock().await;
            assert_eq!(captured[0].0, "CA1.json");
            assert_eq!(
                captured[0].1,
                vec![("Status".to_string(), "completed".to_string())]
            );
        }
        assert!(client
            .update_call_status("CA404", "completed")
            .await
            .is_err());
    }
}
