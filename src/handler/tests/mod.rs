use crate::{
    app::{create_router, AppStateBuilder},
    config::Config,
    storage::StorageConfig,
    telephony::{MockTelephonyCapability, ProviderCall},
    user::{Role, User},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const BOUNDARY: &str = "eldercall-test-boundary";

fn users() -> Vec<User> {
    vec![
        User {
            id: "u1".to_string(),
            fullname: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: Some("+17770000000".to_string()),
            role: Role::User,
        },
        User {
            id: "u2".to_string(),
            fullname: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            phone_number: None,
            role: Role::User,
        },
    ]
}

struct TestApp {
    router: Router,
    config: Config,
    _dir: TempDir,
}

impl TestApp {
    async fn new(telephony: MockTelephonyCapability) -> Self {
        let dir = tempdir().unwrap();
        let mut config = Config {
            storage: StorageConfig::Local {
                path: dir.path().join("media").to_string_lossy().to_string(),
                public_base_url: Some("http://localhost:8080/media".to_string()),
            },
            users: users(),
            ..Default::default()
        };
        config.auth.token_secret = Some("test-secret".to_string());
        let state = AppStateBuilder::new()
            .config(config.clone())
            .telephony(std::sync::Arc::new(telephony))
            .build()
            .await
            .unwrap();
        Self {
            router: create_router(state),
            config,
            _dir: dir,
        }
    }

    fn token(&self, user_id: &str) -> String {
        crate::auth::TokenSigner::new(self.config.auth.token_secret.as_deref().unwrap())
            .issue_token(user_id, Duration::from_secs(60))
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn make_call_request(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::post("/make-call").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn upload_request(name: &str, category: &str, content_type: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"friendlyName\"\r\n\r\n{name}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"category\"\r\n\r\n{category}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"audiofile\"; filename=\"happy birthday.mp3\"\r\n\
         Content-Type: {content_type}\r\n\r\nID3-fake-mpeg\r\n--{b}--\r\n",
        b = BOUNDARY,
    );
    Request::post("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn accepting_telephony() -> MockTelephonyCapability {
    let mut telephony = MockTelephonyCapability::new();
    telephony.expect_create_call().returning(|_| {
        Ok(ProviderCall {
            id: "CA123".to_string(),
            direction: Some("outbound-api".to_string()),
            status: "queued".to_string(),
        })
    });
    telephony
}

#[tokio::test]
async fn test_upload_then_play_audio() {
    let app = TestApp::new(MockTelephonyCapability::new()).await;

    let response = app
        .send(Request::get("/play-audio/birthday").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(upload_request("Happy1", "birthday", "audio/mpeg")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let link = body["assetLink"].as_str().unwrap().to_string();
    assert!(link.starts_with("http://localhost:8080/media/audio/"), "{}", link);
    assert!(link.ends_with("-happy_birthday.mp3"), "{}", link);
    assert_eq!(body["asset"]["category"], "birthday");

    let response = app.send(upload_request("Happy1", "birthday", "audio/mpeg")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .send(Request::get("/play-audio/birthday").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["assetLink"], link.as_str());

    let response = app
        .send(Request::get("/assets/birthday").body(Body::empty()).unwrap())
        .await;
    let body = json_body(response).await;
    assert_eq!(body["assets"][0]["friendlyName"], "Happy1");

    let media_path = link.trim_start_matches("http://localhost:8080");
    let response = app
        .send(Request::get(media_path).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_media_route_serves_only_uploads() {
    let app = TestApp::new(MockTelephonyCapability::new()).await;
    let media = app._dir.path().join("media");
    std::fs::create_dir_all(media.join("calls")).unwrap();
    std::fs::write(media.join("calls/CA123.json"), r#"{"callSid":"CA123"}"#).unwrap();
    std::fs::write(media.join("catalog.json"), "[]").unwrap();

    for path in [
        "/media/calls/CA123.json",
        "/media/catalog.json",
        "/media/audio/../calls/CA123.json",
    ] {
        let response = app
            .send(Request::get(path).body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn test_upload_validation() {
    let app = TestApp::new(MockTelephonyCapability::new()).await;

    let response = app.send(upload_request("Song", "birthday", "audio/wav")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"]
        .as_str()
        .unwrap()
        .contains("audio/wav"));

    let response = app.send(upload_request("", "birthday", "audio/mpeg")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.send(upload_request("Song", "funeral", "audio/mpeg")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(Request::get("/play-audio/funeral").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_make_call_flow() {
    let app = TestApp::new(accepting_telephony()).await;
    let response = app.send(upload_request("Happy1", "birthday", "audio/mpeg")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = r#"{"calleeNumber":"+15551234567","audioCategory":"birthday"}"#;
    let response = app.send(make_call_request(None, body)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.send(make_call_request(Some("u1:1:forged"), body)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(make_call_request(Some(&app.token("u2")), body))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(make_call_request(
            Some(&app.token("u1")),
            r#"{"calleeNumber":"+15551234567","audioCategory":"wedding"}"#,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(make_call_request(Some(&app.token("u1")), body))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["callRecord"]["callSid"], "CA123");
    assert_eq!(json["callRecord"]["status"], "queued");
    assert_eq!(json["callRecord"]["callDirection"], "outbound");

    let response = app
        .send(
            Request::post("/status")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "CallSid=CA123&CallStatus=completed&CallDuration=12&AccountSid=AC1",
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(Request::get("/customlogs").body(Body::empty()).unwrap())
        .await;
    let json = json_body(response).await;
    assert_eq!(json["callLogs"][0]["status"], "completed");
    assert_eq!(json["callLogs"][0]["callDuration"], 12);

    let response = app
        .send(
            Request::get("/status?CallSid=CA123&CallStatus=completed")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(Request::get("/outboundCallLogs").body(Body::empty()).unwrap())
        .await;
    let json = json_body(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["status"], "completed");
    assert_eq!(json["data"][0]["callDuration"], 12);
}

#[tokio::test]
async fn test_make_call_rejects_bad_bodies_as_json() {
    let mut telephony = MockTelephonyCapability::new();
    telephony.expect_create_call().never();
    let app = TestApp::new(telephony).await;

    // anonymous callers get 401 whatever the body looks like
    for request in [
        Request::post("/make-call")
            .body(Body::from(r#"{"calleeNumber":"+1555"}"#))
            .unwrap(),
        make_call_request(None, "not json"),
    ] {
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "authentication required");
    }

    let token = app.token("u1");
    let missing_content_type = Request::post("/make-call")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(r#"{"calleeNumber":"+1555","audioCategory":"birthday"}"#))
        .unwrap();
    for request in [
        missing_content_type,
        make_call_request(Some(&token), "not json"),
        make_call_request(
            Some(&token),
            r#"{"calleeNumber":15551234567,"audioCategory":"birthday"}"#,
        ),
    ] {
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body:"));
    }
}

#[tokio::test]
async fn test_unset_secret_signs_with_random_key() {
    let dir = tempdir().unwrap();
    let config = Config {
        storage: StorageConfig::Local {
            path: dir.path().to_string_lossy().to_string(),
            public_base_url: None,
        },
        users: users(),
        ..Default::default()
    };
    assert!(config.auth.token_secret.is_none());
    async fn build(config: &Config) -> crate::app::AppState {
        AppStateBuilder::new()
            .config(config.clone())
            .telephony(std::sync::Arc::new(accepting_telephony()))
            .build()
            .await
            .unwrap()
    }
    let state = build(&config).await;
    let other = build(&config).await;

    let ttl = Duration::from_secs(60);
    for secret in ["change-me", ""] {
        let forged = crate::auth::TokenSigner::new(secret)
            .issue_token("u1", ttl)
            .unwrap();
        assert_eq!(state.signer.verify(&forged), None, "{:?}", secret);
    }
    let token = state.signer.issue_token("u1", ttl).unwrap();
    assert_eq!(state.signer.verify(&token).as_deref(), Some("u1"));
    assert_eq!(other.signer.verify(&token), None);

    let router = create_router(state);
    let response = router
        .oneshot(make_call_request(
            Some(&crate::auth::TokenSigner::new("change-me").issue_token("u1", ttl).unwrap()),
            r#"{"calleeNumber":"+15551234567","audioCategory":"birthday"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_webhook_always_acknowledges() {
    let app = TestApp::new(MockTelephonyCapability::new()).await;
    for request in [
        Request::post("/status")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("CallSid=CA404&CallStatus=ringing"))
            .unwrap(),
        Request::post("/status")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
        Request::get("/status").body(Body::empty()).unwrap(),
    ] {
        assert_eq!(app.send(request).await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_end_call_without_live_calls() {
    let mut telephony = MockTelephonyCapability::new();
    telephony.expect_list_calls().returning(|_| Ok(vec![]));
    let app = TestApp::new(telephony).await;

    let response = app
        .send(Request::post("/end-call").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::post("/end-call")
                .header(header::AUTHORIZATION, format!("Bearer {}", app.token("u1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "no ongoing calls found");
}

#[tokio::test]
async fn test_provider_logs_failure_is_500() {
    let mut telephony = MockTelephonyCapability::new();
    telephony
        .expect_recent_calls()
        .withf(|limit| *limit == 20)
        .returning(|_| Err(anyhow::anyhow!("twilio 503")));
    let app = TestApp::new(telephony).await;
    let response = app
        .send(Request::get("/twilioLogs").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_user_by_id() {
    let app = TestApp::new(MockTelephonyCapability::new()).await;
    let response = app
        .send(Request::get("/userbyid/u1").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"]["fullname"], "Ada");

    let response = app
        .send(Request::get("/userbyid/nobody").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
