use crate::{
    asset::{ingest::AssetIngest, AssetCatalog},
    auth::TokenSigner,
    call::{CallRouting, CallScriptBuilder, CallSessionManager},
    callrecord::{CallRecordStore, MemoryCallRecordStore, StorageCallRecordStore},
    config::{CallRecordConfig, Config},
    storage::{ObjectStorage, Storage, LOCAL_MEDIA_ROUTE, UPLOAD_PREFIX},
    telephony::{TelephonyCapability, TwilioClient},
    user::{MemoryUserDirectory, UserDirectory},
};
use anyhow::Result;
use axum::Router;
use rand::Rng;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
};
use tracing::{info, warn};

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub catalog: Arc<AssetCatalog>,
    pub ingest: AssetIngest,
    pub sessions: CallSessionManager,
    pub users: Arc<dyn UserDirectory>,
    pub signer: TokenSigner,
    pub storage: Storage,
}

pub type AppState = Arc<AppStateInner>;

#[derive(Default)]
pub struct AppStateBuilder {
    pub config: Option<Config>,
    pub telephony: Option<Arc<dyn TelephonyCapability>>,
    pub records: Option<Arc<dyn CallRecordStore>>,
    pub object_storage: Option<Arc<dyn ObjectStorage>>,
    pub users: Option<Arc<dyn UserDirectory>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn telephony(mut self, telephony: Arc<dyn TelephonyCapability>) -> Self {
        self.telephony = Some(telephony);
        self
    }

    pub fn records(mut self, records: Arc<dyn CallRecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn object_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.object_storage = Some(storage);
        self
    }

    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub async fn build(self) -> Result<AppState> {
        let config = Arc::new(self.config.unwrap_or_default());
        let storage = Storage::new(&config.storage)?;

        let rng = AssetCatalog::rng_from_seed(config.assets.seed);
        let catalog = Arc::new(match &config.assets.catalog_path {
            Some(path) => AssetCatalog::with_snapshot(rng, path)?,
            None => AssetCatalog::new(rng),
        });

        let object_storage = match self.object_storage {
            Some(s) => s,
            None => Arc::new(storage.clone()) as Arc<dyn ObjectStorage>,
        };
        let ingest = AssetIngest::new(catalog.clone(), object_storage);

        let telephony = match self.telephony {
            Some(t) => t,
            None => Arc::new(TwilioClient::new(&config.telephony)?) as Arc<dyn TelephonyCapability>,
        };
        let records = match self.records {
            Some(r) => r,
            None => match &config.callrecord {
                CallRecordConfig::Memory => {
                    Arc::new(MemoryCallRecordStore::new()) as Arc<dyn CallRecordStore>
                }
                CallRecordConfig::Storage { root } => {
                    Arc::new(StorageCallRecordStore::open(storage.clone(), root).await?)
                }
            },
        };
        let sessions = CallSessionManager::new(
            CallScriptBuilder::new(catalog.clone(), config.call.waiting_notice.clone()),
            telephony,
            records,
            CallRouting {
                from_number: config.telephony.from_number.clone(),
                status_callback_url: config.telephony.status_callback_url.clone(),
            },
        );

        let users = match self.users {
            Some(u) => u,
            None => Arc::new(MemoryUserDirectory::new(config.users.clone())) as Arc<dyn UserDirectory>,
        };

        let signer = match config.auth.token_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => TokenSigner::new(secret),
            None => {
                warn!("auth.token_secret is not set, tokens are signed with a random key");
                let mut secret = [0u8; 32];
                rand::rng().fill(&mut secret);
                TokenSigner::new(secret)
            }
        };

        Ok(Arc::new(AppStateInner {
            signer,
            config,
            catalog,
            ingest,
            sessions,
            users,
            storage,
        }))
    }
}

pub async fn run(state: AppState) -> Result<()> {
    let app = create_router(state.clone());
    let addr: SocketAddr = state.config.http_addr.parse()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(anyhow::anyhow!("Failed to bind to {}: {}", addr, e));
        }
    };
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("received CTRL+C, shutting down");
        })
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
    info!("server shut down gracefully");
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::header::ORIGIN,
        ]);

    let mut router = crate::handler::router().with_state(state.clone());
    if let Some(root) = state.storage.local_root() {
        // only uploads are public, never the rest of the storage root
        router = router.nest_service(
            &format!("{}/{}", LOCAL_MEDIA_ROUTE, UPLOAD_PREFIX),
            ServeDir::new(root.join(UPLOAD_PREFIX)),
        );
    }
    router.layer(cors)
}
