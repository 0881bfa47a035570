//! API Server Module
//!
//! Builds the Axum router and owns the listen loop.

use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers;
use crate::api::state::{AppState, SharedAppState};
use crate::blobstore::BlobStore;
use crate::common::BlossomError;
use crate::config::BlossomConfig;
use crate::mint_client::MintClient;
use crate::storage::sqlite::SqliteStore;
use crate::wallet::Wallet;

pub fn create_router(state: SharedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", put(handlers::upload).head(handlers::head_upload))
        .route("/:sha256", get(handlers::download).head(handlers::head_blob))
        .layer(cors)
        .with_state(state)
}

/// Assembles [`AppState`] from a loaded config, opening the store and
/// initializing the wallet from its seed.
pub async fn build_state(config: BlossomConfig) -> Result<SharedAppState, BlossomError> {
    std::fs::create_dir_all(&config.home_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    let now = chrono::Utc::now().timestamp();
    store
        .ensure_trusted_mint(config.trusted_mint.clone(), now)
        .await?;

    let wallet = Wallet::init(
        &config.seed,
        &store,
        config.rotation_period_secs(),
        now,
    )
    .await?;

    let blobstore = BlobStore::new(config.blobs_dir())?;
    let mint_client = MintClient::new();

    Ok(Arc::new(AppState {
        wallet: Arc::new(wallet),
        store: Arc::new(store),
        blobstore: Arc::new(blobstore),
        mint_client: Arc::new(mint_client),
        config: Arc::new(config),
    }))
}

pub async fn start_server(state: SharedAppState) -> Result<(), std::io::Error> {
    let port = state.config.port;
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(target: "blossom::server", %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> SharedAppState {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ensure_trusted_mint("https://mint.example".into(), 1_700_000_000)
            .await
            .unwrap();
        let wallet = Wallet::init(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            &store,
            3600,
            1_700_000_000,
        )
        .await
        .unwrap();
        let dir = std::env::temp_dir().join(format!("blossom-api-test-{:p}", &store));
        let blobstore = BlobStore::new(&dir).unwrap();

        Arc::new(AppState {
            wallet: Arc::new(wallet),
            store: Arc::new(store),
            blobstore: Arc::new(blobstore),
            mint_client: Arc::new(MintClient::new()),
            config: Arc::new(BlossomConfig {
                domain: "https://blossom.example".into(),
                seed: "test".into(),
                trusted_mint: "https://mint.example".into(),
                owner_npub: None,
                upload_cost_2mb: 1,
                download_cost_2mb: 1,
                home_dir: dir,
                rotation_period_minutes: 60,
                port: 8070,
                enable_locktime_check: false,
                enable_dleq_check: false,
                log_level: "info".into(),
            }),
        })
    }

    #[tokio::test]
    async fn head_nonexistent_blob_returns_quote_at_rate_floor() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri(format!("/{}", "a".repeat(64)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().get("x-cashu").is_some());
    }

    #[tokio::test]
    async fn get_nonexistent_blob_is_404() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{}", "b".repeat(64)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_without_token_returns_quote() {
        let state = test_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/upload")
                    .body(Body::from("hello world"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().get("x-cashu").is_some());
    }
}
