//! End-to-End Request Pipeline and Scheduler Scenarios
//!
//! Drives the real `axum` router via `tower::ServiceExt::oneshot` (no TCP
//! socket needed on the app side) against a real, locally-bound stub Cashu
//! mint that speaks just enough of NUT-01/NUT-02/NUT-03 to answer
//! `active_keysets`/`all_keysets`/`post_swap`. The stub signs outputs with
//! the genuine `C_ = k * B_` blind-signature arithmetic the crate itself
//! uses, so a swap here exercises the same unblinding path a real mint
//! swap would.
//!
//! Every test shares the process-wide in-memory SQLite database that
//! `SqliteStore::in_memory()` always opens under the same shared-cache
//! name, so tests run serialized behind `DB_LOCK` and scope every
//! assertion to data keyed by that test's own mint URL / keyset id / proof
//! nullifier rather than asserting a table is globally empty.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use serde::Deserialize;
use tower::ServiceExt;

use blossom_cashu::api::server::create_router;
use blossom_cashu::api::state::AppState;
use blossom_cashu::blobstore::BlobStore;
use blossom_cashu::cashu::token::encode_token;
use blossom_cashu::cashu::{BlindedMessage, BlindedSignature, Keyset, Proof, Token};
use blossom_cashu::config::BlossomConfig;
use blossom_cashu::hashkit::{decode_quote, sha256, sha256_hex};
use blossom_cashu::mint_client::MintClient;
use blossom_cashu::scheduler::RotationScheduler;
use blossom_cashu::storage::sqlite::{self, SqliteStore};
use blossom_cashu::types::BlobDescriptor;
use blossom_cashu::wallet::Wallet;

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Serializes access to the process-wide shared-cache in-memory database
/// (see module doc). Mirrors `config.rs`'s own `ENV_LOCK` convention.
static DB_LOCK: Mutex<()> = Mutex::new(());

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_c() -> String {
    let n = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("02{n:064x}")
}

fn p2pk_proof(amount: u64, keyset_id: &str, pubkey_hex: &str) -> Proof {
    let c = unique_c();
    Proof {
        amount,
        keyset_id: keyset_id.to_string(),
        secret: format!(r#"["P2PK",{{"nonce":"{c}","data":"{pubkey_hex}","tags":[]}}]"#),
        c,
        witness: None,
        dleq: None,
    }
}

fn make_token(mint: &str, proofs: Vec<Proof>) -> String {
    encode_token(&Token {
        mint: mint.to_string(),
        unit: "sat".to_string(),
        proofs,
    })
    .unwrap()
}

async fn build_state(mint_url: &str, upload_cost_2mb: u64, download_cost_2mb: u64) -> Arc<AppState> {
    let store = SqliteStore::in_memory().unwrap();
    store
        .transaction({
            let mint_url = mint_url.to_string();
            move |tx| sqlite::add_trusted_mint(tx, &mint_url, 1_700_000_000)
        })
        .await
        .unwrap();
    let wallet = Wallet::init(TEST_MNEMONIC, &store, 3600, 1_700_000_000).await.unwrap();
    let dir = std::env::temp_dir().join(format!("blossom-e2e-test-{:p}", &store));
    let blobstore = BlobStore::new(&dir).unwrap();

    Arc::new(AppState {
        wallet: Arc::new(wallet),
        store: Arc::new(store),
        blobstore: Arc::new(blobstore),
        mint_client: Arc::new(MintClient::new()),
        config: Arc::new(BlossomConfig {
            domain: "https://blossom.example".into(),
            seed: "test".into(),
            trusted_mint: mint_url.to_string(),
            owner_npub: None,
            upload_cost_2mb,
            download_cost_2mb,
            home_dir: dir,
            rotation_period_minutes: 60,
            port: 8070,
            enable_locktime_check: false,
            enable_dleq_check: false,
            log_level: "info".into(),
        }),
    })
}

// ============================================================================
// Stub Cashu mint: just enough of NUT-01/NUT-02/NUT-03 to verify and swap
// tokens against, signing with the crate's own blind-signature arithmetic.
// ============================================================================

struct StubMint {
    keyset_id: String,
    input_fee_ppk: u64,
}

fn keyset_amounts() -> Vec<u64> {
    (0..21).map(|i| 1u64 << i).collect()
}

fn mint_secret_key(amount: u64) -> SecretKey {
    let digest = sha256(format!("stub-mint-key-{amount}").as_bytes());
    SecretKey::from_slice(&digest).expect("sha256 digest of a fixed string is a valid scalar")
}

async fn get_keys(State(state): State<Arc<StubMint>>) -> Json<serde_json::Value> {
    let secp = Secp256k1::new();
    let keys: BTreeMap<u64, String> = keyset_amounts()
        .into_iter()
        .map(|amount| {
            let pk = PublicKey::from_secret_key(&secp, &mint_secret_key(amount));
            (amount, hex::encode(pk.serialize()))
        })
        .collect();
    let keyset = Keyset {
        id: state.keyset_id.clone(),
        unit: "sat".to_string(),
        keys,
        input_fee_ppk: state.input_fee_ppk,
    };
    Json(serde_json::json!({ "keysets": [keyset] }))
}

async fn get_keysets(State(state): State<Arc<StubMint>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "keysets": [{
            "id": state.keyset_id,
            "unit": "sat",
            "active": true,
            "input_fee_ppk": state.input_fee_ppk,
        }]
    }))
}

#[derive(Deserialize)]
struct SwapReq {
    #[allow(dead_code)]
    inputs: Vec<Proof>,
    outputs: Vec<BlindedMessage>,
}

async fn post_swap(
    State(_state): State<Arc<StubMint>>,
    Json(req): Json<SwapReq>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let secp = Secp256k1::new();
    let mut signatures = Vec::with_capacity(req.outputs.len());
    for output in &req.outputs {
        let sk = mint_secret_key(output.amount);
        let b_bytes = hex::decode(&output.b).map_err(|_| StatusCode::BAD_REQUEST)?;
        let b = PublicKey::from_slice(&b_bytes).map_err(|_| StatusCode::BAD_REQUEST)?;
        let c_blind = b
            .mul_tweak(&secp, &Scalar::from(sk))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        signatures.push(BlindedSignature {
            amount: output.amount,
            keyset_id: output.keyset_id.clone(),
            c: hex::encode(c_blind.serialize()),
            dleq: None,
        });
    }
    Ok(Json(serde_json::json!({ "signatures": signatures })))
}

struct SpawnedMint {
    url: String,
    handle: tokio::task::JoinHandle<()>,
}

async fn spawn_stub_mint(keyset_id: &str, input_fee_ppk: u64) -> SpawnedMint {
    let state = Arc::new(StubMint {
        keyset_id: keyset_id.to_string(),
        input_fee_ppk,
    });
    let router = Router::new()
        .route("/v1/keys", get(get_keys))
        .route("/v1/keysets", get(get_keysets))
        .route("/v1/swap", post(post_swap))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    SpawnedMint {
        url: format!("http://{addr}"),
        handle,
    }
}

// ============================================================================
// Scenario 1 — 1-sat upload, retrieval returns the same bytes
// ============================================================================

#[tokio::test]
async fn scenario_1_pays_for_upload_and_download_of_a_small_blob() {
    let _guard = DB_LOCK.lock().unwrap();
    let mint = spawn_stub_mint("00scenario1", 0).await;
    let state = build_state(&mint.url, 1, 1).await;
    let app = create_router(state.clone());

    let body = vec![1u8; 2048];
    let sha = sha256_hex(&body);
    let pubkey = state.wallet.active_pubkey().await;

    let upload_token = make_token(&mint.url, vec![p2pk_proof(1, "00scenario1", &pubkey)]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/upload")
                .header("x-cashu", upload_token)
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let descriptor: BlobDescriptor = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(descriptor.sha256, sha);
    assert_eq!(descriptor.size, 2048);

    let download_token = make_token(&mint.url, vec![p2pk_proof(1, "00scenario1", &pubkey)]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{sha}"))
                .header("x-cashu", download_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), body.as_slice());

    mint.handle.abort();
}

// ============================================================================
// Scenario 2 — missing token returns a 402 quote shaped the way clients expect
// ============================================================================

#[tokio::test]
async fn scenario_2_upload_without_token_returns_a_well_formed_quote() {
    let _guard = DB_LOCK.lock().unwrap();
    let mint = spawn_stub_mint("00scenario2", 0).await;
    let state = build_state(&mint.url, 1, 1).await;
    let app = create_router(state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/upload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let header = response.headers().get("x-cashu").unwrap().to_str().unwrap().to_string();
    let quote = decode_quote(&header).unwrap();
    assert_eq!(quote.amount, 1);
    assert!(quote.mints.contains(&mint.url));
    assert_eq!(quote.pubkey.len(), 66);
    assert_eq!(quote.pubkey, state.wallet.active_pubkey().await);

    mint.handle.abort();
}

// ============================================================================
// Scenario 3 — a token locked to a now-rotated-away pubkey is rejected
// ============================================================================

#[tokio::test]
async fn scenario_3_token_locked_to_the_old_pubkey_is_rejected_after_rotation() {
    let _guard = DB_LOCK.lock().unwrap();
    let mint = spawn_stub_mint("00scenario3", 0).await;
    let state = build_state(&mint.url, 1, 1).await;
    let app = create_router(state.clone());

    let body = vec![2u8; 2048];
    let sha = sha256_hex(&body);
    let old_pubkey = state.wallet.active_pubkey().await;

    let upload_token = make_token(&mint.url, vec![p2pk_proof(1, "00scenario3", &old_pubkey)]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/upload")
                .header("x-cashu", upload_token)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rotated = state
        .store
        .transaction(|tx| sqlite::rotate_pubkey(tx, 1_700_999_999))
        .await
        .unwrap();
    state.wallet.apply_rotation(&rotated).await.unwrap();
    assert_ne!(state.wallet.active_pubkey().await, old_pubkey);

    let stale_token = make_token(&mint.url, vec![p2pk_proof(1, "00scenario3", &old_pubkey)]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/{sha}"))
                .header("x-cashu", stale_token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "PAYMENT_VERIFICATION_FAILED");

    mint.handle.abort();
}

// ============================================================================
// Scenario 4 — two concurrent uploads of the same bytes dedupe on the second
// ============================================================================

#[tokio::test]
async fn scenario_4_second_upload_of_identical_bytes_is_free_and_deduped() {
    let _guard = DB_LOCK.lock().unwrap();
    let mint = spawn_stub_mint("00scenario4", 0).await;
    let state = build_state(&mint.url, 1, 1).await;
    let app = create_router(state.clone());

    let body = vec![3u8; 2048];
    let sha = sha256_hex(&body);
    let pubkey = state.wallet.active_pubkey().await;

    let proof_a = p2pk_proof(1, "00scenario4", &pubkey);
    let proof_b = p2pk_proof(1, "00scenario4", &pubkey);
    let c_a = proof_a.c.clone();
    let c_b = proof_b.c.clone();
    let token_a = make_token(&mint.url, vec![proof_a]);
    let token_b = make_token(&mint.url, vec![proof_b]);

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/upload")
                .header("x-cashu", token_a)
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/upload")
                .header("x-cashu", token_b)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let bytes = to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let descriptor: BlobDescriptor = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(descriptor.sha256, sha);

    assert!(state.store.proof_c_exists(&c_a).await.unwrap());
    assert!(!state.store.proof_c_exists(&c_b).await.unwrap());

    mint.handle.abort();
}

// ============================================================================
// Scenario 5 — swap nets out the mint's fee and advances the keyset counter
// ============================================================================

#[tokio::test]
async fn scenario_5_swap_nets_the_mint_fee_and_advances_the_counter() {
    let _guard = DB_LOCK.lock().unwrap();
    let keyset_id = "00scenario5";
    let mint = spawn_stub_mint(keyset_id, 2_000).await; // 2000 ppk => 2 sat fee
    let state = build_state(&mint.url, 1, 1).await;

    let now = 1_700_000_000;
    let locked = blossom_cashu::types::LockedProof {
        amount: 100,
        keyset_id: keyset_id.to_string(),
        secret: r#"["P2PK",{"nonce":"n","data":"02aa","tags":[]}]"#.to_string(),
        c: unique_c(),
        witness: None,
        redeemed: false,
        created_at: now,
        pubkey_version: state.wallet.active_version().await,
        mint: mint.url.clone(),
    };
    state
        .store
        .transaction({
            let locked = locked.clone();
            move |tx| sqlite::insert_locked_proofs(tx, &[locked])
        })
        .await
        .unwrap();

    let token_log = std::env::temp_dir().join(format!("blossom-e2e-{keyset_id}.txt"));
    std::fs::remove_file(&token_log).ok();
    let scheduler = RotationScheduler::new(
        state.wallet.clone(),
        state.store.clone(),
        state.mint_client.clone(),
        3600,
        token_log.clone(),
        None,
    );

    // `tick` both swaps locked proofs and immediately cashes out whatever it
    // just swapped, so by the time it returns the swap's outputs are already
    // flushed to the token log and marked spent. The "100 in, 2 sat fee, 98
    // out" invariant is checked against that log line instead of a still-open
    // `swapped_proofs` row.
    let result = scheduler.tick(now).await.unwrap();
    assert!(!result.rotated, "rotation must not fire within its own period");
    assert_eq!(result.mints_swapped, 1);
    assert_eq!(result.proofs_swapped, 1);
    assert_eq!(result.mints_spent, 1);

    let still_locked = state
        .store
        .transaction(sqlite::get_unredeemed_locked_proofs)
        .await
        .unwrap();
    assert!(!still_locked.iter().any(|p| p.c == locked.c));

    let unspent = state
        .store
        .transaction({
            let mint_url = mint.url.clone();
            move |tx| sqlite::get_unspent_swapped_proofs_by_mint(tx, &mint_url)
        })
        .await
        .unwrap();
    assert!(unspent.is_empty(), "swapped outputs were cashed out within the same tick");

    let log_contents = std::fs::read_to_string(&token_log).unwrap();
    assert!(
        log_contents.contains("amount=98"),
        "100 sat input minus a 2 sat mint fee nets 98, logged at cash-out: {log_contents}"
    );
    assert!(log_contents.contains(&format!("mint={}", mint.url)));

    let counter = state
        .store
        .transaction({
            let keyset_id = keyset_id.to_string();
            move |tx| sqlite::get_keyset_counter(tx, &keyset_id)
        })
        .await
        .unwrap();
    // amount_split(98) == [2, 32, 64]: three outputs, so the counter advances by 3.
    assert_eq!(counter.counter, 3);

    mint.handle.abort();
}

// ============================================================================
// Scenario 6 — HEAD on a nonexistent hash prices at the rate floor
// ============================================================================

#[tokio::test]
async fn scenario_6_head_on_nonexistent_hash_prices_at_the_rate_floor() {
    let _guard = DB_LOCK.lock().unwrap();
    let mint = spawn_stub_mint("00scenario6", 0).await;
    let state = build_state(&mint.url, 1, 1).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/{}", "f".repeat(64)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let header = response.headers().get("x-cashu").unwrap().to_str().unwrap().to_string();
    let quote = decode_quote(&header).unwrap();
    assert_eq!(quote.amount, 1);

    mint.handle.abort();
}
