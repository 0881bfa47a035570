//! Request Pipeline Handlers
//!
//! `PUT /upload`, `GET /:sha`, `HEAD /upload`, `HEAD /:sha` — the four
//! endpoints a Blossom client speaks to this server over.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::middleware::validate_sha256_hex;
use crate::api::state::SharedAppState;
use crate::cashu::token::decode_token;
use crate::common::BlossomError;
use crate::logging::{log_download_event, log_upload_event};
use crate::types::{Blob, BlobDescriptor, LockedProof};

const MAX_BODY_BYTES: u64 = 100 * 1024 * 1024;
const CASHU_HEADER: &str = "x-cashu";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Builds the 402 response carrying a fresh quote in the `x-cashu` header.
async fn payment_required(state: &SharedAppState, amount: u64) -> Response {
    match state.encode_quote_header(amount).await {
        Ok(quote_header) => {
            let mut response = (
                StatusCode::PAYMENT_REQUIRED,
                Json(serde_json::json!({ "error": "payment required", "code": "MISSING_PAYMENT" })),
            )
                .into_response();
            if let Ok(value) = quote_header.parse() {
                response.headers_mut().insert(CASHU_HEADER, value);
            }
            response
        }
        Err(e) => error_response(e),
    }
}

fn error_response(err: BlossomError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(serde_json::json!({ "error": err.to_string(), "code": err.error_code() }));
    (status, body).into_response()
}

/// `PUT /upload` — dedupe before pricing: an already-stored blob is never
/// re-charged, even if the caller attaches a token.
pub async fn upload(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_length = match header_str(&headers, "content-length").and_then(|v| v.parse::<u64>().ok()) {
        Some(len) => len,
        None => body.len() as u64,
    };
    if content_length > MAX_BODY_BYTES {
        return error_response(BlossomError::BodyTooLarge);
    }

    let bytes = body.to_vec();
    let sha256_hex = crate::hashkit::sha256_hex(&bytes);

    match state.store.get_blob(&sha256_hex).await {
        Ok(Some(existing)) => {
            return (
                StatusCode::CREATED,
                Json(descriptor_for(&state, &existing)),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(e) => return error_response(e.into()),
    }

    let price = state.upload_price(bytes.len() as u64);

    let token_header = match header_str(&headers, CASHU_HEADER) {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => return payment_required(&state, price).await,
    };

    let token = match decode_token(&token_header) {
        Ok(token) => token,
        Err(e) => {
            log_upload_event(&sha256_hex, bytes.len() as u64, 0, false, Some(&e.to_string()));
            return error_response(BlossomError::TokenDecode(e.to_string()));
        }
    };

    if token.amount() < price {
        let err = BlossomError::InsufficientPayment {
            required: price,
            paid: token.amount(),
        };
        log_upload_event(&sha256_hex, bytes.len() as u64, token.amount(), false, Some(&err.to_string()));
        return payment_required(&state, price).await;
    }

    let now = chrono::Utc::now().timestamp();
    let trusted_mints = match state.trusted_mints().await {
        Ok(mints) => mints,
        Err(e) => return error_response(e),
    };

    if let Err(e) = state.verifier().verify_token(&token, &trusted_mints, now).await {
        log_upload_event(&sha256_hex, bytes.len() as u64, token.amount(), false, Some(&e.to_string()));
        return error_response(BlossomError::from(e));
    }

    if let Err(e) = state.blobstore.write_blob(&sha256_hex, bytes.clone()).await {
        return error_response(BlossomError::internal(e.to_string()));
    }

    let pubkey_version = state.wallet.active_version().await;
    let mint = token.mint.clone();
    let content_type = header_str(&headers, "content-type").unwrap_or("application/octet-stream").to_string();

    let locked_proofs: Vec<LockedProof> = token
        .proofs
        .iter()
        .map(|p| LockedProof {
            amount: p.amount,
            keyset_id: p.keyset_id.clone(),
            secret: p.secret.clone(),
            c: p.c.clone(),
            witness: p.witness.clone(),
            redeemed: false,
            created_at: now,
            pubkey_version,
            mint: mint.clone(),
        })
        .collect();

    let blob = Blob {
        sha256: {
            let mut out = [0u8; 32];
            if let Ok(decoded) = hex::decode(&sha256_hex) {
                out.copy_from_slice(&decoded[..32.min(decoded.len())]);
            }
            out
        },
        size: bytes.len() as u64,
        path: sha256_hex.clone(),
        created_at: now,
        pubkey: state.wallet.active_pubkey().await,
        content_type: content_type.clone(),
    };

    let store = state.store.clone();
    let blob_for_tx = blob.clone();
    let result = store
        .transaction(move |tx| {
            crate::storage::sqlite::insert_locked_proofs(tx, &locked_proofs)?;
            crate::storage::sqlite::insert_blob(tx, &blob_for_tx)?;
            Ok(())
        })
        .await;

    if let Err(e) = result {
        return error_response(e.into());
    }

    for proof in &token.proofs {
        state.wallet.mark_seen(&proof.c);
    }

    log_upload_event(&sha256_hex, bytes.len() as u64, token.amount(), true, None);

    (StatusCode::OK, Json(descriptor_for(&state, &blob))).into_response()
}

fn descriptor_for(state: &SharedAppState, blob: &Blob) -> BlobDescriptor {
    BlobDescriptor {
        url: format!("{}/{}", state.config.domain.trim_end_matches('/'), blob.sha256_hex()),
        sha256: blob.sha256_hex(),
        size: blob.size,
        content_type: blob.content_type.clone(),
        uploaded: blob.created_at,
    }
}

/// `GET /:sha` — serves the blob bytes after payment, with an
/// on-disk-hash integrity check before the response is sent.
pub async fn download(
    State(state): State<SharedAppState>,
    Path(sha): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = validate_sha256_hex(&sha) {
        return error_response(BlossomError::validation(e));
    }

    let blob = match state.store.get_blob(&sha).await {
        Ok(Some(blob)) => blob,
        Ok(None) => return error_response(BlossomError::BlobNotFound),
        Err(e) => return error_response(e.into()),
    };

    let price = state.download_price(blob.size);

    let token_header = match header_str(&headers, CASHU_HEADER) {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => return payment_required(&state, price).await,
    };

    let token = match decode_token(&token_header) {
        Ok(token) => token,
        Err(e) => return error_response(BlossomError::TokenDecode(e.to_string())),
    };

    if token.amount() < price {
        return payment_required(&state, price).await;
    }

    let now = chrono::Utc::now().timestamp();
    let trusted_mints = match state.trusted_mints().await {
        Ok(mints) => mints,
        Err(e) => return error_response(e),
    };

    if let Err(e) = state.verifier().verify_token(&token, &trusted_mints, now).await {
        log_download_event(&sha, token.amount(), false, Some(&e.to_string()));
        return error_response(BlossomError::from(e));
    }

    let pubkey_version = state.wallet.active_version().await;
    let mint = token.mint.clone();
    let locked_proofs: Vec<LockedProof> = token
        .proofs
        .iter()
        .map(|p| LockedProof {
            amount: p.amount,
            keyset_id: p.keyset_id.clone(),
            secret: p.secret.clone(),
            c: p.c.clone(),
            witness: p.witness.clone(),
            redeemed: false,
            created_at: now,
            pubkey_version,
            mint: mint.clone(),
        })
        .collect();

    let store = state.store.clone();
    if let Err(e) = store
        .transaction(move |tx| crate::storage::sqlite::insert_locked_proofs(tx, &locked_proofs))
        .await
    {
        return error_response(e.into());
    }

    for proof in &token.proofs {
        state.wallet.mark_seen(&proof.c);
    }

    let bytes = match state.blobstore.read_blob(&sha).await {
        Ok(bytes) => bytes,
        Err(e) => return error_response(BlossomError::internal(e.to_string())),
    };

    if crate::hashkit::sha256_hex(&bytes) != sha {
        tracing::error!(target: "blossom::download", sha256 = %sha, "on-disk blob hash mismatch");
        return error_response(BlossomError::internal("blob integrity check failed"));
    }

    log_download_event(&sha, token.amount(), true, None);

    let content_type: axum::http::HeaderValue = blob
        .content_type
        .parse()
        .unwrap_or_else(|_| axum::http::HeaderValue::from_static("application/octet-stream"));
    let mut response = (StatusCode::OK, bytes).into_response();
    response.headers_mut().insert(axum::http::header::CONTENT_TYPE, content_type);
    response
}

/// `HEAD /:sha` — always answers with a 402 quote; a nonexistent hash
/// prices at the rate floor rather than 404ing.
pub async fn head_blob(State(state): State<SharedAppState>, Path(sha): Path<String>) -> Response {
    if let Err(e) = validate_sha256_hex(&sha) {
        return error_response(BlossomError::validation(e));
    }

    let size = match state.store.get_blob(&sha).await {
        Ok(Some(blob)) => blob.size,
        Ok(None) => 0,
        Err(e) => return error_response(e.into()),
    };

    let price = state.download_price(size);
    payment_required(&state, price).await
}

/// `HEAD /upload` — advertises the upload price for `X-Content-Length`,
/// or 201 if a blob with the given `X-SHA-256` already exists.
pub async fn head_upload(State(state): State<SharedAppState>, headers: HeaderMap) -> Response {
    if let Some(sha) = header_str(&headers, "x-sha-256") {
        match state.store.get_blob(sha).await {
            Ok(Some(_)) => {
                return (StatusCode::CREATED, Json(serde_json::json!({ "message": "chunk exists" })))
                    .into_response();
            }
            Ok(None) => {}
            Err(e) => return error_response(e.into()),
        }
    }

    let content_length = header_str(&headers, "x-content-length")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let price = state.upload_price(content_length);
    payment_required(&state, price).await
}
