//! Axum router and HTTP handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use ww_assets::{BalanceFetch, FetchSource};
use ww_core::constants::{CHAT_FALLBACK_REPLY, CHAT_SYSTEM_PROMPT};
use ww_core::traits::IdentityProvider;
use ww_core::{Address, ChatMessage};
use ww_faucet::{FaucetDispenser, FaucetKind, FaucetStatus};

use crate::error::ApiError;
use crate::send::{SendReceipt, SendRequest};
use crate::session::WalletKind;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session", get(get_session).post(login).delete(logout))
        .route("/api/assets", get(assets))
        .route("/api/assets/refresh", post(refresh_assets))
        .route("/api/send", post(send))
        .route("/api/faucet/:kind", post(claim))
        .route("/api/faucet/:kind/status", get(faucet_status))
        .route("/api/faucet/:kind/reset", post(reset_faucet))
        .route("/api/chat", post(chat))
        .route("/api/prices", get(prices))
        .with_state(state)
        .layer(cors)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginRequest {
    address: String,
    #[serde(default)]
    kind: WalletKind,
}

/// `POST /api/session`: establish the active wallet and its signer.
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> ApiResult<Json<Value>> {
    let address = Address::parse(&req.address)?;
    let signer = (state.signers)(req.kind, address).map_err(|e| {
        warn!(error = %e, %address, "signer unavailable");
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "SIGNER_UNAVAILABLE", "wallet signer unavailable")
    })?;
    let address = state.session.login(signer);
    Ok(Json(json!({ "address": address, "kind": req.kind })))
}

/// `GET /api/session`
async fn get_session(State(state): State<AppState>) -> Json<Value> {
    let address = state.session.current_address();
    Json(json!({ "logged_in": address.is_some(), "address": address }))
}

/// `DELETE /api/session`
async fn logout(State(state): State<AppState>) -> StatusCode {
    state.session.logout();
    StatusCode::NO_CONTENT
}

fn require_login(state: &AppState) -> ApiResult<Address> {
    state.session.current_address().ok_or_else(ApiError::not_logged_in)
}

// ---------------------------------------------------------------------------
// Assets and prices
// ---------------------------------------------------------------------------

async fn render_fetch(state: &AppState, fetch: BalanceFetch) -> Json<Value> {
    if let Some(e) = &fetch.error {
        warn!(wallet = %fetch.snapshot.wallet, error = %e, "serving stale balances");
    }
    let annotated = state.prices.annotate(&fetch.snapshot).await;
    Json(json!({
        "wallet": annotated.wallet,
        "balances": annotated.balances,
        "captured_at": annotated.captured_at,
        "source": fetch.source,
    }))
}

/// `GET /api/assets`: the latest scheduled fetch for the active wallet.
async fn assets(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let wallet = require_login(&state)?;
    let scheduled = state
        .session
        .scheduler()
        .and_then(|s| s.latest())
        .filter(|f| f.snapshot.wallet == wallet && f.source != FetchSource::Empty);
    let fetch = match scheduled {
        Some(fetch) => fetch,
        None => state.cache.get(wallet, false).await,
    };
    Ok(render_fetch(&state, fetch).await)
}

/// `POST /api/assets/refresh`: bypass the cache.
async fn refresh_assets(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let wallet = require_login(&state)?;
    let forced = match state.session.scheduler() {
        Some(scheduler) => scheduler.refresh_now().await,
        None => None,
    };
    let fetch = match forced {
        Some(fetch) => fetch,
        None => state.cache.get(wallet, true).await,
    };
    Ok(render_fetch(&state, fetch).await)
}

#[derive(Deserialize)]
struct PricesQuery {
    symbols: Option<String>,
}

/// `GET /api/prices?symbols=ETH,USDC`: tracked assets when omitted.
async fn prices(State(state): State<AppState>, Query(q): Query<PricesQuery>) -> Json<Value> {
    let symbols: Vec<String> = match q.symbols.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => state.tracked_symbols.as_ref().clone(),
    };
    Json(json!({ "prices": state.prices.prices_for(&symbols).await }))
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

/// `POST /api/send`: transfer from the active wallet.
async fn send(State(state): State<AppState>, Json(req): Json<SendRequest>) -> ApiResult<Json<SendReceipt>> {
    let signer = state.session.active_signer().ok_or_else(ApiError::not_logged_in)?;
    let receipt = state.send.send(signer.as_ref(), &req).await?;
    info!(tx_hash = %receipt.tx_hash, block = receipt.block_number, "transfer confirmed");
    Ok(Json(receipt))
}

// ---------------------------------------------------------------------------
// Faucets
// ---------------------------------------------------------------------------

/// Faucets keyed by kind, as held in [`AppState`].
pub type FaucetMap = BTreeMap<FaucetKind, Arc<FaucetDispenser>>;

fn dispenser(state: &AppState, kind: &str) -> ApiResult<(FaucetKind, &FaucetDispenser)> {
    let kind: FaucetKind = kind
        .parse()
        .map_err(|_| ApiError::not_found(format!("no faucet named {kind:?}")))?;
    state
        .faucets
        .get(&kind)
        .map(|d| (kind, d.as_ref()))
        .ok_or_else(|| ApiError::not_found(format!("{kind} faucet is not enabled")))
}

#[derive(Deserialize, Default)]
struct ClaimRequest {
    /// Defaults to the logged-in wallet.
    address: Option<String>,
}

/// `POST /api/faucet/:kind`: claim from the gas or token faucet.
async fn claim(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    body: Option<Json<ClaimRequest>>,
) -> ApiResult<Json<Value>> {
    let (kind, faucet) = dispenser(&state, &kind)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let recipient = match req.address {
        Some(address) => address,
        None => require_login(&state)?.to_hex(),
    };

    let tx_hash = faucet.dispense(&recipient).await?;
    let config = faucet.config();
    if let Ok(address) = Address::parse(&recipient) {
        state.cache.invalidate(&address);
    }
    Ok(Json(json!({
        "faucet": kind,
        "tx_hash": tx_hash,
        "address": recipient.trim().to_ascii_lowercase(),
        "amount": config.amount_per_claim.to_string(),
        "symbol": config.asset.symbol(),
    })))
}

#[derive(Deserialize)]
struct StatusQuery {
    address: Option<String>,
}

/// `GET /api/faucet/:kind/status?address=0x..`
async fn faucet_status(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(q): Query<StatusQuery>,
) -> ApiResult<Json<FaucetStatus>> {
    let (_, faucet) = dispenser(&state, &kind)?;
    let recipient = match q.address.as_deref() {
        Some(address) => Some(Address::parse(address)?),
        None => state.session.current_address(),
    };
    Ok(Json(faucet.status(recipient.as_ref())?))
}

/// `POST /api/faucet/:kind/reset`: admin-signed ledger reset.
///
/// Expects `x-admin-timestamp` (Unix seconds) and `x-admin-signature`
/// (hex Ed25519 over `timestamp || "reset:" || kind`).
async fn reset_faucet(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let (kind, faucet) = dispenser(&state, &kind)?;
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let grant = state
        .admin
        .authorize(kind, &header("x-admin-timestamp"), &header("x-admin-signature"))?;
    faucet.reset_ledger(&grant).await?;
    Ok(Json(json!({ "faucet": kind, "reset": true })))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// `POST /api/chat`: degrades to a fixed reply when the backend is down.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> ApiResult<Json<Value>> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", "message is empty"));
    }

    let reply = match &state.chat {
        Some(client) => client.complete(CHAT_SYSTEM_PROMPT, &req.history, message).await,
        None => Err(ww_core::error::UpstreamError::NotConfigured),
    };
    Ok(Json(match reply {
        Ok(reply) => json!({ "reply": reply, "degraded": false }),
        Err(e) => {
            warn!(error = %e, "chat unavailable");
            json!({ "reply": CHAT_FALLBACK_REPLY, "degraded": true, "error": "CHAT_UNAVAILABLE" })
        }
    }))
}
