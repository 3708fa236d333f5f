//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use sale_engine::{
    AllocationRecord, ClaimPhase, ClaimStatus, ContributorId, LedgerSnapshot, Receipt,
    Resolution, SaleError, SaleParams, SaleSummary, SettlementEvent, SettlementKind,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::address::parse_contributor;
use crate::db;
use crate::errors::{LaunchpadError, Result};
use crate::events::EventRecord;
use crate::kyc::KycRegistry;
use crate::project::ProjectInfo;
use crate::sales::{SaleHandle, SaleRegistry};
use crate::writer;

pub struct ApiState {
    pub pool: SqlitePool,
    pub sales: SaleRegistry,
    pub kyc: Arc<KycRegistry>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sales", get(list_sales).post(create_sale))
        .route("/sales/:id", get(get_sale))
        .route("/sales/:id/snapshot", get(get_snapshot))
        .route("/sales/:id/contributions", post(contribute))
        .route("/sales/:id/resolve", post(resolve))
        .route("/sales/:id/allocations", get(get_allocations))
        .route("/sales/:id/allocations/:contributor", get(get_allocation))
        .route("/sales/:id/allocations/:contributor/claim", post(claim))
        .route("/sales/:id/allocations/:contributor/refund", post(refund))
        .route("/sales/:id/events", get(get_sale_events))
        .route("/kyc/:address", get(get_kyc_status))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateSaleRequest {
    pub name: String,
    pub project: ProjectInfo,
    #[serde(flatten)]
    pub params: SaleParams,
}

#[derive(Deserialize)]
pub struct ContributeRequest {
    pub contributor: String,
    pub amount: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct SaleResponse {
    pub id: i64,
    pub name: String,
    pub project: ProjectInfo,
    pub config: SaleParams,
    pub summary: SaleSummary,
}

impl SaleResponse {
    fn from_handle(handle: &SaleHandle, now: u64) -> Self {
        Self {
            id: handle.id,
            name: handle.name.clone(),
            project: handle.project.clone(),
            config: handle.sale.config().params().clone(),
            summary: handle.sale.summary(now),
        }
    }
}

#[derive(Serialize)]
pub struct SalesResponse {
    pub count: usize,
    pub sales: Vec<SaleResponse>,
}

#[derive(Serialize)]
pub struct AllocationResponse {
    pub sale_id: i64,
    pub record: AllocationRecord,
    pub status: ClaimStatus,
    pub phase: ClaimPhase,
}

#[derive(Serialize)]
pub struct KycStatusResponse {
    pub address: ContributorId,
    pub verified: bool,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub sale_id: i64,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /sales`
pub async fn create_sale(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateSaleRequest>,
) -> Result<impl IntoResponse> {
    if body.name.trim().is_empty() {
        return Err(LaunchpadError::BadRequest("sale name must not be empty".to_string()));
    }
    let handle = state
        .sales
        .create(&body.name, body.project, body.params)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SaleResponse::from_handle(&handle, writer::now())),
    ))
}

/// `GET /sales`
pub async fn list_sales(State(state): State<Arc<ApiState>>) -> Json<SalesResponse> {
    let now = writer::now();
    let sales: Vec<_> = state
        .sales
        .list()
        .iter()
        .map(|handle| SaleResponse::from_handle(handle, now))
        .collect();
    Json(SalesResponse {
        count: sales.len(),
        sales,
    })
}

/// `GET /sales/:id`
pub async fn get_sale(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<SaleResponse>> {
    let handle = state.sales.get(id)?;
    Ok(Json(SaleResponse::from_handle(&handle, writer::now())))
}

/// `GET /sales/:id/snapshot`
pub async fn get_snapshot(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<LedgerSnapshot>> {
    let snapshot = state.sales.get(id)?.sale.snapshot();
    Ok(Json(LedgerSnapshot::clone(&snapshot)))
}

/// `POST /sales/:id/contributions`
///
/// Replies only after the contribution is durable.
pub async fn contribute(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(body): Json<ContributeRequest>,
) -> Result<impl IntoResponse> {
    let contributor = parse_contributor(&body.contributor)?;
    let receipt: Receipt = state.sales.contribute(id, contributor, body.amount).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `POST /sales/:id/resolve`
pub async fn resolve(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<Resolution>> {
    let resolution = state.sales.resolve(id).await?;
    Ok(Json(Resolution::clone(&resolution)))
}

/// `GET /sales/:id/allocations`
pub async fn get_allocations(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<Resolution>> {
    let resolution = state
        .sales
        .get(id)?
        .sale
        .resolution()
        .ok_or(SaleError::NotResolved)?;
    Ok(Json(Resolution::clone(&resolution)))
}

/// `GET /sales/:id/allocations/:contributor`
pub async fn get_allocation(
    State(state): State<Arc<ApiState>>,
    Path((id, raw)): Path<(i64, String)>,
) -> Result<Json<AllocationResponse>> {
    let contributor = parse_contributor(&raw)?;
    let handle = state.sales.get(id)?;
    let resolution = handle.sale.resolution().ok_or(SaleError::NotResolved)?;
    let record = resolution
        .record_for(&contributor)
        .cloned()
        .ok_or_else(|| not_a_contributor(id, &contributor))?;
    let status = handle
        .sale
        .claim_status(&contributor)
        .ok_or_else(|| not_a_contributor(id, &contributor))?;

    Ok(Json(AllocationResponse {
        sale_id: id,
        record,
        status,
        phase: handle.sale.claim_phase(&contributor),
    }))
}

/// `POST /sales/:id/allocations/:contributor/claim`
pub async fn claim(
    State(state): State<Arc<ApiState>>,
    Path((id, raw)): Path<(i64, String)>,
) -> Result<Json<SettlementEvent>> {
    settle(&state, id, &raw, SettlementKind::Claim).await
}

/// `POST /sales/:id/allocations/:contributor/refund`
pub async fn refund(
    State(state): State<Arc<ApiState>>,
    Path((id, raw)): Path<(i64, String)>,
) -> Result<Json<SettlementEvent>> {
    settle(&state, id, &raw, SettlementKind::Refund).await
}

async fn settle(
    state: &ApiState,
    id: i64,
    raw: &str,
    kind: SettlementKind,
) -> Result<Json<SettlementEvent>> {
    let contributor = parse_contributor(raw)?;
    Ok(Json(state.sales.settle(id, &contributor, kind).await?))
}

/// `GET /sales/:id/events`
///
/// Returns the full event log of one sale in insertion order.
pub async fn get_sale_events(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<EventsResponse>> {
    state.sales.get(id)?;
    let events = db::get_events_for_sale(&state.pool, id).await?;
    Ok(Json(EventsResponse {
        sale_id: id,
        count: events.len(),
        events,
    }))
}

/// `GET /kyc/:address`
///
/// Asks the KYC oracle afresh and reports the answer the next contribution
/// from this address would see.
pub async fn get_kyc_status(
    State(state): State<Arc<ApiState>>,
    Path(raw): Path<String>,
) -> Result<Json<KycStatusResponse>> {
    let address = parse_contributor(&raw)?;
    let verified = state.kyc.refresh(&address).await?;
    Ok(Json(KycStatusResponse { address, verified }))
}

fn not_a_contributor(id: i64, contributor: &ContributorId) -> LaunchpadError {
    LaunchpadError::NotFound(format!("{contributor} did not contribute to sale {id}"))
}
