//! HTTP surface of the treasury service. Every route except `/healthz` resolves the caller
//! from the `x-staff-id` header before touching the workflow.

use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use tracing::{error, info, warn};
use treasury_core::commands::{
    CancelDebt, CloseShift, ConvertOrder, DebtDiscount, InvoiceChanges, InvoiceStatusChange,
    NewInvoice, NewOrder, NewTransfer, OpenShift, OrderStatusChange, RejectTransfer,
};
use treasury_core::{
    Actor, ChangeNotifier, Debt, EventEnvelope, Fund, Invoice, Order, Shift, StaffDirectory,
    Transfer, TreasuryError, TreasuryStore,
};
use treasury_eventstore::{InMemoryTreasuryStore, NoopNotifier};
use treasury_platform::{
    CurrentShiftResponse, DebtListQuery, FundLedgerQuery, InvoiceListQuery, ListResponse,
    OrderListQuery, PgTreasuryStore, RedisBus, ServiceConfig, ShiftListQuery, TransferListQuery,
    connect_database, ensure_schema,
};
use treasury_workflow::{
    ConversionQuote, FundLedger, OrderConversion, ShiftSummary, TreasuryService,
};
use uuid::Uuid;

pub const STAFF_HEADER: &str = "x-staff-id";

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
pub struct AppState {
    pub service: TreasuryService,
    pub staff: Arc<StaffDirectory>,
    pub page_size: usize,
}

impl AppState {
    fn actor(&self, headers: &HeaderMap) -> Result<Actor, (StatusCode, String)> {
        let staff_id = headers
            .get(STAFF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    format!("{STAFF_HEADER} header is required"),
                )
            })?;

        self.staff.resolve(staff_id).map_err(treasury_error)
    }
}

/// Wires the store and notifier named by the configuration and seeds funds when asked to.
pub async fn bootstrap(config: &ServiceConfig) -> AnyResult<AppState> {
    let store: Arc<dyn TreasuryStore> = match &config.database_url {
        Some(database_url) => {
            let pool = connect_database(database_url).await?;
            ensure_schema(&pool).await?;
            Arc::new(PgTreasuryStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, state is kept in memory");
            Arc::new(InMemoryTreasuryStore::new())
        }
    };
    let notifier: Arc<dyn ChangeNotifier> = match &config.redis_url {
        Some(redis_url) => Arc::new(RedisBus::connect(redis_url)?),
        None => Arc::new(NoopNotifier),
    };

    let service = TreasuryService::new(store, notifier);
    if config.seed_funds {
        let funds = service.ensure_funds().await.context("failed to seed funds")?;
        info!("{} funds available", funds.len());
    }

    Ok(AppState {
        service,
        staff: Arc::new(config.staff.clone()),
        page_size: config.page_size,
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/me", get(whoami))
        .route("/shifts", get(list_shifts).post(open_shift))
        .route("/shifts/current", get(current_shift))
        .route("/shifts/{shift_id}", get(get_shift))
        .route("/shifts/{shift_id}/summary", get(shift_summary))
        .route("/shifts/{shift_id}/close", post(close_shift))
        .route("/funds", get(list_funds))
        .route("/funds/{fund_id}", get(get_fund))
        .route("/funds/{fund_id}/ledger", get(fund_ledger))
        .route("/funds/{fund_id}/reconcile", post(reconcile_fund))
        .route("/invoices", get(list_invoices).post(record_invoice))
        .route("/invoices/current", get(current_invoices))
        .route("/invoices/{invoice_id}", get(get_invoice).patch(update_invoice))
        .route("/invoices/{invoice_id}/status", post(set_invoice_status))
        .route("/transfers", get(list_transfers).post(request_transfer))
        .route("/transfers/{transfer_id}", get(get_transfer))
        .route("/transfers/{transfer_id}/confirm", post(confirm_transfer))
        .route("/transfers/{transfer_id}/reject", post(reject_transfer))
        .route("/debts", get(list_debts))
        .route("/debts/{debt_id}", get(get_debt))
        .route("/debts/{debt_id}/discount", post(discount_debt))
        .route("/debts/{debt_id}/cancel", post(cancel_debt))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/status", post(advance_order))
        .route("/orders/{order_id}/quote", post(quote_order))
        .route("/orders/{order_id}/convert", post(convert_order))
        .route("/audit/{aggregate_id}", get(history))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Actor> {
    Ok(Json(state.actor(&headers)?))
}

async fn open_shift(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OpenShift>,
) -> ApiResult<Shift> {
    let actor = state.actor(&headers)?;
    let shift = state
        .service
        .open_shift(&actor, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(shift))
}

async fn list_shifts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ShiftListQuery>,
) -> ApiResult<ListResponse<Shift>> {
    state.actor(&headers)?;
    let shifts = state
        .service
        .shifts(query.limit.unwrap_or(50))
        .await
        .map_err(treasury_error)?;
    Ok(Json(shifts.into()))
}

async fn current_shift(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CurrentShiftResponse> {
    state.actor(&headers)?;
    let shift = state.service.current_shift().await.map_err(treasury_error)?;
    Ok(Json(CurrentShiftResponse { shift }))
}

async fn get_shift(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shift_id): Path<Uuid>,
) -> ApiResult<Shift> {
    state.actor(&headers)?;
    let shift = state.service.shift(shift_id).await.map_err(treasury_error)?;
    Ok(Json(shift))
}

async fn shift_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shift_id): Path<Uuid>,
) -> ApiResult<ShiftSummary> {
    state.actor(&headers)?;
    let summary = state
        .service
        .shift_summary(shift_id)
        .await
        .map_err(treasury_error)?;
    Ok(Json(summary))
}

async fn close_shift(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shift_id): Path<Uuid>,
    Json(payload): Json<CloseShift>,
) -> ApiResult<Shift> {
    let actor = state.actor(&headers)?;
    let shift = state
        .service
        .close_shift(&actor, shift_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(shift))
}

async fn list_funds(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ListResponse<Fund>> {
    state.actor(&headers)?;
    let funds = state.service.funds().await.map_err(treasury_error)?;
    Ok(Json(funds.into()))
}

async fn get_fund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(fund_id): Path<Uuid>,
) -> ApiResult<Fund> {
    state.actor(&headers)?;
    let fund = state.service.fund(fund_id).await.map_err(treasury_error)?;
    Ok(Json(fund))
}

async fn fund_ledger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(fund_id): Path<Uuid>,
    Query(query): Query<FundLedgerQuery>,
) -> ApiResult<FundLedger> {
    state.actor(&headers)?;
    let ledger = state
        .service
        .fund_ledger(
            fund_id,
            &query.filter(),
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(state.page_size),
        )
        .await
        .map_err(treasury_error)?;
    Ok(Json(ledger))
}

async fn reconcile_fund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(fund_id): Path<Uuid>,
) -> ApiResult<Fund> {
    let actor = state.actor(&headers)?;
    let fund = state
        .service
        .reconcile_fund(&actor, fund_id)
        .await
        .map_err(treasury_error)?;
    Ok(Json(fund))
}

async fn record_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewInvoice>,
) -> ApiResult<Invoice> {
    let actor = state.actor(&headers)?;
    let invoice = state
        .service
        .record_invoice(&actor, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(invoice))
}

async fn list_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InvoiceListQuery>,
) -> ApiResult<ListResponse<Invoice>> {
    state.actor(&headers)?;
    let invoices = state
        .service
        .invoices(&query.into())
        .await
        .map_err(treasury_error)?;
    Ok(Json(invoices.into()))
}

async fn current_invoices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ListResponse<Invoice>> {
    state.actor(&headers)?;
    let invoices = state
        .service
        .current_invoices()
        .await
        .map_err(treasury_error)?;
    Ok(Json(invoices.into()))
}

async fn get_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Invoice> {
    state.actor(&headers)?;
    let invoice = state
        .service
        .invoice(invoice_id)
        .await
        .map_err(treasury_error)?;
    Ok(Json(invoice))
}

async fn update_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<InvoiceChanges>,
) -> ApiResult<Invoice> {
    let actor = state.actor(&headers)?;
    let invoice = state
        .service
        .update_invoice(&actor, invoice_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(invoice))
}

async fn set_invoice_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<InvoiceStatusChange>,
) -> ApiResult<Invoice> {
    let actor = state.actor(&headers)?;
    let invoice = state
        .service
        .set_invoice_status(&actor, invoice_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(invoice))
}

async fn request_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewTransfer>,
) -> ApiResult<Transfer> {
    let actor = state.actor(&headers)?;
    let transfer = state
        .service
        .request_transfer(&actor, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(transfer))
}

async fn list_transfers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TransferListQuery>,
) -> ApiResult<ListResponse<Transfer>> {
    state.actor(&headers)?;
    let transfers = state
        .service
        .transfers(query.status)
        .await
        .map_err(treasury_error)?;
    Ok(Json(transfers.into()))
}

async fn get_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transfer_id): Path<Uuid>,
) -> ApiResult<Transfer> {
    state.actor(&headers)?;
    let transfer = state
        .service
        .transfer(transfer_id)
        .await
        .map_err(treasury_error)?;
    Ok(Json(transfer))
}

async fn confirm_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transfer_id): Path<Uuid>,
) -> ApiResult<Transfer> {
    let actor = state.actor(&headers)?;
    let transfer = state
        .service
        .confirm_transfer(&actor, transfer_id)
        .await
        .map_err(treasury_error)?;
    Ok(Json(transfer))
}

async fn reject_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transfer_id): Path<Uuid>,
    Json(payload): Json<RejectTransfer>,
) -> ApiResult<Transfer> {
    let actor = state.actor(&headers)?;
    let transfer = state
        .service
        .reject_transfer(&actor, transfer_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(transfer))
}

async fn list_debts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DebtListQuery>,
) -> ApiResult<ListResponse<Debt>> {
    state.actor(&headers)?;
    let debts = state
        .service
        .debts(&query.into())
        .await
        .map_err(treasury_error)?;
    Ok(Json(debts.into()))
}

async fn get_debt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(debt_id): Path<Uuid>,
) -> ApiResult<Debt> {
    state.actor(&headers)?;
    let debt = state.service.debt(debt_id).await.map_err(treasury_error)?;
    Ok(Json(debt))
}

async fn discount_debt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(debt_id): Path<Uuid>,
    Json(payload): Json<DebtDiscount>,
) -> ApiResult<Debt> {
    let actor = state.actor(&headers)?;
    let debt = state
        .service
        .discount_debt(&actor, debt_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(debt))
}

async fn cancel_debt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(debt_id): Path<Uuid>,
    Json(payload): Json<CancelDebt>,
) -> ApiResult<Debt> {
    let actor = state.actor(&headers)?;
    let debt = state
        .service
        .cancel_debt(&actor, debt_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(debt))
}

async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewOrder>,
) -> ApiResult<Order> {
    let actor = state.actor(&headers)?;
    let order = state
        .service
        .create_order(&actor, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(order))
}

async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<ListResponse<Order>> {
    state.actor(&headers)?;
    let orders = state
        .service
        .orders(query.status)
        .await
        .map_err(treasury_error)?;
    Ok(Json(orders.into()))
}

async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Order> {
    state.actor(&headers)?;
    let order = state.service.order(order_id).await.map_err(treasury_error)?;
    Ok(Json(order))
}

async fn advance_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<OrderStatusChange>,
) -> ApiResult<Order> {
    let actor = state.actor(&headers)?;
    let order = state
        .service
        .advance_order(&actor, order_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(order))
}

async fn quote_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ConvertOrder>,
) -> ApiResult<ConversionQuote> {
    state.actor(&headers)?;
    let quote = state
        .service
        .quote_order_conversion(order_id, &payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(quote))
}

async fn convert_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ConvertOrder>,
) -> ApiResult<OrderConversion> {
    let actor = state.actor(&headers)?;
    let conversion = state
        .service
        .convert_order(&actor, order_id, payload)
        .await
        .map_err(treasury_error)?;
    Ok(Json(conversion))
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(aggregate_id): Path<Uuid>,
) -> ApiResult<ListResponse<EventEnvelope>> {
    state.actor(&headers)?;
    let events = state
        .service
        .history(aggregate_id)
        .await
        .map_err(treasury_error)?;
    Ok(Json(events.into()))
}

fn treasury_error(err: TreasuryError) -> (StatusCode, String) {
    let status = match &err {
        TreasuryError::Validation(_) => StatusCode::BAD_REQUEST,
        TreasuryError::UnknownActor(_) => StatusCode::UNAUTHORIZED,
        TreasuryError::Forbidden { .. } => StatusCode::FORBIDDEN,
        TreasuryError::NotFound { .. } => StatusCode::NOT_FOUND,
        TreasuryError::NoOpenShift
        | TreasuryError::ShiftAlreadyOpen(_)
        | TreasuryError::ShiftAlreadyClosed(_)
        | TreasuryError::TransferAlreadyDecided { .. }
        | TreasuryError::InvalidTransition { .. }
        | TreasuryError::InsufficientFunds { .. }
        | TreasuryError::Conflict { .. } => StatusCode::CONFLICT,
        TreasuryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {err:#}");
    }
    (status, err.to_string())
}
