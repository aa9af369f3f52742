use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use treasury_core::StaffDirectory;
use treasury_eventstore::{InMemoryTreasuryStore, NoopNotifier};
use treasury_gateway::{AppState, STAFF_HEADER, build_router};
use treasury_workflow::TreasuryService;

const EMPLOYEE: &str = "amal";
const MANAGER: &str = "hala";

async fn app() -> Router {
    let service = TreasuryService::new(
        Arc::new(InMemoryTreasuryStore::new()),
        Arc::new(NoopNotifier),
    );
    service.ensure_funds().await.unwrap();
    let staff = StaffDirectory::parse("amal:EMPLOYEE,hala:TREASURY_MANAGER|ADMIN").unwrap();

    build_router(AppState {
        service,
        staff: Arc::new(staff),
        page_size: 10,
    })
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    staff: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(staff) = staff {
        builder = builder.header(STAFF_HEADER, staff);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

async fn fund_id(router: &Router, fund_type: &str) -> String {
    let (status, funds) = send(router, "GET", "/funds", Some(EMPLOYEE), None).await;
    assert_eq!(status, StatusCode::OK);
    funds["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|fund| fund["fund_type"] == fund_type)
        .map(|fund| fund["id"].as_str().unwrap().to_string())
        .unwrap()
}

async fn open_shift(router: &Router) -> String {
    let (status, shift) = send(
        router,
        "POST",
        "/shifts",
        Some(EMPLOYEE),
        Some(json!({ "shift_type": "morning" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    shift["id"].as_str().unwrap().to_string()
}

async fn record(router: &Router, body: Value) -> (StatusCode, Value) {
    send(router, "POST", "/invoices", Some(EMPLOYEE), Some(body)).await
}

#[tokio::test]
async fn health_needs_no_staff_header() {
    let router = app().await;
    let (status, body) = send(&router, "GET", "/healthz", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn unknown_or_missing_staff_is_unauthorized() {
    let router = app().await;

    let (missing, _) = send(&router, "GET", "/funds", None, None).await;
    let (unknown, _) = send(&router, "GET", "/funds", Some("ghost"), None).await;
    let (known, me) = send(&router, "GET", "/me", Some(MANAGER), None).await;

    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(known, StatusCode::OK);
    assert_eq!(me["roles"], json!(["TREASURY_MANAGER", "ADMIN"]));
}

#[tokio::test]
async fn shift_lifecycle_over_http() {
    let router = app().await;
    let booth = fund_id(&router, "booth").await;

    let (no_shift, _) = record(
        &router,
        json!({
            "invoice_type": "income",
            "invoice_category": "direct",
            "fund_id": booth,
            "total_amount": "1500",
        }),
    )
    .await;
    assert_eq!(no_shift, StatusCode::CONFLICT);

    let shift_id = open_shift(&router).await;
    let (second_open, _) = send(
        &router,
        "POST",
        "/shifts",
        Some(EMPLOYEE),
        Some(json!({ "shift_type": "evening" })),
    )
    .await;
    assert_eq!(second_open, StatusCode::CONFLICT);

    for (invoice_type, amount) in [("income", "1500"), ("expense", "600")] {
        let (status, _) = record(
            &router,
            json!({
                "invoice_type": invoice_type,
                "invoice_category": "direct",
                "fund_id": booth,
                "total_amount": amount,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, current) = send(&router, "GET", "/invoices/current", Some(EMPLOYEE), None).await;
    assert_eq!(current["items"].as_array().unwrap().len(), 2);

    let summary_uri = format!("/shifts/{shift_id}/summary");
    let (_, summary) = send(&router, "GET", &summary_uri, Some(EMPLOYEE), None).await;
    assert_eq!(summary["total_net"], "900");
    assert_eq!(summary["fund_summaries"].as_array().unwrap().len(), 4);

    let close_uri = format!("/shifts/{shift_id}/close");
    let close = json!({ "status": "surplus", "amount": "0" });
    let (status, closed) =
        send(&router, "POST", &close_uri, Some(EMPLOYEE), Some(close.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");
    assert_eq!(closed["expected_total"], "900");

    let (again, message) = send(&router, "POST", &close_uri, Some(EMPLOYEE), Some(close)).await;
    assert_eq!(again, StatusCode::CONFLICT);
    assert!(message.as_str().unwrap().contains("already closed"));

    let (_, current) = send(&router, "GET", "/shifts/current", Some(EMPLOYEE), None).await;
    assert!(current["shift"].is_null());
}

#[tokio::test]
async fn transfer_decisions_are_final() {
    let router = app().await;
    let booth = fund_id(&router, "booth").await;
    let main = fund_id(&router, "main").await;
    open_shift(&router).await;
    record(
        &router,
        json!({
            "invoice_type": "income",
            "invoice_category": "direct",
            "fund_id": booth,
            "total_amount": "300",
        }),
    )
    .await;

    let (status, transfer) = send(
        &router,
        "POST",
        "/transfers",
        Some(EMPLOYEE),
        Some(json!({ "source_fund_id": booth, "amount": "120" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transfer["destination_fund_id"], main.as_str());
    let confirm_uri = format!("/transfers/{}/confirm", transfer["id"].as_str().unwrap());

    let (forbidden, _) = send(&router, "POST", &confirm_uri, Some(EMPLOYEE), None).await;
    assert_eq!(forbidden, StatusCode::FORBIDDEN);

    let (confirmed, body) = send(&router, "POST", &confirm_uri, Some(MANAGER), None).await;
    assert_eq!(confirmed, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (again, _) = send(&router, "POST", &confirm_uri, Some(MANAGER), None).await;
    assert_eq!(again, StatusCode::CONFLICT);

    let (_, fund) = send(&router, "GET", &format!("/funds/{main}"), Some(EMPLOYEE), None).await;
    assert_eq!(fund["current_balance"], "120");

    let (_, pending) = send(
        &router,
        "POST",
        "/transfers",
        Some(EMPLOYEE),
        Some(json!({ "source_fund_id": booth, "amount": "10" })),
    )
    .await;
    let reject_uri = format!("/transfers/{}/reject", pending["id"].as_str().unwrap());
    let (blank, _) = send(
        &router,
        "POST",
        &reject_uri,
        Some(MANAGER),
        Some(json!({ "reason": "  " })),
    )
    .await;
    assert_eq!(blank, StatusCode::BAD_REQUEST);

    let (rejected, body) = send(
        &router,
        "POST",
        &reject_uri,
        Some(MANAGER),
        Some(json!({ "reason": "duplicate request" })),
    )
    .await;
    assert_eq!(rejected, StatusCode::OK);
    assert_eq!(body["rejection_reason"], "duplicate request");
}

#[tokio::test]
async fn debt_discount_must_leave_a_remainder() {
    let router = app().await;
    let main = fund_id(&router, "main").await;
    open_shift(&router).await;

    let (status, invoice) = record(
        &router,
        json!({
            "invoice_type": "income",
            "invoice_category": "debt",
            "fund_id": main,
            "total_amount": "1000",
            "party": {
                "kind": "customer",
                "id": "6a1f3a8e-8f2b-4d0c-9f57-2f1b7a0c9e11",
                "name": "Rana",
            },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invoice["paid_status"], "debt");
    let discount_uri = format!("/debts/{}/discount", invoice["debt_id"].as_str().unwrap());

    let (full, _) = send(
        &router,
        "POST",
        &discount_uri,
        Some(MANAGER),
        Some(json!({ "discount_amount": "1000", "notes": "settlement" })),
    )
    .await;
    assert_eq!(full, StatusCode::BAD_REQUEST);

    let (partial, debt) = send(
        &router,
        "POST",
        &discount_uri,
        Some(MANAGER),
        Some(json!({ "discount_amount": "999", "notes": "settlement" })),
    )
    .await;
    assert_eq!(partial, StatusCode::OK);
    assert_eq!(debt["remaining_amount"], "1");
    assert_eq!(debt["status"], "active");

    let (_, debts) = send(&router, "GET", "/debts?status=active", Some(EMPLOYEE), None).await;
    assert_eq!(debts["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn fund_ledger_pages_through_invoices() {
    let router = app().await;
    let general = fund_id(&router, "general").await;
    open_shift(&router).await;
    for amount in 1..=23 {
        let (status, _) = record(
            &router,
            json!({
                "invoice_type": "expense",
                "invoice_category": "direct",
                "fund_id": general,
                "total_amount": amount.to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let uri = format!("/funds/{general}/ledger?page=3");
    let (status, ledger) = send(&router, "GET", &uri, Some(EMPLOYEE), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["invoices"]["total_items"], 23);
    assert_eq!(ledger["invoices"]["page_count"], 3);
    assert_eq!(ledger["invoices"]["items"].as_array().unwrap().len(), 3);
    assert_eq!(ledger["totals"]["total_expense"], "276");
}
