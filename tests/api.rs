use std::{str::FromStr, sync::Arc};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use ledgerbook::{
    front::{self, AppState},
    settings::Settings,
    store::memory::MemoryStore,
};

const API_KEY: &str = "test-key";

fn app() -> Router {
    let mut settings = Settings::default();
    settings.auth.api_key = Some(API_KEY.to_string());
    let state = AppState::new(Arc::new(MemoryStore::new()), &settings);
    front::router(state, 1 << 20)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_batch(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/entries/batch")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn amount(v: &Value) -> BigDecimal {
    match v {
        Value::String(s) => BigDecimal::from_str(s).unwrap(),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not an amount: {other}"),
    }
}

fn dec(n: i64) -> BigDecimal {
    BigDecimal::from(n)
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, entry) = send(app, post("/api/entries", body)).await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    entry
}

async fn entry_count(app: &Router) -> i64 {
    let (_, health) = send(app, get("/health/db")).await;
    health["entries"].as_i64().unwrap()
}

#[tokio::test]
async fn expense_is_negative_and_create_is_idempotent() {
    let app = app();
    let body = json!({
        "date": "2024-01-05",
        "content": "lunch",
        "amount": 50,
        "flow": "expense",
        "idempotencyKey": "k1",
    });
    let first = create(&app, body.clone()).await;
    assert_eq!(amount(&first["amount"]), dec(-50));
    assert_eq!(first["date"], "2024-01-05");

    let second = create(&app, body).await;
    assert_eq!(second["id"], first["id"]);
    assert_eq!(entry_count(&app).await, 1);
}

#[tokio::test]
async fn idempotency_header_wins_over_body() {
    let app = app();
    let req = |body_key: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/entries")
            .header("content-type", "application/json")
            .header("Idempotency-Key", "from-header")
            .body(Body::from(
                json!({"amount": "10", "flow": "income", "idempotencyKey": body_key}).to_string(),
            ))
            .unwrap()
    };
    let (_, a) = send(&app, req("one")).await;
    let (_, b) = send(&app, req("two")).await;
    assert_eq!(a["idempotencyKey"], "from-header");
    assert_eq!(a["id"], b["id"]);
    assert_eq!(entry_count(&app).await, 1);
}

#[tokio::test]
async fn malformed_amount_is_rejected() {
    let app = app();
    for bad in [json!("abc"), json!("0.004"), json!("1e20"), json!(123456789012345.67_f64)] {
        let (status, err) =
            send(&app, post("/api/entries", json!({"content": "x", "amount": bad, "flow": "income"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(err["error"], "invalid_amount");
    }
    assert_eq!(entry_count(&app).await, 0);
}

#[tokio::test]
async fn rejected_json_bodies_use_error_shape() {
    let app = app();
    let broken = Request::builder()
        .method("POST")
        .uri("/api/entries")
        .header("content-type", "application/json")
        .body(Body::from("{\"amount\": 1,"))
        .unwrap();
    let (status, err) = send(&app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "malformed_payload");
    assert!(err["message"].is_string());

    let untyped = Request::builder()
        .method("POST")
        .uri("/api/dictionary/category")
        .body(Body::from(json!({"name": "Food"}).to_string()))
        .unwrap();
    let (status, err) = send(&app, untyped).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(err["error"], "malformed_payload");

    let (status, err) = send(&app, post("/api/uploads/complete", json!({"entryId": "seven"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "malformed_payload");
}

#[tokio::test]
async fn batch_requires_api_key() {
    let app = app();
    let (status, _) = send(&app, post("/api/entries/batch", json!([{"amount": 1}]))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = post_batch(json!([{"amount": 1}]));
    req.headers_mut()
        .insert("x-api-key", "wrong".parse().unwrap());
    let (status, err) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "unauthorized");
    assert_eq!(entry_count(&app).await, 0);
}

#[tokio::test]
async fn batch_reuses_repeated_keys() {
    let app = app();
    let (status, out) = send(
        &app,
        post_batch(json!([
            {"content": "a", "amount": 10, "idempotencyKey": "b1"},
            {"content": "a again", "amount": 99, "idempotencyKey": "b1"},
            {"content": "c", "amount": 5, "flow": "expense"},
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["ok"], true);
    assert_eq!(out["count"], 3);
    assert_eq!(out["items"][1]["id"], out["items"][0]["id"]);
    assert_eq!(out["results"][1]["status"], "existing");
    assert_eq!(amount(&out["items"][2]["amount"]), dec(-5));
    assert_eq!(entry_count(&app).await, 2);
}

#[tokio::test]
async fn batch_degrades_on_bad_shapes() {
    let app = app();
    let (_, out) = send(&app, post_batch(json!({"amount": 1}))).await;
    assert_eq!(out["count"], 0);

    let req = Request::builder()
        .method("POST")
        .uri("/api/entries/batch")
        .header("x-api-key", API_KEY)
        .body(Body::from("not json"))
        .unwrap();
    let (status, out) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["ok"], true);
    assert_eq!(out["count"], 0);

    let (_, out) = send(&app, post_batch(json!([{"amount": "x"}, {"amount": 2}]))).await;
    assert_eq!(out["count"], 1);
    assert_eq!(out["results"][0]["status"], "failed");
    assert_eq!(out["results"][1]["status"], "created");
}

#[tokio::test]
async fn summary_splits_income_and_expense() {
    let app = app();
    for (date, amt) in [
        ("2024-03-01", 100),
        ("2024-03-10", -40),
        ("2024-03-31", -10),
        ("2024-03-15", 0),
        ("2024-04-01", 500),
    ] {
        create(&app, json!({"date": date, "amount": amt, "content": "x"})).await;
    }
    let (status, s) = send(&app, get("/api/entries/summary?date_from=2024-03-01&date_to=2024-03-31")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&s["income"]), dec(100));
    assert_eq!(amount(&s["expense"]), dec(-50));
    assert_eq!(amount(&s["net"]), dec(50));
    assert_eq!(s["count_income"], 1);
    assert_eq!(s["count_expense"], 2);

    let (_, listed) = send(&app, get("/api/entries?date_from=2024-03-01&date_to=2024-03-31")).await;
    assert_eq!(listed.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn list_filters_by_flow_keyword_and_receipts() {
    let app = app();
    let salary = create(&app, json!({"date": "2024-01-01", "amount": 2000, "content": "Salary"})).await;
    let taxi = create(
        &app,
        json!({"date": "2024-01-03", "amount": 30, "flow": "expense", "content": "ride", "note": "Airport TAXI"}),
    )
    .await;
    create(&app, json!({"date": "2024-01-02", "amount": -12, "content": "coffee"})).await;

    let (status, att) = send(
        &app,
        post(
            "/api/uploads/complete",
            json!({"entryId": taxi["id"], "key": "2024-01-03/abc", "filename": "taxi.pdf", "mime": "application/pdf", "size": 2048, "pages": 1}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{att}");
    assert_eq!(att["entryId"], taxi["id"]);

    let (_, income) = send(&app, get("/api/entries?flow=income")).await;
    let income = income.as_array().unwrap();
    assert_eq!(income.len(), 1);
    assert_eq!(income[0]["id"], salary["id"]);

    let (_, found) = send(&app, get("/api/entries?keyword=taxi")).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["attachments"][0]["filename"], "taxi.pdf");

    let (_, without) = send(&app, get("/api/entries?has_receipt=false")).await;
    let without = without.as_array().unwrap();
    assert_eq!(without.len(), 2);
    assert!(without.iter().all(|e| e["attachments"].as_array().unwrap().is_empty()));

    let (_, all) = send(&app, get("/api/entries?category=&flow=")).await;
    let dates: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, ["2024-01-03", "2024-01-02", "2024-01-01"]);

    let (_, ranged) = send(&app, get("/api/entries?min_amount=-20&max_amount=100&flow=expense")).await;
    assert_eq!(ranged.as_array().unwrap().len(), 1);

    let (status, err) = send(&app, get("/api/entries?category=food")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_filter");
}

#[tokio::test]
async fn entries_carry_dictionary_labels() {
    let app = app();
    let (_, cat) = send(&app, post("/api/dictionary/category", json!({"name": " Travel "}))).await;
    assert_eq!(cat["name"], "Travel");
    let (_, fund) = send(
        &app,
        post("/api/dictionary/fund", json!({"name": "Petty cash", "direction": "source"})),
    )
    .await;
    assert_eq!(fund["direction"], "source");

    create(
        &app,
        json!({"amount": -8, "categoryId": cat["id"], "fundId": fund["id"], "content": "bus"}),
    )
    .await;

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/dictionary/category/{}", cat["id"]))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, cats) = send(&app, get("/api/dictionary/category")).await;
    assert!(cats.as_array().unwrap().is_empty());

    let (_, listed) = send(&app, get(&format!("/api/entries?category={}", cat["id"]))).await;
    assert_eq!(listed[0]["category"]["name"], "Travel");
    assert_eq!(listed[0]["category"]["active"], false);
    assert_eq!(listed[0]["fund"]["direction"], "source");

    let (status, err) = send(&app, get("/api/dictionary/vendor")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "unknown_dictionary");
}

#[tokio::test]
async fn uploads_need_storage_and_an_entry() {
    let app = app();
    let (status, err) = send(&app, post("/api/uploads/sign", json!({"mime": "image/png"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err["error"], "storage_unavailable");

    let (status, _) = send(&app, post("/api/uploads/complete", json!({"key": "k"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, err) = send(&app, post("/api/uploads/complete", json!({"entryId": 77, "key": "k"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"], "not_found");

    let (status, _) = send(&app, get("/api/uploads/url")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn csv_import_runs_through_batch_pipeline() {
    let app = app();
    let csv = "date;content;amount;flow;idempotencyKey\n\
               2024-02-01;rent;900;expense;r1\n\
               2024-02-01;rent dup;900;expense;r1\n\
               2024-02-02;broken;n/a;;\n";
    let body = format!(
        "--XBOUNDARY\r\n\
         Content-Disposition: form-data; name=\"comment\"\r\n\r\n\
         date;content;amount\n2024-02-03;not a file;5\r\n\
         --XBOUNDARY\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"entries.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --XBOUNDARY--\r\n"
    );
    let req = Request::builder()
        .method("POST")
        .uri("/api/entries/import?delimiter=;")
        .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
        .header("x-api-key", API_KEY)
        .body(Body::from(body))
        .unwrap();
    let (status, out) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{out}");
    assert_eq!(out["count"], 2);
    assert_eq!(out["results"].as_array().unwrap().len(), 3);
    assert_eq!(out["items"][0]["id"], out["items"][1]["id"]);
    assert_eq!(amount(&out["items"][0]["amount"]), dec(-900));
    assert_eq!(out["results"][2]["status"], "failed");
    assert_eq!(entry_count(&app).await, 1);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}
