use loomledger_infra::config::LedgerConfig;
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(LedgerConfig::default()).await
    }

    async fn spawn_with(config: LedgerConfig) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = loomledger_api::app::build_app(config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post(client: &reqwest::Client, srv: &TestServer, path: &str, body: Value) -> (StatusCode, Value) {
    let res = client.post(srv.url(path)).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get(client: &reqwest::Client, srv: &TestServer, path: &str) -> (StatusCode, Value) {
    let res = client.get(srv.url(path)).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn create_fabric(client: &reqwest::Client, srv: &TestServer, quantity: u32, min_threshold: u32) -> String {
    let (status, body) = post(
        client,
        srv,
        "/items",
        json!({
            "kind": "fabric",
            "name": "Indigo denim",
            "unit": "square_meters",
            "quantity": quantity,
            "min_threshold": min_threshold,
            "actor": "alice",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, &srv, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "in_memory");
}

#[tokio::test]
async fn created_item_is_readable_and_listed() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = create_fabric(&client, &srv, 40, 5).await;
    assert!(id.starts_with("FAB-"));

    let (status, item) = get(&client, &srv, &format!("/items/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["kind"], "fabric");
    assert_eq!(item["status"], "available");
    assert_eq!(item["quantity"].as_f64(), Some(40.0));

    let (status, list) = get(&client, &srv, "/items?kind=fabric").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["items"].as_array().unwrap().len(), 1);

    let (_, none) = get(&client, &srv, "/items?kind=cut_piece").await;
    assert!(none["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cutting_fabric_creates_pieces_and_logs_the_area() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let fabric_id = create_fabric(&client, &srv, 100, 10).await;

    let (status, body) = post(
        &client,
        &srv,
        "/cut",
        json!({
            "fabric_id": fabric_id,
            "piece_length": 2,
            "piece_width": 1,
            "piece_count": 10,
            "actor": "cutter-1",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["fabric"]["quantity"].as_f64(), Some(80.0));
    assert_eq!(body["cut_piece"]["quantity"].as_f64(), Some(10.0));
    assert_eq!(body["cut_piece"]["kind"], "cut_piece");
    assert_eq!(body["cut_piece"]["source_item"], fabric_id.as_str());
    assert_eq!(body["transaction"]["kind"], "stock_out");
    assert_eq!(body["transaction"]["quantity_delta"].as_f64(), Some(-20.0));

    let piece_id = body["cut_piece"]["id"].as_str().unwrap().to_string();
    let (status, body) = post(
        &client,
        &srv,
        "/manufacture",
        json!({
            "cut_piece_id": piece_id,
            "units": 4,
            "pieces_per_unit": 2,
            "actor": "tailor-1",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["cut_piece"]["quantity"].as_f64(), Some(2.0));
    assert_eq!(body["unit"]["quantity"].as_f64(), Some(4.0));
}

#[tokio::test]
async fn consuming_more_than_available_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 5, 0).await;

    let (status, body) = post(
        &client,
        &srv,
        "/consume",
        json!({ "item_id": id, "amount": 20, "reason": "order 7", "actor": "bob" }),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["requested"].as_f64(), Some(20.0));
    assert_eq!(body["available"].as_f64(), Some(5.0));

    let (_, item) = get(&client, &srv, &format!("/items/{id}")).await;
    assert_eq!(item["quantity"].as_f64(), Some(5.0));
}

#[tokio::test]
async fn stock_movements_update_quantity_and_status() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 12, 8).await;

    let (status, item) = post(
        &client,
        &srv,
        "/stock_out",
        json!({ "item_id": id, "amount": 5, "reason": "sample run", "actor": "bob" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["quantity"].as_f64(), Some(7.0));
    assert_eq!(item["status"], "low_stock");

    let (status, item) = post(
        &client,
        &srv,
        "/stock_in",
        json!({ "item_id": id, "amount": 3, "reason": "delivery", "actor": "bob" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["quantity"].as_f64(), Some(10.0));
    assert_eq!(item["status"], "available");

    let (status, item) = post(
        &client,
        &srv,
        "/adjust",
        json!({ "item_id": id, "delta": -10, "reason": "water damage", "actor": "bob" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["status"], "out_of_stock");
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_400() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 10, 0).await;

    let (status, body) = post(
        &client,
        &srv,
        "/consume",
        json!({ "item_id": id, "amount": -3, "reason": "oops", "actor": "bob" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = post(
        &client,
        &srv,
        "/items",
        json!({ "kind": "leather", "name": "x", "unit": "m", "actor": "alice" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    // Missing required fields never reach the engine.
    let (status, body) = post(&client, &srv, "/cut", json!({ "fabric_id": id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn unknown_items_are_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, &srv, "/items/FAB-999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = post(
        &client,
        &srv,
        "/stock_in",
        json!({ "item_id": "FAB-999999", "amount": 1, "reason": "x", "actor": "bob" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_ids_are_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = json!({
        "id": "ROLL-7",
        "kind": "fabric",
        "name": "Linen",
        "unit": "meters",
        "actor": "alice",
    });

    let (status, _) = post(&client, &srv, "/items", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, err) = post(&client, &srv, "/items", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "duplicate_id");
}

#[tokio::test]
async fn transaction_history_is_paginated_newest_first() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 100, 0).await;

    // 1 initial stock entry + 24 consumptions.
    for n in 0..24 {
        let (status, _) = post(
            &client,
            &srv,
            "/consume",
            json!({ "item_id": id, "amount": 1, "reason": format!("order {n}"), "actor": "bob" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let mut sizes = Vec::new();
    for page in 1..=3 {
        let (status, body) = get(
            &client,
            &srv,
            &format!("/transactions?pageSize=10&page={page}"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 25);
        assert_eq!(body["has_more"], page < 3);
        sizes.push(body["items"].as_array().unwrap().len());
    }
    assert_eq!(sizes, vec![10, 10, 5]);

    let (_, first) = get(&client, &srv, "/transactions?pageSize=1").await;
    assert_eq!(first["items"][0]["reason"], "order 23");

    let (_, filtered) = get(&client, &srv, "/transactions?kind=stock_in&actor=alice").await;
    assert_eq!(filtered["total"], 1);

    let (status, _) = get(&client, &srv, "/transactions?kind=teleport").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reports_summarise_by_kind_and_actor() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 50, 0).await;
    post(
        &client,
        &srv,
        "/consume",
        json!({ "item_id": id, "amount": 15, "reason": "order 1", "actor": "bob" }),
    )
    .await;

    let (status, summary) = get(&client, &srv, "/reports/summary").await;
    assert_eq!(status, StatusCode::OK);
    let kinds = summary["kinds"].as_array().unwrap();
    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[0]["kind"], "fabric");
    assert_eq!(kinds[0]["item_count"], 1);
    assert_eq!(kinds[0]["total_quantity"].as_f64(), Some(35.0));

    let (status, bob) = get(&client, &srv, "/reports/actors/bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bob["transaction_count"], 1);
    assert_eq!(bob["total_consumed"].as_f64(), Some(15.0));
}

#[tokio::test]
async fn clear_history_empties_the_log_but_keeps_items() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 30, 0).await;

    let (status, body) = post(&client, &srv, "/admin/clear-history", json!({ "actor": "admin" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, page) = get(&client, &srv, "/transactions").await;
    assert_eq!(page["total"], 0);
    let (_, item) = get(&client, &srv, &format!("/items/{id}")).await;
    assert_eq!(item["quantity"].as_f64(), Some(30.0));
}

#[tokio::test]
async fn audit_confirms_the_ledger_matches_the_log() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_fabric(&client, &srv, 40, 0).await;
    post(
        &client,
        &srv,
        "/consume",
        json!({ "item_id": id, "amount": 15, "reason": "order 9", "actor": "bob" }),
    )
    .await;

    let (status, body) = post(&client, &srv, &format!("/admin/audit/{id}"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["item_id"], id.as_str());
    assert_eq!(body["consistent"], true);

    let (status, body) = post(&client, &srv, "/admin/audit/NOPE-1", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn requests_over_the_rate_limit_get_429() {
    let srv = TestServer::spawn_with(LedgerConfig {
        rate_limit: 3,
        ..LedgerConfig::default()
    })
    .await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let (status, _) = get(&client, &srv, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = get(&client, &srv, "/health").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");
}
