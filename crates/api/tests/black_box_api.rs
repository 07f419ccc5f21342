use reqwest::StatusCode;
use serde_json::{Value, json};

use wms_infra::EngineConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let (services, _background) = wms_api::app::services::build_services(&EngineConfig::default())
            .await
            .expect("failed to build services");
        let app = wms_api::app::build_app(services);
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

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

/// Register a product and a warehouse and receive `on_hand` units.
async fn stocked_key(
    server: &TestServer,
    client: &reqwest::Client,
    code: &str,
    threshold: u32,
    on_hand: i64,
) -> (String, String) {
    let (status, product) = post(
        client,
        server.url("/products"),
        json!({
            "name": format!("Scanner {code}"),
            "category": "electronics",
            "unit": "each",
            "reorder_threshold": threshold,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    assert!(product["sku"].as_str().unwrap().starts_with("ELE-"));

    let (status, warehouse) = post(
        client,
        server.url("/warehouses"),
        json!({
            "code": code,
            "name": "Main",
            "location": { "address": "1 Dock Road", "zone": null },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{warehouse}");

    let product_id = product["id"].as_str().unwrap().to_string();
    let warehouse_id = warehouse["id"].as_str().unwrap().to_string();

    let (status, entry) = post(
        client,
        server.url("/stock/receipts"),
        json!({
            "product_id": product_id,
            "warehouse_id": warehouse_id,
            "quantity": on_hand,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(entry["kind"], "receipt");

    (product_id, warehouse_id)
}

#[tokio::test]
async fn health_and_ready_answer() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client.get(server.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn reservations_respect_available() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = stocked_key(&server, &client, "W1", 0, 10).await;

    let reserve = |quantity: i64| {
        json!({
            "product_id": product_id,
            "warehouse_id": warehouse_id,
            "quantity": quantity,
        })
    };

    let (status, first) = post(&client, server.url("/reservations"), reserve(7)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["status"], "active");

    let (status, err) = post(&client, server.url("/reservations"), reserve(5)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "insufficient_available");

    let id = first["id"].as_str().unwrap();
    let (status, cancelled) = post(
        &client,
        server.url(&format!("/reservations/{id}/cancel")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, availability) = get(
        &client,
        server.url(&format!("/stock/{product_id}/{warehouse_id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["on_hand"], 10);
    assert_eq!(availability["held"], 0);
    assert_eq!(availability["available"], 10);

    let (status, second) = post(&client, server.url("/reservations"), reserve(5)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = second["id"].as_str().unwrap();
    let (status, shipment) = post(
        &client,
        server.url(&format!("/reservations/{id}/commit")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipment["kind"], "shipment");
    assert_eq!(shipment["delta"], -5);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (p1, w1) = stocked_key(&server, &client, "W1", 0, 10).await;
    let (p2, w2) = stocked_key(&server, &client, "W2", 0, 2).await;

    let (status, rejected) = post(
        &client,
        server.url("/orders"),
        json!({
            "lines": [
                { "product_id": p1, "warehouse_id": w1, "quantity": 4 },
                { "product_id": p2, "warehouse_id": w2, "quantity": 3 },
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["rejection"]["line_no"], 2);

    let (_, availability) = get(&client, server.url(&format!("/stock/{p1}/{w1}"))).await;
    assert_eq!(availability["available"], 10);

    let (status, order) = post(
        &client,
        server.url("/orders"),
        json!({ "lines": [{ "product_id": p1, "warehouse_id": w1, "quantity": 4 }] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "reserved");

    let id = order["id"].as_str().unwrap();
    let (status, fulfilled) = post(
        &client,
        server.url(&format!("/orders/{id}/fulfill")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fulfilled["status"], "fulfilled");
    assert_eq!(fulfilled["fulfillment"]["kind"], "complete");

    let (status, err) = post(
        &client,
        server.url(&format!("/orders/{id}/cancel")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "invariant_violation");

    let (status, entries) = get(&client, server.url(&format!("/stock/{p1}/{w1}/entries"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 2);

    let (status, audit) = get(&client, server.url(&format!("/stock/{p1}/{w1}/audit"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["consistent"], true);
    assert_eq!(audit["on_hand"], 6);

    let (status, stats) = get(&client, server.url("/reports/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_orders"], 2);
    assert_eq!(stats["fulfilled_orders"], 1);
    assert_eq!(stats["units_shipped"], 4);

    let (status, orders) = get(&client, server.url("/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn low_stock_shows_in_report_and_alerts() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = stocked_key(&server, &client, "W1", 5, 20).await;

    let (status, entry) = post(
        &client,
        server.url("/stock/adjustments"),
        json!({
            "product_id": product_id,
            "warehouse_id": warehouse_id,
            "delta": -17,
            "reason": "water damage",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["kind"], "adjustment");

    let (status, report) = get(&client, server.url("/reports/inventory")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_on_hand"], 3);
    assert_eq!(report["low_stock"][0]["product_id"], product_id.as_str());

    // The monitor runs on its own thread; poll briefly until it catches up.
    for _ in 0..50 {
        let (_, alerts) = get(&client, server.url("/alerts")).await;
        if let Some(first) = alerts.as_array().and_then(|a| a.first()) {
            assert_eq!(first["on_hand"], 3);
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("low-stock alert did not arrive within timeout");
}

#[tokio::test]
async fn errors_carry_code_and_status() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, err) = get(&client, server.url("/orders/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_id");

    let missing = "01890f5e-6a3b-7cc4-9a1e-3f1c2b4d5e6f";
    let (status, err) = get(&client, server.url(&format!("/products/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"], "not_found");

    let (status, err) = post(
        &client,
        server.url("/orders"),
        json!({ "lines": [] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "validation_error");

    stocked_key(&server, &client, "W1", 0, 1).await;
    let (status, err) = post(
        &client,
        server.url("/warehouses"),
        json!({
            "code": "w1",
            "name": "Duplicate",
            "location": { "address": "elsewhere" },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "already_exists");
}

#[tokio::test]
async fn products_are_priced_and_searchable() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, lamp) = post(
        &client,
        server.url("/products"),
        json!({
            "sku": "LAMP-01",
            "name": "Desk Lamp",
            "category": "furniture",
            "unit": "each",
            "pricing": { "purchase_price": 1500, "selling_price": 2900 },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{lamp}");
    assert_eq!(lamp["pricing"]["selling_price"], 2900);
    assert_eq!(lamp["margin_percent"], 93.33);
    stocked_key(&server, &client, "W1", 0, 5).await;

    let (status, found) = get(&client, server.url("/products?q=lamp")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["sku"], "LAMP-01");

    let (_, electronics) = get(&client, server.url("/products?category=electronics")).await;
    assert_eq!(electronics.as_array().unwrap().len(), 1);
    let (_, all) = get(&client, server.url("/products")).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let id = lamp["id"].as_str().unwrap();
    let (status, err) = post(
        &client,
        server.url(&format!("/products/{id}/pricing")),
        json!({ "purchase_price": 3000, "selling_price": 2000 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "validation_error");
}

#[tokio::test]
async fn order_holds_cannot_be_settled_directly() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (p1, w1) = stocked_key(&server, &client, "W1", 0, 10).await;

    let (_, order) = post(
        &client,
        server.url("/orders"),
        json!({ "lines": [{ "product_id": p1, "warehouse_id": w1, "quantity": 4 }] }),
    )
    .await;
    let hold = order["reservations"][0].as_str().unwrap();

    let (status, err) = post(
        &client,
        server.url(&format!("/reservations/{hold}/commit")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "invariant_violation");

    let (_, availability) = get(&client, server.url(&format!("/stock/{p1}/{w1}"))).await;
    assert_eq!(availability["on_hand"], 10);
    assert_eq!(availability["available"], 6);
}
