//! End-to-end command lines against an in-memory database.

use serde_json::{json, Value};
use storefront_cli::commands::handle_line;
use storefront_cli::config::StorefrontConfig;
use storefront_cli::output::Output;
use storefront_cli::serve;
use storefront_cli::state::AppState;
use storefront_db::{Database, DbConfig};

const TOKEN: &str = "admin-token";

async fn state() -> AppState {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let config = StorefrontConfig {
        admin_token: Some(TOKEN.to_string()),
        ..Default::default()
    };
    AppState::new(db, config)
}

async fn send(state: &AppState, request: Value) -> Value {
    let response = handle_line(state, &request.to_string()).await;
    serde_json::to_value(response).unwrap()
}

async fn ok(state: &AppState, request: Value) -> Value {
    let response = send(state, request.clone()).await;
    assert_eq!(response["ok"], true, "{} failed: {}", request, response);
    response["data"].clone()
}

async fn create_product(state: &AppState, code: &str, price_cents: i64, stock: i64) -> String {
    let product = ok(
        state,
        json!({
            "command": "create_product",
            "token": TOKEN,
            "product": {
                "title": format!("Item {}", code),
                "description": "demo",
                "code": code,
                "priceCents": price_cents,
                "stock": stock,
                "category": "demo"
            }
        }),
    )
    .await;
    product["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn cart_to_ticket_flow() {
    let state = state().await;
    let a = create_product(&state, "mate", 1200, 3).await;
    let b = create_product(&state, "bombilla", 800, 1).await;

    let cart = ok(
        &state,
        json!({"command": "create_cart", "userId": "ana@example.com"}),
    )
    .await;
    let cart_id = cart["id"].as_str().unwrap().to_string();
    assert_eq!(cart["owner"], "ana@example.com");

    ok(
        &state,
        json!({"command": "add_line", "cartId": cart_id, "productId": a, "quantity": 2}),
    )
    .await;
    ok(
        &state,
        json!({"command": "add_line", "cartId": cart_id, "productId": b, "quantity": 1}),
    )
    .await;

    let view = ok(&state, json!({"command": "cart_view", "cartId": cart_id})).await;
    assert_eq!(view["subtotalCents"], 3200);

    let outcome = ok(
        &state,
        json!({"command": "purchase", "cartId": cart_id, "purchaser": "ana@example.com"}),
    )
    .await;
    assert_eq!(outcome["ticket"]["totalCents"], 3200);
    assert_eq!(outcome["cart"]["lines"], json!([]));

    let code = outcome["ticket"]["ticketCode"].as_str().unwrap();
    let ticket = ok(&state, json!({"command": "get_ticket", "code": code})).await;
    assert_eq!(ticket["purchased"].as_array().unwrap().len(), 2);

    let tickets = ok(
        &state,
        json!({"command": "list_tickets", "purchaser": "ana@example.com"}),
    )
    .await;
    assert_eq!(tickets.as_array().unwrap().len(), 1);

    let product = ok(&state, json!({"command": "get_product", "productId": a})).await;
    assert_eq!(product["stock"], 1);
}

#[tokio::test]
async fn catalog_writes_need_the_token() {
    let state = state().await;

    let response = send(
        &state,
        json!({
            "id": 9,
            "command": "create_product",
            "product": {
                "title": "x", "description": "x", "code": "x",
                "priceCents": 1, "stock": 1, "category": "x"
            }
        }),
    )
    .await;
    assert_eq!(response["id"], 9);
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"]["code"], "FORBIDDEN");

    let id = create_product(&state, "x", 1, 1).await;
    let response = send(
        &state,
        json!({"command": "delete_product", "token": "wrong", "productId": id}),
    )
    .await;
    assert_eq!(response["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn failures_map_to_codes() {
    let state = state().await;
    let p = create_product(&state, "p", 100, 1).await;
    let cart = ok(&state, json!({"command": "create_cart"})).await;
    let cart_id = cart["id"].as_str().unwrap().to_string();
    assert_eq!(cart["owner"], "guest");

    let response = send(
        &state,
        json!({"command": "add_line", "cartId": cart_id, "productId": p, "quantity": 2}),
    )
    .await;
    assert_eq!(response["error"]["code"], "INSUFFICIENT_STOCK");

    let response = send(
        &state,
        json!({"command": "purchase", "cartId": cart_id, "purchaser": "guest"}),
    )
    .await;
    assert_eq!(response["error"]["code"], "EMPTY_CART");

    let response = send(&state, json!({"command": "get_cart", "cartId": "nope"})).await;
    assert_eq!(response["error"]["code"], "NOT_FOUND");

    let response = send(&state, json!({"command": "get_ticket", "code": "nope"})).await;
    assert_eq!(response["error"]["code"], "NOT_FOUND");

    let response = send(&state, json!({"command": "list_products", "limit": 500})).await;
    assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_lines_are_bad_requests() {
    let state = state().await;

    let response = serde_json::to_value(handle_line(&state, "not json").await).unwrap();
    assert_eq!(response["error"]["code"], "BAD_REQUEST");

    let response = send(&state, json!({"id": "r-1", "command": "teleport"})).await;
    assert_eq!(response["id"], "r-1");
    assert_eq!(response["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn invalid_utf8_line_does_not_end_the_session() {
    let state = state().await;
    let output = Output::buffer();

    let mut input = Vec::new();
    input.extend_from_slice(b"{\"id\": 1, \"command\": \"health\"}\n");
    input.extend_from_slice(b"\xff\xfe{\"command\"}\n");
    input.extend_from_slice(b"\r\n");
    input.extend_from_slice(b"{\"id\": 2, \"command\": \"list_carts\"}\r\n");

    serve(&state, tokio::io::BufReader::new(&input[..]), &output)
        .await
        .unwrap();

    let lines: Vec<Value> = output
        .lines()
        .await
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[1]["ok"], false);
    assert_eq!(lines[1]["error"]["code"], "BAD_REQUEST");
    assert_eq!(lines[2]["id"], 2);
    assert_eq!(lines[2]["data"], json!([]));
}

#[tokio::test]
async fn events_follow_commits() {
    let state = state().await;
    let mut rx = state.events.subscribe();

    let p = create_product(&state, "ev", 100, 5).await;
    let cart = ok(
        &state,
        json!({"command": "create_cart", "lines": [{"productId": p, "quantity": 2}]}),
    )
    .await;
    ok(
        &state,
        json!({"command": "purchase", "cartId": cart["id"], "purchaser": "guest"}),
    )
    .await;

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(serde_json::to_value(event).unwrap()["type"].clone());
    }

    assert_eq!(kinds.first(), Some(&json!("product_created")));
    assert!(kinds.contains(&json!("cart_created")));
    assert!(kinds.contains(&json!("stock_changed")));
    assert_eq!(kinds.last(), Some(&json!("purchase_completed")));
}

#[tokio::test]
async fn health_reports_database() {
    let state = state().await;
    let health = ok(&state, json!({"command": "health"})).await;
    assert_eq!(health["database"], true);
}
