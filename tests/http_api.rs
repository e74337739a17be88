//! End-to-end HTTP tests against a real listener.

use serde_json::Value;

mod common;
use common::spawn_server;

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/healthz"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    shutdown.trigger();
}

#[tokio::test]
async fn products_endpoint_lists_the_catalog() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/api/products"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert!(
        res.headers().contains_key("x-trace-id"),
        "responses carry the trace id"
    );
    let body: Value = res.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 5);
    assert_eq!(body[0]["name"], "Widget A");

    shutdown.trigger();
}

#[tokio::test]
async fn order_creation_returns_a_completed_receipt() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .post(format!("http://{addr}/api/orders"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "completed");
    let order_id = body["order_id"].as_u64().unwrap();
    assert!((10_000..=99_999).contains(&order_id));

    shutdown.trigger();
}

#[tokio::test]
async fn order_creation_honors_a_pinned_user() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .post(format!("http://{addr}/api/orders"))
        .json(&serde_json::json!({"user_id": 3}))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"], "Charlie");

    shutdown.trigger();
}

#[tokio::test]
async fn checkout_completes_or_declines() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .post(format!("http://{addr}/api/checkout"))
        .send()
        .await
        .expect("server unreachable");

    match res.status().as_u16() {
        201 => {
            let body: Value = res.json().await.unwrap();
            assert_eq!(body["status"], "completed");
            assert!(body["subtotal"].is_number());
            assert!(body["tax"].is_number());
            assert!(body["total"].is_number());
        }
        402 => {
            let body: Value = res.json().await.unwrap();
            assert_eq!(body["error"], "Payment declined");
        }
        other => panic!("unexpected checkout status {other}"),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn error_endpoint_maps_the_fault_to_500() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/api/error"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Simulated error for observability testing");

    shutdown.trigger();
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (addr, shutdown) = spawn_server().await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/api/unknown"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 404);

    shutdown.trigger();
}
