use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use sabor::infra::cdn::{CdnClient, CdnConfig, CdnOutcome};
use serde_json::{Value, json};
use tokio::sync::Mutex;

#[derive(Clone, Copy)]
enum Behavior {
    Accept,
    Reject,
    ServerError,
    Hang,
}

#[derive(Clone)]
struct Zone {
    behavior: Behavior,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn purge(
    State(zone): State<Zone>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    zone.bodies.lock().await.push(body);
    match zone.behavior {
        Behavior::Accept => Ok(Json(json!({ "success": true, "result": { "id": "p" } }))),
        Behavior::Reject => Ok(Json(
            json!({ "success": false, "errors": [{ "code": 10000, "message": "Authentication error" }] }),
        )),
        Behavior::ServerError => Err(StatusCode::BAD_GATEWAY),
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Json(json!({ "success": true })))
        }
    }
}

async fn client_for(behavior: Behavior) -> (CdnClient, Arc<Mutex<Vec<Value>>>) {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/zones/{zone}/purge_cache", post(purge))
        .with_state(Zone {
            behavior,
            bodies: bodies.clone(),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    let client = CdnClient::new(CdnConfig {
        zone_id: Some("zone".into()),
        api_token: Some("token".into()),
        public_url: Some("https://cdn.example.com".into()),
        api_base: format!("http://{addr}"),
        timeout: Duration::from_millis(300),
    })
    .expect("client");
    (client, bodies)
}

#[tokio::test]
async fn url_purge_sends_one_batched_request() {
    let (client, bodies) = client_for(Behavior::Accept).await;
    let urls = vec![
        "https://cdn.example.com/a.jpg".to_string(),
        "https://cdn.example.com/b.jpg".to_string(),
    ];

    assert_eq!(client.purge_urls(&urls).await, CdnOutcome::Purged);
    assert_eq!(
        bodies.lock().await.as_slice(),
        [json!({ "files": urls })]
    );
}

#[tokio::test]
async fn provider_rejections_are_reported_not_raised() {
    for behavior in [Behavior::Reject, Behavior::ServerError] {
        let (client, bodies) = client_for(behavior).await;
        assert_eq!(client.purge_all().await, CdnOutcome::Failed);
        assert_eq!(
            bodies.lock().await.as_slice(),
            [json!({ "purge_everything": true })]
        );
    }
}

#[tokio::test]
async fn slow_provider_hits_the_timeout() {
    let (client, _) = client_for(Behavior::Hang).await;
    let started = std::time::Instant::now();
    assert_eq!(client.purge_all().await, CdnOutcome::Failed);
    assert!(started.elapsed() < Duration::from_secs(3));
}
