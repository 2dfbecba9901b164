use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use gatepass_auth::{JwtClaims, Role};
use gatepass_core::UserId;
use gatepass_infra::AppConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over the in-memory store, on an ephemeral port.
        let upload_dir = std::env::temp_dir()
            .join(format!("gatepass-uploads-{}", UserId::new()))
            .to_string_lossy()
            .to_string();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JWT_SECRET", JWT_SECRET),
            ("QR_SIGNING_SECRET", "test-qr-secret"),
            ("UPLOAD_DIR", upload_dir.as_str()),
        ]);
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        let app = gatepass_api::app::build_app(&config).await.unwrap();

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

fn mint_jwt(sub: UserId, role: Role) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        role,
        issued_at: now - ChronoDuration::minutes(1),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

struct Actors {
    admin: String,
    guard: String,
    host_id: UserId,
    host: String,
}

/// Provision a host employee through the API and mint tokens for each role.
async fn actors(client: &reqwest::Client, srv: &TestServer) -> Actors {
    let admin = mint_jwt(UserId::new(), Role::Admin);
    let host_id = UserId::new();
    let res = client
        .post(srv.url("/users"))
        .bearer_auth(&admin)
        .json(&json!({
            "id": host_id,
            "name": "Hana Host",
            "email": format!("hana-{host_id}@corp.example"),
            "role": "employee",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    Actors {
        admin,
        guard: mint_jwt(UserId::new(), Role::Security),
        host_id,
        host: mint_jwt(host_id, Role::Employee),
    }
}

async fn register_visitor(client: &reqwest::Client, srv: &TestServer, a: &Actors) -> String {
    let now = Utc::now();
    let res = client
        .post(srv.url("/visitors"))
        .bearer_auth(&a.host)
        .json(&json!({
            "name": "Vera Visitor",
            "email": "vera@example.com",
            "phone": "+1 555 0100",
            "company": "Acme",
            "purpose": "Quarterly review",
            "hostId": a.host_id,
            "expectedArrival": now.to_rfc3339(),
            "expectedDeparture": (now + ChronoDuration::hours(3)).to_rfc3339(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["visitor"]["status"], "pending");
    body["visitor"]["id"].as_str().unwrap().to_string()
}

async fn approve(client: &reqwest::Client, srv: &TestServer, a: &Actors, visitor_id: &str) {
    let res = client
        .put(srv.url(&format!("/visitors/{visitor_id}/status")))
        .bearer_auth(&a.host)
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

async fn issue(client: &reqwest::Client, srv: &TestServer, token: &str, visitor_id: &str) -> reqwest::Response {
    let now = Utc::now();
    client
        .post(srv.url("/passes"))
        .bearer_auth(token)
        .json(&json!({
            "visitorId": visitor_id,
            "validFrom": now.to_rfc3339(),
            "validTo": (now + ChronoDuration::days(1)).to_rfc3339(),
            "accessLevel": "standard",
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/passes"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let sub = UserId::new();
    let token = mint_jwt(sub, Role::Security);

    let client = reqwest::Client::new();
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["id"].as_str().unwrap(), sub.to_string());
    assert_eq!(body["role"], "security");
}

#[tokio::test]
async fn visit_lifecycle_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = actors(&client, &srv).await;
    let visitor_id = register_visitor(&client, &srv, &a).await;

    // Not approved yet.
    let res = issue(&client, &srv, &a.guard, &visitor_id).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    approve(&client, &srv, &a, &visitor_id).await;

    let res = issue(&client, &srv, &a.guard, &visitor_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["pass"]["status"], "active");
    let qr = body["pass"]["qrData"].as_str().unwrap().to_string();

    let res = issue(&client, &srv, &a.guard, &visitor_id).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/passes/verify"))
        .bearer_auth(&a.guard)
        .json(&json!({ "qrData": qr }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["visitor"]["id"], visitor_id.as_str());

    let scan = |path: &'static str| {
        client
            .post(srv.url(path))
            .bearer_auth(&a.guard)
            .json(&json!({ "qrData": qr, "location": "Main lobby", "temperature": 36.6 }))
            .send()
    };

    let res = scan("/checklogs/checkin").await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["checkLog"]["type"], "check_in");
    assert_eq!(body["visitor"]["status"], "checked_in");

    let res = scan("/checklogs/checkin").await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_checked_in");

    let res = scan("/checklogs/checkout").await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = scan("/checklogs/checkout").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Visitor is not checked in");

    // Re-entry inside the 24h window counts as the same visit.
    let res = scan("/checklogs/checkin").await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(srv.url(&format!("/checklogs/visitor/{visitor_id}")))
        .bearer_auth(&a.host)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["type"], "check_out");

    let res = client
        .get(srv.url("/checklogs/stats?period=week"))
        .bearer_auth(&a.admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["period"], "week");
    assert_eq!(body["totalCheckIns"], 1);
    assert_eq!(body["totalCheckOuts"], 1);
    assert_eq!(body["checkInOutRatio"], "1.00");
}

#[tokio::test]
async fn employees_cannot_issue_passes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = actors(&client, &srv).await;
    let visitor_id = register_visitor(&client, &srv, &a).await;
    approve(&client, &srv, &a, &visitor_id).await;

    let res = issue(&client, &srv, &a.host, &visitor_id).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn verifying_a_revoked_pass_returns_the_pass() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = actors(&client, &srv).await;
    let visitor_id = register_visitor(&client, &srv, &a).await;
    approve(&client, &srv, &a, &visitor_id).await;

    let body: serde_json::Value = issue(&client, &srv, &a.guard, &visitor_id)
        .await
        .json()
        .await
        .unwrap();
    let pass_id = body["pass"]["id"].as_str().unwrap().to_string();
    let qr = body["pass"]["qrData"].as_str().unwrap().to_string();

    let res = client
        .put(srv.url(&format!("/passes/{pass_id}/revoke")))
        .bearer_auth(&a.admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .put(srv.url(&format!("/passes/{pass_id}/revoke")))
        .bearer_auth(&a.admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/passes/verify"))
        .bearer_auth(&a.guard)
        .json(&json!({ "qrData": qr }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Pass is revoked");
    assert_eq!(body["pass"]["status"], "revoked");

    // The one-pass rule is cleared by the revocation.
    let res = issue(&client, &srv, &a.guard, &visitor_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn employees_only_reach_their_own_visitors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = actors(&client, &srv).await;
    let visitor_id = register_visitor(&client, &srv, &a).await;

    let stranger = mint_jwt(UserId::new(), Role::Employee);
    let res = client
        .get(srv.url(&format!("/visitors/{visitor_id}")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/visitors"))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["total"], 0);

    let res = client
        .get(srv.url("/visitors?page=1&limit=5"))
        .bearer_auth(&a.host)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["currentPage"], 1);
    assert_eq!(body["totalPages"], 1);
}

#[tokio::test]
async fn malformed_input_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = actors(&client, &srv).await;

    let res = client
        .get(srv.url("/passes/not-a-uuid"))
        .bearer_auth(&a.guard)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/passes/verify"))
        .bearer_auth(&a.guard)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "QR data is required");

    let visitor_id = register_visitor(&client, &srv, &a).await;
    let res = client
        .put(srv.url(&format!("/visitors/{visitor_id}/status")))
        .bearer_auth(&a.admin)
        .json(&json!({ "status": "checked_in" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Invalid status");
}

#[tokio::test]
async fn host_uploads_a_visitor_photo() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = actors(&client, &srv).await;
    let visitor_id = register_visitor(&client, &srv, &a).await;
    let photo_url = srv.url(&format!("/visitors/{visitor_id}/photo"));

    let form = || {
        let part = reqwest::multipart::Part::bytes(vec![137, 80, 78, 71, 13, 10])
            .file_name("vera.png")
            .mime_str("image/png")
            .unwrap();
        reqwest::multipart::Form::new().part("photo", part)
    };

    let stranger = mint_jwt(UserId::new(), Role::Employee);
    let res = client
        .post(&photo_url)
        .bearer_auth(&stranger)
        .multipart(form())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(&photo_url)
        .bearer_auth(&a.host)
        .multipart(form())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Photo uploaded successfully");
    let stored = body["photoUrl"].as_str().unwrap().to_string();
    assert!(stored.starts_with("/uploads/photo-") && stored.ends_with(".png"));

    let res = client
        .get(srv.url(&format!("/visitors/{visitor_id}")))
        .bearer_auth(&a.host)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["photo"], stored);

    let text_only = reqwest::multipart::Form::new().text("note", "no file here");
    let res = client
        .post(&photo_url)
        .bearer_auth(&a.host)
        .multipart(text_only)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "No file uploaded");
}
