//! HTTP surface: routing and shared handler state.

mod connections;
mod extract;
mod profiles;
mod system;

pub use extract::*;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use std::sync::Arc;

use crate::{Config, Store};

#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, store: Store) -> SharedState {
        Arc::new(Self { config, store })
    }
}

pub fn router(state: SharedState) -> Router {
    // JSON creates carry base64, which is a third larger than the capture.
    let body_limit = state.config.max_upload_bytes.saturating_mul(4) / 3 + 64 * 1024;

    Router::new()
        .route("/health", get(system::health))
        .route("/api/stats", get(system::stats))
        .route("/api/exec", post(system::exec))
        .route("/api/profiles", get(profiles::list).post(profiles::create))
        .route("/api/profiles/recent", get(profiles::recent))
        .route("/api/profiles/saved", get(profiles::saved))
        .route("/api/profiles/export", get(profiles::export))
        .route("/api/profiles/upload", post(profiles::upload))
        .route("/api/profiles/fetch", post(profiles::fetch))
        .route(
            "/api/profiles/{id}",
            get(profiles::get_one)
                .patch(profiles::update)
                .delete(profiles::delete),
        )
        .route("/api/profiles/{id}/raw", get(profiles::raw))
        .route(
            "/api/connections",
            get(connections::list).post(connections::create),
        )
        .route(
            "/api/connections/{id}",
            get(connections::get_one)
                .patch(connections::update)
                .delete(connections::delete),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    fn app() -> Router {
        router(AppState::new(Config::default(), Store::in_memory()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&v).expect("json body"))
            }
            None => Body::empty(),
        };
        let resp = app
            .clone()
            .oneshot(req.body(body).expect("request"))
            .await
            .expect("response");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json response")
        };
        (status, value)
    }

    fn profile_body(name: &str, kind: &str, bytes: &[u8]) -> Value {
        json!({
            "originalFilename": name,
            "profileType": kind,
            "data": STANDARD.encode(bytes),
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_then_fetch_profile() {
        let app = app();
        let (status, created) = send(
            &app,
            Method::POST,
            "/api/profiles",
            Some(profile_body("cpu.pb.gz", "cpu", b"capture")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], 1);
        assert_eq!(created["size"], 7);
        assert_eq!(created["isSaved"], false);
        assert!(created["uploadedAt"].is_string());

        let (status, fetched) = send(&app, Method::GET, "/api/profiles/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"], STANDARD.encode(b"capture"));

        let (_, listed) = send(&app, Method::GET, "/api/profiles", None).await;
        let rows = listed.as_array().expect("array");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("data").is_none());
    }

    #[tokio::test]
    async fn invalid_create_returns_formatted_validation_error() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/profiles",
            Some(json!({"originalFilename": "", "profileType": "nope", "data": "AA=="})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let msg = body["error"].as_str().expect("error string");
        assert!(msg.starts_with("Validation error: "), "{msg}");
        assert!(msg.contains("originalFilename"), "{msg}");
        assert!(msg.contains("profileType"), "{msg}");
    }

    #[tokio::test]
    async fn malformed_json_is_a_json_error_body() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/profiles")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn update_and_delete_missing_profile_are_not_found() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::PATCH,
            "/api/profiles/99",
            Some(json!({"isSaved": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "profile 99 not found");

        let (status, _) = send(&app, Method::DELETE, "/api/profiles/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, "/api/profiles/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_twice_reports_absence_second_time() {
        let app = app();
        send(&app, Method::POST, "/api/profiles", Some(profile_body("heap.pb.gz", "heap", b"h"))).await;
        let (first, _) = send(&app, Method::DELETE, "/api/profiles/1", None).await;
        let (second, _) = send(&app, Method::DELETE, "/api/profiles/1", None).await;
        assert_eq!(first, StatusCode::NO_CONTENT);
        assert_eq!(second, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn saved_and_recent_listings() {
        let app = app();
        for (name, kind) in [("a-cpu", "cpu"), ("b-heap", "heap"), ("c-block", "block")] {
            send(&app, Method::POST, "/api/profiles", Some(profile_body(name, kind, b"x"))).await;
        }
        let (status, updated) = send(
            &app,
            Method::PATCH,
            "/api/profiles/2",
            Some(json!({"isSaved": true, "description": "keep"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["description"], "keep");

        let (_, saved) = send(&app, Method::GET, "/api/profiles/saved", None).await;
        let saved = saved.as_array().expect("array");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0]["id"], 2);

        let (_, recent) = send(&app, Method::GET, "/api/profiles/recent?limit=2", None).await;
        let ids = recent
            .as_array()
            .expect("array")
            .iter()
            .map(|p| p["id"].as_u64().expect("id"))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn raw_upload_detects_type_and_serves_bytes_back() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/profiles/upload?filename=svc-mutex.pb.gz&description=lock%20storm")
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(Body::from(vec![0x1f, 0x8b, 0x08, 0x00]))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let created: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(created["profileType"], "mutex");
        assert_eq!(created["description"], "lock storm");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/profiles/1/raw")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .expect("disposition");
        assert!(disposition.contains("svc-mutex.pb.gz"));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        assert_eq!(bytes.as_ref(), &[0x1f, 0x8b, 0x08, 0x00]);
    }

    #[tokio::test]
    async fn connection_crud() {
        let app = app();
        let (status, created) = send(
            &app,
            Method::POST,
            "/api/connections",
            Some(json!({"name": "webservice", "url": "http://localhost:6060"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["id"], 1);
        assert_eq!(created["isActive"], true);
        assert!(created["lastConnected"].is_null());

        let (status, updated) = send(
            &app,
            Method::PATCH,
            "/api/connections/1",
            Some(json!({"isActive": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["isActive"], false);

        let (status, body) = send(
            &app,
            Method::PATCH,
            "/api/connections/1",
            Some(json!({"url": "gopher://nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("msg").contains("url"));

        let (status, _) = send(&app, Method::DELETE, "/api/connections/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/api/connections/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fetch_requires_a_url_or_connection() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/profiles/fetch",
            Some(json!({"profileType": "heap"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("msg").contains("url"));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/profiles/fetch",
            Some(json!({"profileType": "heap", "connectionId": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn exec_rejects_commands_outside_allow_list() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/exec",
            Some(json!({"command": "bash", "args": ["-c", "id"]})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "command not allowed: bash");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exec_runs_allowed_command() {
        let config = Config {
            allowed_commands: vec!["echo".to_string()],
            ..Config::default()
        };
        let (status, body) = send(
            &router(AppState::new(config, Store::in_memory())),
            Method::POST,
            "/api/exec",
            Some(json!({"command": "echo", "args": ["top", "$(id)"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stdout"], "top id\n");
        assert_eq!(body["exitCode"], 0);
    }

    #[tokio::test]
    async fn mistyped_metadata_is_kept_verbatim() {
        let app = app();
        let mut body = profile_body("cpu.pb.gz", "cpu", b"abc");
        body["metadata"] = json!({"duration": 30, "samples": "1200", "buildId": "abc123"});
        let (status, created) = send(&app, Method::POST, "/api/profiles", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            created["metadata"],
            json!({"duration": 30, "samples": "1200", "buildId": "abc123"})
        );
    }

    #[tokio::test]
    async fn fetch_rejects_long_description_before_connecting() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/profiles/fetch",
            Some(json!({
                "url": "http://127.0.0.1:1",
                "profileType": "heap",
                "description": "x".repeat(5000),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("msg").contains("description"));
    }

    #[tokio::test]
    async fn fetch_stores_capture_from_remote_endpoint() {
        use axum::extract::Query;
        use std::collections::HashMap;

        let remote = Router::new()
            .route(
                "/debug/pprof/profile",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    format!("cpu:{}", q.get("seconds").cloned().unwrap_or_default())
                }),
            )
            .route("/debug/pprof/heap", get(|| async { "heap-bytes" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, remote).await;
        });

        let app = app();
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/connections",
            Some(json!({"name": "remote", "url": format!("http://{addr}")})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, cpu) = send(
            &app,
            Method::POST,
            "/api/profiles/fetch",
            Some(json!({"profileType": "cpu", "seconds": 1, "connectionId": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{cpu}");
        assert_eq!(cpu["profileType"], "cpu");
        assert_eq!(cpu["data"], STANDARD.encode(b"cpu:1"));
        assert_eq!(cpu["metadata"]["duration"], "1s");
        assert_eq!(
            cpu["metadata"]["sourceUrl"],
            format!("http://{addr}/debug/pprof/profile?seconds=1")
        );
        let original = cpu["originalFilename"].as_str().expect("name");
        assert!(original.starts_with("cpu-") && original.ends_with(".pb.gz"), "{original}");

        let (_, connection) = send(&app, Method::GET, "/api/connections/1", None).await;
        assert!(connection["lastConnected"].is_string());

        let (status, heap) = send(
            &app,
            Method::POST,
            "/api/profiles/fetch",
            Some(json!({
                "url": format!("http://{addr}/debug/pprof/heap"),
                "profileType": "heap",
                "description": "after deploy",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{heap}");
        assert_eq!(heap["data"], STANDARD.encode(b"heap-bytes"));
        assert_eq!(heap["description"], "after deploy");
        assert!(heap["metadata"].get("duration").is_none());
    }

    #[tokio::test]
    async fn upload_rejects_control_characters_in_filename() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/profiles/upload?filename=cpu%01.pb.gz&type=cpu")
                    .body(Body::from("abc"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn raw_download_replaces_unsafe_filename_characters() {
        let state = AppState::new(Config::default(), Store::in_memory());
        let app = router(state.clone());
        let draft = crate::ProfileDraft::from_bytes(
            "bad\u{7}\"name\r.pb.gz".to_string(),
            crate::ProfileType::Cpu,
            b"abc",
        );
        let profile = state.store.create_profile(draft);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/profiles/{}/raw", profile.id))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .expect("disposition");
        assert_eq!(disposition, "attachment; filename=\"bad__name_.pb.gz\"");
    }

    #[tokio::test]
    async fn oversized_bodies_are_413_json_errors() {
        let config = Config {
            max_upload_bytes: 16,
            ..Config::default()
        };
        let app = router(AppState::new(config, Store::in_memory()));
        let big = vec![0_u8; 200_000];

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/profiles/upload?filename=cpu.pb.gz")
                    .body(Body::from(big.clone()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert!(body["error"].as_str().expect("msg").starts_with("payload too large"));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/profiles",
            Some(profile_body("cpu.pb.gz", "cpu", &big)),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn stats_and_export_cover_stored_profiles() {
        let app = app();
        send(&app, Method::POST, "/api/profiles", Some(profile_body("cpu", "cpu", b"abc"))).await;
        let (_, stats) = send(&app, Method::GET, "/api/stats", None).await;
        assert_eq!(stats["profiles"], 1);
        assert_eq!(stats["totalBytes"], 3);
        assert_eq!(stats["byType"]["cpu"], 1);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/profiles/export")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/zip")
        );
    }
}
