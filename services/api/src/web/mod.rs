pub mod auth;
pub mod intervals;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod statistics;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::require_auth;
pub use state::AppState;

/// Upper bound on request bodies; a day of intervals fits comfortably.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the API router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-csrftoken"),
        ]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/login/", post(auth::login_handler))
        .route("/api/users/", post(auth::signup_handler))
        .route("/api/csrf/", get(auth::csrf_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/api/create_intervals/",
            post(intervals::create_intervals_handler),
        )
        .route("/api/intervals/", get(intervals::list_intervals_handler))
        .route("/api/intervals/{id}/", get(intervals::get_interval_handler))
        .route("/api/statistics/", get(statistics::statistics_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tab_tracker_core::ports::DatabaseService;
    use tower::ServiceExt;

    use crate::adapters::memory::MemoryAdapter;
    use crate::config::Config;

    struct TestApp {
        router: Router,
        store: MemoryAdapter,
        token: String,
    }

    /// App over a fresh in-memory store with one logged-in user.
    async fn app() -> TestApp {
        let store = MemoryAdapter::new();
        let user = store.create_user("alice@example.com", "unused").await.unwrap();
        let token = store.get_or_create_token(user.id).await.unwrap().key;
        let state = Arc::new(AppState {
            db: Arc::new(store.clone()),
            config: Arc::new(Config::for_tests()),
        });
        TestApp {
            router: router(state),
            store,
            token,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }

        async fn post_raw(&self, path: &str, body: &str) -> (StatusCode, Value) {
            let request = Request::post(path)
                .header(header::AUTHORIZATION, format!("Token {}", self.token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }

        async fn ingest(&self, intervals: Value) -> (StatusCode, Value) {
            self.post_raw(
                "/api/create_intervals/",
                &json!({ "intervals": intervals }).to_string(),
            )
            .await
        }

        async fn get(&self, path: &str) -> (StatusCode, Value) {
            let request = Request::get(path)
                .header(header::AUTHORIZATION, format!("Token {}", self.token))
                .body(Body::empty())
                .unwrap();
            self.send(request).await
        }
    }

    fn interval(url: &str, start: i64, end: i64) -> Value {
        json!({ "startTime": start, "endTime": end, "date": "2025-01-01", "url": url })
    }

    #[tokio::test]
    async fn ingest_creates_interval_and_statistics() {
        let app = app().await;

        let (status, body) = app.ingest(json!([interval("https://example.com", 100, 200)])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "success", "processed": 1, "duplicates": 0 }));

        let (status, stats) = app
            .get("/api/statistics/?period_date_start=2025-01-01&period_date_end=2025-01-01")
            .await;
        assert_eq!(status, StatusCode::OK);
        let rows = stats.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["url"], "example.com");
        assert_eq!(rows[0]["session_count"], 1);
        assert_eq!(rows[0]["time_count"], 100);
        assert_eq!(rows[0]["time_spent"], "00:00");
        assert_eq!(rows[0]["intervals"].as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["intervals"][0]["url"], "https://example.com");
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let app = app().await;
        let (status, body) = app.post_raw("/api/create_intervals/", "invalid json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn missing_field_is_named() {
        let app = app().await;
        let (status, body) = app
            .ingest(json!([{ "endTime": 200, "date": "2025-01-01", "url": "https://a.com" }]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Missing field"));
        assert_eq!(app.store.interval_count().await, 0);
    }

    #[tokio::test]
    async fn reversed_interval_rejects_the_whole_batch() {
        let app = app().await;
        let (status, _) = app
            .ingest(json!([
                interval("https://ok.com", 100, 200),
                interval("https://example.com", 200, 100),
            ]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.interval_count().await, 0);
    }

    #[tokio::test]
    async fn times_beyond_32_bits_are_rejected() {
        let app = app().await;
        let (status, body) = app
            .ingest(json!([
                interval("https://example.com/a", 0, 2_147_483_647),
                interval("https://example.com/b", 0, i64::MAX),
            ]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("endTime"));
        assert_eq!(app.store.interval_count().await, 0);

        let (status, _) = app
            .ingest(json!([
                interval("https://example.com/a", 0, 2_147_483_647),
                interval("https://example.com/b", 0, 2_147_483_647),
            ]))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, stats) = app
            .get("/api/statistics/?period_date_start=2025-01-01&period_date_end=2025-01-01")
            .await;
        assert_eq!(stats[0]["time_count"], 4_294_967_294_i64);
    }

    #[tokio::test]
    async fn long_url_is_truncated_and_long_favicon_dropped() {
        let app = app().await;
        let long_url = format!("https://example.com/{}", "a".repeat(600));
        let long_favicon = format!("https://example.com/{}.ico", "f".repeat(600));
        let (status, _) = app
            .ingest(json!([{
                "startTime": 100,
                "endTime": 200,
                "date": "2025-01-01",
                "url": long_url,
                "faviconUrl": long_favicon,
            }]))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, list) = app.get("/api/intervals/").await;
        assert_eq!(list["count"], 1);
        assert_eq!(list["results"][0]["url"], "https://example.com");
        assert_eq!(list["results"][0]["favicon_url"], Value::Null);
    }

    #[tokio::test]
    async fn resubmitted_batch_counts_duplicates() {
        let app = app().await;
        let batch = json!([interval("https://example.com", 100, 200)]);
        app.ingest(batch.clone()).await;

        let (status, body) = app.ingest(batch).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 1);
        assert_eq!(body["duplicates"], 1);
        assert_eq!(app.store.interval_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_within_a_batch_is_stored_once() {
        let app = app().await;
        let (_, body) = app
            .ingest(json!([
                interval("https://example.com", 100, 200),
                interval("https://example.com", 100, 200),
            ]))
            .await;
        assert_eq!(body["processed"], 2);
        assert_eq!(body["duplicates"], 1);
        assert_eq!(app.store.interval_count().await, 1);
    }

    #[tokio::test]
    async fn separate_ingests_accumulate_statistics() {
        let app = app().await;
        app.ingest(json!([interval("https://example.com/a", 0, 1_000)])).await;
        app.ingest(json!([interval("https://example.com/b", 2_000, 4_000)])).await;

        let (_, stats) = app
            .get("/api/statistics/?period_date_start=2025-01-01&period_date_end=2025-01-31")
            .await;
        assert_eq!(stats[0]["url"], "example.com");
        assert_eq!(stats[0]["session_count"], 2);
        assert_eq!(stats[0]["time_count"], 3_000);
        assert_eq!(stats[0]["intervals"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn statistics_rejects_reversed_range() {
        let app = app().await;
        let (status, _) = app
            .get("/api/statistics/?period_date_start=2025-01-02&period_date_end=2025-01-01")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn statistics_reports_empty_period() {
        let app = app().await;
        let (status, body) = app
            .get("/api/statistics/?period_date_start=2025-01-01&period_date_end=2025-01-01")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": statistics::NO_DATA_MESSAGE }));
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = app().await;
        let request = Request::get("/api/intervals/").body(Body::empty()).unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication credentials were not provided.");

        let request = Request::get("/api/intervals/")
            .header(header::AUTHORIZATION, "Token nope")
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token.");
    }

    #[tokio::test]
    async fn interval_detail_is_scoped_to_owner() {
        let app = app().await;
        app.ingest(json!([interval("https://example.com", 100, 200)])).await;
        let (_, list) = app.get("/api/intervals/").await;
        let id = list["results"][0]["id"].as_i64().unwrap();

        let (status, body) = app.get(&format!("/api/intervals/{}/", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["start_time"], 100);

        let (status, _) = app.get(&format!("/api/intervals/{}/", id + 1000)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_past_the_last_page_is_not_found() {
        let app = app().await;
        app.ingest(json!([interval("https://example.com", 100, 200)])).await;
        let (status, body) = app.get("/api/intervals/?page=5").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid page.");
    }

    #[tokio::test]
    async fn signup_then_login_returns_a_stable_token() {
        let app = app().await;
        let credentials = json!({ "username": "bob@example.com", "password": "hunter2" });
        let post = |path: &'static str, body: String| {
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let (status, user) = app.send(post("/api/users/", credentials.to_string())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["username"], "bob@example.com");

        let (status, _) = app.send(post("/api/users/", credentials.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, first) = app.send(post("/api/login/", credentials.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = app.send(post("/api/login/", credentials.to_string())).await;
        assert_eq!(first["token"], second["token"]);

        let wrong = json!({ "username": "bob@example.com", "password": "nope" });
        let (status, body) = app.send(post("/api/login/", wrong.to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, body) = app.send(post("/api/login/", json!({}).to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username and password required");
    }

    #[tokio::test]
    async fn csrf_sets_cookie_and_reuses_valid_token() {
        let app = app().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/api/csrf/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("csrftoken="));
        assert!(cookie.contains("SameSite=Lax"));

        let existing = "a".repeat(32);
        let request = Request::get("/api/csrf/")
            .header(header::COOKIE, format!("csrftoken={}", existing))
            .body(Body::empty())
            .unwrap();
        let (_, body) = app.send(request).await;
        assert_eq!(body["csrfToken"], existing);
    }
}
