pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API
        .route(
            "/api/v1/content/auto-generate",
            post(handlers::handle_auto_generate),
        )
        // Key pool operations
        .route(
            "/api/v1/keys/:service/health",
            get(handlers::handle_key_health),
        )
        .route(
            "/api/v1/keys/:service/reset",
            post(handlers::handle_key_reset),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::credentials::settings::test_support::MemorySettings;
    use crate::credentials::KeyPool;
    use crate::generation::executor::StepExecutor;
    use crate::generation::pipeline::{ArticlePipeline, SiteSettings};
    use crate::images::test_support::FakeImages;
    use crate::llm_client::test_support::ScriptedModel;
    use crate::research::{ResearchBundle, ResearchProvider};

    struct NoResearch;

    #[async_trait::async_trait]
    impl ResearchProvider for NoResearch {
        async fn research(&self, keyword: &str) -> ResearchBundle {
            ResearchBundle::fallback(keyword)
        }
    }

    fn app() -> Router {
        let settings = Arc::new(MemorySettings::with(&[(
            "GEMINI_API_KEYS",
            r#"["gemini-key-0000", "gemini-key-1111"]"#,
        )]));
        let keys = Arc::new(KeyPool::new(settings, Duration::from_secs(60)));
        let pipeline = ArticlePipeline::new(
            Arc::new(ScriptedModel::default()),
            Arc::new(NoResearch),
            Arc::new(FakeImages { fail_all: true }),
            StepExecutor::new(keys.clone()),
            SiteSettings {
                site_url: "https://example.com".into(),
                site_name: "Example".into(),
                step_pause: Duration::ZERO,
            },
        );
        build_router(AppState {
            keys,
            pipeline: Arc::new(pipeline),
        })
    }

    async fn body_json(body: Body) -> Value {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "autowriter-api");
    }

    #[tokio::test]
    async fn test_key_health_snapshot() {
        let response = app()
            .oneshot(
                Request::get("/api/v1/keys/llm/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.into_body()).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["healthy"], 2);
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let response = app()
            .oneshot(
                Request::post("/api/v1/keys/openai/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_auto_generate_streams_single_error_for_missing_fields() {
        let response = app()
            .oneshot(
                Request::post("/api/v1/content/auto-generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"keyword": "notion ai"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            text,
            "{\"type\":\"error\",\"error\":\"Missing required fields\"}\n"
        );
    }

    #[tokio::test]
    async fn test_auto_generate_streams_error_for_malformed_body() {
        let response = app()
            .oneshot(
                Request::post("/api/v1/content/auto-generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"keyword": "notion ai""#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);

        let event: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(event["type"], "error");
        assert!(!event["error"].as_str().unwrap().is_empty());
    }
}
