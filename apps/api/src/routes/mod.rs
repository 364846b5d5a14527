pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::scoring::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/evaluations", post(handlers::handle_evaluate_batch))
        .route(
            "/api/v1/evaluations/resume",
            post(handlers::handle_evaluate_resume),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, ScoringConfig};
    use crate::llm_client::retry::testing::ScriptedTransport;

    fn app(scoring: ScoringConfig) -> Router {
        build_router(AppState {
            config: Config {
                openai_base_url: "http://localhost".to_string(),
                scoring,
                port: 0,
                rust_log: "info".to_string(),
            },
            transport: Arc::new(ScriptedTransport::always(Ok("{}".to_string()))),
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(ScoringConfig::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_batch_endpoint_returns_batch_and_report() {
        let (status, body) = post_json(
            app(ScoringConfig::default()),
            "/api/v1/evaluations",
            json!({
                "job_description": "Backend engineer: python, sql, docker",
                "resumes": {"a.pdf": "python docker", "b.pdf": "sql"}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["batch"]["per_resume"]["a.pdf"]["status"], "evaluated");
        assert_eq!(
            body["batch"]["per_resume"]["a.pdf"]["scores"]["a.pdf"]["keywords_found"],
            2
        );
        assert!(body["report"]["recommendations"]
            .as_str()
            .unwrap()
            .starts_with("**a.pdf:**"));
    }

    #[tokio::test]
    async fn test_short_job_description_is_rejected() {
        let (status, body) = post_json(
            app(ScoringConfig::default()),
            "/api/v1/evaluations",
            json!({"job_description": "short", "resumes": {"a.pdf": "text"}}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_configuration_error_surfaces_once() {
        let scoring = ScoringConfig {
            fallback_enabled: false,
            ..ScoringConfig::default()
        };
        let (status, body) = post_json(
            app(scoring),
            "/api/v1/evaluations",
            json!({
                "job_description": "Backend engineer: python, sql, docker",
                "resumes": {"a.pdf": "python", "b.pdf": "sql"}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
    }

    #[tokio::test]
    async fn test_single_resume_endpoint_defaults_filename() {
        let (status, body) = post_json(
            app(ScoringConfig::default()),
            "/api/v1/evaluations/resume",
            json!({
                "job_description": "Backend engineer: python, sql, docker",
                "resume_text": "python"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scores"]["resume.pdf"]["total_keywords"], 5);
        assert_eq!(body["scorer_backend"], "fallback");
    }
}
