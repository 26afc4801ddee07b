use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use tracing::debug;

use crate::usecases::health::HealthUseCase;

pub fn routes(health_usecase: Arc<HealthUseCase>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(health_usecase)
}

/// Always 200; a failing dependency shows up as `degraded` in the body.
pub async fn health(State(health_usecase): State<Arc<HealthUseCase>>) -> impl IntoResponse {
    let report = health_usecase.report().await;
    debug!(status = ?report.status, "health: report served");
    Json(report)
}

pub async fn status(State(health_usecase): State<Arc<HealthUseCase>>) -> impl IntoResponse {
    Json(health_usecase.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::health::{HealthCheck, MockHealthCheck};
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    #[tokio::test]
    async fn degraded_dependency_still_answers_200() {
        let mut check = MockHealthCheck::new();
        check.expect_name().return_const("database");
        check
            .expect_check()
            .returning(|| Box::pin(async { Err(anyhow::anyhow!("connection refused")) }));
        let checks: Vec<Arc<dyn HealthCheck>> = vec![Arc::new(check)];

        let app = routes(Arc::new(HealthUseCase::new(
            checks,
            "jurist-billing".to_string(),
            "0.1.0".to_string(),
        )));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["checks"]["database"]["status"], "error");
        assert_eq!(body["service"], "jurist-billing");
    }
}
