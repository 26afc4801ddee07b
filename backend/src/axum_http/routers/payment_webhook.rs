use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use jurist_core::{
    domain::{
        repositories::{
            notifications::NoticePublisher, payments::PaymentRepository, plans::PlanRepository,
            users::UserRepository,
        },
        value_objects::payment_webhook::PaymentWebhookNotification,
    },
    infra::{
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::{payments::PaymentPostgres, plans::PlanPostgres, users::UserPostgres},
        },
        telegram::notice_queue::NoticeQueue,
    },
    payments::yookassa_client::YooKassaClient,
};
use serde_json::json;
use tracing::warn;

use crate::{
    axum_http::error_responses::bad_request,
    usecases::{gateways::PaymentGateway, payment_reconciler::PaymentReconciler},
};

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    yookassa: Arc<YooKassaClient>,
    notices: Arc<NoticeQueue>,
    verify_with_provider: bool,
) -> Router {
    let reconciler = PaymentReconciler::new(
        Arc::new(UserPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PaymentPostgres::new(Arc::clone(&db_pool))),
        yookassa,
        notices,
        verify_with_provider,
    );

    router(Arc::new(reconciler))
}

pub fn router<U, P, Pay, G, N>(reconciler: Arc<PaymentReconciler<U, P, Pay, G, N>>) -> Router
where
    U: UserRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    Router::new()
        .route("/yookassa", post(payment_notification))
        .route("/ai-lawyer", post(payment_notification))
        .with_state(reconciler)
}

/// The body is parsed here rather than through `Json` so that a malformed
/// notification gets the same error envelope as any other validation failure.
pub async fn payment_notification<U, P, Pay, G, N>(
    State(reconciler): State<Arc<PaymentReconciler<U, P, Pay, G, N>>>,
    body: Bytes,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    let notification: PaymentWebhookNotification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(err) => {
            warn!(error = %err, body_len = body.len(), "webhook: malformed notification body");
            return bad_request("malformed notification body");
        }
    };

    match reconciler.handle_payment_event(notification).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "success" }))).into_response(),
        Err(err) => err.into_response(),
    }
}
