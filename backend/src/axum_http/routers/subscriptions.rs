use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jurist_core::{
    domain::{
        entities::users::UserProfile,
        repositories::{
            notifications::NoticePublisher, payments::PaymentRepository, plans::PlanRepository,
            subscriptions::SubscriptionRepository, users::UserRepository,
        },
    },
    infra::{
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::{
                payments::PaymentPostgres, plans::PlanPostgres,
                subscriptions::SubscriptionPostgres, users::UserPostgres,
            },
        },
        telegram::notice_queue::NoticeQueue,
    },
    payments::yookassa_client::YooKassaClient,
};
use serde::Deserialize;

use crate::{
    auth::BotUser,
    usecases::{
        checkout::CheckoutUseCase, gateways::PaymentGateway,
        payment_reconciler::PaymentReconciler, subscription_ledger::SubscriptionLedger,
    },
};

/// Profile fields the bot forwards from the Telegram update, if it has them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePayload {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<ProfilePayload> for UserProfile {
    fn from(value: ProfilePayload) -> Self {
        Self {
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_kind: String,
    /// Extend the live subscription of the same plan instead of replacing it.
    #[serde(default)]
    pub renewal: bool,
    #[serde(flatten)]
    pub profile: ProfilePayload,
}

pub struct SubscriptionsState<U, S, P, Pay, G, N>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    pub ledger: Arc<SubscriptionLedger<U, S, P>>,
    pub checkout: Arc<CheckoutUseCase<U, S, P, Pay, G>>,
    pub reconciler: Arc<PaymentReconciler<U, P, Pay, G, N>>,
}

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    yookassa: Arc<YooKassaClient>,
    notices: Arc<NoticeQueue>,
    verify_with_provider: bool,
) -> Router {
    let user_repository = Arc::new(UserPostgres::new(Arc::clone(&db_pool)));
    let plan_repository = Arc::new(PlanPostgres::new(Arc::clone(&db_pool)));
    let payment_repository = Arc::new(PaymentPostgres::new(Arc::clone(&db_pool)));

    let ledger = Arc::new(SubscriptionLedger::new(
        Arc::clone(&user_repository),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::clone(&plan_repository),
    ));
    let checkout = CheckoutUseCase::new(
        Arc::clone(&ledger),
        Arc::clone(&payment_repository),
        Arc::clone(&yookassa),
    );
    let reconciler = PaymentReconciler::new(
        user_repository,
        plan_repository,
        payment_repository,
        yookassa,
        notices,
        verify_with_provider,
    );

    router(Arc::new(SubscriptionsState {
        ledger,
        checkout: Arc::new(checkout),
        reconciler: Arc::new(reconciler),
    }))
}

pub fn router<U, S, P, Pay, G, N>(state: Arc<SubscriptionsState<U, S, P, Pay, G, N>>) -> Router
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    Router::new()
        .route("/plans", get(list_plans))
        .route("/current", get(current_subscription))
        .route("/trial", post(start_trial))
        .route("/checkout", post(create_checkout))
        .route("/checkout/:payment_id/sync", post(sync_payment))
        .route("/cancel", post(cancel_subscription))
        .with_state(state)
}

pub async fn list_plans<U, S, P, Pay, G, N>(
    State(state): State<Arc<SubscriptionsState<U, S, P, Pay, G, N>>>,
    _auth: BotUser,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    match state.ledger.list_plans().await {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn current_subscription<U, S, P, Pay, G, N>(
    State(state): State<Arc<SubscriptionsState<U, S, P, Pay, G, N>>>,
    auth: BotUser,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    match state.ledger.subscription_status(auth.telegram_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn start_trial<U, S, P, Pay, G, N>(
    State(state): State<Arc<SubscriptionsState<U, S, P, Pay, G, N>>>,
    auth: BotUser,
    profile: Option<Json<ProfilePayload>>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    let profile = profile.map(|Json(profile)| profile).unwrap_or_default();
    match state.ledger.start_trial(auth.telegram_id, profile.into()).await {
        Ok(subscription) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "subscription_id": subscription.id,
                "plan_kind": subscription.plan_kind,
                "started_at": subscription.started_at,
                "expires_at": subscription.expires_at,
            })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn create_checkout<U, S, P, Pay, G, N>(
    State(state): State<Arc<SubscriptionsState<U, S, P, Pay, G, N>>>,
    auth: BotUser,
    Json(request): Json<CheckoutRequest>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    match state
        .checkout
        .create_checkout(
            auth.telegram_id,
            request.profile.into(),
            &request.plan_kind,
            request.renewal,
        )
        .await
    {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Pull-based fallback for a checkout whose notification has not arrived.
pub async fn sync_payment<U, S, P, Pay, G, N>(
    State(state): State<Arc<SubscriptionsState<U, S, P, Pay, G, N>>>,
    auth: BotUser,
    Path(payment_id): Path<String>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    match state
        .reconciler
        .sync_payment(auth.telegram_id, &payment_id)
        .await
    {
        Ok(synced) => (StatusCode::OK, Json(synced)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn cancel_subscription<U, S, P, Pay, G, N>(
    State(state): State<Arc<SubscriptionsState<U, S, P, Pay, G, N>>>,
    auth: BotUser,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    match state.ledger.cancel_active(auth.telegram_id).await {
        Ok(subscription) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "subscription_id": subscription.id,
                "status": subscription.status,
                "cancelled_at": subscription.cancelled_at,
            })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
