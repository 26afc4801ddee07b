use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use jurist_core::{
    domain::repositories::{
        plans::PlanRepository, subscriptions::SubscriptionRepository, usage::UsageRepository,
        users::UserRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            plans::PlanPostgres, subscriptions::SubscriptionPostgres, usage::UsagePostgres,
            users::UserPostgres,
        },
    },
    llm::gigachat_client::GigaChatClient,
};
use serde::Deserialize;

use super::subscriptions::ProfilePayload;
use crate::{
    auth::BotUser,
    usecases::{
        consultations::ConsultationUseCase, gateways::ChatCompletion,
        subscription_ledger::SubscriptionLedger, usage_meter::UsageMeter,
    },
};

#[derive(Debug, Deserialize)]
pub struct ConsultationRequest {
    pub question: String,
    #[serde(flatten)]
    pub profile: ProfilePayload,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, gigachat: Arc<GigaChatClient>, system_prompt: String) -> Router {
    let ledger = Arc::new(SubscriptionLedger::new(
        Arc::new(UserPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
    ));
    let meter = Arc::new(UsageMeter::new(
        Arc::clone(&ledger),
        Arc::new(UsagePostgres::new(Arc::clone(&db_pool))),
    ));

    router(Arc::new(ConsultationUseCase::new(
        ledger,
        meter,
        gigachat,
        system_prompt,
    )))
}

pub fn router<U, S, P, R, C>(consultations: Arc<ConsultationUseCase<U, S, P, R, C>>) -> Router
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    Router::new()
        .route("/", post(consult))
        .with_state(consultations)
}

pub async fn consult<U, S, P, R, C>(
    State(consultations): State<Arc<ConsultationUseCase<U, S, P, R, C>>>,
    auth: BotUser,
    Json(request): Json<ConsultationRequest>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    match consultations
        .consult(auth.telegram_id, request.profile.into(), &request.question)
        .await
    {
        Ok(answer) => (StatusCode::OK, Json(answer)).into_response(),
        Err(err) => err.into_response(),
    }
}
