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
        repositories::{
            plans::PlanRepository, subscriptions::SubscriptionRepository, usage::UsageRepository,
            users::UserRepository,
        },
        value_objects::enums::action_kinds::ActionKind,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            plans::PlanPostgres, subscriptions::SubscriptionPostgres, usage::UsagePostgres,
            users::UserPostgres,
        },
    },
};
use serde::Deserialize;

use crate::{
    auth::BotUser,
    axum_http::error_responses::bad_request,
    usecases::{subscription_ledger::SubscriptionLedger, usage_meter::UsageMeter},
};

#[derive(Debug, Default, Deserialize)]
pub struct UsageRequest {
    #[serde(default)]
    pub details: serde_json::Value,
}

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let ledger = SubscriptionLedger::new(
        Arc::new(UserPostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PlanPostgres::new(Arc::clone(&db_pool))),
    );
    let meter = UsageMeter::new(
        Arc::new(ledger),
        Arc::new(UsagePostgres::new(Arc::clone(&db_pool))),
    );

    router(Arc::new(meter))
}

pub fn router<U, S, P, R>(meter: Arc<UsageMeter<U, S, P, R>>) -> Router
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/stats", get(usage_stats))
        .route("/:action", post(consume))
        .with_state(meter)
}

pub async fn usage_stats<U, S, P, R>(
    State(meter): State<Arc<UsageMeter<U, S, P, R>>>,
    auth: BotUser,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
{
    match meter.usage_stats(auth.telegram_id).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Checks the quota for `action` and records it when allowed.
pub async fn consume<U, S, P, R>(
    State(meter): State<Arc<UsageMeter<U, S, P, R>>>,
    auth: BotUser,
    Path(action): Path<String>,
    request: Option<Json<UsageRequest>>,
) -> Response
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
{
    let Some(action) = ActionKind::from_str(&action) else {
        return bad_request(format!("unknown action '{action}'"));
    };
    let details = request.map(|Json(request)| request.details).unwrap_or_default();

    match meter.consume(auth.telegram_id, action, details).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::BotApiKey, usecases::subscription_ledger::tests::sample_user};
    use axum::{Extension, body::Body, http::Request};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use jurist_core::domain::repositories::{
        plans::MockPlanRepository, subscriptions::MockSubscriptionRepository,
        usage::MockUsageRepository, users::MockUserRepository,
    };
    use tower::ServiceExt;

    const SECRET: &str = "usage-router-secret";

    fn app(users: MockUserRepository, subscriptions: MockSubscriptionRepository) -> Router {
        let ledger = SubscriptionLedger::new(
            Arc::new(users),
            Arc::new(subscriptions),
            Arc::new(MockPlanRepository::new()),
        );
        let meter = UsageMeter::new(Arc::new(ledger), Arc::new(MockUsageRepository::new()));
        router(Arc::new(meter)).layer(Extension(BotApiKey::new(SECRET)))
    }

    fn authorized(method: &str, uri: &str) -> Request<Body> {
        let token = encode(
            &Header::default(),
            &crate::auth::BotClaims {
                sub: "31337".to_string(),
                exp: 9999999999,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_action_is_400() {
        let response = app(MockUserRepository::new(), MockSubscriptionRepository::new())
            .oneshot(authorized("POST", "/translation"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn action_without_subscription_is_403() {
        let user = sample_user(31337, true);
        let mut users = MockUserRepository::new();
        users.expect_find_by_telegram_id().returning(move |_| {
            let user = user.clone();
            Box::pin(async move { Ok(Some(user)) })
        });
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_current_active()
            .returning(|_| Box::pin(async { Ok(None) }));

        let response = app(users, subscriptions)
            .oneshot(authorized("POST", "/document"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "no_active_subscription");
    }
}
