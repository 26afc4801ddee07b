use std::sync::Arc;

use jurist_core::domain::{
    entities::users::UserProfile,
    repositories::{
        plans::PlanRepository, subscriptions::SubscriptionRepository, usage::UsageRepository,
        users::UserRepository,
    },
    value_objects::enums::action_kinds::ActionKind,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    errors::{BillingError, UseCaseResult},
    gateways::ChatCompletion,
    subscription_ledger::SubscriptionLedger,
    usage_meter::UsageMeter,
};

pub const MAX_QUESTION_CHARS: usize = 4000;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsultationAnswer {
    pub answer: String,
    pub usage_event_id: Uuid,
}

pub struct ConsultationUseCase<U, S, P, R, C>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    ledger: Arc<SubscriptionLedger<U, S, P>>,
    meter: Arc<UsageMeter<U, S, P, R>>,
    llm: Arc<C>,
    system_prompt: String,
}

impl<U, S, P, R, C> ConsultationUseCase<U, S, P, R, C>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
    C: ChatCompletion + Send + Sync + 'static,
{
    pub fn new(
        ledger: Arc<SubscriptionLedger<U, S, P>>,
        meter: Arc<UsageMeter<U, S, P, R>>,
        llm: Arc<C>,
        system_prompt: String,
    ) -> Self {
        Self {
            ledger,
            meter,
            llm,
            system_prompt,
        }
    }

    /// Quota gate, then the model call, then the usage record. A failed model
    /// call is not counted against the quota.
    pub async fn consult(
        &self,
        telegram_id: i64,
        profile: UserProfile,
        question: &str,
    ) -> UseCaseResult<ConsultationAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(BillingError::Validation("question is empty".to_string()));
        }
        let question_chars = question.chars().count();
        if question_chars > MAX_QUESTION_CHARS {
            return Err(BillingError::Validation(format!(
                "question is longer than {MAX_QUESTION_CHARS} characters"
            )));
        }

        let user = self.ledger.user_for(telegram_id, profile).await?;
        self.meter
            .ensure_allowed(user.id, ActionKind::Consultation)
            .await?;

        let answer = self
            .llm
            .complete(self.system_prompt.clone(), question.to_string())
            .await
            .map_err(|err| {
                error!(%telegram_id, error = ?err, "consultations: model call failed");
                BillingError::TransientInfra(err)
            })?;

        let answer_chars = answer.chars().count();
        let usage_event_id = self
            .meter
            .record_usage(
                user.id,
                ActionKind::Consultation,
                json!({ "question_chars": question_chars, "answer_chars": answer_chars }),
            )
            .await?;

        info!(
            %telegram_id,
            question_chars,
            answer_chars,
            "consultations: answered"
        );
        Ok(ConsultationAnswer {
            answer,
            usage_event_id,
        })
    }
}
