use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    entities::plans::PlanEntity, value_objects::enums::plan_kinds::PlanKind,
};

#[async_trait]
#[automock]
pub trait PlanRepository {
    async fn find_by_kind(&self, kind: PlanKind) -> Result<Option<PlanEntity>>;
    async fn list_plans(&self) -> Result<Vec<PlanEntity>>;
}
