use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;

use crate::{
    domain::{
        entities::plans::{PlanEntity, PlanRow},
        repositories::plans::PlanRepository,
        value_objects::enums::plan_kinds::PlanKind,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscription_limits},
};

pub struct PlanPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PlanPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PlanRepository for PlanPostgres {
    async fn find_by_kind(&self, kind: PlanKind) -> Result<Option<PlanEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<PlanEntity>> {
            let mut conn = db_pool.get()?;

            let row = subscription_limits::table
                .find(kind.as_str())
                .select(PlanRow::as_select())
                .first::<PlanRow>(&mut conn)
                .optional()?;

            row.map(PlanEntity::try_from).transpose()
        })
        .await??)
    }

    async fn list_plans(&self) -> Result<Vec<PlanEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<PlanEntity>> {
            let mut conn = db_pool.get()?;

            let rows = subscription_limits::table
                .select(PlanRow::as_select())
                .order(subscription_limits::price_kopecks.asc())
                .load::<PlanRow>(&mut conn)?;

            rows.into_iter().map(PlanEntity::try_from).collect()
        })
        .await??)
    }
}
