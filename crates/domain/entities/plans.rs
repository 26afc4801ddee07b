use diesel::prelude::*;

use crate::{
    domain::value_objects::{
        enums::plan_kinds::PlanKind,
        plans::{PlanDto, PlanQuotas, Quota},
    },
    infra::db::postgres::schema::subscription_limits,
};

/// Raw row of the static plan table.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscription_limits)]
#[diesel(primary_key(subscription_type))]
pub struct PlanRow {
    pub subscription_type: String,
    pub title: String,
    pub consultations_limit: i32,
    pub documents_limit: i32,
    pub analysis_limit: i32,
    pub price_kopecks: i32,
    pub duration_days: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntity {
    pub kind: PlanKind,
    pub title: String,
    pub quotas: PlanQuotas,
    pub price_kopecks: i32,
    pub duration_days: i32,
}

impl TryFrom<PlanRow> for PlanEntity {
    type Error = anyhow::Error;

    fn try_from(value: PlanRow) -> Result<Self, Self::Error> {
        let kind = PlanKind::from_str(&value.subscription_type).ok_or_else(|| {
            anyhow::anyhow!("unknown plan kind in subscription_limits: {}", value.subscription_type)
        })?;

        Ok(Self {
            kind,
            title: value.title,
            quotas: PlanQuotas {
                consultations: Quota::from_raw(value.consultations_limit),
                documents: Quota::from_raw(value.documents_limit),
                analyses: Quota::from_raw(value.analysis_limit),
            },
            price_kopecks: value.price_kopecks,
            duration_days: value.duration_days,
        })
    }
}

impl From<PlanEntity> for PlanDto {
    fn from(value: PlanEntity) -> Self {
        Self {
            kind: value.kind,
            title: value.title,
            price_kopecks: value.price_kopecks,
            duration_days: value.duration_days,
            quotas: value.quotas,
        }
    }
}
