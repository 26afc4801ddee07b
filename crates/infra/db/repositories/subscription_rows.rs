//! Row-level helpers shared by the transactional repositories. All of them
//! expect to run inside an open transaction.

use chrono::{DateTime, Utc};
use diesel::{PgConnection, QueryResult, RunQueryDsl, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::subscription_statuses::SubscriptionStatus,
    infra::db::postgres::schema::{subscriptions, users},
};

/// Takes the per-user lock that serializes every subscription mutation.
/// Lock order is payment row, then user, then subscription rows.
pub(crate) fn lock_user(tx: &mut PgConnection, user_id: Uuid) -> QueryResult<Uuid> {
    users::table
        .find(user_id)
        .select(users::id)
        .for_update()
        .first::<Uuid>(tx)
}

/// Closes whatever `active` rows the user still has so a new one can take
/// their place. Overdue rows become `expired`, live ones `cancelled`.
/// Returns the ids of the cancelled rows.
pub(crate) fn supersede_active(
    tx: &mut PgConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<Vec<Uuid>> {
    update(subscriptions::table)
        .filter(subscriptions::user_id.eq(user_id))
        .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
        .filter(subscriptions::expires_at.le(now))
        .set((
            subscriptions::status.eq(SubscriptionStatus::Expired.as_str()),
            subscriptions::updated_at.eq(now),
        ))
        .execute(tx)?;

    update(subscriptions::table)
        .filter(subscriptions::user_id.eq(user_id))
        .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
        .set((
            subscriptions::status.eq(SubscriptionStatus::Cancelled.as_str()),
            subscriptions::cancelled_at.eq(Some(now)),
            subscriptions::auto_renewal.eq(false),
            subscriptions::updated_at.eq(now),
        ))
        .returning(subscriptions::id)
        .get_results::<Uuid>(tx)
}

/// Start of a renewal's window: the end of the user's live subscription of
/// the same plan, or `now` when there is none left to extend.
pub(crate) fn renewal_base(
    tx: &mut PgConnection,
    user_id: Uuid,
    plan_kind: &str,
    now: DateTime<Utc>,
) -> QueryResult<DateTime<Utc>> {
    let current = subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
        .filter(subscriptions::plan_kind.eq(plan_kind))
        .filter(subscriptions::expires_at.gt(now))
        .order(subscriptions::expires_at.desc())
        .select(subscriptions::expires_at)
        .first::<DateTime<Utc>>(tx)
        .optional()?;

    Ok(current.unwrap_or(now))
}

pub(crate) fn point_user_at(
    tx: &mut PgConnection,
    user_id: Uuid,
    subscription_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    update(users::table.find(user_id))
        .set((
            users::current_subscription_id.eq(subscription_id),
            users::updated_at.eq(now),
        ))
        .execute(tx)
}

/// Clears `current_subscription_id` on whichever user still points at the row.
pub(crate) fn detach_from_users(
    tx: &mut PgConnection,
    subscription_id: Uuid,
    now: DateTime<Utc>,
) -> QueryResult<usize> {
    update(users::table.filter(users::current_subscription_id.eq(subscription_id)))
        .set((
            users::current_subscription_id.eq(None::<Uuid>),
            users::updated_at.eq(now),
        ))
        .execute(tx)
}
