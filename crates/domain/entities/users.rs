use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::users;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = users)]
pub struct UserEntity {
    pub id: Uuid,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub trial_used: bool,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub current_subscription_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct InsertUserEntity {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Profile fields reported by the messaging platform on each interaction.
/// `None` means "not reported", never "clear the stored value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    pub fn differs_from(&self, user: &UserEntity) -> bool {
        fn changed(reported: &Option<String>, stored: &Option<String>) -> bool {
            reported.is_some() && reported != stored
        }

        changed(&self.username, &user.username)
            || changed(&self.first_name, &user.first_name)
            || changed(&self.last_name, &user.last_name)
    }
}
