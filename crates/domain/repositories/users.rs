use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::users::{UserEntity, UserProfile};

#[async_trait]
#[automock]
pub trait UserRepository {
    /// Upserts by telegram id and refreshes profile fields that changed.
    async fn get_or_create(&self, telegram_id: i64, profile: UserProfile) -> Result<UserEntity>;

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<UserEntity>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>>;
}
