use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::users::{InsertUserEntity, UserEntity, UserProfile},
        repositories::users::UserRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::users},
};

pub struct UserPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepository for UserPostgres {
    async fn get_or_create(&self, telegram_id: i64, profile: UserProfile) -> Result<UserEntity> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<UserEntity> {
            let mut conn = db_pool.get()?;

            let user = conn.transaction::<UserEntity, diesel::result::Error, _>(|tx| {
                insert_into(users::table)
                    .values(&InsertUserEntity {
                        telegram_id,
                        username: profile.username.clone(),
                        first_name: profile.first_name.clone(),
                        last_name: profile.last_name.clone(),
                    })
                    .on_conflict(users::telegram_id)
                    .do_nothing()
                    .execute(tx)?;

                let user = users::table
                    .filter(users::telegram_id.eq(telegram_id))
                    .select(UserEntity::as_select())
                    .first::<UserEntity>(tx)?;

                if !profile.differs_from(&user) {
                    return Ok(user);
                }

                update(users::table.find(user.id))
                    .set((
                        users::username.eq(profile.username.or(user.username)),
                        users::first_name.eq(profile.first_name.or(user.first_name)),
                        users::last_name.eq(profile.last_name.or(user.last_name)),
                        users::updated_at.eq(Utc::now()),
                    ))
                    .returning(UserEntity::as_returning())
                    .get_result::<UserEntity>(tx)
            })?;

            Ok(user)
        })
        .await??)
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<UserEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<UserEntity>> {
            let mut conn = db_pool.get()?;

            let user = users::table
                .filter(users::telegram_id.eq(telegram_id))
                .select(UserEntity::as_select())
                .first::<UserEntity>(&mut conn)
                .optional()?;

            Ok(user)
        })
        .await??)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<UserEntity>> {
            let mut conn = db_pool.get()?;

            let user = users::table
                .find(user_id)
                .select(UserEntity::as_select())
                .first::<UserEntity>(&mut conn)
                .optional()?;

            Ok(user)
        })
        .await??)
    }
}
