use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{NewUser, OpeningBalance, User, UserPatch, UserQuery};
use crate::{
    error::{AppError, AppResult},
    ledger::{repo::post_entries_tx, repo_types::CoinTransaction},
    store::{PgStore, UserStore},
};

const USER_COLUMNS: &str =
    "id, phone_number, name, email, coins, is_active, last_login, created_at, updated_at";

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, new: NewUser) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, phone_number, name, email)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.phone_number)
        .bind(&new.name)
        .bind(&new.email)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert_user_with_balance(
        &self,
        new: NewUser,
        opening: OpeningBalance,
    ) -> AppResult<(User, CoinTransaction)> {
        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, phone_number, name, email)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.phone_number)
        .bind(&new.name)
        .bind(&new.email)
        .fetch_one(&mut *tx)
        .await?;

        let posted = post_entries_tx(&mut tx, &[opening.entry_for(user.id)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("opening entry not posted")))?;
        tx.commit().await?;

        Ok((
            User {
                coins: posted.balance_after,
                ..user
            },
            posted,
        ))
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1 AND deleted_at IS NULL"
        ))
        .bind(phone_number)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL"
        ));
        if let Some(search) = &query.search {
            let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
            qb.push(" AND (phone_number ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET phone_number = COALESCE($2, phone_number),
                   name         = COALESCE($3, name),
                   email        = COALESCE($4, email),
                   updated_at   = NOW()
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.phone_number)
        .bind(&patch.name)
        .bind(&patch.email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn soft_delete_user(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn touch_user_login(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
