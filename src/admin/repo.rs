use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{AdminPatch, AdminUser, NewAdmin, NewRole, Role, RolePatch};
use crate::{
    error::{AppError, AppResult},
    store::{AdminStore, PgStore},
};

const ROLE_COLUMNS: &str = "id, role_name, description, capabilities, created_at, updated_at";
const ADMIN_COLUMNS: &str = "id, username, password_hash, name, email, role_id, is_active, \
     last_login, failed_login_attempts, locked_until, password_changed_at, created_at";

#[async_trait]
impl AdminStore for PgStore {
    async fn count_admins(&self) -> AppResult<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }

    async fn insert_role(&self, new: NewRole) -> AppResult<Role> {
        let role = sqlx::query_as::<_, Role>(&format!(
            r#"
            INSERT INTO admin_roles (id, role_name, description, capabilities)
            VALUES ($1, $2, $3, $4)
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.role_name)
        .bind(&new.description)
        .bind(new.capabilities)
        .fetch_one(&self.db)
        .await?;
        Ok(role)
    }

    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM admin_roles ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(roles)
    }

    async fn get_role(&self, id: Uuid) -> AppResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM admin_roles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(role)
    }

    async fn update_role(&self, id: Uuid, patch: RolePatch) -> AppResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(&format!(
            r#"
            UPDATE admin_roles
               SET role_name    = COALESCE($2, role_name),
                   description  = COALESCE($3, description),
                   capabilities = COALESCE($4, capabilities),
                   updated_at   = NOW()
             WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.role_name)
        .bind(&patch.description)
        .bind(patch.capabilities)
        .fetch_optional(&self.db)
        .await?;
        Ok(role)
    }

    async fn delete_role(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;
        let assigned = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM admin_users WHERE role_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if assigned > 0 {
            return Err(AppError::Conflict("role is still assigned to admins".into()));
        }
        let res = sqlx::query("DELETE FROM admin_roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_admin(&self, new: NewAdmin) -> AppResult<AdminUser> {
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            r#"
            INSERT INTO admin_users (id, username, password_hash, name, email, role_id, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.role_id)
        .bind(new.is_active)
        .fetch_one(&self.db)
        .await?;
        Ok(admin)
    }

    async fn get_admin(&self, id: Uuid) -> AppResult<Option<AdminUser>> {
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(admin)
    }

    async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<AdminUser>> {
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(admin)
    }

    async fn list_admins(&self) -> AppResult<Vec<AdminUser>> {
        let admins = sqlx::query_as::<_, AdminUser>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(admins)
    }

    async fn update_admin(&self, id: Uuid, patch: AdminPatch) -> AppResult<Option<AdminUser>> {
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            r#"
            UPDATE admin_users
               SET name          = COALESCE($2, name),
                   email         = COALESCE($3, email),
                   role_id       = COALESCE($4, role_id),
                   is_active     = COALESCE($5, is_active),
                   password_hash = COALESCE($6, password_hash)
             WHERE id = $1
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.email)
        .bind(patch.role_id)
        .bind(patch.is_active)
        .bind(&patch.password_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(admin)
    }

    async fn touch_admin_login(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE admin_users
               SET last_login = NOW(), failed_login_attempts = 0, locked_until = NULL
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_failed_admin_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        locked_until: OffsetDateTime,
    ) -> AppResult<Option<AdminUser>> {
        // single statement, so concurrent failures cannot lose a count
        let admin = sqlx::query_as::<_, AdminUser>(&format!(
            r#"
            UPDATE admin_users
               SET failed_login_attempts = failed_login_attempts + 1,
                   locked_until = CASE
                       WHEN failed_login_attempts + 1 >= $2 THEN $3
                       ELSE locked_until
                   END
             WHERE id = $1
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(max_attempts)
        .bind(locked_until)
        .fetch_optional(&self.db)
        .await?;
        Ok(admin)
    }

    async fn clear_admin_lockout(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE admin_users SET failed_login_attempts = 0, locked_until = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_admin_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE admin_users SET password_hash = $2, password_changed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
