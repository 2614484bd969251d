use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{
    LoginAttempt, LoginAttemptQuery, LoginCounts, NewLoginAttempt, NewSecurityEvent,
    SecurityEvent, SecurityEventQuery, SecurityEventStats, SecurityEventType, Severity,
};
use crate::{
    error::AppResult,
    ledger::repo_types::StatsWindow,
    store::{PgStore, SecurityStore},
};

const LOGIN_COLUMNS: &str = "id, username, login_status, failure_reason, ip_address, created_at";
const EVENT_COLUMNS: &str =
    "id, event_type, severity, username, admin_id, ip_address, details, created_at";

#[derive(sqlx::FromRow)]
struct EventTotals {
    total_events: i64,
    events_today: i64,
    events_this_week: i64,
}

#[async_trait]
impl SecurityStore for PgStore {
    async fn insert_login_attempt(&self, new: NewLoginAttempt) -> AppResult<LoginAttempt> {
        let row = sqlx::query_as::<_, LoginAttempt>(&format!(
            r#"
            INSERT INTO login_history (id, username, login_status, failure_reason, ip_address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LOGIN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(new.login_status)
        .bind(&new.failure_reason)
        .bind(&new.ip_address)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_login_attempts(&self, query: &LoginAttemptQuery) -> AppResult<Vec<LoginAttempt>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {LOGIN_COLUMNS} FROM login_history WHERE TRUE"));
        if let Some(status) = query.status {
            qb.push(" AND login_status = ").push_bind(status);
        }
        if let Some(username) = &query.username {
            qb.push(" AND username = ").push_bind(username.clone());
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit);

        let rows = qb
            .build_query_as::<LoginAttempt>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn login_counts(&self, window: &StatsWindow) -> AppResult<LoginCounts> {
        let counts = sqlx::query_as::<_, LoginCounts>(
            r#"
            SELECT COUNT(*)                                          AS total_attempts,
                   COUNT(*) FILTER (WHERE created_at >= $1)          AS attempts_today,
                   COUNT(*) FILTER (WHERE created_at >= $2)          AS attempts_this_week,
                   COUNT(*) FILTER (WHERE login_status = 'success')  AS successful_logins,
                   COUNT(*) FILTER (WHERE login_status = 'failed')   AS failed_attempts,
                   COUNT(*) FILTER (WHERE login_status = 'blocked')  AS blocked_attempts
              FROM login_history
            "#,
        )
        .bind(window.today)
        .bind(window.week)
        .fetch_one(&self.db)
        .await?;
        Ok(counts)
    }

    async fn insert_security_event(&self, new: NewSecurityEvent) -> AppResult<SecurityEvent> {
        let row = sqlx::query_as::<_, SecurityEvent>(&format!(
            r#"
            INSERT INTO security_events
                (id, event_type, severity, username, admin_id, ip_address, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.event_type)
        .bind(new.event_type.severity())
        .bind(&new.username)
        .bind(new.admin_id)
        .bind(&new.ip_address)
        .bind(&new.details)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_security_events(
        &self,
        query: &SecurityEventQuery,
    ) -> AppResult<Vec<SecurityEvent>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM security_events WHERE TRUE"));
        if let Some(ty) = query.event_type {
            qb.push(" AND event_type = ").push_bind(ty);
        }
        if let Some(severity) = query.severity {
            qb.push(" AND severity = ").push_bind(severity);
        }
        if let Some(admin_id) = query.admin_id {
            qb.push(" AND admin_id = ").push_bind(admin_id);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(query.limit);

        let rows = qb
            .build_query_as::<SecurityEvent>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn security_event_stats(&self, window: &StatsWindow) -> AppResult<SecurityEventStats> {
        let totals = sqlx::query_as::<_, EventTotals>(
            r#"
            SELECT COUNT(*)                                 AS total_events,
                   COUNT(*) FILTER (WHERE created_at >= $1) AS events_today,
                   COUNT(*) FILTER (WHERE created_at >= $2) AS events_this_week
              FROM security_events
            "#,
        )
        .bind(window.today)
        .bind(window.week)
        .fetch_one(&self.db)
        .await?;

        let by_severity = sqlx::query_as::<_, (Severity, i64)>(
            "SELECT severity, COUNT(*) FROM security_events GROUP BY severity",
        )
        .fetch_all(&self.db)
        .await?;
        let by_type = sqlx::query_as::<_, (SecurityEventType, i64)>(
            "SELECT event_type, COUNT(*) FROM security_events GROUP BY event_type",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(SecurityEventStats {
            total_events: totals.total_events,
            events_today: totals.events_today,
            events_this_week: totals.events_this_week,
            by_severity: by_severity.into_iter().collect(),
            by_type: by_type.into_iter().collect(),
        })
    }
}
