//! SQLite database operations
//!
//! All database access goes through this module.
//! Schema lives in `migrations/` and is applied by the sqlx migrator.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM user WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM user WHERE email = ? COLLATE NOCASE")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    /// Find the user linked to a provider identity
    pub async fn get_user_by_account(
        &self,
        provider_id: &str,
        account_id: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user.* FROM user
            INNER JOIN account ON account.user_id = user.id
            WHERE account.provider_id = ? AND account.account_id = ?
            "#,
        )
        .bind(provider_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user (id, name, email, email_verified, image, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Refresh the provider-sourced profile fields
    pub async fn update_user_profile(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE user SET name = ?, email_verified = ?, image = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.name)
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn get_account(
        &self,
        provider_id: &str,
        account_id: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM account WHERE provider_id = ? AND account_id = ?",
        )
        .bind(provider_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Insert or refresh a provider link
    ///
    /// On conflict the stored token and scope are replaced; the owning
    /// user never changes.
    pub async fn upsert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO account (
                id, account_id, provider_id, user_id, access_token, scope, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (provider_id, account_id) DO UPDATE SET
                access_token = excluded.access_token,
                scope = excluded.scope,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.id)
        .bind(&account.account_id)
        .bind(&account.provider_id)
        .bind(&account.user_id)
        .bind(&account.access_token)
        .bind(&account.scope)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO session (
                id, token, user_id, expires_at, ip_address, user_agent, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.expires_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM session WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    /// Move a session's expiry forward
    pub async fn extend_session(
        &self,
        id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE session SET expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(expires_at)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a session by token
    ///
    /// # Returns
    /// `true` if a row was removed
    pub async fn delete_session_by_token(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM session WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every session that expired before `now`
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM session WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Verification (OAuth state)
    // =========================================================================

    pub async fn insert_verification(&self, verification: &Verification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO verification (id, identifier, value, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&verification.id)
        .bind(&verification.identifier)
        .bind(&verification.value)
        .bind(verification.expires_at)
        .bind(verification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch and delete a verification record in one step
    ///
    /// A state value can only be consumed once. Expired rows are still
    /// returned so the caller can tell "expired" from "unknown".
    pub async fn take_verification(
        &self,
        identifier: &str,
    ) -> Result<Option<Verification>, AppError> {
        let verification = sqlx::query_as::<_, Verification>(
            "DELETE FROM verification WHERE identifier = ? RETURNING *",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(verification)
    }

    pub async fn delete_expired_verifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM verification WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
