/// User model and database operations
///
/// Users own vacations, tasks, and stats. The tracker does not enforce
/// unique emails, but this system does: email is the natural key used to
/// detect whether an incoming user already exists locally.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     pm_name VARCHAR(255),
///     created_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

/// User model representing a task owner
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address, unique across all users
    pub email: String,

    /// Identifier in the external project-management tool
    pub pm_name: Option<String>,

    /// When the row was created locally
    pub created_on: DateTime<Utc>,

    /// When the row was last updated locally
    pub updated_on: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Email address (natural key)
    pub email: String,

    /// Optional external project-manager identifier
    pub pm_name: Option<String>,
}

const USER_COLUMNS: &str = "id, email, pm_name, created_on, updated_on";

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email already exists (unique constraint) or
    /// the database operation fails
    pub async fn create(conn: &mut PgConnection, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, pm_name)
            VALUES ($1, $2)
            RETURNING id, email, pm_name, created_on, updated_on
            "#,
        )
        .bind(data.email)
        .bind(data.pm_name)
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by email address
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds all users whose email appears in `emails`
    ///
    /// Used by the batch reconciler to match an incoming batch against
    /// existing rows in one round trip.
    pub async fn find_by_emails(
        conn: &mut PgConnection,
        emails: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ANY($1)"
        ))
        .bind(emails)
        .fetch_all(conn)
        .await?;

        Ok(users)
    }

    /// Overwrites the mutable fields of an existing user
    pub async fn overwrite(
        conn: &mut PgConnection,
        id: Uuid,
        data: &CreateUser,
    ) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET pm_name = $2,
                updated_on = NOW()
            WHERE id = $1
            RETURNING id, email, pm_name, created_on, updated_on
            "#,
        )
        .bind(id)
        .bind(&data.pm_name)
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    /// Lists all users
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY email"
        ))
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// Counts total number of users
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_struct() {
        let create = CreateUser {
            email: "dev@example.com".to_string(),
            pm_name: Some("dev.account".to_string()),
        };

        assert_eq!(create.email, "dev@example.com");
        assert_eq!(create.pm_name.as_deref(), Some("dev.account"));
    }

    // Query operations are exercised through the sync flows against a
    // running database.
}
