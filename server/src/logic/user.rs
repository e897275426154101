use crate::error::ApiError;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use users_api_protocol::User;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn list_users(db: &Pool<Sqlite>) -> Result<Vec<User>, ApiError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, name, created_at, updated_at FROM users ORDER BY created_at, rowid",
    )
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

pub async fn create_user(
    db: &Pool<Sqlite>,
    email: &str,
    name: Option<&str>,
) -> Result<User, ApiError> {
    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO users (id, email, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(email)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(db)
    .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            return Err(ApiError::Conflict("Email already registered".to_string()));
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(user_id = %user_id, "Created user");

    Ok(User {
        id: user_id,
        email: email.to_string(),
        name: name.map(str::to_string),
        created_at: now,
        updated_at: now,
    })
}

pub async fn delete_user(db: &Pool<Sqlite>, user_id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %user_id, "Deleted user");
    Ok(())
}
