use crate::error::DashboardError;
use crate::types::CustomCourseName;
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;

pub const MAX_NAME_CHARS: usize = 120;

pub async fn get_all(pool: &SqlitePool, user_id: &str) -> Result<Vec<CustomCourseName>, DashboardError> {
    let rows = sqlx::query_as::<_, CustomCourseName>(
        "SELECT course_id, custom_name, updated_at FROM custom_course_names
         WHERE user_id = ? ORDER BY course_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Course id → custom name, ready for overlaying.
pub async fn name_map(pool: &SqlitePool, user_id: &str) -> Result<HashMap<i64, String>, DashboardError> {
    Ok(get_all(pool, user_id)
        .await?
        .into_iter()
        .map(|row| (row.course_id, row.custom_name))
        .collect())
}

pub async fn get(
    pool: &SqlitePool,
    user_id: &str,
    course_id: i64,
) -> Result<Option<CustomCourseName>, DashboardError> {
    let row = sqlx::query_as::<_, CustomCourseName>(
        "SELECT course_id, custom_name, updated_at FROM custom_course_names
         WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Insert or replace the name for one course. Surrounding whitespace is dropped.
pub async fn save(
    pool: &SqlitePool,
    user_id: &str,
    course_id: i64,
    custom_name: &str,
) -> Result<CustomCourseName, DashboardError> {
    let name = custom_name.trim();
    if name.is_empty() {
        return Err(DashboardError::Validation("course name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(DashboardError::Validation(format!(
            "course name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    let updated_at = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO custom_course_names (user_id, course_id, custom_name, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(user_id, course_id) DO UPDATE
         SET custom_name = excluded.custom_name, updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(name)
    .bind(&updated_at)
    .execute(pool)
    .await?;

    Ok(CustomCourseName {
        course_id,
        custom_name: name.to_string(),
        updated_at,
    })
}

/// Returns whether a name existed.
pub async fn delete(pool: &SqlitePool, user_id: &str, course_id: i64) -> Result<bool, DashboardError> {
    let result = sqlx::query("DELETE FROM custom_course_names WHERE user_id = ? AND course_id = ?")
        .bind(user_id)
        .bind(course_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_memory_database;

    #[tokio::test]
    async fn test_save_then_get() {
        let pool = init_memory_database().await.unwrap();
        let saved = save(&pool, "u1", 101, "  Intro CS ").await.unwrap();
        assert_eq!(saved.custom_name, "Intro CS");

        let row = get(&pool, "u1", 101).await.unwrap().unwrap();
        assert_eq!(row, saved);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing() {
        let pool = init_memory_database().await.unwrap();
        save(&pool, "u1", 101, "First").await.unwrap();
        save(&pool, "u1", 101, "Second").await.unwrap();
        let all = get_all(&pool, "u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].custom_name, "Second");
    }

    #[tokio::test]
    async fn test_names_are_per_user() {
        let pool = init_memory_database().await.unwrap();
        save(&pool, "u1", 101, "Mine").await.unwrap();
        save(&pool, "u2", 101, "Theirs").await.unwrap();
        save(&pool, "u1", 102, "Also mine").await.unwrap();

        let names = name_map(&pool, "u1").await.unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[&101], "Mine");
        assert!(get(&pool, "u3", 101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let pool = init_memory_database().await.unwrap();
        let err = save(&pool, "u1", 101, "   ").await.unwrap_err();
        assert!(matches!(err, DashboardError::Validation(_)));
        assert!(get_all(&pool, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_name_rejected() {
        let pool = init_memory_database().await.unwrap();
        let long = "n".repeat(MAX_NAME_CHARS + 1);
        assert!(save(&pool, "u1", 1, &long).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let pool = init_memory_database().await.unwrap();
        save(&pool, "u1", 101, "Name").await.unwrap();
        assert!(delete(&pool, "u1", 101).await.unwrap());
        assert!(!delete(&pool, "u1", 101).await.unwrap());
        assert!(get(&pool, "u1", 101).await.unwrap().is_none());
    }
}
