use sqlx::{PgPool, Row};

/// Per-category observation counts, ordered by category then activity
pub async fn get_activity_counts(
    pool: &PgPool,
    category: Option<&str>,
) -> Result<Vec<(String, String, i64)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT category, activity, cnt
        FROM activity_counts
        WHERE $1::TEXT IS NULL OR category = $1
        ORDER BY category ASC, activity ASC
        "#,
    )
    .bind(category)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| Ok((r.try_get("category")?, r.try_get("activity")?, r.try_get("cnt")?)))
        .collect()
}

/// Check whether a category has at least one activity
pub async fn category_exists(pool: &PgPool, category: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS (SELECT 1 FROM activity_counts WHERE category = $1) AS known
        "#,
    )
    .bind(category)
    .fetch_one(pool)
    .await?;

    row.try_get("known")
}

/// Atomically add one observation, inserting the activity at 1 when unseen
pub async fn increment_activity(
    pool: &PgPool,
    category: &str,
    activity: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO activity_counts (category, activity, cnt)
        VALUES ($1, $2, 1)
        ON CONFLICT (category, activity)
        DO UPDATE SET cnt = activity_counts.cnt + 1
        RETURNING cnt
        "#,
    )
    .bind(category)
    .bind(activity)
    .fetch_one(pool)
    .await?;

    row.try_get("cnt")
}
