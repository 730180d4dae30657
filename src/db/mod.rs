use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    migrate(&pool).await?;
    seed_admin(&pool).await?;

    Ok(pool)
}

/// Creates the schema idempotently. Split out of [`init_db`] so tests can
/// run it against their own in-memory pools.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            hashed_password TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            image_url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'published')),
            reading_time INTEGER NOT NULL DEFAULT 1,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            author_id INTEGER NOT NULL REFERENCES users(id),
            created_at DATETIME NOT NULL,
            updated_at DATETIME
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_posts_status_created_at ON posts(status, created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_posts_category_id ON posts(category_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS post_tags (
            post_id INTEGER NOT NULL REFERENCES posts(id),
            tag_id INTEGER NOT NULL REFERENCES tags(id),
            PRIMARY KEY (post_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags(tag_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS visit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT NOT NULL,
            page_visited TEXT NOT NULL,
            visit_time DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_visit_logs_visit_time ON visit_logs(visit_time)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Seeds the single admin account from ADMIN_EMAIL / ADMIN_PASSWORD when the
/// users table is empty. The platform has no self-registration.
async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let (user_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count > 0 {
        return Ok(());
    }

    let (Ok(email), Ok(password)) = (
        std::env::var("ADMIN_EMAIL"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        tracing::warn!("No users exist and ADMIN_EMAIL/ADMIN_PASSWORD are not set; login will be impossible");
        return Ok(());
    };

    let name = std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Admin".to_string());
    let hashed = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        .map_err(|e| sqlx::Error::Protocol(format!("bcrypt failure: {e}")))?;

    sqlx::query(
        "INSERT INTO users (email, name, hashed_password, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&email)
    .bind(&name)
    .bind(&hashed)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    tracing::info!("Seeded admin account for {}", email);
    Ok(())
}
