use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use sqlx::SqlitePool;

use crate::models::{Category, CategoryInput, CategoryWithCount};
use crate::routes::auth::extract_current_user;
use crate::routes::internal_error;

pub fn categories_routes() -> Router<SqlitePool> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/{category_id}",
            axum::routing::put(update_category).delete(delete_category),
        )
}

const WITH_COUNT: &str = r#"
    SELECT c.id, c.name, COUNT(p.id) AS post_count
    FROM categories c
    LEFT JOIN posts p ON p.category_id = c.id
    GROUP BY c.id, c.name
    ORDER BY c.name
"#;

async fn list_categories(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let categories = sqlx::query_as::<_, CategoryWithCount>(WITH_COUNT)
        .fetch_all(&pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(categories))
}

async fn create_category(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Json(input): Json<CategoryInput>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": "Category name is required"})),
        ));
    }

    let existing = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = ?")
        .bind(&name)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?;

    if existing.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({"detail": "Category already exists"})),
        ));
    }

    let result = sqlx::query("INSERT INTO categories (name) VALUES (?)")
        .bind(&name)
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CategoryWithCount {
            id: result.last_insert_rowid(),
            name,
            post_count: 0,
        }),
    ))
}

async fn update_category(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Path(category_id): Path<i64>,
    Json(input): Json<CategoryInput>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": "Category name is required"})),
        ));
    }

    let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(category_not_found)?;

    let clash =
        sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = ? AND id != ?")
            .bind(&name)
            .bind(category.id)
            .fetch_optional(&pool)
            .await
            .map_err(internal_error)?;

    if clash.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({"detail": "Category already exists"})),
        ));
    }

    sqlx::query("UPDATE categories SET name = ? WHERE id = ?")
        .bind(&name)
        .bind(category.id)
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    let (post_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM posts WHERE category_id = ?")
            .bind(category.id)
            .fetch_one(&pool)
            .await
            .map_err(internal_error)?;

    Ok(Json(CategoryWithCount {
        id: category.id,
        name,
        post_count,
    }))
}

async fn delete_category(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Path(category_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(category_not_found)?;

    let (post_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM posts WHERE category_id = ?")
            .bind(category.id)
            .fetch_one(&pool)
            .await
            .map_err(internal_error)?;

    if post_count > 0 {
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({"detail": "Cannot delete category with existing posts"})),
        ));
    }

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(category.id)
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(
        serde_json::json!({"message": "Category deleted successfully"}),
    ))
}

fn category_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"detail": "Category not found"})),
    )
}
