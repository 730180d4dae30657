use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::content;
use crate::models::{
    Category, Post, PostInput, PostQuery, PostResponse, SearchQuery, Tag, User, UserResponse,
};
use crate::routes::auth::{extract_current_user, extract_optional_user};
use crate::routes::internal_error;

pub fn posts_routes() -> Router<SqlitePool> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/drafts", get(list_drafts))
        .route("/search", get(search_posts))
        .route("/images/upload", post(upload_image))
        .route(
            "/{post_id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

// ============================
// Listing & search
// ============================

async fn list_posts(
    State(pool): State<SqlitePool>,
    Query(query): Query<PostQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let posts: Vec<Post> = match (query.category_id, query.tag_id) {
        (Some(category_id), Some(tag_id)) => {
            sqlx::query_as::<_, Post>(
                r#"SELECT * FROM posts
                   WHERE status = 'published' AND category_id = ?
                     AND id IN (SELECT post_id FROM post_tags WHERE tag_id = ?)
                   ORDER BY created_at DESC"#,
            )
            .bind(category_id)
            .bind(tag_id)
            .fetch_all(&pool)
            .await
            .map_err(internal_error)?
        }
        (Some(category_id), None) => {
            sqlx::query_as::<_, Post>(
                "SELECT * FROM posts WHERE status = 'published' AND category_id = ? ORDER BY created_at DESC",
            )
            .bind(category_id)
            .fetch_all(&pool)
            .await
            .map_err(internal_error)?
        }
        (None, Some(tag_id)) => {
            sqlx::query_as::<_, Post>(
                r#"SELECT * FROM posts
                   WHERE status = 'published'
                     AND id IN (SELECT post_id FROM post_tags WHERE tag_id = ?)
                   ORDER BY created_at DESC"#,
            )
            .bind(tag_id)
            .fetch_all(&pool)
            .await
            .map_err(internal_error)?
        }
        (None, None) => {
            sqlx::query_as::<_, Post>(
                "SELECT * FROM posts WHERE status = 'published' ORDER BY created_at DESC",
            )
            .fetch_all(&pool)
            .await
            .map_err(internal_error)?
        }
    };

    let responses = build_responses(&pool, posts).await?;
    Ok(Json(responses))
}

async fn list_drafts(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let current_user = extract_current_user(&pool, &headers).await?;

    let posts = sqlx::query_as::<_, Post>(
        r#"SELECT * FROM posts
           WHERE status = 'draft' AND author_id = ?
           ORDER BY COALESCE(updated_at, created_at) DESC"#,
    )
    .bind(current_user.id)
    .fetch_all(&pool)
    .await
    .map_err(internal_error)?;

    let responses = build_responses(&pool, posts).await?;
    Ok(Json(responses))
}

async fn search_posts(
    State(pool): State<SqlitePool>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let term = query.query.trim();
    if term.chars().count() < 3 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": "Search query must be at least 3 characters"})),
        ));
    }

    let pattern = format!("%{}%", term);
    let posts = sqlx::query_as::<_, Post>(
        r#"SELECT * FROM posts
           WHERE status = 'published' AND (title LIKE ? OR content LIKE ?)
           ORDER BY created_at DESC"#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(&pool)
    .await
    .map_err(internal_error)?;

    let responses = build_responses(&pool, posts).await?;
    Ok(Json(responses))
}

async fn get_post(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let current_user = extract_optional_user(&pool, &headers).await?;

    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(post_not_found)?;

    // Drafts are invisible to anonymous readers.
    if post.status == "draft" && current_user.is_none() {
        return Err(post_not_found());
    }

    let response = build_response(&pool, post).await?;
    Ok(Json(response))
}

// ============================
// Authoring
// ============================

async fn create_post(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Json(input): Json<PostInput>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let current_user = extract_current_user(&pool, &headers).await?;

    let errors = validate_post_input(&input);
    if !errors.is_empty() {
        return Err(validation_failed(errors));
    }

    let category = resolve_category(&pool, input.category_id).await?;

    let clean_content = content::sanitize_html(&input.content);
    let reading_time = content::reading_time(&clean_content);
    let now = Utc::now();

    let result = sqlx::query(
        r#"INSERT INTO posts (title, content, image_url, status, reading_time, category_id, author_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(input.title.trim())
    .bind(&clean_content)
    .bind(input.image_url.trim())
    .bind(input.status.as_str())
    .bind(reading_time)
    .bind(category.id)
    .bind(current_user.id)
    .bind(now)
    .execute(&pool)
    .await
    .map_err(internal_error)?;

    let post_id = result.last_insert_rowid();
    attach_tags(&pool, post_id, &input.tag_ids).await?;

    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&pool)
        .await
        .map_err(internal_error)?;

    let response = build_response(&pool, post).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn update_post(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
    Json(input): Json<PostInput>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let existing = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(post_not_found)?;

    let errors = validate_post_input(&input);
    if !errors.is_empty() {
        return Err(validation_failed(errors));
    }

    let category = resolve_category(&pool, input.category_id).await?;

    let clean_content = content::sanitize_html(&input.content);
    let reading_time = content::reading_time(&clean_content);

    sqlx::query(
        r#"UPDATE posts
           SET title = ?, content = ?, image_url = ?, status = ?, reading_time = ?,
               category_id = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(input.title.trim())
    .bind(&clean_content)
    .bind(input.image_url.trim())
    .bind(input.status.as_str())
    .bind(reading_time)
    .bind(category.id)
    .bind(Utc::now())
    .bind(existing.id)
    .execute(&pool)
    .await
    .map_err(internal_error)?;

    // Replace the tag set wholesale; the form always submits the full list.
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(existing.id)
        .execute(&pool)
        .await
        .map_err(internal_error)?;
    attach_tags(&pool, existing.id, &input.tag_ids).await?;

    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(existing.id)
        .fetch_one(&pool)
        .await
        .map_err(internal_error)?;

    let response = build_response(&pool, post).await?;
    Ok(Json(response))
}

async fn delete_post(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_optional(&pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(post_not_found)?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post.id)
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(post.id)
        .execute(&pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(serde_json::json!({"message": "Post deleted successfully"})))
}

// ============================
// Cover image upload
// ============================

#[derive(Debug, thiserror::Error)]
enum UploadError {
    #[error("No file was provided")]
    MissingFile,
    #[error("Only image files can be uploaded")]
    NotAnImage,
}

impl From<UploadError> for (StatusCode, Json<serde_json::Value>) {
    fn from(err: UploadError) -> Self {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": err.to_string()})),
        )
    }
}

async fn upload_image(
    State(pool): State<SqlitePool>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _current_user = extract_current_user(&pool, &headers).await?;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": e.to_string()})),
        )
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Err(UploadError::NotAnImage.into());
        }

        let ext = field
            .file_name()
            .and_then(|name| {
                std::path::Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "bin".to_string());

        let unique_name = format!("{}.{}", Uuid::new_v4(), ext);
        let upload_path = PathBuf::from("uploads").join(&unique_name);

        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"detail": e.to_string()})),
            )
        })?;

        tokio::fs::write(&upload_path, &data)
            .await
            .map_err(internal_error)?;

        return Ok((StatusCode::CREATED, Json(format!("/uploads/{}", unique_name))));
    }

    Err(UploadError::MissingFile.into())
}

// ============================
// Helpers
// ============================

/// Mirrors the authoring form's required-field checks, message for message.
fn validate_post_input(input: &PostInput) -> BTreeMap<&'static str, &'static str> {
    let mut errors = BTreeMap::new();

    if input.title.trim().is_empty() {
        errors.insert("title", "Title is required");
    }
    if input.image_url.trim().is_empty() {
        errors.insert("imageUrl", "Image is required");
    }
    if content::is_blank_html(&input.content) {
        errors.insert("content", "Content is required");
    }
    if input.category_id.is_none() {
        errors.insert("category", "Category is required");
    }

    errors
}

fn validation_failed(
    errors: BTreeMap<&'static str, &'static str>,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"detail": "Validation failed", "errors": errors})),
    )
}

fn post_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"detail": "Post not found"})),
    )
}

async fn resolve_category(
    pool: &SqlitePool,
    category_id: Option<i64>,
) -> Result<Category, (StatusCode, Json<serde_json::Value>)> {
    let category_id = category_id.ok_or_else(|| {
        validation_failed(BTreeMap::from([("category", "Category is required")]))
    })?;

    sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"detail": "Category not found"})),
            )
        })
}

/// Associates tags with a post. Ids that do not exist are silently skipped
/// rather than failing the whole write.
async fn attach_tags(
    pool: &SqlitePool,
    post_id: i64,
    tag_ids: &[i64],
) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    for tag_id in tag_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id) SELECT ?, id FROM tags WHERE id = ?",
        )
        .bind(post_id)
        .bind(tag_id)
        .execute(pool)
        .await
        .map_err(internal_error)?;
    }
    Ok(())
}

async fn build_response(
    pool: &SqlitePool,
    post: Post,
) -> Result<PostResponse, (StatusCode, Json<serde_json::Value>)> {
    let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
        .bind(post.category_id)
        .fetch_one(pool)
        .await
        .map_err(internal_error)?;

    let tags = sqlx::query_as::<_, Tag>(
        r#"SELECT t.id, t.name FROM tags t
           JOIN post_tags pt ON pt.tag_id = t.id
           WHERE pt.post_id = ?
           ORDER BY t.name"#,
    )
    .bind(post.id)
    .fetch_all(pool)
    .await
    .map_err(internal_error)?;

    let author = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(post.author_id)
        .fetch_one(pool)
        .await
        .map_err(internal_error)?;

    Ok(PostResponse {
        id: post.id,
        title: post.title,
        content: post.content,
        image_url: post.image_url,
        status: post.status,
        reading_time: post.reading_time,
        category,
        tags,
        author: UserResponse::from(author),
        created_at: post.created_at,
        updated_at: post.updated_at,
    })
}

async fn build_responses(
    pool: &SqlitePool,
    posts: Vec<Post>,
) -> Result<Vec<PostResponse>, (StatusCode, Json<serde_json::Value>)> {
    let mut responses = Vec::with_capacity(posts.len());
    for post in posts {
        responses.push(build_response(pool, post).await?);
    }
    Ok(responses)
}
