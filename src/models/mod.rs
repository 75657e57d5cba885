use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User is an author identity with a unique username.
/// Each user owns their posts, comments and follow edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Group is a named, slug-identified category of posts.
/// Groups are provisioned administratively; deleting one leaves its posts
/// in place without a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Post is a single authored text entry, optionally grouped and illustrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    /// Author username, filled by the store join
    pub author: String,
    pub group_id: Option<String>,
    /// Group slug, filled by the store join
    pub group: Option<String>,
    pub text: String,
    pub image: Option<PostImage>,
    pub created_at: DateTime<Utc>,
}

/// PostImage is an optional attachment stored inline with its post.
/// The raw bytes never appear in rendered contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostImage {
    #[serde(skip_serializing, default)]
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

/// Comment is an immutable text reply under a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    /// Author username, filled by the store join
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Follow is a directed subscription edge from a reader to an author.
/// At most one edge exists per (user, author) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub user_id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

// Request/Response types for the HTTP surface

/// Form payload for creating or editing a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    /// Group id; an absent selection clears the group on edit
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageUpload>,
}

/// Inline image upload, base64-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: String,
}

/// Form payload for adding a comment
#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
