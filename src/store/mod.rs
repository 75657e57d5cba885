use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

const POST_COLUMNS: &str = r#"p.id, p.author_id, u.username AS author, p.group_id,
    g.slug AS group_slug, p.text, p.image_data, p.image_content_type,
    p.image_filename, p.created_at"#;

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                description TEXT DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                group_id TEXT,
                text TEXT NOT NULL,
                image_data BLOB,
                image_content_type TEXT,
                image_filename TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS follows (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, author_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id);
            CREATE INDEX IF NOT EXISTS idx_posts_group_id ON posts(group_id);
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);
            CREATE INDEX IF NOT EXISTS idx_follows_user_id ON follows(user_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, username, password_hash, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &user.id,
                &user.username,
                &user.password_hash,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], |row| {
            self.row_to_user(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            |row| self.row_to_user(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn delete_user(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("User {}", id)));
        }
        Ok(())
    }

    fn row_to_user(&self, row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            password_hash: row.get("password_hash")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    // ==================== Group Operations ====================

    pub fn create_group(&self, group: &mut Group) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        group.id = Uuid::new_v4().to_string();
        group.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO groups (id, title, slug, description, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &group.id,
                &group.title,
                &group.slug,
                &group.description,
                group.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_group(&self, id: &str) -> StoreResult<Group> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM groups WHERE id = ?1", params![id], |row| {
            self.row_to_group(row)
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Group {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_group_by_slug(&self, slug: &str) -> StoreResult<Group> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM groups WHERE slug = ?1",
            params![slug],
            |row| self.row_to_group(row),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("Group {}", slug))
            }
            _ => StoreError::Database(e),
        })
    }

    /// Delete a group. Its posts survive with their group reference cleared.
    pub fn delete_group(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM groups WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Group {}", id)));
        }
        Ok(())
    }

    fn row_to_group(&self, row: &rusqlite::Row) -> rusqlite::Result<Group> {
        Ok(Group {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Post Operations ====================

    pub fn create_post(&self, post: &mut Post) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        post.id = Uuid::new_v4().to_string();
        post.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO posts (id, author_id, group_id, text, image_data,
                image_content_type, image_filename, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &post.id,
                &post.author_id,
                &post.group_id,
                &post.text,
                post.image.as_ref().map(|i| &i.data),
                post.image.as_ref().map(|i| &i.content_type),
                post.image.as_ref().map(|i| &i.filename),
                post.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_post(&self, id: &str) -> StoreResult<Post> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            r#"SELECT {} FROM posts p
               JOIN users u ON u.id = p.author_id
               LEFT JOIN groups g ON g.id = p.group_id
               WHERE p.id = ?1"#,
            POST_COLUMNS
        );
        conn.query_row(&sql, params![id], |row| self.row_to_post(row))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Post {}", id))
                }
                _ => StoreError::Database(e),
            })
    }

    /// Write back an edited post's text, group and image
    pub fn update_post(&self, post: &Post) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            r#"UPDATE posts SET text = ?1, group_id = ?2, image_data = ?3,
               image_content_type = ?4, image_filename = ?5 WHERE id = ?6"#,
            params![
                &post.text,
                &post.group_id,
                post.image.as_ref().map(|i| &i.data),
                post.image.as_ref().map(|i| &i.content_type),
                post.image.as_ref().map(|i| &i.filename),
                &post.id,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Post {}", post.id)));
        }
        Ok(())
    }

    /// All posts, newest first
    pub fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let sql = format!(
            r#"SELECT {} FROM posts p
               JOIN users u ON u.id = p.author_id
               LEFT JOIN groups g ON g.id = p.group_id
               ORDER BY p.created_at DESC, p.rowid DESC"#,
            POST_COLUMNS
        );
        self.query_posts(&sql, params![])
    }

    /// Posts in one group, newest first
    pub fn list_posts_by_group(&self, group_id: &str) -> StoreResult<Vec<Post>> {
        let sql = format!(
            r#"SELECT {} FROM posts p
               JOIN users u ON u.id = p.author_id
               LEFT JOIN groups g ON g.id = p.group_id
               WHERE p.group_id = ?1
               ORDER BY p.created_at DESC, p.rowid DESC"#,
            POST_COLUMNS
        );
        self.query_posts(&sql, params![group_id])
    }

    /// Posts by one author, newest first
    pub fn list_posts_by_author(&self, author_id: &str) -> StoreResult<Vec<Post>> {
        let sql = format!(
            r#"SELECT {} FROM posts p
               JOIN users u ON u.id = p.author_id
               LEFT JOIN groups g ON g.id = p.group_id
               WHERE p.author_id = ?1
               ORDER BY p.created_at DESC, p.rowid DESC"#,
            POST_COLUMNS
        );
        self.query_posts(&sql, params![author_id])
    }

    /// Posts whose author the given user follows, newest first
    pub fn list_feed_posts(&self, user_id: &str) -> StoreResult<Vec<Post>> {
        let sql = format!(
            r#"SELECT {} FROM posts p
               JOIN users u ON u.id = p.author_id
               LEFT JOIN groups g ON g.id = p.group_id
               WHERE p.author_id IN (SELECT author_id FROM follows WHERE user_id = ?1)
               ORDER BY p.created_at DESC, p.rowid DESC"#,
            POST_COLUMNS
        );
        self.query_posts(&sql, params![user_id])
    }

    pub fn count_posts(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count)
    }

    fn query_posts(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<Post>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| self.row_to_post(row))?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    fn row_to_post(&self, row: &rusqlite::Row) -> rusqlite::Result<Post> {
        let image_data: Option<Vec<u8>> = row.get("image_data")?;
        let image = match image_data {
            Some(data) => Some(PostImage {
                data,
                content_type: row.get("image_content_type")?,
                filename: row.get("image_filename")?,
            }),
            None => None,
        };

        Ok(Post {
            id: row.get("id")?,
            author_id: row.get("author_id")?,
            author: row.get("author")?,
            group_id: row.get("group_id")?,
            group: row.get("group_slug")?,
            text: row.get("text")?,
            image,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    // ==================== Comment Operations ====================

    pub fn create_comment(&self, comment: &mut Comment) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        comment.id = Uuid::new_v4().to_string();
        comment.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO comments (id, post_id, author_id, text, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &comment.id,
                &comment.post_id,
                &comment.author_id,
                &comment.text,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Comments under a post in creation order
    pub fn list_comments(&self, post_id: &str) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.post_id, c.author_id, u.username AS author, c.text, c.created_at
               FROM comments c
               JOIN users u ON u.id = c.author_id
               WHERE c.post_id = ?1
               ORDER BY c.created_at ASC, c.rowid ASC"#,
        )?;
        let rows = stmt.query_map(params![post_id], |row| {
            Ok(Comment {
                id: row.get("id")?,
                post_id: row.get("post_id")?,
                author_id: row.get("author_id")?,
                author: row.get("author")?,
                text: row.get("text")?,
                created_at: parse_datetime(row.get::<_, String>("created_at")?),
            })
        })?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    // ==================== Follow Operations ====================

    /// Create a follow edge if absent. Returns whether a new edge was made.
    pub fn create_follow(&self, user_id: &str, author_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let follow = Follow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            author_id: author_id.to_string(),
            created_at: Utc::now(),
        };
        let rows = conn.execute(
            r#"INSERT OR IGNORE INTO follows (id, user_id, author_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &follow.id,
                &follow.user_id,
                &follow.author_id,
                follow.created_at.to_rfc3339(),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Delete the follow edge toward the named author, if present
    pub fn delete_follow_by_username(&self, user_id: &str, username: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"DELETE FROM follows WHERE user_id = ?1
               AND author_id IN (SELECT id FROM users WHERE username = ?2)"#,
            params![user_id, username],
        )?;
        Ok(())
    }

    pub fn is_following(&self, user_id: &str, author_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = ?1 AND author_id = ?2)",
            params![user_id, author_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn count_follows(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM follows", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user(store: &Store, username: &str) -> User {
        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&mut user).unwrap();
        user
    }

    fn make_post(store: &Store, author: &User, text: &str, group_id: Option<&str>) -> Post {
        let mut post = Post {
            id: String::new(),
            author_id: author.id.clone(),
            author: author.username.clone(),
            group_id: group_id.map(|g| g.to_string()),
            group: None,
            text: text.to_string(),
            image: None,
            created_at: Utc::now(),
        };
        store.create_post(&mut post).unwrap();
        post
    }

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "alice");
        assert!(!user.id.is_empty());

        let retrieved = store.get_user_by_username("alice").unwrap();
        assert_eq!(retrieved.id, user.id);
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = Store::in_memory().unwrap();
        make_user(&store, "alice");

        let mut dup = User {
            id: String::new(),
            username: "alice".to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(store.create_user(&mut dup).is_err());
    }

    #[test]
    fn test_posts_listed_newest_first() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "alice");
        make_post(&store, &user, "first", None);
        make_post(&store, &user, "second", None);
        let newest = make_post(&store, &user, "third", None);

        let posts = store.list_posts().unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].id, newest.id);
        assert_eq!(posts[2].text, "first");
        assert_eq!(posts[0].author, "alice");
    }

    #[test]
    fn test_deleting_group_keeps_posts() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "alice");
        let mut group = Group {
            id: String::new(),
            title: "Cats".to_string(),
            slug: "cats".to_string(),
            description: String::new(),
            created_at: Utc::now(),
        };
        store.create_group(&mut group).unwrap();
        let post = make_post(&store, &user, "meow", Some(&group.id));

        store.delete_group(&group.id).unwrap();

        let survivor = store.get_post(&post.id).unwrap();
        assert_eq!(survivor.group_id, None);
        assert_eq!(survivor.group, None);
        assert_eq!(survivor.text, "meow");
    }

    #[test]
    fn test_follow_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let reader = make_user(&store, "reader");
        let author = make_user(&store, "author");

        assert!(store.create_follow(&reader.id, &author.id).unwrap());
        assert!(!store.create_follow(&reader.id, &author.id).unwrap());
        assert_eq!(store.count_follows().unwrap(), 1);
        assert!(store.is_following(&reader.id, &author.id).unwrap());
    }

    #[test]
    fn test_unfollow_missing_edge_is_noop() {
        let store = Store::in_memory().unwrap();
        let reader = make_user(&store, "reader");
        make_user(&store, "author");

        store.delete_follow_by_username(&reader.id, "author").unwrap();
        assert_eq!(store.count_follows().unwrap(), 0);
    }

    #[test]
    fn test_deleting_user_removes_follow_edges() {
        let store = Store::in_memory().unwrap();
        let reader = make_user(&store, "reader");
        let author = make_user(&store, "author");
        store.create_follow(&reader.id, &author.id).unwrap();

        store.delete_user(&author.id).unwrap();
        assert_eq!(store.count_follows().unwrap(), 0);
    }

    #[test]
    fn test_comments_in_creation_order() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "alice");
        let post = make_post(&store, &user, "text", None);

        for text in ["one", "two", "three"] {
            let mut comment = Comment {
                id: String::new(),
                post_id: post.id.clone(),
                author_id: user.id.clone(),
                author: user.username.clone(),
                text: text.to_string(),
                created_at: Utc::now(),
            };
            store.create_comment(&mut comment).unwrap();
        }

        let comments = store.list_comments(&post.id).unwrap();
        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].text, "one");
        assert_eq!(comments[2].text, "three");
        assert_eq!(comments[0].author, "alice");
    }

    #[test]
    fn test_feed_contains_only_followed_authors() {
        let store = Store::in_memory().unwrap();
        let reader = make_user(&store, "reader");
        let followed = make_user(&store, "followed");
        let stranger = make_user(&store, "stranger");

        make_post(&store, &followed, "from followed", None);
        make_post(&store, &stranger, "from stranger", None);
        store.create_follow(&reader.id, &followed.id).unwrap();

        let feed = store.list_feed_posts(&reader.id).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].author, "followed");
    }

    #[test]
    fn test_post_image_round_trip() {
        let store = Store::in_memory().unwrap();
        let user = make_user(&store, "alice");
        let mut post = Post {
            id: String::new(),
            author_id: user.id.clone(),
            author: user.username.clone(),
            group_id: None,
            group: None,
            text: "with image".to_string(),
            image: Some(PostImage {
                data: vec![0x47, 0x49, 0x46, 0x38],
                content_type: "image/gif".to_string(),
                filename: "small.gif".to_string(),
            }),
            created_at: Utc::now(),
        };
        store.create_post(&mut post).unwrap();

        let retrieved = store.get_post(&post.id).unwrap();
        let image = retrieved.image.unwrap();
        assert_eq!(image.data, vec![0x47, 0x49, 0x46, 0x38]);
        assert_eq!(image.content_type, "image/gif");
    }
}
