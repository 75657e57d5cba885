use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::{AuthService, AuthUser};
use crate::cache::{PageCache, INDEX_CACHE_KEY};
use crate::models::*;
use crate::pagination::{Paginator, POSTS_PER_PAGE};
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
    pub page_cache: Arc<PageCache>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginQuery {
    next: Option<String>,
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

/// Login-required routes bounce guests here, keeping the original path
fn login_redirect(req: &HttpRequest) -> HttpResponse {
    redirect(&format!("/auth/login/?next={}", req.path()))
}

fn not_found_page() -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::error("Not found"))
}

/// Decode the submitted image payload, if any
fn decode_image(form: &PostForm) -> Result<Option<PostImage>, String> {
    match &form.image {
        Some(upload) => match BASE64.decode(&upload.data) {
            Ok(data) => Ok(Some(PostImage {
                data,
                content_type: upload.content_type.clone(),
                filename: upload.filename.clone(),
            })),
            Err(_) => Err("Upload a valid image.".to_string()),
        },
        None => Ok(None),
    }
}

/// Validate a post form. Returns the decoded image on success, or the
/// field-error map for re-rendering.
fn validate_post_form(
    state: &AppState,
    form: &PostForm,
) -> Result<Option<PostImage>, serde_json::Value> {
    let mut errors = serde_json::Map::new();

    if form.text.trim().is_empty() {
        errors.insert("text".into(), json!(["This field is required."]));
    }

    if let Some(group_id) = &form.group {
        match state.store.get_group(group_id) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                errors.insert("group".into(), json!(["Select a valid choice."]));
            }
            Err(e) => {
                log::error!("Group lookup failed: {}", e);
                errors.insert("group".into(), json!(["Select a valid choice."]));
            }
        }
    }

    let image = match decode_image(form) {
        Ok(image) => image,
        Err(msg) => {
            errors.insert("image".into(), json!([msg]));
            None
        }
    };

    if errors.is_empty() {
        Ok(image)
    } else {
        Err(serde_json::Value::Object(errors))
    }
}

// ==================== Listing Views ====================

pub async fn index(state: web::Data<AppState>, query: web::Query<PageQuery>) -> impl Responder {
    if let Some(body) = state.page_cache.get(INDEX_CACHE_KEY) {
        return HttpResponse::Ok()
            .content_type("application/json")
            .body(body);
    }

    let posts = match state.store.list_posts() {
        Ok(posts) => posts,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to list posts: {}", e)))
        }
    };

    let page = Paginator::new(posts, POSTS_PER_PAGE).get_page(query.page.as_deref());
    let body = json!({ "page_obj": page }).to_string().into_bytes();
    state.page_cache.put(INDEX_CACHE_KEY, body.clone());

    HttpResponse::Ok()
        .content_type("application/json")
        .body(body)
}

pub async fn group_posts(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let slug = path.into_inner();
    let group = match state.store.get_group_by_slug(&slug) {
        Ok(group) => group,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get group: {}", e)))
        }
    };

    let posts = match state.store.list_posts_by_group(&group.id) {
        Ok(posts) => posts,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to list posts: {}", e)))
        }
    };

    let page = Paginator::new(posts, POSTS_PER_PAGE).get_page(query.page.as_deref());
    HttpResponse::Ok().json(json!({ "group": group, "page_obj": page }))
}

pub async fn profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
    user: Option<web::ReqData<AuthUser>>,
) -> impl Responder {
    let username = path.into_inner();
    let author = match state.store.get_user_by_username(&username) {
        Ok(author) => author,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get user: {}", e)))
        }
    };

    // Whether the current viewer already follows this author
    let following = match &user {
        Some(viewer) => state
            .store
            .is_following(&viewer.user_id, &author.id)
            .unwrap_or(false),
        None => false,
    };

    let posts = match state.store.list_posts_by_author(&author.id) {
        Ok(posts) => posts,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to list posts: {}", e)))
        }
    };

    let page = Paginator::new(posts, POSTS_PER_PAGE).get_page(query.page.as_deref());
    HttpResponse::Ok().json(json!({
        "author": author,
        "following": following,
        "page_obj": page,
    }))
}

/// Feed of posts from authors the current user follows
pub async fn follow_index(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
    user: Option<web::ReqData<AuthUser>>,
) -> impl Responder {
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    let posts = match state.store.list_feed_posts(&user.user_id) {
        Ok(posts) => posts,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to list posts: {}", e)))
        }
    };

    let page = Paginator::new(posts, POSTS_PER_PAGE).get_page(query.page.as_deref());
    HttpResponse::Ok().json(json!({ "page_obj": page }))
}

// ==================== Post Detail & Mutation ====================

pub async fn post_detail(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    let post = match state.store.get_post(&id) {
        Ok(post) => post,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get post: {}", e)))
        }
    };

    let comments = match state.store.list_comments(&post.id) {
        Ok(comments) => comments,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to list comments: {}", e)))
        }
    };

    HttpResponse::Ok().json(json!({
        "post": post,
        "comments": comments,
        "form": { "text": "" },
    }))
}

pub async fn post_create_form(
    req: HttpRequest,
    user: Option<web::ReqData<AuthUser>>,
) -> impl Responder {
    if user.is_none() {
        return login_redirect(&req);
    }

    HttpResponse::Ok().json(json!({ "form": { "text": "", "group": null } }))
}

pub async fn post_create(
    req: HttpRequest,
    state: web::Data<AppState>,
    user: Option<web::ReqData<AuthUser>>,
    form: web::Json<PostForm>,
) -> impl Responder {
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    let image = match validate_post_form(&state, &form) {
        Ok(image) => image,
        Err(errors) => {
            return HttpResponse::Ok().json(json!({
                "form": { "text": form.text, "group": form.group, "errors": errors },
            }))
        }
    };

    let mut post = Post {
        id: String::new(),
        author_id: user.user_id.clone(),
        author: user.username.clone(),
        group_id: form.group.clone(),
        group: None,
        text: form.text.clone(),
        image,
        created_at: Utc::now(),
    };

    if let Err(e) = state.store.create_post(&mut post) {
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to create post: {}", e)));
    }

    redirect(&format!("/profile/{}/", user.username))
}

pub async fn post_edit_form(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: Option<web::ReqData<AuthUser>>,
) -> impl Responder {
    let id = path.into_inner();
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    let post = match state.store.get_post(&id) {
        Ok(post) => post,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get post: {}", e)))
        }
    };

    if post.author_id != user.user_id {
        return redirect(&format!("/posts/{}/", post.id));
    }

    HttpResponse::Ok().json(json!({
        "form": { "text": post.text, "group": post.group_id },
        "is_edit": true,
    }))
}

pub async fn post_edit(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: Option<web::ReqData<AuthUser>>,
    form: web::Json<PostForm>,
) -> impl Responder {
    let id = path.into_inner();
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    let mut post = match state.store.get_post(&id) {
        Ok(post) => post,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get post: {}", e)))
        }
    };

    // Only the author may edit; everyone else is sent back to the post
    if post.author_id != user.user_id {
        return redirect(&format!("/posts/{}/", post.id));
    }

    let image = match validate_post_form(&state, &form) {
        Ok(image) => image,
        Err(errors) => {
            return HttpResponse::Ok().json(json!({
                "form": { "text": form.text, "group": form.group, "errors": errors },
                "is_edit": true,
            }))
        }
    };

    post.text = form.text.clone();
    post.group_id = form.group.clone();
    if image.is_some() {
        post.image = image;
    }

    if let Err(e) = state.store.update_post(&post) {
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to update post: {}", e)));
    }

    redirect(&format!("/posts/{}/", post.id))
}

/// The single place where comments are persisted. Blank text is dropped
/// silently; the client lands back on the post either way.
pub async fn add_comment(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: Option<web::ReqData<AuthUser>>,
    form: web::Json<CommentForm>,
) -> impl Responder {
    let id = path.into_inner();
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    let post = match state.store.get_post(&id) {
        Ok(post) => post,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get post: {}", e)))
        }
    };

    if !form.text.trim().is_empty() {
        let mut comment = Comment {
            id: String::new(),
            post_id: post.id.clone(),
            author_id: user.user_id.clone(),
            author: user.username.clone(),
            text: form.text.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = state.store.create_comment(&mut comment) {
            log::error!("Failed to create comment: {}", e);
        }
    }

    redirect(&format!("/posts/{}/", post.id))
}

pub async fn post_image(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_post(&id) {
        Ok(post) => match post.image {
            Some(image) => HttpResponse::Ok()
                .content_type(image.content_type)
                .body(image.data),
            None => not_found_page(),
        },
        Err(StoreError::NotFound(_)) => not_found_page(),
        Err(e) => HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error(format!("Failed to get post: {}", e))),
    }
}

// ==================== Follow / Unfollow ====================

pub async fn profile_follow(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: Option<web::ReqData<AuthUser>>,
) -> impl Responder {
    let username = path.into_inner();
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    let author = match state.store.get_user_by_username(&username) {
        Ok(author) => author,
        Err(StoreError::NotFound(_)) => return not_found_page(),
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Failed to get user: {}", e)))
        }
    };

    // Following yourself is a silent no-op
    if author.id != user.user_id {
        if let Err(e) = state.store.create_follow(&user.user_id, &author.id) {
            log::error!("Failed to create follow: {}", e);
        }
    }

    redirect(&format!("/profile/{}/", username))
}

pub async fn profile_unfollow(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    user: Option<web::ReqData<AuthUser>>,
) -> impl Responder {
    let username = path.into_inner();
    let user = match user {
        Some(user) => user.into_inner(),
        None => return login_redirect(&req),
    };

    if let Err(e) = state.store.delete_follow_by_username(&user.user_id, &username) {
        log::error!("Failed to delete follow: {}", e);
    }

    redirect(&format!("/profile/{}/", username))
}

// ==================== Auth Endpoints ====================

pub async fn signup(state: web::Data<AppState>, body: web::Json<SignupRequest>) -> impl Responder {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("Username and password are required"));
    }

    let password_hash = match state.auth_service.hash_password(&body.password) {
        Ok(hash) => hash,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to hash password"))
        }
    };

    let mut user = User {
        id: String::new(),
        username: body.username.clone(),
        password_hash,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    if let Err(e) = state.store.create_user(&mut user) {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error(format!("Failed to create user: {}", e)));
    }

    let token = match state.auth_service.generate_token(&user.id, &user.username) {
        Ok(token) => token,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Created().json(ApiResponse::success(TokenResponse { token, user }))
}

pub async fn login_form(query: web::Query<LoginQuery>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "form": { "username": "" },
        "next": query.next,
    }))
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> impl Responder {
    let user = match state.store.get_user_by_username(&body.username) {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Invalid credentials"));
        }
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Database error"));
        }
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false);

    if !valid {
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
    }

    let token = match state.auth_service.generate_token(&user.id, &user.username) {
        Ok(token) => token,
        Err(_) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to generate token"))
        }
    };

    HttpResponse::Ok().json(ApiResponse::success(TokenResponse { token, user }))
}

pub async fn not_found() -> impl Responder {
    not_found_page()
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Listings
        .route("/", web::get().to(index))
        .route("/group/{slug}/", web::get().to(group_posts))
        .route("/profile/{username}/", web::get().to(profile))
        .route("/follow/", web::get().to(follow_index))
        // Posts
        .route("/create/", web::get().to(post_create_form))
        .route("/create/", web::post().to(post_create))
        .route("/posts/{id}/", web::get().to(post_detail))
        .route("/posts/{id}/edit/", web::get().to(post_edit_form))
        .route("/posts/{id}/edit/", web::post().to(post_edit))
        .route("/posts/{id}/comment/", web::post().to(add_comment))
        .route("/posts/{id}/image/", web::get().to(post_image))
        // Follow edges
        .route("/profile/{username}/follow/", web::get().to(profile_follow))
        .route("/profile/{username}/unfollow/", web::get().to(profile_unfollow))
        // Auth
        .route("/auth/signup/", web::post().to(signup))
        .route("/auth/login/", web::get().to(login_form))
        .route("/auth/login/", web::post().to(login))
        // Everything else renders the not-found page
        .default_service(web::route().to(not_found));
}
