use actix_web::{test, web, App};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use yatube::api::{self, AppState};
use yatube::auth::{AuthService, Authentication};
use yatube::cache::PageCache;
use yatube::models::{Post, User};
use yatube::store::Store;

fn test_state() -> (Arc<Store>, Arc<AuthService>, Arc<PageCache>) {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    let page_cache = Arc::new(PageCache::new(Duration::from_secs(20)));
    (store, auth_service, page_cache)
}

macro_rules! init_app {
    ($store:expr, $auth:expr, $cache:expr) => {
        test::init_service(
            App::new()
                .wrap(Authentication::new($auth.clone()))
                .app_data(web::Data::new(AppState {
                    store: $store.clone(),
                    auth_service: $auth.clone(),
                    page_cache: $cache.clone(),
                }))
                .configure(api::configure_routes),
        )
        .await
    };
}

fn create_test_user(store: &Arc<Store>, username: &str) -> User {
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

fn create_test_post(store: &Arc<Store>, author: &User, text: &str) -> Post {
    let mut post = Post {
        id: String::new(),
        author_id: author.id.clone(),
        author: author.username.clone(),
        group_id: None,
        group: None,
        text: text.to_string(),
        image: None,
        created_at: Utc::now(),
    };
    store.create_post(&mut post).unwrap();
    post
}

#[actix_web::test]
async fn test_index_serves_stale_page_within_window() {
    let (store, auth_service, page_cache) = test_state();
    let user = create_test_user(&store, "alice");
    create_test_post(&store, &user, "visible post");
    let app = init_app!(store, auth_service, page_cache);

    let req = test::TestRequest::get().uri("/").to_request();
    let before = test::call_and_read_body(&app, req).await;

    // A post created inside the cache window must not show up yet
    create_test_post(&store, &user, "hidden by cache");

    let req = test::TestRequest::get().uri("/").to_request();
    let after = test::call_and_read_body(&app, req).await;
    assert_eq!(before, after);
}

#[actix_web::test]
async fn test_clear_makes_new_post_visible() {
    let (store, auth_service, page_cache) = test_state();
    let user = create_test_user(&store, "alice");
    create_test_post(&store, &user, "visible post");
    let app = init_app!(store, auth_service, page_cache);

    let req = test::TestRequest::get().uri("/").to_request();
    let before = test::call_and_read_body(&app, req).await;

    create_test_post(&store, &user, "revealed after clear");
    page_cache.clear();

    let req = test::TestRequest::get().uri("/").to_request();
    let after = test::call_and_read_body(&app, req).await;
    assert_ne!(before, after);

    let body: serde_json::Value = serde_json::from_slice(&after).unwrap();
    let items = body["page_obj"]["items"].as_array().unwrap();
    assert_eq!(items[0]["text"], "revealed after clear");
}

#[actix_web::test]
async fn test_cache_expires_after_ttl() {
    let (store, auth_service, _) = test_state();
    // Tiny window so the test can outlive it
    let page_cache = Arc::new(PageCache::new(Duration::from_millis(50)));
    let user = create_test_user(&store, "alice");
    create_test_post(&store, &user, "first post");
    let app = init_app!(store, auth_service, page_cache);

    let req = test::TestRequest::get().uri("/").to_request();
    let before = test::call_and_read_body(&app, req).await;

    create_test_post(&store, &user, "second post");
    actix_web::rt::time::sleep(Duration::from_millis(80)).await;

    let req = test::TestRequest::get().uri("/").to_request();
    let after = test::call_and_read_body(&app, req).await;
    assert_ne!(before, after);
}

#[actix_web::test]
async fn test_other_listings_are_never_cached() {
    let (store, auth_service, page_cache) = test_state();
    let user = create_test_user(&store, "alice");
    create_test_post(&store, &user, "first post");
    let app = init_app!(store, auth_service, page_cache);

    let req = test::TestRequest::get().uri("/profile/alice/").to_request();
    let before: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(before["page_obj"]["items"].as_array().unwrap().len(), 1);

    create_test_post(&store, &user, "second post");

    let req = test::TestRequest::get().uri("/profile/alice/").to_request();
    let after: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(after["page_obj"]["items"].as_array().unwrap().len(), 2);
}
