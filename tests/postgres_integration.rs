//! Integration tests for the PostgreSQL store
//!
//! Each test migrates a fresh database named after a random UUID. They
//! need `DATABASE_URL` pointing at a server the test user may create
//! databases on, and return early when it is unset.

mod common;

use actix_web::{http::StatusCode, ResponseError};
use chrono::{Duration, Utc};
use common::{spawn_pg_app, token, PASSWORD};
use serde_json::{json, Value};
use tokensafe::auth::RefreshLedger;
use tokensafe::models::{NewFileUpload, NewUser, Role, SortOrder, UserQuery};
use tokensafe::store::{FileStore, UserStore};

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        full_name: None,
        password_hash: "$2b$04$hash".to_string(),
        role: Role::User,
    }
}

#[tokio::test]
async fn duplicate_email_returns_409() {
    let Some(app) = spawn_pg_app().await else { return };

    let body = json!({ "email": "a@x.com", "password": PASSWORD });
    assert_eq!(201, app.post_json("/auth/register", &body).await.status().as_u16());

    let body = json!({ "email": "A@X.com", "password": PASSWORD });
    let response = app.post_json("/auth/register", &body).await;
    assert_eq!(409, response.status().as_u16());

    // Straight to the unique index, past the lookup in the flow
    let err = UserStore::create(&app.store, new_user("a@x.com"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&app.db_pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn recording_the_same_token_twice_conflicts() {
    let Some(app) = spawn_pg_app().await else { return };
    let user = UserStore::create(&app.store, new_user("a@x.com")).await.unwrap();
    let expires = Utc::now() + Duration::days(7);

    let entry = app.store.record("tok", user.id, expires).await.unwrap();
    assert_ne!(entry.token_hash, "tok");

    let err = app.store.record("tok", user.id, expires).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn revoke_twice_is_idempotent() {
    let Some(app) = spawn_pg_app().await else { return };
    let user = UserStore::create(&app.store, new_user("a@x.com")).await.unwrap();
    app.store
        .record("tok", user.id, Utc::now() + Duration::days(7))
        .await
        .unwrap();

    assert!(app.store.revoke("tok").await.unwrap());
    let after_first = app.store.lookup("tok").await.unwrap().unwrap();

    assert!(!app.store.revoke("tok").await.unwrap());
    let after_second = app.store.lookup("tok").await.unwrap().unwrap();

    assert!(after_first.revoked);
    assert_eq!(after_first, after_second);
    assert!(!app.store.revoke("never-issued").await.unwrap());
}

#[tokio::test]
async fn deleting_a_user_cascades() {
    let Some(app) = spawn_pg_app().await else { return };
    let user = UserStore::create(&app.store, new_user("a@x.com")).await.unwrap();
    let other = UserStore::create(&app.store, new_user("b@x.com")).await.unwrap();
    let expires = Utc::now() + Duration::days(7);

    app.store.record("mine", user.id, expires).await.unwrap();
    app.store.record("theirs", other.id, expires).await.unwrap();
    FileStore::create(
        &app.store,
        NewFileUpload {
            filename: "f.txt".to_string(),
            file_type: "text/plain".to_string(),
            owner_id: user.id,
        },
    )
    .await
    .unwrap();

    assert!(UserStore::delete(&app.store, user.id).await.unwrap());
    assert!(!UserStore::delete(&app.store, user.id).await.unwrap());

    assert!(app.store.lookup("mine").await.unwrap().is_none());
    assert!(app.store.lookup("theirs").await.unwrap().is_some());
    assert!(app.store.list_for_owner(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn keyword_search_matches_wildcards_literally() {
    let Some(app) = spawn_pg_app().await else { return };
    for email in ["a%b@x.com", "alice@x.com", "bob@y.com"] {
        UserStore::create(&app.store, new_user(email)).await.unwrap();
    }

    let query = UserQuery {
        keyword: Some("%".to_string()),
        limit: 10,
        ..Default::default()
    };
    let users = app.store.list(&query).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "a%b@x.com");

    let query = UserQuery {
        keyword: Some("X.COM".to_string()),
        sort: SortOrder::Asc,
        limit: 10,
        ..Default::default()
    };
    let emails: Vec<_> = app
        .store
        .list(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.email)
        .collect();
    assert_eq!(emails, vec!["a%b@x.com", "alice@x.com"]);
}

#[tokio::test]
async fn login_logout_then_refresh_returns_401() {
    let Some(app) = spawn_pg_app().await else { return };
    let credentials = json!({ "email": "a@x.com", "password": PASSWORD });
    app.post_json("/auth/register", &credentials).await;

    let response = app.post_json("/auth/login", &credentials).await;
    assert_eq!(200, response.status().as_u16());
    let tokens: Value = response.json().await.unwrap();
    let refresh_token = token(&tokens, "refresh_token");

    let user = app.store.find_by_email("a@x.com").await.unwrap().unwrap();
    assert!(user.last_login_at.is_some());

    let response = app
        .client
        .post(app.url("/auth/logout"))
        .bearer_auth(token(&tokens, "access_token"))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let (revoked,): (bool,) =
        sqlx::query_as("SELECT revoked FROM refresh_tokens WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&app.db_pool)
            .await
            .unwrap();
    assert!(revoked);

    let response = app
        .post_json("/auth/refresh", &json!({ "refresh_token": refresh_token }))
        .await;
    assert_eq!(401, response.status().as_u16());
}
