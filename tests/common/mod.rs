#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tokensafe::auth::{AuthService, CookieSettings, ManualClock, PasswordHasher, TokenCodec};
use tokensafe::configuration::{JwtSettings, UploadSettings};
use tokensafe::models::Role;
use tokensafe::startup::{run, AppContext};
use tokensafe::store::{MemoryStore, PgStore, Stores, UserStore};

pub const PASSWORD: &str = "correct-horse-battery";
pub const MAX_UPLOAD_BYTES: usize = 1024;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub upload_dir: PathBuf,
    pub client: reqwest::Client,
}

pub fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let upload_dir = std::env::temp_dir().join(format!("tokensafe-test-{}", uuid::Uuid::new_v4()));

    let address = launch(Stores::from_memory(store.clone()), clock.clone(), upload_dir.clone());

    TestApp {
        address,
        store,
        clock,
        upload_dir,
        client: reqwest::Client::new(),
    }
}

/// Start the server on a random port over the given stores.
fn launch(stores: Stores, clock: Arc<ManualClock>, upload_dir: PathBuf) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let jwt = JwtSettings {
        access_secret: "integration-access-secret-0123456789".to_string(),
        refresh_secret: "integration-refresh-secret-0123456789".to_string(),
        access_token_ttl: Duration::minutes(10),
        refresh_token_ttl: Duration::days(7),
        issuer: "tokensafe".to_string(),
    };
    let codec = TokenCodec::new(&jwt, clock.clone());
    // Minimum bcrypt cost keeps the suite fast
    let auth = AuthService::new(
        &stores,
        codec,
        Arc::new(PasswordHasher::new(4)),
        clock,
    );

    let context = AppContext {
        stores,
        auth,
        cookies: CookieSettings::default(),
        uploads: UploadSettings {
            dir: upload_dir,
            max_bytes: MAX_UPLOAD_BYTES,
        },
    };
    let server = run(listener, context).expect("Failed to create server");
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

/// Server backed by PostgreSQL, each test on a freshly migrated database.
pub struct PgTestApp {
    pub address: String,
    pub store: PgStore,
    pub db_pool: PgPool,
    pub client: reqwest::Client,
}

/// `None` when `DATABASE_URL` is not set, so the suite still runs on
/// machines without PostgreSQL.
pub async fn spawn_pg_app() -> Option<PgTestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
        return None;
    };
    let db_pool = configure_database(&database_url).await;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let upload_dir = std::env::temp_dir().join(format!("tokensafe-test-{}", uuid::Uuid::new_v4()));
    let address = launch(Stores::postgres(db_pool.clone()), clock, upload_dir);

    Some(PgTestApp {
        address,
        store: PgStore::new(db_pool.clone()),
        db_pool,
        client: reqwest::Client::new(),
    })
}

pub async fn configure_database(database_url: &str) -> PgPool {
    let options = PgConnectOptions::from_str(database_url).expect("Invalid DATABASE_URL");
    let database_name = uuid::Uuid::new_v4().to_string();

    // Create database
    let mut connection = PgConnection::connect_with(&options.clone().database("postgres"))
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, database_name))
        .await
        .expect("Failed to create database.");

    // Migrate database
    let connection_pool = PgPoolOptions::new()
        .connect_with(options.database(&database_name))
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/register"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Register and log in, returning the token pair body.
    pub async fn signed_in(&self, email: &str) -> Value {
        assert_eq!(201, self.register(email, PASSWORD).await.status().as_u16());
        let response = self.login(email, PASSWORD).await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    pub async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/refresh"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get(&self, path: &str, access_token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn set_role(&self, email: &str, role: Role) {
        let user = self
            .store
            .find_by_email(email)
            .await
            .unwrap()
            .expect("user exists");
        self.store.update_role(user.id, role).await.unwrap();
    }
}

impl PgTestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub fn token(body: &Value, field: &str) -> String {
    body[field].as_str().expect("token field present").to_string()
}
