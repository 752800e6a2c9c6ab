use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use tokensafe::auth::{AuthService, CookieSettings, PasswordHasher, SystemClock, TokenCodec};
use tokensafe::configuration::get_configuration;
use tokensafe::startup::{run, AppContext};
use tokensafe::store::Stores;
use tokensafe::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!(settings = ?config, "Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database_max_connections)
        .connect(&configuration.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Database migration error")
    })?;

    tracing::info!("Database connection pool created successfully");

    let clock = Arc::new(SystemClock);
    let stores = Stores::postgres(pool);
    let codec = TokenCodec::new(&configuration.jwt(), clock.clone());
    let auth = AuthService::new(
        &stores,
        codec,
        Arc::new(PasswordHasher::new(configuration.bcrypt_cost)),
        clock,
    );
    auth.warm_up().await.map_err(|e| {
        tracing::error!("Failed to prepare password hasher: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Password hasher error")
    })?;

    let context = AppContext {
        stores,
        auth,
        cookies: CookieSettings {
            secure: configuration.cookie_secure,
        },
        uploads: configuration.uploads(),
    };

    let address = configuration.address();
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, context)?;
    tracing::info!("Server started successfully");

    server.await
}
