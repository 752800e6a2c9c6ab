use actix_web::dev::Server;
use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{web, App, HttpRequest, HttpServer};
use std::net::TcpListener;

use crate::auth::{AuthService, CookieSettings};
use crate::configuration::UploadSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    delete_user, get_current_user, get_user, health_check, list_files, list_users, login, logout,
    refresh, register, stats, update_role, upload_file,
};
use crate::store::Stores;

/// Everything the handlers need, built once by the caller.
#[derive(Clone)]
pub struct AppContext {
    pub stores: Stores,
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub uploads: UploadSettings,
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::MalformedBody(err.to_string())).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::MalformedBody(err.to_string())).into()
}

pub fn run(listener: TcpListener, context: AppContext) -> Result<Server, std::io::Error> {
    let stores = web::Data::new(context.stores);
    let auth = web::Data::new(context.auth);
    let cookies = web::Data::new(context.cookies);
    let uploads = web::Data::new(context.uploads);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .app_data(stores.clone())
            .app_data(auth.clone())
            .app_data(cookies.clone())
            .app_data(uploads.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .service(
                        web::resource("/logout")
                            .wrap(JwtMiddleware::new(auth.clone()))
                            .route(web::post().to(logout)),
                    ),
            )

            // Protected routes (require JWT authentication)
            .service(
                web::scope("/users")
                    .wrap(JwtMiddleware::new(auth.clone()))
                    .route("", web::get().to(list_users))
                    .route("/me", web::get().to(get_current_user))
                    .route("/{id}", web::get().to(get_user))
                    .route("/{id}", web::delete().to(delete_user)),
            )
            .service(
                web::scope("/admin")
                    .wrap(JwtMiddleware::new(auth.clone()))
                    .route("/stats", web::get().to(stats))
                    .route("/users", web::get().to(list_users))
                    .route("/users/{id}", web::delete().to(delete_user))
                    .route("/users/{id}/role", web::put().to(update_role)),
            )
            .service(
                web::scope("/files")
                    .wrap(JwtMiddleware::new(auth.clone()))
                    .route("", web::get().to(list_files))
                    .route("/upload", web::post().to(upload_file)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
