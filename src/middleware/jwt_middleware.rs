/// JWT Authentication Middleware
///
/// Resolves the access token on every request in the wrapped scope and
/// injects the caller's [`Identity`] into request extensions for use by
/// route handlers. Requests without a valid token never reach the handler.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::AuthService;
use crate::middleware::identity::{access_token_from, authenticate};

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    auth: web::Data<AuthService>,
}

impl JwtMiddleware {
    pub fn new(auth: web::Data<AuthService>) -> Self {
        Self { auth }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            auth: self.auth.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    auth: web::Data<AuthService>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = access_token_from(req.request());
        let auth = self.auth.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let identity = authenticate(auth.codec(), auth.users(), token.as_deref()).await?;
            req.extensions_mut().insert(identity);

            service.call(req).await
        })
    }
}
