/// JWT Authentication Middleware
///
/// Runs the token authenticator on the Authorization header and injects
/// the decoded claims into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{parse_bearer, RequiredMode, TokenAuthenticator};

/// JWT middleware for protecting routes
///
/// `access` guards ordinary endpoints, `refresh` guards the refresh endpoint.
pub struct JwtMiddleware {
    authenticator: TokenAuthenticator,
    mode: RequiredMode,
}

impl JwtMiddleware {
    pub fn new(authenticator: TokenAuthenticator, mode: RequiredMode) -> Self {
        Self {
            authenticator,
            mode,
        }
    }

    pub fn access(authenticator: TokenAuthenticator) -> Self {
        Self::new(authenticator, RequiredMode::Access)
    }

    pub fn refresh(authenticator: TokenAuthenticator) -> Self {
        Self::new(authenticator, RequiredMode::Refresh)
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
            authenticator: self.authenticator.clone(),
            mode: self.mode,
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    authenticator: TokenAuthenticator,
    mode: RequiredMode,
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
        // Anything other than "Bearer <token>" counts as no credentials
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_bearer)
            .map(str::to_string);

        let service = self.service.clone();
        let authenticator = self.authenticator.clone();
        let mode = self.mode;

        Box::pin(async move {
            let claims = authenticator.authenticate(token.as_deref(), mode).await?;

            tracing::debug!(
                user_id = %claims.subject.id,
                email = %claims.subject.email,
                path = %req.path(),
                "JWT validated successfully"
            );

            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
