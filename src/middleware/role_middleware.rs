/// Role Authorization Middleware
///
/// Must sit inside a `JwtMiddleware` (wrapped before it). Loads the
/// principal named by the token's subject, checks its role against the
/// gate and injects the `Principal` into request extensions.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{Claims, RoleGate};
use crate::error::{AppError, AuthError};
use crate::principals::PrincipalStore;

pub struct RoleMiddleware {
    gate: RoleGate,
    principals: Arc<dyn PrincipalStore>,
}

impl RoleMiddleware {
    pub fn new(gate: RoleGate, principals: Arc<dyn PrincipalStore>) -> Self {
        Self { gate, principals }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoleMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RoleMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RoleMiddlewareService {
            service: Rc::new(service),
            gate: Rc::new(self.gate.clone()),
            principals: self.principals.clone(),
        }))
    }
}

pub struct RoleMiddlewareService<S> {
    service: Rc<S>,
    gate: Rc<RoleGate>,
    principals: Arc<dyn PrincipalStore>,
}

impl<S, B> Service<ServiceRequest> for RoleMiddlewareService<S>
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
        let claims = req.extensions().get::<Claims>().cloned();

        let service = self.service.clone();
        let gate = self.gate.clone();
        let principals = self.principals.clone();

        Box::pin(async move {
            let claims = claims.ok_or_else(|| {
                tracing::error!("RoleMiddleware reached without authenticated claims");
                AppError::Auth(AuthError::MissingCredentials)
            })?;

            // A token can outlive its account
            let principal = principals
                .find_by_id(claims.subject.id)
                .await?
                .ok_or(AppError::Auth(AuthError::InvalidToken))?;

            gate.require(&principal).map_err(AppError::Auth)?;

            req.extensions_mut().insert(principal);
            service.call(req).await
        })
    }
}
