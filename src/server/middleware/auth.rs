//! Operator JWT middleware: gates every route it wraps behind a valid
//! `Authorization: Bearer <token>` header, verified against
//! [`crate::auth::OperatorAuth`] (spec section 4.4).

use std::future::{ready, Future, Ready};
use std::pin::Pin;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::web;
use tracing::warn;

use crate::auth::OperatorAuth;
use crate::server::state::AppState;
use crate::utils::error::GatewayError;

pub struct OperatorJwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for OperatorJwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = OperatorJwtMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(OperatorJwtMiddlewareService { service }))
    }
}

pub struct OperatorJwtMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for OperatorJwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verified = (|| {
            let auth = req.app_data::<web::Data<AppState>>()?.operator_auth.clone();
            let token = req.headers().get("authorization")?.to_str().ok()?;
            let token = OperatorAuth::extract_bearer(token)?;
            auth.verify(token).ok()
        })();

        match verified {
            Some(_claims) => Box::pin(self.service.call(req)),
            None => {
                warn!(path = %req.path(), "rejected operator request without a valid token");
                Box::pin(async { Err(GatewayError::unauthorized("missing or invalid operator token").into()) })
            }
        }
    }
}
