use actix_session::SessionExt;
use actix_web::body::EitherBody;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web,
};
use futures::future::{LocalBoxFuture, Ready, ok};
use serde_json::json;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::{debug, info, instrument};

use crate::auth::AuthService;

/// Session key under which the cookie session carries the bearer token.
pub const SESSION_TOKEN_KEY: &str = "token";

fn is_public(path: &str) -> bool {
    path == "/health" || path == "/assets/image-hosts" || path.starts_with("/auth")
}

/// Resolves the session token for a request: `Authorization: Bearer` wins,
/// the cookie session is the browser fallback.
fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        if let Ok(raw) = value.to_str() {
            if let Some(token) = raw.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    req.get_session().get::<String>(SESSION_TOKEN_KEY).ok()?
}

pub struct SessionAuth;

impl SessionAuth {
    pub fn new() -> Self {
        SessionAuth
    }
}

impl Default for SessionAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SessionAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionAuthService {
            service: Rc::new(service),
        })
    }
}

pub struct SessionAuthService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    #[instrument(name = "session_auth", skip(self, req), fields(path = %req.path(), method = %req.method()))]
    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.path().to_owned();
        let service = Rc::clone(&self.service);

        if is_public(&path) {
            debug!("allowing access to public endpoint");
            let fut = service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        let identity = extract_token(&req).and_then(|token| {
            req.app_data::<web::Data<AuthService>>()
                .and_then(|auth| auth.authenticate(&token).ok())
        });

        match identity {
            Some(identity) => {
                debug!(identity = %identity.id, "authenticated request");
                req.extensions_mut().insert(identity);
                let fut = service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_left_body())
                })
            }
            None => {
                info!("unauthenticated access attempt to {}", path);
                let (request, _) = req.into_parts();
                let response =
                    HttpResponse::Unauthorized().json(json!({ "error": "invalid session" }));
                Box::pin(async move {
                    Ok(ServiceResponse::new(request, response).map_into_right_body())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_and_auth_routes_are_public() {
        assert!(is_public("/health"));
        assert!(is_public("/auth/otp/request"));
        assert!(is_public("/auth/github/callback"));
        assert!(is_public("/assets/image-hosts"));
        assert!(!is_public("/admin/grant"));
        assert!(!is_public("/"));
    }
}
