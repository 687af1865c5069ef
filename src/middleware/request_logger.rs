//! Request logging middleware.
//!
//! One line per finished request, tagged with the route family, the
//! session user and, for generation calls, the job the handler acted on.
//! The session user comes from a signature check on the session cookie
//! only; the store is not consulted. Cookie values are never logged.

use std::future::{Ready, ready};
use std::time::Instant;

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::{Error, HttpRequest, web};
use futures_util::future::LocalBoxFuture;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, SESSION_COOKIE, SessionSettings};
use crate::services::session;

/// Response extension naming the generation job a handler acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTag(pub String);

/// Coarse route family used to tag log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Login,
    Callback,
    Session,
    Generation,
    Health,
    Docs,
    Other,
}

impl RouteKind {
    pub fn classify(path: &str) -> Self {
        match path {
            "/auth/me" | "/auth/refresh" | "/auth/logout" => Self::Session,
            "/api/v1/health" | "/api/v1/ready" => Self::Health,
            "/api/v1/openapi.json" => Self::Docs,
            p if p.starts_with("/auth/") && p.ends_with("/callback") => Self::Callback,
            p if p.starts_with("/auth/") => Self::Login,
            p if p.starts_with("/api/v1/generations") => Self::Generation,
            p if p.starts_with("/swagger-ui") => Self::Docs,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Callback => "callback",
            Self::Session => "session",
            Self::Generation => "generation",
            Self::Health => "health",
            Self::Docs => "docs",
            Self::Other => "other",
        }
    }
}

/// User id from a validly signed session cookie, if any.
fn session_user_id(req: &HttpRequest, settings: &SessionSettings) -> Option<Uuid> {
    let cookie = req.cookie(SESSION_COOKIE)?;
    session::verify(cookie.value(), settings).ok()
}

/// Request logger middleware factory.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware { service }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let route = RouteKind::classify(&path);
        let user_id = req
            .app_data::<web::Data<Config>>()
            .and_then(|config| session_user_id(req.request(), &config.session));

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let status = res.status().as_u16();
            let duration_ms = start.elapsed().as_millis() as u64;
            let user = user_id.map(|id| id.to_string());
            let user = user.as_deref().unwrap_or("-");
            let job = res.response().extensions().get::<JobTag>().cloned();
            let job = job.as_ref().map(|t| t.0.as_str()).unwrap_or("-");
            let is_health_check = route == RouteKind::Health;
            let route = route.as_str();

            if res.status().is_server_error() {
                error!(target: "api", %method, %path, route, user, job, status, duration_ms, "Request failed");
            } else if res.status().is_client_error() {
                warn!(target: "api", %method, %path, route, user, job, status, duration_ms, "Request rejected");
            } else if is_health_check {
                debug!(target: "api", %method, %path, status, duration_ms, "Health check");
            } else {
                info!(target: "api", %method, %path, route, user, job, status, duration_ms, "Request completed");
            }

            Ok(res)
        })
    }
}
