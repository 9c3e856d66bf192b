// LMS RBAC
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Request annotation middleware

use crate::auth::{Identity, User};
use crate::config::RbacConfig;
use crate::rbac::enforcement::BoxError;
use crate::rbac::evaluator::{PermissionEvaluator, RequestInfo};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, error, info, warn};

/// Permissions and roles resolved once per request.
///
/// Downstream handlers and gates read this from the request extensions
/// instead of re-resolving it. It never outlives the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAuthorization {
    pub permissions: BTreeSet<String>,
    /// Literal codes of current assignments
    pub role_codes: BTreeSet<String>,
    /// Current codes plus inherited ancestor codes
    pub effective_role_codes: BTreeSet<String>,
}

impl RequestAuthorization {
    /// Resolve the authorization view of a user
    pub fn resolve(evaluator: &PermissionEvaluator, user: &User) -> Self {
        let role_codes = evaluator.current_role_codes(user).unwrap_or_else(|err| {
            error!(user_id = %user.id, error = %err, "Failed to resolve role codes");
            BTreeSet::new()
        });
        let effective_role_codes = evaluator.effective_role_codes(user).unwrap_or_else(|err| {
            error!(user_id = %user.id, error = %err, "Failed to resolve inherited role codes");
            role_codes.clone()
        });

        Self {
            permissions: evaluator.get_user_permissions(Some(user), None),
            role_codes,
            effective_role_codes,
        }
    }
}

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

/// Middleware that annotates authenticated API requests with their
/// [`RequestAuthorization`], logs them and decorates the response headers
#[derive(Clone)]
pub struct PermissionContextMiddleware<S> {
    inner: S,
    evaluator: Arc<PermissionEvaluator>,
    config: Arc<RbacConfig>,
}

impl<S, B> Service<Request<B>> for PermissionContextMiddleware<S>
where
    S: Service<Request<B>, Response = Response<Full<Bytes>>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Send + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();
        let path = req.uri().path().to_string();

        if config.is_skipped(&path) || !config.is_api_path(&path) {
            return Box::pin(async move { inner.call(req).await.map_err(Into::into) });
        }

        let method = req.method().clone();
        let identity = req.extensions().get::<Identity>().cloned().unwrap_or_default();
        if !identity.is_authenticated() {
            debug!(method = %method, path = %path, "Anonymous API request");
        }
        let user = identity.user().cloned();

        let authorization = user.as_ref().map(|user| {
            let authorization = RequestAuthorization::resolve(&self.evaluator, user);
            info!(method = %method, path = %path, user = %user.username, "API request");
            authorization
        });
        if let Some(authorization) = &authorization {
            req.extensions_mut().insert(authorization.clone());
        }

        Box::pin(async move {
            let mut response = inner.call(req).await.map_err(Into::<BoxError>::into)?;

            if let Some(user) = &user {
                let status = response.status();
                if status.as_u16() >= 400 {
                    warn!(method = %method, path = %path, status = status.as_u16(), user = %user.username, "API error");
                } else {
                    info!(method = %method, path = %path, status = status.as_u16(), user = %user.username, "API success");
                }
            }

            let headers = response.headers_mut();
            if config.security_headers {
                apply_security_headers(headers);
            }
            if config.expose_headers {
                if let Some(authorization) = &authorization {
                    apply_authorization_headers(headers, authorization);
                }
            }

            Ok(response)
        })
    }
}

fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
}

fn apply_authorization_headers(headers: &mut HeaderMap, authorization: &RequestAuthorization) {
    headers.insert(HeaderName::from_static("x-user-permissions-count"), HeaderValue::from(authorization.permissions.len()));

    let roles = authorization.effective_role_codes.iter().cloned().collect::<Vec<_>>().join(",");
    match HeaderValue::from_str(&roles) {
        Ok(value) => {
            headers.insert(HeaderName::from_static("x-user-roles"), value);
        }
        Err(err) => warn!(roles = %roles, error = %err, "Role codes are not a valid header value"),
    }
}

/// Layer for [`PermissionContextMiddleware`]
#[derive(Clone)]
pub struct PermissionContextLayer {
    evaluator: Arc<PermissionEvaluator>,
    config: Arc<RbacConfig>,
}

impl PermissionContextLayer {
    /// Create a layer using the evaluator's configuration
    pub fn new(evaluator: Arc<PermissionEvaluator>) -> Self {
        let config = Arc::new(evaluator.config().clone());
        Self { evaluator, config }
    }

    pub fn with_config(mut self, config: RbacConfig) -> Self {
        self.config = Arc::new(config);
        self
    }
}

impl<S> Layer<S> for PermissionContextLayer {
    type Service = PermissionContextMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PermissionContextMiddleware {
            inner,
            evaluator: self.evaluator.clone(),
            config: self.config.clone(),
        }
    }
}

/// Client details of a request for audit entries
pub fn request_info<B>(req: &Request<B>) -> RequestInfo {
    RequestInfo {
        ip_address: extract_client_ip(req),
        user_agent: extract_user_agent(req).unwrap_or_default(),
        path: req.uri().path().to_string(),
    }
}

/// Extract client IP from request
fn extract_client_ip<B>(req: &Request<B>) -> Option<String> {
    // First hop of X-Forwarded-For wins
    if let Some(forwarded) = req.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }

    req.headers().get("x-real-ip").and_then(|v| v.to_str().ok()).map(|ip| ip.trim().to_string())
}

/// Extract user agent from request
fn extract_user_agent<B>(req: &Request<B>) -> Option<String> {
    req.headers().get("user-agent").and_then(|ua| ua.to_str().ok()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::audit::AuditLog;
    use crate::rbac::evaluator::AssignOptions;
    use crate::rbac::roles::Role;
    use crate::rbac::store::{InMemoryPolicyStore, PolicyStore};
    use std::convert::Infallible;
    use tower::{ServiceExt, service_fn};

    fn evaluator() -> Arc<PermissionEvaluator> {
        let store = Arc::new(InMemoryPolicyStore::new());
        let evaluator = Arc::new(PermissionEvaluator::new(store, Arc::new(AuditLog::new())));
        evaluator.seed_defaults().unwrap();
        evaluator
    }

    /// Echoes the annotated permission count in the body
    async fn echo(req: Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
        let count = req.extensions().get::<RequestAuthorization>().map(|a| a.permissions.len().to_string()).unwrap_or_else(|| "none".to_string());
        Ok(Response::new(Full::new(Bytes::from(count))))
    }

    fn request(path: &str, user: Option<&User>) -> Request<()> {
        let mut builder = Request::builder().uri(path);
        if let Some(user) = user {
            builder = builder.extension(Identity::from(user.clone()));
        }
        builder.body(()).unwrap()
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_annotates_api_requests() {
        let evaluator = evaluator();
        let user = User::new(1, "prof");
        let faculty = evaluator.store().role_by_code("FACULTY").unwrap().unwrap();
        let ta = evaluator.create_role(Role::new("TA", "Teaching Assistant", "").with_parent(faculty.id)).unwrap();
        evaluator.assign_role_to_user(&user, &ta, AssignOptions::default()).unwrap();

        let service = PermissionContextLayer::new(evaluator.clone()).layer(service_fn(echo));
        let response = service.oneshot(request("/api/v1/courses/", Some(&user))).await.unwrap();

        assert_eq!(response.headers()["x-user-permissions-count"], "9");
        assert_eq!(response.headers()["x-user-roles"], "FACULTY,TA");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["referrer-policy"], "strict-origin-when-cross-origin");
        assert_eq!(body_text(response).await, "9");
    }

    #[tokio::test]
    async fn test_skipped_and_non_api_paths_pass_through() {
        let evaluator = evaluator();
        let user = User::new(1, "prof");

        for path in ["/api/v1/users/auth/login/", "/static/app.js", "/dashboard"] {
            let service = PermissionContextLayer::new(evaluator.clone()).layer(service_fn(echo));
            let response = service.oneshot(request(path, Some(&user))).await.unwrap();

            assert!(response.headers().get("x-content-type-options").is_none());
            assert_eq!(body_text(response).await, "none");
        }
    }

    #[tokio::test]
    async fn test_anonymous_gets_security_headers_only() {
        let service = PermissionContextLayer::new(evaluator()).layer(service_fn(echo));
        let response = service.oneshot(request("/api/v1/courses/", None)).await.unwrap();

        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert!(response.headers().get("x-user-roles").is_none());
        assert_eq!(body_text(response).await, "none");
    }

    #[tokio::test]
    async fn test_headers_can_be_disabled() {
        let config = RbacConfig {
            expose_headers: false,
            security_headers: false,
            ..RbacConfig::default()
        };
        let evaluator = evaluator();
        let service = PermissionContextLayer::new(evaluator).with_config(config).layer(service_fn(echo));
        let response = service.oneshot(request("/api/v1/courses/", Some(&User::new(3, "student")))).await.unwrap();

        assert!(response.headers().get("x-user-permissions-count").is_none());
        assert!(response.headers().get("x-xss-protection").is_none());
        assert_eq!(body_text(response).await, "0");
    }

    #[test]
    fn test_extract_client_ip() {
        let req = Request::builder().header("x-forwarded-for", "192.168.1.1, 10.0.0.1").body(()).unwrap();
        assert_eq!(extract_client_ip(&req), Some("192.168.1.1".to_string()));

        let req = Request::builder().header("x-real-ip", "10.1.1.1").body(()).unwrap();
        assert_eq!(extract_client_ip(&req), Some("10.1.1.1".to_string()));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(extract_client_ip(&req), None);
    }

    #[test]
    fn test_request_info() {
        let req = Request::builder().uri("/api/v1/courses/3/").header("user-agent", "Mozilla/5.0 Test Browser").body(()).unwrap();

        let info = request_info(&req);
        assert_eq!(info.user_agent, "Mozilla/5.0 Test Browser");
        assert_eq!(info.path, "/api/v1/courses/3/");
        assert_eq!(info.ip_address, None);
    }
}
