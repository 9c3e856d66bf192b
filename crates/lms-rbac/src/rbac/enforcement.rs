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

//! Request gates for privileged handlers
//!
//! Each gate reads the [`Identity`] placed in the request extensions by the
//! authentication layer and rejects with a JSON body before the wrapped
//! service runs. Permission gates go through the evaluator, checking against
//! the [`TargetResource`] extension when the router supplies one; role gates
//! compare literal role codes of the user's current assignments.

use crate::auth::{Identity, User};
use crate::rbac::evaluator::{CheckContext, PermissionEvaluator};
use crate::rbac::middleware::{RequestAuthorization, request_info};
use crate::resources::ScopableResource;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Request, Response, StatusCode};
use metrics::counter;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{error, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Identifier of the resource a request targets, set by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceId(pub u64);

/// Resource a request acts on, set by the router or a loader layer.
///
/// Permission gates check against it so scoped assignments can apply.
#[derive(Clone)]
pub struct TargetResource(pub Arc<dyn ScopableResource + Send + Sync>);

impl TargetResource {
    pub fn new(resource: impl ScopableResource + Send + Sync + 'static) -> Self {
        Self(Arc::new(resource))
    }

    pub fn resource(&self) -> &dyn ScopableResource {
        self.0.as_ref()
    }
}

impl fmt::Debug for TargetResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetResource")
            .field("resource_type", &self.0.resource_type())
            .field("resource_id", &self.0.resource_id())
            .finish()
    }
}

/// Why a gate rejected a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    /// ALL semantics: the permissions the user lacks
    MissingPermissions(Vec<String>),
    /// ANY semantics: none held, every required permission listed
    RequiredPermissions(Vec<String>),
    MissingRoles(Vec<String>),
    RequiredRoles(Vec<String>),
    ResourceIdRequired,
    AccessDenied { resource_type: String, action: String, resource_id: u64 },
}

impl Denial {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Denial::Unauthenticated => StatusCode::UNAUTHORIZED,
            Denial::ResourceIdRequired => StatusCode::BAD_REQUEST,
            _ => StatusCode::FORBIDDEN,
        }
    }

    /// Label used for the rejection counter
    pub fn kind(&self) -> &'static str {
        match self {
            Denial::Unauthenticated => "unauthenticated",
            Denial::MissingPermissions(_) | Denial::RequiredPermissions(_) => "permissions",
            Denial::MissingRoles(_) | Denial::RequiredRoles(_) => "roles",
            Denial::ResourceIdRequired => "resource_id_required",
            Denial::AccessDenied { .. } => "scope_permission",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            Denial::Unauthenticated => json!({ "error": "Authentication required" }),
            Denial::MissingPermissions(missing) => json!({ "error": "Insufficient permissions", "missing_permissions": missing }),
            Denial::RequiredPermissions(required) => json!({ "error": "Insufficient permissions", "required_permissions": required }),
            Denial::MissingRoles(missing) => json!({ "error": "Insufficient roles", "missing_roles": missing }),
            Denial::RequiredRoles(required) => json!({ "error": "Insufficient roles", "required_roles": required }),
            Denial::ResourceIdRequired => json!({ "error": "Resource ID required" }),
            Denial::AccessDenied {
                resource_type,
                action,
                resource_id,
            } => json!({
                "error": "Access denied",
                "resource_type": resource_type,
                "action": action,
                "resource_id": resource_id,
            }),
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.body().to_string())));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// What a gate demands of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permissions { codenames: Vec<String>, require_all: bool },
    Roles { codes: Vec<String>, require_all: bool },
    ScopePermission { resource_type: String, action: String },
}

impl Requirement {
    /// Decide whether the request may proceed
    pub fn authorize<B>(&self, evaluator: &PermissionEvaluator, req: &Request<B>) -> Result<(), Denial> {
        let Some(user) = req.extensions().get::<Identity>().and_then(Identity::user) else {
            return Err(Denial::Unauthenticated);
        };
        let request = request_info(req);
        let target = req.extensions().get::<TargetResource>();

        match self {
            Requirement::Permissions { codenames, require_all } => {
                let context = CheckContext {
                    resource: target.map(TargetResource::resource),
                    scope: None,
                    request: Some(&request),
                };
                authorize_permissions(evaluator, user, context, codenames, *require_all)
            }
            Requirement::Roles { codes, require_all } => {
                let held = match req.extensions().get::<RequestAuthorization>() {
                    Some(authorization) => authorization.role_codes.clone(),
                    None => evaluator.current_role_codes(user).unwrap_or_else(|err| {
                        error!(user_id = %user.id, error = %err, "Failed to resolve role codes");
                        BTreeSet::new()
                    }),
                };
                authorize_roles(&held, codes, *require_all)
            }
            Requirement::ScopePermission { resource_type, action } => {
                let resource_id = req
                    .extensions()
                    .get::<ResourceId>()
                    .map(|id| id.0)
                    .or_else(|| target.and_then(|t| t.resource().resource_id()))
                    .or_else(|| trailing_id(req.uri().path()));
                let Some(resource_id) = resource_id else {
                    return Err(Denial::ResourceIdRequired);
                };

                if evaluator.check_scope_permission_for_request(Some(user), action, resource_type, Some(resource_id), Some(&request)) {
                    Ok(())
                } else {
                    Err(Denial::AccessDenied {
                        resource_type: resource_type.clone(),
                        action: action.clone(),
                        resource_id,
                    })
                }
            }
        }
    }
}

fn authorize_permissions(evaluator: &PermissionEvaluator, user: &User, context: CheckContext<'_>, codenames: &[String], require_all: bool) -> Result<(), Denial> {
    // Every codename is evaluated so the audit trail and the missing list are complete
    let results: Vec<(&String, bool)> = codenames.iter().map(|codename| (codename, evaluator.check(Some(user), codename, context))).collect();

    if require_all {
        let missing: Vec<String> = results.iter().filter(|(_, granted)| !granted).map(|(codename, _)| (*codename).clone()).collect();
        if missing.is_empty() { Ok(()) } else { Err(Denial::MissingPermissions(missing)) }
    } else if results.iter().any(|(_, granted)| *granted) {
        Ok(())
    } else {
        Err(Denial::RequiredPermissions(codenames.to_vec()))
    }
}

fn authorize_roles(held: &BTreeSet<String>, codes: &[String], require_all: bool) -> Result<(), Denial> {
    if require_all {
        let missing: Vec<String> = codes.iter().filter(|code| !held.contains(*code)).cloned().collect();
        if missing.is_empty() { Ok(()) } else { Err(Denial::MissingRoles(missing)) }
    } else if codes.iter().any(|code| held.contains(code)) {
        Ok(())
    } else {
        Err(Denial::RequiredRoles(codes.to_vec()))
    }
}

/// Last numeric path segment, e.g. `/api/v1/courses/12/` gives 12
fn trailing_id(path: &str) -> Option<u64> {
    path.rsplit('/').find(|segment| !segment.is_empty()).and_then(|segment| segment.parse().ok())
}

/// Layer that gates the wrapped service behind a [`Requirement`]
#[derive(Clone)]
pub struct EnforcementLayer {
    evaluator: Arc<PermissionEvaluator>,
    requirement: Requirement,
}

impl EnforcementLayer {
    pub fn new(evaluator: Arc<PermissionEvaluator>, requirement: Requirement) -> Self {
        Self { evaluator, requirement }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }
}

/// Require permission codenames; ALL when `require_all`, otherwise ANY
pub fn require_permissions<I, P>(evaluator: Arc<PermissionEvaluator>, permissions: I, require_all: bool) -> EnforcementLayer
where
    I: IntoIterator<Item = P>,
    P: Into<String>,
{
    EnforcementLayer::new(
        evaluator,
        Requirement::Permissions {
            codenames: permissions.into_iter().map(Into::into).collect(),
            require_all,
        },
    )
}

/// Require role codes; ALL when `require_all`, otherwise ANY
pub fn require_roles<I, R>(evaluator: Arc<PermissionEvaluator>, roles: I, require_all: bool) -> EnforcementLayer
where
    I: IntoIterator<Item = R>,
    R: Into<String>,
{
    EnforcementLayer::new(
        evaluator,
        Requirement::Roles {
            codes: roles.into_iter().map(Into::into).collect(),
            require_all,
        },
    )
}

/// Require `{action}_{resource_type}` on the resource id carried by the request
pub fn require_scope_permission(evaluator: Arc<PermissionEvaluator>, resource_type: impl Into<String>, action: impl Into<String>) -> EnforcementLayer {
    EnforcementLayer::new(
        evaluator,
        Requirement::ScopePermission {
            resource_type: resource_type.into(),
            action: action.into(),
        },
    )
}

impl<S> Layer<S> for EnforcementLayer {
    type Service = EnforcementService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EnforcementService {
            inner,
            evaluator: self.evaluator.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

/// Service produced by [`EnforcementLayer`]
#[derive(Clone)]
pub struct EnforcementService<S> {
    inner: S,
    evaluator: Arc<PermissionEvaluator>,
    requirement: Requirement,
}

impl<S, B> Service<Request<B>> for EnforcementService<S>
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

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let outcome = self.requirement.authorize(&self.evaluator, &req);
        let mut inner = self.inner.clone();

        if let Err(denial) = &outcome {
            warn!(
                method = %req.method(),
                path = %req.uri().path(),
                kind = denial.kind(),
                status = denial.status_code().as_u16(),
                "Request rejected"
            );
            counter!("rbac_enforcement_rejections_total", 1, "kind" => denial.kind());
        }

        Box::pin(async move {
            match outcome {
                Ok(()) => inner.call(req).await.map_err(Into::into),
                Err(denial) => Ok(denial.into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::audit::{AuditLog, AuditResult};
    use crate::rbac::assignments::{ScopeObject, ScopeType};
    use crate::rbac::evaluator::AssignOptions;
    use crate::resources::ResourceRef;
    use crate::rbac::store::{InMemoryPolicyStore, PolicyStore};
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use tower::{ServiceExt, service_fn};

    struct Fixture {
        evaluator: Arc<PermissionEvaluator>,
        audit: Arc<AuditLog>,
        faculty: User,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryPolicyStore::new());
        let audit = Arc::new(AuditLog::new());
        let evaluator = Arc::new(PermissionEvaluator::new(store.clone(), audit.clone()));
        evaluator.seed_defaults().unwrap();

        let faculty = User::new(1, "prof");
        let role = store.role_by_code("FACULTY").unwrap().unwrap();
        evaluator.assign_role_to_user(&faculty, &role, AssignOptions::default()).unwrap();

        Fixture { evaluator, audit, faculty }
    }

    fn request(path: &str, identity: Option<&User>) -> Request<()> {
        let mut builder = Request::builder().uri(path).header("x-forwarded-for", "198.51.100.4, 10.0.0.1");
        if let Some(user) = identity {
            builder = builder.extension(Identity::from(user.clone()));
        }
        builder.body(()).unwrap()
    }

    async fn call(layer: EnforcementLayer, req: Request<()>) -> (StatusCode, serde_json::Value) {
        let service = layer.layer(service_fn(|_req: Request<()>| async { Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"{\"ok\":true}")))) }));

        let response = service.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unauthenticated_rejected() {
        let f = fixture();
        let layer = require_permissions(f.evaluator.clone(), ["can_view_courses"], true);

        let (status, body) = call(layer, request("/api/v1/courses/", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Authentication required" }));
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_require_all_lists_missing() {
        let f = fixture();
        let layer = require_permissions(f.evaluator.clone(), ["can_grade_assignments", "can_manage_roles", "can_delete_users"], true);

        let (status, body) = call(layer, request("/api/v1/grades/", Some(&f.faculty))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["missing_permissions"], json!(["can_manage_roles", "can_delete_users"]));

        // One audit record per evaluated codename, with request metadata
        let entries = f.audit.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(entries[0].request_path, "/api/v1/grades/");
    }

    #[tokio::test]
    async fn test_require_any() {
        let f = fixture();

        let layer = require_permissions(f.evaluator.clone(), ["can_manage_roles", "can_grade_assignments"], false);
        let (status, _) = call(layer, request("/api/v1/grades/", Some(&f.faculty))).await;
        assert_eq!(status, StatusCode::OK);

        let layer = require_permissions(f.evaluator.clone(), ["can_manage_roles", "can_delete_users"], false);
        let (status, body) = call(layer, request("/api/v1/grades/", Some(&f.faculty))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["required_permissions"], json!(["can_manage_roles", "can_delete_users"]));
    }

    #[tokio::test]
    async fn test_roles_compare_literal_codes() {
        let f = fixture();
        let store = f.evaluator.store();
        let faculty_role = store.role_by_code("FACULTY").unwrap().unwrap();
        let ta_role = f
            .evaluator
            .create_role(crate::rbac::roles::Role::new("TA", "Teaching Assistant", "").with_parent(faculty_role.id))
            .unwrap();
        let ta = User::new(2, "assistant");
        f.evaluator.assign_role_to_user(&ta, &ta_role, AssignOptions::default()).unwrap();

        let (status, body) = call(require_roles(f.evaluator.clone(), ["FACULTY"], true), request("/api/v1/x/", Some(&ta))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": "Insufficient roles", "missing_roles": ["FACULTY"] }));

        let (status, _) = call(require_roles(f.evaluator.clone(), ["ADMIN", "FACULTY"], false), request("/api/v1/x/", Some(&f.faculty))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(require_roles(f.evaluator.clone(), ["ADMIN", "PARENT"], false), request("/api/v1/x/", Some(&f.faculty))).await;
        assert_eq!(body["required_roles"], json!(["ADMIN", "PARENT"]));
    }

    #[tokio::test]
    async fn test_scope_permission_gate() {
        let f = fixture();
        let layer = require_scope_permission(f.evaluator.clone(), "Course", "read");

        let (status, body) = call(layer.clone(), request("/api/v1/courses/", Some(&f.faculty))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Resource ID required" }));

        let (status, body) = call(layer, request("/api/v1/courses/12/", Some(&f.faculty))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({ "error": "Access denied", "resource_type": "Course", "action": "read", "resource_id": 12 })
        );

        // read_course is not a registered codename
        let entry = &f.audit.entries()[0];
        assert_eq!(entry.permission, "read_course");
        assert_eq!(entry.result, AuditResult::Error);
        assert_eq!(entry.resource_id, Some(12));
    }

    #[tokio::test]
    async fn test_resource_id_extension_preferred() {
        let f = fixture();
        let layer = require_scope_permission(f.evaluator.clone(), "Course", "read");

        let mut req = request("/api/v1/courses/current/", Some(&f.faculty));
        req.extensions_mut().insert(ResourceId(5));

        let (_, body) = call(layer, req).await;
        assert_eq!(body["resource_id"], 5);
    }

    #[tokio::test]
    async fn test_department_scoped_user_passes_with_target_resource() {
        let f = fixture();
        let role = f.evaluator.store().role_by_code("FACULTY").unwrap().unwrap();
        let lecturer = User::new(3, "lecturer");
        f.evaluator
            .assign_role_to_user(&lecturer, &role, AssignOptions::scoped(ScopeType::Department, ScopeObject::new("department", 1)))
            .unwrap();
        let layer = require_permissions(f.evaluator.clone(), ["can_grade_assignments"], true);

        let mut req = request("/api/v1/courses/8/grades/", Some(&lecturer));
        req.extensions_mut().insert(TargetResource::new(ResourceRef::new("Course", Some(8)).in_department(1)));
        let (status, _) = call(layer.clone(), req).await;
        assert_eq!(status, StatusCode::OK);

        let mut req = request("/api/v1/courses/9/grades/", Some(&lecturer));
        req.extensions_mut().insert(TargetResource::new(ResourceRef::new("Course", Some(9)).in_department(2)));
        let (status, _) = call(layer.clone(), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(layer, request("/api/v1/courses/8/grades/", Some(&lecturer))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let granted = f.audit.entries().into_iter().find(|e| e.result == AuditResult::Granted && e.username.as_deref() == Some("lecturer")).unwrap();
        assert_eq!(granted.resource_type, "Course");
        assert_eq!(granted.resource_id, Some(8));
    }

    #[tokio::test]
    async fn test_scope_gate_reads_target_resource_id() {
        let f = fixture();
        let layer = require_scope_permission(f.evaluator.clone(), "Course", "read");

        let mut req = request("/api/v1/courses/current/", Some(&f.faculty));
        req.extensions_mut().insert(TargetResource::new(ResourceRef::new("Course", Some(14))));

        let (_, body) = call(layer, req).await;
        assert_eq!(body["resource_id"], 14);
    }

    #[test]
    fn test_trailing_id() {
        assert_eq!(trailing_id("/api/v1/courses/12/"), Some(12));
        assert_eq!(trailing_id("/api/v1/courses/12"), Some(12));
        assert_eq!(trailing_id("/api/v1/courses/"), None);
    }
}
