#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request};
use chrono::Utc;
use gatekeeper::app::{AppState, build_router};
use gatekeeper::auth::extract::SSL_CLIENT_DN;
use gatekeeper::config::AuthConfig;
use gatekeeper::model::{Tenant, TenantQuota, TenantUser};
use gatekeeper::observability::RecordingObserver;
use gatekeeper::store::IdentityStore;
use gatekeeper::store::memory::InMemoryStore;
use gatekeeper_authz::predefined;
use std::sync::Arc;

pub const ALICE_DN: &str = "CN=alice,O=Acme";
pub const ROOT_DN: &str = "CN=root,O=Platform";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn IdentityStore>,
    pub observer: Arc<RecordingObserver>,
}

pub fn app_with(store: Arc<dyn IdentityStore>, auth: AuthConfig) -> TestApp {
    let observer = Arc::new(RecordingObserver::new());
    let state = AppState::new(store.clone(), auth, observer.clone()).expect("state");
    TestApp {
        router: build_router(state),
        store,
        observer,
    }
}

/// Memory store seeded with the predefined roles, tenants `acme` and
/// `platform`, and one user per listed `(id, tenant, subject, role name)`.
pub async fn seeded_store(users: &[(&str, &str, &str, &str)]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::default());
    store.initialize_default_roles().await.expect("roles");
    for id in ["acme", "platform", "globex"] {
        let mut tenant = Tenant::new(id, id.to_uppercase(), Utc::now());
        tenant.quota = TenantQuota {
            max_users: 10,
            ..TenantQuota::default()
        };
        store.create_tenant(tenant).await.expect("tenant");
    }
    for (id, tenant_id, subject, role) in users {
        store
            .create_user(user(id, tenant_id, subject, &predefined::role_id(role)))
            .await
            .expect("user");
    }
    store
}

pub fn user(id: &str, tenant_id: &str, subject: &str, role_id: &str) -> TenantUser {
    let now = Utc::now();
    TenantUser {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        subject: subject.to_string(),
        common_name: id.to_string(),
        email: None,
        role_id: role_id.to_string(),
        is_active: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// `alice` is a tenant admin of `acme`, `root` a platform admin.
pub async fn standard_app() -> TestApp {
    let store = seeded_store(&[
        ("alice", "acme", ALICE_DN, predefined::TENANT_ADMIN),
        ("root", "platform", ROOT_DN, predefined::PLATFORM_ADMIN),
    ])
    .await;
    app_with(store, AuthConfig::default())
}

pub fn request(method: Method, uri: &str, subject: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(subject) = subject {
        builder = builder.header(SSL_CLIENT_DN, subject);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn json_request(
    method: Method,
    uri: &str,
    subject: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(subject) = subject {
        builder = builder.header(SSL_CLIENT_DN, subject);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}
