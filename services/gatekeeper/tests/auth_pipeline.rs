mod common;

use axum::http::{Method, StatusCode};
use common::{ALICE_DN, app_with, read_json, request, seeded_store, standard_app};
use gatekeeper::auth::REQUEST_ID_HEADER;
use gatekeeper::auth::extract::FORWARDED_CLIENT_CERT;
use gatekeeper::config::AuthConfig;
use gatekeeper::model::{AuditEventType, Role, TenantStatus, TenantUpdate, UserUpdate};
use gatekeeper::observability::Observation;
use gatekeeper::store::testing::{Fault, FaultyStore};
use gatekeeper::store::{IdentityStore, ListOptions};
use gatekeeper_authz::predefined;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn auth_failures(store: &dyn IdentityStore) -> Vec<gatekeeper::model::AuditEvent> {
    store
        .list_events_by_type(AuditEventType::AuthFailure, ListOptions::default())
        .await
        .expect("events")
}

#[tokio::test]
async fn skip_paths_pass_without_certificate() {
    let app = standard_app().await;
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/healthz", None))
        .await
        .expect("healthz");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
    assert_eq!(app.observer.auth_reasons(), vec!["skip_path"]);
}

#[tokio::test]
async fn missing_certificate_is_unauthorized_with_request_id() {
    let app = standard_app().await;
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", None))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let header = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .expect("request id header");
    let body = read_json(response).await;
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["message"], "client certificate required");
    assert_eq!(body["code"], 401);
    assert_eq!(body["request_id"], header.as_str());
    assert!(auth_failures(app.store.as_ref()).await.is_empty());
}

#[tokio::test]
async fn authenticated_caller_reaches_handler() {
    let app = standard_app().await;
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some("O=Acme, CN=alice")))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["user"]["user_id"], "alice");
    assert_eq!(body["user"]["tenant_id"], "acme");
    assert_eq!(body["user"]["subject"], ALICE_DN);
    assert_eq!(body["user"]["is_platform_admin"], false);
    assert_eq!(body["tenant"]["id"], "acme");
    assert_eq!(app.observer.auth_reasons(), vec!["authenticated"]);
}

#[tokio::test]
async fn last_login_is_refreshed_after_authentication() {
    let app = standard_app().await;
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::OK);

    let mut refreshed = false;
    for _ in 0..50 {
        if app.store.get_user("alice").await.expect("user").last_login_at.is_some() {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refreshed, "last login was not recorded");
}

#[tokio::test]
async fn forwarded_client_cert_header_authenticates() {
    let app = standard_app().await;
    let mut req = request(Method::GET, "/v1/whoami", None);
    req.headers_mut().insert(
        FORWARDED_CLIENT_CERT,
        r#"By=spiffe://mesh/gw;Hash=abc;Subject="cn=alice,o=Acme""#
            .parse()
            .expect("header"),
    );
    let response = app.router.clone().oneshot(req).await.expect("whoami");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_forwarded_cert_counts_as_missing() {
    let app = standard_app().await;
    let mut req = request(Method::GET, "/v1/whoami", Some(ALICE_DN));
    req.headers_mut()
        .insert(FORWARDED_CLIENT_CERT, "Hash=abc".parse().expect("header"));
    let response = app.router.clone().oneshot(req).await.expect("whoami");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn untrusted_proxy_headers_are_ignored() {
    let store = seeded_store(&[("alice", "acme", ALICE_DN, predefined::VIEWER)]).await;
    let app = app_with(
        store,
        AuthConfig {
            trust_proxy_headers: false,
            ..AuthConfig::default()
        },
    );
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_subject_is_forbidden_and_audited() {
    let app = standard_app().await;
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some("CN=mallory,O=Evil")))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["message"], "access denied");

    let failures = auth_failures(app.store.as_ref()).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].subject.as_deref(), Some("CN=mallory,O=Evil"));
    assert_eq!(failures[0].details["reason"], "unknown_subject");
}

#[tokio::test]
async fn suspended_tenant_rejects_with_one_audit_event() {
    let app = standard_app().await;
    app.store
        .update_tenant(
            "acme",
            TenantUpdate {
                status: Some(TenantStatus::Suspended),
                ..TenantUpdate::default()
            },
        )
        .await
        .expect("suspend");

    let suspended = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(suspended.status(), StatusCode::FORBIDDEN);
    let suspended_body = read_json(suspended).await;

    let failures = auth_failures(app.store.as_ref()).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].details["reason"], "tenant_inactive");
    assert_eq!(failures[0].tenant_id.as_deref(), Some("acme"));
    assert_eq!(failures[0].user_id.as_deref(), Some("alice"));

    let unknown = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some("CN=nobody")))
        .await
        .expect("whoami");
    let unknown_body = read_json(unknown).await;
    for field in ["error", "message", "code"] {
        assert_eq!(suspended_body[field], unknown_body[field], "{field}");
    }
}

#[tokio::test]
async fn inactive_user_is_forbidden() {
    let app = standard_app().await;
    app.store
        .update_user(
            "alice",
            UserUpdate {
                is_active: Some(false),
                ..UserUpdate::default()
            },
        )
        .await
        .expect("deactivate");
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        auth_failures(app.store.as_ref()).await[0].details["reason"],
        "user_inactive"
    );
}

#[tokio::test]
async fn missing_role_leaves_user_without_permissions() {
    let store = seeded_store(&[]).await;
    let role = Role::custom("r-gone", "acme", "temp", [], "", chrono::Utc::now()).expect("role");
    store.create_role(role).await.expect("create role");
    store
        .create_user(common::user("bob", "acme", "CN=bob", "r-gone"))
        .await
        .expect("user");
    store.delete_role("r-gone").await.expect("delete role");
    let app = app_with(store, AuthConfig::default());

    let whoami = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some("CN=bob")))
        .await
        .expect("whoami");
    assert_eq!(whoami.status(), StatusCode::OK);
    assert!(read_json(whoami).await["user"]["role"].is_null());

    let tenant = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/tenants/acme", Some("CN=bob")))
        .await
        .expect("tenant");
    assert_eq!(tenant.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn optional_mtls_lets_anonymous_requests_reach_guards() {
    let store = seeded_store(&[]).await;
    let app = app_with(
        store,
        AuthConfig {
            require_mtls: false,
            ..AuthConfig::default()
        },
    );
    let whoami = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", None))
        .await
        .expect("whoami");
    assert_eq!(whoami.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(whoami).await["message"], "authentication required");

    let tenant = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/tenants/acme", None))
        .await
        .expect("tenant");
    assert_eq!(tenant.status(), StatusCode::UNAUTHORIZED);
    assert!(app.observer.auth_reasons().contains(&"unauthenticated"));
}

#[tokio::test]
async fn disabled_auth_injects_anonymous_context() {
    let store = seeded_store(&[("alice", "acme", ALICE_DN, predefined::VIEWER)]).await;
    let app = app_with(
        store,
        AuthConfig {
            enabled: false,
            ..AuthConfig::default()
        },
    );
    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.observer.auth_reasons(), vec!["auth_disabled"]);
}

#[tokio::test]
async fn storage_failure_is_internal_error() {
    let inner = seeded_store(&[("alice", "acme", ALICE_DN, predefined::VIEWER)]).await;
    let store = Arc::new(FaultyStore::new(inner));
    store.fail("get_user_by_subject", Fault::Unavailable);
    let app = app_with(store, AuthConfig::default());

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let body = read_json(response).await;
    assert_eq!(body["message"], "service temporarily unavailable");
    assert!(app.observer.observations().contains(&Observation::AuthDecision {
        outcome: "error",
        reason: "storage_error"
    }));
}

#[tokio::test]
async fn slow_storage_times_out() {
    let inner = seeded_store(&[("alice", "acme", ALICE_DN, predefined::VIEWER)]).await;
    let store = Arc::new(FaultyStore::new(inner));
    store.fail("get_tenant", Fault::Stall(Duration::from_secs(5)));
    let app = app_with(
        store,
        AuthConfig {
            storage_timeout: Duration::from_millis(50),
            ..AuthConfig::default()
        },
    );

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some(ALICE_DN)))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn audit_write_failure_does_not_change_outcome() {
    let inner = seeded_store(&[]).await;
    let store = Arc::new(FaultyStore::new(inner));
    store.fail("log_event", Fault::Unavailable);
    let app = app_with(store, AuthConfig::default());

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/v1/whoami", Some("CN=mallory")))
        .await
        .expect("whoami");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(
        app.observer
            .observations()
            .contains(&Observation::AuditWriteFailed)
    );
}
