use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use mt_axum::{axum, Tenancy};
use mt_core::{MemoryService, MtApp, ServiceParams};
use mt_scope::{install_policies, PolicyConfig, ScopeKind, TenancyOptions, TenantModel, TenantResolver};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Site {
    router: axum::Router,
    posts: Arc<MemoryService>,
    notes: Arc<MemoryService>,
}

fn site() -> Site {
    let app: MtApp<Value, ServiceParams> = MtApp::new();

    let accounts = Arc::new(MemoryService::with_rows(vec![
        json!({"id": 1, "domain": "acme", "is_active": true}),
        json!({"id": 2, "domain": "globex", "is_active": true}),
    ]));
    let posts = Arc::new(MemoryService::with_rows(vec![
        json!({"id": 10, "account_id": 0, "title": "welcome"}),
        json!({"id": 11, "account_id": 1, "title": "acme news"}),
        json!({"id": 12, "account_id": 2, "title": "globex news"}),
    ]));
    let notes = Arc::new(MemoryService::with_rows(vec![json!({"id": 20, "account_id": 1})]));

    let mut model = TenantModel::default();
    model.conditions.insert("is_active".to_string(), json!(true));
    let options = TenancyOptions::builder()
        .primary_domain("app.test")
        .redirect_inactive("/inactive")
        .model(model)
        .policy("accounts", PolicyConfig::new(ScopeKind::TenantOnly))
        .policy("posts", PolicyConfig::new(ScopeKind::Mixed))
        .policy("notes", PolicyConfig::new(ScopeKind::TenantOnly))
        .build_validated()
        .unwrap();

    install_policies(&app, &options);
    app.register_service("accounts", accounts);
    let resolver = TenantResolver::for_app(&app, options).unwrap();

    let router = axum(app, resolver)
        .use_service("/posts", posts.clone())
        .use_service("/notes", notes.clone())
        .use_get("/whoami", |Tenancy(ctx): Tenancy| async move {
            axum::Json(json!({"qualifier": ctx.qualifier(), "context": ctx.context()}))
        })
        .into_router();

    Site { router, posts, notes }
}

fn request(method: &str, host: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri).header(header::HOST, host);
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn context_follows_the_host() {
    let s = site();

    let res = s.router.clone().oneshot(request("GET", "acme.app.test:8080", "/whoami", None)).await.unwrap();
    assert_eq!(json_body(res).await, json!({"qualifier": "acme", "context": "tenant"}));

    let res = s.router.oneshot(request("GET", "www.app.test", "/whoami", None)).await.unwrap();
    assert_eq!(json_body(res).await, json!({"qualifier": "www", "context": "global"}));
}

#[tokio::test]
async fn tenant_lists_own_and_global_rows() {
    let s = site();
    let res = s.router.oneshot(request("GET", "acme.app.test", "/posts", None)).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    let ids: Vec<_> = body.as_array().unwrap().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(10), json!(11)]);
}

#[tokio::test]
async fn query_string_narrows_within_the_scope() {
    let s = site();
    let res = s
        .router
        .oneshot(request("GET", "acme.app.test", "/posts?account_id=2", None))
        .await
        .unwrap();

    assert_eq!(json_body(res).await, json!([]));
}

#[tokio::test]
async fn inactive_tenant_is_redirected() {
    let s = site();
    let res = s.router.oneshot(request("GET", "ghost.app.test", "/notes", None)).await.unwrap();

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[header::LOCATION], "http://app.test/inactive");
    assert_eq!(s.notes.find_calls(), 0);
}

#[tokio::test]
async fn redirect_keeps_the_forwarded_scheme() {
    let s = site();
    let mut req = request("GET", "ghost.app.test", "/posts", None);
    req.headers_mut().insert("x-forwarded-proto", "https".parse().unwrap());

    let res = s.router.oneshot(req).await.unwrap();
    assert_eq!(res.headers()[header::LOCATION], "https://app.test/inactive");
}

#[tokio::test]
async fn tenant_only_from_primary_is_400() {
    let s = site();
    let res = s.router.oneshot(request("GET", "app.test", "/notes", None)).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json_body(res).await;
    assert_eq!(body["name"], "DataScopeViolation");
    assert_eq!(body["className"], "data-scope-violation");
    assert_eq!(body["message"], "Tenant Scoped accessed globally");
}

#[tokio::test]
async fn refused_delete_is_204_and_keeps_the_row() {
    let s = site();
    let res = s.router.oneshot(request("DELETE", "acme.app.test", "/posts/10", None)).await.unwrap();

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(s.posts.row("10").is_some());
}

#[tokio::test]
async fn foreign_delete_is_a_violation() {
    let s = site();
    let res = s.router.oneshot(request("DELETE", "acme.app.test", "/posts/12", None)).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["message"], "Tenant->id:1 does not own posts->id:12");
    assert!(s.posts.row("12").is_some());
}

#[tokio::test]
async fn create_is_stamped_with_the_tenant() {
    let s = site();
    let res = s
        .router
        .oneshot(request(
            "POST",
            "globex.app.test",
            "/notes",
            Some(json!({"body": "hi", "account_id": 1})),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["account_id"], json!(2));
}

#[tokio::test]
async fn foreign_get_is_not_found() {
    let s = site();
    let res = s.router.oneshot(request("GET", "globex.app.test", "/notes/20", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
