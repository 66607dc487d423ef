use axum::body::Body;
use http_body_util::BodyExt;
use leafpds_test_utils::*;
use tower::ServiceExt;

async fn post_form(router: &axum::Router, uri: &str, form: &str) -> (u16, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status().as_u16();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, json)
}

// ── Pushed Authorization Request ────────────────────────────────────────

#[tokio::test]
async fn par_issues_a_request_uri() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, body) = post_form(
        &router,
        "/oauth/par",
        "client_id=http%3A%2F%2Flocalhost%2Fclient-metadata.json\
         &redirect_uri=http%3A%2F%2Flocalhost%2Fcallback\
         &scope=atproto\
         &code_challenge=abc123\
         &code_challenge_method=S256",
    )
    .await;
    assert_eq!(status, 201, "par failed: {body}");
    let request_uri = body["request_uri"].as_str().expect("request_uri present");
    assert!(request_uri.starts_with("urn:ietf:params:oauth:request_uri:"));
    assert!(body["expires_in"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn par_rejects_non_https_client_id() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, _body) = post_form(
        &router,
        "/oauth/par",
        "client_id=http%3A%2F%2Fevil.example%2Fmetadata.json\
         &redirect_uri=http%3A%2F%2Fevil.example%2Fcallback\
         &scope=atproto\
         &code_challenge=abc123\
         &code_challenge_method=S256",
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn par_rejects_unsupported_code_challenge_method() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, _body) = post_form(
        &router,
        "/oauth/par",
        "client_id=http%3A%2F%2Flocalhost%2Fclient-metadata.json\
         &redirect_uri=http%3A%2F%2Flocalhost%2Fcallback\
         &scope=atproto\
         &code_challenge=abc123\
         &code_challenge_method=plain",
    )
    .await;
    assert_eq!(status, 400);
}

// ── Authorization endpoint ───────────────────────────────────────────────

#[tokio::test]
async fn authorize_requires_a_session() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, _body) = send_request(
        &router,
        "GET",
        "/oauth/authorize?request_uri=urn:ietf:params:oauth:request_uri:missing",
        None,
        None,
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn authorize_rejects_unknown_request_uri() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, access_jwt, _refresh_jwt) =
        create_account_via_api(&router, "alice.test.pds.local").await;

    let (status, _body) = send_request(
        &router,
        "GET",
        "/oauth/authorize?request_uri=urn:ietf:params:oauth:request_uri:nonexistent",
        Some(&access_jwt),
        None,
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn authorize_renders_consent_for_a_pushed_request() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, access_jwt, _refresh_jwt) =
        create_account_via_api(&router, "carol.test.pds.local").await;

    let (status, par_body) = post_form(
        &router,
        "/oauth/par",
        "client_id=http%3A%2F%2Flocalhost%2Fclient-metadata.json\
         &redirect_uri=http%3A%2F%2Flocalhost%2Fcallback\
         &scope=atproto\
         &code_challenge=abc123\
         &code_challenge_method=S256",
    )
    .await;
    assert_eq!(status, 201);
    let request_uri = par_body["request_uri"].as_str().unwrap();

    let req = axum::http::Request::builder()
        .method("GET")
        .uri(format!("/oauth/authorize?request_uri={request_uri}"))
        .header("authorization", format!("Bearer {access_jwt}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), axum::http::StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&bytes);
    assert!(html.contains("localhost"));
    assert!(html.contains("csrf_token"));
}

#[tokio::test]
async fn authorize_denial_redirects_with_access_denied() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, access_jwt, _refresh_jwt) =
        create_account_via_api(&router, "dave.test.pds.local").await;

    let (_status, par_body) = post_form(
        &router,
        "/oauth/par",
        "client_id=http%3A%2F%2Flocalhost%2Fclient-metadata.json\
         &redirect_uri=http%3A%2F%2Flocalhost%2Fcallback\
         &scope=atproto\
         &code_challenge=abc123\
         &code_challenge_method=S256",
    )
    .await;
    let request_uri = par_body["request_uri"].as_str().unwrap();

    let req = axum::http::Request::builder()
        .method("GET")
        .uri(format!("/oauth/authorize?request_uri={request_uri}"))
        .header("authorization", format!("Bearer {access_jwt}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&bytes);
    let csrf_start = html.find("value=\"").unwrap();
    let csrf_token = &html[csrf_start + 7..];
    let csrf_token = &csrf_token[..csrf_token.find('"').unwrap()];

    let (status, _body) = post_form(
        &router,
        "/oauth/authorize",
        &format!("csrf_token={csrf_token}&decision=deny"),
    )
    .await;
    assert_eq!(status, 303);
}

// ── Token endpoint ───────────────────────────────────────────────────────

#[tokio::test]
async fn token_requires_dpop_proof() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, _body) = post_form(
        &router,
        "/oauth/token",
        "grant_type=authorization_code&code=x&redirect_uri=https://client.example/cb&code_verifier=y",
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn token_rejects_unsupported_grant_type() {
    let (router, _stores) = create_test_router_and_stores().await;
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/oauth/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("dpop", "not-a-real-proof")
        .body(Body::from("grant_type=client_credentials"))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    // The malformed DPoP proof is rejected before the grant type is inspected.
    assert_eq!(resp.status(), axum::http::StatusCode::BAD_REQUEST);
}

// ── Revocation endpoint ──────────────────────────────────────────────────

#[tokio::test]
async fn revoke_requires_dpop_proof() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, _body) = post_form(&router, "/oauth/revoke", "token=whatever").await;
    assert_eq!(status, 400);
}

// ── JWKS ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn jwks_exposes_the_servers_p256_public_key() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, body) = send_request(&router, "GET", "/oauth/jwks", None, None).await;
    assert_eq!(status, 200);
    let keys = body["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "EC");
    assert_eq!(keys[0]["crv"], "P-256");
    assert!(keys[0]["x"].as_str().is_some());
    assert!(keys[0]["y"].as_str().is_some());
}
