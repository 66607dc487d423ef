use http_body_util::BodyExt;
use leafpds_test_utils::*;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn export_account_repo_returns_car_bytes() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, jwt, _) = create_account_via_api(&router, "exprepo.test.pds.local").await;

    let req = axum::http::Request::builder()
        .method("GET")
        .uri("/xrpc/com.atproto.server.exportAccountRepo")
        .header("authorization", format!("Bearer {jwt}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert_eq!(ct, "application/vnd.ipld.car");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(!bytes.is_empty(), "exported repo CAR should not be empty");
}

#[tokio::test]
async fn export_account_blobs_returns_empty_car_for_no_blobs() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, jwt, _) = create_account_via_api(&router, "expblobs.test.pds.local").await;

    let req = axum::http::Request::builder()
        .method("GET")
        .uri("/xrpc/com.atproto.server.exportAccountBlobs")
        .header("authorization", format!("Bearer {jwt}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), 200);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    // Still a valid, non-empty CAR: just the manifest-root block with zero entries.
    assert!(!bytes.is_empty());
}

#[tokio::test]
async fn export_account_data_includes_metadata_and_repo_car() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (did, jwt, _) = create_account_via_api(&router, "expdata.test.pds.local").await;

    let (status, body) = send_request(
        &router,
        "GET",
        "/xrpc/com.atproto.server.exportAccountData",
        Some(&jwt),
        None,
    )
    .await;
    let body = assert_xrpc_ok(status, &body);

    assert_eq!(body["metadata"]["did"], json!(did));
    assert_eq!(body["metadata"]["version"], json!(1));
    assert!(body["metadata"]["repoRev"].as_str().is_some());
    assert!(body["repoCar"].as_str().is_some());
    assert!(body.get("blobCar").is_none(), "blobCar omitted unless includeBlobs is set");
    assert!(body.get("plaintextKeys").is_none(), "plaintextKeys omitted unless explicitly requested");
}

#[tokio::test]
async fn export_account_data_can_include_plaintext_keys() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, jwt, _) = create_account_via_api(&router, "exppk.test.pds.local").await;

    let (status, body) = send_request(
        &router,
        "GET",
        "/xrpc/com.atproto.server.exportAccountData?includePlaintextKeys=true",
        Some(&jwt),
        None,
    )
    .await;
    let body = assert_xrpc_ok(status, &body);
    assert!(body["plaintextKeys"]["signingKey"]["privateKey"].as_str().is_some());
}

#[tokio::test]
async fn export_requires_auth() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (status, _) = send_request(
        &router,
        "GET",
        "/xrpc/com.atproto.server.exportAccountData",
        None,
        None,
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn generate_migration_token_round_trips_via_decode() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (did, jwt, _) = create_account_via_api(&router, "gentok.test.pds.local").await;

    let (status, body) = send_request(
        &router,
        "POST",
        "/xrpc/com.atproto.server.generateMigrationToken",
        Some(&jwt),
        Some(json!({ "targetPds": "https://new.pds.example" })),
    )
    .await;
    let body = assert_xrpc_ok(status, &body);
    let token = body["token"].as_str().expect("token string");
    assert!(body["expiresAt"].as_str().is_some());

    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "migration token is header.payload.signature");

    use base64::Engine;
    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).unwrap();
    assert_eq!(payload["type"], json!("account_migration"));
    assert_eq!(payload["did"], json!(did));
    assert_eq!(payload["targetPds"], json!("https://new.pds.example"));
}

#[tokio::test]
async fn check_account_status_reports_activated_and_blob_counts() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (did, jwt, _) = create_account_via_api(&router, "status.test.pds.local").await;

    let (status, body) = send_request(
        &router,
        "GET",
        "/xrpc/com.atproto.server.checkAccountStatus",
        Some(&jwt),
        None,
    )
    .await;
    let body = assert_xrpc_ok(status, &body);
    assert_eq!(body["did"], json!(did));
    assert_eq!(body["activated"], json!(true));
    assert_eq!(body["expectedBlobs"], body["importedBlobs"]);
}

#[tokio::test]
async fn import_account_rejects_duplicate_did() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (did, jwt, _) = create_account_via_api(&router, "dupe.test.pds.local").await;

    let (status, body) = send_request(
        &router,
        "GET",
        "/xrpc/com.atproto.server.exportAccountData",
        Some(&jwt),
        None,
    )
    .await;
    let export = assert_xrpc_ok(status, &body).clone();

    let (status, body) = send_request(
        &router,
        "POST",
        "/xrpc/com.atproto.server.importAccount",
        None,
        Some(json!({
            "metadata": export["metadata"],
            "repoCar": export["repoCar"],
        })),
    )
    .await;
    assert_xrpc_error(status, &body, 400, "AccountAlreadyExists");
}

#[tokio::test]
async fn import_account_rejects_malformed_migration_token() {
    let (router, _stores) = create_test_router_and_stores().await;
    let (_did, jwt, _) = create_account_via_api(&router, "badtoken.test.pds.local").await;

    let (status, body) = send_request(
        &router,
        "GET",
        "/xrpc/com.atproto.server.exportAccountData",
        Some(&jwt),
        None,
    )
    .await;
    let mut export = assert_xrpc_ok(status, &body).clone();
    export["metadata"]["did"] = json!("did:plc:doesnotexistatall0000");

    let (status, body) = send_request(
        &router,
        "POST",
        "/xrpc/com.atproto.server.importAccount",
        None,
        Some(json!({
            "metadata": export["metadata"],
            "repoCar": export["repoCar"],
            "migrationToken": "not-a-valid-token",
        })),
    )
    .await;
    assert_xrpc_error(status, &body, 400, "InvalidRequest");
}
