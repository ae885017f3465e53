mod common;

use anyhow::Result;
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn stream_handler_writes_chunks_as_produced() -> Result<()> {
    let server = common::ensure_server().await?;

    let response = reqwest::Client::new()
        .post(server.url("files", "count"))
        .json(&json!({ "args": [5] }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let mut received = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        received.extend_from_slice(&chunk?);
    }
    assert_eq!(String::from_utf8(received)?, "0\n1\n2\n3\n4\n");
    Ok(())
}

#[tokio::test]
async fn custom_request_body_reaches_the_handler_verbatim() -> Result<()> {
    let server = common::ensure_server().await?;

    let payload = json!({ "name": "report.csv", "rows": [1, 2, 3] });
    let body: Value = reqwest::Client::new()
        .post(server.url("files", "upload"))
        .json(&payload)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["received"], payload);
    Ok(())
}

#[tokio::test]
async fn http_get_handler_sets_cache_and_custom_headers() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let response = client.get(server.url("meta", "ping")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "max-age=60");
    assert_eq!(response.headers()["x-resi-served-by"], "demo");
    let body: Value = response.json().await?;
    assert!(body["pong"].as_u64().is_some());

    let post = client.post(server.url("meta", "ping")).send().await?;
    assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}

#[tokio::test]
async fn falsy_result_gives_an_empty_body() -> Result<()> {
    let server = common::ensure_server().await?;

    let response = reqwest::Client::new()
        .post(server.url("meta", "nothing"))
        .json(&json!({ "args": [] }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() -> Result<()> {
    let server = common::ensure_server().await?;

    let response = reqwest::Client::new()
        .post(server.url("meta", "nothing"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unknown_handlers_are_not_routed() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, body) = common::call(server, "meta", "missing", json!([]), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["error"], true);
    Ok(())
}
