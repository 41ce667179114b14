mod support;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use coordinator::handlers::build_router;
use serde_json::{json, Value};
use support::{harness, master_addr, Harness};
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    build_router(h.state.clone())
}

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value), String> {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(payload) => {
            let bytes = serde_json::to_vec(&payload)
                .map_err(|err| format!("serialize request body: {err}"))?;
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
        }
        None => builder.body(Body::empty()),
    }
    .map_err(|err| format!("build request: {err}"))?;
    send(router, req).await
}

/// POST multipart con un único archivo en el campo `field`.
async fn upload(
    router: &Router,
    uri: &str,
    field: &str,
    bytes: &[u8],
) -> Result<(StatusCode, Value), String> {
    const BOUNDARY: &str = "frame-boundary";
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"frame.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .map_err(|err| format!("build request: {err}"))?;
    send(router, req).await
}

async fn send(router: &Router, req: Request<Body>) -> Result<(StatusCode, Value), String> {
    let response = router
        .clone()
        .oneshot(req)
        .await
        .map_err(|err| format!("route request: {err}"))?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .map_err(|err| format!("read response body: {err}"))?;

    let parsed = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).to_string())
        })
    };
    Ok((status, parsed))
}

#[tokio::test]
async fn health_is_ok() -> Result<(), String> {
    let h = harness(&[]);
    let (status, body) = call(&router(&h), Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
    Ok(())
}

#[tokio::test]
async fn full_master_lifecycle_over_http() -> Result<(), String> {
    let h = harness(&[master_addr(3)]);
    let router = router(&h);

    let (status, created) = call(
        &router,
        Method::POST,
        "/api/v1/tasks",
        Some(json!({"kind": "reconnaissance", "destination": "master", "priority": 2})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "created");
    assert_eq!(created["name"], "reconnaissance");
    let id = created["task_id"].as_str().ok_or("missing task_id")?.to_string();

    let (status, task) = call(&router, Method::GET, &format!("/api/v1/tasks/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    let nodes = task["nodes"].as_object().ok_or("nodes")?;
    assert_eq!(nodes.len(), 3);
    assert!(!nodes.contains_key("3"));

    let (status, update) = call(
        &router,
        Method::POST,
        &format!("/api/v1/tasks/{id}/nodes/0/process"),
        Some(json!({"image_count": 250, "node_count": 4})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["progress"], 2.0);
    assert_eq!(update["task_status"], "processing");

    let (status, finished) = call(
        &router,
        Method::POST,
        &format!("/api/v1/tasks/{id}/nodes/0/finish"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["task_status"], "processing");

    let (status, stopped) =
        call(&router, Method::POST, &format!("/api/v1/tasks/{id}/stop"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["status"], "stopped");

    let (status, again) =
        call(&router, Method::POST, &format!("/api/v1/tasks/{id}/stop"), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(again["error"].as_str().unwrap_or_default().contains(&id));

    let (status, list) = call(&router, Method::GET, "/api/v1/tasks", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn legacy_routes_use_numeric_kind() -> Result<(), String> {
    let h = harness(&[]);
    let router = router(&h);

    let (status, created) = call(&router, Method::GET, "/task/init/2/edge", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["kind"], "track");
    assert_eq!(created["destination"], "edge");
    let id = created["task_id"].as_str().ok_or("missing task_id")?.to_string();

    let (status, task) = call(&router, Method::GET, &format!("/task/status/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "created");

    let (status, _) = call(&router, Method::GET, &format!("/task/stop/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = call(&router, Method::GET, "/task/init/9/edge", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].is_string());

    let (status, _) = call(&router, Method::GET, "/task/init/1/cloud", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn edge_init_failure_is_reported() -> Result<(), String> {
    let h = harness(&[support::EDGE_ADDR.to_string()]);
    let (status, created) = call(
        &router(&h),
        Method::POST,
        "/api/v1/tasks",
        Some(json!({"kind": "track", "destination": "edge"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "failed");
    Ok(())
}

#[tokio::test]
async fn not_found_mappings() -> Result<(), String> {
    let h = harness(&[]);
    let router = router(&h);

    let (status, _) = call(&router, Method::GET, "/api/v1/tasks/missing0", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&router, Method::POST, "/api/v1/tasks/missing0/stop", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &router,
        Method::POST,
        "/api/v1/tasks/missing0/nodes/0/process",
        Some(json!({"image_count": 1, "node_count": 1})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // finish sobre una tarea desconocida responde con un mensaje, no con 404
    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v1/tasks/missing0/nodes/edge/finish",
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap_or_default().contains("missing0"));
    assert!(body.get("task_status").is_none());
    Ok(())
}

#[tokio::test]
async fn zero_node_count_on_edge_is_bad_request() -> Result<(), String> {
    let h = harness(&[]);
    let router = router(&h);
    let (_, created) = call(&router, Method::GET, "/task/init/track/edge", None).await?;
    let id = created["task_id"].as_str().ok_or("missing task_id")?.to_string();

    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/api/v1/tasks/{id}/nodes/edge/process"),
        Some(json!({"image_count": 600, "node_count": 0})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &router,
        Method::POST,
        &format!("/api/v1/tasks/{id}/nodes/edge/process"),
        Some(json!({"image_count": 600, "node_count": 4})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"], 18750.0);
    Ok(())
}

#[tokio::test]
async fn image_upload_is_counted_per_task() -> Result<(), String> {
    let h = harness(&[]);
    let router = router(&h);
    let (_, created) = call(&router, Method::GET, "/task/init/track/edge", None).await?;
    let id = created["task_id"].as_str().ok_or("missing task_id")?.to_string();
    let frame: &[u8] = b"\xff\xd8jpeg";

    let (status, body) = upload(&router, &format!("/image/{id}"), "image", frame).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image_count"], 1);
    assert_eq!(body["file_name"], format!("{id}_image.jpg"));
    assert_eq!(body["task_status"], "created");

    let (status, body) =
        upload(&router, &format!("/api/v1/tasks/{id}/images"), "image", frame).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image_count"], 2);

    assert_eq!(h.images.saved(), vec![(id.clone(), 6), (id.clone(), 6)]);
    let (_, task) = call(&router, Method::GET, &format!("/api/v1/tasks/{id}"), None).await?;
    assert_eq!(task["image_count"], 2);

    // sin el campo `image`
    let (status, err) = upload(&router, &format!("/image/{id}"), "file", frame).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].is_string());

    let (status, _) = upload(&router, "/image/missing0", "image", frame).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.images.saved().len(), 2);
    Ok(())
}
