#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::{connect_info::MockConnectInfo, State},
        http::{header, Request, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use clap::Parser;
    use colloquy::server::router;
    use colloquy::*;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    struct TestApp {
        app: Router,
        state: Arc<AppState>,
        _dir: TempDir,
    }

    // Port 9 (discard) is never listening locally, so every backend call fails to connect.
    async fn setup_test_app(extra: &[&str]) -> TestApp {
        setup_test_app_with_backend("http://127.0.0.1:9", extra).await
    }

    async fn setup_test_app_with_backend(backend_url: &str, extra: &[&str]) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("chat.db");
        let uploads = dir.path().join("uploads");
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<html>colloquy</html>").unwrap();

        let mut argv = vec![
            "colloquy".to_string(),
            "--database".to_string(),
            db_path.to_string_lossy().into_owned(),
            "--upload-dir".to_string(),
            uploads.to_string_lossy().into_owned(),
            "--static-dir".to_string(),
            static_dir.to_string_lossy().into_owned(),
            "--backend-url".to_string(),
            backend_url.to_string(),
            "--request-timeout-secs".to_string(),
            "5".to_string(),
            "--list-timeout-secs".to_string(),
            "2".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        let args = Args::parse_from(argv);

        let db = colloquy::db::init_db(&db_path).await.unwrap();
        let state = Arc::new(AppState::with_capabilities(args, db, Capabilities::basic()).unwrap());
        let app = router(state.clone());

        TestApp {
            app,
            state,
            _dir: dir,
        }
    }

    type Recorded = Arc<Mutex<Vec<serde_json::Value>>>;

    /// A model backend on an ephemeral loopback port that records every chat
    /// request body and always answers with the same markdown reply.
    async fn spawn_stub_backend() -> (String, Recorded) {
        async fn stub_chat(
            State(recorded): State<Recorded>,
            Json(body): Json<serde_json::Value>,
        ) -> Json<serde_json::Value> {
            recorded.lock().unwrap().push(body);
            Json(json!({
                "model": "stub-model",
                "message": { "role": "assistant", "content": "**Hi** there" },
                "done": true
            }))
        }

        async fn stub_tags() -> Json<serde_json::Value> {
            Json(json!({ "models": [{ "name": "stub-model" }] }))
        }

        let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
        let stub = Router::new()
            .route("/api/chat", post(stub_chat))
            .route("/api/tags", get(stub_tags))
            .with_state(recorded.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, stub).await.unwrap();
        });
        (format!("http://{}", addr), recorded)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn session_cookie(response: &axum::response::Response) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.strip_prefix("session_id="))
            .and_then(|rest| rest.split(';').next())
            .map(|id| id.to_string())
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_post(uri: &str, message: &str, file_name: &str, file_body: &str) -> Request<Body> {
        let boundary = "colloquyboundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\n{m}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            m = message,
            f = file_name,
            c = file_body
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_liveness_and_readiness() {
        let t = setup_test_app(&[]).await;

        let response = t
            .app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));

        let response = t
            .app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ready");
        assert_eq!(json["database"], "ok");
        assert_eq!(json["formatter"], "basic");
    }

    #[tokio::test]
    async fn test_index_and_unknown_route() {
        let t = setup_test_app(&[]).await;

        let response = t
            .app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = t
            .app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "error": "Endpoint not found" })
        );
    }

    #[tokio::test]
    async fn test_models_fall_back_when_backend_is_down() {
        let t = setup_test_app(&["--fallback-models", "alpha,beta"]).await;
        let response = t
            .app
            .oneshot(Request::builder().uri("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "success": true, "models": ["alpha", "beta"] })
        );
    }

    #[tokio::test]
    async fn test_new_session_sets_cookie_and_is_listed() {
        let t = setup_test_app(&[]).await;

        let response = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/session/new")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response).unwrap();
        let json = body_json(response).await;
        assert_eq!(json["session_id"], cookie);

        let response = t
            .app
            .oneshot(Request::builder().uri("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["sessions"][0]["session_id"], cookie);
        assert_eq!(json["sessions"][0]["message_count"], 0);
    }

    #[tokio::test]
    async fn test_empty_chat_is_rejected() {
        let t = setup_test_app(&[]).await;
        let response = t
            .app
            .oneshot(json_post("/api/chat", json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "error": "Empty message and no file" })
        );

        let sessions = colloquy::db::list_sessions(&t.state.db).await.unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_upload_is_rejected() {
        let t = setup_test_app(&[]).await;
        let response = t
            .app
            .oneshot(multipart_post("/api/chat", "look", "tool.exe", "MZ"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "File type not allowed");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let t = setup_test_app(&["--max-file-size", "2097152"]).await;
        let big = "a".repeat(3 * 1024 * 1024);
        let response = t
            .app
            .oneshot(json_post("/api/chat", json!({ "message": big })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            body_json(response).await["error"],
            "File too large. Maximum size is 2MB."
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_stored_in_history() {
        let t = setup_test_app(&[]).await;

        let response = t
            .app
            .clone()
            .oneshot(multipart_post("/api/chat", "summarise", "notes.txt", "hello notes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let session_id = session_cookie(&response).unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Cannot connect to the model backend"));

        let response = t
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/session/{}/load", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "summarise");
        assert_eq!(messages[0]["has_file"], true);
        assert_eq!(messages[0]["file_name"], "notes.txt");
        assert_eq!(messages[1]["role"], "assistant");
        assert!(messages[1]["content"]
            .as_str()
            .unwrap()
            .starts_with("Error: Cannot connect"));

        let stored = std::fs::read_dir(&t.state.args.upload_dir).unwrap().count();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_chat_reuses_cookie_session_and_delete_cleans_up() {
        let t = setup_test_app(&[]).await;
        let sid = colloquy::db::create_session(&t.state.db, Some("cookie-session".into())).await;

        let mut request = multipart_post("/api/chat", "again", "a.md", "# doc");
        request.headers_mut().insert(
            header::COOKIE,
            format!("session_id={}", sid).parse().unwrap(),
        );
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(session_cookie(&response).as_deref(), Some("cookie-session"));

        let mut request = Request::builder()
            .method("DELETE")
            .uri("/api/session/cookie-session/delete")
            .body(Body::empty())
            .unwrap();
        request.headers_mut().insert(
            header::COOKIE,
            "session_id=cookie-session".parse().unwrap(),
        );
        let response = t.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(cleared.contains("Max-Age=0"));
        assert_eq!(body_json(response).await, json!({ "success": true }));

        assert!(colloquy::db::list_sessions(&t.state.db).await.unwrap().is_empty());
        let remaining = std::fs::read_dir(&t.state.args.upload_dir).unwrap().count();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_successful_chat_round_trip() {
        let (backend_url, recorded) = spawn_stub_backend().await;
        let t = setup_test_app_with_backend(&backend_url, &[]).await;

        let response = t
            .app
            .clone()
            .oneshot(json_post(
                "/api/chat",
                json!({ "message": "first question", "model": "stub-model" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session_id = session_cookie(&response).unwrap();
        let json = body_json(response).await;
        assert_eq!(
            json,
            json!({
                "success": true,
                "message": {
                    "content": "**Hi** there",
                    "formatted_content": "<p><strong>Hi</strong> there</p>\n"
                },
                "session_id": session_id
            })
        );

        let mut request = json_post(
            "/api/chat",
            json!({ "message": "second question", "model": "stub-model" }),
        );
        request.headers_mut().insert(
            header::COOKIE,
            format!("session_id={}", session_id).parse().unwrap(),
        );
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["session_id"], session_id);

        let sent = recorded.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1]["model"], "stub-model");
        assert_eq!(sent[1]["stream"], false);
        let messages = sent[1]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], json!({ "role": "user", "content": "first question" }));
        assert_eq!(messages[1], json!({ "role": "assistant", "content": "**Hi** there" }));
        assert_eq!(messages[2]["role"], "user");
        assert!(messages[2]["content"]
            .as_str()
            .unwrap()
            .starts_with("second question\n\nPlease format your response professionally"));

        let stored = colloquy::db::session_messages(&t.state.db, &session_id, 50)
            .await
            .unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0].role, "user");
        assert_eq!(stored[0].content, "first question");
        assert_eq!(stored[0].formatted_content, None);
        assert_eq!(stored[1].role, "assistant");
        assert_eq!(
            stored[1].formatted_content.as_deref(),
            Some("<p><strong>Hi</strong> there</p>\n")
        );
        assert_eq!(stored[3].model.as_deref(), Some("stub-model"));

        let response = t
            .app
            .oneshot(Request::builder().uri("/api/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "success": true, "models": ["stub-model"] })
        );
    }

    #[tokio::test]
    async fn test_same_name_uploads_get_separate_files() {
        let t = setup_test_app(&[]).await;
        let sid = colloquy::db::create_session(&t.state.db, Some("upload-session".into())).await;

        for body in ["first copy", "second copy"] {
            let mut request = multipart_post("/api/chat", "read", "notes.txt", body);
            request.headers_mut().insert(
                header::COOKIE,
                format!("session_id={}", sid).parse().unwrap(),
            );
            let response = t.app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }

        let mut contents: Vec<String> = std::fs::read_dir(&t.state.args.upload_dir)
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["first copy", "second copy"]);

        let paths: Vec<(String,)> = sqlx::query_as("SELECT file_path FROM file_attachments")
            .fetch_all(&t.state.db)
            .await
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0].0, paths[1].0);
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_session_id() {
        let t = setup_test_app(&[]).await;
        let response = t
            .app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/session/bad%20id/delete")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "error": "Invalid session id" })
        );
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_session_id() {
        let t = setup_test_app(&[]).await;
        let response = t
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/session/bad%20id/load")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_api_key_is_loopback_only() {
        let t = setup_test_app(&[]).await;

        let local = t
            .app
            .clone()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        let response = local
            .oneshot(json_post("/api/admin/api-key", json!({ "api_key": "sk-test" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "success": true, "api_key_set": true })
        );
        assert_eq!(t.state.backend.api_key().get().as_deref(), Some("sk-test"));

        let remote = t
            .app
            .clone()
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 40000))));
        let response = remote
            .oneshot(json_post("/api/admin/api-key", json!({ "api_key": null })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(t.state.backend.api_key().get().as_deref(), Some("sk-test"));
    }
}
