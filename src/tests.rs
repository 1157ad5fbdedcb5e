#[cfg(test)]
mod integration_tests {
    use crate::handlers::auth::{LoginRequest, RegisterRequest};
    use crate::schemas::ApiResponse;
    use crate::test_utils::test_utils::setup_test_app;
    use axum::body::Bytes;
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use model::entities::viewed_image;
    use sea_orm::EntityTrait;
    use serde_json::Value;
    use std::time::Duration;

    const BOUNDARY: &str = "carscope-test-boundary";

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
    }

    /// Register a user and log them in, returning the session token.
    async fn register_and_login(
        server: &TestServer,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> String {
        let register_request = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            is_admin: Some(is_admin),
        };
        let response = server.post("/register").json(&register_request).await;
        response.assert_status(StatusCode::CREATED);

        let login_request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = server.post("/login").json(&login_request).await;
        response.assert_status(StatusCode::OK);

        let body: ApiResponse<Value> = response.json();
        assert!(body.success);
        body.data["token"].as_str().unwrap().to_string()
    }

    /// A small but valid PNG for upload tests.
    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(24, 24, image::Rgb([120, 130, 140]));
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    /// Assemble a multipart/form-data body with the optional image and
    /// description fields the upload endpoint expects.
    fn upload_body(image: Option<(&str, &[u8])>, description: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((file_name, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                     filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(description) = description {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"description\"\r\n\r\n{description}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_upload(
        server: &TestServer,
        token: &str,
        image: Option<(&str, &[u8])>,
        description: Option<&str>,
    ) -> axum_test::TestResponse {
        server
            .post("/upload")
            .add_header(header::AUTHORIZATION, bearer(token))
            .content_type(&format!("multipart/form-data; boundary={}", BOUNDARY))
            .bytes(Bytes::from(upload_body(image, description)))
            .await
    }

    /// Poll the listing until the entry reaches the expected detection status.
    async fn wait_for_status(
        server: &TestServer,
        token: &str,
        entry_id: i64,
        expected: &str,
    ) -> Value {
        for _ in 0..200 {
            let response = server
                .get("/")
                .add_header(header::AUTHORIZATION, bearer(token))
                .await;
            response.assert_status(StatusCode::OK);
            let body: ApiResponse<Vec<Value>> = response.json();
            if let Some(entry) = body.data.iter().find(|e| e["id"] == entry_id) {
                if entry["detection_status"] == expected {
                    return entry.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("Entry {} never reached status '{}'", entry_id, expected);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let response = server.get("/health").await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "UP");
    }

    #[tokio::test]
    async fn test_register_then_login_succeeds_once() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;
        assert!(!token.is_empty());

        // A second registration with the same username must be rejected
        let duplicate = RegisterRequest {
            username: "alice".to_string(),
            password: "different-password".to_string(),
            is_admin: None,
        };
        let response = server.post("/register").json(&duplicate).await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["code"], "DUPLICATE_USERNAME");
    }

    #[tokio::test]
    async fn test_login_error_does_not_reveal_which_part_was_wrong() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        register_and_login(&server, "alice", "correct-horse", false).await;

        let wrong_password = server
            .post("/login")
            .json(&LoginRequest {
                username: "alice".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        wrong_password.assert_status(StatusCode::UNAUTHORIZED);

        let unknown_user = server
            .post("/login")
            .json(&LoginRequest {
                username: "nobody".to_string(),
                password: "wrong".to_string(),
            })
            .await;
        unknown_user.assert_status(StatusCode::UNAUTHORIZED);

        // Same status, same body: no username enumeration
        let wrong_password_body: Value = wrong_password.json();
        let unknown_user_body: Value = unknown_user.json();
        assert_eq!(wrong_password_body, unknown_user_body);
        assert_eq!(wrong_password_body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_listing_requires_a_session() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let response = server.get("/").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_the_session_immediately() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;

        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .get("/logout")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::OK);

        // The very same token is now rejected
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_detection_workflow() {
        let (app, ctx) = setup_test_app(3).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;

        let image = png_bytes();
        let response = post_upload(&server, &token, Some(("car1.jpg", &image)), Some("street view")).await;
        response.assert_status(StatusCode::CREATED);

        let body: ApiResponse<Value> = response.json();
        assert!(body.success);
        let entry = &body.data;
        let entry_id = entry["id"].as_i64().unwrap();

        // The entry is visible immediately, with a provisional zero count
        assert_eq!(entry["vehicle_count"], 0);
        assert_eq!(entry["detection_status"], "pending");
        assert_eq!(entry["description"], "street view");
        let stored_name = entry["original_filename"].as_str().unwrap().to_string();
        assert!(stored_name.ends_with("car1.jpg"));
        assert!(ctx.state.config.upload_dir.join(&stored_name).exists());

        // The listing includes it right away
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::OK);
        let listing: ApiResponse<Vec<Value>> = response.json();
        assert!(listing.data.iter().any(|e| e["id"] == entry_id));

        // Once detection completes the count is updated in place
        let completed = wait_for_status(&server, &token, entry_id, "completed").await;
        assert_eq!(completed["vehicle_count"], 3);
        let annotated_name = completed["annotated_filename"].as_str().unwrap().to_string();
        assert!(ctx.state.config.detection_dir.join(&annotated_name).exists());

        // The annotated image is served under /uploads
        let response = server.get(&format!("/uploads/{}", annotated_name)).await;
        response.assert_status(StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "image/jpeg"
        );

        // The count never reverts to zero
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        let listing: ApiResponse<Vec<Value>> = response.json();
        let entry = listing.data.iter().find(|e| e["id"] == entry_id).unwrap();
        assert_eq!(entry["vehicle_count"], 3);
        assert_eq!(entry["detection_status"], "completed");
    }

    #[tokio::test]
    async fn test_upload_with_missing_fields_is_rejected() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;

        // No description
        let image = png_bytes();
        let response = post_upload(&server, &token, Some(("car1.jpg", &image)), None).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["code"], "UPLOAD_MISSING_FIELD");

        // No image
        let response = post_upload(&server, &token, None, Some("street view")).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json();
        assert_eq!(body["code"], "UPLOAD_MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_corrupt_upload_ends_in_failed_state() {
        let (app, _ctx) = setup_test_app(5).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;

        let response = post_upload(
            &server,
            &token,
            Some(("broken.jpg", b"this is not an image")),
            Some("should fail"),
        )
        .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        let entry_id = body.data["id"].as_i64().unwrap();

        // The decode failure is confined to the dispatcher and lands as a
        // failed state, never as a silent count of zero forever
        let failed = wait_for_status(&server, &token, entry_id, "failed").await;
        assert_eq!(failed["vehicle_count"], 0);
        assert!(failed["annotated_filename"].is_null());
    }

    #[tokio::test]
    async fn test_mark_viewed_is_idempotent() {
        let (app, ctx) = setup_test_app(2).await;
        let server = TestServer::new(app).unwrap();

        let admin_token = register_and_login(&server, "admin", "admin-pass", true).await;

        let image = png_bytes();
        let response = post_upload(
            &server,
            &admin_token,
            Some(("lot.png", &image)),
            Some("parking lot"),
        )
        .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        let entry_id = body.data["id"].as_i64().unwrap();

        for _ in 0..2 {
            let response = server
                .post(&format!("/mark_viewed/{}", entry_id))
                .add_header(header::AUTHORIZATION, bearer(&admin_token))
                .await;
            response.assert_status(StatusCode::OK);
            let body: ApiResponse<String> = response.json();
            assert!(body.success);
            assert_eq!(body.message, "Image marked as viewed");
        }

        // Exactly one relation row exists after marking twice
        let relations = viewed_image::Entity::find()
            .all(&ctx.state.db)
            .await
            .unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].image_id, entry_id as i32);
    }

    #[tokio::test]
    async fn test_mark_viewed_requires_admin_regardless_of_entry() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;

        // Forbidden even for an entry that does not exist
        let response = server
            .post("/mark_viewed/12345")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_mark_viewed_unknown_entry_is_not_found() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let admin_token = register_and_login(&server, "admin", "admin-pass", true).await;

        let response = server
            .post("/mark_viewed/12345")
            .add_header(header::AUTHORIZATION, bearer(&admin_token))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_admin_dashboard_partitions_by_acknowledgement() {
        let (app, _ctx) = setup_test_app(1).await;
        let server = TestServer::new(app).unwrap();

        let admin_token = register_and_login(&server, "admin", "admin-pass", true).await;

        let image = png_bytes();
        for (name, description) in [("a.png", "first"), ("b.png", "second")] {
            let response =
                post_upload(&server, &admin_token, Some((name, &image)), Some(description)).await;
            response.assert_status(StatusCode::CREATED);
        }

        let response = server
            .get("/admin_dashboard")
            .add_header(header::AUTHORIZATION, bearer(&admin_token))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        let unviewed = body.data["unviewed"].as_array().unwrap().clone();
        assert_eq!(unviewed.len(), 2);
        assert_eq!(body.data["viewed"].as_array().unwrap().len(), 0);

        // Acknowledge the first entry and the partition shifts
        let first_id = unviewed[0]["id"].as_i64().unwrap();
        let response = server
            .post(&format!("/mark_viewed/{}", first_id))
            .add_header(header::AUTHORIZATION, bearer(&admin_token))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .get("/admin_dashboard")
            .add_header(header::AUTHORIZATION, bearer(&admin_token))
            .await;
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["unviewed"].as_array().unwrap().len(), 1);
        let viewed = body.data["viewed"].as_array().unwrap();
        assert_eq!(viewed.len(), 1);
        assert_eq!(viewed[0]["id"].as_i64().unwrap(), first_id);
    }

    #[tokio::test]
    async fn test_admin_dashboard_is_forbidden_for_regular_users() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let token = register_and_login(&server, "alice", "correct-horse", false).await;

        let response = server
            .get("/admin_dashboard")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_delete_removes_entry_files_and_relations() {
        let (app, ctx) = setup_test_app(2).await;
        let server = TestServer::new(app).unwrap();

        let admin_token = register_and_login(&server, "admin", "admin-pass", true).await;
        let user_token = register_and_login(&server, "alice", "correct-horse", false).await;

        let image = png_bytes();
        let response = post_upload(
            &server,
            &user_token,
            Some(("car1.jpg", &image)),
            Some("street view"),
        )
        .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        let entry_id = body.data["id"].as_i64().unwrap();
        let stored_name = body.data["original_filename"].as_str().unwrap().to_string();

        let completed = wait_for_status(&server, &user_token, entry_id, "completed").await;
        let annotated_name = completed["annotated_filename"].as_str().unwrap().to_string();

        let original_path = ctx.state.config.upload_dir.join(&stored_name);
        let annotated_path = ctx.state.config.detection_dir.join(&annotated_name);
        assert!(original_path.exists());
        assert!(annotated_path.exists());

        // An admin acknowledges it, then the uploader deletes it
        let response = server
            .post(&format!("/mark_viewed/{}", entry_id))
            .add_header(header::AUTHORIZATION, bearer(&admin_token))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .post(&format!("/delete/{}", entry_id))
            .add_header(header::AUTHORIZATION, bearer(&user_token))
            .await;
        response.assert_status(StatusCode::OK);

        // Gone from the listing
        let response = server
            .get("/")
            .add_header(header::AUTHORIZATION, bearer(&user_token))
            .await;
        let listing: ApiResponse<Vec<Value>> = response.json();
        assert!(listing.data.iter().all(|e| e["id"] != entry_id));

        // Both backing files removed
        assert!(!original_path.exists());
        assert!(!annotated_path.exists());

        // No orphaned viewed relations
        let relations = viewed_image::Entity::find()
            .all(&ctx.state.db)
            .await
            .unwrap();
        assert!(relations.is_empty());

        // Deleting again is a 404
        let response = server
            .post(&format!("/delete/{}", entry_id))
            .add_header(header::AUTHORIZATION, bearer(&user_token))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_annotated_unknown_file_is_not_found() {
        let (app, _ctx) = setup_test_app(0).await;
        let server = TestServer::new(app).unwrap();

        let response = server.get("/uploads/missing.jpg").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
