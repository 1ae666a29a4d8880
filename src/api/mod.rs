pub mod auth;
pub mod correlation;
pub mod cors;
pub mod crud;
pub mod error;
pub mod interceptor;
pub mod login_codes;
pub mod token_validation;
pub mod validation;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::Posts;
use crate::AppState;
use interceptor::InterceptorChain;
use token_validation::TokenValidation;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/reset-password", post(auth::reset_password))
        .route("/deactivate", post(auth::deactivate))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/passwordless-login", post(login_codes::passwordless_login))
        .route("/verify-login-code", post(login_codes::verify_login_code));

    let interceptors = Arc::new(InterceptorChain::new().with(TokenValidation::from_config(
        state.tokens.clone(),
        &state.config.auth,
    )));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", auth_routes)
        .nest("/api/v1/posts", crud::routes::<Posts>())
        .layer(middleware::from_fn_with_state(
            interceptors,
            interceptor::run_interceptors,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors::cors_layer(&state.config.cors))
        .layer(middleware::from_fn(correlation::correlation_middleware))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Hello from Keystone",
        "health": "/health",
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSubject;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::notifications::email::RecordingMailer;
    use crate::notifications::MailService;
    use crate::services::LoginCodeService;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use chrono::Duration;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        mailer: Arc<RecordingMailer>,
    }

    async fn test_app() -> TestApp {
        let mut config = Config::default();
        config.auth.secret_key = "router-test-secret".to_string();

        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AppState::new(
            config,
            test_pool().await,
            MailService::with_mailer(mailer.clone()),
        ));

        TestApp {
            router: create_router(state.clone()),
            state,
            mailer,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        fn token(&self, user_id: i64, ttl: Duration) -> String {
            self.state
                .tokens
                .issue(&TokenSubject::new(user_id, "ada@example.com"), ttl)
                .unwrap()
        }

        async fn register(&self) -> Value {
            let response = self
                .send(json_request(
                    "POST",
                    "/api/v1/register",
                    registration("ada@example.com", "ada"),
                    None,
                ))
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
            body_json(response).await
        }
    }

    fn registration(email: &str, display_name: &str) -> Value {
        json!({
            "name": "Lovelace",
            "first_name": "Ada",
            "display_name": display_name,
            "email": email,
            "re_email": email,
            "password": "Secur3-Pass",
            "re_password": "Secur3-Pass",
        })
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = test_app().await;

        let response = app.send(get_request("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-correlation-id"));
        assert_eq!(body_json(response).await, json!({ "status": "OK" }));

        let response = app.send(get_request("/", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["health"], "/health");
    }

    #[tokio::test]
    async fn test_correlation_id_is_echoed() {
        let app = test_app().await;
        let request = Request::builder()
            .uri("/health")
            .header("X-Correlation-ID", "trace-42")
            .body(Body::empty())
            .unwrap();

        let response = app.send(request).await;
        assert_eq!(response.headers().get("x-correlation-id").unwrap(), "trace-42");
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_before_handler() {
        let app = test_app().await;
        let token = app.token(1, Duration::minutes(-10));

        let response = app.send(get_request("/api/v1/posts", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Token expired");
        assert_eq!(body["error_code"], "TOKEN_EXPIRED");
        assert_eq!(body["redirect_to"], "/login");
        assert_eq!(body["user_email"], "ada@example.com");
        assert!(body["expired_at"].is_i64());
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let app = test_app().await;

        let response = app.send(get_request("/api/v1/posts", Some("garbage"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error_code"], "INVALID_TOKEN");
        assert_eq!(body["detail"], "Invalid token");
        assert_eq!(body["redirect_to"], "/login");
    }

    #[tokio::test]
    async fn test_excluded_path_skips_token_check() {
        let app = test_app().await;
        let response = app.send(get_request("/health", Some("garbage"))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_cookie_token_is_rejected() {
        let app = test_app().await;
        let token = app.token(1, Duration::minutes(-10));
        let request = Request::builder()
            .uri("/api/v1/posts")
            .header(header::COOKIE, format!("access_token={}", token))
            .body(Body::empty())
            .unwrap();

        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error_code"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn test_register_login_me_logout() {
        let app = test_app().await;
        let user = app.register().await;
        assert_eq!(user["email"], "ada@example.com");
        assert!(user.get("password_hash").is_none());

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/login",
                json!({ "email": "ada@example.com", "password": "Secur3-Pass" }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("access_token="));
        assert!(cookie.contains("HttpOnly"));

        let body = body_json(response).await;
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap().to_string();

        let response = app.send(get_request("/api/v1/me", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["email"], "ada@example.com");
        assert_eq!(me["rights"], json!(["READ", "EDIT"]));
        assert_eq!(me["groups"], json!(["ACTIVE_USER"]));

        let response = app
            .send(json_request("POST", "/api/v1/logout", json!({}), Some(&token)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Successfully logged out");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let app = test_app().await;
        app.register().await;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/login",
                json!({ "email": "ada@example.com", "password": "Wrong-Pass1" }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[tokio::test]
    async fn test_me_without_token_challenges() {
        let app = test_app().await;
        let response = app.send(get_request("/api/v1/me", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
        assert_eq!(body_json(response).await["detail"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let app = test_app().await;
        app.register().await;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/register",
                registration("ada@example.com", "someone-else"),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_password_of_other_user_is_forbidden() {
        let app = test_app().await;
        let user = app.register().await;
        let id = user["id"].as_i64().unwrap();
        let token = app.token(id, Duration::minutes(5));

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/reset-password",
                json!({ "user_id": id + 1, "new_password": "N3w-Password" }),
                Some(&token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/reset-password",
                json!({ "user_id": id, "new_password": "N3w-Password" }),
                Some(&token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_passwordless_login_flow() {
        let app = test_app().await;
        app.register().await;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/passwordless-login",
                json!({ "email": "ada@example.com" }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Login code sent to ada@example.com");
        assert_eq!(body["expires_in_minutes"], 15);

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");

        let code = LoginCodeService::new(app.state.db.clone(), 6)
            .active_code("ada@example.com")
            .await
            .unwrap()
            .unwrap()
            .code;
        assert!(sent[0].text_body.contains(&code));

        let verify = json!({ "email": "ada@example.com", "code": code });
        let response = app
            .send(json_request("POST", "/api/v1/verify-login-code", verify.clone(), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::SET_COOKIE));
        let body = body_json(response).await;
        assert!(body["access_token"].as_str().is_some());
        assert_eq!(body["user"]["email"], "ada@example.com");

        let response = app
            .send(json_request("POST", "/api/v1/verify-login-code", verify, None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error_code"], "INVALID_OR_EXPIRED_CODE");
    }

    #[tokio::test]
    async fn test_passwordless_login_invalid_email() {
        let app = test_app().await;
        let response = app
            .send(json_request(
                "POST",
                "/api/v1/passwordless-login",
                json!({ "email": "not-an-email" }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error_code"], "INVALID_EMAIL");
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_verify_code_for_unknown_user() {
        let app = test_app().await;
        app.send(json_request(
            "POST",
            "/api/v1/passwordless-login",
            json!({ "email": "ghost@example.com" }),
            None,
        ))
        .await;
        let code = LoginCodeService::new(app.state.db.clone(), 6)
            .active_code("ghost@example.com")
            .await
            .unwrap()
            .unwrap()
            .code;

        let response = app
            .send(json_request(
                "POST",
                "/api/v1/verify-login-code",
                json!({ "email": "ghost@example.com", "code": code }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error_code"], "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_post_crud() {
        let app = test_app().await;
        let token = app.token(1, Duration::minutes(5));
        let post = json!({
            "title": "Hello",
            "content": "First post",
            "author": "Ada",
            "date": "2025-03-01",
        });

        let response = app
            .send(json_request("POST", "/api/v1/posts", post.clone(), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .send(json_request("POST", "/api/v1/posts", post, Some(&token)))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["state"], "draft");

        let response = app.send(get_request("/api/v1/posts", None)).await;
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .send(json_request(
                "PUT",
                &format!("/api/v1/posts/{}", id),
                json!({ "state": "published" }),
                Some(&token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["state"], "published");
        assert_eq!(updated["title"], "Hello");

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/posts/{}", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(delete).await.status(), StatusCode::NO_CONTENT);

        let response = app
            .send(get_request(&format!("/api/v1/posts/{}", id), None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert_eq!(body["detail"], format!("Post with id {} not found", id));
    }

    #[tokio::test]
    async fn test_invalid_post_is_rejected() {
        let app = test_app().await;
        let token = app.token(1, Duration::minutes(5));
        let response = app
            .send(json_request(
                "POST",
                "/api/v1/posts",
                json!({ "title": "", "author": "Ada", "date": "2025-03-01" }),
                Some(&token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
        assert!(body["errors"]["title"].is_array());
    }
}
