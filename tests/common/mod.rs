#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use sessionrelay::{
    ServerConfig, create_router, create_session_service,
    db::Database,
    jwt::SessionClaims,
    session::{IssuedSession, SessionService, TokenPolicy},
};
use std::sync::Arc;

pub struct TestApp {
    pub router: Router,
    pub sessions: Arc<SessionService>,
    pub db: Database,
}

/// Create a test app backed by an in-memory database.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(TokenPolicy::default(), false).await
}

pub async fn create_test_app_with(policy: TokenPolicy, secure_cookies: bool) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: b"test-jwt-secret-that-is-long-enough".to_vec(),
        issuer: "sessionrelay".to_string(),
        audience: "sessionrelay-api".to_string(),
        policy,
        secure_cookies,
        retention_secs: 0,
    };
    let sessions = create_session_service(&config);
    TestApp {
        router: create_router(sessions.clone(), secure_cookies),
        sessions,
        db,
    }
}

pub fn claims(name: &str) -> SessionClaims {
    SessionClaims {
        name: name.to_string(),
        must_change_password: false,
    }
}

impl TestApp {
    /// Log a principal in (what the login flow would do).
    pub async fn login(&self, owner_id: &str) -> IssuedSession {
        self.sessions
            .issue_session(owner_id, &claims(owner_id))
            .await
            .expect("Failed to issue session")
    }

    /// A credential for `owner_id` that is already expired.
    pub fn expired_credential(&self, owner_id: &str) -> String {
        self.sessions
            .jwt()
            .generate_credential(owner_id, &claims(owner_id), 0)
            .expect("Failed to sign credential")
            .token
    }
}

pub fn auth_cookies(access_token: &str, refresh_token: &str) -> String {
    format!(
        "access_token={}; refresh_token={}",
        access_token, refresh_token
    )
}

pub fn refresh_cookie_only(refresh_token: &str) -> String {
    format!("refresh_token={}", refresh_token)
}

pub fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    request("GET", uri, headers)
}

pub fn post(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    request("POST", uri, headers)
}

pub fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie set (not cleared) by the response.
pub fn set_cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let value = c.strip_prefix(&format!("{}=", cookie_name))?;
        let value = value.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}

pub fn header_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
