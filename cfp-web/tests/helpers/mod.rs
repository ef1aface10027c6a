//! Test helper utilities
//!
//! Shared setup for the cfp-web HTTP tests: a router over a temporary
//! database, a memory mailer and request shortcuts.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use cfp_common::config::TomlConfig;
use cfp_common::db::{settings, SubmissionWindow, PROGRAMME_COMMITTEE};
use chrono::{Duration, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use cfp_web::auth::password;
use cfp_web::db::users::{self, NewUser, User};
use cfp_web::mailer::MemoryMailer;
use cfp_web::{build_router, AppState};

pub const PASSWORD: &str = "tangerine-harbour-71";
pub const MAX_UPLOAD: usize = 1024 * 1024;
pub const PDF: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\ntrailer\n%%EOF\n";
pub const ZIP: &[u8] = b"PK\x03\x04\x14\x00\x00\x00\x00\x00";

const BOUNDARY: &str = "cfp-test-boundary";
const BODY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Author,
    Committee,
    Superuser,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    _root: TempDir,
}

pub fn test_config() -> TomlConfig {
    TomlConfig {
        application_name: "TestConf".to_string(),
        public_url: "http://cfp.test".to_string(),
        secret_key: Some("test-secret-key".to_string()),
        password_hash_cost: 4,
        max_upload_size: MAX_UPLOAD,
        ..TomlConfig::default()
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: TomlConfig) -> Self {
        let root = TempDir::new().unwrap();
        let db = cfp_common::db::init_database(&root.path().join("cfp.db"))
            .await
            .unwrap();
        let mailer = Arc::new(MemoryMailer::new());
        let secret_key = config.secret_key.clone().unwrap_or_default();
        let state = AppState::new(
            db,
            config,
            secret_key,
            root.path().join("uploads"),
            mailer.clone(),
        );
        let router = build_router(state.clone());

        Self {
            router,
            state,
            mailer,
            _root: root,
        }
    }

    pub fn db(&self) -> &sqlx::SqlitePool {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request with an optional bearer token and JSON body
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).unwrap()).await;
        read_json(response).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.request(Method::GET, uri, token, None).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.request(Method::POST, uri, token, Some(body)).await;
        (status, body)
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.request(Method::PUT, uri, token, Some(body)).await;
        (status, body)
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.request(Method::DELETE, uri, token, None).await;
        (status, body)
    }

    /// Send a multipart submission form
    pub async fn upload(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        let (status, _, body) = read_json(self.send(request).await).await;
        (status, body)
    }

    /// Insert an active account directly
    pub async fn create_user(&self, username: &str, role: Role) -> User {
        let password_hash = password::hash_password(PASSWORD, 4).unwrap();
        let user = users::create_user(
            self.db(),
            &NewUser {
                username: username.to_string(),
                email: format!("{}@example.org", username),
                password_hash,
                name: format!("{} Example", username),
                country: "Norway".to_string(),
                affiliation: "Test Lab".to_string(),
                is_active: true,
                is_superuser: role == Role::Superuser,
                email_confirmed: true,
            },
        )
        .await
        .unwrap();

        if role == Role::Committee {
            users::set_group_membership(self.db(), user.guid, PROGRAMME_COMMITTEE, true)
                .await
                .unwrap();
        }
        user
    }

    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .post(
                "/api/accounts/login",
                None,
                serde_json::json!({ "username": username, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Create an account with `role` and return its session token
    pub async fn user_with_token(&self, username: &str, role: Role) -> (User, String) {
        let user = self.create_user(username, role).await;
        let token = self.login(username).await;
        (user, token)
    }

    /// Open the submission window around the current time
    pub async fn open_submissions(&self) {
        let now = Utc::now();
        settings::set_submission_window(
            self.db(),
            &SubmissionWindow {
                open_date: now - Duration::days(1),
                close_date: now + Duration::days(1),
            },
        )
        .await
        .unwrap();
    }

    /// Create a submission through the API and return its uuid
    pub async fn submit(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .upload(
                Method::POST,
                "/api/submissions",
                token,
                &submission_fields(title),
                Some(("paper.pdf", PDF)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "submission failed: {}", body);
        body["uuid"].as_str().unwrap().to_string()
    }

    /// Move a submission's timestamp into the past
    pub async fn backdate_submission(&self, uuid: &str, days: i64) {
        let then = Utc::now() - Duration::days(days);
        sqlx::query("UPDATE submissions SET submitted_on = ? WHERE uuid = ?")
            .bind(cfp_common::time::to_db(&then))
            .bind(uuid)
            .execute(self.db())
            .await
            .unwrap();
    }
}

pub fn submission_fields(title: &str) -> Vec<(&str, &str)> {
    vec![
        ("title", title),
        ("authors", "A. Author, B. Author"),
        ("contact_email", "author@example.org"),
        ("abstract", "We study things."),
        ("conflicts", ""),
    ]
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Split a response into status, headers and JSON body (`Null` when empty)
pub async fn read_json(response: Response) -> (StatusCode, HeaderMap, Value) {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

/// Path part of the activation link in the last mail sent
pub fn activation_path(mail_body: &str) -> String {
    let line = mail_body
        .lines()
        .find(|line| line.contains("/api/accounts/activate/"))
        .unwrap();
    line.trim().trim_start_matches("http://cfp.test").to_string()
}

/// `uid` and `token` values from a password reset mail
pub fn reset_values(mail_body: &str) -> (String, String) {
    let value = |prefix: &str| {
        mail_body
            .lines()
            .find_map(|line| line.strip_prefix(prefix))
            .unwrap()
            .trim()
            .to_string()
    };
    (value("uid: "), value("token: "))
}

/// Minimal Office Open XML package with one main part
pub fn office_package(main_part: &str, main_content_type: &str) -> Vec<u8> {
    let manifest = format!(
        "<?xml version=\"1.0\"?><Types><Override PartName=\"/{}\" ContentType=\"{}\"/></Types>",
        main_part, main_content_type
    );
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [
        ("[Content_Types].xml", manifest.as_str()),
        ("_rels/.rels", "<Relationships/>"),
        (main_part, "<document/>"),
    ] {
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Compound file (legacy Office) tagged with an application CLSID
pub fn compound_file(clsid: &str) -> Vec<u8> {
    let mut file = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    file.set_storage_clsid("/", uuid::Uuid::parse_str(clsid).unwrap())
        .unwrap();
    file.create_stream("/Contents").unwrap().write_all(&[0u8; 64]).unwrap();
    file.flush().unwrap();
    file.into_inner().into_inner()
}

/// Count the files below the uploads root
pub fn stored_file_count(uploads_root: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(uploads_root) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                stored_file_count(&path)
            } else {
                1
            }
        })
        .sum()
}
