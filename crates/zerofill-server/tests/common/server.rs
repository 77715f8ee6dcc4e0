//! Server test utilities.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use core::time::Duration;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;
use zerofill::GeneratorConfig;
use zerofill_server::{GenerateService, ServerConfig, router};

pub const CHUNK: usize = 64 * 1024;

/// A router backed by a temporary output directory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub service: GenerateService,
    output_dir: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let output_dir = temp_dir.path().join("public");

        let mut generator = GeneratorConfig::new(&output_dir);
        generator.chunk_size = CHUNK;
        generator.progress_interval = Duration::from_millis(1);

        let config = ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            generator,
            stream_buffer_size: 8,
            shutdown_timeout: Duration::from_millis(50),
        };
        let service = GenerateService::new(&config).expect("Failed to create service");

        Self {
            router: router(service.clone()),
            service,
            output_dir,
            _temp_dir: temp_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Names of every file currently in the output directory.
    pub fn files_on_disk(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.output_dir)
            .expect("Failed to read output directory")
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Response {
        self.post_raw(uri, serde_json::to_vec(body).unwrap()).await
    }

    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> Response {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap();
        self.send(request).await
    }

    /// Waits for every spawned job to release its tracker guard.
    pub async fn wait_for_idle(&self) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while self.service.inflight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs did not finish");
    }
}

#[allow(dead_code)]
pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body_bytes(response).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Parses an NDJSON body into one value per line.
#[allow(dead_code)]
pub async fn ndjson_events(response: Response) -> Vec<Value> {
    let bytes = body_bytes(response).await;
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.is_empty() || text.ends_with('\n'), "unterminated line");
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
