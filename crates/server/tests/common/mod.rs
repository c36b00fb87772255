//! Common test utilities for API testing with mocks.
//!
//! The fixture builds the real router over an in-process coordinator whose
//! collaborators are mocks, so whole task lifecycles run without a
//! transcoder, scorer or network.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reelpress_core::{
    config::{AuthConfig, DatabaseConfig},
    create_audit_system, create_authenticator,
    storage::keys,
    testing::{MemoryObjectStore, MockQualityScorer, MockTranscodeEngine},
    workflow::RetryConfig,
    AuditStore, AuthMethod, CleanupProtocol, Config, CoordinatorConfig,
    FsObjectStore, ObjectStore, SqliteAuditStore, SqliteTaskStore, StorageConfig,
    TaskCoordinator, UrlSigner, WorkflowConfig,
};
use reelpress_server::state::AppState;

/// Origin signed URLs are issued for in tests.
pub const BASE_URL: &str = "http://localhost:8080";

/// Test fixture wiring the router to mock collaborators.
pub struct TestFixture {
    pub router: Router,
    pub coordinator: Arc<TaskCoordinator>,
    /// Object store used by workflows and cleanup
    pub objects: MemoryObjectStore,
    pub engine: MockTranscodeEngine,
    pub scorer: MockQualityScorer,
    /// Serves signed object routes, when enabled
    pub gateway: Option<Arc<FsObjectStore>>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for the test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub auth: AuthConfig,
    /// Serve `/objects` from a filesystem store under the temp dir.
    pub object_gateway: bool,
    pub max_concurrent_files: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            },
            object_gateway: false,
            max_concurrent_files: 5,
        }
    }
}

impl TestConfig {
    pub fn with_api_key(key: &str) -> Self {
        Self {
            auth: AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some(key.to_string()),
            },
            ..Default::default()
        }
    }

    pub fn with_object_gateway() -> Self {
        Self {
            object_gateway: true,
            ..Default::default()
        }
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::with_auth(test_config.auth.clone());
        config.database = DatabaseConfig {
            path: db_path.clone(),
        };
        config.storage = StorageConfig::default()
            .with_root(temp_dir.path().join("objects"))
            .with_signing_secret("test-secret");
        config.coordinator = CoordinatorConfig::default()
            .with_max_concurrent_files(test_config.max_concurrent_files)
            .with_workflow(
                WorkflowConfig::default()
                    .with_poll_interval_ms(5)
                    .with_retry(RetryConfig::immediate(3)),
            );

        let authenticator =
            create_authenticator(&config.auth).expect("Failed to create authenticator");
        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let task_store =
            Arc::new(SqliteTaskStore::new(&db_path).expect("Failed to create task store"));

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let objects = MemoryObjectStore::new();
        let engine = MockTranscodeEngine::new(objects.clone());
        let scorer = MockQualityScorer::new();

        let gateway = test_config.object_gateway.then(|| {
            Arc::new(FsObjectStore::new(
                &config.storage,
                UrlSigner::new("test-secret", BASE_URL),
            ))
        });
        // With the gateway on, submissions sign URLs against the filesystem store
        let submit_objects: Arc<dyn ObjectStore> = match gateway {
            Some(ref gateway) => gateway.clone() as Arc<dyn ObjectStore>,
            None => Arc::new(objects.clone()),
        };

        let coordinator = Arc::new(TaskCoordinator::new(
            config.coordinator.clone(),
            config.limits.clone(),
            config.retention.clone(),
            task_store.clone(),
            submit_objects,
            Arc::new(engine.clone()),
            Arc::new(scorer.clone()),
            Some(audit_handle.clone()),
        ));
        let cleanup = CleanupProtocol::new(
            task_store,
            Arc::new(objects.clone()),
            Some(audit_handle.clone()),
            Duration::from_secs(5),
        );

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            audit_handle,
            audit_store,
            Arc::clone(&coordinator),
            cleanup,
            gateway.clone(),
        ));
        let router = reelpress_server::api::create_router(state);

        Self {
            router,
            coordinator,
            objects,
            engine,
            scorer,
            gateway,
            temp_dir,
        }
    }

    /// Submit `count` files as `user` and upload their sources directly.
    pub async fn submit_and_upload(&self, user: &str, count: usize, preset: &str) -> String {
        let files: Vec<Value> = (1..=count)
            .map(|n| json!({ "filename": format!("clip-{}.mp4", n), "file_size": 1000 }))
            .collect();
        let response = self
            .post_as(
                user,
                "/api/v1/tasks",
                json!({ "files": files, "quality_preset": preset }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        let task_id = response.body["task_id"].as_str().unwrap().to_string();
        for upload in response.body["uploads"].as_array().unwrap() {
            let key = keys::source_key(
                &task_id,
                upload["file_id"].as_str().unwrap(),
                upload["filename"].as_str().unwrap(),
            );
            self.objects.insert(key, vec![1u8; 1000]).await;
        }
        task_id
    }

    /// Start a task and wait for its workflows to finish.
    pub async fn run_task(&self, user: &str, task_id: &str) -> TestResponse {
        let response = self
            .post_as(user, &format!("/api/v1/tasks/{}/start", task_id), json!({}))
            .await;
        tokio::time::timeout(Duration::from_secs(10), self.coordinator.wait_idle(task_id))
            .await
            .expect("workflows did not finish");
        response
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    pub async fn get_as(&self, user: &str, path: &str) -> TestResponse {
        self.request("GET", path, None, &[("X-User-Id", user)]).await
    }

    pub async fn post_as(&self, user: &str, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[("X-User-Id", user)])
            .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    /// Send a raw request and collect the body bytes.
    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, body_bytes.to_vec())
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let (status, body_bytes) = self.send_raw(request).await;
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
