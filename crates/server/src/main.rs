use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelpress_core::{
    create_audit_system, create_authenticator, load_config, validate_config, AuditEvent,
    AuditStore, CleanupProtocol, FsObjectStore, HttpQualityScorer,
    HttpTranscodeEngine, ObjectStore, QualityScorer, SqliteAuditStore, SqliteTaskStore,
    TaskCoordinator, TaskStore, TranscodeEngine, UrlSigner,
};
use reelpress_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("REELPRESS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);
    info!("Object root: {:?}", config.storage.root);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let authenticator =
        create_authenticator(&config.auth).context("Failed to create authenticator")?;
    info!("Using authenticator: {}", authenticator.method_name());

    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    let task_store: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to create task store")?,
    );
    info!("Task store initialized");

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    // Object store with signed URLs pointing back at this server
    let signing_secret = match config.storage.signing_secret.clone() {
        Some(secret) => secret,
        None => {
            warn!("No storage.signing_secret configured; signed URLs will not survive a restart");
            uuid::Uuid::new_v4().simple().to_string()
        }
    };
    let signer = UrlSigner::new(signing_secret, config.server.base_url());
    let gateway = Arc::new(FsObjectStore::new(&config.storage, signer));
    let objects: Arc<dyn ObjectStore> = gateway.clone();

    // Remote collaborators
    let engine: Arc<dyn TranscodeEngine> = Arc::new(
        HttpTranscodeEngine::new(&config.transcoder)
            .context("Failed to create transcoder client")?,
    );
    info!("Transcoder at {}", config.transcoder.url);
    let scorer: Arc<dyn QualityScorer> = Arc::new(
        HttpQualityScorer::new(&config.scorer).context("Failed to create scorer client")?,
    );
    info!("Quality scorer at {}", config.scorer.url);

    let coordinator = Arc::new(TaskCoordinator::new(
        config.coordinator.clone(),
        config.limits.clone(),
        config.retention.clone(),
        Arc::clone(&task_store),
        Arc::clone(&objects),
        engine,
        scorer,
        Some(audit_handle.clone()),
    ));

    // Pick up tasks interrupted by the previous shutdown
    match coordinator.resume().await {
        Ok(0) => {}
        Ok(count) => info!("Resumed {} interrupted tasks", count),
        Err(e) => error!("Failed to resume interrupted tasks: {}", e),
    }
    coordinator.spawn_maintenance();
    info!("Task coordinator started");

    let cleanup = CleanupProtocol::new(
        task_store,
        objects,
        Some(audit_handle.clone()),
        config.coordinator.workflow.storage_timeout(),
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit_handle.clone(),
        audit_store,
        Arc::clone(&coordinator),
        cleanup,
        Some(gateway),
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Running workflows stop where they are; their tasks resume on next start
    info!("Stopping task coordinator...");
    coordinator.shutdown().await;
    info!("Task coordinator stopped");

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle is gone. The coordinator holds
    // clones, so it goes first.
    drop(coordinator);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
