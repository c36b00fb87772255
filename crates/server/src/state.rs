use std::sync::Arc;

use reelpress_core::{
    AuditHandle, AuditStore, Authenticator, CleanupProtocol, Config, FsObjectStore,
    SanitizedConfig, TaskCoordinator,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    coordinator: Arc<TaskCoordinator>,
    cleanup: CleanupProtocol,
    /// Backs the signed `/objects` routes. Absent when objects live elsewhere.
    object_gateway: Option<Arc<FsObjectStore>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        coordinator: Arc<TaskCoordinator>,
        cleanup: CleanupProtocol,
        object_gateway: Option<Arc<FsObjectStore>>,
    ) -> Self {
        Self {
            config,
            authenticator,
            audit,
            audit_store,
            coordinator,
            cleanup,
            object_gateway,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        self.coordinator.as_ref()
    }

    pub fn cleanup(&self) -> &CleanupProtocol {
        &self.cleanup
    }

    pub fn object_gateway(&self) -> Option<&FsObjectStore> {
        self.object_gateway.as_deref()
    }
}
