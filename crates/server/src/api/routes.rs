use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, handlers, objects, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Authenticated API routes
    let api_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Tasks
        .route("/tasks", post(tasks::submit_task).get(tasks::list_tasks))
        .route("/tasks/{task_id}", get(tasks::get_task))
        .route("/tasks/{task_id}/start", post(tasks::start_task))
        .route("/tasks/{task_id}/cancel", post(tasks::cancel_task))
        .route(
            "/tasks/{task_id}/files/{file_id}/cleanup",
            post(tasks::cleanup_file),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Signed object transfer and liveness need no API credentials
    let open_routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/objects/{*key}",
            get(objects::get_object).put(objects::put_object),
        );

    Router::new()
        .nest("/api/v1", api_routes.merge(open_routes))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
