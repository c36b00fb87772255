//! Audit trail queries, scoped to the caller.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use reelpress_core::{AuditFilter, AuditRecord};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditQueryParams {
    pub task_id: Option<String>,
    pub event_type: Option<String>,
    /// RFC 3339, inclusive
    pub from: Option<DateTime<Utc>>,
    /// RFC 3339, inclusive
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditQueryParams {
    /// Filter for these parameters, narrowed to `scope`.
    fn filter(&self, scope: AuditFilter) -> AuditFilter {
        let mut filter = scope.with_time_range(self.from, self.to);
        if let Some(ref event_type) = self.event_type {
            filter = filter.with_event_type(event_type);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            filter = filter.with_offset(offset);
        }
        filter
    }
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub events: Vec<AuditRecord>,
    /// Matching events across all pages
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// `GET /audit`
///
/// With `task_id`, every event of that task, provided the caller owns it.
/// Without, the events the caller triggered.
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    let scope = match params.task_id.as_deref() {
        Some(task_id) => {
            // Someone else's task reads as missing
            state.coordinator().status(&user_id, task_id)?;
            AuditFilter::new().with_task_id(task_id)
        }
        None => AuditFilter::new().with_user_id(&user_id),
    };
    let filter = params.filter(scope);

    let store = state.audit_store();
    let events = store.query(&filter).map_err(ApiError::internal)?;
    let total = store.count(&filter).map_err(ApiError::internal)?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}
