use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::engine::access::resolve_caller;
use crate::error::AppError;
use crate::models::access::CallerContext;
use crate::state::AppState;

/// Identity header set by the authenticating proxy in front of this service.
pub const CALLER_HEADER: &str = "x-user-id";

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CallerContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| AppError::Forbidden(format!("missing {CALLER_HEADER} header")))?;

        let identity = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::Forbidden(format!("malformed {CALLER_HEADER} header")))?;

        resolve_caller(state.roles.as_ref(), identity).await
    }
}
